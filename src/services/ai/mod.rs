pub mod extractor;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

/// Raw chat access to whichever language model is configured. The extraction
/// port (`extractor`) builds typed calls on top of this.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String>;
}

/// Both providers speak the OpenAI-style messages array.
fn to_chat_messages(system_prompt: &str, messages: &[Message]) -> Vec<serde_json::Value> {
    let mut out = vec![json!({
        "role": "system",
        "content": system_prompt,
    })];
    for msg in messages {
        out.push(json!({
            "role": msg.role,
            "content": msg.content,
        }));
    }
    out
}
