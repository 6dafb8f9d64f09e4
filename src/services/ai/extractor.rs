use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::models::{
    ActionType, BookingAction, BookingOutcome, ConversationMessage, RoutingDecision,
};
use crate::services::ai::{LlmProvider, Message};

const ROUTER_PROMPT: &str = r#"You are the routing stage of a technician booking assistant. Decide which path should handle the user's latest request.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "target": "booking|general|clarification",
  "confidence": 0.0,
  "missing_info": ["field names the user must still provide"] or null,
  "clarifying_question": "question to ask the user" or null
}

Routing rules:
- "booking": the user wants to create, cancel, change, or look up a specific booking AND has provided enough detail to act on
- "clarification": the user clearly wants a booking action but a required detail (service, time, booking ID) is missing; fill missing_info and clarifying_question
- "general": questions about services, business hours, policies, existing bookings, or anything else
"#;

const ACTION_PROMPT: &str = r#"You are a booking action processor for a technical services company. Your ONLY job is to extract booking actions that EXACTLY match these patterns.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "success": true,
  "message": "short note about what was extracted",
  "action": {
    "action_type": "new_booking|cancel_booking|edit_booking|get_booking",
    "booking_id": 123 or null,
    "service": "service name" or null,
    "booking_datetime": "YYYY-MM-DD HH:MM" or null,
    "technician_name": "name" or null
  }
}

Action patterns:
1. new_booking: requires service; booking_datetime when the user gave a specific time
   - "book a plumber for tomorrow at 2pm"
2. cancel_booking: requires booking_id
   - "cancel booking 123"
3. edit_booking: requires booking_id AND booking_datetime
   - "change booking 123 to next Monday at 3pm"
4. get_booking: requires booking_id
   - "show booking 123"

Resolve relative dates ("tomorrow", "next Monday") against the current datetime in the context. If no pattern matches, return {"success": false, "message": "no booking action", "action": null}.
"#;

const GENERAL_PROMPT: &str = r#"You are a helpful booking assistant for a technical services company. Answer questions about the user's bookings, business hours, available services, and scheduling policies using only the information provided in the context.

Reference the current datetime and business hours from the context when discussing availability. Be concise but informative.
"#;

/// The extraction port: converts free text into typed routing and booking
/// structures. Every method may fail (timeout, provider error, unparsable
/// output); callers own the fallback policy.
#[async_trait]
pub trait IntentExtractor: Send + Sync {
    async fn classify(
        &self,
        context: &str,
        history: &[ConversationMessage],
    ) -> anyhow::Result<RoutingDecision>;

    async fn extract_booking_action(
        &self,
        context: &str,
        history: &[ConversationMessage],
    ) -> anyhow::Result<BookingOutcome>;

    async fn answer_general(
        &self,
        context: &str,
        history: &[ConversationMessage],
    ) -> anyhow::Result<String>;
}

pub struct LlmExtractor {
    llm: Box<dyn LlmProvider>,
    timeout: Duration,
}

impl LlmExtractor {
    pub fn new(llm: Box<dyn LlmProvider>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    async fn chat_bounded(
        &self,
        system_prompt: &str,
        context: &str,
        history: &[ConversationMessage],
    ) -> anyhow::Result<String> {
        let mut messages: Vec<Message> = history
            .iter()
            .map(|m| Message {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();
        messages.push(Message {
            role: "user".to_string(),
            content: context.to_string(),
        });

        tokio::time::timeout(self.timeout, self.llm.chat(system_prompt, &messages))
            .await
            .map_err(|_| anyhow::anyhow!("LLM call timed out after {:?}", self.timeout))?
    }
}

#[async_trait]
impl IntentExtractor for LlmExtractor {
    async fn classify(
        &self,
        context: &str,
        history: &[ConversationMessage],
    ) -> anyhow::Result<RoutingDecision> {
        let response = self.chat_bounded(ROUTER_PROMPT, context, history).await?;
        parse_json_response(&response)
            .ok_or_else(|| anyhow::anyhow!("unparsable routing decision: {response}"))
    }

    async fn extract_booking_action(
        &self,
        context: &str,
        history: &[ConversationMessage],
    ) -> anyhow::Result<BookingOutcome> {
        let response = self.chat_bounded(ACTION_PROMPT, context, history).await?;
        let raw: RawBookingOutcome = parse_json_response(&response)
            .ok_or_else(|| anyhow::anyhow!("unparsable booking action: {response}"))?;
        Ok(raw.into())
    }

    async fn answer_general(
        &self,
        context: &str,
        history: &[ConversationMessage],
    ) -> anyhow::Result<String> {
        self.chat_bounded(GENERAL_PROMPT, context, history).await
    }
}

#[derive(Debug, Deserialize)]
struct RawBookingOutcome {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    action: Option<RawBookingAction>,
}

#[derive(Debug, Deserialize)]
struct RawBookingAction {
    action_type: ActionType,
    #[serde(default)]
    booking_id: Option<i64>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    booking_datetime: Option<String>,
    #[serde(default)]
    technician_name: Option<String>,
}

impl From<RawBookingOutcome> for BookingOutcome {
    fn from(raw: RawBookingOutcome) -> Self {
        BookingOutcome {
            success: raw.success,
            message: raw.message,
            action: raw.action.map(|a| BookingAction {
                action_type: a.action_type,
                booking_id: a.booking_id,
                service: a.service,
                booking_datetime: a.booking_datetime.as_deref().and_then(parse_llm_datetime),
                technician_name: a.technician_name,
            }),
        }
    }
}

/// Model output arrives in a handful of near-ISO shapes; an unparsable
/// datetime degrades to None, which downstream treats as "ask for a time".
fn parse_llm_datetime(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s.trim(), fmt).ok())
}

/// Lenient JSON extraction: direct parse, then with markdown fences
/// stripped, then the first {...} span in the text.
fn parse_json_response<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str::<T>(response) {
        return Some(value);
    }

    let cleaned = response
        .trim()
        .strip_prefix("```json")
        .or_else(|| response.trim().strip_prefix("```"))
        .unwrap_or(response.trim());
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(value) = serde_json::from_str::<T>(cleaned) {
        return Some(value);
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<T>(&cleaned[start..=end]) {
                return Some(value);
            }
        }
    }

    tracing::warn!("failed to parse LLM response as JSON");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RouteTarget;

    #[test]
    fn test_parse_routing_decision() {
        let json = r#"{"target":"booking","confidence":0.92,"missing_info":null,"clarifying_question":null}"#;
        let decision: RoutingDecision = parse_json_response(json).unwrap();
        assert_eq!(decision.target, RouteTarget::Booking);
        assert!((decision.confidence - 0.92).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_markdown_fenced_decision() {
        let json = "```json\n{\"target\":\"clarification\",\"confidence\":0.5,\"missing_info\":[\"booking_datetime\"],\"clarifying_question\":\"What time works for you?\"}\n```";
        let decision: RoutingDecision = parse_json_response(json).unwrap();
        assert_eq!(decision.target, RouteTarget::Clarification);
        assert_eq!(
            decision.missing_info,
            Some(vec!["booking_datetime".to_string()])
        );
    }

    #[test]
    fn test_parse_json_embedded_in_prose() {
        let text = "Sure! Here is the decision: {\"target\":\"general\",\"confidence\":0.7} hope that helps";
        let decision: RoutingDecision = parse_json_response(text).unwrap();
        assert_eq!(decision.target, RouteTarget::General);
    }

    #[test]
    fn test_parse_garbage_is_none() {
        assert!(parse_json_response::<RoutingDecision>("I have no idea").is_none());
    }

    #[test]
    fn test_parse_booking_outcome() {
        let json = r#"{"success":true,"message":"ok","action":{"action_type":"new_booking","booking_id":null,"service":"Plumber","booking_datetime":"2030-05-01 14:00","technician_name":null}}"#;
        let raw: RawBookingOutcome = parse_json_response(json).unwrap();
        let outcome: BookingOutcome = raw.into();
        assert!(outcome.success);
        let action = outcome.action.unwrap();
        assert_eq!(action.action_type, ActionType::NewBooking);
        assert_eq!(action.service.as_deref(), Some("Plumber"));
        assert_eq!(
            action.booking_datetime,
            Some(parse_llm_datetime("2030-05-01 14:00").unwrap())
        );
    }

    #[test]
    fn test_unmatched_action_outcome() {
        let json = r#"{"success":false,"message":"no booking action","action":null}"#;
        let raw: RawBookingOutcome = parse_json_response(json).unwrap();
        let outcome: BookingOutcome = raw.into();
        assert!(!outcome.success);
        assert!(outcome.action.is_none());
    }

    #[test]
    fn test_parse_llm_datetime_variants() {
        assert!(parse_llm_datetime("2030-05-01 14:00").is_some());
        assert!(parse_llm_datetime("2030-05-01 14:00:00").is_some());
        assert!(parse_llm_datetime("2030-05-01T14:00:00").is_some());
        assert!(parse_llm_datetime("tomorrow at 2pm").is_none());
    }
}
