pub mod actions;
pub mod ai;
pub mod chat;
pub mod rules;
