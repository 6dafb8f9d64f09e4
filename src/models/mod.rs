pub mod booking;
pub mod conversation;
pub mod intent;
pub mod response;
pub mod user;

pub use booking::{Booking, SLOT_MINUTES};
pub use conversation::{Conversation, ConversationMessage};
pub use intent::{ActionType, BookingAction, BookingOutcome, RouteTarget, RoutingDecision};
pub use response::ChatResponse;
pub use user::User;
