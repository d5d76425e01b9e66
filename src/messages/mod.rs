pub mod storage;
pub mod types;

pub use storage::{MessageStorage, TurnStore};
pub use types::{ConversationTurn, TurnRole};
