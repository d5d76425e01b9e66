use super::types::ConversationTurn;
use crate::{Result, VoxError};
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// Persistence collaborator for conversation history
///
/// Committed turns are never rewritten: only an open (non-final) assistant
/// turn accepts content updates.
pub trait TurnStore: Send + Sync {
    /// Append a turn to the history
    fn append_turn(&self, turn: ConversationTurn) -> Result<()>;

    /// Replace the content of an open turn
    fn update_turn(&self, id: Uuid, content: &str) -> Result<()>;

    /// Close an open turn
    fn finish_turn(&self, id: Uuid) -> Result<()>;

    /// Close an open turn, flagging it as failed
    fn mark_error(&self, id: Uuid, error: &str) -> Result<()>;

    /// Snapshot of the full history
    fn turns(&self) -> Vec<ConversationTurn>;
}

#[derive(Debug, Clone)]
pub struct MessageStorage {
    turns: Arc<RwLock<Vec<ConversationTurn>>>,
}

impl MessageStorage {
    pub fn new() -> Self {
        Self {
            turns: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<ConversationTurn> {
        self.turns.read().iter().find(|t| t.id == id).cloned()
    }

    pub fn last(&self) -> Option<ConversationTurn> {
        self.turns.read().last().cloned()
    }

    pub fn clear(&self) {
        self.turns.write().clear();
    }

    pub fn len(&self) -> usize {
        self.turns.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.read().is_empty()
    }

    /// Export the history to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.turns.read())?)
    }

    fn with_open_turn(&self, id: Uuid, apply: impl FnOnce(&mut ConversationTurn)) -> Result<()> {
        let mut turns = self.turns.write();
        let turn = turns
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| VoxError::PersistenceError(format!("Unknown turn {}", id)))?;

        if turn.is_final {
            return Err(VoxError::PersistenceError(format!(
                "Turn {} is already final",
                id
            )));
        }

        apply(turn);
        Ok(())
    }
}

impl TurnStore for MessageStorage {
    fn append_turn(&self, turn: ConversationTurn) -> Result<()> {
        let mut turns = self.turns.write();
        if turns.iter().any(|t| t.id == turn.id) {
            return Err(VoxError::PersistenceError(format!(
                "Duplicate turn {}",
                turn.id
            )));
        }
        turns.push(turn);
        Ok(())
    }

    fn update_turn(&self, id: Uuid, content: &str) -> Result<()> {
        self.with_open_turn(id, |turn| turn.content = content.to_string())
    }

    fn finish_turn(&self, id: Uuid) -> Result<()> {
        self.with_open_turn(id, |turn| turn.is_final = true)
    }

    fn mark_error(&self, id: Uuid, error: &str) -> Result<()> {
        self.with_open_turn(id, |turn| {
            turn.is_final = true;
            turn.error = Some(error.to_string());
        })
    }

    fn turns(&self) -> Vec<ConversationTurn> {
        self.turns.read().clone()
    }
}

impl Default for MessageStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_updates_replace_content() {
        let storage = MessageStorage::new();
        let id = Uuid::new_v4();
        storage
            .append_turn(ConversationTurn::assistant_placeholder(id))
            .unwrap();

        storage.update_turn(id, "Hi!").unwrap();
        storage.update_turn(id, "Hi! Nice to meet you.").unwrap();
        storage.finish_turn(id).unwrap();

        let turn = storage.get(id).unwrap();
        assert_eq!(turn.content, "Hi! Nice to meet you.");
        assert!(turn.is_final);
    }

    #[test]
    fn test_final_turns_are_immutable() {
        let storage = MessageStorage::new();
        let turn = ConversationTurn::user("Hello", true);
        let id = turn.id;
        storage.append_turn(turn).unwrap();

        assert!(matches!(
            storage.update_turn(id, "Changed"),
            Err(VoxError::PersistenceError(_))
        ));
        assert_eq!(storage.get(id).unwrap().content, "Hello");
    }

    #[test]
    fn test_mark_error_keeps_partial_content() {
        let storage = MessageStorage::new();
        let id = Uuid::new_v4();
        storage
            .append_turn(ConversationTurn::assistant_placeholder(id))
            .unwrap();
        storage.update_turn(id, "Partial").unwrap();

        storage.mark_error(id, "stream reset").unwrap();

        let turn = storage.get(id).unwrap();
        assert_eq!(turn.content, "Partial");
        assert!(turn.is_error());
        assert!(turn.is_final);
    }

    #[test]
    fn test_unknown_and_duplicate_turns() {
        let storage = MessageStorage::new();
        assert!(storage.update_turn(Uuid::new_v4(), "x").is_err());

        let turn = ConversationTurn::user("Hello", false);
        storage.append_turn(turn.clone()).unwrap();
        assert!(storage.append_turn(turn).is_err());
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_json_export() {
        let storage = MessageStorage::new();
        storage
            .append_turn(ConversationTurn::user("Hello", true))
            .unwrap();

        let json = storage.to_json().unwrap();
        assert!(json.contains("\"content\": \"Hello\""));
    }
}
