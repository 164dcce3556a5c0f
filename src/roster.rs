// src/roster.rs

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("{0:?} is already in the roster")]
    AlreadyExists(String),
    #[error("{0:?} is not in the roster")]
    NotFound(String),
}

/// The people splitting an invoice, in the order they were added, with
/// at most one of them designated as the payer.
///
/// Names are matched case-sensitively and exactly; other components
/// rely on this set being duplicate-free.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    participants: IndexSet<String>,
    payer: Option<String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant. Re-adding an existing name is rejected, not
    /// silently ignored.
    pub fn add(&mut self, name: &str) -> Result<(), RosterError> {
        if !self.participants.insert(name.to_string()) {
            return Err(RosterError::AlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Designate the payer. The name must already be a participant.
    pub fn set_payer(&mut self, name: &str) -> Result<(), RosterError> {
        if !self.participants.contains(name) {
            return Err(RosterError::NotFound(name.to_string()));
        }
        self.payer = Some(name.to_string());
        Ok(())
    }

    pub fn payer(&self) -> Option<&str> {
        self.payer.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.participants.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    /// Participants in first-insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.participants.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let mut roster = Roster::new();
        roster.add("Carol").unwrap();
        roster.add("Alice").unwrap();
        roster.add("Bob").unwrap();

        let names: Vec<&str> = roster.names().collect();
        assert_eq!(names, ["Carol", "Alice", "Bob"]);
    }

    #[test]
    fn duplicate_add_is_rejected_and_size_unchanged() {
        let mut roster = Roster::new();
        roster.add("Alice").unwrap();
        let err = roster.add("Alice").unwrap_err();

        assert_eq!(err, RosterError::AlreadyExists("Alice".to_string()));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn names_match_case_sensitively() {
        let mut roster = Roster::new();
        roster.add("alice").unwrap();
        roster.add("Alice").unwrap();
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn payer_must_be_a_participant() {
        let mut roster = Roster::new();
        roster.add("Alice").unwrap();

        let err = roster.set_payer("Bob").unwrap_err();
        assert_eq!(err, RosterError::NotFound("Bob".to_string()));
        assert_eq!(roster.payer(), None);

        roster.set_payer("Alice").unwrap();
        assert_eq!(roster.payer(), Some("Alice"));
    }
}
