//! Conversation types including phases and turns

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Dialogue phase of a support conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Session created, greeting shown
    #[default]
    Initial,
    /// Gathering details about the problem
    AskingFollowup,
    /// Waiting for the student to confirm the identified issue
    Confirming,
    /// Email draft produced
    Completed,
}

/// Allowed phase changes. Staying in the same phase is always allowed.
static PHASE_TRANSITIONS: Lazy<HashMap<Phase, &'static [Phase]>> = Lazy::new(|| {
    use Phase::*;
    let mut map = HashMap::new();
    map.insert(Initial, &[AskingFollowup] as &[_]);
    map.insert(AskingFollowup, &[Confirming] as &[_]);
    map.insert(Confirming, &[AskingFollowup, Completed] as &[_]);
    map.insert(Completed, &[AskingFollowup, Confirming] as &[_]);
    map
});

impl Phase {
    /// Phases reachable from this one
    pub fn allowed_transitions(&self) -> &'static [Phase] {
        PHASE_TRANSITIONS.get(self).copied().unwrap_or(&[])
    }

    pub fn can_transition_to(&self, target: Phase) -> bool {
        *self == target || self.allowed_transitions().contains(&target)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initial => "initial",
            Phase::AskingFollowup => "asking_followup",
            Phase::Confirming => "confirming",
            Phase::Completed => "completed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

/// A single turn in the conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }

    /// Label used when rendering history as plain text
    pub fn speaker(&self) -> &'static str {
        match self.role {
            TurnRole::User => "User",
            TurnRole::Assistant => "Assistant",
            TurnRole::System => "System",
        }
    }
}
