//! Per-session conversation state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classification::ProblemClassification;
use crate::conversation::{ConversationTurn, Phase, TurnRole};

/// Details the student has shared about themselves
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentInfo {
    pub full_name: Option<String>,
    pub student_id: Option<String>,
    pub programme: Option<String>,
}

impl StudentInfo {
    /// Overwrite fields that are present (and non-blank) in `other`
    pub fn merge(&mut self, other: &StudentInfo) {
        fn pick(target: &mut Option<String>, source: &Option<String>) {
            if let Some(value) = source.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                *target = Some(value.to_string());
            }
        }
        pick(&mut self.full_name, &other.full_name);
        pick(&mut self.student_id, &other.student_id);
        pick(&mut self.programme, &other.programme);
    }

    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.student_id.is_none() && self.programme.is_none()
    }
}

/// The single mutable aggregate of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: Phase,
    /// Append-only, chronological
    pub messages: Vec<ConversationTurn>,
    pub selected_top_category_key: Option<String>,
    pub selected_subcategory_key: Option<String>,
    pub student_info: StudentInfo,
    pub original_message: Option<String>,
    pub selected_issue_key: Option<String>,
    pub collected_slots: BTreeMap<String, String>,
    /// Slots of follow-up questions asked but not yet answered, in order
    #[serde(default)]
    pub pending_slots: Vec<String>,
    /// Opaque device/IP tag used for session listing, not security
    pub client_identifier: String,
    /// Most recent classification, cached opportunistically
    #[serde(default)]
    pub last_classification: Option<ProblemClassification>,
    #[serde(default)]
    pub email_generated: bool,
    #[serde(default)]
    pub email_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(client_identifier: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            phase: Phase::Initial,
            messages: Vec::new(),
            selected_top_category_key: None,
            selected_subcategory_key: None,
            student_info: StudentInfo::default(),
            original_message: None,
            selected_issue_key: None,
            collected_slots: BTreeMap::new(),
            pending_slots: Vec::new(),
            client_identifier: client_identifier.into(),
            last_classification: None,
            email_generated: false,
            email_content: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_turn(&mut self, turn: ConversationTurn) {
        self.messages.push(turn);
        self.updated_at = Utc::now();
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push_turn(ConversationTurn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push_turn(ConversationTurn::assistant(content));
    }

    /// Queue the slots of freshly asked follow-up questions
    pub fn ask_slots(&mut self, slots: impl IntoIterator<Item = String>) {
        self.pending_slots = slots.into_iter().collect();
    }

    /// Store an answer under the oldest unanswered slot
    ///
    /// Returns the slot filled, if any was pending.
    pub fn fill_next_slot(&mut self, answer: &str) -> Option<String> {
        let answer = answer.trim();
        if answer.is_empty() || self.pending_slots.is_empty() {
            return None;
        }
        let slot = self.pending_slots.remove(0);
        self.collected_slots.insert(slot.clone(), answer.to_string());
        Some(slot)
    }

    /// Contents of all user turns in order
    pub fn user_messages(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter(|t| t.role == TurnRole::User)
            .map(|t| t.content.as_str())
            .collect()
    }

    /// The last `n` turns
    pub fn recent_turns(&self, n: usize) -> &[ConversationTurn] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    /// The last `n` turns rendered as `Speaker: content` lines
    pub fn history_lines(&self, n: usize) -> Vec<String> {
        self.recent_turns(n)
            .iter()
            .map(|t| format!("{}: {}", t.speaker(), t.content))
            .collect()
    }

    pub fn summary(&self, session_id: impl Into<String>) -> SessionSummary {
        SessionSummary {
            session_id: session_id.into(),
            client_identifier: self.client_identifier.clone(),
            phase: self.phase,
            message_count: self.messages.len(),
            selected_top_category_key: self.selected_top_category_key.clone(),
            preview: self.user_messages().first().map(|m| truncate_chars(m, 80)),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Lightweight view used when listing sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub client_identifier: String,
    pub phase: Phase,
    pub message_count: usize,
    pub selected_top_category_key: Option<String>,
    pub preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("...");
        out
    }
}
