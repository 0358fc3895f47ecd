//! Problem classification types

use serde::{Deserialize, Serialize};

/// Category name used when nothing more specific applies
pub const GENERAL_CATEGORY: &str = "General";

/// How urgently a problem needs attention
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl UrgencyLevel {
    /// Lenient parse; unknown values yield `None`
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(UrgencyLevel::Low),
            "medium" => Some(UrgencyLevel::Medium),
            "high" => Some(UrgencyLevel::High),
            "critical" => Some(UrgencyLevel::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Critical => "critical",
        }
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three-level classification of a student's problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemClassification {
    pub category: String,
    pub subcategory: String,
    pub specific_issue: String,
    /// Always within [0, 1]
    pub confidence: f32,
    pub suggested_department: String,
    pub urgency_level: UrgencyLevel,
}

impl ProblemClassification {
    /// Whether this is the catch-all classification
    pub fn is_generic(&self) -> bool {
        self.category.trim().is_empty() || self.category.eq_ignore_ascii_case(GENERAL_CATEGORY)
    }
}
