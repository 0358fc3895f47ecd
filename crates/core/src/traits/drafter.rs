//! Email drafting interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{ProblemClassification, Result, StudentInfo};

/// Tone of the drafted email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    Inquiry,
    Complaint,
    Request,
    FollowUp,
}

/// Who / What / When / Where / Why / How summary of the problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiveWOneH {
    pub who: String,
    pub what: String,
    pub when: String,
    #[serde(rename = "where")]
    pub where_: String,
    pub why: String,
    pub how: String,
}

/// Everything the drafter needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    pub student: StudentInfo,
    pub classification: ProblemClassification,
    /// The student's own description of the problem
    pub message: String,
    /// Collected slots (`when`, `where`, `why`, `how`)
    #[serde(default)]
    pub slots: BTreeMap<String, String>,
}

/// A drafted email
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailDraft {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub five_w_one_h: FiveWOneH,
    pub template_type: TemplateType,
    pub department: String,
}

impl EmailDraft {
    /// Render for display in the chat transcript
    pub fn to_display(&self) -> String {
        format!(
            "**Email Draft**\n\n**To:** {}\n**Subject:** {}\n\n---\n\n{}\n\n---\n*This email was auto-generated. Please review before sending.*",
            self.to, self.subject, self.body
        )
    }
}

/// Produces an email draft from the classified problem
#[async_trait]
pub trait EmailDrafter: Send + Sync + 'static {
    async fn draft(&self, request: &EmailRequest) -> Result<EmailDraft>;
}
