//! Email drafting with the 5W1H principle
//!
//! Turns a classified problem into a first-person email to the department
//! that handles it. The tone template (inquiry, complaint, request,
//! follow-up) is picked from the wording of the student's message.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use campus_assist_config::{Department, DomainConfig};
use campus_assist_core::{
    EmailDraft, EmailDrafter, EmailRequest, Error, FiveWOneH, ProblemClassification, Result,
    TemplateType,
};

const DEFAULT_NAME: &str = "Student";
const DEFAULT_STUDENT_ID: &str = "Unknown";

const DEFAULT_WHEN: &str = "Recently";
const DEFAULT_WHY: &str = "This is affecting my ability to continue with my studies effectively";
const DEFAULT_HOW: &str = "I would appreciate your guidance and assistance in resolving this matter";

const SUBJECT_MAX_CHARS: usize = 60;

struct Template {
    subject: &'static str,
    opening: &'static str,
    closing: &'static str,
    signoff: &'static str,
}

fn template(kind: TemplateType) -> Template {
    match kind {
        TemplateType::Inquiry => Template {
            subject: "Question about {issue}",
            opening: "I hope this email finds you well. I have a question about {what} and was hoping you could help.",
            closing: "I'd really appreciate any help or guidance you can provide.",
            signoff: "Thanks so much!",
        },
        TemplateType::Complaint => Template {
            subject: "Help needed: {issue}",
            opening: "I'm reaching out because I'm having an issue with {what} and could really use some help.",
            closing: "I'd be so grateful if you could look into this for me.",
            signoff: "Thank you for your help!",
        },
        TemplateType::Request => Template {
            subject: "Request: {issue}",
            opening: "I hope you're doing well! I'm writing because I need some help with {what}.",
            closing: "It would mean a lot if you could assist me with this.",
            signoff: "Thanks in advance!",
        },
        TemplateType::FollowUp => Template {
            subject: "Following up: {issue}",
            opening: "I'm just following up on my previous message about {what}.",
            closing: "I'd really appreciate an update when you get a chance.",
            signoff: "Thanks again!",
        },
    }
}

/// Pick the template tone from the message wording
///
/// Complaint wording wins over request wording, which wins over follow-up
/// wording; anything else is an inquiry.
pub fn detect_template_type(message: &str) -> TemplateType {
    const COMPLAINT: &[&str] = &[
        "problem", "issue", "not working", "broken", "complaint", "wrong", "error", "failed",
    ];
    const REQUEST: &[&str] = &[
        "request", "please", "need", "want", "can i", "could you", "help me",
    ];
    const FOLLOW_UP: &[&str] = &[
        "follow", "update", "status", "previous", "still waiting", "no response",
    ];

    let lower = message.to_lowercase();
    let mentions = |terms: &[&str]| terms.iter().any(|t| lower.contains(t));

    if mentions(COMPLAINT) {
        TemplateType::Complaint
    } else if mentions(REQUEST) {
        TemplateType::Request
    } else if mentions(FOLLOW_UP) {
        TemplateType::FollowUp
    } else {
        TemplateType::Inquiry
    }
}

/// Template-based drafter addressing the department from the domain config
pub struct TemplateEmailDrafter {
    domain: Arc<DomainConfig>,
}

impl TemplateEmailDrafter {
    pub fn new(domain: Arc<DomainConfig>) -> Self {
        Self { domain }
    }

    /// Department for a classification: by category, then by suggested name
    fn department_for(&self, classification: &ProblemClassification) -> &Department {
        self.domain
            .department_for_category(&classification.category)
            .or_else(|| {
                self.domain
                    .departments
                    .iter()
                    .find(|d| d.name.eq_ignore_ascii_case(&classification.suggested_department))
            })
            .unwrap_or(&self.domain.fallback_department)
    }

    pub fn compose(&self, request: &EmailRequest) -> Result<EmailDraft> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(Error::InvalidRequest("message is required".to_string()));
        }

        let department = self.department_for(&request.classification);
        let template_type = detect_template_type(message);
        let template = template(template_type);
        let five_w_one_h = five_w_one_h(request, &department.name);

        let name = non_blank(&request.student.full_name).unwrap_or(DEFAULT_NAME);
        let student_id = non_blank(&request.student.student_id).unwrap_or(DEFAULT_STUDENT_ID);

        let subject = template
            .subject
            .replace("{issue}", &subject_issue(message, &request.classification));

        let student_intro = match non_blank(&request.student.programme) {
            Some(programme) => format!("I'm {}, currently studying {}.", name, programme),
            None => format!("I'm {}, a student at {}.", name, self.domain.institution.name),
        };

        let time_context = if five_w_one_h.when == DEFAULT_WHEN {
            "I've been dealing with this recently".to_string()
        } else {
            format!("This started {}", five_w_one_h.when.to_lowercase())
        };
        let impact = if five_w_one_h.why == DEFAULT_WHY {
            "and it's affecting my ability to continue with my studies effectively".to_string()
        } else {
            format!("and {}", five_w_one_h.why.to_lowercase())
        };
        let what_needed = if five_w_one_h.how == DEFAULT_HOW {
            "I'd really appreciate your guidance and assistance in resolving this matter.".to_string()
        } else {
            five_w_one_h.how.clone()
        };

        let mut paragraphs = vec![
            format!("Hi {} Team,", department.name),
            template.opening.replace("{what}", message),
            format!("{} My student ID is {}.", student_intro, student_id),
            format!("{}, {}. {}", time_context, impact, what_needed),
        ];
        if let Some(details) = detail_lines(&request.slots) {
            paragraphs.push(details);
        }
        paragraphs.push(template.closing.to_string());
        paragraphs.push(format!("{}\n{}", template.signoff, name));
        let body = paragraphs.join("\n\n");

        tracing::debug!(
            department = %department.name,
            template = ?template_type,
            "Email drafted"
        );

        Ok(EmailDraft {
            to: department.email.clone(),
            subject,
            body,
            five_w_one_h,
            template_type,
            department: department.name.clone(),
        })
    }
}

#[async_trait]
impl EmailDrafter for TemplateEmailDrafter {
    async fn draft(&self, request: &EmailRequest) -> Result<EmailDraft> {
        self.compose(request)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn five_w_one_h(request: &EmailRequest, department: &str) -> FiveWOneH {
    let student = &request.student;
    let classification = &request.classification;
    let slot = |key: &str| {
        request
            .slots
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let mut who = format!(
        "{} (Student ID: {}",
        non_blank(&student.full_name).unwrap_or(DEFAULT_NAME),
        non_blank(&student.student_id).unwrap_or(DEFAULT_STUDENT_ID)
    );
    if let Some(programme) = non_blank(&student.programme) {
        who.push_str(&format!(", studying {}", programme));
    }
    who.push(')');

    let what = [
        &classification.specific_issue,
        &classification.subcategory,
        &classification.category,
    ]
    .into_iter()
    .map(|s| s.trim())
    .find(|s| !s.is_empty())
    .unwrap_or("my inquiry")
    .to_string();

    FiveWOneH {
        who,
        what,
        when: slot("when").unwrap_or_else(|| DEFAULT_WHEN.to_string()),
        where_: slot("where").unwrap_or_else(|| format!("the {} department", department)),
        why: slot("why").unwrap_or_else(|| DEFAULT_WHY.to_string()),
        how: slot("how").unwrap_or_else(|| DEFAULT_HOW.to_string()),
    }
}

/// Slots already phrased into the body sentence
const INLINE_SLOTS: &[&str] = &["when", "why", "how"];

/// Remaining answered slots as a bullet list
fn detail_lines(slots: &BTreeMap<String, String>) -> Option<String> {
    let lines: Vec<String> = slots
        .iter()
        .filter(|(key, _)| !INLINE_SLOTS.contains(&key.as_str()))
        .map(|(key, value)| (key, value.trim()))
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("- {}: {}", slot_label(key), value))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(format!("A few more details:\n{}", lines.join("\n")))
    }
}

/// `location_preference` → `Location preference`
fn slot_label(key: &str) -> String {
    let spaced = key.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Subject text: the cleaned message when it says enough, else the classification
fn subject_issue(message: &str, classification: &ProblemClassification) -> String {
    if message.chars().count() > 10 {
        let cleaned = message
            .replace(['\'', '"'], "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let len = cleaned.chars().count();
        if len > 5 {
            if len > SUBJECT_MAX_CHARS {
                let mut short: String = cleaned.chars().take(SUBJECT_MAX_CHARS - 3).collect();
                short.push_str("...");
                return short;
            }
            return cleaned;
        }
    }

    [&classification.specific_issue, &classification.subcategory]
        .into_iter()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or("my inquiry")
        .to_string()
}
