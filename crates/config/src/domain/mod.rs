//! Domain configuration
//!
//! Everything that is specific to one institution: the problem taxonomy,
//! the departments problems are routed to, emergency contacts and the
//! follow-up questions asked after a topic is picked. Built-in defaults
//! cover a generic UK university; a YAML/JSON/TOML file can replace any
//! section.

mod contacts;
mod taxonomy;

pub use contacts::{Department, EmergencyContact, UrgentContact};
pub use taxonomy::{TaxonomyCategory, TaxonomySubcategory};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::ConfigError;

/// A follow-up question and the slot its answer fills
///
/// In config files a bare string is accepted as a question without a slot
/// key; its answer then lands under `q<n>_answer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "FollowupSource")]
pub struct FollowupQuestion {
    pub text: String,
    /// `when`, `where`, `why`, `how` feed the email summary directly
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot_key: Option<String>,
}

impl FollowupQuestion {
    pub fn new(text: impl Into<String>, slot_key: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            slot_key: Some(slot_key.into()),
        }
    }

    /// Slot for the answer to the question at `index` in its list
    pub fn slot(&self, index: usize) -> String {
        self.slot_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("q{}_answer", index + 1))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FollowupSource {
    Text(String),
    Keyed {
        text: String,
        #[serde(default, alias = "slot_key")]
        #[serde(rename = "slotKey")]
        slot_key: Option<String>,
    },
}

impl From<FollowupSource> for FollowupQuestion {
    fn from(source: FollowupSource) -> Self {
        match source {
            FollowupSource::Text(text) => Self { text, slot_key: None },
            FollowupSource::Keyed { text, slot_key } => Self { text, slot_key },
        }
    }
}

/// Institution identity used in prompts and generated addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstitutionConfig {
    pub name: String,
    pub email_domain: String,
    pub website: String,
}

impl Default for InstitutionConfig {
    fn default() -> Self {
        Self {
            name: "the University".to_string(),
            email_domain: "university.ac.uk".to_string(),
            website: "https://www.university.ac.uk".to_string(),
        }
    }
}

/// Institution-specific data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomainConfig {
    pub institution: InstitutionConfig,
    /// Ordered category → subcategory → issues tree
    pub taxonomy: Vec<TaxonomyCategory>,
    pub departments: Vec<Department>,
    /// Used when a category maps to no department
    pub fallback_department: Department,
    pub emergency_contacts: Vec<EmergencyContact>,
    /// Follow-up questions keyed by topic key (`accommodation`, `fees_payment`, ...)
    pub followup_questions: BTreeMap<String, Vec<FollowupQuestion>>,
    pub default_followup_questions: Vec<FollowupQuestion>,
}

impl Default for DomainConfig {
    fn default() -> Self {
        let institution = InstitutionConfig::default();
        Self {
            taxonomy: taxonomy::default_taxonomy(),
            departments: contacts::default_departments(
                &institution.email_domain,
                &institution.website,
            ),
            fallback_department: contacts::default_fallback_department(&institution.email_domain),
            emergency_contacts: contacts::default_emergency_contacts(),
            followup_questions: default_followup_questions(),
            default_followup_questions: questions(&[
                ("Could you provide more details about your situation?", "details"),
                ("What have you already tried?", "tried"),
                ("When do you need this resolved?", "deadline"),
            ]),
            institution,
        }
    }
}

impl DomainConfig {
    /// Load from a file, picking the format from the extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::FileNotFound(format!("{}: {}", path.display(), e))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("yaml")
            .to_lowercase();

        let config: DomainConfig = match extension.as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| {
                ConfigError::ParseError(format!("{}: {}", path.display(), e))
            })?,
            "toml" => toml::from_str(&content).map_err(|e| {
                ConfigError::ParseError(format!("{}: {}", path.display(), e))
            })?,
            _ => serde_yaml::from_str(&content).map_err(|e| {
                ConfigError::ParseError(format!("{}: {}", path.display(), e))
            })?,
        };

        Ok(config)
    }

    /// Load from `path` when it exists, otherwise use the built-in defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || !path.exists() {
            tracing::info!(path = %path.display(), "Domain config not found, using built-in defaults");
            return Ok(Self::default());
        }

        let config = Self::load(path)?;
        for problem in config.validate() {
            tracing::warn!(path = %path.display(), problem = %problem, "Domain config problem");
        }
        tracing::info!(
            path = %path.display(),
            categories = config.taxonomy.len(),
            departments = config.departments.len(),
            "Loaded domain config"
        );
        Ok(config)
    }

    /// Human-readable list of problems; empty when the config is usable
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.taxonomy.is_empty() {
            problems.push("taxonomy has no categories".to_string());
        }

        let mut seen = HashSet::new();
        for category in &self.taxonomy {
            if !seen.insert(category.name.to_lowercase()) {
                problems.push(format!("duplicate category '{}'", category.name));
            }
            if category.subcategories.is_empty() {
                problems.push(format!("category '{}' has no subcategories", category.name));
            }
            for sub in &category.subcategories {
                if sub.issues.is_empty() {
                    problems.push(format!(
                        "subcategory '{} / {}' has no issues",
                        category.name, sub.name
                    ));
                }
            }
        }

        let mut keys = HashSet::new();
        for dept in self.departments.iter().chain(std::iter::once(&self.fallback_department)) {
            if !keys.insert(dept.key.as_str()) {
                problems.push(format!("duplicate department key '{}'", dept.key));
            }
            if !dept.email.contains('@') {
                problems.push(format!(
                    "department '{}' has an invalid email '{}'",
                    dept.name, dept.email
                ));
            }
        }

        for category in &self.taxonomy {
            if self.department_for_category(&category.name).is_none() {
                problems.push(format!(
                    "category '{}' is not handled by any department",
                    category.name
                ));
            }
        }

        if self.default_followup_questions.is_empty() {
            problems.push("default_followup_questions is empty".to_string());
        }

        problems
    }

    /// Category names in taxonomy order
    pub fn categories(&self) -> Vec<&str> {
        self.taxonomy.iter().map(|c| c.name.as_str()).collect()
    }

    /// Case-insensitive category lookup
    pub fn category(&self, name: &str) -> Option<&TaxonomyCategory> {
        self.taxonomy
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Subcategory names of a category (empty when unknown)
    pub fn subcategories(&self, category: &str) -> Vec<&str> {
        self.category(category)
            .map(|c| c.subcategories.iter().map(|s| s.name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Specific issues of a subcategory (empty when unknown)
    pub fn issues(&self, category: &str, subcategory: &str) -> &[String] {
        self.category(category)
            .and_then(|c| c.subcategory(subcategory))
            .map(|s| s.issues.as_slice())
            .unwrap_or(&[])
    }

    pub fn department(&self, key: &str) -> Option<&Department> {
        self.departments.iter().find(|d| d.key == key)
    }

    /// Department handling a taxonomy category
    pub fn department_for_category(&self, category: &str) -> Option<&Department> {
        let category = category.trim();
        self.departments
            .iter()
            .find(|d| d.categories.iter().any(|c| c.eq_ignore_ascii_case(category)))
    }

    /// Department for a category, or the fallback department
    pub fn department_or_fallback(&self, category: &str) -> &Department {
        self.department_for_category(category)
            .unwrap_or(&self.fallback_department)
    }

    /// Follow-up questions for a topic key, or the default list
    pub fn followups_for(&self, topic_key: &str) -> &[FollowupQuestion] {
        self.followup_questions
            .get(topic_key)
            .filter(|q| !q.is_empty())
            .unwrap_or(&self.default_followup_questions)
    }
}

fn questions(items: &[(&str, &str)]) -> Vec<FollowupQuestion> {
    items
        .iter()
        .map(|(text, slot)| FollowupQuestion::new(*text, *slot))
        .collect()
}

fn default_followup_questions() -> BTreeMap<String, Vec<FollowupQuestion>> {
    let entries: [(&str, &[(&str, &str)]); 8] = [
        (
            "course_enrollment",
            &[
                ("What course or programme are you trying to enrol in?", "programme"),
                (
                    "Are you having trouble with the enrolment system or do you have questions about the application process?",
                    "enrolment_problem",
                ),
                ("What is your student ID or email address?", "contact"),
            ],
        ),
        (
            "course_change",
            &[
                ("Which course are you currently enrolled in?", "current_course"),
                ("What course do you want to change to?", "requested_course"),
                ("What is your reason for changing courses?", "why"),
            ],
        ),
        (
            "academic_support",
            &[
                ("What subject or module are you having difficulty with?", "module"),
                ("Have you attended the relevant module sessions?", "attendance"),
                ("What specific topics do you need help with?", "how"),
            ],
        ),
        (
            "accommodation",
            &[
                ("Are you looking for on-campus or off-campus accommodation?", "where"),
                ("What is your budget range?", "budget"),
                ("Do you have any specific location preferences?", "location_preference"),
            ],
        ),
        (
            "fees_payment",
            &[
                (
                    "What is your query related to? (tuition fees, payment plan, refund, etc.)",
                    "fee_type",
                ),
                ("Have you already set up a payment plan?", "payment_plan"),
                ("When do you need this resolved?", "deadline"),
            ],
        ),
        (
            "attendance_issue",
            &[
                ("Which module or course is this related to?", "module"),
                ("How many sessions have you missed?", "missed_sessions"),
                ("What is the reason for your absence?", "why"),
            ],
        ),
        (
            "graduation",
            &[
                ("When are you expecting to graduate?", "expected_graduation"),
                ("Have you completed all your modules?", "modules_completed"),
                ("Do you have any outstanding academic requirements?", "outstanding_requirements"),
            ],
        ),
        (
            "career_support",
            &[
                (
                    "What type of career support do you need? (CV, interview prep, job search, etc.)",
                    "how",
                ),
                ("What field or industry are you interested in?", "field"),
                ("Are you looking for internship or graduate positions?", "role_type"),
            ],
        ),
    ];

    entries
        .into_iter()
        .map(|(key, items)| (key.to_string(), questions(items)))
        .collect()
}
