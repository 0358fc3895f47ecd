//! Problem classification
//!
//! Maps a student's message onto the three-level taxonomy
//! (category → subcategory → specific issue) with a confidence, an urgency
//! and the department that should handle it.
//!
//! The primary path asks the language model for a JSON object. Models tend
//! to wrap JSON in prose, so the outermost `{...}` span is cut out with a
//! regex before parsing; this is a bounded best-effort step, not a general
//! JSON extractor. Any provider error or unusable output drops to a
//! deterministic keyword classifier that cannot fail.

use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use campus_assist_config::{constants::dialogue, DomainConfig, Department};
use campus_assist_core::{
    classification::GENERAL_CATEGORY, CompletionOptions, GenerateRequest, LanguageModel, Message,
    ProblemClassification, UrgencyLevel,
};

use crate::AgentError;

/// Subcategory used when none could be determined
pub const GENERAL_SUBCATEGORY: &str = "General Inquiry";

/// Confidence assumed when the model omits one
const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Characters of the message used as the specific issue when none is given
const ISSUE_PREFIX_CHARS: usize = 50;

static JSON_SPAN: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}"));

/// LLM-backed classifier with keyword fallback
pub struct ProblemClassifier {
    llm: Option<Arc<dyn LanguageModel>>,
    domain: Arc<DomainConfig>,
}

impl ProblemClassifier {
    pub fn new(llm: Arc<dyn LanguageModel>, domain: Arc<DomainConfig>) -> Self {
        Self {
            llm: Some(llm),
            domain,
        }
    }

    /// Classifier that only uses keyword matching
    pub fn keyword_only(domain: Arc<DomainConfig>) -> Self {
        Self { llm: None, domain }
    }

    pub fn domain(&self) -> &DomainConfig {
        &self.domain
    }

    /// Classify a message, optionally with prior conversation lines
    ///
    /// Never fails: every error path ends in [`fallback_classification`].
    pub async fn classify(&self, message: &str, history: &[String]) -> ProblemClassification {
        let Some(llm) = &self.llm else {
            return self.fallback(message, "no_model");
        };

        let start = Instant::now();
        let request = self.build_request(message, history);
        let outcome = match llm.generate(request).await {
            Ok(response) => parse_classification(&response.text, message, &self.domain),
            Err(e) => {
                metrics::counter!("campus_assist_provider_failures_total", "component" => "classifier")
                    .increment(1);
                Err(AgentError::Llm(e.to_string()))
            },
        };

        match outcome {
            Ok(classification) => {
                tracing::debug!(
                    category = %classification.category,
                    subcategory = %classification.subcategory,
                    confidence = classification.confidence,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Problem classified"
                );
                classification
            },
            Err(e) => {
                tracing::warn!(error = %e, "Classification failed, using keyword fallback");
                let reason = match e {
                    AgentError::Llm(_) => "provider",
                    _ => "malformed",
                };
                self.fallback(message, reason)
            },
        }
    }

    /// [`classify`](Self::classify) bounded by a deadline
    ///
    /// Past the deadline the keyword fallback answers instead.
    pub async fn classify_within(
        &self,
        message: &str,
        history: &[String],
        deadline: tokio::time::Instant,
    ) -> ProblemClassification {
        match tokio::time::timeout_at(deadline, self.classify(message, history)).await {
            Ok(classification) => classification,
            Err(_) => {
                tracing::warn!("Classification ran past the turn deadline, using keyword fallback");
                self.fallback(message, "deadline")
            },
        }
    }

    fn fallback(&self, message: &str, reason: &'static str) -> ProblemClassification {
        metrics::counter!("campus_assist_classifier_fallbacks_total", "reason" => reason).increment(1);
        fallback_classification(message, &self.domain)
    }

    fn build_request(&self, message: &str, history: &[String]) -> GenerateRequest {
        let prompt = build_prompt(&self.domain, message, history);
        GenerateRequest::from_messages(
            vec![Message::user(prompt)],
            CompletionOptions {
                temperature: dialogue::CLASSIFIER_TEMPERATURE,
                max_tokens: dialogue::CLASSIFIER_MAX_TOKENS,
                stream: false,
            },
        )
    }

    /// Top-level categories in taxonomy order
    pub fn categories(&self) -> Vec<&str> {
        self.domain.categories()
    }

    pub fn subcategories(&self, category: &str) -> Vec<&str> {
        self.domain.subcategories(category)
    }

    pub fn issues(&self, category: &str, subcategory: &str) -> &[String] {
        self.domain.issues(category, subcategory)
    }

    /// Department handling a category, or the fallback department
    pub fn department_info(&self, category: &str) -> &Department {
        self.domain.department_or_fallback(category)
    }
}

/// Render the taxonomy as `Category:\n    Sub: issue, issue` blocks
fn render_taxonomy(domain: &DomainConfig) -> String {
    domain
        .taxonomy
        .iter()
        .map(|category| {
            let subs: Vec<String> = category
                .subcategories
                .iter()
                .map(|sub| format!("    {}: {}", sub.name, sub.issues.join(", ")))
                .collect();
            format!("{}:\n{}", category.name, subs.join("\n"))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn build_prompt(domain: &DomainConfig, message: &str, history: &[String]) -> String {
    let recent_start = history.len().saturating_sub(dialogue::CLASSIFIER_HISTORY);
    let history_block = if history.is_empty() {
        String::new()
    } else {
        format!(
            "Previous messages in conversation:\n{}",
            history[recent_start..].join("\n")
        )
    };

    format!(
        "You are a problem classification system for {institution} student support.\n\n\
         Analyze the student's message and classify their problem into exactly 3 levels:\n\
         1. Category (main topic)\n\
         2. Subcategory (specific area within the topic)\n\
         3. Specific Issue (the exact problem)\n\n\
         Also assess:\n\
         - Confidence (0.0 to 1.0)\n\
         - Urgency: \"low\", \"medium\", \"high\", or \"critical\"\n\n\
         Here is the problem taxonomy:\n\n\
         {taxonomy}\n\n\
         Student's message: \"{message}\"\n\n\
         {history_block}\n\n\
         Respond in this exact JSON format only, no other text:\n\
         {{\n  \"category\": \"...\",\n  \"subcategory\": \"...\",\n  \"specificIssue\": \"...\",\n  \
         \"confidence\": 0.0,\n  \"urgencyLevel\": \"low\"\n}}",
        institution = domain.institution.name,
        taxonomy = render_taxonomy(domain),
    )
}

/// Outermost `{...}` span of a model response
fn extract_json_span(text: &str) -> Option<&str> {
    JSON_SPAN.as_ref().ok()?.find(text).map(|m| m.as_str())
}

/// Interpret a model response as a classification
///
/// Missing fields take defaults; confidence is clamped to [0, 1] and an
/// unknown urgency becomes medium.
pub(crate) fn parse_classification(
    response: &str,
    message: &str,
    domain: &DomainConfig,
) -> Result<ProblemClassification, AgentError> {
    let span = extract_json_span(response)
        .ok_or_else(|| AgentError::Classification("no JSON object in model output".to_string()))?;
    let value: Value = serde_json::from_str(span)
        .map_err(|e| AgentError::Classification(format!("invalid JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| AgentError::Classification("model output is not an object".to_string()))?;

    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let category = match text("category") {
        Some(name) => domain
            .category(name)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| name.to_string()),
        None => GENERAL_CATEGORY.to_string(),
    };
    let subcategory = text("subcategory").unwrap_or(GENERAL_SUBCATEGORY).to_string();
    let specific_issue = text("specificIssue")
        .map(str::to_string)
        .unwrap_or_else(|| issue_prefix(message));

    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c as f32)
        .filter(|c| c.is_finite())
        .unwrap_or(DEFAULT_CONFIDENCE)
        .clamp(0.0, 1.0);

    let urgency_level = text("urgencyLevel")
        .and_then(UrgencyLevel::parse)
        .unwrap_or_default();

    let suggested_department = domain.department_or_fallback(&category).name.clone();

    Ok(ProblemClassification {
        category,
        subcategory,
        specific_issue,
        confidence,
        suggested_department,
        urgency_level,
    })
}

fn issue_prefix(message: &str) -> String {
    message.chars().take(ISSUE_PREFIX_CHARS).collect()
}

struct KeywordBucket {
    terms: &'static [&'static str],
    category: &'static str,
    subcategory: &'static str,
    urgency: UrgencyLevel,
}

/// Checked in order; the first bucket with a matching term wins
const BUCKETS: &[KeywordBucket] = &[
    KeywordBucket {
        terms: &["accommodation", "room", "hall"],
        category: "Accommodation",
        subcategory: GENERAL_SUBCATEGORY,
        urgency: UrgencyLevel::Medium,
    },
    KeywordBucket {
        terms: &["fee", "pay", "money", "scholarship"],
        category: "Fees & Finance",
        subcategory: GENERAL_SUBCATEGORY,
        urgency: UrgencyLevel::Medium,
    },
    KeywordBucket {
        terms: &["visa", "international", "cas"],
        category: "International Students",
        subcategory: "Visa & Immigration",
        urgency: UrgencyLevel::High,
    },
    KeywordBucket {
        terms: &["mental", "counsell", "wellbeing", "stress"],
        category: "Health & Wellbeing",
        subcategory: "Mental Health",
        urgency: UrgencyLevel::High,
    },
    KeywordBucket {
        terms: &["id card", "student card", "enrol"],
        category: "Student ID & Registration",
        subcategory: GENERAL_SUBCATEGORY,
        urgency: UrgencyLevel::Medium,
    },
];

const BUCKET_CONFIDENCE: f32 = 0.6;
const GENERAL_CONFIDENCE: f32 = 0.3;

/// Deterministic keyword classification
pub fn fallback_classification(message: &str, domain: &DomainConfig) -> ProblemClassification {
    let lower = message.to_lowercase();

    let Some(bucket) = BUCKETS
        .iter()
        .find(|b| b.terms.iter().any(|t| lower.contains(t)))
    else {
        return ProblemClassification {
            category: GENERAL_CATEGORY.to_string(),
            subcategory: GENERAL_SUBCATEGORY.to_string(),
            specific_issue: issue_prefix(message),
            confidence: GENERAL_CONFIDENCE,
            suggested_department: domain.fallback_department.name.clone(),
            urgency_level: UrgencyLevel::Low,
        };
    };

    // Crisis language on a wellbeing topic is escalated
    let urgency_level = if bucket.category == "Health & Wellbeing"
        && (lower.contains("crisis") || lower.contains("urgent"))
    {
        UrgencyLevel::Critical
    } else {
        bucket.urgency
    };

    ProblemClassification {
        category: bucket.category.to_string(),
        subcategory: bucket.subcategory.to_string(),
        specific_issue: issue_prefix(message),
        confidence: BUCKET_CONFIDENCE,
        suggested_department: domain.department_or_fallback(bucket.category).name.clone(),
        urgency_level,
    }
}
