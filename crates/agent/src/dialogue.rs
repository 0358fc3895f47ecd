//! Dialogue state machine
//!
//! Drives a support conversation through `initial → asking_followup →
//! confirming → completed`. Every action runs under the session's lock:
//! the state is read once, mutated in memory and written back once.
//!
//! Collaborator failures never escape as errors. A retrieval failure
//! degrades to "no info found" guidance, a completion failure returns an
//! apology without advancing the phase, and a drafting failure still
//! completes the conversation with a fallback message.

use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use campus_assist_config::{constants::dialogue, constants::rag, DialogueConfig, DomainConfig};
use campus_assist_core::{
    CompletionOptions, EmailDrafter, EmailRequest, Error, GenerateRequest, LanguageModel, Phase,
    ProblemClassification, Result, Retriever, SearchResult, SessionState, SessionStore,
    SessionSummary, StreamChunk, StudentInfo, TurnRole,
};
use campus_assist_llm::PromptBuilder;
use campus_assist_rag::context::{build_context, NO_INFO_FOUND};

use crate::classifier::ProblemClassifier;
use crate::contacts::{ContactDirectory, QuickContact};
use crate::drafter::TemplateEmailDrafter;
use crate::store::SessionLockMap;

const TROUBLE_MESSAGE: &str =
    "I'm having trouble answering right now. Could you try asking your question again in a moment?";
const CLARIFY_MESSAGE: &str =
    "No problem! Let me ask more questions to better understand your situation. What additional details can you provide?";

/// Words accepted as a "yes" to the confirmation prompt
const AFFIRMATIVE: &[&str] = &["yes", "y", "yeah", "yep", "correct", "confirm"];

/// Any of these turns an answer into a "no", whatever else it says
const NEGATIVE: &[&str] = &[
    "no", "n", "not", "nope", "nah", "wrong", "incorrect", "don't", "dont", "isn't", "isnt",
];

/// Owned stream of answer deltas
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send + 'static>>;

/// Inbound event tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionType {
    Start,
    SelectCategory,
    #[default]
    Message,
    Confirmation,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Start => "start",
            ActionType::SelectCategory => "selectCategory",
            ActionType::Message => "message",
            ActionType::Confirmation => "confirmation",
        }
    }
}

/// Chat action request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRequest {
    pub action_type: ActionType,
    #[serde(alias = "conversationId")]
    pub session_id: Option<String>,
    #[serde(alias = "message")]
    pub user_message: Option<String>,
    pub category_key: Option<String>,
    /// Display text for the category
    pub category_title: Option<String>,
    pub subcategory_key: Option<String>,
    pub student_info: Option<StudentInfo>,
}

impl ChatRequest {
    pub fn start() -> Self {
        Self {
            action_type: ActionType::Start,
            ..Default::default()
        }
    }

    pub fn select_category(session_id: &str, category_key: &str) -> Self {
        Self {
            action_type: ActionType::SelectCategory,
            session_id: Some(session_id.to_string()),
            category_key: Some(category_key.to_string()),
            ..Default::default()
        }
    }

    pub fn message(session_id: &str, text: &str) -> Self {
        Self {
            action_type: ActionType::Message,
            session_id: Some(session_id.to_string()),
            user_message: Some(text.to_string()),
            ..Default::default()
        }
    }

    pub fn confirmation(session_id: &str, answer: &str) -> Self {
        Self {
            action_type: ActionType::Confirmation,
            ..Self::message(session_id, answer)
        }
    }

    fn text(&self) -> Option<&str> {
        self.user_message
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// A source document cited by an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
    pub category: String,
    pub score: f32,
}

impl From<&SearchResult> for SourceRef {
    fn from(result: &SearchResult) -> Self {
        Self {
            title: result.document.title.clone(),
            url: result.document.url.clone(),
            category: result.category.clone(),
            score: result.score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationOption {
    pub id: String,
    pub label: String,
    pub value: String,
}

impl ConfirmationOption {
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                id: "yes".to_string(),
                label: "Yes, that's correct".to_string(),
                value: "yes".to_string(),
            },
            Self {
                id: "no".to_string(),
                label: "No, let me clarify".to_string(),
                value: "no".to_string(),
            },
        ]
    }
}

/// One assistant message in a response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotMessage {
    pub role: TurnRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_needed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmation_options: Option<Vec<ConfirmationOption>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_generated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followup_questions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<SourceRef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ProblemClassification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<QuickContact>,
}

impl BotMessage {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            confirmation_needed: None,
            confirmation_options: None,
            email_generated: None,
            email_content: None,
            followup_questions: None,
            sources: None,
            classification: None,
            contact: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseState {
    pub phase: Phase,
    pub selected_top_category_key: Option<String>,
    pub message_count: usize,
}

impl From<&SessionState> for ResponseState {
    fn from(state: &SessionState) -> Self {
        Self {
            phase: state.phase,
            selected_top_category_key: state.selected_top_category_key.clone(),
            message_count: state.messages.len(),
        }
    }
}

/// Chat action response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub session_id: String,
    pub bot_messages: Vec<BotMessage>,
    pub state: ResponseState,
}

impl ChatResponse {
    fn new(session_id: String, state: &SessionState, message: BotMessage) -> Self {
        Self {
            session_id,
            bot_messages: vec![message],
            state: ResponseState::from(state),
        }
    }
}

/// The dialogue engine
pub struct DialogueEngine {
    llm: Arc<dyn LanguageModel>,
    retriever: Arc<dyn Retriever>,
    store: Arc<dyn SessionStore>,
    classifier: Arc<ProblemClassifier>,
    drafter: Arc<dyn EmailDrafter>,
    contacts: ContactDirectory,
    domain: Arc<DomainConfig>,
    locks: Arc<SessionLockMap>,
    config: DialogueConfig,
    chat_limit: usize,
}

impl DialogueEngine {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        retriever: Arc<dyn Retriever>,
        store: Arc<dyn SessionStore>,
        domain: Arc<DomainConfig>,
        config: DialogueConfig,
    ) -> Self {
        Self {
            classifier: Arc::new(ProblemClassifier::new(llm.clone(), domain.clone())),
            drafter: Arc::new(TemplateEmailDrafter::new(domain.clone())),
            contacts: ContactDirectory::new(domain.clone()),
            llm,
            retriever,
            store,
            domain,
            locks: Arc::new(SessionLockMap::new()),
            config,
            chat_limit: rag::CHAT_LIMIT,
        }
    }

    pub fn with_drafter(mut self, drafter: Arc<dyn EmailDrafter>) -> Self {
        self.drafter = drafter;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<ProblemClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_chat_limit(mut self, limit: usize) -> Self {
        self.chat_limit = limit.max(1);
        self
    }

    pub fn classifier(&self) -> &Arc<ProblemClassifier> {
        &self.classifier
    }

    pub fn drafter(&self) -> &Arc<dyn EmailDrafter> {
        &self.drafter
    }

    pub fn contacts(&self) -> &ContactDirectory {
        &self.contacts
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    pub fn llm(&self) -> &Arc<dyn LanguageModel> {
        &self.llm
    }

    /// Handle one chat action for a client
    pub async fn handle(&self, request: ChatRequest, client_identifier: &str) -> Result<ChatResponse> {
        metrics::counter!("campus_assist_chat_actions_total", "action" => request.action_type.as_str())
            .increment(1);

        let session_id = request
            .session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let _permit = self.locks.acquire(&session_id).await?;
        if request.action_type == ActionType::Start {
            return self.start(session_id, &request, client_identifier).await;
        }

        let mut state = self.load_or_create(&session_id, client_identifier).await?;
        if let Some(info) = &request.student_info {
            state.student_info.merge(info);
        }

        let message = match request.action_type {
            ActionType::Start => BotMessage::assistant(self.config.greeting.clone()),
            ActionType::SelectCategory => self.select_category(&mut state, &request)?,
            ActionType::Confirmation if state.phase == Phase::Confirming => {
                let answer = request.text().ok_or_else(|| {
                    Error::InvalidRequest("confirmation requires an answer".to_string())
                })?;
                self.confirm(&mut state, answer).await
            },
            // A confirmation outside the confirming phase is an ordinary message
            ActionType::Message | ActionType::Confirmation => {
                let text = request
                    .text()
                    .ok_or_else(|| Error::InvalidRequest("message is required".to_string()))?;
                self.message(&mut state, text).await
            },
        };

        self.store.put(&session_id, state.clone()).await?;
        tracing::debug!(
            session_id = %session_id,
            action = request.action_type.as_str(),
            phase = %state.phase,
            "Chat action handled"
        );
        Ok(ChatResponse::new(session_id, &state, message))
    }

    async fn start(
        &self,
        session_id: String,
        request: &ChatRequest,
        client_identifier: &str,
    ) -> Result<ChatResponse> {
        let mut state = SessionState::new(client_identifier);
        if let Some(info) = &request.student_info {
            state.student_info.merge(info);
        }
        state.push_assistant(self.config.greeting.clone());
        self.store.put(&session_id, state.clone()).await?;

        tracing::info!(session_id = %session_id, client = %client_identifier, "Session started");
        Ok(ChatResponse::new(
            session_id,
            &state,
            BotMessage::assistant(self.config.greeting.clone()),
        ))
    }

    async fn load_or_create(&self, session_id: &str, client_identifier: &str) -> Result<SessionState> {
        match self.store.get(session_id).await? {
            Some(state) => Ok(state),
            None => {
                tracing::info!(session_id = %session_id, "Session not found, starting a fresh one");
                Ok(SessionState::new(client_identifier))
            },
        }
    }

    fn select_category(&self, state: &mut SessionState, request: &ChatRequest) -> Result<BotMessage> {
        let key = request
            .category_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::InvalidRequest("categoryKey is required".to_string()))?;

        let title = request
            .category_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let display = title
            .map(str::to_string)
            .unwrap_or_else(|| key.replace('_', " "));

        let followups = self.domain.followups_for(key);
        let questions: Vec<String> = followups.iter().map(|q| q.text.clone()).collect();
        let bullets: Vec<String> = questions.iter().map(|q| format!("• {}", q)).collect();
        let reply = format!(
            "Great! I'll help you with {}. Let me ask a few questions to better understand your situation:\n\n{}",
            display,
            bullets.join("\n")
        );

        state.selected_top_category_key = Some(key.to_string());
        state.selected_subcategory_key = request.subcategory_key.clone();
        state.ask_slots(followups.iter().enumerate().map(|(i, q)| q.slot(i)));
        state.push_user(format!("I need help with: {}", title.unwrap_or(key)));
        state.push_assistant(reply.clone());
        transition(state, Phase::AskingFollowup);

        let mut message = BotMessage::assistant(reply);
        message.followup_questions = Some(questions);
        Ok(message)
    }

    async fn message(&self, state: &mut SessionState, text: &str) -> BotMessage {
        let deadline = self.turn_deadline();
        let history = state.recent_turns(self.config.history_window).to_vec();
        let results = match tokio::time::timeout_at(deadline, self.retrieve(text, state)).await {
            Ok(results) => results,
            Err(_) => {
                metrics::counter!("campus_assist_provider_failures_total", "component" => "retrieval")
                    .increment(1);
                tracing::warn!("Retrieval ran past the turn deadline, answering without context");
                Vec::new()
            },
        };
        let context = if results.is_empty() {
            NO_INFO_FOUND.to_string()
        } else {
            build_context(&results)
        };

        let request = PromptBuilder::new()
            .system_prompt(&self.domain.institution.name)
            .with_context(&context)
            .with_history(&history)
            .user_message(text)
            .build_request(answer_options());

        let answer = match tokio::time::timeout_at(deadline, self.generate(request)).await {
            Ok(answer) => answer,
            Err(_) => {
                metrics::counter!("campus_assist_provider_failures_total", "component" => "completion")
                    .increment(1);
                tracing::warn!(model = %self.llm.model_name(), "Completion ran past the turn deadline");
                None
            },
        };
        let Some(answer) = answer else {
            state.push_user(text);
            state.push_assistant(TROUBLE_MESSAGE);
            return BotMessage::assistant(TROUBLE_MESSAGE);
        };

        if state.phase == Phase::AskingFollowup {
            if let Some(slot) = state.fill_next_slot(text) {
                tracing::debug!(slot = %slot, "Follow-up answer recorded");
            }
        }

        let classification = self
            .classifier
            .classify_within(text, &state.history_lines(dialogue::CLASSIFIER_HISTORY), deadline)
            .await;

        state.push_user(text);
        state.push_assistant(answer.clone());
        state.original_message = Some(text.to_string());
        if !classification.is_generic() {
            state.selected_issue_key = Some(classification.specific_issue.clone());
        }
        state.last_classification = Some(classification.clone());

        let should_confirm = state.selected_top_category_key.is_some()
            && !classification.is_generic()
            && answer.chars().count() > self.config.confirm_min_response_chars;
        transition(
            state,
            if should_confirm {
                Phase::Confirming
            } else {
                Phase::AskingFollowup
            },
        );

        let mut message = BotMessage::assistant(answer);
        message.sources = Some(results.iter().map(SourceRef::from).collect());
        message.contact = Some(self.contacts.quick_contact(&classification.category));
        message.classification = Some(classification);
        if should_confirm {
            message.confirmation_needed = Some(true);
            message.confirmation_options = Some(ConfirmationOption::defaults());
        }
        message
    }

    async fn confirm(&self, state: &mut SessionState, answer: &str) -> BotMessage {
        if !is_affirmative(answer) {
            state.push_user(answer);
            state.push_assistant(CLARIFY_MESSAGE);
            transition(state, Phase::AskingFollowup);
            return BotMessage::assistant(CLARIFY_MESSAGE);
        }

        let topic = state
            .selected_top_category_key
            .clone()
            .unwrap_or_else(|| "my issue".to_string());
        let mut conversation = state.user_messages().join("\n");
        if conversation.trim().is_empty() {
            conversation = format!("I need help with {}", topic);
        }

        let classification = match state.last_classification.clone() {
            Some(c) => c,
            None => {
                self.classifier
                    .classify_within(&conversation, &[], self.turn_deadline())
                    .await
            },
        };

        let email_request = EmailRequest {
            student: state.student_info.clone(),
            classification,
            message: conversation,
            slots: state.collected_slots.clone(),
        };

        let (generated, content) = match self.drafter.draft(&email_request).await {
            Ok(draft) => (true, draft.to_display()),
            Err(e) => {
                tracing::warn!(error = %e, "Email drafting failed");
                (
                    false,
                    format!(
                        "Email generation failed. Please contact support with your issue about {}.",
                        topic
                    ),
                )
            },
        };

        let reply = format!(
            "Perfect! Here's the email draft:\n\n{}\n\nYou can copy this and send it to the appropriate department.",
            content
        );
        state.push_user(answer);
        state.push_assistant(reply.clone());
        state.email_generated = generated;
        state.email_content = Some(content.clone());
        transition(state, Phase::Completed);

        let mut message = BotMessage::assistant(reply);
        message.email_generated = Some(generated);
        message.email_content = Some(content);
        message
    }

    fn turn_deadline(&self) -> tokio::time::Instant {
        tokio::time::Instant::now() + Duration::from_secs(self.config.turn_timeout_secs)
    }

    /// Retrieval that degrades to no results
    async fn retrieve(&self, text: &str, state: &SessionState) -> Vec<SearchResult> {
        let query = match &state.selected_top_category_key {
            Some(key) => format!("{} ({})", text, key.replace('_', " ")),
            None => text.to_string(),
        };
        match self.retriever.search(&query, self.chat_limit).await {
            Ok(results) => results,
            Err(e) => {
                metrics::counter!("campus_assist_provider_failures_total", "component" => "retrieval")
                    .increment(1);
                tracing::warn!(error = %e, "Retrieval failed, answering without context");
                Vec::new()
            },
        }
    }

    /// Completion that degrades to `None`
    async fn generate(&self, request: GenerateRequest) -> Option<String> {
        let start = Instant::now();
        let outcome = self.llm.generate(request).await;
        metrics::histogram!("campus_assist_completion_seconds").record(start.elapsed().as_secs_f64());

        match outcome {
            Ok(response) if !response.text.trim().is_empty() => Some(response.text.trim().to_string()),
            Ok(_) => {
                tracing::warn!(model = %self.llm.model_name(), "Empty completion");
                None
            },
            Err(e) => {
                metrics::counter!("campus_assist_provider_failures_total", "component" => "completion")
                    .increment(1);
                tracing::warn!(error = %e, model = %self.llm.model_name(), "Completion failed");
                None
            },
        }
    }

    /// Stream a grounded answer without touching session state
    ///
    /// History of `session_id` (when given and known) is included in the
    /// prompt. Dropping the returned stream stops the upstream completion.
    pub async fn answer_stream(&self, text: &str, session_id: Option<&str>) -> Result<AnswerStream> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidRequest("message is required".to_string()));
        }

        let state = match session_id {
            Some(id) => self.store.get(id).await?,
            None => None,
        };
        let state = state.unwrap_or_else(|| SessionState::new("stream"));

        let results = self.retrieve(text, &state).await;
        let options = CompletionOptions {
            stream: true,
            ..answer_options()
        };
        let request = PromptBuilder::new()
            .system_prompt(&self.domain.institution.name)
            .with_context(&build_context(&results))
            .with_history(state.recent_turns(self.config.history_window))
            .user_message(text)
            .build_request(options);

        let llm = self.llm.clone();
        let stream = async_stream::stream! {
            let mut upstream = llm.complete(request);
            while let Some(item) = upstream.next().await {
                let done = matches!(&item, Ok(chunk) if chunk.is_final) || item.is_err();
                yield item;
                if done {
                    break;
                }
            }
        };
        Ok(Box::pin(stream))
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionState>> {
        self.store.get(session_id).await
    }

    /// Delete a session
    ///
    /// The lock entry stays so requests queued behind the delete still
    /// serialize with newcomers; the idle sweep reclaims it later.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let deleted = {
            let _permit = self.locks.acquire(session_id).await?;
            self.store.delete(session_id).await?
        };
        if deleted {
            tracing::info!(session_id = %session_id, "Session deleted");
        }
        Ok(deleted)
    }

    /// Periodically forget per-session locks nobody holds or waits on
    ///
    /// Sending `true` on the returned channel stops the task.
    pub fn start_lock_sweeper(&self, every: Duration) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let locks = self.locks.clone();

        tokio::spawn(async move {
            let mut timer = tokio::time::interval(every);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        let removed = locks.prune_idle();
                        if removed > 0 {
                            tracing::debug!(
                                removed,
                                remaining = locks.session_count(),
                                "Swept idle session locks"
                            );
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::info!("Session lock sweeper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    /// Sessions owned by a client, most recent first
    pub async fn list_sessions(&self, client_identifier: &str) -> Result<Vec<SessionSummary>> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|s| s.client_identifier == client_identifier)
            .collect())
    }
}

fn answer_options() -> CompletionOptions {
    CompletionOptions {
        temperature: dialogue::ANSWER_TEMPERATURE,
        max_tokens: dialogue::ANSWER_MAX_TOKENS,
        stream: false,
    }
}

fn transition(state: &mut SessionState, target: Phase) {
    if state.phase.can_transition_to(target) {
        state.phase = target;
    } else {
        tracing::warn!(from = %state.phase, to = %target, "Ignoring invalid phase transition");
    }
}

fn is_affirmative(answer: &str) -> bool {
    let lower = answer.to_lowercase().replace('\u{2019}', "'");
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .collect();

    !words.iter().any(|w| NEGATIVE.contains(w)) && words.iter().any(|w| AFFIRMATIVE.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use campus_assist_core::{
        CompletionStream, Document, EmailDraft, FinishReason, Role,
    };
    use crate::store::InMemorySessionStore;
    use futures::stream;
    use parking_lot::Mutex;

    const LONG_ANSWER: &str = "Report the broken heater through the accommodation portal. \
                               More info: https://www.university.ac.uk/accommodation";

    /// Answers with a fixed text; classifier prompts get `classification`
    struct MockLlm {
        answer: String,
        classification: String,
        fail: bool,
        answer_delay: Option<Duration>,
        classify_delay: Option<Duration>,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl MockLlm {
        fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                classification: "not json".to_string(),
                fail: false,
                answer_delay: None,
                classify_delay: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new("")
            }
        }

        fn answer_requests(&self) -> Vec<GenerateRequest> {
            self.requests
                .lock()
                .iter()
                .filter(|r| r.messages.first().map(|m| m.role) == Some(Role::System))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl LanguageModel for MockLlm {
        fn complete<'a>(&'a self, request: GenerateRequest) -> CompletionStream<'a> {
            let is_answer = request.messages.first().map(|m| m.role) == Some(Role::System);
            self.requests.lock().push(request);
            if self.fail {
                return Box::pin(stream::iter(vec![Err(Error::ProviderUnavailable(
                    "connection refused".to_string(),
                ))]));
            }
            let text = if is_answer { self.answer.clone() } else { self.classification.clone() };
            let delay = if is_answer { self.answer_delay } else { self.classify_delay };
            Box::pin(async_stream::stream! {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(StreamChunk::text(text));
                yield Ok(StreamChunk::final_chunk(FinishReason::Stop));
            })
        }

        async fn is_available(&self) -> bool {
            !self.fail
        }

        fn model_name(&self) -> &str {
            "mock"
        }
    }

    struct MockRetriever {
        fail: bool,
    }

    #[async_trait]
    impl Retriever for MockRetriever {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchResult>> {
            if self.fail {
                return Err(Error::CorpusUnavailable("no embedded corpus loaded".to_string()));
            }
            Ok(vec![SearchResult {
                document: Document {
                    id: "halls-maintenance".to_string(),
                    title: "Reporting Maintenance Issues".to_string(),
                    content: "Use the accommodation portal to report repairs.".to_string(),
                    url: "https://www.university.ac.uk/accommodation".to_string(),
                    keywords: vec!["maintenance".to_string()],
                    category: "Accommodation".to_string(),
                },
                score: 0.82,
                category: "Accommodation".to_string(),
            }])
        }

        fn is_ready(&self) -> bool {
            !self.fail
        }
    }

    struct FailingDrafter;

    #[async_trait]
    impl EmailDrafter for FailingDrafter {
        async fn draft(&self, _request: &EmailRequest) -> Result<EmailDraft> {
            Err(Error::Internal("template missing".to_string()))
        }
    }

    fn engine_with(llm: Arc<MockLlm>, retriever_fails: bool) -> DialogueEngine {
        DialogueEngine::new(
            llm,
            Arc::new(MockRetriever { fail: retriever_fails }),
            Arc::new(InMemorySessionStore::new()),
            Arc::new(DomainConfig::default()),
            DialogueConfig::default(),
        )
    }

    fn engine(answer: &str) -> DialogueEngine {
        engine_with(Arc::new(MockLlm::new(answer)), false)
    }

    async fn confirming_session(engine: &DialogueEngine) -> String {
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;
        engine
            .handle(ChatRequest::select_category(&id, "accommodation"), "dev")
            .await
            .unwrap();
        let response = engine
            .handle(ChatRequest::message(&id, "The heater in my room is broken"), "dev")
            .await
            .unwrap();
        assert_eq!(response.state.phase, Phase::Confirming);
        id
    }

    #[tokio::test]
    async fn test_start_creates_independent_sessions() {
        let engine = engine(LONG_ANSWER);
        let a = engine.handle(ChatRequest::start(), "dev").await.unwrap();
        let b = engine.handle(ChatRequest::start(), "dev").await.unwrap();

        assert_ne!(a.session_id, b.session_id);
        assert_eq!(a.bot_messages[0].content, b.bot_messages[0].content);
        assert_eq!(a.bot_messages[0].content, DialogueConfig::default().greeting);
        assert_eq!(a.state.phase, Phase::Initial);
        assert_eq!(a.state.message_count, 1);
    }

    #[tokio::test]
    async fn test_select_category_asks_followups() {
        let engine = engine(LONG_ANSWER);
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;

        let mut request = ChatRequest::select_category(&id, "fees_payment");
        request.category_title = Some("Fees & Payment".to_string());
        let response = engine.handle(request, "dev").await.unwrap();

        assert_eq!(response.state.phase, Phase::AskingFollowup);
        assert_eq!(response.state.selected_top_category_key.as_deref(), Some("fees_payment"));
        let message = &response.bot_messages[0];
        assert!(message
            .content
            .starts_with("Great! I'll help you with Fees & Payment. Let me ask a few questions"));
        assert_eq!(message.followup_questions.as_ref().unwrap().len(), 3);
        assert!(message.content.contains("\n• Have you already set up a payment plan?"));

        let state = engine.get_session(&id).await.unwrap().unwrap();
        assert_eq!(state.pending_slots, vec!["fee_type", "payment_plan", "deadline"]);
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[1].content, "I need help with: Fees & Payment");
    }

    #[tokio::test]
    async fn test_select_category_without_key_is_rejected() {
        let engine = engine(LONG_ANSWER);
        let request = ChatRequest {
            action_type: ActionType::SelectCategory,
            ..Default::default()
        };
        assert!(matches!(
            engine.handle(request, "dev").await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_message_moves_to_confirming() {
        let engine = engine(LONG_ANSWER);
        let id = confirming_session(&engine).await;

        let state = engine.get_session(&id).await.unwrap().unwrap();
        assert_eq!(state.phase, Phase::Confirming);
        assert_eq!(state.last_classification.unwrap().category, "Accommodation");
        assert_eq!(state.original_message.as_deref(), Some("The heater in my room is broken"));
    }

    #[tokio::test]
    async fn test_message_response_carries_extras() {
        let engine = engine(LONG_ANSWER);
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;
        engine
            .handle(ChatRequest::select_category(&id, "accommodation"), "dev")
            .await
            .unwrap();
        let response = engine
            .handle(ChatRequest::message(&id, "The heater in my room is broken"), "dev")
            .await
            .unwrap();

        let message = &response.bot_messages[0];
        assert_eq!(message.content, LONG_ANSWER);
        assert_eq!(message.confirmation_needed, Some(true));
        assert_eq!(message.confirmation_options.as_ref().unwrap()[1].label, "No, let me clarify");
        assert_eq!(message.sources.as_ref().unwrap()[0].title, "Reporting Maintenance Issues");
        assert_eq!(message.contact.as_ref().unwrap().department, "Accommodation Office");
        assert_eq!(message.classification.as_ref().unwrap().category, "Accommodation");
    }

    #[tokio::test]
    async fn test_no_confirmation_without_category() {
        let engine = engine(LONG_ANSWER);
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;
        let response = engine
            .handle(ChatRequest::message(&id, "The heater in my room is broken"), "dev")
            .await
            .unwrap();

        assert_eq!(response.state.phase, Phase::AskingFollowup);
        assert!(response.bot_messages[0].confirmation_needed.is_none());
    }

    #[tokio::test]
    async fn test_no_confirmation_for_short_answer_or_generic_issue() {
        let short = engine("Contact the office.");
        let id = short.handle(ChatRequest::start(), "dev").await.unwrap().session_id;
        short
            .handle(ChatRequest::select_category(&id, "accommodation"), "dev")
            .await
            .unwrap();
        let response = short
            .handle(ChatRequest::message(&id, "The heater in my room is broken"), "dev")
            .await
            .unwrap();
        assert_eq!(response.state.phase, Phase::AskingFollowup);

        let generic = engine(LONG_ANSWER);
        let id = generic.handle(ChatRequest::start(), "dev").await.unwrap().session_id;
        generic
            .handle(ChatRequest::select_category(&id, "accommodation"), "dev")
            .await
            .unwrap();
        let response = generic
            .handle(ChatRequest::message(&id, "What time does the gym open?"), "dev")
            .await
            .unwrap();
        assert_eq!(response.state.phase, Phase::AskingFollowup);
    }

    #[tokio::test]
    async fn test_provider_failure_keeps_phase_and_message() {
        let engine = engine_with(Arc::new(MockLlm::failing()), false);
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;
        engine
            .handle(ChatRequest::select_category(&id, "accommodation"), "dev")
            .await
            .unwrap();

        let response = engine
            .handle(ChatRequest::message(&id, "My heater is broken"), "dev")
            .await
            .unwrap();
        assert_eq!(response.bot_messages[0].content, TROUBLE_MESSAGE);
        assert_eq!(response.state.phase, Phase::AskingFollowup);

        let state = engine.get_session(&id).await.unwrap().unwrap();
        assert_eq!(state.user_messages().last().copied(), Some("My heater is broken"));
        assert!(state.last_classification.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_completion_degrades_within_turn_deadline() {
        let llm = Arc::new(MockLlm {
            answer_delay: Some(Duration::from_secs(120)),
            ..MockLlm::new(LONG_ANSWER)
        });
        let engine = engine_with(llm, false);
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;
        engine
            .handle(ChatRequest::select_category(&id, "accommodation"), "dev")
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let response = engine
            .handle(ChatRequest::message(&id, "My heater is broken"), "dev")
            .await
            .unwrap();
        let budget = Duration::from_secs(DialogueConfig::default().turn_timeout_secs);
        assert!(started.elapsed() <= budget + Duration::from_secs(1));

        assert_eq!(response.bot_messages[0].content, TROUBLE_MESSAGE);
        assert_eq!(response.state.phase, Phase::AskingFollowup);
        let state = engine.get_session(&id).await.unwrap().unwrap();
        assert_eq!(state.user_messages().last().copied(), Some("My heater is broken"));
        // The unanswered follow-up stays pending for the retry
        assert_eq!(state.pending_slots.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_classifier_falls_back_within_turn_deadline() {
        let llm = Arc::new(MockLlm {
            answer_delay: Some(Duration::from_secs(30)),
            classify_delay: Some(Duration::from_secs(120)),
            ..MockLlm::new(LONG_ANSWER)
        });
        let engine = engine_with(llm, false);
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;
        engine
            .handle(ChatRequest::select_category(&id, "accommodation"), "dev")
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let response = engine
            .handle(ChatRequest::message(&id, "The heater in my room is broken"), "dev")
            .await
            .unwrap();
        let budget = Duration::from_secs(DialogueConfig::default().turn_timeout_secs);
        assert!(started.elapsed() <= budget + Duration::from_secs(1));

        assert_eq!(response.bot_messages[0].content, LONG_ANSWER);
        assert_eq!(
            response.bot_messages[0].classification.as_ref().unwrap().category,
            "Accommodation"
        );
        assert_eq!(response.state.phase, Phase::Confirming);
    }

    #[tokio::test]
    async fn test_followup_answers_fill_slots() {
        let engine = engine("Contact the office.");
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;
        engine
            .handle(ChatRequest::select_category(&id, "accommodation"), "dev")
            .await
            .unwrap();
        for answer in ["On-campus please", "Around £150 a week"] {
            let response = engine.handle(ChatRequest::message(&id, answer), "dev").await.unwrap();
            assert_eq!(response.state.phase, Phase::AskingFollowup);
        }

        let state = engine.get_session(&id).await.unwrap().unwrap();
        assert_eq!(state.collected_slots["where"], "On-campus please");
        assert_eq!(state.collected_slots["budget"], "Around £150 a week");
        assert_eq!(state.pending_slots, vec!["location_preference"]);
    }

    #[tokio::test]
    async fn test_followup_answers_reach_email() {
        let engine = engine(LONG_ANSWER);
        let id = confirming_session(&engine).await;

        let response = engine
            .handle(ChatRequest::confirmation(&id, "yes"), "dev")
            .await
            .unwrap();
        let email = response.bot_messages[0].email_content.as_ref().unwrap();
        assert!(email.contains("A few more details:\n- Where: The heater in my room is broken"));
    }

    #[tokio::test]
    async fn test_retrieval_failure_answers_without_context() {
        let llm = Arc::new(MockLlm::new(LONG_ANSWER));
        let engine = engine_with(llm.clone(), true);
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;

        let response = engine
            .handle(ChatRequest::message(&id, "Where is the library?"), "dev")
            .await
            .unwrap();
        assert_eq!(response.bot_messages[0].content, LONG_ANSWER);
        assert!(response.bot_messages[0].sources.as_ref().unwrap().is_empty());

        let requests = llm.answer_requests();
        assert!(requests[0].messages[0].content.contains(NO_INFO_FOUND));
        assert_eq!(requests[0].max_tokens, Some(dialogue::ANSWER_MAX_TOKENS));
    }

    #[tokio::test]
    async fn test_history_window_in_prompt() {
        let llm = Arc::new(MockLlm::new(LONG_ANSWER));
        let engine = engine_with(llm.clone(), false);
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;
        for text in ["first question", "second question", "third question", "fourth question"] {
            engine.handle(ChatRequest::message(&id, text), "dev").await.unwrap();
        }

        let requests = llm.answer_requests();
        let last = requests.last().unwrap();
        // system + 4 history turns + user
        assert_eq!(last.messages.len(), 6);
        assert_eq!(last.messages[5].content, "fourth question");
        assert!(!last.messages.iter().any(|m| m.content == "first question"));
    }

    #[tokio::test]
    async fn test_confirmation_yes_drafts_email() {
        let engine = engine(LONG_ANSWER);
        let id = confirming_session(&engine).await;

        let mut request = ChatRequest::confirmation(&id, "Yes");
        request.student_info = Some(StudentInfo {
            full_name: Some("Amara Okafor".to_string()),
            student_id: Some("S1234567".to_string()),
            programme: None,
        });
        let response = engine.handle(request, "dev").await.unwrap();

        assert_eq!(response.state.phase, Phase::Completed);
        let message = &response.bot_messages[0];
        assert_eq!(message.email_generated, Some(true));
        let email = message.email_content.as_ref().unwrap();
        assert!(email.contains("**To:** accommodation@university.ac.uk"));
        assert!(email.contains("My student ID is S1234567."));
        assert!(message.content.starts_with("Perfect! Here's the email draft:"));

        let state = engine.get_session(&id).await.unwrap().unwrap();
        assert!(state.email_generated);
    }

    #[tokio::test]
    async fn test_confirmation_no_returns_to_followup() {
        let engine = engine(LONG_ANSWER);
        let id = confirming_session(&engine).await;

        let response = engine
            .handle(ChatRequest::confirmation(&id, "no"), "dev")
            .await
            .unwrap();
        assert_eq!(response.state.phase, Phase::AskingFollowup);
        assert_eq!(response.bot_messages[0].content, CLARIFY_MESSAGE);

        // "yes" outside the confirming phase is just a message
        let response = engine
            .handle(ChatRequest::confirmation(&id, "yes"), "dev")
            .await
            .unwrap();
        assert_ne!(response.state.phase, Phase::Completed);
    }

    #[tokio::test]
    async fn test_drafter_failure_still_completes() {
        let engine = engine(LONG_ANSWER).with_drafter(Arc::new(FailingDrafter));
        let id = confirming_session(&engine).await;

        let response = engine
            .handle(ChatRequest::confirmation(&id, "yep"), "dev")
            .await
            .unwrap();
        assert_eq!(response.state.phase, Phase::Completed);
        let message = &response.bot_messages[0];
        assert_eq!(message.email_generated, Some(false));
        assert!(message.email_content.as_ref().unwrap().contains("accommodation"));

        let state = engine.get_session(&id).await.unwrap().unwrap();
        assert!(!state.email_generated);
    }

    #[tokio::test]
    async fn test_unknown_session_starts_fresh() {
        let engine = engine(LONG_ANSWER);
        let response = engine
            .handle(ChatRequest::message("gone-123", "Where is the library?"), "dev")
            .await
            .unwrap();

        assert_eq!(response.session_id, "gone-123");
        let state = engine.get_session("gone-123").await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.client_identifier, "dev");
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let engine = engine(LONG_ANSWER);
        assert!(matches!(
            engine.handle(ChatRequest::message("s", "   "), "dev").await,
            Err(Error::InvalidRequest(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_messages_on_one_session() {
        let engine = Arc::new(engine(LONG_ANSWER));
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;

        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let engine = engine.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    engine
                        .handle(ChatRequest::message(&id, &format!("question {}", i)), "dev")
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let state = engine.get_session(&id).await.unwrap().unwrap();
        assert_eq!(state.messages.len(), 1 + 4 * 2);
    }

    #[tokio::test]
    async fn test_sessions_listed_per_client_and_deleted() {
        let engine = engine(LONG_ANSWER);
        let mine = engine.handle(ChatRequest::start(), "device-a").await.unwrap().session_id;
        engine.handle(ChatRequest::start(), "device-b").await.unwrap();

        let listed = engine.list_sessions("device-a").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].session_id, mine);

        assert!(engine.delete_session(&mine).await.unwrap());
        assert!(engine.list_sessions("device-a").await.unwrap().is_empty());
        assert!(!engine.delete_session(&mine).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_keeps_session_lock() {
        let engine = Arc::new(engine(LONG_ANSWER));
        let id = engine.handle(ChatRequest::start(), "dev").await.unwrap().session_id;

        let held = engine.locks.acquire(&id).await.unwrap();
        let delete = {
            let engine = engine.clone();
            let id = id.clone();
            tokio::spawn(async move { engine.delete_session(&id).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(delete.await.unwrap().unwrap());

        // A request after the delete still goes through the same semaphore
        assert_eq!(engine.locks.session_count(), 1);
        let first = engine.locks.acquire(&id).await.unwrap();
        let second = {
            let engine = engine.clone();
            let id = id.clone();
            tokio::spawn(async move { engine.locks.acquire(&id).await.map(drop) })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());
        drop(first);
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_lock_sweeper_reclaims_idle_locks() {
        let engine = engine(LONG_ANSWER);
        let shutdown = engine.start_lock_sweeper(Duration::from_millis(10));

        engine.handle(ChatRequest::start(), "dev").await.unwrap();
        engine.handle(ChatRequest::start(), "dev").await.unwrap();
        let held = engine.locks.acquire("busy").await.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.locks.session_count(), 1);

        drop(held);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(engine.locks.session_count(), 0);
        shutdown.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_answer_stream() {
        let llm = Arc::new(MockLlm::new("Collect it from the Student Hub."));
        let engine = engine_with(llm.clone(), false);

        let stream = engine.answer_stream("Where is my ID card?", None).await.unwrap();
        let chunks: Vec<_> = stream.collect().await;
        let text: String = chunks
            .iter()
            .filter_map(|c| c.as_ref().ok())
            .map(|c| c.delta.as_str())
            .collect();
        assert_eq!(text, "Collect it from the Student Hub.");
        assert!(chunks.last().unwrap().as_ref().unwrap().is_final);
        assert!(llm.answer_requests()[0].stream);
    }

    #[test]
    fn test_affirmative_answers() {
        for yes in ["yes", "Yes!", "yeah that's it", "Correct", "y", "Yes, that's correct"] {
            assert!(is_affirmative(yes), "{}", yes);
        }
        for no in [
            "no",
            "not really",
            "nope, it's about fees",
            "No, that's not correct",
            "yes but that's wrong",
            "That isn't correct",
            "I don\u{2019}t think that's correct",
            "incorrect",
            "",
        ] {
            assert!(!is_affirmative(no), "{}", no);
        }
    }

    #[tokio::test]
    async fn test_negated_confirmation_never_drafts() {
        let engine = engine(LONG_ANSWER);
        for answer in ["No, that's not correct", "That isn't correct", "yes, but wrong category"] {
            let id = confirming_session(&engine).await;
            let response = engine
                .handle(ChatRequest::confirmation(&id, answer), "dev")
                .await
                .unwrap();

            assert_eq!(response.state.phase, Phase::AskingFollowup, "{}", answer);
            assert!(response.bot_messages[0].email_generated.is_none(), "{}", answer);
            let state = engine.get_session(&id).await.unwrap().unwrap();
            assert!(!state.email_generated);
            assert!(state.email_content.is_none());
        }
    }

    #[test]
    fn test_request_aliases() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"actionType":"selectCategory","conversationId":"abc","categoryKey":"accommodation"}"#,
        )
        .unwrap();
        assert_eq!(request.action_type, ActionType::SelectCategory);
        assert_eq!(request.session_id.as_deref(), Some("abc"));

        let request: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(request.action_type, ActionType::Message);
        assert_eq!(request.user_message.as_deref(), Some("hi"));
    }

    #[test]
    fn test_response_shape() {
        let state = SessionState::new("dev");
        let mut message = BotMessage::assistant("hello");
        message.confirmation_needed = Some(true);
        let json = serde_json::to_value(ChatResponse::new("s1".to_string(), &state, message)).unwrap();

        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["botMessages"][0]["role"], "assistant");
        assert_eq!(json["botMessages"][0]["confirmationNeeded"], true);
        assert!(json["botMessages"][0].get("emailContent").is_none());
        assert_eq!(json["state"]["phase"], "initial");
    }
}
