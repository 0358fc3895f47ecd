//! Prompt Building
//!
//! Constructs the answer prompt for the student assistant: one system
//! message (persona plus retrieved context), recent history, then the
//! student's message.

use campus_assist_core::{
    CompletionOptions, ConversationTurn, GenerateRequest, Message, TurnRole,
};

/// Prompt builder for grounded short answers
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system: String,
    context: Option<String>,
    history: Vec<Message>,
    user: Option<String>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            system: String::new(),
            context: None,
            history: Vec::new(),
            user: None,
        }
    }

    /// Persona prompt for the given institution
    pub fn system_prompt(mut self, institution: &str) -> Self {
        self.system = format!(
            "You are a helpful {institution} student assistant.\n\n\
             IMPORTANT: Keep answers SHORT. Maximum 2 sentences. Be direct.\n\n\
             You help with: student cards, accommodation, fees, courses, support services.\n\n\
             Format: Direct answer + 1 link if relevant."
        );
        self
    }

    /// Append retrieved context to the system message
    pub fn with_context(mut self, context: &str) -> Self {
        if !context.trim().is_empty() {
            self.context = Some(context.to_string());
        }
        self
    }

    /// Add prior turns; system turns are skipped
    pub fn with_history(mut self, turns: &[ConversationTurn]) -> Self {
        self.history.extend(
            turns
                .iter()
                .filter(|t| t.role != TurnRole::System)
                .map(Message::from),
        );
        self
    }

    pub fn user_message(mut self, message: &str) -> Self {
        self.user = Some(message.to_string());
        self
    }

    /// Build final message list
    pub fn build(self) -> Vec<Message> {
        let mut system = self.system;
        if let Some(context) = self.context {
            system.push_str("\n\nRelevant information:\n");
            system.push_str(&context);
        }

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if !system.is_empty() {
            messages.push(Message::system(system));
        }
        messages.extend(self.history);
        if let Some(user) = self.user {
            messages.push(Message::user(user));
        }
        messages
    }

    pub fn build_request(self, options: CompletionOptions) -> GenerateRequest {
        GenerateRequest::from_messages(self.build(), options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_assist_core::Role;

    #[test]
    fn test_prompt_builder() {
        let messages = PromptBuilder::new()
            .system_prompt("Northfield University")
            .user_message("How do I get a student card?")
            .build();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0]
            .content
            .starts_with("You are a helpful Northfield University student assistant."));
        assert!(messages[0].content.contains("Maximum 2 sentences"));
        assert_eq!(messages[1].role, Role::User);
    }

    #[test]
    fn test_context_joins_system_message() {
        let messages = PromptBuilder::new()
            .system_prompt("the University")
            .with_context("**Student ID Cards**\nCollect from the hub.")
            .user_message("id card?")
            .build();

        assert_eq!(messages.len(), 2);
        assert!(messages[0]
            .content
            .ends_with("\n\nRelevant information:\n**Student ID Cards**\nCollect from the hub."));
    }

    #[test]
    fn test_blank_context_ignored() {
        let messages = PromptBuilder::new()
            .system_prompt("the University")
            .with_context("   ")
            .build();
        assert!(!messages[0].content.contains("Relevant information"));
    }

    #[test]
    fn test_history_order() {
        let history = vec![
            ConversationTurn::system("internal note"),
            ConversationTurn::user("Hi"),
            ConversationTurn::assistant("Hello! How can I help?"),
        ];
        let request = PromptBuilder::new()
            .system_prompt("the University")
            .with_history(&history)
            .user_message("Where is the library?")
            .build_request(CompletionOptions::default());

        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(request.messages[3].content, "Where is the library?");
    }
}
