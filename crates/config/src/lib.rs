//! Configuration management for the student support assistant
//!
//! Supports loading configuration from:
//! - YAML/TOML files (`config/default`, `config/<env>`)
//! - Environment variables (CAMPUS_ASSIST_ prefix, `__` separator)
//! - Runtime reload through the admin endpoints
//!
//! # Domain Configuration
//!
//! Institution-specific data lives in a single YAML file (see
//! `Settings::domain_config_path`) and falls back to built-in defaults:
//! - problem taxonomy (category → subcategory → issues)
//! - department contacts and the category → department mapping
//! - emergency contacts
//! - follow-up questions per category key

pub mod constants;
pub mod domain;
pub mod settings;

pub use domain::{
    Department, DomainConfig, EmergencyContact, FollowupQuestion, InstitutionConfig, TaxonomyCategory,
    TaxonomySubcategory, UrgentContact,
};
pub use settings::{
    load_settings, DialogueConfig, EmbeddingConfig, LlmSettings, ObservabilityConfig, RagConfig,
    RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for campus_assist_core::Error {
    fn from(err: ConfigError) -> Self {
        campus_assist_core::Error::Config(err.to_string())
    }
}
