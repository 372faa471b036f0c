//! Infrastructure errors
//!
//! Every variant that originates in this workspace carries an [`ErrorContext`]
//! naming the component, the failing operation and what an operator can do
//! about it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Where an error happened and how to recover from it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Correlates the error across log lines
    pub error_id: String,
    pub timestamp: DateTime<Utc>,
    pub component: String,
    pub operation: Option<String>,
    pub metadata: HashMap<String, String>,
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Shared error type for infrastructure concerns (configuration, storage, timeouts)
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Storage error: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl CoreError {
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            CoreError::Config { context, .. }
            | CoreError::Storage { context, .. }
            | CoreError::Validation { context, .. }
            | CoreError::Timeout { context, .. }
            | CoreError::Internal { context, .. } => Some(context),
            CoreError::Io(_) | CoreError::Serialization(_) => None,
        }
    }

    /// Recovery suggestions for the operator, empty when none were recorded
    pub fn suggestions(&self) -> &[String] {
        self.context()
            .map(|context| context.recovery_suggestions.as_slice())
            .unwrap_or_default()
    }

    /// Offending configuration key of a validation error
    pub fn field(&self) -> Option<&str> {
        match self {
            CoreError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Transient failures a caller may retry; everything else needs intervention
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Timeout { .. } | CoreError::Storage { .. })
    }
}

/// Configuration load/save failure, optionally wrapping its cause
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $operation:expr) => {
        $crate::CoreError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new("config").with_operation($operation),
        }
    };
    ($msg:expr, $operation:expr, $source:expr) => {{
        let source = $source;
        $crate::CoreError::Config {
            message: format!("{}: {}", $msg, source),
            source: Some(Box::new(source)),
            context: $crate::ErrorContext::new("config").with_operation($operation),
        }
    }};
}

/// Rejected configuration value, keyed by its dotted path
#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr) => {
        $crate::CoreError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new("config")
                .with_operation("validate")
                .with_suggestion(&format!("Check `{}` in the configuration file", $field)),
        }
    };
    ($msg:expr, $field:expr, $suggestion:expr) => {
        $crate::CoreError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new("config")
                .with_operation("validate")
                .with_suggestion($suggestion),
        }
    };
}

#[macro_export]
macro_rules! storage_error {
    ($msg:expr, $component:expr) => {
        $crate::CoreError::Storage {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {{
        let source = $source;
        $crate::CoreError::Storage {
            message: format!("{}: {}", $msg, source),
            source: Some(Box::new(source)),
            context: $crate::ErrorContext::new($component),
        }
    }};
}
