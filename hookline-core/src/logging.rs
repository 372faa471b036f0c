//! Tracing subscriber setup
//!
//! Every component logs through `tracing`; the binary installs one global
//! subscriber built from [`LoggingConfig`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

type InitResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// `[logging]` section of the server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level when `RUST_LOG` is not set
    pub level: String,
    pub format: LogFormat,
    /// Source file and line on every event
    pub show_source: bool,
    pub show_threads: bool,
    /// Append to this file instead of stdout
    pub file: Option<PathBuf>,
    /// Emit an event when spans close, which carries call timings
    pub span_timing: bool,
    /// Extra `EnvFilter` directives, e.g. `hookline_aaa::audit=debug`
    pub directives: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            show_source: true,
            show_threads: false,
            file: None,
            span_timing: false,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    fn filter(&self) -> Result<EnvFilter, Box<dyn std::error::Error + Send + Sync>> {
        let mut filter =
            EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&self.level))?;
        for directive in &self.directives {
            filter = filter.add_directive(directive.parse()?);
        }
        Ok(filter)
    }

    fn writer(&self) -> std::io::Result<BoxMakeWriter> {
        match &self.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                Ok(BoxMakeWriter::new(Arc::new(file)))
            }
            None => Ok(BoxMakeWriter::new(std::io::stdout)),
        }
    }

    fn fmt_layer(&self) -> std::io::Result<Box<dyn Layer<Registry> + Send + Sync>> {
        let span_events = if self.span_timing {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let base = fmt::layer()
            .with_span_events(span_events)
            .with_file(self.show_source)
            .with_line_number(self.show_source)
            .with_thread_ids(self.show_threads)
            .with_thread_names(self.show_threads)
            .with_ansi(self.file.is_none())
            .with_writer(self.writer()?);

        Ok(match self.format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
        })
    }
}

/// Install the global subscriber
///
/// Fails rather than panicking when a subscriber is already installed, so tests
/// and embedding binaries can call it more than once.
pub fn init_logging(config: &LoggingConfig) -> InitResult {
    let filter = config.filter()?;
    let layer = config.fmt_layer()?;
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init()?;
    Ok(())
}

#[macro_export]
macro_rules! log_operation_start {
    ($operation:expr) => {
        $crate::tracing::info!(operation = $operation, "Starting operation")
    };
    ($operation:expr, $($field:tt)*) => {
        $crate::tracing::info!(operation = $operation, $($field)*, "Starting operation")
    };
}

#[macro_export]
macro_rules! log_operation_error {
    ($operation:expr, $error:expr) => {
        $crate::tracing::error!(operation = $operation, error = %$error, "Operation failed")
    };
    ($operation:expr, $error:expr, $($field:tt)*) => {
        $crate::tracing::error!(operation = $operation, error = %$error, $($field)*, "Operation failed")
    };
}
