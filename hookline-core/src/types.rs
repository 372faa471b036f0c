//! Core configuration type definitions

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub session: SessionSettings,
    pub lockout: LockoutSettings,
    pub credentials: CredentialSettings,
    pub audit: AuditSettings,
    /// Role name -> globally granted permission names
    pub roles: BTreeMap<String, Vec<String>>,
    pub logging: LoggingConfig,
}

/// Call handling limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Calls processed at once; further calls wait for a free slot
    pub max_concurrent_calls: usize,
}

/// Session lifetime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Inactivity period after which a session expires
    pub idle_timeout_secs: u64,
    /// Remaining lifetime at or below which a validation renews the session
    pub renewal_threshold_secs: u64,
    /// Hard ceiling on a session's lifetime measured from creation
    pub max_lifetime_secs: u64,
    /// Interval of the background expiry sweep
    pub sweep_interval_secs: u64,
    /// Reject tokens presented on a connection other than the one they were issued on
    pub bind_to_connection: bool,
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn renewal_threshold(&self) -> Duration {
        Duration::from_secs(self.renewal_threshold_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Failed-attempt lockout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutSettings {
    /// Failed attempts within the window that trigger a lockout
    pub threshold: u32,
    /// Sliding window in which failures are counted
    pub window_secs: u64,
    /// How long a triggered lockout lasts
    pub duration_secs: u64,
}

impl LockoutSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Credential verification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    /// Role an identity must hold to open a session at all
    pub required_role: Option<String>,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
}

/// Durable audit sink selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditSinkKind {
    Memory,
    Jsonl,
    Sqlite,
}

impl std::fmt::Display for AuditSinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditSinkKind::Memory => write!(f, "memory"),
            AuditSinkKind::Jsonl => write!(f, "jsonl"),
            AuditSinkKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Audit trail settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub sink: AuditSinkKind,
    /// File (jsonl) or database (sqlite) location
    pub path: Option<PathBuf>,
    /// Upper bound on waiting for an append before the call is failed closed
    pub append_timeout_ms: u64,
    /// Capacity of the writer queue
    pub queue_capacity: usize,
}

impl AuditSettings {
    pub fn append_timeout(&self) -> Duration {
        Duration::from_millis(self.append_timeout_ms)
    }
}
