//! Configuration management

use crate::error::{CoreError, CoreResult};
use crate::{config_error, validation_error};
use crate::logging::LoggingConfig;
use crate::types::{
    AuditSettings, AuditSinkKind, CredentialSettings, LockoutSettings, ServerConfig,
    ServerSettings, SessionSettings,
};

use std::collections::BTreeMap;
use std::path::Path;

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 16,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            renewal_threshold_secs: 10 * 60,
            max_lifetime_secs: 12 * 60 * 60,
            sweep_interval_secs: 60,
            bind_to_connection: true,
        }
    }
}

impl Default for LockoutSettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            window_secs: 15 * 60,
            duration_secs: 15 * 60,
        }
    }
}

impl Default for CredentialSettings {
    fn default() -> Self {
        // Argon2id defaults recommended by OWASP (19 MiB, t=2, p=1)
        Self {
            required_role: None,
            argon2_memory_kib: 19 * 1024,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            sink: AuditSinkKind::Memory,
            path: None,
            append_timeout_ms: 2000,
            queue_capacity: 1024,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut roles = BTreeMap::new();
        roles.insert(
            "operator".to_string(),
            vec!["read_campaign".to_string(), "read_submissions".to_string()],
        );
        roles.insert(
            "admin".to_string(),
            vec![
                "read_campaign".to_string(),
                "modify_campaign".to_string(),
                "launch_campaign".to_string(),
                "delete_campaign".to_string(),
                "read_submissions".to_string(),
                "manage_templates".to_string(),
                "manage_identities".to_string(),
                "server_admin".to_string(),
            ],
        );

        Self {
            server: ServerSettings::default(),
            session: SessionSettings::default(),
            lockout: LockoutSettings::default(),
            credentials: CredentialSettings::default(),
            audit: AuditSettings::default(),
            roles,
            logging: LoggingConfig::default(),
        }
    }
}

fn with_path(mut error: CoreError, path: &Path) -> CoreError {
    if let CoreError::Config { context, .. } = &mut error {
        context
            .metadata
            .insert("path".to_string(), path.display().to_string());
    }
    error
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            with_path(config_error!("Failed to read config file", "read_file", e), path)
        })?;

        Self::from_toml_str(&content).map_err(|e| with_path(e, path))
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        toml::from_str(content).map_err(|e| config_error!("Failed to parse config", "parse_toml", e))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> CoreResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| config_error!("Failed to serialize config", "serialize_toml", e))?;

        std::fs::write(path, content).map_err(|e| {
            with_path(config_error!("Failed to write config file", "write_file", e), path)
        })
    }

    /// Reject settings the AAA core cannot run with
    pub fn validate(&self) -> CoreResult<()> {
        if self.server.max_concurrent_calls == 0 {
            return Err(validation_error!(
                "At least one call must be allowed to run",
                "server.max_concurrent_calls"
            ));
        }

        let session = &self.session;
        if session.idle_timeout_secs == 0 {
            return Err(validation_error!(
                "Session idle timeout must be greater than 0",
                "session.idle_timeout_secs"
            ));
        }
        if session.max_lifetime_secs == 0 {
            return Err(validation_error!(
                "Session maximum lifetime must be greater than 0",
                "session.max_lifetime_secs"
            ));
        }
        if session.renewal_threshold_secs > session.idle_timeout_secs {
            return Err(validation_error!(
                "Session renewal_threshold_secs must not exceed idle_timeout_secs",
                "session.renewal_threshold_secs",
                "Lower session.renewal_threshold_secs"
            ));
        }
        if session.idle_timeout_secs > session.max_lifetime_secs {
            return Err(validation_error!(
                "Session idle_timeout_secs must not exceed max_lifetime_secs",
                "session.idle_timeout_secs",
                "Raise session.max_lifetime_secs or lower session.idle_timeout_secs"
            ));
        }
        if session.sweep_interval_secs == 0 {
            return Err(validation_error!(
                "Session sweep interval must be greater than 0",
                "session.sweep_interval_secs"
            ));
        }

        let lockout = &self.lockout;
        for (value, field) in [
            (u64::from(lockout.threshold), "lockout.threshold"),
            (lockout.window_secs, "lockout.window_secs"),
            (lockout.duration_secs, "lockout.duration_secs"),
        ] {
            if value == 0 {
                return Err(validation_error!(
                    format!("{} must be greater than 0", field),
                    field
                ));
            }
        }

        let credentials = &self.credentials;
        if credentials.argon2_iterations == 0 {
            return Err(validation_error!(
                "Argon2 iterations must be greater than 0",
                "credentials.argon2_iterations"
            ));
        }
        if credentials.argon2_parallelism == 0 {
            return Err(validation_error!(
                "Argon2 parallelism must be greater than 0",
                "credentials.argon2_parallelism"
            ));
        }
        if credentials.argon2_memory_kib < 8 * credentials.argon2_parallelism {
            return Err(validation_error!(
                "Argon2 memory must be at least 8 KiB per lane",
                "credentials.argon2_memory_kib",
                "Raise credentials.argon2_memory_kib"
            ));
        }

        let audit = &self.audit;
        if audit.append_timeout_ms == 0 {
            return Err(validation_error!(
                "Audit append timeout must be greater than 0",
                "audit.append_timeout_ms"
            ));
        }
        if audit.queue_capacity == 0 {
            return Err(validation_error!(
                "Audit queue capacity must be greater than 0",
                "audit.queue_capacity"
            ));
        }
        if audit.sink != AuditSinkKind::Memory && audit.path.is_none() {
            return Err(validation_error!(
                format!("Audit sink '{}' requires a path", audit.sink),
                "audit.path",
                "Set audit.path to the journal location"
            ));
        }

        Ok(())
    }
}
