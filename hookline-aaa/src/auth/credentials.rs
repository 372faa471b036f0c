//! Credential verification with failed-attempt lockout

use super::identity::{Identity, IdentityStore, LockoutRecord};
use crate::time::{to_chrono, Clock};
use crate::{AaaError, AaaResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use hookline_core::{CoreError, CredentialSettings, ErrorContext, LockoutSettings};
use std::sync::Arc;
use tracing::{debug, info, warn};

fn internal(message: String) -> AaaError {
    AaaError::Core(CoreError::Internal {
        message,
        source: None,
        context: ErrorContext::new("credentials"),
    })
}

/// Argon2id secret hashing with configurable cost
#[derive(Clone)]
pub struct SecretHasher {
    argon2: Argon2<'static>,
}

impl std::fmt::Debug for SecretHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretHasher")
            .field("params", self.argon2.params())
            .finish()
    }
}

impl SecretHasher {
    pub fn new(settings: &CredentialSettings) -> AaaResult<Self> {
        let params = Params::new(
            settings.argon2_memory_kib,
            settings.argon2_iterations,
            settings.argon2_parallelism,
            None,
        )
        .map_err(|e| AaaError::config(format!("Invalid Argon2 parameters: {}", e)))?;

        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    /// Hash a secret into PHC string format
    pub fn hash(&self, secret: &str) -> AaaResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| internal(format!("Failed to hash secret: {}", e)))
    }

    /// Verify a secret against a PHC hash; the cost parameters embedded in the hash apply
    pub fn verify(&self, secret: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                warn!(error = %e, "Stored secret hash is not a valid PHC string");
                false
            }
        }
    }
}

/// Per-identity failed-attempt counters shared by the verifier and the session manager
#[derive(Debug)]
pub struct LockoutTable {
    records: DashMap<String, LockoutRecord>,
    threshold: u32,
    window: Duration,
    duration: Duration,
}

impl LockoutTable {
    pub fn new(settings: &LockoutSettings) -> Self {
        Self {
            records: DashMap::new(),
            threshold: settings.threshold.max(1),
            window: to_chrono(settings.window()),
            duration: to_chrono(settings.duration()),
        }
    }

    /// Load persisted state for an identity the table has not seen yet
    pub fn seed(&self, name: &str, record: &LockoutRecord) {
        if !record.is_clear() {
            self.records
                .entry(name.to_string())
                .or_insert_with(|| record.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<LockoutRecord> {
        self.records.get(name).map(|entry| entry.value().clone())
    }

    /// End of the active lockout, if any
    pub fn locked_until(&self, name: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.records
            .get(name)
            .and_then(|entry| entry.locked_until.filter(|until| now < *until))
    }

    /// Count a failed attempt; the whole update happens under the entry lock
    pub fn record_failure(&self, name: &str, now: DateTime<Utc>) -> LockoutRecord {
        let mut entry = self.records.entry(name.to_string()).or_default();
        let record = entry.value_mut();

        // An elapsed lockout starts over
        if record.locked_until.is_some_and(|until| until <= now) {
            *record = LockoutRecord::default();
        }

        match record.window_start {
            Some(start) if now - start < self.window => {}
            _ => {
                record.window_start = Some(now);
                record.failed_attempts = 0;
            }
        }

        record.failed_attempts = record.failed_attempts.saturating_add(1);
        if record.failed_attempts >= self.threshold && record.locked_until.is_none() {
            record.locked_until = Some(now + self.duration);
        }

        record.clone()
    }

    /// Clear an identity's counter; returns whether there was anything to clear
    pub fn record_success(&self, name: &str) -> bool {
        self.records
            .remove(name)
            .is_some_and(|(_, record)| !record.is_clear())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Checks submitted secrets against the identity store
pub struct CredentialVerifier {
    store: Arc<dyn IdentityStore>,
    lockouts: Arc<LockoutTable>,
    hasher: SecretHasher,
    /// Verified against when the identity does not exist so latency does not reveal it
    dummy_hash: String,
    required_role: Option<String>,
    clock: Arc<dyn Clock>,
}

impl CredentialVerifier {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        lockouts: Arc<LockoutTable>,
        settings: &CredentialSettings,
        clock: Arc<dyn Clock>,
    ) -> AaaResult<Self> {
        let hasher = SecretHasher::new(settings)?;
        let dummy_hash = hasher.hash("hookline-unknown-identity")?;

        Ok(Self {
            store,
            lockouts,
            hasher,
            dummy_hash,
            required_role: settings.required_role.clone(),
            clock,
        })
    }

    pub fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }

    pub fn lockouts(&self) -> &Arc<LockoutTable> {
        &self.lockouts
    }

    /// Verify `secret` for the identity `name`
    pub async fn verify(&self, name: &str, secret: &str) -> AaaResult<Identity> {
        let now = self.clock.now();
        let identity = self.store.lookup_identity(name).await?;

        if let Some(identity) = &identity {
            self.lockouts.seed(name, &identity.lockout);
        }

        if let Some(until) = self.lockouts.locked_until(name, now) {
            warn!(identity = name, %until, "Credential check rejected for locked identity");
            return Err(AaaError::IdentityLocked { until });
        }

        let stored_hash = match &identity {
            Some(_) => self.store.secret_hash(name).await?,
            None => None,
        };

        let matched = self.check_secret(secret, stored_hash.as_deref()).await?;

        let Some(mut identity) = identity.filter(|_| matched) else {
            if stored_hash.is_some() {
                self.register_failure(name, now).await;
            } else {
                debug!(identity = name, "Credential check for unknown identity");
            }
            return Err(AaaError::InvalidCredentials);
        };

        if let Some(role) = &self.required_role {
            if !identity.has_role(role) {
                info!(
                    identity = name,
                    required_role = %role,
                    "Login rejected: identity lacks the required role"
                );
                return Err(AaaError::InvalidCredentials);
            }
        }

        if self.lockouts.record_success(name) || !identity.lockout.is_clear() {
            identity.lockout = LockoutRecord::default();
            self.persist(name, &identity.lockout).await;
        }

        debug!(identity = name, "Credentials verified");
        Ok(identity)
    }

    async fn check_secret(&self, secret: &str, stored_hash: Option<&str>) -> AaaResult<bool> {
        let hasher = self.hasher.clone();
        let secret = secret.to_string();
        let known = stored_hash.is_some();
        let hash = stored_hash.unwrap_or(&self.dummy_hash).to_string();

        // Argon2 is CPU bound; keep it off the async workers
        let matched = tokio::task::spawn_blocking(move || hasher.verify(&secret, &hash))
            .await
            .map_err(|e| internal(format!("Secret verification task failed: {}", e)))?;

        Ok(known && matched)
    }

    async fn register_failure(&self, name: &str, now: DateTime<Utc>) {
        let record = self.lockouts.record_failure(name, now);
        match record.locked_until {
            Some(until) if record.failed_attempts >= self.lockouts.threshold => {
                warn!(
                    identity = name,
                    failed_attempts = record.failed_attempts,
                    %until,
                    "Identity locked after repeated failed logins"
                );
            }
            _ => {
                info!(
                    identity = name,
                    failed_attempts = record.failed_attempts,
                    "Failed login"
                );
            }
        }
        self.persist(name, &record).await;
    }

    async fn persist(&self, name: &str, record: &LockoutRecord) {
        if let Err(e) = self.store.update_lockout(name, record).await {
            warn!(identity = name, error = %e, "Failed to persist lockout state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::identity::MemoryIdentityStore;
    use crate::time::ManualClock;

    fn fast_settings() -> CredentialSettings {
        CredentialSettings {
            required_role: None,
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_parallelism: 1,
        }
    }

    fn lockout_settings() -> LockoutSettings {
        LockoutSettings {
            threshold: 3,
            window_secs: 60,
            duration_secs: 300,
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = SecretHasher::new(&fast_settings()).unwrap();
        let hash = hasher.hash("correct horse").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("correct horse", &hash));
        assert!(!hasher.verify("wrong horse", &hash));
        assert!(!hasher.verify("correct horse", "not-a-phc-string"));
    }

    #[test]
    fn test_invalid_argon2_params_rejected() {
        let mut settings = fast_settings();
        settings.argon2_memory_kib = 1;
        assert!(matches!(
            SecretHasher::new(&settings),
            Err(AaaError::Config { .. })
        ));
    }

    #[test]
    fn test_lockout_table_threshold_and_window() {
        let table = LockoutTable::new(&lockout_settings());
        let start = Utc::now();

        table.record_failure("op", start);
        table.record_failure("op", start + Duration::seconds(10));
        assert!(table.locked_until("op", start).is_none());

        let record = table.record_failure("op", start + Duration::seconds(20));
        assert_eq!(record.failed_attempts, 3);
        assert_eq!(
            table.locked_until("op", start + Duration::seconds(21)),
            Some(start + Duration::seconds(320))
        );

        // Lockout elapsed
        assert!(table
            .locked_until("op", start + Duration::seconds(320))
            .is_none());
    }

    #[test]
    fn test_lockout_window_expiry_resets_counter() {
        let table = LockoutTable::new(&lockout_settings());
        let start = Utc::now();

        table.record_failure("op", start);
        table.record_failure("op", start + Duration::seconds(30));
        let record = table.record_failure("op", start + Duration::seconds(90));

        assert_eq!(record.failed_attempts, 1);
        assert_eq!(record.window_start, Some(start + Duration::seconds(90)));
        assert!(record.locked_until.is_none());
    }

    #[test]
    fn test_concurrent_failures_are_not_lost() {
        let table = Arc::new(LockoutTable::new(&LockoutSettings {
            threshold: 1000,
            window_secs: 3600,
            duration_secs: 60,
        }));
        let now = Utc::now();

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        table.record_failure("op", now);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(table.get("op").unwrap().failed_attempts, 400);
    }

    async fn verifier_with(
        identity: Identity,
        secret: &str,
        settings: CredentialSettings,
    ) -> (CredentialVerifier, Arc<MemoryIdentityStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryIdentityStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let lockouts = Arc::new(LockoutTable::new(&lockout_settings()));
        let verifier =
            CredentialVerifier::new(store.clone(), lockouts, &settings, clock.clone()).unwrap();
        let hash = verifier.hasher().hash(secret).unwrap();
        store.add_identity(identity, hash).await;
        (verifier, store, clock)
    }

    #[tokio::test]
    async fn test_verify_success_and_failure() {
        let (verifier, _, _) =
            verifier_with(Identity::new("op1"), "s3cret", fast_settings()).await;

        let identity = verifier.verify("op1", "s3cret").await.unwrap();
        assert_eq!(identity.name, "op1");

        assert!(matches!(
            verifier.verify("op1", "nope").await,
            Err(AaaError::InvalidCredentials)
        ));
        assert!(matches!(
            verifier.verify("nobody", "s3cret").await,
            Err(AaaError::InvalidCredentials)
        ));
        // Unknown identities are not tracked
        assert!(verifier.lockouts().get("nobody").is_none());
    }

    #[tokio::test]
    async fn test_lockout_persisted_and_cleared() {
        let (verifier, store, clock) =
            verifier_with(Identity::new("op2"), "s3cret", fast_settings()).await;

        for _ in 0..3 {
            assert!(matches!(
                verifier.verify("op2", "wrong").await,
                Err(AaaError::IdentityLocked { .. }) | Err(AaaError::InvalidCredentials)
            ));
        }

        let persisted = store.lookup_identity("op2").await.unwrap().unwrap().lockout;
        assert_eq!(persisted.failed_attempts, 3);
        assert!(persisted.locked_until.is_some());

        assert!(matches!(
            verifier.verify("op2", "s3cret").await,
            Err(AaaError::IdentityLocked { .. })
        ));

        clock.advance(Duration::seconds(301));
        let identity = verifier.verify("op2", "s3cret").await.unwrap();
        assert!(identity.lockout.is_clear());

        let persisted = store.lookup_identity("op2").await.unwrap().unwrap().lockout;
        assert!(persisted.is_clear());
    }

    #[tokio::test]
    async fn test_persisted_lockout_survives_restart() {
        let store = Arc::new(MemoryIdentityStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let mut identity = Identity::new("op3");
        identity.lockout = LockoutRecord {
            failed_attempts: 3,
            window_start: Some(clock.now()),
            locked_until: Some(clock.now() + Duration::minutes(5)),
        };

        let verifier = CredentialVerifier::new(
            store.clone(),
            Arc::new(LockoutTable::new(&lockout_settings())),
            &fast_settings(),
            clock.clone(),
        )
        .unwrap();
        let hash = verifier.hasher().hash("s3cret").unwrap();
        store.add_identity(identity, hash).await;

        assert!(matches!(
            verifier.verify("op3", "s3cret").await,
            Err(AaaError::IdentityLocked { .. })
        ));
    }

    #[tokio::test]
    async fn test_required_role_enforced() {
        let mut settings = fast_settings();
        settings.required_role = Some("operator".to_string());

        let (verifier, store, _) =
            verifier_with(Identity::new("op4"), "s3cret", settings).await;

        assert!(matches!(
            verifier.verify("op4", "s3cret").await,
            Err(AaaError::InvalidCredentials)
        ));
        // A correct secret without the role is not a failed attempt
        assert!(verifier.lockouts().get("op4").is_none());

        store.set_roles("op4", ["operator"]).await.unwrap();
        assert!(verifier.verify("op4", "s3cret").await.is_ok());
    }
}
