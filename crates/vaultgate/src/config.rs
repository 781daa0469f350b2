//! Configuration for the gate and its services.

use std::time::Duration;

use vaultgate_core::KdfPolicy;
use vaultgate_notify::DEFAULT_CAPACITY;

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// `iss` claim of every token this gate mints.
    pub issuer: String,
    /// Consent negotiation settings.
    pub negotiator: NegotiatorConfig,
    /// Audit write settings.
    pub audit: AuditConfig,
    /// Minimum KDF cost accepted for uploaded key bundles.
    pub kdf_policy: KdfPolicy,
    /// Lifetime of session-tier tokens.
    pub session_ttl: Duration,
    /// Lifetime of vault-owner tokens.
    pub owner_ttl: Duration,
    /// Per-subscription buffer of the in-memory notifier.
    pub notify_capacity: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            issuer: "vaultgate".to_string(),
            negotiator: NegotiatorConfig::default(),
            audit: AuditConfig::default(),
            kdf_policy: KdfPolicy::default(),
            session_ttl: Duration::from_secs(12 * 60 * 60),
            owner_ttl: Duration::from_secs(15 * 60),
            notify_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl GateConfig {
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    pub fn with_negotiator(mut self, negotiator: NegotiatorConfig) -> Self {
        self.negotiator = negotiator;
        self
    }

    pub fn with_audit(mut self, audit: AuditConfig) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_kdf_policy(mut self, policy: KdfPolicy) -> Self {
        self.kdf_policy = policy;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_owner_ttl(mut self, ttl: Duration) -> Self {
        self.owner_ttl = ttl;
        self
    }
}

/// Consent negotiation settings.
#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    /// How long a request stays pending before it expires.
    pub request_timeout: Duration,
    /// Upper bound on the lifetime of a consent token.
    pub max_consent_ttl: Duration,
    /// How long terminal requests are kept before purging.
    pub request_retention: Duration,
    /// Period of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for NegotiatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(120),
            max_consent_ttl: Duration::from_secs(24 * 60 * 60),
            request_retention: Duration::from_secs(7 * 24 * 60 * 60),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl NegotiatorConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_consent_ttl(mut self, ttl: Duration) -> Self {
        self.max_consent_ttl = ttl;
        self
    }

    pub fn with_request_retention(mut self, retention: Duration) -> Self {
        self.request_retention = retention;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

/// Audit write settings.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Attempts per append before giving up. Always at least one retry.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further attempt.
    pub retry_backoff: Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::from_millis(25),
        }
    }
}

impl AuditConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Effective attempt count; never fewer than two.
    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(2)
    }
}
