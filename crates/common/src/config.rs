//! Runtime configuration
//!
//! Values come from built-in defaults, then an optional TOML file, then
//! environment overrides. The environment is read through a lookup function
//! so callers (and tests) decide where values come from.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Runtime configuration for one worker process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Base address of the storefront under test
    pub base_url: String,

    /// Run browsers headless
    pub headless: bool,

    /// Execution profile selector
    pub profile: ProfileKind,

    /// Tags every selected test must carry
    pub tags: Vec<String>,

    /// Tags that deselect a test when all are present
    pub exclude_tags: Vec<String>,

    /// Worker parallelism (None = runner default)
    pub workers: Option<usize>,

    /// Base account the worker identities are derived from
    pub user: UserConfig,

    pub identity: IdentityConfig,

    /// Administrative API keys
    pub admin: AdminKeys,

    pub timeouts: TimeoutConfig,
    pub readiness: ReadinessConfig,
    pub provisioning: ProvisioningConfig,
    pub mailbox: MailboxConfig,
    pub admin_retry: AdminRetryConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            headless: true,
            profile: ProfileKind::Default,
            tags: Vec::new(),
            exclude_tags: Vec::new(),
            workers: None,
            user: UserConfig::default(),
            identity: IdentityConfig::default(),
            admin: AdminKeys::default(),
            timeouts: TimeoutConfig::default(),
            readiness: ReadinessConfig::default(),
            provisioning: ProvisioningConfig::default(),
            mailbox: MailboxConfig::default(),
            admin_retry: AdminRetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    pub email: String,
    /// Password used by reset-password cycles before restoring the original
    pub new_password: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            username: "user".to_string(),
            password: "user123".to_string(),
            email: "user@needlymart.com".to_string(),
            new_password: "user123_new".to_string(),
        }
    }
}

/// How the worker identity is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityMode {
    /// Every worker uses the configured base user as-is
    Fixed,
    /// Each worker derives its own user from the base user
    #[default]
    PerWorker,
}

impl FromStr for IdentityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "fixed" | "shared" => Ok(IdentityMode::Fixed),
            "per-worker" | "per_worker" | "worker" | "derived" => Ok(IdentityMode::PerWorker),
            other => Err(Error::InvalidConfig(format!("unknown identity mode: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub mode: IdentityMode,

    /// Register the worker identity before tests run
    pub auto_provision: bool,

    /// Externally supplied run identifier, preferred over the generated token
    pub run_id: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            mode: IdentityMode::PerWorker,
            auto_provision: true,
            run_id: None,
        }
    }
}

/// The two administrative credentials. They grant disjoint scopes.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminKeys {
    /// General test-access key (reset, seed, set-stock)
    pub test_api_key: Option<String>,

    /// Narrow key accepted only by the inventory reset endpoint
    pub stock_reset_key: Option<String>,
}

impl std::fmt::Debug for AdminKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |k: &Option<String>| if k.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("AdminKeys")
            .field("test_api_key", &mask(&self.test_api_key))
            .field("stock_reset_key", &mask(&self.stock_reset_key))
            .finish()
    }
}

/// Browser-layer and default request timeouts, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub test_ms: u64,
    pub expect_ms: u64,
    pub action_ms: u64,
    pub navigation_ms: u64,
    /// Applied to any HTTP call that does not set its own timeout
    pub request_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            test_ms: 45_000,
            expect_ms: 7_000,
            action_ms: 15_000,
            navigation_ms: 30_000,
            request_ms: 15_000,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_millis(self.request_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub liveness_path: String,
    pub db_path: String,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
    /// Per-signal request timeout; must stay below `retry_delay_ms`
    pub request_timeout_ms: u64,
    /// Overall budget for the barrier
    pub deadline_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            liveness_path: "/health".to_string(),
            db_path: "/health/db".to_string(),
            max_attempts: 12,
            retry_delay_ms: 5_000,
            request_timeout_ms: 4_000,
            deadline_ms: 120_000,
        }
    }
}

impl ReadinessConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub max_attempts: u32,
    /// Linear backoff unit: attempt N waits N × base delay
    pub base_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            request_timeout_ms: 15_000,
        }
    }
}

impl ProvisioningConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    pub attempts: u32,
    pub poll_delay_ms: u64,
    pub window_ms: u64,
    /// Tolerance before the request time for rendering clock skew
    pub clock_skew_ms: u64,
    pub subject_marker: String,
    /// Fixed offset of the timestamps rendered by the mail view
    pub render_utc_offset_hours: i32,
    pub request_timeout_ms: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            attempts: 8,
            poll_delay_ms: 1_000,
            window_ms: 120_000,
            clock_skew_ms: 1_000,
            subject_marker: "[RESET]".to_string(),
            render_utc_offset_hours: 7,
            request_timeout_ms: 10_000,
        }
    }
}

impl MailboxConfig {
    pub fn poll_delay(&self) -> Duration {
        Duration::from_millis(self.poll_delay_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::from_millis(self.clock_skew_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminRetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for AdminRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            request_timeout_ms: 15_000,
        }
    }
}

impl AdminRetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Execution profile selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    #[default]
    Default,
    /// Narrow scope, serial
    Smoke,
    /// Destructive tests only, serial
    Stateful,
}

impl FromStr for ProfileKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "default" | "full" => Ok(ProfileKind::Default),
            "smoke" => Ok(ProfileKind::Smoke),
            "stateful" | "destructive" => Ok(ProfileKind::Stateful),
            other => Err(Error::InvalidConfig(format!("unknown profile: {other}"))),
        }
    }
}

impl std::fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileKind::Default => write!(f, "default"),
            ProfileKind::Smoke => write!(f, "smoke"),
            ProfileKind::Stateful => write!(f, "stateful"),
        }
    }
}

/// Trimmed, non-empty value for `key`
fn pick(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Positive integer value for `key`; anything else keeps the fallback
fn pick_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    pick(lookup, key)
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
}

fn pick_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    pick(lookup, key).map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl RuntimeConfig {
    /// Load configuration from file, or defaults if the file is absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults, then `path` if given, then the process environment
    pub fn from_env(path: Option<&Path>) -> Result<Self> {
        Self::resolve(path, |key| std::env::var(key).ok())
    }

    /// Same as [`RuntimeConfig::from_env`] with an explicit lookup
    pub fn resolve(path: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment-style values onto this configuration
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = pick(&lookup, "PROD_URL") {
            self.base_url = v;
        }
        if let Some(v) = pick_bool(&lookup, "HEADLESS") {
            self.headless = v;
        }

        if let Some(v) = pick(&lookup, "TEST_USER_USERNAME") {
            self.user.username = v;
        }
        if let Some(v) = pick(&lookup, "TEST_USER_PASSWORD") {
            self.user.password = v;
        }
        if let Some(v) = pick(&lookup, "TEST_USER_EMAIL") {
            self.user.email = v;
        }
        if let Some(v) = pick(&lookup, "TEST_USER_NEW_PASSWORD") {
            self.user.new_password = v;
        }

        if let Some(v) = pick(&lookup, "IDENTITY_MODE") {
            self.identity.mode = v.parse()?;
        }
        if let Some(v) = pick_bool(&lookup, "AUTO_PROVISION_USER") {
            self.identity.auto_provision = v;
        }
        if let Some(v) = pick(&lookup, "RUN_ID") {
            self.identity.run_id = Some(v);
        }

        if let Some(v) = pick(&lookup, "TEST_API_KEY") {
            self.admin.test_api_key = Some(v);
        }
        if let Some(v) = pick(&lookup, "STOCK_RESET_API_KEY") {
            self.admin.stock_reset_key = Some(v);
        }

        if let Some(v) = pick_positive(&lookup, "TEST_TIMEOUT_MS") {
            self.timeouts.test_ms = v;
        }
        if let Some(v) = pick_positive(&lookup, "EXPECT_TIMEOUT_MS") {
            self.timeouts.expect_ms = v;
        }
        if let Some(v) = pick_positive(&lookup, "ACTION_TIMEOUT_MS") {
            self.timeouts.action_ms = v;
        }
        if let Some(v) = pick_positive(&lookup, "NAVIGATION_TIMEOUT_MS") {
            self.timeouts.navigation_ms = v;
        }

        if let Some(v) = pick(&lookup, "TEST_PROFILE") {
            self.profile = v.parse()?;
        }
        if let Some(v) = pick(&lookup, "TAGS") {
            self.tags = split_tags(&v);
        }
        if let Some(v) = pick(&lookup, "EXCLUDE_TAGS") {
            self.exclude_tags = split_tags(&v);
        }
        if let Some(v) = pick_positive(&lookup, "WORKERS") {
            self.workers = Some(v as usize);
        }

        Ok(())
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::InvalidConfig(format!(
                "base_url must be an http(s) address: {}",
                self.base_url
            )));
        }
        if self.readiness.max_attempts == 0
            || self.provisioning.max_attempts == 0
            || self.mailbox.attempts == 0
            || self.admin_retry.max_attempts == 0
        {
            return Err(Error::InvalidConfig("attempt counts must be at least 1".to_string()));
        }
        if self.readiness.request_timeout_ms >= self.readiness.retry_delay_ms {
            return Err(Error::InvalidConfig(format!(
                "readiness request timeout ({} ms) must be shorter than the retry delay ({} ms)",
                self.readiness.request_timeout_ms, self.readiness.retry_delay_ms
            )));
        }
        if !(-23..=23).contains(&self.mailbox.render_utc_offset_hours) {
            return Err(Error::InvalidConfig(format!(
                "mailbox render offset must be within -23..=23 hours: {}",
                self.mailbox.render_utc_offset_hours
            )));
        }
        if self.user.username.is_empty() || self.user.email.is_empty() {
            return Err(Error::InvalidConfig("base user needs a username and an email".to_string()));
        }
        Ok(())
    }
}
