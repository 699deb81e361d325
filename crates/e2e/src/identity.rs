//! Worker identity allocation
//!
//! A [`RunContext`] is built once per worker process and passed by
//! reference. [`IdentityAllocator::compute`] is pure: the same context always
//! yields the same identity, and workers sharing a run token never collide
//! because the worker index is part of every suffix.
//!
//! An externally supplied run id replaces the generated token. Two separate
//! runs given the same id will derive the same identities and can observe
//! each other's accounts and mail; the collision is logged, not prevented.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use storefront_common::config::UserConfig;
use storefront_common::{IdentityMode, TestIdentity};
use tracing::{info, warn};

/// Longest run token kept from an external run id
const MAX_RUN_TOKEN_LEN: usize = 16;

/// Wall-clock granularity of the generated run token
const RUN_CLOCK_GRANULARITY_SECS: i64 = 60;

/// Per-process run identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunContext {
    pub worker_index: u32,
    pub run_token: String,
    /// Token came from an externally supplied run id
    pub external: bool,
}

impl RunContext {
    pub fn new(worker_index: u32, run_token: impl Into<String>) -> Self {
        Self {
            worker_index,
            run_token: run_token.into(),
            external: false,
        }
    }

    /// Token from a coarse wall clock and the process id
    pub fn generate(worker_index: u32, now: DateTime<Utc>, pid: u32) -> Self {
        Self::new(worker_index, generated_token(now, pid))
    }

    /// Prefer `run_id` when it normalizes to something; otherwise generate
    pub fn resolve(worker_index: u32, run_id: Option<&str>, now: DateTime<Utc>, pid: u32) -> Self {
        match run_id.and_then(normalize_run_id) {
            Some(token) => {
                warn!(
                    "Using external run id '{}'; identities will collide with any other run using the same id",
                    token
                );
                Self {
                    worker_index,
                    run_token: token,
                    external: true,
                }
            }
            None => Self::generate(worker_index, now, pid),
        }
    }

    /// Context for the current process
    pub fn from_process(worker_index: u32, run_id: Option<&str>) -> Self {
        Self::resolve(worker_index, run_id, Utc::now(), std::process::id())
    }

    /// Worker index from `TEST_WORKER_INDEX`, 0 when absent or invalid
    pub fn worker_index_from(lookup: impl Fn(&str) -> Option<String>) -> u32 {
        lookup("TEST_WORKER_INDEX")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(0)
    }
}

/// Lower-case and strip non-alphanumerics; `None` if nothing is left
pub fn normalize_run_id(raw: &str) -> Option<String> {
    let token: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .take(MAX_RUN_TOKEN_LEN)
        .collect();
    (!token.is_empty()).then_some(token)
}

pub fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn last_chars(s: &str, n: usize) -> &str {
    let start = s.len().saturating_sub(n);
    &s[start..]
}

fn pid_token(pid: u32) -> String {
    last_chars(&to_base36(u64::from(pid)), 4).to_string()
}

fn generated_token(now: DateTime<Utc>, pid: u32) -> String {
    let coarse = (now.timestamp() / RUN_CLOCK_GRANULARITY_SECS).max(0) as u64;
    let clock = to_base36(coarse);
    format!("{}{}", last_chars(&clock, 4), pid_token(pid))
}

/// Registration triple for a throwaway account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Derives identities from the configured base user
#[derive(Debug, Clone)]
pub struct IdentityAllocator {
    base: UserConfig,
    mode: IdentityMode,
}

impl IdentityAllocator {
    pub fn new(base: UserConfig, mode: IdentityMode) -> Self {
        Self { base, mode }
    }

    pub fn mode(&self) -> IdentityMode {
        self.mode
    }

    /// Identity for this worker according to the configured mode
    pub fn compute(&self, run: &RunContext) -> TestIdentity {
        let identity = match self.mode {
            IdentityMode::Fixed => self.fixed(run),
            IdentityMode::PerWorker => self.derive(run),
        };
        info!(
            "Worker {} identity: {} <{}>",
            run.worker_index, identity.username, identity.email
        );
        identity
    }

    /// The base user unchanged
    pub fn fixed(&self, run: &RunContext) -> TestIdentity {
        TestIdentity {
            worker_index: run.worker_index,
            run_token: run.run_token.clone(),
            suffix: String::new(),
            username: self.base.username.clone(),
            email: self.base.email.clone(),
            password: self.base.password.clone(),
        }
    }

    /// Base user with a `<token>w<index>` suffix
    pub fn derive(&self, run: &RunContext) -> TestIdentity {
        let suffix = format!("{}w{}", run.run_token, run.worker_index);
        TestIdentity {
            worker_index: run.worker_index,
            run_token: run.run_token.clone(),
            username: format!("{}_{}", self.base.username, suffix),
            email: plus_address(&self.base.email, &suffix),
            password: self.base.password.clone(),
            suffix,
        }
    }

    /// Fresh account for registration tests; never reused
    pub fn unique_account(&self, prefix: &str, run: &RunContext) -> UniqueAccount {
        let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000);
        let stamp = format!(
            "{}{:0>4}w{}{}",
            to_base36(Utc::now().timestamp_millis().max(0) as u64),
            to_base36(u64::from(nonce)),
            run.worker_index,
            pid_token(std::process::id()),
        );
        let domain = self
            .base
            .email
            .split_once('@')
            .map(|(_, d)| d)
            .unwrap_or("example.com");
        UniqueAccount {
            username: format!("{prefix}_{stamp}"),
            email: format!("{prefix}_{stamp}@{domain}"),
            password: "qauser123".to_string(),
        }
    }
}

/// `local@domain` becomes `local+tag@domain`
pub fn plus_address(email: &str, tag: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => format!("{local}+{tag}@{domain}"),
        None => format!("{email}+{tag}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use test_case::test_case;

    fn allocator() -> IdentityAllocator {
        IdentityAllocator::new(UserConfig::default(), IdentityMode::PerWorker)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 30, 15).unwrap()
    }

    #[test]
    fn test_compute_is_deterministic() {
        let run = RunContext::generate(3, now(), 4242);
        let a = allocator().compute(&run);
        let b = allocator().compute(&run.clone());
        assert_eq!(a, b);
    }

    #[test]
    fn test_distinct_workers_never_collide() {
        let alloc = allocator();
        let usernames: HashSet<String> = (0..64)
            .map(|i| alloc.compute(&RunContext::new(i, "k3x9ab")).username)
            .collect();
        assert_eq!(usernames.len(), 64);
    }

    #[test]
    fn test_derived_shape() {
        let identity = allocator().derive(&RunContext::new(2, "abc1"));
        assert_eq!(identity.suffix, "abc1w2");
        assert_eq!(identity.username, "user_abc1w2");
        assert_eq!(identity.email, "user+abc1w2@needlymart.com");
        assert_eq!(identity.password, "user123");
    }

    #[test]
    fn test_fixed_mode_uses_base_user() {
        let alloc = IdentityAllocator::new(UserConfig::default(), IdentityMode::Fixed);
        let identity = alloc.compute(&RunContext::new(5, "abc1"));
        assert_eq!(identity.username, "user");
        assert_eq!(identity.email, "user@needlymart.com");
        assert!(identity.suffix.is_empty());
    }

    #[test]
    fn test_generated_token_is_short_and_stable() {
        let a = RunContext::generate(0, now(), 4242);
        let b = RunContext::generate(0, now() + chrono::Duration::seconds(10), 4242);
        assert_eq!(a.run_token, b.run_token);
        assert!(a.run_token.len() <= 8);
        assert!(a.run_token.chars().all(|c| c.is_ascii_alphanumeric()));

        let other_pid = RunContext::generate(0, now(), 4243);
        assert_ne!(a.run_token, other_pid.run_token);
    }

    #[test_case("CI-Run#42", Some("cirun42") ; "mixed case and punctuation")]
    #[test_case("  build_2026.10.19  ", Some("build20261019") ; "underscores and dots")]
    #[test_case("---", None ; "nothing left")]
    #[test_case("abcdefghijklmnopqrstuvwxyz", Some("abcdefghijklmnop") ; "truncated")]
    fn test_normalize_run_id(raw: &str, expected: Option<&str>) {
        assert_eq!(normalize_run_id(raw).as_deref(), expected);
    }

    #[test]
    fn test_external_run_id_preferred() {
        let run = RunContext::resolve(1, Some("Nightly-7"), now(), 99);
        assert_eq!(run.run_token, "nightly7");
        assert!(run.external);

        let fallback = RunContext::resolve(1, Some("!!"), now(), 99);
        assert!(!fallback.external);
        assert_eq!(fallback, RunContext::generate(1, now(), 99));
    }

    #[test]
    fn test_worker_index_from_lookup() {
        assert_eq!(RunContext::worker_index_from(|_| Some("3".to_string())), 3);
        assert_eq!(RunContext::worker_index_from(|_| Some("x".to_string())), 0);
        assert_eq!(RunContext::worker_index_from(|_| None), 0);
    }

    #[test]
    fn test_unique_accounts_differ() {
        let alloc = allocator();
        let run = RunContext::new(1, "abc");
        let accounts: HashSet<String> = (0..20)
            .map(|_| alloc.unique_account("qa", &run).username)
            .collect();
        assert!(accounts.len() > 1);

        let account = alloc.unique_account("qa", &run);
        assert!(account.username.starts_with("qa_"));
        assert!(account.username.contains("w1"));
        assert_eq!(account.email, format!("{}@needlymart.com", account.username));
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(plus_address("nobody", "t"), "nobody+t");
    }
}
