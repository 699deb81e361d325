//! Execution profiles and tag selection

use serde::{Deserialize, Serialize};
use storefront_common::{ProfileKind, RuntimeConfig, TimeoutConfig};

/// Profile selector; see [`RunPlan::for_profile`]
pub type ExecutionProfile = ProfileKind;

pub const SMOKE_TAG: &str = "@smoke";
pub const DESTRUCTIVE_TAG: &str = "@destructive";

/// What a run selects and how it is scheduled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub profile: ExecutionProfile,
    pub include_tags: Vec<String>,
    pub exclude_tags: Vec<String>,
    /// `None` leaves parallelism to the runner
    pub workers: Option<usize>,
    pub serial: bool,
    pub headless: bool,
    pub timeouts: BrowserTimeouts,
}

/// Timeouts handed to the browser runner, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserTimeouts {
    pub test_ms: u64,
    pub expect_ms: u64,
    pub action_ms: u64,
    pub navigation_ms: u64,
}

impl From<&TimeoutConfig> for BrowserTimeouts {
    fn from(t: &TimeoutConfig) -> Self {
        Self {
            test_ms: t.test_ms,
            expect_ms: t.expect_ms,
            action_ms: t.action_ms,
            navigation_ms: t.navigation_ms,
        }
    }
}

impl RunPlan {
    pub fn for_profile(profile: ExecutionProfile, config: &RuntimeConfig) -> Self {
        let mut plan = Self {
            profile,
            include_tags: config.tags.clone(),
            exclude_tags: config.exclude_tags.clone(),
            workers: config.workers,
            serial: false,
            headless: config.headless,
            timeouts: BrowserTimeouts::from(&config.timeouts),
        };

        let scope_tag = match profile {
            ProfileKind::Default => return plan,
            ProfileKind::Smoke => SMOKE_TAG,
            ProfileKind::Stateful => DESTRUCTIVE_TAG,
        };
        if !plan.include_tags.iter().any(|t| t.eq_ignore_ascii_case(scope_tag)) {
            plan.include_tags.insert(0, scope_tag.to_string());
        }
        plan.workers = Some(1);
        plan.serial = true;
        plan
    }

    /// Plan for the profile named in the configuration
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::for_profile(config.profile, config)
    }

    pub fn filter(&self) -> TagFilter {
        TagFilter::new(&self.include_tags, &self.exclude_tags)
    }
}

/// Case-insensitive tag selection over test titles.
///
/// A title is selected when it carries every include tag, and is dropped
/// when it carries every exclude tag. Empty lists select everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

fn normalized(tags: &[String]) -> Vec<String> {
    tags.iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

impl TagFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Self {
        Self {
            include: normalized(include),
            exclude: normalized(exclude),
        }
    }

    pub fn matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        let included = self.include.iter().all(|t| title.contains(t.as_str()));
        let excluded = !self.exclude.is_empty() && self.exclude.iter().all(|t| title.contains(t.as_str()));
        included && !excluded
    }
}
