//! Coordinator, assignment loop and candidate search configuration.

use serde::{Deserialize, Serialize};

/// Default number of parallel candidate evaluators.
pub const DEFAULT_SEARCH_WORKERS: usize = 15;
/// Default number of closest destinations paired with each site.
pub const DEFAULT_DESTINATIONS_PER_SITE: usize = 5;
/// Default deposit-notification buffer per subscriber.
pub const DEFAULT_DEPOSIT_BUFFER: usize = 10;
/// Default assignment loop channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
/// Default evaluator thread stack size.
pub const DEFAULT_THREAD_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Resource coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Buffered deposit notifications per subscriber before drops start.
    pub deposit_buffer: usize,
    /// Events kept by the default in-memory observer.
    pub observer_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            deposit_buffer: DEFAULT_DEPOSIT_BUFFER,
            observer_capacity: 1024,
        }
    }
}

/// Work assignment loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Capacity of each request/availability/completion channel.
    pub channel_capacity: usize,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Candidate search pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of evaluator threads.
    pub worker_count: usize,
    /// Closest destinations considered per site.
    pub destinations_per_site: usize,
    /// Fall back to the least-infeasible candidate instead of failing.
    pub allow_infeasible: bool,
    /// Stack size for evaluator threads.
    pub thread_stack_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_SEARCH_WORKERS,
            destinations_per_site: DEFAULT_DESTINATIONS_PER_SITE,
            allow_infeasible: false,
            thread_stack_size: DEFAULT_THREAD_STACK_SIZE,
        }
    }
}

impl SearchConfig {
    /// Create a config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the evaluator thread count.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Set the destinations considered per site.
    #[must_use]
    pub const fn with_destinations_per_site(mut self, n: usize) -> Self {
        self.destinations_per_site = n;
        self
    }

    /// Allow the least-infeasible candidate when nothing is feasible.
    #[must_use]
    pub const fn with_allow_infeasible(mut self, allow: bool) -> Self {
        self.allow_infeasible = allow;
        self
    }

    /// Validate search settings.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.destinations_per_site == 0 {
            return Err("destinations_per_site must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        Ok(())
    }
}

/// Root coordination configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// Resource coordinator settings.
    pub coordinator: CoordinatorConfig,
    /// Assignment loop settings.
    pub assignment: AssignmentConfig,
    /// Candidate search settings.
    pub search: SearchConfig,
}

impl CoordinationConfig {
    /// Validate all sections.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value, prefixed with its
    /// section.
    pub fn validate(&self) -> Result<(), String> {
        if self.coordinator.deposit_buffer == 0 {
            return Err("coordinator: deposit_buffer must be greater than 0".into());
        }
        if self.assignment.channel_capacity == 0 {
            return Err("assignment: channel_capacity must be greater than 0".into());
        }
        self.search.validate().map_err(|e| format!("search: {e}"))
    }

    /// Parse coordination configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from defaults overridden by `FLEET_*` environment
    /// variables, loading a `.env` file first if one exists.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or the
    /// validation failure.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from defaults overridden by values from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns a message naming the variable that failed to parse, or the
    /// validation failure.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, String> {
            raw.trim()
                .parse()
                .map_err(|_| format!("{key}: cannot parse `{raw}`"))
        }

        let mut cfg = Self::default();
        if let Some(raw) = lookup("FLEET_DEPOSIT_BUFFER") {
            cfg.coordinator.deposit_buffer = parse("FLEET_DEPOSIT_BUFFER", &raw)?;
        }
        if let Some(raw) = lookup("FLEET_ASSIGNMENT_CHANNEL_CAPACITY") {
            cfg.assignment.channel_capacity = parse("FLEET_ASSIGNMENT_CHANNEL_CAPACITY", &raw)?;
        }
        if let Some(raw) = lookup("FLEET_SEARCH_WORKERS") {
            cfg.search.worker_count = parse("FLEET_SEARCH_WORKERS", &raw)?;
        }
        if let Some(raw) = lookup("FLEET_DESTINATIONS_PER_SITE") {
            cfg.search.destinations_per_site = parse("FLEET_DESTINATIONS_PER_SITE", &raw)?;
        }
        if let Some(raw) = lookup("FLEET_ALLOW_INFEASIBLE") {
            cfg.search.allow_infeasible = parse("FLEET_ALLOW_INFEASIBLE", &raw)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}
