use std::time::Duration;

use crate::cache::CacheStrategy;

pub const BASE_URL_ENV: &str = "TRAILS_BASE_URL";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5678";
pub const DEFAULT_ENDPOINT: &str = "/api/generate";

/// Which form the controller stands in for. The variants only differ in how
/// they decide that a submission is unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Variant {
    #[default]
    Options,
    Trails,
}

impl Variant {
    pub fn cache_strategy(self) -> CacheStrategy {
        match self {
            Variant::Options => CacheStrategy::Structural,
            Variant::Trails => CacheStrategy::Serialized,
        }
    }
}

/// What a new submission does while an earlier request is still pending.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum InFlightPolicy {
    /// Abandon the pending request; the newest submission wins.
    #[default]
    #[value(name = "cancel")]
    CancelPrevious,
    /// Refuse the new submission until the pending one settles.
    #[value(name = "ignore")]
    IgnoreNew,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: String,
    pub endpoint: String,
    pub variant: Variant,
    pub policy: InFlightPolicy,
    /// No timeout unless set.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: option_env!("TRAILS_BASE_URL")
                .unwrap_or(DEFAULT_BASE_URL)
                .to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            variant: Variant::default(),
            policy: InFlightPolicy::default(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Defaults, with the base URL taken from the environment when set.
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var(BASE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => config.with_base_url(url),
            _ => config,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_policy(mut self, policy: InFlightPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full endpoint URL; a trailing `/` on the base URL is dropped.
    pub fn url(&self) -> String {
        let base = self.base_url.trim().trim_end_matches('/');
        if self.endpoint.starts_with('/') {
            format!("{}{}", base, self.endpoint)
        } else {
            format!("{}/{}", base, self.endpoint)
        }
    }
}
