//! Configuration types for the region cache and the routing error handler.

use crate::error::{Error, Result};

/// Default upper bound on cached regions.
pub const DEFAULT_MAX_REGIONS: usize = 100_000;

/// What to do with a routing error kind the client does not recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownErrorPolicy {
    /// Drop the cached region and leader store, then report a retryable failure.
    #[default]
    InvalidateAndRetry,
    /// Drop the cached region and leader store, then report a fatal failure.
    Fatal,
}

/// Configuration for [`crate::region::RegionManager`].
#[derive(Debug, Clone)]
pub struct RegionCacheConfig {
    /// Maximum number of cached regions.
    pub max_regions: usize,

    /// Whether `mark_store_suspect` may move a region's leader to another
    /// replica instead of dropping the region.
    pub failover_on_suspect: bool,
}

impl Default for RegionCacheConfig {
    fn default() -> Self {
        Self {
            max_regions: DEFAULT_MAX_REGIONS,
            failover_on_suspect: true,
        }
    }
}

impl RegionCacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached regions.
    pub fn with_max_regions(mut self, max_regions: usize) -> Self {
        self.max_regions = max_regions;
        self
    }

    /// Enable or disable leader failover on suspect stores.
    pub fn with_failover_on_suspect(mut self, enabled: bool) -> Self {
        self.failover_on_suspect = enabled;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.max_regions == 0 {
            return Err(Error::Config("max_regions must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Configuration for [`crate::handler::RegionErrorHandler`].
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    /// Policy for unrecognized routing errors.
    pub unknown_error_policy: UnknownErrorPolicy,
}

impl HandlerConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the policy for unrecognized routing errors.
    pub fn with_unknown_error_policy(mut self, policy: UnknownErrorPolicy) -> Self {
        self.unknown_error_policy = policy;
        self
    }
}
