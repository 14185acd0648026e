//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use crate::reconcile::DeletionPolicy;
use crate::schedule::IntervalPolicy;
use crate::store::Snapshot;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with a copy of the snapshot after every successful cycle.
pub type UpdateCallback = Arc<dyn Fn(Snapshot) + Send + Sync>;

/// Callback invoked with the failure after every failed cycle.
pub type ErrorCallback = Arc<dyn Fn(&SyncError) + Send + Sync>;

/// Configuration for the poller.
#[derive(Clone)]
pub struct SyncConfig {
    /// Start the poll loop as soon as the poller is constructed.
    pub auto_start: bool,
    /// Interval used when adaptive mode is off.
    pub fixed_interval: Duration,
    /// Derive the interval from the last round-trip time.
    pub adaptive: bool,
    /// Lower bound of the adaptive interval.
    pub min_interval: Duration,
    /// Upper bound of the adaptive base interval (jitter may exceed it).
    pub max_interval: Duration,
    /// Symmetric jitter applied to the adaptive interval, in percent (0-100).
    pub jitter_percent: u8,
    /// Record deletion lists without applying them.
    pub retain_deleted_entities: bool,
    /// Success callback.
    pub on_update: Option<UpdateCallback>,
    /// Failure callback.
    pub on_error: Option<ErrorCallback>,
}

impl SyncConfig {
    /// Creates a configuration with the default settings.
    pub fn new() -> Self {
        Self {
            auto_start: false,
            fixed_interval: Duration::from_secs(2),
            adaptive: true,
            min_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            jitter_percent: 10,
            retain_deleted_entities: false,
            on_update: None,
            on_error: None,
        }
    }

    /// Sets whether the loop starts on construction.
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Sets the fixed interval.
    pub fn with_fixed_interval(mut self, interval: Duration) -> Self {
        self.fixed_interval = interval;
        self
    }

    /// Enables or disables adaptive mode.
    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    /// Sets the adaptive interval bounds.
    pub fn with_interval_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = min;
        self.max_interval = max;
        self
    }

    /// Sets the jitter percentage.
    pub fn with_jitter_percent(mut self, percent: u8) -> Self {
        self.jitter_percent = percent;
        self
    }

    /// Sets whether deletion lists are retained instead of applied.
    pub fn with_retain_deleted_entities(mut self, retain: bool) -> Self {
        self.retain_deleted_entities = retain;
        self
    }

    /// Sets the success callback.
    pub fn with_on_update(mut self, callback: impl Fn(Snapshot) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(callback));
        self
    }

    /// Sets the failure callback.
    pub fn with_on_error(
        mut self,
        callback: impl Fn(&SyncError) + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Returns the interval policy described by this configuration.
    pub fn interval_policy(&self) -> IntervalPolicy {
        if self.adaptive {
            IntervalPolicy::Adaptive {
                min: self.min_interval,
                max: self.max_interval,
                jitter_percent: self.jitter_percent,
            }
        } else {
            IntervalPolicy::Fixed(self.fixed_interval)
        }
    }

    /// Returns the deletion policy described by this configuration.
    pub fn deletion_policy(&self) -> DeletionPolicy {
        if self.retain_deleted_entities {
            DeletionPolicy::Retain
        } else {
            DeletionPolicy::Apply
        }
    }

    /// Checks the settings for consistency.
    pub fn validate(&self) -> SyncResult<()> {
        if self.jitter_percent > 100 {
            return Err(SyncError::InvalidConfig(format!(
                "jitter_percent must be at most 100, got {}",
                self.jitter_percent
            )));
        }
        if self.adaptive {
            if self.min_interval.is_zero() {
                return Err(SyncError::InvalidConfig(
                    "min_interval must be greater than zero".into(),
                ));
            }
            if self.min_interval > self.max_interval {
                return Err(SyncError::InvalidConfig(format!(
                    "min_interval ({:?}) exceeds max_interval ({:?})",
                    self.min_interval, self.max_interval
                )));
            }
        } else if self.fixed_interval.is_zero() {
            return Err(SyncError::InvalidConfig(
                "fixed_interval must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("auto_start", &self.auto_start)
            .field("fixed_interval", &self.fixed_interval)
            .field("adaptive", &self.adaptive)
            .field("min_interval", &self.min_interval)
            .field("max_interval", &self.max_interval)
            .field("jitter_percent", &self.jitter_percent)
            .field("retain_deleted_entities", &self.retain_deleted_entities)
            .field("on_update", &self.on_update.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
