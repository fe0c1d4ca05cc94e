//! Parent-wide configuration: a validated builder producing an immutable
//! options value consumed at construction time.

use std::time::Duration;

use crate::error::ParentError;

/// Parent-wide restart ceiling and discovery-index toggle (§6
/// `initialize(options)`).
#[derive(Debug, Clone)]
pub struct ParentOptions {
    pub max_restarts: Option<u32>,
    pub max_seconds: Duration,
    pub registry_enabled: bool,
    pub mailbox_capacity: usize,
}

impl Default for ParentOptions {
    fn default() -> Self {
        Self {
            max_restarts: Some(3),
            max_seconds: Duration::from_secs(5),
            registry_enabled: false,
            mailbox_capacity: 1024,
        }
    }
}

impl ParentOptions {
    pub fn builder() -> ParentOptionsBuilder {
        ParentOptionsBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ParentOptionsBuilder {
    max_restarts: Option<Option<u32>>,
    max_seconds: Option<Duration>,
    registry_enabled: Option<bool>,
    mailbox_capacity: Option<usize>,
}

impl ParentOptionsBuilder {
    /// `None` means `infinity`; `Some(n)` caps restarts at `n` within the
    /// window.
    pub fn max_restarts(mut self, max_restarts: Option<u32>) -> Self {
        self.max_restarts = Some(max_restarts);
        self
    }

    pub fn max_seconds(mut self, max_seconds: Duration) -> Self {
        self.max_seconds = Some(max_seconds);
        self
    }

    pub fn registry_enabled(mut self, enabled: bool) -> Self {
        self.registry_enabled = Some(enabled);
        self
    }

    /// Bounds the owner's mailbox (§5): a runaway child-exit storm applies
    /// backpressure rather than growing without limit.
    pub fn mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = Some(capacity);
        self
    }

    pub fn build(self) -> Result<ParentOptions, ParentError> {
        let max_seconds = self.max_seconds.unwrap_or(Duration::from_secs(5));
        if max_seconds.is_zero() {
            return Err(ParentError::InvalidConfiguration {
                reason: "max_seconds must be positive".to_string(),
            });
        }
        let mailbox_capacity = self.mailbox_capacity.unwrap_or(1024);
        if mailbox_capacity == 0 {
            return Err(ParentError::InvalidConfiguration {
                reason: "mailbox_capacity must be positive".to_string(),
            });
        }
        Ok(ParentOptions {
            max_restarts: self.max_restarts.unwrap_or(Some(3)),
            max_seconds,
            registry_enabled: self.registry_enabled.unwrap_or(false),
            mailbox_capacity,
        })
    }
}
