//! Debounce timer for change-triggered recompiles.
//!
//! A burst of file changes should produce one recompile, after the burst has
//! been quiet for `delay`. A change stream that never goes quiet still fires
//! at least once per `max_delay`, measured from the first change of the
//! window.
//!
//! The timer is a plain state machine driven by the owner's clock. The
//! coordinator sleeps until [`Debouncer::deadline`] and then calls
//! [`Debouncer::poll`].

use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::config::{ConfigError, WatcherConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
  Idle,
  Pending { fire_at: Instant, window_start: Instant },
}

#[derive(Debug)]
pub struct Debouncer {
  delay: Duration,
  max_delay: Duration,
  state: DebounceState,
}

impl Debouncer {
  pub fn new(delay: Duration, max_delay: Duration) -> Result<Self, ConfigError> {
    if max_delay <= delay {
      return Err(ConfigError::InvalidDebounce {
        debounce_ms: saturating_millis(delay),
        max_delay_ms: saturating_millis(max_delay),
      });
    }
    Ok(Self {
      delay,
      max_delay,
      state: DebounceState::Idle,
    })
  }

  pub fn from_config(config: &WatcherConfig) -> Result<Self, ConfigError> {
    Self::new(config.debounce(), config.max_delay())
  }

  /// Record a notification at `now`
  pub fn notify(&mut self, now: Instant) {
    let candidate = now + self.delay;
    self.state = match self.state {
      DebounceState::Idle => DebounceState::Pending {
        fire_at: candidate,
        window_start: now,
      },
      DebounceState::Pending { fire_at, window_start } => {
        if candidate > window_start + self.max_delay {
          trace!("Debounce window exhausted, keeping fire time");
          DebounceState::Pending { fire_at, window_start }
        } else {
          DebounceState::Pending {
            fire_at: candidate,
            window_start,
          }
        }
      }
    };
  }

  /// When the pending fire is due, if any
  pub fn deadline(&self) -> Option<Instant> {
    match self.state {
      DebounceState::Idle => None,
      DebounceState::Pending { fire_at, .. } => Some(fire_at),
    }
  }

  /// Returns true (once) if the fire time has been reached, resetting to idle
  pub fn poll(&mut self, now: Instant) -> bool {
    match self.state {
      DebounceState::Pending { fire_at, .. } if now >= fire_at => {
        self.state = DebounceState::Idle;
        true
      }
      _ => false,
    }
  }

  pub fn state(&self) -> DebounceState {
    self.state
  }
}

pub(crate) fn saturating_millis(duration: Duration) -> u64 {
  u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
