//! Particle lifecycle states
//!
//! A particle moves through a fixed set of states while the host drives its
//! callbacks. Failures are counted per particle; once the consecutive
//! failure count reaches the configured cap the particle lands in
//! [`ParticleState::MaxFailed`] and may not be restarted.

use particle_host_sdk::{Id, ParticleError};
use thiserror::Error;

/// Default cap on consecutive callback failures before a particle is
/// permanently failed
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Lifecycle state of a hosted particle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleState {
    /// Wired but `on_create` has not run yet
    Instantiated,
    /// `on_create` completed; readable handles are synchronizing
    Created,
    /// All readable handles delivered their initial model
    Ready,
    /// `on_ready` completed; the particle receives updates
    Started,
    /// `on_shutdown` completed; the particle may be restarted
    Stopped,
    /// A callback failed after the particle had started
    Failed,
    /// A callback failed before the particle ever started
    FailedNeverStarted,
    /// Consecutive failure cap reached; restart is not permitted
    MaxFailed,
}

impl ParticleState {
    /// Whether `start` is a valid transition out of this state
    pub fn can_start(&self) -> bool {
        matches!(
            self,
            ParticleState::Instantiated
                | ParticleState::Stopped
                | ParticleState::Failed
                | ParticleState::FailedNeverStarted
        )
    }

    /// Whether `stop` is a valid transition out of this state
    pub fn can_stop(&self) -> bool {
        matches!(self, ParticleState::Ready | ParticleState::Started)
    }

    /// Whether the particle has ever completed a full start
    pub fn has_started(&self) -> bool {
        matches!(
            self,
            ParticleState::Started | ParticleState::Stopped | ParticleState::Failed
        )
    }

    /// Whether this is one of the failed states
    pub fn is_failed(&self) -> bool {
        matches!(
            self,
            ParticleState::Failed | ParticleState::FailedNeverStarted | ParticleState::MaxFailed
        )
    }
}

impl std::fmt::Display for ParticleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ParticleState::Instantiated => "instantiated",
            ParticleState::Created => "created",
            ParticleState::Ready => "ready",
            ParticleState::Started => "started",
            ParticleState::Stopped => "stopped",
            ParticleState::Failed => "failed",
            ParticleState::FailedNeverStarted => "failed-never-started",
            ParticleState::MaxFailed => "max-failed",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised while driving a particle's lifecycle
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("unknown particle: {0}")]
    UnknownParticle(Id),

    #[error("invalid lifecycle transition: {event} from {from}")]
    InvalidTransition {
        from: ParticleState,
        event: &'static str,
    },

    #[error("particle {0} reached the consecutive failure cap")]
    MaxFailed(Id),

    #[error("particle callback failed: {0}")]
    Callback(#[from] ParticleError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_transitions() {
        assert!(ParticleState::Instantiated.can_start());
        assert!(ParticleState::Stopped.can_start());
        assert!(ParticleState::Failed.can_start());
        assert!(ParticleState::FailedNeverStarted.can_start());
        assert!(!ParticleState::Started.can_start());
        assert!(!ParticleState::MaxFailed.can_start());
    }

    #[test]
    fn test_stop_transitions() {
        assert!(ParticleState::Started.can_stop());
        assert!(!ParticleState::Instantiated.can_stop());
        assert!(!ParticleState::Stopped.can_stop());
    }
}
