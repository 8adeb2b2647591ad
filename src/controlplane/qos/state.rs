//! QoS state machine
//!
//! An object is either stable in one profile or moving between two. The
//! only edges are [`QosState::begin`] and [`QosState::complete`]; a second
//! `begin` while a transition is pending is rejected.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QosState {
    Stable { current: String },
    Transitioning { current: String, target: String },
}

impl QosState {
    /// Rebuild from the persisted current profile and pending target
    pub fn from_parts(current: impl Into<String>, target: Option<String>) -> Self {
        let current = current.into();
        match target {
            Some(target) => QosState::Transitioning { current, target },
            None => QosState::Stable { current },
        }
    }

    pub fn current(&self) -> &str {
        match self {
            QosState::Stable { current } | QosState::Transitioning { current, .. } => current,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match self {
            QosState::Stable { .. } => None,
            QosState::Transitioning { target, .. } => Some(target),
        }
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(self, QosState::Transitioning { .. })
    }

    /// Stable(current) -> Transitioning(current, target)
    pub fn begin(&self, path: &str, target: &str) -> Result<QosState> {
        match self {
            QosState::Stable { current } => Ok(QosState::Transitioning {
                current: current.clone(),
                target: target.to_string(),
            }),
            QosState::Transitioning { target: pending, .. } => Err(Error::TransitionInProgress {
                path: path.to_string(),
                target: pending.clone(),
            }),
        }
    }

    /// Transitioning(current, target) -> Stable(target); a stable state is
    /// returned unchanged
    pub fn complete(&self) -> QosState {
        match self {
            QosState::Stable { current } => QosState::Stable {
                current: current.clone(),
            },
            QosState::Transitioning { target, .. } => QosState::Stable {
                current: target.clone(),
            },
        }
    }
}
