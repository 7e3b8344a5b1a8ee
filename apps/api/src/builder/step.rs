use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::{AppError, InputError};

/// Builder steps in flow order. `Ord` follows the flow.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum BuilderStep {
    #[default]
    Target,
    Assessment,
    Build,
    Review,
    Finalize,
}

impl BuilderStep {
    pub fn next(self) -> Option<BuilderStep> {
        match self {
            BuilderStep::Target => Some(BuilderStep::Assessment),
            BuilderStep::Assessment => Some(BuilderStep::Build),
            BuilderStep::Build => Some(BuilderStep::Review),
            BuilderStep::Review => Some(BuilderStep::Finalize),
            BuilderStep::Finalize => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BuilderStep::Target => "target",
            BuilderStep::Assessment => "assessment",
            BuilderStep::Build => "build",
            BuilderStep::Review => "review",
            BuilderStep::Finalize => "finalize",
        }
    }
}

impl fmt::Display for BuilderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("cannot move from {from} to {to}: only visited steps or the next step are reachable")]
    SkipAhead { from: BuilderStep, to: BuilderStep },

    #[error("cannot enter {step}: {missing}")]
    MissingArtifact {
        step: BuilderStep,
        missing: &'static str,
    },

    #[error("step {step} has not been reached (current step is {current})")]
    NotReached {
        step: BuilderStep,
        current: BuilderStep,
    },

    #[error("no selection possible for section '{section}': {reason}")]
    InvalidSelection { section: String, reason: &'static str },

    #[error("version {0} is not in this session's history")]
    UnknownVersion(Uuid),

    #[error(transparent)]
    Input(#[from] InputError),
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::UnknownVersion(id) => {
                AppError::NotFound(format!("Version {id} not found"))
            }
            TransitionError::Input(e) => AppError::Input(e),
            other => AppError::InvalidTransition(other.to_string()),
        }
    }
}
