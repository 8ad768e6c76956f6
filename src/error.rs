//! Error types for the Cross-Entropy Method engine.
//!
//! This module provides structured error handling for CEM searches, using
//! `thiserror` for library error types with helper methods for error
//! categorization.

use std::fmt;

use thiserror::Error;

/// Identifies one of the six problem callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// `init(opts) -> params`, called once before step 1.
    Init,
    /// `draw(params, rng) -> instance`, called `n_sample` times per step.
    Draw,
    /// `score(instance) -> f64`.
    Score,
    /// `update(elites) -> params`.
    Update,
    /// `smooth(new, prev, f_interp) -> params`.
    Smooth,
    /// `terminate(log, opts) -> bool`, consulted after every step.
    Terminate,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallbackKind::Init => "init",
            CallbackKind::Draw => "draw",
            CallbackKind::Score => "score",
            CallbackKind::Update => "update",
            CallbackKind::Smooth => "smooth",
            CallbackKind::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

/// Errors that can occur when building a problem or starting a search.
#[derive(Debug, Error)]
pub enum CEError {
    /// A required callback was not supplied at problem construction.
    #[error("missing callback `{name}`: a problem needs all six callbacks")]
    MissingCallback {
        /// Name of the absent callback
        name: &'static str,
    },

    /// `n_sample` must be a positive integer.
    #[error("invalid option `n_sample`: {value} (must be >= 1)")]
    InvalidSampleCount {
        /// The invalid sample count
        value: usize,
    },

    /// `f_elite` must lie in (0, 1].
    #[error("invalid option `f_elite`: {value} (must be in (0, 1])")]
    InvalidEliteFraction {
        /// The invalid elite fraction
        value: f64,
    },

    /// `f_interp` must lie in [0, 1].
    #[error("invalid option `f_interp`: {value} (must be in [0, 1])")]
    InvalidInterpFactor {
        /// The invalid smoothing weight
        value: f64,
    },

    /// `n_step_max` must be a positive integer.
    #[error("invalid option `n_step_max`: {value} (must be >= 1)")]
    InvalidStepCap {
        /// The invalid step cap
        value: usize,
    },

    /// A problem callback panicked before any step completed.
    ///
    /// Callback failures after the first log entry exists are reported
    /// through [`TerminationReason`](crate::TerminationReason) instead, so
    /// the partial log survives.
    #[error("callback `{callback}` failed at step {step}: {message}")]
    CallbackFailed {
        /// Which callback aborted
        callback: CallbackKind,
        /// Step number (0 for `init`, which runs before step 1)
        step: usize,
        /// Panic payload, when one could be extracted
        message: String,
    },
}

/// A specialized `Result` type for CEM operations.
pub type Result<T> = std::result::Result<T, CEError>;

impl CEError {
    /// Returns `true` if this is an option-validation error.
    ///
    /// This includes the `InvalidSampleCount`, `InvalidEliteFraction`,
    /// `InvalidInterpFactor` and `InvalidStepCap` variants.
    pub fn is_option_error(&self) -> bool {
        matches!(
            self,
            CEError::InvalidSampleCount { .. }
                | CEError::InvalidEliteFraction { .. }
                | CEError::InvalidInterpFactor { .. }
                | CEError::InvalidStepCap { .. }
        )
    }

    /// Returns `true` if this is a problem-construction error.
    pub fn is_construction_error(&self) -> bool {
        matches!(self, CEError::MissingCallback { .. })
    }

    /// Returns `true` if this error came from a problem callback.
    pub fn is_callback_error(&self) -> bool {
        matches!(self, CEError::CallbackFailed { .. })
    }
}
