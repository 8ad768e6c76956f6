//! Cross-Entropy Method optimization library.
//!
//! This crate provides a Rust implementation of the Cross-Entropy Method
//! (CEM), an iterative stochastic optimizer: sample candidate solutions from
//! a parameterized distribution, keep the elite fraction, re-fit the
//! distribution to the elites, smooth against the previous parameters, and
//! repeat until a termination predicate fires or a step cap is reached.
//!
//! # Features
//!
//! - Generic over the parameter type `P` and instance type `I`
//! - Six-callback problem descriptor with functional single-callback replacement
//! - Stable positional tie-break in elite selection
//! - Head-first per-step log visible to the termination predicate
//! - Deterministic given (seed, problem, options)
//!
//! # Example
//!
//! ```rust
//! use cross_entropy_method::{cross_entropy, problems::gaussian_parabola, CEConfigBuilder};
//! use cross_entropy_method::TerminationReason;
//!
//! let config = CEConfigBuilder::new().seed(42).build().expect("invalid config");
//! let report = cross_entropy(&gaussian_parabola(), config).expect("search failed");
//!
//! assert_eq!(report.reason, TerminationReason::Converged);
//! assert!(report.best_score().expect("at least one step ran") > 0.9);
//! ```
#![doc = include_str!("../README.md")]
#![doc = include_str!("../REFERENCES.md")]
#![warn(missing_docs)]

/// Error types for problem construction, option validation, and callback failures.
pub mod error;
pub use error::{CEError, CallbackKind, Result};

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Convenience entry point mirroring `search(problem, options)`.
pub mod cross_entropy;
/// Built-in example problems: Gaussian on a parabola, OneMax, ring TSP.
pub mod problems;
/// Per-evaluation score recording for analysis and debugging.
pub mod recorder;
/// Recorded search wrapper.
pub mod run_recorded;
/// Elite selection helpers.
pub mod select_elites;
/// Numeric helpers shared by the built-in problems.
pub mod stats;
/// One CEM iteration: sample, score, select, fit, smooth.
pub mod step;

/// Engine-level tests.
#[cfg(test)]
mod ce_tests;

pub use cross_entropy::cross_entropy;
pub use recorder::{ScoreRecord, ScoreRecorder};
pub use run_recorded::run_recorded_cross_entropy;

// Type aliases to reduce complexity
/// `init(opts) -> params` callback type.
pub type InitFn<P> = Arc<dyn Fn(&CEConfig) -> P + Send + Sync>;
/// `draw(params, rng) -> instance` callback type.
pub type DrawFn<P, I> = Arc<dyn Fn(&P, &mut StdRng) -> I + Send + Sync>;
/// `score(instance) -> f64` callback type.
pub type ScoreFn<I> = Arc<dyn Fn(&I) -> f64 + Send + Sync>;
/// `update(elite_instances) -> params` callback type.
pub type UpdateFn<P, I> = Arc<dyn Fn(&[I]) -> P + Send + Sync>;
/// `smooth(new, prev, f_interp) -> params` callback type.
pub type SmoothFn<P> = Arc<dyn Fn(&P, &P, f64) -> P + Send + Sync>;
/// `terminate(log, opts) -> bool` callback type. The log is head-first.
pub type TerminateFn<P, I> = Arc<dyn Fn(&[LogEntry<P, I>], &CEConfig) -> bool + Send + Sync>;

/// Direction of optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Higher scores are better.
    #[default]
    Max,
    /// Lower scores are better.
    Min,
}

impl Mode {
    /// Whether `candidate` is strictly better than `incumbent` in this mode.
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Mode::Max => candidate > incumbent,
            Mode::Min => candidate < incumbent,
        }
    }
}

impl FromStr for Mode {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "max" | "maximize" => Ok(Mode::Max),
            "min" | "minimize" => Ok(Mode::Min),
            _ => Err(format!("unknown mode: {}", s)),
        }
    }
}

/// A value in the opaque `other` option map.
///
/// The engine never reads these; they are the channel by which a problem
/// receives its own parameters (sizes, tolerances, ...) through `init` and
/// `terminate`.
#[derive(Debug, Clone, PartialEq)]
pub enum OptValue {
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
    /// String value.
    Str(String),
}

impl OptValue {
    /// The integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            OptValue::Int(v) => Some(v),
            _ => None,
        }
    }

    /// The numeric payload; integers coerce to `f64`.
    pub fn as_float(&self) -> Option<f64> {
        match *self {
            OptValue::Float(v) => Some(v),
            OptValue::Int(v) => Some(v as f64),
            _ => None,
        }
    }

    /// The boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            OptValue::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// The string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptValue::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for OptValue {
    fn from(v: i64) -> Self {
        OptValue::Int(v)
    }
}
impl From<i32> for OptValue {
    fn from(v: i32) -> Self {
        OptValue::Int(v as i64)
    }
}
impl From<f64> for OptValue {
    fn from(v: f64) -> Self {
        OptValue::Float(v)
    }
}
impl From<bool> for OptValue {
    fn from(v: bool) -> Self {
        OptValue::Bool(v)
    }
}
impl From<&str> for OptValue {
    fn from(v: &str) -> Self {
        OptValue::Str(v.to_string())
    }
}
impl From<String> for OptValue {
    fn from(v: String) -> Self {
        OptValue::Str(v)
    }
}

/// Configuration for a CEM search.
///
/// Defaults follow the stable option surface: `mode = Max`, `n_sample = 100`,
/// `f_elite = 0.1`, `f_interp = 0.1`, `n_step_max = 100`, empty `other`.
#[derive(Debug, Clone)]
pub struct CEConfig {
    /// Direction of optimization.
    pub mode: Mode,
    /// Samples per step.
    pub n_sample: usize,
    /// Elite fraction in (0, 1]; `n_elite = ceil(f_elite * n_sample)`.
    pub f_elite: f64,
    /// Smoothing weight of the *previous* parameters, in [0, 1].
    pub f_interp: f64,
    /// Hard step cap.
    pub n_step_max: usize,
    /// Optional random seed for reproducibility. When `None`, a seed is drawn
    /// from OS entropy at search start and surfaced in the report.
    pub seed: Option<u64>,
    /// Print per-step progress to stderr.
    pub disp: bool,
    /// Opaque problem-specific options, passed through untouched to `init`
    /// and `terminate`.
    pub other: HashMap<String, OptValue>,
}

impl Default for CEConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Max,
            n_sample: 100,
            f_elite: 0.1,
            f_interp: 0.1,
            n_step_max: 100,
            seed: None,
            disp: false,
            other: HashMap::new(),
        }
    }
}

impl CEConfig {
    /// Validates the option values.
    ///
    /// # Errors
    ///
    /// Returns the per-option `CEError` variant naming the offending key and
    /// value. Run automatically at search start.
    pub fn validate(&self) -> Result<()> {
        if self.n_sample < 1 {
            return Err(CEError::InvalidSampleCount {
                value: self.n_sample,
            });
        }
        if !(self.f_elite > 0.0 && self.f_elite <= 1.0) {
            return Err(CEError::InvalidEliteFraction {
                value: self.f_elite,
            });
        }
        if !(self.f_interp >= 0.0 && self.f_interp <= 1.0) {
            return Err(CEError::InvalidInterpFactor {
                value: self.f_interp,
            });
        }
        if self.n_step_max < 1 {
            return Err(CEError::InvalidStepCap {
                value: self.n_step_max,
            });
        }
        Ok(())
    }

    /// Looks up a numeric entry of `other`; integers coerce to `f64`.
    pub fn other_float(&self, key: &str) -> Option<f64> {
        self.other.get(key).and_then(OptValue::as_float)
    }

    /// Looks up an integer entry of `other`.
    pub fn other_int(&self, key: &str) -> Option<i64> {
        self.other.get(key).and_then(OptValue::as_int)
    }

    /// Looks up a boolean entry of `other`.
    pub fn other_bool(&self, key: &str) -> Option<bool> {
        self.other.get(key).and_then(OptValue::as_bool)
    }
}

/// Fluent builder for [`CEConfig`].
///
/// # Example
///
/// ```rust
/// use cross_entropy_method::{CEConfigBuilder, Mode};
///
/// let config = CEConfigBuilder::new()
///     .mode(Mode::Min)
///     .n_sample(200)
///     .f_elite(0.05)
///     .seed(42)
///     .build()
///     .expect("invalid config");
/// ```
pub struct CEConfigBuilder {
    cfg: CEConfig,
}

impl Default for CEConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CEConfigBuilder {
    /// Creates a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            cfg: CEConfig::default(),
        }
    }
    /// Sets the direction of optimization.
    pub fn mode(mut self, v: Mode) -> Self {
        self.cfg.mode = v;
        self
    }
    /// Sets the number of samples per step.
    pub fn n_sample(mut self, v: usize) -> Self {
        self.cfg.n_sample = v;
        self
    }
    /// Sets the elite fraction.
    pub fn f_elite(mut self, v: f64) -> Self {
        self.cfg.f_elite = v;
        self
    }
    /// Sets the smoothing weight of the previous parameters.
    pub fn f_interp(mut self, v: f64) -> Self {
        self.cfg.f_interp = v;
        self
    }
    /// Sets the hard step cap.
    pub fn n_step_max(mut self, v: usize) -> Self {
        self.cfg.n_step_max = v;
        self
    }
    /// Sets the random seed for reproducibility.
    pub fn seed(mut self, v: u64) -> Self {
        self.cfg.seed = Some(v);
        self
    }
    /// Enables/disables progress display.
    pub fn disp(mut self, v: bool) -> Self {
        self.cfg.disp = v;
        self
    }
    /// Inserts an entry into the opaque `other` map.
    pub fn other(mut self, key: impl Into<String>, value: impl Into<OptValue>) -> Self {
        self.cfg.other.insert(key.into(), value.into());
        self
    }
    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the per-option `CEError` variant for an out-of-range value.
    pub fn build(self) -> Result<CEConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

/// A single `(instance, score)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Scored<I> {
    /// The candidate solution.
    pub instance: I,
    /// Its score.
    pub score: f64,
}

/// Snapshot of one completed step.
///
/// These fields are part of the stable surface: the `terminate` callback
/// reads them.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry<P, I> {
    /// Monotonic step index, starting at 1.
    pub step: usize,
    /// The smoothed parameters produced *by* this step.
    pub params: P,
    /// Score of the lowest-ranked elite (the inclusion threshold).
    pub elite_score: f64,
    /// The single best `(instance, score)` of this step's sample.
    pub best: Scored<I>,
}

/// Why a search stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    /// The termination predicate returned `true`.
    Converged,
    /// `n_step_max` steps ran without the predicate firing.
    StepCapReached,
    /// A problem callback panicked mid-run; the partial log is preserved.
    CallbackFailed {
        /// Which callback aborted
        callback: CallbackKind,
        /// Step during which it aborted
        step: usize,
        /// Panic payload, when one could be extracted
        message: String,
    },
    /// The problem reported it could not fit the elites (see
    /// [`DegenerateFit`]).
    Degenerate {
        /// Step during which the problem gave up
        step: usize,
        /// Problem-supplied description
        message: String,
    },
}

impl TerminationReason {
    /// Returns `true` for the two non-failure outcomes.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            TerminationReason::Converged | TerminationReason::StepCapReached
        )
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Converged => f.write_str("converged"),
            TerminationReason::StepCapReached => f.write_str("step cap reached"),
            TerminationReason::CallbackFailed {
                callback,
                step,
                message,
            } => write!(f, "callback `{}` failed at step {}: {}", callback, step, message),
            TerminationReason::Degenerate { step, message } => {
                write!(f, "degenerate fit at step {}: {}", step, message)
            }
        }
    }
}

/// Panic payload a problem can raise (via `std::panic::panic_any`) from
/// `update` to signal that the elites cannot be fitted, e.g. a zero-variance
/// sample feeding a divisor. The engine reports it as
/// [`TerminationReason::Degenerate`] instead of a plain callback failure.
#[derive(Debug)]
pub struct DegenerateFit(
    /// Problem-supplied description of the failure.
    pub String,
);

/// An optimization problem: the bundle of six callbacks the engine runs.
///
/// Build one with [`Problem::builder`]; replace a single callback with the
/// `with_*` methods, which leave the original bundle untouched.
pub struct Problem<P, I> {
    pub(crate) init: InitFn<P>,
    pub(crate) draw: DrawFn<P, I>,
    pub(crate) score: ScoreFn<I>,
    pub(crate) update: UpdateFn<P, I>,
    pub(crate) smooth: SmoothFn<P>,
    pub(crate) terminate: TerminateFn<P, I>,
}

impl<P, I> Clone for Problem<P, I> {
    fn clone(&self) -> Self {
        Self {
            init: Arc::clone(&self.init),
            draw: Arc::clone(&self.draw),
            score: Arc::clone(&self.score),
            update: Arc::clone(&self.update),
            smooth: Arc::clone(&self.smooth),
            terminate: Arc::clone(&self.terminate),
        }
    }
}

impl<P, I> Problem<P, I> {
    /// Starts building a problem from its six callbacks.
    pub fn builder() -> ProblemBuilder<P, I> {
        ProblemBuilder {
            init: None,
            draw: None,
            score: None,
            update: None,
            smooth: None,
            terminate: None,
        }
    }

    /// Returns a new bundle with `init` replaced.
    pub fn with_init<F>(&self, f: F) -> Self
    where
        F: Fn(&CEConfig) -> P + Send + Sync + 'static,
    {
        let mut p = self.clone();
        p.init = Arc::new(f);
        p
    }

    /// Returns a new bundle with `draw` replaced.
    pub fn with_draw<F>(&self, f: F) -> Self
    where
        F: Fn(&P, &mut StdRng) -> I + Send + Sync + 'static,
    {
        let mut p = self.clone();
        p.draw = Arc::new(f);
        p
    }

    /// Returns a new bundle with `score` replaced.
    pub fn with_score<F>(&self, f: F) -> Self
    where
        F: Fn(&I) -> f64 + Send + Sync + 'static,
    {
        let mut p = self.clone();
        p.score = Arc::new(f);
        p
    }

    /// Returns a new bundle with `update` replaced.
    pub fn with_update<F>(&self, f: F) -> Self
    where
        F: Fn(&[I]) -> P + Send + Sync + 'static,
    {
        let mut p = self.clone();
        p.update = Arc::new(f);
        p
    }

    /// Returns a new bundle with `smooth` replaced.
    pub fn with_smooth<F>(&self, f: F) -> Self
    where
        F: Fn(&P, &P, f64) -> P + Send + Sync + 'static,
    {
        let mut p = self.clone();
        p.smooth = Arc::new(f);
        p
    }

    /// Returns a new bundle with `terminate` replaced.
    pub fn with_terminate<F>(&self, f: F) -> Self
    where
        F: Fn(&[LogEntry<P, I>], &CEConfig) -> bool + Send + Sync + 'static,
    {
        let mut p = self.clone();
        p.terminate = Arc::new(f);
        p
    }
}

/// Builder for [`Problem`]; all six callbacks are required.
pub struct ProblemBuilder<P, I> {
    init: Option<InitFn<P>>,
    draw: Option<DrawFn<P, I>>,
    score: Option<ScoreFn<I>>,
    update: Option<UpdateFn<P, I>>,
    smooth: Option<SmoothFn<P>>,
    terminate: Option<TerminateFn<P, I>>,
}

impl<P, I> ProblemBuilder<P, I> {
    /// Sets the `init` callback.
    pub fn init<F>(mut self, f: F) -> Self
    where
        F: Fn(&CEConfig) -> P + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(f));
        self
    }

    /// Sets the `draw` callback. It must take its randomness from the
    /// supplied RNG so that a seed fully determines the run.
    pub fn draw<F>(mut self, f: F) -> Self
    where
        F: Fn(&P, &mut StdRng) -> I + Send + Sync + 'static,
    {
        self.draw = Some(Arc::new(f));
        self
    }

    /// Sets the `score` callback.
    pub fn score<F>(mut self, f: F) -> Self
    where
        F: Fn(&I) -> f64 + Send + Sync + 'static,
    {
        self.score = Some(Arc::new(f));
        self
    }

    /// Sets the `update` callback. It must fit parameters to the elites
    /// alone, without reading the previous parameters.
    pub fn update<F>(mut self, f: F) -> Self
    where
        F: Fn(&[I]) -> P + Send + Sync + 'static,
    {
        self.update = Some(Arc::new(f));
        self
    }

    /// Sets the `smooth` callback. `f_interp` is the weight of the
    /// *previous* parameters.
    pub fn smooth<F>(mut self, f: F) -> Self
    where
        F: Fn(&P, &P, f64) -> P + Send + Sync + 'static,
    {
        self.smooth = Some(Arc::new(f));
        self
    }

    /// Sets the `terminate` callback. The log it receives is head-first.
    pub fn terminate<F>(mut self, f: F) -> Self
    where
        F: Fn(&[LogEntry<P, I>], &CEConfig) -> bool + Send + Sync + 'static,
    {
        self.terminate = Some(Arc::new(f));
        self
    }

    /// Builds the problem.
    ///
    /// # Errors
    ///
    /// Returns `CEError::MissingCallback` naming the first absent callback.
    pub fn build(self) -> Result<Problem<P, I>> {
        Ok(Problem {
            init: self.init.ok_or(CEError::MissingCallback { name: "init" })?,
            draw: self.draw.ok_or(CEError::MissingCallback { name: "draw" })?,
            score: self
                .score
                .ok_or(CEError::MissingCallback { name: "score" })?,
            update: self
                .update
                .ok_or(CEError::MissingCallback { name: "update" })?,
            smooth: self
                .smooth
                .ok_or(CEError::MissingCallback { name: "smooth" })?,
            terminate: self
                .terminate
                .ok_or(CEError::MissingCallback { name: "terminate" })?,
        })
    }
}

/// Result of a CEM search.
#[derive(Clone)]
pub struct CEReport<P, I> {
    /// The parameters after the last completed step (the initial parameters
    /// if no step completed).
    pub params: P,
    /// Best-ever `(instance, score)` across all steps; `None` only when no
    /// step completed.
    pub best: Option<Scored<I>>,
    /// Number of completed steps.
    pub n_steps: usize,
    /// Why the search stopped.
    pub reason: TerminationReason,
    /// The seed that drove the run (explicit or drawn from OS entropy).
    pub seed: u64,
    /// Full per-step log, head-first (index 0 = most recent).
    pub log: Vec<LogEntry<P, I>>,
}

impl<P, I> CEReport<P, I> {
    /// The best-ever instance, if any step completed.
    pub fn best_instance(&self) -> Option<&I> {
        self.best.as_ref().map(|b| &b.instance)
    }

    /// The best-ever score, if any step completed.
    pub fn best_score(&self) -> Option<f64> {
        self.best.as_ref().map(|b| b.score)
    }
}

impl<P, I> fmt::Debug for CEReport<P, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CEReport")
            .field("best_score", &self.best_score())
            .field("n_steps", &self.n_steps)
            .field("reason", &self.reason)
            .field("seed", &self.seed)
            .field("log", &format!("len={}", self.log.len()))
            .finish()
    }
}

/// Cross-Entropy Method optimizer.
///
/// Create an instance with [`CrossEntropy::new`], adjust the configuration
/// via [`config_mut`](Self::config_mut), then call [`solve`](Self::solve).
/// For the one-shot path see [`cross_entropy`].
pub struct CrossEntropy<P, I> {
    problem: Problem<P, I>,
    config: CEConfig,
}

impl<P, I> CrossEntropy<P, I>
where
    P: Clone,
    I: Clone,
{
    /// Creates an optimizer for `problem` with default options.
    pub fn new(problem: Problem<P, I>) -> Self {
        Self {
            problem,
            config: CEConfig::default(),
        }
    }

    /// Read access to the configuration.
    pub fn config(&self) -> &CEConfig {
        &self.config
    }

    /// Mutable access to the configuration.
    pub fn config_mut(&mut self) -> &mut CEConfig {
        &mut self.config
    }

    /// Runs the search to a fixed point and returns a report.
    ///
    /// # Errors
    ///
    /// Returns the per-option `CEError` variant if the configuration is
    /// invalid, or `CEError::CallbackFailed` if `init` itself panics. Any
    /// later callback failure is reported through the report's `reason`
    /// instead, preserving the partial log.
    pub fn solve(&self) -> Result<CEReport<P, I>> {
        self.config.validate()?;

        let seed = match self.config.seed {
            Some(s) => s,
            None => rand::rng().random(),
        };
        let mut rng = StdRng::seed_from_u64(seed);

        if self.config.disp {
            eprintln!(
                "CEM init: mode={:?}, n_sample={}, n_elite={}, f_interp={}, n_step_max={}, seed={}",
                self.config.mode,
                self.config.n_sample,
                select_elites::elite_count(self.config.f_elite, self.config.n_sample),
                self.config.f_interp,
                self.config.n_step_max,
                seed
            );
        }

        let mut params = match step::guard(CallbackKind::Init, || (self.problem.init)(&self.config))
        {
            Ok(p) => p,
            Err(abort) => return Err(abort.into_error(0)),
        };

        let mut log: Vec<LogEntry<P, I>> = Vec::new();
        let mut best: Option<Scored<I>> = None;
        let mut n_steps = 0usize;
        let mut reason = TerminationReason::StepCapReached;

        for step_no in 1..=self.config.n_step_max {
            let entry = match step::ce_step(&self.problem, &self.config, &params, step_no, &mut rng)
            {
                Ok(e) => e,
                Err(abort) => {
                    reason = abort.into_reason(step_no);
                    break;
                }
            };
            n_steps = step_no;

            let improved = match &best {
                Some(b) => self.config.mode.improves(entry.best.score, b.score),
                None => true,
            };
            if improved {
                best = Some(entry.best.clone());
            }
            params = entry.params.clone();

            if self.config.disp {
                eprintln!(
                    "CEM step {:4}  elite_score={:.6e}  step_best={:.6e}",
                    step_no, entry.elite_score, entry.best.score
                );
            }

            log.insert(0, entry);

            match step::guard(CallbackKind::Terminate, || {
                (self.problem.terminate)(&log, &self.config)
            }) {
                Ok(true) => {
                    reason = TerminationReason::Converged;
                    break;
                }
                Ok(false) => {}
                Err(abort) => {
                    reason = abort.into_reason(step_no);
                    break;
                }
            }
        }

        if self.config.disp {
            eprintln!("CEM finished: {} after {} steps", reason, n_steps);
        }

        Ok(CEReport {
            params,
            best,
            n_steps,
            reason,
            seed,
            log,
        })
    }
}
