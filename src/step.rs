use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use rand::rngs::StdRng;

use crate::error::{CEError, CallbackKind};
use crate::select_elites::{elite_count, rank_by_score};
use crate::{CEConfig, DegenerateFit, LogEntry, Problem, Scored, TerminationReason};

/// A callback aborted mid-step.
pub(crate) struct StepAbort {
    pub(crate) callback: CallbackKind,
    pub(crate) message: String,
    pub(crate) degenerate: bool,
}

impl StepAbort {
    pub(crate) fn into_reason(self, step: usize) -> TerminationReason {
        if self.degenerate {
            TerminationReason::Degenerate {
                step,
                message: self.message,
            }
        } else {
            TerminationReason::CallbackFailed {
                callback: self.callback,
                step,
                message: self.message,
            }
        }
    }

    pub(crate) fn into_error(self, step: usize) -> CEError {
        CEError::CallbackFailed {
            callback: self.callback,
            step,
            message: self.message,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "callback panicked".to_string()
    }
}

/// Invokes a callback, converting a panic into a [`StepAbort`]. A
/// [`DegenerateFit`] payload is kept apart so the driver can report it as
/// [`TerminationReason::Degenerate`].
pub(crate) fn guard<T>(
    callback: CallbackKind,
    f: impl FnOnce() -> T,
) -> std::result::Result<T, StepAbort> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        if let Some(DegenerateFit(message)) = payload.downcast_ref::<DegenerateFit>() {
            StepAbort {
                callback,
                message: message.clone(),
                degenerate: true,
            }
        } else {
            StepAbort {
                callback,
                message: panic_message(payload.as_ref()),
                degenerate: false,
            }
        }
    })
}

/// One CEM iteration: draw `n_sample` instances from `params_prev`, score
/// them, keep the elite quantile, fit new parameters to the elites, smooth
/// against `params_prev`, and package the step's log entry.
pub(crate) fn ce_step<P, I>(
    problem: &Problem<P, I>,
    config: &CEConfig,
    params_prev: &P,
    step: usize,
    rng: &mut StdRng,
) -> std::result::Result<LogEntry<P, I>, StepAbort>
where
    I: Clone,
{
    let n = config.n_sample;

    let mut instances: Vec<I> = Vec::with_capacity(n);
    for _ in 0..n {
        instances.push(guard(CallbackKind::Draw, || {
            (problem.draw)(params_prev, rng)
        })?);
    }

    let mut scores: Vec<f64> = Vec::with_capacity(n);
    for instance in &instances {
        scores.push(guard(CallbackKind::Score, || (problem.score)(instance))?);
    }

    let order = rank_by_score(&scores, config.mode);
    let n_elite = elite_count(config.f_elite, n);
    let elites: Vec<I> = order[..n_elite]
        .iter()
        .map(|&i| instances[i].clone())
        .collect();
    let elite_score = scores[order[n_elite - 1]];
    let best_idx = order[0];

    let params_new = guard(CallbackKind::Update, || (problem.update)(&elites))?;
    let params = guard(CallbackKind::Smooth, || {
        (problem.smooth)(&params_new, params_prev, config.f_interp)
    })?;

    Ok(LogEntry {
        step,
        params,
        elite_score,
        best: Scored {
            instance: instances[best_idx].clone(),
            score: scores[best_idx],
        },
    })
}
