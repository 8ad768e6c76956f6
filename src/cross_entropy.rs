use crate::{CEConfig, CEReport, CrossEntropy, Problem, Result};

/// Runs a Cross-Entropy Method search on a problem.
///
/// This is a convenience function that creates a [`CrossEntropy`] optimizer,
/// installs the given configuration, and runs [`solve`](CrossEntropy::solve).
///
/// # Arguments
///
/// * `problem` - The six-callback problem descriptor
/// * `config` - Search options (use [`CEConfigBuilder`](crate::CEConfigBuilder)
///   to construct)
///
/// # Errors
///
/// Returns the per-option `CEError` variant for an invalid configuration, or
/// `CEError::CallbackFailed` if `init` panics. Later callback failures are
/// reported through the report's `reason`, with the partial log preserved.
///
/// # Example
///
/// ```rust
/// use cross_entropy_method::{cross_entropy, problems::gaussian_parabola, CEConfigBuilder};
///
/// let report = cross_entropy(
///     &gaussian_parabola(),
///     CEConfigBuilder::new().seed(1).build().expect("invalid config"),
/// )
/// .expect("search failed");
///
/// assert!(report.n_steps < 100);
/// ```
pub fn cross_entropy<P, I>(problem: &Problem<P, I>, config: CEConfig) -> Result<CEReport<P, I>>
where
    P: Clone,
    I: Clone,
{
    let mut ce = CrossEntropy::new(problem.clone());
    *ce.config_mut() = config;
    ce.solve()
}
