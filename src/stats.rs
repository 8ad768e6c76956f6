//! Small numeric helpers shared by the built-in problems.

/// Arithmetic mean; 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation around a precomputed mean.
pub fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Convex combination with the engine's smoothing convention: `f_prev` is the
/// weight of the *previous* value, so `lerp(new, prev, 0.0) == new` and
/// `lerp(new, prev, 1.0) == prev`.
pub fn lerp(new: f64, prev: f64, f_prev: f64) -> f64 {
    (1.0 - f_prev) * new + f_prev * prev
}
