//! Built-in example problems.
//!
//! Three canonical CEM demonstrations, each returning a ready-to-run
//! [`Problem`]: a 1-D Gaussian maximizing a parabola, OneMax over independent
//! Bernoulli bits, and a ring TSP driven by a row-stochastic transition
//! matrix. They double as usage documentation for the callback contract and
//! are exercised heavily by the crate's tests.
//!
//! Problem sizes and tolerances come through the opaque `other` option map:
//! `"init_mean"`/`"init_std"`/`"std_tol"` for the Gaussian, `"n_bits"` for
//! OneMax, `"n_nodes"` for the TSP.

use std::sync::Arc;

use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::{stats, CEConfig, LogEntry, Problem};

/// Parameters of a 1-D Gaussian search distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianParams {
    /// Location of the distribution.
    pub mean: f64,
    /// Spread of the distribution.
    pub std: f64,
}

/// 1-D Gaussian on the parabola `1 - x^2` (clamped to 0 outside `|x| <= 1`),
/// for `Mode::Max`.
///
/// Options read from `other`: `"init_mean"` (default 0), `"init_std"`
/// (default 30), `"std_tol"` (default 1e-3; the search terminates once the
/// smoothed `std` drops below it).
pub fn gaussian_parabola() -> Problem<GaussianParams, f64> {
    Problem {
        init: Arc::new(|cfg: &CEConfig| GaussianParams {
            mean: cfg.other_float("init_mean").unwrap_or(0.0),
            std: cfg.other_float("init_std").unwrap_or(30.0),
        }),
        draw: Arc::new(|p: &GaussianParams, rng: &mut StdRng| {
            let z: f64 = rng.sample(StandardNormal);
            p.mean + p.std * z
        }),
        score: Arc::new(|x: &f64| if x.abs() <= 1.0 { 1.0 - x * x } else { 0.0 }),
        update: Arc::new(|xs: &[f64]| {
            let mean = stats::mean(xs);
            GaussianParams {
                mean,
                std: stats::std_dev(xs, mean),
            }
        }),
        smooth: Arc::new(|new: &GaussianParams, prev: &GaussianParams, f: f64| GaussianParams {
            mean: stats::lerp(new.mean, prev.mean, f),
            std: stats::lerp(new.std, prev.std, f),
        }),
        terminate: Arc::new(|log: &[LogEntry<GaussianParams, f64>], cfg: &CEConfig| {
            let tol = cfg.other_float("std_tol").unwrap_or(1e-3);
            log.first().map_or(false, |e| e.params.std < tol)
        }),
    }
}

fn n_bits(cfg: &CEConfig) -> usize {
    cfg.other_int("n_bits").map(|v| v as usize).unwrap_or(20)
}

/// OneMax: maximize the number of set bits in a vector of independent
/// Bernoulli draws, for `Mode::Max`.
///
/// Parameters are per-position probabilities initialized to 0.5; `update`
/// re-fits each position to the mean of the elite bit vectors. The bit count
/// comes from `other["n_bits"]` (default 20). Terminates once a step's best
/// sample sets every bit.
pub fn one_max() -> Problem<Array1<f64>, Array1<f64>> {
    Problem {
        init: Arc::new(|cfg: &CEConfig| Array1::from_elem(n_bits(cfg), 0.5)),
        draw: Arc::new(|p: &Array1<f64>, rng: &mut StdRng| {
            p.mapv(|pi| if rng.random::<f64>() < pi { 1.0 } else { 0.0 })
        }),
        score: Arc::new(|bits: &Array1<f64>| bits.sum()),
        update: Arc::new(|elites: &[Array1<f64>]| {
            let mut acc = Array1::<f64>::zeros(elites[0].len());
            for e in elites {
                acc += e;
            }
            acc / elites.len() as f64
        }),
        smooth: Arc::new(|new: &Array1<f64>, prev: &Array1<f64>, f: f64| {
            new * (1.0 - f) + prev * f
        }),
        terminate: Arc::new(|log: &[LogEntry<Array1<f64>, Array1<f64>>], cfg: &CEConfig| {
            let target = n_bits(cfg) as f64;
            log.first().map_or(false, |e| e.best.score >= target)
        }),
    }
}

fn n_nodes(cfg: &CEConfig) -> usize {
    cfg.other_int("n_nodes").map(|v| v as usize).unwrap_or(10)
}

/// Ring distance between nodes `i` and `j` on an `n`-cycle.
fn ring_cost(i: usize, j: usize, n: usize) -> f64 {
    let d = if i > j { i - j } else { j - i };
    d.min(n - d) as f64
}

/// Traveling salesman on a ring of `other["n_nodes"]` nodes (default 10),
/// for `Mode::Min`; the optimal tour walks the ring and costs `n`.
///
/// Parameters are a row-stochastic transition matrix with zero diagonal,
/// initialized uniform. `draw` builds a tour from node 0 by sequential
/// sampling without replacement along the current row; `update` re-fits the
/// matrix to the per-entry mean of the elite tours' permutation matrices.
/// Never terminates on its own; bound the run with `n_step_max`.
pub fn tsp_ring() -> Problem<Array2<f64>, Vec<usize>> {
    Problem {
        init: Arc::new(|cfg: &CEConfig| {
            let n = n_nodes(cfg);
            let off = if n > 1 { 1.0 / (n - 1) as f64 } else { 0.0 };
            Array2::from_shape_fn((n, n), |(i, j)| if i == j { 0.0 } else { off })
        }),
        draw: Arc::new(|p: &Array2<f64>, rng: &mut StdRng| {
            let n = p.nrows();
            let mut tour = Vec::with_capacity(n);
            let mut visited = vec![false; n];
            let mut cur = 0usize;
            tour.push(cur);
            visited[cur] = true;
            for _ in 1..n {
                let total: f64 = (0..n).filter(|&j| !visited[j]).map(|j| p[[cur, j]]).sum();
                let next = if total > 0.0 {
                    let mut u = rng.random::<f64>() * total;
                    let mut chosen = None;
                    for j in 0..n {
                        if visited[j] {
                            continue;
                        }
                        u -= p[[cur, j]];
                        if u <= 0.0 {
                            chosen = Some(j);
                            break;
                        }
                    }
                    match chosen {
                        Some(j) => j,
                        // rounding slack: fall back to the last unvisited node
                        None => (0..n).rev().find(|&j| !visited[j]).unwrap_or(0),
                    }
                } else {
                    // the row's remaining mass vanished; continue uniformly
                    let unvisited: Vec<usize> = (0..n).filter(|&j| !visited[j]).collect();
                    unvisited[rng.random_range(0..unvisited.len())]
                };
                tour.push(next);
                visited[next] = true;
                cur = next;
            }
            tour
        }),
        score: Arc::new(|tour: &Vec<usize>| {
            let n = tour.len();
            let mut cost = 0.0;
            for k in 0..n {
                cost += ring_cost(tour[k], tour[(k + 1) % n], n);
            }
            cost
        }),
        update: Arc::new(|elites: &[Vec<usize>]| {
            let n = elites[0].len();
            let mut acc = Array2::<f64>::zeros((n, n));
            for tour in elites {
                for k in 0..n {
                    acc[[tour[k], tour[(k + 1) % n]]] += 1.0;
                }
            }
            acc / elites.len() as f64
        }),
        smooth: Arc::new(|new: &Array2<f64>, prev: &Array2<f64>, f: f64| {
            new * (1.0 - f) + prev * f
        }),
        terminate: Arc::new(|_log: &[LogEntry<Array2<f64>, Vec<usize>>], _cfg: &CEConfig| false),
    }
}
