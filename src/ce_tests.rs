use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::Rng;

use crate::problems::{gaussian_parabola, one_max, tsp_ring};
use crate::{
    cross_entropy, stats, CEConfig, CEConfigBuilder, CEError, CallbackKind, CrossEntropy,
    DegenerateFit, LogEntry, Mode, Problem, TerminationReason,
};

/// Params drift upward by one per step; fully deterministic.
fn drift_problem() -> Problem<f64, f64> {
    Problem::builder()
        .init(|_cfg: &CEConfig| 10.0)
        .draw(|p: &f64, _rng: &mut StdRng| *p + 1.0)
        .score(|x: &f64| *x)
        .update(|xs: &[f64]| stats::mean(xs))
        .smooth(|new: &f64, prev: &f64, f: f64| stats::lerp(*new, *prev, f))
        .terminate(|_log: &[LogEntry<f64, f64>], _cfg: &CEConfig| false)
        .build()
        .expect("all callbacks supplied")
}

/// Instances are 1, 2, 3, ... in generation order; every score is equal, so
/// elite selection must be positional.
fn counting_problem() -> Problem<f64, f64> {
    let counter = Arc::new(AtomicUsize::new(0));
    Problem::builder()
        .init(|_cfg: &CEConfig| 0.0)
        .draw(move |_p: &f64, _rng: &mut StdRng| counter.fetch_add(1, Ordering::SeqCst) as f64 + 1.0)
        .score(|_x: &f64| 1.0)
        .update(|xs: &[f64]| xs[0])
        .smooth(|new: &f64, _prev: &f64, _f: f64| *new)
        .terminate(|_log: &[LogEntry<f64, f64>], _cfg: &CEConfig| false)
        .build()
        .expect("all callbacks supplied")
}

#[cfg(test)]
mod elite_tests {
    use super::*;

    #[test]
    fn test_step_best_dominates_elite_threshold() {
        let uniform = Problem::builder()
            .init(|_cfg: &CEConfig| 0.0)
            .draw(|_p: &f64, rng: &mut StdRng| rng.random::<f64>())
            .score(|x: &f64| *x)
            .update(|xs: &[f64]| stats::mean(xs))
            .smooth(|new: &f64, _prev: &f64, _f: f64| *new)
            .terminate(|_log: &[LogEntry<f64, f64>], _cfg: &CEConfig| false)
            .build()
            .expect("all callbacks supplied");

        let config = CEConfigBuilder::new()
            .seed(11)
            .n_step_max(5)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&uniform, config).expect("search failed");

        for entry in &report.log {
            assert!(
                entry.best.score >= entry.elite_score,
                "step {}: best {} below elite threshold {}",
                entry.step,
                entry.best.score,
                entry.elite_score
            );
        }
    }

    #[test]
    fn test_elites_split_the_sample_at_the_threshold() {
        fn wavy(x: f64) -> f64 {
            (x * 7.0).sin()
        }

        for mode in [Mode::Max, Mode::Min] {
            let drawn = Arc::new(Mutex::new(Vec::new()));
            let elites = Arc::new(Mutex::new(Vec::new()));

            let drawn_in = drawn.clone();
            let elites_in = elites.clone();
            let problem = Problem::builder()
                .init(|_cfg: &CEConfig| 0.0)
                .draw(move |_p: &f64, rng: &mut StdRng| {
                    let x = rng.random::<f64>();
                    drawn_in.lock().unwrap().push(x);
                    x
                })
                .score(|x: &f64| wavy(*x))
                .update(move |xs: &[f64]| {
                    *elites_in.lock().unwrap() = xs.to_vec();
                    0.0
                })
                .smooth(|new: &f64, _prev: &f64, _f: f64| *new)
                .terminate(|_log: &[LogEntry<f64, f64>], _cfg: &CEConfig| false)
                .build()
                .expect("all callbacks supplied");

            let config = CEConfigBuilder::new()
                .seed(13)
                .mode(mode)
                .n_sample(50)
                .f_elite(0.2)
                .n_step_max(1)
                .build()
                .expect("invalid config");
            let report = cross_entropy(&problem, config).expect("search failed");

            let threshold = report.log[0].elite_score;
            let drawn = drawn.lock().unwrap().clone();
            let elites = elites.lock().unwrap().clone();
            assert_eq!(drawn.len(), 50);
            assert_eq!(elites.len(), 10, "n_elite = ceil(0.2 * 50)");

            // multiset difference by exact value; uniform draws do not collide
            let mut non_elites = drawn.clone();
            for e in &elites {
                let pos = non_elites
                    .iter()
                    .position(|x| x == e)
                    .expect("every elite comes from the sample");
                non_elites.remove(pos);
            }
            assert_eq!(non_elites.len(), 40);

            for &e in &elites {
                let s = wavy(e);
                match mode {
                    Mode::Max => assert!(s >= threshold, "elite {} below threshold {}", s, threshold),
                    Mode::Min => assert!(s <= threshold, "elite {} above threshold {}", s, threshold),
                }
            }
            for &x in &non_elites {
                let s = wavy(x);
                match mode {
                    Mode::Max => {
                        assert!(s <= threshold, "non-elite {} above threshold {}", s, threshold)
                    }
                    Mode::Min => {
                        assert!(s >= threshold, "non-elite {} below threshold {}", s, threshold)
                    }
                }
            }
        }
    }

    #[test]
    fn test_identical_scores_select_positionally() {
        let config = CEConfigBuilder::new()
            .seed(0)
            .n_sample(100)
            .n_step_max(2)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&counting_problem(), config).expect("search failed");

        // head-first log: entry for step 2 first
        assert_eq!(report.log.len(), 2);
        assert_eq!(report.log[1].best.instance, 1.0);
        assert_eq!(report.log[0].best.instance, 101.0);
        // elites are the first drawn, so update saw instance 1 resp. 101
        assert_eq!(report.log[1].params, 1.0);
        assert_eq!(report.log[0].params, 101.0);
    }

    #[test]
    fn test_single_sample_is_its_own_elite() {
        let config = CEConfigBuilder::new()
            .seed(5)
            .n_sample(1)
            .n_step_max(3)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&drift_problem(), config).expect("search failed");

        assert_eq!(report.n_steps, 3);
        for entry in &report.log {
            assert_eq!(entry.elite_score, entry.best.score);
        }
    }
}

#[cfg(test)]
mod config_validation_tests {
    use super::*;

    #[test]
    fn test_zero_samples_rejected() {
        let result = CEConfigBuilder::new().n_sample(0).build();
        assert!(matches!(
            result,
            Err(CEError::InvalidSampleCount { value: 0 })
        ));
    }

    #[test]
    fn test_elite_fraction_bounds() {
        assert!(CEConfigBuilder::new().f_elite(0.0).build().is_err());
        assert!(CEConfigBuilder::new().f_elite(1.5).build().is_err());
        assert!(CEConfigBuilder::new().f_elite(1.0).build().is_ok());
        assert!(CEConfigBuilder::new().f_elite(f64::NAN).build().is_err());
    }

    #[test]
    fn test_interp_factor_bounds() {
        assert!(CEConfigBuilder::new().f_interp(-0.1).build().is_err());
        assert!(CEConfigBuilder::new().f_interp(1.1).build().is_err());
        assert!(CEConfigBuilder::new().f_interp(0.0).build().is_ok());
        assert!(CEConfigBuilder::new().f_interp(1.0).build().is_ok());
    }

    #[test]
    fn test_validation_rerun_at_search_start() {
        let mut ce = CrossEntropy::new(drift_problem());
        ce.config_mut().n_step_max = 0;

        let err = ce.solve().expect_err("invalid config must not run");
        assert!(err.is_option_error());
        assert!(matches!(err, CEError::InvalidStepCap { value: 0 }));
    }

    #[test]
    fn test_defaults_match_stable_surface() {
        let cfg = CEConfig::default();
        assert_eq!(cfg.mode, Mode::Max);
        assert_eq!(cfg.n_sample, 100);
        assert_eq!(cfg.f_elite, 0.1);
        assert_eq!(cfg.f_interp, 0.1);
        assert_eq!(cfg.n_step_max, 100);
        assert!(cfg.other.is_empty());
    }
}

#[cfg(test)]
mod problem_builder_tests {
    use super::*;

    #[test]
    fn test_missing_callback_names_the_gap() {
        let result = Problem::<f64, f64>::builder()
            .init(|_cfg: &CEConfig| 0.0)
            .draw(|p: &f64, _rng: &mut StdRng| *p)
            .update(|xs: &[f64]| xs[0])
            .smooth(|new: &f64, _prev: &f64, _f: f64| *new)
            .terminate(|_log: &[LogEntry<f64, f64>], _cfg: &CEConfig| true)
            .build();

        match result {
            Err(CEError::MissingCallback { name }) => assert_eq!(name, "score"),
            other => panic!("expected MissingCallback, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_replace_leaves_original_untouched() {
        let original = drift_problem();
        let zeroed = original.with_score(|_x: &f64| 0.0);

        assert_eq!((original.score)(&3.0), 3.0);
        assert_eq!((zeroed.score)(&3.0), 0.0);

        // and a full run through the original is unaffected
        let config = CEConfigBuilder::new()
            .seed(2)
            .n_step_max(4)
            .build()
            .expect("invalid config");
        let before = cross_entropy(&original, config.clone()).expect("search failed");
        let _ = cross_entropy(&zeroed, config.clone()).expect("search failed");
        let after = cross_entropy(&original, config).expect("search failed");

        assert_eq!(before.log, after.log);
    }
}

#[cfg(test)]
mod determinism_tests {
    use super::*;

    #[test]
    fn test_same_seed_reproduces_full_log() {
        let config = CEConfigBuilder::new().seed(42).build().expect("invalid config");

        let report1 = cross_entropy(&gaussian_parabola(), config.clone()).expect("search failed");
        let report2 = cross_entropy(&gaussian_parabola(), config).expect("search failed");

        assert_eq!(report1.seed, 42);
        assert_eq!(report1.seed, report2.seed);
        assert_eq!(report1.n_steps, report2.n_steps);
        assert_eq!(report1.reason, report2.reason);
        assert_eq!(report1.best, report2.best);
        assert_eq!(report1.log, report2.log);
    }

    #[test]
    fn test_unseeded_runs_surface_their_seed() {
        let config = CEConfigBuilder::new().n_step_max(2).build().expect("invalid config");

        let report1 = cross_entropy(&gaussian_parabola(), config.clone()).expect("search failed");
        let report2 = cross_entropy(&gaussian_parabola(), config.clone()).expect("search failed");
        assert_ne!(report1.seed, report2.seed);

        // replaying the surfaced seed reproduces the run
        let mut replay_config = config;
        replay_config.seed = Some(report1.seed);
        let replay = cross_entropy(&gaussian_parabola(), replay_config).expect("search failed");
        assert_eq!(replay.log, report1.log);
    }
}

#[cfg(test)]
mod step_cap_tests {
    use super::*;

    #[test]
    fn test_constant_false_terminate_runs_to_cap() {
        let config = CEConfigBuilder::new()
            .seed(3)
            .n_step_max(7)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&drift_problem(), config).expect("search failed");

        assert_eq!(report.n_steps, 7);
        assert_eq!(report.reason, TerminationReason::StepCapReached);
        assert_eq!(report.log.len(), 7);
        // head-first: steps 7, 6, ..., 1
        for (i, entry) in report.log.iter().enumerate() {
            assert_eq!(entry.step, 7 - i);
        }
    }

    #[test]
    fn test_terminate_consulted_even_with_single_step() {
        let eager = drift_problem()
            .with_terminate(|_log: &[LogEntry<f64, f64>], _cfg: &CEConfig| true);
        let config = CEConfigBuilder::new()
            .seed(3)
            .n_step_max(1)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&eager, config).expect("search failed");

        assert_eq!(report.n_steps, 1);
        assert_eq!(report.reason, TerminationReason::Converged);
        assert_eq!(report.log.len(), 1);
    }
}

#[cfg(test)]
mod smoothing_tests {
    use super::*;

    #[test]
    fn test_full_weight_on_previous_freezes_params() {
        let config = CEConfigBuilder::new()
            .seed(3)
            .f_interp(1.0)
            .n_step_max(5)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&drift_problem(), config).expect("search failed");

        for entry in &report.log {
            assert_eq!(entry.params, 10.0, "step {} moved the params", entry.step);
        }
        assert_eq!(report.params, 10.0);
    }

    #[test]
    fn test_zero_weight_keeps_fitted_params() {
        let config = CEConfigBuilder::new()
            .seed(3)
            .f_interp(0.0)
            .n_step_max(3)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&drift_problem(), config).expect("search failed");

        // every draw is params_prev + 1, so the fitted params walk 11, 12, 13
        assert_eq!(report.log[2].params, 11.0);
        assert_eq!(report.log[1].params, 12.0);
        assert_eq!(report.log[0].params, 13.0);
        assert_eq!(report.params, 13.0);
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[test]
    fn test_score_panic_surfaces_callback_and_step() {
        let broken = drift_problem().with_score(|_x: &f64| panic!("score exploded"));
        let config = CEConfigBuilder::new().seed(1).build().expect("invalid config");
        let report = cross_entropy(&broken, config).expect("failures keep the partial report");

        assert_eq!(
            report.reason,
            TerminationReason::CallbackFailed {
                callback: CallbackKind::Score,
                step: 1,
                message: "score exploded".to_string(),
            }
        );
        assert!(!report.reason.is_success());
        assert_eq!(report.n_steps, 0);
        assert!(report.log.is_empty());
        assert!(report.best.is_none());
        assert_eq!(report.params, 10.0, "params fall back to the init value");
    }

    #[test]
    fn test_late_terminate_panic_preserves_partial_log() {
        let broken = drift_problem().with_terminate(
            |log: &[LogEntry<f64, f64>], _cfg: &CEConfig| {
                if log.len() >= 2 {
                    panic!("terminate exploded");
                }
                false
            },
        );
        let config = CEConfigBuilder::new().seed(1).build().expect("invalid config");
        let report = cross_entropy(&broken, config).expect("failures keep the partial report");

        assert_eq!(report.n_steps, 2);
        assert_eq!(report.log.len(), 2);
        assert!(report.best.is_some());
        match report.reason {
            TerminationReason::CallbackFailed {
                callback: CallbackKind::Terminate,
                step: 2,
                ..
            } => {}
            other => panic!("unexpected reason: {}", other),
        }
    }

    #[test]
    fn test_degenerate_fit_reported_apart() {
        let degenerate = drift_problem().with_update(|_xs: &[f64]| -> f64 {
            std::panic::panic_any(DegenerateFit("zero variance sample".to_string()))
        });
        let config = CEConfigBuilder::new().seed(1).build().expect("invalid config");
        let report = cross_entropy(&degenerate, config).expect("failures keep the partial report");

        assert_eq!(
            report.reason,
            TerminationReason::Degenerate {
                step: 1,
                message: "zero variance sample".to_string(),
            }
        );
    }

    #[test]
    fn test_init_panic_is_a_hard_error() {
        let broken = drift_problem().with_init(|_cfg: &CEConfig| -> f64 { panic!("init exploded") });
        let config = CEConfigBuilder::new().seed(1).build().expect("invalid config");

        let err = cross_entropy(&broken, config).expect_err("init failure has no partial state");
        assert!(err.is_callback_error());
        match err {
            CEError::CallbackFailed {
                callback: CallbackKind::Init,
                step: 0,
                ..
            } => {}
            other => panic!("unexpected error: {}", other),
        }
    }
}

#[cfg(test)]
mod mode_tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("max".parse::<Mode>().unwrap(), Mode::Max);
        assert_eq!("Minimize".parse::<Mode>().unwrap(), Mode::Min);
        assert!("upward".parse::<Mode>().is_err());
    }

    #[test]
    fn test_negated_score_with_flipped_mode_matches() {
        let maximize = gaussian_parabola();
        let minimize = maximize
            .with_score(|x: &f64| if x.abs() <= 1.0 { x * x - 1.0 } else { 0.0 });

        let max_config = CEConfigBuilder::new().seed(9).build().expect("invalid config");
        let min_config = CEConfigBuilder::new()
            .seed(9)
            .mode(Mode::Min)
            .build()
            .expect("invalid config");

        let max_report = cross_entropy(&maximize, max_config).expect("search failed");
        let min_report = cross_entropy(&minimize, min_config).expect("search failed");

        // same seed, mirrored ranking: identical trajectory and best instance
        assert_eq!(max_report.n_steps, min_report.n_steps);
        assert_eq!(max_report.best_instance(), min_report.best_instance());
        let max_best = max_report.best_score().expect("at least one step ran");
        let min_best = min_report.best_score().expect("at least one step ran");
        assert_eq!(max_best, -min_best);
    }
}

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[test]
    fn test_gaussian_parabola_converges() {
        let config = CEConfigBuilder::new().seed(1).build().expect("invalid config");
        let report = cross_entropy(&gaussian_parabola(), config).expect("search failed");

        assert_eq!(report.reason, TerminationReason::Converged);
        assert!(report.n_steps < 100, "took {} steps", report.n_steps);
        assert!(report.params.std < 1e-3);

        let best_x = *report.best_instance().expect("at least one step ran");
        let best_score = report.best_score().expect("at least one step ran");
        assert!(best_x.abs() < 0.05, "best instance too far out: {}", best_x);
        assert!(best_score > 0.99, "best score too low: {}", best_score);
    }

    #[test]
    fn test_one_max_20_reaches_all_ones() {
        let config = CEConfigBuilder::new()
            .seed(4)
            .other("n_bits", 20)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&one_max(), config).expect("search failed");

        assert_eq!(report.reason, TerminationReason::Converged);
        assert_eq!(report.best_score(), Some(20.0));
        assert!(report.n_steps <= 100);
    }

    #[test]
    fn test_one_max_1000_default_options_fall_short() {
        let config = CEConfigBuilder::new()
            .seed(4)
            .other("n_bits", 1000)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&one_max(), config).expect("search failed");

        // premature convergence: the default sample size cannot carry 1000 bits
        assert_eq!(report.reason, TerminationReason::StepCapReached);
        assert_eq!(report.n_steps, 100);
        let best = report.best_score().expect("at least one step ran");
        assert!(best < 1000.0, "unexpectedly optimal: {}", best);
    }

    #[test]
    fn test_one_max_1000_large_sample_gets_close() {
        let config = CEConfigBuilder::new()
            .seed(4)
            .n_sample(1000)
            .f_interp(0.05)
            .other("n_bits", 1000)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&one_max(), config).expect("search failed");

        let best = report.best_score().expect("at least one step ran");
        assert!(best > 950.0, "best score too low: {}", best);
    }

    #[test]
    fn test_tsp_ring_shortens_the_tour() {
        let config = CEConfigBuilder::new()
            .seed(6)
            .mode(Mode::Min)
            .n_step_max(10)
            .other("n_nodes", 10)
            .build()
            .expect("invalid config");
        let report = cross_entropy(&tsp_ring(), config).expect("search failed");

        assert_eq!(report.reason, TerminationReason::StepCapReached);

        let tour = report.best_instance().expect("at least one step ran").clone();
        let mut sorted = tour.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..10).collect::<Vec<_>>(), "not a permutation: {:?}", tour);

        let best = report.best_score().expect("at least one step ran");
        assert!(best >= 10.0, "below the ring length: {}", best);
        assert!(best <= 16.0, "barely better than random: {}", best);

        // minimizing: the step best must not exceed the elite threshold
        for entry in &report.log {
            assert!(entry.best.score <= entry.elite_score);
        }
    }
}
