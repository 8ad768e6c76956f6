//! Recording wrapper for CEM searches.

use std::sync::Arc;

use directories::ProjectDirs;

use crate::recorder::ScoreRecorder;
use crate::{cross_entropy, CEConfig, CEReport, Problem};

/// Resolves the records directory from the user's cache directory.
fn records_dir() -> Result<std::path::PathBuf, String> {
    let proj_dirs = ProjectDirs::from("org", "cross-entropy", "cross-entropy-method")
        .ok_or("Failed to determine project directories")?;

    let records_dir = proj_dirs.cache_dir().join("records");
    std::fs::create_dir_all(&records_dir)
        .map_err(|e| format!("Failed to create records directory: {}", e))?;

    Ok(records_dir)
}

/// Runs a CEM search while recording every score evaluation to CSV.
///
/// The recorder is spliced into the problem through the callback-replacement
/// operation: `score` is wrapped to record each evaluation, and `terminate`
/// is wrapped to keep the recorder's step counter in sync. The supplied
/// problem is untouched.
///
/// Returns the report together with the path of the first CSV block written.
pub fn run_recorded_cross_entropy<P, I>(
    name: &str,
    problem: &Problem<P, I>,
    config: CEConfig,
) -> Result<(CEReport<P, I>, String), Box<dyn std::error::Error>>
where
    P: Clone + 'static,
    I: Clone + 'static,
{
    let records_dir = records_dir().map_err(|e| format!("Failed to get records directory: {}", e))?;
    let output_dir = records_dir.to_string_lossy().to_string();

    let recorder = Arc::new(ScoreRecorder::with_output_dir(
        name,
        output_dir.clone(),
        config.mode,
    ));

    let scoring_recorder = recorder.clone();
    let inner_score = problem.score.clone();
    let stepping_recorder = recorder.clone();
    let inner_terminate = problem.terminate.clone();

    let recorded = problem
        .with_score(move |instance: &I| {
            let score = (inner_score)(instance);
            scoring_recorder.record_score(score);
            score
        })
        .with_terminate(move |log, cfg| {
            // terminate runs after a step completes; label the one about to run
            stepping_recorder.set_step(log.len() + 1);
            (inner_terminate)(log, cfg)
        });

    recorder.set_step(1);
    let report = cross_entropy(&recorded, config)?;

    let csv_files = recorder.finalize()?;
    let csv_path = match csv_files.first() {
        Some(path) => path.clone(),
        None => format!("{}/{}.csv", output_dir, name),
    };

    Ok((report, csv_path))
}
