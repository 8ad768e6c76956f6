use std::fs::{create_dir_all, File};
use std::io::{BufWriter, Write};
use std::sync::{Arc, Mutex};

use crate::Mode;

/// Records every score evaluation of a search for later analysis.
///
/// Instances are opaque to the engine, so only scores are serialized: each
/// row carries the evaluation id, the step it belonged to, the score, the
/// best score seen so far, and whether the evaluation improved it.
#[derive(Debug)]
pub struct ScoreRecorder {
    /// Search name (used for CSV filenames)
    name: String,
    /// Output directory for CSV files
    output_dir: String,
    /// Direction deciding what counts as an improvement
    mode: Mode,
    /// Shared evaluation records storage
    records: Arc<Mutex<Vec<ScoreRecord>>>,
    /// Best score seen so far
    best_score: Arc<Mutex<Option<f64>>>,
    /// Counter for score evaluations
    eval_counter: Arc<Mutex<usize>>,
    /// Current step number
    current_step: Arc<Mutex<usize>>,
    /// Block counter for periodic saves
    block_counter: Arc<Mutex<usize>>,
}

/// A single score evaluation record.
#[derive(Debug, Clone)]
pub struct ScoreRecord {
    /// Evaluation number
    pub eval_id: usize,
    /// Step number (0 until the first step completes)
    pub step: usize,
    /// Score of this evaluation
    pub score: f64,
    /// Best score seen so far
    pub best_so_far: f64,
    /// Whether this evaluation improved the best
    pub is_improvement: bool,
}

impl ScoreRecorder {
    /// Creates a recorder writing under `./data_generated/records`.
    pub fn new(name: impl Into<String>, mode: Mode) -> Self {
        Self::with_output_dir(name, "./data_generated/records", mode)
    }

    /// Creates a recorder with a custom output directory.
    pub fn with_output_dir(
        name: impl Into<String>,
        output_dir: impl Into<String>,
        mode: Mode,
    ) -> Self {
        Self {
            name: name.into(),
            output_dir: output_dir.into(),
            mode,
            records: Arc::new(Mutex::new(Vec::new())),
            best_score: Arc::new(Mutex::new(None)),
            eval_counter: Arc::new(Mutex::new(0)),
            current_step: Arc::new(Mutex::new(0)),
            block_counter: Arc::new(Mutex::new(0)),
        }
    }

    /// Records one score evaluation.
    pub fn record_score(&self, score: f64) {
        let mut eval_counter_guard = self.eval_counter.lock().unwrap();
        *eval_counter_guard += 1;
        let eval_id = *eval_counter_guard;
        drop(eval_counter_guard);

        let mut best_guard = self.best_score.lock().unwrap();
        let is_improvement = match *best_guard {
            Some(best) => self.mode.improves(score, best),
            None => true,
        };
        let best_so_far = if is_improvement {
            *best_guard = Some(score);
            score
        } else {
            best_guard.unwrap_or(score)
        };
        drop(best_guard);

        let mut records_guard = self.records.lock().unwrap();
        let step = *self.current_step.lock().unwrap();
        records_guard.push(ScoreRecord {
            eval_id,
            step,
            score,
            best_so_far,
            is_improvement,
        });

        // Flush a block every 10k evaluations so long runs stay bounded
        if records_guard.len() >= 10_000 {
            let records_to_save = records_guard.clone();
            records_guard.clear();
            drop(records_guard);

            let mut block_counter = self.block_counter.lock().unwrap();
            *block_counter += 1;
            let block_id = *block_counter;
            drop(block_counter);

            if let Err(e) = self.save_block_to_csv(&records_to_save, block_id) {
                eprintln!("Warning: failed to save score block {}: {}", block_id, e);
            }
        }
    }

    /// Sets the current step number for subsequent records.
    pub fn set_step(&self, step: usize) {
        *self.current_step.lock().unwrap() = step;
    }

    /// Saves a block of records to a CSV file.
    fn save_block_to_csv(
        &self,
        records: &[ScoreRecord],
        block_id: usize,
    ) -> Result<(), Box<dyn std::error::Error>> {
        create_dir_all(&self.output_dir)?;

        let filename = format!(
            "{}/{}_block_{:04}.csv",
            self.output_dir, self.name, block_id
        );
        let mut file = BufWriter::new(File::create(&filename)?);

        if records.is_empty() {
            return Ok(());
        }

        writeln!(file, "eval_id,step,score,best_so_far,is_improvement")?;
        for record in records.iter() {
            writeln!(
                file,
                "{},{},{:.16},{:.16},{}",
                record.eval_id, record.step, record.score, record.best_so_far, record.is_improvement
            )?;
        }

        file.flush()?;
        Ok(())
    }

    /// Saves any remaining records plus a summary file, returning the CSV
    /// paths written.
    pub fn finalize(&self) -> Result<Vec<String>, Box<dyn std::error::Error>> {
        let mut records_guard = self.records.lock().unwrap();
        if !records_guard.is_empty() {
            let records_to_save = records_guard.clone();
            records_guard.clear();
            drop(records_guard);

            let mut block_counter = self.block_counter.lock().unwrap();
            *block_counter += 1;
            let block_id = *block_counter;
            drop(block_counter);

            self.save_block_to_csv(&records_to_save, block_id)?;
        } else {
            drop(records_guard);
        }

        self.save_summary()?;

        let total_blocks = *self.block_counter.lock().unwrap();
        let mut saved_files = Vec::new();
        for block_id in 1..=total_blocks {
            saved_files.push(format!(
                "{}/{}_block_{:04}.csv",
                self.output_dir, self.name, block_id
            ));
        }
        Ok(saved_files)
    }

    fn save_summary(&self) -> Result<(), Box<dyn std::error::Error>> {
        let summary_filename = format!("{}/{}_summary.txt", self.output_dir, self.name);
        let mut file = File::create(&summary_filename)?;

        let total_evaluations = *self.eval_counter.lock().unwrap();
        let total_blocks = *self.block_counter.lock().unwrap();
        let best_score = *self.best_score.lock().unwrap();

        writeln!(file, "Search: {}", self.name)?;
        writeln!(file, "Mode: {:?}", self.mode)?;
        writeln!(file, "Total evaluations: {}", total_evaluations)?;
        writeln!(file, "Total blocks: {}", total_blocks)?;
        writeln!(file, "Best score found: {:?}", best_score)?;
        for block_id in 1..=total_blocks {
            writeln!(file, "  {}_block_{:04}.csv", self.name, block_id)?;
        }
        Ok(())
    }

    /// Returns (total evaluations, best score, saved blocks).
    pub fn get_stats(&self) -> (usize, Option<f64>, usize) {
        let total_evals = *self.eval_counter.lock().unwrap();
        let best_score = *self.best_score.lock().unwrap();
        let total_blocks = *self.block_counter.lock().unwrap();
        (total_evals, best_score, total_blocks)
    }

    /// The number of score evaluations recorded so far.
    pub fn num_evaluations(&self) -> usize {
        *self.eval_counter.lock().unwrap()
    }

    /// Clears all recorded state.
    pub fn clear(&self) {
        self.records.lock().unwrap().clear();
        *self.best_score.lock().unwrap() = None;
        *self.eval_counter.lock().unwrap() = 0;
        *self.current_step.lock().unwrap() = 0;
        *self.block_counter.lock().unwrap() = 0;
    }

    /// Test-only access to the in-memory records.
    #[cfg(test)]
    pub(crate) fn in_memory_records(&self) -> Vec<ScoreRecord> {
        self.records.lock().unwrap().clone()
    }
}
