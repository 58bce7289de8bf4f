//! Per-request loop bookkeeping

use std::collections::{HashMap, HashSet};

use tokio::time::Instant;

use crate::action::Action;
use crate::executor::ActionResult;
use crate::guards::CorrectionKind;

/// Path a read action targets, normalized. Any window of a file counts as
/// reading that file.
fn read_path(action: &Action) -> Option<String> {
    match action {
        Action::Read(read) => Some(normalize_path(&read.path)),
        _ => None,
    }
}

/// `./src/a.rs` and `src/a.rs` name the same file
fn normalize_path(path: &str) -> String {
    let mut p = path.trim();
    while let Some(rest) = p.strip_prefix("./") {
        p = rest;
    }
    p.to_string()
}

/// State that lives for one user request and is discarded afterwards
#[derive(Debug)]
pub struct TurnState {
    files_read: HashSet<String>,
    /// Dropped duplicate reads since the last duplicate-read correction
    duplicate_reads: usize,
    consecutive_failures: u32,
    /// Labels of the actions in the current run of fully failed batches
    failed_actions: Vec<String>,
    corrections: HashMap<CorrectionKind, u32>,
    empty_retries: u32,
    iterations: u32,
    started: Instant,
    completed: Vec<String>,
}

impl Default for TurnState {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnState {
    pub fn new() -> Self {
        Self {
            files_read: HashSet::new(),
            duplicate_reads: 0,
            consecutive_failures: 0,
            failed_actions: Vec::new(),
            corrections: HashMap::new(),
            empty_retries: 0,
            iterations: 0,
            started: Instant::now(),
            completed: Vec::new(),
        }
    }

    /// Split off reads of files already read during this request, or
    /// earlier in the same batch. Returns the actions to run and the number
    /// dropped. Dropped reads count towards the duplicate-read threshold.
    pub fn filter_duplicate_reads(&mut self, actions: Vec<Action>) -> (Vec<Action>, usize) {
        let mut seen_in_batch = HashSet::new();
        let mut kept = Vec::with_capacity(actions.len());
        let mut dropped = 0;
        for action in actions {
            if let Some(path) = read_path(&action) {
                if self.files_read.contains(&path) || !seen_in_batch.insert(path) {
                    tracing::debug!("Dropping duplicate {}", action.label());
                    dropped += 1;
                    continue;
                }
            }
            kept.push(action);
        }
        self.duplicate_reads += dropped;
        (kept, dropped)
    }

    /// Total dropped duplicates since the last correction
    pub fn duplicate_reads(&self) -> usize {
        self.duplicate_reads
    }

    /// Start counting duplicates afresh after a correction
    pub fn reset_duplicate_reads(&mut self) {
        self.duplicate_reads = 0;
    }

    /// Remember successful reads so later turns do not repeat them
    pub fn record_reads(&mut self, actions: &[Action], results: &[ActionResult]) {
        for (action, result) in actions.iter().zip(results) {
            if !result.success {
                continue;
            }
            if let Some(path) = read_path(action) {
                self.files_read.insert(path);
            }
        }
    }

    /// Update the failure counter for an executed batch and return it.
    ///
    /// A non-empty batch where every action failed counts one failure; any
    /// success resets the counter. An empty batch leaves it alone.
    pub fn record_batch(&mut self, results: &[ActionResult]) -> u32 {
        for result in results.iter().filter(|r| r.success) {
            self.completed.push(result.action.clone());
        }
        if results.is_empty() {
            return self.consecutive_failures;
        }
        if results.iter().all(|r| !r.success) {
            self.consecutive_failures += 1;
            self.failed_actions
                .extend(results.iter().map(|r| r.action.clone()));
        } else {
            self.consecutive_failures = 0;
            self.failed_actions.clear();
        }
        self.consecutive_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Actions that failed during the current run of failed batches
    pub fn failed_actions(&self) -> &[String] {
        &self.failed_actions
    }

    /// Actions that succeeded during this request
    pub fn completed_actions(&self) -> &[String] {
        &self.completed
    }

    /// Count a correction of `kind`. Returns `false` once the bound is used
    /// up, in which case the caller must not inject another one.
    pub fn allow_correction(&mut self, kind: CorrectionKind, max: u32) -> bool {
        let count = self.corrections.entry(kind).or_insert(0);
        if *count >= max {
            return false;
        }
        *count += 1;
        true
    }

    /// Count an empty-turn retry. Returns `false` once `max` retries were spent.
    pub fn allow_empty_retry(&mut self, max: u32) -> bool {
        if self.empty_retries >= max {
            return false;
        }
        self.empty_retries += 1;
        true
    }

    /// Advance to the next model turn and return its 1-based number
    pub fn next_iteration(&mut self) -> u32 {
        self.iterations += 1;
        self.iterations
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}
