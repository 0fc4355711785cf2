// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recovery cascade for documents that fail to parse.
//
// One run tries Standard, then Lenient, then Reconstruct, stopping at the
// first strategy that yields a document. Runs against the same input are
// capped, and a successful run is final: later triggers are refused.

use chrono::{DateTime, Utc};
use pagewerk_core::error::{PagewerkError, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::library::{DocumentLibrary, LoadOptions, PageDocument, SaveOptions};

/// Most full runs allowed against one input. Configured caps are clamped
/// into `1..=DEFAULT_MAX_RUNS`.
pub const DEFAULT_MAX_RUNS: u32 = 3;

/// A repair strategy, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// Strict parse, encryption headers ignored.
    Standard,
    /// Parse with relaxed structural tolerance.
    Lenient,
    /// Copy whatever pages can be read into a brand-new document.
    Reconstruct,
}

impl Strategy {
    pub const ORDER: [Strategy; 3] = [Self::Standard, Self::Lenient, Self::Reconstruct];

    /// Name shown to the user as the repair method.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Lenient => "recovery",
            Self::Reconstruct => "reconstruction",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one strategy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success { page_count: usize, bytes: Vec<u8> },
    Failure { message: String },
}

/// One entry in the append-only attempt log.
#[derive(Debug, Clone)]
pub struct RecoveryAttempt {
    pub strategy: Strategy,
    /// Which run (1-based) this attempt belongs to.
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
    pub finished_at: DateTime<Utc>,
}

/// Where the cascade currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeState {
    Idle,
    Attempting(Strategy),
    Succeeded(Strategy),
    ExhaustedFailure,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub strategy: Strategy,
    pub page_count: usize,
    pub bytes: Vec<u8>,
    /// 0-based indices of source pages that could not be copied.
    pub skipped_pages: Vec<usize>,
    pub original_size: usize,
    pub repaired_size: usize,
    pub attempt_number: u32,
}

/// Document produced by one strategy, plus any pages it had to drop.
struct Salvaged<D> {
    document: D,
    skipped_pages: Vec<usize>,
}

/// Recovery state machine for one input document.
#[derive(Debug)]
pub struct RecoveryCascade {
    state: CascadeState,
    attempts: Vec<RecoveryAttempt>,
    runs: u32,
    max_runs: u32,
    input_digest: Option<String>,
    save_options: SaveOptions,
}

impl Default for RecoveryCascade {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RUNS)
    }
}

impl RecoveryCascade {
    /// A cascade allowing `max_runs` full runs, clamped into
    /// `1..=DEFAULT_MAX_RUNS`.
    pub fn new(max_runs: u32) -> Self {
        let clamped = max_runs.clamp(1, DEFAULT_MAX_RUNS);
        if clamped != max_runs {
            warn!(requested = max_runs, allowed = clamped, "repair run cap clamped");
        }
        Self {
            state: CascadeState::Idle,
            attempts: Vec::new(),
            runs: 0,
            max_runs: clamped,
            input_digest: None,
            save_options: SaveOptions::default(),
        }
    }

    pub fn with_save_options(mut self, save_options: SaveOptions) -> Self {
        self.save_options = save_options;
        self
    }

    pub fn state(&self) -> CascadeState {
        self.state
    }

    pub fn attempts(&self) -> &[RecoveryAttempt] {
        &self.attempts
    }

    /// Full runs made against the current input.
    pub fn runs(&self) -> u32 {
        self.runs
    }

    pub fn remaining_runs(&self) -> u32 {
        self.max_runs.saturating_sub(self.runs)
    }

    /// Forget the current input and its history.
    pub fn reset(&mut self) {
        self.state = CascadeState::Idle;
        self.attempts.clear();
        self.runs = 0;
        self.input_digest = None;
    }

    /// Run the whole cascade once against `bytes`.
    ///
    /// A different input than last time resets the history first. Refuses to
    /// run once the input has been recovered or the run cap is reached.
    #[instrument(skip_all, fields(bytes_len = bytes.len()))]
    pub fn run<L: DocumentLibrary>(&mut self, library: &L, bytes: &[u8]) -> Result<RecoveryReport> {
        let digest = hex::encode(Sha256::digest(bytes));
        if self.input_digest.as_deref() != Some(digest.as_str()) {
            if self.input_digest.is_some() {
                debug!("new input, resetting repair history");
            }
            self.reset();
            self.input_digest = Some(digest);
        }

        if let CascadeState::Succeeded(strategy) = self.state {
            return Err(PagewerkError::RepairRefused(format!(
                "document was already recovered using the {strategy} method"
            )));
        }
        if self.runs >= self.max_runs {
            return Err(PagewerkError::RepairRefused(format!(
                "all {} repair attempts have been used",
                self.max_runs
            )));
        }

        self.runs += 1;
        let attempt_number = self.runs;
        info!(attempt_number, max_runs = self.max_runs, "starting repair run");

        let mut last_error = String::new();

        for strategy in Strategy::ORDER {
            self.state = CascadeState::Attempting(strategy);
            debug!(%strategy, "attempting");

            let salvaged = match attempt(library, strategy, bytes) {
                Ok(salvaged) => salvaged,
                Err(err) => {
                    warn!(%strategy, error = %err, "repair strategy failed");
                    last_error = err.to_string();
                    self.record(strategy, attempt_number, AttemptOutcome::Failure {
                        message: last_error.clone(),
                    });
                    continue;
                }
            };

            let Salvaged {
                mut document,
                skipped_pages,
            } = salvaged;
            let page_count = document.page_count();

            let output = match document.save(&self.save_options) {
                Ok(output) => output,
                Err(err) => {
                    self.record(strategy, attempt_number, AttemptOutcome::Failure {
                        message: err.to_string(),
                    });
                    self.state = CascadeState::ExhaustedFailure;
                    return Err(err);
                }
            };

            self.record(strategy, attempt_number, AttemptOutcome::Success {
                page_count,
                bytes: output.clone(),
            });
            self.state = CascadeState::Succeeded(strategy);
            info!(
                %strategy,
                page_count,
                skipped = skipped_pages.len(),
                original_size = bytes.len(),
                repaired_size = output.len(),
                "repair succeeded"
            );

            return Ok(RecoveryReport {
                strategy,
                page_count,
                repaired_size: output.len(),
                bytes: output,
                skipped_pages,
                original_size: bytes.len(),
                attempt_number,
            });
        }

        self.state = CascadeState::ExhaustedFailure;
        warn!(attempt_number, "all repair strategies failed");
        Err(PagewerkError::RepairExhausted(last_error))
    }

    fn record(&mut self, strategy: Strategy, attempt_number: u32, outcome: AttemptOutcome) {
        self.attempts.push(RecoveryAttempt {
            strategy,
            attempt_number,
            outcome,
            finished_at: Utc::now(),
        });
    }
}

fn attempt<L: DocumentLibrary>(
    library: &L,
    strategy: Strategy,
    bytes: &[u8],
) -> Result<Salvaged<L::Document>> {
    match strategy {
        Strategy::Standard => Ok(Salvaged {
            document: library.load(bytes, LoadOptions::strict())?,
            skipped_pages: Vec::new(),
        }),
        Strategy::Lenient => Ok(Salvaged {
            document: library.load(bytes, LoadOptions::lenient())?,
            skipped_pages: Vec::new(),
        }),
        Strategy::Reconstruct => reconstruct(library, bytes),
    }
}

/// Copy pages one at a time into a fresh document, skipping any that fail.
fn reconstruct<L: DocumentLibrary>(library: &L, bytes: &[u8]) -> Result<Salvaged<L::Document>> {
    let source = library.load(bytes, LoadOptions::salvage())?;
    let mut document = library.create();
    let mut skipped_pages = Vec::new();

    for index in 0..source.page_count() {
        let copied = match document.copy_pages(&source, &[index]) {
            Ok(pages) => pages
                .into_iter()
                .try_for_each(|page| document.add_page(page)),
            Err(err) => Err(err),
        };

        if let Err(err) = copied {
            warn!(page = index + 1, error = %err, "failed to copy page, skipping");
            skipped_pages.push(index);
        }
    }

    if document.page_count() == 0 {
        return Err(PagewerkError::Parse("no pages could be recovered".into()));
    }

    Ok(Salvaged {
        document,
        skipped_pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDocument, MemoryLibrary, MemoryPage, Structure};

    fn pages(n: usize) -> Vec<MemoryPage> {
        (1..=n).map(|i| MemoryPage::new(format!("p{i}"))).collect()
    }

    fn input(doc: MemoryDocument) -> Vec<u8> {
        doc.to_bytes().unwrap()
    }

    fn strategies(cascade: &RecoveryCascade) -> Vec<Strategy> {
        cascade.attempts().iter().map(|a| a.strategy).collect()
    }

    #[test]
    fn intact_document_uses_standard() {
        let bytes = input(MemoryDocument::with_pages(pages(2)));
        let mut cascade = RecoveryCascade::default();

        let report = cascade.run(&MemoryLibrary, &bytes).unwrap();
        assert_eq!(report.strategy, Strategy::Standard);
        assert_eq!(report.page_count, 2);
        assert_eq!(strategies(&cascade), vec![Strategy::Standard]);
        assert_eq!(cascade.state(), CascadeState::Succeeded(Strategy::Standard));
    }

    #[test]
    fn malformed_structure_falls_back_to_lenient() {
        let bytes = input(MemoryDocument::with_pages(pages(3)).with_structure(Structure::Malformed));
        let mut cascade = RecoveryCascade::default();

        let report = cascade.run(&MemoryLibrary, &bytes).unwrap();
        assert_eq!(report.strategy, Strategy::Lenient);
        assert_eq!(strategies(&cascade), vec![Strategy::Standard, Strategy::Lenient]);
        assert!(matches!(
            cascade.attempts()[0].outcome,
            AttemptOutcome::Failure { .. }
        ));
    }

    #[test]
    fn reconstruction_skips_unrecoverable_page() {
        let mut doc_pages = pages(5);
        doc_pages[2] = doc_pages[2].clone().corrupted();
        let bytes = input(MemoryDocument::with_pages(doc_pages));
        let mut cascade = RecoveryCascade::default();

        let report = cascade.run(&MemoryLibrary, &bytes).unwrap();
        assert_eq!(report.strategy, Strategy::Reconstruct);
        assert_eq!(report.page_count, 4);
        assert_eq!(report.skipped_pages, vec![2]);
        assert_eq!(
            strategies(&cascade),
            vec![Strategy::Standard, Strategy::Lenient, Strategy::Reconstruct]
        );

        let repaired = MemoryDocument::from_bytes(&report.bytes).unwrap();
        assert_eq!(repaired.labels(), vec!["p1", "p2", "p4", "p5"]);
    }

    #[test]
    fn unreadable_input_exhausts_with_underlying_message() {
        let bytes = input(MemoryDocument::with_pages(pages(1)).with_structure(Structure::Unreadable));
        let mut cascade = RecoveryCascade::default();

        let err = cascade.run(&MemoryLibrary, &bytes).unwrap_err();
        match err {
            PagewerkError::RepairExhausted(message) => assert!(message.contains("no readable objects")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(cascade.state(), CascadeState::ExhaustedFailure);
        assert_eq!(cascade.attempts().len(), 3);
    }

    #[test]
    fn zero_recovered_pages_is_failure() {
        let bytes = input(MemoryDocument::with_pages(vec![
            MemoryPage::new("a").corrupted(),
            MemoryPage::new("b").corrupted(),
        ]));
        let mut cascade = RecoveryCascade::default();

        let err = cascade.run(&MemoryLibrary, &bytes).unwrap_err();
        assert!(err.to_string().contains("no pages could be recovered"));
    }

    #[test]
    fn fourth_run_is_refused() {
        let bytes = input(MemoryDocument::with_pages(pages(1)).with_structure(Structure::Unreadable));
        let mut cascade = RecoveryCascade::default();

        for run in 1..=3 {
            assert!(matches!(
                cascade.run(&MemoryLibrary, &bytes),
                Err(PagewerkError::RepairExhausted(_))
            ));
            assert_eq!(cascade.runs(), run);
        }

        let logged = cascade.attempts().len();
        assert!(matches!(
            cascade.run(&MemoryLibrary, &bytes),
            Err(PagewerkError::RepairRefused(_))
        ));
        assert_eq!(cascade.runs(), 3);
        assert_eq!(cascade.attempts().len(), logged);
        assert_eq!(
            cascade.attempts().iter().map(|a| a.attempt_number).collect::<Vec<_>>(),
            vec![1, 1, 1, 2, 2, 2, 3, 3, 3]
        );
    }

    #[test]
    fn run_cap_cannot_exceed_three() {
        let bytes = input(MemoryDocument::with_pages(pages(1)).with_structure(Structure::Unreadable));
        let mut cascade = RecoveryCascade::new(10);
        assert_eq!(cascade.remaining_runs(), 3);

        for _ in 0..3 {
            assert!(matches!(
                cascade.run(&MemoryLibrary, &bytes),
                Err(PagewerkError::RepairExhausted(_))
            ));
        }
        assert!(matches!(
            cascade.run(&MemoryLibrary, &bytes),
            Err(PagewerkError::RepairRefused(_))
        ));
        assert_eq!(cascade.runs(), 3);
    }

    #[test]
    fn zero_cap_still_allows_one_run() {
        let bytes = input(MemoryDocument::with_pages(pages(1)));
        let mut cascade = RecoveryCascade::new(0);

        assert_eq!(cascade.remaining_runs(), 1);
        assert!(cascade.run(&MemoryLibrary, &bytes).is_ok());
    }

    #[test]
    fn success_is_final() {
        let bytes = input(MemoryDocument::with_pages(pages(1)));
        let mut cascade = RecoveryCascade::default();

        cascade.run(&MemoryLibrary, &bytes).unwrap();
        assert!(matches!(
            cascade.run(&MemoryLibrary, &bytes),
            Err(PagewerkError::RepairRefused(_))
        ));
        assert_eq!(cascade.runs(), 1);
        assert_eq!(cascade.attempts().len(), 1);
    }

    #[test]
    fn new_input_resets_history() {
        let broken = input(MemoryDocument::with_pages(pages(1)).with_structure(Structure::Unreadable));
        let mut cascade = RecoveryCascade::new(1);

        assert!(cascade.run(&MemoryLibrary, &broken).is_err());
        assert_eq!(cascade.remaining_runs(), 0);

        let healthy = input(MemoryDocument::with_pages(pages(2)));
        let report = cascade.run(&MemoryLibrary, &healthy).unwrap();
        assert_eq!(report.attempt_number, 1);
        assert_eq!(cascade.attempts().len(), 1);
    }

    #[test]
    fn save_failure_is_fatal() {
        let mut doc = MemoryDocument::with_pages(pages(1));
        doc.fail_on_save = true;
        let bytes = input(doc);
        let mut cascade = RecoveryCascade::default();

        assert!(matches!(
            cascade.run(&MemoryLibrary, &bytes),
            Err(PagewerkError::Save(_))
        ));
        assert_eq!(strategies(&cascade), vec![Strategy::Standard]);
        assert_eq!(cascade.state(), CascadeState::ExhaustedFailure);
    }
}
