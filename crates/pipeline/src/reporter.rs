//! Turns per-path outcomes into counters and log lines

use shutter_core::UploadOutcome;
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Totals across every outcome seen by the reporter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: u64,
    pub ignored: u64,
    pub errors: u64,
}

impl UploadSummary {
    pub fn record(&mut self, outcome: &UploadOutcome) {
        match outcome {
            UploadOutcome::Completed(_) => self.uploaded += 1,
            UploadOutcome::Ignored(..) => self.ignored += 1,
            UploadOutcome::Failed(..) => self.errors += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.uploaded + self.ignored + self.errors
    }
}

impl fmt::Display for UploadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files uploaded, {} files ignored, {} errors",
            self.uploaded, self.ignored, self.errors
        )
    }
}

/// Single consumer of the pool's outcome stream
///
/// Counters belong to the reporter task alone. The reporter never touches
/// the status store.
pub struct OutcomeReporter {
    outcomes: mpsc::UnboundedReceiver<UploadOutcome>,
    summary: UploadSummary,
}

impl OutcomeReporter {
    pub fn new(outcomes: mpsc::UnboundedReceiver<UploadOutcome>) -> Self {
        Self {
            outcomes,
            summary: UploadSummary::default(),
        }
    }

    /// Run on its own task; the handle resolves to the final summary
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<UploadSummary> {
        tokio::spawn(self.run(cancel))
    }

    /// Consume outcomes until cancelled or every sender is gone
    ///
    /// On cancellation, outcomes already buffered are still counted.
    pub async fn run(mut self, cancel: CancellationToken) -> UploadSummary {
        loop {
            tokio::select! {
                biased;

                outcome = self.outcomes.recv() => match outcome {
                    Some(outcome) => self.report(outcome),
                    None => break,
                },

                _ = cancel.cancelled() => {
                    while let Ok(outcome) = self.outcomes.try_recv() {
                        self.report(outcome);
                    }
                    break;
                }
            }
        }

        debug!("Outcome reporter stopped ({})", self.summary);
        self.summary
    }

    fn report(&mut self, outcome: UploadOutcome) {
        match &outcome {
            UploadOutcome::Completed(path) => {
                info!("Upload of '{}' completed", path.display());
            }
            UploadOutcome::Ignored(path, reason) => {
                info!("Not uploading '{}': {}", path.display(), reason);
            }
            UploadOutcome::Failed(path, cause) => {
                warn!("Upload error for '{}': {}", path.display(), cause);
            }
        }
        self.summary.record(&outcome);
    }
}
