//! Per-candidate outcomes and the run summary.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::filter::RejectReason;

/// Terminal outcome of one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum CandidateOutcome {
    Uploaded,
    SkippedDuplicate,
    Rejected { reason: RejectReason, detail: String },
    Failed { error: String },
}

impl CandidateOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            CandidateOutcome::Uploaded => "uploaded",
            CandidateOutcome::SkippedDuplicate => "skipped-duplicate",
            CandidateOutcome::Rejected { .. } => "rejected",
            CandidateOutcome::Failed { .. } => "failed",
        }
    }
}

/// Record of what happened to one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateRecord {
    pub source_url: String,
    /// Set once the candidate passed the filter and was named.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_name: Option<String>,
    #[serde(flatten)]
    pub outcome: CandidateOutcome,
}

/// Aggregate counts for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_date: NaiveDate,
    pub discovered: usize,
    pub uploaded: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    pub rejected: BTreeMap<RejectReason, usize>,
    /// Set when the run ended early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

impl RunSummary {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            discovered: 0,
            uploaded: 0,
            skipped_duplicate: 0,
            failed: 0,
            rejected: BTreeMap::new(),
            fatal: None,
        }
    }

    pub fn record(&mut self, outcome: &CandidateOutcome) {
        match outcome {
            CandidateOutcome::Uploaded => self.uploaded += 1,
            CandidateOutcome::SkippedDuplicate => self.skipped_duplicate += 1,
            CandidateOutcome::Rejected { reason, .. } => {
                *self.rejected.entry(*reason).or_default() += 1
            }
            CandidateOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn rejected_for(&self, reason: RejectReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    /// Candidates that reached a terminal outcome.
    pub fn processed(&self) -> usize {
        self.uploaded + self.skipped_duplicate + self.failed + self.rejected_total()
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} discovered, {} processed, {} uploaded, {} skipped, {} failed, {} rejected",
            self.run_date.format("%Y-%m-%d"),
            self.discovered,
            self.processed(),
            self.uploaded,
            self.skipped_duplicate,
            self.failed,
            self.rejected_total()
        )?;
        if !self.rejected.is_empty() {
            let parts: Vec<String> = self
                .rejected
                .iter()
                .map(|(reason, n)| format!("{}={}", reason, n))
                .collect();
            write!(f, " ({})", parts.join(", "))?;
        }
        if let Some(ref fatal) = self.fatal {
            write!(f, "; aborted: {}", fatal)?;
        }
        Ok(())
    }
}
