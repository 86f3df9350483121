//! Run orchestration: fetch the page, extract candidates, then fetch, filter,
//! name and upload each candidate in turn.

mod summary;

pub use summary::{CandidateOutcome, CandidateRecord, RunSummary};

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::HarvestConfig;
use crate::error::{RunFatalError, StoreError};
use crate::extract::{ImageCandidate, ImageExtractor, PageDocument};
use crate::filter::{FilterDecision, ImageBytes, ImageFilter, RejectReason};
use crate::http_client::Fetcher;
use crate::naming::destination_name;
use crate::retry::RetryPolicy;
use crate::store::{DestinationStore, ExistingNames, UploadStatus};

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    FetchingPage,
    ExtractingCandidates,
    ProcessingCandidates,
    Finalizing,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Idle => "idle",
            RunState::FetchingPage => "fetching-page",
            RunState::ExtractingCandidates => "extracting-candidates",
            RunState::ProcessingCandidates => "processing-candidates",
            RunState::Finalizing => "finalizing",
            RunState::Done => "done",
        };
        f.write_str(s)
    }
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct RunReport {
    pub summary: RunSummary,
    pub records: Vec<CandidateRecord>,
    /// Set when the run ended early.
    pub fatal: Option<RunFatalError>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.fatal.is_none()
    }
}

/// Drives one run against a fetcher and a destination store.
pub struct Harvester<F, S> {
    source_url: Url,
    destination_folder: String,
    run_date: NaiveDate,
    pacing: Duration,
    upload_retry: RetryPolicy,
    extractor: ImageExtractor,
    filter: ImageFilter,
    fetcher: F,
    store: S,
    state: RunState,
}

impl<F: Fetcher, S: DestinationStore> Harvester<F, S> {
    /// Build a harvester from a validated configuration.
    pub fn new(config: &HarvestConfig, fetcher: F, store: S) -> Result<Self, url::ParseError> {
        Ok(Self {
            source_url: Url::parse(&config.source_url)?,
            destination_folder: config.destination_folder.clone(),
            run_date: config.effective_run_date(),
            pacing: config.pacing(),
            upload_retry: config.upload_retry_policy(),
            extractor: ImageExtractor::new(&config.lazy_attributes, &config.allowed_extensions),
            filter: ImageFilter::from_config(config),
            fetcher,
            store,
            state: RunState::Idle,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!("run state {} -> {}", self.state, next);
        self.state = next;
    }

    /// Execute one run. Always returns a report; fatal errors are carried in
    /// `RunReport::fatal` with the summary covering candidates processed so far.
    pub async fn run(&mut self) -> RunReport {
        let mut summary = RunSummary::new(self.run_date);
        let mut records = Vec::new();

        info!(
            url = %self.source_url,
            folder = %self.destination_folder,
            store = self.store.name(),
            date = %self.run_date,
            "harvest run starting"
        );

        let fatal = self.execute(&mut summary, &mut records).await.err();

        self.transition(RunState::Finalizing);
        if let Some(ref err) = fatal {
            error!(error = %err, "run aborted");
            summary.fatal = Some(err.to_string());
        }
        info!(
            discovered = summary.discovered,
            processed = summary.processed(),
            uploaded = summary.uploaded,
            skipped_duplicate = summary.skipped_duplicate,
            failed = summary.failed,
            rejected = summary.rejected_total(),
            fatal = summary.is_fatal(),
            "run summary: {}",
            summary
        );
        self.transition(RunState::Done);

        RunReport {
            summary,
            records,
            fatal,
        }
    }

    async fn execute(
        &mut self,
        summary: &mut RunSummary,
        records: &mut Vec<CandidateRecord>,
    ) -> Result<(), RunFatalError> {
        self.store
            .verify()
            .await
            .map_err(RunFatalError::from_startup)?;

        self.transition(RunState::FetchingPage);
        let page_bytes = self
            .fetcher
            .fetch(self.source_url.as_str())
            .await
            .map_err(RunFatalError::PageUnreachable)?;
        info!(bytes = page_bytes.len(), "fetched source page");

        self.transition(RunState::ExtractingCandidates);
        let page = PageDocument::from_bytes(self.source_url.clone(), &page_bytes);
        let candidates = self.extractor.extract(&page);
        summary.discovered = candidates.len();
        info!(candidates = candidates.len(), "extracted image candidates");
        if candidates.is_empty() {
            warn!("no images found on {}", self.source_url);
            return Ok(());
        }

        let mut existing = ExistingNames::load(&self.store, &self.destination_folder)
            .await
            .map_err(RunFatalError::from_startup)?;
        if existing.is_empty() {
            info!(folder = %self.destination_folder, "destination folder is empty or missing");
        } else {
            debug!(existing = existing.len(), "loaded existing names");
        }

        self.transition(RunState::ProcessingCandidates);
        let total = candidates.len();
        for (i, candidate) in candidates.into_iter().enumerate() {
            // The page fetch counts as the preceding request.
            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }

            let (record, fatal) = self.process(&candidate, &mut existing).await;
            summary.record(&record.outcome);
            log_record(i + 1, total, &record);
            records.push(record);

            if let Some(err) = fatal {
                return Err(err);
            }
        }

        Ok(())
    }

    /// Take one candidate to a terminal outcome. A fatal store error is
    /// returned alongside the failed record.
    async fn process(
        &self,
        candidate: &ImageCandidate,
        existing: &mut ExistingNames,
    ) -> (CandidateRecord, Option<RunFatalError>) {
        let mut record = CandidateRecord {
            source_url: candidate.url.to_string(),
            destination_name: None,
            outcome: CandidateOutcome::Uploaded,
        };

        let bytes = match self.fetcher.fetch(candidate.url.as_str()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                record.outcome = CandidateOutcome::Rejected {
                    reason: RejectReason::FetchError,
                    detail: e.to_string(),
                };
                return (record, None);
            }
        };

        let mut image = ImageBytes::new(bytes);
        if let FilterDecision::Rejected { reason, detail } =
            self.filter.decide(candidate, &mut image)
        {
            record.outcome = CandidateOutcome::Rejected { reason, detail };
            return (record, None);
        }

        let name = destination_name(self.run_date, &candidate.original_filename);
        record.destination_name = Some(name.clone());

        if existing.exists(&name) {
            record.outcome = CandidateOutcome::SkippedDuplicate;
            return (record, None);
        }

        match self.upload(&name, image.as_slice()).await {
            Ok(UploadStatus::Created) => {
                existing.insert(name);
                (record, None)
            }
            Ok(UploadStatus::AlreadyExists) => {
                existing.insert(name);
                record.outcome = CandidateOutcome::SkippedDuplicate;
                (record, None)
            }
            Err(e) if e.is_fatal() => {
                record.outcome = CandidateOutcome::Failed {
                    error: e.to_string(),
                };
                (record, Some(RunFatalError::Upload { name, source: e }))
            }
            Err(e) => {
                record.outcome = CandidateOutcome::Failed {
                    error: e.to_string(),
                };
                (record, None)
            }
        }
    }

    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<UploadStatus, StoreError> {
        let folder = self.destination_folder.as_str();
        self.upload_retry
            .run(name, StoreError::is_transient, || {
                self.store.upload(folder, name, bytes)
            })
            .await
    }
}

fn log_record(index: usize, total: usize, record: &CandidateRecord) {
    let name = record.destination_name.as_deref().unwrap_or("-");
    match &record.outcome {
        CandidateOutcome::Uploaded | CandidateOutcome::SkippedDuplicate => info!(
            url = %record.source_url,
            name,
            outcome = record.outcome.label(),
            "[{}/{}] {}",
            index,
            total,
            record.outcome.label()
        ),
        CandidateOutcome::Rejected { reason, detail } => info!(
            url = %record.source_url,
            outcome = record.outcome.label(),
            reason = reason.as_str(),
            detail = detail.as_str(),
            "[{}/{}] rejected ({})",
            index,
            total,
            reason
        ),
        CandidateOutcome::Failed { error } => warn!(
            url = %record.source_url,
            name,
            outcome = record.outcome.label(),
            error = error.as_str(),
            "[{}/{}] failed",
            index,
            total
        ),
    }
}
