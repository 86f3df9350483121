//! The `run` command: one harvest run with the configured store.

use std::process::ExitCode;

use tracing::error;

use crate::config::{HarvestConfig, StoreConfig};
use crate::error::RunFatalError;
use crate::http_client::HttpClient;
use crate::pipeline::{Harvester, RunReport};
use crate::store::{DestinationStore, DropboxStore, LocalStore};

/// Execute one run and map its result to an exit code.
pub async fn cmd_run(config: HarvestConfig) -> anyhow::Result<ExitCode> {
    config.validate()?;

    let fetcher = HttpClient::new(
        config.request_timeout(),
        config.user_agent.as_deref(),
        config.fetch_retry_policy(),
    )?;

    let report = match &config.store {
        StoreConfig::Local { local_dir } => {
            execute(&config, fetcher, LocalStore::new(local_dir.clone())).await?
        }
        StoreConfig::Dropbox => match DropboxStore::from_env(config.request_timeout()) {
            Ok(store) => execute(&config, fetcher, store).await?,
            Err(e) => {
                let fatal = RunFatalError::CredentialInvalid(e);
                error!(error = %fatal, "run aborted before start");
                return Ok(ExitCode::from(RunFatalError::EXIT_STATUS));
            }
        },
    };

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(RunFatalError::EXIT_STATUS))
    }
}

async fn execute<S: DestinationStore>(
    config: &HarvestConfig,
    fetcher: HttpClient,
    store: S,
) -> anyhow::Result<RunReport> {
    let mut harvester = Harvester::new(config, fetcher, store)?;
    Ok(harvester.run().await)
}
