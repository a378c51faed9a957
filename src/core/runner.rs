use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use super::models::{DestinationContainer, RunReport, TransferItem};
use super::orchestrator::{PollPolicy, TransferOrchestrator};
use crate::context::AppContext;
use crate::destination::{DestinationService, FolderProvisioner};
use crate::error::RunError;
use crate::source::{ObjectStore, SourceLister, UrlSigner};

/// Result of one run. `container` is absent when nothing was listed.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub container: Option<DestinationContainer>,
    pub report: RunReport,
}

/// Sequences list, sign, provision, and transfer for one prefix.
pub struct Runner {
    lister: SourceLister,
    signer: UrlSigner,
    provisioner: FolderProvisioner,
    orchestrator: TransferOrchestrator,
    concurrency_limit: usize,
}

impl Runner {
    pub fn new(
        lister: SourceLister,
        signer: UrlSigner,
        provisioner: FolderProvisioner,
        orchestrator: TransferOrchestrator,
        concurrency_limit: usize,
    ) -> Self {
        Self {
            lister,
            signer,
            provisioner,
            orchestrator,
            concurrency_limit,
        }
    }

    /// Wire every component from the shared context.
    pub fn from_context(
        ctx: &AppContext,
        store: Arc<dyn ObjectStore>,
        destination: Arc<dyn DestinationService>,
    ) -> Self {
        let config = &ctx.config;
        let policy = PollPolicy {
            interval: config.poll_interval(),
            max_polls: config.max_polls,
        };

        Self::new(
            SourceLister::new(Arc::clone(&store)),
            UrlSigner::new(store, config.url_expiry()),
            FolderProvisioner::new(Arc::clone(&destination), config.destination_root.clone()),
            TransferOrchestrator::new(destination, policy)
                .with_progress(ctx.progress.clone())
                .with_cancellation(ctx.cancel.clone()),
            config.concurrency_limit,
        )
    }

    pub async fn run(&self, prefix: &str) -> Result<RunSummary, RunError> {
        let run_id = Uuid::now_v7();
        self.run_inner(run_id, prefix)
            .instrument(info_span!("run", %run_id))
            .await
    }

    async fn run_inner(&self, run_id: Uuid, prefix: &str) -> Result<RunSummary, RunError> {
        let listed = self.lister.list(prefix).await?;
        let keys = transferable_keys(listed);

        if keys.is_empty() {
            info!(prefix, "No matching source objects found");
            return Ok(RunSummary {
                run_id,
                container: None,
                report: RunReport::empty(),
            });
        }

        info!(prefix, count = keys.len(), "Found source objects");

        let signed = self.signer.sign_all(&keys).await?;
        let container = self.provisioner.provision().await?;

        let items = signed
            .into_iter()
            .map(|(key, url)| TransferItem::new(key, url, &container))
            .collect();

        let report = self
            .orchestrator
            .run(items, &container, self.concurrency_limit)
            .await?;

        Ok(RunSummary {
            run_id,
            container: Some(container),
            report,
        })
    }
}

/// Drop folder placeholder keys; they have no file name to save under.
pub fn transferable_keys(keys: Vec<String>) -> Vec<String> {
    let (placeholders, files): (Vec<_>, Vec<_>) =
        keys.into_iter().partition(|key| key.ends_with('/'));
    if !placeholders.is_empty() {
        warn!(count = placeholders.len(), "Skipping folder placeholder keys");
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_keys_are_dropped() {
        let keys = vec![
            "a/".to_string(),
            "a/1.txt".to_string(),
            "a/sub/".to_string(),
            "a/sub/2.txt".to_string(),
        ];
        assert_eq!(transferable_keys(keys), vec!["a/1.txt", "a/sub/2.txt"]);
    }
}
