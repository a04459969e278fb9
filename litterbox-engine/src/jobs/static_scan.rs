//! File scanners, run in parallel on a bounded worker pool.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use litterbox_core::config::ScannersConfig;
use litterbox_core::target::AnalysisTarget;
use litterbox_core::types::ScannerResult;
use litterbox_risk::ScanResults;
use litterbox_scanners::{ScanTarget, ScannerAdapter, ScannerKind};

/// Run every static scanner against the artifact at `path`.
///
/// `workers` is shared across jobs, so concurrent static analyses of
/// different targets draw from the same pool.
pub(crate) async fn run(
    scanners: &ScannersConfig,
    workers: &Arc<Semaphore>,
    target: &AnalysisTarget,
    path: &Path,
    cancel: &CancellationToken,
) -> ScanResults {
    let mut tasks = JoinSet::new();

    for kind in ScannerKind::STATIC {
        let adapter = ScannerAdapter::new(kind, scanners, false);
        let scan_target = ScanTarget::file(path, target.name.clone());
        let workers = Arc::clone(workers);
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return ScannerResult::skipped(adapter.name(), "worker pool closed");
            };
            adapter.run(&scan_target, &cancel).await
        });
    }

    debug!(target_id = %target.id, scanners = tasks.len(), "static scanners started");
    let mut results = ScanResults::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(result) => {
                results.insert(result.scanner.clone(), result);
            }
            Err(e) => warn!(target_id = %target.id, error = %e, "scanner task failed"),
        }
    }
    results
}
