//! Background collectors.
//!
//! A collector (RedEdr) is started before the payload, records for the whole
//! dynamic run, and is stopped afterwards. Stopping is a normal end of the
//! run, not a failure: the tool is terminated and whatever it wrote is
//! parsed.

use litterbox_core::types::{ScannerResult, ScannerStatus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapter::{RunMode, ScanTarget, ScannerAdapter};

pub struct Collector;

impl Collector {
    /// Spawn `adapter` as a collector. Cancelling `parent` (the job token)
    /// stops it as well.
    pub fn start(
        adapter: ScannerAdapter,
        target: ScanTarget,
        parent: &CancellationToken,
    ) -> RunningCollector {
        let stop = parent.child_token();
        let token = stop.clone();
        let name = adapter.name();
        info!(collector = name, target = %target.name, "starting collector");

        let handle = tokio::spawn(async move {
            adapter.run_mode(&target, &token, RunMode::Collect).await
        });

        RunningCollector { name, stop, handle }
    }
}

/// A collector that has been started and not yet stopped.
pub struct RunningCollector {
    name: &'static str,
    stop: CancellationToken,
    handle: JoinHandle<ScannerResult>,
}

impl RunningCollector {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the collector process already ended on its own.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the collector and return its parsed result.
    pub async fn stop(self) -> ScannerResult {
        self.stop.cancel();
        match self.handle.await {
            Ok(result) => {
                info!(collector = self.name, status = %result.status, "collector stopped");
                result
            }
            Err(e) => {
                warn!(collector = self.name, error = %e, "collector task failed");
                let mut result =
                    ScannerResult::skipped(self.name, format!("collector task failed: {e}"));
                result.status = ScannerStatus::Error;
                result
            }
        }
    }
}
