pub mod config;
pub mod fixtures;

use std::time::Duration;

use litterbox_core::types::TargetId;
use litterbox_engine::Orchestrator;
use litterbox_store::RecordRepository;

/// Poll until `id` has a job in flight. Panics after five seconds.
#[allow(dead_code)]
pub async fn wait_for_active_job<R: RecordRepository>(engine: &Orchestrator<R>, id: &TargetId) {
    for _ in 0..100 {
        let record = engine.results(id).await.expect("target should exist");
        if record.active_job().is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("no job started for {id}");
}
