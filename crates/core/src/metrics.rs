//! Metric names and descriptions.
//!
//! Every crate records through the `metrics` facade using these constants.
//! No exporter is installed by the engine itself; an embedding service picks
//! one (or none).
//!
//! # Naming
//!
//! - prefix: `litterbox_`
//! - suffix: `_total` (counter), `_seconds` (histogram), none (gauge)
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(litterbox_core::metrics::SCANNER_RUNS_TOTAL,
//!     litterbox_core::metrics::LABEL_SCANNER => "moneta").increment(1);
//! ```

// ─── labels ──────────────────────────────────────────────────────────

/// Scanner name label key.
pub const LABEL_SCANNER: &str = "scanner";

/// Scanner or job outcome label key (success, error, timeout, skipped, ...).
pub const LABEL_STATUS: &str = "status";

/// Analysis type label key (static, dynamic, holygrail, fuzzy).
pub const LABEL_ANALYSIS: &str = "analysis";

/// Risk level label key.
pub const LABEL_LEVEL: &str = "level";

// ─── targets ─────────────────────────────────────────────────────────

/// Targets registered, files and processes (counter)
pub const TARGETS_REGISTERED_TOTAL: &str = "litterbox_targets_registered_total";

/// Uploads rejected by validation (counter)
pub const UPLOADS_REJECTED_TOTAL: &str = "litterbox_uploads_rejected_total";

/// Targets deleted (counter)
pub const TARGETS_DELETED_TOTAL: &str = "litterbox_targets_deleted_total";

// ─── jobs ────────────────────────────────────────────────────────────

/// Jobs started, label: analysis (counter)
pub const JOBS_STARTED_TOTAL: &str = "litterbox_jobs_started_total";

/// Jobs finished, labels: analysis, status (counter)
pub const JOBS_FINISHED_TOTAL: &str = "litterbox_jobs_finished_total";

/// Jobs rejected with a conflict, label: analysis (counter)
pub const JOBS_REJECTED_TOTAL: &str = "litterbox_jobs_rejected_total";

/// Job wall time, label: analysis (histogram, seconds)
pub const JOB_DURATION_SECONDS: &str = "litterbox_job_duration_seconds";

/// Jobs currently running (gauge)
pub const JOBS_ACTIVE: &str = "litterbox_jobs_active";

// ─── scanners ────────────────────────────────────────────────────────

/// Scanner invocations, labels: scanner, status (counter)
pub const SCANNER_RUNS_TOTAL: &str = "litterbox_scanner_runs_total";

/// Scanner wall time, label: scanner (histogram, seconds)
pub const SCANNER_DURATION_SECONDS: &str = "litterbox_scanner_duration_seconds";

/// Scanner output that could not be parsed, label: scanner (counter)
pub const SCANNER_PARSE_ERRORS_TOTAL: &str = "litterbox_scanner_parse_errors_total";

// ─── risk ────────────────────────────────────────────────────────────

/// Risk assessments produced, labels: analysis, level (counter)
pub const RISK_ASSESSMENTS_TOTAL: &str = "litterbox_risk_assessments_total";

/// Register descriptions for every metric.
///
/// Call once after installing a recorder.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Targets
    describe_counter!(
        TARGETS_REGISTERED_TOTAL,
        "Total number of analysis targets registered"
    );
    describe_counter!(
        UPLOADS_REJECTED_TOTAL,
        "Uploads rejected for extension, size or content"
    );
    describe_counter!(TARGETS_DELETED_TOTAL, "Total number of targets deleted");

    // Jobs
    describe_counter!(JOBS_STARTED_TOTAL, "Analysis jobs started per type");
    describe_counter!(
        JOBS_FINISHED_TOTAL,
        "Analysis jobs finished per type and terminal status"
    );
    describe_counter!(
        JOBS_REJECTED_TOTAL,
        "Analysis requests rejected because a conflicting job was running"
    );
    describe_histogram!(JOB_DURATION_SECONDS, "Analysis job wall time in seconds");
    describe_gauge!(JOBS_ACTIVE, "Analysis jobs currently running");

    // Scanners
    describe_counter!(
        SCANNER_RUNS_TOTAL,
        "Scanner invocations per scanner and outcome"
    );
    describe_histogram!(
        SCANNER_DURATION_SECONDS,
        "Scanner invocation wall time in seconds"
    );
    describe_counter!(
        SCANNER_PARSE_ERRORS_TOTAL,
        "Scanner runs whose output could not be parsed"
    );

    // Risk
    describe_counter!(
        RISK_ASSESSMENTS_TOTAL,
        "Risk assessments produced per analysis type and level"
    );
}
