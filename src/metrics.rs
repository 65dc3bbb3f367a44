// src/metrics.rs
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Total issues created since start-up.
pub const ISSUES_CREATED: &str = "jira_rss_sync_issue_creation_total";
/// Total issue-creation failures since start-up.
pub const ISSUE_CREATION_ERRORS: &str = "jira_rss_sync_issue_creation_error_total";
/// Unix seconds at the end of the last completed sweep.
pub const LAST_RUN_TIME: &str = "jira_rss_sync_last_run_time";

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and register series descriptions so
    /// they show up on /metrics. Call once at startup.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");

        describe_counter!(
            ISSUES_CREATED,
            "The total number of issues created in Jira since start-up."
        );
        describe_counter!(
            ISSUE_CREATION_ERRORS,
            "The total of failures in creating Jira issues since start-up."
        );
        describe_gauge!(LAST_RUN_TIME, "Last run time in Unix seconds.");

        Self { handle }
    }
}
