//! Feed Orchestrator
//!
//! Starts one supervisor task per feed endpoint and waits for all of them.
//! Tasks are isolated: a supervisor that finishes, gives up or panics never
//! affects the others.

use tokio::task::JoinSet;

use crate::application::services::supervisor::{ConnectionSupervisor, SupervisorOutcome};
use crate::domain::streaming::FeedKind;

/// Result of one supervisor task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedReport {
    /// Feed the supervisor owned.
    pub feed: FeedKind,
    /// Endpoint URL.
    pub url: String,
    /// How it finished.
    pub outcome: SupervisorOutcome,
}

/// Runs a set of connection supervisors concurrently.
#[derive(Debug, Default)]
pub struct FeedOrchestrator {
    supervisors: Vec<ConnectionSupervisor>,
}

impl FeedOrchestrator {
    /// Create an empty orchestrator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            supervisors: Vec::new(),
        }
    }

    /// Add a supervisor to start with the others.
    #[must_use]
    pub fn with_supervisor(mut self, supervisor: ConnectionSupervisor) -> Self {
        self.supervisors.push(supervisor);
        self
    }

    /// Number of supervisors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.supervisors.len()
    }

    /// Whether there are no supervisors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.supervisors.is_empty()
    }

    /// Start every supervisor and wait until all have finished.
    ///
    /// Reports are returned in completion order. A panicked task is logged
    /// and has no report.
    pub async fn run(self) -> Vec<FeedReport> {
        let mut tasks = JoinSet::new();

        for supervisor in self.supervisors {
            let feed = supervisor.endpoint().kind;
            let url = supervisor.endpoint().url.clone();
            tracing::info!(feed = %feed, url = %url, "Starting feed supervisor");

            tasks.spawn(async move {
                let outcome = supervisor.run().await;
                FeedReport { feed, url, outcome }
            });
        }

        let mut reports = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    tracing::info!(
                        feed = %report.feed,
                        outcome = ?report.outcome,
                        remaining = tasks.len(),
                        "Feed supervisor finished"
                    );
                    reports.push(report);
                }
                Err(e) => {
                    tracing::error!(error = %e, remaining = tasks.len(), "Feed supervisor task failed");
                }
            }
        }

        reports
    }
}
