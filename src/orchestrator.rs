//! Retry Orchestrator
//!
//! Drives one table reload through a small state machine:
//!
//! ```text
//! Fetching ──ok──> Reloading ──ok──> Done(Success)
//!    ^                 │
//!    └──── failure ────┴──> Done(Failure) once attempts are exhausted
//! ```
//!
//! Every attempt fetches a fresh payload and builds a fresh job. Between
//! attempts the connection is dropped so the next one rediscovers the
//! leader.

use crate::archive::PayloadArchive;
use crate::connection::ConnectionManager;
use crate::error::{Error, Result};
use crate::executor::Connector;
use crate::reload::{BulkReplace, ReloadJob, ReloadStep, RetryPolicy, TableSchema};
use crate::upstream::DatasetSource;

/// Final result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// One failed attempt
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    pub attempt: u32,
    pub step: ReloadStep,
    pub host: Option<String>,
    pub message: String,
}

/// Summary of a run, reported to the caller and turned into an exit code
#[derive(Debug, Clone)]
pub struct RunReport {
    pub table: String,
    pub outcome: Outcome,
    pub attempts: u32,
    pub rows_loaded: u64,
    pub failures: Vec<AttemptFailure>,
}

impl RunReport {
    fn new(table: &TableSchema) -> Self {
        Self {
            table: table.name.to_string(),
            outcome: Outcome::Failure,
            attempts: 0,
            rows_loaded: 0,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// 0 on success, 1 once retries are exhausted
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            Outcome::Success => 0,
            Outcome::Failure => 1,
        }
    }
}

enum RunState {
    Fetching,
    Reloading(String),
    Done(Outcome),
}

/// Bounded fetch-transform-write loop for one table
pub struct RetryOrchestrator<'a, C: Connector> {
    connections: &'a mut ConnectionManager<C>,
    archive: Option<PayloadArchive>,
    dry_run: bool,
}

impl<'a, C: Connector> RetryOrchestrator<'a, C> {
    pub fn new(connections: &'a mut ConnectionManager<C>) -> Self {
        Self {
            connections,
            archive: None,
            dry_run: false,
        }
    }

    /// Keep every fetched payload in `archive`
    pub fn with_archive(mut self, archive: PayloadArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Stop after validation, leaving the database untouched
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run attempts until one succeeds or the policy gives up
    pub async fn run(
        &mut self,
        source: &dyn DatasetSource,
        table: &TableSchema,
        policy: &RetryPolicy,
    ) -> RunReport {
        let mut report = RunReport::new(table);
        let mut state = RunState::Fetching;
        tracing::debug!(
            "Reloading {} with up to {} attempts, {:?} total wait",
            table,
            policy.max_attempts,
            policy.max_total_wait()
        );

        loop {
            state = match state {
                RunState::Fetching => {
                    report.attempts += 1;
                    tracing::info!(
                        "Attempt {}/{}: fetching {} from {}",
                        report.attempts,
                        policy.max_attempts,
                        table,
                        source.name()
                    );
                    match self.fetch(source, table).await {
                        Ok(payload) => RunState::Reloading(payload),
                        Err(e) => self.after_failure(&mut report, e, policy).await,
                    }
                }
                RunState::Reloading(payload) => match self.reload(table, &payload).await {
                    Ok(rows) => {
                        report.rows_loaded = rows;
                        RunState::Done(Outcome::Success)
                    }
                    Err(e) => self.after_failure(&mut report, e, policy).await,
                },
                RunState::Done(outcome) => {
                    report.outcome = outcome;
                    if outcome == Outcome::Success {
                        tracing::info!(
                            "{} reloaded with {} rows after {} attempt(s)",
                            table,
                            report.rows_loaded,
                            report.attempts
                        );
                    }
                    return report;
                }
            };
        }
    }

    async fn fetch(&self, source: &dyn DatasetSource, table: &TableSchema) -> Result<String> {
        let response = source.fetch(table).await?;
        response.check_status(table)?;

        if let Some(archive) = &self.archive {
            if let Err(e) = archive.store(table, &response.body) {
                tracing::warn!("Failed to archive {} payload: {}", table, e);
            }
        }

        response.check_content_type()?;
        Ok(response.body)
    }

    async fn reload(&mut self, table: &TableSchema, payload: &str) -> Result<u64> {
        let job = ReloadJob::from_csv(table.clone(), payload)?;
        if job.is_empty() {
            return Err(Error::UpstreamFetchFailed(format!(
                "payload for {} contains no rows",
                table
            )));
        }
        job.validate()?;

        if self.dry_run {
            tracing::info!("Dry run: {} rows for {} validated, skipping database", job.len(), table);
            return Ok(job.len() as u64);
        }

        let conn = self.connections.acquire().await?;
        BulkReplace::replace(conn, &job).await
    }

    async fn after_failure(
        &mut self,
        report: &mut RunReport,
        err: Error,
        policy: &RetryPolicy,
    ) -> RunState {
        let attempt = report.attempts;
        let host = failure_host(&err).or_else(|| {
            self.connections
                .current_leader()
                .map(|m| m.host_address.clone())
        });

        tracing::warn!(
            "Attempt {}/{} failed at {} on {}: {}",
            attempt,
            policy.max_attempts,
            err.step(),
            host.as_deref().unwrap_or("-"),
            err
        );

        let fail_fast = policy.fail_fast_on_invalid_rows && err.is_data_quality();
        let give_up = !err.is_retryable() || fail_fast || attempt >= policy.max_attempts;

        report.failures.push(AttemptFailure {
            attempt,
            step: err.step(),
            host,
            message: err.to_string(),
        });

        if give_up {
            tracing::error!(
                "Giving up on {} after {} attempt(s): {}",
                report.table,
                attempt,
                err
            );
            return RunState::Done(Outcome::Failure);
        }

        self.connections.invalidate();
        if !policy.wait.is_zero() {
            tracing::info!("Retrying in {:?}", policy.wait);
            tokio::time::sleep(policy.wait).await;
        }
        RunState::Fetching
    }
}

/// Host named by the error itself, if any
fn failure_host(err: &Error) -> Option<String> {
    match err {
        Error::TransactionFailed { host, .. } => Some(host.clone()),
        Error::ConnectionFailed { address, .. } => Some(address.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::LeaderDiscovery;
    use crate::executor::memory::{MemoryReplicaSet, StatementKind};
    use crate::reload::{Field, Row};
    use crate::replica::{ReplicaMember, ReplicaRegistry};
    use crate::upstream::UpstreamResponse;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    const ROUTERS: &str = "crs01,10.255.0.1\ncrs02,10.255.0.2\n";

    /// Serves queued responses, then 404 forever
    struct ScriptedSource {
        responses: Mutex<VecDeque<UpstreamResponse>>,
        fetches: Mutex<u32>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<UpstreamResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                fetches: Mutex::new(0),
            }
        }

        fn repeat(response: UpstreamResponse, times: usize) -> Self {
            Self::new(vec![response; times])
        }

        fn fetches(&self) -> u32 {
            *self.fetches.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl DatasetSource for ScriptedSource {
        fn name(&self) -> &str {
            "netdb"
        }

        async fn fetch(&self, _table: &TableSchema) -> Result<UpstreamResponse> {
            *self.fetches.lock().unwrap() += 1;
            Ok(self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(not_found))
        }
    }

    fn ok(body: &str) -> UpstreamResponse {
        UpstreamResponse {
            status: 200,
            content_type: Some("text/csv".into()),
            body: body.into(),
        }
    }

    fn not_found() -> UpstreamResponse {
        UpstreamResponse {
            status: 404,
            content_type: Some("text/html".into()),
            body: "Not Found".into(),
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            wait: Duration::from_millis(1),
            fail_fast_on_invalid_rows: false,
        }
    }

    fn router(name: &str, ip: &str) -> Row {
        vec![Field::Text(name.into()), Field::Text(ip.into())]
    }

    fn existing() -> Vec<Row> {
        vec![router("crs-old", "10.0.0.1")]
    }

    fn replica_set(hosts: &[&str], writable: &str) -> (MemoryReplicaSet, ConnectionManager<MemoryReplicaSet>) {
        let set = MemoryReplicaSet::new(hosts);
        set.set_writable(writable);
        set.seed(&TableSchema::ROUTER_MASTER, existing());

        let members = hosts.iter().map(|h| ReplicaMember::parse(h)).collect();
        let discovery = LeaderDiscovery::direct(ReplicaRegistry::new(members, None), set.clone());
        (set.clone(), ConnectionManager::new(discovery, set))
    }

    #[tokio::test]
    async fn test_succeeds_once_report_is_published() {
        let (set, mut manager) = replica_set(&["db01", "db02"], "db01");
        let source = ScriptedSource::new(vec![not_found(), not_found(), ok(ROUTERS)]);

        let report = RetryOrchestrator::new(&mut manager)
            .run(&source, &TableSchema::ROUTER_MASTER, &policy(5))
            .await;

        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(source.fetches(), 3);
        assert_eq!(report.attempts, 3);
        assert_eq!(report.rows_loaded, 2);
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().all(|f| f.step == ReloadStep::Fetch));
        assert_eq!(
            set.rows(&TableSchema::ROUTER_MASTER),
            vec![router("crs01", "10.255.0.1"), router("crs02", "10.255.0.2")]
        );
    }

    #[tokio::test]
    async fn test_attempts_are_bounded() {
        let (set, mut manager) = replica_set(&["db01"], "db01");
        let source = ScriptedSource::new(Vec::new());

        let report = RetryOrchestrator::new(&mut manager)
            .run(&source, &TableSchema::ROUTER_MASTER, &policy(4))
            .await;

        assert_eq!(report.exit_code(), 1);
        assert_eq!(source.fetches(), 4);
        assert_eq!(report.failures.len(), 4);
        assert!(set.connects().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_rows_consume_attempts_without_statements() {
        let (set, mut manager) = replica_set(&["db01"], "db01");
        let source = ScriptedSource::repeat(ok("crs01,10.255.0.1\n,10.255.0.2\n"), 3);

        let report = RetryOrchestrator::new(&mut manager)
            .run(&source, &TableSchema::ROUTER_MASTER, &policy(3))
            .await;

        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.attempts, 3);
        assert!(report.failures.iter().all(|f| f.step == ReloadStep::Validate));
        assert!(set.connects().is_empty());
        assert_eq!(set.mutations(), 0);
        assert_eq!(set.rows(&TableSchema::ROUTER_MASTER), existing());
    }

    #[tokio::test]
    async fn test_invalid_rows_fail_fast() {
        let (set, mut manager) = replica_set(&["db01"], "db01");
        let source = ScriptedSource::repeat(ok(",10.255.0.2\n"), 3);
        let policy = RetryPolicy {
            fail_fast_on_invalid_rows: true,
            ..policy(3)
        };

        let report = RetryOrchestrator::new(&mut manager)
            .run(&source, &TableSchema::ROUTER_MASTER, &policy)
            .await;

        assert_eq!(report.exit_code(), 1);
        assert_eq!(source.fetches(), 1);
        assert_eq!(set.mutations(), 0);
    }

    #[tokio::test]
    async fn test_insert_failure_keeps_table_and_records_cause() {
        let (set, mut manager) = replica_set(&["db01"], "db01");
        set.fail_insert_after(1);
        let source = ScriptedSource::repeat(ok(ROUTERS), 2);

        let report = RetryOrchestrator::new(&mut manager)
            .run(&source, &TableSchema::ROUTER_MASTER, &policy(2))
            .await;

        assert_eq!(report.exit_code(), 1);
        assert_eq!(set.rows(&TableSchema::ROUTER_MASTER), existing());
        assert_eq!(set.statements().last().map(|(_, k)| *k), Some(StatementKind::Rollback));

        let first = &report.failures[0];
        assert_eq!(first.step, ReloadStep::Insert);
        assert_eq!(first.host.as_deref(), Some("db01"));
        assert!(first.message.contains("Duplicate entry"));
    }

    #[tokio::test]
    async fn test_failover_between_attempts() {
        let (set, mut manager) = replica_set(&["db01", "db02"], "db01");
        manager.acquire().await.unwrap();
        set.set_writable("db02");
        let source = ScriptedSource::repeat(ok(ROUTERS), 3);

        let report = RetryOrchestrator::new(&mut manager)
            .run(&source, &TableSchema::ROUTER_MASTER, &policy(3))
            .await;

        assert!(report.is_success());
        assert_eq!(report.attempts, 2);
        assert_eq!(report.failures[0].step, ReloadStep::Delete);
        assert_eq!(report.failures[0].host.as_deref(), Some("db01"));
        assert_eq!(manager.current_leader().map(|m| m.host_address.as_str()), Some("db02"));
        assert_eq!(set.rows(&TableSchema::ROUTER_MASTER).len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_skips_database() {
        let (set, mut manager) = replica_set(&["db01"], "db01");
        let source = ScriptedSource::new(vec![ok(ROUTERS)]);

        let report = RetryOrchestrator::new(&mut manager)
            .dry_run(true)
            .run(&source, &TableSchema::ROUTER_MASTER, &policy(3))
            .await;

        assert!(report.is_success());
        assert_eq!(report.rows_loaded, 2);
        assert!(set.probes().is_empty());
        assert!(set.statements().is_empty());
        assert_eq!(set.rows(&TableSchema::ROUTER_MASTER), existing());
    }

    #[tokio::test]
    async fn test_payload_archived_before_content_type_check() {
        let temp = TempDir::new().unwrap();
        let (_set, mut manager) = replica_set(&["db01"], "db01");
        let html = UpstreamResponse {
            status: 200,
            content_type: Some("text/html".into()),
            body: "<html>login required</html>".into(),
        };
        let source = ScriptedSource::new(vec![html]);

        let report = RetryOrchestrator::new(&mut manager)
            .with_archive(PayloadArchive::new(temp.path(), "netdb"))
            .run(&source, &TableSchema::ROUTER_MASTER, &policy(1))
            .await;

        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.failures[0].step, ReloadStep::Fetch);

        let files: Vec<_> = std::fs::read_dir(temp.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let path = files[0].as_ref().unwrap().path();
        assert!(std::fs::read_to_string(path).unwrap().contains("login required"));
    }

    #[tokio::test]
    async fn test_archive_failure_does_not_stop_reload() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();
        let (set, mut manager) = replica_set(&["db01"], "db01");
        let source = ScriptedSource::new(vec![ok(ROUTERS)]);

        let report = RetryOrchestrator::new(&mut manager)
            .with_archive(PayloadArchive::new(blocker.join("archive"), "netdb"))
            .run(&source, &TableSchema::ROUTER_MASTER, &policy(1))
            .await;

        assert!(report.is_success());
        assert_eq!(report.rows_loaded, 2);
        assert!(report.failures.is_empty());
        assert_eq!(set.rows(&TableSchema::ROUTER_MASTER).len(), 2);
    }

    #[tokio::test]
    async fn test_no_writable_replica_exhausts_attempts() {
        let (set, mut manager) = replica_set(&["db01", "db02"], "db01");
        set.set_read_only_all();
        let source = ScriptedSource::repeat(ok(ROUTERS), 2);

        let report = RetryOrchestrator::new(&mut manager)
            .run(&source, &TableSchema::ROUTER_MASTER, &policy(2))
            .await;

        assert_eq!(report.exit_code(), 1);
        assert!(report.failures.iter().all(|f| f.step == ReloadStep::Discover));
        assert_eq!(set.probes(), vec!["db01", "db02", "db01", "db02"]);
    }
}
