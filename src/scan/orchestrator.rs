//! Scan orchestrator — persist, size-gate, upload, poll, normalize, clean up.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::ScanConfig;
use crate::error::ScanError;
use crate::scan::client::ScanService;
use crate::scan::verdict::ScanVerdict;
use crate::store::{TempFile, TempStore};

/// One in-flight remote analysis. Created on successful upload, dropped
/// once its report has been normalized — no history is retained.
#[derive(Debug)]
struct ScanJob {
    analysis_id: String,
    submitted_at: DateTime<Utc>,
    deadline: Instant,
}

/// Drives a single attachment through the two-phase remote scan.
pub struct ScanOrchestrator {
    service: Arc<dyn ScanService>,
    store: TempStore,
    config: ScanConfig,
}

impl ScanOrchestrator {
    pub fn new(service: Arc<dyn ScanService>, store: TempStore, config: ScanConfig) -> Self {
        Self {
            service,
            store,
            config,
        }
    }

    /// Submit attachment bytes and return the normalized verdict.
    ///
    /// The scratch file is removed on every exit path. A cleanup failure
    /// after a successful scan surfaces as a storage error; after a failed
    /// scan it is logged and the original error wins.
    pub async fn submit_and_scan(
        &self,
        bytes: &[u8],
        mime_type: &str,
        message_id: &str,
    ) -> Result<ScanVerdict, ScanError> {
        let file = self.store.persist(message_id, bytes).await?;
        tracing::debug!(
            message_id,
            mime_type,
            size = file.len(),
            path = %file.path().display(),
            "Attachment persisted for scanning"
        );

        let result = self.scan_stored(&file, message_id).await;

        match file.cleanup().await {
            Ok(()) => result,
            Err(e) => match result {
                Ok(_) => Err(ScanError::Storage(e)),
                Err(original) => {
                    tracing::warn!(message_id, error = %e, "Scratch file cleanup failed");
                    Err(original)
                }
            },
        }
    }

    async fn scan_stored(
        &self,
        file: &TempFile,
        message_id: &str,
    ) -> Result<ScanVerdict, ScanError> {
        // Size gate runs before any network call so an oversized payload
        // never wastes an upload attempt.
        if file.len() > self.config.max_file_bytes {
            return Err(ScanError::PayloadTooLarge {
                size: file.len(),
                limit: self.config.max_file_bytes,
            });
        }

        let file_name = file
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("payload.tmp");

        let analysis_id = self.service.upload(file.path(), file_name).await?;
        let job = ScanJob {
            analysis_id,
            submitted_at: Utc::now(),
            deadline: Instant::now() + self.config.poll_deadline,
        };
        tracing::info!(
            message_id,
            analysis_id = %job.analysis_id,
            submitted_at = %job.submitted_at,
            "Upload accepted; waiting for analysis"
        );

        tokio::time::sleep(self.config.initial_poll_delay).await;
        let mut report = self.service.fetch_report(&job.analysis_id).await?;
        while !report.is_terminal() && Instant::now() < job.deadline {
            tokio::time::sleep(self.config.poll_interval).await;
            report = self.service.fetch_report(&job.analysis_id).await?;
        }
        if !report.is_terminal() {
            // Deadline hit while still queued: tolerate stale counts
            // rather than fail the whole submission.
            tracing::warn!(
                analysis_id = %job.analysis_id,
                "Analysis not finished at polling deadline; using last reported stats"
            );
        }

        let stats = report
            .stats
            .ok_or_else(|| ScanError::RemoteProtocol("analysis report missing engine stats".into()))?;
        Ok(ScanVerdict::from_stats(stats, report.sha256.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use std::path::Path;

    use crate::scan::client::AnalysisReport;
    use crate::scan::verdict::EngineStats;

    /// Scripted scan service: fixed upload outcome, a queue of report
    /// outcomes, and call counters.
    #[derive(Default)]
    struct MockService {
        upload_result: Mutex<Option<Result<String, ScanError>>>,
        reports: Mutex<Vec<Result<AnalysisReport, ScanError>>>,
        upload_calls: AtomicUsize,
        report_calls: AtomicUsize,
    }

    impl MockService {
        fn uploading(id: &str) -> Self {
            let svc = Self::default();
            *svc.upload_result.lock().unwrap() = Some(Ok(id.to_string()));
            svc
        }

        fn with_report(self, report: AnalysisReport) -> Self {
            self.reports.lock().unwrap().push(Ok(report));
            self
        }
    }

    #[async_trait]
    impl ScanService for MockService {
        async fn upload(&self, _path: &Path, _file_name: &str) -> Result<String, ScanError> {
            self.upload_calls.fetch_add(1, Ordering::SeqCst);
            self.upload_result
                .lock()
                .unwrap()
                .take()
                .unwrap_or(Err(ScanError::RemoteTransport("unscripted upload".into())))
        }

        async fn fetch_report(&self, _analysis_id: &str) -> Result<AnalysisReport, ScanError> {
            self.report_calls.fetch_add(1, Ordering::SeqCst);
            let mut reports = self.reports.lock().unwrap();
            if reports.is_empty() {
                Err(ScanError::RemoteTransport("unscripted report".into()))
            } else {
                reports.remove(0)
            }
        }
    }

    fn completed_report(pairs: &[(&str, u64)], sha256: Option<&str>) -> AnalysisReport {
        AnalysisReport {
            status: Some("completed".into()),
            stats: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), *v))
                    .collect::<EngineStats>(),
            ),
            sha256: sha256.map(str::to_string),
        }
    }

    fn fast_config(max_file_bytes: u64) -> ScanConfig {
        ScanConfig {
            max_file_bytes,
            initial_poll_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            poll_deadline: Duration::from_secs(5),
            ..ScanConfig::default()
        }
    }

    fn orchestrator(
        service: Arc<MockService>,
        dir: &tempfile::TempDir,
        max_file_bytes: u64,
    ) -> ScanOrchestrator {
        ScanOrchestrator::new(
            service,
            TempStore::new(dir.path()),
            fast_config(max_file_bytes),
        )
    }

    fn scratch_entries(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    #[tokio::test]
    async fn happy_path_normalizes_and_cleans_up() {
        let svc = Arc::new(
            MockService::uploading("an-1")
                .with_report(completed_report(&[("harmless", 5), ("malicious", 2)], Some("ff"))),
        );
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::clone(&svc), &dir, 1024);

        let verdict = orch
            .submit_and_scan(b"hello", "text/plain", "m1")
            .await
            .unwrap();

        assert_eq!(verdict.total_engines, 7);
        assert_eq!(verdict.malicious, 2);
        assert_eq!(verdict.report_link, "https://www.virustotal.com/gui/file/ff");
        assert_eq!(scratch_entries(&dir), 0);
    }

    #[tokio::test]
    async fn cleanup_happens_on_failure_too() {
        let svc = Arc::new(MockService::default()); // upload fails
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::clone(&svc), &dir, 1024);

        let err = orch
            .submit_and_scan(b"hello", "text/plain", "m2")
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::RemoteTransport(_)));
        assert_eq!(scratch_entries(&dir), 0);
    }

    #[tokio::test]
    async fn payload_at_ceiling_passes_the_gate() {
        let svc = Arc::new(
            MockService::uploading("an-2")
                .with_report(completed_report(&[("harmless", 1)], None)),
        );
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::clone(&svc), &dir, 8);

        let payload = [0u8; 8];
        orch.submit_and_scan(&payload, "application/octet-stream", "m3")
            .await
            .unwrap();
        assert_eq!(svc.upload_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected_before_any_network_call() {
        let svc = Arc::new(MockService::uploading("never"));
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::clone(&svc), &dir, 8);

        let payload = [0u8; 9];
        let err = orch
            .submit_and_scan(&payload, "application/octet-stream", "m4")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ScanError::PayloadTooLarge { size: 9, limit: 8 }
        ));
        assert_eq!(svc.upload_calls.load(Ordering::SeqCst), 0);
        assert_eq!(svc.report_calls.load(Ordering::SeqCst), 0);
        assert_eq!(scratch_entries(&dir), 0);
    }

    #[tokio::test]
    async fn upload_protocol_error_never_reaches_the_report_phase() {
        let svc = Arc::new(MockService::default());
        *svc.upload_result.lock().unwrap() =
            Some(Err(ScanError::RemoteProtocol("missing analysis id".into())));
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::clone(&svc), &dir, 1024);

        let err = orch
            .submit_and_scan(b"x", "text/plain", "m5")
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::RemoteProtocol(_)));
        assert_eq!(svc.report_calls.load(Ordering::SeqCst), 0);
        assert_eq!(scratch_entries(&dir), 0);
    }

    #[tokio::test]
    async fn queued_report_is_polled_until_completed() {
        let queued = AnalysisReport {
            status: Some("queued".into()),
            stats: Some(EngineStats::new()),
            sha256: None,
        };
        let svc = Arc::new(
            MockService::uploading("an-3")
                .with_report(queued.clone())
                .with_report(queued)
                .with_report(completed_report(&[("harmless", 3)], None)),
        );
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::clone(&svc), &dir, 1024);

        let verdict = orch
            .submit_and_scan(b"x", "text/plain", "m6")
            .await
            .unwrap();

        assert_eq!(svc.report_calls.load(Ordering::SeqCst), 3);
        assert_eq!(verdict.total_engines, 3);
    }

    #[tokio::test]
    async fn report_without_stats_is_a_protocol_error() {
        let report = AnalysisReport {
            status: Some("completed".into()),
            stats: None,
            sha256: None,
        };
        let svc = Arc::new(MockService::uploading("an-4").with_report(report));
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(Arc::clone(&svc), &dir, 1024);

        let err = orch
            .submit_and_scan(b"x", "text/plain", "m7")
            .await
            .unwrap_err();
        assert!(matches!(err, ScanError::RemoteProtocol(_)));
        assert_eq!(scratch_entries(&dir), 0);
    }

    #[tokio::test]
    async fn deadline_tolerates_stale_counts() {
        // Deadline of zero: the loop never gets a second fetch, and the
        // still-queued stats are used as-is.
        let queued = AnalysisReport {
            status: Some("queued".into()),
            stats: Some([("harmless".to_string(), 1u64)].into_iter().collect()),
            sha256: None,
        };
        let svc = Arc::new(MockService::uploading("an-5").with_report(queued));
        let dir = tempfile::tempdir().unwrap();
        let config = ScanConfig {
            max_file_bytes: 1024,
            initial_poll_delay: Duration::ZERO,
            poll_interval: Duration::ZERO,
            poll_deadline: Duration::ZERO,
            ..ScanConfig::default()
        };
        let orch = ScanOrchestrator::new(Arc::clone(&svc) as Arc<dyn ScanService>, TempStore::new(dir.path()), config);

        let verdict = orch
            .submit_and_scan(b"x", "text/plain", "m8")
            .await
            .unwrap();
        assert_eq!(svc.report_calls.load(Ordering::SeqCst), 1);
        assert_eq!(verdict.total_engines, 1);
    }
}
