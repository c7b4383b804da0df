//! Session supervisor — owns the transport lifecycle and session state.
//!
//! One always-on control loop with no cancellation primitive: the process
//! runs until externally terminated. Restarts repeat indefinitely on a
//! fixed delay; the attempt counter is logged so a stuck loop shows up in
//! the logs.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::handler::MessageHandler;
use crate::session::state::SessionState;
use crate::transport::{Transport, TransportEvent};

pub struct SessionSupervisor {
    transport: Arc<dyn Transport>,
    handler: Arc<MessageHandler>,
    state_tx: watch::Sender<SessionState>,
    restart_delay: Duration,
    operator_id: Option<String>,
}

impl SessionSupervisor {
    /// Build a supervisor. The returned receiver is the read-only view of
    /// session state for the liveness reporter.
    pub fn new(
        transport: Arc<dyn Transport>,
        handler: Arc<MessageHandler>,
        restart_delay: Duration,
        operator_id: Option<String>,
    ) -> (Self, watch::Receiver<SessionState>) {
        let (state_tx, state_rx) = watch::channel(SessionState::Starting);
        (
            Self {
                transport,
                handler,
                state_tx,
                restart_delay,
                operator_id,
            },
            state_rx,
        )
    }

    /// Run forever: one session attempt, then a fixed-delay restart,
    /// repeated without ceiling.
    pub async fn run(self) {
        let mut attempts: u64 = 0;
        loop {
            attempts += 1;
            if attempts > 1 {
                info!(attempts, "Restarting chat session");
            }
            self.run_session().await;
            tokio::time::sleep(self.restart_delay).await;
        }
    }

    /// One session: initialize the transport and consume its event stream
    /// until it disconnects or ends. Always leaves state at Disconnected.
    async fn run_session(&self) {
        let _ = self.state_tx.send(SessionState::Starting);

        let mut events = match self.transport.initialize().await {
            Ok(stream) => stream,
            Err(e) => {
                // Startup failure is treated like a disconnect: same delay,
                // same retry.
                warn!(transport = self.transport.name(), error = %e, "Transport failed to initialize");
                let _ = self.state_tx.send(SessionState::Disconnected);
                return;
            }
        };

        while let Some(event) = events.next().await {
            match event {
                TransportEvent::PairingChallenge(data) => {
                    let _ = self.state_tx.send(SessionState::Authenticating);
                    self.relay_pairing_challenge(&data).await;
                }
                TransportEvent::Authenticated | TransportEvent::Ready => {
                    let _ = self.state_tx.send(SessionState::Ready);
                }
                TransportEvent::Message(msg) => {
                    // Each message is an independent task; a panic inside is
                    // contained by the runtime and cannot take the loop down.
                    let handler = Arc::clone(&self.handler);
                    let transport = Arc::clone(&self.transport);
                    tokio::spawn(async move {
                        handler.handle(transport, msg).await;
                    });
                }
                TransportEvent::Disconnected { reason } => {
                    warn!(transport = self.transport.name(), reason = %reason, "Session disconnected");
                    break;
                }
            }
        }

        // Stream end without a Disconnected event counts as a disconnect too.
        let _ = self.state_tx.send(SessionState::Disconnected);
        if let Err(e) = self.transport.teardown().await {
            warn!(transport = self.transport.name(), error = %e, "Transport teardown failed");
        }
    }

    /// Relay a pairing challenge to the operator channel, best-effort.
    async fn relay_pairing_challenge(&self, data: &str) {
        let Some(operator) = self.operator_id.as_deref() else {
            info!("Pairing challenge received; no operator configured to relay it to");
            return;
        };
        let text = format!("🔐 Pairing challenge for the chat session:\n{data}");
        if let Err(e) = self.transport.send_to(operator, &text).await {
            warn!(operator, error = %e, "Failed to relay pairing challenge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::config::ScanConfig;
    use crate::error::ChannelError;
    use crate::scan::ScanOrchestrator;
    use crate::scan::client::{AnalysisReport, ScanService};
    use crate::store::TempStore;
    use crate::transport::{AttachmentPayload, EventStream, InboundMessage};

    /// Transport whose sessions are scripted per initialize() call.
    /// Unscripted calls fail startup, like a transport that cannot come up.
    #[derive(Default)]
    struct ScriptedTransport {
        sessions: Mutex<Vec<Vec<TransportEvent>>>,
        /// Sessions whose stream stays open after the scripted events.
        open_sessions: Mutex<Vec<Vec<TransportEvent>>>,
        init_calls: AtomicUsize,
        relayed: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedTransport {
        fn with_session(self, events: Vec<TransportEvent>) -> Self {
            self.sessions.lock().unwrap().push(events);
            self
        }

        fn init_calls(&self) -> usize {
            self.init_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn initialize(&self) -> Result<EventStream, ChannelError> {
            self.init_calls.fetch_add(1, Ordering::SeqCst);
            {
                let mut open = self.open_sessions.lock().unwrap();
                if !open.is_empty() {
                    let events = open.remove(0);
                    return Ok(Box::pin(
                        futures::stream::iter(events).chain(futures::stream::pending()),
                    ));
                }
            }
            let mut sessions = self.sessions.lock().unwrap();
            if sessions.is_empty() {
                return Err(ChannelError::StartupFailed {
                    name: "scripted".into(),
                    reason: "no session scripted".into(),
                });
            }
            let events = sessions.remove(0);
            Ok(Box::pin(futures::stream::iter(events)))
        }

        async fn reply(&self, _msg: &InboundMessage, _text: &str) -> Result<(), ChannelError> {
            Ok(())
        }

        async fn download_attachment(
            &self,
            _msg: &InboundMessage,
        ) -> Result<AttachmentPayload, ChannelError> {
            Err(ChannelError::DownloadFailed {
                name: "scripted".into(),
                reason: "not scripted".into(),
            })
        }

        async fn send_to(&self, recipient: &str, text: &str) -> Result<(), ChannelError> {
            self.relayed
                .lock()
                .unwrap()
                .push((recipient.to_string(), text.to_string()));
            Ok(())
        }

        async fn teardown(&self) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    /// Scan service that is never reached in these tests.
    struct NoopScan;

    #[async_trait]
    impl ScanService for NoopScan {
        async fn upload(
            &self,
            _path: &std::path::Path,
            _file_name: &str,
        ) -> Result<String, crate::error::ScanError> {
            unreachable!("supervisor tests never scan")
        }

        async fn fetch_report(
            &self,
            _analysis_id: &str,
        ) -> Result<AnalysisReport, crate::error::ScanError> {
            unreachable!("supervisor tests never scan")
        }
    }

    fn handler(dir: &tempfile::TempDir) -> Arc<MessageHandler> {
        let orch = ScanOrchestrator::new(
            Arc::new(NoopScan),
            TempStore::new(dir.path()),
            ScanConfig::default(),
        );
        Arc::new(MessageHandler::new(orch, vec!["scan".into()]))
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_is_immediate_and_restart_waits_for_the_delay() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::default().with_session(vec![
            TransportEvent::Ready,
            TransportEvent::Disconnected {
                reason: "network gone".into(),
            },
        ]));

        let (sup, state) = SessionSupervisor::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            handler(&dir),
            Duration::from_secs(10),
            None,
        );
        tokio::spawn(sup.run());

        // First session plays out without any clock movement.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.init_calls(), 1);
        assert_eq!(*state.borrow(), SessionState::Disconnected);

        // Restart happens only after the fixed delay.
        tokio::time::sleep(Duration::from_millis(10_100)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.init_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_attempts_repeat_indefinitely_on_fixed_delay() {
        let dir = tempfile::tempdir().unwrap();
        // No sessions scripted: every initialize fails like a permanently
        // broken transport.
        let transport = Arc::new(ScriptedTransport::default());

        let (sup, state) = SessionSupervisor::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            handler(&dir),
            Duration::from_secs(10),
            None,
        );
        tokio::spawn(sup.run());

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(transport.init_calls(), 1);
        assert_eq!(*state.borrow(), SessionState::Disconnected);

        // One restart per elapsed delay interval.
        for expected in 2..=5usize {
            tokio::time::sleep(Duration::from_millis(10_100)).await;
            for _ in 0..10 {
                tokio::task::yield_now().await;
            }
            assert_eq!(transport.init_calls(), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ready_event_marks_the_session_connected() {
        let dir = tempfile::tempdir().unwrap();
        // Stream stays open after Ready so the state can be observed.
        let transport = Arc::new(ScriptedTransport {
            open_sessions: Mutex::new(vec![vec![
                TransportEvent::Authenticated,
                TransportEvent::Ready,
            ]]),
            ..Default::default()
        });

        let (sup, state) = SessionSupervisor::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            handler(&dir),
            Duration::from_secs(10),
            None,
        );
        tokio::spawn(sup.run());

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(*state.borrow(), SessionState::Ready);
        assert!(state.borrow().is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn pairing_challenge_is_relayed_to_the_operator() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::default().with_session(vec![
            TransportEvent::PairingChallenge("QR-DATA-123".into()),
        ]));

        let (sup, _state) = SessionSupervisor::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            handler(&dir),
            Duration::from_secs(10),
            Some("operator-chat".into()),
        );
        tokio::spawn(sup.run());

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let relayed = transport.relayed.lock().unwrap();
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].0, "operator-chat");
        assert!(relayed[0].1.contains("QR-DATA-123"));
    }

    #[tokio::test(start_paused = true)]
    async fn pairing_challenge_without_operator_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::default().with_session(vec![
            TransportEvent::PairingChallenge("QR".into()),
            TransportEvent::Ready,
        ]));

        let (sup, state) = SessionSupervisor::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            handler(&dir),
            Duration::from_secs(10),
            None,
        );
        tokio::spawn(sup.run());

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(transport.relayed.lock().unwrap().is_empty());
        // Loop survived the unrelayed challenge.
        assert_eq!(*state.borrow(), SessionState::Disconnected);
    }
}
