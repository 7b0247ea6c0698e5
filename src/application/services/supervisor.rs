//! Connection supervisor - owns the lifecycle of the messaging session
//!
//! Exactly one supervisor may be live per process. It drives the client
//! handshake, applies lifecycle events to the shared session state, routes
//! sentinel-prefixed messages to the command responder, and re-arms the
//! connection after a disconnect with a fixed, cancellable delay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::errors::BotError;
use crate::application::messaging::MessageParser;
use crate::application::services::CommandService;
use crate::domain::entities::{PairingArtifact, SessionHandle, SessionPhase, User};
use crate::domain::traits::{ClientEvent, MessagingClient};
use crate::infrastructure::qr;

/// Domain suffix appended to bare numbers when building a chat address.
const CHAT_SUFFIX: &str = "@c.us";

/// At most one live supervisor (and therefore one logical session) per
/// process. Released on drop.
static SUPERVISOR_LIVE: AtomicBool = AtomicBool::new(false);

/// Phase the session lands in after a lifecycle event, or `None` when the
/// event does not move the session. Transitions do not depend on the
/// current phase.
fn phase_for(event: &ClientEvent) -> Option<SessionPhase> {
    match event {
        ClientEvent::PairingCode(_) => Some(SessionPhase::AwaitingPairing),
        ClientEvent::Authenticated => Some(SessionPhase::Authenticated),
        ClientEvent::Ready => Some(SessionPhase::Ready),
        ClientEvent::AuthFailure(_) => Some(SessionPhase::Disconnected),
        ClientEvent::Disconnected(_) => Some(SessionPhase::Disconnected),
        ClientEvent::Message { .. } => None,
    }
}

/// Only a disconnect re-arms the connection. An auth failure parks the
/// session until an operator intervenes.
fn should_reconnect(event: &ClientEvent) -> bool {
    matches!(event, ClientEvent::Disconnected(_))
}

pub struct ConnectionSupervisor {
    client: Arc<dyn MessagingClient>,
    session: SessionHandle,
    commands: Arc<CommandService>,
    parser: MessageParser,
    events: mpsc::Receiver<ClientEvent>,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
}

impl ConnectionSupervisor {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        events: mpsc::Receiver<ClientEvent>,
        commands: Arc<CommandService>,
        session: SessionHandle,
        reconnect_delay: Duration,
        shutdown: CancellationToken,
    ) -> Result<Self, BotError> {
        if SUPERVISOR_LIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(BotError::Internal(
                "a connection supervisor is already live in this process".to_string(),
            ));
        }

        let parser = MessageParser::new(commands.prefix());
        Ok(Self {
            client,
            session,
            commands,
            parser,
            events,
            reconnect_delay,
            shutdown,
        })
    }

    /// Cheap cloneable view for the status facade.
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            client: Arc::clone(&self.client),
            session: self.session.clone(),
        }
    }

    /// Start the handshake and consume client events until shutdown.
    pub async fn run(mut self) {
        let info = self.client.client_info();
        tracing::info!("Supervisor started for instance '{}'", info.instance);

        if let Err(e) = self.client.connect().await {
            tracing::warn!("Initial connect failed: {}", e);
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Supervisor shutting down");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        tracing::warn!("Client event channel closed");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::Message { chat_id, text, sender } => {
                self.handle_message(chat_id, text, sender).await;
            }
            lifecycle => {
                if let Some(phase) = phase_for(&lifecycle) {
                    self.session.set_phase(phase);
                }

                match &lifecycle {
                    ClientEvent::PairingCode(payload) => self.store_artifact(payload),
                    ClientEvent::Authenticated => tracing::info!("WhatsApp authenticated"),
                    ClientEvent::Ready => tracing::info!("WhatsApp client is ready"),
                    ClientEvent::AuthFailure(reason) => {
                        tracing::warn!("WhatsApp auth failure: {}", reason)
                    }
                    ClientEvent::Disconnected(reason) => {
                        tracing::warn!("WhatsApp disconnected: {}", reason)
                    }
                    ClientEvent::Message { .. } => {}
                }

                if should_reconnect(&lifecycle) {
                    self.schedule_reconnect();
                }
            }
        }
    }

    fn store_artifact(&self, payload: &str) {
        match qr::to_data_uri(payload) {
            Ok(data_uri) => {
                tracing::info!("QR received");
                self.session.set_artifact(PairingArtifact::new(data_uri));
            }
            Err(e) => tracing::error!("Failed to render pairing code: {}", e),
        }
    }

    async fn handle_message(&self, chat_id: String, text: String, sender: Option<User>) {
        if !self.parser.is_command(&text) {
            return;
        }

        let message = self.parser.parse(chat_id, text, sender);
        let Some(reply) = self.commands.handle(&message) else {
            return;
        };

        tracing::info!("Command reply to chat {}", message.chat_id);
        if let Err(e) = self.client.send_text(&message.chat_id, &reply).await {
            tracing::error!("Failed to send reply: {}", e);
        }
    }

    /// Fixed-delay reconnect: one attempt per disconnect event, unbounded
    /// over the life of the process, no backoff or jitter. The sleep races
    /// the shutdown token so a pending reconnect never outlives the
    /// process teardown.
    fn schedule_reconnect(&self) {
        let client = Arc::clone(&self.client);
        let shutdown = self.shutdown.clone();
        let delay = self.reconnect_delay;

        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    tracing::info!("Reconnecting after {}s", delay.as_secs());
                    if let Err(e) = client.connect().await {
                        tracing::warn!("Reconnect attempt failed: {}", e);
                    }
                }
            }
        });
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        SUPERVISOR_LIVE.store(false, Ordering::SeqCst);
    }
}

/// Read/send view of the supervised session, shared with the facade.
#[derive(Clone)]
pub struct SupervisorHandle {
    client: Arc<dyn MessagingClient>,
    session: SessionHandle,
}

impl SupervisorHandle {
    pub(crate) fn new(client: Arc<dyn MessagingClient>, session: SessionHandle) -> Self {
        Self { client, session }
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Send a test message to a bare number. Requires a ready session; the
    /// chat address is the number with the fixed domain suffix appended.
    pub async fn send_test(&self, number: &str, text: &str) -> Result<String, BotError> {
        if !self.session.is_ready() {
            return Err(BotError::NotConnected);
        }
        let chat_id = format!("{}{}", number, CHAT_SUFFIX);
        self.client.send_text(&chat_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::traits::ClientInfo;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    // The liveness flag is process-wide, so tests that construct a
    // supervisor must not overlap.
    static TEST_GUARD: Mutex<()> = Mutex::new(());

    #[derive(Default)]
    struct MockClient {
        connects: AtomicUsize,
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessagingClient for MockClient {
        async fn connect(&self) -> Result<(), BotError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn send_text(&self, chat_id: &str, text: &str) -> Result<String, BotError> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok("mock-msg".to_string())
        }

        fn client_info(&self) -> ClientInfo {
            ClientInfo {
                name: "mock".to_string(),
                instance: "mock".to_string(),
            }
        }
    }

    fn build(
        client: Arc<MockClient>,
        shutdown: CancellationToken,
    ) -> (ConnectionSupervisor, mpsc::Sender<ClientEvent>) {
        let (tx, rx) = mpsc::channel(16);
        let mut commands = CommandService::new(".");
        commands.register_defaults("https://example.com/channel");
        let supervisor = ConnectionSupervisor::new(
            client,
            rx,
            Arc::new(commands),
            SessionHandle::new(),
            Duration::from_secs(5),
            shutdown,
        )
        .expect("supervisor");
        (supervisor, tx)
    }

    fn guard() -> std::sync::MutexGuard<'static, ()> {
        TEST_GUARD.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_transition_table() {
        let cases = [
            (
                ClientEvent::PairingCode("code".to_string()),
                Some(SessionPhase::AwaitingPairing),
            ),
            (ClientEvent::Authenticated, Some(SessionPhase::Authenticated)),
            (ClientEvent::Ready, Some(SessionPhase::Ready)),
            (
                ClientEvent::AuthFailure("denied".to_string()),
                Some(SessionPhase::Disconnected),
            ),
            (
                ClientEvent::Disconnected("gone".to_string()),
                Some(SessionPhase::Disconnected),
            ),
            (
                ClientEvent::Message {
                    chat_id: "1".to_string(),
                    text: "hi".to_string(),
                    sender: None,
                },
                None,
            ),
        ];
        for (event, expected) in cases {
            assert_eq!(phase_for(&event), expected, "{:?}", event);
        }
    }

    #[test]
    fn test_only_disconnect_reconnects() {
        assert!(should_reconnect(&ClientEvent::Disconnected("gone".to_string())));
        assert!(!should_reconnect(&ClientEvent::AuthFailure("denied".to_string())));
        assert!(!should_reconnect(&ClientEvent::Ready));
    }

    #[test]
    fn test_second_live_supervisor_is_rejected() {
        let _guard = guard();
        let client = Arc::new(MockClient::default());
        let (first, _tx) = build(client.clone(), CancellationToken::new());

        let (tx2, rx2) = mpsc::channel(16);
        let mut commands = CommandService::new(".");
        commands.register_defaults("https://example.com/channel");
        let second = ConnectionSupervisor::new(
            client.clone(),
            rx2,
            Arc::new(commands),
            SessionHandle::new(),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        assert!(second.is_err());
        drop(tx2);

        drop(first);
        let (tx3, rx3) = mpsc::channel(16);
        let mut commands = CommandService::new(".");
        commands.register_defaults("https://example.com/channel");
        let third = ConnectionSupervisor::new(
            client,
            rx3,
            Arc::new(commands),
            SessionHandle::new(),
            Duration::from_secs(5),
            CancellationToken::new(),
        );
        assert!(third.is_ok());
        drop(tx3);
    }

    #[tokio::test]
    async fn test_lifecycle_events_drive_readiness() {
        let _guard = guard();
        let client = Arc::new(MockClient::default());
        let (supervisor, _tx) = build(client, CancellationToken::new());
        let session = supervisor.handle().session().clone();

        supervisor.handle_event(ClientEvent::Authenticated).await;
        assert!(!session.is_ready());

        supervisor.handle_event(ClientEvent::Ready).await;
        assert!(session.is_ready());

        supervisor
            .handle_event(ClientEvent::AuthFailure("denied".to_string()))
            .await;
        assert!(!session.is_ready());
        assert_eq!(session.phase(), SessionPhase::Disconnected);
    }

    #[tokio::test]
    async fn test_pairing_event_stores_scannable_artifact() {
        let _guard = guard();
        let client = Arc::new(MockClient::default());
        let (supervisor, _tx) = build(client, CancellationToken::new());
        let session = supervisor.handle().session().clone();

        supervisor
            .handle_event(ClientEvent::PairingCode("2@abc,def,ghi".to_string()))
            .await;

        assert_eq!(session.phase(), SessionPhase::AwaitingPairing);
        let artifact = session.artifact().expect("artifact stored");
        assert!(artifact.data_uri.starts_with("data:image/svg+xml;base64,"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_fires_after_fixed_delay() {
        let _guard = guard();
        let client = Arc::new(MockClient::default());
        let (supervisor, _tx) = build(client.clone(), CancellationToken::new());

        supervisor
            .handle_event(ClientEvent::Disconnected("gone".to_string()))
            .await;
        // Let the spawned reconnect task poll once so it arms its `sleep`
        // timer at t=0; otherwise the deadline is computed relative to the
        // first `advance` below under paused time.
        tokio::task::yield_now().await;
        assert_eq!(client.connects.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(4)).await;
        tokio::task::yield_now().await;
        assert_eq!(client.connects.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(client.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_failure_schedules_no_reconnect() {
        let _guard = guard();
        let client = Arc::new(MockClient::default());
        let (supervisor, _tx) = build(client.clone(), CancellationToken::new());

        supervisor
            .handle_event(ClientEvent::AuthFailure("denied".to_string()))
            .await;

        tokio::time::advance(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        assert_eq!(client.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_reconnect() {
        let _guard = guard();
        let shutdown = CancellationToken::new();
        let client = Arc::new(MockClient::default());
        let (supervisor, _tx) = build(client.clone(), shutdown.clone());

        supervisor
            .handle_event(ClientEvent::Disconnected("gone".to_string()))
            .await;
        shutdown.cancel();

        tokio::time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(client.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_command_message_gets_reply_on_originating_chat() {
        let _guard = guard();
        let client = Arc::new(MockClient::default());
        let (supervisor, _tx) = build(client.clone(), CancellationToken::new());

        supervisor
            .handle_event(ClientEvent::Message {
                chat_id: "628123@c.us".to_string(),
                text: ".ping".to_string(),
                sender: None,
            })
            .await;

        let sent = client.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "628123@c.us");
        assert!(sent[0].1.starts_with("🏓"));
    }

    #[tokio::test]
    async fn test_conversational_text_is_ignored() {
        let _guard = guard();
        let client = Arc::new(MockClient::default());
        let (supervisor, _tx) = build(client.clone(), CancellationToken::new());

        supervisor
            .handle_event(ClientEvent::Message {
                chat_id: "628123@c.us".to_string(),
                text: "hello bot".to_string(),
                sender: None,
            })
            .await;

        assert!(client.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_test_requires_ready_session() {
        let client = Arc::new(MockClient::default());
        let session = SessionHandle::new();
        let handle = SupervisorHandle::new(client.clone(), session.clone());

        let err = handle.send_test("628123", "hello").await.unwrap_err();
        assert!(matches!(err, BotError::NotConnected));
        assert!(client.sent.lock().unwrap().is_empty());

        session.set_phase(SessionPhase::Ready);
        handle.send_test("628123", "hello").await.expect("send ok");

        let sent = client.sent.lock().unwrap();
        assert_eq!(sent[0].0, "628123@c.us");
        assert_eq!(sent[0].1, "hello");
    }
}
