//! Session state shared between the connection supervisor and the facade

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};

/// Lifecycle phase of the messaging session.
///
/// `ready()` is true only in `Ready`. `AuthFailure` and `Disconnected`
/// lifecycle events both land in `Disconnected`; whether a reconnect is
/// scheduled from there is the supervisor's call, not part of the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Initializing,
    AwaitingPairing,
    Authenticated,
    Ready,
    Disconnected,
}

impl SessionPhase {
    pub fn is_ready(self) -> bool {
        matches!(self, SessionPhase::Ready)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Initializing => "initializing",
            SessionPhase::AwaitingPairing => "awaiting-pairing",
            SessionPhase::Authenticated => "authenticated",
            SessionPhase::Ready => "ready",
            SessionPhase::Disconnected => "disconnected",
        }
    }
}

/// Scannable encoding of a one-time pairing challenge.
///
/// Artifacts are never cleared, only overwritten by the next challenge, so
/// a stale one may still be served after it expires on the service side.
/// `generated_at` lets callers apply their own expiry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingArtifact {
    pub data_uri: String,
    pub generated_at: DateTime<Utc>,
}

impl PairingArtifact {
    pub fn new(data_uri: impl Into<String>) -> Self {
        Self {
            data_uri: data_uri.into(),
            generated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
struct SessionState {
    phase: SessionPhase,
    artifact: Option<PairingArtifact>,
}

/// Shared handle to the session state.
///
/// Owned by the connection supervisor, passed by clone to the status
/// facade. Mutation happens only in supervisor event handling; the facade
/// only reads.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<SessionState>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.read().unwrap().phase
    }

    pub fn set_phase(&self, phase: SessionPhase) {
        self.inner.write().unwrap().phase = phase;
    }

    pub fn is_ready(&self) -> bool {
        self.phase().is_ready()
    }

    pub fn artifact(&self) -> Option<PairingArtifact> {
        self.inner.read().unwrap().artifact.clone()
    }

    pub fn set_artifact(&self, artifact: PairingArtifact) {
        self.inner.write().unwrap().artifact = Some(artifact);
    }
}
