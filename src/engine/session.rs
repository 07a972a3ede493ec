//! Live session
//!
//! One opaque per-call object owned by the active engine. Commands are
//! forwarded as-is; the engines' differently named answer signals are
//! normalized into [`SessionLifecycle`].

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use super::{EngineKind, ManagedSession, RtcSession, SessionError, SessionHandler};
use crate::media::MediaTrack;

const MANAGED_ANSWER_EVENTS: &[&str] = &["accepted"];
const DIRECT_ANSWER_EVENTS: &[&str] = &["accepted", "confirmed"];
const ENDED_EVENT: &str = "ended";
const FAILED_EVENT: &str = "failed";

/// Canonical session lifecycle signals
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionLifecycle {
    Answered,
    Ended { cause: Option<String> },
    Failed { cause: Option<String> },
}

impl SessionLifecycle {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionLifecycle::Answered)
    }
}

#[derive(Clone)]
pub enum LiveSession {
    Managed(Rc<dyn ManagedSession>),
    Direct(Rc<dyn RtcSession>),
}

impl std::fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LiveSession({})", self.engine())
    }
}

impl LiveSession {
    pub fn engine(&self) -> EngineKind {
        match self {
            LiveSession::Managed(_) => EngineKind::Managed,
            LiveSession::Direct(_) => EngineKind::Direct,
        }
    }

    pub fn is_ended(&self) -> bool {
        match self {
            LiveSession::Managed(s) => s.is_ended(),
            LiveSession::Direct(s) => s.is_ended(),
        }
    }

    /// Subscribe to the engine's own event names
    pub fn on(&self, event: &str, handler: SessionHandler) {
        match self {
            LiveSession::Managed(s) => s.on(event, handler),
            LiveSession::Direct(s) => s.on(event, handler),
        }
    }

    /// The engine's native session object, when the host exposes one
    pub fn host_object(&self) -> Option<&dyn Any> {
        match self {
            LiveSession::Managed(s) => s.host_object(),
            LiveSession::Direct(s) => s.host_object(),
        }
    }

    /// Subscribe to normalized lifecycle signals. `Answered` is delivered at
    /// most once even when the engine reports several answer events.
    pub fn on_lifecycle(&self, handler: Rc<dyn Fn(SessionLifecycle)>) {
        let answer_events = match self {
            LiveSession::Managed(_) => MANAGED_ANSWER_EVENTS,
            LiveSession::Direct(_) => DIRECT_ANSWER_EVENTS,
        };

        let answered = Rc::new(Cell::new(false));
        for name in answer_events {
            let handler = handler.clone();
            let answered = answered.clone();
            self.on(
                name,
                Rc::new(move |_: &serde_json::Value| {
                    if !answered.replace(true) {
                        handler(SessionLifecycle::Answered);
                    }
                }),
            );
        }

        let on_ended = handler.clone();
        self.on(
            ENDED_EVENT,
            Rc::new(move |payload: &serde_json::Value| {
                on_ended(SessionLifecycle::Ended { cause: cause_of(payload) })
            }),
        );

        self.on(
            FAILED_EVENT,
            Rc::new(move |payload: &serde_json::Value| {
                handler(SessionLifecycle::Failed { cause: cause_of(payload) })
            }),
        );
    }

    /// End the session, preferring graceful termination over forceful
    pub async fn terminate(&self) -> Result<(), SessionError> {
        match self {
            LiveSession::Managed(s) => match s.bye().await {
                Err(SessionError::Unsupported(_)) => s.terminate().await,
                other => other,
            },
            LiveSession::Direct(s) => match s.bye() {
                Err(SessionError::Unsupported(_)) => s.terminate(),
                other => other,
            },
        }
    }

    pub fn mute(&self) -> Result<(), SessionError> {
        match self {
            LiveSession::Managed(s) => s.mute(),
            LiveSession::Direct(s) => s.mute(),
        }
    }

    pub fn unmute(&self) -> Result<(), SessionError> {
        match self {
            LiveSession::Managed(s) => s.unmute(),
            LiveSession::Direct(s) => s.unmute(),
        }
    }

    pub async fn hold(&self) -> Result<(), SessionError> {
        match self {
            LiveSession::Managed(s) => s.hold().await,
            LiveSession::Direct(s) => s.hold(),
        }
    }

    pub async fn unhold(&self) -> Result<(), SessionError> {
        match self {
            LiveSession::Managed(s) => s.unhold().await,
            LiveSession::Direct(s) => s.unhold(),
        }
    }

    pub fn send_dtmf(&self, digits: &str) -> Result<(), SessionError> {
        match self {
            LiveSession::Managed(s) => s.send_dtmf(digits),
            LiveSession::Direct(s) => s.send_dtmf(digits),
        }
    }

    pub fn supports_track_replacement(&self) -> bool {
        match self {
            LiveSession::Managed(s) => s.supports_track_replacement(),
            LiveSession::Direct(_) => false,
        }
    }

    pub async fn replace_outgoing_track(&self, track: &MediaTrack) -> Result<(), SessionError> {
        match self {
            LiveSession::Managed(s) => s.replace_outgoing_track(track).await,
            LiveSession::Direct(_) => Err(SessionError::Unsupported("replaceOutgoingTrack")),
        }
    }

    pub async fn restore_microphone_track(&self) -> Result<(), SessionError> {
        match self {
            LiveSession::Managed(s) => s.restore_microphone_track().await,
            LiveSession::Direct(_) => Err(SessionError::Unsupported("restoreMicrophoneTrack")),
        }
    }
}

/// Cause carried by an `ended`/`failed` payload
fn cause_of(payload: &serde_json::Value) -> Option<String> {
    payload
        .get("cause")
        .and_then(serde_json::Value::as_str)
        .or_else(|| payload.as_str())
        .map(String::from)
}
