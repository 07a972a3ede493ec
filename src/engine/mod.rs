//! Session adapter
//!
//! Two mutually exclusive session-control engines can be present in the
//! host environment:
//! - a managed UA (engine A) whose `start()` connects and registers
//! - a direct SIP/WebSocket UA (engine B) with explicit registration events
//!
//! [`build_engine`] detects which one is available and wraps it behind
//! [`SessionEngine`]; calls it places come back as a [`LiveSession`].

mod direct;
mod managed;
mod session;

pub use direct::{
    DirectCallOptions, DirectEngine, DirectSipFactory, DirectUa, DirectUaConfig, PcConfig, RtcSession,
    UaEvent, UaListener,
};
pub use managed::{AccountOptions, ManagedEngine, ManagedSession, ManagedUa, ManagedUaFactory, ManagedUaOptions, ServerConfig};
pub use session::{LiveSession, SessionLifecycle};

use std::cell::Cell;
use std::rc::Rc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::client::RegistrationState;
use crate::config::ClientConfig;
use crate::events::EventHub;
use crate::headers::SipHeaders;
use crate::media::RemoteAudioSink;
use crate::Click2CallError;

/// Errors from mid-call session primitives
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Not supported by this session: {0}")]
    Unsupported(&'static str),

    #[error("Session error: {0}")]
    Engine(String),
}

/// Handler for an engine's own session events; receives the event payload
pub type SessionHandler = Rc<dyn Fn(&serde_json::Value)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Managed UA, registration inferred from `start()`
    Managed,
    /// Direct SIP/WebSocket UA with registration events
    Direct,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Managed => write!(f, "managed UA"),
            EngineKind::Direct => write!(f, "direct SIP UA"),
        }
    }
}

/// Audio-only media constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub const AUDIO_ONLY: MediaConstraints = MediaConstraints {
        audio: true,
        video: false,
    };
}

/// Session engines the host environment exposes
pub trait EngineHost {
    fn managed_ua(&self) -> Option<Rc<dyn ManagedUaFactory>>;
    fn direct_sip(&self) -> Option<Rc<dyn DirectSipFactory>>;
}

/// Uniform surface over both engines
#[async_trait(?Send)]
pub trait SessionEngine {
    fn kind(&self) -> EngineKind;

    async fn register(&self) -> Result<(), Click2CallError>;

    async fn stop(&self) -> Result<(), Click2CallError>;

    async fn place_call(&self, target: &str, headers: &SipHeaders) -> Result<LiveSession, Click2CallError>;
}

/// Shared state an engine adapter reports into
#[derive(Clone)]
pub(crate) struct EngineContext {
    pub config: Rc<ClientConfig>,
    pub hub: EventHub,
    pub state: Rc<Cell<RegistrationState>>,
    pub sink: Rc<RemoteAudioSink>,
}

/// Build the adapter for whichever engine is present, preferring engine A.
pub(crate) fn build_engine(host: &dyn EngineHost, ctx: EngineContext) -> Result<Rc<dyn SessionEngine>, Click2CallError> {
    if let Some(factory) = host.managed_ua() {
        tracing::info!("Using managed UA session engine");
        return Ok(Rc::new(ManagedEngine::build(factory.as_ref(), ctx)?));
    }

    if let Some(factory) = host.direct_sip() {
        tracing::info!("Using direct SIP session engine");
        return Ok(Rc::new(DirectEngine::build(factory.as_ref(), ctx)?));
    }

    tracing::error!("No session engine found in host environment");
    Err(Click2CallError::NoEngine)
}
