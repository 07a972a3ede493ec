//! Direct SIP/WebSocket engine (engine B)
//!
//! The UA reports registration through events. A persistent listener keeps
//! the shared registration state current; `register()` waits for the first
//! `registered` or `registrationFailed` after `start()`.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;

use super::{EngineContext, EngineKind, LiveSession, MediaConstraints, SessionEngine, SessionError, SessionHandler};
use crate::client::RegistrationState;
use crate::config::ClientConfig;
use crate::events::{ClientEvent, EventHub, WarningSource};
use crate::headers::SipHeaders;
use crate::ice::IceServer;
use crate::media::{MediaStream, RemoteAudioSink};
use crate::Click2CallError;

const REGISTRATION_FAILED: &str = "registrationFailed";

/// UA constructor configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectUaConfig {
    /// WebSocket URLs; the host wraps each in its socket interface
    pub sockets: Vec<String>,
    pub uri: String,
    pub password: String,
    pub display_name: String,
    pub session_timers: bool,
    pub register: bool,
    pub register_expires: u32,
}

impl DirectUaConfig {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            sockets: vec![config.signaling_endpoint.clone()],
            uri: config.account_uri(),
            password: config.auth.password.clone(),
            display_name: config.display_name.clone(),
            session_timers: false,
            register: true,
            register_expires: config.register_expires,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PcConfig {
    pub ice_servers: Vec<IceServer>,
}

/// Options for placing a call
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectCallOptions {
    /// Raw `Name: Value` header lines
    pub extra_headers: Vec<String>,
    pub media_constraints: MediaConstraints,
    pub pc_config: PcConfig,
}

/// Events emitted by the direct UA
#[derive(Clone)]
pub enum UaEvent {
    Registered,
    Unregistered,
    RegistrationFailed { cause: Option<String> },
    /// Inbound or outbound session created
    NewRtcSession(Rc<dyn RtcSession>),
}

impl std::fmt::Debug for UaEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UaEvent::Registered => write!(f, "Registered"),
            UaEvent::Unregistered => write!(f, "Unregistered"),
            UaEvent::RegistrationFailed { cause } => write!(f, "RegistrationFailed({:?})", cause),
            UaEvent::NewRtcSession(_) => write!(f, "NewRtcSession"),
        }
    }
}

pub type UaListener = Rc<dyn Fn(UaEvent)>;

pub trait DirectSipFactory {
    fn create_ua(&self, config: &DirectUaConfig) -> Result<Rc<dyn DirectUa>, String>;
}

pub trait DirectUa {
    fn on(&self, listener: UaListener);

    /// Connect and send REGISTER; the outcome arrives as a [`UaEvent`]
    fn start(&self);

    fn stop(&self);

    fn call(&self, target: &str, options: &DirectCallOptions) -> Result<Rc<dyn RtcSession>, String>;
}

/// Call session created by the direct UA
pub trait RtcSession {
    /// Subscribe to the session's own events (`accepted`, `confirmed`, `ended`, `failed`, ...)
    fn on(&self, event: &str, handler: SessionHandler);

    fn host_object(&self) -> Option<&dyn Any> {
        None
    }

    /// Called with the first stream of every remote track on the peer connection
    fn on_remote_track(&self, handler: Rc<dyn Fn(MediaStream)>);

    fn mute(&self) -> Result<(), SessionError>;

    fn unmute(&self) -> Result<(), SessionError>;

    fn hold(&self) -> Result<(), SessionError>;

    fn unhold(&self) -> Result<(), SessionError>;

    fn is_ended(&self) -> bool;

    fn bye(&self) -> Result<(), SessionError> {
        Err(SessionError::Unsupported("bye"))
    }

    fn terminate(&self) -> Result<(), SessionError>;

    fn send_dtmf(&self, digits: &str) -> Result<(), SessionError>;
}

type RegistrationOutcome = Result<(), Option<String>>;

struct Shared {
    state: Rc<Cell<RegistrationState>>,
    hub: EventHub,
    sink: Rc<RemoteAudioSink>,
    pending: RefCell<Option<oneshot::Sender<RegistrationOutcome>>>,
    last_session: RefCell<Option<Rc<dyn RtcSession>>>,
}

impl Shared {
    fn handle(&self, event: UaEvent) {
        tracing::debug!("Direct UA event: {:?}", event);
        match event {
            UaEvent::Registered => {
                self.state.set(RegistrationState::Registered);
                let waiter = self.pending.borrow_mut().take();
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(Ok(()));
                    }
                    // Refresh outside of a register() call
                    None => self.hub.emit(ClientEvent::RegistrationSuccess),
                }
            }
            UaEvent::Unregistered => {
                self.state.set(RegistrationState::Unregistered);
            }
            UaEvent::RegistrationFailed { cause } => {
                self.state.set(RegistrationState::Unregistered);
                let waiter = self.pending.borrow_mut().take();
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(Err(cause));
                    }
                    None => self.hub.emit(ClientEvent::RegistrationError { cause }),
                }
            }
            UaEvent::NewRtcSession(session) => {
                let sink = self.sink.clone();
                let hub = self.hub.clone();
                session.on_remote_track(Rc::new(move |stream: MediaStream| {
                    if let Err(e) = sink.attach(&stream) {
                        hub.warn(WarningSource::OutputDevice, e.to_string());
                    }
                }));
                *self.last_session.borrow_mut() = Some(session);
            }
        }
    }
}

/// Adapter over a direct SIP UA instance
pub struct DirectEngine {
    ua: Rc<dyn DirectUa>,
    ice_servers: Vec<IceServer>,
    shared: Rc<Shared>,
}

impl DirectEngine {
    pub(crate) fn build(factory: &dyn DirectSipFactory, ctx: EngineContext) -> Result<Self, Click2CallError> {
        let ua = factory
            .create_ua(&DirectUaConfig::from_config(&ctx.config))
            .map_err(Click2CallError::Engine)?;

        let shared = Rc::new(Shared {
            state: ctx.state,
            hub: ctx.hub,
            sink: ctx.sink,
            pending: RefCell::new(None),
            last_session: RefCell::new(None),
        });

        let weak = Rc::downgrade(&shared);
        ua.on(Rc::new(move |event: UaEvent| {
            if let Some(shared) = weak.upgrade() {
                shared.handle(event);
            }
        }));

        Ok(Self {
            ua,
            ice_servers: ctx.config.ice_servers.clone(),
            shared,
        })
    }

    /// Most recent session reported by the UA
    pub fn last_session(&self) -> Option<Rc<dyn RtcSession>> {
        self.shared.last_session.borrow().clone()
    }
}

#[async_trait(?Send)]
impl SessionEngine for DirectEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Direct
    }

    async fn register(&self) -> Result<(), Click2CallError> {
        if self.shared.state.get() == RegistrationState::Registered {
            return Ok(());
        }

        let (tx, rx) = oneshot::channel();
        *self.shared.pending.borrow_mut() = Some(tx);
        self.ua.start();

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(cause)) => Err(Click2CallError::RegistrationFailed(
                cause.unwrap_or_else(|| REGISTRATION_FAILED.to_string()),
            )),
            Err(_) => Err(Click2CallError::RegistrationFailed(
                "UA dropped before reporting registration".to_string(),
            )),
        }
    }

    async fn stop(&self) -> Result<(), Click2CallError> {
        // Dropping the waiter resolves a pending register() with an error
        self.shared.pending.borrow_mut().take();
        self.ua.stop();
        Ok(())
    }

    async fn place_call(&self, target: &str, headers: &SipHeaders) -> Result<LiveSession, Click2CallError> {
        let options = DirectCallOptions {
            extra_headers: headers.to_lines(),
            media_constraints: MediaConstraints::AUDIO_ONLY,
            pc_config: PcConfig {
                ice_servers: self.ice_servers.clone(),
            },
        };

        let session = self.ua.call(target, &options).map_err(Click2CallError::CallFailed)?;
        Ok(LiveSession::Direct(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ua_config_from_config() {
        let config = ClientConfig::new("wss://sbc.example.com", "example.com", "b1", "555")
            .with_credentials("agent7", "secret");

        let ua_config = DirectUaConfig::from_config(&config);
        assert_eq!(ua_config.sockets, vec!["wss://sbc.example.com"]);
        assert_eq!(ua_config.uri, "sip:agent7@example.com");
        assert!(!ua_config.session_timers);
        assert!(ua_config.register);
        assert_eq!(ua_config.register_expires, 600);
    }

    #[test]
    fn test_call_options_wire_names() {
        let options = DirectCallOptions {
            extra_headers: vec!["X-Bot-Id: b1".into()],
            media_constraints: MediaConstraints::AUDIO_ONLY,
            pc_config: PcConfig {
                ice_servers: vec![IceServer::new("stun:a.com")],
            },
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["extraHeaders"][0], "X-Bot-Id: b1");
        assert_eq!(json["mediaConstraints"]["audio"], true);
        assert_eq!(json["pcConfig"]["iceServers"][0]["urls"], "stun:a.com");
    }
}
