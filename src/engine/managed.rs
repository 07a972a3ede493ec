//! Managed UA engine (engine A)
//!
//! The managed UA owns its own registration: `start()` both connects and
//! registers, and no separate registration-failed signal is observable.

use std::any::Any;
use std::rc::Rc;

use async_trait::async_trait;
use serde::Serialize;

use super::{EngineContext, EngineKind, LiveSession, MediaConstraints, SessionEngine, SessionError, SessionHandler};
use crate::config::ClientConfig;
use crate::events::{EventHub, WarningSource};
use crate::headers::SipHeaders;
use crate::ice::IceServer;
use crate::media::{MediaStream, MediaTrack, RemoteAudioSink};
use crate::Click2CallError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    pub addresses: Vec<String>,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOptions {
    pub user: String,
    pub user_auth: String,
    pub display_name: String,
    pub password: String,
    pub register_expires: u32,
}

/// Constructor options for the managed UA
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedUaOptions {
    pub server_config: ServerConfig,
    pub account: AccountOptions,
    pub constraints: MediaConstraints,
    pub ice_servers: Vec<IceServer>,
}

impl ManagedUaOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            server_config: ServerConfig {
                addresses: vec![config.signaling_endpoint.clone()],
                domain: config.signaling_domain.clone(),
            },
            account: AccountOptions {
                user: format!("{}@{}", config.auth.username, config.signaling_domain),
                user_auth: config.auth.username.clone(),
                display_name: config.display_name.clone(),
                password: config.auth.password.clone(),
                register_expires: config.register_expires,
            },
            constraints: MediaConstraints::AUDIO_ONLY,
            ice_servers: config.ice_servers.clone(),
        }
    }
}

pub trait ManagedUaFactory {
    fn create(&self, options: &ManagedUaOptions) -> Result<Box<dyn ManagedUa>, String>;
}

#[async_trait(?Send)]
pub trait ManagedUa {
    /// Connect to the gateway and register
    async fn start(&self) -> Result<(), String>;

    async fn stop(&self) -> Result<(), String>;

    async fn call(&self, target: &str, headers: &SipHeaders) -> Result<Rc<dyn ManagedSession>, String>;
}

/// Call session created by the managed UA.
///
/// Capabilities a given UA build may lack default to
/// [`SessionError::Unsupported`].
#[async_trait(?Send)]
pub trait ManagedSession {
    /// Subscribe to the session's own events (`accepted`, `ended`, `failed`, ...)
    fn on(&self, event: &str, handler: SessionHandler);

    /// The engine's own session object
    fn host_object(&self) -> Option<&dyn Any> {
        None
    }

    fn remote_stream(&self) -> Option<MediaStream> {
        None
    }

    /// Mute outbound audio
    fn mute(&self) -> Result<(), SessionError>;

    fn unmute(&self) -> Result<(), SessionError>;

    async fn hold(&self) -> Result<(), SessionError>;

    async fn unhold(&self) -> Result<(), SessionError>;

    fn is_ended(&self) -> bool;

    /// Graceful termination
    async fn bye(&self) -> Result<(), SessionError> {
        Err(SessionError::Unsupported("bye"))
    }

    /// Forceful termination
    async fn terminate(&self) -> Result<(), SessionError> {
        Err(SessionError::Unsupported("terminate"))
    }

    fn send_dtmf(&self, _digits: &str) -> Result<(), SessionError> {
        Err(SessionError::Unsupported("sendDTMF"))
    }

    fn supports_track_replacement(&self) -> bool {
        false
    }

    async fn replace_outgoing_track(&self, _track: &MediaTrack) -> Result<(), SessionError> {
        Err(SessionError::Unsupported("replaceOutgoingTrack"))
    }

    async fn restore_microphone_track(&self) -> Result<(), SessionError> {
        Err(SessionError::Unsupported("restoreMicrophoneTrack"))
    }
}

/// Adapter over a managed UA instance
pub struct ManagedEngine {
    ua: Box<dyn ManagedUa>,
    sink: Rc<RemoteAudioSink>,
    hub: EventHub,
}

impl ManagedEngine {
    pub(crate) fn build(factory: &dyn ManagedUaFactory, ctx: EngineContext) -> Result<Self, Click2CallError> {
        let options = ManagedUaOptions::from_config(&ctx.config);
        let ua = factory.create(&options).map_err(Click2CallError::Engine)?;

        Ok(Self {
            ua,
            sink: ctx.sink,
            hub: ctx.hub,
        })
    }
}

#[async_trait(?Send)]
impl SessionEngine for ManagedEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Managed
    }

    async fn register(&self) -> Result<(), Click2CallError> {
        self.ua.start().await.map_err(Click2CallError::RegistrationFailed)?;

        // A REGISTER rejected after start() completes is not observable here
        tracing::debug!("Managed UA started, treating as registered");
        Ok(())
    }

    async fn stop(&self) -> Result<(), Click2CallError> {
        self.ua.stop().await.map_err(Click2CallError::Engine)
    }

    async fn place_call(&self, target: &str, headers: &SipHeaders) -> Result<LiveSession, Click2CallError> {
        let session = self
            .ua
            .call(target, headers)
            .await
            .map_err(Click2CallError::CallFailed)?;

        if let Some(stream) = session.remote_stream() {
            if let Err(e) = self.sink.attach(&stream) {
                self.hub.warn(WarningSource::OutputDevice, e.to_string());
            }
        }

        Ok(LiveSession::Managed(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let config = ClientConfig::new("wss://sbc.example.com", "example.com", "b1", "555")
            .with_credentials("agent7", "secret");

        let options = ManagedUaOptions::from_config(&config);
        let json = serde_json::to_value(&options).unwrap();

        assert_eq!(json["serverConfig"]["addresses"][0], "wss://sbc.example.com");
        assert_eq!(json["serverConfig"]["domain"], "example.com");
        assert_eq!(json["account"]["user"], "agent7@example.com");
        assert_eq!(json["account"]["userAuth"], "agent7");
        assert_eq!(json["account"]["displayName"], "Agent");
        assert_eq!(json["account"]["registerExpires"], 600);
        assert_eq!(json["constraints"]["video"], false);
        assert_eq!(json["iceServers"][0]["urls"], "stun:stun.l.google.com:19302");
    }
}
