//! Click-to-call client
//!
//! Lets a web page place a SIP-over-WebSocket/WebRTC call to a fixed
//! call-center bot through a signaling gateway. The crate is a client-side
//! facade: the SIP and WebRTC mechanics are delegated to whichever session
//! engine the host environment provides.
//!
//! Components:
//! - [`EventHub`] - typed publish/subscribe for lifecycle events
//! - [`ice`] - tolerant ICE-server list parser
//! - [`engine`] - dual-engine session adapter
//! - [`Client`] - call lifecycle manager
//! - [`Call`] - uniform mid-call control surface
//! - [`media`] - remote audio sink binding and greeting injection
//!
//! Everything runs on a single thread. Hosts implement [`EngineHost`] and
//! [`MediaPlatform`]; in the browser the `web` module provides both.

mod call;
mod client;
mod config;
pub mod engine;
mod events;
mod headers;
pub mod ice;
pub mod media;
mod registry;
mod spawn;

#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(test)]
mod mock;

use std::rc::Rc;

pub use call::Call;
pub use client::{AudioDevices, CallOptions, Client, RegistrationState};
pub use config::{AudioConfig, ClientConfig, SipCredentials};
pub use engine::{EngineHost, EngineKind};
pub use events::{ClientEvent, EventHandler, EventHub, EventKind, WarningSource};
pub use headers::SipHeaders;
pub use ice::{IceServer, IceUrls};
pub use media::{MediaError, MediaPlatform};
pub use registry::{ClientRegistry, LaunchRequest};

use thiserror::Error;

/// Click-to-call errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Click2CallError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration error: no session engine available (load a managed UA or JsSIP before registering)")]
    NoEngine,

    #[error("Registration already in progress")]
    RegistrationInProgress,

    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Call failed: {0}")]
    CallFailed(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),
}

impl Click2CallError {
    /// Configuration errors are fatal and never retried automatically.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Click2CallError::Config(_) | Click2CallError::NoEngine)
    }
}

/// Create a click-to-call client bound to a host environment.
pub fn create_client(
    config: ClientConfig,
    host: Rc<dyn EngineHost>,
    platform: Rc<dyn MediaPlatform>,
) -> Client {
    Client::new(config, host, platform)
}
