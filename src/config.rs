//! Client configuration
//!
//! Connection settings for the signaling gateway and the call-center bot.
//! Immutable once a session starts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ice::{self, IceServer};
use crate::Click2CallError;

pub const DEFAULT_DISPLAY_NAME: &str = "Agent";
pub const DEFAULT_OUTPUT_DEVICE: &str = "default";
pub const DEFAULT_GREET_URL: &str = "/hello.mp3";
pub const DEFAULT_REGISTER_EXPIRES: u32 = 600;

/// Audio device selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioConfig {
    #[serde(default = "default_output_device")]
    pub output_device_id: String,
    #[serde(default)]
    pub input_device_id: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            output_device_id: default_output_device(),
            input_device_id: None,
        }
    }
}

/// SIP account used by the user agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipCredentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Default for SipCredentials {
    fn default() -> Self {
        Self {
            username: "anonymous".to_string(),
            password: String::new(),
        }
    }
}

/// Click-to-call connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// WebSocket URL of the signaling gateway (e.g. "wss://sbc.example.com:8443")
    #[serde(default, alias = "sbcWssUrl")]
    pub signaling_endpoint: String,

    /// SIP domain served by the gateway
    #[serde(default, alias = "sipDomain")]
    pub signaling_domain: String,

    /// STUN/TURN relays; accepts a structured list or a loose string
    #[serde(default = "ice::default_ice_servers", deserialize_with = "ice::deserialize_lenient")]
    pub ice_servers: Vec<IceServer>,

    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Bot the call is routed to (sent as `X-Bot-Id`)
    #[serde(default, alias = "botId")]
    pub target_bot_id: String,

    /// Caller phone number (sent as `X-PHONE-NUMBER`)
    #[serde(default, alias = "phoneNumber")]
    pub caller_phone_number: String,

    /// Optional conversation context (sent as `X-CTC-Context`)
    #[serde(default)]
    pub context: Option<String>,

    #[serde(default)]
    pub auth: SipCredentials,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub auto_greet: bool,

    #[serde(default = "default_greet_url")]
    pub greet_url: String,

    /// Registration expiry in seconds
    #[serde(default = "default_register_expires")]
    pub register_expires: u32,

    /// Additional SIP headers for every call
    #[serde(default, alias = "headers")]
    pub extra_headers: BTreeMap<String, String>,
}

fn default_output_device() -> String {
    DEFAULT_OUTPUT_DEVICE.to_string()
}

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.to_string()
}

fn default_greet_url() -> String {
    DEFAULT_GREET_URL.to_string()
}

fn default_register_expires() -> u32 {
    DEFAULT_REGISTER_EXPIRES
}

impl ClientConfig {
    /// Config with the required fields set and defaults for everything else
    pub fn new(
        signaling_endpoint: impl Into<String>,
        signaling_domain: impl Into<String>,
        target_bot_id: impl Into<String>,
        caller_phone_number: impl Into<String>,
    ) -> Self {
        Self {
            signaling_endpoint: signaling_endpoint.into(),
            signaling_domain: signaling_domain.into(),
            ice_servers: ice::default_ice_servers(),
            display_name: default_display_name(),
            target_bot_id: target_bot_id.into(),
            caller_phone_number: caller_phone_number.into(),
            context: None,
            auth: SipCredentials::default(),
            audio: AudioConfig::default(),
            auto_greet: false,
            greet_url: default_greet_url(),
            register_expires: DEFAULT_REGISTER_EXPIRES,
            extra_headers: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = SipCredentials {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    /// Create config from environment variables
    pub fn from_env() -> Option<Self> {
        let signaling_endpoint = std::env::var("C2C_WSS_URL").ok()?;
        let signaling_domain = std::env::var("C2C_SIP_DOMAIN").ok()?;
        let target_bot_id = std::env::var("C2C_BOT_ID").ok()?;
        let caller_phone_number = std::env::var("C2C_PHONE_NUMBER").ok()?;

        let mut config = Self::new(signaling_endpoint, signaling_domain, target_bot_id, caller_phone_number);

        config.context = std::env::var("C2C_CONTEXT").ok().filter(|c| !c.is_empty());
        config.ice_servers = ice::parse_ice_servers(&std::env::var("C2C_ICE_SERVERS").unwrap_or_default());

        if let Ok(name) = std::env::var("C2C_DISPLAY_NAME") {
            config.display_name = name;
        }
        if let Ok(username) = std::env::var("C2C_SIP_USERNAME") {
            config.auth.username = username;
        }
        if let Ok(password) = std::env::var("C2C_SIP_PASSWORD") {
            config.auth.password = password;
        }
        if let Ok(device) = std::env::var("C2C_OUTPUT_DEVICE") {
            config.audio.output_device_id = device;
        }
        config.auto_greet = std::env::var("C2C_AUTO_GREET")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        if let Ok(url) = std::env::var("C2C_GREET_URL") {
            config.greet_url = url;
        }
        config.register_expires = std::env::var("C2C_REGISTER_EXPIRES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_REGISTER_EXPIRES);

        Some(config)
    }

    /// Validate the fields required before registration
    pub fn validate(&self) -> Result<(), Click2CallError> {
        let required = [
            ("signaling endpoint", &self.signaling_endpoint),
            ("signaling domain", &self.signaling_domain),
            ("target bot id", &self.target_bot_id),
            ("caller phone number", &self.caller_phone_number),
        ];

        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Click2CallError::Config(format!("{} is required", name)));
            }
        }
        Ok(())
    }

    /// Fill in defaults a deserialized or hand-built config may have left empty
    pub(crate) fn normalized(mut self) -> Self {
        if self.ice_servers.is_empty() {
            self.ice_servers = ice::default_ice_servers();
        }
        if self.display_name.trim().is_empty() {
            self.display_name = default_display_name();
        }
        if self.audio.output_device_id.is_empty() {
            self.audio.output_device_id = default_output_device();
        }
        if self.greet_url.is_empty() {
            self.greet_url = default_greet_url();
        }
        self
    }

    /// SIP URI of the configured bot target
    pub fn bot_uri(&self) -> String {
        format!("sip:{}@{}", self.target_bot_id, self.signaling_domain)
    }

    /// SIP URI of the local account
    pub fn account_uri(&self) -> String {
        format!("sip:{}@{}", self.auth.username, self.signaling_domain)
    }

    /// Identity used to share one client per gateway and bot
    pub fn connection_key(&self) -> String {
        format!(
            "{}|{}|{}",
            self.signaling_endpoint, self.signaling_domain, self.target_bot_id
        )
    }
}
