//! Client registry
//!
//! Shares one [`Client`] per gateway/domain/bot identity and launches calls
//! from page triggers, ignoring repeat clicks while a launch is in flight.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::call::Call;
use crate::client::{CallOptions, Client};
use crate::config::ClientConfig;
use crate::engine::EngineHost;
use crate::ice;
use crate::media::MediaPlatform;
use crate::Click2CallError;

/// A call request assembled from a trigger element's attributes
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub config: ClientConfig,
    /// Explicit target; the configured bot when absent
    pub to: Option<String>,
}

impl LaunchRequest {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, to: None }
    }

    /// Build a request from `data-*` style attributes.
    ///
    /// Keys may be given camelCase (`botId`), lowercase (`botid`),
    /// kebab-case (`bot-id`) or dash-stripped.
    pub fn from_attributes(attributes: &HashMap<String, String>) -> Result<Self, Click2CallError> {
        let lookup = |key: &str| attribute(attributes, key);

        let endpoint = lookup("addresses")
            .and_then(|raw| first_address(&raw))
            .ok_or_else(|| missing("addresses"))?;
        let domain = lookup("domain").ok_or_else(|| missing("domain"))?;
        let bot_id = lookup("botId").ok_or_else(|| missing("botId"))?;
        let phone = lookup("botPhoneNumber").ok_or_else(|| missing("botPhoneNumber"))?;

        let mut config = ClientConfig::new(endpoint, domain, bot_id, phone);
        config.context = lookup("ctcContext");
        if let Some(raw) = lookup("iceServers") {
            config.ice_servers = ice::parse_ice_servers(&raw);
        }
        if let Some(device) = lookup("outputDeviceId") {
            config.audio.output_device_id = device;
        }
        if let Some(name) = lookup("displayName") {
            config.display_name = name;
        }
        config.auto_greet = lookup("autoGreet").map_or(false, |v| v.eq_ignore_ascii_case("true"));

        Ok(Self {
            config,
            to: lookup("to"),
        })
    }
}

fn missing(name: &str) -> Click2CallError {
    Click2CallError::Config(format!("missing attribute {}", name))
}

/// Look up a camelCase attribute under any of its accepted spellings
fn attribute(attributes: &HashMap<String, String>, key: &str) -> Option<String> {
    let lower = key.to_ascii_lowercase();
    let mut kebab = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            kebab.push('-');
            kebab.push(c.to_ascii_lowercase());
        } else {
            kebab.push(c);
        }
    }

    [key, lower.as_str(), kebab.as_str()]
        .iter()
        .find_map(|k| attributes.get(*k))
        .or_else(|| {
            attributes
                .iter()
                .find(|(k, _)| k.replace('-', "").eq_ignore_ascii_case(&lower))
                .map(|(_, v)| v)
        })
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First gateway address from a JSON array or a single URL
fn first_address(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        let addresses: Vec<String> = serde_json::from_str(raw).ok()?;
        return addresses
            .into_iter()
            .map(|a| a.trim().to_string())
            .find(|a| !a.is_empty());
    }
    Some(raw.to_string()).filter(|a| !a.is_empty())
}

/// Releases a trigger when the launch finishes, whatever the outcome
struct InFlight {
    triggers: Rc<RefCell<HashSet<String>>>,
    id: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.triggers.borrow_mut().remove(&self.id);
    }
}

pub struct ClientRegistry {
    host: Rc<dyn EngineHost>,
    platform: Rc<dyn MediaPlatform>,
    clients: RefCell<HashMap<String, Client>>,
    in_flight: Rc<RefCell<HashSet<String>>>,
}

impl ClientRegistry {
    pub fn new(host: Rc<dyn EngineHost>, platform: Rc<dyn MediaPlatform>) -> Self {
        Self {
            host,
            platform,
            clients: RefCell::new(HashMap::new()),
            in_flight: Rc::new(RefCell::new(HashSet::new())),
        }
    }

    /// Cached client for this connection identity, created on first use
    pub fn client_for(&self, config: &ClientConfig) -> Client {
        let key = config.connection_key();
        self.clients
            .borrow_mut()
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!("Creating client for {}", config.connection_key());
                Client::new(config.clone(), self.host.clone(), self.platform.clone())
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.clients.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.borrow().is_empty()
    }

    /// Register if needed and place the call. Returns `Ok(None)` when the
    /// same trigger already has a launch in flight.
    pub async fn launch(&self, trigger_id: &str, request: LaunchRequest) -> Result<Option<Call>, Click2CallError> {
        if !self.in_flight.borrow_mut().insert(trigger_id.to_string()) {
            tracing::debug!("Launch from {} already in flight, ignoring", trigger_id);
            return Ok(None);
        }
        let _guard = InFlight {
            triggers: self.in_flight.clone(),
            id: trigger_id.to_string(),
        };

        let client = self.client_for(&request.config);
        client
            .set_output_device(&request.config.audio.output_device_id)
            .await;
        client.register().await?;

        let options = CallOptions {
            to: request.to,
            ..Default::default()
        };
        let call = client.call(options).await?;
        Ok(Some(call))
    }

    /// Whether a launch from this trigger is in progress
    pub fn is_in_flight(&self, trigger_id: &str) -> bool {
        self.in_flight.borrow().contains(trigger_id)
    }
}
