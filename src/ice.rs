//! ICE-server configuration parser
//!
//! Operators paste relay-server lists in several loose formats: strict JSON,
//! JSON with unquoted keys, or a plain list of URLs. The parser accepts all of
//! them and always returns a usable, non-empty list.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Public STUN server used when nothing usable was configured
pub const DEFAULT_STUN_URL: &str = "stun:stun.l.google.com:19302";

const ICE_SCHEMES: [&str; 4] = ["stun:", "stuns:", "turn:", "turns:"];

/// One URL or several URLs for the same relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IceUrls {
    One(String),
    Many(Vec<String>),
}

/// STUN/TURN relay descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: IceUrls,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: IceUrls::One(url.into()),
            username: None,
            credential: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, credential: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.credential = Some(credential.into());
        self
    }
}

pub fn default_ice_servers() -> Vec<IceServer> {
    vec![IceServer::new(DEFAULT_STUN_URL)]
}

/// Parse a loosely formatted ICE-server list.
///
/// Never fails: empty or unusable input yields [`default_ice_servers`].
pub fn parse_ice_servers(raw: &str) -> Vec<IceServer> {
    let raw = raw.trim();
    if raw.is_empty() {
        return default_ice_servers();
    }

    let repaired = quote_bare_keys(raw);
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&repaired) {
        let servers = normalize_entries(&items);
        if !servers.is_empty() {
            return servers;
        }
        tracing::debug!("ICE list parsed as JSON but had no usable entries");
    }

    let servers = split_urls(raw);
    if !servers.is_empty() {
        return servers;
    }

    tracing::debug!("No usable ICE servers in {:?}, using default STUN", raw);
    default_ice_servers()
}

/// Serde adapter accepting either a structured list or a loose string.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Vec<IceServer>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let servers = match value {
        Value::String(raw) => parse_ice_servers(&raw),
        Value::Array(items) => normalize_entries(&items),
        _ => Vec::new(),
    };

    if servers.is_empty() {
        Ok(default_ice_servers())
    } else {
        Ok(servers)
    }
}

fn normalize_entries(items: &[Value]) -> Vec<IceServer> {
    items.iter().filter_map(normalize_entry).collect()
}

fn normalize_entry(item: &Value) -> Option<IceServer> {
    match item {
        Value::String(url) if !url.trim().is_empty() => Some(IceServer::new(url.trim())),
        Value::Object(map) => {
            let urls = map
                .get("urls")
                .and_then(urls_from_value)
                .or_else(|| map.get("url").and_then(urls_from_value))?;

            Some(IceServer {
                urls,
                username: non_empty_string(map.get("username")),
                credential: non_empty_string(map.get("credential")),
            })
        }
        // Nested arrays, numbers, booleans and null are dropped
        _ => None,
    }
}

fn urls_from_value(value: &Value) -> Option<IceUrls> {
    match value {
        Value::String(url) if !url.trim().is_empty() => Some(IceUrls::One(url.trim().to_string())),
        Value::Array(list) => {
            let urls: Vec<String> = list
                .iter()
                .filter_map(|u| u.as_str())
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
            if urls.is_empty() {
                None
            } else {
                Some(IceUrls::Many(urls))
            }
        }
        _ => None,
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn split_urls(raw: &str) -> Vec<IceServer> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(|token| token.trim_matches(|c| matches!(c, '"' | '\'' | '[' | ']' | '{' | '}')))
        .filter(|token| has_ice_scheme(token))
        .map(IceServer::new)
        .collect()
}

fn has_ice_scheme(token: &str) -> bool {
    let lower = token.to_ascii_lowercase();
    ICE_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

/// Quote object keys written without quotes, e.g. `{urls: "stun:x"}`.
///
/// A key is an identifier preceded by `{`, `,` or whitespace and followed by
/// optional whitespace and a colon. String literals are left untouched.
fn quote_bare_keys(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            i += 1;
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            i += 1;
            continue;
        }

        let starts_key = (c.is_ascii_alphabetic() || c == '_' || c == '$')
            && out
                .chars()
                .last()
                .map_or(false, |prev| prev == '{' || prev == ',' || prev.is_whitespace());

        if starts_key {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();

            let mut j = i;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }

            if j < chars.len() && chars[j] == ':' {
                out.push('"');
                out.push_str(&ident);
                out.push_str("\":");
                i = j + 1;
            } else {
                out.push_str(&ident);
            }
            continue;
        }

        out.push(c);
        i += 1;
    }

    out
}
