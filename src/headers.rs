//! Outbound SIP header set

use std::collections::BTreeMap;

use crate::config::ClientConfig;

pub const PHONE_NUMBER_HEADER: &str = "X-PHONE-NUMBER";
pub const BOT_ID_HEADER: &str = "X-Bot-Id";
pub const CONTEXT_HEADER: &str = "X-CTC-Context";

/// Ordered header list with case-insensitive override.
///
/// Inserting a name that already exists keeps its position and replaces
/// both spelling and value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SipHeaders {
    entries: Vec<(String, String)>,
}

impl SipHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge the header layers of an outbound call, lowest precedence first:
    /// fixed phone/bot headers, configured context, configured extras,
    /// per-call headers.
    pub fn for_call(config: &ClientConfig, per_call: &[(String, String)]) -> Self {
        let mut headers = Self::new();
        headers.insert(PHONE_NUMBER_HEADER, &config.caller_phone_number);
        headers.insert(BOT_ID_HEADER, &config.target_bot_id);
        if let Some(context) = config.context.as_deref().filter(|c| !c.is_empty()) {
            headers.insert(CONTEXT_HEADER, context);
        }
        headers.extend(&config.extra_headers);
        for (name, value) in per_call {
            headers.insert(name, value);
        }
        headers
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => *entry = (name, value),
            None => self.entries.push((name, value)),
        }
    }

    pub fn extend(&mut self, headers: &BTreeMap<String, String>) {
        for (name, value) in headers {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `Name: Value` lines for engines taking raw header text
    pub fn to_lines(&self) -> Vec<String> {
        self.iter().map(|(n, v)| format!("{}: {}", n, v)).collect()
    }

    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig::new("wss://sbc.example.com", "example.com", "b1", "555").with_context("ctx1")
    }

    #[test]
    fn test_per_call_header_overrides_context() {
        let headers = SipHeaders::for_call(&config(), &[(CONTEXT_HEADER.to_string(), "override".to_string())]);

        assert_eq!(headers.get(CONTEXT_HEADER), Some("override"));
        assert_eq!(headers.get(PHONE_NUMBER_HEADER), Some("555"));
        assert_eq!(headers.get(BOT_ID_HEADER), Some("b1"));
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_context_omitted_when_not_configured() {
        let config = ClientConfig::new("wss://sbc.example.com", "example.com", "b1", "555");
        let headers = SipHeaders::for_call(&config, &[]);
        assert_eq!(headers.get(CONTEXT_HEADER), None);
        assert_eq!(headers.to_lines(), vec!["X-PHONE-NUMBER: 555", "X-Bot-Id: b1"]);
    }

    #[test]
    fn test_precedence_layers() {
        let config = config()
            .with_header("X-Bot-Id", "from-config")
            .with_header("X-Campaign", "spring");
        let per_call = vec![("x-campaign".to_string(), "autumn".to_string())];

        let headers = SipHeaders::for_call(&config, &per_call);

        assert_eq!(headers.get(BOT_ID_HEADER), Some("from-config"));
        assert_eq!(headers.get("X-Campaign"), Some("autumn"));
        assert_eq!(
            headers.to_lines(),
            vec![
                "X-PHONE-NUMBER: 555",
                "X-Bot-Id: from-config",
                "X-CTC-Context: ctx1",
                "x-campaign: autumn",
            ]
        );
    }
}
