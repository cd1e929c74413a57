//! Messages posted out of the page and the script that posts them

use serde::Deserialize;

const INTERCEPT_TEMPLATE: &str = include_str!("intercept.js");

/// Bridge object the host exposes to page script (`window.ipc.postMessage`)
pub const DEFAULT_MESSAGE_BRIDGE: &str = "window.ipc";

/// Which producer captured a payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPath {
    Fetch,
    Xhr,
    Load,
    BodyPoll,
    Navigation,
    #[default]
    #[serde(other)]
    Unknown,
}

/// One-way message from the injected script
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageMessage {
    Log {
        #[serde(default)]
        message: String,
    },
    DataReceived {
        #[serde(default)]
        source: DetectionPath,
        data: String,
    },
}

impl PageMessage {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Build the interception script for an endpoint pattern and message bridge
#[must_use]
pub fn interception_script(endpoint_pattern: &str, message_bridge: &str) -> String {
    // A JSON string literal is a valid JS string literal
    let pattern = serde_json::to_string(endpoint_pattern).unwrap_or_else(|_| "\"\"".to_string());
    INTERCEPT_TEMPLATE
        .replace("__ENDPOINT_PATTERN__", &pattern)
        .replace("__MESSAGE_BRIDGE__", message_bridge)
}

/// TLS and certificate warnings the upstream site emits without blocking content
#[must_use]
pub fn is_tls_noise(description: &str) -> bool {
    let description = description.to_lowercase();
    ["tls", "ssl", "certificate", "secure connection"]
        .iter()
        .any(|needle| description.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_data_message() {
        let message =
            PageMessage::parse(r#"{"type":"DATA_RECEIVED","source":"xhr","data":"[1]"}"#).unwrap();
        assert_eq!(
            message,
            PageMessage::DataReceived {
                source: DetectionPath::Xhr,
                data: "[1]".to_string()
            }
        );
    }

    #[test]
    fn test_parse_log_and_legacy_messages() {
        let log = PageMessage::parse(r#"{"type":"LOG","message":"hello"}"#).unwrap();
        assert!(matches!(log, PageMessage::Log { message } if message == "hello"));

        let legacy = PageMessage::parse(r#"{"type":"DATA_RECEIVED","data":"[]"}"#).unwrap();
        assert!(matches!(legacy, PageMessage::DataReceived { source: DetectionPath::Unknown, .. }));

        assert!(PageMessage::parse(r#"{"type":"PING"}"#).is_err());
        assert!(PageMessage::parse("not json").is_err());
    }

    #[test]
    fn test_both_wraps_require_success_status() {
        let script = interception_script("api/next/beaches", DEFAULT_MESSAGE_BRIDGE);
        assert!(script.contains("if (!isSuccess(response.status))"));
        assert!(script.contains("if (isSuccess(xhr.status))"));
        assert!(!script.contains("status === 200"));
    }

    #[test]
    fn test_interception_script_substitutes_placeholders() {
        let script = interception_script("api/next/\"beaches", DEFAULT_MESSAGE_BRIDGE);
        assert!(script.contains(r#"var PATTERN = "api/next/\"beaches";"#));
        assert!(script.contains("var bridge = window.ipc;"));
        assert!(!script.contains("__ENDPOINT_PATTERN__"));
        assert!(script.contains("XMLHttpRequest.prototype.send"));
        assert!(script.contains("window.fetch = function"));
    }

    #[test]
    fn test_tls_noise_detection() {
        assert!(is_tls_noise("The certificate for this server is invalid"));
        assert!(is_tls_noise("SSL handshake failed"));
        assert!(is_tls_noise("A TLS error caused the secure connection to fail"));
        assert!(!is_tls_noise("net::ERR_NAME_NOT_RESOLVED"));
        assert!(!is_tls_noise("The Internet connection appears to be offline."));
    }
}
