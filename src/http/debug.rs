use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

const REDACTION: &str = "***REDACTED***";
const SENSITIVE_KEYS: [&str; 8] = [
    "key",
    "apikey",
    "token",
    "authorization",
    "secret",
    "password",
    "x-api-key",
    "gptoss",
];
/// Any key ending like this is treated as a credential (`api_key`,
/// `openai_api_key`, `access_token`, `client_secret`, ...).
const SENSITIVE_SUFFIXES: [&str; 4] = ["_key", "_token", "_secret", "-token"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpDebugConfig {
    pub enabled: bool,
    pub redact_secrets: bool,
    pub max_body_chars: usize,
}

impl HttpDebugConfig {
    pub fn from_verbose(verbose: bool) -> Self {
        Self {
            enabled: verbose,
            redact_secrets: true,
            max_body_chars: 4_000,
        }
    }

    #[cfg(test)]
    pub fn disabled() -> Self {
        Self::from_verbose(false)
    }
}

/// Which side of a model exchange a log record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    fn marker(self) -> char {
        match self {
            Self::Request => '>',
            Self::Response => '<',
        }
    }
}

/// Renders one side of an exchange as `[http-debug]` lines: the start line,
/// headers, a blank separator and the (redacted, truncated) body.
pub fn debug_lines(
    config: HttpDebugConfig,
    direction: Direction,
    start_line: &str,
    headers: &HeaderMap,
    body: &str,
) -> Vec<String> {
    let marker = direction.marker();
    let body = truncate_for_log(
        &redact_text_body(body, config.redact_secrets),
        config.max_body_chars,
    );

    let mut lines = vec![format!("[http-debug] {marker} {start_line}")];
    lines.extend(headers.iter().map(|(name, value)| {
        format!(
            "[http-debug] {marker} {}: {}",
            name.as_str(),
            shown_header_value(name.as_str(), value, config.redact_secrets)
        )
    }));
    lines.push(format!("[http-debug] {marker}"));
    if body.is_empty() {
        lines.push(format!("[http-debug] {marker} <empty body>"));
    } else {
        lines.extend(body.lines().map(|line| format!("[http-debug] {marker} {line}")));
    }
    lines
}

/// Hides credentials a gateway URL may carry: the userinfo password and
/// sensitive query parameters.
pub fn redact_url(url: &Url, enable_redaction: bool) -> String {
    if !enable_redaction {
        return url.as_str().to_string();
    }

    let mut redacted = url.clone();
    if redacted.password().is_some() {
        let _ = redacted.set_password(Some(REDACTION));
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let shown = if is_sensitive_key(&k) {
                REDACTION.to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), shown)
        })
        .collect();
    if !pairs.is_empty() {
        redacted.query_pairs_mut().clear().extend_pairs(pairs);
    }

    redacted.as_str().to_string()
}

fn shown_header_value(name: &str, value: &HeaderValue, enable_redaction: bool) -> String {
    if enable_redaction && is_sensitive_key(name) {
        return REDACTION.to_string();
    }
    value
        .to_str()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|_| "<non-utf8>".to_string())
}

pub fn redact_text_body(raw: &str, enable_redaction: bool) -> String {
    if !enable_redaction {
        return raw.to_string();
    }

    let Ok(mut json) = serde_json::from_str::<Value>(raw) else {
        return raw.to_string();
    };
    redact_json_value(&mut json);
    serde_json::to_string(&json).unwrap_or_else(|_| raw.to_string())
}

pub fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let count = input.chars().count();
    if count <= max_chars {
        return input.to_string();
    }

    let truncated = input.chars().take(max_chars).collect::<String>();
    format!("{truncated}... <truncated {} chars>", count - max_chars)
}

fn redact_json_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, item) in map {
                if is_sensitive_key(key) {
                    *item = Value::String(REDACTION.to_string());
                } else {
                    redact_json_value(item);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_json_value),
        _ => {}
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEYS.contains(&key.as_str())
        || SENSITIVE_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
}
