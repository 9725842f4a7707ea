//! Error classification (C2): mapping provider errors onto a closed
//! taxonomy, grounded in the teacher's `provider.rs::ProviderError` and
//! `OVERFLOW_PATTERNS`.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::retry::IsRetryable;

/// Closed taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedErrorKind {
    ContextOverflow,
    RateLimit,
    Auth,
    NotFound,
    Timeout,
    ApiError,
}

/// `{type, message, http_status, is_retryable, retry_after, original}`.
#[derive(Debug, Clone)]
pub struct ClassifiedError {
    pub kind: ClassifiedErrorKind,
    pub message: String,
    pub http_status: Option<u16>,
    pub is_retryable: bool,
    pub retry_after: Option<std::time::Duration>,
    pub original: String,
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ClassifiedError {}

impl IsRetryable for ClassifiedError {
    fn is_retryable(&self) -> Option<String> {
        self.is_retryable.then(|| self.message.clone())
    }

    fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after.map(|d| d.as_millis() as u64)
    }
}

/// Library error type for fallible provider operations. Non-success HTTP
/// paths are carried as `Classified`; everything else is plumbing.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Classified(#[from] ClassifiedErrorBox),
    #[error("network error: {0}")]
    Network(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("provider not found: {0}")]
    ProviderNotFound(String),
    #[error("model not found: {0}")]
    ModelNotFound(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("request cancelled")]
    Cancelled,
    #[error("request timed out")]
    Timeout,
}

/// `thiserror`'s `#[from]` needs a concrete wrapper since `ClassifiedError`
/// doesn't itself implement `Error` via derive; this keeps `ProviderError`
/// a single typed enum rather than leaking `anyhow` into the public API.
#[derive(Debug)]
pub struct ClassifiedErrorBox(pub ClassifiedError);

impl std::fmt::Display for ClassifiedErrorBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
impl std::error::Error for ClassifiedErrorBox {}

impl From<ClassifiedError> for ProviderError {
    fn from(e: ClassifiedError) -> Self {
        ProviderError::Classified(ClassifiedErrorBox(e))
    }
}

impl IsRetryable for ProviderError {
    fn is_retryable(&self) -> Option<String> {
        match self {
            ProviderError::Classified(b) => b.0.is_retryable(),
            ProviderError::Network(m) => Some(m.clone()),
            ProviderError::Timeout => Some("timeout".into()),
            _ => None,
        }
    }

    fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::Classified(b) => b.0.retry_after_ms(),
            _ => None,
        }
    }
}

/// Regex vocabulary covering each provider's context-overflow phrasing.
/// One entry per vendor; order doesn't matter since classification only
/// cares whether *any* pattern matches.
static OVERFLOW_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)prompt is too long",
        r"(?i)maximum context length",
        r"(?i)context length exceeded",
        r"(?i)context_length_exceeded",
        r"(?i)too many tokens",
        r"(?i)input is too long",
        r"(?i)exceeds the.*context window",
        r"(?i)exceeds.*maximum number of tokens",
        r"(?i)reduce the length of",
        r"(?i)请求体过大", // DeepSeek/zh-CN overflow phrasing
        r"(?i)token limit",
        r"(?i)messages.*too long",
        r"(?i)input length.*exceeds",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static overflow pattern compiles"))
    .collect()
});

static RATE_LIMIT_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)rate_limit|rate limit|too_many_requests|quota").unwrap());

static SERVER_TROUBLE_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)overloaded|exhausted|unavailable").unwrap());

pub fn is_context_overflow(message: &str) -> bool {
    OVERFLOW_PATTERNS.iter().any(|re| re.is_match(message))
}

/// Pulls the raw `retry-after` header value out of a response, before the
/// caller consumes the response body. Owned so callers can read the body
/// after dropping the response.
pub fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<String> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Classify `(err_message, http_status, response_body, retry_after_header)`.
/// `err_message` and `response_body` are both scanned, since a
/// network-transport error may only have a message and an HTTP error may
/// only have a body. `retry_after_header` is the raw `retry-after` response
/// header value, if the caller captured one; it only ends up on the
/// returned `ClassifiedError` for kinds that are themselves retryable.
pub fn classify(
    http_status: Option<u16>,
    body: &str,
    err_message: Option<&str>,
    retry_after_header: Option<&str>,
) -> ClassifiedError {
    let haystack = match err_message {
        Some(m) => format!("{m} {body}"),
        None => body.to_string(),
    };

    let original = haystack.clone();
    let retry_after = retry_after_header.and_then(parse_retry_after);

    if is_context_overflow(&haystack) {
        return ClassifiedError {
            kind: ClassifiedErrorKind::ContextOverflow,
            message: haystack,
            http_status,
            is_retryable: false,
            retry_after: None,
            original,
        };
    }

    if let Some(status) = http_status {
        if status == 401 || status == 403 {
            return ClassifiedError {
                kind: ClassifiedErrorKind::Auth,
                message: haystack,
                http_status,
                is_retryable: false,
                retry_after: None,
                original,
            };
        }
        if status == 429 {
            return ClassifiedError {
                kind: ClassifiedErrorKind::RateLimit,
                message: haystack,
                http_status,
                is_retryable: true,
                retry_after,
                original,
            };
        }
        if status == 404 {
            return ClassifiedError {
                kind: ClassifiedErrorKind::NotFound,
                message: haystack,
                http_status,
                is_retryable: true,
                retry_after,
                original,
            };
        }
        if status >= 500 {
            return ClassifiedError {
                kind: ClassifiedErrorKind::ApiError,
                message: haystack,
                http_status,
                is_retryable: true,
                retry_after,
                original,
            };
        }
    }

    if RATE_LIMIT_WORDS.is_match(&haystack) {
        return ClassifiedError {
            kind: ClassifiedErrorKind::RateLimit,
            message: haystack,
            http_status,
            is_retryable: true,
            retry_after,
            original,
        };
    }

    if SERVER_TROUBLE_WORDS.is_match(&haystack) {
        return ClassifiedError {
            kind: ClassifiedErrorKind::ApiError,
            message: haystack,
            http_status,
            is_retryable: true,
            retry_after,
            original,
        };
    }

    // Default for 4xx not otherwise classified, and for transport errors
    // with no status at all: non-retryable api_error.
    ClassifiedError {
        kind: ClassifiedErrorKind::ApiError,
        message: haystack,
        http_status,
        is_retryable: false,
        retry_after: None,
        original,
    }
}

/// Parses a `retry-after` header value as either seconds (float) or an
/// HTTP-date, matching the two forms the HTTP spec allows.
fn parse_retry_after(val: &str) -> Option<std::time::Duration> {
    if let Ok(secs) = val.parse::<f64>() {
        if !secs.is_nan() && secs >= 0.0 {
            return Some(std::time::Duration::from_secs_f64(secs));
        }
    }
    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(val) {
        let diff_ms = date.signed_duration_since(chrono::Utc::now()).num_milliseconds();
        if diff_ms > 0 {
            return Some(std::time::Duration::from_millis(diff_ms as u64));
        }
    }
    None
}

/// User-facing decorator: title + explanation + remediation bullets,
/// applied once at the highest layer of the core boundary.
#[derive(Debug, Clone)]
pub struct UserFriendlyError {
    pub title: String,
    pub message: String,
    pub suggestions: Vec<String>,
    pub source: ClassifiedError,
}

impl std::fmt::Display for UserFriendlyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", self.message)?;
        for s in &self.suggestions {
            writeln!(f, "  - {s}")?;
        }
        Ok(())
    }
}

impl From<ClassifiedError> for UserFriendlyError {
    fn from(err: ClassifiedError) -> Self {
        let (title, message, suggestions) = match err.kind {
            ClassifiedErrorKind::ContextOverflow => (
                "Context Window Exceeded",
                "The conversation is too long for this model's context window.",
                vec![
                    "Compact the session to free up context".to_string(),
                    "Start a new session".to_string(),
                    "Switch to a model with a larger context window".to_string(),
                ],
            ),
            ClassifiedErrorKind::Auth => (
                "Authentication Failed",
                "The provider rejected the request's credentials.",
                vec![
                    "Re-run login for this provider".to_string(),
                    "Check the relevant API key environment variable".to_string(),
                    "Verify the stored key hasn't been revoked".to_string(),
                ],
            ),
            ClassifiedErrorKind::RateLimit => (
                "Rate Limited",
                "The provider is throttling requests.",
                vec!["Wait a moment and try again".to_string()],
            ),
            ClassifiedErrorKind::NotFound => (
                "Model or Endpoint Unavailable",
                "The requested model or endpoint could not be found.",
                vec!["Check the model id is correct and currently available".to_string()],
            ),
            ClassifiedErrorKind::Timeout => (
                "Request Timed Out",
                "The provider did not respond in time.",
                vec!["Try again; consider a shorter request".to_string()],
            ),
            ClassifiedErrorKind::ApiError => (
                "Provider Error",
                "The provider returned an error.",
                vec!["Try again later".to_string()],
            ),
        };
        UserFriendlyError {
            title: title.to_string(),
            message: message.to_string(),
            suggestions,
            source: err,
        }
    }
}
