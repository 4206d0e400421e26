//! Wire types shared by the gateway, its collaborators and the HTTP layer

use crate::error::GatewayError;
use crate::Result;
use base64::Engine;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Upper bound on caller-supplied session identifiers
pub const MAX_SESSION_ID_LEN: usize = 128;

//
// ================= Request =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default = "default_use_rag")]
    pub use_rag: bool,
}

fn default_use_rag() -> bool {
    true
}

impl ChatRequest {
    pub fn new(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message: message.into(),
            use_rag: true,
        }
    }

    /// Reject requests that break the calling contract.
    ///
    /// These are programming errors on the caller's side, not user input the
    /// gateway should classify, so they never touch session state.
    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "session_id must not be empty".to_string(),
            ));
        }
        if self.session_id.len() > MAX_SESSION_ID_LEN {
            return Err(GatewayError::InvalidRequest(format!(
                "session_id exceeds {} bytes",
                MAX_SESSION_ID_LEN
            )));
        }
        if self.message.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

//
// ================= Response =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InputRejected,
    RateLimited,
    Blocked,
    UpstreamError,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    #[default]
    Md,
    Pdf,
}

/// What a generated report covers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Analysis,
    Comparison,
}

/// Price series attached to an answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartData {
    pub ticker: String,
    /// Unix timestamps (seconds)
    pub t: Vec<i64>,
    /// Close prices aligned with `t`
    pub c: Vec<f64>,
}

impl ChartData {
    pub fn is_empty(&self) -> bool {
        self.t.is_empty() || self.c.is_empty()
    }
}

/// Report body as produced by the report generator.
///
/// Markdown travels as text; binary documents are base64-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportPayload {
    Text(String),
    Binary(Vec<u8>),
}

impl ReportPayload {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ReportPayload::Text(text) => text.as_bytes(),
            ReportPayload::Binary(bytes) => bytes,
        }
    }
}

impl Serialize for ReportPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ReportPayload::Text(text) => serializer.serialize_str(text),
            ReportPayload::Binary(bytes) => serializer
                .serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub content: String,
    pub error_code: Option<ErrorCode>,
    pub report: Option<ReportPayload>,
    pub report_type: ReportType,
    pub chart_data: Option<ChartData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

//
// ================= Session Snapshot =================
//

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub message_count: u64,
    pub warnings: u64,
    pub is_blocked: bool,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InputRejected => "INPUT_REJECTED",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::Blocked => "BLOCKED",
            ErrorCode::UpstreamError => "UPSTREAM_ERROR",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportType::Md => "md",
            ReportType::Pdf => "pdf",
        };
        write!(f, "{}", s)
    }
}

impl ReportType {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ReportType::Md => "text/markdown",
            ReportType::Pdf => "application/pdf",
        }
    }
}
