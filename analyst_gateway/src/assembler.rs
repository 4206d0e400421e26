//! Response Assembler
//!
//! Merges a textual body, an optional chart and an optional report into one
//! outbound [`ChatResponse`]. Failure responses always carry the fixed message
//! tied to their error code, never internal error text.

use crate::capabilities::ReportArtifact;
use crate::models::{ChartData, ChatResponse, ErrorCode, ReportType};

pub const BLOCKED_MESSAGE: &str =
    "This session has been blocked due to repeated policy violations. Please start a new session.";
pub const RATE_LIMITED_MESSAGE: &str =
    "Too many requests. Please wait a moment before sending another message.";
pub const INPUT_REJECTED_MESSAGE: &str =
    "Your message could not be processed because it was flagged by the security filter.";
pub const UPSTREAM_ERROR_MESSAGE: &str =
    "The analysis service is temporarily unavailable. Please try again shortly.";
pub const SUSPICIOUS_WARNING: &str =
    "Your message contained patterns associated with prompt manipulation. Further violations may block this session.";

pub fn failure_message(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::Blocked => BLOCKED_MESSAGE,
        ErrorCode::RateLimited => RATE_LIMITED_MESSAGE,
        ErrorCode::InputRejected => INPUT_REJECTED_MESSAGE,
        ErrorCode::UpstreamError => UPSTREAM_ERROR_MESSAGE,
    }
}

/// Successful response builder
#[derive(Debug, Clone, Default)]
pub struct ResponseAssembler {
    content: String,
    chart: Option<ChartData>,
    report: Option<ReportArtifact>,
    warning: Option<String>,
}

impl ResponseAssembler {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    /// Empty series are dropped
    pub fn chart(mut self, chart: Option<ChartData>) -> Self {
        self.chart = chart.filter(|c| !c.is_empty());
        self
    }

    pub fn report(mut self, report: Option<ReportArtifact>) -> Self {
        self.report = report;
        self
    }

    pub fn warning(mut self, warning: Option<String>) -> Self {
        self.warning = warning;
        self
    }

    pub fn build(self) -> ChatResponse {
        let (report, report_type) = match self.report {
            Some(artifact) => (Some(artifact.payload), artifact.report_type),
            None => (None, ReportType::default()),
        };

        ChatResponse {
            success: true,
            content: self.content,
            error_code: None,
            report,
            report_type,
            chart_data: self.chart,
            warning: self.warning,
        }
    }

    pub fn failure(code: ErrorCode) -> ChatResponse {
        ChatResponse {
            success: false,
            content: failure_message(code).to_string(),
            error_code: Some(code),
            report: None,
            report_type: ReportType::default(),
            chart_data: None,
            warning: None,
        }
    }
}
