//! Markdown report generation

use super::{ReportArtifact, ReportGenerator};
use crate::error::GatewayError;
use crate::models::{ReportKind, ReportPayload, ReportType};
use crate::Result;
use async_trait::async_trait;
use chrono::Utc;

const DISCLAIMER: &str = "This report is generated automatically for informational purposes \
only and does not constitute investment advice.";

#[derive(Debug, Clone, Default)]
pub struct MarkdownReportGenerator;

impl MarkdownReportGenerator {
    pub fn new() -> Self {
        Self
    }

    fn title(kind: ReportKind) -> &'static str {
        match kind {
            ReportKind::Analysis => "Analyst Report",
            ReportKind::Comparison => "Comparison Report",
        }
    }
}

#[async_trait]
impl ReportGenerator for MarkdownReportGenerator {
    async fn build(&self, kind: ReportKind, content: &str) -> Result<ReportArtifact> {
        if content.trim().is_empty() {
            return Err(GatewayError::Report("nothing to report".to_string()));
        }

        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", Self::title(kind)));
        out.push_str(&format!(
            "_Generated {} UTC_\n\n",
            Utc::now().format("%Y-%m-%d %H:%M")
        ));
        out.push_str(content.trim());
        out.push_str("\n\n---\n\n");
        out.push_str(DISCLAIMER);
        out.push('\n');

        Ok(ReportArtifact {
            payload: ReportPayload::Text(out),
            report_type: ReportType::Md,
        })
    }
}
