//! JSON request/response shapes for an HTTP (or queue) boundary.
//!
//! The transport itself lives outside this crate; these types only fix the
//! field names and the flattening of [`SmtpVerdict`] into a label plus a
//! detail string.

use serde::{Deserialize, Serialize};

use crate::pipeline::{ValidateOptions, ValidationResult};
use crate::probe::SmtpVerdict;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub email: String,
    #[serde(default)]
    pub check_smtp: bool,
    #[serde(default)]
    pub debug: bool,
}

impl ValidationRequest {
    pub fn options(&self) -> ValidateOptions {
        ValidateOptions {
            check_mailbox: self.check_smtp,
            verbose_trace: self.debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxVerdictLabel {
    Accepted,
    Rejected,
    Ambiguous,
    TransportError,
}

impl MailboxVerdictLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Ambiguous => "ambiguous",
            Self::TransportError => "transport_error",
        }
    }
}

impl From<&SmtpVerdict> for MailboxVerdictLabel {
    fn from(verdict: &SmtpVerdict) -> Self {
        match verdict {
            SmtpVerdict::Accepted => Self::Accepted,
            SmtpVerdict::Rejected => Self::Rejected,
            SmtpVerdict::Ambiguous { .. } => Self::Ambiguous,
            SmtpVerdict::TransportError { .. } => Self::TransportError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResponse {
    pub email: String,
    pub syntax_valid: bool,
    pub domain_valid: bool,
    pub mailbox_verdict: Option<MailboxVerdictLabel>,
    pub mailbox_detail: Option<String>,
    pub overall_valid: bool,
}

impl From<&ValidationResult> for ValidationResponse {
    fn from(result: &ValidationResult) -> Self {
        let verdict = result.mailbox_verdict.as_ref();
        Self {
            email: result.email.clone(),
            syntax_valid: result.syntax_valid,
            domain_valid: result.domain_valid,
            mailbox_verdict: verdict.map(MailboxVerdictLabel::from),
            mailbox_detail: verdict.and_then(mailbox_detail),
            overall_valid: result.overall_valid,
        }
    }
}

fn mailbox_detail(verdict: &SmtpVerdict) -> Option<String> {
    match verdict {
        SmtpVerdict::Accepted | SmtpVerdict::Rejected => None,
        SmtpVerdict::Ambiguous { code, message } => Some(format!("{code} {message}")),
        SmtpVerdict::TransportError { kind, detail } => Some(format!("{kind}: {detail}")),
    }
}
