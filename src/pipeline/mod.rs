//! The staged verification pipeline: syntax → MX → SMTP probe.
//!
//! Each stage gates the next one and every failure is folded into the
//! returned [`ValidationResult`]; nothing here returns an error or panics on
//! bad input, DNS trouble or a misbehaving mail server.

mod batch;

pub use batch::validate_batch;

use crate::mx::{DomainError, LookupMx};
use crate::probe::{self, CancelToken, Connector, ProbeOptions, SmtpEvent, SmtpVerdict};
use crate::syntax;

/// Per-call switches.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Run the SMTP probe after a successful MX lookup.
    pub check_mailbox: bool,
    /// Keep the SMTP transcript on the result.
    pub verbose_trace: bool,
}

/// Everything learnt about one address. Built fresh per call.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub email: String,
    pub syntax_valid: bool,
    pub domain_valid: bool,
    /// Why the domain stage failed, when it did.
    pub domain_error: Option<DomainError>,
    /// Exchanger probed, or the one that would be probed first.
    pub mx_host: Option<String>,
    /// `None` when the probe did not run.
    pub mailbox_verdict: Option<SmtpVerdict>,
    pub transcript: Vec<SmtpEvent>,
    pub overall_valid: bool,
}

impl ValidationResult {
    fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            syntax_valid: false,
            domain_valid: false,
            domain_error: None,
            mx_host: None,
            mailbox_verdict: None,
            transcript: Vec::new(),
            overall_valid: false,
        }
    }
}

/// The `overall_valid` policy.
///
/// With the probe enabled only a confirmed [`SmtpVerdict::Accepted`] counts:
/// ambiguous replies and transport errors are "not confirmed", never valid.
pub fn overall_valid(
    syntax_valid: bool,
    domain_valid: bool,
    check_mailbox: bool,
    verdict: Option<&SmtpVerdict>,
) -> bool {
    let mailbox_ok = !check_mailbox || verdict.is_some_and(SmtpVerdict::is_accepted);
    syntax_valid && domain_valid && mailbox_ok
}

/// Runs the pipeline with an injected resolver and transport.
///
/// A `Validator` holds no per-request state, so one instance can serve
/// concurrent callers when `R` and `C` are `Sync`.
#[derive(Debug, Clone)]
pub struct Validator<R, C> {
    resolver: R,
    connector: C,
    probe_options: ProbeOptions,
}

impl<R, C> Validator<R, C>
where
    R: LookupMx,
    C: Connector,
{
    pub fn new(resolver: R, connector: C, probe_options: ProbeOptions) -> Self {
        Self {
            resolver,
            connector,
            probe_options,
        }
    }

    pub fn validate(&self, raw: &str, options: &ValidateOptions) -> ValidationResult {
        self.validate_cancellable(raw, options, &self.probe_options.cancel)
    }

    /// Like [`validate`](Self::validate), but the SMTP probe gives up and
    /// closes its connection as soon as `cancel` is set.
    pub fn validate_cancellable(
        &self,
        raw: &str,
        options: &ValidateOptions,
        cancel: &CancelToken,
    ) -> ValidationResult {
        let _span = tracing::debug_span!("validate", email = %raw).entered();
        let mut result = ValidationResult::new(raw);

        let email = match syntax::validate(raw) {
            Ok(email) => email,
            Err(err) => {
                tracing::debug!(error = %err, "syntax check failed");
                return result;
            }
        };
        result.syntax_valid = true;

        let records = match crate::mx::resolve_with(&self.resolver, email.domain()) {
            Ok(records) => records,
            Err(err) => {
                tracing::debug!(error = %err, "domain check failed");
                result.domain_error = Some(err);
                return result;
            }
        };
        result.domain_valid = true;
        result.mx_host = records.first().map(|record| record.host.clone());

        if options.check_mailbox {
            let probe_options = ProbeOptions {
                verbose_trace: options.verbose_trace,
                cancel: cancel.clone(),
                ..self.probe_options.clone()
            };
            let report = probe::probe(&self.connector, &email, &records, &probe_options);
            if report.host.is_some() {
                result.mx_host = report.host;
            }
            result.transcript = report.transcript;
            result.mailbox_verdict = Some(report.verdict);
        }

        result.overall_valid = overall_valid(
            result.syntax_valid,
            result.domain_valid,
            options.check_mailbox,
            result.mailbox_verdict.as_ref(),
        );
        tracing::debug!(
            overall_valid = result.overall_valid,
            verdict = ?result.mailbox_verdict,
            "validation finished"
        );
        result
    }
}
