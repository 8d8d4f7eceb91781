//! Live SMTP mailbox probing, the last pipeline stage.
//!
//! [`probe`] connects to the preferred mail exchanger, runs
//! `EHLO` / `MAIL FROM` / `RCPT TO` without ever sending `DATA`, and turns the
//! `RCPT` reply into an [`SmtpVerdict`]. Transport faults become
//! [`SmtpVerdict::TransportError`] values instead of errors, so the caller
//! always gets a verdict back.

mod options;
mod session;
mod transport;
mod types;

pub use options::{CancelToken, ProbeOptions};
pub use transport::{Connector, TcpConnector};
pub use types::{ProbeReport, ProbeState, SmtpEvent, SmtpReply, SmtpVerdict, TransportErrorKind};

use std::io::{self, Read, Write};

use crate::mx::MxRecord;
use crate::syntax::EmailAddress;

use session::{Fault, SmtpSession};

/// Probes `email` against `mx_hosts`, which must be in preference order and
/// non-empty.
///
/// Only the first exchanger is contacted unless `options.max_hosts` allows
/// more; further hosts are tried only when the previous one could not be
/// reached (connect failure, refused greeting or timeout).
pub fn probe<C>(
    connector: &C,
    email: &EmailAddress,
    mx_hosts: &[MxRecord],
    options: &ProbeOptions,
) -> ProbeReport
where
    C: Connector + ?Sized,
{
    debug_assert!(!mx_hosts.is_empty(), "probe called without mail exchangers");

    let mut transcript = Vec::new();
    let mut outcome = None;
    for record in mx_hosts.iter().take(options.host_budget()) {
        if options.cancel.is_cancelled() {
            return ProbeReport {
                verdict: cancelled_verdict(),
                host: None,
                transcript,
            };
        }
        let attempt = probe_host(connector, email, &record.host, options);
        transcript.extend(attempt.transcript);
        let unreachable = matches!(
            attempt.verdict,
            SmtpVerdict::TransportError {
                kind: TransportErrorKind::ConnectFailed | TransportErrorKind::Timeout,
                ..
            }
        );
        outcome = Some((record.host.clone(), attempt.verdict));
        if !unreachable {
            break;
        }
    }

    match outcome {
        Some((host, verdict)) => ProbeReport {
            verdict,
            host: Some(host),
            transcript,
        },
        None => ProbeReport {
            verdict: SmtpVerdict::transport(
                TransportErrorKind::ConnectFailed,
                "no mail exchanger to probe",
            ),
            host: None,
            transcript,
        },
    }
}

fn cancelled_verdict() -> SmtpVerdict {
    SmtpVerdict::transport(TransportErrorKind::Cancelled, "probe cancelled by caller")
}

struct HostAttempt {
    verdict: SmtpVerdict,
    transcript: Vec<SmtpEvent>,
}

fn probe_host<C>(
    connector: &C,
    email: &EmailAddress,
    host: &str,
    options: &ProbeOptions,
) -> HostAttempt
where
    C: Connector + ?Sized,
{
    let _span = tracing::debug_span!("smtp_probe", host, port = options.port).entered();
    let timeout = options.effective_timeout();

    let stream = match connector.connect(host, options.port, timeout) {
        Ok(stream) => stream,
        Err(err) => {
            let kind = if err.kind() == io::ErrorKind::TimedOut {
                TransportErrorKind::Timeout
            } else {
                TransportErrorKind::ConnectFailed
            };
            let detail = format!("connect to {host}:{} failed: {err}", options.port);
            tracing::warn!(%kind, %detail, "mail exchanger unreachable");
            let transcript = if options.verbose_trace {
                vec![SmtpEvent::Error {
                    state: ProbeState::Faulted,
                    message: format!("{kind}: {detail}"),
                }]
            } else {
                Vec::new()
            };
            return HostAttempt {
                verdict: SmtpVerdict::transport(kind, detail),
                transcript,
            };
        }
    };

    let mut session = SmtpSession::new(
        stream,
        host,
        timeout,
        options.verbose_trace,
        options.cancel.clone(),
    );
    let verdict = match converse(&mut session, email, options) {
        Ok(verdict) => {
            session.quit();
            verdict
        }
        Err(fault) => {
            tracing::warn!(kind = %fault.kind, detail = %fault.detail, "SMTP probe faulted");
            fault.into_verdict()
        }
    };
    debug_assert!(session.state().is_terminal());
    tracing::debug!(%verdict, state = ?session.state(), "SMTP probe finished");

    HostAttempt {
        verdict,
        transcript: session.into_transcript(),
    }
}

/// Runs the exchange up to the `RCPT` reply.
///
/// A server that refuses service in its greeting is treated like one that
/// could not be reached. A refused `EHLO`/`HELO` or `MAIL FROM` ends the
/// exchange early with an ambiguous verdict.
fn converse<S: Read + Write>(
    session: &mut SmtpSession<S>,
    email: &EmailAddress,
    options: &ProbeOptions,
) -> Result<SmtpVerdict, Fault> {
    let greeting = session.read_reply()?;
    if greeting.code != 220 {
        return Err(session.fail(Fault::refused(&greeting)));
    }

    let mut hello = session.command(&format!("EHLO {}", options.helo_domain))?;
    if hello.is_permanent_failure() {
        hello = session.command(&format!("HELO {}", options.helo_domain))?;
    }
    if !hello.is_positive_completion() {
        return Ok(SmtpVerdict::ambiguous(&hello));
    }
    session.advance(ProbeState::Greeted);

    let sender = session.command(&format!("MAIL FROM:<{}>", options.mail_from))?;
    if !sender.is_positive_completion() {
        return Ok(SmtpVerdict::ambiguous(&sender));
    }
    session.advance(ProbeState::SenderAccepted);

    let recipient = session.command(&format!("RCPT TO:<{email}>"))?;
    session.advance(ProbeState::RecipientChecked);
    Ok(classify_recipient(&recipient))
}

/// Maps the `RCPT` reply to a verdict. Only a plain 250 confirms the
/// mailbox; a 251 forward says nothing about it. Only the "mailbox does not
/// exist" family of permanent codes counts as a rejection.
pub(crate) fn classify_recipient(reply: &SmtpReply) -> SmtpVerdict {
    if reply.code == 250 {
        SmtpVerdict::Accepted
    } else if matches!(reply.code, 550 | 551 | 553) {
        SmtpVerdict::Rejected
    } else {
        SmtpVerdict::ambiguous(reply)
    }
}

#[cfg(test)]
pub(crate) mod tests;
