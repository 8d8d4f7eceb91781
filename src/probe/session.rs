use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::options::CancelToken;
use super::types::{ProbeState, SmtpEvent, SmtpReply, SmtpVerdict, TransportErrorKind};

/// Longest reply line accepted before the server is considered broken.
const MAX_LINE: usize = 4096;

/// A failure that ends the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Fault {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl Fault {
    fn protocol(detail: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::ProtocolError,
            detail: detail.into(),
        }
    }

    fn io(err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportErrorKind::Timeout,
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected => TransportErrorKind::Disconnected,
            io::ErrorKind::InvalidData => TransportErrorKind::ProtocolError,
            _ => TransportErrorKind::Unknown,
        };
        Self {
            kind,
            detail: err.to_string(),
        }
    }

    fn timed_out() -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            detail: "reply not completed before the deadline".to_string(),
        }
    }

    fn cancelled() -> Self {
        Self {
            kind: TransportErrorKind::Cancelled,
            detail: "probe cancelled by caller".to_string(),
        }
    }

    fn closed() -> Self {
        Self {
            kind: TransportErrorKind::Disconnected,
            detail: "connection closed by server".to_string(),
        }
    }

    pub(crate) fn refused(greeting: &SmtpReply) -> Self {
        Self {
            kind: TransportErrorKind::ConnectFailed,
            detail: format!("greeting refused: {greeting}"),
        }
    }

    pub(crate) fn into_verdict(self) -> SmtpVerdict {
        SmtpVerdict::transport(self.kind, self.detail)
    }
}

/// Line-oriented SMTP client state over one connection.
///
/// The session owns the stream, so dropping it releases the socket whatever
/// state the exchange ended in.
pub(crate) struct SmtpSession<S> {
    stream: S,
    host: String,
    buffer: Vec<u8>,
    timeout: Duration,
    state: ProbeState,
    transcript: Option<Vec<SmtpEvent>>,
    cancel: CancelToken,
}

impl<S: Read + Write> SmtpSession<S> {
    pub(crate) fn new(
        stream: S,
        host: &str,
        timeout: Duration,
        verbose: bool,
        cancel: CancelToken,
    ) -> Self {
        Self {
            stream,
            host: host.to_string(),
            buffer: Vec::new(),
            timeout,
            state: ProbeState::Connected,
            transcript: verbose.then(Vec::new),
            cancel,
        }
    }

    pub(crate) fn state(&self) -> ProbeState {
        self.state
    }

    pub(crate) fn advance(&mut self, next: ProbeState) {
        tracing::trace!(host = %self.host, from = ?self.state, to = ?next, "state change");
        self.state = next;
    }

    /// Sends `command` and waits for its reply.
    pub(crate) fn command(&mut self, command: &str) -> Result<SmtpReply, Fault> {
        self.record(SmtpEvent::Sent {
            state: self.state,
            command: command.to_string(),
        });
        let mut line = command.as_bytes().to_vec();
        line.extend_from_slice(b"\r\n");
        if let Err(err) = self.stream.write_all(&line).and_then(|()| self.stream.flush()) {
            return Err(self.fail(Fault::io(&err)));
        }
        self.read_reply()
    }

    /// Reads one complete, possibly multi-line, reply.
    pub(crate) fn read_reply(&mut self) -> Result<SmtpReply, Fault> {
        match self.read_reply_inner() {
            Ok(reply) => {
                self.record(SmtpEvent::Received {
                    state: self.state,
                    reply: reply.clone(),
                });
                Ok(reply)
            }
            Err(fault) => Err(self.fail(fault)),
        }
    }

    /// Best-effort `QUIT`. Always leaves the session in a terminal state.
    pub(crate) fn quit(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if self.cancel.is_cancelled() {
            self.fail(Fault::cancelled());
            return;
        }
        // A failed goodbye leaves the session Faulted; the verdict stands.
        if self.command("QUIT").is_ok() {
            self.advance(ProbeState::Closed);
        }
    }

    pub(crate) fn into_transcript(self) -> Vec<SmtpEvent> {
        self.transcript.unwrap_or_default()
    }

    pub(crate) fn fail(&mut self, fault: Fault) -> Fault {
        tracing::debug!(
            host = %self.host,
            state = ?self.state,
            kind = %fault.kind,
            detail = %fault.detail,
            "SMTP exchange faulted"
        );
        self.record(SmtpEvent::Error {
            state: self.state,
            message: format!("{}: {}", fault.kind, fault.detail),
        });
        self.advance(ProbeState::Faulted);
        fault
    }

    fn record(&mut self, event: SmtpEvent) {
        tracing::trace!(host = %self.host, "{event}");
        if let Some(transcript) = self.transcript.as_mut() {
            tracing::debug!(host = %self.host, "{event}");
            transcript.push(event);
        }
    }

    fn read_reply_inner(&mut self) -> Result<SmtpReply, Fault> {
        let deadline = Instant::now() + self.timeout;
        let mut code = None;
        let mut lines = Vec::new();
        loop {
            let line = self.read_line(deadline)?;
            let (parsed, last, text) = parse_reply_line(&line)?;
            match code {
                Some(existing) if existing != parsed => {
                    return Err(Fault::protocol(format!(
                        "inconsistent reply codes: {existing} vs {parsed}"
                    )));
                }
                Some(_) => {}
                None => code = Some(parsed),
            }
            lines.push(text);
            if last {
                break;
            }
        }
        let code = code.ok_or_else(|| Fault::protocol("reply missing status code"))?;
        Ok(SmtpReply {
            code,
            message: lines.join("\n"),
        })
    }

    fn read_line(&mut self, deadline: Instant) -> Result<String, Fault> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if self.buffer.len() > MAX_LINE {
                return Err(Fault::protocol(format!(
                    "reply line exceeds {MAX_LINE} bytes"
                )));
            }
            if self.cancel.is_cancelled() {
                return Err(Fault::cancelled());
            }
            if Instant::now() >= deadline {
                return Err(Fault::timed_out());
            }

            let mut chunk = [0u8; 512];
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(Fault::closed()),
                Ok(read) => self.buffer.extend_from_slice(&chunk[..read]),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(Fault::io(&err)),
            }
        }
    }
}

/// Splits `250-text` / `250 text` into (code, is_last_line, text).
fn parse_reply_line(line: &str) -> Result<(u16, bool, String), Fault> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(Fault::protocol(format!("malformed reply line: '{line}'")));
    }
    let code: u16 = line[..3]
        .parse()
        .map_err(|_| Fault::protocol(format!("invalid status code in '{line}'")))?;
    if !(200..600).contains(&code) {
        return Err(Fault::protocol(format!("status code {code} out of range")));
    }
    let last = bytes.get(3) != Some(&b'-');
    let text = line.get(4..).unwrap_or_default().to_string();
    Ok((code, last, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_and_continuation_lines() {
        assert_eq!(
            parse_reply_line("250 2.1.5 Ok").expect("valid"),
            (250, true, "2.1.5 Ok".to_string())
        );
        assert_eq!(
            parse_reply_line("250-PIPELINING").expect("valid"),
            (250, false, "PIPELINING".to_string())
        );
        assert_eq!(
            parse_reply_line("221").expect("valid"),
            (221, true, String::new())
        );
    }

    #[test]
    fn rejects_garbage_lines() {
        for line in ["", "25", "abc hello", "éé0 ok", "099 nope", "650 nope"] {
            let fault = parse_reply_line(line).expect_err("should not parse");
            assert_eq!(fault.kind, TransportErrorKind::ProtocolError, "{line}");
        }
    }

    #[test]
    fn io_errors_map_to_transport_kinds() {
        let cases = [
            (io::ErrorKind::WouldBlock, TransportErrorKind::Timeout),
            (io::ErrorKind::TimedOut, TransportErrorKind::Timeout),
            (io::ErrorKind::ConnectionReset, TransportErrorKind::Disconnected),
            (io::ErrorKind::BrokenPipe, TransportErrorKind::Disconnected),
            (io::ErrorKind::InvalidData, TransportErrorKind::ProtocolError),
            (io::ErrorKind::PermissionDenied, TransportErrorKind::Unknown),
        ];
        for (kind, expected) in cases {
            let fault = Fault::io(&io::Error::new(kind, "x"));
            assert_eq!(fault.kind, expected, "{kind:?}");
        }
    }
}
