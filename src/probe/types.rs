use std::fmt;

/// A raw SMTP reply: the three-digit status and its text.
///
/// Multi-line replies are joined with `\n`.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub message: String,
}

impl SmtpReply {
    pub fn is_positive_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_permanent_failure(&self) -> bool {
        (500..600).contains(&self.code)
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} {}", self.code, self.message)
        }
    }
}

/// Why a probe could not be carried to a verdict from the server.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    ConnectFailed,
    Disconnected,
    ProtocolError,
    Timeout,
    /// The caller gave up on the probe.
    Cancelled,
    Unknown,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConnectFailed => "connect_failed",
            Self::Disconnected => "disconnected",
            Self::ProtocolError => "protocol_error",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        })
    }
}

/// Mailbox-existence verdict of a single RCPT probe.
///
/// There is intentionally no conversion to `bool`: `Ambiguous` and
/// `TransportError` mean "could not tell", which is not the same as
/// `Rejected`.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(tag = "verdict", rename_all = "snake_case"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpVerdict {
    /// RCPT answered with 250.
    Accepted,
    /// RCPT answered with a "no such mailbox" code (550, 551, 553).
    Rejected,
    /// The server answered, but not with a conclusive code (greylisting,
    /// forwarding, policy blocks, refused `HELO` or sender).
    Ambiguous { code: u16, message: String },
    /// The exchange could not be completed.
    TransportError {
        kind: TransportErrorKind,
        detail: String,
    },
}

impl SmtpVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub(crate) fn ambiguous(reply: &SmtpReply) -> Self {
        Self::Ambiguous {
            code: reply.code,
            message: reply.message.clone(),
        }
    }

    pub(crate) fn transport(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self::TransportError {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for SmtpVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => f.write_str("accepted"),
            Self::Rejected => f.write_str("rejected"),
            Self::Ambiguous { code, message } => write!(f, "ambiguous ({code} {message})"),
            Self::TransportError { kind, detail } => {
                write!(f, "transport error ({kind}: {detail})")
            }
        }
    }
}

/// Where the SMTP exchange stands. `Closed` and `Faulted` are terminal.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "with-serde", serde(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Connected,
    Greeted,
    SenderAccepted,
    RecipientChecked,
    Closed,
    Faulted,
}

impl ProbeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Faulted)
    }
}

/// One transcript line, kept when `verbose_trace` is on.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmtpEvent {
    Sent { state: ProbeState, command: String },
    Received { state: ProbeState, reply: SmtpReply },
    Error { state: ProbeState, message: String },
}

impl fmt::Display for SmtpEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sent { command, .. } => write!(f, "C: {command}"),
            Self::Received { reply, .. } => write!(f, "S: {reply}"),
            Self::Error { state, message } => write!(f, "!: {message} (in {state:?})"),
        }
    }
}

/// Outcome of [`probe`](crate::probe::probe).
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub verdict: SmtpVerdict,
    /// Exchanger that produced `verdict`.
    pub host: Option<String>,
    /// Empty unless `verbose_trace` was requested.
    pub transcript: Vec<SmtpEvent>,
}
