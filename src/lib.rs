#![forbid(unsafe_code)]
//! mailprobe: staged e-mail verification without sending mail.
//!
//! [`syntax`] checks the address grammar, [`mx`] resolves the domain's mail
//! exchangers and [`probe`] asks the preferred exchanger about the mailbox
//! with an `RCPT TO` that is never followed by `DATA`. [`Validator`] chains
//! the three and returns a [`ValidationResult`] that keeps "rejected" apart
//! from "could not tell".

pub mod mx;
pub mod pipeline;
pub mod probe;
pub mod syntax;
#[cfg(feature = "with-serde")]
pub mod wire;

pub use mx::{DnsResolver, DomainError, LookupMx, MxRecord, ResolverInitError, ResolverOptions};
pub use pipeline::{ValidateOptions, ValidationResult, Validator, overall_valid, validate_batch};
pub use probe::{
    CancelToken, Connector, ProbeOptions, ProbeReport, ProbeState, SmtpEvent, SmtpReply,
    SmtpVerdict, TcpConnector, TransportErrorKind,
};
pub use syntax::{EmailAddress, SyntaxError};
