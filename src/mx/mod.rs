//! MX resolution, the second pipeline stage.
//!
//! [`resolve_with`] runs the lookup through any [`LookupMx`] implementation
//! and returns the exchangers in probing order. [`DnsResolver`] is the
//! production implementation on top of `trust-dns-resolver`.

mod error;
mod resolver;
mod types;

pub use error::{DomainError, ResolverInitError};
pub use resolver::{DnsResolver, LookupMx, ResolverOptions, resolve_with};
pub use types::MxRecord;
