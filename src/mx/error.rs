use thiserror::Error;

/// Why a domain could not be confirmed as mail-capable.
///
/// The pipeline flattens every variant into `domain_valid = false`, but the
/// variant itself is kept on the result for diagnostics.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(
    feature = "with-serde",
    serde(tag = "kind", content = "detail", rename_all = "snake_case")
)]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("domain has no MX records")]
    NoRecords,
    #[error("domain does not exist (NXDOMAIN)")]
    NotFound,
    #[error("DNS lookup timed out")]
    Timeout,
    #[error("no nameserver could answer the query")]
    NoNameservers,
    #[error("DNS lookup failed: {0}")]
    Other(String),
}

impl DomainError {
    pub(crate) fn other(detail: impl Into<String>) -> Self {
        Self::Other(detail.into())
    }
}

/// The host's resolver configuration could not be loaded.
#[derive(Debug, Error)]
#[error("resolver initialization failed: {source}")]
pub struct ResolverInitError {
    #[source]
    source: std::io::Error,
}

impl ResolverInitError {
    pub(crate) fn new(source: impl Into<std::io::Error>) -> Self {
        Self {
            source: source.into(),
        }
    }
}
