use std::collections::HashSet;
use std::io;
use std::time::Duration;

use trust_dns_resolver::Resolver;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::{ResolveError, ResolveErrorKind};
use trust_dns_resolver::proto::op::ResponseCode;

use super::{DomainError, MxRecord, ResolverInitError};

/// DNS capability used by the pipeline: one MX query, classified errors.
pub trait LookupMx {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DomainError>;
}

/// Tuning for [`DnsResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Upper bound for a single query. Lookups are never retried.
    pub timeout: Duration,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
        }
    }
}

/// `trust-dns-resolver` backed [`LookupMx`].
///
/// Every lookup builds its own synchronous resolver from the stored
/// configuration, so concurrent callers never wait on each other.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    config: ResolverConfig,
    opts: ResolverOpts,
}

impl DnsResolver {
    /// Uses the host's resolver configuration (`/etc/resolv.conf` on Unix).
    pub fn from_system_conf(options: &ResolverOptions) -> Result<Self, ResolverInitError> {
        let (config, opts) = trust_dns_resolver::system_conf::read_system_conf()
            .map_err(ResolverInitError::new)?;
        Ok(Self::with_config(config, opts, options))
    }

    /// Uses the resolver crate's public upstream defaults.
    pub fn public(options: &ResolverOptions) -> Self {
        Self::with_config(ResolverConfig::default(), ResolverOpts::default(), options)
    }

    pub fn with_config(
        config: ResolverConfig,
        mut opts: ResolverOpts,
        options: &ResolverOptions,
    ) -> Self {
        opts.timeout = options.timeout;
        opts.attempts = 1;
        Self { config, opts }
    }

    /// Resolves `domain` to its mail exchangers in probing order.
    pub fn resolve(&self, domain: &str) -> Result<Vec<MxRecord>, DomainError> {
        resolve_with(self, domain)
    }
}

impl LookupMx for DnsResolver {
    fn lookup_mx(&self, domain: &str) -> Result<Vec<MxRecord>, DomainError> {
        let resolver = Resolver::new(self.config.clone(), self.opts.clone())
            .map_err(|err| DomainError::other(format!("resolver setup failed: {err}")))?;
        let lookup = resolver.mx_lookup(domain).map_err(|err| classify(&err))?;
        Ok(lookup
            .iter()
            .map(|mx| MxRecord::new(mx.preference(), normalize_exchange(mx.exchange().to_utf8())))
            .collect())
    }
}

/// Looks up `domain` through `resolver` and orders the answer for probing.
///
/// The domain is trimmed and IDNA-normalised first. Records come back sorted
/// by ascending preference; the sort is stable, so exchangers sharing a
/// preference keep the resolver's order. Exact duplicates are dropped.
pub fn resolve_with<R>(resolver: &R, domain: &str) -> Result<Vec<MxRecord>, DomainError>
where
    R: LookupMx + ?Sized,
{
    let ascii = normalize_domain(domain)?;
    let mut records = resolver.lookup_mx(&ascii).inspect_err(|err| {
        tracing::debug!(domain = %ascii, error = %err, "MX lookup failed");
    })?;

    records.sort_by_key(|record| record.preference);
    let mut seen = HashSet::new();
    records.retain(|record| seen.insert(record.clone()));

    if records.is_empty() {
        tracing::debug!(domain = %ascii, "MX lookup returned no records");
        return Err(DomainError::NoRecords);
    }

    tracing::debug!(
        domain = %ascii,
        records = records.len(),
        primary = %records[0].host,
        "MX lookup complete"
    );
    Ok(records)
}

pub(crate) fn normalize_domain(domain: &str) -> Result<String, DomainError> {
    let trimmed = domain.trim();
    if trimmed.is_empty() {
        return Err(DomainError::other("domain is empty"));
    }
    idna::domain_to_ascii(trimmed)
        .map_err(|err| DomainError::other(format!("domain IDNA conversion failed: {err}")))
}

pub(crate) fn normalize_exchange(exchange: String) -> String {
    let trimmed = exchange.trim_end_matches('.');
    trimmed.to_ascii_lowercase()
}

pub(crate) fn classify(err: &ResolveError) -> DomainError {
    match err.kind() {
        ResolveErrorKind::NoRecordsFound { response_code, .. } => match *response_code {
            ResponseCode::NXDomain => DomainError::NotFound,
            ResponseCode::ServFail | ResponseCode::Refused => DomainError::NoNameservers,
            _ => DomainError::NoRecords,
        },
        ResolveErrorKind::Timeout => DomainError::Timeout,
        ResolveErrorKind::NoConnections => DomainError::NoNameservers,
        ResolveErrorKind::Io(source) if source.kind() == io::ErrorKind::TimedOut => {
            DomainError::Timeout
        }
        _ => DomainError::other(err.to_string()),
    }
}
