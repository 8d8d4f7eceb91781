use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const MIN_TIMEOUT: Duration = Duration::from_millis(1);

/// Controls how [`probe`](crate::probe::probe) talks to a mail exchanger.
///
/// The identities are placeholders: nothing is ever delivered, they only
/// need to be syntactically acceptable to the remote server.
#[cfg_attr(feature = "with-serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    pub port: u16,
    /// Bound for the connect and for every reply read or command write.
    pub timeout: Duration,
    pub helo_domain: String,
    pub mail_from: String,
    /// How many exchangers to try, in preference order. The next one is only
    /// tried after a connect failure or a timeout.
    pub max_hosts: usize,
    pub verbose_trace: bool,
    /// Checked before connecting and between reads; once set, the probe
    /// drops its connection and reports [`TransportErrorKind::Cancelled`].
    ///
    /// [`TransportErrorKind::Cancelled`]: crate::probe::TransportErrorKind::Cancelled
    #[cfg_attr(feature = "with-serde", serde(skip))]
    pub cancel: CancelToken,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            port: 25,
            timeout: Duration::from_secs(10),
            helo_domain: "example.com".to_string(),
            mail_from: "check@example.com".to_string(),
            max_hosts: 1,
            verbose_trace: false,
            cancel: CancelToken::default(),
        }
    }
}

impl ProbeOptions {
    /// Socket APIs reject a zero timeout, so it is clamped to one millisecond.
    pub(crate) fn effective_timeout(&self) -> Duration {
        self.timeout.max(MIN_TIMEOUT)
    }

    pub(crate) fn host_budget(&self) -> usize {
        self.max_hosts.max(1)
    }
}

/// Shared flag a caller flips when it no longer wants the answer.
///
/// Clones observe the same flag. Two tokens compare equal only when they
/// share it.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl PartialEq for CancelToken {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for CancelToken {}
