use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Raw transport capability used by the probe.
///
/// Implementations only open the byte stream; line framing and reply
/// parsing happen in the crate. Dropping the stream closes the connection.
pub trait Connector {
    type Stream: Read + Write;

    fn connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<Self::Stream>;
}

/// Plain TCP connector with connect, read and write deadlines.
///
/// `timeout` bounds the whole connect step: name resolution plus every
/// address attempt share one deadline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self, host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
        let deadline = Instant::now() + timeout;
        let addrs = resolve_addrs(host, port, timeout)?;
        let stream = connect_any(&addrs, deadline, |addr, budget| {
            TcpStream::connect_timeout(addr, budget)
        })?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        tracing::debug!(host, peer = ?stream.peer_addr().ok(), "connected");
        Ok(stream)
    }
}

/// Host name lookup bounded by `timeout`. The system resolver has no
/// deadline of its own, so it runs on a helper thread that is left behind
/// if it hangs.
fn resolve_addrs(host: &str, port: u16, timeout: Duration) -> io::Result<Vec<SocketAddr>> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let (tx, rx) = mpsc::channel();
    let target = (host.to_string(), port);
    thread::spawn(move || {
        let resolved = target
            .to_socket_addrs()
            .map(|iter| iter.collect::<Vec<SocketAddr>>());
        let _ = tx.send(resolved);
    });

    match rx.recv_timeout(timeout) {
        Ok(resolved) => resolved,
        Err(RecvTimeoutError::Timeout) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("resolving {host} timed out"),
        )),
        Err(RecvTimeoutError::Disconnected) => Err(io::Error::other(format!(
            "resolver thread for {host} exited without an answer"
        ))),
    }
}

/// Tries each address in turn, each attempt getting what is left until
/// `deadline`.
fn connect_any<T, F>(addrs: &[SocketAddr], deadline: Instant, mut attempt: F) -> io::Result<T>
where
    F: FnMut(&SocketAddr, Duration) -> io::Result<T>,
{
    let mut last_err = None;
    for addr in addrs {
        let budget = deadline.saturating_duration_since(Instant::now());
        if budget.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "connect deadline elapsed",
            ));
        }
        match attempt(addr, budget) {
            Ok(stream) => return Ok(stream),
            Err(err) => {
                tracing::debug!(%addr, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "no socket address resolved")
    }))
}
