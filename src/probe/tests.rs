use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use super::*;
use crate::syntax;

/// What a scripted stream does once its canned server bytes run out.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Exhausted {
    /// Orderly close: reads return 0.
    Eof,
    /// Reads fail like a socket whose read timeout elapsed.
    Stall,
}

#[derive(Debug, Clone)]
pub(crate) enum Script {
    Refuse(io::ErrorKind),
    Serve { server: String, then: Exhausted },
}

/// In-memory [`Connector`]: each host serves a fixed byte script and every
/// client line is appended to a shared log.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedConnector {
    hosts: HashMap<String, Script>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn host(mut self, host: &str, script: Script) -> Self {
        self.hosts.insert(host.to_string(), script);
        self
    }

    /// A well-behaved server whose `RCPT` reply is `rcpt`.
    pub(crate) fn answering_rcpt(host: &str, rcpt: &str) -> Self {
        Self::new().host(
            host,
            Script::Serve {
                server: format!(
                    "220 mx.test ESMTP\r\n\
                     250-mx.test\r\n250 PIPELINING\r\n\
                     250 2.1.0 Ok\r\n\
                     {rcpt}\r\n\
                     221 2.0.0 Bye\r\n"
                ),
                then: Exhausted::Eof,
            },
        )
    }

    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().expect("log lock").clone()
    }
}

pub(crate) struct ScriptedStream {
    server: io::Cursor<Vec<u8>>,
    then: Exhausted,
    pending: Vec<u8>,
    log: Arc<Mutex<Vec<String>>>,
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.server.read(buf)?;
        if read == 0 {
            if let Exhausted::Stall = self.then {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "read timed out"));
            }
        }
        Ok(read)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(pos) = self.pending.windows(2).position(|w| w == b"\r\n") {
            let line: Vec<u8> = self.pending.drain(..pos + 2).collect();
            let text = String::from_utf8_lossy(&line[..pos]).into_owned();
            self.log.lock().expect("log lock").push(text);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Connector for ScriptedConnector {
    type Stream = ScriptedStream;

    fn connect(&self, host: &str, _port: u16, _timeout: Duration) -> io::Result<ScriptedStream> {
        self.log.lock().expect("log lock").push(format!("connect {host}"));
        match self.hosts.get(host) {
            Some(Script::Refuse(kind)) => Err(io::Error::new(*kind, "scripted refusal")),
            Some(Script::Serve { server, then }) => Ok(ScriptedStream {
                server: io::Cursor::new(server.clone().into_bytes()),
                then: *then,
                pending: Vec::new(),
                log: Arc::clone(&self.log),
            }),
            None => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "unknown host",
            )),
        }
    }
}

fn address() -> EmailAddress {
    syntax::validate("user@example.com").expect("valid address")
}

fn single_mx(host: &str) -> Vec<MxRecord> {
    vec![MxRecord::new(10, host)]
}

fn run(connector: &ScriptedConnector) -> ProbeReport {
    probe(
        connector,
        &address(),
        &single_mx("mx.test"),
        &ProbeOptions::default(),
    )
}

#[test]
fn rcpt_250_is_accepted() {
    let connector = ScriptedConnector::answering_rcpt("mx.test", "250 2.1.5 Ok");
    let report = run(&connector);
    assert_eq!(report.verdict, SmtpVerdict::Accepted);
    assert_eq!(report.host.as_deref(), Some("mx.test"));
    assert!(report.transcript.is_empty());
    assert_eq!(
        connector.log(),
        [
            "connect mx.test",
            "EHLO example.com",
            "MAIL FROM:<check@example.com>",
            "RCPT TO:<user@example.com>",
            "QUIT",
        ]
    );
}

#[test]
fn rcpt_550_is_rejected() {
    let connector = ScriptedConnector::answering_rcpt("mx.test", "550 5.1.1 User unknown");
    assert_eq!(run(&connector).verdict, SmtpVerdict::Rejected);
}

#[test]
fn rcpt_450_is_ambiguous() {
    let connector =
        ScriptedConnector::answering_rcpt("mx.test", "450 4.2.0 Greylisted, try again later");
    assert_eq!(
        run(&connector).verdict,
        SmtpVerdict::Ambiguous {
            code: 450,
            message: "4.2.0 Greylisted, try again later".to_string()
        }
    );
}

#[test]
fn policy_5xx_is_ambiguous_not_rejected() {
    let connector = ScriptedConnector::answering_rcpt("mx.test", "554 5.7.1 Relay access denied");
    assert!(matches!(
        run(&connector).verdict,
        SmtpVerdict::Ambiguous { code: 554, .. }
    ));
}

#[test]
fn multiline_rcpt_reply_is_joined() {
    let connector = ScriptedConnector::answering_rcpt(
        "mx.test",
        "452-4.2.2 Mailbox full\r\n452 4.2.2 Try later",
    );
    assert_eq!(
        run(&connector).verdict,
        SmtpVerdict::Ambiguous {
            code: 452,
            message: "4.2.2 Mailbox full\n4.2.2 Try later".to_string()
        }
    );
}

#[test]
fn dropped_connection_mid_handshake_is_disconnected() {
    let connector = ScriptedConnector::new().host(
        "mx.test",
        Script::Serve {
            server: "220 mx.test ESMTP\r\n250 mx.test\r\n".to_string(),
            then: Exhausted::Eof,
        },
    );
    let report = run(&connector);
    assert!(matches!(
        report.verdict,
        SmtpVerdict::TransportError {
            kind: TransportErrorKind::Disconnected,
            ..
        }
    ));
    let log = connector.log();
    assert_eq!(log.last().map(String::as_str), Some("MAIL FROM:<check@example.com>"));
}

#[test]
fn silent_server_is_timeout() {
    let connector = ScriptedConnector::new().host(
        "mx.test",
        Script::Serve {
            server: String::new(),
            then: Exhausted::Stall,
        },
    );
    assert!(matches!(
        run(&connector).verdict,
        SmtpVerdict::TransportError {
            kind: TransportErrorKind::Timeout,
            ..
        }
    ));
}

#[test]
fn garbage_reply_is_protocol_error() {
    let connector = ScriptedConnector::new().host(
        "mx.test",
        Script::Serve {
            server: "hello there\r\n".to_string(),
            then: Exhausted::Eof,
        },
    );
    assert!(matches!(
        run(&connector).verdict,
        SmtpVerdict::TransportError {
            kind: TransportErrorKind::ProtocolError,
            ..
        }
    ));
}

#[test]
fn refused_connection_is_connect_failed() {
    let connector =
        ScriptedConnector::new().host("mx.test", Script::Refuse(io::ErrorKind::ConnectionRefused));
    assert!(matches!(
        run(&connector).verdict,
        SmtpVerdict::TransportError {
            kind: TransportErrorKind::ConnectFailed,
            ..
        }
    ));
}

#[test]
fn refused_greeting_is_connect_failure() {
    let connector = ScriptedConnector::new().host(
        "mx.test",
        Script::Serve {
            server: "554 5.3.2 No SMTP service here\r\n".to_string(),
            then: Exhausted::Eof,
        },
    );
    let report = run(&connector);
    assert_eq!(
        report.verdict,
        SmtpVerdict::TransportError {
            kind: TransportErrorKind::ConnectFailed,
            detail: "greeting refused: 554 5.3.2 No SMTP service here".to_string(),
        }
    );
    assert_eq!(connector.log(), ["connect mx.test"]);
}

#[test]
fn refused_greeting_moves_on_to_next_exchanger() {
    let connector = ScriptedConnector::answering_rcpt("mx2.test", "250 2.1.5 Ok").host(
        "mx1.test",
        Script::Serve {
            server: "554 5.3.2 No SMTP service here\r\n".to_string(),
            then: Exhausted::Eof,
        },
    );
    let hosts = vec![MxRecord::new(10, "mx1.test"), MxRecord::new(20, "mx2.test")];
    let options = ProbeOptions {
        max_hosts: 2,
        ..ProbeOptions::default()
    };
    let report = probe(&connector, &address(), &hosts, &options);
    assert_eq!(report.verdict, SmtpVerdict::Accepted);
    assert_eq!(report.host.as_deref(), Some("mx2.test"));
    assert_eq!(connector.log()[..2], ["connect mx1.test", "connect mx2.test"]);
}

#[test]
fn ehlo_refusal_falls_back_to_helo() {
    let connector = ScriptedConnector::new().host(
        "mx.test",
        Script::Serve {
            server: "220 old.test\r\n\
                     502 5.5.2 Command not recognized\r\n\
                     250 old.test\r\n\
                     250 Ok\r\n\
                     250 Ok\r\n\
                     221 Bye\r\n"
                .to_string(),
            then: Exhausted::Eof,
        },
    );
    assert_eq!(run(&connector).verdict, SmtpVerdict::Accepted);
    assert_eq!(
        connector.log()[1..3],
        ["EHLO example.com".to_string(), "HELO example.com".to_string()]
    );
}

#[test]
fn rejected_sender_stops_before_rcpt() {
    let connector = ScriptedConnector::new().host(
        "mx.test",
        Script::Serve {
            server: "220 mx.test\r\n250 mx.test\r\n553 5.1.8 Sender refused\r\n221 Bye\r\n"
                .to_string(),
            then: Exhausted::Eof,
        },
    );
    assert!(matches!(
        run(&connector).verdict,
        SmtpVerdict::Ambiguous { code: 553, .. }
    ));
    assert!(!connector.log().iter().any(|line| line.starts_with("RCPT")));
}

#[test]
fn verbose_trace_records_transcript() {
    let connector = ScriptedConnector::answering_rcpt("mx.test", "250 2.1.5 Ok");
    let options = ProbeOptions {
        verbose_trace: true,
        ..ProbeOptions::default()
    };
    let report = probe(&connector, &address(), &single_mx("mx.test"), &options);
    let lines: Vec<String> = report.transcript.iter().map(ToString::to_string).collect();
    assert_eq!(
        lines,
        [
            "S: 220 mx.test ESMTP",
            "C: EHLO example.com",
            "S: 250 mx.test\nPIPELINING",
            "C: MAIL FROM:<check@example.com>",
            "S: 250 2.1.0 Ok",
            "C: RCPT TO:<user@example.com>",
            "S: 250 2.1.5 Ok",
            "C: QUIT",
            "S: 221 2.0.0 Bye",
        ]
    );
    assert!(matches!(
        report.transcript[6],
        SmtpEvent::Received {
            state: ProbeState::SenderAccepted,
            ..
        }
    ));
}

#[test]
fn only_first_exchanger_is_probed_by_default() {
    let connector = ScriptedConnector::new()
        .host("mx1.test", Script::Refuse(io::ErrorKind::ConnectionRefused))
        .host(
            "mx2.test",
            ScriptedConnector::answering_rcpt("mx2.test", "250 Ok").hosts["mx2.test"].clone(),
        );
    let hosts = vec![MxRecord::new(10, "mx1.test"), MxRecord::new(20, "mx2.test")];
    let report = probe(&connector, &address(), &hosts, &ProbeOptions::default());
    assert!(matches!(
        report.verdict,
        SmtpVerdict::TransportError {
            kind: TransportErrorKind::ConnectFailed,
            ..
        }
    ));
    assert_eq!(connector.log(), ["connect mx1.test"]);
}

#[test]
fn max_hosts_falls_back_after_connect_failure() {
    let connector = ScriptedConnector::new()
        .host("mx1.test", Script::Refuse(io::ErrorKind::TimedOut))
        .host(
            "mx2.test",
            ScriptedConnector::answering_rcpt("mx2.test", "550 No such user").hosts["mx2.test"]
                .clone(),
        );
    let hosts = vec![MxRecord::new(10, "mx1.test"), MxRecord::new(20, "mx2.test")];
    let options = ProbeOptions {
        max_hosts: 3,
        ..ProbeOptions::default()
    };
    let report = probe(&connector, &address(), &hosts, &options);
    assert_eq!(report.verdict, SmtpVerdict::Rejected);
    assert_eq!(report.host.as_deref(), Some("mx2.test"));
}

#[test]
fn max_hosts_does_not_retry_after_conclusive_answer() {
    let connector = ScriptedConnector::answering_rcpt("mx1.test", "451 Try later").host(
        "mx2.test",
        Script::Refuse(io::ErrorKind::ConnectionRefused),
    );
    let hosts = vec![MxRecord::new(10, "mx1.test"), MxRecord::new(20, "mx2.test")];
    let options = ProbeOptions {
        max_hosts: 2,
        ..ProbeOptions::default()
    };
    let report = probe(&connector, &address(), &hosts, &options);
    assert!(matches!(report.verdict, SmtpVerdict::Ambiguous { code: 451, .. }));
    assert!(!connector.log().contains(&"connect mx2.test".to_string()));
}

#[test]
fn cancelled_probe_never_connects() {
    let connector = ScriptedConnector::answering_rcpt("mx.test", "250 Ok");
    let options = ProbeOptions::default();
    options.cancel.cancel();
    let report = probe(&connector, &address(), &single_mx("mx.test"), &options);
    assert!(matches!(
        report.verdict,
        SmtpVerdict::TransportError {
            kind: TransportErrorKind::Cancelled,
            ..
        }
    ));
    assert_eq!(report.host, None);
    assert!(connector.log().is_empty());
}

#[test]
fn classify_recipient_codes() {
    let reply = |code| SmtpReply {
        code,
        message: String::new(),
    };
    assert_eq!(classify_recipient(&reply(250)), SmtpVerdict::Accepted);
    assert!(matches!(
        classify_recipient(&reply(251)),
        SmtpVerdict::Ambiguous { code: 251, .. }
    ));
    assert_eq!(classify_recipient(&reply(550)), SmtpVerdict::Rejected);
    assert_eq!(classify_recipient(&reply(551)), SmtpVerdict::Rejected);
    assert_eq!(classify_recipient(&reply(553)), SmtpVerdict::Rejected);
    assert!(matches!(
        classify_recipient(&reply(503)),
        SmtpVerdict::Ambiguous { code: 503, .. }
    ));
    assert!(matches!(
        classify_recipient(&reply(421)),
        SmtpVerdict::Ambiguous { code: 421, .. }
    ));
}

// Loopback servers exercising the real TCP connector.

fn spawn_mock_server<F>(serve: F) -> (u16, thread::JoinHandle<()>)
where
    F: FnOnce(TcpStream) -> io::Result<()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
    let port = listener.local_addr().expect("addr").port();
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        ready_tx.send(()).ok();
        if let Ok((stream, _)) = listener.accept() {
            let _ = serve(stream);
        }
    });
    ready_rx.recv().expect("server ready");
    (port, handle)
}

fn scripted_session(
    mut stream: TcpStream,
    script: Vec<(&'static str, &'static str)>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    stream.write_all(b"220 mock.smtp.test ESMTP\r\n")?;
    for (expected, response) in script {
        let mut line = String::new();
        reader.read_line(&mut line)?;
        assert!(
            line.starts_with(expected),
            "expected command starting with '{expected}', got '{line}'"
        );
        stream.write_all(response.as_bytes())?;
    }
    Ok(())
}

fn loopback_options(port: u16, timeout: Duration) -> ProbeOptions {
    ProbeOptions {
        port,
        timeout,
        ..ProbeOptions::default()
    }
}

#[test]
fn tcp_probe_accepts_over_loopback() {
    let (port, handle) = spawn_mock_server(|stream| {
        scripted_session(
            stream,
            vec![
                ("EHLO", "250-mock.example\r\n250 8BITMIME\r\n"),
                ("MAIL FROM:", "250 2.1.0 Ok\r\n"),
                ("RCPT TO:<user@example.com>", "250 2.1.5 Ok\r\n"),
                ("QUIT", "221 2.0.0 Bye\r\n"),
            ],
        )
    });
    let report = probe(
        &TcpConnector,
        &address(),
        &single_mx("127.0.0.1"),
        &loopback_options(port, Duration::from_secs(5)),
    );
    assert_eq!(report.verdict, SmtpVerdict::Accepted);
    handle.join().expect("server thread");
}

#[test]
fn tcp_probe_times_out_on_silent_server() {
    let (port, handle) = spawn_mock_server(|stream| {
        // Hold the connection open without ever greeting.
        thread::sleep(Duration::from_secs(2));
        drop(stream);
        Ok(())
    });
    let started = Instant::now();
    let report = probe(
        &TcpConnector,
        &address(),
        &single_mx("127.0.0.1"),
        &loopback_options(port, Duration::from_millis(200)),
    );
    let elapsed = started.elapsed();
    assert!(
        matches!(
            report.verdict,
            SmtpVerdict::TransportError {
                kind: TransportErrorKind::Timeout,
                ..
            }
        ),
        "unexpected verdict {:?}",
        report.verdict
    );
    assert!(elapsed < Duration::from_millis(1500), "took {elapsed:?}");
    handle.join().expect("server thread");
}

#[test]
fn tcp_probe_reports_disconnect() {
    let (port, handle) = spawn_mock_server(|stream| {
        scripted_session(stream, vec![("EHLO", "250 mock.example\r\n")])
    });
    let report = probe(
        &TcpConnector,
        &address(),
        &single_mx("127.0.0.1"),
        &loopback_options(port, Duration::from_secs(5)),
    );
    handle.join().expect("server thread");
    assert!(
        matches!(
            report.verdict,
            SmtpVerdict::TransportError {
                kind: TransportErrorKind::Disconnected,
                ..
            }
        ),
        "unexpected verdict {:?}",
        report.verdict
    );
}

#[test]
fn tcp_probe_connect_refused() {
    // Bind then drop to get a port nobody listens on.
    let port = TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .expect("ephemeral port")
        .port();
    let report = probe(
        &TcpConnector,
        &address(),
        &single_mx("127.0.0.1"),
        &loopback_options(port, Duration::from_secs(2)),
    );
    assert!(matches!(
        report.verdict,
        SmtpVerdict::TransportError {
            kind: TransportErrorKind::ConnectFailed,
            ..
        }
    ));
}

#[test]
fn tcp_probe_stops_when_cancelled_mid_exchange() {
    let cancel = CancelToken::new();
    let server_cancel = cancel.clone();
    let (port, handle) = spawn_mock_server(move |mut stream| {
        let mut reader = BufReader::new(stream.try_clone()?);
        stream.write_all(b"220 mock.smtp.test ESMTP\r\n")?;
        let mut line = String::new();
        reader.read_line(&mut line)?;
        assert!(line.starts_with("EHLO"), "got '{line}'");
        server_cancel.cancel();
        stream.write_all(b"250 mock.example\r\n")?;
        // Never answer MAIL FROM; wait for the client to hang up.
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest)?;
        Ok(())
    });
    let options = ProbeOptions {
        cancel,
        ..loopback_options(port, Duration::from_secs(5))
    };
    let started = Instant::now();
    let report = probe(&TcpConnector, &address(), &single_mx("127.0.0.1"), &options);
    assert!(
        matches!(
            report.verdict,
            SmtpVerdict::TransportError {
                kind: TransportErrorKind::Cancelled,
                ..
            }
        ),
        "unexpected verdict {:?}",
        report.verdict
    );
    assert!(started.elapsed() < Duration::from_secs(2));
    handle.join().expect("server thread");
}
