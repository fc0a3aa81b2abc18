//! Integration tests for the SMTP session driver.
//!
//! Scripted servers run on in-memory duplex pipes or loopback sockets. The
//! TLS step is replaced by a passthrough upgrade where the test is about the
//! command sequence rather than the handshake.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, missing_docs)]

use std::io;
use std::sync::Mutex;
use std::time::Duration;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
};
use tokio::net::TcpListener;

use otpmail_smtp::connection::{Connector, TlsUpgrade};
use otpmail_smtp::{Client, Config, Envelope, Error, ReplyCode, ReplyPolicy, SessionState};

const CANONICAL: [&str; 11] = [
    "220 mx.test ESMTP ready",
    "250-mx.test\r\n250 STARTTLS",
    "220 Ready to start TLS",
    "250-mx.test\r\n250 AUTH LOGIN",
    "334 VXNlcm5hbWU6",
    "334 UGFzc3dvcmQ6",
    "235 Authentication succeeded",
    "250 Sender OK",
    "250 Recipient OK",
    "354 End data with <CR><LF>.<CR><LF>",
    "250 Queued",
];

/// Hands out one pre-built stream.
struct OneShot<S>(Mutex<Option<S>>);

impl<S> OneShot<S> {
    fn new(stream: S) -> Self {
        Self(Mutex::new(Some(stream)))
    }
}

impl<S> Connector for OneShot<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Stream = S;

    async fn connect(&self, _host: &str, _port: u16) -> io::Result<S> {
        self.0
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "stream already used"))
    }
}

/// Keeps talking over the same stream.
struct Passthrough;

impl<S> TlsUpgrade<S> for Passthrough
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Stream = S;

    async fn upgrade(&self, stream: S, _host: &str) -> otpmail_smtp::Result<S> {
        Ok(stream)
    }
}

/// Always fails the handshake.
struct BrokenTls;

impl<S> TlsUpgrade<S> for BrokenTls
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    type Stream = S;

    async fn upgrade(&self, _stream: S, _host: &str) -> otpmail_smtp::Result<S> {
        Err(Error::tls("received corrupt message of type InvalidContentType"))
    }
}

fn config() -> Config {
    Config::builder("mx.test")
        .credentials("mailer@conf.example", "hunter2")
        .build()
        .unwrap()
}

fn envelope() -> Envelope {
    Envelope::new(
        "attendee@example.org",
        "Your login code",
        "<html><body><p>Your code is <b>4821</b></p></body></html>",
        "4821",
    )
    .unwrap()
}

/// Sends the greeting, then answers each client command with the next reply.
/// Returns every command received, the message content as one entry.
async fn scripted_server(stream: DuplexStream, replies: &[&str]) -> Vec<String> {
    let (read, mut write) = tokio::io::split(stream);
    let mut read = BufReader::new(read);
    let mut received = Vec::new();

    let (greeting, rest) = replies.split_first().unwrap();
    write.write_all(format!("{greeting}\r\n").as_bytes()).await.unwrap();

    let mut in_data = false;
    for reply in rest.iter().map(Some).chain(std::iter::once(None)) {
        let mut command = String::new();
        loop {
            let mut line = String::new();
            if read.read_line(&mut line).await.unwrap() == 0 {
                return received;
            }
            command.push_str(&line);
            if !in_data || line == ".\r\n" {
                break;
            }
        }
        in_data = command == "DATA\r\n";
        received.push(command);

        match reply {
            Some(reply) => write.write_all(format!("{reply}\r\n").as_bytes()).await.unwrap(),
            None => break,
        }
    }
    received
}

#[tokio::test]
async fn canonical_flow_sends_commands_in_order() {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(async move { scripted_server(server_end, &CANONICAL).await });

    let client = Client::with_transports(config(), OneShot::new(client_end), Passthrough);
    let outcome = client.send_envelope(envelope()).await;

    assert!(outcome.is_success(), "{outcome:?}");
    let message_id = outcome.message_id().unwrap();
    assert!(message_id.ends_with("@conf.example>"));

    let received = server.await.unwrap();
    assert_eq!(received.len(), 11);
    assert_eq!(received[0], "EHLO localhost\r\n");
    assert_eq!(received[1], "STARTTLS\r\n");
    assert_eq!(received[2], "EHLO localhost\r\n");
    assert_eq!(received[3], "AUTH LOGIN\r\n");
    assert_eq!(received[4], "bWFpbGVyQGNvbmYuZXhhbXBsZQ==\r\n");
    assert_eq!(received[5], "aHVudGVyMg==\r\n");
    assert_eq!(received[6], "MAIL FROM:<mailer@conf.example>\r\n");
    assert_eq!(received[7], "RCPT TO:<attendee@example.org>\r\n");
    assert_eq!(received[8], "DATA\r\n");
    assert_eq!(received[10], "QUIT\r\n");

    let content = &received[9];
    assert!(content.starts_with("From: mailer@conf.example\r\nTo: attendee@example.org\r\n"));
    assert!(content.contains("Subject: Your login code\r\n"));
    assert!(content.contains(&format!("Message-ID: {message_id}\r\n")));
    assert!(content.contains("Content-Type: text/html; charset=UTF-8\r\n\r\n<html>"));
    assert!(content.ends_with("\r\nYour one-time code is: 4821\r\n.\r\n"));
}

#[tokio::test]
async fn exact_bytes_until_auth_rejection() {
    let mock = tokio_test::io::Builder::new()
        .read(b"220 mx.test ESMTP\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250-mx.test\r\n250-STARTTLS\r\n250 AUTH LOGIN\r\n")
        .write(b"STARTTLS\r\n")
        .read(b"220 go ahead\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250 mx.test\r\n")
        .write(b"AUTH LOGIN\r\n")
        .read(b"334 VXNlcm5hbWU6\r\n")
        .write(b"bWFpbGVyQGNvbmYuZXhhbXBsZQ==\r\n")
        .read(b"334 UGFzc3dvcmQ6\r\n")
        .write(b"aHVudGVyMg==\r\n")
        .read(b"535 5.7.8 Authentication credentials invalid\r\n")
        .build();

    let client = Client::with_transports(config(), OneShot::new(mock), Passthrough);
    let outcome = client.send_envelope(envelope()).await;

    match outcome.error() {
        Some(Error::UnexpectedReply {
            state,
            expected,
            code,
            ..
        }) => {
            assert_eq!(*state, SessionState::AwaitingPasswordAck);
            assert_eq!(*expected, ReplyCode::AUTH_SUCCEEDED);
            assert_eq!(*code, ReplyCode::AUTH_FAILED);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn tls_failure_resolves_failed() {
    let mock = tokio_test::io::Builder::new()
        .read(b"220 mx.test ESMTP\r\n")
        .write(b"EHLO localhost\r\n")
        .read(b"250 STARTTLS\r\n")
        .write(b"STARTTLS\r\n")
        .read(b"220 go ahead\r\n")
        .build();

    let client = Client::with_transports(config(), OneShot::new(mock), BrokenTls);
    let outcome = client.send_envelope(envelope()).await;

    assert!(!outcome.is_success());
    let error = outcome.error().unwrap();
    assert!(error.is_tls());
    assert!(error.to_string().contains("InvalidContentType"));
}

#[tokio::test]
async fn early_close_is_a_connection_error() {
    let mock = tokio_test::io::Builder::new()
        .read(b"220 mx.test ESMTP\r\n")
        .write(b"EHLO localhost\r\n")
        .build();

    let client = Client::with_transports(config(), OneShot::new(mock), Passthrough);
    let outcome = client.send_envelope(envelope()).await;

    let error = outcome.error().unwrap();
    assert!(error.is_connection());
    assert!(matches!(error, Error::Closed(SessionState::AwaitingEhlo)));
}

#[tokio::test]
async fn stall_policy_waits_through_rejection() {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let mut replies = CANONICAL.to_vec();
    replies[7] = "451 Try again later\r\n250 Sender OK";
    let server = tokio::spawn(async move { scripted_server(server_end, &replies).await });

    let config = Config::builder("mx.test")
        .credentials("mailer@conf.example", "hunter2")
        .reply_policy(ReplyPolicy::Stall)
        .build()
        .unwrap();
    let client = Client::with_transports(config, OneShot::new(client_end), Passthrough);

    assert!(client.send_envelope(envelope()).await.is_success());
    assert_eq!(server.await.unwrap().len(), 11);
}

#[tokio::test(start_paused = true)]
async fn silent_server_never_resolves_without_timeout() {
    let (client_end, _server_end) = tokio::io::duplex(1024);
    let client = Client::with_transports(config(), OneShot::new(client_end), Passthrough);

    let waited = tokio::time::timeout(
        Duration::from_secs(3600),
        client.send_envelope(envelope()),
    )
    .await;
    assert!(waited.is_err());
}

#[tokio::test(start_paused = true)]
async fn reply_timeout_fails_silent_session() {
    let (client_end, _server_end) = tokio::io::duplex(1024);
    let config = Config::builder("mx.test")
        .credentials("mailer@conf.example", "hunter2")
        .reply_timeout(Duration::from_secs(30))
        .build()
        .unwrap();
    let client = Client::with_transports(config, OneShot::new(client_end), Passthrough);

    let outcome = client.send_envelope(envelope()).await;
    assert!(matches!(
        outcome.error(),
        Some(Error::Timeout(SessionState::AwaitingGreeting))
    ));
}

#[tokio::test]
async fn cancellation_closes_transport() {
    let (client_end, mut server_end) = tokio::io::duplex(1024);
    server_end.write_all(b"220 mx.test\r\n").await.unwrap();

    let client = Client::with_transports(config(), OneShot::new(client_end), Passthrough);
    let outcome = client
        .send_envelope_until(
            envelope(),
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await;
    assert!(matches!(outcome.error(), Some(Error::Cancelled)));

    let mut seen = Vec::new();
    server_end.read_to_end(&mut seen).await.unwrap();
    assert_eq!(seen, b"EHLO localhost\r\n");
}

#[tokio::test]
async fn invalid_recipient_never_connects() {
    let client = Client::with_transports(
        config(),
        OneShot::<DuplexStream>(Mutex::new(None)),
        Passthrough,
    );
    let outcome = client
        .send("not-an-address", "Code", "<p>1234</p>", "1234")
        .await;
    assert!(matches!(outcome.error(), Some(Error::InvalidAddress(_))));
}

#[tokio::test]
async fn refused_connection_resolves_failed() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = Config::builder("127.0.0.1")
        .port(port)
        .credentials("mailer@conf.example", "hunter2")
        .build()
        .unwrap();
    let client = Client::new(config).unwrap();
    let outcome = client
        .send("attendee@example.org", "Code", "<p>1234</p>", "1234")
        .await;

    assert!(!outcome.is_success());
    assert!(outcome.error().unwrap().is_connection());
}

#[tokio::test]
async fn rustls_handshake_failure_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read, mut write) = socket.into_split();
        let mut read = BufReader::new(read);
        let mut line = String::new();

        write.write_all(b"220 mx.test ESMTP\r\n").await.unwrap();
        read.read_line(&mut line).await.unwrap();
        write.write_all(b"250 STARTTLS\r\n").await.unwrap();
        line.clear();
        read.read_line(&mut line).await.unwrap();
        assert_eq!(line, "STARTTLS\r\n");
        write.write_all(b"220 go ahead\r\n").await.unwrap();

        let mut hello = vec![0u8; 16 * 1024];
        let n = read.read(&mut hello).await.unwrap();
        assert!(n > 0);
        write.write_all(b"421 this is not TLS\r\n").await.unwrap();
    });

    let config = Config::builder("127.0.0.1")
        .port(port)
        .credentials("mailer@conf.example", "hunter2")
        .build()
        .unwrap();
    let client = Client::new(config).unwrap();
    let outcome = client
        .send("attendee@example.org", "Code", "<p>1234</p>", "1234")
        .await;

    assert!(outcome.error().unwrap().is_tls(), "{outcome:?}");
    server.await.unwrap();
}

#[tokio::test]
async fn concurrent_sessions_are_independent() {
    let (first_client, first_server) = tokio::io::duplex(64 * 1024);
    let (second_client, second_server) = tokio::io::duplex(64 * 1024);
    let first_script = tokio::spawn(async move { scripted_server(first_server, &CANONICAL).await });
    let second_script =
        tokio::spawn(async move { scripted_server(second_server, &CANONICAL).await });

    let first = Client::with_transports(config(), OneShot::new(first_client), Passthrough);
    let second = Client::with_transports(config(), OneShot::new(second_client), Passthrough);

    let (a, b) = tokio::join!(
        first.send_envelope(envelope()),
        second.send_envelope(envelope())
    );
    assert!(a.is_success());
    assert!(b.is_success());
    assert_ne!(a.message_id(), b.message_id());

    let a_cmds = first_script.await.unwrap();
    let b_cmds = second_script.await.unwrap();
    assert_eq!(a_cmds[..9], b_cmds[..9]);
    assert_eq!(a_cmds[10], b_cmds[10]);
}

/// Writes `chunks` in turn, one every 20 s, until the client hangs up.
fn trickle(mut server_end: DuplexStream, chunks: Vec<&'static [u8]>) {
    tokio::spawn(async move {
        for chunk in chunks.into_iter().cycle() {
            if server_end.write_all(chunk).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_secs(20)).await;
        }
    });
}

fn timed_config(policy: ReplyPolicy) -> Config {
    Config::builder("mx.test")
        .credentials("mailer@conf.example", "hunter2")
        .reply_policy(policy)
        .reply_timeout(Duration::from_secs(30))
        .build()
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn reply_timeout_spans_partial_lines() {
    let (client_end, server_end) = tokio::io::duplex(1024);
    trickle(server_end, vec![b"2"]);
    let client = Client::with_transports(
        timed_config(ReplyPolicy::FailFast),
        OneShot::new(client_end),
        Passthrough,
    );

    let started = tokio::time::Instant::now();
    let outcome = tokio::time::timeout(Duration::from_secs(3600), client.send_envelope(envelope()))
        .await
        .expect("a trickling server must not keep the session alive");
    assert!(matches!(
        outcome.error(),
        Some(Error::Timeout(SessionState::AwaitingGreeting))
    ));
    assert!(started.elapsed() < Duration::from_secs(40));
}

#[tokio::test(start_paused = true)]
async fn reply_timeout_spans_ignored_replies() {
    let (client_end, mut server_end) = tokio::io::duplex(1024);
    server_end.write_all(b"220 hi\r\n").await.unwrap();
    trickle(server_end, vec![b"450 later\r\n"]);
    let client = Client::with_transports(
        timed_config(ReplyPolicy::Stall),
        OneShot::new(client_end),
        Passthrough,
    );

    let outcome = tokio::time::timeout(Duration::from_secs(3600), client.send_envelope(envelope()))
        .await
        .expect("ignored replies must not extend the reply timeout");
    assert!(matches!(
        outcome.error(),
        Some(Error::Timeout(SessionState::AwaitingEhlo))
    ));
}

#[tokio::test(start_paused = true)]
async fn reply_timeout_restarts_for_each_command() {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(async move {
        let (read, mut write) = tokio::io::split(server_end);
        let mut read = BufReader::new(read);
        // Each reply comes 20 s after the command, inside a 30 s budget
        // but well past it in total.
        write.write_all(b"220 mx.test\r\n").await.unwrap();
        let mut line = String::new();
        read.read_line(&mut line).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        write.write_all(b"250 mx.test\r\n").await.unwrap();
        line.clear();
        read.read_line(&mut line).await.unwrap();
        tokio::time::sleep(Duration::from_secs(20)).await;
        write.write_all(b"554 no TLS today\r\n").await.unwrap();
        line
    });
    let client = Client::with_transports(
        timed_config(ReplyPolicy::FailFast),
        OneShot::new(client_end),
        Passthrough,
    );

    let outcome = client.send_envelope(envelope()).await;
    assert!(matches!(
        outcome.error(),
        Some(Error::UnexpectedReply { state: SessionState::AwaitingStartTlsAck, .. })
    ));
    assert_eq!(server.await.unwrap(), "STARTTLS\r\n");
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct Transcript(std::sync::Arc<Mutex<Vec<u8>>>);

impl io::Write for Transcript {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn transcript_never_contains_credentials() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::util::SubscriberInitExt;

    let transcript = Transcript::default();
    let writer = transcript.clone();
    let _guard = tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish()
        .set_default();

    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let server = tokio::spawn(async move { scripted_server(server_end, &CANONICAL).await });
    let client = Client::with_transports(config(), OneShot::new(client_end), Passthrough);
    assert!(client.send_envelope(envelope()).await.is_success());
    server.await.unwrap();

    let logged = String::from_utf8(transcript.0.lock().unwrap().clone()).unwrap();
    assert!(logged.contains("C: AUTH LOGIN"));
    assert_eq!(logged.matches("C: <redacted>").count(), 2);
    assert!(!logged.contains("bWFpbGVyQGNvbmYuZXhhbXBsZQ=="));
    assert!(!logged.contains("aHVudGVyMg=="));
    assert!(!logged.contains("hunter2"));
}
