use smtpd_rs::config::SmtpConfig;
use smtpd_rs::smtp::{ServerContext, SmtpServer};
use smtpd_rs::storage::MemoryStorage;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;

fn test_config() -> SmtpConfig {
    SmtpConfig {
        domain: "inbucket.local".to_string(),
        domain_no_store: Some("bitbucket.local".to_string()),
        max_recipients: 5,
        max_idle_seconds: 5,
        max_message_bytes: 5000,
        ..SmtpConfig::default()
    }
}

struct TestClient {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
    session: JoinHandle<()>,
}

impl TestClient {
    async fn connect(server: &SmtpServer) -> Self {
        let (client, stream) = tokio::io::duplex(64 * 1024);
        let session = server.start_session(stream, None);
        let (read, writer) = tokio::io::split(client);

        let mut client = Self {
            lines: BufReader::new(read).lines(),
            writer,
            session,
        };

        let greeting = client.reply().await.expect("greeting");
        assert_eq!(greeting, "220 inbucket.local ESMTP Service Ready");
        client
    }

    async fn reply(&mut self) -> Option<String> {
        self.lines.next_line().await.unwrap()
    }

    async fn write_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{}\r\n", line).as_bytes())
            .await
            .unwrap();
    }

    async fn play(&mut self, script: &[(&str, u16)]) {
        for (line, code) in script {
            self.write_line(line).await;
            let reply = self.reply().await.unwrap_or_default();
            assert!(
                reply.starts_with(&format!("{} ", code)),
                "{:?}: expected {}, got {:?}",
                line,
                code,
                reply
            );
        }
    }
}

fn server() -> (SmtpServer, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    let server = SmtpServer::new(test_config(), storage.clone(), ServerContext::new());
    (server, storage)
}

#[tokio::test]
async fn test_greet_state() {
    let (server, _) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELLO", 500),
            ("HELL", 500),
            ("hello", 500),
            ("Outlook", 500),
            ("MAIL FROM:<john@gmail.com>", 503),
            ("RCPT TO:<u1@gmail.com>", 503),
            ("DATA", 503),
            ("RSET", 503),
            ("HELO", 500),
            ("NOOP", 250),
        ])
        .await;

    for helo in ["HELO mydomain", "HELO mydom.com", "HelO mydom.com", "EHLO mydom.com"] {
        let mut client = TestClient::connect(&server).await;
        client.play(&[(helo, 250)]).await;
    }
}

#[tokio::test]
async fn test_ready_state() {
    let (server, _) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("FOOB", 500),
            ("HELO", 503),
            ("DATA", 503),
            ("MAIL", 501),
            ("MAIL FROM john@gmail.com", 501),
            ("MAIL FROM:john@gmail.com", 501),
            ("MAIL FROM:<john@gmail.com> SIZE=147KB", 501),
            ("MAIL FROM: <john@gmail.com> SIZE147", 501),
            ("MAIL FROM:<john@gmail.com> SIZE=1000000", 552),
        ])
        .await;

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RSET", 250),
            ("MAIL FROM: <john@gmail.com>", 250),
            ("RSET", 250),
            ("MAIL FROM: <john@gmail.com> BODY=8BITMIME", 250),
            ("RSET", 250),
            ("MAIL FROM:<john@gmail.com> SIZE=1024", 250),
        ])
        .await;
}

#[tokio::test]
async fn test_mail_state() {
    let (server, _) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("FOOB", 500),
            ("HELO", 503),
            ("DATA", 503),
            ("MAIL", 503),
            ("RCPT", 501),
            ("RCPT TO", 501),
            ("RCPT TO james@gmail.com", 501),
        ])
        .await;

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("RCPT TO: <u2@gmail.com>", 250),
            ("RCPT TO:u3@gmail.com", 250),
            ("RCPT TO: u4@gmail.com", 250),
        ])
        .await;

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("RCPT TO:<u2@gmail.com>", 250),
            ("RCPT TO:<u3@gmail.com>", 250),
            ("RCPT TO:<u4@gmail.com>", 250),
            ("RCPT TO:<u5@gmail.com>", 250),
            ("RCPT TO:<u6@gmail.com>", 552),
        ])
        .await;

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("RSET", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
        ])
        .await;
}

#[tokio::test]
async fn test_empty_data_and_quit() {
    let (server, storage) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("DATA", 354),
            (".", 250),
            ("QUIT", 221),
        ])
        .await;

    assert!(client.reply().await.is_none());
    client.session.await.unwrap();
    assert_eq!(storage.messages("u1").len(), 1);
}

#[tokio::test]
async fn test_quit_mid_transaction() {
    let (server, storage) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("QUIT", 221),
        ])
        .await;

    client.session.await.unwrap();
    assert_eq!(storage.message_count(), 0);
}

#[tokio::test]
async fn test_full_transaction() {
    let (server, storage) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO a", 250),
            ("MAIL FROM:<x@y>", 250),
            ("RCPT TO:<z@y>", 250),
            ("RCPT TO:<skip@bitbucket.local>", 250),
            ("DATA", 354),
        ])
        .await;

    for line in ["Subject: scripted", "", "..stuffed", "body"] {
        client.write_line(line).await;
    }
    client.play(&[(".", 250), ("QUIT", 221)]).await;
    client.session.await.unwrap();

    let stored = storage.messages("z");
    assert_eq!(stored.len(), 1);
    let text = String::from_utf8(stored[0].clone()).unwrap();
    assert!(text.starts_with("Received: from a (unknown) by inbucket.local with SMTP for <z@y>; "));
    assert!(text.ends_with("\r\nSubject: scripted\r\n\r\n.stuffed\r\nbody\r\n"));
    assert!(storage.messages("skip").is_empty());
}

#[tokio::test]
async fn test_oversized_message_keeps_session() {
    let (server, storage) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("DATA", 354),
        ])
        .await;

    let line = "x".repeat(900);
    for _ in 0..10 {
        client.write_line(&line).await;
    }
    client
        .play(&[
            (".", 552),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("DATA", 354),
            (".", 250),
        ])
        .await;

    assert_eq!(storage.messages("u1").len(), 1);
}

#[tokio::test]
async fn test_oversized_single_body_line() {
    let (server, storage) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("DATA", 354),
        ])
        .await;

    // A single line longer than max_message_bytes
    client.write_line(&"y".repeat(12_000)).await;
    client.write_line("after").await;
    client
        .play(&[
            (".", 552),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("DATA", 354),
            (".", 250),
        ])
        .await;

    let stored = storage.messages("u1");
    assert_eq!(stored.len(), 1);
    assert!(!String::from_utf8_lossy(&stored[0]).contains("after"));
}

#[tokio::test]
async fn test_invalid_utf8_command_is_rejected() {
    let (server, storage) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[("HELO localhost", 250), ("MAIL FROM:<x@y>", 250)])
        .await;

    client.writer.write_all(b"RCPT TO:<\xff\xfe@y>\r\n").await.unwrap();
    assert!(client.reply().await.unwrap().starts_with("501 "));

    client.play(&[("DATA", 503), ("RCPT TO:<u1@y>", 250), ("DATA", 354), (".", 250)]).await;

    assert_eq!(storage.mailboxes(), vec!["u1"]);
}

#[tokio::test]
async fn test_line_too_long() {
    let (server, _) = server();

    let mut client = TestClient::connect(&server).await;
    let long = format!("HELO {}", "a".repeat(1200));
    client.write_line(&long).await;
    assert_eq!(client.reply().await.unwrap(), "500 Line too long");

    client.play(&[("HELO localhost", 250)]).await;
}

#[tokio::test]
async fn test_bare_lf_is_accepted() {
    let (server, _) = server();

    let mut client = TestClient::connect(&server).await;
    client.writer.write_all(b"HELO localhost\n").await.unwrap();
    assert!(client.reply().await.unwrap().starts_with("250 "));
}

#[tokio::test]
async fn test_client_disconnect_ends_session() {
    let (server, storage) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("DATA", 354),
        ])
        .await;
    client.write_line("partial body").await;

    let TestClient { writer, lines, session } = client;
    drop(writer);
    drop(lines);

    session.await.unwrap();
    assert_eq!(storage.message_count(), 0);
    assert_eq!(server.context().live_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_closes_without_reply() {
    let (server, _) = server();

    let mut client = TestClient::connect(&server).await;
    client.play(&[("HELO localhost", 250)]).await;

    let start = tokio::time::Instant::now();
    assert!(client.reply().await.is_none());
    assert!(start.elapsed() >= Duration::from_secs(5));

    client.session.await.unwrap();
    assert_eq!(server.context().live_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_during_data() {
    let (server, storage) = server();

    let mut client = TestClient::connect(&server).await;
    client
        .play(&[
            ("HELO localhost", 250),
            ("MAIL FROM:<john@gmail.com>", 250),
            ("RCPT TO:<u1@gmail.com>", 250),
            ("DATA", 354),
        ])
        .await;
    client.write_line("Subject: stalled").await;
    client.writer.write_all(b"half a line").await.unwrap();

    let start = tokio::time::Instant::now();
    assert!(client.reply().await.is_none());
    assert!(start.elapsed() >= Duration::from_secs(5));

    client.session.await.unwrap();
    assert_eq!(storage.message_count(), 0);
    assert_eq!(server.context().live_sessions(), 0);
}
