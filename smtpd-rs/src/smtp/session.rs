use crate::config::SmtpConfig;
use crate::error::{CommandError, Result};
use crate::smtp::commands::{parse_mail_from, parse_rcpt_to, SmtpCommand};
use crate::smtp::connection::{ReadLine, SmtpConnection, MAX_LINE_LENGTH};
use crate::smtp::envelope::Envelope;
use crate::smtp::response::Reply;
use crate::storage::MailStore;
use crate::utils::{domain_of, mailbox_name};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Waiting for HELO/EHLO
    Greet,
    /// Greeted, no transaction open
    Ready,
    /// Sender accepted, collecting recipients
    Mail,
    /// Reading the message body
    Data,
    Quit,
}

/// Why [`SmtpSession::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Quit,
    ClosedByClient,
    TimedOut,
}

/// Result of feeding one line to the data reader
#[derive(Debug, PartialEq, Eq)]
pub enum DataLine {
    Continue,
    /// The lone `.` terminator was seen
    End,
}

/// One inbound SMTP connection.
///
/// The state machine is driven either through [`run`](SmtpSession::run) on a
/// byte stream, or line by line through [`handle_command`](SmtpSession::handle_command)
/// and [`receive_data_line`](SmtpSession::receive_data_line).
pub struct SmtpSession {
    config: Arc<SmtpConfig>,
    storage: Arc<dyn MailStore>,
    peer: Option<SocketAddr>,
    state: SmtpState,
    remote_domain: String,
    envelope: Envelope,
}

impl SmtpSession {
    pub fn new(config: Arc<SmtpConfig>, storage: Arc<dyn MailStore>) -> Self {
        Self {
            config,
            storage,
            peer: None,
            state: SmtpState::Greet,
            remote_domain: String::new(),
            envelope: Envelope::new(),
        }
    }

    pub fn with_peer(mut self, peer: Option<SocketAddr>) -> Self {
        self.peer = peer;
        self
    }

    pub fn state(&self) -> SmtpState {
        self.state
    }

    /// Domain given with HELO/EHLO, empty before
    pub fn remote_domain(&self) -> &str {
        &self.remote_domain
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn greeting(&self) -> Reply {
        Reply::greeting(&self.config.domain)
    }

    /// Drive the session over `stream` until QUIT, EOF or the idle deadline.
    ///
    /// Transport failures are returned as errors; no reply is attempted.
    pub async fn run<S>(mut self, stream: S) -> Result<CloseReason>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut conn = SmtpConnection::new(stream, self.config.idle_timeout());
        conn.send(&self.greeting()).await?;

        loop {
            let in_data = self.state == SmtpState::Data;
            let limit = if in_data {
                // Room for the CRLF and a stuffed dot
                self.config.max_message_bytes.saturating_add(3)
            } else {
                MAX_LINE_LENGTH
            };

            let line = match conn.read_line(limit).await? {
                ReadLine::Line(line) => line,
                ReadLine::TooLong if in_data => {
                    warn!("DATA line longer than the message limit");
                    self.envelope.mark_oversized();
                    continue;
                }
                ReadLine::TooLong => {
                    warn!("Command line longer than {} bytes", MAX_LINE_LENGTH);
                    conn.send(&CommandError::LineTooLong.into()).await?;
                    continue;
                }
                ReadLine::Closed => {
                    info!("Client closed connection in state {:?}", self.state);
                    return Ok(CloseReason::ClosedByClient);
                }
                ReadLine::TimedOut => {
                    warn!(
                        "No input for {}s in state {:?}, closing",
                        self.config.max_idle_seconds, self.state
                    );
                    return Ok(CloseReason::TimedOut);
                }
            };

            if in_data {
                if self.receive_data_line(&line) == DataLine::End {
                    let reply = self.finish_data().await;
                    conn.send(&reply).await?;
                }
                continue;
            }

            let reply = match std::str::from_utf8(&line) {
                Ok(text) => {
                    debug!("Received: {}", text);
                    self.handle_command(SmtpCommand::parse(text))
                }
                Err(_) => {
                    warn!("Command line is not valid UTF-8");
                    CommandError::syntax("command line is not valid UTF-8").into()
                }
            };
            conn.send(&reply).await?;

            if self.state == SmtpState::Quit {
                return Ok(CloseReason::Quit);
            }
        }
    }

    /// Apply one command and produce its reply.
    pub fn handle_command(&mut self, cmd: SmtpCommand) -> Reply {
        let verb = cmd.verb().to_string();

        match self.dispatch(cmd) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("{} rejected in state {:?}: {}", verb, self.state, e);
                e.into()
            }
        }
    }

    fn dispatch(&mut self, cmd: SmtpCommand) -> std::result::Result<Reply, CommandError> {
        use SmtpCommand as C;
        use SmtpState as S;

        match (self.state, cmd) {
            (_, C::Quit) => {
                info!("QUIT");
                self.state = S::Quit;
                Ok(Reply::closing(&self.config.domain))
            }
            (S::Data | S::Quit, _) => Err(CommandError::BadSequence("not accepting commands")),
            (_, C::Noop) => Ok(Reply::ok()),
            (_, C::Unknown(_)) => Err(CommandError::Unrecognized),

            (S::Greet, C::Helo(domain) | C::Ehlo(domain)) => self.greet(&domain),
            (S::Ready | S::Mail, C::Helo(_) | C::Ehlo(_)) => {
                Err(CommandError::BadSequence("duplicate HELO/EHLO"))
            }
            (S::Greet, _) => Err(CommandError::BadSequence("send HELO/EHLO first")),

            (S::Ready, C::Mail(args)) => self.mail(&args),
            (S::Mail, C::Mail(_)) => Err(CommandError::BadSequence("nested MAIL command")),

            (S::Mail, C::Rcpt(args)) => self.rcpt(&args),
            (S::Ready, C::Rcpt(_)) => Err(CommandError::BadSequence("need MAIL before RCPT")),

            (S::Mail, C::Data) if self.envelope.can_start_data() => {
                info!("DATA for {} recipients", self.envelope.recipient_count());
                self.state = S::Data;
                Ok(Reply::start_data())
            }
            (S::Mail, C::Data) => Err(CommandError::BadSequence("need RCPT before DATA")),
            (S::Ready, C::Data) => Err(CommandError::BadSequence("need MAIL before DATA")),

            (S::Ready | S::Mail, C::Rset) => {
                debug!("RSET");
                self.envelope.reset();
                self.state = S::Ready;
                Ok(Reply::ok())
            }
        }
    }

    fn greet(&mut self, domain: &str) -> std::result::Result<Reply, CommandError> {
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(CommandError::DomainRequired);
        }

        info!("Greeted by {}", domain);
        self.remote_domain = domain.to_string();
        self.state = SmtpState::Ready;
        Ok(Reply::hello(&self.config.domain, domain))
    }

    fn mail(&mut self, args: &str) -> std::result::Result<Reply, CommandError> {
        let mail = parse_mail_from(args)?;

        let max = self.config.max_message_bytes;
        if mail.size.is_some_and(|size| size > max) {
            return Err(CommandError::MessageTooLarge { max });
        }

        info!("MAIL FROM: {}", mail.address);
        self.envelope.begin(mail.address, mail.size);
        self.state = SmtpState::Mail;
        Ok(Reply::ok())
    }

    fn rcpt(&mut self, args: &str) -> std::result::Result<Reply, CommandError> {
        let recipient = parse_rcpt_to(args)?;
        if mailbox_name(&recipient).is_empty() {
            return Err(CommandError::syntax("recipient local part has no usable mailbox name"));
        }

        info!("RCPT TO: {}", recipient);
        self.envelope
            .add_recipient(recipient, self.config.max_recipients)?;
        Ok(Reply::ok())
    }

    /// Feed one body line (terminator already removed) while in DATA.
    pub fn receive_data_line(&mut self, line: &[u8]) -> DataLine {
        if line == b"." {
            return DataLine::End;
        }

        let line = if line.starts_with(b"..") { &line[1..] } else { line };

        let was_oversized = self.envelope.is_oversized();
        if let Err(e) = self.envelope.append_line(line, self.config.max_message_bytes) {
            if !was_oversized {
                warn!("{}, discarding the rest of the body", e);
            }
        }

        DataLine::Continue
    }

    /// Close the body: store it unless a limit was crossed, then go back to READY.
    pub async fn finish_data(&mut self) -> Reply {
        let envelope = std::mem::take(&mut self.envelope);
        self.state = SmtpState::Ready;

        if envelope.is_oversized() {
            warn!(
                "Rejected {} byte message (max {})",
                envelope.received_bytes(),
                self.config.max_message_bytes
            );
            return CommandError::MessageTooLarge {
                max: self.config.max_message_bytes,
            }
            .into();
        }

        info!("Received {} byte message", envelope.body().len());

        match self.deliver(&envelope).await {
            Ok(()) => Reply::accepted(),
            Err(e) => e.into(),
        }
    }

    async fn deliver(&self, envelope: &Envelope) -> std::result::Result<(), CommandError> {
        let sender = envelope.sender().unwrap_or_default();
        let mut accepted = 0;

        for recipient in envelope.recipients() {
            if !self.should_store(recipient) {
                debug!("Not storing message for {}", recipient);
                accepted += 1;
                continue;
            }

            let mailbox = mailbox_name(recipient);
            let mut message = self.trace_header(recipient).into_bytes();
            message.extend_from_slice(envelope.body());

            match self.storage.deliver(&mailbox, &message).await {
                Ok(id) => {
                    info!("Delivered message from {} to {} as {}", sender, recipient, id);
                    accepted += 1;
                }
                Err(e) => error!("Delivery to {} failed: {}", recipient, e),
            }
        }

        if accepted == 0 {
            return Err(CommandError::DeliveryFailed);
        }
        Ok(())
    }

    fn should_store(&self, recipient: &str) -> bool {
        if !self.config.store_messages {
            return false;
        }

        !self
            .config
            .domain_no_store
            .as_deref()
            .is_some_and(|no_store| no_store.eq_ignore_ascii_case(domain_of(recipient)))
    }

    fn trace_header(&self, recipient: &str) -> String {
        let peer = self
            .peer
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        format!(
            "Received: from {} ({}) by {} with SMTP for <{}>; {}\r\n",
            self.remote_domain,
            peer,
            self.config.domain,
            recipient,
            chrono::Utc::now().to_rfc2822()
        )
    }
}
