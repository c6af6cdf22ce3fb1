//! STOMP 1.2 session with the broker.
//!
//! One connection carries one subscription. Heart-beats are negotiated at
//! CONNECT time; outgoing ones are written from `recv` and from
//! [`StompConnection::heartbeat_if_due`], which the run loop calls while a
//! job is being awaited.

use autotag_protocol::{defaults, Command, Frame};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::error::{ConsumerError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DISCONNECT_RECEIPT: &str = "autotag-disconnect";

/// Broker address, credentials and subscription settings.
#[derive(Clone)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub destination: String,
    pub subscription_id: String,
    /// Unacknowledged messages the broker may push ahead (`activemq.prefetchSize`).
    pub prefetch: u32,
    /// How often we promise to send something. Zero disables.
    pub heartbeat_out: Duration,
    /// How often we want to hear from the broker. Zero disables.
    pub heartbeat_in: Duration,
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("login", &self.login)
            .field("passcode", &self.passcode.as_ref().map(|_| "[REDACTED]"))
            .field("destination", &self.destination)
            .field("subscription_id", &self.subscription_id)
            .field("prefetch", &self.prefetch)
            .field("heartbeat_out", &self.heartbeat_out)
            .field("heartbeat_in", &self.heartbeat_in)
            .finish()
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_BROKER_HOST.to_string(),
            port: defaults::DEFAULT_BROKER_PORT,
            login: None,
            passcode: None,
            destination: defaults::DEFAULT_QUEUE.to_string(),
            subscription_id: defaults::DEFAULT_SUBSCRIPTION_ID.to_string(),
            prefetch: defaults::DEFAULT_PREFETCH,
            heartbeat_out: Duration::from_millis(defaults::DEFAULT_HEARTBEAT_OUT_MS),
            heartbeat_in: Duration::from_millis(defaults::DEFAULT_HEARTBEAT_IN_MS),
        }
    }
}

/// Agreed interval for one direction: zero on either side disables it,
/// otherwise the slower of the two wins.
fn negotiate(ours: Duration, theirs_ms: u64) -> Option<Duration> {
    if ours.is_zero() || theirs_ms == 0 {
        None
    } else {
        Some(ours.max(Duration::from_millis(theirs_ms)))
    }
}

/// Parse a `heart-beat` header value. Missing or garbled means `0,0`.
fn parse_heart_beat(value: Option<&str>) -> (u64, u64) {
    value
        .and_then(|v| v.split_once(','))
        .and_then(|(a, b)| Some((a.trim().parse().ok()?, b.trim().parse().ok()?)))
        .unwrap_or((0, 0))
}

fn describe_error(frame: &Frame) -> String {
    let message = frame.get("message").unwrap_or("no message header");
    let body = String::from_utf8_lossy(&frame.body);
    let body = body.trim();
    if body.is_empty() {
        message.to_string()
    } else {
        format!("{}: {}", message, body)
    }
}

pub struct StompConnection<S> {
    stream: S,
    buf: Vec<u8>,
    heartbeat_out: Option<Duration>,
    heartbeat_in: Option<Duration>,
    last_write: Instant,
    last_read: Instant,
}

impl StompConnection<TcpStream> {
    /// Open a TCP connection and complete the STOMP handshake.
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        stream.set_nodelay(true)?;
        Self::handshake(stream, config).await
    }
}

impl<S> StompConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Send CONNECT over an established stream and wait for CONNECTED.
    pub async fn handshake(stream: S, config: &BrokerConfig) -> Result<Self> {
        let now = Instant::now();
        let mut conn = Self {
            stream,
            buf: Vec::new(),
            heartbeat_out: None,
            heartbeat_in: None,
            last_write: now,
            last_read: now,
        };

        let mut connect = Frame::new(Command::Connect)
            .header("accept-version", "1.2")
            .header("host", config.host.as_str())
            .header(
                "heart-beat",
                format!(
                    "{},{}",
                    config.heartbeat_out.as_millis(),
                    config.heartbeat_in.as_millis()
                ),
            );
        if let Some(login) = &config.login {
            connect = connect.header("login", login.as_str());
        }
        if let Some(passcode) = &config.passcode {
            connect = connect.header("passcode", passcode.as_str());
        }
        conn.send(&connect).await?;

        let reply = match conn.recv(CONNECT_TIMEOUT).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                return Err(ConsumerError::Handshake(format!(
                    "no CONNECTED frame within {:?}",
                    CONNECT_TIMEOUT
                )))
            }
            Err(ConsumerError::Broker(message)) => return Err(ConsumerError::Handshake(message)),
            Err(e) => return Err(e),
        };
        if reply.command != Command::Connected {
            return Err(ConsumerError::Handshake(format!(
                "expected CONNECTED, got {}",
                reply.command
            )));
        }

        let (server_out, server_in) = parse_heart_beat(reply.get("heart-beat"));
        conn.heartbeat_out = negotiate(config.heartbeat_out, server_in);
        conn.heartbeat_in = negotiate(config.heartbeat_in, server_out);

        info!(
            host = %config.host,
            port = config.port,
            server = reply.get("server").unwrap_or("unknown"),
            heartbeat_out = ?conn.heartbeat_out,
            heartbeat_in = ?conn.heartbeat_in,
            "Connected to broker"
        );
        Ok(conn)
    }

    /// Negotiated (outgoing, incoming) heart-beat intervals.
    pub fn heartbeats(&self) -> (Option<Duration>, Option<Duration>) {
        (self.heartbeat_out, self.heartbeat_in)
    }

    /// Subscribe with per-message client acknowledgement.
    pub async fn subscribe(&mut self, config: &BrokerConfig) -> Result<()> {
        let frame = Frame::new(Command::Subscribe)
            .header("id", config.subscription_id.as_str())
            .header("destination", config.destination.as_str())
            .header("ack", "client-individual")
            .header("activemq.prefetchSize", config.prefetch.to_string());
        self.send(&frame).await?;
        info!(
            destination = %config.destination,
            subscription = %config.subscription_id,
            prefetch = config.prefetch,
            "Subscribed"
        );
        Ok(())
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<()> {
        self.stream.write_all(&frame.encode()).await?;
        self.stream.flush().await?;
        self.last_write = Instant::now();
        trace!(command = %frame.command, "Frame sent");
        Ok(())
    }

    /// How often [`heartbeat_if_due`](Self::heartbeat_if_due) should be
    /// called while nothing else is read or written. `None` when outgoing
    /// heart-beats are off.
    pub fn keepalive_period(&self) -> Option<Duration> {
        self.heartbeat_out
            .map(|interval| (interval / 2).max(Duration::from_millis(10)))
    }

    /// Write a heart-beat EOL when half the outgoing interval has passed
    /// without any other write.
    pub async fn heartbeat_if_due(&mut self) -> Result<()> {
        let Some(interval) = self.heartbeat_out else {
            return Ok(());
        };
        if self.last_write.elapsed() >= interval / 2 {
            self.stream.write_all(b"\n").await?;
            self.stream.flush().await?;
            self.last_write = Instant::now();
            trace!("Heart-beat sent");
        }
        Ok(())
    }

    /// Read once, waiting at most `wait`. Returns whether bytes arrived.
    async fn fill(&mut self, wait: Duration) -> Result<bool> {
        let mut chunk = [0u8; 8192];
        match tokio::time::timeout(wait, self.stream.read(&mut chunk)).await {
            Err(_) => Ok(false),
            Ok(Ok(0)) => Err(ConsumerError::ConnectionClosed),
            Ok(Ok(n)) => {
                self.buf.extend_from_slice(&chunk[..n]);
                self.last_read = Instant::now();
                Ok(true)
            }
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Fail when the broker has been silent for twice its heart-beat interval.
    fn check_liveness(&self) -> Result<()> {
        if let Some(interval) = self.heartbeat_in {
            let grace = interval * 2;
            if self.last_read.elapsed() > grace {
                return Err(ConsumerError::HeartbeatTimeout(grace));
            }
        }
        Ok(())
    }

    /// Next frame, waiting at most `wait`; `None` when nothing arrived.
    ///
    /// Heart-beats are consumed silently. An ERROR frame is returned as
    /// [`ConsumerError::Broker`].
    pub async fn recv(&mut self, wait: Duration) -> Result<Option<Frame>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(frame) = Frame::decode(&mut self.buf)? {
                if frame.command == Command::Error {
                    return Err(ConsumerError::Broker(describe_error(&frame)));
                }
                trace!(command = %frame.command, "Frame received");
                return Ok(Some(frame));
            }

            self.heartbeat_if_due().await?;

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let mut slice = deadline - now;
            if let Some(interval) = self.heartbeat_out {
                let until_due = (interval / 2).saturating_sub(self.last_write.elapsed());
                slice = slice.min(until_due.max(Duration::from_millis(10)));
            }

            if !self.fill(slice).await? {
                self.check_liveness()?;
            }
        }
    }

    /// Send DISCONNECT, wait briefly for its receipt, then close the stream.
    ///
    /// Frames still arriving are dropped; unacknowledged messages are
    /// redelivered by the broker.
    pub async fn disconnect(mut self) -> Result<()> {
        self.send(&Frame::new(Command::Disconnect).header("receipt", DISCONNECT_RECEIPT))
            .await?;

        let deadline = Instant::now() + DISCONNECT_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!("No DISCONNECT receipt from broker, closing anyway");
                break;
            }
            match self.recv(remaining).await {
                Ok(Some(frame))
                    if frame.command == Command::Receipt
                        && frame.get("receipt-id") == Some(DISCONNECT_RECEIPT) =>
                {
                    debug!("DISCONNECT acknowledged by broker");
                    break;
                }
                Ok(Some(frame)) => {
                    debug!(command = %frame.command, "Dropping frame received during disconnect");
                }
                Ok(None) => {}
                Err(ConsumerError::ConnectionClosed) => break,
                Err(e) => return Err(e),
            }
        }

        self.stream.shutdown().await?;
        info!("Disconnected from broker");
        Ok(())
    }
}
