//! Broker side of a STOMP conversation, for driving the consumer in tests.
//!
//! Every read is bounded by [`FakeBroker::WAIT`] and panics on expiry, so a
//! consumer that stops talking fails the test instead of hanging it.

use autotag_protocol::{Command, Frame};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

/// Connected (client stream, broker) pair.
pub fn broker_pair() -> (DuplexStream, FakeBroker) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (client, FakeBroker::new(server))
}

pub struct FakeBroker {
    stream: DuplexStream,
    buf: Vec<u8>,
    heartbeats: usize,
}

impl FakeBroker {
    pub const WAIT: Duration = Duration::from_secs(5);

    pub fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            buf: Vec::new(),
            heartbeats: 0,
        }
    }

    /// Heart-beat EOLs received so far.
    pub fn heartbeats(&self) -> usize {
        self.heartbeats
    }

    async fn fill(&mut self) -> usize {
        let mut chunk = [0u8; 4096];
        let n = tokio::time::timeout(Self::WAIT, self.stream.read(&mut chunk))
            .await
            .expect("timed out waiting for the consumer")
            .expect("broker read failed");
        self.buf.extend_from_slice(&chunk[..n]);
        n
    }

    fn count_heartbeats(&mut self) {
        let leading = self
            .buf
            .iter()
            .take_while(|b| **b == b'\n' || **b == b'\r')
            .filter(|b| **b == b'\n')
            .count();
        self.heartbeats += leading;
    }

    /// Next frame from the consumer, skipping heart-beats.
    pub async fn recv(&mut self) -> Frame {
        loop {
            self.count_heartbeats();
            if let Some(frame) = Frame::decode(&mut self.buf).expect("consumer sent a bad frame") {
                return frame;
            }
            if self.fill().await == 0 {
                panic!("consumer closed the connection");
            }
        }
    }

    /// Next frame, which must be `command`.
    pub async fn expect(&mut self, command: Command) -> Frame {
        let frame = self.recv().await;
        assert_eq!(frame.command, command, "unexpected frame: {:?}", frame);
        frame
    }

    /// Wait for the next heart-beat EOL.
    pub async fn expect_heartbeat(&mut self) {
        let seen = self.heartbeats;
        while self.heartbeats == seen {
            if self.buf.is_empty() && self.fill().await == 0 {
                panic!("consumer closed the connection");
            }
            self.count_heartbeats();
            let leading = self
                .buf
                .iter()
                .take_while(|b| **b == b'\n' || **b == b'\r')
                .count();
            self.buf.drain(..leading);
            if self.heartbeats == seen && !self.buf.is_empty() {
                panic!("expected a heart-beat, got frame bytes");
            }
        }
    }

    pub async fn send(&mut self, frame: &Frame) {
        self.stream
            .write_all(&frame.encode())
            .await
            .expect("broker write failed");
    }

    pub async fn send_heartbeat(&mut self) {
        self.stream.write_all(b"\n").await.expect("broker write failed");
    }

    /// Accept the CONNECT and reply CONNECTED with `heart_beat` (`"sx,sy"`).
    pub async fn accept(&mut self, heart_beat: &str) -> Frame {
        let connect = self.expect(Command::Connect).await;
        self.send(
            &Frame::new(Command::Connected)
                .header("version", "1.2")
                .header("heart-beat", heart_beat),
        )
        .await;
        connect
    }

    /// Deliver a MESSAGE on `subscription`.
    pub async fn deliver(&mut self, subscription: &str, ack_id: &str, body: &str) {
        let frame = Frame::new(Command::Message)
            .header("subscription", subscription)
            .header("message-id", format!("msg-{}", ack_id))
            .header("destination", "/queue/test")
            .header("ack", ack_id)
            .with_body(body.as_bytes().to_vec());
        self.send(&frame).await;
    }

    /// Answer a DISCONNECT carrying a receipt request.
    pub async fn expect_disconnect(&mut self) {
        let frame = self.expect(Command::Disconnect).await;
        let receipt = frame
            .get("receipt")
            .expect("DISCONNECT without receipt")
            .to_string();
        self.send(&Frame::new(Command::Receipt).header("receipt-id", receipt))
            .await;
    }

    /// True once the consumer has shut down its write side.
    pub async fn closed(&mut self) -> bool {
        loop {
            self.count_heartbeats();
            let leading = self
                .buf
                .iter()
                .take_while(|b| **b == b'\n' || **b == b'\r')
                .count();
            self.buf.drain(..leading);
            if !self.buf.is_empty() {
                return false;
            }
            if self.fill().await == 0 {
                return true;
            }
        }
    }
}
