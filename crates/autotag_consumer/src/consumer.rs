//! Receive loop.
//!
//! Frames are handled one at a time. While a job is awaited the loop keeps
//! writing heart-beats so the broker does not drop a connection that is
//! merely busy. Cancellation is checked between frames only.

use autotag_protocol::{Command, Frame};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::cancel::CancellationToken;
use crate::connection::StompConnection;
use crate::controller::{Controller, Dispatcher};
use crate::error::Result;

/// Upper bound on one receive, and so on shutdown latency when idle.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Consumer<S, D> {
    conn: StompConnection<S>,
    controller: Controller<D>,
    poll_interval: Duration,
}

impl<S, D> Consumer<S, D>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    D: Dispatcher,
{
    pub fn new(conn: StompConnection<S>, controller: Controller<D>) -> Self {
        Self {
            conn,
            controller,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Receive until `cancel` is set, then disconnect.
    ///
    /// A broker error, a closed connection or a heart-beat timeout ends the
    /// loop with that error; no DISCONNECT is attempted in that case.
    pub async fn run(mut self, cancel: &CancellationToken) -> Result<()> {
        info!("Waiting for messages");
        if let Err(e) = self.receive_loop(cancel).await {
            error!(error = %e, "Receive loop stopped");
            return Err(e);
        }

        info!("Shutdown requested, disconnecting");
        self.conn.disconnect().await
    }

    async fn receive_loop(&mut self, cancel: &CancellationToken) -> Result<()> {
        while !cancel.is_cancelled() {
            let Some(frame) = self.conn.recv(self.poll_interval).await? else {
                continue;
            };
            match frame.command {
                Command::Message => self.process(&frame).await?,
                Command::Receipt => {
                    debug!(receipt = frame.get("receipt-id").unwrap_or("-"), "Receipt")
                }
                other => warn!(command = %other, "Unexpected frame from broker, ignoring"),
            }
        }
        Ok(())
    }

    async fn process(&mut self, frame: &Frame) -> Result<()> {
        let handling = self.controller.handle(frame);
        tokio::pin!(handling);

        let handled = match self.conn.keepalive_period() {
            None => handling.await,
            Some(period) => {
                let mut keepalive = tokio::time::interval(period);
                keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        handled = &mut handling => break handled,
                        _ = keepalive.tick() => self.conn.heartbeat_if_due().await?,
                    }
                }
            }
        };

        if let Some(ack) = handled.ack {
            self.conn.send(&ack).await?;
            debug!(ack_id = ack.get("id").unwrap_or("-"), "ACK sent");
        }
        Ok(())
    }
}
