//! Connection manager.
//!
//! A single driver task owns the socket and the connection state. Callers
//! talk to it through a [`ConnectionHandle`]: commands go over an mpsc
//! channel and state is published on a watch channel. The driver handles,
//! in one `select!` loop:
//!
//! - caller commands (connect, send, disconnect)
//! - results of open attempts
//! - inbound frames, in arrival order
//! - the reconnect timer
//! - the heartbeat timer
//!
//! Every socket event goes through [`ConnectionState::on`]. When the socket
//! closes, all pending requests are failed and a reconnect is scheduled
//! according to the [`ReconnectPolicy`]. Once attempts are exhausted the
//! connection stays disconnected until [`ConnectionHandle::connect`] is
//! called again.
//!
//! Dropping the last handle stops the driver and closes the socket.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use inferlink_protocol::{Envelope, decode, encode};

use crate::config::{ConnectionSettings, ReconnectPolicy};
use crate::correlator::Correlator;
use crate::error::{ClientError, ClientResult};
use crate::state::{ConnectionEvent, ConnectionState};
use crate::transport::{Connector, Link};

/// Commands sent to the driver.
#[derive(Debug)]
enum Command {
    Connect {
        reply: oneshot::Sender<ClientResult<()>>,
    },
    Send {
        text: String,
        reply: oneshot::Sender<ClientResult<()>>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running connection driver.
#[derive(Debug)]
pub struct ConnectionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ConnectionState>,
}

impl ConnectionHandle {
    /// Spawns a driver and returns its handle. Starts disconnected.
    pub fn spawn(
        connector: Arc<dyn Connector>,
        settings: &ConnectionSettings,
        correlator: Arc<Correlator>,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(32);
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (open_tx, open_rx) = mpsc::unbounded_channel();

        let driver = Driver {
            connector,
            correlator,
            policy: settings.reconnect,
            heartbeat_interval: settings.heartbeat_interval,
            state_tx,
            open_tx,
            link: None,
            heartbeat: None,
            retry_at: None,
            attempts: 0,
            epoch: 0,
            opening: false,
            connect_waiters: Vec::new(),
        };
        tokio::spawn(driver.run(command_rx, open_rx));

        Self { commands, state }
    }

    /// Opens the connection, resolving once it is up.
    ///
    /// Fails with `Connect` if this attempt fails; a reconnect is still
    /// scheduled in that case. Resets the reconnect attempt counter.
    pub async fn connect(&self) -> ClientResult<()> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect { reply }).await?;
        rx.await.map_err(|_| driver_stopped())?
    }

    /// Sends one envelope. Fails with `SendFailure` unless connected.
    pub async fn send(&self, envelope: &Envelope) -> ClientResult<()> {
        let text = encode(envelope)?;
        let (reply, rx) = oneshot::channel();
        self.command(Command::Send { text, reply }).await?;
        rx.await.map_err(|_| driver_stopped())?
    }

    /// Closes the socket, cancels reconnects and fails pending requests.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.command(Command::Disconnect { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Returns a receiver for state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Waits until the connection reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> ClientResult<()> {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| driver_stopped())
    }

    async fn command(&self, command: Command) -> ClientResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| driver_stopped())
    }
}

fn driver_stopped() -> ClientError {
    ClientError::Connect("connection driver stopped".into())
}

/// Rewraps an open failure so every waiting caller gets its own copy.
fn connect_error(err: &ClientError) -> ClientError {
    match err {
        ClientError::Connect(msg) => ClientError::Connect(msg.clone()),
        other => ClientError::Connect(other.to_string()),
    }
}

type OpenResult = (u64, ClientResult<Link>);

struct Driver {
    connector: Arc<dyn Connector>,
    correlator: Arc<Correlator>,
    policy: ReconnectPolicy,
    heartbeat_interval: Option<Duration>,
    state_tx: watch::Sender<ConnectionState>,
    open_tx: mpsc::UnboundedSender<OpenResult>,

    link: Option<Link>,
    heartbeat: Option<Interval>,
    retry_at: Option<Instant>,
    /// Reconnect attempts since the last successful open.
    attempts: u32,
    /// Bumped on disconnect so stale open results are discarded.
    epoch: u64,
    opening: bool,
    connect_waiters: Vec<oneshot::Sender<ClientResult<()>>>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut opens: mpsc::UnboundedReceiver<OpenResult>,
    ) {
        debug!("Connection driver started");

        loop {
            let retry_at = self.retry_at;
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some((epoch, result)) = opens.recv() => self.on_open_result(epoch, result),
                frame = next_frame(&mut self.link) => match frame {
                    Some(text) => self.on_frame(&text),
                    None => self.on_closed(),
                },
                _ = sleep_until(retry_at) => {
                    self.retry_at = None;
                    self.start_open();
                }
                _ = tick(&mut self.heartbeat) => self.send_heartbeat(),
            }
        }

        self.teardown("client dropped");
        debug!("Connection driver stopped");
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn apply(&mut self, event: ConnectionEvent) {
        let current = self.state();
        match current.on(event) {
            Some(next) => {
                if next != current {
                    debug!(from = %current, to = %next, ?event, "Connection state change");
                }
                self.state_tx.send_replace(next);
            }
            None => debug!(state = %current, ?event, "Event does not apply"),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => match self.state() {
                ConnectionState::Connected => {
                    let _ = reply.send(Ok(()));
                }
                ConnectionState::Connecting => self.connect_waiters.push(reply),
                ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                    self.attempts = 0;
                    self.retry_at = None;
                    self.connect_waiters.push(reply);
                    self.start_open();
                }
            },
            Command::Send { text, reply } => {
                let _ = reply.send(self.send_text(text));
            }
            Command::Disconnect { reply } => {
                self.teardown("disconnect requested");
                let _ = reply.send(());
            }
        }
    }

    fn start_open(&mut self) {
        self.epoch += 1;
        self.opening = true;
        self.apply(ConnectionEvent::Connect);

        let epoch = self.epoch;
        let connector = Arc::clone(&self.connector);
        let open_tx = self.open_tx.clone();
        tokio::spawn(async move {
            let result = connector.open().await;
            let _ = open_tx.send((epoch, result));
        });
        debug!(epoch, attempt = self.attempts, "Opening connection");
    }

    fn on_open_result(&mut self, epoch: u64, result: ClientResult<Link>) {
        if epoch != self.epoch || !self.opening {
            debug!(epoch, current = self.epoch, "Discarding stale open result");
            return;
        }
        self.opening = false;

        match result {
            Ok(link) => {
                info!("Connected");
                self.link = Some(link);
                self.attempts = 0;
                self.apply(ConnectionEvent::Opened);
                self.heartbeat = self.heartbeat_interval.map(|period| {
                    let mut interval = tokio::time::interval(period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    interval
                });
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(err) => {
                warn!(error = %err, "Connection attempt failed");
                let retry = self.schedule_retry();
                self.apply(ConnectionEvent::Failed { retry });
                for waiter in self.connect_waiters.drain(..) {
                    let _ = waiter.send(Err(connect_error(&err)));
                }
            }
        }
    }

    fn on_closed(&mut self) {
        warn!("Connection closed");
        self.link = None;
        self.heartbeat = None;
        self.correlator.fail_all();
        let retry = self.schedule_retry();
        self.apply(ConnectionEvent::Closed { retry });
    }

    /// Arms the reconnect timer. Returns false once attempts are exhausted.
    fn schedule_retry(&mut self) -> bool {
        self.attempts += 1;
        match self.policy.delay_for(self.attempts) {
            Some(delay) => {
                info!(
                    attempt = self.attempts,
                    max = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.retry_at = Some(Instant::now() + delay);
                true
            }
            None => {
                warn!(
                    max = self.policy.max_attempts,
                    "Reconnect attempts exhausted, staying disconnected"
                );
                self.retry_at = None;
                false
            }
        }
    }

    fn teardown(&mut self, reason: &str) {
        self.epoch += 1;
        self.opening = false;
        self.retry_at = None;
        self.heartbeat = None;
        if self.link.take().is_some() {
            info!(reason, "Disconnected");
        }
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(ClientError::Connect(reason.to_string())));
        }
        self.correlator.fail_all();
        self.apply(ConnectionEvent::Disconnect);
    }

    fn send_text(&self, text: String) -> ClientResult<()> {
        let state = self.state();
        match &self.link {
            Some(link) if state.is_connected() => link
                .outbound
                .send(text)
                .map_err(|_| ClientError::SendFailure("socket closed".into())),
            _ => Err(ClientError::SendFailure(format!("not connected ({})", state))),
        }
    }

    fn on_frame(&self, text: &str) {
        let envelope = match decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                return;
            }
        };

        match envelope {
            Envelope::InferenceResponse(response) => {
                self.correlator.resolve(response);
            }
            Envelope::Error(error) => {
                self.correlator.reject(&error);
            }
            Envelope::Heartbeat(heartbeat) => {
                debug!(server_time = %heartbeat.timestamp, "Heartbeat from server");
            }
            Envelope::InferenceRequest(request) => {
                debug!(model = %request.model_type, "Ignoring inference_request from server");
            }
        }
    }

    fn send_heartbeat(&self) {
        match encode(&Envelope::heartbeat()) {
            Ok(text) => {
                if let Err(e) = self.send_text(text) {
                    debug!(error = %e, "Heartbeat not sent");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode heartbeat"),
        }
    }
}

async fn next_frame(link: &mut Option<Link>) -> Option<String> {
    match link {
        Some(link) => link.inbound.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
