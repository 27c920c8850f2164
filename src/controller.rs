//! Control session.
//!
//! A [`Controller`] owns one transport at a time. A spawned task runs the
//! line framer and parser over the read half and hands completed messages
//! over a channel of capacity 1; the controller writes requests on the
//! write half and waits on that channel for the matching reply.
//!
//! The protocol answers requests strictly in order on a single stream, so
//! only one request may be in flight. Every operation takes `&mut self`,
//! which makes overlapping requests impossible to express.

use crate::auth::{select_authenticator, AuthMethod};
use crate::config::ControllerConfig;
use crate::dialer::{BoxedTransport, Dialer, TcpDialer};
use crate::error::{ControlError, Result, StatusClass};
use crate::events::Event;
use crate::framer::LineFramer;
use crate::message::{ControlRequest, ControlResponse};
use crate::parser::Parser;
use crate::protocol::ResponseBuffer;

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufReader, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

/// Upper bound on queued events; the oldest is dropped beyond it.
pub const MAX_QUEUED_EVENTS: usize = 1024;

struct Connection {
    writer: WriteHalf<BoxedTransport>,
    replies: mpsc::Receiver<ResponseBuffer>,
    reader: JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// A client session on a control port.
pub struct Controller {
    config: ControllerConfig,
    dialer: Arc<dyn Dialer>,
    connection: Option<Connection>,
    authenticator: Option<AuthMethod>,
    authenticated: bool,
    late_replies: usize,
    events: VecDeque<Event>,
}

impl Controller {
    /// Create a controller that dials with [`TcpDialer`].
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_dialer(config, TcpDialer)
    }

    /// Create a controller that dials with `dialer`.
    pub fn with_dialer(config: ControllerConfig, dialer: impl Dialer + 'static) -> Self {
        Self {
            config,
            dialer: Arc::new(dialer),
            connection: None,
            authenticator: None,
            authenticated: false,
            late_replies: 0,
            events: VecDeque::new(),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Whether a transport is open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether the last authentication exchange succeeded.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// The method chosen during the last connect.
    pub fn authenticator(&self) -> Option<AuthMethod> {
        self.authenticator
    }

    /// Number of timed-out requests whose replies have not shown up yet.
    pub fn pending_late_replies(&self) -> usize {
        self.late_replies
    }

    pub(crate) fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
    }

    /// Connect and authenticate using the configured dialer.
    ///
    /// Does nothing if already connected.
    pub async fn connect(&mut self) -> Result<()> {
        let dialer = Arc::clone(&self.dialer);
        self.connect_with(dialer.as_ref()).await
    }

    /// Connect and authenticate using `dialer`.
    ///
    /// Does nothing if already connected. On any failure the transport is
    /// closed again and the controller is left disconnected.
    pub async fn connect_with<D: Dialer + ?Sized>(&mut self, dialer: &D) -> Result<()> {
        if self.is_connected() {
            debug!("Already connected to {}", self.config.address);
            return Ok(());
        }

        let network = self.config.address.network();
        let target = self.config.address.target();
        info!("Connecting to {}", self.config.address);

        let transport = match timeout(self.config.connect_timeout, dialer.dial(network, &target)).await {
            Ok(Ok(transport)) => transport,
            Ok(Err(e)) => {
                return Err(ControlError::ConnectionFailed(format!(
                    "{}: {}",
                    self.config.address, e
                )))
            }
            Err(_) => {
                return Err(ControlError::ConnectionFailed(format!(
                    "{}: timed out after {:?}",
                    self.config.address, self.config.connect_timeout
                )))
            }
        };

        self.attach(transport);

        if let Err(e) = self.handshake().await {
            warn!("Connection setup failed: {}", e);
            self.close().await;
            return Err(e);
        }

        info!(
            "Connected to {} using {}",
            self.config.address,
            self.authenticator.map(|m| m.method_name()).unwrap_or("-")
        );
        Ok(())
    }

    fn attach(&mut self, transport: BoxedTransport) {
        let (read_half, writer) = tokio::io::split(transport);
        let (tx, replies) = mpsc::channel(1);

        let framer = LineFramer::new(BufReader::new(read_half));
        let reader = tokio::spawn(Parser::new(self.config.log_comms).run(framer, tx));

        self.connection = Some(Connection {
            writer,
            replies,
            reader,
        });
    }

    async fn handshake(&mut self) -> Result<()> {
        let info = self.protocol_info().await?;
        let advertised = info.auth_methods();
        debug!("Server offers authentication methods: {:?}", advertised);

        let method = select_authenticator(&self.config.auth_preferences, &advertised)?;
        self.authenticator = Some(method);
        method.authenticate(self, &info).await
    }

    /// Close the transport. Does nothing if not connected.
    pub async fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.writer.shutdown().await {
                debug!("Error shutting down transport: {}", e);
            }
            info!("Closed connection to {}", self.config.address);
        }

        self.authenticated = false;
        self.authenticator = None;
        self.late_replies = 0;
    }

    /// Send `request` and wait for its reply.
    ///
    /// A timeout leaves the connection open. The reply it was waiting for is
    /// still owed and is discarded when it arrives, so later requests stay
    /// correctly paired.
    ///
    /// A request that discards an owed reply while waiting and then times
    /// out does not add to the debt. Either the discarded buffer settled it,
    /// or the owed reply was lost on the wire and the buffer was this
    /// request's own. Counting again would keep a lost reply owed forever.
    pub async fn request(&mut self, request: &ControlRequest) -> Result<ResponseBuffer> {
        self.drain_handoff();

        let bytes = request.serialize().normalize();
        if self.config.log_comms {
            for line in request.serialize().lines() {
                debug!(target: "torc::comms", "<< {}", line.trim_end_matches(['\r', '\n']));
            }
        }

        let written = match self.connection.as_mut() {
            Some(connection) => write_frame(&mut connection.writer, &bytes).await,
            None => return Err(ControlError::NotConnected),
        };
        if let Err(e) = written {
            warn!("Failed to send {}: {}", request.keyword(), e);
            self.close().await;
            return Err(ControlError::Io(e));
        }
        trace!("Sent {} ({} bytes)", request.keyword(), bytes.len());

        let wait = request.response_timeout();
        let deadline = Instant::now() + wait;

        let mut settled_debt = false;
        loop {
            let received = match self.connection.as_mut() {
                Some(connection) => timeout_at(deadline, connection.replies.recv()).await,
                None => return Err(ControlError::NotConnected),
            };

            match received {
                Ok(Some(buffer)) => {
                    let owed = self.late_replies;
                    if let Some(reply) = self.route(buffer) {
                        return Ok(reply);
                    }
                    settled_debt |= self.late_replies < owed;
                }
                Ok(None) => {
                    warn!("Connection closed while waiting for reply to {}", request.keyword());
                    self.close().await;
                    return Err(ControlError::ConnectionClosed);
                }
                Err(_) => {
                    if !settled_debt {
                        self.late_replies += 1;
                    }
                    warn!(
                        "No reply to {} within {:?} ({} late replies pending)",
                        request.keyword(),
                        wait,
                        self.late_replies
                    );
                    return Err(ControlError::Timeout(wait));
                }
            }
        }
    }

    /// Send `request` and pair it with its reply.
    pub async fn exchange(&mut self, request: ControlRequest) -> Result<ControlResponse> {
        let buffer = self.request(&request).await?;
        Ok(ControlResponse::new(request, buffer))
    }

    /// Send `request` and wrap the reply in a typed response.
    pub async fn call<R: From<ControlResponse>>(&mut self, request: ControlRequest) -> Result<R> {
        self.exchange(request).await.map(R::from)
    }

    /// Drain queued events, including any already waiting in the handoff.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.drain_handoff();
        self.events.drain(..).collect()
    }

    // Returns the buffer only if it can answer the request in flight.
    fn route(&mut self, buffer: ResponseBuffer) -> Option<ResponseBuffer> {
        if StatusClass::of(buffer.status()) == StatusClass::Asynchronous {
            if let Some(event) = Event::from_buffer(buffer) {
                trace!("Queued {} event", event.name);
                if self.events.len() >= MAX_QUEUED_EVENTS {
                    warn!("Event queue full, dropping oldest event");
                    self.events.pop_front();
                }
                self.events.push_back(event);
            }
            return None;
        }

        if self.late_replies > 0 {
            self.late_replies -= 1;
            warn!(
                "Discarding late reply ({} {})",
                buffer.status(),
                buffer.status_text()
            );
            return None;
        }

        Some(buffer)
    }

    fn drain_handoff(&mut self) {
        let mut pending = Vec::new();
        if let Some(connection) = self.connection.as_mut() {
            while let Ok(buffer) = connection.replies.try_recv() {
                pending.push(buffer);
            }
        }

        for buffer in pending {
            if let Some(orphan) = self.route(buffer) {
                warn!(
                    "Dropping reply with no request ({} {})",
                    orphan.status(),
                    orphan.status_text()
                );
            }
        }
    }
}

async fn write_frame(writer: &mut WriteHalf<BoxedTransport>, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}
