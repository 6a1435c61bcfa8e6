//! Socket gateway: owns the per-connection lifecycle
//! (connect -> authenticate -> ready -> closed), demuxes the four inbound
//! event types, and keeps a single writer per socket. Authentication happens
//! on the upgrade handshake; a refused handshake never reaches the websocket
//! state machine.

use crate::pipeline::BidPipeline;
use crate::timesync;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header::ORIGIN, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, IntoMakeService};
use axum::Router;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use gavel_rs::clock::unix_ms;
use gavel_rs::coordinator::{keys, with_deadline, Coordinator, REVOCATION_CACHE_CAP};
use gavel_rs::events::{ClientEvent, ServerEvent};
use gavel_rs::rooms::{Subscriber, OUTBOUND_QUEUE_CAPACITY};
use gavel_rs::signing::{verify_credential, CredentialClaims, CredentialError};
use gavel_rs::types::{ConnectionId, Money, UserId};
use gavel_rs::{BidError, RoomRegistry, Store};
use hyper::server::conn::AddrIncoming;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct HandshakeQuery {
    token: Option<String>,
}

#[derive(Debug)]
enum HandshakeError {
    Credential(CredentialError),
    StoreUnavailable,
}

impl HandshakeError {
    fn reason(&self) -> &'static str {
        match self {
            Self::Credential(err) => err.reason(),
            Self::StoreUnavailable => "Unavailable",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Credential(_) => StatusCode::UNAUTHORIZED,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Identity of one READY connection as seen by downstream code.
struct Connection {
    id: ConnectionId,
    user_id: UserId,
    username: String,
    outbound: mpsc::Sender<ServerEvent>,
    slow: Arc<AtomicBool>,
    kill: Arc<Notify>,
}

#[derive(Clone)]
pub struct Gateway(Arc<GatewayInner>);

impl std::ops::Deref for Gateway {
    type Target = GatewayInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct GatewayInner {
    pipeline: BidPipeline,
    rooms: Arc<RoomRegistry>,
    store: Store,
    coordinator: Arc<dyn Coordinator>,
    credential_secret: String,
    allowed_origin: String,
}

impl Gateway {
    pub fn new(
        pipeline: BidPipeline,
        rooms: Arc<RoomRegistry>,
        store: Store,
        coordinator: Arc<dyn Coordinator>,
        credential_secret: String,
        allowed_origin: String,
    ) -> Self {
        Self(Arc::new(GatewayInner {
            pipeline,
            rooms,
            store,
            coordinator,
            credential_secret,
            allowed_origin,
        }))
    }

    pub fn router(&self) -> Router {
        Router::new().route("/ws", get(handle_upgrade)).with_state(self.clone())
    }

    /// Verify the bearer credential and consult the revocation set:
    /// coordinator cache first, store on miss, refreshing the cache when the
    /// store knows the credential is revoked.
    async fn authenticate(&self, token: &str) -> Result<CredentialClaims, HandshakeError> {
        let now = unix_ms();
        let claims = verify_credential(token, self.credential_secret.as_bytes(), now)
            .map_err(HandshakeError::Credential)?;

        let cache_key = keys::revoked(token);
        match with_deadline(self.coordinator.get(&cache_key)).await {
            Ok(Some(_)) => {
                return Err(HandshakeError::Credential(CredentialError::Revoked));
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(%err, "revocation cache unavailable; checking store");
            }
        }

        match self.store.lookup_revoked_credential(token).await {
            Ok(Some(revocation_expires_at_ms)) => {
                let remaining =
                    Duration::from_millis((revocation_expires_at_ms - now).max(0) as u64)
                        .min(REVOCATION_CACHE_CAP);
                if !remaining.is_zero() {
                    if let Err(err) =
                        with_deadline(self.coordinator.put(&cache_key, "1", remaining)).await
                    {
                        tracing::warn!(%err, "could not refresh revocation cache");
                    }
                }
                Err(HandshakeError::Credential(CredentialError::Revoked))
            }
            Ok(None) => Ok(claims),
            Err(err) => {
                tracing::error!(%err, "revocation lookup failed; refusing handshake");
                Err(HandshakeError::StoreUnavailable)
            }
        }
    }

    async fn handle_connection(self, socket: WebSocket, claims: CredentialClaims) {
        let connection_id = Uuid::new_v4();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let slow = Arc::new(AtomicBool::new(false));
        let kill = Arc::new(Notify::new());

        let (sink, mut stream) = socket.split();
        let writer = tokio::spawn(write_outbound(sink, outbound_rx, slow.clone(), kill.clone()));

        let connection = Connection {
            id: connection_id,
            user_id: claims.user_id,
            username: claims.username,
            outbound: outbound_tx,
            slow,
            kill,
        };
        tracing::info!(%connection_id, username = %connection.username, "connection ready");

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if self.dispatch(&connection, &text).await.is_err() {
                        // writer is gone; nothing left to answer on
                        break;
                    }
                }
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }

        self.rooms.on_disconnect(&connection_id);
        tracing::info!(%connection_id, username = %connection.username, "connection closed");
        drop(connection);
        let _ = writer.await;
    }

    async fn dispatch(
        &self,
        connection: &Connection,
        text: &str,
    ) -> Result<(), SendError<ServerEvent>> {
        let event = match serde_json::from_str::<ClientEvent>(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::trace!(%err, "ignoring unrecognized inbound message");
                return Ok(());
            }
        };

        match event {
            ClientEvent::TimeSyncRequest { client_timestamp_t0_in_ms } => {
                connection
                    .outbound
                    .send(timesync::respond(client_timestamp_t0_in_ms))
                    .await
            }
            ClientEvent::JoinAuctionRoom { auction_item_id } => {
                let subscriber = Subscriber::new(
                    connection.id,
                    connection.user_id,
                    connection.username.clone(),
                    connection.outbound.clone(),
                    connection.slow.clone(),
                    connection.kill.clone(),
                );
                self.rooms.join(auction_item_id, subscriber);
                connection
                    .outbound
                    .send(ServerEvent::JoinedAuctionRoom { auction_item_id })
                    .await?;
                match self.pipeline.room_snapshot(&auction_item_id).await {
                    Ok(Some(snapshot)) => connection.outbound.send(snapshot).await,
                    Ok(None) => Ok(()),
                    Err(err) => {
                        tracing::warn!(%auction_item_id, %err, "could not build room snapshot");
                        Ok(())
                    }
                }
            }
            ClientEvent::LeaveAuctionRoom { auction_item_id } => {
                self.rooms.leave(&auction_item_id, &connection.id);
                connection
                    .outbound
                    .send(ServerEvent::LeftAuctionRoom { auction_item_id })
                    .await
            }
            ClientEvent::PlaceBid { auction_item_id, bid_amount_in_dollars } => {
                // wire decimals convert to fixed-point money here; excess
                // fractional digits are an INVALID_AMOUNT answer, not a
                // dropped frame
                let outcome = match Money::try_from(bid_amount_in_dollars) {
                    Ok(amount) => {
                        self.pipeline
                            .place_bid(
                                auction_item_id,
                                connection.user_id,
                                &connection.username,
                                amount,
                            )
                            .await
                    }
                    Err(_) => Err(BidError::InvalidAmount),
                };
                let reply = match outcome {
                    Ok(receipt) => ServerEvent::BidPlacedSuccess {
                        auction_item_id,
                        bid_amount_in_dollars: receipt.amount,
                        bid_id: receipt.bid_id,
                        bid_placed_at_timestamp: receipt.accepted_at_ms,
                    },
                    Err(err) => {
                        if !err.is_client_fault() {
                            tracing::error!(%auction_item_id, %err, "bid failed server-side");
                        }
                        ServerEvent::BidPlacedError {
                            auction_item_id,
                            error_code: err.code().to_owned(),
                            error_message: err.to_string(),
                        }
                    }
                };
                connection.outbound.send(reply).await
            }
        }
    }
}

/// Single writer per socket: everything outbound funnels through one queue.
async fn write_outbound(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerEvent>,
    slow: Arc<AtomicBool>,
    kill: Arc<Notify>,
) {
    loop {
        tokio::select! {
            maybe_event = outbound.recv() => match maybe_event {
                Some(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(err) => {
                            tracing::error!(%err, "could not serialize outbound event");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                None => break,
            },
            _ = kill.notified() => break,
        }
    }
    if slow.load(Ordering::Acquire) {
        let _ = sink
            .send(Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: "SlowConsumer".into(),
            })))
            .await;
    } else {
        let _ = sink.send(Message::Close(None)).await;
    }
}

async fn handle_upgrade(
    State(gateway): State<Gateway>,
    ws: WebSocketUpgrade,
    Query(query): Query<HandshakeQuery>,
    headers: HeaderMap,
) -> Response {
    let origin = headers.get(ORIGIN).and_then(|value| value.to_str().ok());
    if origin != Some(gateway.allowed_origin.as_str()) {
        tracing::debug!(?origin, "refusing connection from disallowed origin");
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    let Some(token) = query.token else {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    };
    match gateway.authenticate(&token).await {
        Ok(claims) => ws
            .on_upgrade(move |socket| gateway.handle_connection(socket, claims))
            .into_response(),
        Err(err) => {
            tracing::debug!(reason = err.reason(), "refusing credential on handshake");
            (err.status(), err.reason()).into_response()
        }
    }
}

/// Type alias for the configured axum server
pub type GatewayServer = axum::Server<AddrIncoming, IntoMakeService<Router>>;

pub struct Server {
    host: Ipv4Addr,
    port: u16,
    gateway: Gateway,
}

impl Server {
    pub fn new(host: Ipv4Addr, port: u16, gateway: Gateway) -> Self {
        Self { host, port, gateway }
    }

    /// Configures and returns the axum server
    pub fn serve(&self) -> GatewayServer {
        let addr = SocketAddr::from((self.host, self.port));
        axum::Server::bind(&addr).serve(self.gateway.router().into_make_service())
    }

    /// Spawns the server on a new task returning the handle for it
    pub fn spawn(&self) -> JoinHandle<Result<(), hyper::Error>> {
        let server = self.serve();
        let address = server.local_addr();
        tokio::spawn(async move {
            tracing::info!("listening at {address}...");
            let result = server.await;
            if let Err(ref err) = result {
                tracing::error!(%err, "error while listening for incoming");
            }
            result
        })
    }
}
