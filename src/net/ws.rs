//! Production [`Connector`] over tokio-tungstenite.
//!
//! Each link is a `spawn_local` task owning the websocket stream. Outgoing
//! frames reach the task through an unbounded channel; incoming frames and
//! lifecycle changes go back through the [`EventSink`]. Must run inside a
//! tokio `LocalSet`.
//!
//! The session token travels in the `Sec-WebSocket-Protocol` request header.

#[cfg(test)]
#[path = "ws_test.rs"]
mod ws_test;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{InvalidHeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use super::socket::{ABNORMAL_CLOSURE, Connector, EventSink, Link, NO_STATUS_CLOSURE, NORMAL_CLOSURE, OpenRequest, SocketEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Error type for the websocket handshake.
#[derive(Debug, thiserror::Error)]
enum HandshakeError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tungstenite::Error>),
    #[error("token is not a valid header value: {0}")]
    Token(#[from] InvalidHeaderValue),
}

enum Outgoing {
    Text(String),
    Close(u16),
}

/// Opens real websocket connections on the current `LocalSet`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, request: OpenRequest, events: EventSink) -> Box<dyn Link> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::task::spawn_local(run_link(request, events, rx));
        Box::new(WsLink { tx })
    }
}

struct WsLink {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Link for WsLink {
    fn send_text(&self, text: String) -> bool {
        self.tx.send(Outgoing::Text(text)).is_ok()
    }

    fn close(&self, code: u16) {
        if self.tx.send(Outgoing::Close(code)).is_err() {
            debug!(code, "link task already finished");
        }
    }
}

async fn handshake(request: &OpenRequest) -> Result<WsStream, HandshakeError> {
    let mut http = request.url.as_str().into_client_request().map_err(|e| HandshakeError::Connect(Box::new(e)))?;
    http.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_str(&request.token)?);
    let (stream, _) = connect_async(http).await.map_err(|e| HandshakeError::Connect(Box::new(e)))?;
    Ok(stream)
}

async fn run_link(request: OpenRequest, events: EventSink, mut outgoing: mpsc::UnboundedReceiver<Outgoing>) {
    let stream = match handshake(&request).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(url = %request.url, error = %e, "websocket handshake failed");
            events(SocketEvent::Error(e.to_string()));
            events(SocketEvent::Close { code: ABNORMAL_CLOSURE });
            return;
        }
    };
    debug!(url = %request.url, "websocket handshake complete");
    events(SocketEvent::Open);

    let (mut write, mut read) = stream.split();
    let code = loop {
        tokio::select! {
            next = outgoing.recv() => match next {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        events(SocketEvent::Error(e.to_string()));
                        break ABNORMAL_CLOSURE;
                    }
                }
                Some(Outgoing::Close(code)) => {
                    let frame = CloseFrame { code: CloseCode::from(code), reason: "".into() };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    break code;
                }
                None => {
                    let frame = CloseFrame { code: CloseCode::Normal, reason: "".into() };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        debug!(error = %e, "close frame not delivered");
                    }
                    break NORMAL_CLOSURE;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => events(SocketEvent::Message(text.as_str().to_owned())),
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or(NO_STATUS_CLOSURE, |frame| u16::from(frame.code));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events(SocketEvent::Error(e.to_string()));
                    break ABNORMAL_CLOSURE;
                }
                None => break ABNORMAL_CLOSURE,
            },
        }
    };
    events(SocketEvent::Close { code });
}
