//! Transport seam between the pool and the network.
//!
//! A [`Transport`] dials a relay URL and hands back the two halves of a duplex
//! frame channel. [`WebSocketTransport`] is the production implementation;
//! tests plug in their own.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

/// Transport-level errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed")]
    Closed,
}

/// One frame on the duplex channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Write half of a relay connection.
#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a relay connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Wait for the next inbound frame. An error is terminal.
    async fn next_frame(&mut self) -> Result<Frame, TransportError>;
}

/// Opens connections to relays.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dial(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn dial(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>), TransportError> {
        let (ws, _response) = connect_async(url)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))?;
        let (sink, stream) = ws.split();
        Ok((
            Box::new(WebSocketSink { sink }),
            Box::new(WebSocketFrames { stream }),
        ))
    }
}

struct WebSocketSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
            Frame::Ping(data) => Message::Ping(data.into()),
            Frame::Pong(data) => Message::Pong(data.into()),
            Frame::Close => Message::Close(None),
        };
        self.sink
            .send(message)
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink
            .close()
            .await
            .map_err(|e| TransportError::WebSocket(e.to_string()))
    }
}

struct WebSocketFrames {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WebSocketFrames {
    async fn next_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            let message = match self.stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
                None => return Err(TransportError::Closed),
            };

            return Ok(match message {
                Message::Text(text) => Frame::Text(text.as_str().to_string()),
                Message::Binary(data) => Frame::Binary(data.to_vec()),
                Message::Ping(data) => Frame::Ping(data.to_vec()),
                Message::Pong(data) => Frame::Pong(data.to_vec()),
                Message::Close(_) => Frame::Close,
                // Raw frames only appear when writing
                Message::Frame(_) => continue,
            });
        }
    }
}
