use std::{net::SocketAddr, sync::Arc};

use anyhow::{Result, anyhow};
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use rustls::{ClientConfig, RootCertStore};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async, connect_async_tls_with_config,
    tungstenite::Message,
};
use tracing::{info, warn};

use crate::{
    config::Config,
    message::{MsgBlock, Request, WsMsg},
    registry::Topic,
};

pub struct WebSocketClient {
    pub stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

fn to_message<T>(value: &T) -> Result<Message>
where
    T: ?Sized + Serialize,
{
    let s = serde_json::to_string(value)?;
    Ok(Message::Text(s.into()))
}

pub fn from_message(m: Message) -> Result<WsMsg> {
    let text = m.to_text()?;
    info!("Received message: {}", text);
    Ok(serde_json::from_str(text)?)
}

fn tls_connector() -> Result<Connector> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let mut root_store = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in native.errors {
        warn!("Failed to load a native certificate: {}", e);
    }
    for cert in native.certs {
        root_store.add(cert)?;
    }
    Ok(Connector::Rustls(Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )))
}

impl WebSocketClient {
    /// Connects to the server described by the process configuration.
    pub async fn new() -> Result<Self> {
        let config = Config::try_parse()?;
        let host = format!("localhost:{}", config.api_port);
        if config.should_use_tls() {
            Self::connect_tls(&format!("wss://{}/ws", host)).await
        } else {
            Self::connect_url(&format!("ws://{}/ws", host)).await
        }
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_url(&format!("ws://{}/ws", addr)).await
    }

    pub async fn connect_url(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url).await?;
        Ok(WebSocketClient { stream })
    }

    pub async fn connect_tls(url: &str) -> Result<Self> {
        let (stream, _) =
            connect_async_tls_with_config(url, None, false, Some(tls_connector()?)).await?;
        Ok(WebSocketClient { stream })
    }

    async fn recv(&mut self) -> Result<Message> {
        Ok(self
            .stream
            .next()
            .await
            .ok_or_else(|| anyhow!("Connection ended"))??)
    }

    pub async fn ping(&mut self) -> Result<()> {
        let data = "echo";
        self.stream.send(Message::Ping(data.into())).await?;
        if let Message::Pong(bs) = self.recv().await?
            && data == str::from_utf8(&bs)?
        {
            Ok(())
        } else {
            Err(anyhow!("Unexpected pong"))
        }
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::Text(text.to_string().into())).await?;
        Ok(())
    }

    /// Blocks sequenced after the subscription took effect may arrive ahead
    /// of the acknowledgement; they are returned in order.
    pub async fn subscribe(&mut self, topic: Topic) -> Result<Vec<MsgBlock>> {
        self.stream
            .send(to_message(&Request::Subscribe { topic })?)
            .await?;
        let mut early = vec![];
        loop {
            match self.next().await? {
                WsMsg::Subscribed { topic: t } if t == topic => {
                    info!("Subscribed to {}", topic);
                    return Ok(early);
                }
                WsMsg::Block(msg) => early.push(msg),
                other => return Err(anyhow!("Unexpected subscribe response: {:?}", other)),
            }
        }
    }

    /// Messages queued before the unsubscribe took effect are returned in
    /// order ahead of the acknowledgement.
    pub async fn unsubscribe(&mut self, topic: Topic) -> Result<Vec<MsgBlock>> {
        self.stream
            .send(to_message(&Request::Unsubscribe { topic })?)
            .await?;
        let mut pending = vec![];
        loop {
            match self.next().await? {
                WsMsg::Unsubscribed { topic: t } if t == topic => return Ok(pending),
                WsMsg::Block(msg) => pending.push(msg),
                other => return Err(anyhow!("Unexpected unsubscribe response: {:?}", other)),
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.stream.send(Message::Close(None)).await?;
        if self.recv().await?.is_close() {
            Ok(())
        } else {
            Err(anyhow!("Unexpected close response from server"))
        }
    }

    pub async fn next(&mut self) -> Result<WsMsg> {
        from_message(self.recv().await?)
    }

    pub async fn next_block(&mut self) -> Result<MsgBlock> {
        match self.next().await? {
            WsMsg::Block(msg) => Ok(msg),
            other => Err(anyhow!("Expected a block message, got {:?}", other)),
        }
    }

    /// Waits for the server to close the connection and returns the close
    /// code it sent, skipping any data frames still in flight.
    pub async fn closed(&mut self) -> Result<Option<u16>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Close(frame))) => return Ok(frame.map(|f| f.code.into())),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }
}
