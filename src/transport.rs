//! Request/reply connections over TCP.
//!
//! A [`Connection`] carries strictly alternating request and reply frames:
//! one request is sent, then exactly one reply frame is read back.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::wire::{MessageCodec, Request};
use crate::{Error, Result};

pub const HOST: &str = "127.0.0.1";

/// Address of one worker listener, as `host:port`.
#[derive(derive_more::Display, Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn from_port(host: &str, port: u16) -> Self {
        Self(format!("{host}:{port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr.to_string())
    }
}

pub struct Connection {
    endpoint: Endpoint,
    framed: Framed<TcpStream, MessageCodec>,
}

impl Connection {
    pub async fn connect(endpoint: &Endpoint) -> Result<Self> {
        let stream = TcpStream::connect(endpoint.as_str())
            .await
            .map_err(|source| Error::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        debug!("connected to {endpoint}");

        Ok(Self {
            endpoint: endpoint.clone(),
            framed: Framed::new(stream, MessageCodec::new()),
        })
    }

    /// Sends `request` and waits as long as it takes for the reply.
    pub async fn call(&mut self, request: Request) -> Result<Bytes> {
        self.framed.send(request).await?;
        self.next_reply().await
    }

    /// Sends `request` and waits at most `wait` for the reply.
    pub async fn call_timeout(&mut self, request: Request, wait: Duration) -> Result<Bytes> {
        self.framed.send(request).await?;
        timeout(wait, self.next_reply())
            .await
            .map_err(|_| Error::Timeout {
                endpoint: self.endpoint.clone(),
            })?
    }

    /// Flushes and shuts down the write half.
    pub async fn close(mut self) -> Result<()> {
        SinkExt::<Bytes>::close(&mut self.framed).await?;
        debug!("closed connection to {}", self.endpoint);
        Ok(())
    }

    async fn next_reply(&mut self) -> Result<Bytes> {
        match self.framed.next().await {
            Some(reply) => reply,
            None => Err(Error::Disconnected {
                endpoint: self.endpoint.clone(),
            }),
        }
    }
}

/// Binds one listener per endpoint. Any failure aborts the whole bind.
pub async fn bind_all(endpoints: &[Endpoint]) -> Result<Vec<TcpListener>> {
    let mut listeners = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let listener = TcpListener::bind(endpoint.as_str())
            .await
            .map_err(|source| Error::Bind {
                endpoint: endpoint.clone(),
                source,
            })?;
        listeners.push(listener);
    }
    Ok(listeners)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    // --- Test Helper: echo every frame back with a prefix ---
    async fn start_echo_server() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, MessageCodec::new());
            while let Some(Ok(frame)) = framed.next().await {
                let mut reply = b"echo:".to_vec();
                reply.extend_from_slice(&frame);
                framed.send(Bytes::from(reply)).await.unwrap();
            }
        });

        addr.into()
    }

    #[tokio::test]
    async fn call_gets_exactly_one_reply() -> Result<()> {
        let endpoint = start_echo_server().await;
        let mut conn = Connection::connect(&endpoint).await?;

        let reply = conn.call(Request::Map(Bytes::from_static(b"a b"))).await?;
        assert_eq!(reply.as_ref(), b"echo:mapa b");

        let reply = conn
            .call_timeout(Request::Rip, Duration::from_secs(2))
            .await?;
        assert_eq!(reply.as_ref(), b"echo:rip");

        conn.close().await
    }

    #[tokio::test]
    async fn silent_peer_times_out() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let endpoint: Endpoint = listener.local_addr()?.into();
        // accept and hold the socket without replying
        let holder = tokio::spawn(async move { listener.accept().await });

        let mut conn = Connection::connect(&endpoint).await?;
        let result = conn
            .call_timeout(Request::Rip, Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(Error::Timeout { .. })));

        holder.abort();
        Ok(())
    }

    #[tokio::test]
    async fn closed_peer_is_reported() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let endpoint: Endpoint = listener.local_addr()?.into();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        let mut conn = Connection::connect(&endpoint).await?;
        let result = conn.call(Request::Rip).await;
        assert!(result.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn refused_connection_names_endpoint() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint: Endpoint = listener.local_addr().unwrap().into();
        drop(listener);

        match Connection::connect(&endpoint).await {
            Err(Error::Connect { endpoint: failed, .. }) => assert_eq!(failed, endpoint),
            other => panic!("expected connect error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn endpoint_from_port() {
        assert_eq!(Endpoint::from_port(HOST, 5555).to_string(), "127.0.0.1:5555");
    }
}
