//! The worker process: listens on one or more endpoints and answers `map`,
//! `red` and `rip` requests until told to stop.
//!
//! Each accepted connection gets its own task that reads frames, but every
//! request is answered by a single command loop in [`WorkerServer::serve`],
//! so requests are handled one at a time no matter how many distributor
//! threads are talking to the worker.

mod handlers;

pub use handlers::{WorkerState, WorkerStats, count_words, dispatch, map_chunk, reduce_counts};

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::codec::Framed;
use tracing::{Instrument, debug, error, info, info_span};

use crate::transport::{self, Endpoint};
use crate::wire::{MessageCodec, Request};
use crate::{Error, Result};

#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerConfig {
    pub endpoints: Vec<Endpoint>,
    /// How long the command loop waits for a request before checking in.
    pub recv_timeout: Duration,
}

impl WorkerConfig {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            recv_timeout: Duration::from_millis(2000),
        }
    }
}

/// A request waiting for the command loop, with the slot for its reply.
struct Envelope {
    request: Request,
    reply: oneshot::Sender<Bytes>,
}

pub struct WorkerServer {
    listeners: Vec<TcpListener>,
    recv_timeout: Duration,
}

impl WorkerServer {
    pub async fn bind(config: &WorkerConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(Error::General("worker needs at least one endpoint".into()));
        }
        let listeners = transport::bind_all(&config.endpoints).await?;
        for listener in &listeners {
            info!("worker bound to {}", listener.local_addr()?);
        }
        Ok(Self {
            listeners,
            recv_timeout: config.recv_timeout,
        })
    }

    /// The addresses actually bound, useful when binding port 0.
    pub fn local_endpoints(&self) -> Result<Vec<Endpoint>> {
        let mut endpoints = Vec::with_capacity(self.listeners.len());
        for listener in &self.listeners {
            endpoints.push(Endpoint::from(listener.local_addr()?));
        }
        Ok(endpoints)
    }

    /// Serves requests until a `rip` arrives.
    pub async fn serve(self) -> Result<WorkerStats> {
        let recv_timeout = self.recv_timeout;
        let mut incoming =
            futures::stream::select_all(self.listeners.into_iter().map(TcpListenerStream::new));
        let (request_tx, mut request_rx) = mpsc::channel::<Envelope>(64);
        let mut connections = JoinSet::new();
        let mut stats = WorkerStats::default();
        let mut state = WorkerState::Listening;

        while state == WorkerState::Listening {
            tokio::select! {
                accepted = incoming.next() => match accepted {
                    Some(Ok(socket)) => match socket.peer_addr() {
                        Ok(peer) => {
                            debug!("accepted connection from {peer}");
                            let request_tx = request_tx.clone();
                            connections.spawn(
                                handle_socket(peer, socket, request_tx)
                                    .instrument(info_span!("connection", %peer)),
                            );
                        }
                        Err(e) => debug!("connection gone before it was served: {e}"),
                    },
                    Some(Err(e)) => error!("accept failed: {e}"),
                    None => return Err(Error::General("all listeners closed".into())),
                },
                received = timeout(recv_timeout, request_rx.recv()) => match received {
                    Ok(Some(Envelope { request, reply })) => {
                        let (response, next) = dispatch(request, &mut stats);
                        if reply.send(response).is_err() {
                            debug!("connection went away before its reply");
                        }
                        state = next;
                    }
                    // request_tx is held above, so the channel never closes here
                    Ok(None) => {}
                    Err(_) => debug!("no request in {recv_timeout:?}"),
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    match finished {
                        Ok(Err(e)) => debug!("connection ended: {e}"),
                        Err(e) => error!("connection task failed: {e}"),
                        Ok(Ok(())) => {}
                    }
                }
            }
        }

        // stop listening and let the open connections flush their last reply
        drop(incoming);
        drop(request_tx);
        drop(request_rx);
        let drained = timeout(recv_timeout, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            debug!("aborting {} idle connections", connections.len());
            connections.shutdown().await;
        }

        info!(
            maps = stats.maps,
            reduces = stats.reduces,
            unknown = stats.unknown,
            "worker done"
        );
        Ok(stats)
    }
}

/// Binds every endpoint in `config` and serves until `rip`.
pub async fn run(config: WorkerConfig) -> Result<WorkerStats> {
    WorkerServer::bind(&config).await?.serve().await
}

async fn handle_socket(
    peer: SocketAddr,
    socket: TcpStream,
    requests: mpsc::Sender<Envelope>,
) -> Result<()> {
    socket.set_nodelay(true)?;
    let (sink, stream) = Framed::new(socket, MessageCodec::new()).split::<Bytes>();
    handle_connection(peer, stream, sink, requests).await
}

/// Forwards each frame on one connection to the command loop and writes
/// back its reply, in order.
async fn handle_connection<I, O>(
    peer: SocketAddr,
    mut stream: I,
    mut sink: O,
    requests: mpsc::Sender<Envelope>,
) -> Result<()>
where
    I: Stream<Item = Result<Bytes>> + Unpin,
    O: Sink<Bytes, Error = Error> + Unpin,
{
    while let Some(frame) = stream.next().await {
        let request = Request::parse(frame?);
        debug!("{} request from {peer}", request.name());

        let (reply_tx, reply_rx) = oneshot::channel();
        requests
            .send(Envelope {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| Error::General("worker stopped serving".into()))?;
        let reply = reply_rx
            .await
            .map_err(|_| Error::General("worker stopped before replying".into()))?;

        sink.send(reply).await?;
    }
    sink.close().await?;
    Ok(())
}
