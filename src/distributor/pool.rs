//! Map phase: one client task per endpoint, each sending its share of the
//! chunks and merging the replies into the shared intermediate tally.

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info_span};

use crate::tally::Tally;
use crate::transport::{Connection, Endpoint};
use crate::wire::{Request, decode_unary};
use crate::{Error, Result};

pub type SharedTally = Arc<Mutex<Tally>>;

/// Strided assignment: client `i` gets chunks `i, i + n, i + 2n, ...`.
pub fn partition(chunks: &[Bytes], clients: usize) -> Vec<Vec<Bytes>> {
    let mut shares = vec![Vec::new(); clients];
    if clients == 0 {
        return shares;
    }
    for (index, chunk) in chunks.iter().enumerate() {
        shares[index % clients].push(chunk.clone());
    }
    shares
}

/// Runs the map phase to completion and returns the number of `map`
/// requests answered.
///
/// The first client that fails ends the phase with its error; the other
/// clients are aborted and their chunks are not reassigned.
pub async fn dispatch(
    endpoints: &[Endpoint],
    chunks: &[Bytes],
    intermediate: SharedTally,
) -> Result<u64> {
    if endpoints.is_empty() {
        return Err(Error::General("no endpoints to dispatch to".into()));
    }

    let mut clients = JoinSet::new();
    for (index, (endpoint, share)) in endpoints
        .iter()
        .zip(partition(chunks, endpoints.len()))
        .enumerate()
    {
        let endpoint = endpoint.clone();
        let intermediate = Arc::clone(&intermediate);
        let span = info_span!("map_client", index, %endpoint);
        clients.spawn(map_client(endpoint, share, intermediate).instrument(span));
    }

    let mut answered = 0;
    while let Some(finished) = clients.join_next().await {
        match finished {
            Ok(Ok(count)) => answered += count,
            Ok(Err(e)) => return Err(e),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(answered)
}

async fn map_client(endpoint: Endpoint, share: Vec<Bytes>, intermediate: SharedTally) -> Result<u64> {
    let mut conn = Connection::connect(&endpoint).await?;
    let result = map_share(&mut conn, &share, &intermediate).await;
    if let Err(e) = conn.close().await {
        debug!("closing {endpoint}: {e}");
    }
    result
}

async fn map_share(conn: &mut Connection, share: &[Bytes], intermediate: &SharedTally) -> Result<u64> {
    let mut answered = 0;
    for chunk in share {
        let reply = conn.call(Request::Map(chunk.clone())).await?;
        let local = decode_unary(&reply);
        intermediate.lock()?.merge(&local);
        answered += 1;
    }
    debug!("mapped {answered} chunks");
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_util::codec::Framed;

    use crate::wire::MessageCodec;
    use crate::worker::map_chunk;

    fn chunks(texts: &[&'static str]) -> Vec<Bytes> {
        texts.iter().map(|t| Bytes::from_static(t.as_bytes())).collect()
    }

    /// Answers `map` requests on every accepted connection like a worker.
    async fn start_map_server() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (socket, _) = listener.accept().await.unwrap();
                tokio::spawn(async move {
                    let mut framed = Framed::new(socket, MessageCodec::new());
                    while let Some(Ok(frame)) = framed.next().await {
                        let reply = match Request::parse(frame) {
                            Request::Map(chunk) => map_chunk(&chunk),
                            _ => Bytes::new(),
                        };
                        framed.send(reply).await.unwrap();
                    }
                });
            }
        });
        addr.into()
    }

    #[test]
    fn partition_is_strided() {
        let all = chunks(&["c0", "c1", "c2", "c3", "c4"]);
        let shares = partition(&all, 2);
        assert_eq!(shares[0], chunks(&["c0", "c2", "c4"]));
        assert_eq!(shares[1], chunks(&["c1", "c3"]));
    }

    #[test]
    fn partition_with_more_clients_than_chunks() {
        let shares = partition(&chunks(&["only"]), 3);
        assert_eq!(shares.len(), 3);
        assert_eq!(shares[0], chunks(&["only"]));
        assert!(shares[1].is_empty() && shares[2].is_empty());
        assert!(partition(&[], 0).is_empty());
    }

    #[tokio::test]
    async fn dispatch_merges_every_reply() -> Result<()> {
        let endpoints = vec![start_map_server().await, start_map_server().await];
        let intermediate = SharedTally::default();

        let answered = dispatch(
            &endpoints,
            &chunks(&["The cat", "the dog", "a cat", "THE END"]),
            Arc::clone(&intermediate),
        )
        .await?;

        assert_eq!(answered, 4);
        let tally = intermediate.lock()?;
        assert_eq!(tally.get("the"), Some(3));
        assert_eq!(tally.get("cat"), Some(2));
        assert_eq!(tally.get("dog"), Some(1));
        assert_eq!(tally.get("end"), Some(1));
        assert_eq!(tally.total(), 8);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_the_phase() -> Result<()> {
        let live = start_map_server().await;
        let dead_listener = TcpListener::bind("127.0.0.1:0").await?;
        let dead: Endpoint = dead_listener.local_addr()?.into();
        drop(dead_listener);

        let result = dispatch(
            &[live, dead.clone()],
            &chunks(&["one", "two", "three"]),
            SharedTally::default(),
        )
        .await;

        match result {
            Err(Error::Connect { endpoint, .. }) => assert_eq!(endpoint, dead),
            other => panic!("expected connect error, got {other:?}"),
        }
        Ok(())
    }
}
