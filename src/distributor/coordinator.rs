//! Reduce rounds against the designated peer, then the `rip` broadcast.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::packer::{DroppedWord, pack_round};
use super::pool::SharedTally;
use crate::tally::Tally;
use crate::transport::{Connection, Endpoint};
use crate::wire::{Request, decode_decimal, is_rip_ack};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct ReduceOutcome {
    pub reduced: Tally,
    pub rounds: u64,
    pub dropped: Vec<DroppedWord>,
}

/// Drains `intermediate` through `red` requests to `peer`, one round at a
/// time, and returns the merged replies.
///
/// A reply that does not arrive within `reply_timeout` ends the run.
pub async fn reduce_all(
    peer: &Endpoint,
    intermediate: &SharedTally,
    max_msg_bytes: usize,
    reply_timeout: Duration,
) -> Result<ReduceOutcome> {
    let mut conn = Connection::connect(peer).await?;
    let result = reduce_rounds(&mut conn, intermediate, max_msg_bytes, reply_timeout).await;
    if let Err(e) = conn.close().await {
        debug!("closing {peer}: {e}");
    }
    result
}

async fn reduce_rounds(
    conn: &mut Connection,
    intermediate: &SharedTally,
    max_msg_bytes: usize,
    reply_timeout: Duration,
) -> Result<ReduceOutcome> {
    let mut outcome = ReduceOutcome::default();

    loop {
        let packed = {
            let mut pending = intermediate.lock()?;
            if pending.is_empty() {
                break;
            }
            pack_round(&mut pending, max_msg_bytes)
        };

        for dropped in &packed.dropped {
            warn!(
                word_len = dropped.word.len(),
                lost = dropped.lost,
                "word does not fit a reduce request, dropping it"
            );
        }
        outcome.dropped.extend(packed.dropped.iter().cloned());
        if !packed.has_payload() {
            continue;
        }

        let reply = conn.call_timeout(packed.request(), reply_timeout).await?;
        let reduced = decode_decimal(&reply)?;
        outcome.reduced.merge(&reduced);
        outcome.rounds += 1;
        debug!(
            round = outcome.rounds,
            units = packed.units,
            drained = packed.drained,
            "reduce round done"
        );
    }

    info!(
        rounds = outcome.rounds,
        words = outcome.reduced.len(),
        "intermediate tally drained"
    );
    Ok(outcome)
}

/// Sends `rip` to every endpoint and returns how many acknowledged it.
/// Failures are logged and never stop the broadcast.
pub async fn terminate(endpoints: &[Endpoint], ack_timeout: Duration) -> usize {
    let mut acked = 0;
    for endpoint in endpoints {
        match rip(endpoint, ack_timeout).await {
            Ok(()) => {
                debug!("{endpoint} acknowledged rip");
                acked += 1;
            }
            Err(e) => warn!("no rip acknowledgement from {endpoint}: {e}"),
        }
    }
    acked
}

async fn rip(endpoint: &Endpoint, ack_timeout: Duration) -> Result<()> {
    let mut conn = Connection::connect(endpoint).await?;
    let reply = conn.call_timeout(Request::Rip, ack_timeout).await;
    if let Err(e) = conn.close().await {
        debug!("closing {endpoint}: {e}");
    }

    let reply = reply?;
    if !is_rip_ack(&reply) {
        return Err(Error::InvalidProtocol(format!(
            "unexpected rip reply {:?}",
            String::from_utf8_lossy(&reply)
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use tokio_util::codec::Framed;

    use crate::wire::{MAX_MSG_BYTES, MessageCodec};
    use crate::worker::reduce_counts;

    /// Serves one connection, reporting every reduce payload it sees.
    async fn start_reduce_server() -> (Endpoint, mpsc::UnboundedReceiver<Bytes>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, MessageCodec::new());
            while let Some(Ok(frame)) = framed.next().await {
                let reply = match Request::parse(frame) {
                    Request::Reduce(payload) => {
                        let _ = seen_tx.send(payload.clone());
                        reduce_counts(&payload)
                    }
                    _ => Bytes::new(),
                };
                framed.send(reply).await.unwrap();
            }
        });
        (addr.into(), seen_rx)
    }

    /// Replies to one request with a fixed frame.
    async fn start_fixed_server(reply: &'static [u8]) -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(socket, MessageCodec::new());
            if let Some(Ok(_)) = framed.next().await {
                let _ = framed.send(Bytes::from_static(reply)).await;
            }
        });
        addr.into()
    }

    fn shared(entries: &[(&str, u64)]) -> SharedTally {
        SharedTally::new(std::sync::Mutex::new(
            entries.iter().map(|(w, c)| (*w, *c)).collect(),
        ))
    }

    #[tokio::test]
    async fn drains_in_several_rounds() -> Result<()> {
        let (peer, mut seen) = start_reduce_server().await;
        let intermediate = shared(&[("ab", 10), ("cd", 3)]);

        let outcome = reduce_all(&peer, &intermediate, 12, Duration::from_secs(2)).await?;

        assert!(intermediate.lock()?.is_empty());
        assert_eq!(outcome.reduced.get("ab"), Some(10));
        assert_eq!(outcome.reduced.get("cd"), Some(3));
        assert_eq!(outcome.rounds, 3);
        assert_eq!(seen.recv().await.as_deref(), Some(&b"ab111111"[..]));
        assert_eq!(seen.recv().await.as_deref(), Some(&b"ab1111"[..]));
        assert_eq!(seen.recv().await.as_deref(), Some(&b"cd111"[..]));
        Ok(())
    }

    #[tokio::test]
    async fn oversized_word_is_dropped_and_others_survive() -> Result<()> {
        let (peer, _seen) = start_reduce_server().await;
        let long = "z".repeat(MAX_MSG_BYTES);
        let intermediate = shared(&[("keep", 2), (long.as_str(), 5), ("also", 1)]);

        let outcome = reduce_all(&peer, &intermediate, MAX_MSG_BYTES, Duration::from_secs(2)).await?;

        assert_eq!(outcome.reduced.get("keep"), Some(2));
        assert_eq!(outcome.reduced.get("also"), Some(1));
        assert_eq!(outcome.reduced.get(&long), None);
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].lost, 5);
        Ok(())
    }

    #[tokio::test]
    async fn empty_tally_sends_nothing() -> Result<()> {
        let (peer, mut seen) = start_reduce_server().await;
        let outcome = reduce_all(&peer, &SharedTally::default(), MAX_MSG_BYTES, Duration::from_secs(2)).await?;
        assert_eq!(outcome.rounds, 0);
        assert!(outcome.reduced.is_empty());
        assert!(seen.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn silent_peer_is_fatal() -> Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let peer: Endpoint = listener.local_addr()?.into();
        let holder = tokio::spawn(async move { listener.accept().await });

        let result = reduce_all(&peer, &shared(&[("word", 1)]), MAX_MSG_BYTES, Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));

        holder.abort();
        Ok(())
    }

    #[tokio::test]
    async fn terminate_is_best_effort() -> Result<()> {
        let acking = start_fixed_server(b"rip").await;
        let garbled = start_fixed_server(b"huh").await;
        let gone_listener = TcpListener::bind("127.0.0.1:0").await?;
        let gone: Endpoint = gone_listener.local_addr()?.into();
        drop(gone_listener);

        let acked = terminate(&[garbled, gone, acking], Duration::from_millis(500)).await;
        assert_eq!(acked, 1);
        Ok(())
    }
}
