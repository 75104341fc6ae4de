//! The distributor: chunks a document, runs the map phase across every
//! worker, drains the intermediate tally through reduce rounds on the first
//! worker and finally tells every worker to stop.

mod coordinator;
mod output;
mod packer;
mod pool;

pub use coordinator::{ReduceOutcome, reduce_all, terminate};
pub use output::{OutputFormat, WordFrequency, rank, write, write_csv, write_json};
pub use packer::{DroppedWord, Packed, pack_round};
pub use pool::{SharedTally, dispatch, partition};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{Instrument, info, info_span};

use crate::chunker;
use crate::tally::Tally;
use crate::transport::Endpoint;
use crate::wire::{MAX_CHUNK_BYTES, MAX_MSG_BYTES};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct DistributorConfig {
    pub endpoints: Vec<Endpoint>,
    pub reduce_timeout: Duration,
    pub rip_timeout: Duration,
    pub format: OutputFormat,
}

impl DistributorConfig {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self {
            endpoints,
            reduce_timeout: Duration::from_millis(5000),
            rip_timeout: Duration::from_millis(1000),
            format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Phase {
    Dispatching,
    Reducing,
    Terminating,
    Done,
}

impl Phase {
    pub fn advance(self) -> Result<Phase> {
        match self {
            Phase::Dispatching => Ok(Phase::Reducing),
            Phase::Reducing => Ok(Phase::Terminating),
            Phase::Terminating => Ok(Phase::Done),
            Phase::Done => Err(Error::General("run is already done".into())),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub chunks: usize,
    pub map_requests: u64,
    pub reduce_rounds: u64,
    pub dropped: Vec<DroppedWordSummary>,
    pub distinct_words: usize,
    pub total_words: u64,
    pub rip_acks: usize,
}

/// A dropped word as reported after the run; the word itself can be huge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedWordSummary {
    pub word_len: usize,
    pub lost: u64,
}

impl From<&DroppedWord> for DroppedWordSummary {
    fn from(dropped: &DroppedWord) -> Self {
        Self {
            word_len: dropped.word.len(),
            lost: dropped.lost,
        }
    }
}

/// Counts the words of `document` across the configured workers.
///
/// Returns the final tally in first-seen order together with a summary of
/// the run. Any connect, send or reduce timeout failure aborts the run
/// before termination; the termination broadcast itself never fails.
pub async fn run(config: &DistributorConfig, document: Bytes) -> Result<(Tally, RunReport)> {
    if config.endpoints.is_empty() {
        return Err(Error::General("distributor needs at least one endpoint".into()));
    }

    let mut report = RunReport::default();
    let mut phase = Phase::Dispatching;
    info!(%phase, bytes = document.len(), "starting run");

    let chunks = chunker::split(&document, MAX_CHUNK_BYTES);
    report.chunks = chunks.len();
    let intermediate = SharedTally::default();
    report.map_requests = dispatch(&config.endpoints, &chunks, Arc::clone(&intermediate))
        .instrument(info_span!("map_phase", chunks = chunks.len()))
        .await?;

    phase = phase.advance()?;
    info!(%phase, words = intermediate.lock()?.len(), "map phase complete");
    let outcome = reduce_all(
        &config.endpoints[0],
        &intermediate,
        MAX_MSG_BYTES,
        config.reduce_timeout,
    )
    .instrument(info_span!("reduce_phase", peer = %config.endpoints[0]))
    .await?;
    report.reduce_rounds = outcome.rounds;
    report.dropped = outcome.dropped.iter().map(DroppedWordSummary::from).collect();
    report.distinct_words = outcome.reduced.len();
    report.total_words = outcome.reduced.total();

    phase = phase.advance()?;
    info!(%phase, "reduce phase complete");
    report.rip_acks = terminate(&config.endpoints, config.rip_timeout).await;

    phase = phase.advance()?;
    info!(
        %phase,
        chunks = report.chunks,
        map_requests = report.map_requests,
        reduce_rounds = report.reduce_rounds,
        dropped = report.dropped.len(),
        distinct_words = report.distinct_words,
        total_words = report.total_words,
        "run finished"
    );
    Ok((outcome.reduced, report))
}
