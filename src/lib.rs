pub mod chunker;
pub mod distributor;
pub mod error;
pub mod tally;
pub mod tracer;
pub mod transport;
pub mod wire;
pub mod worker;

pub use error::{Error, Result};
