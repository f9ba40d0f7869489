//! # Order Ingestion
//!
//! Turns log messages into stored, cached orders. One message is carried all
//! the way through before the next is fetched:
//!
//! ```text
//! fetch → decode → validate → persist → cache → commit
//!           │          │          │
//!           └─ skip ───┘          └─ retry: position not committed,
//!          (commit, never            same message fetched again
//!           retried)
//! ```

pub mod decode;
pub mod pipeline;

pub use decode::{decode_order, DecodeError};
pub use pipeline::{
    CycleOutcome, IngestionPipeline, PipelineConfig, PipelineStats, PipelineStatsSnapshot,
    SkipReason,
};
