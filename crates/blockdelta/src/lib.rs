//! Delta-graph engine for OS image updates.
//!
//! Given a dependency graph of install operations (REPLACE, REPLACE_BZ, MOVE, BSDIFF)
//! over disk blocks, this crate breaks the read/write dependency cycles that in-place
//! block reuse creates, allocates scratch space to resolve the cuts (demoting to full
//! operations when scratch runs out), and produces a topologically ordered, cycle-free
//! operation sequence ready for payload serialization.
//!
//! The whole pipeline is a single-threaded, synchronous batch computation; see
//! [`pipeline::convert_graph_to_dag`] for the entry point.

pub use blockdelta_graphlib as graphlib;

pub mod blocks;
pub mod cut_edges;
pub mod cycle_breaker;
pub mod error;
pub mod order;
pub mod pipeline;
pub mod scratch;

pub use crate::blocks::Block;
pub use crate::cut_edges::CutEdgeVertexes;
pub use crate::cycle_breaker::CycleBreaker;
pub use crate::error::{Error, Result};
pub use crate::pipeline::{DagResult, DagSummary, OperationRegenerator, convert_graph_to_dag};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
