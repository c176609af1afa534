//! States of the indexing and query flows.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The state of one document's indexing flow.
///
/// A document moves `Pending → Chunking → Embedding → Storing → Indexed`,
/// or ends in `Failed` from any intermediate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Pending,
    Chunking,
    Embedding,
    Storing,
    Indexed,
    Failed,
}

impl IndexState {
    /// Whether the flow has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, IndexState::Indexed | IndexState::Failed)
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexState::Pending => "pending",
            IndexState::Chunking => "chunking",
            IndexState::Embedding => "embedding",
            IndexState::Storing => "storing",
            IndexState::Indexed => "indexed",
            IndexState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// The state of one query flow.
///
/// A query moves `Received → Retrieving → Augmenting → Generating → Answered`
/// linearly, or ends in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryState {
    Received,
    Retrieving,
    Augmenting,
    Generating,
    Answered,
    Failed,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryState::Received => "received",
            QueryState::Retrieving => "retrieving",
            QueryState::Augmenting => "augmenting",
            QueryState::Generating => "generating",
            QueryState::Answered => "answered",
            QueryState::Failed => "failed",
        };
        f.write_str(name)
    }
}
