//! Engine configuration.

use mapmend_sparql::GraphNames;
use serde::{Deserialize, Serialize};

/// Configuration injected into [`crate::ConsensusEngine`] at construction.
///
/// The threshold is copied onto each proposal row at creation time;
/// promotion always compares against the captured value, so changing the
/// configuration never retroactively affects existing proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upvotes required before a proposal auto-merges.
    pub approval_threshold: u32,
    /// Default page size for ledger listings.
    pub page_size: usize,
    /// Named graphs and IRI bases for compiled statements.
    pub graphs: GraphNames,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            approval_threshold: 5,
            page_size: 10,
            graphs: GraphNames::default(),
        }
    }
}
