//! Cataloguing runs over a tree of decks.
//!
//! [`DeckWalker`] finds decks, the PPTX extractor pulls out background-sized
//! pictures, and [`DedupEngine`] fingerprints each one, saving the first copy
//! of every image and recording later occurrences as duplicates.
//! [`Cataloguer`] ties the three together for a whole source directory.

pub mod dedup;
pub mod pipeline;
pub mod walker;

pub use dedup::{DedupEngine, EngineConfig};
pub use pipeline::{Cataloguer, RunSummary};
pub use walker::DeckWalker;
