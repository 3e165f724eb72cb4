//! saldo-rag: vremenski svjestan pravni korpus.
//!
//! Svaki odlomak zakona nosi `valid_from`/`valid_to`; upit s datumom
//! ekonomskog događaja vraća verziju propisa koja je TADA bila na
//! snazi. RAG nikad ne izmišlja brojke ni datume — citati su doslovni
//! nizovi iz korpusa.

pub mod catalogue;
pub mod nn_monitor;
pub mod store;

pub use catalogue::{LawDownloader, LawSource, LAW_CATALOG};
pub use nn_monitor::{NNArticle, NNCheckResult, NNMonitor};
pub use store::{LawCategory, LawChunk, LawStore, RagAnswer, ScoredChunk};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Greška korpusa: {0}")]
    Store(#[from] sled::Error),

    #[error("Zapis korpusa nije čitljiv: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Datoteka zakona nije čitljiva: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dohvat s mreže nije uspio: {0}")]
    Fetch(String),
}
