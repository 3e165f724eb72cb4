//! saldo-inference: LLM sloj iza jednog sučelja.
//!
//! Dva backenda: direktni in-process generator i OpenAI-kompatibilan
//! HTTP server s kontinuiranim batchanjem. Ispred njih stoji poštena
//! čekaonica (globalni limit istovremenih generacija + token-bucket po
//! korisniku) i prompt KV cache za dugi, konstantni sistemski prompt.
//!
//! Model NIKAD ne računa iznose: sve što izađe odavde je tekst koji
//! računovođa čita, a brojke u njemu dolaze iz determinističkih engine-a
//! kroz `llm_context`.

pub mod engine;
pub mod prompt_cache;
pub mod queue;

pub use engine::{
    Backend, GenerateRequest, InferenceConfig, InferenceEngine, LocalModel, StreamEvent,
    TemplateModel,
};
pub use prompt_cache::PromptCache;
pub use queue::{QueueConfig, QueueError, QueuePermit, RequestQueue};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    /// Generacija je prekoračila budžet; ne ponavlja se automatski.
    #[error("Generacija je prekoračila vremenski limit od {0} s")]
    Timeout(u64),

    #[error("Inference server je vratio grešku: {0}")]
    Server(String),

    #[error("HTTP greška prema inference serveru: {0}")]
    Http(String),

    #[error("Backend nije inicijaliziran: {0}")]
    Backend(String),

    /// LoRA adapter nije nađen ili nije čitljiv.
    #[error("LoRA adapter nije upotrebljiv: {0}")]
    Adapter(String),
}
