//! Inference engine: direktni backend ili OpenAI-kompatibilan server.
//!
//! Izbor je `auto`: ako server odgovori na `/health` (2 s timeout),
//! server mod s kontinuiranim batchanjem; inače direktni in-process
//! model. Jedno sučelje: `generate` vraća cijeli odgovor, a
//! `generate_stream` kooperativno daje token segmente pa završni
//! `Done` marker. Otkazivanje je eksplicitno — primatelj se ispusti,
//! a KV slot se oslobađa kroz drop čekaoničkog permita.

use crate::prompt_cache::{CachedKvState, PromptCache};
use crate::InferenceError;
use async_trait::async_trait;
use saldo_silicon::{AdaptiveBatchController, BatchConfig, PressureLevel, ThermalState};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

/// Odabir backenda.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Direct,
    Server,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub backend: Backend,
    pub server_url: String,
    pub model: String,
    pub max_tokens: u32,
    /// Niska temperatura — računovodstvo traži točnost, ne kreativnost.
    pub temperature: f32,
    pub health_timeout_secs: u64,
    pub chat_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Auto,
            server_url: "http://127.0.0.1:8080".to_string(),
            model: "Qwen3-235B-A22B-4bit".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            health_timeout_secs: 2,
            chat_timeout_secs: 120,
        }
    }
}

/// Jedan zahtjev za generaciju.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// Segment streama: tokeni pa završni marker.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Token(String),
    Done,
}

/// In-process model za direktni backend. Produkcija veže pravi lokalni
/// runtime; testovi i offline rad koriste `TemplateModel`.
#[async_trait]
pub trait LocalModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> String;
}

/// Deterministički šablonski model: ponavlja grounding kontekst.
/// Nikad ne izmišlja iznose — vraća ono što mu je sustav dao.
pub struct TemplateModel;

#[async_trait]
impl LocalModel for TemplateModel {
    async fn complete(&self, system: &str, prompt: &str, max_tokens: u32) -> String {
        let _ = system;
        let summary: String = prompt.chars().take(max_tokens as usize).collect();
        format!("[offline odgovor] {}", summary)
    }
}

// OpenAI-kompatibilni tipovi za server backend.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Engine s odabranim backendom, prompt cacheom i LoRA slotom.
pub struct InferenceEngine {
    config: InferenceConfig,
    resolved: Backend,
    client: reqwest::Client,
    local_model: Arc<dyn LocalModel>,
    prompt_cache: Arc<PromptCache>,
    batch: AdaptiveBatchController,
    active_adapter: std::sync::Mutex<Option<PathBuf>>,
    generations: AtomicU64,
    timeouts: AtomicU64,
}

impl InferenceEngine {
    /// Inicijaliziraj engine; `Auto` sondira `/health` servera.
    pub async fn initialize(config: InferenceConfig, local_model: Arc<dyn LocalModel>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.chat_timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let resolved = match config.backend {
            Backend::Auto => {
                if Self::server_healthy(&client, &config).await {
                    info!(target: "saldo::inference", "backend: server ({})", config.server_url);
                    Backend::Server
                } else {
                    info!(target: "saldo::inference", "backend: direct (server nedostupan)");
                    Backend::Direct
                }
            }
            explicit => explicit,
        };

        Self {
            config,
            resolved,
            client,
            local_model,
            prompt_cache: Arc::new(PromptCache::new()),
            batch: AdaptiveBatchController::new(BatchConfig::default()),
            active_adapter: std::sync::Mutex::new(None),
            generations: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
        }
    }

    async fn server_healthy(client: &reqwest::Client, config: &InferenceConfig) -> bool {
        let url = format!("{}/health", config.server_url);
        matches!(
            tokio::time::timeout(
                Duration::from_secs(config.health_timeout_secs),
                client.get(&url).send(),
            )
            .await,
            Ok(Ok(resp)) if resp.status().is_success()
        )
    }

    pub fn backend(&self) -> Backend {
        self.resolved
    }

    pub fn prompt_cache(&self) -> &PromptCache {
        &self.prompt_cache
    }

    /// Max tokena skaliran na trenutni pritisak i termiku.
    pub fn effective_max_tokens(&self, pressure: PressureLevel, thermal: ThermalState) -> u32 {
        self.batch
            .compute(pressure, thermal)
            .current_max_tokens
            .min(self.config.max_tokens)
    }

    /// Generiraj cijeli odgovor. Timeout se prijavljuje kao `Timeout` i
    /// NE ponavlja se automatski.
    pub async fn generate(&self, req: &GenerateRequest) -> Result<String, InferenceError> {
        self.generations.fetch_add(1, Ordering::Relaxed);
        let system = req.system_prompt.as_deref().unwrap_or_default();
        let max_tokens = req.max_tokens.unwrap_or(self.config.max_tokens);

        // Sistemski prompt se prefilla jednom i dijeli među korisnicima.
        if !system.is_empty() && self.prompt_cache.get(system).is_none() {
            self.prompt_cache.put(
                system,
                CachedKvState {
                    kv_bytes: Vec::new(),
                    token_count: system.split_whitespace().count(),
                },
            );
        }

        let result = tokio::time::timeout(
            Duration::from_secs(self.config.chat_timeout_secs),
            self.dispatch(system, &req.prompt, max_tokens, req.temperature),
        )
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    target: "saldo::inference",
                    "generacija prekoračila {} s — otkazano",
                    self.config.chat_timeout_secs
                );
                Err(InferenceError::Timeout(self.config.chat_timeout_secs))
            }
        }
    }

    async fn dispatch(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: Option<f32>,
    ) -> Result<String, InferenceError> {
        match self.resolved {
            Backend::Direct => Ok(self.local_model.complete(system, prompt, max_tokens).await),
            Backend::Server => {
                self.server_chat(system, prompt, max_tokens, temperature)
                    .await
            }
            Backend::Auto => Err(InferenceError::Backend(
                "backend nije razriješen — initialize() nije pozvan".to_string(),
            )),
        }
    }

    async fn server_chat(
        &self,
        system: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: Option<f32>,
    ) -> Result<String, InferenceError> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens,
            temperature: temperature.unwrap_or(self.config.temperature),
            stream: false,
        };

        let url = format!("{}/v1/chat/completions", self.config.server_url);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(InferenceError::Server(format!("{}: {}", status, text)));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| InferenceError::Http(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| InferenceError::Server("prazan odgovor servera".to_string()))
    }

    /// Kooperativni stream: token segmenti + `Done`. Otkazivanje =
    /// ispuštanje primatelja; generacijski task tada staje na prvom
    /// neuspjelom `send`.
    pub async fn generate_stream(
        self: &Arc<Self>,
        req: GenerateRequest,
    ) -> ReceiverStream<Result<StreamEvent, InferenceError>> {
        let (tx, rx) = mpsc::channel(32);
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            match engine.generate(&req).await {
                Ok(text) => {
                    for token in split_tokens(&text) {
                        if tx.send(Ok(StreamEvent::Token(token))).await.is_err() {
                            // Primatelj otkazao — prekini bez Done markera.
                            return;
                        }
                    }
                    let _ = tx.send(Ok(StreamEvent::Done)).await;
                }
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    // ── LoRA hot-load ──

    /// Učitaj adapter u hodu. Najviše jedan aktivan; novi zamjenjuje stari.
    pub fn load_lora_adapter(&self, path: &Path) -> Result<(), InferenceError> {
        if !path.exists() {
            return Err(InferenceError::Adapter(format!(
                "datoteka ne postoji: {}",
                path.display()
            )));
        }
        let mut slot = self
            .active_adapter
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(ref old) = *slot {
            info!(target: "saldo::inference", "LoRA {} zamijenjen", old.display());
        }
        *slot = Some(path.to_path_buf());
        info!(target: "saldo::inference", "LoRA učitan: {}", path.display());
        Ok(())
    }

    pub fn unload_lora_adapter(&self) -> bool {
        let mut slot = self
            .active_adapter
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let had = slot.is_some();
        *slot = None;
        had
    }

    pub fn active_adapter(&self) -> Option<PathBuf> {
        self.active_adapter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn stats(&self) -> serde_json::Value {
        json!({
            "backend": self.resolved,
            "model": self.config.model,
            "generations": self.generations.load(Ordering::Relaxed),
            "timeouts": self.timeouts.load(Ordering::Relaxed),
            "prompt_cache": self.prompt_cache.stats(),
            "active_adapter": self.active_adapter().map(|p| p.display().to_string()),
        })
    }
}

/// Podijeli tekst u token segmente za stream (riječ + razmak).
fn split_tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if c.is_whitespace() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    async fn direct_engine() -> Arc<InferenceEngine> {
        let config = InferenceConfig {
            backend: Backend::Direct,
            ..Default::default()
        };
        Arc::new(InferenceEngine::initialize(config, Arc::new(TemplateModel)).await)
    }

    #[tokio::test]
    async fn auto_falls_back_to_direct_without_server() {
        let config = InferenceConfig {
            backend: Backend::Auto,
            server_url: "http://127.0.0.1:1".to_string(),
            health_timeout_secs: 1,
            ..Default::default()
        };
        let engine = InferenceEngine::initialize(config, Arc::new(TemplateModel)).await;
        assert_eq!(engine.backend(), Backend::Direct);
    }

    #[tokio::test]
    async fn direct_generate_and_prompt_cache() {
        let engine = direct_engine().await;
        let req = GenerateRequest {
            prompt: "Koliki je PDV?".to_string(),
            system_prompt: Some("Ti si računovodstveni asistent.".to_string()),
            ..Default::default()
        };

        let out = engine.generate(&req).await.unwrap();
        assert!(out.contains("Koliki je PDV?"));

        // Prvi poziv: miss + punjenje; drugi poziv: hit.
        engine.generate(&req).await.unwrap();
        assert_eq!(engine.prompt_cache().stats()["hits"], 1);
    }

    #[tokio::test]
    async fn stream_yields_tokens_then_done() {
        let engine = direct_engine().await;
        let req = GenerateRequest {
            prompt: "jedan dva tri".to_string(),
            ..Default::default()
        };

        let mut stream = engine.generate_stream(req).await;
        let mut tokens = Vec::new();
        let mut done = false;
        while let Some(event) = stream.next().await {
            match event.unwrap() {
                StreamEvent::Token(t) => tokens.push(t),
                StreamEvent::Done => {
                    done = true;
                    break;
                }
            }
        }
        assert!(done);
        let text: String = tokens.concat();
        assert!(text.contains("jedan dva tri"));
    }

    #[tokio::test]
    async fn lora_hot_load_single_slot() {
        let engine = direct_engine().await;
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.safetensors");
        let b = dir.path().join("b.safetensors");
        std::fs::write(&a, b"lora-a").unwrap();
        std::fs::write(&b, b"lora-b").unwrap();

        assert!(engine
            .load_lora_adapter(&dir.path().join("nema.safetensors"))
            .is_err());

        engine.load_lora_adapter(&a).unwrap();
        engine.load_lora_adapter(&b).unwrap();
        assert_eq!(engine.active_adapter().unwrap(), b);

        assert!(engine.unload_lora_adapter());
        assert!(!engine.unload_lora_adapter());
        assert!(engine.active_adapter().is_none());
    }

    #[test]
    fn split_tokens_preserves_text() {
        let text = "bruto 2.000,00 EUR → neto 1.354,56";
        assert_eq!(split_tokens(text).concat(), text);
    }
}
