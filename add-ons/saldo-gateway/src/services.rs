//! Services: eksplicitni zapis svih suradnika, konstruiran jednom pri
//! pokretanju i provučen kroz svaki handler. Nema globalnog mutabilnog
//! stanja — što ovdje nije uvezano, ne postoji.

use saldo_core::{
    AccountingOverseer, BookingPipeline, CoreConfig, IntentRouter, MemorySystem, ModuleExecutor,
    NightlyScheduler, SqliteStorage,
};
use saldo_inference::{
    Backend, InferenceConfig, InferenceEngine, QueueConfig, RequestQueue, TemplateModel,
};
use saldo_rag::{LawDownloader, LawStore};
use saldo_silicon::{KnowledgeVault, SiliconRuntime};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct Services {
    pub config: Arc<CoreConfig>,
    pub pipeline: Arc<BookingPipeline>,
    pub storage: Arc<SqliteStorage>,
    pub memory: Arc<MemorySystem>,
    pub router: Arc<IntentRouter>,
    pub executor: Arc<ModuleExecutor>,
    pub overseer: Arc<AccountingOverseer>,
    pub rag: Arc<LawStore>,
    pub engine: Arc<InferenceEngine>,
    pub queue: Arc<RequestQueue>,
    pub silicon: Arc<SiliconRuntime>,
    pub vault: Arc<tokio::sync::Mutex<KnowledgeVault>>,
    pub scheduler: Arc<NightlyScheduler>,
}

impl Services {
    /// Sastavi sve podsustave. Svaka komponenta koja nedostaje je
    /// greška pokretanja, ne runtime fallback.
    pub async fn build(config: CoreConfig) -> Result<Self, String> {
        let storage = Arc::new(
            SqliteStorage::new(config.audit_db_path()).map_err(|e| format!("audit baza: {}", e))?,
        );
        let memory = Arc::new(
            MemorySystem::open(config.memory_db_path())
                .map_err(|e| format!("memorijska baza: {}", e))?,
        );
        let pipeline = Arc::new(
            BookingPipeline::new(config.exports_dir())
                .with_storage(Arc::clone(&storage))
                .with_memory(Arc::clone(&memory)),
        );
        let rag = Arc::new(
            LawStore::open(&config.rag_db_path()).map_err(|e| format!("RAG korpus: {}", e))?,
        );

        // Korpus se puni iz kataloga pri prvom startu (offline kostur).
        let downloader = LawDownloader::new(config.laws_dir());
        if let Err(e) = downloader.download_all(1, &|_| None) {
            info!(target: "saldo::gateway", "inicijalni download zakona preskočen: {}", e);
        }

        let executor = Arc::new(ModuleExecutor::new(
            Arc::clone(&pipeline),
            Arc::clone(&memory),
            Arc::clone(&rag),
        ));

        let engine = Arc::new(
            InferenceEngine::initialize(
                InferenceConfig {
                    backend: Backend::Auto,
                    server_url: format!("http://127.0.0.1:{}", config.inference_port),
                    ..Default::default()
                },
                Arc::new(TemplateModel),
            )
            .await,
        );
        let queue = Arc::new(RequestQueue::new(QueueConfig {
            max_concurrent: config.llm_max_concurrent,
            max_per_minute: config.llm_max_per_minute,
        }));

        let silicon = Arc::new(SiliconRuntime::initialize());
        let vault = Arc::new(tokio::sync::Mutex::new(
            KnowledgeVault::open(config.vault_base_dir())
                .map_err(|e| format!("knowledge vault: {}", e))?,
        ));
        let scheduler = Arc::new(NightlyScheduler::new(config.clone(), Arc::clone(&memory)));

        info!(target: "saldo::gateway", "svi podsustavi uvezani");
        Ok(Self {
            config: Arc::new(config),
            pipeline,
            storage,
            memory,
            router: Arc::new(IntentRouter::new()),
            executor,
            overseer: Arc::new(AccountingOverseer::new()),
            rag,
            engine,
            queue,
            silicon,
            vault,
            scheduler,
        })
    }
}
