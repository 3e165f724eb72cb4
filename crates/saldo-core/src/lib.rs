//! saldo-core: okosnica privatnog računovodstvenog asistenta.
//!
//! Sve što modul proizvede normalizira se u `BookingProposal` i prolazi
//! kroz `BookingPipeline` s obveznim ljudskim odobrenjem prije ERP
//! exporta. Router i executor usmjeravaju korisničke zahtjeve na ~45
//! domenskih modula; četveroslojna memorija uči iz ispravaka; overseer
//! drži tvrde sigurnosne granice. Nijedan iznos na odobrenom knjiženju
//! ne dolazi iz modela — samo iz determinističkih engine-a.

mod config;
mod erp;
mod error;
mod executor;
mod memory;
mod overseer;
mod pipeline;
mod router;
mod scheduler;
mod storage;
mod types;

/// Validacija OIB-a i IBAN-a živi uz parsere dokumenata; ovdje je
/// re-exportana jer je treba i pipeline.
pub use saldo_docs::oib;

pub use config::CoreConfig;
pub use erp::{flatten_proposal, ExportFormat, ExportRecord};
pub use error::{ConfigError, MemoryError, PipelineError};
pub use executor::{ModuleExecutor, ModuleResult, L2_OVERRIDE_CONFIDENCE};
pub use memory::{
    Episode, MemorySystem, PreferencePair, SemanticRule, WorkingContext, DPO_EXPORT_THRESHOLD,
};
pub use overseer::{AccountingOverseer, BoundaryCategory, OverseerVerdict};
pub use pipeline::{
    BankTx, BookingPipeline, ExportResult, InvoiceData, PipelineStats,
};
pub use router::{dispatch_decision, DispatchDecision, IntentRouter, Route, MODULES};
pub use scheduler::{NightlyReport, NightlyScheduler, TrainFn, BACKUPS_TO_KEEP};
pub use storage::SqliteStorage;
pub use types::{
    new_id, BookingLine, BookingProposal, BookingStatus, CorrectionRecord, Corrections,
    DocumentType, ErpTarget, Strana, SubmitReceipt,
};
