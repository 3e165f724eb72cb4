//! Saldo gateway: HTTP ulaz za 15 korisnika ureda.
//!
//! Sve rute rade nad jednim `Services` zapisom sastavljenim pri
//! pokretanju. Transport je namjerno tanak — poslovna logika živi u
//! crates/ slojevima, ovdje se samo prevodi HTTP ↔ domena.

mod chat;
mod services;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chat::{handle_chat, ChatRequest};
use saldo_core::{
    BookingProposal, CoreConfig, Corrections, ErpTarget, ExportFormat, PipelineError,
};
use serde::Deserialize;
use serde_json::json;
use services::Services;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info,saldo=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match CoreConfig::load(std::path::Path::new("config.json")) {
        Ok(c) => c,
        Err(e) => {
            // Neispravna konfiguracija je fatalna — service manager restarta.
            eprintln!("Konfiguracija nije čitljiva: {}", e);
            std::process::exit(1);
        }
    };
    let port = config.http_port;

    let services = match Services::build(config).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Pokretanje nije uspjelo: {}", e);
            std::process::exit(1);
        }
    };

    // Noćni scheduler u pozadini.
    let scheduler = Arc::clone(&services.scheduler);
    tokio::spawn(async move {
        scheduler.run(None).await;
    });

    let app = build_app(services);
    let addr = format!("0.0.0.0:{}", port);
    info!(target: "saldo::gateway", "Saldo sluša na {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Port {} nije dostupan: {}", port, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server zaustavljen: {}", e);
    }
}

fn build_app(services: Services) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/chat", post(chat_endpoint))
        .route("/api/pipeline/pending", get(pending))
        .route("/api/pipeline/submit", post(submit))
        .route("/api/pipeline/:id/approve", post(approve))
        .route("/api/pipeline/:id/correct", post(correct))
        .route("/api/pipeline/:id/reject", post(reject))
        .route("/api/pipeline/export", post(export))
        .route("/api/rag/query", post(rag_query))
        .route("/api/vault/verify", get(vault_verify))
        .route("/api/vault/swap", post(vault_swap))
        .route("/api/stats", get(stats))
        .layer(CorsLayer::permissive())
        .with_state(services)
}

async fn health(State(services): State<Services>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "silicon": services.silicon.health_check(),
        "inference": services.engine.stats(),
        "queue_slots": services.queue.available_slots(),
    }))
}

async fn chat_endpoint(
    State(services): State<Services>,
    Json(req): Json<ChatRequest>,
) -> Json<chat::ChatResponse> {
    Json(handle_chat(&services, req).await)
}

#[derive(Deserialize)]
struct ClientFilter {
    #[serde(default)]
    client_id: Option<String>,
}

async fn pending(
    State(services): State<Services>,
    Query(filter): Query<ClientFilter>,
) -> Json<serde_json::Value> {
    let pending = services.pipeline.get_pending(filter.client_id.as_deref());
    Json(json!({ "count": pending.len(), "proposals": pending }))
}

async fn submit(
    State(services): State<Services>,
    Json(proposal): Json<BookingProposal>,
) -> Response {
    match services.pipeline.submit(proposal) {
        Ok(receipt) => Json(receipt).into_response(),
        Err(e) => pipeline_error(e),
    }
}

#[derive(Deserialize)]
struct UserAction {
    user_id: String,
    #[serde(default)]
    reason: String,
}

async fn approve(
    State(services): State<Services>,
    Path(id): Path<String>,
    Json(action): Json<UserAction>,
) -> Response {
    match services.pipeline.approve(&id, &action.user_id) {
        Ok(()) => Json(json!({ "id": id, "status": "approved" })).into_response(),
        Err(e) => pipeline_error(e),
    }
}

#[derive(Deserialize)]
struct CorrectBody {
    user_id: String,
    corrections: Corrections,
}

async fn correct(
    State(services): State<Services>,
    Path(id): Path<String>,
    Json(body): Json<CorrectBody>,
) -> Response {
    match services.pipeline.correct(&id, &body.user_id, body.corrections) {
        Ok(record) => Json(json!({
            "id": id,
            "status": "corrected",
            "correction_record": record,
            "note": "Ispravak spremljen za noćni DPO trening",
        }))
        .into_response(),
        Err(e) => pipeline_error(e),
    }
}

async fn reject(
    State(services): State<Services>,
    Path(id): Path<String>,
    Json(action): Json<UserAction>,
) -> Response {
    match services.pipeline.reject(&id, &action.user_id, &action.reason) {
        Ok(()) => Json(json!({ "id": id, "status": "rejected" })).into_response(),
        Err(e) => pipeline_error(e),
    }
}

#[derive(Deserialize)]
struct ExportBody {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    erp_target: Option<ErpTarget>,
    format: ExportFormat,
}

async fn export(State(services): State<Services>, Json(body): Json<ExportBody>) -> Response {
    match services
        .pipeline
        .export_approved(body.client_id.as_deref(), body.erp_target, body.format)
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => pipeline_error(e),
    }
}

#[derive(Deserialize)]
struct RagQuery {
    query: String,
    #[serde(default)]
    event_date: Option<String>,
    #[serde(default)]
    include_expired: bool,
}

async fn rag_query(State(services): State<Services>, Json(body): Json<RagQuery>) -> Response {
    let event_date = body
        .event_date
        .as_deref()
        .and_then(|d| chrono::NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    match services
        .rag
        .answer(&body.query, event_date, body.include_expired)
    {
        Ok(answer) => Json(answer).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

/// Administratorska provjera integriteta znanja: manifest + verifikacija.
async fn vault_verify(State(services): State<Services>) -> Response {
    let vault = services.vault.lock().await;
    match vault.create_manifest().and_then(|m| {
        let (ok, mismatches) = vault.verify_manifest(&m)?;
        Ok(json!({
            "manifest_id": m.manifest_id,
            "files": m.total_files,
            "ok": ok,
            "mismatches": mismatches,
        }))
    }) {
        Ok(body) => Json(body).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct SwapBody {
    old_model: String,
    new_model: String,
}

/// Sigurna zamjena modela (10 faza, rollback na grešku). Dugotrajna
/// operacija — drži vault lock dok traje.
async fn vault_swap(State(services): State<Services>, Json(body): Json<SwapBody>) -> Response {
    let mut vault = services.vault.lock().await;
    let log = vault
        .safe_swap(&body.old_model, &body.new_model, None, None, None)
        .await;
    Json(serde_json::to_value(&log).unwrap_or_default()).into_response()
}

async fn stats(State(services): State<Services>) -> Json<serde_json::Value> {
    let module_stats: HashMap<String, serde_json::Value> = HashMap::from([
        ("pipeline".to_string(), serde_json::to_value(services.pipeline.stats()).unwrap_or_default()),
        ("executor".to_string(), services.executor.stats()),
        ("inference".to_string(), services.engine.stats()),
    ]);
    Json(json!(module_stats))
}

/// Mapiranje domenske greške na HTTP status s hrvatskom porukom.
fn pipeline_error(e: PipelineError) -> Response {
    let status = match e {
        PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::InvalidProposal(_) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::NothingToExport => StatusCode::CONFLICT,
        PipelineError::ExportFailed(_) | PipelineError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use saldo_core::{BookingLine, DocumentType};

    async fn test_services(dir: &tempfile::TempDir) -> Services {
        let mut config = CoreConfig::default();
        config.data_dir = dir.path().join("data");
        config.backups_dir = dir.path().join("data/backups");
        config.inference_port = 1;
        Services::build(config).await.unwrap()
    }

    fn proposal() -> BookingProposal {
        let mut p = BookingProposal::new("c1", DocumentType::UlazniRacun);
        p.lines = vec![
            BookingLine::duguje("4010", 100.0, "Trošak"),
            BookingLine::potrazuje("2200", 100.0, "Obveza"),
        ];
        p.ukupni_iznos = 100.0;
        p
    }

    #[tokio::test]
    async fn full_pipeline_through_services() {
        let dir = tempfile::tempdir().unwrap();
        let s = test_services(&dir).await;

        let receipt = s.pipeline.submit(proposal()).unwrap();
        assert!(receipt.requires_approval);

        s.pipeline.approve(&receipt.id, "ana").unwrap();
        let result = s
            .pipeline
            .export_approved(None, None, ExportFormat::Xml)
            .await
            .unwrap();
        assert_eq!(result.proposals_exported, 1);
        assert!(result.file.exists());

        // Audit trag u SQLite-u.
        let history = s.storage.status_history(&receipt.id).unwrap();
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn correction_feeds_memory_through_services() {
        let dir = tempfile::tempdir().unwrap();
        let s = test_services(&dir).await;
        let receipt = s.pipeline.submit(proposal()).unwrap();

        let corrections = Corrections {
            lines: Some(vec![
                BookingLine::duguje("4120", 100.0, "Usluge"),
                BookingLine::potrazuje("2200", 100.0, "Obveza"),
            ]),
            ..Default::default()
        };
        s.pipeline.correct(&receipt.id, "ana", corrections).unwrap();

        // L3 preferencijski par je nastao iz ispravka.
        assert_eq!(s.memory.unused_preference_count().unwrap(), 1);
    }
}
