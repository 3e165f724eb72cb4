//! Chat tok: overseer → router → executor → LLM s groundingom.
//!
//! Politika dispatcha: confidence > 0.6 izvrši modul i ubaci njegov
//! `llm_context` u prompt; 0.4–0.6 samo natukne modul; inače čisti chat
//! s RAG kontekstom. Pad modula NE blokira razgovor — odgovor se
//! degradira na RAG-only uz upozorenje "modul X nije uspio".

use crate::services::Services;
use saldo_core::{dispatch_decision, DispatchDecision};
use saldo_inference::{GenerateRequest, QueueError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Dugi konstantni sistemski prompt — KV mu se kešira po SHA-256.
const SYSTEM_PROMPT: &str = "Ti si Saldo, privatni računovodstveni asistent za hrvatske propise. \
     Odgovaraš na hrvatskom, kratko i točno. Iznose NIKAD ne računaš sam: \
     prepričavaš isključivo brojke iz priloženog konteksta modula. Svako \
     knjiženje zahtijeva odobrenje računovođe — to nikad ne obećavaš \
     zaobići. Kad nemaš podatak, kažeš da ga nemaš.";

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub has_file: bool,
    /// Strukturirani ulaz za modul (npr. stavke PDV obračuna).
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module_payload: Option<Value>,
    pub warnings: Vec<String>,
    pub citations: Vec<String>,
    pub blocked: bool,
}

pub async fn handle_chat(services: &Services, req: ChatRequest) -> ChatResponse {
    let user_id = if req.user_id.is_empty() {
        "anonimni"
    } else {
        &req.user_id
    };

    // 1. Tvrde granice prije svega.
    let verdict = services.overseer.evaluate(&req.message);
    if !verdict.approved {
        return ChatResponse {
            response: verdict.reason.clone(),
            module: None,
            module_summary: None,
            module_payload: None,
            warnings: vec!["Zahtjev blokiran sigurnosnim pravilima".to_string()],
            citations: Vec::new(),
            blocked: true,
        };
    }

    // 2. Deterministički router.
    let route = services.router.route(&req.message, req.has_file);
    let decision = dispatch_decision(&route);
    info!(
        target: "saldo::gateway",
        "router: {} ({:.2}) → {:?}",
        route.module, route.confidence, decision
    );

    // 3. Izvršenje modula prema politici.
    let mut warnings = Vec::new();
    let mut grounding = String::new();
    let mut module = None;
    let mut module_summary = None;
    let mut module_payload = None;

    match decision {
        DispatchDecision::Execute => {
            let result = services.executor.execute(
                &route.module,
                &route.sub_intent,
                &req.data,
                &req.client_id,
                user_id,
            );
            if result.success {
                grounding.push_str(&result.llm_context);
                grounding.push_str(
                    "\n[Pipeline: svaki prijedlog knjiženja čeka odobrenje računovođe.]",
                );
                module = Some(result.module.clone());
                module_summary = Some(result.summary.clone());
                module_payload = Some(result.payload.clone());
            } else {
                // Modul pao: chat nastavlja s RAG kontekstom.
                warn!(
                    target: "saldo::gateway",
                    "modul {} nije uspio: {:?}",
                    route.module, result.errors
                );
                warnings.push(format!("Modul {} nije uspio", route.module));
            }
        }
        DispatchDecision::Hint => {
            grounding.push_str(&format!(
                "[Moguće je da se pitanje odnosi na modul '{}' — ne izvršavaj ga bez potvrde.]",
                route.module
            ));
        }
        DispatchDecision::ChatOnly => {}
    }

    // 4. RAG kontekst uvijek ide u prompt.
    let citations = match services.rag.answer(&req.message, None, false) {
        Ok(answer) => {
            if !answer.citations.is_empty() {
                grounding.push_str("\n[Pravni kontekst: ");
                grounding.push_str(&answer.answer);
                grounding.push(']');
            }
            answer.citations
        }
        Err(e) => {
            warn!(target: "saldo::gateway", "RAG pretraga nije uspjela: {}", e);
            Vec::new()
        }
    };

    // 5. Čekaonica: prelijevanje je poruka korisniku, ne iznimka.
    let _permit = match services.queue.submit(user_id) {
        Ok(permit) => permit,
        Err(e @ (QueueError::RateLimited { .. } | QueueError::QueueFull)) => {
            return ChatResponse {
                response: e.to_string(),
                module,
                module_summary,
                module_payload,
                warnings,
                citations,
                blocked: false,
            }
        }
    };

    // 6. Generacija s groundingom.
    let prompt = if grounding.is_empty() {
        req.message.clone()
    } else {
        format!("{}\n\nKontekst sustava:\n{}", req.message, grounding)
    };
    let response = match services
        .engine
        .generate(&GenerateRequest {
            prompt,
            system_prompt: Some(SYSTEM_PROMPT.to_string()),
            ..Default::default()
        })
        .await
    {
        Ok(text) => text,
        Err(e) => {
            warnings.push(format!("LLM nije odgovorio: {}", e));
            // Modulov sažetak je i dalje upotrebljiv odgovor.
            module_summary
                .clone()
                .unwrap_or_else(|| "Sustav trenutno ne može generirati odgovor.".to_string())
        }
    };

    // 7. Epizodna memorija pamti današnji razgovor.
    if let Err(e) = services
        .memory
        .record_episode(user_id, &req.session_id, &req.message, &response)
    {
        warn!(target: "saldo::gateway", "epizoda nije zapisana: {}", e);
    }

    ChatResponse {
        response,
        module,
        module_summary,
        module_payload,
        warnings,
        citations,
        blocked: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saldo_core::CoreConfig;

    async fn services(dir: &tempfile::TempDir) -> Services {
        let mut config = CoreConfig::default();
        config.data_dir = dir.path().join("data");
        config.backups_dir = dir.path().join("data/backups");
        // Nepostojeći port: backend pada na direct (offline).
        config.inference_port = 1;
        Services::build(config).await.unwrap()
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            user_id: "ana".to_string(),
            session_id: "s1".to_string(),
            client_id: "c1".to_string(),
            has_file: false,
            data: Value::Null,
        }
    }

    #[tokio::test]
    async fn blocked_by_overseer() {
        let dir = tempfile::tempdir().unwrap();
        let s = services(&dir).await;
        let resp = handle_chat(&s, request("automatski proknjiži sve račune")).await;
        assert!(resp.blocked);
        assert!(resp.response.contains("odobrenje"));
    }

    #[tokio::test]
    async fn module_grounds_response() {
        let dir = tempfile::tempdir().unwrap();
        let s = services(&dir).await;
        let mut req = request("obračun plaće za Anu");
        req.data = serde_json::json!({ "name": "Ana", "bruto": 2000.0, "city": "Zagreb" });

        let resp = handle_chat(&s, req).await;
        assert!(!resp.blocked);
        assert_eq!(resp.module.as_deref(), Some("payroll"));
        // Offline TemplateModel vraća grounding — u njemu je neto iz engine-a.
        assert!(resp.response.contains("1354.56"));
    }

    #[tokio::test]
    async fn failed_module_degrades_to_chat() {
        let dir = tempfile::tempdir().unwrap();
        let s = services(&dir).await;
        // Payroll bez podataka: modul pada, razgovor ide dalje.
        let resp = handle_chat(&s, request("obračun plaće za Anu")).await;
        assert!(!resp.blocked);
        assert!(resp.module.is_none());
        assert!(resp.warnings.iter().any(|w| w.contains("payroll")));
        assert!(!resp.response.is_empty());
    }

    #[tokio::test]
    async fn episodic_memory_records_turn() {
        let dir = tempfile::tempdir().unwrap();
        let s = services(&dir).await;
        handle_chat(&s, request("koja je stopa PDV-a za knjige")).await;
        let hits = s.memory.search_today("stopa PDV").unwrap();
        assert_eq!(hits.len(), 1);
    }
}
