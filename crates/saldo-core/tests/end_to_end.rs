//! End-to-end tok: modul → prijedlog → odobrenje/ispravak → export,
//! s memorijom koja uči iz ispravaka.

use saldo_core::{
    BookingLine, BookingPipeline, BookingStatus, Corrections, DocumentType, ErpTarget,
    ExportFormat, IntentRouter, MemorySystem, ModuleExecutor, SqliteStorage, dispatch_decision,
    DispatchDecision,
};
use saldo_engines::payroll::{Employee, PayrollEngine};
use saldo_rag::LawStore;
use serde_json::json;
use std::sync::Arc;

struct World {
    _dir: tempfile::TempDir,
    pipeline: Arc<BookingPipeline>,
    memory: Arc<MemorySystem>,
    executor: ModuleExecutor,
    storage: Arc<SqliteStorage>,
}

fn world() -> World {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(SqliteStorage::new(dir.path().join("saldo.db")).unwrap());
    let memory = Arc::new(MemorySystem::open(dir.path().join("memory.db")).unwrap());
    let pipeline = Arc::new(
        BookingPipeline::new(dir.path().join("exports"))
            .with_storage(Arc::clone(&storage))
            .with_memory(Arc::clone(&memory)),
    );
    let rag = Arc::new(LawStore::open(&dir.path().join("rag")).unwrap());
    let executor = ModuleExecutor::new(Arc::clone(&pipeline), Arc::clone(&memory), rag);
    World {
        _dir: dir,
        pipeline,
        memory,
        executor,
        storage,
    }
}

#[tokio::test]
async fn payroll_to_erp_export() {
    let w = world();

    // Engine računa, pipeline raspoređuje na konta.
    let engine = PayrollEngine::new();
    let r = engine.calculate_za_datum(
        &Employee::new("Ana Horvat", 2000.0, "Zagreb"),
        chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
    );
    assert_eq!(r.neto_placa, 1354.56);

    let proposal = BookingPipeline::from_payroll(&r, "klijent-1", ErpTarget::Cpp);
    assert!(proposal.is_balanced());

    let receipt = w.pipeline.submit(proposal).unwrap();
    assert!(receipt.requires_approval);

    w.pipeline.approve(&receipt.id, "racunovodja").unwrap();
    let export = w
        .pipeline
        .export_approved(Some("klijent-1"), None, ExportFormat::Xml)
        .await
        .unwrap();
    assert_eq!(export.proposals_exported, 1);

    let xml = std::fs::read_to_string(&export.file).unwrap();
    assert!(xml.contains("<CPPImport>"));
    assert!(xml.contains("<Iznos>1354.56</Iznos>"));

    // Status je jednosmjeran; audit trag u SQLite-u.
    assert_eq!(
        w.pipeline.get(&receipt.id).unwrap().status,
        BookingStatus::Exported
    );
    let history = w.storage.status_history(&receipt.id).unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn correction_teaches_l2_and_next_proposal_uses_it() {
    let w = world();

    let mut proposal = saldo_core::BookingProposal::new("klijent-1", DocumentType::UlazniRacun);
    let mut line = BookingLine::duguje("4800", 500.0, "Trošak");
    line.oib = "12345678903".to_string();
    proposal.lines = vec![line, BookingLine::potrazuje("2200", 500.0, "Obveza")];
    proposal.ukupni_iznos = 500.0;
    let receipt = w.pipeline.submit(proposal).unwrap();

    // Računovođa ispravlja konto: 4800 → 4125. Jedan ispravak = L2
    // pravilo s pouzdanošću 0.6 (ispod praga za override).
    let mut corrected = BookingLine::duguje("4125", 500.0, "Telekomunikacije");
    corrected.oib = "12345678903".to_string();
    w.pipeline
        .correct(
            &receipt.id,
            "racunovodja",
            Corrections {
                lines: Some(vec![
                    corrected,
                    BookingLine::potrazuje("2200", 500.0, "Obveza"),
                ]),
                reason: Some("telefon ide na 4125".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    let rule = w
        .memory
        .semantic_hint("klijent-1", "12345678903", "ulazni_racun")
        .unwrap()
        .unwrap();
    assert_eq!(rule.konto, "4125");
    assert_eq!(rule.confidence, 0.6);
    assert_eq!(w.memory.unused_preference_count().unwrap(), 1);

    // Ponovljene potvrde dižu pouzdanost do override praga.
    for _ in 0..4 {
        w.memory
            .learn_rule("klijent-1", "12345678903", "ulazni_racun", "4125")
            .unwrap();
    }
    let result = w.executor.execute(
        "kontiranje",
        "suggest",
        &json!({ "opis": "nabava materijala", "oib": "12345678903" }),
        "klijent-1",
        "racunovodja",
    );
    assert_eq!(result.payload["suggested_konto"], "4125");
    assert_eq!(result.payload["source"], "l2_semantic_memory");
}

#[test]
fn depreciation_laptop_lifecycle_through_executor() {
    let w = world();

    let added = w.executor.execute(
        "osnovna_sredstva",
        "add",
        &json!({ "naziv": "Laptop", "nabavna_vrijednost": 2000.0, "vrsta": "racunalna_oprema" }),
        "klijent-1",
        "ana",
    );
    assert!(added.success);
    assert_eq!(added.payload["mjesecna_amortizacija"], 83.33);

    // 24 mjeseca iscrpe sredstvo; 25. poziv nema stavke.
    for mjesec in 1..=24 {
        let r = w.executor.execute("amortizacija", "", &json!({}), "klijent-1", "ana");
        assert!(r.success, "mjesec {}", mjesec);
        assert_eq!(r.payload.as_array().unwrap().len(), 1, "mjesec {}", mjesec);
    }
    let r = w.executor.execute("amortizacija", "", &json!({}), "klijent-1", "ana");
    assert!(r.payload.as_array().unwrap().is_empty());
}

#[test]
fn router_executor_contract_for_text_commands() {
    let w = world();
    let router = IntentRouter::new();

    let route = router.route("napravi PDV prijavu", false);
    assert_eq!(route.module, "pdv_prijava");
    assert_eq!(dispatch_decision(&route), DispatchDecision::Execute);

    // Executor s routerovim modulom i praznim podacima: kontrolirana
    // greška, nikad panika.
    let result = w.executor.execute(&route.module, &route.sub_intent, &json!({}), "c1", "ana");
    assert!(!result.success);
    assert!(!result.errors.is_empty());
}

#[tokio::test]
async fn concurrent_approvals_single_winner() {
    let w = world();
    let mut p = saldo_core::BookingProposal::new("c1", DocumentType::UlazniRacun);
    p.lines = vec![
        BookingLine::duguje("4010", 10.0, ""),
        BookingLine::potrazuje("2200", 10.0, ""),
    ];
    let id = w.pipeline.submit(p).unwrap().id;

    let mut handles = Vec::new();
    for i in 0..8 {
        let pipeline = Arc::clone(&w.pipeline);
        let id = id.clone();
        handles.push(tokio::spawn(async move {
            pipeline.approve(&id, &format!("user{}", i)).is_ok()
        }));
    }
    let mut wins = 0;
    for h in handles {
        if h.await.unwrap() {
            wins += 1;
        }
    }
    assert_eq!(wins, 1, "točno jedno odobrenje smije uspjeti");
}
