//! Booking pipeline: modul → prijedlog → odobrenje → export.
//!
//! Ovo je kostur cijelog sustava. Svaki modul proizvodi
//! `BookingProposal`; pipeline ga drži kao `pending`, čeka odluku
//! računovođe i tek onda exporta u ERP. Korak odobrenja se NIKAD ne
//! preskače.
//!
//! Konkurentnost: prijelazi statusa su serijalizirani po prijedlogu
//! (DashMap entry lock) — od dva istovremena odobrenja uspijeva najviše
//! jedno. Export drži globalni async mutex pa dva istovremena exporta
//! vide disjunktne skupove.

use crate::erp::{self, ExportFormat, ExportRecord};
use crate::error::PipelineError;
use crate::memory::MemorySystem;
use crate::storage::SqliteStorage;
use crate::types::{
    BookingLine, BookingProposal, BookingStatus, CorrectionRecord, Corrections, DocumentType,
    ErpTarget, Strana, SubmitReceipt,
};
use chrono::Utc;
use dashmap::DashMap;
use saldo_engines::payroll::PayrollResult;
use saldo_engines::round2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Rezultat exporta: jedna datoteka + popis izvezenih prijedloga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub erp: ErpTarget,
    pub format: ExportFormat,
    pub file: PathBuf,
    pub proposals_exported: usize,
    pub booking_lines: usize,
    pub warnings: Vec<String>,
}

/// Brojčano stanje pipeline-a.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    pub received: u64,
    pub approved: u64,
    pub corrected: u64,
    pub rejected: u64,
    pub exported: u64,
    pub errors: u64,
    pub pending: usize,
    pub approved_waiting: usize,
}

pub struct BookingPipeline {
    proposals: DashMap<String, BookingProposal>,
    export_lock: tokio::sync::Mutex<()>,
    export_dir: PathBuf,
    storage: Option<Arc<SqliteStorage>>,
    memory: Option<Arc<MemorySystem>>,
    received: AtomicU64,
    approved: AtomicU64,
    corrected: AtomicU64,
    rejected: AtomicU64,
    exported: AtomicU64,
    errors: AtomicU64,
}

impl BookingPipeline {
    pub fn new(export_dir: PathBuf) -> Self {
        info!(target: "saldo::pipeline", "BookingPipeline inicijaliziran");
        Self {
            proposals: DashMap::new(),
            export_lock: tokio::sync::Mutex::new(()),
            export_dir,
            storage: None,
            memory: None,
            received: AtomicU64::new(0),
            approved: AtomicU64::new(0),
            corrected: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            exported: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    /// Spoji SQLite trajni sloj (prijedlozi + audit trag).
    pub fn with_storage(mut self, storage: Arc<SqliteStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Spoji memorijski sustav — ispravci hrane L2 i L3.
    pub fn with_memory(mut self, memory: Arc<MemorySystem>) -> Self {
        self.memory = Some(memory);
        self
    }

    // ── 1. PRIMI PRIJEDLOG ──

    /// Primi prijedlog od modula, spremi ga kao `pending`.
    /// Neuravnotežen prijedlog ili prijedlog bez stavki je odbijen.
    pub fn submit(&self, mut proposal: BookingProposal) -> Result<SubmitReceipt, PipelineError> {
        if let Err(e) = self.validate(&proposal) {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        proposal.status = BookingStatus::Pending;
        if proposal.datum_knjizenja.is_empty() {
            proposal.datum_knjizenja = Utc::now().format("%Y-%m-%d").to_string();
        }

        if let Some(ref storage) = self.storage {
            storage.persist_proposal(&proposal)?;
        }

        let receipt = SubmitReceipt {
            id: proposal.id.clone(),
            status: BookingStatus::Pending,
            document_type: proposal.document_type,
            iznos: proposal.ukupni_iznos,
            confidence: proposal.confidence,
            warnings: proposal.warnings.clone(),
            requires_approval: true,
            message: "Prijedlog spreman za odobrenje računovođe".to_string(),
        };

        info!(
            target: "saldo::pipeline",
            "primljen {} ({}, {:.2} EUR, confidence={:.0}%)",
            proposal.id,
            proposal.document_type.as_str(),
            proposal.ukupni_iznos,
            proposal.confidence * 100.0
        );

        self.proposals.insert(proposal.id.clone(), proposal);
        self.received.fetch_add(1, Ordering::Relaxed);
        Ok(receipt)
    }

    /// Primi više prijedloga transakcijski: svi ili nijedan.
    pub fn submit_batch(
        &self,
        proposals: Vec<BookingProposal>,
    ) -> Result<Vec<SubmitReceipt>, PipelineError> {
        for p in &proposals {
            self.validate(p)?;
        }
        proposals.into_iter().map(|p| self.submit(p)).collect()
    }

    fn validate(&self, p: &BookingProposal) -> Result<(), PipelineError> {
        if p.lines.is_empty() {
            return Err(PipelineError::InvalidProposal(
                "prijedlog nema nijednu stavku knjiženja".to_string(),
            ));
        }
        if !p.is_balanced() {
            return Err(PipelineError::InvalidProposal(format!(
                "duguje ({:.2}) ≠ potražuje ({:.2})",
                p.sum_duguje(),
                p.sum_potrazuje()
            )));
        }
        if p.client_id.trim().is_empty() {
            return Err(PipelineError::InvalidProposal(
                "nedostaje klijent".to_string(),
            ));
        }
        if !p.oib_partnera.is_empty() && !crate::oib::validate_oib(&p.oib_partnera) {
            return Err(PipelineError::InvalidProposal(format!(
                "neispravan OIB partnera: {}",
                p.oib_partnera
            )));
        }
        Ok(())
    }

    // ── 2. ODOBRENJE / ISPRAVAK / ODBIJANJE ──

    /// `pending` → `approved`. Od dva istovremena poziva uspijeva jedan.
    pub fn approve(&self, proposal_id: &str, user_id: &str) -> Result<(), PipelineError> {
        self.transition(proposal_id, user_id, BookingStatus::Approved, None)?;
        self.approved.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// `pending` → `corrected`; original se čuva u `CorrectionRecord`,
    /// prijedlog zadržava samo ispravljeno stanje.
    pub fn correct(
        &self,
        proposal_id: &str,
        user_id: &str,
        corrections: Corrections,
    ) -> Result<CorrectionRecord, PipelineError> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| PipelineError::NotFound(proposal_id.to_string()))?;
        if entry.status != BookingStatus::Pending {
            return Err(PipelineError::NotFound(proposal_id.to_string()));
        }

        let original_lines = entry.lines.clone();
        let original_opis = entry.opis.clone();

        if let Some(lines) = corrections.lines {
            entry.lines = lines;
        }
        if let Some(opis) = corrections.opis {
            entry.opis = opis;
        }
        if let Some(datum) = corrections.datum_knjizenja {
            entry.datum_knjizenja = datum;
        }
        if let Some(erp) = corrections.erp_target {
            entry.erp_target = erp;
        }
        entry.status = BookingStatus::Corrected;

        let record = CorrectionRecord {
            proposal_id: proposal_id.to_string(),
            user_id: user_id.to_string(),
            client_id: entry.client_id.clone(),
            document_type: entry.document_type,
            original_lines,
            corrected_lines: entry.lines.clone(),
            original_opis,
            corrected_opis: entry.opis.clone(),
            reason: corrections.reason.unwrap_or_default(),
            timestamp: Utc::now(),
        };
        drop(entry);

        self.corrected.fetch_add(1, Ordering::Relaxed);
        if let Some(ref storage) = self.storage {
            storage.update_status(proposal_id, BookingStatus::Corrected, user_id, None)?;
        }
        if let Some(ref memory) = self.memory {
            if let Err(e) = memory.consume_correction(&record) {
                warn!(target: "saldo::pipeline", "memorija nije primila ispravak: {}", e);
            }
        }
        info!(
            target: "saldo::pipeline",
            "ispravljen {} (korisnik {}) — spremljeno za noćni DPO trening",
            proposal_id, user_id
        );
        Ok(record)
    }

    /// `pending` → `rejected` uz slobodan razlog.
    pub fn reject(
        &self,
        proposal_id: &str,
        user_id: &str,
        reason: &str,
    ) -> Result<(), PipelineError> {
        self.transition(proposal_id, user_id, BookingStatus::Rejected, Some(reason))?;
        self.rejected.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn transition(
        &self,
        proposal_id: &str,
        user_id: &str,
        to: BookingStatus,
        note: Option<&str>,
    ) -> Result<(), PipelineError> {
        let mut entry = self
            .proposals
            .get_mut(proposal_id)
            .ok_or_else(|| PipelineError::NotFound(proposal_id.to_string()))?;
        if entry.status != BookingStatus::Pending {
            return Err(PipelineError::NotFound(proposal_id.to_string()));
        }
        entry.status = to;
        drop(entry);

        if let Some(ref storage) = self.storage {
            storage.update_status(proposal_id, to, user_id, note)?;
        }
        Ok(())
    }

    // ── 3. EXPORT U ERP ──

    /// Exportaj sva odobrena i ispravljena knjiženja koja prolaze filter.
    /// Sve-ili-ništa: ako zapis datoteke ne uspije, nijedan status se ne
    /// pomiče. Dva istovremena exporta vide disjunktne skupove.
    pub async fn export_approved(
        &self,
        client_id: Option<&str>,
        erp_target: Option<ErpTarget>,
        format: ExportFormat,
    ) -> Result<ExportResult, PipelineError> {
        let _guard = self.export_lock.lock().await;

        let to_export: Vec<BookingProposal> = self
            .proposals
            .iter()
            .filter(|e| {
                matches!(e.status, BookingStatus::Approved | BookingStatus::Corrected)
                    && client_id.map_or(true, |c| e.client_id == c)
                    && erp_target.map_or(true, |t| e.erp_target == t)
            })
            .map(|e| e.clone())
            .collect();

        if to_export.is_empty() {
            return Err(PipelineError::NothingToExport);
        }

        let mut warnings = Vec::new();
        let mut seen: HashMap<(String, DocumentType, String), String> = HashMap::new();
        for p in &to_export {
            let key = p.natural_key();
            if !key.2.is_empty() {
                if let Some(first) = seen.get(&key) {
                    // Oba ostaju u exportu; deduplikacija je posao čovjeka.
                    warnings.push(format!(
                        "Mogući duplikat: {} i {} dijele broj dokumenta '{}'",
                        first, p.id, key.2
                    ));
                } else {
                    seen.insert(key, p.id.clone());
                }
            }
        }

        let erp = erp_target
            .or_else(|| to_export.first().map(|p| p.erp_target))
            .unwrap_or(ErpTarget::Cpp);

        let records: Vec<ExportRecord> =
            to_export.iter().flat_map(erp::flatten_proposal).collect();

        let file = self.export_dir.join(format!(
            "export_{}_{}.{}",
            erp.as_str().to_lowercase(),
            Utc::now().format("%Y%m%d_%H%M%S"),
            format.extension()
        ));

        // Zapis prije ikakve promjene statusa.
        match format {
            ExportFormat::Xml => erp::write_cpp_xml(&records, &file)?,
            ExportFormat::Csv => erp::write_synesis_csv(&records, &file)?,
            ExportFormat::Json => erp::write_json(&records, &file)?,
        }

        for p in &to_export {
            if let Some(mut entry) = self.proposals.get_mut(&p.id) {
                entry.status = BookingStatus::Exported;
            }
            if let Some(ref storage) = self.storage {
                storage.update_status(&p.id, BookingStatus::Exported, "export", None)?;
            }
        }
        self.exported
            .fetch_add(to_export.len() as u64, Ordering::Relaxed);

        info!(
            target: "saldo::pipeline",
            "EXPORT: {} prijedloga → {} stavki → {} {:?}",
            to_export.len(),
            records.len(),
            erp.as_str(),
            format
        );

        Ok(ExportResult {
            erp,
            format,
            file,
            proposals_exported: to_export.len(),
            booking_lines: records.len(),
            warnings,
        })
    }

    // ── HELPERS ──

    pub fn get(&self, proposal_id: &str) -> Option<BookingProposal> {
        self.proposals.get(proposal_id).map(|e| e.clone())
    }

    pub fn get_pending(&self, client_id: Option<&str>) -> Vec<BookingProposal> {
        self.by_status(BookingStatus::Pending, client_id)
    }

    pub fn get_approved(&self, client_id: Option<&str>) -> Vec<BookingProposal> {
        let mut out = self.by_status(BookingStatus::Approved, client_id);
        out.extend(self.by_status(BookingStatus::Corrected, client_id));
        out
    }

    fn by_status(&self, status: BookingStatus, client_id: Option<&str>) -> Vec<BookingProposal> {
        self.proposals
            .iter()
            .filter(|e| e.status == status && client_id.map_or(true, |c| e.client_id == c))
            .map(|e| e.clone())
            .collect()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            received: self.received.load(Ordering::Relaxed),
            approved: self.approved.load(Ordering::Relaxed),
            corrected: self.corrected.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            exported: self.exported.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            pending: self.by_status(BookingStatus::Pending, None).len(),
            approved_waiting: self.get_approved(None).len(),
        }
    }

    // ── 4. MODUL-SPECIFIČNE PRETVORBE ──
    //
    // Tanke tvornice: iznosi dolaze iz engine-a, ovdje se samo
    // raspoređuju na standardne kontne sheme.

    /// Ulazni račun (A1): trošak + pretporez / obveza dobavljaču.
    pub fn from_invoice(
        invoice: &InvoiceData,
        suggested_konto: &str,
        konto_confidence: f64,
        reasoning: &str,
        client_id: &str,
        erp: ErpTarget,
    ) -> BookingProposal {
        let iznos = invoice.iznos;
        let pdv = invoice.pdv_iznos;
        let osnovica = round2(iznos - pdv);

        let mut p = BookingProposal::new(client_id, DocumentType::UlazniRacun);
        p.erp_target = erp;
        p.lines = vec![
            BookingLine::duguje(suggested_konto, osnovica, invoice.opis.clone()),
            BookingLine::duguje("1400", pdv, "Pretporez"),
            BookingLine::potrazuje(
                "2200",
                iznos,
                format!("Obveza dobavljaču: {}", invoice.dobavljac),
            ),
        ];
        p.lines.retain(|l| l.iznos > 0.0);
        p.datum_dokumenta = invoice.datum.clone();
        p.broj_dokumenta = invoice.broj_racuna.clone();
        p.opis = format!("UR {} — {}", invoice.broj_racuna, invoice.dobavljac);
        p.oib_partnera = invoice.oib.clone();
        p.naziv_partnera = invoice.dobavljac.clone();
        p.ukupni_iznos = iznos;
        p.pdv_stopa = invoice.pdv_stopa;
        p.osnovica = osnovica;
        p.pdv_iznos = pdv;
        p.confidence = konto_confidence;
        p.ai_reasoning = reasoning.to_string();
        p.source_module = "invoice_ocr + kontiranje".to_string();
        p
    }

    /// Bankovni izvod (A4): jedna transakcija → jedan prijedlog.
    pub fn from_bank_statement(
        transactions: &[BankTx],
        client_id: &str,
        erp: ErpTarget,
    ) -> Vec<BookingProposal> {
        transactions
            .iter()
            .map(|tx| {
                let iznos = tx.amount.abs();
                let lines = if tx.incoming {
                    vec![
                        BookingLine::duguje("1000", iznos, "Uplata na žiro"),
                        BookingLine::potrazuje(
                            tx.suggested_konto.as_deref().unwrap_or("1200"),
                            iznos,
                            tx.opis.clone(),
                        ),
                    ]
                } else {
                    vec![
                        BookingLine::duguje(
                            tx.suggested_konto.as_deref().unwrap_or("2200"),
                            iznos,
                            tx.opis.clone(),
                        ),
                        BookingLine::potrazuje("1000", iznos, "Isplata s žiro"),
                    ]
                };

                let mut p = BookingProposal::new(client_id, DocumentType::BankovniIzvod);
                p.erp_target = erp;
                p.lines = lines;
                p.datum_dokumenta = tx.date.clone();
                p.opis = tx.opis.clone();
                p.oib_partnera = tx.oib.clone();
                p.naziv_partnera = tx.partner.clone();
                p.ukupni_iznos = iznos;
                p.confidence = tx.confidence;
                p.source_module = "bank_parser".to_string();
                p
            })
            .collect()
    }

    /// Obračun plaće (B): engine-ov rezultat → kontna shema plaće.
    pub fn from_payroll(r: &PayrollResult, client_id: &str, erp: ErpTarget) -> BookingProposal {
        let mut lines = vec![
            BookingLine::duguje(
                "4700",
                r.bruto_placa,
                format!("Bruto plaća: {}", r.employee_name),
            ),
            BookingLine::potrazuje(
                "2300",
                r.neto_placa,
                format!("Neto plaća: {}", r.employee_name),
            ),
            BookingLine::potrazuje("2310", r.mio_stup_1, "MIO I. stup (15%)"),
            BookingLine::potrazuje("2311", r.mio_stup_2, "MIO II. stup (5%)"),
            BookingLine::potrazuje("2320", r.porez, "Porez na dohodak"),
            BookingLine::potrazuje("2321", r.prirez, "Prirez"),
            BookingLine::duguje("4710", r.zdravstveno, "Doprinos za zdravstveno (16.5%)"),
            BookingLine::potrazuje("2330", r.zdravstveno, "Obveza za zdravstveno"),
        ];
        lines.retain(|l| l.iznos > 0.0);

        let mut p = BookingProposal::new(client_id, DocumentType::Placa);
        p.erp_target = erp;
        p.lines = lines;
        p.opis = format!(
            "Plaća {} — bruto {:.2} → neto {:.2}",
            r.employee_name, r.bruto_placa, r.neto_placa
        );
        p.ukupni_iznos = r.ukupni_trosak_poslodavca;
        p.confidence = 0.95;
        p.ai_reasoning =
            "Obračun prema Zakonu o doprinosima i Zakonu o porezu na dohodak".to_string();
        p.source_module = "payroll".to_string();
        p.warnings = r.warnings.clone();
        p
    }

    /// Blagajnička stavka (A5).
    pub fn from_petty_cash(
        iznos: f64,
        isplata: bool,
        opis: &str,
        suggested_konto: &str,
        konto_confidence: f64,
        client_id: &str,
        erp: ErpTarget,
    ) -> BookingProposal {
        let lines = if isplata {
            vec![
                BookingLine::duguje(suggested_konto, iznos, opis),
                BookingLine::potrazuje("1020", iznos, "Blagajna — isplata"),
            ]
        } else {
            vec![
                BookingLine::duguje("1020", iznos, "Blagajna — uplata"),
                BookingLine::potrazuje(suggested_konto, iznos, opis),
            ]
        };

        let mut p = BookingProposal::new(client_id, DocumentType::Blagajna);
        p.erp_target = erp;
        p.lines = lines;
        p.opis = opis.to_string();
        p.ukupni_iznos = iznos;
        p.confidence = konto_confidence;
        p.source_module = "blagajna".to_string();
        p
    }

    /// Putni nalog (A6): iznosi iz `PutniNalogChecker` obračuna.
    pub fn from_travel_expense(
        djelatnik: &str,
        odrediste: &str,
        km_naknada: f64,
        dnevnica: f64,
        ostali_troskovi: f64,
        client_id: &str,
        erp: ErpTarget,
    ) -> BookingProposal {
        let ukupno = round2(km_naknada + dnevnica + ostali_troskovi);
        let mut lines = Vec::new();
        if km_naknada > 0.0 {
            lines.push(BookingLine::duguje("4670", km_naknada, "Km naknada"));
        }
        if dnevnica > 0.0 {
            lines.push(BookingLine::duguje("4660", dnevnica, "Dnevnica"));
        }
        if ostali_troskovi > 0.0 {
            lines.push(BookingLine::duguje(
                "4680",
                ostali_troskovi,
                "Ostali troškovi služb. puta",
            ));
        }
        lines.push(BookingLine::potrazuje(
            "2300",
            ukupno,
            format!("Obveza za putni nalog: {}", djelatnik),
        ));

        let mut p = BookingProposal::new(client_id, DocumentType::PutniNalog);
        p.erp_target = erp;
        p.lines = lines;
        p.opis = format!("Putni nalog: {} — {}", djelatnik, odrediste);
        p.ukupni_iznos = ukupno;
        p.confidence = 0.85;
        p.source_module = "putni_nalozi".to_string();
        p
    }

    /// Mjesečna amortizacija (A7/D).
    pub fn from_depreciation(
        asset_name: &str,
        monthly_amount: f64,
        client_id: &str,
        erp: ErpTarget,
    ) -> BookingProposal {
        let mut p = BookingProposal::new(client_id, DocumentType::Amortizacija);
        p.erp_target = erp;
        p.lines = vec![
            BookingLine::duguje(
                "4300",
                monthly_amount,
                format!("Amortizacija: {}", asset_name),
            ),
            BookingLine::potrazuje(
                "0290",
                monthly_amount,
                format!("Ispravak vrijednosti: {}", asset_name),
            ),
        ];
        p.opis = format!("Mjesečna amortizacija: {}", asset_name);
        p.ukupni_iznos = monthly_amount;
        p.confidence = 0.99;
        p.source_module = "osnovna_sredstva".to_string();
        p
    }

    /// IOS razlika (A9): pozitivna razlika je potraživanje, negativna obveza.
    pub fn from_ios(
        razlika: f64,
        partner: &str,
        partner_oib: &str,
        client_id: &str,
        erp: ErpTarget,
    ) -> BookingProposal {
        let iznos = razlika.abs();
        let lines = if razlika > 0.0 {
            vec![
                BookingLine::duguje(
                    "1200",
                    iznos,
                    format!("IOS korekcija — potraživanje od {}", partner),
                ),
                BookingLine::potrazuje("7600", iznos, "Prihod od IOS usklađivanja"),
            ]
        } else {
            vec![
                BookingLine::duguje("4800", iznos, format!("IOS korekcija — rashod za {}", partner)),
                BookingLine::potrazuje("2200", iznos, "Obveza iz IOS usklađivanja"),
            ]
        };

        let mut p = BookingProposal::new(client_id, DocumentType::Ios);
        p.erp_target = erp;
        p.lines = lines;
        p.opis = format!("IOS usklađivanje: {}", partner);
        p.oib_partnera = partner_oib.to_string();
        p.naziv_partnera = partner.to_string();
        p.ukupni_iznos = iznos;
        p.confidence = 0.7;
        p.source_module = "ios".to_string();
        p
    }
}

/// Ulazni račun kako ga vidi pipeline (izlaz parsera).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvoiceData {
    pub dobavljac: String,
    pub oib: String,
    pub broj_racuna: String,
    pub datum: String,
    pub iznos: f64,
    pub pdv_stopa: f64,
    pub pdv_iznos: f64,
    pub opis: String,
}

/// Jedna transakcija bankovnog izvoda (izlaz parsera).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankTx {
    pub date: String,
    pub amount: f64,
    pub incoming: bool,
    pub partner: String,
    pub oib: String,
    pub opis: String,
    pub confidence: f64,
    pub suggested_konto: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use saldo_engines::payroll::{Employee, PayrollEngine};

    fn pipeline(dir: &tempfile::TempDir) -> BookingPipeline {
        BookingPipeline::new(dir.path().join("exports"))
    }

    fn balanced_proposal() -> BookingProposal {
        let mut p = BookingProposal::new("c1", DocumentType::UlazniRacun);
        p.lines = vec![
            BookingLine::duguje("4010", 1000.0, "Trošak"),
            BookingLine::potrazuje("2200", 1000.0, "Obveza"),
        ];
        p.ukupni_iznos = 1000.0;
        p
    }

    #[test]
    fn submit_requires_balance() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(&dir);

        let mut bad = balanced_proposal();
        bad.lines[1].iznos = 900.0;
        assert!(matches!(
            pipe.submit(bad),
            Err(PipelineError::InvalidProposal(_))
        ));

        let receipt = pipe.submit(balanced_proposal()).unwrap();
        assert!(receipt.requires_approval);
        assert_eq!(receipt.status, BookingStatus::Pending);
    }

    #[test]
    fn submit_batch_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(&dir);

        let mut bad = balanced_proposal();
        bad.lines[0].iznos = 1.0;
        let result = pipe.submit_batch(vec![balanced_proposal(), bad]);
        assert!(result.is_err());
        assert_eq!(pipe.get_pending(None).len(), 0);
    }

    #[test]
    fn approve_is_one_way_and_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(&dir);
        let id = pipe.submit(balanced_proposal()).unwrap().id;

        pipe.approve(&id, "ana").unwrap();
        // Drugo odobrenje istog id-a ne uspijeva.
        assert!(matches!(
            pipe.approve(&id, "marko"),
            Err(PipelineError::NotFound(_))
        ));
        // Ni reject nakon approve.
        assert!(pipe.reject(&id, "marko", "ne").is_err());
    }

    #[test]
    fn correct_emits_record_with_original() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(&dir);
        let id = pipe.submit(balanced_proposal()).unwrap().id;

        let corrections = Corrections {
            lines: Some(vec![
                BookingLine::duguje("4120", 1000.0, "Usluge"),
                BookingLine::potrazuje("2200", 1000.0, "Obveza"),
            ]),
            reason: Some("krivi konto".to_string()),
            ..Default::default()
        };
        let rec = pipe.correct(&id, "ana", corrections).unwrap();
        assert_eq!(rec.original_lines[0].konto, "4010");
        assert_eq!(rec.corrected_lines[0].konto, "4120");
        assert_eq!(rec.reason, "krivi konto");

        // Prijedlog drži samo ispravljeno stanje.
        let p = pipe.get(&id).unwrap();
        assert_eq!(p.status, BookingStatus::Corrected);
        assert_eq!(p.lines[0].konto, "4120");
    }

    #[tokio::test]
    async fn export_moves_status_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(&dir);
        let id = pipe.submit(balanced_proposal()).unwrap().id;
        pipe.approve(&id, "ana").unwrap();

        let result = pipe
            .export_approved(None, None, ExportFormat::Xml)
            .await
            .unwrap();
        assert_eq!(result.proposals_exported, 1);
        assert_eq!(result.booking_lines, 2);
        assert!(result.file.exists());
        assert_eq!(pipe.get(&id).unwrap().status, BookingStatus::Exported);

        // Ponovni export nema što izvesti — prijelaz je jednosmjeran.
        assert!(matches!(
            pipe.export_approved(None, None, ExportFormat::Xml).await,
            Err(PipelineError::NothingToExport)
        ));
    }

    #[tokio::test]
    async fn export_flags_natural_key_collision() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(&dir);

        let mut a = balanced_proposal();
        a.broj_dokumenta = "17/2026".to_string();
        let mut b = balanced_proposal();
        b.broj_dokumenta = "17/2026".to_string();

        let ida = pipe.submit(a).unwrap().id;
        let idb = pipe.submit(b).unwrap().id;
        pipe.approve(&ida, "ana").unwrap();
        pipe.approve(&idb, "ana").unwrap();

        let result = pipe
            .export_approved(None, None, ExportFormat::Json)
            .await
            .unwrap();
        // Oba su izvezena, ali s upozorenjem.
        assert_eq!(result.proposals_exported, 2);
        assert!(result.warnings.iter().any(|w| w.contains("duplikat")));
    }

    #[tokio::test]
    async fn export_filters_by_client() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = pipeline(&dir);

        let a = balanced_proposal();
        let mut b = balanced_proposal();
        b.client_id = "c2".to_string();
        let ida = pipe.submit(a).unwrap().id;
        let idb = pipe.submit(b).unwrap().id;
        pipe.approve(&ida, "ana").unwrap();
        pipe.approve(&idb, "ana").unwrap();

        let result = pipe
            .export_approved(Some("c2"), None, ExportFormat::Csv)
            .await
            .unwrap();
        assert_eq!(result.proposals_exported, 1);
        assert_eq!(pipe.get(&ida).unwrap().status, BookingStatus::Approved);
        assert_eq!(pipe.get(&idb).unwrap().status, BookingStatus::Exported);
    }

    #[test]
    fn from_payroll_balances() {
        let engine = PayrollEngine::new();
        let emp = Employee::new("Ana", 2000.0, "Zagreb");
        let r = engine.calculate_za_datum(
            &emp,
            chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        );
        let p = BookingPipeline::from_payroll(&r, "c1", ErpTarget::Cpp);
        assert!(p.is_balanced(), "duguje {} potražuje {}", p.sum_duguje(), p.sum_potrazuje());
        assert_eq!(p.document_type, DocumentType::Placa);
        assert_eq!(p.ukupni_iznos, 2330.0);
    }

    #[test]
    fn from_invoice_balances() {
        let invoice = InvoiceData {
            dobavljac: "Dobavljač d.o.o.".to_string(),
            oib: String::new(),
            broj_racuna: "17/2026".to_string(),
            datum: "2026-02-01".to_string(),
            iznos: 1250.0,
            pdv_stopa: 25.0,
            pdv_iznos: 250.0,
            opis: "Uredski materijal".to_string(),
        };
        let p = BookingPipeline::from_invoice(&invoice, "4010", 0.8, "trošak", "c1", ErpTarget::Cpp);
        assert!(p.is_balanced());
        assert_eq!(p.osnovica, 1000.0);
    }

    #[test]
    fn from_bank_statement_one_proposal_per_tx() {
        let txs = vec![
            BankTx {
                date: "2026-02-01".to_string(),
                amount: 1250.0,
                incoming: true,
                opis: "Naplata računa".to_string(),
                confidence: 0.6,
                ..Default::default()
            },
            BankTx {
                date: "2026-02-02".to_string(),
                amount: -500.0,
                incoming: false,
                opis: "Plaćanje dobavljaču".to_string(),
                suggested_konto: Some("2200".to_string()),
                ..Default::default()
            },
        ];
        let proposals = BookingPipeline::from_bank_statement(&txs, "c1", ErpTarget::Synesis);
        assert_eq!(proposals.len(), 2);
        for p in &proposals {
            assert!(p.is_balanced());
            assert_eq!(p.document_type, DocumentType::BankovniIzvod);
        }
        // Uplata: žiro duguje; isplata: žiro potražuje.
        assert_eq!(proposals[0].lines[0].konto, "1000");
        assert_eq!(proposals[1].lines[1].konto, "1000");
        assert_eq!(proposals[1].ukupni_iznos, 500.0);
    }

    #[test]
    fn from_petty_cash_and_travel_and_depreciation() {
        let cash =
            BookingPipeline::from_petty_cash(200.0, true, "Uredski sitniš", "4010", 0.7, "c1", ErpTarget::Cpp);
        assert!(cash.is_balanced());
        assert_eq!(cash.lines[1].konto, "1020");

        let travel = BookingPipeline::from_travel_expense(
            "Marko",
            "Split",
            45.0,
            26.55,
            30.0,
            "c1",
            ErpTarget::Cpp,
        );
        assert!(travel.is_balanced());
        assert_eq!(travel.ukupni_iznos, 101.55);
        assert_eq!(travel.lines.len(), 4);

        let dep = BookingPipeline::from_depreciation("Laptop", 83.33, "c1", ErpTarget::Cpp);
        assert!(dep.is_balanced());
        assert_eq!(dep.lines[1].konto, "0290");
        assert_eq!(dep.confidence, 0.99);
    }

    #[test]
    fn from_ios_direction() {
        let p = BookingPipeline::from_ios(150.0, "Partner", "", "c1", ErpTarget::Cpp);
        assert_eq!(p.lines[0].konto, "1200");
        let n = BookingPipeline::from_ios(-150.0, "Partner", "", "c1", ErpTarget::Cpp);
        assert_eq!(n.lines[0].konto, "4800");
        assert!(p.is_balanced() && n.is_balanced());
    }
}
