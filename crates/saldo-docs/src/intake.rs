//! Intake klasifikator: datoteka → vrsta dokumenta, klijent, modul.
//!
//! Klasifikacija još ne znači knjiženje: `PipelineDocument` samo kaže
//! kojem modulu dokument pripada i s kojom pouzdanošću. Knjiženje
//! nastaje tek kad dodijeljeni modul odradi svoj posao.
//!
//! Redoslijed prepoznavanja klijenta: OIB u sadržaju → IBAN → mapa
//! mapiranja (folder/pošiljatelj). Svaka metoda nosi svoju pouzdanost.

use crate::extractor;
use crate::oib::validate_oib;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Vrsta dokumenta na ulazu (prije knjiženja).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeKind {
    UlazniRacun,
    IzlazniRacun,
    BankovniIzvod,
    Blagajna,
    PutniNalog,
    ERacunXml,
    Ios,
    Nepoznato,
}

/// Kako je klijent prepoznat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMethod {
    OibMatch,
    IbanMatch,
    FolderMatch,
    Unmatched,
}

/// Dokument na ulazu u pipeline — još bez knjiženja.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDocument {
    pub file_name: String,
    pub kind: IntakeKind,
    pub client_id: Option<String>,
    pub assigned_module: String,
    pub confidence: f64,
    pub routing_method: RoutingMethod,
}

/// Registar klijenata za prepoznavanje: OIB → klijent, IBAN → klijent,
/// folder → klijent.
#[derive(Debug, Clone, Default)]
pub struct ClientMatcher {
    by_oib: HashMap<String, String>,
    by_iban: HashMap<String, String>,
    by_folder: HashMap<String, String>,
}

impl ClientMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_oib(&mut self, oib: &str, client_id: &str) {
        if validate_oib(oib) {
            self.by_oib.insert(oib.to_string(), client_id.to_string());
        }
    }

    pub fn register_iban(&mut self, iban: &str, client_id: &str) {
        self.by_iban.insert(iban.to_string(), client_id.to_string());
    }

    pub fn register_folder(&mut self, folder: &str, client_id: &str) {
        self.by_folder
            .insert(folder.to_lowercase(), client_id.to_string());
    }

    /// Pronađi klijenta iz sadržaja i putanje dokumenta.
    pub fn match_client(&self, path: &Path, content: &str) -> (Option<String>, RoutingMethod) {
        let extraction = extractor::extract(content);
        if !extraction.oib.value.is_empty() {
            if let Some(client) = self.by_oib.get(&extraction.oib.value) {
                return (Some(client.clone()), RoutingMethod::OibMatch);
            }
        }
        if !extraction.iban.value.is_empty() {
            if let Some(client) = self.by_iban.get(&extraction.iban.value) {
                return (Some(client.clone()), RoutingMethod::IbanMatch);
            }
        }
        for component in path.iter() {
            let segment = component.to_string_lossy().to_lowercase();
            if let Some(client) = self.by_folder.get(&segment) {
                return (Some(client.clone()), RoutingMethod::FolderMatch);
            }
        }
        (None, RoutingMethod::Unmatched)
    }
}

/// Klasificiraj dokument po imenu datoteke i sadržaju.
pub fn classify(path: &Path, content: &str) -> (IntakeKind, f64) {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let lower = content.to_lowercase();

    // XML e-račun ima prednost: sadržaj je autoritativan.
    if ext == "xml" || lower.contains("<invoice") || lower.contains("crossindustryinvoice") {
        return (IntakeKind::ERacunXml, 0.95);
    }
    if name.contains("izvod") || lower.contains("stanje računa") || lower.contains("promet po računu")
    {
        return (IntakeKind::BankovniIzvod, 0.85);
    }
    if name.contains("putni") || lower.contains("putni nalog") || lower.contains("dnevnica") {
        return (IntakeKind::PutniNalog, 0.8);
    }
    if name.contains("blagajna") || lower.contains("blagajnički") {
        return (IntakeKind::Blagajna, 0.8);
    }
    if name.contains("ios") || lower.contains("izvod otvorenih stavki") {
        return (IntakeKind::Ios, 0.8);
    }
    if lower.contains("račun br") || lower.contains("racun br") || lower.contains("invoice") {
        let izlazni = lower.contains("izlazni") || name.contains("izlazni");
        return if izlazni {
            (IntakeKind::IzlazniRacun, 0.7)
        } else {
            (IntakeKind::UlazniRacun, 0.7)
        };
    }
    (IntakeKind::Nepoznato, 0.2)
}

/// Modul zadužen za vrstu dokumenta.
pub fn module_for(kind: IntakeKind) -> &'static str {
    match kind {
        IntakeKind::UlazniRacun => "invoice_ocr",
        IntakeKind::IzlazniRacun => "outgoing_invoice",
        IntakeKind::BankovniIzvod => "bank_parser",
        IntakeKind::Blagajna => "blagajna",
        IntakeKind::PutniNalog => "putni_nalozi",
        IntakeKind::ERacunXml => "e_racun",
        IntakeKind::Ios => "ios",
        IntakeKind::Nepoznato => "universal_parser",
    }
}

/// Cijeli intake korak: klasifikacija + klijent + modul.
pub fn ingest(path: &Path, content: &str, matcher: &ClientMatcher) -> PipelineDocument {
    let (kind, confidence) = classify(path, content);
    let (client_id, routing_method) = matcher.match_client(path, content);
    PipelineDocument {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        kind,
        client_id,
        assigned_module: module_for(kind).to_string(),
        confidence,
        routing_method,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oib::oib_control_digit;
    use std::path::PathBuf;

    fn valid_oib() -> String {
        let d = oib_control_digit("1234567890").unwrap();
        format!("1234567890{}", d)
    }

    #[test]
    fn classify_by_name_and_content() {
        let p = PathBuf::from("dokumenti/izvod_0203.csv");
        assert_eq!(classify(&p, "").0, IntakeKind::BankovniIzvod);

        let p = PathBuf::from("eracun.xml");
        assert_eq!(classify(&p, "<Invoice ...>").0, IntakeKind::ERacunXml);

        let p = PathBuf::from("scan001.txt");
        let (kind, conf) = classify(&p, "Račun br. 17/2026 za usluge");
        assert_eq!(kind, IntakeKind::UlazniRacun);
        assert!(conf > 0.5);

        let p = PathBuf::from("nepoznato.txt");
        let (kind, conf) = classify(&p, "nasumičan tekst");
        assert_eq!(kind, IntakeKind::Nepoznato);
        assert!(conf < 0.5);
    }

    #[test]
    fn client_match_priority_oib_first() {
        let mut matcher = ClientMatcher::new();
        let oib = valid_oib();
        matcher.register_oib(&oib, "klijent-oib");
        matcher.register_iban("HR1210010051863000160", "klijent-iban");
        matcher.register_folder("acme", "klijent-folder");

        let path = PathBuf::from("ulaz/acme/racun.txt");
        let content = format!("OIB: {} IBAN: HR1210010051863000160", oib);
        let (client, method) = matcher.match_client(&path, &content);
        assert_eq!(client.as_deref(), Some("klijent-oib"));
        assert_eq!(method, RoutingMethod::OibMatch);

        // Bez OIB-a pada na IBAN.
        let (client, method) = matcher.match_client(&path, "IBAN: HR1210010051863000160");
        assert_eq!(client.as_deref(), Some("klijent-iban"));
        assert_eq!(method, RoutingMethod::IbanMatch);

        // Bez ičega u sadržaju pada na folder.
        let (client, method) = matcher.match_client(&path, "ništa");
        assert_eq!(client.as_deref(), Some("klijent-folder"));
        assert_eq!(method, RoutingMethod::FolderMatch);
    }

    #[test]
    fn ingest_assigns_module() {
        let matcher = ClientMatcher::new();
        let doc = ingest(
            &PathBuf::from("izvod_veljaca.csv"),
            "Promet po računu",
            &matcher,
        );
        assert_eq!(doc.kind, IntakeKind::BankovniIzvod);
        assert_eq!(doc.assigned_module, "bank_parser");
        assert_eq!(doc.routing_method, RoutingMethod::Unmatched);
        assert!(doc.client_id.is_none());
    }
}
