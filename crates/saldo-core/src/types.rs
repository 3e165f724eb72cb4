//! Value contracts shared by the whole system.
//!
//! `BookingProposal` is the universal posting envelope: every module's
//! output is normalised into it before it can reach an accountant, and
//! nothing reaches an ERP without passing through the pipeline's
//! human-approval step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Time-prefixed opaque id: millisecond timestamp + short random suffix,
/// so lexicographic order is creation order.
pub fn new_id() -> String {
    let ts = Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{:013}-{}", ts, &suffix[..8])
}

/// Status prijedloga knjiženja. Prijelazi su jednosmjerni:
/// pending → {approved, corrected, rejected}, approved/corrected → exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Approved,
    Corrected,
    Rejected,
    Exported,
    Error,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Corrected => "corrected",
            Self::Rejected => "rejected",
            Self::Exported => "exported",
            Self::Error => "error",
        }
    }
}

/// Vrsta dokumenta koja ulazi u pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    UlazniRacun,
    IzlazniRacun,
    BankovniIzvod,
    Blagajna,
    PutniNalog,
    OsnovnoSredstvo,
    Obracunska,
    Ios,
    Placa,
    UgovorODjelu,
    AutorskiHonorar,
    PdvObracun,
    Amortizacija,
    Razgranicenje,
    Ostalo,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UlazniRacun => "ulazni_racun",
            Self::IzlazniRacun => "izlazni_racun",
            Self::BankovniIzvod => "bankovni_izvod",
            Self::Blagajna => "blagajna",
            Self::PutniNalog => "putni_nalog",
            Self::OsnovnoSredstvo => "osnovno_sredstvo",
            Self::Obracunska => "obracunska",
            Self::Ios => "ios",
            Self::Placa => "placa",
            Self::UgovorODjelu => "ugovor_o_djelu",
            Self::AutorskiHonorar => "autorski_honorar",
            Self::PdvObracun => "pdv_obracun",
            Self::Amortizacija => "amortizacija",
            Self::Razgranicenje => "razgranicenje",
            Self::Ostalo => "ostalo",
        }
    }
}

/// Ciljani ERP sustav za export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErpTarget {
    #[serde(rename = "CPP")]
    Cpp,
    Synesis,
    #[serde(rename = "eRacuni")]
    ERacuni,
    Pantheon,
}

impl ErpTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpp => "CPP",
            Self::Synesis => "Synesis",
            Self::ERacuni => "eRacuni",
            Self::Pantheon => "Pantheon",
        }
    }
}

/// Strana knjiženja.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strana {
    Duguje,
    Potrazuje,
}

/// Jedna stavka knjiženja (jedno duguje ili potražuje).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingLine {
    pub konto: String,
    pub strana: Strana,
    pub iznos: f64,
    #[serde(default)]
    pub opis: String,
    #[serde(default)]
    pub oib: String,
    #[serde(default)]
    pub pdv_stopa: f64,
    #[serde(default)]
    pub pdv_iznos: f64,
    #[serde(default)]
    pub poziv_na_broj: String,
    #[serde(default)]
    pub partner_naziv: String,
}

impl BookingLine {
    pub fn duguje(konto: impl Into<String>, iznos: f64, opis: impl Into<String>) -> Self {
        Self::new(konto, Strana::Duguje, iznos, opis)
    }

    pub fn potrazuje(konto: impl Into<String>, iznos: f64, opis: impl Into<String>) -> Self {
        Self::new(konto, Strana::Potrazuje, iznos, opis)
    }

    fn new(konto: impl Into<String>, strana: Strana, iznos: f64, opis: impl Into<String>) -> Self {
        Self {
            konto: konto.into(),
            strana,
            iznos,
            opis: opis.into(),
            oib: String::new(),
            pdv_stopa: 0.0,
            pdv_iznos: 0.0,
            poziv_na_broj: String::new(),
            partner_naziv: String::new(),
        }
    }
}

/// Prijedlog knjiženja — standardni format koji SVI moduli proizvode.
/// Pipeline ga drži kao `pending` dok ga računovođa ne odobri.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingProposal {
    pub id: String,
    pub client_id: String,
    pub document_type: DocumentType,
    pub erp_target: ErpTarget,
    pub lines: Vec<BookingLine>,

    // Metapodaci dokumenta
    #[serde(default)]
    pub datum_dokumenta: String,
    #[serde(default)]
    pub datum_knjizenja: String,
    #[serde(default)]
    pub broj_dokumenta: String,
    #[serde(default)]
    pub opis: String,
    #[serde(default)]
    pub oib_partnera: String,
    #[serde(default)]
    pub naziv_partnera: String,
    #[serde(default)]
    pub ukupni_iznos: f64,
    #[serde(default = "default_valuta")]
    pub valuta: String,

    // PDV blok
    #[serde(default)]
    pub pdv_stopa: f64,
    #[serde(default)]
    pub osnovica: f64,
    #[serde(default)]
    pub pdv_iznos: f64,

    // AI metapodaci — model smije predlagati konto i obrazloženje,
    // iznosi uvijek dolaze iz determinističkih engine-a.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub ai_reasoning: String,
    #[serde(default)]
    pub source_module: String,

    pub status: BookingStatus,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl BookingProposal {
    pub fn new(client_id: impl Into<String>, document_type: DocumentType) -> Self {
        Self {
            id: new_id(),
            client_id: client_id.into(),
            document_type,
            erp_target: ErpTarget::Cpp,
            lines: Vec::new(),
            datum_dokumenta: String::new(),
            datum_knjizenja: String::new(),
            broj_dokumenta: String::new(),
            opis: String::new(),
            oib_partnera: String::new(),
            naziv_partnera: String::new(),
            ukupni_iznos: 0.0,
            valuta: default_valuta(),
            pdv_stopa: 0.0,
            osnovica: 0.0,
            pdv_iznos: 0.0,
            confidence: 0.0,
            ai_reasoning: String::new(),
            source_module: String::new(),
            status: BookingStatus::Pending,
            warnings: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn sum_duguje(&self) -> f64 {
        self.lines
            .iter()
            .filter(|l| l.strana == Strana::Duguje)
            .map(|l| l.iznos)
            .sum()
    }

    pub fn sum_potrazuje(&self) -> f64 {
        self.lines
            .iter()
            .filter(|l| l.strana == Strana::Potrazuje)
            .map(|l| l.iznos)
            .sum()
    }

    /// Invariant: suma duguje = suma potražuje na jedan cent.
    pub fn is_balanced(&self) -> bool {
        (self.sum_duguje() - self.sum_potrazuje()).abs() <= 0.01
    }

    /// Prirodni ključ za detekciju duplikata pri exportu.
    pub fn natural_key(&self) -> (String, DocumentType, String) {
        (
            self.client_id.clone(),
            self.document_type,
            self.broj_dokumenta.clone(),
        )
    }
}

fn default_valuta() -> String {
    "EUR".to_string()
}

/// Potvrda zaprimanja prijedloga.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReceipt {
    pub id: String,
    pub status: BookingStatus,
    pub document_type: DocumentType,
    pub iznos: f64,
    pub confidence: f64,
    pub warnings: Vec<String>,
    /// Uvijek `true` — nijedno knjiženje ne ide u ERP bez odobrenja.
    pub requires_approval: bool,
    pub message: String,
}

/// Zapis ispravka: original nasuprot ispravku. Hrani L2 semantičku
/// memoriju i L3 preferencijske parove.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectionRecord {
    pub proposal_id: String,
    pub user_id: String,
    pub client_id: String,
    pub document_type: DocumentType,
    pub original_lines: Vec<BookingLine>,
    pub corrected_lines: Vec<BookingLine>,
    pub original_opis: String,
    pub corrected_opis: String,
    #[serde(default)]
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Polja koja korisnik smije ispraviti na prijedlogu.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Corrections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lines: Option<Vec<BookingLine>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum_knjizenja: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub erp_target: Option<ErpTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_is_time_prefixed_and_ordered() {
        let a = new_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_id();
        assert!(a < b);
        assert_eq!(a.split('-').count(), 2);
    }

    #[test]
    fn balance_within_one_cent() {
        let mut p = BookingProposal::new("c1", DocumentType::UlazniRacun);
        p.lines = vec![
            BookingLine::duguje("4010", 100.0, "trošak"),
            BookingLine::potrazuje("2200", 99.995, "obveza"),
        ];
        assert!(p.is_balanced());

        p.lines[1].iznos = 99.0;
        assert!(!p.is_balanced());
    }
}
