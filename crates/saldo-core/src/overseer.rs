//! Overseer: tvrde sigurnosne granice.
//!
//! Deterministička lista pravila, ne generativni model. Blokira pravne
//! savjete izvan računovodstva (sastavljanje ugovora, tužbe), pomoć pri
//! utaji poreza i svaki pokušaj zaobilaženja human-in-the-loop koraka.
//! Bijela lista računovodstvenih konteksta propušta radno-pravna i
//! porezna pitanja koja računovođa legitimno postavlja.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Kategorija prekršene granice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryCategory {
    ContractDrafting,
    LegalDispute,
    LegalAdvice,
    TaxEvasion,
    ApprovalBypass,
    AutonomousBooking,
}

/// Presuda overseera za jedan korisnički upit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverseerVerdict {
    pub approved: bool,
    pub hard_boundary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<BoundaryCategory>,
    pub reason: String,
}

impl OverseerVerdict {
    fn approved() -> Self {
        Self {
            approved: true,
            hard_boundary: false,
            category: None,
            reason: String::new(),
        }
    }

    fn blocked(category: BoundaryCategory, reason: &str) -> Self {
        Self {
            approved: false,
            hard_boundary: true,
            category: Some(category),
            reason: reason.to_string(),
        }
    }
}

/// Glagoli sastavljanja — "ugovor" je blokiran samo u kombinaciji s
/// njima; "ugovor o djelu" kao obračun je legitiman.
const DRAFTING_VERBS: &[&str] = &["sastavi", "napiši", "napisi", "izradi", "sroči", "pripremi mi ugovor"];

const DISPUTE_TERMS: &[&str] = &["tužb", "tuzb", "tužiti", "tuziti", "sudski postupak", "parnic"];

const EVASION_TERMS: &[&str] = &[
    "utaja",
    "utaju",
    "izbjegnem porez",
    "izbjeći porez",
    "sakrij prihod",
    "sakriti prihod",
    "fiktivni račun",
    "crno",
];

const BYPASS_TERMS: &[&str] = &[
    "zaobiđi provjeru",
    "zaobidi provjeru",
    "preskoči odobrenje",
    "preskoci odobrenje",
    "bez odobrenja",
    "ignoriraj pravila",
];

/// Opće pravne teme izvan domene; bijela lista ih propušta kad je
/// kontekst računovodstveni (otpremnina uz obračun plaće i sl.).
const LEGAL_ADVICE_TERMS: &[&str] = &[
    "pravni savjet",
    "radni spor",
    "nasljedstvo",
    "razvod",
    "kazneni",
    "kaznena prijava",
];

const AUTO_BOOKING_TERMS: &[&str] = &[
    "automatski proknjiži",
    "automatski proknjizi",
    "sam proknjiži",
    "knjiži bez mene",
    "auto knjiženje",
];

/// Računovodstveni konteksti koji propuštaju radno-pravna i porezna
/// pitanja (bijela lista).
const ACCOUNTING_WHITELIST: &[&str] = &[
    "obračun",
    "obracun",
    "otpremnin",
    "plaća",
    "placa",
    "stopa",
    "pdv",
    "porez",
    "amortizacij",
    "dnevnic",
    "doprinos",
    "konto",
    "knjiženje",
    "bolovanje",
    "regres",
    "vijek trajanja",
];

/// Overseer — konstruira se jednom i dijeli kroz `Services`.
#[derive(Debug, Clone, Default)]
pub struct AccountingOverseer;

impl AccountingOverseer {
    pub fn new() -> Self {
        Self
    }

    /// Ocijeni korisnički upit. Tvrde granice imaju prednost pred
    /// bijelom listom — utaja poreza je blokirana i kad spominje PDV.
    pub fn evaluate(&self, text: &str) -> OverseerVerdict {
        let lower = text.to_lowercase();

        if contains_any(&lower, EVASION_TERMS) {
            warn!(target: "saldo::overseer", "blokiran upit: utaja poreza");
            return OverseerVerdict::blocked(
                BoundaryCategory::TaxEvasion,
                "Ne mogu pomoći pri izbjegavanju ili utaji poreza.",
            );
        }
        if contains_any(&lower, BYPASS_TERMS) {
            warn!(target: "saldo::overseer", "blokiran upit: zaobilaženje odobrenja");
            return OverseerVerdict::blocked(
                BoundaryCategory::ApprovalBypass,
                "Korak odobrenja računovođe se ne može preskočiti.",
            );
        }
        if contains_any(&lower, AUTO_BOOKING_TERMS) {
            return OverseerVerdict::blocked(
                BoundaryCategory::AutonomousBooking,
                "Sustav nikad ne knjiži autonomno — svako knjiženje traži odobrenje.",
            );
        }
        if contains_any(&lower, DISPUTE_TERMS) {
            return OverseerVerdict::blocked(
                BoundaryCategory::LegalDispute,
                "Pravni savjeti o sporovima su izvan računovodstvene domene.",
            );
        }
        if lower.contains("ugovor") && contains_any(&lower, DRAFTING_VERBS) {
            return OverseerVerdict::blocked(
                BoundaryCategory::ContractDrafting,
                "Sastavljanje ugovora je posao odvjetnika, ne računovodstvenog asistenta.",
            );
        }

        if contains_any(&lower, LEGAL_ADVICE_TERMS) && !contains_any(&lower, ACCOUNTING_WHITELIST) {
            return OverseerVerdict::blocked(
                BoundaryCategory::LegalAdvice,
                "Opći pravni savjeti su izvan računovodstvene domene.",
            );
        }
        OverseerVerdict::approved()
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
