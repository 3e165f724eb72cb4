//! Putni nalozi: km naknada, dnevnice, reprezentacija.
//!
//! Neoporezivi limiti (Pravilnik o neoporezivim primicima NN 1/23):
//! km naknada 0.30 EUR/km, puna dnevnica RH 26.55 EUR, pola dnevnice
//! 13.28 EUR. Iznosi iznad limita se isplaćuju, ali su porezno
//! nepriznati. Reprezentacija je 50 % porezno nepriznata.

use crate::{round2, ExplainStep};
use serde::{Deserialize, Serialize};

/// Maksimalna neoporeziva km naknada, EUR/km.
pub const KM_NAKNADA_MAX: f64 = 0.30;
/// Puna dnevnica za službeni put u RH, EUR.
pub const DNEVNICA_PUNA: f64 = 26.55;
/// Pola dnevnice (8–12 sati), EUR.
pub const DNEVNICA_POLA: f64 = 13.28;
/// Porezno nepriznati dio reprezentacije.
pub const REPREZENTACIJA_NEPRIZNATO_PCT: f64 = 50.0;

/// Putni nalog za obračun.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PutniNalog {
    pub djelatnik: String,
    #[serde(default)]
    pub odrediste: String,
    #[serde(default)]
    pub km: f64,
    /// Ugovorena naknada po km; obračun koristi najviše 0.30 EUR.
    #[serde(default)]
    pub km_naknada: f64,
    #[serde(default)]
    pub dnevnica: f64,
    #[serde(default)]
    pub ostali_troskovi: f64,
    #[serde(default)]
    pub reprezentacija: f64,
}

/// Obračun putnog naloga: i isplata i porezno priznati dio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutniNalogObracun {
    pub valid: bool,
    pub km_naknada_ukupno: f64,
    pub dnevnica_priznato: f64,
    pub ukupno_isplata: f64,
    pub ukupno_porezno_priznato: f64,
    pub ukupno_porezno_nepriznato: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub explain: Vec<ExplainStep>,
    pub requires_approval: bool,
}

/// Validacija i obračun putnih naloga — formule, ne AI.
#[derive(Debug, Clone, Default)]
pub struct PutniNalogChecker;

impl PutniNalogChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_full(&self, pn: &PutniNalog) -> PutniNalogObracun {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut explain = Vec::new();
        let mut nepriznato = 0.0;

        if pn.djelatnik.trim().is_empty() {
            errors.push("Nedostaje djelatnik na putnom nalogu".to_string());
        }
        if pn.km < 0.0 {
            errors.push("Kilometraža ne može biti negativna".to_string());
        }

        // Km naknada: obračun s najviše 0.30 EUR/km; višak se isplaćuje
        // ali je porezno nepriznat.
        let stopa = if pn.km_naknada > 0.0 {
            pn.km_naknada
        } else {
            KM_NAKNADA_MAX
        };
        let priznata_stopa = stopa.min(KM_NAKNADA_MAX);
        let km_priznato = round2(pn.km * priznata_stopa);
        let km_isplata = round2(pn.km * stopa);
        if stopa > KM_NAKNADA_MAX {
            warnings.push(format!(
                "Km naknada {:.2} EUR/km je iznad neoporezivog max 0.30 EUR/km — višak je porezno nepriznat",
                stopa
            ));
            nepriznato += km_isplata - km_priznato;
        }
        explain.push(ExplainStep::new(
            format!("Km naknada: {:.0} km × {:.2} EUR", pn.km, priznata_stopa),
            km_priznato,
        ));

        // Dnevnica: limit pune dnevnice.
        let dnevnica_priznato = pn.dnevnica.min(DNEVNICA_PUNA);
        if pn.dnevnica > DNEVNICA_PUNA {
            warnings.push(format!(
                "Dnevnica {:.2} EUR je iznad neoporezivog limita {:.2} EUR",
                pn.dnevnica, DNEVNICA_PUNA
            ));
            nepriznato += pn.dnevnica - dnevnica_priznato;
        }
        explain.push(ExplainStep::new("Dnevnica (priznato)", round2(dnevnica_priznato)));

        // Reprezentacija: 50 % porezno nepriznato, isplaćuje se u cijelosti.
        if pn.reprezentacija > 0.0 {
            let rep_nepriznato = round2(pn.reprezentacija * REPREZENTACIJA_NEPRIZNATO_PCT / 100.0);
            nepriznato += rep_nepriznato;
            warnings.push(format!(
                "Reprezentacija: 50 % porezno nepriznato ({:.2} EUR)",
                rep_nepriznato
            ));
            explain.push(ExplainStep::new("Reprezentacija (nepriznato 50 %)", rep_nepriznato));
        }

        let ukupno_isplata = round2(km_isplata + pn.dnevnica + pn.ostali_troskovi + pn.reprezentacija);
        let nepriznato = round2(nepriznato);
        let priznato = round2(ukupno_isplata - nepriznato);
        explain.push(ExplainStep::new("Ukupno za isplatu", ukupno_isplata));
        explain.push(ExplainStep::new("Porezno priznato", priznato));

        PutniNalogObracun {
            valid: errors.is_empty(),
            km_naknada_ukupno: km_priznato,
            dnevnica_priznato: round2(dnevnica_priznato),
            ukupno_isplata,
            ukupno_porezno_priznato: priznato,
            ukupno_porezno_nepriznato: nepriznato,
            errors,
            warnings,
            explain,
            requires_approval: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nalog(km: f64, km_naknada: f64) -> PutniNalog {
        PutniNalog {
            djelatnik: "Test".to_string(),
            km,
            km_naknada,
            ..Default::default()
        }
    }

    #[test]
    fn standardna_km_naknada() {
        let r = PutniNalogChecker::new().validate_full(&nalog(150.0, 0.30));
        assert!(r.valid);
        assert_eq!(r.km_naknada_ukupno, 45.0);
        assert!(r.requires_approval);
    }

    #[test]
    fn naknada_iznad_limita() {
        let r = PutniNalogChecker::new().validate_full(&nalog(100.0, 0.50));
        // Priznato po max 0.30; isplata po ugovorenoj stopi.
        assert_eq!(r.km_naknada_ukupno, 30.0);
        assert_eq!(r.ukupno_isplata, 50.0);
        assert_eq!(r.ukupno_porezno_nepriznato, 20.0);
        assert!(r.warnings.iter().any(|w| w.contains("0.30")));
    }

    #[test]
    fn dnevnica_iznad_limita() {
        let mut pn = nalog(0.0, 0.0);
        pn.dnevnica = 40.0;
        let r = PutniNalogChecker::new().validate_full(&pn);
        assert_eq!(r.dnevnica_priznato, 26.55);
        assert!(r.warnings.iter().any(|w| w.contains("26.55")));
    }

    #[test]
    fn reprezentacija_pola_nepriznato() {
        let mut pn = nalog(0.0, 0.0);
        pn.reprezentacija = 200.0;
        let r = PutniNalogChecker::new().validate_full(&pn);
        assert_eq!(r.ukupno_porezno_nepriznato, 100.0);
        assert_eq!(r.ukupno_isplata, 200.0);
        assert!(r.warnings.iter().any(|w| w.contains("50 %")));
    }

    #[test]
    fn bez_djelatnika_invalid() {
        let mut pn = nalog(100.0, 0.30);
        pn.djelatnik = String::new();
        let r = PutniNalogChecker::new().validate_full(&pn);
        assert!(!r.valid);
        assert!(r.errors.iter().any(|e| e.to_lowercase().contains("djelatnik")));
    }

    #[test]
    fn isplata_vs_priznato() {
        let mut pn = nalog(100.0, 0.40);
        pn.dnevnica = 26.55;
        pn.ostali_troskovi = 50.0;
        let r = PutniNalogChecker::new().validate_full(&pn);
        // Isplata: 40 + 26.55 + 50 = 116.55; nepriznato: 10 (km višak).
        assert_eq!(r.ukupno_isplata, 116.55);
        assert_eq!(r.ukupno_porezno_nepriznato, 10.0);
        assert_eq!(r.ukupno_porezno_priznato, 106.55);
    }
}
