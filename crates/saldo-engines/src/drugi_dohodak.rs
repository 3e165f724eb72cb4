//! Drugi dohodak: ugovor o djelu i autorski honorar.
//!
//! Stope (Zakon o doprinosima čl. 111., ZoPD čl. 39.): MIO I. 7.5 %,
//! MIO II. 2.5 %, zdravstveno 7.5 % na osnovicu, porez 20 %, pa prirez
//! po stopi grada primatelja (ista tablica kao za plaće). Autorski
//! honorar prvo umanjuje bruto za 30 % normiranih troškova.

use crate::payroll::prirez_stopa;
use crate::{round2, ExplainStep};
use serde::{Deserialize, Serialize};

/// MIO I. stup za drugi dohodak, %.
pub const DD_MIO_1_PCT: f64 = 7.5;
/// MIO II. stup za drugi dohodak, %.
pub const DD_MIO_2_PCT: f64 = 2.5;
/// Zdravstveno za drugi dohodak, %.
pub const DD_ZDRAVSTVENO_PCT: f64 = 7.5;
/// Porez na dohodak za drugi dohodak, %.
pub const DD_POREZ_PCT: f64 = 20.0;
/// Normirani troškovi autorskog honorara, %.
pub const AUTORSKI_NORMIRANI_PCT: f64 = 30.0;

/// Rezultat obračuna drugog dohotka.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrugiDohodakResult {
    pub bruto: f64,
    /// Grad primatelja — određuje stopu prireza; prazno = bez prireza.
    pub city: String,
    /// Normirani trošak — samo kod autorskog honorara, inače 0.
    pub normirani_trosak: f64,
    pub osnovica_za_doprinose: f64,
    pub mio_stup_1: f64,
    pub mio_stup_2: f64,
    pub zdravstveno: f64,
    pub dohodak: f64,
    pub porez: f64,
    pub prirez: f64,
    pub neto: f64,
    pub explain: Vec<ExplainStep>,
    pub requires_approval: bool,
}

/// Obračun drugog dohotka — fiksne stope, bez AI.
#[derive(Debug, Clone, Default)]
pub struct DrugiDohodakEngine;

impl DrugiDohodakEngine {
    pub fn new() -> Self {
        Self
    }

    /// Ugovor o djelu: doprinosi na puni bruto, porez 20 % pa prirez
    /// po stopi grada.
    pub fn ugovor_o_djelu(&self, bruto_naknada: f64, city: &str) -> DrugiDohodakResult {
        self.obracun(bruto_naknada, 0.0, city)
    }

    /// Autorski honorar: 30 % normiranih troškova prije doprinosa.
    pub fn autorski_honorar(&self, bruto_honorar: f64, city: &str) -> DrugiDohodakResult {
        let normirani = round2(bruto_honorar * AUTORSKI_NORMIRANI_PCT / 100.0);
        self.obracun(bruto_honorar, normirani, city)
    }

    fn obracun(&self, bruto: f64, normirani_trosak: f64, city: &str) -> DrugiDohodakResult {
        let osnovica = round2(bruto - normirani_trosak);
        let mio_1 = round2(osnovica * DD_MIO_1_PCT / 100.0);
        let mio_2 = round2(osnovica * DD_MIO_2_PCT / 100.0);
        let zdravstveno = round2(osnovica * DD_ZDRAVSTVENO_PCT / 100.0);
        let dohodak = round2(osnovica - mio_1 - mio_2 - zdravstveno);
        let porez = round2(dohodak * DD_POREZ_PCT / 100.0);
        let stopa_prireza = prirez_stopa(city);
        let prirez = round2(porez * stopa_prireza / 100.0);
        // Normirani trošak umanjuje samo osnovicu, isplaćuje se u cijelosti.
        let neto = round2(bruto - mio_1 - mio_2 - zdravstveno - porez - prirez);

        let mut explain = Vec::new();
        if normirani_trosak > 0.0 {
            explain.push(ExplainStep::new("Normirani trošak (30 %)", normirani_trosak));
        }
        explain.extend([
            ExplainStep::new("Osnovica za doprinose", osnovica),
            ExplainStep::new("MIO I. stup (7.5 %)", mio_1),
            ExplainStep::new("MIO II. stup (2.5 %)", mio_2),
            ExplainStep::new("Zdravstveno (7.5 %)", zdravstveno),
            ExplainStep::new("Dohodak", dohodak),
            ExplainStep::new("Porez (20 %)", porez),
            ExplainStep::new(
                format!("Prirez ({} — {:.0} %)", city, stopa_prireza),
                prirez,
            ),
            ExplainStep::new("Neto za isplatu", neto),
        ]);

        DrugiDohodakResult {
            bruto,
            city: city.to_string(),
            normirani_trosak,
            osnovica_za_doprinose: osnovica,
            mio_stup_1: mio_1,
            mio_stup_2: mio_2,
            zdravstveno,
            dohodak,
            porez,
            prirez,
            neto,
            explain,
            requires_approval: true,
        }
    }
}
