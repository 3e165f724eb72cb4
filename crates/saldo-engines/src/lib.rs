//! saldo-engines: deterministic Croatian accounting engines.
//!
//! Every figure produced here is a closed-form formula over the inputs.
//! These engines never import, reference, or condition on the LLM layer:
//! the model proposes *accounts* and *narratives*, the engines produce
//! *amounts*. Identical input yields bit-identical output on any platform.
//!
//! | Engine              | Statutory source (NN)                          |
//! |---------------------|------------------------------------------------|
//! | payroll             | ZoPD 152/24, Zakon o doprinosima 84/08–114/23  |
//! | pdv                 | Zakon o PDV-u 73/13–151/25                     |
//! | amortizacija        | Zakon o porezu na dobit 177/04, čl. 12.        |
//! | porez_dobit         | Zakon o porezu na dobit 177/04–151/25          |
//! | putni_nalozi        | Pravilnik o neoporezivim primicima 1/23        |
//! | blagajna            | Zakon o sprječavanju pranja novca, čl. 30.     |
//! | drugi_dohodak       | ZoPD čl. 39., Zakon o doprinosima čl. 111.     |

pub mod amortizacija;
pub mod blagajna;
pub mod drugi_dohodak;
pub mod payroll;
pub mod pdv;
pub mod porez_dobit;
pub mod putni_nalozi;

use serde::{Deserialize, Serialize};

/// One intermediate figure of a calculation, so the chat layer can narrate
/// the result without re-deriving any number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainStep {
    pub stavka: String,
    pub iznos: f64,
}

impl ExplainStep {
    pub fn new(stavka: impl Into<String>, iznos: f64) -> Self {
        Self {
            stavka: stavka.into(),
            iznos,
        }
    }
}

/// Round to two decimals (cents). All monetary outputs pass through this.
#[inline]
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
