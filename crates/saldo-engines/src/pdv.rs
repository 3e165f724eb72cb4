//! PDV obračun: ulazni i izlazni računi po stopama → PPO obrazac.
//!
//! Stope PDV-a (Zakon o PDV-u NN 73/13–151/25): 25 % opća, 13 % i 5 %
//! snižene, 0 % oslobođenja. Reverse-charge izlazi idu u EU isporuke,
//! nikad u obvezu. Invariant: točno jedna od `za_uplatu` / `za_povrat`
//! je pozitivna, druga je nula.

use crate::{round2, ExplainStep};
use serde::{Deserialize, Serialize};

/// Dozvoljene stope PDV-a.
pub const PDV_STOPE: [u8; 4] = [0, 5, 13, 25];

/// Strana stavke: ulazni račun (pretporez) ili izlazni račun (obveza).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PdvTip {
    Ulazni,
    Izlazni,
}

/// Jedna stavka PDV obračuna.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdvStavka {
    pub tip: PdvTip,
    pub osnovica: f64,
    pub pdv_stopa: u8,
    #[serde(default)]
    pub pdv_iznos: f64,
    #[serde(default)]
    pub eu_transakcija: bool,
    #[serde(default)]
    pub reverse_charge: bool,
}

impl PdvStavka {
    pub fn izlazni(osnovica: f64, pdv_stopa: u8, pdv_iznos: f64) -> Self {
        Self {
            tip: PdvTip::Izlazni,
            osnovica,
            pdv_stopa,
            pdv_iznos,
            eu_transakcija: false,
            reverse_charge: false,
        }
    }

    pub fn ulazni(osnovica: f64, pdv_stopa: u8, pdv_iznos: f64) -> Self {
        Self {
            tip: PdvTip::Ulazni,
            osnovica,
            pdv_stopa,
            pdv_iznos,
            eu_transakcija: false,
            reverse_charge: false,
        }
    }
}

/// PPO obrazac — kumulativi po stopama na objema stranama.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PpoObrazac {
    pub izlazni_25_osnovica: f64,
    pub izlazni_25_pdv: f64,
    pub izlazni_13_osnovica: f64,
    pub izlazni_13_pdv: f64,
    pub izlazni_5_osnovica: f64,
    pub izlazni_5_pdv: f64,
    pub izlazni_0_osnovica: f64,
    pub ulazni_25_osnovica: f64,
    pub ulazni_25_pdv: f64,
    pub ulazni_13_osnovica: f64,
    pub ulazni_13_pdv: f64,
    pub ulazni_5_osnovica: f64,
    pub ulazni_5_pdv: f64,
    /// EU isporuke (reverse-charge izlazi) — ne ulaze u obvezu.
    pub eu_isporuke_osnovica: f64,
    pub reverse_charge_izdani: f64,
    pub ukupna_obveza: f64,
    pub ukupni_pretporez: f64,
    pub za_uplatu: f64,
    pub za_povrat: f64,
    pub warnings: Vec<String>,
    pub explain: Vec<ExplainStep>,
    pub requires_approval: bool,
}

/// Deterministički PDV obračun — zbrajanje po stopama, bez AI.
#[derive(Debug, Clone, Default)]
pub struct PdvPrijavaEngine;

impl PdvPrijavaEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn calculate(&self, stavke: &[PdvStavka]) -> PpoObrazac {
        let mut ppo = PpoObrazac {
            requires_approval: true,
            ..Default::default()
        };

        for s in stavke {
            if !PDV_STOPE.contains(&s.pdv_stopa) {
                ppo.warnings
                    .push(format!("Nepoznata stopa PDV-a: {} %", s.pdv_stopa));
                continue;
            }

            if s.reverse_charge && s.tip == PdvTip::Izlazni {
                ppo.eu_isporuke_osnovica = round2(ppo.eu_isporuke_osnovica + s.osnovica);
                ppo.reverse_charge_izdani = round2(ppo.reverse_charge_izdani + s.osnovica);
                continue;
            }

            match (s.tip, s.pdv_stopa) {
                (PdvTip::Izlazni, 25) => {
                    ppo.izlazni_25_osnovica = round2(ppo.izlazni_25_osnovica + s.osnovica);
                    ppo.izlazni_25_pdv = round2(ppo.izlazni_25_pdv + s.pdv_iznos);
                }
                (PdvTip::Izlazni, 13) => {
                    ppo.izlazni_13_osnovica = round2(ppo.izlazni_13_osnovica + s.osnovica);
                    ppo.izlazni_13_pdv = round2(ppo.izlazni_13_pdv + s.pdv_iznos);
                }
                (PdvTip::Izlazni, 5) => {
                    ppo.izlazni_5_osnovica = round2(ppo.izlazni_5_osnovica + s.osnovica);
                    ppo.izlazni_5_pdv = round2(ppo.izlazni_5_pdv + s.pdv_iznos);
                }
                (PdvTip::Izlazni, _) => {
                    ppo.izlazni_0_osnovica = round2(ppo.izlazni_0_osnovica + s.osnovica);
                }
                (PdvTip::Ulazni, 25) => {
                    ppo.ulazni_25_osnovica = round2(ppo.ulazni_25_osnovica + s.osnovica);
                    ppo.ulazni_25_pdv = round2(ppo.ulazni_25_pdv + s.pdv_iznos);
                }
                (PdvTip::Ulazni, 13) => {
                    ppo.ulazni_13_osnovica = round2(ppo.ulazni_13_osnovica + s.osnovica);
                    ppo.ulazni_13_pdv = round2(ppo.ulazni_13_pdv + s.pdv_iznos);
                }
                (PdvTip::Ulazni, 5) => {
                    ppo.ulazni_5_osnovica = round2(ppo.ulazni_5_osnovica + s.osnovica);
                    ppo.ulazni_5_pdv = round2(ppo.ulazni_5_pdv + s.pdv_iznos);
                }
                (PdvTip::Ulazni, _) => {}
            }
        }

        ppo.ukupna_obveza = round2(ppo.izlazni_25_pdv + ppo.izlazni_13_pdv + ppo.izlazni_5_pdv);
        ppo.ukupni_pretporez = round2(ppo.ulazni_25_pdv + ppo.ulazni_13_pdv + ppo.ulazni_5_pdv);

        let razlika = round2(ppo.ukupna_obveza - ppo.ukupni_pretporez);
        if razlika > 0.0 {
            ppo.za_uplatu = razlika;
            ppo.za_povrat = 0.0;
        } else {
            ppo.za_uplatu = 0.0;
            ppo.za_povrat = round2(-razlika);
        }

        ppo.explain = vec![
            ExplainStep::new("Ukupna obveza (izlazni PDV)", ppo.ukupna_obveza),
            ExplainStep::new("Ukupni pretporez (ulazni PDV)", ppo.ukupni_pretporez),
            ExplainStep::new("EU isporuke (reverse charge)", ppo.eu_isporuke_osnovica),
            ExplainStep::new("Za uplatu", ppo.za_uplatu),
            ExplainStep::new("Za povrat", ppo.za_povrat),
        ];

        ppo
    }
}
