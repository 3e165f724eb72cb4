//! Porez na dobit — PD obrazac.
//!
//! Stope (Zakon o porezu na dobit NN 177/04–151/25, čl. 28.): 10 % za
//! prihode do 1 000 000 EUR, 18 % iznad. Osnovica = dobit + uvećanja −
//! umanjenja, nikad negativna. Razlika prema predujmovima daje uplatu
//! ili povrat.

use crate::{round2, ExplainStep};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prag prihoda za nižu stopu, EUR.
pub const PRAG_PRIHODA_NIZA_STOPA: f64 = 1_000_000.0;
/// Niža stopa poreza na dobit, %.
pub const STOPA_NIZA: f64 = 10.0;
/// Viša stopa poreza na dobit, %.
pub const STOPA_VISA: f64 = 18.0;

/// PD obrazac — rezultat godišnjeg obračuna poreza na dobit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdObrazac {
    pub godina: i32,
    pub ukupni_prihodi: f64,
    pub ukupni_rashodi: f64,
    pub dobit_prije_oporezivanja: f64,
    pub ukupna_uvecanja: f64,
    pub ukupna_umanjenja: f64,
    pub porezna_osnovica: f64,
    pub stopa: f64,
    pub porez_na_dobit: f64,
    pub placeni_predujmovi: f64,
    pub razlika_za_uplatu: f64,
    pub razlika_za_povrat: f64,
    pub explain: Vec<ExplainStep>,
    pub requires_approval: bool,
}

/// Deterministički obračun poreza na dobit.
#[derive(Debug, Clone, Default)]
pub struct PorezDobitiEngine;

impl PorezDobitiEngine {
    pub fn new() -> Self {
        Self
    }

    /// Obračun PD obrasca. `uvecanja` i `umanjenja` su imenovane stavke
    /// (reprezentacija 50 %, kazne, dividende...) — zbrajaju se u osnovicu.
    pub fn calculate(
        &self,
        godina: i32,
        ukupni_prihodi: f64,
        ukupni_rashodi: f64,
        uvecanja: &BTreeMap<String, f64>,
        umanjenja: &BTreeMap<String, f64>,
        placeni_predujmovi: f64,
    ) -> PdObrazac {
        let dobit = round2(ukupni_prihodi - ukupni_rashodi);
        let ukupna_uvecanja = round2(uvecanja.values().sum());
        let ukupna_umanjenja = round2(umanjenja.values().sum());
        let osnovica = round2((dobit + ukupna_uvecanja - ukupna_umanjenja).max(0.0));

        let stopa = if ukupni_prihodi <= PRAG_PRIHODA_NIZA_STOPA {
            STOPA_NIZA
        } else {
            STOPA_VISA
        };
        let porez = round2(osnovica * stopa / 100.0);

        let razlika = round2(porez - placeni_predujmovi);
        let (za_uplatu, za_povrat) = if razlika > 0.0 {
            (razlika, 0.0)
        } else {
            (0.0, round2(-razlika))
        };

        let mut explain = vec![
            ExplainStep::new("Dobit prije oporezivanja", dobit),
            ExplainStep::new("Uvećanja osnovice", ukupna_uvecanja),
            ExplainStep::new("Umanjenja osnovice", ukupna_umanjenja),
            ExplainStep::new("Porezna osnovica", osnovica),
            ExplainStep::new(format!("Porez na dobit ({:.0} %)", stopa), porez),
        ];
        if placeni_predujmovi > 0.0 {
            explain.push(ExplainStep::new("Plaćeni predujmovi", placeni_predujmovi));
        }
        explain.push(ExplainStep::new("Za uplatu", za_uplatu));
        explain.push(ExplainStep::new("Za povrat", za_povrat));

        PdObrazac {
            godina,
            ukupni_prihodi,
            ukupni_rashodi,
            dobit_prije_oporezivanja: dobit,
            ukupna_uvecanja,
            ukupna_umanjenja,
            porezna_osnovica: osnovica,
            stopa,
            porez_na_dobit: porez,
            placeni_predujmovi,
            razlika_za_uplatu: za_uplatu,
            razlika_za_povrat: za_povrat,
            explain,
            requires_approval: true,
        }
    }

    /// Kraći poziv bez korekcijskih stavki i predujmova.
    pub fn calculate_simple(
        &self,
        godina: i32,
        ukupni_prihodi: f64,
        ukupni_rashodi: f64,
    ) -> PdObrazac {
        self.calculate(
            godina,
            ukupni_prihodi,
            ukupni_rashodi,
            &BTreeMap::new(),
            &BTreeMap::new(),
            0.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mala_firma_10_posto() {
        let pd = PorezDobitiEngine::new().calculate_simple(2025, 500_000.0, 400_000.0);
        assert_eq!(pd.dobit_prije_oporezivanja, 100_000.0);
        assert_eq!(pd.stopa, 10.0);
        assert_eq!(pd.porezna_osnovica, 100_000.0);
        assert_eq!(pd.porez_na_dobit, 10_000.0);
        assert_eq!(pd.razlika_za_uplatu, 10_000.0);
        assert!(pd.requires_approval);
    }

    #[test]
    fn velika_firma_18_posto() {
        let pd = PorezDobitiEngine::new().calculate_simple(2025, 2_000_000.0, 1_500_000.0);
        assert_eq!(pd.dobit_prije_oporezivanja, 500_000.0);
        assert_eq!(pd.stopa, 18.0);
        assert_eq!(pd.porez_na_dobit, 90_000.0);
    }

    #[test]
    fn uvecanja_i_umanjenja() {
        let mut uvecanja = BTreeMap::new();
        uvecanja.insert("reprezentacija_50pct".to_string(), 5_000.0);
        uvecanja.insert("kazne".to_string(), 2_000.0);
        let mut umanjenja = BTreeMap::new();
        umanjenja.insert("dividende".to_string(), 3_000.0);

        let pd =
            PorezDobitiEngine::new().calculate(2025, 800_000.0, 700_000.0, &uvecanja, &umanjenja, 0.0);
        assert_eq!(pd.ukupna_uvecanja, 7_000.0);
        assert_eq!(pd.ukupna_umanjenja, 3_000.0);
        assert_eq!(pd.porezna_osnovica, 104_000.0);
        assert_eq!(pd.porez_na_dobit, 10_400.0);
    }

    #[test]
    fn predujmovi_uplata_i_povrat() {
        let engine = PorezDobitiEngine::new();
        let pd = engine.calculate(
            2025,
            600_000.0,
            500_000.0,
            &BTreeMap::new(),
            &BTreeMap::new(),
            8_000.0,
        );
        assert_eq!(pd.porez_na_dobit, 10_000.0);
        assert_eq!(pd.razlika_za_uplatu, 2_000.0);
        assert_eq!(pd.razlika_za_povrat, 0.0);

        let pd = engine.calculate(
            2025,
            600_000.0,
            500_000.0,
            &BTreeMap::new(),
            &BTreeMap::new(),
            12_000.0,
        );
        assert_eq!(pd.razlika_za_uplatu, 0.0);
        assert_eq!(pd.razlika_za_povrat, 2_000.0);
    }

    #[test]
    fn gubitak_bez_poreza() {
        let pd = PorezDobitiEngine::new().calculate_simple(2025, 400_000.0, 500_000.0);
        assert_eq!(pd.dobit_prije_oporezivanja, -100_000.0);
        assert_eq!(pd.porezna_osnovica, 0.0);
        assert_eq!(pd.porez_na_dobit, 0.0);
    }

    #[test]
    fn prag_tocno_milijun() {
        let engine = PorezDobitiEngine::new();
        assert_eq!(
            engine.calculate_simple(2025, 1_000_000.0, 900_000.0).stopa,
            10.0
        );
        assert_eq!(
            engine.calculate_simple(2025, 1_000_001.0, 900_000.0).stopa,
            18.0
        );
    }
}
