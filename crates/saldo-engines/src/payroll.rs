//! Payroll engine: bruto → neto obračun plaće.
//!
//! Formula (ZoPD NN 152/24, Zakon o doprinosima NN 84/08–114/23):
//!   1. MIO I. stup  = bruto × 15 % (20 % when no second pillar)
//!   2. MIO II. stup = bruto × 5 %
//!   3. dohodak      = bruto − MIO ukupno
//!   4. osobni odbitak = 560 + faktori (djeca, uzdržavani, invalidnost)
//!   5. porezna osnovica = max(0, dohodak − odbitak)
//!   6. porez = 20 % do 4 200 EUR osnovice + 30 % iznad
//!   7. prirez = porez × stopa grada
//!   8. neto = bruto − MIO − porez − prirez
//!   9. zdravstveno = bruto × 16.5 % (teret poslodavca)
//!
//! Invariant for every calculation:
//!   bruto = neto + doprinosi iz plaće + porez + prirez (na dvije decimale).

use crate::{round2, ExplainStep};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Statutory payroll rates, one table so a law change is a one-line diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollRates {
    /// MIO I. stup, % bruta (Zakon o doprinosima, čl. 36.).
    pub mio_stup_1_pct: f64,
    /// MIO II. stup, % bruta (Zakon o obveznim mirovinskim fondovima).
    pub mio_stup_2_pct: f64,
    /// Zdravstveno osiguranje NA plaću, teret poslodavca (čl. 14.).
    pub zdravstveno_pct: f64,
    /// Niža stopa poreza na dohodak (ZoPD čl. 19., NN 152/24).
    pub porez_stopa_niza_pct: f64,
    /// Viša stopa poreza na dohodak.
    pub porez_stopa_visa_pct: f64,
    /// Mjesečni prag za višu stopu, EUR.
    pub porez_prag_mjesecni: f64,
    /// Osnovni osobni odbitak, EUR (ZoPD čl. 14.).
    pub osnovni_osobni_odbitak: f64,
    /// Minimalna bruto plaća, EUR (Uredba o visini minimalne plaće).
    pub minimalna_bruto: f64,
}

impl Default for PayrollRates {
    fn default() -> Self {
        Self {
            mio_stup_1_pct: 15.0,
            mio_stup_2_pct: 5.0,
            zdravstveno_pct: 16.5,
            porez_stopa_niza_pct: 20.0,
            porez_stopa_visa_pct: 30.0,
            porez_prag_mjesecni: 4_200.0,
            osnovni_osobni_odbitak: 560.0,
            minimalna_bruto: 970.0,
        }
    }
}

/// Faktori osobnog odbitka za djecu (ZoPD čl. 14. st. 4.): prvo dijete 0.7,
/// drugo 1.0, treće 1.4, četvrto 1.9, peto 2.5 i dalje po tablici.
pub const FAKTORI_DJECA: [f64; 9] = [0.7, 1.0, 1.4, 1.9, 2.5, 3.2, 4.0, 4.9, 5.9];

/// Faktor po uzdržavanom članu uže obitelji.
pub const FAKTOR_UZDRZAVANI: f64 = 0.7;

/// Dodatni faktor za invalidnost radnika.
pub const FAKTOR_INVALIDNOST: f64 = 0.4;

/// Prirez po gradovima, % na porez. Gradovi izvan tablice: 0 %.
pub const PRIREZ_TABLICA: [(&str, f64); 6] = [
    ("zagreb", 18.0),
    ("split", 15.0),
    ("rijeka", 14.0),
    ("osijek", 13.0),
    ("zadar", 12.0),
    ("velika gorica", 12.0),
];

pub fn prirez_stopa(city: &str) -> f64 {
    let needle = city.trim().to_lowercase();
    PRIREZ_TABLICA
        .iter()
        .find(|(grad, _)| *grad == needle)
        .map(|(_, stopa)| *stopa)
        .unwrap_or(0.0)
}

/// Radnik za obračun plaće.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub name: String,
    pub bruto_placa: f64,
    #[serde(default)]
    pub city: String,
    /// Broj djece (faktori osobnog odbitka).
    #[serde(default)]
    pub djeca: u32,
    /// Broj uzdržavanih članova uže obitelji.
    #[serde(default)]
    pub uzdrzavani_clanovi: u32,
    /// Članstvo u II. mirovinskom stupu; kad je `false`, svih 20 % ide u I. stup.
    #[serde(default = "default_true")]
    pub mio_stup_2: bool,
    /// Datum rođenja — osnova za olakšicu za mlade.
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    /// Invalidnost radnika (+0.4 × osnovni odbitak).
    #[serde(default)]
    pub invalid: bool,
}

fn default_true() -> bool {
    true
}

impl Employee {
    pub fn new(name: impl Into<String>, bruto_placa: f64, city: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bruto_placa,
            city: city.into(),
            djeca: 0,
            uzdrzavani_clanovi: 0,
            mio_stup_2: true,
            birth_date: None,
            invalid: false,
        }
    }
}

/// Rezultat obračuna plaće. Svaki iznos je formula, nijedan nije AI izlaz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollResult {
    pub employee_name: String,
    pub bruto_placa: f64,
    pub mio_stup_1: f64,
    pub mio_stup_2: f64,
    pub ukupno_doprinosi_iz: f64,
    pub dohodak: f64,
    pub osobni_odbitak: f64,
    pub porezna_osnovica: f64,
    pub porez: f64,
    pub prirez: f64,
    /// Postotak olakšice za mlade (100 = puno oslobođenje, 50 = pola, 0 = nema).
    pub olaksica_mladi_pct: f64,
    pub ukupno_porez_prirez: f64,
    pub neto_placa: f64,
    /// Zdravstveno NA plaću — teret poslodavca, ne ulazi u neto.
    pub zdravstveno: f64,
    pub ukupni_trosak_poslodavca: f64,
    pub warnings: Vec<String>,
    pub explain: Vec<ExplainStep>,
    /// Uvijek `true`: obračun plaće NIKAD ne knjiži bez odobrenja.
    pub requires_approval: bool,
}

/// Deterministički obračun plaće.
#[derive(Debug, Clone)]
pub struct PayrollEngine {
    rates: PayrollRates,
}

impl Default for PayrollEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PayrollEngine {
    pub fn new() -> Self {
        Self {
            rates: PayrollRates::default(),
        }
    }

    pub fn with_rates(rates: PayrollRates) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> &PayrollRates {
        &self.rates
    }

    /// Obračun za današnji datum (olakšica za mlade prema današnjoj dobi).
    pub fn calculate(&self, emp: &Employee) -> PayrollResult {
        self.calculate_za_datum(emp, Utc::now().date_naive())
    }

    /// Obračun za zadani datum — isti ulaz i datum uvijek daju isti izlaz.
    pub fn calculate_za_datum(&self, emp: &Employee, datum: NaiveDate) -> PayrollResult {
        let r = &self.rates;
        let bruto = emp.bruto_placa;
        let mut warnings = Vec::new();
        let mut explain = Vec::new();

        if bruto < r.minimalna_bruto {
            warnings.push(format!(
                "Bruto {:.2} EUR je ispod minimalne plaće ({:.2} EUR)",
                bruto, r.minimalna_bruto
            ));
        }

        // 1.+2. MIO doprinosi iz plaće
        let (mio_1, mio_2) = if emp.mio_stup_2 {
            (
                round2(bruto * r.mio_stup_1_pct / 100.0),
                round2(bruto * r.mio_stup_2_pct / 100.0),
            )
        } else {
            // Bez II. stupa svih 20 % ide u I. stup.
            (
                round2(bruto * (r.mio_stup_1_pct + r.mio_stup_2_pct) / 100.0),
                0.0,
            )
        };
        let doprinosi_iz = round2(mio_1 + mio_2);
        explain.push(ExplainStep::new("MIO I. stup", mio_1));
        explain.push(ExplainStep::new("MIO II. stup", mio_2));

        // 3. Dohodak
        let dohodak = round2(bruto - doprinosi_iz);
        explain.push(ExplainStep::new("Dohodak (bruto − doprinosi)", dohodak));

        // 4. Osobni odbitak
        let osnovni = r.osnovni_osobni_odbitak;
        let mut odbitak = osnovni;
        for i in 0..emp.djeca as usize {
            let faktor = FAKTORI_DJECA
                .get(i)
                .copied()
                .unwrap_or_else(|| FAKTORI_DJECA[FAKTORI_DJECA.len() - 1]);
            odbitak += faktor * osnovni;
        }
        odbitak += emp.uzdrzavani_clanovi as f64 * FAKTOR_UZDRZAVANI * osnovni;
        if emp.invalid {
            odbitak += FAKTOR_INVALIDNOST * osnovni;
        }
        let odbitak = round2(odbitak);
        explain.push(ExplainStep::new("Osobni odbitak", odbitak));

        // 5. Porezna osnovica
        let osnovica = round2((dohodak - odbitak).max(0.0));
        explain.push(ExplainStep::new("Porezna osnovica", osnovica));

        // 6. Porez — progresivno
        let porez = if osnovica <= r.porez_prag_mjesecni {
            round2(osnovica * r.porez_stopa_niza_pct / 100.0)
        } else {
            round2(
                r.porez_prag_mjesecni * r.porez_stopa_niza_pct / 100.0
                    + (osnovica - r.porez_prag_mjesecni) * r.porez_stopa_visa_pct / 100.0,
            )
        };
        explain.push(ExplainStep::new("Porez na dohodak", porez));

        // 7. Prirez
        let stopa_prireza = prirez_stopa(&emp.city);
        let prirez = round2(porez * stopa_prireza / 100.0);
        explain.push(ExplainStep::new(
            format!("Prirez ({} — {:.0} %)", emp.city, stopa_prireza),
            prirez,
        ));

        // Olakšica za mlade: ≤25 godina 100 %, 26–30 godina 50 %.
        let olaksica_pct = olaksica_mladi_pct(emp.birth_date, datum);
        let ukupno_porez_prirez = match olaksica_pct {
            100.0 => 0.0,
            50.0 => round2((porez + prirez) * 0.5),
            _ => round2(porez + prirez),
        };
        if olaksica_pct > 0.0 {
            explain.push(ExplainStep::new(
                format!("Olakšica za mlade ({:.0} %)", olaksica_pct),
                round2(porez + prirez - ukupno_porez_prirez),
            ));
        }

        // 8. Neto
        let neto = round2(bruto - doprinosi_iz - ukupno_porez_prirez);
        explain.push(ExplainStep::new("Neto za isplatu", neto));

        // 9. Teret poslodavca
        let zdravstveno = round2(bruto * r.zdravstveno_pct / 100.0);
        let ukupni_trosak = round2(bruto + zdravstveno);
        explain.push(ExplainStep::new("Zdravstveno (na plaću)", zdravstveno));
        explain.push(ExplainStep::new("Ukupni trošak poslodavca", ukupni_trosak));

        PayrollResult {
            employee_name: emp.name.clone(),
            bruto_placa: bruto,
            mio_stup_1: mio_1,
            mio_stup_2: mio_2,
            ukupno_doprinosi_iz: doprinosi_iz,
            dohodak,
            osobni_odbitak: odbitak,
            porezna_osnovica: osnovica,
            porez,
            prirez,
            olaksica_mladi_pct: olaksica_pct,
            ukupno_porez_prirez,
            neto_placa: neto,
            zdravstveno,
            ukupni_trosak_poslodavca: ukupni_trosak,
            warnings,
            explain,
            requires_approval: true,
        }
    }

    /// Katalog neoporezivih naknada (Pravilnik o neoporezivim primicima NN 1/23).
    /// Samo čitanje — iznose određuje pravilnik, ne model.
    pub fn neoporezive_naknade(&self, radnih_dana: u32) -> NeoporeziveNaknade {
        NeoporeziveNaknade {
            topli_obrok_po_danu: TOPLI_OBROK_PO_DANU,
            topli_obrok_max: round2(TOPLI_OBROK_PO_DANU * radnih_dana as f64),
            dnevnica_rh_puna: DNEVNICA_RH_PUNA,
            dnevnica_rh_pola: DNEVNICA_RH_POLA,
            km_naknada_max: KM_NAKNADA_MAX,
            regres_god: REGRES_GOD,
            dar_dijete_god: DAR_DIJETE_GOD,
            bozicnica_god: BOZICNICA_GOD,
        }
    }
}

fn olaksica_mladi_pct(birth_date: Option<NaiveDate>, datum: NaiveDate) -> f64 {
    let Some(rodjen) = birth_date else {
        return 0.0;
    };
    let mut godine = datum.year() - rodjen.year();
    if (datum.month(), datum.day()) < (rodjen.month(), rodjen.day()) {
        godine -= 1;
    }
    if godine <= 25 {
        100.0
    } else if godine <= 30 {
        50.0
    } else {
        0.0
    }
}

/// Neoporezivi limiti (Pravilnik NN 1/23, čl. 6. i 7.).
pub const TOPLI_OBROK_PO_DANU: f64 = 7.96;
pub const DNEVNICA_RH_PUNA: f64 = 26.55;
pub const DNEVNICA_RH_POLA: f64 = 13.28;
pub const KM_NAKNADA_MAX: f64 = 0.30;
pub const REGRES_GOD: f64 = 331.81;
pub const DAR_DIJETE_GOD: f64 = 133.0;
pub const BOZICNICA_GOD: f64 = 331.81;

/// Read-only tablica neoporezivih naknada.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeoporeziveNaknade {
    pub topli_obrok_po_danu: f64,
    pub topli_obrok_max: f64,
    pub dnevnica_rh_puna: f64,
    pub dnevnica_rh_pola: f64,
    pub km_naknada_max: f64,
    pub regres_god: f64,
    pub dar_dijete_god: f64,
    pub bozicnica_god: f64,
}
