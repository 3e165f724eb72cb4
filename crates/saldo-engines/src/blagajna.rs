//! Blagajna: validacija gotovinskog prometa.
//!
//! AML pravilo (Zakon o sprječavanju pranja novca i financiranja
//! terorizma, čl. 30.): pojedinačna gotovinska transakcija od 10 000 EUR
//! ili više je zakonski zabranjena — validator je odbija, to nije AI
//! odluka. Ispod praga validira početno stanje, kumulativne tokove i
//! završno stanje blagajničkog dnevnika.

use crate::{round2, ExplainStep};
use serde::{Deserialize, Serialize};

/// AML zabrana gotovinskog prometa, EUR (čl. 30.).
pub const AML_LIMIT_EUR: f64 = 10_000.0;

/// Smjer blagajničke transakcije.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlagajnaVrsta {
    Uplata,
    Isplata,
}

/// Jedna blagajnička transakcija.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlagajnaTx {
    pub iznos: f64,
    pub vrsta: BlagajnaVrsta,
    #[serde(default)]
    pub opis: String,
}

/// Rezultat validacije jedne transakcije ili dnevnika.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlagajnaValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub explain: Vec<ExplainStep>,
}

/// Obračun blagajničkog dnevnika.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlagajnaDnevnik {
    pub pocetno_stanje: f64,
    pub ukupne_uplate: f64,
    pub ukupne_isplate: f64,
    pub izracunato_zavrsno: f64,
    pub prijavljeno_zavrsno: f64,
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub explain: Vec<ExplainStep>,
    pub requires_approval: bool,
}

/// Validator blagajne — zakonska pravila, bez AI.
#[derive(Debug, Clone, Default)]
pub struct BlagajnaValidator;

impl BlagajnaValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validira jednu transakciju. Iznos ≥ 10 000 EUR je zabranjen.
    pub fn validate_transaction(&self, tx: &BlagajnaTx) -> BlagajnaValidation {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if tx.iznos < 0.0 {
            errors.push("Iznos transakcije ne može biti negativan".to_string());
        }
        if tx.iznos >= AML_LIMIT_EUR {
            errors.push(format!(
                "ZABRANA (AML čl. 30.): gotovinska transakcija od {:.2} EUR ≥ limita {:.2} EUR",
                tx.iznos, AML_LIMIT_EUR
            ));
        } else if tx.iznos >= AML_LIMIT_EUR * 0.9 {
            warnings.push(format!(
                "Transakcija {:.2} EUR se približava AML limitu od {:.2} EUR",
                tx.iznos, AML_LIMIT_EUR
            ));
        }

        BlagajnaValidation {
            valid: errors.is_empty(),
            errors,
            warnings,
            explain: vec![ExplainStep::new("Iznos transakcije", tx.iznos)],
        }
    }

    /// Validira cijeli dnevnik: svaka transakcija pojedinačno plus
    /// početno stanje + uplate − isplate = završno stanje.
    pub fn validate_dnevnik(
        &self,
        pocetno_stanje: f64,
        transakcije: &[BlagajnaTx],
        prijavljeno_zavrsno: f64,
    ) -> BlagajnaDnevnik {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let mut uplate = 0.0;
        let mut isplate = 0.0;
        for (i, tx) in transakcije.iter().enumerate() {
            let v = self.validate_transaction(tx);
            for e in v.errors {
                errors.push(format!("Stavka {}: {}", i + 1, e));
            }
            warnings.extend(v.warnings);
            if v.valid {
                match tx.vrsta {
                    BlagajnaVrsta::Uplata => uplate += tx.iznos,
                    BlagajnaVrsta::Isplata => isplate += tx.iznos,
                }
            }
        }
        let uplate = round2(uplate);
        let isplate = round2(isplate);
        let izracunato = round2(pocetno_stanje + uplate - isplate);

        if izracunato < 0.0 {
            errors.push(format!(
                "Negativno stanje blagajne: {:.2} EUR — isplate premašuju raspoloživa sredstva",
                izracunato
            ));
        }
        if (izracunato - prijavljeno_zavrsno).abs() > 0.01 {
            errors.push(format!(
                "Završno stanje se ne slaže: izračunato {:.2} EUR, prijavljeno {:.2} EUR",
                izracunato, prijavljeno_zavrsno
            ));
        }

        BlagajnaDnevnik {
            pocetno_stanje,
            ukupne_uplate: uplate,
            ukupne_isplate: isplate,
            izracunato_zavrsno: izracunato,
            prijavljeno_zavrsno,
            valid: errors.is_empty(),
            errors,
            warnings,
            explain: vec![
                ExplainStep::new("Početno stanje", pocetno_stanje),
                ExplainStep::new("Ukupne uplate", uplate),
                ExplainStep::new("Ukupne isplate", isplate),
                ExplainStep::new("Izračunato završno stanje", izracunato),
            ],
            requires_approval: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isplata(iznos: f64) -> BlagajnaTx {
        BlagajnaTx {
            iznos,
            vrsta: BlagajnaVrsta::Isplata,
            opis: String::new(),
        }
    }

    fn uplata(iznos: f64) -> BlagajnaTx {
        BlagajnaTx {
            iznos,
            vrsta: BlagajnaVrsta::Uplata,
            opis: String::new(),
        }
    }

    #[test]
    fn aml_limit_tocno_10000_zabranjen() {
        let v = BlagajnaValidator::new().validate_transaction(&isplata(10_000.0));
        assert!(!v.valid);
        assert!(v.errors.iter().any(|e| e.contains("ZABRANA")));
    }

    #[test]
    fn ispod_limita_prolazi() {
        let v = BlagajnaValidator::new().validate_transaction(&isplata(9_999.99));
        assert!(v.valid);
        assert!(v.errors.is_empty());
    }

    #[test]
    fn dnevnik_stanje_se_slaze() {
        let d = BlagajnaValidator::new().validate_dnevnik(
            500.0,
            &[uplata(1_000.0), isplata(300.0), isplata(150.0)],
            1_050.0,
        );
        assert!(d.valid, "errors: {:?}", d.errors);
        assert_eq!(d.ukupne_uplate, 1_000.0);
        assert_eq!(d.ukupne_isplate, 450.0);
        assert_eq!(d.izracunato_zavrsno, 1_050.0);
    }

    #[test]
    fn dnevnik_krivo_zavrsno_stanje() {
        let d = BlagajnaValidator::new().validate_dnevnik(500.0, &[uplata(100.0)], 700.0);
        assert!(!d.valid);
        assert!(d.errors.iter().any(|e| e.contains("ne slaže")));
    }

    #[test]
    fn dnevnik_negativno_stanje() {
        let d = BlagajnaValidator::new().validate_dnevnik(100.0, &[isplata(500.0)], -400.0);
        assert!(!d.valid);
        assert!(d.errors.iter().any(|e| e.contains("Negativno")));
    }
}
