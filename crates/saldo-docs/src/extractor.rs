//! Regex ekstraktor za tekstualne račune (OCR izlaz, TXT, e-mail).
//!
//! Izvlači OIB, IBAN, iznose, datume i broj računa s pouzdanošću po
//! polju. Ekstraktor ne izmišlja vrijednosti: polje bez pogotka ostaje
//! prazno s pouzdanošću 0.

use crate::oib::{validate_iban_hr, validate_oib};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static RE_OIB: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)OIB[:\s]*(\d{11})").expect("static regex")
});
static RE_OIB_BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{11})\b").expect("static regex"));
static RE_IBAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bHR\d{19}\b").expect("static regex")
});
static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    // 1.234,56 ili 1234,56 ili 1234.56
    Regex::new(r"(\d{1,3}(?:\.\d{3})*,\d{2}|\d+\.\d{2}|\d+,\d{2})").expect("static regex")
});
static RE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}\.\d{1,2}\.\d{4}|\d{4}-\d{2}-\d{2})").expect("static regex")
});
static RE_INVOICE_NO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:ra[čc]un|broj|invoice)[.:\s#]*([0-9]+[/-][0-9A-Za-z/-]+)")
        .expect("static regex")
});

/// Jedno izvučeno polje s pouzdanošću.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: String,
    pub confidence: f64,
}

impl ExtractedField {
    fn found(value: impl Into<String>, confidence: f64) -> Self {
        Self {
            value: value.into(),
            confidence,
        }
    }
}

/// Rezultat ekstrakcije iz tekstualnog računa.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Extraction {
    pub oib: ExtractedField,
    pub iban: ExtractedField,
    /// Najveći pronađeni iznos — u pravilu ukupni iznos računa.
    pub ukupni_iznos: ExtractedField,
    pub datum: ExtractedField,
    pub broj_racuna: ExtractedField,
    /// Svi pronađeni iznosi, silazno.
    pub svi_iznosi: Vec<f64>,
}

impl Extraction {
    /// Prosjek pouzdanosti popunjenih polja.
    pub fn overall_confidence(&self) -> f64 {
        let fields = [
            &self.oib,
            &self.iban,
            &self.ukupni_iznos,
            &self.datum,
            &self.broj_racuna,
        ];
        let filled: Vec<f64> = fields
            .iter()
            .filter(|f| !f.value.is_empty())
            .map(|f| f.confidence)
            .collect();
        if filled.is_empty() {
            0.0
        } else {
            filled.iter().sum::<f64>() / filled.len() as f64
        }
    }
}

/// Izvuci strukturirana polja iz teksta računa.
pub fn extract(text: &str) -> Extraction {
    let mut out = Extraction::default();

    // OIB: prvo uz "OIB:" oznaku (visoka pouzdanost), zatim goli 11-znamenkasti
    // niz koji prolazi MOD 11,10 (niža pouzdanost).
    if let Some(cap) = RE_OIB.captures(text) {
        let candidate = &cap[1];
        if validate_oib(candidate) {
            out.oib = ExtractedField::found(candidate, 0.95);
        }
    }
    if out.oib.value.is_empty() {
        for cap in RE_OIB_BARE.captures_iter(text) {
            if validate_oib(&cap[1]) {
                out.oib = ExtractedField::found(&cap[1], 0.6);
                break;
            }
        }
    }

    if let Some(m) = RE_IBAN.find(text) {
        let confidence = if validate_iban_hr(m.as_str()) { 0.95 } else { 0.4 };
        out.iban = ExtractedField::found(m.as_str(), confidence);
    }

    let mut iznosi: Vec<f64> = RE_AMOUNT
        .find_iter(text)
        .map(|m| parse_hr_amount(m.as_str()))
        .filter(|v| *v > 0.0)
        .collect();
    iznosi.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    iznosi.dedup();
    if let Some(max) = iznosi.first() {
        out.ukupni_iznos = ExtractedField::found(format!("{:.2}", max), 0.7);
    }
    out.svi_iznosi = iznosi;

    if let Some(cap) = RE_DATE.captures(text) {
        out.datum = ExtractedField::found(normalize_date(&cap[1]), 0.8);
    }

    if let Some(cap) = RE_INVOICE_NO.captures(text) {
        out.broj_racuna = ExtractedField::found(cap[1].trim(), 0.7);
    }

    out
}

fn parse_hr_amount(s: &str) -> f64 {
    let normalized = if s.contains(',') {
        s.replace('.', "").replace(',', ".")
    } else {
        s.to_string()
    };
    normalized.parse().unwrap_or(0.0)
}

/// Normaliziraj datum u ISO oblik (YYYY-MM-DD).
fn normalize_date(s: &str) -> String {
    if s.contains('-') {
        return s.to_string();
    }
    let parts: Vec<&str> = s.trim_end_matches('.').split('.').collect();
    if parts.len() == 3 {
        if let (Ok(d), Ok(m), Ok(y)) = (
            parts[0].parse::<u32>(),
            parts[1].parse::<u32>(),
            parts[2].parse::<i32>(),
        ) {
            return format!("{:04}-{:02}-{:02}", y, m, d);
        }
    }
    s.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oib::oib_control_digit;

    #[test]
    fn extract_full_invoice_text() {
        let valid_oib = {
            let d = oib_control_digit("1234567890").unwrap();
            format!("1234567890{}", d)
        };
        let text = format!(
            "Račun broj: 17/2026\nDobavljač d.o.o., OIB: {}\n\
             IBAN: HR1210010051863000160\nDatum: 15.02.2026.\n\
             Osnovica: 1.000,00 EUR\nPDV 25%: 250,00\nUKUPNO: 1.250,00 EUR",
            valid_oib
        );
        let e = extract(&text);

        assert_eq!(e.oib.value, valid_oib);
        assert!(e.oib.confidence > 0.9);
        assert_eq!(e.iban.value, "HR1210010051863000160");
        assert_eq!(e.ukupni_iznos.value, "1250.00");
        assert_eq!(e.datum.value, "2026-02-15");
        assert_eq!(e.broj_racuna.value, "17/2026");
        assert!(e.overall_confidence() > 0.5);
    }

    #[test]
    fn invalid_oib_not_extracted() {
        let text = "OIB: 11111111111 nije ispravan";
        let e = extract(text);
        assert!(e.oib.value.is_empty());
        assert_eq!(e.oib.confidence, 0.0);
    }

    #[test]
    fn amounts_sorted_descending() {
        let e = extract("Stavka 100,00; PDV 25,00; Ukupno 125,00");
        assert_eq!(e.svi_iznosi, vec![125.0, 100.0, 25.0]);
        assert_eq!(e.ukupni_iznos.value, "125.00");
    }

    #[test]
    fn empty_text_extracts_nothing() {
        let e = extract("nema brojeva ovdje");
        assert!(e.oib.value.is_empty());
        assert!(e.svi_iznosi.is_empty());
        assert_eq!(e.overall_confidence(), 0.0);
    }
}
