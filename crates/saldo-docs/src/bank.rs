//! Parser bankovnih izvoda (CSV).
//!
//! Hrvatske banke izvoze izvode u CSV-u s različitim rasporedom kolona;
//! preset po banci mapira kolone na standardnu transakciju. Nepoznata
//! banka ide kroz generički preset (datum;opis;iznos).

use crate::DocError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Jedna transakcija s izvoda.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub date: String,
    /// Pozitivan iznos; smjer nosi `incoming`.
    pub amount: f64,
    pub incoming: bool,
    pub partner: String,
    pub iban: String,
    pub oib: String,
    pub opis: String,
    pub poziv_na_broj: String,
}

/// Preset kolona za jednu banku.
#[derive(Debug, Clone, Copy)]
pub struct BankPreset {
    pub name: &'static str,
    pub delimiter: u8,
    pub date_col: usize,
    pub partner_col: Option<usize>,
    pub iban_col: Option<usize>,
    pub opis_col: usize,
    /// (uplata, isplata) kolone; kad su iste, predznak nosi smjer.
    pub credit_col: usize,
    pub debit_col: usize,
    pub has_header: bool,
}

/// Podržane banke. Kolone prate stvarne CSV izvoze pojedinih banaka.
pub const BANK_PRESETS: [BankPreset; 4] = [
    BankPreset {
        name: "erste",
        delimiter: b';',
        date_col: 0,
        partner_col: Some(1),
        iban_col: Some(2),
        opis_col: 3,
        credit_col: 4,
        debit_col: 5,
        has_header: true,
    },
    BankPreset {
        name: "zaba",
        delimiter: b';',
        date_col: 0,
        partner_col: Some(2),
        iban_col: Some(3),
        opis_col: 1,
        credit_col: 4,
        debit_col: 5,
        has_header: true,
    },
    BankPreset {
        name: "pbz",
        delimiter: b';',
        date_col: 0,
        partner_col: Some(1),
        iban_col: None,
        opis_col: 2,
        credit_col: 3,
        debit_col: 4,
        has_header: true,
    },
    BankPreset {
        name: "generic",
        delimiter: b';',
        date_col: 0,
        partner_col: None,
        iban_col: None,
        opis_col: 1,
        credit_col: 2,
        debit_col: 2,
        has_header: false,
    },
];

pub fn preset_for(bank: &str) -> BankPreset {
    let needle = bank.trim().to_lowercase();
    BANK_PRESETS
        .iter()
        .find(|p| p.name == needle)
        .copied()
        .unwrap_or(BANK_PRESETS[3])
}

/// Parser izvoda: CSV sadržaj + preset → transakcije.
#[derive(Debug, Clone, Default)]
pub struct BankStatementParser;

impl BankStatementParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_file(&self, path: &Path, bank: &str) -> Result<Vec<Transaction>, DocError> {
        let content = std::fs::read_to_string(path)?;
        self.parse(&content, bank)
    }

    pub fn parse(&self, content: &str, bank: &str) -> Result<Vec<Transaction>, DocError> {
        let preset = preset_for(bank);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(preset.delimiter)
            .has_headers(preset.has_header)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut out = Vec::new();
        for record in reader.records() {
            let record = record?;
            let get = |i: usize| record.get(i).unwrap_or("").trim().to_string();

            let credit = parse_amount(&get(preset.credit_col));
            let debit = if preset.debit_col == preset.credit_col {
                0.0
            } else {
                parse_amount(&get(preset.debit_col))
            };

            let (amount, incoming) = if preset.debit_col == preset.credit_col {
                // Predznak nosi smjer.
                (credit.abs(), credit >= 0.0)
            } else if credit > 0.0 {
                (credit, true)
            } else {
                (debit, false)
            };
            if amount == 0.0 {
                continue;
            }

            out.push(Transaction {
                date: get(preset.date_col),
                amount,
                incoming,
                partner: preset.partner_col.map(|i| get(i)).unwrap_or_default(),
                iban: preset.iban_col.map(|i| get(i)).unwrap_or_default(),
                oib: String::new(),
                opis: get(preset.opis_col),
                poziv_na_broj: String::new(),
            });
        }
        debug!(
            target: "saldo::docs",
            "izvod ({}): {} transakcija",
            preset.name,
            out.len()
        );
        Ok(out)
    }
}

/// Parsiraj iznos u hrvatskom ili ISO zapisu: "1.234,56" ili "1234.56".
fn parse_amount(s: &str) -> f64 {
    let s = s.trim().replace(' ', "");
    if s.is_empty() {
        return 0.0;
    }
    let normalized = if s.contains(',') {
        // Hrvatski zapis: točka je tisućica, zarez decimala.
        s.replace('.', "").replace(',', ".")
    } else {
        s
    };
    normalized.parse().unwrap_or(0.0)
}
