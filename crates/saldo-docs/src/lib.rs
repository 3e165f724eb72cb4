//! saldo-docs: ulazni dokumenti — parsiranje i klasifikacija.
//!
//! Sve što uđe u sustav prolazi ovuda: e-računi (UBL 2.1, CII,
//! FatturaPA), bankovni izvodi (CSV), tekstualni računi (regex
//! ekstraktor) i intake klasifikator koji dokumentu dodjeljuje vrstu,
//! klijenta i modul. Parsiranje nikad ne izmišlja iznose — polja koja
//! se ne mogu pročitati ostaju prazna s niskom pouzdanošću.

pub mod bank;
pub mod eracun;
pub mod extractor;
pub mod fiskalizacija;
pub mod intake;
pub mod oib;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocError {
    #[error("XML nije čitljiv: {0}")]
    Xml(String),

    #[error("Dokument nije prepoznat kao e-račun (UBL/CII/FatturaPA)")]
    UnknownInvoiceFormat,

    #[error("CSV nije čitljiv: {0}")]
    Csv(#[from] csv::Error),

    #[error("Datoteka nije čitljiva: {0}")]
    Io(#[from] std::io::Error),

    #[error("Neispravan dokument: {0}")]
    Invalid(String),
}

impl From<quick_xml::Error> for DocError {
    fn from(e: quick_xml::Error) -> Self {
        DocError::Xml(e.to_string())
    }
}
