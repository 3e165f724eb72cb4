//! ERP export: CPP XML, Synesis CSV i JSON debug format.
//!
//! Jedan `ExportRecord` = jedna stavka knjiženja u ciljnom ERP-u.
//! CPP uvozi XML s `<Knjizenje>` elementima, Synesis CSV sa
//! `;`-separatorom. Iznosi su uvijek dvije decimale s točkom.

use crate::types::{BookingProposal, Strana};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Format izlazne datoteke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    Xml,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Xml => "xml",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// Jedna izvozna stavka — ravna projekcija `BookingLine` + metapodataka.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    pub datum_dokumenta: String,
    pub datum_knjizenja: String,
    pub konto_duguje: String,
    pub konto_potrazuje: String,
    pub iznos: f64,
    pub opis: String,
    pub oib: String,
    pub pdv_stopa: f64,
    pub pdv_iznos: f64,
    pub poziv_na_broj: String,
    pub broj_dokumenta: String,
    pub document_type: String,
}

/// Rasporedi prijedlog u izvozne stavke: svaka stavka knjiženja postaje
/// jedan red s kontom na odgovarajućoj strani.
pub fn flatten_proposal(p: &BookingProposal) -> Vec<ExportRecord> {
    p.lines
        .iter()
        .map(|line| {
            let (duguje, potrazuje) = match line.strana {
                Strana::Duguje => (line.konto.clone(), String::new()),
                Strana::Potrazuje => (String::new(), line.konto.clone()),
            };
            ExportRecord {
                datum_dokumenta: p.datum_dokumenta.clone(),
                datum_knjizenja: p.datum_knjizenja.clone(),
                konto_duguje: duguje,
                konto_potrazuje: potrazuje,
                iznos: line.iznos,
                opis: if line.opis.is_empty() {
                    p.opis.clone()
                } else {
                    line.opis.clone()
                },
                oib: if line.oib.is_empty() {
                    p.oib_partnera.clone()
                } else {
                    line.oib.clone()
                },
                pdv_stopa: line.pdv_stopa,
                pdv_iznos: line.pdv_iznos,
                poziv_na_broj: line.poziv_na_broj.clone(),
                broj_dokumenta: p.broj_dokumenta.clone(),
                document_type: p.document_type.as_str().to_string(),
            }
        })
        .collect()
}

/// Zapiši CPP XML: `<CPPImport>` korijen, jedan `<Knjizenje>` po stavci.
pub fn write_cpp_xml(records: &[ExportRecord], path: &Path) -> std::io::Result<()> {
    let mut out = String::with_capacity(records.len() * 256 + 64);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<CPPImport>\n");
    for r in records {
        out.push_str("  <Knjizenje>\n");
        out.push_str(&format!(
            "    <DatumDokumenta>{}</DatumDokumenta>\n",
            xml_escape(&r.datum_dokumenta)
        ));
        out.push_str(&format!(
            "    <KontoDuguje>{}</KontoDuguje>\n",
            xml_escape(&r.konto_duguje)
        ));
        out.push_str(&format!(
            "    <KontoPotrazuje>{}</KontoPotrazuje>\n",
            xml_escape(&r.konto_potrazuje)
        ));
        out.push_str(&format!("    <Iznos>{:.2}</Iznos>\n", r.iznos));
        out.push_str(&format!("    <Opis>{}</Opis>\n", xml_escape(&r.opis)));
        out.push_str(&format!("    <OIB>{}</OIB>\n", xml_escape(&r.oib)));
        out.push_str("  </Knjizenje>\n");
    }
    out.push_str("</CPPImport>\n");
    atomic_write(path, out.as_bytes())
}

/// Zapiši Synesis CSV: header + `;`-separirani redovi.
pub fn write_synesis_csv(records: &[ExportRecord], path: &Path) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(records.len() * 128 + 64);
    {
        let mut w = csv::WriterBuilder::new()
            .delimiter(b';')
            .from_writer(&mut buf);
        w.write_record(["DatumDok", "KontoDug", "KontoPot", "Iznos", "Opis", "OIB"])
            .map_err(csv_io)?;
        for r in records {
            w.write_record([
                r.datum_dokumenta.as_str(),
                r.konto_duguje.as_str(),
                r.konto_potrazuje.as_str(),
                &format!("{:.2}", r.iznos),
                r.opis.as_str(),
                r.oib.as_str(),
            ])
            .map_err(csv_io)?;
        }
        w.flush()?;
    }
    atomic_write(path, &buf)
}

/// Zapiši JSON export — debug format i ulaz za ERP-ove bez vlastitog uvoza.
pub fn write_json(records: &[ExportRecord], path: &Path) -> std::io::Result<()> {
    let body = serde_json::to_vec_pretty(records)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    atomic_write(path, &body)
}

fn csv_io(e: csv::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e)
}

/// Zapiši preko privremene datoteke pa preimenuj — export je sve-ili-ništa.
fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut f = std::fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
