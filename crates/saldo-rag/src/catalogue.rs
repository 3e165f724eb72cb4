//! Katalog hrvatskih zakona i pravilnika + downloader korpusa.
//!
//! Prioritet 1 su kritični porezni propisi, 2 važni, 3 korisni.
//! Downloader puni `data/laws/` tekstovima s metapodatkovnim zaglavljem
//! i vodi `versions.json`; ponovni download istog izdanja je no-op.

use crate::store::LawCategory;
use crate::RagError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Jedan zakon ili pravilnik u katalogu.
#[derive(Debug, Clone, Serialize)]
pub struct LawSource {
    pub slug: &'static str,
    pub name: &'static str,
    pub code: &'static str,
    /// Primarni NN broj, npr. "73/13".
    pub nn_primary: &'static str,
    pub nn_amendments: &'static [&'static str],
    pub effective_from: &'static str,
    pub category: LawCategory,
    /// 1 = kritičan, 2 = važan, 3 = koristan.
    pub priority: u8,
}

/// Katalog propisa koje sustav prati. Izvor: zakon.hr i NN.
pub const LAW_CATALOG: &[LawSource] = &[
    // ── Prioritet 1: kritični zakoni ──
    LawSource {
        slug: "zakon_o_pdv",
        name: "Zakon o porezu na dodanu vrijednost",
        code: "ZPDV",
        nn_primary: "73/13",
        nn_amendments: &[
            "99/13", "148/13", "153/13", "143/14", "115/16", "106/18", "121/19", "138/20",
            "39/22", "113/22", "33/23", "114/23", "35/24", "152/24", "52/25", "151/25",
        ],
        effective_from: "2013-07-01",
        category: LawCategory::Pdv,
        priority: 1,
    },
    LawSource {
        slug: "zakon_o_racunovodstvu",
        name: "Zakon o računovodstvu",
        code: "ZoR",
        nn_primary: "78/15",
        nn_amendments: &["120/16", "116/18", "42/20", "47/20", "114/22", "82/23", "18/25"],
        effective_from: "2016-01-01",
        category: LawCategory::Racunovodstvo,
        priority: 1,
    },
    LawSource {
        slug: "zakon_o_porezu_na_dobit",
        name: "Zakon o porezu na dobit",
        code: "ZPD",
        nn_primary: "177/04",
        nn_amendments: &[
            "90/05", "57/06", "146/08", "80/10", "22/12", "148/13", "143/14", "50/16",
            "115/16", "106/18", "121/19", "32/20", "138/20", "114/22", "114/23", "151/25",
        ],
        effective_from: "2005-01-01",
        category: LawCategory::PorezDobit,
        priority: 1,
    },
    LawSource {
        slug: "zakon_o_porezu_na_dohodak",
        name: "Zakon o porezu na dohodak",
        code: "ZoPD",
        nn_primary: "115/16",
        nn_amendments: &["106/18", "121/19", "32/20", "138/20", "151/22", "114/23", "152/24"],
        effective_from: "2017-01-01",
        category: LawCategory::PorezDohodak,
        priority: 1,
    },
    LawSource {
        slug: "zakon_o_doprinosima",
        name: "Zakon o doprinosima",
        code: "ZoD",
        nn_primary: "84/08",
        nn_amendments: &[
            "152/08", "94/09", "18/11", "22/12", "144/12", "148/13", "41/14", "143/14",
            "115/16", "106/18", "33/23", "114/23",
        ],
        effective_from: "2009-01-01",
        category: LawCategory::Doprinosi,
        priority: 1,
    },
    // ── Prioritet 1: kritični pravilnici ──
    LawSource {
        slug: "pravilnik_o_pdv",
        name: "Pravilnik o porezu na dodanu vrijednost",
        code: "PPDV",
        nn_primary: "79/13",
        nn_amendments: &[
            "85/13", "160/13", "35/14", "157/14", "130/15", "1/17", "41/17", "128/17",
            "1/19", "1/20", "1/21", "73/21", "41/22", "133/22", "43/23", "16/25",
        ],
        effective_from: "2013-07-01",
        category: LawCategory::Pdv,
        priority: 1,
    },
    LawSource {
        slug: "pravilnik_o_porezu_na_dobit",
        name: "Pravilnik o porezu na dobit",
        code: "PPD",
        nn_primary: "95/05",
        nn_amendments: &[
            "133/07", "156/08", "146/09", "123/10", "137/11", "61/12", "146/12", "160/13",
            "12/14", "157/14", "137/15", "1/17", "2/18", "1/19", "1/20", "59/20", "1/21",
            "156/22", "156/23", "16/25",
        ],
        effective_from: "2005-01-01",
        category: LawCategory::PorezDobit,
        priority: 1,
    },
    LawSource {
        slug: "pravilnik_o_porezu_na_dohodak",
        name: "Pravilnik o porezu na dohodak",
        code: "PPDoh",
        nn_primary: "10/17",
        nn_amendments: &[
            "128/17", "106/18", "1/19", "80/19", "1/20", "74/20", "1/21", "102/22",
            "112/22", "156/22", "1/23", "43/23",
        ],
        effective_from: "2017-01-01",
        category: LawCategory::PorezDohodak,
        priority: 1,
    },
    LawSource {
        slug: "pravilnik_o_joppd",
        name: "Pravilnik o sadržaju obračuna plaće i JOPPD",
        code: "PJOPPD",
        nn_primary: "32/15",
        nn_amendments: &["102/15", "79/16", "1/17", "35/17", "93/17", "1/19", "1/20", "1/21"],
        effective_from: "2015-01-01",
        category: LawCategory::PorezDohodak,
        priority: 1,
    },
    LawSource {
        slug: "pravilnik_o_neoporezivim_primicima",
        name: "Pravilnik o neoporezivim primicima",
        code: "PNP",
        nn_primary: "1/23",
        nn_amendments: &["43/23"],
        effective_from: "2023-01-01",
        category: LawCategory::PorezDohodak,
        priority: 1,
    },
    LawSource {
        slug: "zakon_o_fiskalizaciji",
        name: "Zakon o fiskalizaciji u prometu gotovinom",
        code: "ZoF",
        nn_primary: "133/12",
        nn_amendments: &["115/16", "106/18", "121/19", "138/20", "114/23"],
        effective_from: "2013-01-01",
        category: LawCategory::Fiskalizacija,
        priority: 1,
    },
    // ── Prioritet 2: važni ──
    LawSource {
        slug: "zakon_o_radu",
        name: "Zakon o radu",
        code: "ZoRad",
        nn_primary: "93/14",
        nn_amendments: &["127/17", "98/19", "151/22", "64/23"],
        effective_from: "2014-08-07",
        category: LawCategory::RadnoPravo,
        priority: 2,
    },
    LawSource {
        slug: "zakon_o_minimalnoj_placi",
        name: "Zakon o minimalnoj plaći",
        code: "ZoMP",
        nn_primary: "118/18",
        nn_amendments: &["120/21"],
        effective_from: "2019-01-01",
        category: LawCategory::RadnoPravo,
        priority: 2,
    },
    LawSource {
        slug: "zakon_o_sprjecavanju_pranja_novca",
        name: "Zakon o sprječavanju pranja novca i financiranja terorizma",
        code: "ZSPNFT",
        nn_primary: "108/17",
        nn_amendments: &["39/19", "151/22"],
        effective_from: "2018-01-01",
        category: LawCategory::Ostalo,
        priority: 2,
    },
    LawSource {
        slug: "opci_porezni_zakon",
        name: "Opći porezni zakon",
        code: "OPZ",
        nn_primary: "115/16",
        nn_amendments: &["106/18", "121/19", "32/20", "42/20", "114/22"],
        effective_from: "2017-01-01",
        category: LawCategory::Ostalo,
        priority: 2,
    },
    LawSource {
        slug: "zakon_o_trgovackim_drustvima",
        name: "Zakon o trgovačkim društvima",
        code: "ZTD",
        nn_primary: "111/93",
        nn_amendments: &["34/99", "52/00", "118/03", "107/07", "146/08", "137/09", "125/11",
            "152/11", "111/12", "68/13", "110/15", "40/19", "34/22", "114/22", "18/23"],
        effective_from: "1995-01-01",
        category: LawCategory::Ostalo,
        priority: 2,
    },
    LawSource {
        slug: "pravilnik_o_amortizaciji",
        name: "Pravilnik o amortizaciji",
        code: "PoA",
        nn_primary: "54/01",
        nn_amendments: &[],
        effective_from: "2001-06-13",
        category: LawCategory::PorezDobit,
        priority: 2,
    },
    LawSource {
        slug: "hrvatski_standardi_financijskog_izvjestavanja",
        name: "Hrvatski standardi financijskog izvještavanja",
        code: "HSFI",
        nn_primary: "86/15",
        nn_amendments: &["105/20"],
        effective_from: "2016-01-01",
        category: LawCategory::Racunovodstvo,
        priority: 2,
    },
    LawSource {
        slug: "zakon_o_racunima",
        name: "Zakon o elektroničkom izdavanju računa u javnoj nabavi",
        code: "ZeRJN",
        nn_primary: "94/18",
        nn_amendments: &[],
        effective_from: "2018-11-01",
        category: LawCategory::Fiskalizacija,
        priority: 2,
    },
    // ── Prioritet 3: korisni ──
    LawSource {
        slug: "zakon_o_obveznim_odnosima",
        name: "Zakon o obveznim odnosima",
        code: "ZOO",
        nn_primary: "35/05",
        nn_amendments: &["41/08", "125/11", "78/15", "29/18", "126/21", "114/22", "156/22"],
        effective_from: "2006-01-01",
        category: LawCategory::Ostalo,
        priority: 3,
    },
    LawSource {
        slug: "zakon_o_deviznom_poslovanju",
        name: "Zakon o deviznom poslovanju",
        code: "ZDP",
        nn_primary: "96/03",
        nn_amendments: &["140/05", "132/06", "150/08", "92/09", "133/09", "153/09", "145/10",
            "76/13"],
        effective_from: "2003-06-18",
        category: LawCategory::Ostalo,
        priority: 3,
    },
    LawSource {
        slug: "zakon_o_obrtu",
        name: "Zakon o obrtu",
        code: "ZoO",
        nn_primary: "143/13",
        nn_amendments: &["127/19", "41/20"],
        effective_from: "2013-12-01",
        category: LawCategory::Ostalo,
        priority: 3,
    },
    LawSource {
        slug: "zakon_o_porezu_na_promet_nekretnina",
        name: "Zakon o porezu na promet nekretnina",
        code: "ZPPN",
        nn_primary: "115/16",
        nn_amendments: &["106/18"],
        effective_from: "2017-01-01",
        category: LawCategory::Ostalo,
        priority: 3,
    },
    LawSource {
        slug: "stecajni_zakon",
        name: "Stečajni zakon",
        code: "SZ",
        nn_primary: "71/15",
        nn_amendments: &["104/17", "36/22"],
        effective_from: "2015-09-01",
        category: LawCategory::Ostalo,
        priority: 3,
    },
    LawSource {
        slug: "zakon_o_financijskom_poslovanju",
        name: "Zakon o financijskom poslovanju i predstečajnoj nagodbi",
        code: "ZFPPN",
        nn_primary: "108/12",
        nn_amendments: &["144/12", "81/13", "112/13", "71/15", "78/15"],
        effective_from: "2012-10-01",
        category: LawCategory::Ostalo,
        priority: 3,
    },
];

/// Downloader korpusa: piše tekstove zakona u `laws_dir` i vodi
/// `versions.json`. Dohvat s mreže je ubrizgan (`fetch`), pa se u
/// offline okruženju generira kostur teksta iz kataloga.
pub struct LawDownloader {
    laws_dir: PathBuf,
    versions_path: PathBuf,
}

/// Rezultat download prolaza.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadReport {
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl LawDownloader {
    pub fn new(laws_dir: PathBuf) -> Self {
        let versions_path = laws_dir.join("versions.json");
        Self {
            laws_dir,
            versions_path,
        }
    }

    fn save_versions(&self, versions: &BTreeMap<String, String>) -> Result<(), RagError> {
        let body = serde_json::to_string_pretty(&json!({
            "updated_at": Utc::now().to_rfc3339(),
            "versions": versions,
        }))?;
        // versions.json drži i metapodatke; mapa se čita iz "versions".
        std::fs::write(&self.versions_path, body)?;
        Ok(())
    }

    fn read_versions_map(&self) -> BTreeMap<String, String> {
        std::fs::read_to_string(&self.versions_path)
            .ok()
            .and_then(|s| serde_json::from_str::<serde_json::Value>(&s).ok())
            .and_then(|v| {
                serde_json::from_value(v.get("versions").cloned().unwrap_or_default()).ok()
            })
            .unwrap_or_default()
    }

    /// Zadnje NN izdanje zakona (primarno + amandmani).
    fn latest_nn(law: &LawSource) -> &'static str {
        law.nn_amendments.last().copied().unwrap_or(law.nn_primary)
    }

    /// Preuzmi sve zakone do zadanog prioriteta. `fetch` vraća tekst
    /// zakona ili `None` (offline) — tada se piše kostur iz kataloga.
    pub fn download_all(
        &self,
        priority_max: u8,
        fetch: &dyn Fn(&LawSource) -> Option<String>,
    ) -> Result<DownloadReport, RagError> {
        std::fs::create_dir_all(&self.laws_dir)?;
        let mut versions = self.read_versions_map();
        let mut report = DownloadReport::default();

        for law in LAW_CATALOG.iter().filter(|l| l.priority <= priority_max) {
            let latest = Self::latest_nn(law);
            if versions.get(law.slug).map(String::as_str) == Some(latest) {
                report.skipped.push(law.slug.to_string());
                continue;
            }

            let text = fetch(law).unwrap_or_else(|| Self::skeleton_text(law));
            let path = self.laws_dir.join(format!("{}.txt", law.slug));
            match std::fs::write(&path, Self::with_header(law, &text)) {
                Ok(()) => {
                    versions.insert(law.slug.to_string(), latest.to_string());
                    report.downloaded.push(law.slug.to_string());
                }
                Err(e) => {
                    report.failed.push(format!("{}: {}", law.slug, e));
                }
            }
        }

        self.save_versions(&versions)?;
        info!(
            target: "saldo::rag",
            "download: {} novih, {} preskočeno, {} grešaka",
            report.downloaded.len(),
            report.skipped.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Ima li novijih NN izdanja od lokalno spremljenih.
    pub fn check_for_updates(&self) -> Vec<String> {
        let versions = self.read_versions_map();
        LAW_CATALOG
            .iter()
            .filter(|law| {
                versions.get(law.slug).map(String::as_str) != Some(Self::latest_nn(law))
            })
            .map(|law| law.slug.to_string())
            .collect()
    }

    pub fn stats(&self) -> serde_json::Value {
        let versions = self.read_versions_map();
        let files = std::fs::read_dir(&self.laws_dir)
            .map(|rd| {
                rd.filter_map(Result::ok)
                    .filter(|e| e.path().extension().map(|x| x == "txt").unwrap_or(false))
                    .count()
            })
            .unwrap_or(0);
        json!({
            "catalog_size": LAW_CATALOG.len(),
            "downloaded": versions.len(),
            "files": files,
            "pending_updates": self.check_for_updates().len(),
        })
    }

    pub fn list_laws(&self) -> Vec<serde_json::Value> {
        let versions = self.read_versions_map();
        LAW_CATALOG
            .iter()
            .map(|law| {
                json!({
                    "slug": law.slug,
                    "name": law.name,
                    "nn_primary": law.nn_primary,
                    "latest_nn": Self::latest_nn(law),
                    "priority": law.priority,
                    "downloaded_nn": versions.get(law.slug),
                })
            })
            .collect()
    }

    fn with_header(law: &LawSource, text: &str) -> String {
        format!(
            "# {}\n# NN: {} (zadnja izmjena: {})\n# Na snazi od: {}\n# Preuzeto: {}\n\n{}",
            law.name,
            law.nn_primary,
            Self::latest_nn(law),
            law.effective_from,
            Utc::now().format("%Y-%m-%d"),
            text
        )
    }

    fn skeleton_text(law: &LawSource) -> String {
        format!(
            "{} (NN {}).\nIzmjene i dopune: {}.\nTekst nije preuzet s mreže — kostur iz kataloga.",
            law.name,
            law.nn_primary,
            if law.nn_amendments.is_empty() {
                "nema".to_string()
            } else {
                law.nn_amendments.join(", ")
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_minimum_laws() {
        assert!(LAW_CATALOG.len() >= 25);
    }

    #[test]
    fn catalog_priority_1_covers_core_taxes() {
        let p1: Vec<&str> = LAW_CATALOG
            .iter()
            .filter(|l| l.priority == 1)
            .map(|l| l.slug)
            .collect();
        for slug in [
            "zakon_o_pdv",
            "zakon_o_porezu_na_dobit",
            "zakon_o_porezu_na_dohodak",
            "zakon_o_doprinosima",
            "pravilnik_o_joppd",
            "pravilnik_o_neoporezivim_primicima",
        ] {
            assert!(p1.contains(&slug), "nedostaje prioritet-1 propis {}", slug);
        }
    }

    #[test]
    fn unique_slugs() {
        let mut slugs: Vec<&str> = LAW_CATALOG.iter().map(|l| l.slug).collect();
        let before = slugs.len();
        slugs.sort();
        slugs.dedup();
        assert_eq!(before, slugs.len());
    }

    #[test]
    fn download_creates_files_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let dl = LawDownloader::new(dir.path().to_path_buf());

        let report = dl.download_all(1, &|_| None).unwrap();
        assert!(!report.downloaded.is_empty());
        assert!(report.failed.is_empty());

        let pdv = dir.path().join("zakon_o_pdv.txt");
        assert!(pdv.exists());
        let text = std::fs::read_to_string(&pdv).unwrap();
        assert!(text.starts_with("# Zakon o porezu na dodanu vrijednost"));
        assert!(text.contains("NN: 73/13"));

        // Drugi prolaz: sve preskočeno.
        let report2 = dl.download_all(1, &|_| None).unwrap();
        assert!(report2.downloaded.is_empty());
        assert_eq!(
            report2.skipped.len(),
            LAW_CATALOG.iter().filter(|l| l.priority == 1).count()
        );
    }

    #[test]
    fn check_for_updates_after_download() {
        let dir = tempfile::tempdir().unwrap();
        let dl = LawDownloader::new(dir.path().to_path_buf());
        // Prije downloada: sve čeka.
        assert_eq!(dl.check_for_updates().len(), LAW_CATALOG.len());

        dl.download_all(3, &|_| None).unwrap();
        assert!(dl.check_for_updates().is_empty());
    }

    #[test]
    fn stats_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let dl = LawDownloader::new(dir.path().to_path_buf());
        dl.download_all(1, &|_| Some("Članak 1. ...".to_string()))
            .unwrap();

        let stats = dl.stats();
        assert_eq!(stats["catalog_size"], LAW_CATALOG.len());
        assert!(stats["files"].as_u64().unwrap() > 0);

        let list = dl.list_laws();
        assert_eq!(list.len(), LAW_CATALOG.len());
        assert!(list.iter().any(|l| l["slug"] == "zakon_o_pdv"
            && l["downloaded_nn"].as_str() == Some("151/25")));
    }
}
