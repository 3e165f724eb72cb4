//! Osnovna sredstva i linearna amortizacija.
//!
//! Prag dugotrajne imovine i godišnje stope prema Zakonu o porezu na dobit
//! (NN 177/04, čl. 12.): ispod 665 EUR sitan inventar s jednokratnim
//! otpisom, iznad kategorija određuje stopu. Mjesečna amortizacija =
//! nabavna × stopa / 100 / 12; ispravak vrijednosti nikad ne prelazi
//! nabavnu vrijednost.

use crate::{round2, ExplainStep};
use serde::{Deserialize, Serialize};

/// Prag za dugotrajnu imovinu, EUR (čl. 12. st. 1.).
pub const PRAG_DUGOTRAJNA_IMOVINA: f64 = 665.0;

/// Godišnje amortizacijske stope po kategorijama: (kategorija, stopa %, vijek godina).
pub const AMORTIZACIJSKE_STOPE: [(&str, f64, u32); 11] = [
    ("gradjevinski_objekti", 5.0, 20),
    ("osobni_automobili", 20.0, 5),
    ("teretna_vozila", 25.0, 4),
    ("racunalna_oprema", 50.0, 2),
    ("uredska_oprema", 25.0, 4),
    ("namjestaj", 20.0, 5),
    ("strojevi_oprema", 20.0, 5),
    ("software", 50.0, 2),
    ("licence_patenti", 25.0, 4),
    ("alati", 20.0, 5),
    ("telekomunikacijska_oprema", 20.0, 5),
];

/// Zadana kategorija kad vrsta nije prepoznata.
const DEFAULT_KATEGORIJA: (&str, f64, u32) = ("uredska_oprema", 25.0, 4);

pub fn stopa_za_vrstu(vrsta: &str) -> (f64, u32) {
    let needle = vrsta.trim().to_lowercase();
    AMORTIZACIJSKE_STOPE
        .iter()
        .find(|(k, _, _)| *k == needle)
        .map(|(_, stopa, vijek)| (*stopa, *vijek))
        .unwrap_or((DEFAULT_KATEGORIJA.1, DEFAULT_KATEGORIJA.2))
}

/// Jedno osnovno sredstvo u registru.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub naziv: String,
    pub nabavna_vrijednost: f64,
    pub vrsta: String,
    pub godisnja_stopa: f64,
    pub korisni_vijek: u32,
    /// Kumulirani ispravak vrijednosti. Nikad > nabavna vrijednost.
    pub ispravak_vrijednosti: f64,
    /// Broj obračunatih mjeseci; zadnji mjesec vijeka zatvara ostatak.
    pub mjeseci_obracunato: u32,
}

impl Asset {
    pub fn sadasnja_vrijednost(&self) -> f64 {
        round2(self.nabavna_vrijednost - self.ispravak_vrijednosti)
    }

    pub fn otpisan(&self) -> bool {
        self.ispravak_vrijednosti >= self.nabavna_vrijednost
    }
}

/// Odluka pri zaprimanju sredstva: sitan inventar ili dugotrajna imovina.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AssetDecision {
    /// Ispod praga — jednokratni otpis, ne ulazi u registar.
    SitanInventar {
        naziv: String,
        nabavna_vrijednost: f64,
        jednokratni_otpis: bool,
    },
    /// Dugotrajna imovina — upisana u registar.
    Added {
        naziv: String,
        nabavna_vrijednost: f64,
        vrsta: String,
        godisnja_stopa: f64,
        korisni_vijek: u32,
        godisnja_amortizacija: f64,
        mjesecna_amortizacija: f64,
    },
}

/// Mjesečna amortizacijska stavka za jedno sredstvo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlyDepreciation {
    pub naziv: String,
    pub mjesecna_amortizacija: f64,
    pub ispravak_vrijednosti: f64,
    pub sadasnja_vrijednost: f64,
    pub explain: Vec<ExplainStep>,
}

/// Registar osnovnih sredstava s linearnom amortizacijom.
#[derive(Debug, Clone, Default)]
pub struct OsnovnaSredstvaEngine {
    assets: Vec<Asset>,
}

impl OsnovnaSredstvaEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    /// Zaprimi sredstvo. Ispod praga od 665 EUR vraća sitan inventar,
    /// inače upisuje u registar i vraća izračunate stope.
    pub fn add_asset(&mut self, naziv: &str, nabavna_vrijednost: f64, vrsta: &str) -> AssetDecision {
        if nabavna_vrijednost < PRAG_DUGOTRAJNA_IMOVINA {
            return AssetDecision::SitanInventar {
                naziv: naziv.to_string(),
                nabavna_vrijednost,
                jednokratni_otpis: true,
            };
        }

        let (stopa, vijek) = stopa_za_vrstu(vrsta);
        let godisnja = round2(nabavna_vrijednost * stopa / 100.0);
        let mjesecna = round2(nabavna_vrijednost * stopa / 100.0 / 12.0);

        self.assets.push(Asset {
            naziv: naziv.to_string(),
            nabavna_vrijednost,
            vrsta: vrsta.to_string(),
            godisnja_stopa: stopa,
            korisni_vijek: vijek,
            ispravak_vrijednosti: 0.0,
            mjeseci_obracunato: 0,
        });

        AssetDecision::Added {
            naziv: naziv.to_string(),
            nabavna_vrijednost,
            vrsta: vrsta.to_string(),
            godisnja_stopa: stopa,
            korisni_vijek: vijek,
            godisnja_amortizacija: godisnja,
            mjesecna_amortizacija: mjesecna,
        }
    }

    /// Obračunaj mjesečnu amortizaciju za sva sredstva koja još nisu
    /// otpisana. Zadnja rata se skraćuje tako da ispravak nikad ne
    /// prijeđe nabavnu vrijednost; potpuno otpisana sredstva se ne vraćaju.
    pub fn calculate_monthly_depreciation(&mut self) -> Vec<MonthlyDepreciation> {
        let mut out = Vec::new();
        for asset in &mut self.assets {
            if asset.otpisan() {
                continue;
            }
            let puna_rata = round2(asset.nabavna_vrijednost * asset.godisnja_stopa / 100.0 / 12.0);
            let preostalo = round2(asset.nabavna_vrijednost - asset.ispravak_vrijednosti);
            let zadnji_mjesec = asset.mjeseci_obracunato + 1 >= asset.korisni_vijek * 12;
            let rata = if zadnji_mjesec {
                preostalo
            } else {
                puna_rata.min(preostalo)
            };
            asset.mjeseci_obracunato += 1;
            asset.ispravak_vrijednosti = round2(asset.ispravak_vrijednosti + rata);

            out.push(MonthlyDepreciation {
                naziv: asset.naziv.clone(),
                mjesecna_amortizacija: rata,
                ispravak_vrijednosti: asset.ispravak_vrijednosti,
                sadasnja_vrijednost: asset.sadasnja_vrijednost(),
                explain: vec![
                    ExplainStep::new(
                        format!(
                            "{} × {:.0} % / 12",
                            asset.nabavna_vrijednost, asset.godisnja_stopa
                        ),
                        rata,
                    ),
                    ExplainStep::new("Kumulirani ispravak", asset.ispravak_vrijednosti),
                ],
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ispod_praga_sitan_inventar() {
        let mut engine = OsnovnaSredstvaEngine::new();
        let odluka = engine.add_asset("Miš", 50.0, "uredska_oprema");
        assert!(matches!(
            odluka,
            AssetDecision::SitanInventar {
                jednokratni_otpis: true,
                ..
            }
        ));
        assert!(engine.assets().is_empty());
    }

    #[test]
    fn granica_praga() {
        let mut engine = OsnovnaSredstvaEngine::new();
        assert!(matches!(
            engine.add_asset("Tipkovnica", 664.99, "uredska_oprema"),
            AssetDecision::SitanInventar { .. }
        ));
        assert!(matches!(
            engine.add_asset("Monitor", 665.0, "racunalna_oprema"),
            AssetDecision::Added { .. }
        ));
    }

    #[test]
    fn racunalna_oprema_50_posto() {
        let mut engine = OsnovnaSredstvaEngine::new();
        let odluka = engine.add_asset("Laptop", 2000.0, "racunalna_oprema");
        match odluka {
            AssetDecision::Added {
                godisnja_stopa,
                korisni_vijek,
                godisnja_amortizacija,
                mjesecna_amortizacija,
                ..
            } => {
                assert_eq!(godisnja_stopa, 50.0);
                assert_eq!(korisni_vijek, 2);
                assert_eq!(godisnja_amortizacija, 1000.0);
                assert_eq!(mjesecna_amortizacija, 83.33);
            }
            _ => panic!("očekivana dugotrajna imovina"),
        }
    }

    #[test]
    fn automobil_i_nekretnina() {
        let mut engine = OsnovnaSredstvaEngine::new();
        match engine.add_asset("Auto", 30_000.0, "osobni_automobili") {
            AssetDecision::Added {
                godisnja_stopa,
                mjesecna_amortizacija,
                ..
            } => {
                assert_eq!(godisnja_stopa, 20.0);
                assert_eq!(mjesecna_amortizacija, 500.0);
            }
            _ => panic!(),
        }
        match engine.add_asset("Ured", 200_000.0, "gradjevinski_objekti") {
            AssetDecision::Added {
                godisnja_stopa,
                korisni_vijek,
                mjesecna_amortizacija,
                ..
            } => {
                assert_eq!(godisnja_stopa, 5.0);
                assert_eq!(korisni_vijek, 20);
                assert_eq!(mjesecna_amortizacija, 833.33);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn mjesecni_obracun_batch() {
        let mut engine = OsnovnaSredstvaEngine::new();
        engine.add_asset("Laptop", 2400.0, "racunalna_oprema");
        engine.add_asset("Stol", 1200.0, "namjestaj");
        let stavke = engine.calculate_monthly_depreciation();
        assert_eq!(stavke.len(), 2);
        assert_eq!(stavke[0].mjesecna_amortizacija, 100.0);
        assert_eq!(stavke[1].mjesecna_amortizacija, 20.0);
    }

    #[test]
    fn laptop_se_otpise_u_24_mjeseca() {
        let mut engine = OsnovnaSredstvaEngine::new();
        engine.add_asset("Laptop", 2000.0, "racunalna_oprema");

        for mjesec in 0..24 {
            let stavke = engine.calculate_monthly_depreciation();
            assert_eq!(stavke.len(), 1, "mjesec {}", mjesec);
            assert!(stavke[0].ispravak_vrijednosti <= 2000.0);
        }
        // 23 × 83.33 = 1916.59; zadnja rata 83.41 zatvara na točno 2000.
        assert_eq!(engine.assets()[0].ispravak_vrijednosti, 2000.0);

        // 25. poziv: sredstvo otpisano, nema stavke.
        let stavke = engine.calculate_monthly_depreciation();
        assert!(stavke.is_empty());
    }

    #[test]
    fn ispravak_nikad_ne_prelazi_nabavnu() {
        let mut engine = OsnovnaSredstvaEngine::new();
        engine.add_asset("Server", 999.99, "racunalna_oprema");
        for _ in 0..40 {
            for s in engine.calculate_monthly_depreciation() {
                assert!(s.ispravak_vrijednosti <= 999.99 + f64::EPSILON);
                assert!(s.sadasnja_vrijednost >= 0.0);
            }
        }
    }

    #[test]
    fn sve_statutarne_stope() {
        let ocekivano = [
            ("gradjevinski_objekti", 5.0),
            ("osobni_automobili", 20.0),
            ("teretna_vozila", 25.0),
            ("racunalna_oprema", 50.0),
            ("uredska_oprema", 25.0),
            ("namjestaj", 20.0),
            ("strojevi_oprema", 20.0),
            ("software", 50.0),
            ("licence_patenti", 25.0),
            ("alati", 20.0),
            ("telekomunikacijska_oprema", 20.0),
        ];
        for (vrsta, stopa) in ocekivano {
            assert_eq!(stopa_za_vrstu(vrsta).0, stopa, "stopa za {}", vrsta);
        }
    }
}
