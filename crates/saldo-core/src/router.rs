//! Router: lagani deterministički klasifikator namjere.
//!
//! Korisnički tekst (+ zastavica ima li datoteku) → modul, pod-namjera,
//! entiteti i pouzdanost. Bez LLM-a: ključne riječi, regexi i oblikovna
//! obilježja (OIB, IBAN, ekstenzija datoteke). Politika dispatcha:
//! confidence > 0.6 izvrši modul; 0.4–0.6 samo natukni; ispod toga
//! čisti chat s RAG kontekstom.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Svi moduli koje executor poznaje.
pub const MODULES: &[&str] = &[
    "bank_parser",
    "invoice_ocr",
    "universal_parser",
    "eracuni_parser",
    "ios",
    "kontiranje",
    "blagajna",
    "putni_nalozi",
    "osnovna_sredstva",
    "ledger",
    "fakturiranje",
    "outgoing_invoice",
    "kompenzacije",
    "likvidacija",
    "accruals",
    "novcani_tokovi",
    "porez_dobit",
    "porez_dohodak",
    "pdv_prijava",
    "payroll",
    "joppd",
    "drugi_dohodak",
    "bolovanje",
    "place",
    "peppol",
    "fiskalizacija2",
    "e_racun",
    "intrastat",
    "gfi_xml",
    "gfi_prep",
    "reports",
    "kpi",
    "management_accounting",
    "business_plan",
    "audit",
    "client_management",
    "communication",
    "kadrovska",
    "deadlines",
    "network",
    "vision_llm",
    "rag",
    "scalability",
    "web_ui",
    "general",
    "export",
    "amortizacija",
];

static RE_OIB: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{11}\b").expect("static regex"));
static RE_IBAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bHR\d{19}\b").expect("static regex"));
static RE_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+(?:[.,]\d{3})*(?:[.,]\d{2})?\s*(?:eur|€)?\b").expect("static regex")
});
static RE_FILE_EXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(xml|csv|pdf|jpg|jpeg|png|txt)\b").expect("static regex"));

/// Rezultat usmjeravanja.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub module: String,
    pub sub_intent: String,
    pub entities: HashMap<String, String>,
    pub confidence: f64,
}

/// Odluka chat petlje nad routeom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    /// Izvrši modul i ubaci `llm_context` u prompt.
    Execute,
    /// Ubaci natuknicu "vjerojatno modul X", ali ne izvršavaj.
    Hint,
    /// Čisti chat s RAG kontekstom.
    ChatOnly,
}

/// Politika dispatcha iz specifikacije chat toka.
pub fn dispatch_decision(route: &Route) -> DispatchDecision {
    if route.module == "general" {
        return DispatchDecision::ChatOnly;
    }
    if route.confidence > 0.6 {
        DispatchDecision::Execute
    } else if route.confidence > 0.4 {
        DispatchDecision::Hint
    } else {
        DispatchDecision::ChatOnly
    }
}

/// Po modulu: (ključna riječ, težina, pod-namjera).
type Pattern = (&'static str, f64, &'static str);

fn module_patterns() -> &'static [(&'static str, &'static [Pattern])] {
    &[
        ("bank_parser", &[
            ("izvod", 0.6, "parse"),
            ("bankovni izvod", 0.8, "parse"),
            ("transakcij", 0.4, "parse"),
            ("promet po računu", 0.7, "parse"),
        ]),
        ("invoice_ocr", &[
            ("ulazni račun", 0.8, "extract"),
            ("ulazni racun", 0.8, "extract"),
            ("skeniraj račun", 0.7, "extract"),
            ("očitaj račun", 0.7, "extract"),
        ]),
        ("eracuni_parser", &[
            ("e-račun", 0.7, "parse"),
            ("eračun", 0.7, "parse"),
            ("ubl", 0.7, "parse"),
            ("xml račun", 0.7, "parse"),
        ]),
        ("ios", &[
            ("ios", 0.7, "reconcile"),
            ("otvorene stavke", 0.8, "reconcile"),
            ("usklađivanje salda", 0.7, "reconcile"),
        ]),
        ("kontiranje", &[
            ("kontiraj", 0.9, "suggest"),
            ("kontiranje", 0.8, "suggest"),
            ("koji konto", 0.8, "suggest"),
            ("predloži konto", 0.9, "suggest"),
        ]),
        ("blagajna", &[
            ("blagajn", 0.8, "validate"),
            ("gotovinsk", 0.6, "validate"),
            ("uplatnica", 0.5, "validate"),
        ]),
        ("putni_nalozi", &[
            ("putni nalog", 0.9, "validate"),
            ("dnevnic", 0.6, "validate"),
            ("kilometraž", 0.7, "validate"),
            ("službeni put", 0.7, "validate"),
        ]),
        ("osnovna_sredstva", &[
            ("osnovno sredstvo", 0.8, "add"),
            ("osnovna sredstva", 0.8, "list"),
            ("dugotrajna imovina", 0.8, "add"),
            ("sitan inventar", 0.7, "add"),
        ]),
        ("amortizacija", &[
            ("amortizacij", 0.8, "calculate"),
            ("otpis", 0.5, "calculate"),
        ]),
        ("fakturiranje", &[
            ("izradi račun", 0.8, "create"),
            ("novi račun", 0.7, "create"),
            ("fakturir", 0.8, "create"),
        ]),
        ("outgoing_invoice", &[
            ("izlazni račun", 0.8, "create"),
            ("izlazni racun", 0.8, "create"),
        ]),
        ("kompenzacije", &[
            ("kompenzacij", 0.9, "find"),
            ("prijeboj", 0.8, "find"),
        ]),
        ("likvidacija", &[
            ("likvidatur", 0.8, "check"),
            ("likvidacij", 0.7, "check"),
            ("kontrola računa", 0.6, "check"),
        ]),
        ("accruals", &[
            ("razgraničenj", 0.8, "create"),
            ("vremensko razgraničenje", 0.9, "create"),
        ]),
        ("novcani_tokovi", &[
            ("novčani tok", 0.8, "report"),
            ("cash flow", 0.7, "report"),
            ("likvidnost", 0.6, "report"),
        ]),
        ("porez_dobit", &[
            ("porez na dobit", 0.9, "calculate"),
            ("pd obrazac", 0.8, "calculate"),
        ]),
        ("porez_dohodak", &[
            ("porez na dohodak", 0.8, "calculate"),
            ("godišnja prijava dohotka", 0.8, "calculate"),
        ]),
        ("pdv_prijava", &[
            ("pdv prijav", 0.9, "calculate"),
            ("ppo obrazac", 0.8, "calculate"),
            ("obračun pdv", 0.8, "calculate"),
        ]),
        ("payroll", &[
            ("obračun plaće", 0.9, "calculate"),
            ("obracun place", 0.9, "calculate"),
            ("bruto u neto", 0.8, "calculate"),
            ("plaća za", 0.6, "calculate"),
        ]),
        ("joppd", &[("joppd", 0.9, "generate")]),
        ("drugi_dohodak", &[
            ("ugovor o djelu", 0.9, "calculate"),
            ("autorski honorar", 0.9, "calculate"),
            ("drugi dohodak", 0.8, "calculate"),
        ]),
        ("bolovanje", &[
            ("bolovanj", 0.8, "calculate"),
            ("naknada za bolovanje", 0.9, "calculate"),
        ]),
        ("place", &[("isplatna lista", 0.8, "list")]),
        ("peppol", &[("peppol", 0.9, "send")]),
        ("fiskalizacija2", &[
            ("fiskaliz", 0.8, "status"),
            ("jir", 0.7, "status"),
            ("zki", 0.7, "status"),
        ]),
        ("e_racun", &[
            ("pošalji e-račun", 0.8, "send"),
            ("validiraj e-račun", 0.8, "validate"),
        ]),
        ("intrastat", &[("intrastat", 0.9, "check")]),
        ("gfi_xml", &[("gfi", 0.7, "generate"), ("godišnji financijski izvještaj", 0.9, "generate")]),
        ("gfi_prep", &[("priprema gfi", 0.8, "prepare")]),
        ("reports", &[
            ("bilanca", 0.8, "bilanca"),
            ("rdg", 0.8, "rdg"),
            ("bruto bilanca", 0.8, "bruto_bilanca"),
            ("kartica konta", 0.8, "kartica"),
        ]),
        ("kpi", &[("kpi", 0.8, "calculate"), ("pokazatelj", 0.6, "calculate")]),
        ("management_accounting", &[
            ("kontroling", 0.7, "report"),
            ("mjesta troška", 0.7, "report"),
        ]),
        ("business_plan", &[("poslovni plan", 0.8, "draft")]),
        ("audit", &[("revizij", 0.7, "trail"), ("audit trag", 0.8, "trail")]),
        ("client_management", &[
            ("novi klijent", 0.8, "create"),
            ("popis klijenata", 0.8, "list"),
        ]),
        ("communication", &[("pošalji mail", 0.7, "email"), ("podsjetnik klijentu", 0.7, "remind")]),
        ("kadrovska", &[
            ("novi djelatnik", 0.8, "hire"),
            ("kadrovsk", 0.7, "list"),
        ]),
        ("deadlines", &[
            ("rok za predaju", 0.8, "list"),
            ("rokovi", 0.7, "list"),
            ("do kada", 0.5, "list"),
        ]),
        ("network", &[("mrežni status", 0.8, "status")]),
        ("vision_llm", &[("pročitaj sliku", 0.8, "extract"), ("slika računa", 0.7, "extract")]),
        ("rag", &[
            ("koji zakon", 0.7, "search"),
            ("prema zakonu", 0.7, "search"),
            ("propis", 0.6, "search"),
            ("narodne novine", 0.7, "search"),
        ]),
        ("scalability", &[("opterećenje sustava", 0.8, "status")]),
        ("web_ui", &[("sučelje", 0.6, "status")]),
        ("export", &[
            ("export u cpp", 0.9, "export"),
            ("export u synesis", 0.9, "export"),
            ("izvezi knjiženja", 0.8, "export"),
        ]),
    ]
}

/// Deterministički router — bez mreže, bez modela.
#[derive(Debug, Clone, Default)]
pub struct IntentRouter;

impl IntentRouter {
    pub fn new() -> Self {
        Self
    }

    pub fn route(&self, text: &str, has_file: bool) -> Route {
        let lower = text.to_lowercase();
        let entities = extract_entities(text, &lower);

        let mut best_module = "general";
        let mut best_score = 0.0f64;
        let mut best_sub_intent = "";

        for (module, patterns) in module_patterns() {
            let mut score = 0.0f64;
            let mut sub_intent = "";
            for (keyword, weight, intent) in patterns.iter() {
                if lower.contains(keyword) {
                    if *weight > score {
                        sub_intent = intent;
                    }
                    score = (score + weight).min(0.95);
                }
            }
            if score > best_score {
                best_score = score;
                best_module = module;
                best_sub_intent = sub_intent;
            }
        }

        // Oblikovna obilježja: datoteka bez jasnog teksta ide parserima.
        if has_file && best_score < 0.5 {
            let (module, sub_intent) = match entities.get("file_ext").map(String::as_str) {
                Some("xml") => ("eracuni_parser", "parse"),
                Some("csv") => ("bank_parser", "parse"),
                Some("pdf") | Some("jpg") | Some("jpeg") | Some("png") => ("invoice_ocr", "extract"),
                _ => ("universal_parser", "classify"),
            };
            return Route {
                module: module.to_string(),
                sub_intent: sub_intent.to_string(),
                entities,
                confidence: 0.65,
            };
        }

        // IBAN u tekstu bez druge namjere sugerira bankovni kontekst.
        if best_score < 0.4 && entities.contains_key("iban") {
            best_module = "bank_parser";
            best_sub_intent = "parse";
            best_score = 0.45;
        }

        Route {
            module: best_module.to_string(),
            sub_intent: best_sub_intent.to_string(),
            entities,
            confidence: (best_score * 100.0).round() / 100.0,
        }
    }
}

fn extract_entities(original: &str, lower: &str) -> HashMap<String, String> {
    let mut entities = HashMap::new();
    if let Some(m) = RE_OIB.find(original) {
        if crate::oib::validate_oib(m.as_str()) {
            entities.insert("oib".to_string(), m.as_str().to_string());
        }
    }
    if let Some(m) = RE_IBAN.find(original) {
        entities.insert("iban".to_string(), m.as_str().to_string());
    }
    if let Some(m) = RE_AMOUNT.find(lower) {
        let cleaned = m.as_str().trim();
        if cleaned.chars().any(|c| c.is_ascii_digit()) {
            entities.insert("amount".to_string(), cleaned.to_string());
        }
    }
    if let Some(cap) = RE_FILE_EXT.captures(lower) {
        entities.insert("file_ext".to_string(), cap[1].to_lowercase());
    }
    entities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_payroll() {
        let r = IntentRouter::new().route("Napravi obračun plaće za Anu, bruto 2000 EUR", false);
        assert_eq!(r.module, "payroll");
        assert!(r.confidence > 0.6);
        assert_eq!(r.sub_intent, "calculate");
        assert!(r.entities.contains_key("amount"));
        assert_eq!(dispatch_decision(&r), DispatchDecision::Execute);
    }

    #[test]
    fn routes_pdv_and_travel() {
        let router = IntentRouter::new();
        assert_eq!(router.route("pripremi PDV prijavu za veljaču", false).module, "pdv_prijava");
        let r = router.route("provjeri putni nalog, 150 km i dnevnica", false);
        assert_eq!(r.module, "putni_nalozi");
        assert!(r.confidence > 0.6);
    }

    #[test]
    fn file_extension_shapes_routing() {
        let router = IntentRouter::new();
        let r = router.route("učitaj izvod.csv", true);
        assert_eq!(r.module, "bank_parser");

        let r = router.route("dokument.xml", true);
        assert_eq!(r.module, "eracuni_parser");

        let r = router.route("scan.pdf", true);
        assert_eq!(r.module, "invoice_ocr");

        let r = router.route("nešto.bin", true);
        assert_eq!(r.module, "universal_parser");
        assert_eq!(dispatch_decision(&r), DispatchDecision::Execute);
    }

    #[test]
    fn unknown_text_goes_general() {
        let r = IntentRouter::new().route("kakvo je vrijeme danas", false);
        assert_eq!(r.module, "general");
        assert!(r.confidence < 0.4);
        assert_eq!(dispatch_decision(&r), DispatchDecision::ChatOnly);
    }

    #[test]
    fn mid_confidence_is_hint_only() {
        let route = Route {
            module: "blagajna".to_string(),
            sub_intent: "validate".to_string(),
            entities: HashMap::new(),
            confidence: 0.5,
        };
        assert_eq!(dispatch_decision(&route), DispatchDecision::Hint);
    }

    #[test]
    fn entities_extracted() {
        let oib = {
            let d = crate::oib::oib_control_digit("1234567890").unwrap();
            format!("1234567890{}", d)
        };
        let text = format!(
            "kontiraj račun dobavljača OIB {} IBAN HR1210010051863000160",
            oib
        );
        let r = IntentRouter::new().route(&text, false);
        assert_eq!(r.module, "kontiranje");
        assert_eq!(r.entities.get("oib"), Some(&oib));
        assert_eq!(
            r.entities.get("iban"),
            Some(&"HR1210010051863000160".to_string())
        );
    }

    #[test]
    fn iban_alone_hints_bank() {
        let r = IntentRouter::new().route("HR1210010051863000160", false);
        assert_eq!(r.module, "bank_parser");
        assert_eq!(dispatch_decision(&r), DispatchDecision::Hint);
    }

    #[test]
    fn modules_list_covers_patterns() {
        for (module, _) in module_patterns() {
            assert!(MODULES.contains(module), "modul {} nije u popisu", module);
        }
        assert!(MODULES.len() >= 45);
    }
}
