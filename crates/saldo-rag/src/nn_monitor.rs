//! NN monitor: praćenje Narodnih novina za izmjene praćenih propisa.
//!
//! Monitor periodički skenira nova NN izdanja, boduje naslove članaka
//! prema listi ključnih riječi relevantnih za računovodstvo i označava
//! izmjene praćenih zakona za ingest u korpus. Mrežni dohvat je odvojen
//! od parsiranja pa se parsiranje i bodovanje testiraju offline.

use crate::catalogue::LAW_CATALOG;
use crate::RagError;
use chrono::Utc;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// Ključne riječi s težinama za bodovanje relevantnosti naslova.
/// Namjerno su korijeni riječi, bez padežnih nastavaka — naslovi u NN
/// dolaze u genitivu ("Zakona o porezu...").
pub const TRACKED_KEYWORDS: &[(&str, f64)] = &[
    ("dodanu vrijednost", 1.0),
    ("pdv", 1.0),
    ("na dohodak", 1.0),
    ("na dobit", 1.0),
    ("doprinos", 0.9),
    ("računovodstv", 0.9),
    ("fiskalizacij", 0.9),
    ("joppd", 0.9),
    ("neoporeziv", 0.8),
    ("minimalnoj plaći", 0.8),
    ("amortizacij", 0.7),
    ("e-račun", 0.8),
    ("elektroničk", 0.6),
    ("poreznoj prijavi", 0.7),
    ("obračun", 0.6),
    ("plać", 0.5),
    ("o radu", 0.6),
    ("trgovačk", 0.4),
    ("obrt", 0.4),
    ("gotovin", 0.6),
];

/// Prag relevantnosti iznad kojeg se članak prijavljuje.
pub const RELEVANCE_THRESHOLD: f64 = 0.4;

/// Jedan članak iz NN izdanja.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NNArticle {
    pub nn_ref: String,
    pub title: String,
    pub relevance: f64,
    /// Slug praćenog zakona kojem je ovo izmjena, ako je prepoznato.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amends_law: Option<String>,
}

/// Rezultat jedne provjere NN izdanja.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NNCheckResult {
    pub checked_issues: Vec<String>,
    pub relevant_articles: Vec<NNArticle>,
    pub amendments_found: usize,
    pub checked_at: String,
}

/// Monitor Narodnih novina.
pub struct NNMonitor {
    check_log_path: PathBuf,
    client: reqwest::Client,
}

impl NNMonitor {
    pub fn new(state_dir: PathBuf) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            check_log_path: state_dir.join("nn_check_log.json"),
            client,
        }
    }

    /// Ocijeni relevantnost naslova za računovodstvo: najjači pogodak
    /// ključne riječi + 0.1 po svakom dodatnom pogotku, najviše 1.0.
    pub fn score_title(title: &str) -> f64 {
        let lower = title.to_lowercase();
        let mut hits: Vec<f64> = TRACKED_KEYWORDS
            .iter()
            .filter(|(kw, _)| lower.contains(kw))
            .map(|(_, w)| *w)
            .collect();
        hits.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        match hits.split_first() {
            None => 0.0,
            Some((best, rest)) => (best + 0.1 * rest.len() as f64).min(1.0),
        }
    }

    /// Prepoznaj kojem praćenom zakonu naslov mijenja tekst:
    /// "izmjena/dopuna" + ime zakona iz kataloga.
    pub fn detect_amendment(title: &str) -> Option<String> {
        let lower = title.to_lowercase();
        if !(lower.contains("izmjen") || lower.contains("dopun")) {
            return None;
        }
        LAW_CATALOG
            .iter()
            .find(|law| {
                let name = law.name.to_lowercase();
                // NN naslovi zakone navode u genitivu: "Zakona o ...".
                let genitive = name
                    .replacen("zakon ", "zakona ", 1)
                    .replacen("pravilnik ", "pravilnika ", 1);
                lower.contains(&name) || lower.contains(&genitive)
            })
            .map(|law| law.slug.to_string())
    }

    /// Parsiraj HTML stranicu NN izdanja u članke s bodovima.
    /// Selektor cilja listu akata; radi i na pojednostavljenom HTML-u.
    pub fn parse_issue_page(html: &str, nn_ref: &str) -> Vec<NNArticle> {
        let document = Html::parse_document(html);
        let selectors = ["li a", "td a", "h3 a", "a.document-link"];
        let mut out = Vec::new();

        for sel in selectors {
            let Ok(selector) = Selector::parse(sel) else {
                continue;
            };
            for element in document.select(&selector) {
                let title = element.text().collect::<String>().trim().to_string();
                if title.len() < 10 {
                    continue;
                }
                let relevance = Self::score_title(&title);
                if relevance < RELEVANCE_THRESHOLD {
                    continue;
                }
                let amends = Self::detect_amendment(&title);
                if out
                    .iter()
                    .any(|a: &NNArticle| a.title == title)
                {
                    continue;
                }
                out.push(NNArticle {
                    nn_ref: nn_ref.to_string(),
                    title,
                    relevance,
                    amends_law: amends,
                });
            }
            if !out.is_empty() {
                break;
            }
        }
        out
    }

    /// Dohvati i provjeri jedno NN izdanje (mrežno).
    pub async fn check_issue(&self, url: &str, nn_ref: &str) -> Result<NNCheckResult, RagError> {
        let html = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RagError::Fetch(e.to_string()))?
            .text()
            .await
            .map_err(|e| RagError::Fetch(e.to_string()))?;

        let articles = Self::parse_issue_page(&html, nn_ref);
        let result = NNCheckResult {
            checked_issues: vec![nn_ref.to_string()],
            amendments_found: articles.iter().filter(|a| a.amends_law.is_some()).count(),
            relevant_articles: articles,
            checked_at: Utc::now().to_rfc3339(),
        };
        self.save_check_log(&result)?;
        info!(
            target: "saldo::rag",
            "NN {}: {} relevantnih članaka, {} izmjena praćenih zakona",
            nn_ref,
            result.relevant_articles.len(),
            result.amendments_found
        );
        Ok(result)
    }

    pub fn save_check_log(&self, result: &NNCheckResult) -> Result<(), RagError> {
        if let Some(parent) = self.check_log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut log: Vec<NNCheckResult> = std::fs::read_to_string(&self.check_log_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        log.push(result.clone());
        std::fs::write(&self.check_log_path, serde_json::to_string_pretty(&log)?)?;
        Ok(())
    }

    pub fn status(&self) -> serde_json::Value {
        let log: Vec<NNCheckResult> = std::fs::read_to_string(&self.check_log_path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        json!({
            "checks": log.len(),
            "last_check": log.last().map(|r| r.checked_at.clone()),
            "tracked_keywords": TRACKED_KEYWORDS.len(),
            "tracked_laws": LAW_CATALOG.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_cover_core_taxes() {
        let kws: Vec<&str> = TRACKED_KEYWORDS.iter().map(|(k, _)| *k).collect();
        for needle in ["pdv", "dodanu vrijednost", "na dohodak", "na dobit", "doprinos", "joppd"] {
            assert!(kws.contains(&needle), "nedostaje ključna riječ {}", needle);
        }
        assert!(TRACKED_KEYWORDS.len() >= 15);
    }

    #[test]
    fn relevance_high_for_pdv() {
        let score = NNMonitor::score_title(
            "Zakon o izmjenama i dopunama Zakona o porezu na dodanu vrijednost",
        );
        assert!(score >= 0.9, "score = {}", score);
    }

    #[test]
    fn relevance_low_for_irrelevant() {
        let score = NNMonitor::score_title("Odluka o imenovanju ravnatelja kazališta");
        assert!(score < RELEVANCE_THRESHOLD);
    }

    #[test]
    fn relevance_medium_for_labour() {
        let score = NNMonitor::score_title("Uredba o izmjeni Zakona o radu");
        assert!(score >= RELEVANCE_THRESHOLD && score < 0.9, "score = {}", score);
    }

    #[test]
    fn amendment_detection_maps_to_catalog() {
        let slug = NNMonitor::detect_amendment(
            "Zakon o izmjenama i dopunama Zakona o porezu na dodanu vrijednost",
        );
        assert_eq!(slug.as_deref(), Some("zakon_o_pdv"));

        assert!(NNMonitor::detect_amendment("Zakon o porezu na dodanu vrijednost").is_none());
        assert!(NNMonitor::detect_amendment("Izmjena Pravilnika o kazalištima").is_none());
    }

    #[test]
    fn parse_issue_page_scores_and_dedups() {
        let html = r#"
            <html><body><ul>
              <li><a href="/1">Zakon o izmjenama i dopunama Zakona o porezu na dobit</a></li>
              <li><a href="/2">Odluka o imenovanju ravnatelja kazališta</a></li>
              <li><a href="/3">Pravilnik o neoporezivim primicima — izmjene</a></li>
              <li><a href="/3b">Zakon o izmjenama i dopunama Zakona o porezu na dobit</a></li>
            </ul></body></html>
        "#;
        let articles = NNMonitor::parse_issue_page(html, "151/25");
        assert_eq!(articles.len(), 2);
        assert!(articles.iter().all(|a| a.relevance >= RELEVANCE_THRESHOLD));
        assert_eq!(
            articles[0].amends_law.as_deref(),
            Some("zakon_o_porezu_na_dobit")
        );
        assert!(articles.iter().all(|a| a.nn_ref == "151/25"));
    }

    #[test]
    fn check_log_persists() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = NNMonitor::new(dir.path().to_path_buf());
        let result = NNCheckResult {
            checked_issues: vec!["151/25".to_string()],
            relevant_articles: Vec::new(),
            amendments_found: 0,
            checked_at: Utc::now().to_rfc3339(),
        };
        monitor.save_check_log(&result).unwrap();
        monitor.save_check_log(&result).unwrap();

        let status = monitor.status();
        assert_eq!(status["checks"], 2);
        assert!(status["last_check"].is_string());
    }
}
