//! Korpus pravnih odlomaka s efektivnim razdobljima (sled).
//!
//! Invariant: za par (zakon, članak) najviše jedan odlomak ima prazan
//! `valid_to` (verzija na snazi). Upis nove verzije zatvara staru na
//! dan prije stupanja nove na snagu.

use crate::RagError;
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Kategorija propisa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LawCategory {
    Pdv,
    PorezDohodak,
    PorezDobit,
    Doprinosi,
    RadnoPravo,
    Racunovodstvo,
    Fiskalizacija,
    Ostalo,
}

/// Jedan atomski odlomak pravnog teksta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LawChunk {
    pub chunk_id: String,
    pub law_slug: String,
    pub law_name: String,
    pub law_code: String,
    pub category: LawCategory,
    /// Referenca članka, npr. "čl. 14. st. 4.".
    pub clanak: String,
    pub text: String,
    /// NN citat oblika "broj/godina", npr. "152/24".
    pub nn_ref: String,
    pub valid_from: NaiveDate,
    /// Prazno = trenutno na snazi.
    pub valid_to: Option<NaiveDate>,
}

impl LawChunk {
    pub fn new(
        law_slug: &str,
        law_name: &str,
        law_code: &str,
        category: LawCategory,
        clanak: &str,
        text: &str,
        nn_ref: &str,
        valid_from: NaiveDate,
    ) -> Self {
        Self {
            chunk_id: Uuid::new_v4().simple().to_string()[..12].to_string(),
            law_slug: law_slug.to_string(),
            law_name: law_name.to_string(),
            law_code: law_code.to_string(),
            category,
            clanak: clanak.to_string(),
            text: text.to_string(),
            nn_ref: nn_ref.to_string(),
            valid_from,
            valid_to: None,
        }
    }

    /// Je li odlomak bio na snazi na zadani datum (oba ruba uključiva).
    pub fn was_valid_on(&self, date: NaiveDate) -> bool {
        if date < self.valid_from {
            return false;
        }
        match self.valid_to {
            Some(to) => date <= to,
            None => true,
        }
    }

    pub fn in_force(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Doslovan citat za listu izvora.
    pub fn citation(&self) -> String {
        let razdoblje = match self.valid_to {
            Some(to) => format!("{} – {}", self.valid_from, to),
            None => format!("od {}", self.valid_from),
        };
        let mut c = format!(
            "{}, {}, NN {} ({})",
            self.law_code, self.clanak, self.nn_ref, razdoblje
        );
        if !self.in_force() {
            c.push_str(" [IZVAN SNAGE]");
        }
        c
    }
}

/// Odlomak s ocjenom relevantnosti za upit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: LawChunk,
    pub score: f64,
}

/// Odgovor RAG-a: kratak tekst + doslovni citati.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub citations: Vec<String>,
}

/// Sled korpus odlomaka.
pub struct LawStore {
    db: sled::Db,
}

impl LawStore {
    pub fn open(path: &Path) -> Result<Self, RagError> {
        Ok(Self {
            db: sled::open(path)?,
        })
    }

    /// Ubaci odlomak. Ako za (zakon, članak) već postoji verzija na
    /// snazi, zatvara se na dan prije `valid_from` nove verzije.
    pub fn insert(&self, chunk: LawChunk) -> Result<(), RagError> {
        for existing in self.chunks_for(&chunk.law_slug, &chunk.clanak)? {
            if existing.in_force() && existing.chunk_id != chunk.chunk_id {
                let mut closed = existing.clone();
                closed.valid_to = Some(chunk.valid_from - Duration::days(1));
                self.put(&closed)?;
                info!(
                    target: "saldo::rag",
                    "{} {} zatvoren na {} (nova verzija od {})",
                    closed.law_slug,
                    closed.clanak,
                    closed.valid_to.map(|d| d.to_string()).unwrap_or_default(),
                    chunk.valid_from
                );
            }
        }
        self.put(&chunk)
    }

    fn put(&self, chunk: &LawChunk) -> Result<(), RagError> {
        let bytes = serde_json::to_vec(chunk)?;
        self.db.insert(chunk.chunk_id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn chunk_count(&self) -> usize {
        self.db.len()
    }

    fn all_chunks(&self) -> Result<Vec<LawChunk>, RagError> {
        let mut out = Vec::new();
        for item in self.db.iter() {
            let (_, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn chunks_for(&self, law_slug: &str, clanak: &str) -> Result<Vec<LawChunk>, RagError> {
        Ok(self
            .all_chunks()?
            .into_iter()
            .filter(|c| c.law_slug == law_slug && c.clanak == clanak)
            .collect())
    }

    /// Pretraga: tokenizirani upit protiv teksta odlomka, filtrirano po
    /// `event_date` (bez datuma: trenutno na snazi). `include_expired`
    /// dopušta i istekle verzije za povijesna istraživanja.
    pub fn search(
        &self,
        query: &str,
        event_date: Option<NaiveDate>,
        include_expired: bool,
        limit: usize,
    ) -> Result<Vec<ScoredChunk>, RagError> {
        let tokens: HashSet<String> = tokenize(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredChunk> = self
            .all_chunks()?
            .into_iter()
            .filter(|c| match event_date {
                Some(date) => c.was_valid_on(date) || (include_expired && date >= c.valid_from),
                None => c.in_force() || include_expired,
            })
            .filter_map(|c| {
                let text_tokens = tokenize(&format!("{} {} {}", c.text, c.law_name, c.clanak));
                let hits = tokens.intersection(&text_tokens).count();
                if hits == 0 {
                    return None;
                }
                let score = hits as f64 / tokens.len() as f64;
                Some(ScoredChunk { chunk: c, score })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.chunk.valid_from.cmp(&a.chunk.valid_from))
        });
        scored.truncate(limit);
        Ok(scored)
    }

    /// Kratak odgovor iz najboljih odlomaka + popis citata. Tekst
    /// odgovora je doslovan isječak korpusa, nikad generirana brojka.
    pub fn answer(
        &self,
        query: &str,
        event_date: Option<NaiveDate>,
        include_expired: bool,
    ) -> Result<RagAnswer, RagError> {
        let hits = self.search(query, event_date, include_expired, 3)?;
        if hits.is_empty() {
            return Ok(RagAnswer {
                answer: "U korpusu nema propisa koji odgovara upitu.".to_string(),
                citations: Vec::new(),
            });
        }

        let datum = event_date.unwrap_or_else(|| Utc::now().date_naive());
        let best = &hits[0].chunk;
        let answer = format!(
            "Prema {} ({}), na snazi {}: {}",
            best.law_code, best.clanak, datum, best.text
        );
        let citations = hits.iter().map(|h| h.chunk.citation()).collect();
        Ok(RagAnswer { answer, citations })
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store() -> (tempfile::TempDir, LawStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LawStore::open(&dir.path().join("rag")).unwrap();
        (dir, store)
    }

    fn km_chunk_old() -> LawChunk {
        LawChunk::new(
            "pravilnik_o_neoporezivim_primicima",
            "Pravilnik o neoporezivim primicima",
            "PNP",
            LawCategory::PorezDohodak,
            "čl. 7.",
            "Neoporeziva naknada za korištenje privatnog automobila u službene svrhe iznosi 0,30 EUR po kilometru.",
            "1/23",
            date(2023, 1, 1),
        )
    }

    fn km_chunk_new() -> LawChunk {
        LawChunk::new(
            "pravilnik_o_neoporezivim_primicima",
            "Pravilnik o neoporezivim primicima",
            "PNP",
            LawCategory::PorezDohodak,
            "čl. 7.",
            "Neoporeziva naknada za korištenje privatnog automobila u službene svrhe iznosi 0,40 EUR po kilometru.",
            "152/24",
            date(2025, 1, 1),
        )
    }

    #[test]
    fn was_valid_on_inclusive_bounds() {
        let mut c = km_chunk_old();
        c.valid_to = Some(date(2024, 12, 31));
        assert!(c.was_valid_on(date(2023, 1, 1)));
        assert!(c.was_valid_on(date(2024, 12, 31)));
        assert!(!c.was_valid_on(date(2025, 1, 1)));
        assert!(!c.was_valid_on(date(2022, 12, 31)));
    }

    #[test]
    fn insert_closes_previous_version() {
        let (_dir, store) = store();
        store.insert(km_chunk_old()).unwrap();
        store.insert(km_chunk_new()).unwrap();

        let chunks = store
            .chunks_for("pravilnik_o_neoporezivim_primicima", "čl. 7.")
            .unwrap();
        assert_eq!(chunks.len(), 2);
        let in_force: Vec<_> = chunks.iter().filter(|c| c.in_force()).collect();
        assert_eq!(in_force.len(), 1, "najviše jedan odlomak na snazi");
        assert!(in_force[0].text.contains("0,40"));

        let closed = chunks.iter().find(|c| !c.in_force()).unwrap();
        assert_eq!(closed.valid_to, Some(date(2024, 12, 31)));
    }

    #[test]
    fn time_aware_search_km_rate() {
        let (_dir, store) = store();
        store.insert(km_chunk_old()).unwrap();
        store.insert(km_chunk_new()).unwrap();

        // Događaj 2024.: vraća povijesnu stopu 0,30.
        let hits = store
            .search("kilometru naknada automobila", Some(date(2024, 6, 1)), false, 5)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].chunk.text.contains("0,30"));

        // Događaj 2025.: vraća važeću stopu 0,40.
        let hits = store
            .search("kilometru naknada automobila", Some(date(2025, 6, 1)), false, 5)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].chunk.text.contains("0,40"));

        // Bez datuma: trenutno na snazi.
        let hits = store
            .search("kilometru naknada automobila", None, false, 5)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].chunk.in_force());
    }

    #[test]
    fn expired_annotated_izvan_snage() {
        let (_dir, store) = store();
        store.insert(km_chunk_old()).unwrap();
        store.insert(km_chunk_new()).unwrap();

        let answer = store
            .answer("kilometru naknada", Some(date(2025, 6, 1)), true)
            .unwrap();
        assert!(answer
            .citations
            .iter()
            .any(|c| c.contains("IZVAN SNAGE")));
        assert!(answer.citations.iter().any(|c| !c.contains("IZVAN SNAGE")));
    }

    #[test]
    fn answer_quotes_corpus_verbatim() {
        let (_dir, store) = store();
        store.insert(km_chunk_new()).unwrap();
        let answer = store.answer("naknada kilometru", None, false).unwrap();
        assert!(answer.answer.contains("0,40 EUR po kilometru"));
        assert!(answer.citations[0].contains("NN 152/24"));
    }

    #[test]
    fn empty_query_or_no_match() {
        let (_dir, store) = store();
        store.insert(km_chunk_new()).unwrap();
        assert!(store.search("", None, false, 5).unwrap().is_empty());
        let answer = store.answer("nepostojeća tema xyz", None, false).unwrap();
        assert!(answer.citations.is_empty());
    }
}
