//! Četveroslojni memorijski sustav — sve neovisno o modelu.
//!
//! | Sloj | Sadržaj                                  | Pohrana        |
//! |------|------------------------------------------|----------------|
//! | L0   | radni kontekst sesije                    | DashMap        |
//! | L1   | epizodna memorija — današnji razgovori   | SQLite         |
//! | L2   | semantička — naučena pravila kontiranja  | SQLite         |
//! | L3   | preferencijski parovi za DPO trening     | SQLite + JSONL |
//!
//! L2 i L3 preživljavaju svaku zamjenu modela netaknuti; to jamči
//! Knowledge Vault manifestom nad `memory.db`.

use crate::error::MemoryError;
use crate::types::{CorrectionRecord, DocumentType, Strana};
use chrono::Utc;
use dashmap::DashMap;
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prag broja parova za noćni izvoz DPO skupa.
pub const DPO_EXPORT_THRESHOLD: usize = 50;

/// Početna pouzdanost L2 pravila nakon prvog ispravka.
const L2_INITIAL_CONFIDENCE: f64 = 0.6;
/// Prirast pouzdanosti po potvrdi; raste monotono do stropa.
const L2_CONFIDENCE_STEP: f64 = 0.1;
const L2_CONFIDENCE_CAP: f64 = 0.99;

// ────────────────────────────────────────────────────────
// L0: radna memorija sesije
// ────────────────────────────────────────────────────────

/// Radni kontekst jedne sesije: aktivni klijent, tema, zadnji dokument.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkingContext {
    #[serde(default)]
    pub active_client: String,
    #[serde(default)]
    pub current_topic: String,
    #[serde(default)]
    pub last_document: String,
    #[serde(default)]
    pub updated_ms: i64,
}

// ────────────────────────────────────────────────────────
// L1: epizodna memorija
// ────────────────────────────────────────────────────────

/// Jedna epizoda dijaloga (dan, korisnik, sesija, upit, sažetak odgovora).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub day: String,
    pub ts_ms: i64,
    pub user_id: String,
    pub session_id: String,
    pub query: String,
    pub response_digest: String,
}

// ────────────────────────────────────────────────────────
// L2: semantička pravila
// ────────────────────────────────────────────────────────

/// Naučeno pravilo: (klijent, OIB dobavljača, vrsta dokumenta) → konto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticRule {
    pub client_id: String,
    pub supplier_oib: String,
    pub document_kind: String,
    pub konto: String,
    pub confidence: f64,
    pub confirmations: u32,
}

// ────────────────────────────────────────────────────────
// L3: preferencijski parovi
// ────────────────────────────────────────────────────────

/// DPO par: (prompt, chosen, rejected) + vrsta ispravka.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencePair {
    pub prompt: String,
    pub chosen: String,
    pub rejected: String,
    pub correction_kind: String,
}

/// Memorijski sustav nad jednom SQLite bazom + in-process L0.
pub struct MemorySystem {
    db_path: PathBuf,
    working: DashMap<String, WorkingContext>,
}

impl MemorySystem {
    pub fn open(db_path: PathBuf) -> Result<Self, MemoryError> {
        let this = Self {
            db_path,
            working: DashMap::new(),
        };
        this.init()?;
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init(&self) -> Result<(), MemoryError> {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS episodic (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                day TEXT NOT NULL,
                ts_ms INTEGER NOT NULL,
                user_id TEXT NOT NULL,
                session_id TEXT NOT NULL,
                query TEXT NOT NULL,
                response_digest TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_episodic_day ON episodic(day);

            CREATE TABLE IF NOT EXISTS semantic (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id TEXT NOT NULL,
                supplier_oib TEXT NOT NULL,
                document_kind TEXT NOT NULL,
                konto TEXT NOT NULL,
                confidence REAL NOT NULL,
                confirmations INTEGER NOT NULL,
                updated_ms INTEGER NOT NULL,
                UNIQUE(client_id, supplier_oib, document_kind)
            );

            CREATE TABLE IF NOT EXISTS preference (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ts_ms INTEGER NOT NULL,
                prompt TEXT NOT NULL,
                chosen TEXT NOT NULL,
                rejected TEXT NOT NULL,
                correction_kind TEXT NOT NULL,
                consumed INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        Ok(())
    }

    // ── L0 ──

    pub fn working_get(&self, session_id: &str) -> WorkingContext {
        self.working
            .get(session_id)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn working_update(
        &self,
        session_id: &str,
        update: impl FnOnce(&mut WorkingContext),
    ) {
        let mut entry = self.working.entry(session_id.to_string()).or_default();
        update(&mut entry);
        entry.updated_ms = Utc::now().timestamp_millis();
    }

    pub fn working_clear(&self, session_id: &str) {
        self.working.remove(session_id);
    }

    /// Izbaci sesije bez aktivnosti duže od `max_idle_ms`.
    pub fn working_evict_idle(&self, max_idle_ms: i64) -> usize {
        let cutoff = Utc::now().timestamp_millis() - max_idle_ms;
        let stale: Vec<String> = self
            .working
            .iter()
            .filter(|e| e.updated_ms < cutoff)
            .map(|e| e.key().clone())
            .collect();
        for key in &stale {
            self.working.remove(key);
        }
        stale.len()
    }

    // ── L1 ──

    /// Upiši epizodu za današnji dan.
    pub fn record_episode(
        &self,
        user_id: &str,
        session_id: &str,
        query: &str,
        response: &str,
    ) -> Result<(), MemoryError> {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        let digest: String = response.chars().take(240).collect();
        self.conn()?.execute(
            "INSERT INTO episodic (day, ts_ms, user_id, session_id, query, response_digest)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                day,
                Utc::now().timestamp_millis(),
                user_id,
                session_id,
                query,
                digest
            ],
        )?;
        Ok(())
    }

    /// Pretraži današnje epizode po podstringu (case-insensitive).
    /// Stariji dani se ne vraćaju — L1 se roluje strogo po danu.
    pub fn search_today(&self, needle: &str) -> Result<Vec<Episode>, MemoryError> {
        let day = Utc::now().format("%Y-%m-%d").to_string();
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT day, ts_ms, user_id, session_id, query, response_digest
             FROM episodic
             WHERE day = ?1 AND (query LIKE ?2 COLLATE NOCASE
                                 OR response_digest LIKE ?2 COLLATE NOCASE)
             ORDER BY ts_ms",
        )?;
        let pattern = format!("%{}%", needle);
        let rows = stmt.query_map(params![day, pattern], |row| {
            Ok(Episode {
                day: row.get(0)?,
                ts_ms: row.get(1)?,
                user_id: row.get(2)?,
                session_id: row.get(3)?,
                query: row.get(4)?,
                response_digest: row.get(5)?,
            })
        })?;
        Ok(rows.filter_map(Result::ok).collect())
    }

    /// Obriši epizode starije od `keep_days` dana.
    pub fn purge_old_episodes(&self, keep_days: i64) -> Result<usize, MemoryError> {
        let cutoff = (Utc::now() - chrono::Duration::days(keep_days))
            .format("%Y-%m-%d")
            .to_string();
        let n = self
            .conn()?
            .execute("DELETE FROM episodic WHERE day < ?1", params![cutoff])?;
        Ok(n)
    }

    // ── L2 ──

    /// Nauči pravilo iz ispravka. Ponovljena potvrda istog konta
    /// monotono podiže pouzdanost; ispravak na drugi konto je resetira.
    pub fn learn_rule(
        &self,
        client_id: &str,
        supplier_oib: &str,
        document_kind: &str,
        konto: &str,
    ) -> Result<SemanticRule, MemoryError> {
        let conn = self.conn()?;
        let existing: Option<(String, f64, u32)> = conn
            .query_row(
                "SELECT konto, confidence, confirmations FROM semantic
                 WHERE client_id = ?1 AND supplier_oib = ?2 AND document_kind = ?3",
                params![client_id, supplier_oib, document_kind],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .ok();

        let (confidence, confirmations) = match existing {
            Some((ref old_konto, conf, n)) if old_konto == konto => {
                ((conf + L2_CONFIDENCE_STEP).min(L2_CONFIDENCE_CAP), n + 1)
            }
            Some(_) => {
                debug!(
                    target: "saldo::memory",
                    "L2 pravilo ({}, {}, {}) resetirano na konto {}",
                    client_id, supplier_oib, document_kind, konto
                );
                (L2_INITIAL_CONFIDENCE, 1)
            }
            None => (L2_INITIAL_CONFIDENCE, 1),
        };

        conn.execute(
            "INSERT INTO semantic
                 (client_id, supplier_oib, document_kind, konto, confidence,
                  confirmations, updated_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(client_id, supplier_oib, document_kind) DO UPDATE SET
                 konto = excluded.konto,
                 confidence = excluded.confidence,
                 confirmations = excluded.confirmations,
                 updated_ms = excluded.updated_ms",
            params![
                client_id,
                supplier_oib,
                document_kind,
                konto,
                confidence,
                confirmations,
                Utc::now().timestamp_millis()
            ],
        )?;

        Ok(SemanticRule {
            client_id: client_id.to_string(),
            supplier_oib: supplier_oib.to_string(),
            document_kind: document_kind.to_string(),
            konto: konto.to_string(),
            confidence,
            confirmations,
        })
    }

    /// Dohvati naučeno pravilo za (klijent, OIB, vrsta dokumenta).
    pub fn semantic_hint(
        &self,
        client_id: &str,
        supplier_oib: &str,
        document_kind: &str,
    ) -> Result<Option<SemanticRule>, MemoryError> {
        let conn = self.conn()?;
        let rule = conn
            .query_row(
                "SELECT konto, confidence, confirmations FROM semantic
                 WHERE client_id = ?1 AND supplier_oib = ?2 AND document_kind = ?3",
                params![client_id, supplier_oib, document_kind],
                |row| {
                    Ok(SemanticRule {
                        client_id: client_id.to_string(),
                        supplier_oib: supplier_oib.to_string(),
                        document_kind: document_kind.to_string(),
                        konto: row.get(0)?,
                        confidence: row.get(1)?,
                        confirmations: row.get(2)?,
                    })
                },
            )
            .ok();
        Ok(rule)
    }

    pub fn semantic_rule_count(&self) -> Result<usize, MemoryError> {
        let n: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM semantic", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    // ── L3 ──

    pub fn record_preference(&self, pair: &PreferencePair) -> Result<(), MemoryError> {
        self.conn()?.execute(
            "INSERT INTO preference (ts_ms, prompt, chosen, rejected, correction_kind)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Utc::now().timestamp_millis(),
                pair.prompt,
                pair.chosen,
                pair.rejected,
                pair.correction_kind
            ],
        )?;
        Ok(())
    }

    pub fn unused_preference_count(&self) -> Result<usize, MemoryError> {
        let n: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM preference WHERE consumed = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// Izvezi nepotrošene parove u JSONL i označi ih potrošenima.
    /// Transakcijski: datoteka se piše prije oznake; parovi se nikad ne
    /// izvoze dvaput.
    pub fn export_preferences(
        &self,
        out_path: &Path,
        min_pairs: usize,
    ) -> Result<usize, MemoryError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, prompt, chosen, rejected, correction_kind
             FROM preference WHERE consumed = 0 ORDER BY id",
        )?;
        let rows: Vec<(i64, PreferencePair)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    PreferencePair {
                        prompt: row.get(1)?,
                        chosen: row.get(2)?,
                        rejected: row.get(3)?,
                        correction_kind: row.get(4)?,
                    },
                ))
            })?
            .filter_map(Result::ok)
            .collect();

        if rows.len() < min_pairs {
            return Err(MemoryError::NotEnoughPairs {
                got: rows.len(),
                need: min_pairs,
            });
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(out_path)?;
        for (_, pair) in &rows {
            let line = serde_json::to_string(pair)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            writeln!(file, "{}", line)?;
        }
        file.sync_all()?;

        let ids: Vec<String> = rows.iter().map(|(id, _)| id.to_string()).collect();
        conn.execute(
            &format!(
                "UPDATE preference SET consumed = 1 WHERE id IN ({})",
                ids.join(",")
            ),
            [],
        )?;

        info!(
            target: "saldo::memory",
            "Izvezeno {} DPO parova u {}",
            rows.len(),
            out_path.display()
        );
        Ok(rows.len())
    }

    /// Konzumiraj zapis ispravka: L2 uči konto, L3 dobiva DPO par.
    pub fn consume_correction(&self, rec: &CorrectionRecord) -> Result<(), MemoryError> {
        // L2: prvi duguje-konto iz ispravljenih stavki je naučeni izbor.
        let chosen_konto = rec
            .corrected_lines
            .iter()
            .find(|l| l.strana == Strana::Duguje)
            .map(|l| l.konto.clone());
        let original_konto = rec
            .original_lines
            .iter()
            .find(|l| l.strana == Strana::Duguje)
            .map(|l| l.konto.clone());

        if let Some(ref konto) = chosen_konto {
            if !rec.client_id.is_empty() {
                self.learn_rule(
                    &rec.client_id,
                    &oib_or_unknown(rec),
                    rec.document_type.as_str(),
                    konto,
                )?;
            }
        }

        // L3: par (prompt, chosen, rejected) za noćni DPO trening.
        let prompt = format!(
            "Kontiranje za klijenta {} ({}): {}",
            rec.client_id,
            rec.document_type.as_str(),
            rec.original_opis
        );
        self.record_preference(&PreferencePair {
            prompt,
            chosen: chosen_konto.unwrap_or_default(),
            rejected: original_konto.unwrap_or_default(),
            correction_kind: document_correction_kind(rec.document_type),
        })?;
        Ok(())
    }
}

fn oib_or_unknown(rec: &CorrectionRecord) -> String {
    rec.corrected_lines
        .iter()
        .chain(rec.original_lines.iter())
        .map(|l| l.oib.clone())
        .find(|o| !o.is_empty())
        .unwrap_or_else(|| "nepoznat".to_string())
}

fn document_correction_kind(kind: DocumentType) -> String {
    format!("konto_{}", kind.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BookingLine;

    fn memory() -> (tempfile::TempDir, MemorySystem) {
        let dir = tempfile::tempdir().unwrap();
        let mem = MemorySystem::open(dir.path().join("memory.db")).unwrap();
        (dir, mem)
    }

    #[test]
    fn working_context_lifecycle() {
        let (_dir, mem) = memory();
        mem.working_update("s1", |ctx| {
            ctx.active_client = "klijent-1".to_string();
            ctx.current_topic = "pdv".to_string();
        });
        assert_eq!(mem.working_get("s1").active_client, "klijent-1");

        mem.working_clear("s1");
        assert_eq!(mem.working_get("s1").active_client, "");
    }

    #[test]
    fn episodic_search_today_only() {
        let (_dir, mem) = memory();
        mem.record_episode("ana", "s1", "koliki je PDV za ugostiteljstvo", "13 %")
            .unwrap();
        mem.record_episode("ana", "s1", "obračun plaće", "u redu")
            .unwrap();

        let hits = mem.search_today("pdv").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].query.contains("PDV"));
        assert!(mem.search_today("ne postoji").unwrap().is_empty());
    }

    #[test]
    fn semantic_confidence_grows_and_resets() {
        let (_dir, mem) = memory();
        let r1 = mem.learn_rule("c1", "12345678903", "ulazni_racun", "4010").unwrap();
        assert_eq!(r1.confidence, 0.6);
        assert_eq!(r1.confirmations, 1);

        let r2 = mem.learn_rule("c1", "12345678903", "ulazni_racun", "4010").unwrap();
        assert!(r2.confidence > r1.confidence);
        assert_eq!(r2.confirmations, 2);

        // Monotoni rast do stropa.
        let mut last = r2.confidence;
        for _ in 0..10 {
            let r = mem.learn_rule("c1", "12345678903", "ulazni_racun", "4010").unwrap();
            assert!(r.confidence >= last);
            last = r.confidence;
        }
        assert!(last <= 0.99);

        // Ispravak na drugi konto resetira.
        let r = mem.learn_rule("c1", "12345678903", "ulazni_racun", "4120").unwrap();
        assert_eq!(r.confidence, 0.6);
        assert_eq!(r.confirmations, 1);
        assert_eq!(r.konto, "4120");
    }

    #[test]
    fn preference_export_threshold_and_consumed() {
        let (dir, mem) = memory();
        for i in 0..5 {
            mem.record_preference(&PreferencePair {
                prompt: format!("prompt {}", i),
                chosen: "4010".to_string(),
                rejected: "7800".to_string(),
                correction_kind: "konto".to_string(),
            })
            .unwrap();
        }

        let out = dir.path().join("dpo.jsonl");
        // Prag veći od broja parova → greška, ništa nije potrošeno.
        assert!(matches!(
            mem.export_preferences(&out, 10),
            Err(MemoryError::NotEnoughPairs { got: 5, need: 10 })
        ));
        assert_eq!(mem.unused_preference_count().unwrap(), 5);

        let n = mem.export_preferences(&out, 5).unwrap();
        assert_eq!(n, 5);
        assert_eq!(mem.unused_preference_count().unwrap(), 0);

        let text = std::fs::read_to_string(&out).unwrap();
        assert_eq!(text.lines().count(), 5);

        // Drugi izvoz nema što izvesti.
        assert!(mem.export_preferences(&out, 1).is_err());
    }

    #[test]
    fn correction_feeds_l2_and_l3() {
        let (_dir, mem) = memory();
        let mut original = BookingLine::duguje("7800", 100.0, "Trošak");
        original.oib = "12345678903".to_string();
        let corrected = BookingLine::duguje("4010", 100.0, "Uredski materijal");

        let rec = CorrectionRecord {
            proposal_id: "p1".to_string(),
            user_id: "ana".to_string(),
            client_id: "c1".to_string(),
            document_type: DocumentType::UlazniRacun,
            original_lines: vec![original],
            corrected_lines: vec![corrected],
            original_opis: "UR 17".to_string(),
            corrected_opis: "UR 17".to_string(),
            reason: String::new(),
            timestamp: Utc::now(),
        };
        mem.consume_correction(&rec).unwrap();

        let hint = mem
            .semantic_hint("c1", "12345678903", "ulazni_racun")
            .unwrap();
        assert!(hint.is_some());
        assert_eq!(hint.unwrap().konto, "4010");
        assert_eq!(mem.unused_preference_count().unwrap(), 1);
    }
}
