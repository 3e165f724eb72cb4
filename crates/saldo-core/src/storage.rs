//! SQLite trajni sloj za pipeline: prijedlozi + audit trag statusa.
//!
//! Jedna baza po procesu, WAL mod, svaki upis je transakcija. Pipeline
//! drži živo stanje u memoriji; baza je izvor istine za restart i audit.

use crate::types::{BookingProposal, BookingStatus};
use rusqlite::{params, Connection, OpenFlags};
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct SqliteStorage {
    db_path: PathBuf,
}

impl SqliteStorage {
    pub fn new(db_path: PathBuf) -> Result<Self, rusqlite::Error> {
        let this = Self { db_path };
        this.init()?;
        Ok(this)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection, rusqlite::Error> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init(&self) -> Result<(), rusqlite::Error> {
        if let Some(parent) = self.db_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = self.open()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS proposals (
                id TEXT PRIMARY KEY,
                client_id TEXT NOT NULL,
                document_type TEXT NOT NULL,
                status TEXT NOT NULL,
                ukupni_iznos REAL NOT NULL,
                payload_json TEXT NOT NULL,
                created_at_ms INTEGER NOT NULL,
                updated_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_proposals_status ON proposals(status);
            CREATE INDEX IF NOT EXISTS idx_proposals_client ON proposals(client_id);

            CREATE TABLE IF NOT EXISTS status_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                proposal_id TEXT NOT NULL,
                status TEXT NOT NULL,
                user_id TEXT NOT NULL,
                note TEXT NULL,
                at_ms INTEGER NOT NULL,
                FOREIGN KEY(proposal_id) REFERENCES proposals(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_status_log_proposal ON status_log(proposal_id);
            "#,
        )?;
        Ok(())
    }

    pub fn persist_proposal(&self, p: &BookingProposal) -> Result<(), rusqlite::Error> {
        let conn = self.open()?;
        let payload = serde_json::to_string(p).unwrap_or_default();
        let ts = now_ms();
        conn.execute(
            r#"
            INSERT INTO proposals
                (id, client_id, document_type, status, ukupni_iznos, payload_json,
                 created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                payload_json = excluded.payload_json,
                updated_at_ms = excluded.updated_at_ms
            "#,
            params![
                p.id,
                p.client_id,
                p.document_type.as_str(),
                p.status.as_str(),
                p.ukupni_iznos,
                payload,
                ts
            ],
        )?;
        Ok(())
    }

    pub fn update_status(
        &self,
        proposal_id: &str,
        status: BookingStatus,
        user_id: &str,
        note: Option<&str>,
    ) -> Result<(), rusqlite::Error> {
        let conn = self.open()?;
        let ts = now_ms();
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE proposals SET status = ?1, updated_at_ms = ?2 WHERE id = ?3",
            params![status.as_str(), ts, proposal_id],
        )?;
        tx.execute(
            "INSERT INTO status_log (proposal_id, status, user_id, note, at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![proposal_id, status.as_str(), user_id, note, ts],
        )?;
        tx.commit()
    }

    /// Učitaj sve prijedloge u zadanom statusu (za restart pipeline-a).
    pub fn load_by_status(
        &self,
        status: BookingStatus,
    ) -> Result<Vec<BookingProposal>, rusqlite::Error> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT payload_json FROM proposals WHERE status = ?1 ORDER BY created_at_ms",
        )?;
        let rows = stmt.query_map(params![status.as_str()], |row| {
            row.get::<_, String>(0)
        })?;
        let mut out = Vec::new();
        for row in rows {
            if let Ok(p) = serde_json::from_str::<BookingProposal>(&row?) {
                out.push(p);
            }
        }
        Ok(out)
    }

    /// Audit trag za jedan prijedlog: (status, user, at_ms).
    pub fn status_history(
        &self,
        proposal_id: &str,
    ) -> Result<Vec<(String, String, i64)>, rusqlite::Error> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT status, user_id, at_ms FROM status_log WHERE proposal_id = ?1 ORDER BY at_ms",
        )?;
        let rows = stmt.query_map(params![proposal_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;
        rows.collect()
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BookingLine, DocumentType};

    #[test]
    fn persist_update_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(dir.path().join("saldo.db")).unwrap();

        let mut p = BookingProposal::new("c1", DocumentType::UlazniRacun);
        p.lines = vec![
            BookingLine::duguje("4010", 100.0, ""),
            BookingLine::potrazuje("2200", 100.0, ""),
        ];
        p.ukupni_iznos = 100.0;
        storage.persist_proposal(&p).unwrap();

        let pending = storage.load_by_status(BookingStatus::Pending).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, p.id);

        storage
            .update_status(&p.id, BookingStatus::Approved, "ana", None)
            .unwrap();
        assert!(storage.load_by_status(BookingStatus::Pending).unwrap().is_empty());

        let history = storage.status_history(&p.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].0, "approved");
        assert_eq!(history[0].1, "ana");
    }
}
