use chrono::{DateTime, Local};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::app_dirs::AppDirs;
use crate::outcome::CatchAttempt;

pub const PERFECT_REWARD: &str = "PERFECT CATCH! All buttons hit with excellent timing!";

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("catch ledger storage failed: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("could not create ledger directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("attempt for pokemon {pokemon_id} reports {buttons_correct} of {total_buttons} buttons")]
    InvalidAttempt {
        pokemon_id: u32,
        buttons_correct: usize,
        total_buttons: usize,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// What the player is told after an attempt was recorded
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchResult {
    pub success: bool,
    pub message: String,
    pub pokemon_name: String,
    pub accuracy: f64,
    pub perfect: bool,
    pub reward_message: String,
}

/// Destination for finished attempts
pub trait AttemptSink {
    fn submit(&mut self, attempt: &CatchAttempt, pokemon_name: &str) -> Result<CatchResult>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPokemon {
    pub pokemon_id: u32,
    pub pokemon_name: String,
    pub perfect: bool,
    pub caught_at: DateTime<Local>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub pokemon_id: u32,
    pub pokemon_name: String,
    pub success: bool,
    pub buttons_correct: usize,
    pub total_buttons: usize,
    pub time_taken_seconds: f64,
    pub perfect: bool,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LedgerSummary {
    pub attempts: i64,
    pub successes: i64,
    pub perfects: i64,
    pub captured: i64,
}

impl LedgerSummary {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            (self.successes as f64 / self.attempts as f64) * 100.0
        }
    }
}

/// SQLite record of catch attempts and captured pokemon
#[derive(Debug)]
pub struct CatchLedger {
    conn: Connection,
}

impl CatchLedger {
    /// Opens the ledger at its default location, creating it if needed
    pub fn new() -> Result<Self> {
        let path = AppDirs::ledger_path().unwrap_or_else(|| PathBuf::from("catchdex_catches.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS catch_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pokemon_id INTEGER NOT NULL,
                pokemon_name TEXT NOT NULL,
                success BOOLEAN NOT NULL,
                buttons_correct INTEGER NOT NULL,
                total_buttons INTEGER NOT NULL,
                time_taken_seconds REAL NOT NULL,
                perfect BOOLEAN NOT NULL,
                timestamp TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_catch_attempts_pokemon ON catch_attempts(pokemon_id);
            CREATE TABLE IF NOT EXISTS captured_pokemon (
                pokemon_id INTEGER PRIMARY KEY,
                pokemon_name TEXT NOT NULL,
                perfect BOOLEAN NOT NULL,
                caught_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(CatchLedger { conn })
    }

    /// Stores the attempt and captures the pokemon on a first success
    pub fn record_attempt(
        &mut self,
        attempt: &CatchAttempt,
        pokemon_name: &str,
    ) -> Result<CatchResult> {
        if attempt.total_buttons == 0 || attempt.buttons_correct > attempt.total_buttons {
            return Err(LedgerError::InvalidAttempt {
                pokemon_id: attempt.pokemon_id,
                buttons_correct: attempt.buttons_correct,
                total_buttons: attempt.total_buttons,
            });
        }

        let name = capitalize(pokemon_name);
        let now = Local::now().to_rfc3339();
        let tx = self.conn.transaction()?;

        tx.execute(
            r#"
            INSERT INTO catch_attempts
            (pokemon_id, pokemon_name, success, buttons_correct, total_buttons, time_taken_seconds, perfect, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                attempt.pokemon_id,
                name,
                attempt.success,
                attempt.buttons_correct as i64,
                attempt.total_buttons as i64,
                attempt.time_taken_seconds,
                attempt.perfect,
                now,
            ],
        )?;

        let result = if attempt.success {
            let already: Option<u32> = tx
                .query_row(
                    "SELECT pokemon_id FROM captured_pokemon WHERE pokemon_id = ?1",
                    [attempt.pokemon_id],
                    |row| row.get(0),
                )
                .optional()?;

            if already.is_some() {
                CatchResult {
                    success: true,
                    message: format!("You already caught {name}! But nice catch anyway!"),
                    pokemon_name: name.clone(),
                    accuracy: attempt.accuracy(),
                    perfect: attempt.perfect,
                    reward_message: String::new(),
                }
            } else {
                tx.execute(
                    "INSERT INTO captured_pokemon (pokemon_id, pokemon_name, perfect, caught_at) VALUES (?1, ?2, ?3, ?4)",
                    params![attempt.pokemon_id, name, attempt.perfect, now],
                )?;
                CatchResult {
                    success: true,
                    message: format!("Congratulations! You caught {name}!"),
                    pokemon_name: name.clone(),
                    accuracy: attempt.accuracy(),
                    perfect: attempt.perfect,
                    reward_message: if attempt.perfect {
                        PERFECT_REWARD.to_string()
                    } else {
                        String::new()
                    },
                }
            }
        } else {
            CatchResult {
                success: false,
                message: format!("{name} broke free! Try again!"),
                pokemon_name: name.clone(),
                accuracy: attempt.accuracy(),
                perfect: false,
                reward_message: String::new(),
            }
        };

        tx.commit()?;
        info!(
            pokemon_id = attempt.pokemon_id,
            success = attempt.success,
            perfect = attempt.perfect,
            "catch attempt recorded"
        );
        Ok(result)
    }

    pub fn is_captured(&self, pokemon_id: u32) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM captured_pokemon WHERE pokemon_id = ?1",
            [pokemon_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Captured pokemon, most recent first
    pub fn captured(&self) -> Result<Vec<CapturedPokemon>> {
        let mut stmt = self.conn.prepare(
            "SELECT pokemon_id, pokemon_name, perfect, caught_at FROM captured_pokemon ORDER BY caught_at DESC, pokemon_id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(CapturedPokemon {
                pokemon_id: row.get(0)?,
                pokemon_name: row.get(1)?,
                perfect: row.get(2)?,
                caught_at: parse_timestamp(row.get::<_, String>(3)?, 3)?,
            })
        })?;

        let mut captured = Vec::new();
        for row in rows {
            captured.push(row?);
        }
        Ok(captured)
    }

    /// Every recorded attempt, oldest first
    pub fn attempts(&self) -> Result<Vec<AttemptRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT pokemon_id, pokemon_name, success, buttons_correct, total_buttons,
                   time_taken_seconds, perfect, timestamp
            FROM catch_attempts
            ORDER BY id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(AttemptRecord {
                pokemon_id: row.get(0)?,
                pokemon_name: row.get(1)?,
                success: row.get(2)?,
                buttons_correct: row.get::<_, i64>(3)? as usize,
                total_buttons: row.get::<_, i64>(4)? as usize,
                time_taken_seconds: row.get(5)?,
                perfect: row.get(6)?,
                timestamp: parse_timestamp(row.get::<_, String>(7)?, 7)?,
            })
        })?;

        let mut attempts = Vec::new();
        for row in rows {
            attempts.push(row?);
        }
        Ok(attempts)
    }

    pub fn summary(&self) -> Result<LedgerSummary> {
        let (attempts, successes, perfects) = self.conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN perfect = 1 THEN 1 ELSE 0 END), 0)
            FROM catch_attempts
            "#,
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        let captured = self
            .conn
            .query_row("SELECT COUNT(*) FROM captured_pokemon", [], |row| row.get(0))?;

        Ok(LedgerSummary {
            attempts,
            successes,
            perfects,
            captured,
        })
    }

    /// Writes the attempt history as CSV and returns the number of rows
    pub fn export_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let attempts = self.attempts()?;
        let mut wtr = csv::Writer::from_writer(writer);
        for attempt in &attempts {
            wtr.serialize(CsvRow::from(attempt))?;
        }
        wtr.flush()?;
        Ok(attempts.len())
    }

    /// Clear all attempts and captures
    pub fn clear_all(&self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM catch_attempts; DELETE FROM captured_pokemon;")?;
        Ok(())
    }
}

impl AttemptSink for CatchLedger {
    fn submit(&mut self, attempt: &CatchAttempt, pokemon_name: &str) -> Result<CatchResult> {
        self.record_attempt(attempt, pokemon_name).inspect_err(|e| {
            warn!(pokemon_id = attempt.pokemon_id, error = %e, "catch attempt not recorded");
        })
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    date: String,
    pokemon_id: u32,
    pokemon_name: &'a str,
    success: bool,
    buttons_correct: usize,
    total_buttons: usize,
    accuracy: String,
    time_taken_seconds: String,
    perfect: bool,
}

impl<'a> From<&'a AttemptRecord> for CsvRow<'a> {
    fn from(r: &'a AttemptRecord) -> Self {
        let accuracy = if r.total_buttons == 0 {
            0.0
        } else {
            r.buttons_correct as f64 / r.total_buttons as f64 * 100.0
        };
        Self {
            date: r.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            pokemon_id: r.pokemon_id,
            pokemon_name: &r.pokemon_name,
            success: r.success,
            buttons_correct: r.buttons_correct,
            total_buttons: r.total_buttons,
            accuracy: format!("{accuracy:.1}"),
            time_taken_seconds: format!("{:.2}", r.time_taken_seconds),
            perfect: r.perfect,
        }
    }
}

fn parse_timestamp(raw: String, column: usize) -> rusqlite::Result<DateTime<Local>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Local))
        .map_err(|_| {
            rusqlite::Error::InvalidColumnType(
                column,
                "timestamp".to_string(),
                rusqlite::types::Type::Text,
            )
        })
}

/// Upper-cases the first letter and lower-cases the rest
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn attempt(pokemon_id: u32, success: bool, correct: usize, perfect: bool) -> CatchAttempt {
        CatchAttempt {
            pokemon_id,
            success,
            buttons_correct: correct,
            total_buttons: 3,
            time_taken_seconds: 0.75,
            perfect,
        }
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("pikachu"), "Pikachu");
        assert_eq!(capitalize("HO-OH"), "Ho-oh");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn first_success_captures() {
        let mut ledger = CatchLedger::open_in_memory().unwrap();
        let result = ledger.record_attempt(&attempt(25, true, 3, false), "pikachu").unwrap();

        assert!(result.success);
        assert_eq!(result.message, "Congratulations! You caught Pikachu!");
        assert_eq!(result.pokemon_name, "Pikachu");
        assert_eq!(result.accuracy, 100.0);
        assert_eq!(result.reward_message, "");
        assert!(ledger.is_captured(25).unwrap());
    }

    #[test]
    fn perfect_first_capture_gets_reward() {
        let mut ledger = CatchLedger::open_in_memory().unwrap();
        let result = ledger.record_attempt(&attempt(1, true, 3, true), "bulbasaur").unwrap();
        assert!(result.perfect);
        assert_eq!(result.reward_message, PERFECT_REWARD);
    }

    #[test]
    fn repeat_success_is_not_captured_twice() {
        let mut ledger = CatchLedger::open_in_memory().unwrap();
        ledger.record_attempt(&attempt(25, true, 3, false), "pikachu").unwrap();
        let result = ledger.record_attempt(&attempt(25, true, 3, true), "pikachu").unwrap();

        assert_eq!(result.message, "You already caught Pikachu! But nice catch anyway!");
        assert_eq!(result.reward_message, "");
        assert_eq!(ledger.captured().unwrap().len(), 1);
        assert_eq!(ledger.attempts().unwrap().len(), 2);
    }

    #[test]
    fn failure_breaks_free() {
        let mut ledger = CatchLedger::open_in_memory().unwrap();
        let result = ledger.record_attempt(&attempt(143, false, 2, false), "snorlax").unwrap();

        assert!(!result.success);
        assert_eq!(result.message, "Snorlax broke free! Try again!");
        assert!((result.accuracy - 66.666).abs() < 0.01);
        assert!(!ledger.is_captured(143).unwrap());
    }

    #[test]
    fn invalid_attempts_are_rejected() {
        let mut ledger = CatchLedger::open_in_memory().unwrap();
        let mut bad = attempt(1, true, 3, false);
        bad.total_buttons = 0;
        assert_matches!(
            ledger.record_attempt(&bad, "bulbasaur"),
            Err(LedgerError::InvalidAttempt { pokemon_id: 1, .. })
        );

        let mut bad = attempt(1, true, 4, false);
        bad.total_buttons = 3;
        assert_matches!(
            ledger.submit(&bad, "bulbasaur"),
            Err(LedgerError::InvalidAttempt { buttons_correct: 4, .. })
        );
        assert!(ledger.attempts().unwrap().is_empty());
    }

    #[test]
    fn summary_counts() {
        let mut ledger = CatchLedger::open_in_memory().unwrap();
        assert_eq!(ledger.summary().unwrap(), LedgerSummary::default());
        assert_eq!(ledger.summary().unwrap().success_rate(), 0.0);

        ledger.record_attempt(&attempt(25, false, 1, false), "pikachu").unwrap();
        ledger.record_attempt(&attempt(25, true, 3, true), "pikachu").unwrap();
        ledger.record_attempt(&attempt(7, true, 3, false), "squirtle").unwrap();
        ledger.record_attempt(&attempt(25, true, 3, false), "pikachu").unwrap();

        let summary = ledger.summary().unwrap();
        assert_eq!(summary.attempts, 4);
        assert_eq!(summary.successes, 3);
        assert_eq!(summary.perfects, 1);
        assert_eq!(summary.captured, 2);
        assert_eq!(summary.success_rate(), 75.0);
    }

    #[test]
    fn export_writes_header_and_rows() {
        let mut ledger = CatchLedger::open_in_memory().unwrap();
        ledger.record_attempt(&attempt(25, true, 3, true), "pikachu").unwrap();
        ledger.record_attempt(&attempt(19, false, 0, false), "rattata").unwrap();

        let mut out = Vec::new();
        let rows = ledger.export_csv(&mut out).unwrap();
        assert_eq!(rows, 2);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "date,pokemon_id,pokemon_name,success,buttons_correct,total_buttons,accuracy,time_taken_seconds,perfect"
        );
        assert!(lines[1].ends_with(",25,Pikachu,true,3,3,100.0,0.75,true"));
        assert!(lines[2].ends_with(",19,Rattata,false,0,3,0.0,0.75,false"));
    }

    #[test]
    fn clear_all_empties_both_tables() {
        let mut ledger = CatchLedger::open_in_memory().unwrap();
        ledger.record_attempt(&attempt(25, true, 3, false), "pikachu").unwrap();
        ledger.clear_all().unwrap();

        assert!(ledger.captured().unwrap().is_empty());
        assert!(ledger.attempts().unwrap().is_empty());
    }

    #[test]
    fn file_ledger_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("catches.db");
        {
            let mut ledger = CatchLedger::open(&path).unwrap();
            ledger.record_attempt(&attempt(150, true, 3, true), "mewtwo").unwrap();
        }
        let ledger = CatchLedger::open(&path).unwrap();
        let captured = ledger.captured().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].pokemon_name, "Mewtwo");
        assert!(captured[0].perfect);
    }
}
