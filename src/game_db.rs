//! Game table loaded from CSV.
//!
//! Every non-empty cell of a row becomes a lookup key for that row's title and
//! serial, both verbatim and normalized, because devices report ids with
//! inconsistent case and padding.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum GameDbError {
    #[error("Failed to open game table {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Game table has no 'title' column")]
    MissingTitleColumn,
}

/// Title and serial for one game
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameRecord {
    pub title: String,
    /// Informational only
    pub serial: String,
}

/// Id → game lookup
#[derive(Debug, Clone, Default)]
pub struct GameDb {
    entries: HashMap<String, GameRecord>,
    rows: usize,
}

/// Case and whitespace insensitive form of a game id
pub fn normalize_id(id: &str) -> String {
    id.trim().to_uppercase()
}

impl GameDb {
    /// Load the table, falling back to an empty table on any failure
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(db) => {
                info!(
                    "Loaded {} keys ({} games) from {:?}",
                    db.len(),
                    db.rows,
                    path
                );
                db
            }
            Err(e) => {
                warn!("{}; every device id lookup will miss", e);
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, GameDbError> {
        let file = File::open(path).map_err(|source| GameDbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    /// Parse a CSV table with a header row. Malformed rows are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, GameDbError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let title_idx = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("title"))
            .ok_or(GameDbError::MissingTitleColumn)?;
        let serial_idx = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("serial"));

        let mut db = Self::default();
        for (row, record) in csv_reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    // +2: header line and 1-based numbering
                    warn!("Skipping malformed game table row {}: {}", row + 2, e);
                    continue;
                }
            };

            let game = GameRecord {
                title: record.get(title_idx).unwrap_or_default().to_string(),
                serial: serial_idx
                    .and_then(|i| record.get(i))
                    .unwrap_or_default()
                    .to_string(),
            };

            for cell in record.iter().filter(|cell| !cell.is_empty()) {
                db.insert(cell.to_string(), &game);
                db.insert(normalize_id(cell), &game);
            }
            db.rows += 1;
        }

        Ok(db)
    }

    // The first row claiming a key keeps it.
    fn insert(&mut self, key: String, game: &GameRecord) {
        if key.is_empty() {
            return;
        }
        self.entries.entry(key).or_insert_with(|| game.clone());
    }

    /// Look up an id verbatim, then in normalized form
    pub fn lookup(&self, id: &str) -> Option<&GameRecord> {
        if id.trim().is_empty() {
            return None;
        }
        self.entries
            .get(id)
            .filter(|game| !game.title.is_empty())
            .or_else(|| self.entries.get(&normalize_id(id)))
            .filter(|game| !game.title.is_empty())
    }

    /// Number of lookup keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "\u{feff}title,serial,alt_id\n\
        Example Game,SCUS-12345,scus_123.45\n\
        \"Racing, Deluxe\",SLUS-00001,\n\
        Duplicate Claim,SCUS-12345,\n";

    #[test]
    fn test_lookup_raw_and_normalized() {
        let db = GameDb::from_reader(TABLE.as_bytes()).unwrap();

        let game = db.lookup("SCUS-12345").unwrap();
        assert_eq!(game.title, "Example Game");
        assert_eq!(game.serial, "SCUS-12345");

        assert_eq!(db.lookup("  scus-12345 ").unwrap().title, "Example Game");
        assert_eq!(db.lookup("scus_123.45").unwrap().title, "Example Game");
        assert_eq!(db.lookup("SCUS_123.45").unwrap().title, "Example Game");
    }

    #[test]
    fn test_quoted_title_with_comma() {
        let db = GameDb::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(db.lookup("SLUS-00001").unwrap().title, "Racing, Deluxe");
    }

    #[test]
    fn test_first_row_wins() {
        let db = GameDb::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(db.lookup("SCUS-12345").unwrap().title, "Example Game");
        assert_eq!(db.lookup("Duplicate Claim").unwrap().title, "Duplicate Claim");
    }

    #[test]
    fn test_unknown_and_empty_ids_miss() {
        let db = GameDb::from_reader(TABLE.as_bytes()).unwrap();
        assert!(db.lookup("SLES-99999").is_none());
        assert!(db.lookup("").is_none());
        assert!(db.lookup("   ").is_none());
    }

    #[test]
    fn test_missing_title_column() {
        let result = GameDb::from_reader("name,serial\nFoo,BAR-1\n".as_bytes());
        assert!(matches!(result, Err(GameDbError::MissingTitleColumn)));
    }

    #[test]
    fn test_missing_file_yields_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let db = GameDb::load(&dir.path().join("Game_DB.csv"));
        assert!(db.is_empty());
        assert!(db.lookup("SCUS-12345").is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        let db = GameDb::load(file.path());
        assert!(!db.is_empty());
        assert_eq!(db.lookup("slus-00001").unwrap().serial, "SLUS-00001");
    }
}
