//! SQLite-backed scan source.

use crate::{ScanQuery, ScanSource, SurfaceError};
use hscan::{ScanMeta, ScanRow};
use log::debug;
use rusqlite::{
    params,
    types::{Type, ValueRef},
    Connection, OpenFlags, Row,
};
use std::{
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

const COLUMNS: &str =
    r#""id", "segID", "DFO", "OFFSET", "tranStep", "lonStep", "ROUTE_NAME", "height""#;

/// Scan rows stored in a SQLite table.
///
/// The table name is the only part of any statement not passed as a
/// bound parameter, and it is always quoted.
pub struct SqliteSource {
    conn: Mutex<Connection>,

    /// Table name as given.
    name: String,

    /// Quoted table identifier.
    table: String,
}

impl SqliteSource {
    /// Opens an existing database read-only. A missing file is an
    /// error, never created.
    pub fn open<P: AsRef<Path>>(path: P, table: &str) -> Result<Self, SurfaceError> {
        debug!("opening {:?} read-only", path.as_ref());
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::with_connection(conn, table)
    }

    /// Opens a database for writing, creating the file if needed.
    pub fn create<P: AsRef<Path>>(path: P, table: &str) -> Result<Self, SurfaceError> {
        debug!("opening {:?} read-write", path.as_ref());
        let conn = Connection::open(path)?;
        Self::with_connection(conn, table)
    }

    pub fn in_memory(table: &str) -> Result<Self, SurfaceError> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    /// Creates the scan table if it doesn't already exist.
    pub fn create_table(&self) -> Result<(), SurfaceError> {
        self.lock().execute_batch(&format!(
            r#"CREATE TABLE IF NOT EXISTS {} (
                "id"         INTEGER PRIMARY KEY,
                "segID"      INTEGER NOT NULL,
                "DFO"        REAL NOT NULL,
                "OFFSET"     REAL NOT NULL,
                "tranStep"   REAL NOT NULL,
                "lonStep"    REAL NOT NULL,
                "ROUTE_NAME" TEXT,
                "height"     TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS {} ON {} ("segID");"#,
            self.table,
            quote_ident(&format!("{}_segID", self.name))?,
            self.table,
        ))?;
        Ok(())
    }

    /// Inserts `rows` in a single transaction, returning the number
    /// inserted.
    pub fn insert(&self, rows: &[ScanRow]) -> Result<usize, SurfaceError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                self.table
            ))?;
            for ScanRow { meta, height } in rows {
                stmt.execute(params![
                    meta.id,
                    meta.seg_id,
                    meta.dfo,
                    meta.offset,
                    meta.tran_step,
                    meta.lon_step,
                    meta.route_name,
                    height,
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }
}

/// Private API.
impl SqliteSource {
    fn with_connection(conn: Connection, table: &str) -> Result<Self, SurfaceError> {
        Ok(Self {
            conn: Mutex::new(conn),
            name: table.to_string(),
            table: quote_ident(table)?,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // The connection holds no state of ours that a panicking
        // holder could leave half-updated.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn select(&self, predicate: &str) -> String {
        format!(
            r#"SELECT {COLUMNS} FROM {} WHERE {predicate} ORDER BY "id""#,
            self.table
        )
    }
}

impl ScanSource for SqliteSource {
    type Error = rusqlite::Error;

    fn fetch(&self, query: &ScanQuery) -> Result<Vec<ScanRow>, rusqlite::Error> {
        let conn = self.lock();
        let rows = match *query {
            ScanQuery::IdRange { min, max } => {
                let mut stmt = conn.prepare_cached(&self.select(r#""id" BETWEEN ?1 AND ?2"#))?;
                let rows = stmt
                    .query_map(params![min, max], scan_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            ScanQuery::Segment(seg_id) => {
                let mut stmt = conn.prepare_cached(&self.select(r#""segID" = ?1"#))?;
                let rows = stmt
                    .query_map(params![seg_id], scan_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }
}

impl From<rusqlite::Error> for SurfaceError {
    fn from(err: rusqlite::Error) -> Self {
        SurfaceError::data_source(err)
    }
}

fn scan_row(row: &Row<'_>) -> rusqlite::Result<ScanRow> {
    Ok(ScanRow {
        meta: ScanMeta {
            id: row.get(0)?,
            seg_id: row.get(1)?,
            dfo: row.get(2)?,
            offset: row.get(3)?,
            tran_step: row.get(4)?,
            lon_step: row.get(5)?,
            route_name: row.get(6)?,
        },
        height: height_column(row, 7)?,
    })
}

/// Reads the packed height column, which may be stored as either
/// TEXT or BLOB.
fn height_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    match row.get_ref(idx)? {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        other => Err(rusqlite::Error::InvalidColumnType(
            idx,
            "height".to_string(),
            other.data_type(),
        )),
    }
}

/// Quotes a SQL identifier, escaping embedded quotes.
fn quote_ident(name: &str) -> Result<String, SurfaceError> {
    if name.trim().is_empty() || name.contains('\0') {
        return Err(SurfaceError::TableName(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

#[cfg(test)]
mod tests {
    use super::{quote_ident, SqliteSource};
    use crate::{source::fixtures::scan, ScanQuery, ScanSource, SurfaceError};
    use rusqlite::params;
    use std::{fs, path::PathBuf, process};

    fn temp_db(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("surface-{}-{name}.db", process::id()));
        let _ = fs::remove_file(&path);
        path
    }

    const TABLE: &str = "pathway_raw";

    fn seeded() -> SqliteSource {
        let src = SqliteSource::in_memory(TABLE).unwrap();
        src.create_table().unwrap();
        let rows: Vec<_> = (1..=20).map(|id| scan(id, id / 10 + 1, 8)).collect();
        assert_eq!(src.insert(&rows).unwrap(), 20);
        src
    }

    #[test]
    fn test_fetch_id_range() {
        let src = seeded();
        let rows = src.fetch(&ScanQuery::IdRange { min: 5, max: 9 }).unwrap();
        let ids: Vec<_> = rows.iter().map(|row| row.meta.id).collect();
        assert_eq!(ids, vec![5, 6, 7, 8, 9]);
        assert_eq!(rows[0], scan(5, 1, 8));
    }

    #[test]
    fn test_fetch_segment() {
        let src = seeded();
        let rows = src.fetch(&ScanQuery::Segment(2)).unwrap();
        let ids: Vec<_> = rows.iter().map(|row| row.meta.id).collect();
        assert_eq!(ids, (10..=19).collect::<Vec<_>>());
    }

    #[test]
    fn test_fetch_outside_table_is_empty() {
        let src = seeded();
        let rows = src
            .fetch(&ScanQuery::IdRange {
                min: 100,
                max: 200,
            })
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_blob_height_column() {
        let src = SqliteSource::in_memory(TABLE).unwrap();
        src.create_table().unwrap();
        src.lock()
            .execute(
                r#"INSERT INTO "pathway_raw" VALUES (1, 1, 0.5, 0.0, 2.0, 100.0, NULL, ?1)"#,
                params![b"1.5,2.5".to_vec()],
            )
            .unwrap();
        let rows = src.fetch(&ScanQuery::IdRange { min: 1, max: 1 }).unwrap();
        assert_eq!(rows[0].height, "1.5,2.5");
        assert_eq!(rows[0].meta.route_name, None);
    }

    #[test]
    fn test_missing_table_is_data_source_error() {
        let src = SqliteSource::in_memory("nope").unwrap();
        assert!(src.fetch(&ScanQuery::Segment(1)).is_err());
        assert!(matches!(
            src.insert(&[scan(1, 1, 2)]),
            Err(SurfaceError::DataSource(_))
        ));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("scans").unwrap(), r#""scans""#);
        assert_eq!(
            quote_ident(r#"x"; DROP TABLE y; --"#).unwrap(),
            r#""x""; DROP TABLE y; --""#
        );
        assert!(matches!(
            SqliteSource::in_memory("  "),
            Err(SurfaceError::TableName(_))
        ));
    }

    #[test]
    fn test_hostile_table_name_is_inert() {
        let src = SqliteSource::in_memory(r#"scans"; DROP TABLE other; --"#).unwrap();
        src.create_table().unwrap();
        src.insert(&[scan(1, 1, 2)]).unwrap();
        let rows = src.fetch(&ScanQuery::Segment(1)).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_open_missing_file_fails_without_creating_it() {
        let path = temp_db("missing");
        assert!(matches!(
            SqliteSource::open(&path, TABLE),
            Err(SurfaceError::DataSource(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_open_existing_file_is_read_only() {
        let path = temp_db("existing");
        {
            let src = SqliteSource::create(&path, TABLE).unwrap();
            src.create_table().unwrap();
            src.insert(&[scan(1, 1, 4), scan(2, 1, 4)]).unwrap();
        }
        let src = SqliteSource::open(&path, TABLE).unwrap();
        let rows = src.fetch(&ScanQuery::IdRange { min: 1, max: 2 }).unwrap();
        assert_eq!(rows, vec![scan(1, 1, 4), scan(2, 1, 4)]);
        assert!(matches!(
            src.insert(&[scan(3, 1, 4)]),
            Err(SurfaceError::DataSource(_))
        ));
        drop(src);
        fs::remove_file(&path).unwrap();
    }
}
