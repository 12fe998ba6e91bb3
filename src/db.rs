use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension};

use crate::parser::records::Record;
use crate::parser::PageResult;

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = Path::new(path).parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open {}", path))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pages (
            id         INTEGER PRIMARY KEY,
            url        TEXT NOT NULL,
            html       TEXT,
            status     INTEGER,
            error      TEXT,
            latency_ms INTEGER,
            fetched_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_pages_url ON pages(url);

        CREATE TABLE IF NOT EXISTS extractions (
            page_id       INTEGER PRIMARY KEY REFERENCES pages(id),
            outcome       TEXT NOT NULL CHECK(outcome IN ('ok','error')),
            error         TEXT,
            record_count  INTEGER NOT NULL DEFAULT 0,
            skipped_count INTEGER NOT NULL DEFAULT 0,
            extracted_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS records (
            id             INTEGER PRIMARY KEY,
            page_id        INTEGER NOT NULL REFERENCES pages(id),
            position       INTEGER NOT NULL,
            station_id     TEXT NOT NULL,
            name           TEXT NOT NULL,
            precip_buckets TEXT NOT NULL,
            UNIQUE(page_id, position)
        );
        CREATE INDEX IF NOT EXISTS idx_records_station ON records(station_id);

        CREATE TABLE IF NOT EXISTS skipped_lines (
            id       INTEGER PRIMARY KEY,
            page_id  INTEGER NOT NULL REFERENCES pages(id),
            line_no  INTEGER NOT NULL,
            reason   TEXT NOT NULL,
            text     TEXT NOT NULL,
            UNIQUE(page_id, line_no)
        );
        ",
    )?;
    Ok(())
}

// ── Fetching ──

pub struct FetchRow {
    pub url: String,
    pub html: Option<String>,
    pub status: Option<i32>,
    pub error: Option<String>,
    pub latency_ms: Option<i64>,
}

pub fn insert_page(conn: &Connection, row: &FetchRow) -> Result<i64> {
    conn.execute(
        "INSERT INTO pages (url, html, status, error, latency_ms) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![row.url, row.html, row.status, row.error, row.latency_ms],
    )?;
    Ok(conn.last_insert_rowid())
}

// ── Processing ──

#[derive(Debug)]
pub struct StoredPage {
    pub id: i64,
    pub url: String,
    pub html: String,
}

/// Pages with HTML and no extraction yet, oldest first.
pub fn fetch_unprocessed(conn: &Connection, limit: Option<usize>) -> Result<Vec<StoredPage>> {
    let sql = format!(
        "SELECT p.id, p.url, p.html
         FROM pages p
         LEFT JOIN extractions e ON e.page_id = p.id
         WHERE p.html IS NOT NULL AND e.page_id IS NULL
         ORDER BY p.id{}",
        match limit {
            Some(n) => format!(" LIMIT {}", n),
            None => String::new(),
        }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(StoredPage {
                id: row.get(0)?,
                url: row.get(1)?,
                html: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl StoredPage {
    /// Page for a fetch that just landed; failed fetches carry no HTML.
    pub fn from_fetch(id: i64, row: FetchRow) -> Result<Self> {
        match (row.html, row.error) {
            (Some(html), None) => Ok(StoredPage {
                id,
                url: row.url,
                html,
            }),
            (_, error) => anyhow::bail!(
                "Fetch of {} failed: {}",
                row.url,
                error.unwrap_or_else(|| "empty body".to_string())
            ),
        }
    }
}

/// Persist a batch of page outcomes in one transaction. Re-saving a page
/// replaces its previous records and skipped lines.
pub fn save_results(conn: &Connection, results: &[PageResult]) -> Result<()> {
    let extracted_at = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    {
        let mut e_stmt = tx.prepare(
            "INSERT OR REPLACE INTO extractions
             (page_id, outcome, error, record_count, skipped_count, extracted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        let mut r_stmt = tx.prepare(
            "INSERT INTO records (page_id, position, station_id, name, precip_buckets)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        let mut s_stmt = tx.prepare(
            "INSERT INTO skipped_lines (page_id, line_no, reason, text) VALUES (?1, ?2, ?3, ?4)",
        )?;

        for result in results {
            tx.execute("DELETE FROM records WHERE page_id = ?1", [result.page_id])?;
            tx.execute("DELETE FROM skipped_lines WHERE page_id = ?1", [result.page_id])?;

            match &result.outcome {
                Ok(extraction) => {
                    e_stmt.execute(rusqlite::params![
                        result.page_id,
                        "ok",
                        Option::<String>::None,
                        extraction.records.len() as i64,
                        extraction.skipped.len() as i64,
                        extracted_at,
                    ])?;
                    for (position, record) in extraction.records.iter().enumerate() {
                        r_stmt.execute(rusqlite::params![
                            result.page_id,
                            position as i64,
                            record.id,
                            record.name,
                            serde_json::to_string(&record.precip_buckets)?,
                        ])?;
                    }
                    for skipped in &extraction.skipped {
                        s_stmt.execute(rusqlite::params![
                            result.page_id,
                            skipped.line as i64,
                            skipped.kind.to_string(),
                            skipped.text,
                        ])?;
                    }
                }
                Err(e) => {
                    e_stmt.execute(rusqlite::params![
                        result.page_id,
                        "error",
                        e.to_string(),
                        0i64,
                        0i64,
                        extracted_at,
                    ])?;
                }
            }
        }
    }
    tx.commit()?;
    Ok(())
}

// ── Reporting ──

pub struct RecordRow {
    pub position: i64,
    pub station_id: String,
    pub name: String,
    pub precip_buckets: Vec<String>,
}

impl RecordRow {
    pub fn into_record(self) -> Record {
        Record {
            id: self.station_id,
            name: self.name,
            precip_buckets: self.precip_buckets,
        }
    }
}

/// Most recent page that extracted successfully: (page id, url, extracted_at).
pub fn latest_extracted_page(conn: &Connection) -> Result<Option<(i64, String, String)>> {
    let row = conn
        .query_row(
            "SELECT p.id, p.url, e.extracted_at
             FROM extractions e JOIN pages p ON p.id = e.page_id
             WHERE e.outcome = 'ok'
             ORDER BY p.id DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;
    Ok(row)
}

/// Records of one page in source order; `None` returns all of them.
pub fn fetch_records(
    conn: &Connection,
    page_id: i64,
    limit: Option<usize>,
) -> Result<Vec<RecordRow>> {
    let limit = limit.map_or(-1, |n| n as i64);
    let mut stmt = conn.prepare(
        "SELECT position, station_id, name, precip_buckets
         FROM records WHERE page_id = ?1
         ORDER BY position LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![page_id, limit], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get::<_, String>(3)?))
        })?
        .collect::<Result<Vec<(i64, String, String, String)>, _>>()?;

    rows.into_iter()
        .map(|(position, station_id, name, buckets)| {
            Ok(RecordRow {
                position,
                station_id,
                name,
                precip_buckets: serde_json::from_str(&buckets)
                    .with_context(|| format!("Corrupt bucket list at position {}", position))?,
            })
        })
        .collect()
}

pub struct Stats {
    pub pages: i64,
    pub fetch_errors: i64,
    pub extracted: i64,
    pub extract_errors: i64,
    pub unprocessed: i64,
    pub records: i64,
    pub skipped: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |r| r.get(0))?) };
    Ok(Stats {
        pages: count("SELECT COUNT(*) FROM pages")?,
        fetch_errors: count("SELECT COUNT(*) FROM pages WHERE html IS NULL")?,
        extracted: count("SELECT COUNT(*) FROM extractions WHERE outcome = 'ok'")?,
        extract_errors: count("SELECT COUNT(*) FROM extractions WHERE outcome = 'error'")?,
        unprocessed: count(
            "SELECT COUNT(*) FROM pages p LEFT JOIN extractions e ON e.page_id = p.id
             WHERE p.html IS NOT NULL AND e.page_id IS NULL",
        )?,
        records: count("SELECT COUNT(*) FROM records")?,
        skipped: count("SELECT COUNT(*) FROM skipped_lines")?,
    })
}
