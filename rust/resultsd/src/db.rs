use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

use crate::backup::DB_FILE_NAME;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)?;
    init_schema(&conn)?;
    log::info!("opened workspace database {}", db_path.to_string_lossy());
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            student_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            password TEXT NOT NULL
        )",
        [],
    )?;

    // AUTOINCREMENT keeps exam ids monotonic even after the newest exam is deleted.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            published INTEGER NOT NULL DEFAULT 0,
            created_at TEXT
        )",
        [],
    )?;

    // No ON DELETE CASCADE: student/exam deletes remove marks explicitly in one transaction.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS marks(
            student_id TEXT NOT NULL,
            exam_id INTEGER NOT NULL,
            mcq INTEGER NOT NULL DEFAULT 0,
            structured INTEGER NOT NULL DEFAULT 0,
            essay INTEGER NOT NULL DEFAULT 0,
            absent INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(student_id, exam_id),
            FOREIGN KEY(student_id) REFERENCES students(student_id),
            FOREIGN KEY(exam_id) REFERENCES exams(id)
        )",
        [],
    )?;
    ensure_marks_updated_at(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_marks_exam ON marks(exam_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_marks_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "marks", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE marks ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    // A corrupt value reads as unset rather than failing the caller.
    Ok(raw.and_then(|s| serde_json::from_str(&s).ok()))
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, value.to_string()),
    )?;
    Ok(())
}
