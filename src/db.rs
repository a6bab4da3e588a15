use anyhow::Context;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub const DB_FILE_NAME: &str = "katrol.sqlite3";

pub fn open_db(workspace: &Path, busy_timeout: Duration) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.to_string_lossy()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open {}", db_path.to_string_lossy()))?;
    // Lock contention surfaces as SQLITE_BUSY after this instead of blocking.
    conn.busy_timeout(busy_timeout)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            year TEXT NOT NULL,
            display_name TEXT NOT NULL,
            registration_no TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_year ON students(class_id, year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessment_scores(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            year TEXT NOT NULL,
            semester TEXT NOT NULL,
            component TEXT NOT NULL,
            value REAL NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, class_id, subject, year, semester, component)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessment_scores_scope
         ON assessment_scores(class_id, subject, year, semester)",
        [],
    )?;

    // One curved snapshot per natural key. Curved finals are grades and must
    // stay on the 0-100 scale.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS curved_results(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            class_id TEXT NOT NULL,
            year TEXT NOT NULL,
            semester TEXT NOT NULL,
            raw_formative1 REAL,
            raw_formative2 REAL,
            raw_formative3 REAL,
            raw_mid_term REAL,
            raw_final_term REAL,
            raw_average_formative REAL,
            raw_final REAL,
            curved_formative1 REAL,
            curved_formative2 REAL,
            curved_formative3 REAL,
            curved_mid_term REAL,
            curved_final_term REAL,
            curved_average_formative REAL,
            curved_final REAL CHECK(curved_final IS NULL OR (curved_final >= 0 AND curved_final <= 100)),
            status TEXT,
            pass_threshold REAL NOT NULL,
            target_ceiling REAL NOT NULL,
            class_min REAL NOT NULL,
            class_max REAL NOT NULL,
            roster_size INTEGER NOT NULL,
            processed_by TEXT NOT NULL,
            processed_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, subject, class_id, year, semester)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_curved_results_scope
         ON curved_results(class_id, subject, year, semester)",
        [],
    )?;

    ensure_curved_results_raw_digest(conn)?;
    Ok(())
}

// Snapshots written before digests existed keep NULL and are never reported
// as changed.
fn ensure_curved_results_raw_digest(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "curved_results", "raw_digest")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE curved_results ADD COLUMN raw_digest TEXT", [])?;
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
