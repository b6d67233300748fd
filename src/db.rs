use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "reportcard.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            section TEXT,
            academic_year TEXT NOT NULL,
            second_language TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_school ON classes(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_subjects(
            class_id TEXT NOT NULL,
            subject_name TEXT NOT NULL,
            teacher_id TEXT,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(class_id, subject_name),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_class_subjects_teacher ON class_subjects(class_id, teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            name TEXT NOT NULL,
            father_name TEXT,
            mother_name TEXT,
            section TEXT,
            roll_no TEXT,
            admission_no TEXT,
            exam_no TEXT,
            date_of_birth TEXT,
            medium TEXT,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_year ON students(class_id, academic_year, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assessment_marks(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            subject_name TEXT NOT NULL,
            assessment_name TEXT NOT NULL,
            marks_obtained REAL,
            max_marks REAL,
            updated_at TEXT,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(student_id, class_id, academic_year, subject_name, assessment_name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assessment_marks_student ON assessment_marks(student_id, class_id, academic_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS report_records(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            school_id TEXT NOT NULL,
            academic_year TEXT NOT NULL,
            template_key TEXT NOT NULL,
            term TEXT NOT NULL,
            class_id TEXT NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 0,
            published_at TEXT,
            doc_json TEXT NOT NULL,
            derived_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, school_id, academic_year, template_key, term)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_report_records_class_year ON report_records(class_id, academic_year)",
        [],
    )?;

    Ok(())
}

pub fn now_ts() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_enforces_students() {
        let conn = open_in_memory().expect("open");
        init_schema(&conn).expect("second init");
        conn.execute(
            "INSERT INTO report_records(id, student_id, school_id, academic_year, template_key, term,
                class_id, is_published, published_at, doc_json, derived_json, created_at, updated_at)
             VALUES('r1', 's1', 'sc', '2024-2025', 'cbse-state', 'annual', 'c1', 1, 't1', '{}', '{}', 't0', 't1')",
            [],
        )
        .expect_err("student must exist");
    }

    #[test]
    fn report_keys_are_unique() {
        let conn = open_in_memory().expect("open");
        conn.execute_batch(
            "INSERT INTO classes(id, school_id, name, academic_year) VALUES('c1', 'sc', 'X', '2024-2025');
             INSERT INTO students(id, school_id, class_id, academic_year, name, sort_order)
               VALUES('s1', 'sc', 'c1', '2024-2025', 'A', 0);
             INSERT INTO report_records(id, student_id, school_id, academic_year, template_key, term,
                 class_id, doc_json, derived_json, created_at, updated_at)
               VALUES('r1', 's1', 'sc', '2024-2025', 'cbse-state', 'annual', 'c1', '{}', '{}', 't0', 't0');",
        )
        .expect("seed");
        let published_at: Option<String> = conn
            .query_row("SELECT published_at FROM report_records WHERE id = 'r1'", [], |r| r.get(0))
            .expect("row");
        assert_eq!(published_at, None);
        conn.execute(
            "INSERT INTO report_records(id, student_id, school_id, academic_year, template_key, term,
                class_id, doc_json, derived_json, created_at, updated_at)
             VALUES('r2', 's1', 'sc', '2024-2025', 'cbse-state', 'annual', 'c1', '{}', '{}', 't0', 't0')",
            [],
        )
        .expect_err("duplicate key");
    }
}
