//! Collaborator seams of the engine and their SQLite implementation.

use rusqlite::{Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use uuid::Uuid;

use crate::calc::{self, DerivedReport};
use crate::db::now_ts;
use crate::error::{db_err, EngineError, EngineResult};
use crate::model::{AssessmentName, ReportDoc, ReportKey, StudentInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSubject {
    pub subject_name: String,
    pub assigned_teacher_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStudent {
    pub id: String,
    pub school_id: String,
    pub class_id: String,
    pub class_name: String,
    pub academic_year: String,
    pub name: String,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub section: Option<String>,
    pub roll_no: Option<String>,
    pub admission_no: Option<String>,
    pub exam_no: Option<String>,
    pub date_of_birth: Option<String>,
    pub medium: Option<String>,
}

impl RosterStudent {
    pub fn snapshot(&self, captured_at: &str) -> StudentInfo {
        StudentInfo {
            name: self.name.clone(),
            father_name: self.father_name.clone(),
            mother_name: self.mother_name.clone(),
            class_name: self.class_name.clone(),
            section: self.section.clone(),
            roll_no: self.roll_no.clone(),
            admission_no: self.admission_no.clone(),
            exam_no: self.exam_no.clone(),
            date_of_birth: self.date_of_birth.clone(),
            medium: self.medium.clone(),
            captured_at: captured_at.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMark {
    pub subject_name: String,
    pub assessment: AssessmentName,
    pub marks_obtained: Option<f64>,
    pub max_marks: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredReport {
    pub id: String,
    pub key: ReportKey,
    pub class_id: String,
    pub is_published: bool,
    pub doc: ReportDoc,
    pub derived: DerivedReport,
    pub created_at: String,
    pub updated_at: String,
    pub published_at: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: StoredReport,
    pub created: bool,
    pub written: bool,
}

pub trait RosterProvider {
    /// Fails with `NotFound` when the class does not exist.
    fn class_subjects(&self, class_id: &str) -> EngineResult<Vec<ClassSubject>>;
    fn second_language(&self, class_id: &str) -> EngineResult<Option<String>>;
    fn student(&self, student_id: &str) -> EngineResult<Option<RosterStudent>>;
    fn class_students(&self, class_id: &str, academic_year: &str) -> EngineResult<Vec<RosterStudent>>;

    fn teacher_subjects(&self, class_id: &str, teacher_id: &str) -> EngineResult<Vec<String>> {
        Ok(self
            .class_subjects(class_id)?
            .into_iter()
            .filter(|s| s.assigned_teacher_id.as_deref() == Some(teacher_id))
            .map(|s| s.subject_name)
            .collect())
    }
}

pub trait MarksProvider {
    fn recorded_marks(
        &self,
        student_id: &str,
        class_id: &str,
        academic_year: &str,
    ) -> EngineResult<Vec<RecordedMark>>;

    fn formative_marks(
        &self,
        student_id: &str,
        class_id: &str,
        academic_year: &str,
    ) -> EngineResult<Vec<RecordedMark>> {
        Ok(self
            .recorded_marks(student_id, class_id, academic_year)?
            .into_iter()
            .filter(|m| matches!(m.assessment, AssessmentName::Formative { .. }))
            .collect())
    }

    fn summative_marks(
        &self,
        student_id: &str,
        class_id: &str,
        academic_year: &str,
    ) -> EngineResult<Vec<RecordedMark>> {
        Ok(self
            .recorded_marks(student_id, class_id, academic_year)?
            .into_iter()
            .filter(|m| matches!(m.assessment, AssessmentName::Summative { .. }))
            .collect())
    }
}

pub trait ReportStore {
    fn find_report(&self, key: &ReportKey) -> EngineResult<Option<StoredReport>>;
    fn find_report_by_id(&self, record_id: &str) -> EngineResult<Option<StoredReport>>;

    /// Atomic read-modify-write on one record. `apply` sees the current
    /// record (if any) and returns the new document, or `None` to leave the
    /// record untouched.
    fn upsert_report<F>(&self, key: &ReportKey, class_id: &str, apply: F) -> EngineResult<UpsertOutcome>
    where
        F: FnOnce(Option<&StoredReport>) -> EngineResult<Option<ReportDoc>>;

    /// Returns whether the flag actually changed.
    fn set_published(&self, record_id: &str, desired: bool) -> EngineResult<bool>;
}

pub struct SqliteGateway<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteGateway<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

const REPORT_COLUMNS: &str = "id, student_id, school_id, academic_year, template_key, term,
    class_id, is_published, doc_json, derived_json, created_at, updated_at, published_at";

struct ReportRow {
    id: String,
    key: ReportKey,
    class_id: String,
    is_published: bool,
    doc_json: String,
    derived_json: String,
    created_at: String,
    updated_at: String,
    published_at: Option<String>,
}

fn read_report_row(r: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok(ReportRow {
        id: r.get(0)?,
        key: ReportKey {
            student_id: r.get(1)?,
            school_id: r.get(2)?,
            academic_year: r.get(3)?,
            template_key: r.get(4)?,
            term: r.get(5)?,
        },
        class_id: r.get(6)?,
        is_published: r.get::<_, i64>(7)? != 0,
        doc_json: r.get(8)?,
        derived_json: r.get(9)?,
        created_at: r.get(10)?,
        updated_at: r.get(11)?,
        published_at: r.get(12)?,
    })
}

impl ReportRow {
    fn decode(self) -> EngineResult<StoredReport> {
        Ok(StoredReport {
            id: self.id,
            key: self.key,
            class_id: self.class_id,
            is_published: self.is_published,
            doc: serde_json::from_str(&self.doc_json)?,
            derived: serde_json::from_str(&self.derived_json)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
            published_at: self.published_at,
        })
    }
}

fn find_by_key(conn: &Connection, key: &ReportKey) -> EngineResult<Option<StoredReport>> {
    let sql = format!(
        "SELECT {} FROM report_records
         WHERE student_id = ? AND school_id = ? AND academic_year = ? AND template_key = ? AND term = ?",
        REPORT_COLUMNS
    );
    let row = conn
        .query_row(
            &sql,
            (
                &key.student_id,
                &key.school_id,
                &key.academic_year,
                &key.template_key,
                &key.term,
            ),
            read_report_row,
        )
        .optional()?;
    row.map(ReportRow::decode).transpose()
}

fn opt_text(r: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    r.get(idx)
}

fn read_roster_student(r: &Row<'_>) -> rusqlite::Result<RosterStudent> {
    Ok(RosterStudent {
        id: r.get(0)?,
        school_id: r.get(1)?,
        class_id: r.get(2)?,
        class_name: r.get(3)?,
        academic_year: r.get(4)?,
        name: r.get(5)?,
        father_name: opt_text(r, 6)?,
        mother_name: opt_text(r, 7)?,
        section: opt_text(r, 8)?,
        roll_no: opt_text(r, 9)?,
        admission_no: opt_text(r, 10)?,
        exam_no: opt_text(r, 11)?,
        date_of_birth: opt_text(r, 12)?,
        medium: opt_text(r, 13)?,
    })
}

const ROSTER_SELECT: &str = "SELECT s.id, s.school_id, s.class_id, c.name, s.academic_year, s.name,
        s.father_name, s.mother_name, COALESCE(s.section, c.section), s.roll_no, s.admission_no,
        s.exam_no, s.date_of_birth, s.medium
     FROM students s
     JOIN classes c ON c.id = s.class_id";

impl RosterProvider for SqliteGateway<'_> {
    fn class_subjects(&self, class_id: &str) -> EngineResult<Vec<ClassSubject>> {
        let exists = self
            .conn
            .query_row("SELECT 1 FROM classes WHERE id = ?", [class_id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if !exists {
            return Err(EngineError::not_found("class", class_id));
        }
        let mut stmt = self.conn.prepare(
            "SELECT subject_name, teacher_id
             FROM class_subjects
             WHERE class_id = ?
             ORDER BY sort_order",
        )?;
        let subjects = stmt
            .query_map([class_id], |r| {
                Ok(ClassSubject {
                    subject_name: r.get(0)?,
                    assigned_teacher_id: r.get(1)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(subjects)
    }

    fn second_language(&self, class_id: &str) -> EngineResult<Option<String>> {
        let row: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT second_language FROM classes WHERE id = ?",
                [class_id],
                |r| r.get(0),
            )
            .optional()?;
        match row {
            Some(sl) => Ok(sl.filter(|s| !s.trim().is_empty())),
            None => Err(EngineError::not_found("class", class_id)),
        }
    }

    fn student(&self, student_id: &str) -> EngineResult<Option<RosterStudent>> {
        let sql = format!("{} WHERE s.id = ?", ROSTER_SELECT);
        Ok(self
            .conn
            .query_row(&sql, [student_id], read_roster_student)
            .optional()?)
    }

    fn class_students(&self, class_id: &str, academic_year: &str) -> EngineResult<Vec<RosterStudent>> {
        let sql = format!(
            "{} WHERE s.class_id = ? AND s.academic_year = ? ORDER BY s.sort_order",
            ROSTER_SELECT
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let students = stmt
            .query_map((class_id, academic_year), read_roster_student)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(students)
    }
}

impl MarksProvider for SqliteGateway<'_> {
    fn recorded_marks(
        &self,
        student_id: &str,
        class_id: &str,
        academic_year: &str,
    ) -> EngineResult<Vec<RecordedMark>> {
        let mut stmt = self.conn.prepare(
            "SELECT subject_name, assessment_name, marks_obtained, max_marks
             FROM assessment_marks
             WHERE student_id = ? AND class_id = ? AND academic_year = ?
             ORDER BY subject_name, assessment_name",
        )?;
        let rows = stmt
            .query_map((student_id, class_id, academic_year), |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, Option<f64>>(2)?,
                    r.get::<_, Option<f64>>(3)?,
                ))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

        let mut marks = Vec::with_capacity(rows.len());
        for (subject_name, name, marks_obtained, max_marks) in rows {
            // Upstream rows with names outside the FA/SA scheme belong to
            // other templates.
            let Ok(assessment) = name.parse::<AssessmentName>() else {
                continue;
            };
            marks.push(RecordedMark {
                subject_name,
                assessment,
                marks_obtained,
                max_marks,
            });
        }
        Ok(marks)
    }
}

impl ReportStore for SqliteGateway<'_> {
    fn find_report(&self, key: &ReportKey) -> EngineResult<Option<StoredReport>> {
        find_by_key(self.conn, key)
    }

    fn find_report_by_id(&self, record_id: &str) -> EngineResult<Option<StoredReport>> {
        let sql = format!("SELECT {} FROM report_records WHERE id = ?", REPORT_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, [record_id], read_report_row)
            .optional()?;
        row.map(ReportRow::decode).transpose()
    }

    fn upsert_report<F>(&self, key: &ReportKey, class_id: &str, apply: F) -> EngineResult<UpsertOutcome>
    where
        F: FnOnce(Option<&StoredReport>) -> EngineResult<Option<ReportDoc>>,
    {
        // IMMEDIATE takes the write lock before the read, so nobody can
        // slip in between the find and the replace.
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(db_err("db_tx_failed"))?;

        let existing = find_by_key(&tx, key)?;
        let next = apply(existing.as_ref())?;

        let outcome = match (existing, next) {
            (Some(record), None) => UpsertOutcome {
                record,
                created: false,
                written: false,
            },
            (None, None) => {
                return Err(EngineError::not_found("report", &key.student_id));
            }
            (Some(current), Some(doc)) => {
                let derived = calc::derive_report(&doc);
                let now = now_ts();
                tx.execute(
                    "UPDATE report_records
                     SET class_id = ?, doc_json = ?, derived_json = ?, updated_at = ?
                     WHERE id = ?",
                    (
                        class_id,
                        serde_json::to_string(&doc)?,
                        serde_json::to_string(&derived)?,
                        &now,
                        &current.id,
                    ),
                )
                .map_err(db_err("db_update_failed"))?;
                UpsertOutcome {
                    record: StoredReport {
                        class_id: class_id.to_string(),
                        doc,
                        derived,
                        updated_at: now,
                        ..current
                    },
                    created: false,
                    written: true,
                }
            }
            (None, Some(doc)) => {
                let derived = calc::derive_report(&doc);
                let now = now_ts();
                let id = Uuid::new_v4().to_string();
                tx.execute(
                    "INSERT INTO report_records(
                        id, student_id, school_id, academic_year, template_key, term,
                        class_id, is_published, doc_json, derived_json, created_at, updated_at
                     ) VALUES(?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)",
                    rusqlite::params![
                        &id,
                        &key.student_id,
                        &key.school_id,
                        &key.academic_year,
                        &key.template_key,
                        &key.term,
                        class_id,
                        serde_json::to_string(&doc)?,
                        serde_json::to_string(&derived)?,
                        &now,
                        &now,
                    ],
                )
                .map_err(db_err("db_insert_failed"))?;
                UpsertOutcome {
                    record: StoredReport {
                        id,
                        key: key.clone(),
                        class_id: class_id.to_string(),
                        is_published: false,
                        doc,
                        derived,
                        created_at: now.clone(),
                        updated_at: now,
                        published_at: None,
                    },
                    created: true,
                    written: true,
                }
            }
        };

        tx.commit().map_err(db_err("db_commit_failed"))?;
        Ok(outcome)
    }

    fn set_published(&self, record_id: &str, desired: bool) -> EngineResult<bool> {
        let now = now_ts();
        let published_at = desired.then(|| now.clone());
        // Single statement so each flip is atomic; the guard on the current
        // value keeps repeated calls from touching timestamps.
        let changed = self
            .conn
            .execute(
                "UPDATE report_records
                 SET is_published = ?, published_at = ?, updated_at = ?
                 WHERE id = ? AND is_published <> ?",
                rusqlite::params![desired as i64, published_at, &now, record_id, desired as i64],
            )
            .map_err(db_err("db_update_failed"))?;
        if changed > 0 {
            return Ok(true);
        }
        let exists = self
            .conn
            .query_row("SELECT 1 FROM report_records WHERE id = ?", [record_id], |r| {
                r.get::<_, i64>(0)
            })
            .optional()?
            .is_some();
        if exists {
            Ok(false)
        } else {
            Err(EngineError::not_found("report", record_id))
        }
    }
}
