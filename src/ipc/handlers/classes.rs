use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, parse_params, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{subject_eq, validate_academic_year};
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubjectAssignment {
    subject_name: String,
    #[serde(default)]
    teacher_id: Option<String>,
}

fn normalize_subjects(
    subjects: Vec<SubjectAssignment>,
    second_language: Option<&str>,
) -> Result<Vec<SubjectAssignment>, HandlerErr> {
    let mut out: Vec<SubjectAssignment> = Vec::with_capacity(subjects.len());
    for s in subjects {
        let name = s.subject_name.trim().to_string();
        if name.is_empty() {
            return Err(HandlerErr::new("bad_params", "subjectName must not be empty"));
        }
        if out.iter().any(|o| subject_eq(&o.subject_name, &name)) {
            return Err(HandlerErr::new("bad_params", "duplicate subject")
                .with_details(json!({ "subjectName": name })));
        }
        out.push(SubjectAssignment {
            subject_name: name,
            teacher_id: s
                .teacher_id
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        });
    }
    if let Some(sl) = second_language {
        if !out.iter().any(|o| subject_eq(&o.subject_name, sl)) {
            return Err(HandlerErr::new(
                "bad_params",
                "secondLanguage must be one of the class subjects",
            )
            .with_details(json!({ "secondLanguage": sl })));
        }
    }
    Ok(out)
}

fn write_subjects(conn: &Connection, class_id: &str, subjects: &[SubjectAssignment]) -> Result<(), HandlerErr> {
    conn.execute("DELETE FROM class_subjects WHERE class_id = ?", [class_id])
        .map_err(|e| HandlerErr::db("db_delete_failed", e))?;
    for (i, s) in subjects.iter().enumerate() {
        conn.execute(
            "INSERT INTO class_subjects(class_id, subject_name, teacher_id, sort_order)
             VALUES(?, ?, ?, ?)",
            (class_id, &s.subject_name, &s.teacher_id, i as i64),
        )
        .map_err(|e| {
            HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "class_subjects" }))
        })?;
    }
    Ok(())
}

fn class_json(conn: &Connection, class_id: &str) -> Result<serde_json::Value, HandlerErr> {
    let row = conn
        .query_row(
            "SELECT id, school_id, name, section, academic_year, second_language,
                    (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id)
             FROM classes c WHERE id = ?",
            [class_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(3)?,
                    r.get::<_, String>(4)?,
                    r.get::<_, Option<String>>(5)?,
                    r.get::<_, i64>(6)?,
                ))
            },
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some((id, school_id, name, section, academic_year, second_language, student_count)) = row else {
        return Err(HandlerErr::new("not_found", "class not found"));
    };

    let mut stmt = conn
        .prepare(
            "SELECT subject_name, teacher_id
             FROM class_subjects
             WHERE class_id = ?
             ORDER BY sort_order",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let subjects = stmt
        .query_map([class_id], |r| {
            let subject_name: String = r.get(0)?;
            let teacher_id: Option<String> = r.get(1)?;
            Ok(json!({ "subjectName": subject_name, "teacherId": teacher_id }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    Ok(json!({
        "id": id,
        "schoolId": school_id,
        "name": name,
        "section": section,
        "academicYear": academic_year,
        "secondLanguage": second_language,
        "studentCount": student_count,
        "subjects": subjects,
    }))
}

fn classes_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_id = optional_str(params, "schoolId");
    let academic_year = optional_str(params, "academicYear");

    // Correlated subquery so the count does not multiply rows.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id,
               c.school_id,
               c.name,
               c.section,
               c.academic_year,
               c.second_language,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
             FROM classes c
             WHERE (?1 IS NULL OR c.school_id = ?1)
               AND (?2 IS NULL OR c.academic_year = ?2)
             ORDER BY c.academic_year, c.name, c.section",
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let classes = stmt
        .query_map((&school_id, &academic_year), |row| {
            let id: String = row.get(0)?;
            let school_id: String = row.get(1)?;
            let name: String = row.get(2)?;
            let section: Option<String> = row.get(3)?;
            let academic_year: String = row.get(4)?;
            let second_language: Option<String> = row.get(5)?;
            let student_count: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "schoolId": school_id,
                "name": name,
                "section": section,
                "academicYear": academic_year,
                "secondLanguage": second_language,
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    Ok(json!({ "classes": classes }))
}

fn classes_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let name = required_str(params, "name")?;
    let academic_year = required_str(params, "academicYear")?;
    validate_academic_year(&academic_year)?;
    let section = optional_str(params, "section");
    let second_language = optional_str(params, "secondLanguage");
    let subjects: Vec<SubjectAssignment> = if params.get("subjects").is_some() {
        parse_params(params, Some("subjects"))?
    } else {
        Vec::new()
    };
    let subjects = normalize_subjects(subjects, second_language.as_deref())?;

    let class_id = Uuid::new_v4().to_string();
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute(
        "INSERT INTO classes(id, school_id, name, section, academic_year, second_language)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&class_id, &school_id, &name, &section, &academic_year, &second_language),
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "classes" })))?;
    write_subjects(&tx, &class_id, &subjects)?;
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    class_json(conn, &class_id)
}

fn classes_get(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    class_json(conn, &class_id)
}

fn classes_set_subjects(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let subjects: Vec<SubjectAssignment> = parse_params(params, Some("subjects"))?;

    let current_second_language: Option<Option<String>> = conn
        .query_row(
            "SELECT second_language FROM classes WHERE id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some(current_second_language) = current_second_language else {
        return Err(HandlerErr::new("not_found", "class not found"));
    };
    // An explicit key replaces the designation; null clears it.
    let second_language = match params.get("secondLanguage") {
        Some(v) if v.is_null() => None,
        Some(_) => optional_str(params, "secondLanguage"),
        None => current_second_language,
    };
    let subjects = normalize_subjects(subjects, second_language.as_deref())?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::db("db_tx_failed", e))?;
    tx.execute(
        "UPDATE classes SET second_language = ? WHERE id = ?",
        (&second_language, &class_id),
    )
    .map_err(|e| HandlerErr::db("db_update_failed", e))?;
    write_subjects(&tx, &class_id, &subjects)?;
    tx.commit().map_err(|e| HandlerErr::db("db_commit_failed", e))?;

    class_json(conn, &class_id)
}

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };
    match classes_list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match classes_create(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match classes_get(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_classes_set_subjects(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match classes_set_subjects(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.get" => Some(handle_classes_get(state, req)),
        "classes.setSubjects" => Some(handle_classes_set_subjects(state, req)),
        _ => None,
    }
}
