use crate::db::now_ts;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::model::{subject_eq, AssessmentName};
use crate::store::{MarksProvider, RosterProvider, SqliteGateway};
use rusqlite::Connection;
use serde_json::json;
use uuid::Uuid;

fn optional_number(params: &serde_json::Value, key: &str) -> Result<Option<f64>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => v
            .as_f64()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| HandlerErr::new("bad_params", format!("{} must be a number", key))),
    }
}

fn marks_upsert(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let subject_name = required_str(params, "subjectName")?;
    let assessment: AssessmentName = required_str(params, "assessmentName")?.parse()?;
    let marks_obtained = optional_number(params, "marksObtained")?;
    let max_marks = optional_number(params, "maxMarks")?;

    if let Some(max) = max_marks {
        if max <= 0.0 {
            return Err(HandlerErr::new("bad_params", "maxMarks must be greater than 0"));
        }
    }
    if let Some(m) = marks_obtained {
        if m < 0.0 || max_marks.map(|max| m > max).unwrap_or(false) {
            return Err(HandlerErr::new("bad_params", "marksObtained out of range")
                .with_details(json!({ "marksObtained": m, "maxMarks": max_marks })));
        }
    }

    let gateway = SqliteGateway::new(conn);
    let student = gateway
        .student(&student_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    let known = gateway
        .class_subjects(&student.class_id)?
        .into_iter()
        .find(|s| subject_eq(&s.subject_name, &subject_name))
        .map(|s| s.subject_name)
        .ok_or_else(|| {
            HandlerErr::new("bad_params", "subject is not taught in this class")
                .with_details(json!({ "subjectName": subject_name }))
        })?;

    conn.execute(
        "INSERT INTO assessment_marks(
            id, student_id, class_id, academic_year, subject_name, assessment_name,
            marks_obtained, max_marks, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(student_id, class_id, academic_year, subject_name, assessment_name) DO UPDATE SET
           marks_obtained = excluded.marks_obtained,
           max_marks = excluded.max_marks,
           updated_at = excluded.updated_at",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            &student.id,
            &student.class_id,
            &student.academic_year,
            &known,
            assessment.to_string(),
            marks_obtained,
            max_marks,
            now_ts(),
        ],
    )
    .map_err(|e| {
        HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "assessment_marks" }))
    })?;

    Ok(json!({
        "studentId": student.id,
        "subjectName": known,
        "assessmentName": assessment.to_string(),
        "marksObtained": marks_obtained,
        "maxMarks": max_marks,
    }))
}

fn marks_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let gateway = SqliteGateway::new(conn);
    let student = gateway
        .student(&student_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    let marks: Vec<serde_json::Value> = gateway
        .recorded_marks(&student.id, &student.class_id, &student.academic_year)?
        .into_iter()
        .map(|m| {
            json!({
                "subjectName": m.subject_name,
                "assessmentName": m.assessment.to_string(),
                "marksObtained": m.marks_obtained,
                "maxMarks": m.max_marks,
            })
        })
        .collect();
    Ok(json!({
        "studentId": student.id,
        "classId": student.class_id,
        "academicYear": student.academic_year,
        "marks": marks,
    }))
}

fn handle_marks_upsert(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match marks_upsert(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_marks_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match marks_list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "marks.upsert" => Some(handle_marks_upsert(state, req)),
        "marks.list" => Some(handle_marks_list(state, req)),
        _ => None,
    }
}
