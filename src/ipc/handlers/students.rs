use crate::db::now_ts;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::{RosterProvider, SqliteGateway};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// Insert order of the optional profile columns.
const OPTIONAL_FIELDS: [&str; 8] = [
    "fatherName",
    "motherName",
    "section",
    "rollNo",
    "admissionNo",
    "examNo",
    "dateOfBirth",
    "medium",
];

fn students_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let academic_year: Option<String> = conn
        .query_row(
            "SELECT academic_year FROM classes WHERE id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some(class_year) = academic_year else {
        return Err(HandlerErr::new("not_found", "class not found"));
    };
    let academic_year = optional_str(params, "academicYear").unwrap_or(class_year);

    let gateway = SqliteGateway::new(conn);
    let students = gateway.class_students(&class_id, &academic_year)?;
    Ok(json!({ "students": students }))
}

fn students_create(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let name = required_str(params, "name")?;

    let class_row: Option<(String, String)> = conn
        .query_row(
            "SELECT school_id, academic_year FROM classes WHERE id = ?",
            [&class_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;
    let Some((school_id, academic_year)) = class_row else {
        return Err(HandlerErr::new("not_found", "class not found"));
    };

    let sort_order: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1 FROM students WHERE class_id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .map_err(|e| HandlerErr::db("db_query_failed", e))?;

    let student_id = Uuid::new_v4().to_string();
    let optional: Vec<Option<String>> = OPTIONAL_FIELDS
        .iter()
        .map(|key| optional_str(params, key))
        .collect();
    conn.execute(
        "INSERT INTO students(
            id, school_id, class_id, academic_year, name,
            father_name, mother_name, section, roll_no, admission_no, exam_no, date_of_birth, medium,
            sort_order, updated_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            &student_id,
            &school_id,
            &class_id,
            &academic_year,
            &name,
            &optional[0],
            &optional[1],
            &optional[2],
            &optional[3],
            &optional[4],
            &optional[5],
            &optional[6],
            &optional[7],
            sort_order,
            now_ts(),
        ],
    )
    .map_err(|e| HandlerErr::db("db_insert_failed", e).with_details(json!({ "table": "students" })))?;

    let gateway = SqliteGateway::new(conn);
    let student = gateway
        .student(&student_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    Ok(json!({ "studentId": student_id, "student": student }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match students_create(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        _ => None,
    }
}
