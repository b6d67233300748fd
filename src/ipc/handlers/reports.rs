use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{optional_str, parse_params, required_str, HandlerErr};
use crate::ipc::types::{AppState, Request, RequestActor};
use crate::lifecycle::{self, ReportScope, SavePayload};
use crate::model::{Actor, ReportKey, Role, DEFAULT_TEMPLATE_KEY, DEFAULT_TERM};
use crate::store::{RosterProvider, SqliteGateway};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

/// Teachers who do not send their assignments get the ones recorded for the
/// class.
fn resolve_actor(
    gateway: &SqliteGateway<'_>,
    req: &Request,
    class_id: Option<&str>,
) -> Result<Actor, HandlerErr> {
    let raw: RequestActor = match &req.actor {
        Some(actor) => actor.clone(),
        None => parse_params(&req.params, Some("actor"))?,
    };
    if raw.user_id.trim().is_empty() {
        return Err(HandlerErr::new("bad_params", "actor.userId must not be empty"));
    }
    let assigned_subjects = match (raw.assigned_subjects, raw.role, class_id) {
        (Some(list), _, _) => list,
        (None, Role::Teacher, Some(class_id)) => gateway.teacher_subjects(class_id, &raw.user_id)?,
        (None, _, _) => Vec::new(),
    };
    Ok(Actor {
        role: raw.role,
        user_id: raw.user_id,
        assigned_subjects,
    })
}

fn required_bool(params: &serde_json::Value, key: &str) -> Result<bool, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| HandlerErr::new("bad_params", format!("missing {}", key)))
}

/// Builds the record key, defaulting school and year from the roster.
/// Returns the student's class alongside.
fn report_key(gateway: &SqliteGateway<'_>, params: &serde_json::Value) -> Result<(ReportKey, String), HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let student = gateway
        .student(&student_id)?
        .ok_or_else(|| HandlerErr::new("not_found", "student not found"))?;
    let key = ReportKey {
        student_id,
        school_id: optional_str(params, "schoolId").unwrap_or(student.school_id),
        academic_year: optional_str(params, "academicYear").unwrap_or(student.academic_year),
        template_key: optional_str(params, "templateKey").unwrap_or_else(|| DEFAULT_TEMPLATE_KEY.to_string()),
        term: optional_str(params, "term").unwrap_or_else(|| DEFAULT_TERM.to_string()),
    };
    Ok((key, student.class_id))
}

fn report_scope(conn: &Connection, params: &serde_json::Value) -> Result<ReportScope, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let class_year: String = conn
        .query_row(
            "SELECT academic_year FROM classes WHERE id = ?",
            [&class_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::new("not_found", "class not found"))?;
    Ok(ReportScope {
        class_id,
        academic_year: optional_str(params, "academicYear").unwrap_or(class_year),
        template_key: optional_str(params, "templateKey").unwrap_or_else(|| DEFAULT_TEMPLATE_KEY.to_string()),
        term: optional_str(params, "term").unwrap_or_else(|| DEFAULT_TERM.to_string()),
    })
}

fn reports_open(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let params = &req.params;
    let gateway = SqliteGateway::new(conn);
    let (key, class_id) = report_key(&gateway, params)?;
    let actor = resolve_actor(&gateway, req, Some(&class_id))?;
    let view = lifecycle::open(&gateway, &gateway, &gateway, &actor, &key)?;
    Ok(json!({ "report": view }))
}

fn reports_save(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let params = &req.params;
    let gateway = SqliteGateway::new(conn);
    let (key, class_id) = report_key(&gateway, params)?;
    let actor = resolve_actor(&gateway, req, Some(&class_id))?;
    let payload: SavePayload = if params.get("payload").is_some() {
        parse_params(params, Some("payload"))?
    } else {
        SavePayload::default()
    };
    let outcome = lifecycle::save(&gateway, &gateway, &gateway, &actor, &key, &payload)?;
    Ok(json!(outcome))
}

fn reports_set_published(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let params = &req.params;
    let gateway = SqliteGateway::new(conn);
    let record_id = required_str(params, "recordId")?;
    let desired = required_bool(params, "isPublished")?;
    let actor = resolve_actor(&gateway, req, None)?;
    let outcome = lifecycle::set_published(&gateway, &actor, &record_id, desired)?;
    Ok(json!(outcome))
}

fn reports_bulk_set_published(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let params = &req.params;
    let gateway = SqliteGateway::new(conn);
    let scope = report_scope(conn, params)?;
    let desired = required_bool(params, "isPublished")?;
    let actor = resolve_actor(&gateway, req, Some(&scope.class_id))?;
    let result = lifecycle::bulk_set_published(&gateway, &gateway, &actor, &scope, desired)?;
    Ok(json!(result))
}

fn reports_class_status(conn: &Connection, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let params = &req.params;
    let gateway = SqliteGateway::new(conn);
    let scope = report_scope(conn, params)?;
    let students = lifecycle::class_status(&gateway, &gateway, &scope)?;
    Ok(json!({
        "classId": scope.class_id,
        "academicYear": scope.academic_year,
        "students": students,
    }))
}

fn with_conn(
    state: &AppState,
    req: &Request,
    f: fn(&Connection, &Request) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, req) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reports.open" => Some(with_conn(state, req, reports_open)),
        "reports.save" => Some(with_conn(state, req, reports_save)),
        "reports.setPublished" => Some(with_conn(state, req, reports_set_published)),
        "reports.bulkSetPublished" => Some(with_conn(state, req, reports_bulk_set_published)),
        "reports.classStatus" => Some(with_conn(state, req, reports_class_status)),
        _ => None,
    }
}
