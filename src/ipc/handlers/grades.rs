use crate::grading::{all_scales, scale_for, ScaleKind};
use crate::ipc::error::ok;
use crate::ipc::helpers::{required_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn parse_kind(raw: &str) -> Result<ScaleKind, HandlerErr> {
    match raw {
        "formativePeriod" => Ok(ScaleKind::FormativePeriod),
        "overallSubject" => Ok(ScaleKind::OverallSubject),
        "summativePaper" => Ok(ScaleKind::SummativePaper),
        "final100" => Ok(ScaleKind::Final100),
        "coCurricular" => Ok(ScaleKind::CoCurricular),
        other => Err(HandlerErr::new("bad_params", "unknown scale kind").with_details(json!({
            "kind": other,
            "expected": ["formativePeriod", "overallSubject", "summativePaper", "final100", "coCurricular"],
        }))),
    }
}

fn grades_scales() -> serde_json::Value {
    let scales: Vec<serde_json::Value> = all_scales()
        .iter()
        .map(|s| {
            json!({
                "key": s.key,
                "secondLanguage": s.second_language,
                "percentage": s.percentage,
                "grades": s.grades().collect::<Vec<_>>(),
                "bands": s.bands,
            })
        })
        .collect();
    json!({ "scales": scales })
}

fn grades_lookup(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let kind = parse_kind(&required_str(params, "kind")?)?;
    let second_language = params
        .get("secondLanguage")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let score = params
        .get("score")
        .and_then(|v| v.as_f64())
        .filter(|v| v.is_finite())
        .ok_or_else(|| HandlerErr::new("bad_params", "missing score"))?;
    let scale = scale_for(kind, second_language);
    Ok(json!({ "scale": scale.key, "grade": scale.lookup(score) }))
}

pub fn try_handle(_state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.scales" => Some(ok(&req.id, grades_scales())),
        "grades.lookup" => Some(match grades_lookup(&req.params) {
            Ok(result) => ok(&req.id, result),
            Err(error) => error.response(&req.id),
        }),
        _ => None,
    }
}
