use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::model::Role;

/// Caller identity. Report methods take it from the envelope, or from
/// `params.actor` when the envelope has none.
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct RequestActor {
    pub role: Role,
    pub user_id: String,
    #[serde(default)]
    pub assigned_subjects: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub actor: Option<RequestActor>,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}
