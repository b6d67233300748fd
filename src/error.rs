use serde_json::json;

use crate::model::Role;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{role} {user_id} may not edit {field} of {subject}")]
    Conflict {
        role: Role,
        user_id: String,
        subject: String,
        field: String,
    },

    #[error("{message}")]
    Persistence { code: &'static str, message: String },
}

impl EngineError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// IPC error code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "bad_params",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "edit_forbidden",
            Self::Persistence { code, .. } => *code,
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation { field, reason } => Some(json!({
                "field": field,
                "reason": reason,
            })),
            Self::NotFound { entity, id } => Some(json!({
                "entity": entity,
                "id": id,
            })),
            Self::Conflict {
                role,
                user_id,
                subject,
                field,
            } => Some(json!({
                "role": role,
                "userId": user_id,
                "subject": subject,
                "field": field,
            })),
            Self::Persistence { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence {
            code: "db_query_failed",
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence {
            code: "db_decode_failed",
            message: e.to_string(),
        }
    }
}

/// Maps a database error on a write path to the matching IPC code.
pub fn db_err(code: &'static str) -> impl Fn(rusqlite::Error) -> EngineError {
    move |e| EngineError::Persistence {
        code,
        message: e.to_string(),
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
