//! Request payloads and parameter types for the GitLab API.
//!
//! # Design
//! Responses are returned as `serde_json::Value` because their shape belongs
//! to GitLab. What the client sends is typed here instead, so the fixed
//! fields of each endpoint (visibility, creation level, access level) cannot
//! be misspelled.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-supplied issue attributes (`title`, `description`, `labels`,
/// `state_event`, ...), sent as form fields.
pub type IssueFields = Map<String, Value>;

/// Flatten issue fields into form pairs the way Rails reads them: arrays
/// repeat `key[]`, objects nest as `key[sub]`, and `null` fields are left
/// out.
pub(crate) fn form_pairs(fields: &IssueFields) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in fields {
        push_pairs(&mut pairs, key.clone(), value);
    }
    pairs
}

fn push_pairs(pairs: &mut Vec<(String, String)>, key: String, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => pairs.push((key, b.to_string())),
        Value::Number(n) => pairs.push((key, n.to_string())),
        Value::String(s) => pairs.push((key, s.clone())),
        Value::Array(items) => {
            for item in items {
                push_pairs(pairs, format!("{key}[]"), item);
            }
        }
        Value::Object(map) => {
            for (sub, item) in map {
                push_pairs(pairs, format!("{key}[{sub}]"), item);
            }
        }
    }
}

/// A member's role within a group or project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AccessLevel {
    Guest,
    Reporter,
    Developer,
    Maintainer,
    Owner,
}

impl AccessLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            AccessLevel::Guest => 10,
            AccessLevel::Reporter => 20,
            AccessLevel::Developer => 30,
            AccessLevel::Maintainer => 40,
            AccessLevel::Owner => 50,
        }
    }
}

impl From<AccessLevel> for u8 {
    fn from(level: AccessLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for AccessLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            10 => Ok(AccessLevel::Guest),
            20 => Ok(AccessLevel::Reporter),
            30 => Ok(AccessLevel::Developer),
            40 => Ok(AccessLevel::Maintainer),
            50 => Ok(AccessLevel::Owner),
            other => Err(format!("unknown access level {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Private,
    Internal,
    Public,
}

/// Who may create projects inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectCreationLevel {
    Noone,
    Maintainer,
    Developer,
}

/// Page selection for listing endpoints. GitLab pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    pub(crate) fn query(&self) -> Vec<(&'static str, String)> {
        vec![("page", self.page.to_string()), ("per_page", self.per_page.to_string())]
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, per_page: 20 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGroup {
    pub name: String,
    pub path: String,
    pub visibility: Visibility,
    pub project_creation_level: ProjectCreationLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddMember {
    pub user_id: u64,
    pub access_level: AccessLevel,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateProject {
    pub path: String,
    pub visibility: Visibility,
    pub namespace_id: u64,
}

/// A human duration such as `1h30m` or `3d`.
#[derive(Debug, Clone, Serialize)]
pub struct SpentTime {
    pub duration: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateNote {
    pub body: String,
    pub created_at: String,
}
