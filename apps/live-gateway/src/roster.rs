//! Classroom rosters: who should receive a teacher's broadcast.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::auth::{Identity, Role};
use crate::error::RosterError;

/// Resolves the students enrolled in a classroom.
///
/// The requester is passed through so the provider can enforce that only
/// the owning teacher may address a classroom.
#[async_trait]
pub trait RosterProvider: Send + Sync {
    async fn students_of(
        &self,
        requester: &Identity,
        classroom_id: i64,
    ) -> Result<Vec<Identity>, RosterError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Classroom {
    teacher_id: i64,
    students: Vec<i64>,
}

/// Roster kept in process memory. Used by tests and local demos.
#[derive(Default)]
pub struct MemoryRoster {
    classrooms: RwLock<HashMap<i64, Classroom>>,
}

impl MemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a classroom owned by `teacher_id`.
    pub fn enroll(&self, classroom_id: i64, teacher_id: i64, students: impl IntoIterator<Item = i64>) {
        self.classrooms.write().insert(
            classroom_id,
            Classroom {
                teacher_id,
                students: students.into_iter().collect(),
            },
        );
    }
}

#[async_trait]
impl RosterProvider for MemoryRoster {
    async fn students_of(
        &self,
        requester: &Identity,
        classroom_id: i64,
    ) -> Result<Vec<Identity>, RosterError> {
        if requester.role == Role::Student {
            return Err(RosterError::AccessDenied(classroom_id));
        }

        let classrooms = self.classrooms.read();
        let classroom = classrooms
            .get(&classroom_id)
            .ok_or(RosterError::NotFound(classroom_id))?;

        if classroom.teacher_id != requester.user_id {
            return Err(RosterError::AccessDenied(classroom_id));
        }

        Ok(classroom.students.iter().copied().map(Identity::student).collect())
    }
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct StudentEntry {
    id: i64,
}

/// Roster served by the classroom REST API.
#[derive(Clone)]
pub struct HttpRoster {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpRoster {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RosterProvider for HttpRoster {
    async fn students_of(
        &self,
        requester: &Identity,
        classroom_id: i64,
    ) -> Result<Vec<Identity>, RosterError> {
        let url = format!("{}/classrooms/{}/students", self.base_url, classroom_id);

        let mut req = self
            .http
            .get(&url)
            .header("x-requester-id", requester.user_id.to_string())
            .header("x-requester-role", requester.role.as_str());
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await?;
        match resp.status() {
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                return Err(RosterError::AccessDenied(classroom_id))
            }
            StatusCode::NOT_FOUND => return Err(RosterError::NotFound(classroom_id)),
            status if !status.is_success() => {
                tracing::error!(%url, %status, "roster request failed");
                return Err(RosterError::Unavailable(format!("status {status}")));
            }
            _ => {}
        }

        let students: Vec<StudentEntry> = resp.json().await?;
        Ok(students.into_iter().map(|s| Identity::student(s.id)).collect())
    }
}
