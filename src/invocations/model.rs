//! Invocation record and its lifecycle.
//!
//! `pending` is the only non-terminal state. A terminal state is written
//! exactly once together with `completed_at` and `duration_ms`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvocationStatus {
    Pending,
    Success,
    Failed,
}

impl InvocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Pending => "pending",
            InvocationStatus::Success => "success",
            InvocationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InvocationStatus::Pending)
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvocationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InvocationStatus::Pending),
            "success" => Ok(InvocationStatus::Success),
            "failed" => Ok(InvocationStatus::Failed),
            other => Err(format!("unknown invocation status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invocation {id} already completed as {status}")]
pub struct AlreadyCompleted {
    pub id: Uuid,
    pub status: InvocationStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider_identifier: String,
    pub operation_identifier: String,
    pub status: InvocationStatus,
    pub parameters: Value,
    pub response_data: Option<Vec<u8>>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invocation {
    pub fn start(
        user_id: Uuid,
        provider_identifier: impl Into<String>,
        operation_identifier: impl Into<String>,
        parameters: Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider_identifier: provider_identifier.into(),
            operation_identifier: operation_identifier.into(),
            status: InvocationStatus::Pending,
            parameters,
            response_data: None,
            error_message: None,
            started_at: now,
            completed_at: None,
            duration_ms: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_success(&mut self, response_data: Vec<u8>) -> Result<(), AlreadyCompleted> {
        self.complete(InvocationStatus::Success, Utc::now())?;
        self.response_data = Some(response_data);
        Ok(())
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) -> Result<(), AlreadyCompleted> {
        self.complete(InvocationStatus::Failed, Utc::now())?;
        self.error_message = Some(message.into());
        Ok(())
    }

    fn complete(&mut self, status: InvocationStatus, at: DateTime<Utc>) -> Result<(), AlreadyCompleted> {
        if self.status.is_terminal() {
            return Err(AlreadyCompleted {
                id: self.id,
                status: self.status,
            });
        }
        // Clock steps backwards must not produce a negative duration
        let at = at.max(self.started_at);
        self.status = status;
        self.completed_at = Some(at);
        self.duration_ms = Some((at - self.started_at).num_milliseconds());
        self.updated_at = at;
        Ok(())
    }

    /// Decoded response payload, when one was recorded and is valid JSON.
    pub fn response_json(&self) -> Option<Value> {
        self.response_data
            .as_deref()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}
