use serde::Serialize;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::AppError;

/// タスク
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub priority: String,
    pub due_date: Option<Date>,
    /// 進捗率 0..=100
    pub progress: i16,
    pub time_tracked_seconds: i32,
    pub custom_fields: serde_json::Value,
    pub created_by: Option<Uuid>,
    pub updated_by: Option<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// タスクステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
    Review,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "to-do",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Review => "review",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "to-do" => Ok(Self::Todo),
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "review" => Ok(Self::Review),
            _ => Err(AppError::Validation(format!(
                "無効なタスクステータスです: {s}"
            ))),
        }
    }
}

/// タスク優先度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(AppError::Validation(format!("無効な優先度です: {s}"))),
        }
    }
}

/// タスクアサイン
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TaskAssignment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub assigned_at: OffsetDateTime,
}

/// 進捗率の検証（0..=100）
pub fn validate_progress(progress: i16) -> Result<(), AppError> {
    if !(0..=100).contains(&progress) {
        return Err(AppError::Validation(
            "進捗率は0から100の範囲で入力してください".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_roundtrip() {
        for s in ["to-do", "in-progress", "completed", "review"] {
            assert_eq!(TaskStatus::parse(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_task_status_rejects_unknown() {
        assert!(TaskStatus::parse("done").is_err());
    }

    #[test]
    fn test_priority_rejects_unknown() {
        assert!(TaskPriority::parse("urgent").is_err());
        assert_eq!(TaskPriority::parse("high").unwrap(), TaskPriority::High);
    }

    #[test]
    fn test_validate_progress_bounds() {
        assert!(validate_progress(0).is_ok());
        assert!(validate_progress(100).is_ok());
        assert!(validate_progress(101).is_err());
        assert!(validate_progress(-1).is_err());
    }
}
