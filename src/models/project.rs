use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;

/// プロジェクト
///
/// status カラムは自由形式のTEXTで保持し、書き込み時のみ
/// [`ProjectStatus`] で検証する（未知の値が読み取りを壊さないように）
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// 一覧用: 呼び出しユーザーにアサインされたタスク数の注釈付きプロジェクト
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectWithTaskCount {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub status: String,
    /// 呼び出しユーザーにアサインされたこのプロジェクト内のタスク数
    pub task_count: i64,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// プロジェクトステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    Todo,
    InProgress,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Archived => "archived",
        }
    }

    /// 書き込み時の検証
    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "todo" => Ok(Self::Todo),
            "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "archived" => Ok(Self::Archived),
            _ => Err(AppError::Validation(format!(
                "無効なプロジェクトステータスです: {s}"
            ))),
        }
    }
}

/// プロジェクトメンバーシップ
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectMember {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: OffsetDateTime,
}

/// メンバーシップロール
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Admin,
    Member,
    Viewer,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
            Self::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Result<Self, AppError> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            "viewer" => Ok(Self::Viewer),
            _ => Err(AppError::Validation(format!(
                "無効なメンバーロールです: {s}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_status_roundtrip() {
        for s in ["todo", "in-progress", "completed", "archived"] {
            assert_eq!(ProjectStatus::parse(s).unwrap().as_str(), s);
        }
    }

    #[test]
    fn test_project_status_rejects_unknown() {
        assert!(ProjectStatus::parse("cancelled").is_err());
        assert!(ProjectStatus::parse("").is_err());
    }

    #[test]
    fn test_member_role_rejects_unknown() {
        assert!(MemberRole::parse("owner").is_err());
        assert_eq!(MemberRole::parse("viewer").unwrap(), MemberRole::Viewer);
    }
}
