use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::task::{Task, TaskPriority, TaskStatus, validate_progress};
use crate::repositories::task::TaskInput;
use crate::services::visibility::{self, CallerContext};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    /// プロジェクトでの絞り込み（UI互換のため projectId も受け付ける）
    #[serde(alias = "projectId")]
    pub project: Option<Uuid>,
    pub status: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskCreateRequest {
    #[serde(default)]
    pub project_id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_date: Option<Date>,
    #[serde(default)]
    pub progress: Option<i16>,
    #[serde(default)]
    pub custom_fields: Option<serde_json::Value>,
    #[serde(default)]
    pub assignee_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct TaskUpdateRequest {
    #[serde(default)]
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub due_date: Option<Date>,
    #[serde(default)]
    pub progress: Option<i16>,
    #[serde(default)]
    pub custom_fields: Option<serde_json::Value>,
    /// 指定時はアサイン集合を差分照合
    #[serde(default)]
    pub assignee_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct TaskDetailResponse {
    #[serde(flatten)]
    pub task: Task,
    pub assignee_ids: Vec<Uuid>,
}

/// タスク一覧ハンドラー
///
/// GET /api/tasks
///
/// 可視性: アサイン OR 作成者 OR 可視プロジェクト内（和集合）
pub async fn list_tasks(
    State(state): State<AppState>,
    caller: CallerContext,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, AppError> {
    if let Some(status) = query.status.as_deref() {
        TaskStatus::parse(status)?;
    }
    if let Some(priority) = query.priority.as_deref() {
        TaskPriority::parse(priority)?;
    }

    let scope = visibility::task_scope(&caller);

    let tasks = state
        .task_repo
        .list(
            &scope,
            query.project,
            query.status.as_deref(),
            query.priority.as_deref(),
        )
        .await?;

    Ok(Json(tasks))
}

/// タスク作成ハンドラー
///
/// POST /api/tasks
///
/// タスク本体とアサインを同一トランザクションで作成。
/// created_by / updated_by は呼び出しユーザーが設定される。
pub async fn create_task(
    State(state): State<AppState>,
    caller: CallerContext,
    Json(request): Json<TaskCreateRequest>,
) -> Result<(StatusCode, Json<TaskDetailResponse>), AppError> {
    validate_title(&request.title)?;

    let status = request.status.as_deref().unwrap_or("to-do");
    TaskStatus::parse(status)?;
    let priority = request.priority.as_deref().unwrap_or("medium");
    TaskPriority::parse(priority)?;
    let progress = request.progress.unwrap_or(0);
    validate_progress(progress)?;

    let input = TaskInput {
        project_id: request.project_id,
        title: request.title.trim(),
        description: request.description.as_deref(),
        status,
        priority,
        due_date: request.due_date,
        progress,
        custom_fields: request.custom_fields.as_ref(),
    };

    let assignee_ids = request.assignee_ids.unwrap_or_default();
    let task = state
        .task_repo
        .create(&input, caller.user_id, &assignee_ids)
        .await?;

    tracing::info!(task_id = %task.id, created_by = %caller.user_id, "タスク作成");

    let assignee_ids = state.task_repo.assignee_ids(task.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(TaskDetailResponse { task, assignee_ids }),
    ))
}

/// タスク取得ハンドラー
///
/// GET /api/tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskDetailResponse>, AppError> {
    let task = state
        .task_repo
        .find_by_id(task_id)
        .await?
        .ok_or(AppError::NotFound)?;

    ensure_task_visible(&state, &caller, task_id).await?;

    let assignee_ids = state.task_repo.assignee_ids(task_id).await?;

    Ok(Json(TaskDetailResponse { task, assignee_ids }))
}

/// タスク更新ハンドラー
///
/// PUT /api/tasks/{id}
///
/// 省略されたフィールドは既存値を保持する。
/// assignee_ids 指定時はアサイン集合を差分照合する。
pub async fn update_task(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(task_id): Path<Uuid>,
    Json(request): Json<TaskUpdateRequest>,
) -> Result<Json<TaskDetailResponse>, AppError> {
    let existing = state
        .task_repo
        .find_by_id(task_id)
        .await?
        .ok_or(AppError::NotFound)?;

    ensure_task_visible(&state, &caller, task_id).await?;

    if let Some(title) = request.title.as_deref() {
        validate_title(title)?;
    }
    if let Some(status) = request.status.as_deref() {
        TaskStatus::parse(status)?;
    }
    if let Some(priority) = request.priority.as_deref() {
        TaskPriority::parse(priority)?;
    }
    if let Some(progress) = request.progress {
        validate_progress(progress)?;
    }

    let title = request.title.unwrap_or(existing.title);
    let description = request.description.or(existing.description);
    let status = request.status.unwrap_or(existing.status);
    let priority = request.priority.unwrap_or(existing.priority);

    let input = TaskInput {
        project_id: request.project_id.or(existing.project_id),
        title: title.trim(),
        description: description.as_deref(),
        status: &status,
        priority: &priority,
        due_date: request.due_date.or(existing.due_date),
        progress: request.progress.unwrap_or(existing.progress),
        custom_fields: request.custom_fields.as_ref(),
    };

    let task = state
        .task_repo
        .update(
            task_id,
            &input,
            caller.user_id,
            request.assignee_ids.as_deref(),
        )
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(task_id = %task.id, updated_by = %caller.user_id, "タスク更新");

    let assignee_ids = state.task_repo.assignee_ids(task_id).await?;

    Ok(Json(TaskDetailResponse { task, assignee_ids }))
}

/// タスク削除ハンドラー
///
/// DELETE /api/tasks/{id}
pub async fn delete_task(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(task_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .task_repo
        .find_by_id(task_id)
        .await?
        .ok_or(AppError::NotFound)?;

    ensure_task_visible(&state, &caller, task_id).await?;

    state.task_repo.delete(task_id).await?;

    tracing::info!(task_id = %task_id, "タスク削除");

    Ok(StatusCode::NO_CONTENT)
}

/// 可視性チェック（存在するが不可視なら 403）
async fn ensure_task_visible(
    state: &AppState,
    caller: &CallerContext,
    task_id: Uuid,
) -> Result<(), AppError> {
    if caller.is_admin() {
        return Ok(());
    }
    if !state
        .task_repo
        .is_visible_to(task_id, caller.user_id)
        .await?
    {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// タスクタイトルのバリデーション
fn validate_title(title: &str) -> Result<(), AppError> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("タイトルは必須です".to_string()));
    }
    if title.len() > 200 {
        return Err(AppError::Validation(
            "タイトルは200文字以内で入力してください".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title_rejects_empty() {
        assert!(validate_title("").is_err());
        assert!(validate_title("  ").is_err());
    }

    #[test]
    fn test_validate_title_rejects_too_long() {
        let long = "x".repeat(201);
        assert!(validate_title(&long).is_err());
    }

    #[test]
    fn test_validate_title_accepts_normal() {
        assert!(validate_title("API設計レビュー").is_ok());
    }
}
