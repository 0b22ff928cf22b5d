use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::project::{Project, ProjectMember, ProjectStatus, ProjectWithTaskCount};
use crate::repositories::project::ProjectInput;
use crate::services::visibility::{self, CallerContext};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ProjectListQuery {
    pub status: Option<String>,
    pub client: Option<Uuid>,
    /// 管理者用の絞り込み（"mine" で自分に関係するプロジェクトのみ）
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectCreateRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    /// メンバーのユーザーID一覧（作成者は指定不要、常に admin で追加）
    #[serde(default)]
    pub member_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize)]
pub struct ProjectUpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub client_id: Option<Uuid>,
    /// 指定時はメンバー集合を差分照合（所有者は常に保持される）
    #[serde(default)]
    pub member_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Serialize)]
pub struct ProjectDetailResponse {
    #[serde(flatten)]
    pub project: Project,
    pub members: Vec<ProjectMember>,
}

/// プロジェクト一覧ハンドラー
///
/// GET /api/projects
///
/// 可視性: 所有 OR メンバー OR タスクアサイン経由（和集合）。
/// 管理者はデフォルト全件、`?scope=mine` で自分関連のみに絞れる。
/// 各行には呼び出しユーザーのアサインタスク数が注釈される。
pub async fn list_projects(
    State(state): State<AppState>,
    caller: CallerContext,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<Vec<ProjectWithTaskCount>>, AppError> {
    if let Some(status) = query.status.as_deref() {
        ProjectStatus::parse(status)?;
    }

    let mine_only = query.scope.as_deref() == Some("mine");
    let scope = visibility::project_scope(&caller, mine_only);

    let projects = state
        .project_repo
        .list(&scope, caller.user_id, query.status.as_deref(), query.client)
        .await?;

    Ok(Json(projects))
}

/// プロジェクト作成ハンドラー
///
/// POST /api/projects
///
/// プロジェクト本体とメンバーシップを同一トランザクションで作成。
/// 作成者が所有者となり、必ず admin ロールのメンバーになる。
pub async fn create_project(
    State(state): State<AppState>,
    caller: CallerContext,
    Json(request): Json<ProjectCreateRequest>,
) -> Result<(StatusCode, Json<ProjectDetailResponse>), AppError> {
    validate_name(&request.name)?;

    let status = request.status.as_deref().unwrap_or("todo");
    ProjectStatus::parse(status)?;

    let input = ProjectInput {
        name: request.name.trim(),
        description: request.description.as_deref(),
        color: request.color.as_deref(),
        status,
        client_id: request.client_id,
    };

    let member_ids = request.member_ids.unwrap_or_default();
    let project = state
        .project_repo
        .create(caller.user_id, &input, &member_ids)
        .await?;

    tracing::info!(project_id = %project.id, owner_id = %caller.user_id, "プロジェクト作成");

    let members = state.project_repo.members(project.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ProjectDetailResponse { project, members }),
    ))
}

/// プロジェクト取得ハンドラー
///
/// GET /api/projects/{id}
pub async fn get_project(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(project_id): Path<Uuid>,
) -> Result<Json<ProjectDetailResponse>, AppError> {
    let project = state
        .project_repo
        .find_by_id(project_id)
        .await?
        .ok_or(AppError::NotFound)?;

    ensure_project_visible(&state, &caller, project_id).await?;

    let members = state.project_repo.members(project_id).await?;

    Ok(Json(ProjectDetailResponse { project, members }))
}

/// プロジェクト更新ハンドラー
///
/// PUT /api/projects/{id}
///
/// 省略されたフィールドは既存値を保持する。
/// member_ids 指定時はメンバー集合を差分照合する
/// （不要行のみ削除・新規行のみ挿入、所有者は常に admin で保持）。
pub async fn update_project(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(project_id): Path<Uuid>,
    Json(request): Json<ProjectUpdateRequest>,
) -> Result<Json<ProjectDetailResponse>, AppError> {
    let existing = state
        .project_repo
        .find_by_id(project_id)
        .await?
        .ok_or(AppError::NotFound)?;

    ensure_project_visible(&state, &caller, project_id).await?;

    if let Some(name) = request.name.as_deref() {
        validate_name(name)?;
    }
    if let Some(status) = request.status.as_deref() {
        ProjectStatus::parse(status)?;
    }

    let name = request.name.unwrap_or(existing.name);
    let description = request.description.or(existing.description);
    let status = request.status.unwrap_or(existing.status);
    let client_id = request.client_id.or(existing.client_id);

    let input = ProjectInput {
        name: name.trim(),
        description: description.as_deref(),
        color: request.color.as_deref(),
        status: &status,
        client_id,
    };

    let project = state
        .project_repo
        .update(project_id, &input, request.member_ids.as_deref())
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(project_id = %project.id, "プロジェクト更新");

    let members = state.project_repo.members(project_id).await?;

    Ok(Json(ProjectDetailResponse { project, members }))
}

/// プロジェクト削除ハンドラー
///
/// DELETE /api/projects/{id}
pub async fn delete_project(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(project_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .project_repo
        .find_by_id(project_id)
        .await?
        .ok_or(AppError::NotFound)?;

    ensure_project_visible(&state, &caller, project_id).await?;

    state.project_repo.delete(project_id).await?;

    tracing::info!(project_id = %project_id, "プロジェクト削除");

    Ok(StatusCode::NO_CONTENT)
}

/// 可視性チェック
///
/// 存在するが不可視のレコードは 404 ではなく 403 を返す
/// （テナント越しの存在推測をさせない方針）
async fn ensure_project_visible(
    state: &AppState,
    caller: &CallerContext,
    project_id: Uuid,
) -> Result<(), AppError> {
    if caller.is_admin() {
        return Ok(());
    }
    if !state
        .project_repo
        .is_visible_to(project_id, caller.user_id)
        .await?
    {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// プロジェクト名のバリデーション
fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation(
            "プロジェクト名は必須です".to_string(),
        ));
    }
    if name.len() > 200 {
        return Err(AppError::Validation(
            "プロジェクト名は200文字以内で入力してください".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name_rejects_empty() {
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
    }

    #[test]
    fn test_validate_name_rejects_too_long() {
        let long = "x".repeat(201);
        assert!(validate_name(&long).is_err());
    }

    #[test]
    fn test_validate_name_accepts_normal() {
        assert!(validate_name("社内ポータル刷新").is_ok());
    }
}
