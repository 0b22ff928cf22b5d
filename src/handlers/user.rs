use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::User;
use crate::services::visibility::{self, CallerContext};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserUpdateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// ユーザー一覧ハンドラー
///
/// GET /api/users
///
/// チームメンバー可視性でスコープする:
/// 管理者は全アクティブユーザー、一般ユーザーは自分の可視プロジェクト・
/// タスクに関係するユーザーのみ。
pub async fn list_users(
    State(state): State<AppState>,
    caller: CallerContext,
) -> Result<Json<Vec<User>>, AppError> {
    let scope = visibility::team_scope(&caller);

    let users = state.user_repo.list_team_members(&scope, None).await?;

    Ok(Json(users))
}

/// ユーザー取得ハンドラー
///
/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = state
        .user_repo
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::NotFound)?;

    // 一般ユーザーは自分自身かチームメンバーのみ参照可
    if !caller.is_admin() && caller.user_id != user_id {
        let scope = visibility::team_scope(&caller);
        let visible = state
            .user_repo
            .list_team_members(&scope, None)
            .await?
            .iter()
            .any(|member| member.id == user_id);
        if !visible {
            return Err(AppError::Forbidden);
        }
    }

    Ok(Json(user))
}

/// ユーザー更新ハンドラー（管理者のみ）
///
/// PUT /api/users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UserUpdateRequest>,
) -> Result<Json<User>, AppError> {
    if !caller.is_admin() {
        return Err(AppError::Forbidden);
    }

    let user = state
        .user_repo
        .update_profile(
            user_id,
            request.name.as_deref(),
            request.role.as_deref(),
            request.is_active,
        )
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::info!(user_id = %user.id, "ユーザー更新");

    Ok(Json(user))
}

/// ユーザー削除ハンドラー（管理者のみ）
///
/// DELETE /api/users/{id}
pub async fn delete_user(
    State(state): State<AppState>,
    caller: CallerContext,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !caller.is_admin() {
        return Err(AppError::Forbidden);
    }

    let deleted = state.user_repo.delete(user_id).await?;
    if !deleted {
        return Err(AppError::NotFound);
    }

    tracing::info!(user_id = %user_id, "ユーザー削除");

    Ok(StatusCode::NO_CONTENT)
}
