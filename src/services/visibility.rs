//! 可視性リゾルバ
//!
//! 呼び出しユーザーとリソース種別から、アクセス可能な部分集合を決める
//! ポリシーの単一実装。全ての読み取りパスと集計エンジンがここを通る。
//!
//! ポリシーテーブル:
//!
//! | 呼び出しロール | Project | Task | TeamMember |
//! |---|---|---|---|
//! | staff/admin | 全件（`?scope=mine` で絞り込み可） | 全件 | 全アクティブユーザー |
//! | 一般 | 所有 OR メンバー OR タスクアサイン経由 | アサイン OR 作成者 OR 可視プロジェクト内 | 可視プロジェクトの所有者・メンバー・可視タスクのアサイン先の和集合 |
//!
//! 一般ユーザーの可視性は3句の和集合であり、単一の句ではない。
//! メンバーでないアサイン先もプロジェクトを見える（片方向の導出）。

use serde::Serialize;
use uuid::Uuid;

use crate::models::User;

/// リクエストに紐付く認証済みユーザー情報
///
/// グローバルなリクエスト状態は持たず、可視性リゾルバと集計エンジンの
/// 全呼び出しに明示的に引き渡す。
#[derive(Debug, Clone, Serialize)]
pub struct CallerContext {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// アクセスレベル（ロール判定の単一情報源）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    Regular,
    Admin,
}

impl CallerContext {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role.clone(),
            is_staff: user.is_staff,
            is_superuser: user.is_superuser,
        }
    }

    /// ロール判定はこの述語のみを通すこと（フラグの直接参照禁止）
    pub fn access_level(&self) -> AccessLevel {
        if self.is_staff || self.is_superuser {
            AccessLevel::Admin
        } else {
            AccessLevel::Regular
        }
    }

    pub fn is_admin(&self) -> bool {
        self.access_level() == AccessLevel::Admin
    }
}

/// リポジトリがSQLに変換するスコープ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// 全件（管理者）
    All,
    /// 指定ユーザーに関係するレコードのみ
    RelatedTo(Uuid),
}

/// プロジェクトのスコープ
///
/// 管理者はデフォルト全件。`mine_only` は管理者が自分に関係する
/// プロジェクトへ絞り込むための任意指定（`?scope=mine`）。
pub fn project_scope(caller: &CallerContext, mine_only: bool) -> Scope {
    match caller.access_level() {
        AccessLevel::Admin if !mine_only => Scope::All,
        _ => Scope::RelatedTo(caller.user_id),
    }
}

/// タスクのスコープ
pub fn task_scope(caller: &CallerContext) -> Scope {
    match caller.access_level() {
        AccessLevel::Admin => Scope::All,
        AccessLevel::Regular => Scope::RelatedTo(caller.user_id),
    }
}

/// チームメンバーのスコープ
pub fn team_scope(caller: &CallerContext) -> Scope {
    match caller.access_level() {
        AccessLevel::Admin => Scope::All,
        AccessLevel::Regular => Scope::RelatedTo(caller.user_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(is_staff: bool, is_superuser: bool) -> CallerContext {
        CallerContext {
            user_id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            name: "Test".to_string(),
            role: "user".to_string(),
            is_staff,
            is_superuser,
        }
    }

    #[test]
    fn test_access_level_regular() {
        assert_eq!(caller(false, false).access_level(), AccessLevel::Regular);
    }

    #[test]
    fn test_access_level_staff() {
        assert_eq!(caller(true, false).access_level(), AccessLevel::Admin);
    }

    #[test]
    fn test_access_level_superuser() {
        // is_staff が落ちていても is_superuser 単独で管理者扱い
        assert_eq!(caller(false, true).access_level(), AccessLevel::Admin);
    }

    #[test]
    fn test_admin_project_scope_defaults_to_all() {
        let admin = caller(true, false);
        assert_eq!(project_scope(&admin, false), Scope::All);
    }

    #[test]
    fn test_admin_project_scope_narrows_to_mine() {
        let admin = caller(true, false);
        assert_eq!(
            project_scope(&admin, true),
            Scope::RelatedTo(admin.user_id)
        );
    }

    #[test]
    fn test_regular_project_scope_ignores_mine_flag() {
        let user = caller(false, false);
        assert_eq!(
            project_scope(&user, false),
            Scope::RelatedTo(user.user_id)
        );
        assert_eq!(project_scope(&user, true), Scope::RelatedTo(user.user_id));
    }

    #[test]
    fn test_task_and_team_scopes_follow_access_level() {
        let admin = caller(true, false);
        let user = caller(false, false);
        assert_eq!(task_scope(&admin), Scope::All);
        assert_eq!(task_scope(&user), Scope::RelatedTo(user.user_id));
        assert_eq!(team_scope(&admin), Scope::All);
        assert_eq!(team_scope(&user), Scope::RelatedTo(user.user_id));
    }
}
