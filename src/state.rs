use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::Config;
use crate::repositories::{ClientRepository, ProjectRepository, TaskRepository, UserRepository};
use crate::services::{EmailService, GoogleAuthService, ResetTokenGenerator, TokenService};

/// アプリケーション共有状態
///
/// axum の State として全ハンドラーで共有される。
/// Clone は必須（axum が内部で clone するため）。
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL コネクションプール
    pub db_pool: PgPool,
    /// アプリケーション設定（Arc で共有）
    pub config: Arc<Config>,
    /// ユーザーリポジトリ
    pub user_repo: UserRepository,
    /// プロジェクトリポジトリ
    pub project_repo: ProjectRepository,
    /// タスクリポジトリ
    pub task_repo: TaskRepository,
    /// クライアントリポジトリ
    pub client_repo: ClientRepository,
    /// トークンサービス
    pub token_service: TokenService,
    /// リセットトークン生成器
    pub reset_generator: ResetTokenGenerator,
    /// メールサービス
    pub email_service: EmailService,
    /// Google認証サービス（設定されている場合のみ）
    pub google_auth_service: Option<GoogleAuthService>,
}

impl AppState {
    /// 新しい AppState を作成
    pub fn new(db_pool: PgPool, config: Config) -> Self {
        let config = Arc::new(config);
        let user_repo = UserRepository::new(db_pool.clone());
        let project_repo = ProjectRepository::new(db_pool.clone());
        let task_repo = TaskRepository::new(db_pool.clone());
        let client_repo = ClientRepository::new(db_pool.clone());

        let token_service = TokenService::new(
            config.jwt_secret.expose_secret(),
            config.access_token_ttl_mins,
            config.refresh_token_ttl_days,
        );
        let reset_generator = ResetTokenGenerator::new(
            config.password_reset_secret.expose_secret(),
            config.password_reset_token_ttl_secs,
        );
        let email_service = EmailService::new(config.clone());

        // Google認証サービス（設定されている場合のみ初期化）
        let google_auth_service = match &config.google_client_id {
            Some(client_id) => {
                tracing::info!("Google認証サービスを初期化");
                Some(GoogleAuthService::new(
                    client_id.clone(),
                    user_repo.clone(),
                ))
            }
            None => {
                tracing::info!("Google認証未設定（スキップ）");
                None
            }
        };

        Self {
            db_pool,
            config,
            user_repo,
            project_repo,
            task_repo,
            client_repo,
            token_service,
            reset_generator,
            email_service,
            google_auth_service,
        }
    }
}
