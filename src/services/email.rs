use std::sync::Arc;

use crate::config::Config;
use crate::error::AppError;

/// メール送信サービス
///
/// `email` feature 有効時は lettre でSMTP送信、無効時は開発モードとして
/// リセットURLをログ出力するのみ。送信失敗は再試行可能な
/// `AppError::EmailDelivery` として呼び出し側に区別して返す
/// （チケット発行の失敗とは別物）。
#[derive(Clone)]
pub struct EmailService {
    config: Arc<Config>,
}

impl EmailService {
    /// 新しい EmailService を作成
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// パスワードリセットメールを送信
    pub async fn send_password_reset_email(
        &self,
        to: &str,
        reset_url: &str,
    ) -> Result<(), AppError> {
        #[cfg(feature = "email")]
        {
            if self.smtp_configured() {
                return self.send_via_smtp(to, reset_url).await;
            }
            tracing::warn!("SMTP未設定のため開発モードで動作");
        }

        #[cfg(not(feature = "email"))]
        if self.smtp_configured() {
            tracing::warn!("SMTP設定がありますが email feature が無効です");
        }

        // 開発モード: メール送信せずログ出力のみ
        tracing::info!(to = %to, "パスワードリセットメール送信（開発モード）");
        tracing::info!("リセットURL: {}", reset_url);

        Ok(())
    }

    fn smtp_configured(&self) -> bool {
        self.config.smtp_host.is_some()
            && self.config.smtp_username.is_some()
            && self.config.smtp_password.is_some()
            && self.config.smtp_from_address.is_some()
    }

    #[cfg(feature = "email")]
    async fn send_via_smtp(&self, to: &str, reset_url: &str) -> Result<(), AppError> {
        use lettre::transport::smtp::authentication::Credentials;
        use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
        use secrecy::ExposeSecret;

        // smtp_configured() 確認済みの前提
        let host = self.config.smtp_host.as_deref().unwrap_or_default();
        let from = self.config.smtp_from_address.as_deref().unwrap_or_default();
        let username = self
            .config
            .smtp_username
            .as_ref()
            .map(|s| s.expose_secret().clone())
            .unwrap_or_default();
        let password = self
            .config
            .smtp_password
            .as_ref()
            .map(|s| s.expose_secret().clone())
            .unwrap_or_default();

        let body = format!(
            "パスワードリセットのリクエストを受け付けました。\n\n\
             以下のリンクから新しいパスワードを設定してください:\n{reset_url}\n\n\
             このリンクの有効期限は1時間です。\n\
             心当たりがない場合はこのメールを無視してください。\n"
        );

        let message = Message::builder()
            .from(from.parse().map_err(|e| {
                tracing::error!(error = ?e, "送信元アドレスのパースエラー");
                AppError::Internal(anyhow::anyhow!("invalid from address"))
            })?)
            .to(to.parse().map_err(|e| {
                tracing::warn!(error = ?e, "宛先アドレスのパースエラー");
                AppError::Validation("有効なメールアドレスを入力してください".to_string())
            })?)
            .subject("パスワードリセットのご案内")
            .body(body)
            .map_err(|e| {
                tracing::error!(error = ?e, "メール本文の構築エラー");
                AppError::Internal(anyhow::anyhow!("failed to build email"))
            })?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| {
                tracing::error!(error = ?e, "SMTPトランスポート初期化エラー");
                AppError::EmailDelivery
            })?
            .credentials(Credentials::new(username, password))
            .port(self.config.smtp_port)
            .build();

        mailer.send(message).await.map_err(|e| {
            tracing::error!(error = ?e, "メール送信エラー");
            AppError::EmailDelivery
        })?;

        tracing::info!(to = %to, "パスワードリセットメール送信完了");

        Ok(())
    }
}
