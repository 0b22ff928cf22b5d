pub mod auth;
pub mod dashboard;
pub mod email;
pub mod google_auth;
pub mod password_reset;
pub mod token;
pub mod visibility;

pub use dashboard::DashboardService;
pub use email::EmailService;
pub use google_auth::GoogleAuthService;
pub use password_reset::{PasswordResetService, ResetTokenGenerator};
pub use token::TokenService;
