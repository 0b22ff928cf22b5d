pub mod client;
pub mod dashboard;
pub mod google;
pub mod health;
pub mod login;
pub mod password_reset;
pub mod project;
pub mod register;
pub mod task;
pub mod token;
pub mod user;

pub use client::{create_client, delete_client, get_client, list_clients, update_client};
pub use dashboard::dashboard_statistics;
pub use google::google_auth;
pub use health::{health_check, readiness_check};
pub use login::login;
pub use password_reset::{request_password_reset, reset_password};
pub use project::{
    create_project, delete_project, get_project, list_projects, update_project,
};
pub use register::register;
pub use task::{create_task, delete_task, get_task, list_tasks, update_task};
pub use token::refresh_token;
pub use user::{delete_user, get_user, list_users, update_user};
