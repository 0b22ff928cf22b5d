pub mod client;
pub mod project;
pub mod task;
pub mod user;

pub use client::Client;
pub use project::{MemberRole, Project, ProjectMember, ProjectStatus, ProjectWithTaskCount};
pub use task::{Task, TaskAssignment, TaskPriority, TaskStatus};
pub use user::{AUTH_PROVIDER_EMAIL, AUTH_PROVIDER_GOOGLE, User};
