//! Domain types and models

pub mod envelope;
pub mod task;
pub mod token;

pub use envelope::{ApiResponse, PaginationMetadata};
pub use task::{generate_task_id, TaskFilter, TaskInfo, TaskStats, TaskStatus, TaskType};
pub use token::{
    AuthToken, RefreshedToken, TokenEvent, TokenState, TokenValidation, MAX_TOKEN_LIFETIME,
};
