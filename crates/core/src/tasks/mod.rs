//! Tracking of long-running remote operations

pub mod manager;

pub use manager::{TaskCallback, TaskErrorCallback, TaskManager, TaskManagerConfig, TaskOptions};
