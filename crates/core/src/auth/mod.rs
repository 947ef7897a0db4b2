//! Token lifecycle management

pub mod ports;
pub mod token_manager;

pub use token_manager::{TokenManager, TokenManagerConfig};
