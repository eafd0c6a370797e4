// Core types and storage for the userbook record service

pub mod error;
pub mod storage;
pub mod types;

pub use error::{StorageError, StorageResult};
pub use types::*;
