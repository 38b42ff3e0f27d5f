//! Token state: records, persistence and the lifecycle manager.

pub mod manager;
pub mod store;
mod types;

pub use manager::TokenLifecycleManager;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{TokenInfo, TokenRecord, TokenResponse};
