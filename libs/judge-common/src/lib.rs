pub mod redis;
pub mod traits;
pub mod types;
