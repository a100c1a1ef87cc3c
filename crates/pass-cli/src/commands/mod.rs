pub mod common;
pub mod config;
pub mod store;
pub mod sync;
