//! pass-core - Core library for Pass
//!
//! This crate contains the encrypted vault sync core shared by every Pass
//! client: the crypto envelope, share loading, event synchronization, the
//! optimistic mutation log, request tracking and local storage.

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod loader;
pub mod message;
pub mod models;
pub mod optimistic;
pub mod services;
pub mod state;
pub mod storage;
pub mod sync;
pub mod tracker;
pub mod util;

pub use config::PassConfig;
pub use error::{Error, Result};
pub use message::{Intent, IntentOutcome};
pub use models::{ItemId, ItemKey, ShareId};
pub use services::{MutationReceipt, NoopObserver, PassClient, UiObserver};
