//! Service wrappers used by UIs and the CLI.

mod client;

pub use client::{MutationReceipt, NoopObserver, PassClient, UiObserver};
