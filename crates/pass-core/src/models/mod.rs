//! Data models for Pass
//!
//! Plain records shared by the crypto envelope, the event synchronizer and the
//! optimistic mutation log. Wire shapes (`Encrypted*`) mirror the API payloads
//! and are turned into decrypted records by [`crate::crypto::Envelope`].

/// Declares an opaque string identifier issued by the server.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Caller-supplied id of a tracked request
    RequestId
);

mod event;
mod item;
mod selection;
mod share;

pub use event::{EncryptedEventBatch, EncryptedShareEvent, ShareEvent};
pub use item::{
    EncryptedItem, ItemContent, ItemId, ItemKey, ItemMetadata, ItemRevision, ItemState, Revision,
    RevisionUpdate,
};
pub use selection::BulkSelection;
pub use share::{
    EncryptedShare, EncryptedShareKey, EventId, Share, ShareContent, ShareId, TargetType,
    VaultContent, VaultId,
};
