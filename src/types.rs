//! Basic type definitions for the chat server
//!
//! Provides UUID newtype wrappers for type safety:
//! - `UserId`: identity of an account, trusted once authenticated
//! - `GroupId`: group conversation identifier
//! - `ChatId`: private (1:1) conversation identifier
//! - `MessageId`: time-ordered message identifier

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident, $ctor:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier
            pub fn new() -> Self {
                Self($ctor())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_newtype!(
    /// Unique user identifier
    ///
    /// Produced by sign-up and carried in bearer tokens. Used as the
    /// connection registry key.
    UserId,
    Uuid::new_v4
);

uuid_newtype!(
    /// Unique group identifier
    GroupId,
    Uuid::new_v4
);

uuid_newtype!(
    /// Unique private chat (relation) identifier
    ChatId,
    Uuid::new_v4
);

uuid_newtype!(
    /// Message identifier (UUID v7, sorts by creation time)
    MessageId,
    Uuid::now_v7
);
