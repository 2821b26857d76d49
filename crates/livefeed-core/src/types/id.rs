//! Engine-generated identifiers.
//!
//! Connection and subscription ids are UUIDv7 and roughly sort by creation
//! time; token ids are random v4.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident => $generate:expr
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh id.
            pub fn new() -> Self {
                Self($generate)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Assigned to a transport connection at accept time.
    ConnectionId => Uuid::now_v7()
);

define_id!(
    /// Identifies one subscription record.
    SubscriptionId => Uuid::now_v7()
);

define_id!(
    /// The `jti` claim of a signed token.
    TokenId => Uuid::new_v4()
);
