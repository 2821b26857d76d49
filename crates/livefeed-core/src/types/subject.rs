//! Authenticated principal carried by tokens and connections.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role assigned to a subject at token issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Storefront customer.
    Customer,
    /// Back-office staff (fulfilment, support).
    Staff,
    /// Full administrative access.
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Staff => write!(f, "staff"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// The identity a token speaks for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    /// Stable user identifier issued by the surrounding system.
    pub id: String,
    /// Role at the time of issuance.
    pub role: Role,
}

impl Subject {
    /// Creates a new subject.
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}
