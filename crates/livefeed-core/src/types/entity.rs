//! Entity types that may be observed through the real-time layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

/// The fixed allow-list of observable entity types.
///
/// The wire form is the plural collection name used in topic keys
/// (`orders`, `orders:42`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityType {
    /// Customer orders.
    #[serde(rename = "orders")]
    Order,
    /// Catalogue products.
    #[serde(rename = "products")]
    Product,
    /// Product categories.
    #[serde(rename = "categories")]
    Category,
    /// Deliveries and shipment tracking.
    #[serde(rename = "deliveries")]
    Delivery,
    /// Payments and refunds.
    #[serde(rename = "payments")]
    Payment,
    /// Customer accounts.
    #[serde(rename = "customers")]
    Customer,
    /// Stock levels.
    #[serde(rename = "inventory")]
    Inventory,
    /// Product reviews.
    #[serde(rename = "reviews")]
    Review,
    /// Discount coupons.
    #[serde(rename = "coupons")]
    Coupon,
}

impl EntityType {
    /// Every allowed entity type.
    pub const ALL: [EntityType; 9] = [
        Self::Order,
        Self::Product,
        Self::Category,
        Self::Delivery,
        Self::Payment,
        Self::Customer,
        Self::Inventory,
        Self::Review,
        Self::Coupon,
    ];

    /// Returns the wire name of this entity type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "orders",
            Self::Product => "products",
            Self::Category => "categories",
            Self::Delivery => "deliveries",
            Self::Payment => "payments",
            Self::Customer => "customers",
            Self::Inventory => "inventory",
            Self::Review => "reviews",
            Self::Coupon => "coupons",
        }
    }

    /// Parses a wire name, returning `None` for anything outside the allow-list.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| AppError::validation(format!("Unknown entity type: {s}")))
    }
}

/// Identifier of a single entity instance.
///
/// Stored as a string; the wire accepts either a JSON string or an integer
/// so `42` and `"42"` address the same topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity id, rejecting empty values.
    pub fn new(id: impl Into<String>) -> Result<Self, AppError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AppError::validation("Entity id must not be empty"));
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Unsigned(u64),
            Signed(i64),
        }

        let raw = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Unsigned(n) => n.to_string(),
            Raw::Signed(n) => n.to_string(),
        };
        EntityId::new(raw).map_err(|e| serde::de::Error::custom(e.message))
    }
}
