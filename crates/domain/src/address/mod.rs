//! Shipping addresses.
//!
//! Each user has at most one address flagged `isDefault`.

mod service;

use chrono::{DateTime, Utc};
use common::{DocumentId, UserId};
use document_store::Document;
use serde::{Deserialize, Serialize};

use crate::error::{CommerceError, Result};

pub use service::AddressService;

/// A stored address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: DocumentId,
    pub user: UserId,
    pub receiver_name: String,
    pub phone_number: String,
    pub province: String,
    pub city: String,
    pub district: String,
    pub detail_address: String,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document for Address {
    const COLLECTION: &'static str = "addresses";

    fn id(&self) -> DocumentId {
        self.id
    }
}

/// Caller-supplied address fields, used for both create and update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressFields {
    #[serde(default)]
    pub receiver_name: String,
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub district: String,
    #[serde(default)]
    pub detail_address: String,
    #[serde(default)]
    pub is_default: bool,
}

impl AddressFields {
    /// Checks that every required field is present and not blank.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("receiverName", &self.receiver_name),
            ("phoneNumber", &self.phone_number),
            ("province", &self.province),
            ("city", &self.city),
            ("district", &self.district),
            ("detailAddress", &self.detail_address),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CommerceError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    fn into_address(self, user: UserId, now: DateTime<Utc>) -> Address {
        Address {
            id: DocumentId::new(),
            user,
            receiver_name: self.receiver_name.trim().to_string(),
            phone_number: self.phone_number.trim().to_string(),
            province: self.province.trim().to_string(),
            city: self.city.trim().to_string(),
            district: self.district.trim().to_string(),
            detail_address: self.detail_address.trim().to_string(),
            is_default: self.is_default,
            created_at: now,
            updated_at: now,
        }
    }
}
