use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tillsync_core::{Channel, DomainError, DomainResult, LocationId, MerchantId};

/// An upstream merchant identity as the sync pipeline first sees it.
///
/// This is the input to the resolver; it carries everything needed to create
/// a canonical record on first contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalMerchantRef {
    pub external_id: String,
    pub channel: Channel,
    /// Display name, when the upstream record carries one.
    pub name: Option<String>,
}

impl ExternalMerchantRef {
    pub fn new(external_id: impl Into<String>, channel: Channel) -> DomainResult<Self> {
        let external_id = external_id.into();
        if external_id.trim().is_empty() {
            return Err(DomainError::validation("external merchant id cannot be empty"));
        }
        Ok(Self {
            external_id,
            channel,
            name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Canonical business identity; unique on (external_id, channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merchant {
    pub id: MerchantId,
    pub external_id: String,
    pub channel: Channel,
    pub name: String,
    /// Upstream API credential. Absent until an operator provisions one;
    /// sync runs for a credential-less merchant abort with a config error.
    pub api_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Merchant {
    /// Build the row the resolver upserts on first contact.
    pub fn from_external(external: &ExternalMerchantRef, now: DateTime<Utc>) -> Self {
        Self {
            id: MerchantId::new(),
            external_id: external.external_id.clone(),
            channel: external.channel,
            name: external
                .name
                .clone()
                .unwrap_or_else(|| external.external_id.clone()),
            api_token: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.api_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Registry entry for an active upstream location.
///
/// `location_id` is an explicitly maintained link to the internal location
/// record; when no mapping has been provisioned it stays `None` and the
/// external merchant id remains the only handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosLocation {
    pub external_merchant_id: String,
    pub channel: Channel,
    pub name: String,
    pub active: bool,
    pub location_id: Option<LocationId>,
}

impl PosLocation {
    pub fn new(
        external_merchant_id: impl Into<String>,
        channel: Channel,
        name: impl Into<String>,
    ) -> DomainResult<Self> {
        let external_merchant_id = external_merchant_id.into();
        if external_merchant_id.trim().is_empty() {
            return Err(DomainError::validation("external merchant id cannot be empty"));
        }
        Ok(Self {
            external_merchant_id,
            channel,
            name: name.into(),
            active: true,
            location_id: None,
        })
    }

    pub fn with_location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_ref_rejects_empty_id() {
        assert!(ExternalMerchantRef::new("", Channel::Clover).is_err());
        assert!(ExternalMerchantRef::new("  ", Channel::Clover).is_err());
    }

    #[test]
    fn merchant_defaults_name_to_external_id() {
        let external = ExternalMerchantRef::new("MER123", Channel::Clover).unwrap();
        let merchant = Merchant::from_external(&external, Utc::now());
        assert_eq!(merchant.name, "MER123");
        assert!(!merchant.has_credentials());
    }

    #[test]
    fn merchant_uses_upstream_name_when_present() {
        let external = ExternalMerchantRef::new("MER123", Channel::Clover)
            .unwrap()
            .with_name("Main Street Cafe");
        let merchant = Merchant::from_external(&external, Utc::now());
        assert_eq!(merchant.name, "Main Street Cafe");
    }

    #[test]
    fn empty_token_does_not_count_as_credentials() {
        let external = ExternalMerchantRef::new("MER123", Channel::Clover).unwrap();
        let mut merchant = Merchant::from_external(&external, Utc::now());
        merchant.api_token = Some(String::new());
        assert!(!merchant.has_credentials());
    }
}
