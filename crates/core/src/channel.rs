//! Upstream sales channel discriminator.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The upstream platform a record originated from.
///
/// Part of every natural key: the same external id may exist on two
/// platforms and must map to two distinct rows.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Clover,
    Square,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Clover => "clover",
            Channel::Square => "square",
        }
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clover" => Ok(Channel::Clover),
            "square" => Ok(Channel::Square),
            other => Err(DomainError::validation(format!("unknown channel: {other}"))),
        }
    }
}
