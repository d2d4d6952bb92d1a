//! Device identity
//!
//! Address and credential types for one outlet. A [`DeviceHandle`] is
//! immutable for the lifetime of one invocation; the engine never persists
//! the credential itself.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Errors produced while validating device identity inputs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("invalid Bluetooth address '{0}': expected six colon-separated hex octets")]
    InvalidAddress(String),

    #[error("invalid PIN '{0}': must be 4 digits")]
    InvalidPin(String),
}

/// Bluetooth hardware address of an outlet (e.g. `5C:B6:CC:00:1A:AE`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BdAddr([u8; 6]);

impl FromStr for BdAddr {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut count = 0;
        for part in s.split(':') {
            if count == 6 || part.len() != 2 {
                return Err(DeviceError::InvalidAddress(s.to_string()));
            }
            octets[count] = u8::from_str_radix(part, 16)
                .map_err(|_| DeviceError::InvalidAddress(s.to_string()))?;
            count += 1;
        }
        if count != 6 {
            return Err(DeviceError::InvalidAddress(s.to_string()));
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for BdAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl Serialize for BdAddr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 4-digit numeric credential sent with every frame
#[derive(Clone, PartialEq, Eq)]
pub struct Pin(String);

impl Pin {
    /// Validate and wrap a 4-digit PIN string
    pub fn new(pin: &str) -> Result<Self, DeviceError> {
        if pin.len() == 4 && pin.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(pin.to_string()))
        } else {
            Err(DeviceError::InvalidPin(pin.to_string()))
        }
    }

    /// The PIN digits
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Keep the credential out of debug output; traces carry frames, not PINs.
impl fmt::Debug for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pin(****)")
    }
}

impl Serialize for Pin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Everything needed to address one outlet for one invocation
#[derive(Debug, Clone, Serialize)]
pub struct DeviceHandle {
    /// Hardware address
    #[serde(rename = "mac")]
    pub address: BdAddr,
    /// Credential appended to every frame
    pub pin: Pin,
    /// Optional human-readable name from the alias table
    pub alias: Option<String>,
}

impl DeviceHandle {
    /// Build a handle from unvalidated address and PIN strings
    pub fn new(address: &str, pin: &str) -> Result<Self, DeviceError> {
        Ok(Self {
            address: address.parse()?,
            pin: Pin::new(pin)?,
            alias: None,
        })
    }

    /// Attach the alias the address was resolved from
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}
