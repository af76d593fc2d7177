//! Security levels

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Message protection level, carried on the wire as an integer
///
/// There is no default: plaintext must always be chosen explicitly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SecurityLevel {
    /// One-time pad with QKD material
    QuantumOtp = 1,
    /// AEAD keyed from QKD material
    QuantumAes = 2,
    /// AEAD keyed from a Kyber-512 encapsulation
    PostQuantum = 3,
    /// No protection
    Plaintext = 4,
}

impl SecurityLevel {
    /// All levels, strongest first
    pub const ALL: [SecurityLevel; 4] = [
        SecurityLevel::QuantumOtp,
        SecurityLevel::QuantumAes,
        SecurityLevel::PostQuantum,
        SecurityLevel::Plaintext,
    ];

    /// Wire value
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            SecurityLevel::QuantumOtp => "quantum-otp",
            SecurityLevel::QuantumAes => "quantum-aes",
            SecurityLevel::PostQuantum => "post-quantum",
            SecurityLevel::Plaintext => "plaintext",
        }
    }

    /// Whether the level fetches QKD material
    pub fn uses_qkd(&self) -> bool {
        matches!(self, SecurityLevel::QuantumOtp | SecurityLevel::QuantumAes)
    }

    /// Whether the level produces a nonce and tag
    pub fn uses_aead(&self) -> bool {
        matches!(self, SecurityLevel::QuantumAes | SecurityLevel::PostQuantum)
    }
}

impl TryFrom<u8> for SecurityLevel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(SecurityLevel::QuantumOtp),
            2 => Ok(SecurityLevel::QuantumAes),
            3 => Ok(SecurityLevel::PostQuantum),
            4 => Ok(SecurityLevel::Plaintext),
            other => Err(Error::MalformedEnvelope(format!(
                "unknown security level {}",
                other
            ))),
        }
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_u8(), self.name())
    }
}

impl FromStr for SecurityLevel {
    type Err = Error;

    /// Accepts the wire number or the name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return SecurityLevel::try_from(n)
                .map_err(|_| Error::InvalidRequest(format!("unknown security level {}", s)));
        }
        SecurityLevel::ALL
            .into_iter()
            .find(|level| level.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidRequest(format!("unknown security level {}", s)))
    }
}

impl Serialize for SecurityLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for SecurityLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        SecurityLevel::try_from(value).map_err(serde::de::Error::custom)
    }
}
