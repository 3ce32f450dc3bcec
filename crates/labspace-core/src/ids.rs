//! Identifier types for labspace.
//!
//! Assignments, learners/instructors and sessions are referenced by UUIDs handed
//! out by the surrounding platform. Allocation IDs are derived from the
//! (assignment, learner) pair so that the pairing is unique by construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 16-byte workspace allocation identifier, hex-encoded for display.
///
/// The hex form is what appears in cluster object names (`wa-<hex>`), so it is
/// restricted to lowercase `[0-9a-f]` and is always 32 characters long.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AllocationId([u8; 16]);

impl AllocationId {
    /// Create a new `AllocationId` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Derive the allocation ID for an (assignment, learner) pair.
    ///
    /// The same pair always yields the same ID.
    #[must_use]
    pub fn derive(assignment: &AssignmentId, learner: &UserId) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"labspace.allocation");
        hasher.update(assignment.as_bytes());
        hasher.update(learner.as_bytes());

        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest.as_bytes()[..16]);
        Self(bytes)
    }

    /// Parse an `AllocationId` from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not exactly 32 characters.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
        let got = bytes.len();
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| IdError::InvalidLength { expected: 16, got })?;
        Ok(Self(arr))
    }

    /// Return the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Return the hex-encoded string representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for AllocationId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AllocationId({})", self.to_hex())
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl TryFrom<String> for AllocationId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<AllocationId> for String {
    fn from(id: AllocationId) -> Self {
        id.to_hex()
    }
}

impl AsRef<[u8]> for AllocationId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random ID.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Return the bytes of the UUID.
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

uuid_id!(
    /// Identifier of an assignment in the course platform.
    AssignmentId
);

uuid_id!(
    /// Identifier of a platform user (learner or instructor).
    UserId
);

uuid_id!(
    /// Identifier of one workspace session.
    SessionId
);

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input string contains invalid hexadecimal characters.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_id_is_stable_per_pair() {
        let assignment = AssignmentId::generate();
        let learner = UserId::generate();

        let a = AllocationId::derive(&assignment, &learner);
        let b = AllocationId::derive(&assignment, &learner);
        assert_eq!(a, b);

        let other = AllocationId::derive(&assignment, &UserId::generate());
        assert_ne!(a, other);
    }

    #[test]
    fn allocation_id_hex_is_dns_safe() {
        let id = AllocationId::derive(&AssignmentId::generate(), &UserId::generate());
        let hex = id.to_hex();
        assert_eq!(hex.len(), 32);
        assert!(hex.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
        assert_eq!(AllocationId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn allocation_id_invalid_hex() {
        let result = AllocationId::from_hex("zz-not-hex");
        assert!(matches!(result, Err(IdError::InvalidHex)));
    }

    #[test]
    fn allocation_id_wrong_length() {
        let result = AllocationId::from_hex("deadbeef");
        assert_eq!(
            result,
            Err(IdError::InvalidLength {
                expected: 16,
                got: 4
            })
        );
    }

    #[test]
    fn allocation_id_serde_json() {
        let id = AllocationId::from_bytes([0xab; 16]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(16)));
        let parsed: AllocationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn session_id_parse() {
        let id = SessionId::generate();
        let parsed = SessionId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(matches!(
            SessionId::from_str("not-a-uuid"),
            Err(IdError::InvalidUuid)
        ));
    }

    #[test]
    fn user_id_debug_names_type() {
        let uuid = uuid::Uuid::nil();
        let id = UserId::from_uuid(uuid);
        assert_eq!(format!("{id:?}"), format!("UserId({uuid})"));
    }
}
