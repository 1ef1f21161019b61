use std::fmt;

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};

/// Generates a fixed-width, hex-displayable newtype wrapping `[u8; N]`.
macro_rules! field_bytes {
    ($name:ident, $len:expr, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                if bytes.len() != $len {
                    return None;
                }
                let mut buf = [0u8; $len];
                buf.copy_from_slice(bytes);
                Some(Self(buf))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(value: [u8; $len]) -> Self {
                Self(value)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                let s = s.strip_prefix("0x").unwrap_or(&s);
                let bytes = hex::decode(s).map_err(DeError::custom)?;
                Self::from_slice(&bytes).ok_or_else(|| {
                    DeError::custom(format!(
                        "expected {} bytes, got {}",
                        $len,
                        bytes.len()
                    ))
                })
            }
        }
    };
}

field_bytes!(PublicKey, 64, "An account's public key, as used to encrypt/decrypt notes.");
field_bytes!(ContractAddress, 32, "The address of the contract a note belongs to.");
field_bytes!(StorageSlot, 32, "The storage slot a note was emitted under.");
field_bytes!(NoteHash, 32, "A note-hash commitment as inserted into the note-hash tree.");
field_bytes!(SiloedNullifier, 32, "A contract-scoped nullifier for a note.");
field_bytes!(TxHash, 32, "The hash of the transaction a note/log originated from.");
field_bytes!(PartialAddress, 32, "The partial address component of a `CompleteAddress`.");
field_bytes!(TreeRoot, 32, "A single Merkle tree root.");

/// Serde helpers for hex-encoding a variable-length byte vector as a JSON string, used by the
/// node-client wire types whose payloads (ciphertexts, raw note bytes) have no fixed width.
pub mod hex_bytes {
    use serde::{de::Error as DeError, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(DeError::custom)
    }
}

/// Identifies one of the node's Merkle trees, for `NodeClient::find_leaf_index`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TreeId {
    NoteHash,
    Nullifier,
    Contract,
    L1ToL2Messages,
    Archive,
    PublicData,
}

/// Which version of a tree to query: its latest state, or as of a past block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Snapshot {
    Latest,
    AtBlock(BlockNumber),
}

/// A monotonically increasing L2 block number.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockNumber(pub u64);

impl BlockNumber {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub fn checked_sub(self, rhs: u64) -> Option<Self> {
        self.0.checked_sub(rhs).map(Self)
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BlockNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BlockNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl std::ops::Add<u64> for BlockNumber {
    type Output = BlockNumber;

    fn add(self, rhs: u64) -> Self::Output {
        BlockNumber(self.0 + rhs)
    }
}
