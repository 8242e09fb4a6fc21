use serde::{Deserialize, Serialize};
use std::fmt;

/// A fixed-width 32-byte digest: the common representation behind
/// milestone ids, block ids, and the two merkle roots. The zero digest
/// is the well-known "null" value used as a genesis parent.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct Digest(#[serde(with = "hex_digest")] pub [u8; 32]);

impl Digest {
    pub const NULL: Digest = Digest([0u8; 32]);

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex_digest::to_hex(&self.0))
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex_digest::to_hex(&self.0))
    }
}

mod hex_digest {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn to_hex(bytes: &[u8; 32]) -> String {
        let mut out = String::with_capacity(64);
        for b in bytes {
            out.push_str(&format!("{:02x}", b));
        }
        out
    }

    fn from_hex(s: &str) -> Result<[u8; 32], String> {
        if s.len() != 64 {
            return Err(format!("expected 64 hex chars, got {}", s.len()));
        }
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
                .map_err(|e| format!("invalid hex at byte {}: {}", i, e))?;
        }
        Ok(out)
    }

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        from_hex(&s).map_err(serde::de::Error::custom)
    }
}

macro_rules! digest_newtype {
    ($name:ident) => {
        #[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        pub struct $name(pub Digest);

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl $name {
            pub const NULL: $name = $name(Digest::NULL);

            pub fn is_null(&self) -> bool {
                self.0.is_null()
            }
        }
    };
}

digest_newtype!(MilestoneId);
digest_newtype!(BlockId);
digest_newtype!(InclusionMerkleRoot);
digest_newtype!(AppliedMerkleRoot);

/// Monotonic milestone index. Index 1 is the first milestone; index 0
/// never appears on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct MilestoneIndex(pub u32);

/// Index of a checkpoint record, independent of milestone indices.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct CheckpointIndex(pub u32);

/// The pair of merkle roots produced by whiteflag confirmation over the
/// subgraph reachable from a milestone's parents.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MilestoneMerkleRoots {
    pub inclusion_merkle_root: InclusionMerkleRoot,
    pub applied_merkle_root: AppliedMerkleRoot,
}
