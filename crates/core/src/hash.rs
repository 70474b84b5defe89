use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};

/// SHA-256 of a shader source.
///
/// Compiled programs carry the hash of the source they were built from, and the generated
/// host accessors carry the hash they expect. The runtime refuses to dispatch when the two differ.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContentHash(pub [u8; ContentHash::SIZE]);

impl ContentHash {
    pub const SIZE: usize = 32;

    /// Hash of nothing, used by programs without native support.
    pub const EMPTY: Self = Self([0; Self::SIZE]);

    pub fn of(data: impl AsRef<[u8]>) -> Self {
        let mut bytes = [0; Self::SIZE];
        bytes.copy_from_slice(&Sha256::digest(data.as_ref()));
        Self(bytes)
    }

    pub const fn from_bytes(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for ContentHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0; Self::SIZE];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}
