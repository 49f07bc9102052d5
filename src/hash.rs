//! Digest function shared by whole-file comparison and segment identity.
//!
//! Both peers must be configured with the same algorithm; it is not
//! negotiated on the wire.

use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use xxhash_rust::xxh3::{xxh3_128, Xxh3};

const HASH_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    #[default]
    #[serde(rename = "xxh3-128")]
    Xxh3_128,
    Blake3,
}

impl HashAlgorithm {
    /// Digest size in bytes (H on the wire).
    pub fn digest_len(self) -> usize {
        match self {
            HashAlgorithm::Xxh3_128 => 16,
            HashAlgorithm::Blake3 => 32,
        }
    }

    pub fn digest(self, data: &[u8]) -> Digest {
        match self {
            HashAlgorithm::Xxh3_128 => Digest(xxh3_128(data).to_be_bytes().to_vec()),
            HashAlgorithm::Blake3 => Digest(blake3::hash(data).as_bytes().to_vec()),
        }
    }

    /// Hash a whole file, streaming. Blocking; call from `spawn_blocking`.
    pub fn digest_file(self, path: &Path) -> io::Result<Digest> {
        let mut file = File::open(path)?;
        self.digest_reader(&mut file)
    }

    pub fn digest_reader<R: Read>(self, reader: &mut R) -> io::Result<Digest> {
        let mut buf = vec![0u8; HASH_BUF_SIZE];
        match self {
            HashAlgorithm::Xxh3_128 => {
                let mut hasher = Xxh3::new();
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(Digest(hasher.digest128().to_be_bytes().to_vec()))
            }
            HashAlgorithm::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(Digest(hasher.finalize().as_bytes().to_vec()))
            }
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashAlgorithm::Xxh3_128 => f.write_str("xxh3-128"),
            HashAlgorithm::Blake3 => f.write_str("blake3"),
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xxh3-128" | "xxh3" => Ok(HashAlgorithm::Xxh3_128),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(format!("unknown hash algorithm '{}' (expected xxh3-128 or blake3)", other)),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Digest(Vec<u8>);

impl Digest {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex, used as the cache entry file name.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}
