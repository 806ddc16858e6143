//! Credential verification for the agent.
//!
//! Keys look like `rbk_<43 url-safe chars>`. Only a SHA-256 hash and a short
//! lookup prefix are stored; the raw key is shown once, at generation.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BridgeError, Result};

/// Leading marker of every generated key.
pub const KEY_MARKER: &str = "rbk_";

/// Characters of the key kept in clear for lookup.
pub const PREFIX_LEN: usize = 8;

/// HTTP header carrying the credential.
pub const KEY_HEADER: &str = "X-Agent-Key";

/// A stored credential, as written in `[[credentials]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// First characters of the raw key.
    pub prefix: String,

    /// Hex SHA-256 of the full raw key.
    pub hash: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub revoked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    /// Builds the record for a raw key.
    pub fn for_key(raw_key: &str, name: Option<String>) -> Self {
        Self {
            prefix: key_prefix(raw_key),
            hash: sha256_hex(raw_key),
            name,
            revoked: false,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// The identity a verified request runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub prefix: String,
    pub name: Option<String>,
}

impl Credential {
    /// Name for logs; never the key itself.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.prefix)
    }
}

/// Source of accepted credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Verifies a presented key, returning the identity it belongs to.
    async fn verify(&self, presented: &str) -> Result<Credential>;
}

/// Credentials loaded from configuration at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    records: Vec<CredentialRecord>,
}

impl StaticCredentialStore {
    pub fn new(records: Vec<CredentialRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn verify_at(&self, presented: &str, now: DateTime<Utc>) -> Result<Credential> {
        if presented.is_empty() {
            return Err(BridgeError::auth(format!(
                "Missing API key. Provide {KEY_HEADER} header."
            )));
        }

        let prefix = key_prefix(presented);
        let hash = sha256_hex(presented);
        let record = self
            .records
            .iter()
            .filter(|r| r.prefix == prefix)
            .find(|r| constant_time_eq(&r.hash, &hash))
            .ok_or_else(|| BridgeError::auth("Invalid API key"))?;

        if record.revoked {
            return Err(BridgeError::auth("API key has been revoked"));
        }
        if record.is_expired(now) {
            return Err(BridgeError::auth("API key has expired"));
        }

        Ok(Credential {
            prefix: record.prefix.clone(),
            name: record.name.clone(),
        })
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn verify(&self, presented: &str) -> Result<Credential> {
        self.verify_at(presented, Utc::now())
    }
}

/// A freshly generated key and the record to store for it.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    pub key: String,
    pub record: CredentialRecord,
}

impl GeneratedKey {
    /// The record as a `[[credentials]]` TOML block.
    pub fn to_toml(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Snippet<'a> {
            credentials: Vec<&'a CredentialRecord>,
        }
        toml::to_string(&Snippet {
            credentials: vec![&self.record],
        })
        .map_err(|e| BridgeError::internal(format!("Failed to render credential: {e}")))
    }
}

/// Generates a new random key.
pub fn generate_key(name: Option<String>) -> GeneratedKey {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let key = format!("{KEY_MARKER}{}", URL_SAFE_NO_PAD.encode(bytes));
    let record = CredentialRecord::for_key(&key, name);
    GeneratedKey { key, record }
}

fn key_prefix(key: &str) -> String {
    key.chars().take(PREFIX_LEN).collect()
}

/// Hex-encoded SHA-256.
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    format!("{:x}", digest)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        diff |= x ^ y;
    }
    diff == 0
}
