use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Length of both the namespace and the per-process suffix.
pub const TOKEN_LEN: usize = 6;

/// URL-safe alphabet. 64 symbols so a byte masked with `0x3f` maps uniformly.
const ALPHABET: &[u8; 64] = b"_-0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// First symbol of a namespace. pm2 reads a name that starts with `-` as flags.
const LEAD_ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("system entropy source unavailable: {0}")]
    Entropy(#[from] rand::Error),
}

/// Random token minted once per server instance. Every process this instance
/// starts is named `<namespace>-<token>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(Arc<str>);

impl Namespace {
    pub fn generate() -> Result<Self, NamespaceError> {
        let bytes = entropy()?;
        let lead = LEAD_ALPHABET[bytes[0] as usize % LEAD_ALPHABET.len()] as char;
        let token: String = std::iter::once(lead).chain(encode(&bytes[1..])).collect();
        Ok(Self(token.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fresh, unique process name under this namespace.
    pub fn process_name(&self) -> Result<String, NamespaceError> {
        Ok(format!("{}-{}", self.0, token()?))
    }

    /// True if `name` was minted under this namespace.
    pub fn owns(&self, name: &str) -> bool {
        has_namespace_prefix(&self.0, name)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

/// `name` starts with `<namespace>-`.
pub fn has_namespace_prefix(namespace: &str, name: &str) -> bool {
    name.strip_prefix(namespace)
        .is_some_and(|rest| rest.starts_with('-'))
}

fn token() -> Result<String, NamespaceError> {
    Ok(encode(&entropy()?).collect())
}

fn entropy() -> Result<[u8; TOKEN_LEN], NamespaceError> {
    let mut bytes = [0u8; TOKEN_LEN];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(bytes)
}

fn encode(bytes: &[u8]) -> impl Iterator<Item = char> + '_ {
    bytes.iter().map(|b| ALPHABET[(b & 0x3f) as usize] as char)
}
