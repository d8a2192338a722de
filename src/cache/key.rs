//! Request fingerprinting.
//!
//! A [`CacheKey`] has the shape
//! `gen:{provider}:{model}:{hash(prompt)}:{hash(canonical(parameters))}`.
//! Hashes are truncated SHA-256 hex digests; the key identifies cache
//! entries, it does not authenticate anything. `%` and `:` inside the
//! provider and model names are percent-escaped so the segments stay
//! unambiguous.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{GenerationRequest, ParamValue};

/// Number of hex characters kept from each digest.
pub const HASH_LEN: usize = 16;

/// Opaque fingerprint of a [`GenerationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Fingerprint a request.
    pub fn for_request(request: &GenerationRequest) -> Self {
        Self::fingerprint(
            &request.provider,
            &request.model,
            &request.prompt,
            &request.parameters,
        )
    }

    /// Fingerprint the individual request fields.
    ///
    /// Parameters are canonicalised first (sorted by name, values rendered
    /// through their stable string form), so two maps with the same
    /// contents always produce the same key whatever their insertion order.
    pub fn fingerprint(
        provider: &str,
        model: &str,
        prompt: &str,
        parameters: &HashMap<String, ParamValue>,
    ) -> Self {
        let prompt_hash = digest(|h| h.update(prompt.as_bytes()));
        let params_hash = digest(|h| canonicalize(parameters, h));
        let provider = escape_segment(provider);
        let model = escape_segment(model);
        Self(format!("gen:{provider}:{model}:{prompt_hash}:{params_hash}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

fn escape_segment(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['%', ':']) {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len() + 4);
    for c in raw.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Feed parameters into the hasher in name order.
///
/// Every name and value is length-prefixed so that no concatenation of
/// different pairs can produce the same byte stream.
fn canonicalize(parameters: &HashMap<String, ParamValue>, hasher: &mut Sha256) {
    let mut entries: Vec<(&String, String)> = parameters
        .iter()
        .map(|(name, value)| (name, value.to_string()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (name, value) in entries {
        hasher.update((name.len() as u64).to_be_bytes());
        hasher.update(name.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }
}

fn digest(feed: impl FnOnce(&mut Sha256)) -> String {
    let mut hasher = Sha256::new();
    feed(&mut hasher);
    let mut hex = hex::encode(hasher.finalize());
    hex.truncate(HASH_LEN);
    hex
}
