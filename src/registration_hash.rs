//! Registration hash: a keyed digest binding an issued entitlement to a machine.
//!
//! The hash is `Base64(SHA1(UTF16LE(canonical || secret)))` where `canonical`
//! is `machineCode|expirationDate|maintExpirationDate|maxProductVersion`
//! followed by `|Name=Value` for every merged feature in ascending name order.
//! The secret is appended without a separator and never leaves the server
//! (or the legitimate offline client that re-derives the hash).

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};

/// Inputs the hash covers. Feature order of the source collection is irrelevant.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationData<'a> {
    pub machine_code: &'a str,
    pub expiration_date: &'a str,
    pub maint_expiration_date: &'a str,
    pub max_product_version: &'a str,
    pub features: &'a BTreeMap<String, String>,
}

impl RegistrationData<'_> {
    pub fn canonical_string(&self) -> String {
        build_registration_string(
            self.machine_code,
            self.expiration_date,
            self.maint_expiration_date,
            self.max_product_version,
            self.features.iter(),
        )
    }

    pub fn hash(&self, secret: &str) -> String {
        compute_registration_hash(&self.canonical_string(), secret)
    }
}

/// Build the pipe-delimited canonical string.
///
/// Features are sorted by name here, so any iterator order is accepted.
pub fn build_registration_string<I, K, V>(
    machine_code: &str,
    expiration_date: &str,
    maint_expiration_date: &str,
    max_product_version: &str,
    features: I,
) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut sorted: Vec<(K, V)> = features.into_iter().collect();
    sorted.sort_by(|a, b| a.0.as_ref().cmp(b.0.as_ref()));

    let mut out = String::with_capacity(64 + sorted.len() * 16);
    out.push_str(machine_code);
    out.push('|');
    out.push_str(expiration_date);
    out.push('|');
    out.push_str(maint_expiration_date);
    out.push('|');
    out.push_str(max_product_version);

    for (name, value) in &sorted {
        out.push('|');
        out.push_str(name.as_ref());
        out.push('=');
        out.push_str(value.as_ref());
    }

    out
}

/// UTF-16 little-endian code units, no BOM. Supplementary-plane characters
/// become surrogate pairs.
pub fn encode_utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// Digest the canonical string with the shared secret appended.
pub fn compute_registration_hash(registration_string: &str, secret: &str) -> String {
    let mut combined = String::with_capacity(registration_string.len() + secret.len());
    combined.push_str(registration_string);
    combined.push_str(secret);

    let digest = Sha1::digest(encode_utf16le(&combined));
    STANDARD.encode(digest)
}

/// Constant-time comparison of two hash strings.
pub fn hashes_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
