use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::collections::BTreeMap;
use url::Url;

type HmacSha512 = Hmac<Sha512>;

/// Digest field appended to outbound requests and stripped from inbound
/// returns before re-deriving.
pub const SECURE_HASH_FIELD: &str = "vnp_SecureHash";
pub const SECURE_HASH_TYPE_FIELD: &str = "vnp_SecureHashType";

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("Signing secret must not be empty")]
    MissingSecret,

    #[error("Parameter set already contains reserved field {0}")]
    ReservedField(&'static str),

    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// Canonical signing string: keys in byte-wise ascending order (which is
/// what `BTreeMap` iteration gives for `String` keys), joined as
/// `k1=v1&k2=v2&...` with raw, non-URL-encoded values. Both parties must
/// derive this string byte-identically, so neither the ordering nor the
/// absence of encoding here may change.
fn canonical(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn mac(secret: &[u8]) -> Result<HmacSha512, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    HmacSha512::new_from_slice(secret).map_err(|_| SignatureError::MissingSecret)
}

/// HMAC-SHA512 over the canonical string, as a lowercase hex digest.
pub fn sign(secret: &[u8], params: &BTreeMap<String, String>) -> Result<String, SignatureError> {
    for reserved in [SECURE_HASH_FIELD, SECURE_HASH_TYPE_FIELD] {
        if params.contains_key(reserved) {
            return Err(SignatureError::ReservedField(reserved));
        }
    }
    let mut mac = mac(secret)?;
    mac.update(canonical(params).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Re-derives the digest over `params` (signature fields stripped) and
/// compares in constant time. Any mismatch, including malformed candidate
/// hex, is `Ok(false)`; only a missing secret is an error.
pub fn verify(
    secret: &[u8],
    params: &BTreeMap<String, String>,
    candidate_digest: &str,
) -> Result<bool, SignatureError> {
    let mut cleaned = params.clone();
    cleaned.remove(SECURE_HASH_FIELD);
    cleaned.remove(SECURE_HASH_TYPE_FIELD);

    let candidate = match hex::decode(candidate_digest) {
        Ok(bytes) => bytes,
        Err(_) => return Ok(false),
    };

    let mut mac = mac(secret)?;
    mac.update(canonical(&cleaned).as_bytes());
    // verify_slice is constant-time; never compare digests with ==.
    Ok(mac.verify_slice(&candidate).is_ok())
}

/// Signs the raw parameters, then builds the redirect URL with every pair
/// URL-encoded and the digest appended last. The encoding here is for the
/// URL only and never feeds back into the signing string.
pub fn build_redirect_url(
    base_url: &str,
    params: &BTreeMap<String, String>,
    secret: &[u8],
) -> Result<String, SignatureError> {
    let digest = sign(secret, params)?;

    let mut url =
        Url::parse(base_url).map_err(|err| SignatureError::InvalidBaseUrl(err.to_string()))?;
    {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key, value);
        }
        pairs.append_pair(SECURE_HASH_FIELD, &digest);
    }
    Ok(url.into())
}
