use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-provider-signature";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("webhook signature is required")]
    Missing,
    #[error("webhook signature is not hex-encoded")]
    Malformed,
    #[error("webhook signature does not match the request body")]
    Mismatch,
}

/// Hex HMAC-SHA256 of `body` under `secret`, as a provider would send it.
#[cfg(test)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = mac(secret);
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a `sha256=<hex>` or bare `<hex>` header value.
pub fn verify(secret: &str, body: &[u8], header: &str) -> Result<(), SignatureError> {
    let header = header.trim();
    let hex_digest = header.strip_prefix("sha256=").unwrap_or(header);
    let expected = hex::decode(hex_digest).map_err(|_| SignatureError::Malformed)?;
    let mut mac = mac(secret);
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Apply the webhook policy: nothing is checked without a secret; an absent
/// header is tolerated unless `require` is set.
pub fn check(
    secret: Option<&str>,
    require: bool,
    header: Option<&str>,
    body: &[u8],
) -> Result<(), SignatureError> {
    match (secret, header) {
        (None, _) => Ok(()),
        (Some(secret), Some(header)) => verify(secret, body, header),
        (Some(_), None) if require => Err(SignatureError::Missing),
        (Some(_), None) => Ok(()),
    }
}

fn mac(secret: &str) -> HmacSha256 {
    <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"))
}
