use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verifies a WhatsApp `X-Hub-Signature-256` header, formatted as
/// `sha256=<hex digest>` over the raw request body.
pub fn verify_whatsapp(app_secret: &str, body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix("sha256=") else {
        return false;
    };
    verify_hex_hmac(app_secret, body, hex_digest)
}

/// Verifies a Razorpay `X-Razorpay-Signature` header, a bare hex HMAC over
/// the raw request body.
pub fn verify_razorpay(webhook_secret: &str, body: &[u8], header: &str) -> bool {
    verify_hex_hmac(webhook_secret, body, header)
}

fn verify_hex_hmac(secret: &str, body: &[u8], hex_digest: &str) -> bool {
    let Ok(expected) = hex::decode(hex_digest.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    // verify_slice is constant-time.
    mac.verify_slice(&expected).is_ok()
}
