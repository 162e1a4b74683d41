//! Client opening handshake (RFC 6455 section 4.1)

pub mod client;
pub mod headers;
pub mod machine;

use base64::Engine;
use sha1::{Digest, Sha1};

/// Derives the `Sec-WebSocket-Accept` value the server must answer for `key`.
pub fn derive_accept_key(key: &[u8]) -> String {
    const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

    let mut hasher = Sha1::default();
    hasher.update(key);
    hasher.update(WS_GUID);

    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// Generates a random `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
pub fn generate_key() -> String {
    let r: [u8; 16] = rand::random();
    base64::engine::general_purpose::STANDARD.encode(r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc_sample() {
        assert_eq!(derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn generated_keys_are_sixteen_bytes() {
        let key = generate_key();
        assert_eq!(key.len(), 24);

        let decoded = base64::engine::general_purpose::STANDARD.decode(&key).unwrap_or_default();
        assert_eq!(decoded.len(), 16);
        assert_ne!(key, generate_key());
    }
}
