//! Audio payload framing.
//!
//! Both peers speak 8 kHz mu-law, so audio passes through untouched. The
//! only transformation is base64: the telephony side wraps audio in JSON
//! envelopes, the agent side wants raw binary frames.

use base64::Engine;
use bytes::Bytes;

/// Encodes raw audio bytes into a telephony `media` payload.
pub fn encode_payload(audio: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(audio)
}

/// Decodes a telephony `media` payload into raw audio bytes.
pub fn decode_payload(payload: &str) -> Result<Bytes, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map(Bytes::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let audio: Vec<u8> = (0..=255).collect();
        let payload = encode_payload(&audio);
        assert_eq!(decode_payload(&payload).unwrap(), Bytes::from(audio));
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(encode_payload(&[]), "");
        assert!(decode_payload("").unwrap().is_empty());
    }

    #[test]
    fn test_mu_law_bytes_survive() {
        // Mu-law silence is 0xFF, well outside ASCII.
        let frame = vec![0xFFu8; 160];
        let payload = encode_payload(&frame);
        assert_eq!(decode_payload(&payload).unwrap(), Bytes::from(frame));
    }

    #[test]
    fn test_invalid_payload_is_error() {
        assert!(decode_payload("not base64!").is_err());
    }
}
