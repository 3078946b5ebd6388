//! Small helpers shared across the engine
//!
//! Call data validation and hex parsing for loosely-typed RPC payloads.

use alloy::primitives::{Bytes, B256, U256};
use tracing::warn;

use crate::errors::CallDataError;

/// Hard ceiling on hex-encoded call data length, in characters
pub const MAX_CALL_DATA_LEN: usize = 262_144;

/// Payloads above this many characters are accepted but flagged
pub const LARGE_CALL_DATA_LEN: usize = 4_000;

/// Validates request call data and decodes it to bytes
///
/// Accepts `None`, `""` and `"0x"` as empty. Anything else must be `0x`
/// followed by an even number of hex digits, below [`MAX_CALL_DATA_LEN`].
/// Unusually large (but valid) payloads are logged, not rejected.
pub fn validate_call_data(data: Option<&str>) -> Result<Bytes, CallDataError> {
    let raw = match data {
        None | Some("") | Some("0x") => return Ok(Bytes::new()),
        Some(raw) => raw,
    };

    if !raw.starts_with("0x") {
        return Err(CallDataError::MissingPrefix);
    }
    if raw.len() > MAX_CALL_DATA_LEN {
        return Err(CallDataError::TooLarge {
            len: raw.len(),
            max: MAX_CALL_DATA_LEN,
        });
    }
    let digits = &raw[2..];
    if digits.len() % 2 != 0 {
        return Err(CallDataError::OddLength { len: raw.len() });
    }
    if let Some(offset) = digits.bytes().position(|b| !b.is_ascii_hexdigit()) {
        return Err(CallDataError::InvalidHex { offset: offset + 2 });
    }
    if raw.len() > LARGE_CALL_DATA_LEN {
        warn!(len = raw.len(), "unusually large call data payload");
    }

    let mut bytes = Vec::with_capacity(digits.len() / 2);
    for i in (0..digits.len()).step_by(2) {
        // both digits already validated above
        let byte = u8::from_str_radix(&digits[i..i + 2], 16)
            .map_err(|_| CallDataError::InvalidHex { offset: i + 2 })?;
        bytes.push(byte);
    }
    Ok(bytes.into())
}

/// Parses a `0x`-prefixed quantity string into a [`U256`]
///
/// Tolerant of missing prefixes and empty strings; `None` on garbage.
pub fn parse_quantity(raw: &str) -> Option<U256> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).ok()
}

/// Parses a hex string into a left-padded 32-byte word
///
/// Storage slots and values arrive in inconsistent widths; short values
/// are right-aligned the way the EVM stores them.
pub fn parse_word(raw: &str) -> Option<B256> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.len() > 64 || digits.len() % 2 != 0 {
        return None;
    }
    // slot strings come from an untrusted report; hex::decode rejects
    // anything outside the hex alphabet, non-ASCII included
    let decoded = alloy::primitives::hex::decode(digits).ok()?;
    let mut bytes = [0u8; 32];
    bytes[32 - decoded.len()..].copy_from_slice(&decoded);
    Some(B256::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_variants_are_valid() {
        assert!(validate_call_data(None).unwrap().is_empty());
        assert!(validate_call_data(Some("")).unwrap().is_empty());
        assert!(validate_call_data(Some("0x")).unwrap().is_empty());
    }

    #[test]
    fn odd_length_rejected() {
        assert!(matches!(
            validate_call_data(Some("0xabc")),
            Err(CallDataError::OddLength { .. })
        ));
    }

    #[test]
    fn non_hex_rejected() {
        assert!(matches!(
            validate_call_data(Some("0xzz")),
            Err(CallDataError::InvalidHex { .. })
        ));
    }

    #[test]
    fn missing_prefix_rejected() {
        assert!(matches!(
            validate_call_data(Some("abcd")),
            Err(CallDataError::MissingPrefix)
        ));
    }

    #[test]
    fn large_payload_accepted() {
        let payload = format!("0x{}", "ab".repeat(2000));
        assert_eq!(payload.len(), 4002);
        let decoded = validate_call_data(Some(&payload)).unwrap();
        assert_eq!(decoded.len(), 2000);
    }

    #[test]
    fn over_ceiling_rejected() {
        let payload = format!("0x{}", "ab".repeat(MAX_CALL_DATA_LEN));
        assert!(matches!(
            validate_call_data(Some(&payload)),
            Err(CallDataError::TooLarge { .. })
        ));
    }

    #[test]
    fn decodes_valid_data() {
        let decoded = validate_call_data(Some("0xdeadBEEF")).unwrap();
        assert_eq!(decoded.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn parses_quantities_and_words() {
        assert_eq!(parse_quantity("0x64"), Some(U256::from(100)));
        assert_eq!(parse_quantity("0x"), Some(U256::ZERO));
        assert_eq!(parse_quantity("0xzz"), None);

        let word = parse_word("0x01").unwrap();
        assert_eq!(word.as_slice()[31], 1);
        assert!(parse_word("0x123").is_none());
    }

    #[test]
    fn non_ascii_words_rejected_without_panicking() {
        // multi-byte characters must not reach any byte-offset slicing
        assert!(parse_word("0x☃☃").is_none());
        assert!(parse_word("☃☃").is_none());
        assert!(parse_word("0xgg").is_none());
    }
}
