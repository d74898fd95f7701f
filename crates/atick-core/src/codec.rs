//! aTick protocol codec.
//!
//! Pure functions that classify and decode advertisement payloads and GATT
//! characteristic buffers. Nothing in here touches a connection.
//!
//! # Advertisement layout
//!
//! Manufacturer-specific data, manufacturer ID ignored:
//!
//! | Bytes | Content |
//! |-------|---------|
//! | 0 | Header |
//! | 1-4 | Counter A, f32 LE (possibly obfuscated) |
//! | 5-8 | Counter B, f32 LE (possibly obfuscated) |
//!
//! Bit `0x10` of byte 7 marks an obfuscated payload. Obfuscated bytes are
//! XORed with a single keystream byte derived from the device MAC address and
//! PIN, and each 4-byte half is stored in mid-little-endian order
//! (`[2, 3, 0, 1]`).

use std::collections::HashMap;

use bytes::Buf;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use atick_types::{ParseError, ParseResult};

pub use atick_types::round_half_away;

use crate::error::{Error, Result};

/// Minimum payload length carrying the encryption flag byte.
pub const FLAG_PAYLOAD_LEN: usize = 8;

/// Minimum payload length carrying both counters.
pub const COUNTERS_PAYLOAD_LEN: usize = 9;

/// Length of a GATT float-pair buffer.
pub const FLOAT_PAIR_LEN: usize = 8;

/// Decimal places kept for decoded counter values.
pub const DECODE_PRECISION: i32 = 2;

const FLAG_BYTE: usize = 7;
const ENCRYPTION_FLAG: u8 = 0x10;

/// Counter values decoded from one advertisement.
///
/// Both fields are set whenever a payload was present, even when decoding
/// fell back to zeros.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ParsedAdvertisement {
    /// Counter A in raw device units.
    pub counter_a: Option<f64>,
    /// Counter B in raw device units.
    pub counter_b: Option<f64>,
}

impl From<(f64, f64)> for ParsedAdvertisement {
    fn from((a, b): (f64, f64)) -> Self {
        Self {
            counter_a: Some(a),
            counter_b: Some(b),
        }
    }
}

/// Check whether an advertisement payload is obfuscated.
///
/// Payloads shorter than 8 bytes cannot carry the flag and are reported as
/// plain.
pub fn is_encrypted(data: &[u8]) -> bool {
    if data.len() < FLAG_PAYLOAD_LEN {
        debug!("Data too short to check encryption: {} bytes", data.len());
        return false;
    }
    data[FLAG_BYTE] & ENCRYPTION_FLAG != 0
}

/// Truncate toward zero to `places` decimals.
///
/// ```
/// use atick_core::codec::truncate;
///
/// assert_eq!(truncate(123.456789, 2), 123.45);
/// assert_eq!(truncate(0.999, 2), 0.99);
/// ```
pub fn truncate(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).trunc() / factor
}

/// Reorder one 4-byte half from mid-little-endian into little-endian.
pub fn mid_little_endian(half: [u8; 4]) -> [u8; 4] {
    [half[2], half[3], half[0], half[1]]
}

/// Hex-string form of [`mid_little_endian`].
///
/// ```
/// use atick_core::codec::mid_little_endian_hex;
///
/// assert_eq!(mid_little_endian_hex("00112233").unwrap(), "22330011");
/// ```
pub fn mid_little_endian_hex(value: &str) -> Result<String> {
    let bytes = parse_hex_payload(value)?;
    let half: [u8; 4] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| Error::InvalidHexPayload(value.to_string()))?;
    Ok(to_hex(&mid_little_endian(half)))
}

/// Parse a `XX:XX:XX:XX:XX:XX` MAC address into its six octets.
pub fn parse_mac(mac: &str) -> ParseResult<[u8; 6]> {
    let invalid = || ParseError::InvalidMac(mac.to_string());
    let mut octets = [0u8; 6];
    let mut parts = mac.split(':');
    for octet in &mut octets {
        let part = parts.next().ok_or_else(invalid)?;
        if part.len() != 2 {
            return Err(invalid());
        }
        *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
    }
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(octets)
}

/// Parse a decimal PIN.
pub fn parse_pin(pin: &str) -> ParseResult<u64> {
    let trimmed = pin.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidPin(pin.to_string()));
    }
    trimmed
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidPin(pin.to_string()))
}

/// Derive the keystream byte for a device.
///
/// The seed is the sum of the six MAC octets and the four low bytes of the
/// PIN; the key is its two's complement modulo 256.
pub fn keystream_byte(mac: &[u8; 6], pin: u64) -> u8 {
    let mac_sum: u32 = mac.iter().map(|&b| u32::from(b)).sum();
    let pin_sum: u32 = (0..4).map(|k| ((pin >> (8 * k)) & 0xFF) as u32).sum();
    let seed = mac_sum + pin_sum;
    ((seed ^ 0xFF).wrapping_add(1) & 0xFF) as u8
}

/// Decode counter values from an advertisement payload.
///
/// Never fails: an absent or short payload, or one that cannot be decoded,
/// yields `(0.0, 0.0)` so that a single bad frame cannot disturb the caller.
pub fn decode_advertisement(data: Option<&[u8]>, pin: &str, mac: &str) -> (f64, f64) {
    let data = match data {
        Some(data) if data.len() >= COUNTERS_PAYLOAD_LEN => data,
        other => {
            debug!(
                "Advertisement data too short: {} bytes",
                other.map_or(0, <[u8]>::len)
            );
            return (0.0, 0.0);
        }
    };

    match try_decode_advertisement(data, pin, mac) {
        Ok(values) => values,
        Err(err) => {
            warn!("Failed to parse counter values: {}", err);
            (0.0, 0.0)
        }
    }
}

/// Decode counter values, reporting why a payload could not be decoded.
pub fn try_decode_advertisement(data: &[u8], pin: &str, mac: &str) -> Result<(f64, f64)> {
    let body: [u8; 8] = data
        .get(1..COUNTERS_PAYLOAD_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            Error::MalformedAdvertisement(format!(
                "expected {} bytes, got {}",
                COUNTERS_PAYLOAD_LEN,
                data.len()
            ))
        })?;

    let ordered = if is_encrypted(data) {
        let mac = parse_mac(mac).map_err(|e| Error::MalformedAdvertisement(e.to_string()))?;
        let pin = parse_pin(pin).map_err(|e| Error::MalformedAdvertisement(e.to_string()))?;
        let key = keystream_byte(&mac, pin);
        let decrypted = body.map(|b| b ^ key);

        let mut ordered = [0u8; 8];
        for (dst, src) in ordered.chunks_exact_mut(4).zip(decrypted.chunks_exact(4)) {
            let half = [src[0], src[1], src[2], src[3]];
            dst.copy_from_slice(&mid_little_endian(half));
        }
        ordered
    } else {
        body
    };

    read_float_pair(&ordered).ok_or_else(|| {
        Error::MalformedAdvertisement(format!("non-finite counter value in {}", to_hex(&ordered)))
    })
}

/// Decode a GATT float-pair buffer (counter values or counter ratios).
///
/// Returns `None` for buffers shorter than 8 bytes or holding non-finite
/// values.
pub fn decode_float_pair(buffer: &[u8]) -> Option<(f64, f64)> {
    if buffer.len() < FLOAT_PAIR_LEN {
        debug!("Float pair buffer too short: {} bytes", buffer.len());
        return None;
    }
    read_float_pair(&buffer[..FLOAT_PAIR_LEN])
}

/// Decimal places kept for ratios decoded from the device.
pub const RATIO_PRECISION: i32 = 6;

/// Decode a counters-ratio buffer.
///
/// Ratios are small (typically `0.01`), so instead of truncating to two
/// decimals the f32 widening error is rounded away.
pub fn decode_ratio_pair(buffer: &[u8]) -> Option<(f64, f64)> {
    if buffer.len() < FLOAT_PAIR_LEN {
        debug!("Ratio buffer too short: {} bytes", buffer.len());
        return None;
    }
    let mut buf = &buffer[..FLOAT_PAIR_LEN];
    let a = f64::from(buf.get_f32_le());
    let b = f64::from(buf.get_f32_le());
    if !a.is_finite() || !b.is_finite() {
        return None;
    }
    Some((
        round_half_away(a, RATIO_PRECISION),
        round_half_away(b, RATIO_PRECISION),
    ))
}

fn read_float_pair(mut buf: &[u8]) -> Option<(f64, f64)> {
    let a = f64::from(buf.get_f32_le());
    let b = f64::from(buf.get_f32_le());
    if !a.is_finite() || !b.is_finite() {
        return None;
    }
    Some((truncate(a, DECODE_PRECISION), truncate(b, DECODE_PRECISION)))
}

/// Decode a string characteristic.
///
/// Trailing NUL padding is dropped and invalid UTF-8 is replaced.
pub fn decode_string(data: &[u8]) -> String {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Convert a hex string (whitespace between bytes allowed) into raw bytes.
pub fn parse_hex_payload(data: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = data.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(Error::InvalidHexPayload(data.to_string()));
    }
    digits
        .chunks_exact(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| Error::InvalidHexPayload(data.to_string()))
        })
        .collect()
}

/// Lowercase hex rendering of a byte slice.
pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Pick the payload from manufacturer data kept in arrival order.
///
/// Devices only ever send one entry; should several be present the last one
/// inserted wins.
pub fn select_manufacturer_payload(entries: &[(u16, Vec<u8>)]) -> Option<&[u8]> {
    entries.last().map(|(_, data)| data.as_slice())
}

/// Pick the payload from an unordered manufacturer data map.
///
/// Maps carry no insertion order, so the highest manufacturer ID wins.
pub fn select_manufacturer_payload_from_map(entries: &HashMap<u16, Vec<u8>>) -> Option<&[u8]> {
    entries
        .iter()
        .max_by_key(|(id, _)| **id)
        .map(|(_, data)| data.as_slice())
}


/// Property-based tests for the codec.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Decoding arbitrary bytes never panics.
        #[test]
        fn decode_never_panics(data: Vec<u8>, pin in "[0-9]{0,10}", mac in "[0-9A-F:]{0,17}") {
            let _ = decode_advertisement(Some(&data), &pin, &mac);
        }

        /// Anything shorter than nine bytes decodes to zeros.
        #[test]
        fn short_payload_decodes_to_zero(data in proptest::collection::vec(any::<u8>(), 0..9)) {
            let decoded = decode_advertisement(Some(&data), "123456", "AA:BB:CC:DD:EE:FF");
            prop_assert_eq!(decoded, (0.0, 0.0));
        }

        /// The encryption flag is exactly bit 0x10 of byte 7.
        #[test]
        fn encryption_flag_tracks_bit_four(data in proptest::collection::vec(any::<u8>(), 0..32)) {
            let expected = data.len() >= 8 && data[7] & 0x10 != 0;
            prop_assert_eq!(is_encrypted(&data), expected);
        }

        /// Decoded values are finite and carry at most two decimals.
        #[test]
        fn decoded_values_are_truncated(data in proptest::collection::vec(any::<u8>(), 9..16)) {
            let (a, b) = decode_advertisement(Some(&data), "123456", "AA:BB:CC:DD:EE:FF");
            for value in [a, b] {
                prop_assert!(value.is_finite());
                let scaled = value * 100.0;
                prop_assert!((scaled - scaled.round()).abs() <= 1e-6 * scaled.abs().max(1.0));
            }
        }
    }
}
