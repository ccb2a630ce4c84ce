//! Base-62 encoding of byte strings interpreted as big-endian integers.
//!
//! Leading zero bytes carry no value and are not preserved; the zero value
//! encodes to `"0"` and decodes back to a single zero byte.

use crate::error::{Error, Result};

/// Symbol table: digits, then lowercase, then uppercase.
pub const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

const BASE: u32 = 62;

fn symbol_value(symbol: char) -> Option<u32> {
    match symbol {
        '0'..='9' => Some(symbol as u32 - '0' as u32),
        'a'..='z' => Some(symbol as u32 - 'a' as u32 + 10),
        'A'..='Z' => Some(symbol as u32 - 'A' as u32 + 36),
        _ => None,
    }
}

/// Encode bytes as a base-62 string without padding.
///
/// # Examples
///
/// ```
/// use streamgate_codec::base62_encode;
///
/// assert_eq!(base62_encode(&[0, 0]), "0");
/// assert_eq!(base62_encode(&[61]), "Z");
/// assert_eq!(base62_encode(&[62]), "10");
/// ```
pub fn base62_encode(data: &[u8]) -> String {
    let mut number: Vec<u8> = data.iter().skip_while(|b| **b == 0).copied().collect();
    if number.is_empty() {
        return "0".to_string();
    }

    // Long division of the big-endian number by 62, collecting remainders.
    let mut symbols = Vec::with_capacity(number.len() * 2);
    while !number.is_empty() {
        let mut remainder = 0u32;
        let mut quotient = Vec::with_capacity(number.len());
        for &byte in &number {
            let acc = (remainder << 8) | u32::from(byte);
            let digit = acc / BASE;
            remainder = acc % BASE;
            if !quotient.is_empty() || digit != 0 {
                quotient.push(digit as u8);
            }
        }
        symbols.push(ALPHABET[remainder as usize]);
        number = quotient;
    }

    symbols.iter().rev().map(|&b| b as char).collect()
}

/// Decode a base-62 string back to its minimal big-endian byte form.
///
/// # Examples
///
/// ```
/// use streamgate_codec::base62_decode;
///
/// assert_eq!(base62_decode("10").unwrap(), vec![62]);
/// assert_eq!(base62_decode("0").unwrap(), vec![0]);
/// assert!(base62_decode("a-b").is_err());
/// ```
pub fn base62_decode(encoded: &str) -> Result<Vec<u8>> {
    let mut number: Vec<u8> = Vec::with_capacity(encoded.len());

    for (position, symbol) in encoded.chars().enumerate() {
        let mut carry =
            symbol_value(symbol).ok_or(Error::InvalidSymbol { symbol, position })?;

        for byte in number.iter_mut().rev() {
            let acc = u32::from(*byte) * BASE + carry;
            *byte = (acc & 0xff) as u8;
            carry = acc >> 8;
        }
        while carry > 0 {
            number.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    if number.is_empty() {
        number.push(0);
    }
    Ok(number)
}
