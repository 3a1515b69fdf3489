//! RFC 4648 Base32 decoding for stored secrets.
//!
//! Stored secrets are plain uppercase Base32 text. Decoding is lenient about
//! case, padding, and whitespace, and strict about everything else.

use thiserror::Error;

/// The RFC 4648 Base32 alphabet
pub const ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Base32 decoding failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Base32Error {
    /// A character outside the alphabet, padding, or whitespace
    #[error("invalid base32 symbol {symbol:?} at position {position}")]
    InvalidSymbol { symbol: char, position: usize },
}

/// Decode Base32 text into raw bytes.
///
/// `=` and whitespace are skipped. Bits left over after the last full byte
/// are dropped.
pub fn decode(input: &str) -> Result<Vec<u8>, Base32Error> {
    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for (position, symbol) in input.chars().enumerate() {
        if symbol == '=' || symbol.is_whitespace() {
            continue;
        }

        let value = symbol_value(symbol).ok_or(Base32Error::InvalidSymbol { symbol, position })?;

        buffer = (buffer << 5) | u32::from(value);
        bits += 5;

        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            // Keep only the bits not yet emitted
            buffer &= (1 << bits) - 1;
        }
    }

    Ok(out)
}

fn symbol_value(symbol: char) -> Option<u8> {
    match symbol.to_ascii_uppercase() {
        c @ 'A'..='Z' => Some(c as u8 - b'A'),
        c @ '2'..='7' => Some(c as u8 - b'2' + 26),
        _ => None,
    }
}
