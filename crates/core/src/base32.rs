//! Nix-flavoured base32 encoding.
//!
//! Nix prints hashes with its own 32-symbol alphabet (no `e`, `o`, `t`, `u`)
//! and emits the most significant 5-bit group first. There is no padding.
//! Only the encoding direction is needed by the cache protocol.

/// The 32-symbol Nix alphabet.
pub const ALPHABET: &[u8; 32] = b"0123456789abcdfghijklmnpqrsvwxyz";

/// Number of base32 characters produced for `len` input bytes.
pub fn encoded_len(len: usize) -> usize {
    (len * 8).div_ceil(5)
}

/// Encode raw bytes into Nix base32.
pub fn encode(bytes: &[u8]) -> String {
    let len = encoded_len(bytes.len());
    let mut out = String::with_capacity(len);

    for n in (0..len).rev() {
        let bit = n * 5;
        let i = bit / 8;
        let j = bit % 8;
        // A group may straddle two bytes: low bits of `i`, high bits of `i + 1`.
        let low = bytes[i] >> j;
        let high = match bytes.get(i + 1) {
            Some(next) => (u16::from(*next) << (8 - j)) as u8,
            None => 0,
        };
        out.push(ALPHABET[usize::from((low | high) & 0x1f)] as char);
    }

    out
}

/// Encode a hex digest (e.g. a SHA-256 hex string) into Nix base32.
pub fn encode_hex(hex: &str) -> crate::Result<String> {
    Ok(encode(&decode_hex(hex)?))
}

/// Decode a lowercase or uppercase hex string.
pub(crate) fn decode_hex(hex: &str) -> crate::Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(crate::Error::InvalidHash(format!(
            "odd number of hex chars: {}",
            hex.len()
        )));
    }
    hex.as_bytes()
        .chunks(2)
        .map(|pair| {
            let digits =
                std::str::from_utf8(pair).map_err(|e| crate::Error::InvalidHash(e.to_string()))?;
            u8::from_str_radix(digits, 16).map_err(|e| crate::Error::InvalidHash(e.to_string()))
        })
        .collect()
}
