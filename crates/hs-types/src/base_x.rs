//! Arbitrary-alphabet base-x encoding.
//!
//! Works like base58: the input is treated as one big-endian unsigned
//! integer and re-expressed in the alphabet's radix. Leading zero bytes are
//! preserved as a run of the alphabet's zero symbol, so the encoding is a
//! bijection on byte strings.

use sha2::{Digest, Sha256};

use crate::error::TypeError;

const INVALID: u8 = 0xff;

/// Length of the checksum appended by [`BaseX::encode_check`].
pub const CHECKSUM_LEN: usize = 4;

/// Encoder/decoder over a fixed alphabet.
pub struct BaseX {
    alphabet: &'static [u8],
    index: [u8; 256],
}

pub const BASE2: BaseX = BaseX::new("01");
pub const BASE8: BaseX = BaseX::new("01234567");
pub const BASE11: BaseX = BaseX::new("0123456789a");
pub const BASE16: BaseX = BaseX::new("0123456789abcdef");
pub const BASE32: BaseX = BaseX::new("0123456789ABCDEFGHJKMNPQRSTVWXYZ");
/// Lowercase base-36, used for content addresses and shard names.
pub const BASE36: BaseX = BaseX::new("0123456789abcdefghijklmnopqrstuvwxyz");
pub const BASE58: BaseX =
    BaseX::new("123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz");
/// Mixed-case base-62, used for key strings.
pub const BASE62: BaseX =
    BaseX::new("0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ");
pub const BASE64: BaseX =
    BaseX::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/");
pub const BASE66: BaseX =
    BaseX::new("ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.!~");

impl BaseX {
    /// Build a codec for `alphabet`. Symbols must be distinct ASCII bytes.
    pub const fn new(alphabet: &'static str) -> Self {
        let alphabet = alphabet.as_bytes();
        assert!(alphabet.len() >= 2 && alphabet.len() < INVALID as usize);
        let mut index = [INVALID; 256];
        let mut i = 0;
        while i < alphabet.len() {
            assert!(alphabet[i].is_ascii());
            assert!(index[alphabet[i] as usize] == INVALID);
            index[alphabet[i] as usize] = i as u8;
            i += 1;
        }
        Self { alphabet, index }
    }

    /// Look up one of the predefined alphabets by radix.
    pub fn by_id(radix: usize) -> Option<&'static BaseX> {
        match radix {
            2 => Some(&BASE2),
            8 => Some(&BASE8),
            11 => Some(&BASE11),
            16 => Some(&BASE16),
            32 => Some(&BASE32),
            36 => Some(&BASE36),
            58 => Some(&BASE58),
            62 => Some(&BASE62),
            64 => Some(&BASE64),
            66 => Some(&BASE66),
            _ => None,
        }
    }

    /// Radix of this alphabet.
    pub fn radix(&self) -> usize {
        self.alphabet.len()
    }

    fn zero(&self) -> char {
        self.alphabet[0] as char
    }

    fn value_of(&self, ch: char) -> Result<u32, TypeError> {
        let value = if ch.is_ascii() {
            self.index[ch as usize]
        } else {
            INVALID
        };
        if value == INVALID {
            return Err(TypeError::Decode(format!(
                "invalid character {ch:?} for base{}",
                self.radix()
            )));
        }
        Ok(value as u32)
    }

    /// Encode bytes as a string.
    pub fn encode(&self, data: &[u8]) -> String {
        let zeros = data.iter().take_while(|b| **b == 0).count();
        let radix = self.radix() as u32;

        // Little-endian digits in the target radix.
        let mut digits: Vec<u8> = Vec::with_capacity(data.len() * 2);
        for &byte in &data[zeros..] {
            let mut carry = byte as u32;
            for digit in digits.iter_mut() {
                carry += (*digit as u32) << 8;
                *digit = (carry % radix) as u8;
                carry /= radix;
            }
            while carry > 0 {
                digits.push((carry % radix) as u8);
                carry /= radix;
            }
        }

        let mut out = String::with_capacity(zeros + digits.len());
        out.extend(std::iter::repeat(self.zero()).take(zeros));
        out.extend(
            digits
                .iter()
                .rev()
                .map(|&d| self.alphabet[d as usize] as char),
        );
        out
    }

    /// Decode a string produced by [`encode`](Self::encode).
    pub fn decode(&self, s: &str) -> Result<Vec<u8>, TypeError> {
        let zero = self.zero();
        let zeros = s.chars().take_while(|&c| c == zero).count();
        let radix = self.radix() as u32;

        let mut bytes: Vec<u8> = Vec::with_capacity(s.len());
        // The zero symbol is ASCII, so `zeros` is also a byte offset.
        for ch in s[zeros..].chars() {
            let mut carry = self.value_of(ch)?;
            for byte in bytes.iter_mut() {
                carry += (*byte as u32) * radix;
                *byte = (carry & 0xff) as u8;
                carry >>= 8;
            }
            while carry > 0 {
                bytes.push((carry & 0xff) as u8);
                carry >>= 8;
            }
        }

        let mut out = vec![0u8; zeros];
        out.extend(bytes.iter().rev());
        Ok(out)
    }

    /// Encode a small integer. Zero encodes as the single zero symbol.
    pub fn encode_int(&self, mut n: u64) -> String {
        if n == 0 {
            return self.zero().to_string();
        }
        let radix = self.radix() as u64;
        let mut digits = Vec::new();
        while n > 0 {
            digits.push(self.alphabet[(n % radix) as usize] as char);
            n /= radix;
        }
        digits.iter().rev().collect()
    }

    /// Decode a small integer.
    pub fn decode_int(&self, s: &str) -> Result<u64, TypeError> {
        if s.is_empty() {
            return Err(TypeError::Decode("empty integer string".into()));
        }
        let radix = self.radix() as u64;
        s.chars().try_fold(0u64, |acc, ch| {
            let value = self.value_of(ch)? as u64;
            acc.checked_mul(radix)
                .and_then(|v| v.checked_add(value))
                .ok_or_else(|| TypeError::Decode(format!("integer overflow decoding {s:?}")))
        })
    }

    /// Encode with a 4-byte double-SHA-256 checksum appended, for
    /// identifiers typed in by humans.
    pub fn encode_check(&self, data: &[u8]) -> String {
        let mut with_check = data.to_vec();
        with_check.extend_from_slice(&checksum(data));
        self.encode(&with_check)
    }

    /// Decode and verify a string produced by [`encode_check`](Self::encode_check).
    pub fn decode_check(&self, s: &str) -> Result<Vec<u8>, TypeError> {
        let mut decoded = self.decode(s)?;
        if decoded.len() < CHECKSUM_LEN {
            return Err(TypeError::Decode("too short for checksum".into()));
        }
        let check = decoded.split_off(decoded.len() - CHECKSUM_LEN);
        if check[..] != checksum(&decoded)[..] {
            return Err(TypeError::Decode("invalid checksum".into()));
        }
        Ok(decoded)
    }
}

impl std::fmt::Debug for BaseX {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BaseX({})", self.radix())
    }
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(Sha256::digest(data));
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}
