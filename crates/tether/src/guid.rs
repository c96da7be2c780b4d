// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! 128-bit session identifier.
//!
//! The string form is the braced, uppercase GUID layout: the first three hex
//! groups are printed little-endian over the underlying bytes, the last two
//! big-endian. Random identifiers carry the RFC 4122 version-4 and variant
//! bits. The identifier doubles as the publish-channel name in its canonical
//! string form.

use std::fmt;

use rand::RngCore;

use crate::error::{Error, Result};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Guid {
    bytes: [u8; 16],
}

#[derive(Copy, Clone)]
enum Endianness {
    Little,
    Big,
}

/// Group widths in bytes and their byte order within the string form.
const GROUPS: [(usize, Endianness); 5] = [
    (4, Endianness::Little),
    (2, Endianness::Little),
    (2, Endianness::Little),
    (2, Endianness::Big),
    (6, Endianness::Big),
];

impl Guid {
    /// Identifier from raw bytes.
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self { bytes }
    }

    /// Raw 16-byte representation.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.bytes
    }

    /// The distinguished all-zero identifier.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether all 16 bytes are zero.
    pub fn is_empty(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }

    /// Generate a random identifier.
    ///
    /// All 128 bits are drawn uniformly, then the version-4 nibble (high
    /// nibble of byte 7) and the RFC 4122 variant (top two bits of byte 8)
    /// are forced. Uniqueness is statistical, not enforced globally.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);

        bytes[7] &= 0x0F;
        bytes[7] |= 0x40;
        bytes[8] &= 0x3F;
        bytes[8] |= 0x80;

        Self { bytes }
    }

    /// Parse the string form, with or without the surrounding braces.
    ///
    /// Five hex groups of widths 4, 2, 2, 2 and 6 bytes separated by `-`;
    /// groups 1-3 are little-endian, 4-5 big-endian. Any malformed character
    /// or wrong group width fails with `invalid_argument`.
    pub fn from_string(text: &str) -> Result<Self> {
        let inner = match text.strip_prefix('{') {
            Some(rest) => rest
                .strip_suffix('}')
                .ok_or_else(|| Error::InvalidArgument(format!("unterminated brace in {text:?}")))?,
            None => text,
        };

        let mut bytes = [0u8; 16];
        let mut offset = 0usize;
        let mut fields = inner.split('-');

        for (size, order) in GROUPS {
            let field = fields
                .next()
                .ok_or_else(|| Error::InvalidArgument(format!("missing group in {text:?}")))?;
            if field.len() != size * 2 {
                return Err(Error::InvalidArgument(format!(
                    "group width {} does not match expected {} in {text:?}",
                    field.len(),
                    size * 2
                )));
            }
            for i in 0..size {
                let value = u8::from_str_radix(&field[i * 2..i * 2 + 2], 16)
                    .map_err(|_| Error::InvalidArgument(format!("invalid hex in {text:?}")))?;
                let index = match order {
                    Endianness::Little => offset + size - 1 - i,
                    Endianness::Big => offset + i,
                };
                bytes[index] = value;
            }
            offset += size;
        }

        if fields.next().is_some() {
            return Err(Error::InvalidArgument(format!(
                "too many groups in {text:?}"
            )));
        }

        Ok(Self { bytes })
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut offset = 0usize;
        for (block, (size, order)) in GROUPS.iter().enumerate() {
            if block > 0 {
                write!(f, "-")?;
            }
            for i in 0..*size {
                let index = match order {
                    Endianness::Little => offset + size - 1 - i,
                    Endianness::Big => offset + i,
                };
                write!(f, "{:02X}", self.bytes[index])?;
            }
            offset += size;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Guid({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_string_roundtrip() {
        for _ in 0..64 {
            let guid = Guid::generate();
            let text = guid.to_string();
            assert_eq!(Guid::from_string(&text).unwrap(), guid);
        }
    }

    #[test]
    fn test_guid_string_format() {
        let text = Guid::generate().to_string();
        assert_eq!(text.len(), 38);
        assert!(text.starts_with('{') && text.ends_with('}'));
        let groups: Vec<&str> = text[1..text.len() - 1].split('-').collect();
        assert_eq!(
            groups.iter().map(|g| g.len()).collect::<Vec<_>>(),
            vec![8, 4, 4, 4, 12]
        );
        for group in &groups {
            assert!(group
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        }
    }

    #[test]
    fn test_guid_version_and_variant_bits() {
        for _ in 0..32 {
            let guid = Guid::generate();
            assert_eq!(guid.as_bytes()[7] >> 4, 0b0100);
            assert_eq!(guid.as_bytes()[8] >> 6, 0b10);

            // In the string form: third group leads with '4', fourth with 8/9/A/B.
            let text = guid.to_string();
            let groups: Vec<&str> = text[1..text.len() - 1].split('-').collect();
            assert!(groups[2].starts_with('4'));
            assert!(matches!(
                groups[3].chars().next().unwrap(),
                '8' | '9' | 'A' | 'B'
            ));
        }
    }

    #[test]
    fn test_guid_mixed_endian_layout() {
        let guid = Guid::from_bytes([
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
            0x0F, 0x10,
        ]);
        // Groups 1-3 reversed within the group, 4-5 in byte order.
        assert_eq!(guid.to_string(), "{04030201-0605-0807-090A-0B0C0D0E0F10}");
    }

    #[test]
    fn test_guid_parse_without_braces() {
        let guid = Guid::generate();
        let text = guid.to_string();
        let bare = &text[1..text.len() - 1];
        assert_eq!(Guid::from_string(bare).unwrap(), guid);
    }

    #[test]
    fn test_guid_parse_rejects_malformed() {
        let bad = [
            "",
            "{}",
            "{04030201-0605-0807-090A-0B0C0D0E0F10",  // missing brace
            "04030201-0605-0807-090A-0B0C0D0E0F1",    // short last group
            "04030201-0605-0807-090A-0B0C0D0E0F10-1", // extra group
            "0403020Z-0605-0807-090A-0B0C0D0E0F10",   // bad hex
            "040302010605-0807-090A-0B0C0D0E0F10",    // merged groups
        ];
        for text in bad {
            let result = Guid::from_string(text);
            assert!(
                matches!(result, Err(Error::InvalidArgument(_))),
                "expected invalid argument for {:?}",
                text
            );
        }
    }

    #[test]
    fn test_guid_empty() {
        assert!(Guid::empty().is_empty());
        assert!(!Guid::generate().is_empty());
        assert_eq!(
            Guid::empty().to_string(),
            "{00000000-0000-0000-0000-000000000000}"
        );
    }

    #[test]
    fn test_guid_ordering_is_lexicographic_over_bytes() {
        let mut low = [0u8; 16];
        let mut high = [0u8; 16];
        low[0] = 1;
        high[0] = 2;
        assert!(Guid::from_bytes(low) < Guid::from_bytes(high));

        let mut tail = low;
        tail[15] = 0xFF;
        assert!(Guid::from_bytes(low) < Guid::from_bytes(tail));
    }
}
