//! Core identifier types and small helpers used throughout the crate.

use std::fmt::Write;

/// Region identifier assigned by the placement driver.
pub type RegionId = u64;

/// Store (physical backend node) identifier.
pub type StoreId = u64;

/// Peer (single replica of a region) identifier.
pub type PeerId = u64;

/// Render a raw key for logs and error descriptions.
///
/// Printable ASCII is kept as is, everything else becomes `\xNN`.
pub fn format_key(key: &[u8]) -> String {
    let mut out = String::with_capacity(key.len());
    for &b in key {
        match b {
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{:02x}", b);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_key_printable() {
        assert_eq!(format_key(b"user:123"), "user:123");
    }

    #[test]
    fn test_format_key_escapes_binary() {
        assert_eq!(format_key(&[b't', 0x80, 0x00, b'\\']), "t\\x80\\x00\\\\");
        assert_eq!(format_key(&[]), "");
    }
}
