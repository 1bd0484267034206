//! Constant-time comparison.

use subtle::ConstantTimeEq;

/// Compare two byte slices in constant time.
///
/// Used for the handshake nonce check, where a short-circuiting comparison
/// would leak how many leading bytes matched. Slices of unequal length
/// compare unequal.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}
