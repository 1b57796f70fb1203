//! Connection identifier generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one live connection, unique within the process.
pub type ConnId = String;

/// Generates connection ids: a short node prefix followed by a 6-character
/// base36 counter, e.g. `C-AAAAAB`.
pub struct ConnIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl ConnIdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(1),
        }
    }

    pub fn next(&self) -> ConnId {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, base36_encode_6(n))
    }
}

/// Encode a number as a 6-character base36 string.
fn base36_encode_6(mut n: u64) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut result = [b'A'; 6];

    for slot in result.iter_mut().rev() {
        *slot = CHARS[(n % 36) as usize];
        n /= 36;
    }

    String::from_utf8_lossy(&result).into_owned()
}
