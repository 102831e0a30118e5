//! Jenkins one-at-a-time hashing, driven incrementally.

/// Mixes `key` into `hash`. Start from `0`; a call with an empty slice
/// finalizes the value.
pub fn hash_compute(mut hash: u32, key: &[u8]) -> u32 {
    if key.is_empty() {
        hash = hash.wrapping_add(hash << 3);
        hash ^= hash >> 11;
        hash = hash.wrapping_add(hash << 15);
        return hash;
    }
    for &b in key {
        hash = hash.wrapping_add(u32::from(b));
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash
}

/// One-shot hash of a complete byte string.
pub fn hash_bytes(key: &[u8]) -> u32 {
    hash_compute(hash_compute(0, key), &[])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: feeding the input in pieces equals hashing it at once.
    #[test]
    fn incremental_matches_one_shot() {
        let whole = hash_bytes(b"ietf-interfaces");
        let mut h = hash_compute(0, b"ietf-");
        h = hash_compute(h, b"interfaces");
        h = hash_compute(h, &[]);
        assert_eq!(whole, h);
    }

    /// Invariant: the empty string hashes to the finalization of zero.
    #[test]
    fn empty_input_is_zero() {
        assert_eq!(hash_bytes(b""), 0);
        assert_ne!(hash_bytes(b"a"), hash_bytes(b"b"));
    }
}
