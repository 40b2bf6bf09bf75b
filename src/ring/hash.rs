//! Key hashing into ring space.

/// Size of the hash space. Token values and key positions live in `[0, MAX_HASH)`.
pub const MAX_HASH: u64 = 1_000_000;

/// Number of virtual tokens each node owns on the ring.
pub const NUM_TOKENS: usize = 200;

/// Maps a key to its position in ring space.
///
/// Takes the md5 digest of the raw key bytes, interprets the low eight bytes
/// as a big-endian integer and reduces modulo [`MAX_HASH`]. Lookup correctness
/// depends on this being stable across nodes and runs.
pub fn position(key: &str) -> u64 {
    let digest = md5::compute(key.as_bytes());
    let mut low = [0u8; 8];
    low.copy_from_slice(&digest.0[8..16]);
    u64::from_be_bytes(low) % MAX_HASH
}
