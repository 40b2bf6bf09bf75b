//! Consistent Hashing Ring
//!
//! Maps keys into a fixed hash space `[0, MAX_HASH)` and resolves which
//! virtual token owns a given key on a sorted token ring.
//!
//! ## Mechanism
//! - **Hashing**: Keys are digested with md5 and reduced modulo `MAX_HASH`,
//!   so every node computes the same position for a key independently.
//! - **Lookup**: The owner of a key is the token with the smallest position
//!   at or above the key's position, wrapping past the end of the ring.

pub mod hash;
pub mod token;
