//! Room Passwords
//!
//! Room passwords are never stored as given. The registry keeps a SHA-256
//! digest salted with a domain separator and the room name, so two rooms
//! sharing a password do not share a digest.

use sha2::{Sha256, Digest};

const DOMAIN: &[u8] = b"DICE_ROOM_PASSWORD_V1";

/// Hex digest of `password` for room `room_name`.
///
/// An empty password means a public room and yields `None`.
pub fn digest(room_name: &str, password: &str) -> Option<String> {
    if password.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    hasher.update(DOMAIN);
    hasher.update((room_name.len() as u32).to_le_bytes());
    hasher.update(room_name.as_bytes());
    hasher.update(password.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

/// Check a join attempt against a room's stored digest.
///
/// Public rooms accept any password.
pub fn verify(stored: Option<&str>, room_name: &str, candidate: &str) -> bool {
    let Some(stored) = stored else {
        return true;
    };
    match digest(room_name, candidate) {
        Some(given) => constant_time_eq(stored.as_bytes(), given.as_bytes()),
        None => false,
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
