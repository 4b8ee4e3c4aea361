//! Access-token generation

use rand::RngCore;

/// Number of random bytes in a generated token (rendered as hex)
const TOKEN_BYTES: usize = 16;

/// Generate a new opaque access token: 32 hex characters.
pub fn generate() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}
