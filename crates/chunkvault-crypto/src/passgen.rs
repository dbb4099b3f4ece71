//! Per-file password generation
//!
//! Each encrypted file gets its own random password; it ends up inside the
//! manifest, so its only job is to be unguessable before the manifest is
//! wrapped. Digits, symbols, and both letter cases over 120 characters give
//! far more entropy than the 256-bit keys derived from it.

use rand::Rng;

const ALPHABET: &[u8] =
    b"0123456789!\"#$%&'()~abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Generate a random password of `length` characters from the fixed
/// alphabet, using the thread-local CSPRNG.
pub fn generate_password(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}
