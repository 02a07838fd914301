// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use rand::RngCore;

/// Returns a lowercase hex-encoded random token of exactly `bits` bits.
///
/// `bits` must be a multiple of 8; the conference allocator uses 128.
pub fn random_hex_token(bits: u32) -> String {
    assert_eq!(bits % 8, 0, "random_hex_token bits must be a multiple of 8");
    let mut bytes = vec![0u8; (bits / 8) as usize];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_has_expected_length() {
        let token = random_hex_token(128);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tokens_are_not_trivially_repeated() {
        let a = random_hex_token(128);
        let b = random_hex_token(128);
        assert_ne!(a, b);
    }
}
