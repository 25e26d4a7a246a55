//! SHA-256 helpers for published `<asset>.sha256` files.

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// First token of a `sha256sum`-style file, if it is a 64-char hex digest.
pub fn parse_checksum_file(contents: &str) -> Option<String> {
    let token = contents.split_whitespace().next()?;
    (token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| token.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn parses_sha256sum_format() {
        let line = "E3B0C44298FC1C149AFBF4C8996FB92427AE41E4649B934CA495991B7852B855  php-linux-x64\n";
        assert_eq!(parse_checksum_file(line), Some(sha256_hex(b"")));
        assert_eq!(parse_checksum_file("not-a-digest"), None);
        assert_eq!(parse_checksum_file(""), None);
    }
}
