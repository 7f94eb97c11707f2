//! Content fingerprints used to decide whether a write changes anything.
//!
//! A fingerprint is a CRC32 of the raw bytes. It is compared, never trusted:
//! collisions merely cause an edit to be treated as a no-op, so it must not
//! be used for integrity checks.

use derive_more::Display;

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[display("{_0:08x}")]
pub struct Fingerprint(u32);

impl Fingerprint {
    /// Fingerprint arbitrary content. Page bodies and file blobs go through
    /// the same function.
    pub fn of(content: impl AsRef<[u8]>) -> Self {
        Self(crc32fast::hash(content.as_ref()))
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}
impl From<u32> for Fingerprint {
    fn from(value: u32) -> Self {
        Self(value)
    }
}
impl From<Fingerprint> for i64 {
    fn from(fingerprint: Fingerprint) -> Self {
        i64::from(fingerprint.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(b"".as_slice(), 0x0000_0000)]
    #[case(b"x".as_slice(), 0x8cdc_1683)]
    #[case(b"The quick brown fox jumps over the lazy dog".as_slice(), 0x414f_a339)]
    fn test_known_checksums(#[case] input: &[u8], #[case] expected: u32) {
        assert_eq!(Fingerprint::of(input).value(), expected);
    }

    #[test]
    fn test_text_and_bytes_agree() {
        assert_eq!(Fingerprint::of("hello"), Fingerprint::of(b"hello".to_vec()));
    }

    #[test]
    fn test_change_is_detected() {
        assert_ne!(Fingerprint::of("y"), Fingerprint::of("z"));
    }

    #[test]
    fn test_display_is_zero_padded_hex() {
        assert_eq!(Fingerprint::from(0xbeef).to_string(), "0000beef");
    }

    #[test]
    fn test_stored_value_is_non_negative() {
        assert_eq!(i64::from(Fingerprint::from(u32::MAX)), 4_294_967_295);
    }
}
