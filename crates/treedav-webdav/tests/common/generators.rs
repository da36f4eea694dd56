//! Test data generators for WebDAV integration tests.

use rand::Rng;

/// Block size the filesystem backend streams content in (1 MiB).
pub const BLOCK_SIZE: usize = 1024 * 1024;

/// Generate random bytes of specified size.
pub fn random_bytes(size: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..size).map(|_| rng.random()).collect()
}

/// Generate content that spans exactly N streaming blocks.
pub fn multi_block_content(blocks: usize) -> Vec<u8> {
    random_bytes(blocks * BLOCK_SIZE)
}

/// Generate content one byte more than a block.
pub fn block_plus_one() -> Vec<u8> {
    random_bytes(BLOCK_SIZE + 1)
}

/// Generate content containing all 256 possible byte values.
pub fn all_byte_values() -> Vec<u8> {
    (0u8..=255).collect()
}

/// Generate a filename with special characters.
///
/// Returns something like "file with spaces & (special) chars!.txt"
pub fn special_filename() -> String {
    "file with spaces & (special) chars!.txt".to_string()
}

/// Generate a filename with Unicode characters.
pub fn unicode_filename() -> String {
    "文件-αβγ-emoji🎉.txt".to_string()
}

/// Generate a deep nested path.
///
/// Returns something like "dir0/dir1/..." with `depth` levels.
pub fn deep_path(depth: usize) -> String {
    (0..depth)
        .map(|i| format!("dir{i}"))
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_length() {
        assert_eq!(random_bytes(100).len(), 100);
        assert_eq!(random_bytes(0).len(), 0);
    }

    #[test]
    fn test_all_byte_values_complete() {
        let bytes = all_byte_values();
        assert_eq!(bytes.len(), 256);
        for i in 0u8..=255 {
            assert!(bytes.contains(&i), "Missing byte value: {i}");
        }
    }

    #[test]
    fn test_deep_path() {
        assert_eq!(deep_path(0), "");
        assert_eq!(deep_path(1), "dir0");
        assert_eq!(deep_path(3), "dir0/dir1/dir2");
    }
}
