//! Buffer utilities for the journal's file-factory contract.
//!
//! The backend has no block device underneath it: there is no alignment to
//! honor and no benefit from issuing more than one I/O at a time per file.

use bytes::{Bytes, BytesMut};

/// Buffer alignment required by the store.
pub const ALIGNMENT: usize = 1;

/// Maximum number of concurrent I/O operations per file.
pub const MAX_IO: usize = 1;

/// Allocates a zero-filled buffer of `size` bytes.
#[must_use]
pub fn new_buffer(size: usize) -> BytesMut {
    BytesMut::zeroed(size)
}

/// Zeroes every byte of `buf` in place. The length is unchanged.
pub fn clear_buffer(buf: &mut BytesMut) {
    buf.fill(0);
}

/// Wraps existing bytes as a buffer without copying them.
#[must_use]
pub fn wrap_buffer(bytes: Vec<u8>) -> Bytes {
    Bytes::from(bytes)
}

/// Releases a buffer. Memory is returned to the allocator on drop.
pub fn release_buffer(buf: BytesMut) {
    drop(buf);
}

/// Rounds `bytes` up to the alignment, which is a no-op with [`ALIGNMENT`] 1.
#[must_use]
pub const fn calculate_block_size(bytes: usize) -> usize {
    bytes.div_ceil(ALIGNMENT) * ALIGNMENT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_zeroed() {
        let buf = new_buffer(64);
        assert_eq!(buf.len(), 64);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn clear_keeps_length() {
        let mut buf = BytesMut::from(&b"journal"[..]);
        clear_buffer(&mut buf);
        assert_eq!(buf.len(), 7);
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn wrap_does_not_copy() {
        let data = b"record".to_vec();
        let ptr = data.as_ptr();
        let wrapped = wrap_buffer(data);
        assert_eq!(wrapped.as_ptr(), ptr);
        assert_eq!(&wrapped[..], b"record");
    }

    #[test]
    fn block_size_is_identity() {
        assert_eq!(calculate_block_size(0), 0);
        assert_eq!(calculate_block_size(1), 1);
        assert_eq!(calculate_block_size(4097), 4097);
    }
}
