//! Fixed-capacity scratch buffers for framing a single segment.
//!
//! A buffer is allocated for one framing-and-send call and dropped when that call returns, so
//!  no two sends can ever share (and overwrite) the same scratch memory. The capacity is the
//!  configured UDP payload size: everything written past it is a bug in the caller, which is
//!  expected to check [FixedBuf::remaining_capacity] up front.

use std::fmt::{Debug, Formatter};
use bytes::buf::UninitSlice;

/// A fixed-length dynamically allocated buffer
#[derive(Eq)]
pub struct FixedBuf {
    buf: Vec<u8>,
    len: usize,
}
impl FixedBuf {
    /// create a new FixedBuf instance with the given buffer capacity
    pub fn new(capacity: usize) -> FixedBuf {
        FixedBuf {
            buf: vec![0; capacity],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.capacity() - self.len
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl PartialEq for FixedBuf {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref().eq(other.as_ref())
    }
}

impl Debug for FixedBuf {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl AsRef<[u8]> for FixedBuf {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

unsafe impl bytes::BufMut for FixedBuf {
    fn remaining_mut(&self) -> usize {
        self.remaining_capacity()
    }

    unsafe fn advance_mut(&mut self, cnt: usize) {
        assert!(self.len + cnt <= self.capacity());
        self.len += cnt;
    }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        UninitSlice::new(&mut self.buf[self.len..])
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;
    use rstest::rstest;
    use super::*;

    fn buf_with(capacity: usize, data: &[u8]) -> FixedBuf {
        let mut result = FixedBuf::new(capacity);
        result.put_slice(data);
        result
    }

    #[rstest]
    #[case::empty(buf_with(10, &[]), 0, 10)]
    #[case::partial(buf_with(10, &[1, 2, 3]), 3, 7)]
    #[case::full(buf_with(3, &[1, 2, 3]), 3, 0)]
    fn test_len(#[case] buf: FixedBuf, #[case] expected_len: usize, #[case] expected_remaining: usize) {
        assert_eq!(buf.len(), expected_len);
        assert_eq!(buf.remaining_capacity(), expected_remaining);
        assert_eq!(buf.remaining_mut(), expected_remaining);
        assert_eq!(buf.is_empty(), expected_len == 0);
    }

    #[test]
    fn test_put_and_as_ref() {
        let mut buf = FixedBuf::new(8);
        buf.put_u8(1);
        buf.put_u16(0x0203);
        buf.put_slice(&[4, 5]);
        assert_eq!(buf.as_ref(), &[1, 2, 3, 4, 5]);
        assert_eq!(buf.capacity(), 8);
    }

    #[test]
    fn test_clear() {
        let mut buf = buf_with(5, &[1, 2, 3]);
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.as_ref(), &[] as &[u8]);
        assert_eq!(buf.remaining_capacity(), 5);
    }

    #[rstest]
    #[case::same(buf_with(5, &[1, 2]), buf_with(5, &[1, 2]), true)]
    #[case::different_capacity(buf_with(5, &[1, 2]), buf_with(9, &[1, 2]), true)]
    #[case::different_data(buf_with(5, &[1, 2]), buf_with(5, &[1, 3]), false)]
    #[case::prefix(buf_with(5, &[1, 2]), buf_with(5, &[1]), false)]
    fn test_eq(#[case] buf1: FixedBuf, #[case] buf2: FixedBuf, #[case] expected: bool) {
        assert_eq!(buf1 == buf2, expected);
    }

    #[test]
    #[should_panic]
    fn test_overflow_panics() {
        let mut buf = FixedBuf::new(2);
        buf.put_slice(&[1, 2, 3]);
    }
}
