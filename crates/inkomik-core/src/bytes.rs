//! Shared copy-on-write byte buffer.
//!
//! A [`ByteArray`] clones cheaply: copies share one backing buffer until one
//! of them mutates, at which point the mutator receives a private copy and
//! the others keep observing the original bytes.

use std::sync::Arc;

#[derive(Clone, Debug, Default)]
pub struct ByteArray {
    data: Arc<Vec<u8>>,
}

impl ByteArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// A zero-filled buffer of `len` bytes.
    pub fn with_len(len: usize) -> Self {
        Self {
            data: Arc::new(vec![0; len]),
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access; acquires a private copy when the buffer is shared.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Grows or shrinks to `new_len`, zero-filling new bytes.
    pub fn resize(&mut self, new_len: usize) {
        Arc::make_mut(&mut self.data).resize(new_len, 0);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.data.get(index).copied()
    }

    pub fn set(&mut self, index: usize, value: u8) -> bool {
        match Arc::make_mut(&mut self.data).get_mut(index) {
            Some(byte) => {
                *byte = value;
                true
            }
            None => false,
        }
    }

    pub fn insert(&mut self, index: usize, bytes: &[u8]) -> bool {
        if index > self.len() {
            return false;
        }
        let data = Arc::make_mut(&mut self.data);
        data.splice(index..index, bytes.iter().copied());
        true
    }

    pub fn remove(&mut self, index: usize, count: usize) -> bool {
        if index > self.len() {
            return false;
        }
        let end = index.saturating_add(count).min(self.len());
        Arc::make_mut(&mut self.data).drain(index..end);
        true
    }

    pub fn copy_part(&self, index: usize, count: usize) -> ByteArray {
        if index >= self.len() {
            return ByteArray::new();
        }
        let end = index.saturating_add(count).min(self.len());
        ByteArray::from_slice(&self.data[index..end])
    }

    /// Whether two arrays currently share one backing buffer.
    pub fn shares_buffer(&self, other: &ByteArray) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl std::ops::Deref for ByteArray {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_until_mutation() {
        let mut first = ByteArray::from_slice(&[1, 2, 3]);
        let second = first.clone();
        assert!(first.shares_buffer(&second));

        first.set(0, 9);
        assert!(!first.shares_buffer(&second));
        assert_eq!(first.as_slice(), &[9, 2, 3]);
        assert_eq!(second.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn resize_zero_fills() {
        let mut buf = ByteArray::from_slice(&[7]);
        buf.resize(3);
        assert_eq!(buf.as_slice(), &[7, 0, 0]);
        buf.resize(1);
        assert_eq!(buf.as_slice(), &[7]);
    }

    #[test]
    fn insert_and_remove() {
        let mut buf = ByteArray::from_slice(&[1, 4]);
        assert!(buf.insert(1, &[2, 3]));
        assert_eq!(buf.as_slice(), &[1, 2, 3, 4]);

        assert!(buf.remove(1, 2));
        assert_eq!(buf.as_slice(), &[1, 4]);

        assert!(!buf.insert(9, &[0]));
    }

    #[test]
    fn copy_part_clamps_range() {
        let buf = ByteArray::from_slice(&[1, 2, 3, 4]);
        assert_eq!(buf.copy_part(1, 2).as_slice(), &[2, 3]);
        assert_eq!(buf.copy_part(2, 100).as_slice(), &[3, 4]);
        assert!(buf.copy_part(10, 1).is_empty());
    }

    #[test]
    fn mutation_through_slice_detaches_copy() {
        let mut first = ByteArray::with_len(4);
        let second = first.clone();
        first.as_mut_slice()[2] = 5;
        assert_eq!(second.as_slice(), &[0, 0, 0, 0]);
        assert_eq!(first.as_slice(), &[0, 0, 5, 0]);
    }
}
