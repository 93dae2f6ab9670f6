//! Growable byte storage used for header lines and message bodies.
//!
//! A [`Buffer`] keeps an explicit length/capacity pair and grows
//! geometrically on overflow, so a long run of small appends costs amortized
//! O(1) per byte. Capacity is never released implicitly: [`Buffer::reset`]
//! only rewinds the length, which lets a keep-alive connection parse message
//! after message without reallocating.
//!
//! Allocation is fallible. Running out of memory, or past an optional hard
//! limit, surfaces as a [`BufferError`] that the owning connection treats as
//! fatal for itself only.

use bytes::Bytes;

/// Smallest capacity a buffer grows to on its first allocation.
const MIN_CAPACITY: usize = 64;

/// Errors raised while growing a [`Buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// The allocator refused to hand out more memory.
    #[error("out of memory growing buffer")]
    OutOfMemory,
    /// The buffer would exceed its configured ceiling.
    #[error("buffer limit of {limit} bytes exceeded")]
    LimitExceeded { limit: usize },
}

/// Owned, growable byte buffer.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    data: Vec<u8>,
    limit: Option<usize>,
}

impl Buffer {
    /// Creates an empty buffer without allocating.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            limit: None,
        }
    }

    /// Creates an empty buffer that refuses to hold more than `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit: Some(limit),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Appends `bytes`, growing the allocation if needed.
    ///
    /// On growth the new capacity is at least twice the required length
    /// (clamped to the limit, if any). On error the buffer is left unchanged.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let needed = self
            .data
            .len()
            .checked_add(bytes.len())
            .ok_or(BufferError::OutOfMemory)?;

        if let Some(limit) = self.limit {
            if needed > limit {
                return Err(BufferError::LimitExceeded { limit });
            }
        }

        if needed > self.data.capacity() {
            self.grow(needed)?;
        }

        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends a single byte.
    pub fn push(&mut self, byte: u8) -> Result<(), BufferError> {
        self.append(&[byte])
    }

    /// Removes and returns the last byte.
    pub fn pop(&mut self) -> Option<u8> {
        self.data.pop()
    }

    /// Drops the contents but keeps the allocation.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Read-only view of the contents, valid until the next mutation.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The contents as UTF-8, if they are valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    /// Moves the contents out, leaving the buffer empty.
    ///
    /// The allocation moves with the contents, so the next append starts a
    /// fresh one.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }

    /// Moves the contents out as [`Bytes`].
    pub fn take_bytes(&mut self) -> Bytes {
        Bytes::from(self.take())
    }

    fn grow(&mut self, needed: usize) -> Result<(), BufferError> {
        let mut target = needed.saturating_mul(2).max(MIN_CAPACITY);

        if let Some(limit) = self.limit {
            target = target.min(limit);
        }

        self.data
            .try_reserve_exact(target - self.data.len())
            .map_err(|_| BufferError::OutOfMemory)
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<&[u8]> for Buffer {
    fn from(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_is_geometric() {
        let mut buf = Buffer::new();
        buf.append(&[0u8; 100]).unwrap();
        assert!(buf.capacity() >= 200);

        let before = buf.capacity();
        buf.append(&[0u8; 10]).unwrap();
        assert_eq!(buf.capacity(), before);
    }

    #[test]
    fn failed_append_leaves_contents() {
        let mut buf = Buffer::with_limit(4);
        buf.append(b"abc").unwrap();
        assert_eq!(
            buf.append(b"de"),
            Err(BufferError::LimitExceeded { limit: 4 })
        );
        assert_eq!(buf.as_slice(), b"abc");
    }
}
