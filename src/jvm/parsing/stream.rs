//! A bounds-checked big-endian reader over the bytes of a class file.

use crate::errors::LoadError;

/// A cursor over an immutable class-file buffer.
///
/// The checked readers fail with a
/// [`LoadErrorKind::TruncatedInput`](crate::LoadErrorKind::TruncatedInput) error when
/// the buffer ends early. The `*_fast` readers may only be used after
/// [`ClassFileStream::guarantee_more`] established that enough bytes remain.
#[derive(Debug, Clone)]
pub struct ClassFileStream<'a> {
    buffer: &'a [u8],
    position: usize,
    need_verify: bool,
    source: &'a str,
}

macro_rules! stream_readers {
    ($($ty:ty => $get:ident, $fast:ident;)*) => {
        $(
            #[doc = concat!("Reads a big-endian `", stringify!($ty), "`.")]
            ///
            /// # Errors
            /// Returns a truncation error if the buffer ends early.
            pub fn $get(&mut self) -> Result<$ty, LoadError> {
                self.guarantee_more(size_of::<$ty>())?;
                Ok(self.$fast())
            }

            #[doc = concat!("Reads a big-endian `", stringify!($ty), "` already known to be present.")]
            ///
            /// # Panics
            /// Panics if fewer bytes remain than were guaranteed.
            pub fn $fast(&mut self) -> $ty {
                const SIZE: usize = size_of::<$ty>();
                debug_assert!(self.remaining() >= SIZE, "read past a guaranteed range");
                let mut bytes = [0u8; SIZE];
                bytes.copy_from_slice(&self.buffer[self.position..self.position + SIZE]);
                self.position += SIZE;
                <$ty>::from_be_bytes(bytes)
            }
        )*
    };
}

impl<'a> ClassFileStream<'a> {
    /// Creates a stream over `buffer`, read from `source`.
    #[must_use]
    pub fn new(buffer: &'a [u8], source: &'a str, need_verify: bool) -> Self {
        Self {
            buffer,
            position: 0,
            need_verify,
            source,
        }
    }

    /// Returns `true` if format checks are performed.
    #[must_use]
    pub const fn need_verify(&self) -> bool {
        self.need_verify
    }

    /// Enables or disables format checks for the rest of the stream.
    pub fn set_verify(&mut self, need_verify: bool) {
        self.need_verify = need_verify;
    }

    /// Returns the description of where the bytes come from.
    #[must_use]
    pub const fn source(&self) -> &'a str {
        self.source
    }

    /// Returns the offset of the cursor from the start of the buffer.
    #[must_use]
    pub const fn current_offset(&self) -> usize {
        self.position
    }

    /// Returns the number of unread bytes.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len() - self.position
    }

    /// Returns `true` if every byte has been read.
    #[must_use]
    pub const fn at_eos(&self) -> bool {
        self.position == self.buffer.len()
    }

    /// Ensures at least `size` more bytes can be read.
    ///
    /// # Errors
    /// Returns a truncation error otherwise.
    pub fn guarantee_more(&self, size: usize) -> Result<(), LoadError> {
        if self.remaining() < size {
            Err(LoadError::truncated())
        } else {
            Ok(())
        }
    }

    stream_readers! {
        u8 => get_u1, get_u1_fast;
        u16 => get_u2, get_u2_fast;
        u32 => get_u4, get_u4_fast;
        u64 => get_u8, get_u8_fast;
    }

    /// Returns the unread part of the buffer without moving the cursor.
    #[must_use]
    pub fn get_u1_buffer(&self) -> &'a [u8] {
        &self.buffer[self.position..]
    }

    /// Reads `length` raw bytes.
    ///
    /// # Errors
    /// Returns a truncation error if the buffer ends early.
    pub fn get_bytes(&mut self, length: usize) -> Result<&'a [u8], LoadError> {
        self.guarantee_more(length)?;
        let bytes = &self.buffer[self.position..self.position + length];
        self.position += length;
        Ok(bytes)
    }

    fn skip(&mut self, length: usize) -> Result<(), LoadError> {
        self.guarantee_more(length)?;
        self.position += length;
        Ok(())
    }

    /// Skips `count` bytes.
    ///
    /// # Errors
    /// Returns a truncation error if the buffer ends early.
    pub fn skip_u1(&mut self, count: usize) -> Result<(), LoadError> {
        self.skip(count)
    }

    /// Skips `count` two-byte values.
    ///
    /// # Errors
    /// Returns a truncation error if the buffer ends early.
    pub fn skip_u2(&mut self, count: usize) -> Result<(), LoadError> {
        self.skip(count.saturating_mul(2))
    }

    /// Skips `count` four-byte values.
    ///
    /// # Errors
    /// Returns a truncation error if the buffer ends early.
    pub fn skip_u4(&mut self, count: usize) -> Result<(), LoadError> {
        self.skip(count.saturating_mul(4))
    }
}
