//! Compact storage of `LineNumberTable` entries.
//!
//! Each entry is stored as the difference to the previous one. A difference whose
//! bytecode delta fits in five bits and whose line delta fits in three bits takes a
//! single byte; anything else is written as an escape byte followed by two zig-zag
//! variable-length integers. A zero byte terminates the stream.

const ESCAPE: u8 = 0xFF;
const TERMINATOR: u8 = 0x00;

/// A sequence of `(bci, line)` pairs in compressed form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompressedLineNumbers {
    bytes: Vec<u8>,
}

/// Builds a [`CompressedLineNumbers`].
#[derive(Debug, Default)]
pub(crate) struct LineNumberWriter {
    bytes: Vec<u8>,
    bci: i64,
    line: i64,
    is_empty: bool,
}

impl LineNumberWriter {
    pub(crate) fn new() -> Self {
        Self {
            is_empty: true,
            ..Self::default()
        }
    }

    pub(crate) fn write_pair(&mut self, bci: u16, line: u16) {
        let bci = i64::from(bci);
        let line = i64::from(line);
        let bci_delta = bci - self.bci;
        let line_delta = line - self.line;
        self.bci = bci;
        self.line = line;
        self.is_empty = false;
        // (0, 0) adds no information and would collide with the terminator.
        if bci_delta == 0 && line_delta == 0 {
            return;
        }
        if (0..32).contains(&bci_delta) && (0..8).contains(&line_delta) {
            #[allow(
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss,
                reason = "Both deltas were range checked above."
            )]
            let value = ((bci_delta as u8) << 3) | line_delta as u8;
            if value != ESCAPE {
                self.bytes.push(value);
                return;
            }
        }
        self.bytes.push(ESCAPE);
        write_signed(&mut self.bytes, bci_delta);
        write_signed(&mut self.bytes, line_delta);
    }

    /// Finishes the stream. Returns [`None`] if no pair was written.
    pub(crate) fn finish(mut self) -> Option<CompressedLineNumbers> {
        if self.is_empty {
            return None;
        }
        self.bytes.push(TERMINATOR);
        Some(CompressedLineNumbers { bytes: self.bytes })
    }
}

fn write_signed(bytes: &mut Vec<u8>, value: i64) {
    #[allow(clippy::cast_sign_loss, reason = "Zig-zag encoding is unsigned by construction.")]
    let mut zigzag = ((value << 1) ^ (value >> 63)) as u64;
    loop {
        #[allow(clippy::cast_possible_truncation, reason = "Masked to seven bits.")]
        let low = (zigzag & 0x7F) as u8;
        zigzag >>= 7;
        if zigzag == 0 {
            bytes.push(low);
            break;
        }
        bytes.push(low | 0x80);
    }
}

fn read_signed(bytes: &[u8], position: &mut usize) -> Option<i64> {
    let mut result = 0u64;
    let mut shift = 0;
    loop {
        let byte = *bytes.get(*position)?;
        *position += 1;
        result |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
    #[allow(clippy::cast_possible_wrap, reason = "Undoing the zig-zag encoding.")]
    let decoded = (result >> 1) as i64 ^ -((result & 1) as i64);
    Some(decoded)
}

impl CompressedLineNumbers {
    /// Returns the size of the compressed form in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the stream holds nothing but its terminator.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.len() <= 1
    }

    /// Iterates over the `(bci, line)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        let mut position = 0;
        let mut bci = 0i64;
        let mut line = 0i64;
        std::iter::from_fn(move || {
            let head = *self.bytes.get(position)?;
            position += 1;
            match head {
                TERMINATOR => {
                    position = self.bytes.len();
                    None
                }
                ESCAPE => {
                    bci += read_signed(&self.bytes, &mut position)?;
                    line += read_signed(&self.bytes, &mut position)?;
                    Some((u16::try_from(bci).ok()?, u16::try_from(line).ok()?))
                }
                packed => {
                    bci += i64::from(packed >> 3);
                    line += i64::from(packed & 0x7);
                    Some((u16::try_from(bci).ok()?, u16::try_from(line).ok()?))
                }
            }
        })
    }
}
