//! Buffered line framing
//!
//! Reads a byte source in large chunks into a fixed arena and hands out
//! pre-tokenized blocks:
//! - Semicolon end-of-line comments removed (optional)
//! - Leading and trailing whitespace removed
//! - `\n`, `\r` and `\r\n` line endings canonicalized to exactly one `\n`
//! - Empty lines dropped
//!
//! Blocks are slices into the arena. Every call that may refill or
//! re-tokenize (`read_next_lines`, `read_line`) takes `&mut self`, so
//! previously returned blocks must be consumed or copied first.

use std::io::{self, Read};
use std::ops::Range;

/// Reader yielding cleaned blocks from a raw byte stream
pub struct LineReader<R> {
    source: R,
    arena: Box<[u8]>,
    remove_comments: bool,
    eof: bool,
    data_begin: usize,
    data_end: usize,
    // Incomplete line at the end of the arena, carried to the next refill.
    remainder: Range<usize>,
}

impl<R: Read> LineReader<R> {
    /// Create a reader with an arena of `capacity` bytes.
    ///
    /// `capacity` must exceed the longest raw line of the input.
    pub fn new(source: R, capacity: usize, remove_comments: bool) -> Self {
        Self {
            source,
            arena: vec![0u8; capacity.max(1)].into_boxed_slice(),
            remove_comments,
            eof: false,
            data_begin: 0,
            data_end: 0,
            remainder: 0..0,
        }
    }

    /// Read at most `n` next blocks. Might return fewer, even none, without
    /// being at end-of-stream (e.g. right at a buffer switchover).
    ///
    /// Invalidates blocks returned by previous calls.
    pub fn read_next_lines(&mut self, n: usize) -> io::Result<Vec<&[u8]>> {
        let ranges = self.next_block_ranges(n)?;
        Ok(ranges.into_iter().map(|r| &self.arena[r]).collect())
    }

    /// Read a single block, looping over buffer switchovers.
    ///
    /// Returns `None` at end-of-stream.
    pub fn read_line(&mut self) -> io::Result<Option<&[u8]>> {
        let mut found = None;
        while !self.eof {
            if let Some(range) = self.next_block_ranges(1)?.pop() {
                found = Some(range);
                break;
            }
        }
        Ok(found.map(|r| &self.arena[r]))
    }

    /// True once no more blocks can be produced
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Arena size in bytes
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    /// Whether `;` comments are stripped
    pub fn remove_comments(&self) -> bool {
        self.remove_comments
    }

    /// Drop everything read from the source but not yet handed out.
    ///
    /// Returns the raw bytes dropped, for the caller to echo or count.
    pub fn discard_buffered(&mut self) -> Vec<u8> {
        let mut dropped = self.arena[self.remainder.clone()].to_vec();
        dropped.extend_from_slice(&self.arena[self.data_begin..self.data_end]);
        self.remainder = 0..0;
        self.data_begin = 0;
        self.data_end = 0;
        dropped
    }

    /// Get a reference to the underlying source
    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// Get a mutable reference to the underlying source.
    ///
    /// Bytes read directly from the source bypass the arena.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source
    }

    fn next_block_ranges(&mut self, n: usize) -> io::Result<Vec<Range<usize>>> {
        let mut result = Vec::with_capacity(n);
        if n == 0 {
            return Ok(result);
        }
        if self.data_begin >= self.data_end && !self.refill()? {
            return Ok(result);
        }

        while let Some(offset) = self.arena[self.data_begin..self.data_end]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
        {
            let terminator = self.data_begin + offset;
            if let Some(block) = self.clean_span(self.data_begin, terminator) {
                result.push(block);
            }
            self.data_begin = terminator + 1;
            if result.len() >= n {
                return Ok(result);
            }
        }

        self.remainder = self.data_begin..self.data_end;
        self.data_begin = self.data_end;
        Ok(result)
    }

    fn refill(&mut self) -> io::Result<bool> {
        self.data_begin = 0;
        self.data_end = 0;
        if self.eof {
            return Ok(false);
        }

        let pending = self.remainder.len();
        if pending >= self.arena.len() {
            self.eof = true;
            self.remainder = 0..0;
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds buffer capacity of {} bytes", self.arena.len()),
            ));
        }
        if pending > 0 {
            self.arena.copy_within(self.remainder.clone(), 0);
            self.data_end = pending;
        }

        let read = loop {
            match self.source.read(&mut self.arena[self.data_end..]) {
                Ok(read) => break read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.eof = true;
                    self.remainder = 0..0;
                    return Err(e);
                }
            }
        };

        if read > 0 {
            self.data_end += read;
        } else {
            self.eof = true;
            if pending > 0 {
                // Close the final partial line.
                self.arena[self.data_end] = b'\n';
                self.data_end += 1;
            }
        }
        self.remainder = 0..0;
        Ok(self.data_end > self.data_begin)
    }

    /// Clean the span `first..=terminator` in place. Writes a fresh newline
    /// behind the last kept character.
    fn clean_span(&mut self, first: usize, terminator: usize) -> Option<Range<usize>> {
        let mut begin = first;
        let mut end = terminator + 1;
        if self.remove_comments {
            if let Some(offset) = self.arena[begin..end].iter().position(|&b| b == b';') {
                end = begin + offset;
            }
        }
        while begin < end && is_space(self.arena[begin]) {
            begin += 1;
        }
        while end > begin && is_space(self.arena[end - 1]) {
            end -= 1;
        }
        if begin == end {
            return None;
        }
        self.arena[end] = b'\n';
        Some(begin..end + 1)
    }
}

/// Same set as C `isspace` in the "C" locale
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}
