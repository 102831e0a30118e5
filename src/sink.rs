//! Sinks: what a [`Walk`] does with the bytes it lays out.
//!
//! [`SizeSink`] only advances a cursor; [`WriteSink`] also stores the bytes
//! in a caller-supplied buffer. Both hand out the same offsets for the same
//! graph, which is what keeps sizing and flattening in agreement.

use crate::error::{internal, Error, Result};
use crate::layout::WORD;
use crate::plugin::{ExtensionPlugin, FlatSubstmts};
use crate::schema::ExtInstance;
use crate::walk::Walk;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::SizeSink {}
    impl<'b> Sealed for super::WriteSink<'b> {}
}

pub trait Sink: sealed::Sealed {
    /// Bytes laid out so far.
    fn position(&self) -> usize;

    /// Reserves `len` bytes at the cursor and returns their offset.
    fn alloc(&mut self, len: usize) -> Result<usize>;

    fn put(&mut self, at: usize, value: u64) -> Result<()>;

    fn put_u32(&mut self, at: usize, value: u32) -> Result<()>;

    fn put_bytes(&mut self, at: usize, bytes: &[u8]) -> Result<()>;

    /// Runs the plugin half that matches this sink.
    #[doc(hidden)]
    fn payload(
        walk: &mut Walk<'_, Self>,
        plugin: &dyn ExtensionPlugin,
        ext: &ExtInstance,
        substmts: FlatSubstmts,
    ) -> Result<u64>
    where
        Self: Sized;
}

#[derive(Debug, Default)]
pub struct SizeSink {
    pos: usize,
}

impl SizeSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self, at: usize, len: usize) -> Result<()> {
        if at.checked_add(len).map_or(true, |end| end > self.pos) {
            return Err(internal(format_args!(
                "write of {} bytes at {} past the laid out {}",
                len, at, self.pos
            )));
        }
        Ok(())
    }
}

impl Sink for SizeSink {
    fn position(&self) -> usize {
        self.pos
    }

    fn alloc(&mut self, len: usize) -> Result<usize> {
        let at = self.pos;
        self.pos = at
            .checked_add(len)
            .ok_or_else(|| internal(format_args!("allocation of {} bytes at {} overflows", len, at)))?;
        Ok(at)
    }

    fn put(&mut self, at: usize, _: u64) -> Result<()> {
        self.check(at, WORD)
    }

    fn put_u32(&mut self, at: usize, _: u32) -> Result<()> {
        self.check(at, 4)
    }

    fn put_bytes(&mut self, at: usize, bytes: &[u8]) -> Result<()> {
        self.check(at, bytes.len())
    }

    fn payload(
        walk: &mut Walk<'_, Self>,
        plugin: &dyn ExtensionPlugin,
        ext: &ExtInstance,
        substmts: FlatSubstmts,
    ) -> Result<u64> {
        let start = walk.position();
        let claimed = plugin.compiled_size(ext, substmts, walk)?;
        let consumed = walk.position() - start;
        if claimed != consumed {
            return Err(internal(format_args!(
                "plugin \"{}\" sized {} bytes but laid out {}",
                plugin.id(),
                claimed,
                consumed
            )));
        }
        Ok(0)
    }
}

/// Writes into a fixed buffer; never past its end.
#[derive(Debug)]
pub struct WriteSink<'b> {
    buf: &'b mut [u8],
    pos: usize,
}

impl<'b> WriteSink<'b> {
    pub fn new(buf: &'b mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn slot(&mut self, at: usize, len: usize) -> Result<&mut [u8]> {
        match at.checked_add(len) {
            Some(end) if end <= self.pos => Ok(&mut self.buf[at..end]),
            _ => Err(internal(format_args!(
                "write of {} bytes at {} past the laid out {}",
                len, at, self.pos
            ))),
        }
    }
}

impl<'b> Sink for WriteSink<'b> {
    fn position(&self) -> usize {
        self.pos
    }

    fn alloc(&mut self, len: usize) -> Result<usize> {
        let at = self.pos;
        let end = at
            .checked_add(len)
            .ok_or_else(|| internal(format_args!("allocation of {} bytes at {} overflows", len, at)))?;
        if end > self.buf.len() {
            return Err(Error::BufferTooSmall {
                needed: end,
                capacity: self.buf.len(),
            });
        }
        self.buf[at..end].fill(0);
        self.pos = end;
        Ok(at)
    }

    fn put(&mut self, at: usize, value: u64) -> Result<()> {
        self.slot(at, WORD)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn put_u32(&mut self, at: usize, value: u32) -> Result<()> {
        self.slot(at, 4)?.copy_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn put_bytes(&mut self, at: usize, bytes: &[u8]) -> Result<()> {
        self.slot(at, bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }

    fn payload(
        walk: &mut Walk<'_, Self>,
        plugin: &dyn ExtensionPlugin,
        ext: &ExtInstance,
        substmts: FlatSubstmts,
    ) -> Result<u64> {
        plugin.compiled_print(ext, substmts, walk)
    }
}
