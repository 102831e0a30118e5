//! Entry points of the two passes.

use crate::addr_map::AddressMap;
use crate::error::{Error, Result};
use crate::schema::Context;
use crate::sink::{SizeSink, WriteSink};
use crate::walk::Walk;

fn check_fresh(map: &AddressMap) -> Result<()> {
    if map.is_empty() {
        Ok(())
    } else {
        Err(Error::InvalidArgument("address map must be empty"))
    }
}

/// Number of bytes [`compiled_context_flatten`] writes for `ctx`.
pub fn compiled_context_size(ctx: &Context, map: &mut AddressMap) -> Result<usize> {
    check_fresh(map)?;
    Walk::new(ctx, map, SizeSink::new()).run()
}

/// Writes the snapshot of `ctx` at the start of `dest` and returns its
/// length. On error the contents of `dest` are meaningless.
pub fn compiled_context_flatten(
    ctx: &Context,
    dest: &mut [u8],
    map: &mut AddressMap,
) -> Result<usize> {
    check_fresh(map)?;
    Walk::new(ctx, map, WriteSink::new(dest)).run()
}

impl Context {
    pub fn compiled_size(&self) -> Result<usize> {
        compiled_context_size(self, &mut AddressMap::new())
    }

    pub fn compiled_print(&self, dest: &mut [u8]) -> Result<usize> {
        compiled_context_flatten(self, dest, &mut AddressMap::new())
    }

    /// Sizes, allocates and writes a snapshot of the context.
    pub fn to_snapshot(&self) -> Result<Vec<u8>> {
        let sized = self.compiled_size()?;
        let mut buf = vec![0u8; sized];
        let written = self.compiled_print(&mut buf)?;
        if written != sized {
            return Err(Error::SizeMismatch { sized, written });
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{self, WORD};
    use crate::schema::Module;

    /// Invariant: an empty context still yields a header and a context record.
    #[test]
    fn empty_context() {
        let ctx = Context::new();
        let size = ctx.compiled_size().unwrap();
        let dict = layout::dict::WORDS * WORD + layout::array_len(8, layout::dict_rec::WORDS);
        assert_eq!(
            size,
            (layout::header::WORDS + layout::context::WORDS) * WORD + dict
        );
        let snap = ctx.to_snapshot().unwrap();
        assert_eq!(snap.len(), size);
        assert_eq!(&snap[..8], b"YANGSNP1");
        assert_eq!(u64::from_le_bytes(snap[8..16].try_into().unwrap()), size as u64);
    }

    /// Invariant: a reused address map is rejected.
    #[test]
    fn map_must_be_fresh() {
        let mut ctx = Context::new();
        let name = ctx.intern("m");
        ctx.add_module(Module::new(name));
        let mut map = AddressMap::new();
        compiled_context_size(&ctx, &mut map).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(
            compiled_context_size(&ctx, &mut map),
            Err(Error::InvalidArgument("address map must be empty"))
        );
    }
}
