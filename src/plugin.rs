//! Extension plugins and the contract their compiled payloads follow.

use crate::error::Result;
use crate::schema::ExtInstance;
use crate::walk::{ext_stmt_storage_flatten, ext_stmt_storage_size, Printer, Sizer};

/// Location of an extension instance's substatement array in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatSubstmts {
    /// The extension instance record.
    pub ext: usize,
    /// First substatement record, `0` when there are none.
    pub array: usize,
    pub count: usize,
}

/// Code that owns the compiled payload of an extension.
///
/// `compiled_size` and `compiled_print` must lay out exactly the same bytes:
/// the size pass checks that the reported size matches what was laid out.
/// The defaults store every substatement in its standard compiled form.
pub trait ExtensionPlugin: Send + Sync {
    /// Stable identifier, copied into the snapshot's plugin registry.
    fn id(&self) -> &str;

    /// Lays out the payload in the size pass and returns its size in bytes.
    fn compiled_size(
        &self,
        ext: &ExtInstance,
        substmts: FlatSubstmts,
        sizer: &mut Sizer<'_>,
    ) -> Result<usize> {
        ext_stmt_storage_size(sizer, ext, substmts)
    }

    /// Writes the payload and returns its offset.
    fn compiled_print(
        &self,
        ext: &ExtInstance,
        substmts: FlatSubstmts,
        printer: &mut Printer<'_, '_>,
    ) -> Result<u64> {
        ext_stmt_storage_flatten(printer, ext, substmts)
    }
}

/// Plugin whose payload is the standard substatement storage.
#[derive(Debug, Clone)]
pub struct StoragePlugin {
    id: String,
}

impl StoragePlugin {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl ExtensionPlugin for StoragePlugin {
    fn id(&self) -> &str {
        &self.id
    }
}
