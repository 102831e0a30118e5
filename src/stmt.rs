//! YANG statement kinds and the typed storage of compiled extension substatements.

use crate::dict::DictStr;
use crate::schema::{EnumItem, ExtInstance, Identity, Must, NodeKey, Pattern, Range, Type, When};
use core::fmt;
use std::sync::Arc;

macro_rules! statements {
    ($($variant:ident => $keyword:literal,)*) => {
        /// Statement kinds, numbered in declaration order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum Stmt {
            $($variant,)*
        }

        impl Stmt {
            pub const ALL: &'static [Stmt] = &[$(Stmt::$variant,)*];

            pub fn keyword(self) -> &'static str {
                match self {
                    $(Stmt::$variant => $keyword,)*
                }
            }
        }
    };
}

statements! {
    None => "none",
    Status => "status",
    Config => "config",
    Mandatory => "mandatory",
    Units => "units",
    Default => "default",
    Type => "type",
    Action => "action",
    Anydata => "anydata",
    Anyxml => "anyxml",
    Argument => "argument",
    Augment => "augment",
    Base => "base",
    BelongsTo => "belongs-to",
    Bit => "bit",
    Case => "case",
    Choice => "choice",
    Contact => "contact",
    Container => "container",
    Description => "description",
    Deviate => "deviate",
    Deviation => "deviation",
    Enum => "enum",
    ErrorAppTag => "error-app-tag",
    ErrorMessage => "error-message",
    Extension => "extension",
    Feature => "feature",
    FractionDigits => "fraction-digits",
    Grouping => "grouping",
    Identity => "identity",
    IfFeature => "if-feature",
    Import => "import",
    Include => "include",
    Input => "input",
    Key => "key",
    Leaf => "leaf",
    LeafList => "leaf-list",
    Length => "length",
    List => "list",
    MaxElements => "max-elements",
    MinElements => "min-elements",
    Modifier => "modifier",
    Module => "module",
    Must => "must",
    Namespace => "namespace",
    Notification => "notification",
    OrderedBy => "ordered-by",
    Organization => "organization",
    Output => "output",
    Path => "path",
    Pattern => "pattern",
    Position => "position",
    Prefix => "prefix",
    Presence => "presence",
    Range => "range",
    Reference => "reference",
    Refine => "refine",
    RequireInstance => "require-instance",
    Revision => "revision",
    RevisionDate => "revision-date",
    Rpc => "rpc",
    Submodule => "submodule",
    Typedef => "typedef",
    Unique => "unique",
    Uses => "uses",
    Value => "value",
    When => "when",
    YangVersion => "yang-version",
    YinElement => "yin-element",
    ExtensionInstance => "extension-instance",
    SyntaxSemicolon => ";",
    SyntaxLeftBrace => "{",
    SyntaxRightBrace => "}",
    ArgText => "argument-text",
    ArgValue => "argument-value",
}

/// The storage a compiled statement kind uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Nodes,
    Str,
    Items,
    Flags,
    UInt8,
    UInt32,
    Int64,
    Exts,
    Identities,
    Range,
    Musts,
    Patterns,
    Type,
    When,
    /// Allowed as a substatement but carries nothing once compiled.
    NotCompiled,
}

impl Stmt {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<Stmt> {
        Stmt::ALL.get(usize::from(code)).copied()
    }

    /// `None` for kinds that never survive compilation.
    pub fn storage_class(self) -> Option<StorageClass> {
        use Stmt as S;
        let class = match self {
            S::Notification | S::Input | S::Output | S::Action | S::Rpc => StorageClass::Nodes,
            S::Anydata | S::Anyxml | S::Case | S::Choice | S::Container => StorageClass::Nodes,
            S::Leaf | S::LeafList | S::List | S::Uses => StorageClass::Nodes,
            S::Argument | S::Contact | S::Description | S::ErrorAppTag => StorageClass::Str,
            S::ErrorMessage | S::Key | S::Modifier | S::Namespace => StorageClass::Str,
            S::Organization | S::Presence | S::Reference | S::Units => StorageClass::Str,
            S::Bit | S::Enum => StorageClass::Items,
            S::Config | S::Mandatory | S::OrderedBy | S::Status => StorageClass::Flags,
            S::FractionDigits | S::RequireInstance => StorageClass::UInt8,
            S::MaxElements | S::MinElements => StorageClass::UInt32,
            S::Position | S::Value => StorageClass::Int64,
            S::ExtensionInstance => StorageClass::Exts,
            S::Identity => StorageClass::Identities,
            S::Length | S::Range => StorageClass::Range,
            S::Must => StorageClass::Musts,
            S::Pattern => StorageClass::Patterns,
            S::Type => StorageClass::Type,
            S::When => StorageClass::When,
            S::IfFeature => StorageClass::NotCompiled,
            S::None | S::Augment | S::Grouping | S::Base | S::BelongsTo | S::Default
            | S::Deviate | S::Deviation | S::Extension | S::Feature | S::Import | S::Include
            | S::Module | S::Path | S::Prefix | S::Refine | S::Revision | S::RevisionDate
            | S::Submodule | S::Typedef | S::Unique | S::YangVersion | S::YinElement
            | S::SyntaxSemicolon | S::SyntaxLeftBrace | S::SyntaxRightBrace | S::ArgText
            | S::ArgValue => return None,
        };
        Some(class)
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Compiled value of one extension substatement.
#[derive(Debug, Clone)]
pub enum SubstmtStorage {
    /// Sibling list of schema nodes in the extension's module.
    Nodes(Vec<NodeKey>),
    Str(Option<DictStr>),
    Items(Vec<EnumItem>),
    Flags(u16),
    UInt8(u8),
    UInt32(u32),
    Int64(i64),
    Exts(Vec<ExtInstance>),
    Identities(Vec<Identity>),
    Range(Option<Range>),
    Musts(Vec<Must>),
    Patterns(Vec<Arc<Pattern>>),
    Type(Option<Arc<Type>>),
    When(Option<Arc<When>>),
    NotCompiled,
}

impl SubstmtStorage {
    pub fn class(&self) -> StorageClass {
        match self {
            SubstmtStorage::Nodes(_) => StorageClass::Nodes,
            SubstmtStorage::Str(_) => StorageClass::Str,
            SubstmtStorage::Items(_) => StorageClass::Items,
            SubstmtStorage::Flags(_) => StorageClass::Flags,
            SubstmtStorage::UInt8(_) => StorageClass::UInt8,
            SubstmtStorage::UInt32(_) => StorageClass::UInt32,
            SubstmtStorage::Int64(_) => StorageClass::Int64,
            SubstmtStorage::Exts(_) => StorageClass::Exts,
            SubstmtStorage::Identities(_) => StorageClass::Identities,
            SubstmtStorage::Range(_) => StorageClass::Range,
            SubstmtStorage::Musts(_) => StorageClass::Musts,
            SubstmtStorage::Patterns(_) => StorageClass::Patterns,
            SubstmtStorage::Type(_) => StorageClass::Type,
            SubstmtStorage::When(_) => StorageClass::When,
            SubstmtStorage::NotCompiled => StorageClass::NotCompiled,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Substmt {
    pub stmt: Stmt,
    pub storage: SubstmtStorage,
}

impl Substmt {
    pub fn new(stmt: Stmt, storage: SubstmtStorage) -> Self {
        Self { stmt, storage }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: codes are dense and round-trip through `from_code`.
    #[test]
    fn codes_round_trip() {
        for (i, s) in Stmt::ALL.iter().enumerate() {
            assert_eq!(s.code() as usize, i);
            assert_eq!(Stmt::from_code(s.code()), Some(*s));
        }
        assert_eq!(Stmt::from_code(Stmt::ALL.len() as u16), None);
        assert_eq!(Stmt::LeafList.to_string(), "leaf-list");
    }

    /// Invariant: declaration-only statements have no compiled storage.
    #[test]
    fn uncompiled_kinds() {
        for s in [Stmt::Augment, Stmt::Grouping, Stmt::Typedef, Stmt::ArgValue, Stmt::None] {
            assert_eq!(s.storage_class(), Option::None, "{}", s);
        }
        assert_eq!(Stmt::IfFeature.storage_class(), Some(StorageClass::NotCompiled));
        assert_eq!(Stmt::Uses.storage_class(), Some(StorageClass::Nodes));
        assert_eq!(Stmt::Length.storage_class(), Some(StorageClass::Range));
    }
}
