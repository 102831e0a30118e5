//! Record layouts of the flattened snapshot.
//!
//! Every record is a run of little-endian 8-byte words. Pointer words hold
//! offsets from the start of the snapshot, `0` meaning null. The constants
//! below are word indices inside each record; `WORDS` is the record length.

use crate::schema::{BaseType, NodeType};

pub const WORD: usize = 8;

/// `b"YANGSNP1"` read as a little-endian word.
pub const MAGIC: u64 = u64::from_le_bytes(*b"YANGSNP1");

pub const fn align8(len: usize) -> usize {
    (len + WORD - 1) & !(WORD - 1)
}

/// Bytes taken by a NUL-terminated string body of `len` bytes.
pub const fn str_len(len: usize) -> usize {
    align8(len + 1)
}

/// Bytes taken by a sized array of `count` records of `elem_words` words.
pub const fn array_len(count: usize, elem_words: usize) -> usize {
    if count == 0 {
        0
    } else {
        (1 + count * elem_words) * WORD
    }
}

pub mod header {
    pub const MAGIC: usize = 0;
    /// Total snapshot length in bytes.
    pub const LENGTH: usize = 1;
    pub const WORDS: usize = 2;
}

pub mod context {
    pub const DICT: usize = 0;
    pub const MODULES: usize = 1;
    pub const EXT_PLUGINS: usize = 2;
    pub const CHANGE_COUNT: usize = 3;
    pub const OPTS: usize = 4;
    pub const WORDS: usize = 5;
}

/// Dictionary image: the table header, then one record per slot.
pub mod dict {
    pub const SIZE: usize = 0;
    pub const USED: usize = 1;
    pub const INVALID: usize = 2;
    pub const RECORDS: usize = 3;
    pub const WORDS: usize = 4;
}

pub mod dict_rec {
    /// Hash in the low half, hits (as `i32`) in the high half.
    pub const HASH_HITS: usize = 0;
    pub const VALUE: usize = 1;
    pub const REFCOUNT: usize = 2;
    pub const WORDS: usize = 3;
}

pub mod module {
    pub const CTX: usize = 0;
    pub const NAME: usize = 1;
    pub const REVISION: usize = 2;
    pub const NS: usize = 3;
    pub const PREFIX: usize = 4;
    pub const FILEPATH: usize = 5;
    pub const ORG: usize = 6;
    pub const CONTACT: usize = 7;
    pub const DSC: usize = 8;
    pub const REF: usize = 9;
    pub const COMPILED: usize = 10;
    pub const EXTENSIONS: usize = 11;
    pub const IDENTITIES: usize = 12;
    pub const SUBMODULES: usize = 13;
    pub const AUGMENTED_BY: usize = 14;
    pub const DEVIATED_BY: usize = 15;
    /// `implemented` in bit 0, latest-revision flags from bit 8.
    pub const FLAGS: usize = 16;
    pub const WORDS: usize = 17;
}

pub mod compiled {
    pub const MOD: usize = 0;
    pub const FEATURES: usize = 1;
    pub const DATA: usize = 2;
    pub const RPCS: usize = 3;
    pub const NOTIFS: usize = 4;
    pub const EXTS: usize = 5;
    pub const WORDS: usize = 6;
}

/// Schema nodes: common fields, then the fields of the node's kind.
pub mod node {
    /// Nodetype in bits 0..16, flags in 16..32, schema hash in 32..64.
    pub const NODETYPE: usize = 0;
    pub const MODULE: usize = 1;
    pub const PARENT: usize = 2;
    pub const NEXT: usize = 3;
    pub const PREV: usize = 4;
    pub const NAME: usize = 5;
    pub const DSC: usize = 6;
    pub const REF: usize = 7;
    pub const EXTS: usize = 8;
    pub const COMMON: usize = 9;

    pub mod container {
        use super::COMMON;
        pub const CHILD: usize = COMMON;
        pub const MUSTS: usize = COMMON + 1;
        pub const WHEN: usize = COMMON + 2;
        pub const ACTIONS: usize = COMMON + 3;
        pub const NOTIFS: usize = COMMON + 4;
        pub const WORDS: usize = COMMON + 5;
    }

    pub mod choice {
        use super::COMMON;
        pub const CASES: usize = COMMON;
        pub const WHEN: usize = COMMON + 1;
        pub const DFLT: usize = COMMON + 2;
        pub const WORDS: usize = COMMON + 3;
    }

    pub mod case {
        use super::COMMON;
        pub const CHILD: usize = COMMON;
        pub const WHEN: usize = COMMON + 1;
        pub const WORDS: usize = COMMON + 2;
    }

    pub mod leaf {
        use super::COMMON;
        pub const MUSTS: usize = COMMON;
        pub const WHEN: usize = COMMON + 1;
        pub const TYPE: usize = COMMON + 2;
        pub const UNITS: usize = COMMON + 3;
        pub const DFLT: usize = COMMON + 4;
        pub const DFLT_PREFIXES: usize = COMMON + 5;
        pub const WORDS: usize = COMMON + 6;
    }

    pub mod leaflist {
        use super::COMMON;
        pub const MUSTS: usize = COMMON;
        pub const WHEN: usize = COMMON + 1;
        pub const TYPE: usize = COMMON + 2;
        pub const UNITS: usize = COMMON + 3;
        pub const DFLTS: usize = COMMON + 4;
        pub const MIN: usize = COMMON + 5;
        pub const MAX: usize = COMMON + 6;
        pub const WORDS: usize = COMMON + 7;
    }

    pub mod list {
        use super::COMMON;
        pub const CHILD: usize = COMMON;
        pub const MUSTS: usize = COMMON + 1;
        pub const WHEN: usize = COMMON + 2;
        pub const ACTIONS: usize = COMMON + 3;
        pub const NOTIFS: usize = COMMON + 4;
        pub const UNIQUES: usize = COMMON + 5;
        pub const MIN: usize = COMMON + 6;
        pub const MAX: usize = COMMON + 7;
        pub const WORDS: usize = COMMON + 8;
    }

    /// Anydata and anyxml.
    pub mod anydata {
        use super::COMMON;
        pub const MUSTS: usize = COMMON;
        pub const WHEN: usize = COMMON + 1;
        pub const WORDS: usize = COMMON + 2;
    }

    /// Rpc and action.
    pub mod action {
        use super::COMMON;
        pub const WHEN: usize = COMMON;
        pub const INPUT: usize = COMMON + 1;
        pub const OUTPUT: usize = COMMON + 2;
        pub const WORDS: usize = COMMON + 3;
    }

    /// Input and output.
    pub mod inout {
        use super::COMMON;
        pub const CHILD: usize = COMMON;
        pub const MUSTS: usize = COMMON + 1;
        pub const WORDS: usize = COMMON + 2;
    }

    pub mod notif {
        use super::COMMON;
        pub const CHILD: usize = COMMON;
        pub const MUSTS: usize = COMMON + 1;
        pub const WHEN: usize = COMMON + 2;
        pub const WORDS: usize = COMMON + 3;
    }
}

pub fn node_words(nodetype: NodeType) -> usize {
    match nodetype {
        NodeType::Container => node::container::WORDS,
        NodeType::Choice => node::choice::WORDS,
        NodeType::Case => node::case::WORDS,
        NodeType::Leaf => node::leaf::WORDS,
        NodeType::LeafList => node::leaflist::WORDS,
        NodeType::List => node::list::WORDS,
        NodeType::AnyData | NodeType::AnyXml => node::anydata::WORDS,
        NodeType::Rpc | NodeType::Action => node::action::WORDS,
        NodeType::Input | NodeType::Output => node::inout::WORDS,
        NodeType::Notif => node::notif::WORDS,
    }
}

/// Default value of a leaf-list.
pub mod value {
    pub const STR: usize = 0;
    pub const PREFIXES: usize = 1;
    pub const WORDS: usize = 2;
}

pub mod when {
    pub const COND: usize = 0;
    pub const CONTEXT: usize = 1;
    pub const PREFIXES: usize = 2;
    pub const DSC: usize = 3;
    pub const REF: usize = 4;
    pub const EXTS: usize = 5;
    pub const REFCOUNT: usize = 6;
    pub const FLAGS: usize = 7;
    pub const WORDS: usize = 8;
}

pub mod must {
    pub const COND: usize = 0;
    pub const PREFIXES: usize = 1;
    pub const DSC: usize = 2;
    pub const REF: usize = 3;
    pub const EMSG: usize = 4;
    pub const EAPPTAG: usize = 5;
    pub const EXTS: usize = 6;
    pub const WORDS: usize = 7;
}

/// Parsed expression. Token tables are blocks of `u32`.
pub mod expr {
    pub const EXPR: usize = 0;
    pub const USED: usize = 1;
    pub const TOKENS: usize = 2;
    pub const TOK_POS: usize = 3;
    pub const TOK_LEN: usize = 4;
    /// Block of `USED` words, each null or a zero-terminated `u32` block.
    pub const REPEAT: usize = 5;
    pub const WORDS: usize = 6;
}

pub mod prefix {
    pub const PREFIX: usize = 0;
    pub const MODULE: usize = 1;
    pub const WORDS: usize = 2;
}

pub mod range {
    pub const PARTS: usize = 0;
    pub const DSC: usize = 1;
    pub const REF: usize = 2;
    pub const EMSG: usize = 3;
    pub const EAPPTAG: usize = 4;
    pub const EXTS: usize = 5;
    pub const WORDS: usize = 6;
}

pub mod range_part {
    pub const MIN: usize = 0;
    pub const MAX: usize = 1;
    pub const WORDS: usize = 2;
}

pub mod pattern {
    pub const EXPR: usize = 0;
    pub const CODE: usize = 1;
    pub const CODE_LEN: usize = 2;
    pub const DSC: usize = 3;
    pub const REF: usize = 4;
    pub const EMSG: usize = 5;
    pub const EAPPTAG: usize = 6;
    pub const EXTS: usize = 7;
    pub const INVERTED: usize = 8;
    pub const REFCOUNT: usize = 9;
    pub const WORDS: usize = 10;
}

pub mod enum_item {
    pub const NAME: usize = 0;
    pub const DSC: usize = 1;
    pub const REF: usize = 2;
    pub const EXTS: usize = 3;
    pub const VALUE: usize = 4;
    pub const FLAGS: usize = 5;
    pub const WORDS: usize = 6;
}

/// Compiled types: common fields, then the fields of the base type.
pub mod ty {
    /// Base type code in the low half, refcount in the high half.
    pub const BASE_REFCOUNT: usize = 0;
    pub const NAME: usize = 1;
    pub const EXTS: usize = 2;
    pub const COMMON: usize = 3;

    /// Binary and string.
    pub const LENGTH: usize = COMMON;
    /// Integers.
    pub const RANGE: usize = COMMON;
    pub const FRACTION_DIGITS: usize = COMMON;
    pub const DEC64_RANGE: usize = COMMON + 1;
    pub const PATTERNS: usize = COMMON + 1;
    /// Enumeration and bits.
    pub const ITEMS: usize = COMMON;
    pub const BASES: usize = COMMON;
    pub const REQUIRE_INSTANCE: usize = COMMON;
    pub const PATH: usize = COMMON;
    pub const PREFIXES: usize = COMMON + 1;
    pub const REALTYPE: usize = COMMON + 2;
    pub const LEAFREF_REQUIRE_INSTANCE: usize = COMMON + 3;
    pub const TYPES: usize = COMMON;
}

pub fn type_words(base: BaseType) -> usize {
    let extra = match base {
        BaseType::Unknown | BaseType::Bool | BaseType::Empty => 0,
        BaseType::Binary => 1,
        BaseType::Int8 | BaseType::Int16 | BaseType::Int32 | BaseType::Int64 => 1,
        BaseType::Uint8 | BaseType::Uint16 | BaseType::Uint32 | BaseType::Uint64 => 1,
        BaseType::Dec64 => 2,
        BaseType::String => 2,
        BaseType::Enum | BaseType::Bits => 1,
        BaseType::IdentityRef => 1,
        BaseType::InstanceId => 1,
        BaseType::LeafRef => 4,
        BaseType::Union => 1,
    };
    ty::COMMON + extra
}

pub mod ext {
    pub const DEF: usize = 0;
    pub const ARGUMENT: usize = 1;
    pub const MODULE: usize = 2;
    pub const EXTS: usize = 3;
    /// Record the instance belongs to.
    pub const PARENT: usize = 4;
    pub const PARENT_STMT: usize = 5;
    pub const PARENT_STMT_INDEX: usize = 6;
    pub const SUBSTMTS: usize = 7;
    /// Plugin payload.
    pub const COMPILED: usize = 8;
    pub const WORDS: usize = 9;
}

pub mod substmt {
    pub const STMT: usize = 0;
    /// Points at the substatement's slot inside the compiled payload.
    pub const STORAGE: usize = 1;
    pub const WORDS: usize = 2;
}

pub mod extdef {
    pub const NAME: usize = 0;
    pub const ARGNAME: usize = 1;
    pub const EXTS: usize = 2;
    /// Registry index plus one, `0` without a plugin.
    pub const PLUGIN: usize = 3;
    pub const MODULE: usize = 4;
    pub const FLAGS: usize = 5;
    pub const WORDS: usize = 6;
}

pub mod identity {
    pub const NAME: usize = 0;
    pub const DSC: usize = 1;
    pub const REF: usize = 2;
    pub const MODULE: usize = 3;
    pub const DERIVED: usize = 4;
    pub const EXTS: usize = 5;
    pub const FLAGS: usize = 6;
    pub const WORDS: usize = 7;
}

pub mod submodule {
    pub const NAME: usize = 0;
    pub const REVISION: usize = 1;
    pub const FILEPATH: usize = 2;
    pub const WORDS: usize = 3;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: string bodies keep a terminator and stay word-aligned.
    #[test]
    fn string_lengths() {
        assert_eq!(str_len(0), 8);
        assert_eq!(str_len(7), 8);
        assert_eq!(str_len(8), 16);
        assert_eq!(align8(17), 24);
        assert_eq!(array_len(0, 5), 0);
        assert_eq!(array_len(2, 3), 56);
    }

    /// Invariant: every kind-specific field lies inside its record.
    #[test]
    fn fields_fit_records() {
        assert!(node::leaf::DFLT_PREFIXES < node_words(NodeType::Leaf));
        assert!(node::list::MAX < node_words(NodeType::List));
        assert_eq!(node_words(NodeType::AnyXml), node_words(NodeType::AnyData));
        assert!(ty::LEAFREF_REQUIRE_INSTANCE < type_words(BaseType::LeafRef));
        assert!(ty::PATTERNS < type_words(BaseType::String));
        assert!(ty::DEC64_RANGE < type_words(BaseType::Dec64));
        assert_eq!(type_words(BaseType::Bool), ty::COMMON);
    }
}
