//! Read-only views over a flattened context.
//!
//! Every read is bounds-checked; a malformed buffer yields
//! [`Error::InvalidSnapshot`], never a panic.

use crate::error::{Error, Result};
use crate::hash::hash_bytes;
use crate::layout::{self, WORD};
use crate::schema::{BaseType, NodeType};
use crate::stmt::Stmt;

fn invalid(what: &'static str) -> Error {
    Error::InvalidSnapshot(what)
}

#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    buf: &'a [u8],
}

impl<'a> Snapshot<'a> {
    /// Checks the header; `buf` may be longer than the snapshot.
    pub fn open(buf: &'a [u8]) -> Result<Self> {
        let header = layout::header::WORDS * WORD;
        if buf.len() < header {
            return Err(invalid("shorter than the header"));
        }
        let snap = Snapshot { buf };
        if snap.word(layout::header::MAGIC * WORD)? != layout::MAGIC {
            return Err(invalid("bad magic"));
        }
        let len = snap.word(layout::header::LENGTH * WORD)?;
        if len < header as u64 || len > buf.len() as u64 {
            return Err(invalid("length does not fit the buffer"));
        }
        Ok(Snapshot {
            buf: &buf[..len as usize],
        })
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.buf
    }

    pub fn word(&self, at: usize) -> Result<u64> {
        let bytes = at
            .checked_add(WORD)
            .and_then(|end| self.buf.get(at..end))
            .ok_or_else(|| invalid("word out of bounds"))?;
        let mut w = [0u8; WORD];
        w.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(w))
    }

    fn field(&self, rec: usize, field: usize) -> Result<u64> {
        self.word(rec + field * WORD)
    }

    /// Pointer field; `None` when null.
    fn ptr(&self, rec: usize, field: usize) -> Result<Option<usize>> {
        match self.field(rec, field)? {
            0 => Ok(None),
            off if off < self.buf.len() as u64 => Ok(Some(off as usize)),
            _ => Err(invalid("pointer out of bounds")),
        }
    }

    /// Element count of the sized array starting at `first`.
    fn count(&self, first: Option<usize>) -> Result<usize> {
        match first {
            None => Ok(0),
            Some(first) => {
                let count = self.word(first.checked_sub(WORD).ok_or_else(|| invalid("array header"))?)?;
                if count > (self.buf.len() / WORD) as u64 {
                    return Err(invalid("array count"));
                }
                Ok(count as usize)
            }
        }
    }

    /// Pointer words of the array `field` of `rec` points at.
    fn pointers(&self, rec: usize, field: usize) -> Result<Vec<usize>> {
        let first = self.ptr(rec, field)?;
        let count = self.count(first)?;
        let Some(first) = first else {
            return Ok(Vec::new());
        };
        (0..count)
            .map(|i| self.ptr(first, i)?.ok_or_else(|| invalid("null array element")))
            .collect()
    }

    /// NUL-terminated string at `at`.
    pub fn str_at(&self, at: usize) -> Result<&'a str> {
        let tail = self.buf.get(at..).ok_or_else(|| invalid("string out of bounds"))?;
        let end = tail
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| invalid("unterminated string"))?;
        std::str::from_utf8(&tail[..end]).map_err(|_| invalid("string is not UTF-8"))
    }

    fn opt_str(&self, rec: usize, field: usize) -> Result<Option<&'a str>> {
        self.ptr(rec, field)?.map(|at| self.str_at(at)).transpose()
    }

    pub fn context(&self) -> Result<ContextView<'a>> {
        Ok(ContextView {
            snap: *self,
            off: layout::header::WORDS * WORD,
        })
    }

    pub fn node(&self, off: usize) -> Result<NodeView<'a>> {
        let node = NodeView { snap: *self, off };
        node.nodetype()?;
        Ok(node)
    }

    pub fn ty(&self, off: usize) -> Result<TypeView<'a>> {
        let ty = TypeView { snap: *self, off };
        ty.base()?;
        Ok(ty)
    }

    pub fn pattern(&self, off: usize) -> PatternView<'a> {
        PatternView { snap: *self, off }
    }

    pub fn when(&self, off: usize) -> WhenView<'a> {
        WhenView { snap: *self, off }
    }

    /// Follows `next` pointers from `first`.
    fn sibling_list(&self, first: Option<usize>) -> Result<Vec<NodeView<'a>>> {
        let mut nodes = Vec::new();
        let mut cur = first;
        while let Some(off) = cur {
            if nodes.len() > self.buf.len() / WORD {
                return Err(invalid("sibling list does not end"));
            }
            let node = self.node(off)?;
            cur = self.ptr(off, layout::node::NEXT)?;
            nodes.push(node);
        }
        Ok(nodes)
    }
}

/// Dictionary string found in the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictEntry<'a> {
    pub offset: usize,
    pub value: &'a str,
    pub refcount: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct ContextView<'a> {
    snap: Snapshot<'a>,
    off: usize,
}

impl<'a> ContextView<'a> {
    pub fn change_count(&self) -> Result<u16> {
        Ok(self.snap.field(self.off, layout::context::CHANGE_COUNT)? as u16)
    }

    pub fn opts(&self) -> Result<u32> {
        Ok(self.snap.field(self.off, layout::context::OPTS)? as u32)
    }

    pub fn modules(&self) -> Result<Vec<ModuleView<'a>>> {
        let snap = self.snap;
        Ok(snap
            .pointers(self.off, layout::context::MODULES)?
            .into_iter()
            .map(|off| ModuleView { snap, off })
            .collect())
    }

    pub fn module(&self, name: &str) -> Result<Option<ModuleView<'a>>> {
        for module in self.modules()? {
            if module.name()? == name {
                return Ok(Some(module));
            }
        }
        Ok(None)
    }

    pub fn plugin_ids(&self) -> Result<Vec<&'a str>> {
        self.snap
            .pointers(self.off, layout::context::EXT_PLUGINS)?
            .into_iter()
            .map(|off| self.snap.str_at(off))
            .collect()
    }

    fn dict(&self) -> Result<usize> {
        self.snap
            .ptr(self.off, layout::context::DICT)?
            .ok_or_else(|| invalid("missing dictionary"))
    }

    pub fn dict_size(&self) -> Result<usize> {
        Ok(self.snap.field(self.dict()?, layout::dict::SIZE)? as usize)
    }

    pub fn dict_len(&self) -> Result<usize> {
        Ok(self.snap.field(self.dict()?, layout::dict::USED)? as usize)
    }

    fn dict_slot(&self, records: usize, i: usize) -> Result<(u32, i32, usize)> {
        let at = records + i * layout::dict_rec::WORDS * WORD;
        let hash_hits = self.snap.field(at, layout::dict_rec::HASH_HITS)?;
        Ok((hash_hits as u32, (hash_hits >> 32) as u32 as i32, at))
    }

    fn dict_entry(&self, at: usize) -> Result<DictEntry<'a>> {
        let offset = self
            .snap
            .ptr(at, layout::dict_rec::VALUE)?
            .ok_or_else(|| invalid("live dictionary slot without a string"))?;
        Ok(DictEntry {
            offset,
            value: self.snap.str_at(offset)?,
            refcount: self.snap.field(at, layout::dict_rec::REFCOUNT)? as u32,
        })
    }

    fn dict_records(&self) -> Result<(usize, usize)> {
        let dict = self.dict()?;
        let size = self.dict_size()?;
        let records = self
            .snap
            .ptr(dict, layout::dict::RECORDS)?
            .ok_or_else(|| invalid("missing dictionary records"))?;
        if self.snap.count(Some(records))? != size || !size.is_power_of_two() {
            return Err(invalid("dictionary size"));
        }
        Ok((records, size))
    }

    /// Live strings in slot order.
    pub fn dict_strings(&self) -> Result<Vec<DictEntry<'a>>> {
        let (records, size) = self.dict_records()?;
        let mut entries = Vec::new();
        for i in 0..size {
            let (_, hits, at) = self.dict_slot(records, i)?;
            if hits > 0 {
                entries.push(self.dict_entry(at)?);
            }
        }
        Ok(entries)
    }

    /// Probes the flattened table the way the live one is probed.
    pub fn dict_lookup(&self, s: &str) -> Result<Option<DictEntry<'a>>> {
        let (records, size) = self.dict_records()?;
        let hash = hash_bytes(s.as_bytes());
        let mask = size - 1;
        let mut i = hash as usize & mask;
        for _ in 0..size {
            let (slot_hash, hits, at) = self.dict_slot(records, i)?;
            if hits == 0 {
                break;
            }
            if hits > 0 && slot_hash == hash {
                let entry = self.dict_entry(at)?;
                if entry.value == s {
                    return Ok(Some(entry));
                }
            }
            i = (i + 1) & mask;
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ModuleView<'a> {
    snap: Snapshot<'a>,
    off: usize,
}

impl<'a> ModuleView<'a> {
    pub fn offset(&self) -> usize {
        self.off
    }

    pub fn name(&self) -> Result<&'a str> {
        self.snap
            .opt_str(self.off, layout::module::NAME)?
            .ok_or_else(|| invalid("module without a name"))
    }

    pub fn revision(&self) -> Result<Option<&'a str>> {
        self.snap.opt_str(self.off, layout::module::REVISION)
    }

    pub fn ns(&self) -> Result<Option<&'a str>> {
        self.snap.opt_str(self.off, layout::module::NS)
    }

    pub fn prefix(&self) -> Result<Option<&'a str>> {
        self.snap.opt_str(self.off, layout::module::PREFIX)
    }

    pub fn implemented(&self) -> Result<bool> {
        Ok(self.snap.field(self.off, layout::module::FLAGS)? & 1 != 0)
    }

    fn compiled(&self) -> Result<Option<usize>> {
        self.snap.ptr(self.off, layout::module::COMPILED)
    }

    pub fn is_compiled(&self) -> Result<bool> {
        Ok(self.compiled()?.is_some())
    }

    fn roots(&self, field: usize) -> Result<Vec<NodeView<'a>>> {
        let Some(compiled) = self.compiled()? else {
            return Ok(Vec::new());
        };
        self.snap.sibling_list(self.snap.ptr(compiled, field)?)
    }

    pub fn data(&self) -> Result<Vec<NodeView<'a>>> {
        self.roots(layout::compiled::DATA)
    }

    pub fn rpcs(&self) -> Result<Vec<NodeView<'a>>> {
        self.roots(layout::compiled::RPCS)
    }

    pub fn notifs(&self) -> Result<Vec<NodeView<'a>>> {
        self.roots(layout::compiled::NOTIFS)
    }

    pub fn features(&self) -> Result<Vec<&'a str>> {
        let Some(compiled) = self.compiled()? else {
            return Ok(Vec::new());
        };
        self.snap
            .pointers(compiled, layout::compiled::FEATURES)?
            .into_iter()
            .map(|off| self.snap.str_at(off))
            .collect()
    }

    fn inline_names(&self, field: usize, words: usize, name: usize) -> Result<Vec<(usize, &'a str)>> {
        let first = self.snap.ptr(self.off, field)?;
        let count = self.snap.count(first)?;
        let Some(first) = first else {
            return Ok(Vec::new());
        };
        (0..count)
            .map(|i| {
                let at = first + i * words * WORD;
                let s = self
                    .snap
                    .opt_str(at, name)?
                    .ok_or_else(|| invalid("record without a name"))?;
                Ok((at, s))
            })
            .collect()
    }

    /// Identity records with their names.
    pub fn identities(&self) -> Result<Vec<(usize, &'a str)>> {
        self.inline_names(
            layout::module::IDENTITIES,
            layout::identity::WORDS,
            layout::identity::NAME,
        )
    }

    /// Extension definition records with their names.
    pub fn extensions(&self) -> Result<Vec<(usize, &'a str)>> {
        self.inline_names(
            layout::module::EXTENSIONS,
            layout::extdef::WORDS,
            layout::extdef::NAME,
        )
    }

    /// Offsets of the modules augmenting this one.
    pub fn augmented_by(&self) -> Result<Vec<usize>> {
        self.snap.pointers(self.off, layout::module::AUGMENTED_BY)
    }

    pub fn deviated_by(&self) -> Result<Vec<usize>> {
        self.snap.pointers(self.off, layout::module::DEVIATED_BY)
    }

    /// Derived identities of the identity record at `at`.
    pub fn identity_derived(&self, at: usize) -> Result<Vec<usize>> {
        self.snap.pointers(at, layout::identity::DERIVED)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeView<'a> {
    snap: Snapshot<'a>,
    off: usize,
}

impl<'a> NodeView<'a> {
    pub fn offset(&self) -> usize {
        self.off
    }

    pub fn nodetype(&self) -> Result<NodeType> {
        let packed = self.snap.field(self.off, layout::node::NODETYPE)?;
        NodeType::from_code(packed as u16).ok_or_else(|| invalid("unknown node type"))
    }

    pub fn flags(&self) -> Result<u16> {
        Ok((self.snap.field(self.off, layout::node::NODETYPE)? >> 16) as u16)
    }

    pub fn hash(&self) -> Result<[u8; 4]> {
        let packed = self.snap.field(self.off, layout::node::NODETYPE)?;
        Ok(((packed >> 32) as u32).to_le_bytes())
    }

    pub fn name(&self) -> Result<&'a str> {
        self.snap
            .opt_str(self.off, layout::node::NAME)?
            .ok_or_else(|| invalid("node without a name"))
    }

    pub fn name_offset(&self) -> Result<usize> {
        self.snap
            .ptr(self.off, layout::node::NAME)?
            .ok_or_else(|| invalid("node without a name"))
    }

    pub fn dsc(&self) -> Result<Option<&'a str>> {
        self.snap.opt_str(self.off, layout::node::DSC)
    }

    /// Offset of the owning module record.
    pub fn module(&self) -> Result<usize> {
        self.snap
            .ptr(self.off, layout::node::MODULE)?
            .ok_or_else(|| invalid("node without a module"))
    }

    fn node_at(&self, field: usize) -> Result<Option<NodeView<'a>>> {
        self.snap
            .ptr(self.off, field)?
            .map(|off| self.snap.node(off))
            .transpose()
    }

    pub fn parent(&self) -> Result<Option<NodeView<'a>>> {
        self.node_at(layout::node::PARENT)
    }

    pub fn next(&self) -> Result<Option<NodeView<'a>>> {
        self.node_at(layout::node::NEXT)
    }

    pub fn prev(&self) -> Result<Option<NodeView<'a>>> {
        self.node_at(layout::node::PREV)
    }

    fn child_field(nodetype: NodeType) -> Option<usize> {
        use layout::node as n;
        match nodetype {
            NodeType::Container => Some(n::container::CHILD),
            NodeType::Choice => Some(n::choice::CASES),
            NodeType::Case => Some(n::case::CHILD),
            NodeType::List => Some(n::list::CHILD),
            NodeType::Input | NodeType::Output => Some(n::inout::CHILD),
            NodeType::Notif => Some(n::notif::CHILD),
            _ => None,
        }
    }

    /// Data children; the cases of a choice.
    pub fn children(&self) -> Result<Vec<NodeView<'a>>> {
        let Some(field) = Self::child_field(self.nodetype()?) else {
            return Ok(Vec::new());
        };
        self.snap.sibling_list(self.snap.ptr(self.off, field)?)
    }

    pub fn actions(&self) -> Result<Vec<NodeView<'a>>> {
        let field = match self.nodetype()? {
            NodeType::Container => layout::node::container::ACTIONS,
            NodeType::List => layout::node::list::ACTIONS,
            _ => return Ok(Vec::new()),
        };
        self.snap.sibling_list(self.snap.ptr(self.off, field)?)
    }

    pub fn input(&self) -> Result<Option<NodeView<'a>>> {
        match self.nodetype()? {
            NodeType::Rpc | NodeType::Action => self.node_at(layout::node::action::INPUT),
            _ => Ok(None),
        }
    }

    pub fn output(&self) -> Result<Option<NodeView<'a>>> {
        match self.nodetype()? {
            NodeType::Rpc | NodeType::Action => self.node_at(layout::node::action::OUTPUT),
            _ => Ok(None),
        }
    }

    pub fn choice_default(&self) -> Result<Option<NodeView<'a>>> {
        match self.nodetype()? {
            NodeType::Choice => self.node_at(layout::node::choice::DFLT),
            _ => Ok(None),
        }
    }

    pub fn leaf_type(&self) -> Result<Option<TypeView<'a>>> {
        let field = match self.nodetype()? {
            NodeType::Leaf => layout::node::leaf::TYPE,
            NodeType::LeafList => layout::node::leaflist::TYPE,
            _ => return Ok(None),
        };
        self.snap
            .ptr(self.off, field)?
            .map(|off| self.snap.ty(off))
            .transpose()
    }

    pub fn default_value(&self) -> Result<Option<&'a str>> {
        match self.nodetype()? {
            NodeType::Leaf => self.snap.opt_str(self.off, layout::node::leaf::DFLT),
            _ => Ok(None),
        }
    }

    pub fn whens(&self) -> Result<Vec<WhenView<'a>>> {
        use layout::node as n;
        let field = match self.nodetype()? {
            NodeType::Container => n::container::WHEN,
            NodeType::Choice => n::choice::WHEN,
            NodeType::Case => n::case::WHEN,
            NodeType::Leaf => n::leaf::WHEN,
            NodeType::LeafList => n::leaflist::WHEN,
            NodeType::List => n::list::WHEN,
            NodeType::AnyData | NodeType::AnyXml => n::anydata::WHEN,
            NodeType::Rpc | NodeType::Action => n::action::WHEN,
            NodeType::Notif => n::notif::WHEN,
            NodeType::Input | NodeType::Output => return Ok(Vec::new()),
        };
        let snap = self.snap;
        Ok(snap
            .pointers(self.off, field)?
            .into_iter()
            .map(|off| snap.when(off))
            .collect())
    }

    /// Unique statements of a list, as node offsets.
    pub fn uniques(&self) -> Result<Vec<Vec<usize>>> {
        if self.nodetype()? != NodeType::List {
            return Ok(Vec::new());
        }
        let first = self.snap.ptr(self.off, layout::node::list::UNIQUES)?;
        let count = self.snap.count(first)?;
        let Some(first) = first else {
            return Ok(Vec::new());
        };
        (0..count)
            .map(|i| self.snap.pointers(first, i))
            .collect()
    }

    pub fn exts(&self) -> Result<Vec<ExtView<'a>>> {
        let first = self.snap.ptr(self.off, layout::node::EXTS)?;
        let count = self.snap.count(first)?;
        let Some(first) = first else {
            return Ok(Vec::new());
        };
        Ok((0..count)
            .map(|i| ExtView {
                snap: self.snap,
                off: first + i * layout::ext::WORDS * WORD,
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TypeView<'a> {
    snap: Snapshot<'a>,
    off: usize,
}

impl<'a> TypeView<'a> {
    pub fn offset(&self) -> usize {
        self.off
    }

    pub fn base(&self) -> Result<BaseType> {
        let packed = self.snap.field(self.off, layout::ty::BASE_REFCOUNT)?;
        BaseType::from_code(packed as u8).ok_or_else(|| invalid("unknown base type"))
    }

    pub fn refcount(&self) -> Result<u32> {
        Ok((self.snap.field(self.off, layout::ty::BASE_REFCOUNT)? >> 32) as u32)
    }

    pub fn name(&self) -> Result<Option<&'a str>> {
        self.snap.opt_str(self.off, layout::ty::NAME)
    }

    pub fn patterns(&self) -> Result<Vec<PatternView<'a>>> {
        if self.base()? != BaseType::String {
            return Ok(Vec::new());
        }
        let snap = self.snap;
        Ok(snap
            .pointers(self.off, layout::ty::PATTERNS)?
            .into_iter()
            .map(|off| snap.pattern(off))
            .collect())
    }

    pub fn union_types(&self) -> Result<Vec<TypeView<'a>>> {
        if self.base()? != BaseType::Union {
            return Ok(Vec::new());
        }
        self.snap
            .pointers(self.off, layout::ty::TYPES)?
            .into_iter()
            .map(|off| self.snap.ty(off))
            .collect()
    }

    pub fn realtype(&self) -> Result<Option<TypeView<'a>>> {
        if self.base()? != BaseType::LeafRef {
            return Ok(None);
        }
        self.snap
            .ptr(self.off, layout::ty::REALTYPE)?
            .map(|off| self.snap.ty(off))
            .transpose()
    }

    /// Identity records an identityref is based on.
    pub fn bases(&self) -> Result<Vec<usize>> {
        if self.base()? != BaseType::IdentityRef {
            return Ok(Vec::new());
        }
        self.snap.pointers(self.off, layout::ty::BASES)
    }

    /// Names of enum or bit items.
    pub fn item_names(&self) -> Result<Vec<&'a str>> {
        if !matches!(self.base()?, BaseType::Enum | BaseType::Bits) {
            return Ok(Vec::new());
        }
        let first = self.snap.ptr(self.off, layout::ty::ITEMS)?;
        let count = self.snap.count(first)?;
        let Some(first) = first else {
            return Ok(Vec::new());
        };
        (0..count)
            .map(|i| {
                let at = first + i * layout::enum_item::WORDS * WORD;
                self.snap
                    .opt_str(at, layout::enum_item::NAME)?
                    .ok_or_else(|| invalid("item without a name"))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PatternView<'a> {
    snap: Snapshot<'a>,
    off: usize,
}

impl<'a> PatternView<'a> {
    pub fn offset(&self) -> usize {
        self.off
    }

    pub fn expr(&self) -> Result<&'a str> {
        self.snap
            .opt_str(self.off, layout::pattern::EXPR)?
            .ok_or_else(|| invalid("pattern without an expression"))
    }

    pub fn code(&self) -> Result<&'a [u8]> {
        let len = self.snap.field(self.off, layout::pattern::CODE_LEN)? as usize;
        let Some(at) = self.snap.ptr(self.off, layout::pattern::CODE)? else {
            return Ok(&[]);
        };
        at.checked_add(len)
            .and_then(|end| self.snap.buf.get(at..end))
            .ok_or_else(|| invalid("pattern code out of bounds"))
    }

    pub fn inverted(&self) -> Result<bool> {
        Ok(self.snap.field(self.off, layout::pattern::INVERTED)? != 0)
    }

    pub fn refcount(&self) -> Result<u32> {
        Ok(self.snap.field(self.off, layout::pattern::REFCOUNT)? as u32)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WhenView<'a> {
    snap: Snapshot<'a>,
    off: usize,
}

impl<'a> WhenView<'a> {
    pub fn offset(&self) -> usize {
        self.off
    }

    pub fn condition(&self) -> Result<&'a str> {
        let expr = self
            .snap
            .ptr(self.off, layout::when::COND)?
            .ok_or_else(|| invalid("when without a condition"))?;
        self.snap
            .opt_str(expr, layout::expr::EXPR)?
            .ok_or_else(|| invalid("expression without text"))
    }

    pub fn context(&self) -> Result<Option<NodeView<'a>>> {
        self.snap
            .ptr(self.off, layout::when::CONTEXT)?
            .map(|off| self.snap.node(off))
            .transpose()
    }

    pub fn refcount(&self) -> Result<u32> {
        Ok(self.snap.field(self.off, layout::when::REFCOUNT)? as u32)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtView<'a> {
    snap: Snapshot<'a>,
    off: usize,
}

impl<'a> ExtView<'a> {
    pub fn offset(&self) -> usize {
        self.off
    }

    pub fn argument(&self) -> Result<Option<&'a str>> {
        self.snap.opt_str(self.off, layout::ext::ARGUMENT)
    }

    /// Offset of the record the instance belongs to.
    pub fn parent(&self) -> Result<usize> {
        self.snap
            .ptr(self.off, layout::ext::PARENT)?
            .ok_or_else(|| invalid("extension instance without a parent"))
    }

    pub fn def_name(&self) -> Result<&'a str> {
        let def = self
            .snap
            .ptr(self.off, layout::ext::DEF)?
            .ok_or_else(|| invalid("extension instance without a definition"))?;
        self.snap
            .opt_str(def, layout::extdef::NAME)?
            .ok_or_else(|| invalid("extension definition without a name"))
    }

    /// Registry index of the definition's plugin.
    pub fn plugin_index(&self) -> Result<Option<usize>> {
        let def = self
            .snap
            .ptr(self.off, layout::ext::DEF)?
            .ok_or_else(|| invalid("extension instance without a definition"))?;
        let plugin = self.snap.field(def, layout::extdef::PLUGIN)?;
        Ok(plugin.checked_sub(1).map(|i| i as usize))
    }

    pub fn compiled(&self) -> Result<Option<usize>> {
        self.snap.ptr(self.off, layout::ext::COMPILED)
    }

    /// Statement kinds of the substatements with their storage slots.
    pub fn substmts(&self) -> Result<Vec<(Stmt, Option<usize>)>> {
        use layout::substmt as s;
        let first = self.snap.ptr(self.off, layout::ext::SUBSTMTS)?;
        let count = self.snap.count(first)?;
        let Some(first) = first else {
            return Ok(Vec::new());
        };
        (0..count)
            .map(|i| {
                let at = first + i * s::WORDS * WORD;
                let code = self.snap.field(at, s::STMT)?;
                let stmt = u16::try_from(code)
                    .ok()
                    .and_then(Stmt::from_code)
                    .ok_or_else(|| invalid("unknown statement code"))?;
                Ok((stmt, self.snap.ptr(at, s::STORAGE)?))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Invariant: a buffer is only accepted with a valid header.
    #[test]
    fn open_checks_header() {
        assert_eq!(
            Snapshot::open(&[0u8; 8]).unwrap_err(),
            Error::InvalidSnapshot("shorter than the header")
        );
        let mut buf = vec![0u8; 32];
        assert_eq!(Snapshot::open(&buf).unwrap_err(), Error::InvalidSnapshot("bad magic"));
        buf[..8].copy_from_slice(b"YANGSNP1");
        buf[8..16].copy_from_slice(&64u64.to_le_bytes());
        assert_eq!(
            Snapshot::open(&buf).unwrap_err(),
            Error::InvalidSnapshot("length does not fit the buffer")
        );
        buf[8..16].copy_from_slice(&24u64.to_le_bytes());
        let snap = Snapshot::open(&buf).unwrap();
        assert_eq!(snap.len(), 24);
        assert!(snap.word(24).is_err());
        assert!(snap.str_at(16).is_ok());
    }
}
