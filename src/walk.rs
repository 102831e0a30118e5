//! The one traversal of a compiled context.
//!
//! [`Walk`] visits the graph in a fixed order and lays every record out
//! through its [`Sink`]. Run over a [`SizeSink`] it measures the snapshot;
//! run over a [`WriteSink`] it writes it. Graph-shape logic lives here only.
//!
//! Ownership edges are followed by recursion. Every structure that can be
//! referred to (modules, nodes, types, whens, patterns, identities,
//! extension definitions, dictionary strings) is recorded in the
//! [`AddressMap`] right after it is allocated. Shared structures are looked
//! up before they are laid out, so they appear once. Reference edges are
//! resolved through the map; forward references are patched in `finish`.

use crate::addr_map::AddressMap;
use crate::dict::{DictStr, DictTable};
use crate::error::{internal, Error, Result};
use crate::layout::{self, WORD};
use crate::plugin::FlatSubstmts;
use crate::schema::{
    CompiledModule, Context, EnumItem, ExtDefRef, ExtInstance, ExtensionDef, Expr, IdentRef,
    Identity, Module, ModuleId, Must, NodeKey, NodeKind, NodeRef, NodeType, Pattern, Prefix,
    Range, SchemaNode, Submodule, Type, TypeKind, When,
};
use crate::sink::{Sink, SizeSink, WriteSink};
use crate::stmt::{Substmt, SubstmtStorage};
use std::sync::Arc;

/// Walk over the size pass.
pub type Sizer<'a> = Walk<'a, SizeSink>;
/// Walk over the write pass.
pub type Printer<'a, 'b> = Walk<'a, WriteSink<'b>>;

/// A pointer word waiting for its target to be laid out.
struct Pending {
    at: usize,
    target: usize,
}

pub struct Walk<'a, S> {
    ctx: &'a Context,
    map: &'a mut AddressMap,
    sink: S,
    pending: Vec<Pending>,
    shared: usize,
}

fn addr_of<T>(v: &T) -> usize {
    v as *const T as usize
}

/// Offset of element `i` of an array of `words`-word records.
fn elem(array: usize, i: usize, words: usize) -> usize {
    array + i * words * WORD
}

fn key_addr(cm: &CompiledModule, key: NodeKey) -> Result<usize> {
    cm.nodes
        .get(key)
        .map(addr_of)
        .ok_or_else(|| internal(format_args!("dangling node key {:?}", key)))
}

impl<'a, S: Sink> Walk<'a, S> {
    pub(crate) fn new(ctx: &'a Context, map: &'a mut AddressMap, sink: S) -> Self {
        Self {
            ctx,
            map,
            sink,
            pending: Vec::new(),
            shared: 0,
        }
    }

    pub fn context(&self) -> &'a Context {
        self.ctx
    }

    pub fn position(&self) -> usize {
        self.sink.position()
    }

    pub fn alloc(&mut self, len: usize) -> Result<usize> {
        self.sink.alloc(len)
    }

    pub fn alloc_words(&mut self, words: usize) -> Result<usize> {
        let len = words
            .checked_mul(WORD)
            .ok_or_else(|| internal(format_args!("allocation of {} words overflows", words)))?;
        self.sink.alloc(len)
    }

    /// Stores word `field` of the record at `rec`.
    pub fn put(&mut self, rec: usize, field: usize, value: u64) -> Result<()> {
        let at = field
            .checked_mul(WORD)
            .and_then(|off| rec.checked_add(off))
            .ok_or_else(|| internal(format_args!("word {} of record at {} overflows", field, rec)))?;
        self.sink.put(at, value)
    }

    pub fn put_bytes(&mut self, at: usize, bytes: &[u8]) -> Result<()> {
        self.sink.put_bytes(at, bytes)
    }

    /// Copies a string that is not interned. Strings are NUL-terminated in
    /// the image, so an interior NUL cannot be represented.
    pub fn raw_str(&mut self, s: &str) -> Result<u64> {
        if s.contains('\0') {
            return Err(internal(format_args!("string {:?} contains a NUL byte", s)));
        }
        let at = self.alloc(layout::str_len(s.len()))?;
        self.sink.put_bytes(at, s.as_bytes())?;
        Ok(at as u64)
    }

    /// Offset of an interned string inside the dictionary image.
    pub fn dict_str(&self, s: Option<&DictStr>) -> Result<u64> {
        let Some(s) = s else { return Ok(0) };
        self.map
            .lookup(s.addr())
            .map(|off| off as u64)
            .ok_or_else(|| internal(format_args!("string \"{}\" is not in the dictionary", s)))
    }

    /// Points word `field` of `rec` at wherever `target` is laid out.
    pub fn link(&mut self, rec: usize, field: usize, target: Option<usize>) -> Result<()> {
        let Some(target) = target else { return Ok(()) };
        match self.map.lookup(target) {
            Some(off) => self.put(rec, field, off as u64),
            None => {
                self.pending.push(Pending {
                    at: rec + field * WORD,
                    target,
                });
                Ok(())
            }
        }
    }

    fn put_str(&mut self, rec: usize, field: usize, s: Option<&DictStr>) -> Result<()> {
        let off = self.dict_str(s)?;
        self.put(rec, field, off)
    }

    fn record(&mut self, orig: usize, new: usize) -> Result<()> {
        match self.map.record(orig, new) {
            Err(Error::AlreadyExists) => Err(internal(format_args!(
                "structure at {:#x} laid out twice",
                orig
            ))),
            other => other,
        }
    }

    /// Offset of an already laid out shared structure.
    fn shared(&mut self, orig: usize) -> Option<u64> {
        let off = self.map.lookup(orig)?;
        self.shared += 1;
        Some(off as u64)
    }

    /// Allocates a sized array and returns its first element, `0` if empty.
    fn array(&mut self, count: usize, elem_words: usize) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        let at = self.alloc(layout::array_len(count, elem_words))?;
        self.put(at, 0, count as u64)?;
        Ok(at + WORD)
    }

    fn u32s(&mut self, values: &[u32], terminated: bool) -> Result<u64> {
        let n = values.len() + usize::from(terminated);
        if n == 0 {
            return Ok(0);
        }
        let at = self.alloc(layout::align8(n * 4))?;
        for (i, v) in values.iter().enumerate() {
            self.sink.put_u32(at + i * 4, *v)?;
        }
        Ok(at as u64)
    }

    fn module_addr(&self, id: ModuleId) -> Result<usize> {
        self.ctx
            .module(id)
            .map(addr_of)
            .ok_or_else(|| internal(format_args!("dangling module id {}", id.0)))
    }

    fn node_addr(&self, r: NodeRef) -> Result<usize> {
        self.ctx
            .node(r)
            .map(addr_of)
            .ok_or_else(|| internal(format_args!("dangling node reference {:?}", r)))
    }

    fn ident_addr(&self, r: IdentRef) -> Result<usize> {
        self.ctx
            .module(r.module)
            .and_then(|m| m.identities.get(r.index))
            .map(addr_of)
            .ok_or_else(|| internal(format_args!("dangling identity reference {:?}", r)))
    }

    fn extdef(&self, r: ExtDefRef) -> Result<&'a ExtensionDef> {
        let ctx = self.ctx;
        ctx.module(r.module)
            .and_then(|m| m.extensions.get(r.index))
            .ok_or_else(|| internal(format_args!("dangling extension definition {:?}", r)))
    }

    /// Lays out the whole context and returns the snapshot length.
    pub(crate) fn run(mut self) -> Result<usize> {
        let header = self.alloc_words(layout::header::WORDS)?;
        self.put(header, layout::header::MAGIC, layout::MAGIC)?;
        self.context_record()?;
        self.finish(header)
    }

    fn context_record(&mut self) -> Result<()> {
        use layout::context as f;
        let ctx = self.ctx;
        let rec = self.alloc_words(f::WORDS)?;

        let dict = ctx.dict().with_table(|table| self.dictionary(table))?;
        self.put(rec, f::DICT, dict)?;

        let modules = self.array(ctx.modules.len(), 1)?;
        for (i, module) in ctx.modules.iter().enumerate() {
            let off = self.module(module, rec)?;
            self.put(modules, i, off)?;
        }
        self.put(rec, f::MODULES, modules as u64)?;

        let plugins = self.array(ctx.ext_plugins.len(), 1)?;
        for (i, plugin) in ctx.ext_plugins.iter().enumerate() {
            let id = self.raw_str(plugin.id())?;
            self.put(plugins, i, id)?;
        }
        self.put(rec, f::EXT_PLUGINS, plugins as u64)?;
        self.put(rec, f::CHANGE_COUNT, u64::from(ctx.change_count))?;
        self.put(rec, f::OPTS, u64::from(ctx.opts))
    }

    fn dictionary(&mut self, table: &DictTable) -> Result<u64> {
        use layout::{dict as f, dict_rec as r};
        let rec = self.alloc_words(f::WORDS)?;
        self.put(rec, f::SIZE, u64::from(table.size()))?;
        self.put(rec, f::USED, table.len() as u64)?;
        self.put(rec, f::INVALID, u64::from(table.invalid()))?;
        let slots = self.array(table.records().len(), r::WORDS)?;
        for (i, slot) in table.records().iter().enumerate() {
            let at = elem(slots, i, r::WORDS);
            let hash_hits = u64::from(slot.hash()) | u64::from(slot.hits() as u32) << 32;
            self.put(at, r::HASH_HITS, hash_hits)?;
            let Some(value) = slot.value() else { continue };
            let body = self.raw_str(value.value())?;
            self.record(value.addr(), body as usize)?;
            self.put(at, r::VALUE, body)?;
            self.put(at, r::REFCOUNT, u64::from(value.refcount()))?;
        }
        self.put(rec, f::RECORDS, slots as u64)?;
        Ok(rec as u64)
    }

    fn module(&mut self, m: &Module, ctx_rec: usize) -> Result<u64> {
        use layout::module as f;
        let rec = self.alloc_words(f::WORDS)?;
        self.record(addr_of(m), rec)?;
        self.put(rec, f::CTX, ctx_rec as u64)?;
        self.put_str(rec, f::NAME, Some(&m.name))?;
        self.put_str(rec, f::REVISION, m.revision.as_ref())?;
        self.put_str(rec, f::NS, m.ns.as_ref())?;
        self.put_str(rec, f::PREFIX, m.prefix.as_ref())?;
        self.put_str(rec, f::FILEPATH, m.filepath.as_ref())?;
        self.put_str(rec, f::ORG, m.org.as_ref())?;
        self.put_str(rec, f::CONTACT, m.contact.as_ref())?;
        self.put_str(rec, f::DSC, m.dsc.as_ref())?;
        self.put_str(rec, f::REF, m.reference.as_ref())?;

        if let Some(compiled) = &m.compiled {
            let off = self.compiled(compiled, rec)?;
            self.put(rec, f::COMPILED, off)?;
        }
        let extensions = self.extension_defs(&m.extensions)?;
        self.put(rec, f::EXTENSIONS, extensions)?;
        let identities = self.identities(&m.identities)?;
        self.put(rec, f::IDENTITIES, identities)?;
        let submodules = self.submodules(&m.submodules)?;
        self.put(rec, f::SUBMODULES, submodules)?;
        let augmented_by = self.module_links(&m.augmented_by)?;
        self.put(rec, f::AUGMENTED_BY, augmented_by)?;
        let deviated_by = self.module_links(&m.deviated_by)?;
        self.put(rec, f::DEVIATED_BY, deviated_by)?;
        let flags = u64::from(m.implemented) | u64::from(m.latest_revision) << 8;
        self.put(rec, f::FLAGS, flags)?;
        Ok(rec as u64)
    }

    fn compiled(&mut self, cm: &CompiledModule, mod_rec: usize) -> Result<u64> {
        use layout::compiled as f;
        let rec = self.alloc_words(f::WORDS)?;
        self.put(rec, f::MOD, mod_rec as u64)?;
        let features = self.array(cm.features.len(), 1)?;
        for (i, feature) in cm.features.iter().enumerate() {
            self.put_str(features, i, Some(feature))?;
        }
        self.put(rec, f::FEATURES, features as u64)?;
        let data = self.siblings(cm, &cm.data)?;
        self.put(rec, f::DATA, data)?;
        let rpcs = self.siblings(cm, &cm.rpcs)?;
        self.put(rec, f::RPCS, rpcs)?;
        let notifs = self.siblings(cm, &cm.notifs)?;
        self.put(rec, f::NOTIFS, notifs)?;
        let exts = self.exts(&cm.exts, rec)?;
        self.put(rec, f::EXTS, exts)?;
        Ok(rec as u64)
    }

    fn module_links(&mut self, ids: &[ModuleId]) -> Result<u64> {
        let array = self.array(ids.len(), 1)?;
        for (i, id) in ids.iter().enumerate() {
            let target = self.module_addr(*id)?;
            self.link(array, i, Some(target))?;
        }
        Ok(array as u64)
    }

    /// Lays out a sibling list and returns its first node.
    ///
    /// All records of the list are allocated before any of them is filled, so
    /// the `next`/`prev` ring can be written directly: `first.prev` is the
    /// last node and `last.next` is null.
    fn siblings(&mut self, cm: &CompiledModule, keys: &[NodeKey]) -> Result<u64> {
        use layout::node as f;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut recs = Vec::with_capacity(keys.len());
        for &key in keys {
            let node = cm
                .nodes
                .get(key)
                .ok_or_else(|| internal(format_args!("dangling node key {:?}", key)))?;
            let nodetype = node.kind.nodetype();
            if matches!(nodetype, NodeType::Input | NodeType::Output) {
                return Err(internal(format_args!(
                    "{:?} node \"{}\" in a sibling list",
                    nodetype, node.name
                )));
            }
            let rec = self.alloc_words(layout::node_words(nodetype))?;
            self.record(addr_of(node), rec)?;
            recs.push(rec);
        }
        let last = recs[recs.len() - 1];
        for (i, &rec) in recs.iter().enumerate() {
            let prev = if i == 0 { last } else { recs[i - 1] };
            self.put(rec, f::PREV, prev as u64)?;
            if let Some(&next) = recs.get(i + 1) {
                self.put(rec, f::NEXT, next as u64)?;
            }
        }
        for (&key, &rec) in keys.iter().zip(&recs) {
            self.node(cm, &cm.nodes[key], rec)?;
        }
        Ok(recs[0] as u64)
    }

    /// Lays out the input or output of an operation.
    fn inout(&mut self, cm: &CompiledModule, key: Option<NodeKey>, expected: NodeType) -> Result<u64> {
        let Some(key) = key else { return Ok(0) };
        let node = cm
            .nodes
            .get(key)
            .ok_or_else(|| internal(format_args!("dangling node key {:?}", key)))?;
        if node.kind.nodetype() != expected {
            return Err(internal(format_args!(
                "{:?} node \"{}\" where {:?} belongs",
                node.kind.nodetype(),
                node.name,
                expected
            )));
        }
        let rec = self.alloc_words(layout::node_words(expected))?;
        self.record(addr_of(node), rec)?;
        self.put(rec, layout::node::PREV, rec as u64)?;
        self.node(cm, node, rec)?;
        Ok(rec as u64)
    }

    fn node(&mut self, cm: &CompiledModule, node: &SchemaNode, rec: usize) -> Result<()> {
        use layout::node as f;
        let nodetype = node.kind.nodetype();
        let packed = u64::from(nodetype.code())
            | u64::from(node.flags) << 16
            | u64::from(u32::from_le_bytes(node.hash)) << 32;
        self.put(rec, f::NODETYPE, packed)?;
        let module = self.module_addr(node.module)?;
        self.link(rec, f::MODULE, Some(module))?;
        let parent = node.parent.map(|p| key_addr(cm, p)).transpose()?;
        self.link(rec, f::PARENT, parent)?;
        self.put_str(rec, f::NAME, Some(&node.name))?;
        self.put_str(rec, f::DSC, node.dsc.as_ref())?;
        self.put_str(rec, f::REF, node.reference.as_ref())?;
        let exts = self.exts(&node.exts, rec)?;
        self.put(rec, f::EXTS, exts)?;

        match &node.kind {
            NodeKind::Container {
                child,
                musts,
                whens,
                actions,
                notifs,
            } => {
                use layout::node::container as k;
                let v = self.siblings(cm, child)?;
                self.put(rec, k::CHILD, v)?;
                let v = self.musts(musts)?;
                self.put(rec, k::MUSTS, v)?;
                let v = self.whens(whens)?;
                self.put(rec, k::WHEN, v)?;
                let v = self.siblings(cm, actions)?;
                self.put(rec, k::ACTIONS, v)?;
                let v = self.siblings(cm, notifs)?;
                self.put(rec, k::NOTIFS, v)?;
            }
            NodeKind::Choice { cases, whens, dflt } => {
                use layout::node::choice as k;
                let v = self.siblings(cm, cases)?;
                self.put(rec, k::CASES, v)?;
                let v = self.whens(whens)?;
                self.put(rec, k::WHEN, v)?;
                let dflt = dflt.map(|d| key_addr(cm, d)).transpose()?;
                self.link(rec, k::DFLT, dflt)?;
            }
            NodeKind::Case { child, whens } => {
                use layout::node::case as k;
                let v = self.siblings(cm, child)?;
                self.put(rec, k::CHILD, v)?;
                let v = self.whens(whens)?;
                self.put(rec, k::WHEN, v)?;
            }
            NodeKind::Leaf {
                musts,
                whens,
                ty,
                units,
                dflt,
            } => {
                use layout::node::leaf as k;
                let v = self.musts(musts)?;
                self.put(rec, k::MUSTS, v)?;
                let v = self.whens(whens)?;
                self.put(rec, k::WHEN, v)?;
                let v = self.ty(ty)?;
                self.put(rec, k::TYPE, v)?;
                self.put_str(rec, k::UNITS, units.as_ref())?;
                if let Some(dflt) = dflt {
                    self.put_str(rec, k::DFLT, Some(&dflt.str))?;
                    let v = self.prefixes(&dflt.prefixes)?;
                    self.put(rec, k::DFLT_PREFIXES, v)?;
                }
            }
            NodeKind::LeafList {
                musts,
                whens,
                ty,
                units,
                dflts,
                min,
                max,
            } => {
                use layout::node::leaflist as k;
                use layout::value as val;
                let v = self.musts(musts)?;
                self.put(rec, k::MUSTS, v)?;
                let v = self.whens(whens)?;
                self.put(rec, k::WHEN, v)?;
                let v = self.ty(ty)?;
                self.put(rec, k::TYPE, v)?;
                self.put_str(rec, k::UNITS, units.as_ref())?;
                let array = self.array(dflts.len(), val::WORDS)?;
                for (i, dflt) in dflts.iter().enumerate() {
                    let at = elem(array, i, val::WORDS);
                    self.put_str(at, val::STR, Some(&dflt.str))?;
                    let v = self.prefixes(&dflt.prefixes)?;
                    self.put(at, val::PREFIXES, v)?;
                }
                self.put(rec, k::DFLTS, array as u64)?;
                self.put(rec, k::MIN, u64::from(*min))?;
                self.put(rec, k::MAX, u64::from(*max))?;
            }
            NodeKind::List {
                child,
                musts,
                whens,
                actions,
                notifs,
                uniques,
                min,
                max,
            } => {
                use layout::node::list as k;
                let v = self.siblings(cm, child)?;
                self.put(rec, k::CHILD, v)?;
                let v = self.musts(musts)?;
                self.put(rec, k::MUSTS, v)?;
                let v = self.whens(whens)?;
                self.put(rec, k::WHEN, v)?;
                let v = self.siblings(cm, actions)?;
                self.put(rec, k::ACTIONS, v)?;
                let v = self.siblings(cm, notifs)?;
                self.put(rec, k::NOTIFS, v)?;
                let array = self.array(uniques.len(), 1)?;
                for (i, unique) in uniques.iter().enumerate() {
                    let leaves = self.array(unique.len(), 1)?;
                    for (j, key) in unique.iter().enumerate() {
                        let target = key_addr(cm, *key)?;
                        self.link(leaves, j, Some(target))?;
                    }
                    self.put(array, i, leaves as u64)?;
                }
                self.put(rec, k::UNIQUES, array as u64)?;
                self.put(rec, k::MIN, u64::from(*min))?;
                self.put(rec, k::MAX, u64::from(*max))?;
            }
            NodeKind::AnyData { musts, whens } | NodeKind::AnyXml { musts, whens } => {
                use layout::node::anydata as k;
                let v = self.musts(musts)?;
                self.put(rec, k::MUSTS, v)?;
                let v = self.whens(whens)?;
                self.put(rec, k::WHEN, v)?;
            }
            NodeKind::Rpc {
                whens,
                input,
                output,
            }
            | NodeKind::Action {
                whens,
                input,
                output,
            } => {
                use layout::node::action as k;
                let v = self.whens(whens)?;
                self.put(rec, k::WHEN, v)?;
                let v = self.inout(cm, *input, NodeType::Input)?;
                self.put(rec, k::INPUT, v)?;
                let v = self.inout(cm, *output, NodeType::Output)?;
                self.put(rec, k::OUTPUT, v)?;
            }
            NodeKind::Input { child, musts } | NodeKind::Output { child, musts } => {
                use layout::node::inout as k;
                let v = self.siblings(cm, child)?;
                self.put(rec, k::CHILD, v)?;
                let v = self.musts(musts)?;
                self.put(rec, k::MUSTS, v)?;
            }
            NodeKind::Notif {
                child,
                musts,
                whens,
            } => {
                use layout::node::notif as k;
                let v = self.siblings(cm, child)?;
                self.put(rec, k::CHILD, v)?;
                let v = self.musts(musts)?;
                self.put(rec, k::MUSTS, v)?;
                let v = self.whens(whens)?;
                self.put(rec, k::WHEN, v)?;
            }
        }
        Ok(())
    }

    fn musts(&mut self, musts: &[Must]) -> Result<u64> {
        use layout::must as f;
        let array = self.array(musts.len(), f::WORDS)?;
        for (i, must) in musts.iter().enumerate() {
            let at = elem(array, i, f::WORDS);
            let v = self.expr(&must.cond)?;
            self.put(at, f::COND, v)?;
            let v = self.prefixes(&must.prefixes)?;
            self.put(at, f::PREFIXES, v)?;
            self.put_str(at, f::DSC, must.dsc.as_ref())?;
            self.put_str(at, f::REF, must.reference.as_ref())?;
            self.put_str(at, f::EMSG, must.emsg.as_ref())?;
            self.put_str(at, f::EAPPTAG, must.eapptag.as_ref())?;
            let v = self.exts(&must.exts, at)?;
            self.put(at, f::EXTS, v)?;
        }
        Ok(array as u64)
    }

    fn whens(&mut self, whens: &[Arc<When>]) -> Result<u64> {
        let array = self.array(whens.len(), 1)?;
        for (i, when) in whens.iter().enumerate() {
            let v = self.when(when)?;
            self.put(array, i, v)?;
        }
        Ok(array as u64)
    }

    fn when(&mut self, when: &Arc<When>) -> Result<u64> {
        use layout::when as f;
        let orig = addr_of(&**when);
        if let Some(off) = self.shared(orig) {
            return Ok(off);
        }
        let rec = self.alloc_words(f::WORDS)?;
        self.record(orig, rec)?;
        let v = self.expr(&when.cond)?;
        self.put(rec, f::COND, v)?;
        let context = when.context.map(|r| self.node_addr(r)).transpose()?;
        self.link(rec, f::CONTEXT, context)?;
        let v = self.prefixes(&when.prefixes)?;
        self.put(rec, f::PREFIXES, v)?;
        self.put_str(rec, f::DSC, when.dsc.as_ref())?;
        self.put_str(rec, f::REF, when.reference.as_ref())?;
        let v = self.exts(&when.exts, rec)?;
        self.put(rec, f::EXTS, v)?;
        self.put(rec, f::REFCOUNT, Arc::strong_count(when) as u64)?;
        self.put(rec, f::FLAGS, u64::from(when.flags))?;
        Ok(rec as u64)
    }

    fn expr(&mut self, expr: &Expr) -> Result<u64> {
        use layout::expr as f;
        let used = expr.tokens.len();
        if expr.tok_pos.len() != used
            || expr.tok_len.len() != used
            || !(expr.repeat.is_empty() || expr.repeat.len() == used)
        {
            return Err(internal(format_args!(
                "token tables of \"{}\" disagree in length",
                expr.expr
            )));
        }
        let rec = self.alloc_words(f::WORDS)?;
        self.put_str(rec, f::EXPR, Some(&expr.expr))?;
        self.put(rec, f::USED, used as u64)?;
        let v = self.u32s(&expr.tokens, false)?;
        self.put(rec, f::TOKENS, v)?;
        let v = self.u32s(&expr.tok_pos, false)?;
        self.put(rec, f::TOK_POS, v)?;
        let v = self.u32s(&expr.tok_len, false)?;
        self.put(rec, f::TOK_LEN, v)?;
        if !expr.repeat.is_empty() {
            let block = self.alloc_words(used)?;
            for (i, repeat) in expr.repeat.iter().enumerate() {
                if let Some(repeat) = repeat {
                    let v = self.u32s(repeat, true)?;
                    self.put(block, i, v)?;
                }
            }
            self.put(rec, f::REPEAT, block as u64)?;
        }
        Ok(rec as u64)
    }

    fn prefixes(&mut self, prefixes: &[Prefix]) -> Result<u64> {
        use layout::prefix as f;
        let array = self.array(prefixes.len(), f::WORDS)?;
        for (i, prefix) in prefixes.iter().enumerate() {
            let at = elem(array, i, f::WORDS);
            let v = self.raw_str(&prefix.prefix)?;
            self.put(at, f::PREFIX, v)?;
            let module = self.module_addr(prefix.module)?;
            self.link(at, f::MODULE, Some(module))?;
        }
        Ok(array as u64)
    }

    fn range(&mut self, range: Option<&Range>) -> Result<u64> {
        use layout::{range as f, range_part as p};
        let Some(range) = range else { return Ok(0) };
        let rec = self.alloc_words(f::WORDS)?;
        let parts = self.array(range.parts.len(), p::WORDS)?;
        for (i, part) in range.parts.iter().enumerate() {
            let at = elem(parts, i, p::WORDS);
            self.put(at, p::MIN, part.min as u64)?;
            self.put(at, p::MAX, part.max as u64)?;
        }
        self.put(rec, f::PARTS, parts as u64)?;
        self.put_str(rec, f::DSC, range.dsc.as_ref())?;
        self.put_str(rec, f::REF, range.reference.as_ref())?;
        self.put_str(rec, f::EMSG, range.emsg.as_ref())?;
        self.put_str(rec, f::EAPPTAG, range.eapptag.as_ref())?;
        let v = self.exts(&range.exts, rec)?;
        self.put(rec, f::EXTS, v)?;
        Ok(rec as u64)
    }

    fn patterns(&mut self, patterns: &[Arc<Pattern>]) -> Result<u64> {
        let array = self.array(patterns.len(), 1)?;
        for (i, pattern) in patterns.iter().enumerate() {
            let v = self.pattern(pattern)?;
            self.put(array, i, v)?;
        }
        Ok(array as u64)
    }

    fn pattern(&mut self, pattern: &Arc<Pattern>) -> Result<u64> {
        use layout::pattern as f;
        let orig = addr_of(&**pattern);
        if let Some(off) = self.shared(orig) {
            return Ok(off);
        }
        let rec = self.alloc_words(f::WORDS)?;
        self.record(orig, rec)?;
        self.put_str(rec, f::EXPR, Some(&pattern.expr))?;
        if !pattern.code.is_empty() {
            let code = self.alloc(layout::align8(pattern.code.len()))?;
            self.put_bytes(code, &pattern.code)?;
            self.put(rec, f::CODE, code as u64)?;
        }
        self.put(rec, f::CODE_LEN, pattern.code.len() as u64)?;
        self.put_str(rec, f::DSC, pattern.dsc.as_ref())?;
        self.put_str(rec, f::REF, pattern.reference.as_ref())?;
        self.put_str(rec, f::EMSG, pattern.emsg.as_ref())?;
        self.put_str(rec, f::EAPPTAG, pattern.eapptag.as_ref())?;
        let v = self.exts(&pattern.exts, rec)?;
        self.put(rec, f::EXTS, v)?;
        self.put(rec, f::INVERTED, u64::from(pattern.inverted))?;
        self.put(rec, f::REFCOUNT, Arc::strong_count(pattern) as u64)?;
        Ok(rec as u64)
    }

    fn enums(&mut self, items: &[EnumItem]) -> Result<u64> {
        use layout::enum_item as f;
        let array = self.array(items.len(), f::WORDS)?;
        for (i, item) in items.iter().enumerate() {
            let at = elem(array, i, f::WORDS);
            self.put_str(at, f::NAME, Some(&item.name))?;
            self.put_str(at, f::DSC, item.dsc.as_ref())?;
            self.put_str(at, f::REF, item.reference.as_ref())?;
            let v = self.exts(&item.exts, at)?;
            self.put(at, f::EXTS, v)?;
            self.put(at, f::VALUE, item.value as u64)?;
            self.put(at, f::FLAGS, u64::from(item.flags))?;
        }
        Ok(array as u64)
    }

    fn ty(&mut self, ty: &Arc<Type>) -> Result<u64> {
        use layout::ty as f;
        let orig = addr_of(&**ty);
        if let Some(off) = self.shared(orig) {
            return Ok(off);
        }
        let base = ty.basetype();
        let rec = self.alloc_words(layout::type_words(base))?;
        self.record(orig, rec)?;
        let packed = u64::from(base.code()) | (Arc::strong_count(ty) as u64) << 32;
        self.put(rec, f::BASE_REFCOUNT, packed)?;
        self.put_str(rec, f::NAME, ty.name.as_ref())?;
        let v = self.exts(&ty.exts, rec)?;
        self.put(rec, f::EXTS, v)?;

        match &ty.kind {
            TypeKind::Binary { length } => {
                let v = self.range(length.as_ref())?;
                self.put(rec, f::LENGTH, v)?;
            }
            TypeKind::Int { range, .. } => {
                let v = self.range(range.as_ref())?;
                self.put(rec, f::RANGE, v)?;
            }
            TypeKind::Dec64 {
                fraction_digits,
                range,
            } => {
                self.put(rec, f::FRACTION_DIGITS, u64::from(*fraction_digits))?;
                let v = self.range(range.as_ref())?;
                self.put(rec, f::DEC64_RANGE, v)?;
            }
            TypeKind::String { length, patterns } => {
                let v = self.range(length.as_ref())?;
                self.put(rec, f::LENGTH, v)?;
                let v = self.patterns(patterns)?;
                self.put(rec, f::PATTERNS, v)?;
            }
            TypeKind::Enum { items } | TypeKind::Bits { items } => {
                let v = self.enums(items)?;
                self.put(rec, f::ITEMS, v)?;
            }
            TypeKind::Bool | TypeKind::Empty => {}
            TypeKind::IdentityRef { bases } => {
                let array = self.array(bases.len(), 1)?;
                for (i, base) in bases.iter().enumerate() {
                    let target = self.ident_addr(*base)?;
                    self.link(array, i, Some(target))?;
                }
                self.put(rec, f::BASES, array as u64)?;
            }
            TypeKind::InstanceId { require_instance } => {
                self.put(rec, f::REQUIRE_INSTANCE, u64::from(*require_instance))?;
            }
            TypeKind::LeafRef {
                path,
                prefixes,
                realtype,
                require_instance,
            } => {
                let v = self.expr(path)?;
                self.put(rec, f::PATH, v)?;
                let v = self.prefixes(prefixes)?;
                self.put(rec, f::PREFIXES, v)?;
                if let Some(realtype) = realtype {
                    let v = self.ty(realtype)?;
                    self.put(rec, f::REALTYPE, v)?;
                }
                self.put(rec, f::LEAFREF_REQUIRE_INSTANCE, u64::from(*require_instance))?;
            }
            TypeKind::Union { types } => {
                let array = self.array(types.len(), 1)?;
                for (i, member) in types.iter().enumerate() {
                    let v = self.ty(member)?;
                    self.put(array, i, v)?;
                }
                self.put(rec, f::TYPES, array as u64)?;
            }
        }
        Ok(rec as u64)
    }

    fn identities(&mut self, identities: &[Identity]) -> Result<u64> {
        use layout::identity as f;
        let array = self.array(identities.len(), f::WORDS)?;
        for (i, ident) in identities.iter().enumerate() {
            let at = elem(array, i, f::WORDS);
            self.record(addr_of(ident), at)?;
            self.put_str(at, f::NAME, Some(&ident.name))?;
            self.put_str(at, f::DSC, ident.dsc.as_ref())?;
            self.put_str(at, f::REF, ident.reference.as_ref())?;
            let module = self.module_addr(ident.module)?;
            self.link(at, f::MODULE, Some(module))?;
            let derived = self.array(ident.derived.len(), 1)?;
            for (j, r) in ident.derived.iter().enumerate() {
                let target = self.ident_addr(*r)?;
                self.link(derived, j, Some(target))?;
            }
            self.put(at, f::DERIVED, derived as u64)?;
            let v = self.exts(&ident.exts, at)?;
            self.put(at, f::EXTS, v)?;
            self.put(at, f::FLAGS, u64::from(ident.flags))?;
        }
        Ok(array as u64)
    }

    fn extension_defs(&mut self, defs: &[ExtensionDef]) -> Result<u64> {
        use layout::extdef as f;
        let plugins = self.ctx.ext_plugins.len();
        let array = self.array(defs.len(), f::WORDS)?;
        for (i, def) in defs.iter().enumerate() {
            let at = elem(array, i, f::WORDS);
            self.record(addr_of(def), at)?;
            self.put_str(at, f::NAME, Some(&def.name))?;
            self.put_str(at, f::ARGNAME, def.argname.as_ref())?;
            let v = self.exts(&def.exts, at)?;
            self.put(at, f::EXTS, v)?;
            if let Some(index) = def.plugin {
                if index >= plugins {
                    return Err(internal(format_args!(
                        "extension \"{}\" names plugin {} of {}",
                        def.name, index, plugins
                    )));
                }
                self.put(at, f::PLUGIN, index as u64 + 1)?;
            }
            let module = self.module_addr(def.module)?;
            self.link(at, f::MODULE, Some(module))?;
            self.put(at, f::FLAGS, u64::from(def.flags))?;
        }
        Ok(array as u64)
    }

    fn submodules(&mut self, submodules: &[Submodule]) -> Result<u64> {
        use layout::submodule as f;
        let array = self.array(submodules.len(), f::WORDS)?;
        for (i, sub) in submodules.iter().enumerate() {
            let at = elem(array, i, f::WORDS);
            self.put_str(at, f::NAME, Some(&sub.name))?;
            self.put_str(at, f::REVISION, sub.revision.as_ref())?;
            self.put_str(at, f::FILEPATH, sub.filepath.as_ref())?;
        }
        Ok(array as u64)
    }

    /// Lays out extension instances inline; `owner` is the record they sit in.
    fn exts(&mut self, exts: &[ExtInstance], owner: usize) -> Result<u64> {
        let words = layout::ext::WORDS;
        let array = self.array(exts.len(), words)?;
        for (i, ext) in exts.iter().enumerate() {
            self.ext(ext, elem(array, i, words), owner)?;
        }
        Ok(array as u64)
    }

    fn ext(&mut self, ext: &ExtInstance, rec: usize, owner: usize) -> Result<()> {
        use layout::{ext as f, substmt as s};
        let ctx = self.ctx;
        let def = self.extdef(ext.def)?;
        self.link(rec, f::DEF, Some(addr_of(def)))?;
        self.put_str(rec, f::ARGUMENT, ext.argument.as_ref())?;
        let module = self.module_addr(ext.module)?;
        self.link(rec, f::MODULE, Some(module))?;
        let v = self.exts(&ext.exts, rec)?;
        self.put(rec, f::EXTS, v)?;
        self.put(rec, f::PARENT, owner as u64)?;
        self.put(rec, f::PARENT_STMT, u64::from(ext.parent_stmt.code()))?;
        self.put(rec, f::PARENT_STMT_INDEX, ext.parent_stmt_index)?;

        let array = self.array(ext.substmts.len(), s::WORDS)?;
        for (i, sub) in ext.substmts.iter().enumerate() {
            self.put(elem(array, i, s::WORDS), s::STMT, u64::from(sub.stmt.code()))?;
        }
        self.put(rec, f::SUBSTMTS, array as u64)?;

        let flat = FlatSubstmts {
            ext: rec,
            array,
            count: ext.substmts.len(),
        };
        let compiled = match def.plugin {
            Some(index) => {
                let plugin = ctx.ext_plugins.get(index).ok_or_else(|| {
                    internal(format_args!("extension \"{}\" names missing plugin {}", def.name, index))
                })?;
                S::payload(self, plugin.as_ref(), ext, flat)?
            }
            None => self.ext_storage(ext, flat)?,
        };
        self.put(rec, f::COMPILED, compiled)
    }

    /// Standard substatement storage: one slot word per substatement, each
    /// substatement record pointing at its slot.
    fn ext_storage(&mut self, ext: &ExtInstance, flat: FlatSubstmts) -> Result<u64> {
        use layout::substmt as s;
        if ext.substmts.len() != flat.count {
            return Err(internal(format_args!(
                "{} substatements laid out for {}",
                flat.count,
                ext.substmts.len()
            )));
        }
        if ext.substmts.is_empty() {
            return Ok(0);
        }
        let block = self.alloc_words(ext.substmts.len())?;
        for (i, sub) in ext.substmts.iter().enumerate() {
            let slot = block + i * WORD;
            self.put(elem(flat.array, i, s::WORDS), s::STORAGE, slot as u64)?;
            let v = self.storage(ext, sub, flat.ext)?;
            self.put(slot, 0, v)?;
        }
        Ok(block as u64)
    }

    fn storage(&mut self, ext: &ExtInstance, sub: &Substmt, owner: usize) -> Result<u64> {
        let Some(class) = sub.stmt.storage_class() else {
            return Err(internal(format_args!(
                "statement \"{}\" never appears compiled",
                sub.stmt
            )));
        };
        if class != sub.storage.class() {
            return Err(internal(format_args!(
                "statement \"{}\" stored as {:?} instead of {:?}",
                sub.stmt,
                sub.storage.class(),
                class
            )));
        }
        let v = match &sub.storage {
            SubstmtStorage::Nodes(keys) => self.storage_nodes(ext.module, keys)?,
            SubstmtStorage::Str(s) => self.dict_str(s.as_ref())?,
            SubstmtStorage::Items(items) => self.enums(items)?,
            SubstmtStorage::Flags(v) => u64::from(*v),
            SubstmtStorage::UInt8(v) => u64::from(*v),
            SubstmtStorage::UInt32(v) => u64::from(*v),
            SubstmtStorage::Int64(v) => *v as u64,
            SubstmtStorage::Exts(exts) => self.exts(exts, owner)?,
            SubstmtStorage::Identities(identities) => self.identities(identities)?,
            SubstmtStorage::Range(range) => self.range(range.as_ref())?,
            SubstmtStorage::Musts(musts) => self.musts(musts)?,
            SubstmtStorage::Patterns(patterns) => self.patterns(patterns)?,
            SubstmtStorage::Type(ty) => match ty {
                Some(ty) => self.ty(ty)?,
                None => 0,
            },
            SubstmtStorage::When(when) => match when {
                Some(when) => self.when(when)?,
                None => 0,
            },
            SubstmtStorage::NotCompiled => 0,
        };
        Ok(v)
    }

    fn storage_nodes(&mut self, module: ModuleId, keys: &[NodeKey]) -> Result<u64> {
        let ctx = self.ctx;
        let Some(&first) = keys.first() else {
            return Ok(0);
        };
        let cm = ctx
            .module(module)
            .and_then(|m| m.compiled.as_ref())
            .ok_or_else(|| internal("extension nodes in a module that is not compiled"))?;
        if let Some(off) = self.shared(key_addr(cm, first)?) {
            return Ok(off);
        }
        self.siblings(cm, keys)
    }

    /// Patches forward references and writes the snapshot length.
    fn finish(&mut self, header: usize) -> Result<usize> {
        for p in std::mem::take(&mut self.pending) {
            let off = self.map.lookup(p.target).ok_or_else(|| {
                internal(format_args!("reference to {:#x} was never laid out", p.target))
            })?;
            self.sink.put(p.at, off as u64)?;
        }
        let len = self.position();
        self.put(header, layout::header::LENGTH, len as u64)?;
        log::debug!(
            "Snapshot pass: {} bytes, {} structures mapped, {} shared references.",
            len,
            self.map.len(),
            self.shared
        );
        Ok(len)
    }
}

/// Size half of the standard substatement storage: lays the storage out and
/// returns the bytes it took.
pub fn ext_stmt_storage_size(
    sizer: &mut Sizer<'_>,
    ext: &ExtInstance,
    substmts: FlatSubstmts,
) -> Result<usize> {
    let start = sizer.position();
    sizer.ext_storage(ext, substmts)?;
    Ok(sizer.position() - start)
}

/// Write half of the standard substatement storage; returns the slot block.
pub fn ext_stmt_storage_flatten(
    printer: &mut Printer<'_, '_>,
    ext: &ExtInstance,
    substmts: FlatSubstmts,
) -> Result<u64> {
    printer.ext_storage(ext, substmts)
}
