//! Compiled schema graph: the input of the flattener.
//!
//! Ownership edges form a tree: the context owns modules, a compiled module
//! owns its nodes in a `SlotMap` arena, nodes own restrictions and extension
//! instances. Back and sibling edges (parent, module, identity bases) are
//! keys or ids, never owning pointers. Types, `when` conditions and
//! patterns are `Arc`s and may be shared by several owners.

use crate::dict::{DictStr, Dictionary};
use crate::error::{Error, Result};
use crate::plugin::ExtensionPlugin;
use crate::stmt::{Stmt, Substmt};
use core::fmt;
use slotmap::{new_key_type, SlotMap};
use std::sync::Arc;

new_key_type! {
    /// Schema node inside one compiled module.
    pub struct NodeKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub module: ModuleId,
    pub node: NodeKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentRef {
    pub module: ModuleId,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtDefRef {
    pub module: ModuleId,
    pub index: usize,
}

/// YANG node type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NodeType {
    Container = 0x1,
    Choice = 0x2,
    Leaf = 0x4,
    LeafList = 0x8,
    List = 0x10,
    AnyXml = 0x20,
    AnyData = 0x60,
    Case = 0x80,
    Rpc = 0x100,
    Action = 0x200,
    Notif = 0x400,
    Input = 0x1000,
    Output = 0x2000,
}

impl NodeType {
    pub const ALL: [NodeType; 13] = [
        NodeType::Container,
        NodeType::Choice,
        NodeType::Leaf,
        NodeType::LeafList,
        NodeType::List,
        NodeType::AnyXml,
        NodeType::AnyData,
        NodeType::Case,
        NodeType::Rpc,
        NodeType::Action,
        NodeType::Notif,
        NodeType::Input,
        NodeType::Output,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn from_code(code: u16) -> Option<NodeType> {
        NodeType::ALL.iter().copied().find(|t| t.code() == code)
    }
}

/// Built-in type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BaseType {
    Unknown = 0,
    Binary = 1,
    Uint8 = 2,
    Uint16 = 3,
    Uint32 = 4,
    Uint64 = 5,
    String = 6,
    Bits = 7,
    Bool = 8,
    Dec64 = 9,
    Empty = 10,
    Enum = 11,
    IdentityRef = 12,
    InstanceId = 13,
    LeafRef = 14,
    Union = 15,
    Int8 = 16,
    Int16 = 17,
    Int32 = 18,
    Int64 = 19,
}

impl BaseType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<BaseType> {
        use BaseType::*;
        [
            Unknown, Binary, Uint8, Uint16, Uint32, Uint64, String, Bits, Bool, Dec64, Empty, Enum,
            IdentityRef, InstanceId, LeafRef, Union, Int8, Int16, Int32, Int64,
        ]
        .get(usize::from(code))
        .copied()
    }
}

/// Integer flavours of the numeric type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntBase {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
}

impl From<IntBase> for BaseType {
    fn from(b: IntBase) -> Self {
        match b {
            IntBase::Int8 => BaseType::Int8,
            IntBase::Int16 => BaseType::Int16,
            IntBase::Int32 => BaseType::Int32,
            IntBase::Int64 => BaseType::Int64,
            IntBase::Uint8 => BaseType::Uint8,
            IntBase::Uint16 => BaseType::Uint16,
            IntBase::Uint32 => BaseType::Uint32,
            IntBase::Uint64 => BaseType::Uint64,
        }
    }
}

/// Parsed XPath expression with its token tables.
#[derive(Debug, Clone)]
pub struct Expr {
    pub expr: DictStr,
    pub tokens: Vec<u32>,
    pub tok_pos: Vec<u32>,
    pub tok_len: Vec<u32>,
    /// Empty, or one optional index list per token.
    pub repeat: Vec<Option<Vec<u32>>>,
}

impl Expr {
    pub fn new(expr: DictStr) -> Self {
        Self {
            expr,
            tokens: Vec::new(),
            tok_pos: Vec::new(),
            tok_len: Vec::new(),
            repeat: Vec::new(),
        }
    }
}

/// Prefix-to-module binding used to resolve an expression.
#[derive(Debug, Clone)]
pub struct Prefix {
    pub prefix: String,
    pub module: ModuleId,
}

#[derive(Debug, Clone)]
pub struct Must {
    pub cond: Expr,
    pub prefixes: Vec<Prefix>,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub emsg: Option<DictStr>,
    pub eapptag: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
}

impl Must {
    pub fn new(cond: Expr) -> Self {
        Self {
            cond,
            prefixes: Vec::new(),
            dsc: None,
            reference: None,
            emsg: None,
            eapptag: None,
            exts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct When {
    pub cond: Expr,
    /// Context node the condition is evaluated in.
    pub context: Option<NodeRef>,
    pub prefixes: Vec<Prefix>,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
    pub flags: u16,
}

impl When {
    pub fn new(cond: Expr, context: Option<NodeRef>) -> Self {
        Self {
            cond,
            context,
            prefixes: Vec::new(),
            dsc: None,
            reference: None,
            exts: Vec::new(),
            flags: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePart {
    pub min: i64,
    pub max: i64,
}

/// `range` or `length` restriction.
#[derive(Debug, Clone, Default)]
pub struct Range {
    pub parts: Vec<RangePart>,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub emsg: Option<DictStr>,
    pub eapptag: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
}

impl Range {
    pub fn new(parts: Vec<RangePart>) -> Self {
        Self {
            parts,
            ..Default::default()
        }
    }
}

/// Compiled regular expression.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub expr: DictStr,
    /// Serialized compiled code.
    pub code: Vec<u8>,
    pub inverted: bool,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub emsg: Option<DictStr>,
    pub eapptag: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
}

impl Pattern {
    pub fn new(expr: DictStr, code: Vec<u8>) -> Self {
        Self {
            expr,
            code,
            inverted: false,
            dsc: None,
            reference: None,
            emsg: None,
            eapptag: None,
            exts: Vec::new(),
        }
    }
}

/// `enum` or `bit` item.
#[derive(Debug, Clone)]
pub struct EnumItem {
    pub name: DictStr,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
    /// Value of an enum, position of a bit.
    pub value: i64,
    pub flags: u16,
}

impl EnumItem {
    pub fn new(name: DictStr, value: i64) -> Self {
        Self {
            name,
            dsc: None,
            reference: None,
            exts: Vec::new(),
            value,
            flags: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Binary { length: Option<Range> },
    Int { base: IntBase, range: Option<Range> },
    Dec64 { fraction_digits: u8, range: Option<Range> },
    String { length: Option<Range>, patterns: Vec<Arc<Pattern>> },
    Enum { items: Vec<EnumItem> },
    Bits { items: Vec<EnumItem> },
    Bool,
    Empty,
    IdentityRef { bases: Vec<IdentRef> },
    InstanceId { require_instance: bool },
    LeafRef {
        path: Expr,
        prefixes: Vec<Prefix>,
        realtype: Option<Arc<Type>>,
        require_instance: bool,
    },
    Union { types: Vec<Arc<Type>> },
}

#[derive(Debug, Clone)]
pub struct Type {
    /// Name of the typedef this type was compiled from.
    pub name: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
    pub kind: TypeKind,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            name: None,
            exts: Vec::new(),
            kind,
        }
    }

    pub fn basetype(&self) -> BaseType {
        match &self.kind {
            TypeKind::Binary { .. } => BaseType::Binary,
            TypeKind::Int { base, .. } => (*base).into(),
            TypeKind::Dec64 { .. } => BaseType::Dec64,
            TypeKind::String { .. } => BaseType::String,
            TypeKind::Enum { .. } => BaseType::Enum,
            TypeKind::Bits { .. } => BaseType::Bits,
            TypeKind::Bool => BaseType::Bool,
            TypeKind::Empty => BaseType::Empty,
            TypeKind::IdentityRef { .. } => BaseType::IdentityRef,
            TypeKind::InstanceId { .. } => BaseType::InstanceId,
            TypeKind::LeafRef { .. } => BaseType::LeafRef,
            TypeKind::Union { .. } => BaseType::Union,
        }
    }
}

/// Default value with the prefixes needed to resolve it.
#[derive(Debug, Clone)]
pub struct Value {
    pub str: DictStr,
    pub prefixes: Vec<Prefix>,
}

/// Instance of an extension statement.
#[derive(Debug, Clone)]
pub struct ExtInstance {
    pub def: ExtDefRef,
    pub argument: Option<DictStr>,
    pub module: ModuleId,
    pub exts: Vec<ExtInstance>,
    /// Statement the instance appears in.
    pub parent_stmt: Stmt,
    pub parent_stmt_index: u64,
    pub substmts: Vec<Substmt>,
}

impl ExtInstance {
    pub fn new(def: ExtDefRef, module: ModuleId, parent_stmt: Stmt) -> Self {
        Self {
            def,
            argument: None,
            module,
            exts: Vec::new(),
            parent_stmt,
            parent_stmt_index: 0,
            substmts: Vec::new(),
        }
    }
}

/// `extension` definition.
#[derive(Debug, Clone)]
pub struct ExtensionDef {
    pub name: DictStr,
    pub argname: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
    /// Index into the context's plugin registry.
    pub plugin: Option<usize>,
    pub module: ModuleId,
    pub flags: u16,
}

impl ExtensionDef {
    pub fn new(name: DictStr, module: ModuleId) -> Self {
        Self {
            name,
            argname: None,
            exts: Vec::new(),
            plugin: None,
            module,
            flags: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Identity {
    pub name: DictStr,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub module: ModuleId,
    /// Identities derived from this one, possibly in other modules.
    pub derived: Vec<IdentRef>,
    pub exts: Vec<ExtInstance>,
    pub flags: u16,
}

impl Identity {
    pub fn new(name: DictStr, module: ModuleId) -> Self {
        Self {
            name,
            dsc: None,
            reference: None,
            module,
            derived: Vec::new(),
            exts: Vec::new(),
            flags: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Submodule {
    pub name: DictStr,
    pub revision: Option<DictStr>,
    pub filepath: Option<DictStr>,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Container {
        child: Vec<NodeKey>,
        musts: Vec<Must>,
        whens: Vec<Arc<When>>,
        actions: Vec<NodeKey>,
        notifs: Vec<NodeKey>,
    },
    Choice {
        cases: Vec<NodeKey>,
        whens: Vec<Arc<When>>,
        dflt: Option<NodeKey>,
    },
    Case {
        child: Vec<NodeKey>,
        whens: Vec<Arc<When>>,
    },
    Leaf {
        musts: Vec<Must>,
        whens: Vec<Arc<When>>,
        ty: Arc<Type>,
        units: Option<DictStr>,
        dflt: Option<Value>,
    },
    LeafList {
        musts: Vec<Must>,
        whens: Vec<Arc<When>>,
        ty: Arc<Type>,
        units: Option<DictStr>,
        dflts: Vec<Value>,
        min: u32,
        max: u32,
    },
    List {
        child: Vec<NodeKey>,
        musts: Vec<Must>,
        whens: Vec<Arc<When>>,
        actions: Vec<NodeKey>,
        notifs: Vec<NodeKey>,
        /// Each unique statement lists descendant leaves.
        uniques: Vec<Vec<NodeKey>>,
        min: u32,
        max: u32,
    },
    AnyData {
        musts: Vec<Must>,
        whens: Vec<Arc<When>>,
    },
    AnyXml {
        musts: Vec<Must>,
        whens: Vec<Arc<When>>,
    },
    Rpc {
        whens: Vec<Arc<When>>,
        input: Option<NodeKey>,
        output: Option<NodeKey>,
    },
    Action {
        whens: Vec<Arc<When>>,
        input: Option<NodeKey>,
        output: Option<NodeKey>,
    },
    Input {
        child: Vec<NodeKey>,
        musts: Vec<Must>,
    },
    Output {
        child: Vec<NodeKey>,
        musts: Vec<Must>,
    },
    Notif {
        child: Vec<NodeKey>,
        musts: Vec<Must>,
        whens: Vec<Arc<When>>,
    },
}

impl NodeKind {
    pub fn container() -> Self {
        NodeKind::Container {
            child: Vec::new(),
            musts: Vec::new(),
            whens: Vec::new(),
            actions: Vec::new(),
            notifs: Vec::new(),
        }
    }

    pub fn list() -> Self {
        NodeKind::List {
            child: Vec::new(),
            musts: Vec::new(),
            whens: Vec::new(),
            actions: Vec::new(),
            notifs: Vec::new(),
            uniques: Vec::new(),
            min: 0,
            max: u32::MAX,
        }
    }

    pub fn choice() -> Self {
        NodeKind::Choice {
            cases: Vec::new(),
            whens: Vec::new(),
            dflt: None,
        }
    }

    pub fn case() -> Self {
        NodeKind::Case {
            child: Vec::new(),
            whens: Vec::new(),
        }
    }

    pub fn leaf(ty: Arc<Type>) -> Self {
        NodeKind::Leaf {
            musts: Vec::new(),
            whens: Vec::new(),
            ty,
            units: None,
            dflt: None,
        }
    }

    pub fn leaf_list(ty: Arc<Type>) -> Self {
        NodeKind::LeafList {
            musts: Vec::new(),
            whens: Vec::new(),
            ty,
            units: None,
            dflts: Vec::new(),
            min: 0,
            max: u32::MAX,
        }
    }

    pub fn anydata() -> Self {
        NodeKind::AnyData {
            musts: Vec::new(),
            whens: Vec::new(),
        }
    }

    pub fn rpc() -> Self {
        NodeKind::Rpc {
            whens: Vec::new(),
            input: None,
            output: None,
        }
    }

    pub fn action() -> Self {
        NodeKind::Action {
            whens: Vec::new(),
            input: None,
            output: None,
        }
    }

    pub fn input() -> Self {
        NodeKind::Input {
            child: Vec::new(),
            musts: Vec::new(),
        }
    }

    pub fn output() -> Self {
        NodeKind::Output {
            child: Vec::new(),
            musts: Vec::new(),
        }
    }

    pub fn notif() -> Self {
        NodeKind::Notif {
            child: Vec::new(),
            musts: Vec::new(),
            whens: Vec::new(),
        }
    }

    pub fn nodetype(&self) -> NodeType {
        match self {
            NodeKind::Container { .. } => NodeType::Container,
            NodeKind::Choice { .. } => NodeType::Choice,
            NodeKind::Case { .. } => NodeType::Case,
            NodeKind::Leaf { .. } => NodeType::Leaf,
            NodeKind::LeafList { .. } => NodeType::LeafList,
            NodeKind::List { .. } => NodeType::List,
            NodeKind::AnyData { .. } => NodeType::AnyData,
            NodeKind::AnyXml { .. } => NodeType::AnyXml,
            NodeKind::Rpc { .. } => NodeType::Rpc,
            NodeKind::Action { .. } => NodeType::Action,
            NodeKind::Input { .. } => NodeType::Input,
            NodeKind::Output { .. } => NodeType::Output,
            NodeKind::Notif { .. } => NodeType::Notif,
        }
    }

    pub fn whens(&self) -> &[Arc<When>] {
        match self {
            NodeKind::Container { whens, .. }
            | NodeKind::Choice { whens, .. }
            | NodeKind::Case { whens, .. }
            | NodeKind::Leaf { whens, .. }
            | NodeKind::LeafList { whens, .. }
            | NodeKind::List { whens, .. }
            | NodeKind::AnyData { whens, .. }
            | NodeKind::AnyXml { whens, .. }
            | NodeKind::Rpc { whens, .. }
            | NodeKind::Action { whens, .. }
            | NodeKind::Notif { whens, .. } => whens,
            NodeKind::Input { .. } | NodeKind::Output { .. } => &[],
        }
    }

    pub fn whens_mut(&mut self) -> Option<&mut Vec<Arc<When>>> {
        match self {
            NodeKind::Container { whens, .. }
            | NodeKind::Choice { whens, .. }
            | NodeKind::Case { whens, .. }
            | NodeKind::Leaf { whens, .. }
            | NodeKind::LeafList { whens, .. }
            | NodeKind::List { whens, .. }
            | NodeKind::AnyData { whens, .. }
            | NodeKind::AnyXml { whens, .. }
            | NodeKind::Rpc { whens, .. }
            | NodeKind::Action { whens, .. }
            | NodeKind::Notif { whens, .. } => Some(whens),
            NodeKind::Input { .. } | NodeKind::Output { .. } => None,
        }
    }

    pub fn musts_mut(&mut self) -> Option<&mut Vec<Must>> {
        match self {
            NodeKind::Container { musts, .. }
            | NodeKind::Leaf { musts, .. }
            | NodeKind::LeafList { musts, .. }
            | NodeKind::List { musts, .. }
            | NodeKind::AnyData { musts, .. }
            | NodeKind::AnyXml { musts, .. }
            | NodeKind::Input { musts, .. }
            | NodeKind::Output { musts, .. }
            | NodeKind::Notif { musts, .. } => Some(musts),
            _ => None,
        }
    }

    /// Data children, in order.
    pub fn children(&self) -> &[NodeKey] {
        match self {
            NodeKind::Container { child, .. }
            | NodeKind::Case { child, .. }
            | NodeKind::List { child, .. }
            | NodeKind::Input { child, .. }
            | NodeKind::Output { child, .. }
            | NodeKind::Notif { child, .. } => child,
            NodeKind::Choice { cases, .. } => cases,
            _ => &[],
        }
    }
}

pub struct SchemaNode {
    pub flags: u16,
    /// Schema hash used by data-tree lookups.
    pub hash: [u8; 4],
    pub module: ModuleId,
    pub parent: Option<NodeKey>,
    pub name: DictStr,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub exts: Vec<ExtInstance>,
    pub kind: NodeKind,
}

impl SchemaNode {
    pub fn new(module: ModuleId, name: DictStr, kind: NodeKind) -> Self {
        Self {
            flags: 0,
            hash: [0; 4],
            module,
            parent: None,
            name,
            dsc: None,
            reference: None,
            exts: Vec::new(),
            kind,
        }
    }
}

impl fmt::Debug for SchemaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaNode")
            .field("nodetype", &self.kind.nodetype())
            .field("name", &self.name)
            .field("parent", &self.parent)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct CompiledModule {
    pub nodes: SlotMap<NodeKey, SchemaNode>,
    pub data: Vec<NodeKey>,
    pub rpcs: Vec<NodeKey>,
    pub notifs: Vec<NodeKey>,
    pub features: Vec<DictStr>,
    pub exts: Vec<ExtInstance>,
}

impl CompiledModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node` under `parent` (top level when `None`), appending it to
    /// the list its kind belongs to.
    pub fn add_node(&mut self, parent: Option<NodeKey>, mut node: SchemaNode) -> Result<NodeKey> {
        let nt = node.kind.nodetype();
        node.parent = parent;
        let Some(p) = parent else {
            let key = self.nodes.insert(node);
            match nt {
                NodeType::Rpc => self.rpcs.push(key),
                NodeType::Notif => self.notifs.push(key),
                NodeType::Action | NodeType::Case | NodeType::Input | NodeType::Output => {
                    self.nodes.remove(key);
                    return Err(Error::InvalidArgument("node kind cannot be top-level"));
                }
                _ => self.data.push(key),
            }
            return Ok(key);
        };
        if !self.nodes.contains_key(p) {
            return Err(Error::InvalidArgument("unknown parent node"));
        }
        let key = self.nodes.insert(node);
        let linked = match (&mut self.nodes[p].kind, nt) {
            (NodeKind::Choice { cases, .. }, NodeType::Case) => {
                cases.push(key);
                true
            }
            (NodeKind::Choice { .. }, _) => false,
            (
                NodeKind::Container { actions, .. } | NodeKind::List { actions, .. },
                NodeType::Action,
            ) => {
                actions.push(key);
                true
            }
            (NodeKind::Container { notifs, .. } | NodeKind::List { notifs, .. }, NodeType::Notif) => {
                notifs.push(key);
                true
            }
            (NodeKind::Rpc { input, .. } | NodeKind::Action { input, .. }, NodeType::Input)
                if input.is_none() =>
            {
                *input = Some(key);
                true
            }
            (NodeKind::Rpc { output, .. } | NodeKind::Action { output, .. }, NodeType::Output)
                if output.is_none() =>
            {
                *output = Some(key);
                true
            }
            (_, NodeType::Case | NodeType::Input | NodeType::Output | NodeType::Rpc) => false,
            (_, NodeType::Action | NodeType::Notif) => false,
            (
                NodeKind::Container { child, .. }
                | NodeKind::Case { child, .. }
                | NodeKind::List { child, .. }
                | NodeKind::Input { child, .. }
                | NodeKind::Output { child, .. }
                | NodeKind::Notif { child, .. },
                _,
            ) => {
                child.push(key);
                true
            }
            _ => false,
        };
        if !linked {
            self.nodes.remove(key);
            return Err(Error::InvalidArgument("node kind not allowed under this parent"));
        }
        Ok(key)
    }

    pub fn node(&self, key: NodeKey) -> Option<&SchemaNode> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut SchemaNode> {
        self.nodes.get_mut(key)
    }
}

pub struct Module {
    pub name: DictStr,
    pub revision: Option<DictStr>,
    pub ns: Option<DictStr>,
    pub prefix: Option<DictStr>,
    pub filepath: Option<DictStr>,
    pub org: Option<DictStr>,
    pub contact: Option<DictStr>,
    pub dsc: Option<DictStr>,
    pub reference: Option<DictStr>,
    pub compiled: Option<CompiledModule>,
    pub extensions: Vec<ExtensionDef>,
    pub identities: Vec<Identity>,
    pub submodules: Vec<Submodule>,
    /// Modules augmenting this one.
    pub augmented_by: Vec<ModuleId>,
    /// Modules deviating this one.
    pub deviated_by: Vec<ModuleId>,
    pub implemented: bool,
    pub latest_revision: u8,
}

impl Module {
    pub fn new(name: DictStr) -> Self {
        Self {
            name,
            revision: None,
            ns: None,
            prefix: None,
            filepath: None,
            org: None,
            contact: None,
            dsc: None,
            reference: None,
            compiled: None,
            extensions: Vec::new(),
            identities: Vec::new(),
            submodules: Vec::new(),
            augmented_by: Vec::new(),
            deviated_by: Vec::new(),
            implemented: false,
            latest_revision: 0,
        }
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("revision", &self.revision)
            .field("compiled", &self.compiled.is_some())
            .finish()
    }
}

/// A set of modules sharing one dictionary and one plugin registry.
pub struct Context {
    pub modules: Vec<Module>,
    pub ext_plugins: Vec<Arc<dyn ExtensionPlugin>>,
    pub change_count: u16,
    pub opts: u32,
    // Declared last: module strings are released before teardown checks for leaks.
    dict: Dictionary,
}

impl Context {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
            ext_plugins: Vec::new(),
            change_count: 0,
            opts: 0,
            dict: Dictionary::new(),
        }
    }

    pub fn dict(&self) -> &Dictionary {
        &self.dict
    }

    pub fn intern(&self, s: &str) -> DictStr {
        self.dict.intern(s)
    }

    pub fn add_module(&mut self, module: Module) -> ModuleId {
        self.modules.push(module);
        self.change_count = self.change_count.wrapping_add(1);
        ModuleId(self.modules.len() - 1)
    }

    pub fn module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(id.0)
    }

    pub fn module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(id.0)
    }

    /// Registers a plugin, returning the index extension definitions use.
    pub fn register_ext_plugin(&mut self, plugin: Arc<dyn ExtensionPlugin>) -> usize {
        self.ext_plugins.push(plugin);
        self.ext_plugins.len() - 1
    }

    pub fn node(&self, r: NodeRef) -> Option<&SchemaNode> {
        self.module(r.module)?.compiled.as_ref()?.node(r.node)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("modules", &self.modules)
            .field("ext_plugins", &self.ext_plugins.len())
            .field("dict", &self.dict)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string_type() -> Arc<Type> {
        Arc::new(Type::new(TypeKind::String {
            length: None,
            patterns: Vec::new(),
        }))
    }

    /// Invariant: add_node links children into the list matching their kind.
    #[test]
    fn add_node_links_by_kind() {
        let ctx = Context::new();
        let m = ModuleId(0);
        let mut c = CompiledModule::new();
        let top = c
            .add_node(None, SchemaNode::new(m, ctx.intern("top"), NodeKind::container()))
            .unwrap();
        let leaf = c
            .add_node(Some(top), SchemaNode::new(m, ctx.intern("l"), NodeKind::leaf(string_type())))
            .unwrap();
        let act = c
            .add_node(Some(top), SchemaNode::new(m, ctx.intern("reset"), NodeKind::action()))
            .unwrap();
        let input = c
            .add_node(Some(act), SchemaNode::new(m, ctx.intern("input"), NodeKind::input()))
            .unwrap();
        let rpc = c
            .add_node(None, SchemaNode::new(m, ctx.intern("ping"), NodeKind::rpc()))
            .unwrap();

        assert_eq!(c.data, vec![top]);
        assert_eq!(c.rpcs, vec![rpc]);
        assert_eq!(c.node(top).unwrap().kind.children(), &[leaf]);
        match &c.node(top).unwrap().kind {
            NodeKind::Container { actions, .. } => assert_eq!(actions, &vec![act]),
            other => panic!("unexpected kind: {:?}", other),
        }
        match &c.node(act).unwrap().kind {
            NodeKind::Action { input: i, output, .. } => {
                assert_eq!(*i, Some(input));
                assert!(output.is_none());
            }
            other => panic!("unexpected kind: {:?}", other),
        }
        assert_eq!(c.node(leaf).unwrap().parent, Some(top));
    }

    /// Invariant: misplaced nodes are rejected and not left in the arena.
    #[test]
    fn add_node_rejects_misplaced() {
        let ctx = Context::new();
        let m = ModuleId(0);
        let mut c = CompiledModule::new();
        let leaf = c
            .add_node(None, SchemaNode::new(m, ctx.intern("l"), NodeKind::leaf(string_type())))
            .unwrap();
        let ch = c
            .add_node(None, SchemaNode::new(m, ctx.intern("ch"), NodeKind::choice()))
            .unwrap();
        assert!(c
            .add_node(Some(leaf), SchemaNode::new(m, ctx.intern("x"), NodeKind::container()))
            .is_err());
        assert!(c
            .add_node(Some(ch), SchemaNode::new(m, ctx.intern("x"), NodeKind::container()))
            .is_err());
        assert!(c
            .add_node(None, SchemaNode::new(m, ctx.intern("c"), NodeKind::case()))
            .is_err());
        assert_eq!(c.nodes.len(), 2);
    }

    /// Invariant: dropping a context releases module strings before the leak check.
    #[test]
    fn context_drop_releases_module_strings() {
        let mut ctx = Context::new();
        let m = Module::new(ctx.intern("mod"));
        ctx.add_module(m);
        assert_eq!(ctx.dict().refcount("mod"), Some(1));
        let kept = ctx.intern("kept");
        drop(ctx);
        assert_eq!(&*kept, "kept");
    }

    /// Invariant: node and base type codes round-trip.
    #[test]
    fn type_codes() {
        for t in NodeType::ALL {
            assert_eq!(NodeType::from_code(t.code()), Some(t));
        }
        assert_eq!(NodeType::AnyData.code(), 0x60);
        assert_eq!(BaseType::from_code(14), Some(BaseType::LeafRef));
        assert_eq!(BaseType::from_code(20), None);
        let t = Type::new(TypeKind::Int {
            base: IntBase::Uint16,
            range: None,
        });
        assert_eq!(t.basetype(), BaseType::Uint16);
    }
}
