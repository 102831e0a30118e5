// Flattener property tests.
//
// Property 1: sized and written lengths agree.
//  - Model: a pool of types (string types sharing one pattern, int types
//    with ranges); random leaves pick a type and sit either at the top
//    level or inside a container.
//  - Invariant: to_snapshot() succeeds and its length equals
//    compiled_size().
//
// Property 2: sharing survives flattening.
//  - Invariant: all leaves using one pool type point at one type record;
//    distinct pool types get distinct records; at most one pattern record
//    exists.
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use yang_snapshot::schema::{
    CompiledModule, IntBase, NodeKind, Pattern, Range, RangePart, SchemaNode, Type, TypeKind,
};
use yang_snapshot::{Context, Module, Snapshot};

fn build(kinds: usize, leaves: &[(usize, bool)]) -> Context {
    let mut ctx = Context::new();
    let name = ctx.intern("prop");
    let m = ctx.add_module(Module::new(name));
    let pattern = Arc::new(Pattern::new(ctx.intern("[0-9]*"), vec![7; 5]));
    let pool: Vec<Arc<Type>> = (0..kinds)
        .map(|i| {
            let kind = if i % 2 == 0 {
                TypeKind::String {
                    length: None,
                    patterns: vec![Arc::clone(&pattern)],
                }
            } else {
                TypeKind::Int {
                    base: IntBase::Int16,
                    range: Some(Range::new(vec![RangePart {
                        min: -(i as i64),
                        max: i as i64,
                    }])),
                }
            };
            Arc::new(Type::new(kind))
        })
        .collect();

    let mut cm = CompiledModule::new();
    let holder = cm
        .add_node(None, SchemaNode::new(m, ctx.intern("holder"), NodeKind::container()))
        .unwrap();
    for (i, &(ty, nested)) in leaves.iter().enumerate() {
        let leaf = SchemaNode::new(
            m,
            ctx.intern(&format!("leaf{}", i)),
            NodeKind::leaf(Arc::clone(&pool[ty % kinds])),
        );
        cm.add_node(nested.then_some(holder), leaf).unwrap();
    }
    ctx.module_mut(m).unwrap().compiled = Some(cm);
    ctx
}

proptest! {
    #[test]
    fn prop_sized_equals_written(kinds in 1usize..=4, leaves in proptest::collection::vec((0usize..4, any::<bool>()), 0..40)) {
        let ctx = build(kinds, &leaves);
        let size = ctx.compiled_size().unwrap();
        let buf = ctx.to_snapshot().unwrap();
        prop_assert_eq!(buf.len(), size);
        prop_assert_eq!(Snapshot::open(&buf).unwrap().len(), size);
    }

    #[test]
    fn prop_shared_types_written_once(kinds in 1usize..=4, leaves in proptest::collection::vec((0usize..4, any::<bool>()), 1..40)) {
        let ctx = build(kinds, &leaves);
        let buf = ctx.to_snapshot().unwrap();
        let snap = Snapshot::open(&buf).unwrap();
        let module = snap.context().unwrap().module("prop").unwrap().unwrap();

        let data = module.data().unwrap();
        let mut nodes = data[0].children().unwrap();
        nodes.extend(data.into_iter().skip(1));
        prop_assert_eq!(nodes.len(), leaves.len());

        let mut type_of: HashMap<usize, usize> = HashMap::new();
        let mut patterns = BTreeSet::new();
        for node in nodes {
            let i: usize = node.name().unwrap()["leaf".len()..].parse().unwrap();
            let ty = node.leaf_type().unwrap().unwrap();
            let pool_index = leaves[i].0 % kinds;
            let seen = *type_of.entry(pool_index).or_insert(ty.offset());
            prop_assert_eq!(seen, ty.offset());
            for p in ty.patterns().unwrap() {
                patterns.insert(p.offset());
            }
        }
        let distinct: BTreeSet<usize> = type_of.values().copied().collect();
        prop_assert_eq!(distinct.len(), type_of.len());
        prop_assert!(patterns.len() <= 1);
    }
}
