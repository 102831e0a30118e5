use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;
use yang_snapshot::schema::{CompiledModule, IntBase, NodeKind, Pattern, SchemaNode, Type, TypeKind};
use yang_snapshot::{Context, Module};

/// `modules` modules, each with `lists` lists of `leaves` leaves. Leaves of
/// one module share a handful of types.
fn generated(modules: usize, lists: usize, leaves: usize) -> Context {
    let mut ctx = Context::new();
    for mi in 0..modules {
        let name = ctx.intern(&format!("mod{}", mi));
        let m = ctx.add_module(Module::new(name));
        let pattern = Arc::new(Pattern::new(ctx.intern("[a-z][a-z0-9-]*"), vec![0x5a; 40]));
        let types = [
            Arc::new(Type::new(TypeKind::String {
                length: None,
                patterns: vec![pattern],
            })),
            Arc::new(Type::new(TypeKind::Int {
                base: IntBase::Uint32,
                range: None,
            })),
            Arc::new(Type::new(TypeKind::Bool)),
        ];
        let mut cm = CompiledModule::new();
        for li in 0..lists {
            let list = cm
                .add_node(None, SchemaNode::new(m, ctx.intern(&format!("list{}", li)), NodeKind::list()))
                .expect("top-level list");
            for i in 0..leaves {
                let ty = Arc::clone(&types[i % types.len()]);
                let leaf = SchemaNode::new(m, ctx.intern(&format!("leaf{}", i)), NodeKind::leaf(ty));
                cm.add_node(Some(list), leaf).expect("leaf under list");
            }
        }
        ctx.module_mut(m).expect("just added").compiled = Some(cm);
    }
    ctx
}

fn bench_size(c: &mut Criterion) {
    let ctx = generated(10, 20, 25);
    c.bench_function("flatten::size_5k_nodes", |b| {
        b.iter(|| black_box(ctx.compiled_size().expect("size")))
    });
}

fn bench_snapshot(c: &mut Criterion) {
    let ctx = generated(10, 20, 25);
    c.bench_function("flatten::to_snapshot_5k_nodes", |b| {
        b.iter(|| black_box(ctx.to_snapshot().expect("snapshot")))
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_size, bench_snapshot
}
criterion_main!(benches);
