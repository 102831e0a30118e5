use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::time::Duration;
use yang_snapshot::{hash_bytes, Dictionary, HashTable, ResizeMode};

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> String {
    format!("k{:016x}", n)
}

type StrTable = HashTable<String, fn(&String, &String, bool) -> bool>;

fn str_equal(a: &String, b: &String, _: bool) -> bool {
    a == b
}

fn table() -> StrTable {
    HashTable::new(8, str_equal as fn(&String, &String, bool) -> bool, ResizeMode::GrowShrink)
}

fn filled(seed: u64, n: usize) -> (StrTable, Vec<String>) {
    let mut t = table();
    let keys: Vec<String> = lcg(seed).take(n).map(key).collect();
    for k in &keys {
        let h = hash_bytes(k.as_bytes());
        let _ = t.insert(k.clone(), h);
    }
    (t, keys)
}

fn bench_insert_fresh_100k(c: &mut Criterion) {
    c.bench_function("table::insert_fresh_100k", |b| {
        b.iter_batched(
            || lcg(1).take(100_000).map(key).collect::<Vec<_>>(),
            |keys| {
                let mut t = table();
                for k in keys {
                    let h = hash_bytes(k.as_bytes());
                    let _ = t.insert(k, h);
                }
                black_box(t)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_find_hit_10k(c: &mut Criterion) {
    c.bench_function("table::find_hit_10k_on_100k", |b| {
        let (t, keys) = filled(7, 100_000);
        let queries: Vec<(String, u32)> = lcg(9)
            .take(10_000)
            .map(|s| {
                let k = keys[(s as usize) % keys.len()].clone();
                let h = hash_bytes(k.as_bytes());
                (k, h)
            })
            .collect();
        b.iter(|| {
            for (k, h) in &queries {
                black_box(t.find(k, *h));
            }
        })
    });
}

fn bench_remove_random_10k(c: &mut Criterion) {
    c.bench_function("table::remove_random_10k_of_100k", |b| {
        b.iter_batched(
            || {
                let (t, keys) = filled(4, 100_000);
                let victims: Vec<String> = lcg(5)
                    .take(10_000)
                    .map(|s| keys[(s as usize) % keys.len()].clone())
                    .collect();
                (t, victims)
            },
            |(mut t, victims)| {
                for k in &victims {
                    let _ = t.remove(k, hash_bytes(k.as_bytes()));
                }
                black_box(t)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_dict_intern_release(c: &mut Criterion) {
    c.bench_function("dict::intern_release_10k", |b| {
        let keys: Vec<String> = lcg(13).take(1_000).map(key).collect();
        let d = Dictionary::new();
        b.iter(|| {
            let held: Vec<_> = keys.iter().cycle().take(10_000).map(|k| d.intern(k)).collect();
            black_box(d.len());
            drop(held);
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(12)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_insert_fresh_100k,
              bench_find_hit_10k,
              bench_remove_random_10k,
              bench_dict_intern_release
}
criterion_main!(benches);
