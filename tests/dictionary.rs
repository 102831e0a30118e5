// Dictionary integration tests, with a capturing logger installed.
//
// Invariants exercised:
// - Interning: equal strings share one body; the refcount counts handles.
// - Teardown: strings still referenced when the context goes away are
//   reported with a warning, not an error.
// - Internal errors are logged at error level as they are raised.
use std::sync::{Arc, Mutex};
use yang_snapshot::schema::{Identity, IdentRef};
use yang_snapshot::{Context, DictStr, Dictionary, Error, Module};

struct Capture;

static LOGGER: Capture = Capture;
static RECORDS: Mutex<Vec<(log::Level, String)>> = Mutex::new(Vec::new());

impl log::Log for Capture {
    fn enabled(&self, _: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        RECORDS
            .lock()
            .unwrap()
            .push((record.level(), record.args().to_string()));
    }

    fn flush(&self) {}
}

fn install() {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(log::LevelFilter::Trace);
}

fn logged(level: log::Level, needle: &str) -> bool {
    RECORDS
        .lock()
        .unwrap()
        .iter()
        .any(|(l, msg)| *l == level && msg.contains(needle))
}

// Test: a string interned twice and never fully released.
// Verifies: one shared body with refcount 2; the context teardown warns
// about the remaining reference.
#[test]
fn leaked_string_is_reported_at_teardown() {
    install();
    let ctx = Context::new();
    let a = ctx.intern("test1");
    let b = ctx.intern("test1");
    assert!(DictStr::ptr_eq(&a, &b));
    assert_eq!(ctx.dict().refcount("test1"), Some(2));
    drop(b);
    assert_eq!(ctx.dict().refcount("test1"), Some(1));
    // Never released.
    std::mem::forget(a);
    drop(ctx);
    assert!(logged(
        log::Level::Warn,
        "String \"test1\" not freed from the dictionary, refcount 1"
    ));
}

// Test: releasing every handle leaves nothing to report.
#[test]
fn released_strings_are_not_reported() {
    install();
    let d = Dictionary::new();
    let a = d.intern("released-once");
    let b = a.clone();
    d.release(a).unwrap();
    d.release(b).unwrap();
    assert!(d.is_empty());
    assert!(d.clean().is_empty());
    assert!(!logged(log::Level::Warn, "\"released-once\""));
}

// Test: strings are shared between threads through one dictionary.
#[test]
fn shared_across_threads() {
    let d = Arc::new(Dictionary::new());
    let handles: Vec<DictStr> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let d = Arc::clone(&d);
                s.spawn(move || d.intern("node"))
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });
    assert_eq!(d.refcount("node"), Some(4));
    assert!(handles.windows(2).all(|w| DictStr::ptr_eq(&w[0], &w[1])));
    drop(handles);
    assert!(d.is_empty());
}

// Test: a dangling reference aborts the pass and is logged as internal.
#[test]
fn internal_errors_are_logged() {
    install();
    let mut ctx = Context::new();
    let name = ctx.intern("broken");
    let m = ctx.add_module(Module::new(name));
    let mut ident = Identity::new(ctx.intern("base"), m);
    ident.derived.push(IdentRef {
        module: m,
        index: 7,
    });
    ctx.module_mut(m).unwrap().identities.push(ident);
    assert!(matches!(ctx.compiled_size(), Err(Error::Internal(_))));
    assert!(logged(log::Level::Error, "Internal error (dangling identity reference"));
}
