//! Lazy compilation and compiled code eviction

mod common;

use common::{Scripts, runtime, runtime_with};
use marten_vm_bytecode::FunctionInfo;
use marten_vm_core::object::{ObjectRef, PropertyKey};
use marten_vm_core::runtime::RuntimeConfig;
use marten_vm_core::{VmContext, VmError, Value};

/// Code size used for the eviction tests; two blocks fit, three do not
const BLOCK: usize = 1000;

fn small_cache() -> RuntimeConfig {
    RuntimeConfig {
        code_cache_limit: 1500,
        ..RuntimeConfig::default()
    }
}

fn script(ctx: &VmContext, name: &str) -> ObjectRef {
    let f = ctx.create_script_function(FunctionInfo::builder().name(name).build().unwrap());
    ctx.define_global(name, Value::object(f.clone())).unwrap();
    f
}

fn global(ctx: &VmContext, name: &str) -> Value {
    ctx.global()
        .get(&PropertyKey::string(name))
        .unwrap_or_default()
}

fn is_compiled(f: &ObjectRef) -> bool {
    f.as_function()
        .is_some_and(|data| data.code_block().has_compiled_code())
}

#[test]
fn test_compiles_on_first_call_only() {
    let scripts = Scripts::new();
    scripts.define("f", |_, _, _| Ok(Value::int32(1)));
    let rt = runtime(&scripts);
    let ctx = rt.create_context();
    let f = script(&ctx, "f");

    assert!(!is_compiled(&f));
    assert_eq!(scripts.parse_count(), 0);
    for _ in 0..3 {
        ctx.call(&Value::object(f.clone()), Value::undefined(), &[]).unwrap();
    }
    assert!(is_compiled(&f));
    assert_eq!(scripts.parse_count(), 1);
    assert_eq!(ctx.code_cache().len(), 1);
    assert_eq!(ctx.memory().allocated(), ctx.code_cache().footprint());
}

#[test]
fn test_parse_failure_leaves_function_uncompiled() {
    let scripts = Scripts::new();
    let rt = runtime(&scripts);
    let ctx = rt.create_context();
    let f = script(&ctx, "later");

    let err = ctx.call(&Value::object(f.clone()), Value::undefined(), &[]).unwrap_err();
    assert!(matches!(err, VmError::SyntaxError(_)));
    assert!(!is_compiled(&f));
    assert!(ctx.code_cache().is_empty());

    scripts.define("later", |_, _, _| Ok(Value::boolean(true)));
    let ok = ctx.call(&Value::object(f.clone()), Value::undefined(), &[]).unwrap();
    assert_eq!(ok, Value::boolean(true));
    assert!(is_compiled(&f));
}

#[test]
fn test_out_of_memory_during_compilation() {
    let scripts = Scripts::new();
    scripts.define_sized("huge", 4096, |_, _, _| Ok(Value::undefined()));
    let config = RuntimeConfig {
        max_heap_size: 1024,
        ..RuntimeConfig::default()
    };
    let rt = runtime_with(&scripts, config);
    let ctx = rt.create_context();
    let f = script(&ctx, "huge");

    let err = ctx.call(&Value::object(f.clone()), Value::undefined(), &[]).unwrap_err();
    assert!(matches!(err, VmError::OutOfMemory));
    assert!(!is_compiled(&f));
    assert_eq!(ctx.memory().allocated(), 0);
}

#[test]
fn test_idle_code_is_evicted_and_recompiled() {
    let scripts = Scripts::new();
    for name in ["a", "b", "c"] {
        scripts.define_sized(name, BLOCK, |_, _, _| Ok(Value::undefined()));
    }
    let rt = runtime_with(&scripts, small_cache());
    let ctx = rt.create_context();
    let a = script(&ctx, "a");
    let b = script(&ctx, "b");
    let c = script(&ctx, "c");

    ctx.call(&Value::object(a.clone()), Value::undefined(), &[]).unwrap();
    ctx.call(&Value::object(b.clone()), Value::undefined(), &[]).unwrap();
    assert!(ctx.code_cache().needs_eviction());
    assert_eq!(ctx.code_cache().len(), 2);

    ctx.call(&Value::object(c.clone()), Value::undefined(), &[]).unwrap();
    assert!(!is_compiled(&a));
    assert!(!is_compiled(&b));
    assert!(is_compiled(&c));
    assert_eq!(ctx.code_cache().len(), 1);
    assert_eq!(ctx.memory().allocated(), ctx.code_cache().footprint());

    assert_eq!(scripts.parse_count(), 3);
    ctx.call(&Value::object(a.clone()), Value::undefined(), &[]).unwrap();
    assert!(is_compiled(&a));
    assert_eq!(scripts.parse_count(), 4);
}

#[test]
fn test_running_code_survives_eviction_without_debug_info() {
    let scripts = Scripts::new();
    scripts.define_sized("outer", BLOCK, |frame, code, _| {
        let ctx = frame.context();
        assert!(code.has_debug_info());

        frame.call(&global(ctx, "first"), Value::undefined(), &[])?;
        frame.call(&global(ctx, "second"), Value::undefined(), &[])?;

        // Compiling `second` evicted `first`; this frame kept its code
        let first = global(ctx, "first");
        assert!(!is_compiled(first.as_object().unwrap()));
        assert!(frame.code_block().unwrap().has_compiled_code());
        assert!(!code.has_debug_info());
        Err(VmError::exception(Value::string("done")))
    });
    scripts.define_sized("first", BLOCK, |_, _, _| Ok(Value::undefined()));
    scripts.define_sized("second", BLOCK, |_, _, _| Ok(Value::undefined()));

    let rt = runtime_with(&scripts, small_cache());
    let ctx = rt.create_context();
    let outer = script(&ctx, "outer");
    script(&ctx, "first");
    let second = script(&ctx, "second");

    let err = ctx.call(&Value::object(outer.clone()), Value::undefined(), &[]).unwrap_err();
    let thrown = match err {
        VmError::Exception(thrown) => thrown,
        other => panic!("expected a thrown value, got {other:?}"),
    };
    assert_eq!(thrown.stack.len(), 1);
    assert_eq!(thrown.stack[0].function_name, "outer");
    assert_eq!(thrown.stack[0].line, None);

    assert!(is_compiled(&outer));
    assert!(is_compiled(&second));
    assert_eq!(ctx.code_cache().len(), 2);
    assert_eq!(ctx.memory().allocated(), ctx.code_cache().footprint());
}

#[test]
fn test_eviction_stats_report_shrinkage() {
    let scripts = Scripts::new();
    scripts.define_sized("x", BLOCK, |_, _, _| Ok(Value::undefined()));
    let rt = runtime(&scripts);
    let ctx = rt.create_context();
    let x = script(&ctx, "x");
    ctx.call(&Value::object(x.clone()), Value::undefined(), &[]).unwrap();

    let before = ctx.memory().allocated();
    let stats = ctx.code_cache().evict(&[]);
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.retained, 0);
    assert_eq!(stats.footprint_before, before);
    assert_eq!(stats.footprint_after, 0);
    assert_eq!(ctx.memory().allocated(), 0);
}
