//! Scripted collaborators for integration tests
//!
//! Function bodies are Rust closures registered by function name. The
//! parser passes the name through as its syntax tree, the generator emits
//! a filler code block of the requested size, and the interpreter runs the
//! closure registered for the function on top of the frame chain.

#![allow(dead_code)]

use dashmap::DashMap;
use marten_vm_bytecode::{ByteCodeBlock, Constant, FunctionInfo, SourceMap};
use marten_vm_core::code_block::CompiledCode;
use marten_vm_core::compiler::{CodeGenerator, FunctionParser, SyntaxTree};
use marten_vm_core::frame::{CallFrame, RegisterFile};
use marten_vm_core::interpreter::Interpreter;
use marten_vm_core::runtime::{RuntimeConfig, VmRuntime};
use marten_vm_core::{VmError, VmResult, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Closure standing in for a compiled function body
pub type Body = Arc<dyn Fn(&CallFrame<'_>, &CompiledCode, &mut RegisterFile) -> VmResult<Value> + Send + Sync>;

/// Default size of generated code blocks
pub const CODE_SIZE: usize = 64;

/// Literal every generated block carries
pub const LITERAL: f64 = 7.0;

#[derive(Clone)]
struct Script {
    body: Body,
    code_size: usize,
    clear_stack: bool,
}

#[derive(Default)]
struct Registry {
    scripts: DashMap<String, Script>,
    parses: AtomicUsize,
    budgets: Mutex<Vec<usize>>,
}

/// Parser, generator and interpreter in one, driven by registered closures
#[derive(Clone, Default)]
pub struct Scripts {
    registry: Arc<Registry>,
}

impl Scripts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the body of the function named `name`
    pub fn define<F>(&self, name: &str, body: F)
    where
        F: Fn(&CallFrame<'_>, &CompiledCode, &mut RegisterFile) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.define_sized(name, CODE_SIZE, body);
    }

    /// Register a body whose generated code is `code_size` bytes long
    pub fn define_sized<F>(&self, name: &str, code_size: usize, body: F)
    where
        F: Fn(&CallFrame<'_>, &CompiledCode, &mut RegisterFile) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.insert(name, code_size, false, Arc::new(body));
    }

    /// Register a body whose code asks for stack scrubbing
    pub fn define_clearing<F>(&self, name: &str, body: F)
    where
        F: Fn(&CallFrame<'_>, &CompiledCode, &mut RegisterFile) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.insert(name, CODE_SIZE, true, Arc::new(body));
    }

    fn insert(&self, name: &str, code_size: usize, clear_stack: bool, body: Body) {
        self.registry.scripts.insert(
            name.to_string(),
            Script {
                body,
                code_size,
                clear_stack,
            },
        );
    }

    /// Number of times any function was parsed
    pub fn parse_count(&self) -> usize {
        self.registry.parses.load(Ordering::Relaxed)
    }

    /// Stack budgets the parser was handed, in call order
    pub fn budgets(&self) -> Vec<usize> {
        self.registry.budgets.lock().clone()
    }

    fn script(&self, name: &str) -> Option<Script> {
        self.registry.scripts.get(name).map(|entry| entry.value().clone())
    }
}

impl FunctionParser for Scripts {
    fn parse_function(&self, info: &FunctionInfo, stack_budget: usize) -> VmResult<SyntaxTree> {
        self.registry.parses.fetch_add(1, Ordering::Relaxed);
        self.registry.budgets.lock().push(stack_budget);

        let name = info.name.as_deref().unwrap_or("");
        if !self.registry.scripts.contains_key(name) {
            return Err(VmError::syntax_error(format!("no body for '{}'", info.display_name())));
        }
        Ok(SyntaxTree::new(name.to_string()))
    }
}

impl CodeGenerator for Scripts {
    fn generate(&self, _info: &FunctionInfo, tree: SyntaxTree) -> VmResult<ByteCodeBlock> {
        let name = tree.downcast::<String>()?;
        let script = self
            .script(&name)
            .ok_or_else(|| VmError::internal(format!("no body for '{}'", name)))?;

        let mut source_map = SourceMap::new();
        source_map.add(0, 1, 1);
        source_map.add(4, 2, 5);
        Ok(ByteCodeBlock::builder()
            .code(vec![0u8; script.code_size])
            .literal(Constant::number(LITERAL))?
            .source_map(source_map)
            .register_count(2)
            .should_clear_stack(script.clear_stack)
            .build())
    }
}

impl Interpreter for Scripts {
    fn run(&self, frame: &CallFrame<'_>, code: &CompiledCode, registers: &mut RegisterFile) -> VmResult<Value> {
        let name = frame
            .code_block()
            .map(|block| block.name().as_str().to_string())
            .unwrap_or_default();
        let script = self
            .script(&name)
            .ok_or_else(|| VmError::internal(format!("no body for '{}'", name)))?;
        (script.body)(frame, code, registers)
    }
}

/// Runtime wired to `scripts` with the default configuration
pub fn runtime(scripts: &Scripts) -> VmRuntime {
    runtime_with(scripts, RuntimeConfig::default())
}

/// Runtime wired to `scripts`
pub fn runtime_with(scripts: &Scripts, config: RuntimeConfig) -> VmRuntime {
    init_tracing();
    VmRuntime::builder()
        .config(config)
        .parser(scripts.clone())
        .code_generator(scripts.clone())
        .interpreter(scripts.clone())
        .build()
        .expect("runtime with all collaborators")
}

/// Route `tracing` output to the test writer (RUST_LOG controls the level)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
