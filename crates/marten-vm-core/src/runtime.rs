//! VM runtime - the main entry point
//!
//! The runtime holds the configuration and the external collaborators
//! (parser, bytecode generator, interpreter, exception processor) and
//! creates execution contexts from them.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::code_cache::DEFAULT_CODE_CACHE_LIMIT;
use crate::compiler::{CodeGenerator, FunctionParser};
use crate::context::{Collaborators, VmContext};
use crate::error::{VmError, VmResult};
use crate::exception::{ExceptionProcessor, UnwindingProcessor};
use crate::interpreter::Interpreter;

/// Maximum call stack depth
const MAX_STACK_DEPTH: usize = 1000;

/// Native stack a call chain may consume; fits a 2 MiB thread stack
const MAX_STACK_SIZE: usize = 1024 * 1024;

/// Slots scrubbed after an activation that asks for stack hygiene
const CLEAR_STACK_SLOTS: usize = 64;

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum call depth before a stack overflow is raised
    pub max_stack_depth: usize,
    /// Native stack bytes a call chain may use before a stack overflow is
    /// raised; must stay below the stack size of the running thread
    pub max_stack_size: usize,
    /// Compiled code footprint that triggers eviction, in bytes
    pub code_cache_limit: usize,
    /// Maximum accounted heap size in bytes
    pub max_heap_size: usize,
    /// Register file slots scrubbed after activations that request it
    pub clear_stack_slots: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_stack_depth: MAX_STACK_DEPTH,
            max_stack_size: MAX_STACK_SIZE,
            code_cache_limit: DEFAULT_CODE_CACHE_LIMIT,
            max_heap_size: 512 * 1024 * 1024, // 512 MB
            clear_stack_slots: CLEAR_STACK_SLOTS,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON; missing fields keep their defaults
    pub fn from_json(json: &str) -> VmResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The VM runtime
///
/// `Send + Sync`; contexts created from it share its collaborators.
pub struct VmRuntime {
    config: RuntimeConfig,
    collaborators: Collaborators,
}

impl VmRuntime {
    /// Start building a runtime
    pub fn builder() -> VmRuntimeBuilder {
        VmRuntimeBuilder::default()
    }

    /// Get runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Create a new execution context with its own global object, code
    /// cache and memory accounting
    pub fn create_context(&self) -> VmContext {
        VmContext::new(self.config.clone(), self.collaborators.clone())
    }
}

/// Builder for [`VmRuntime`]
#[derive(Default)]
pub struct VmRuntimeBuilder {
    config: RuntimeConfig,
    parser: Option<Arc<dyn FunctionParser>>,
    code_generator: Option<Arc<dyn CodeGenerator>>,
    interpreter: Option<Arc<dyn Interpreter>>,
    exception_processor: Option<Arc<dyn ExceptionProcessor>>,
}

impl VmRuntimeBuilder {
    /// Set the configuration
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the parser used for lazy compilation
    pub fn parser(mut self, parser: impl FunctionParser + 'static) -> Self {
        self.parser = Some(Arc::new(parser));
        self
    }

    /// Set the bytecode generator used for lazy compilation
    pub fn code_generator(mut self, generator: impl CodeGenerator + 'static) -> Self {
        self.code_generator = Some(Arc::new(generator));
        self
    }

    /// Set the interpreter
    pub fn interpreter(mut self, interpreter: impl Interpreter + 'static) -> Self {
        self.interpreter = Some(Arc::new(interpreter));
        self
    }

    /// Replace the default [`UnwindingProcessor`]
    pub fn exception_processor(mut self, processor: impl ExceptionProcessor + 'static) -> Self {
        self.exception_processor = Some(Arc::new(processor));
        self
    }

    /// Build the runtime; parser, generator and interpreter are required
    pub fn build(self) -> VmResult<VmRuntime> {
        let parser = self
            .parser
            .ok_or_else(|| VmError::internal("runtime has no parser"))?;
        let code_generator = self
            .code_generator
            .ok_or_else(|| VmError::internal("runtime has no code generator"))?;
        let interpreter = self
            .interpreter
            .ok_or_else(|| VmError::internal("runtime has no interpreter"))?;
        let exception_processor = self
            .exception_processor
            .unwrap_or_else(|| Arc::new(UnwindingProcessor));

        Ok(VmRuntime {
            config: self.config,
            collaborators: Collaborators {
                parser,
                code_generator,
                interpreter,
                exception_processor,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_stack_depth, 1000);
        assert_eq!(config.max_stack_size, 1024 * 1024);
        assert_eq!(config.code_cache_limit, 2 * 1024 * 1024);
        assert_eq!(config.max_heap_size, 512 * 1024 * 1024);
        assert_eq!(config.clear_stack_slots, 64);
    }

    #[test]
    fn test_config_from_partial_json() {
        let config = RuntimeConfig::from_json(r#"{"max_stack_depth": 50}"#).unwrap();
        assert_eq!(config.max_stack_depth, 50);
        assert_eq!(config.code_cache_limit, DEFAULT_CODE_CACHE_LIMIT);
    }

    #[test]
    fn test_config_from_invalid_json() {
        let err = RuntimeConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, VmError::InvalidConfig(_)));
    }

    #[test]
    fn test_builder_requires_collaborators() {
        assert!(VmRuntime::builder().build().is_err());
    }

    #[test]
    fn test_runtime_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VmRuntime>();
    }
}
