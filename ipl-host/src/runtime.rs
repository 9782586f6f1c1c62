//! Runtime management using Wasmtime.
//!
//! Provides engine configuration, module compilation, and caching so one
//! engine can serve many bridge instances.

use dashmap::DashMap;
use ipl_core::{IplError, Result};
use std::sync::Arc;
use wasmtime::{Config, Engine, Module};

/// Configuration for the bridge runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Whether to cache compiled modules by content hash.
    pub cache_modules: bool,
    /// Enable debug info in compiled modules.
    pub debug_info: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            cache_modules: true,
            debug_info: false,
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration for testing: no caching, debuggable modules.
    pub fn testing() -> Self {
        Self {
            cache_modules: false,
            debug_info: true,
        }
    }

    /// Enable or disable module caching.
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_modules = enabled;
        self
    }

    /// Enable or disable debug info.
    pub fn with_debug_info(mut self, enabled: bool) -> Self {
        self.debug_info = enabled;
        self
    }

    /// Create a Wasmtime Config from this configuration.
    fn to_wasmtime_config(&self) -> Config {
        let mut config = Config::new();
        config.debug_info(self.debug_info);
        config.strategy(wasmtime::Strategy::Cranelift);
        config
    }
}

/// A compiled guest module ready for instantiation.
#[derive(Debug)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    module: Module,
    /// Hash of the original module bytes (the cache key).
    hash: u64,
}

impl CompiledModule {
    /// Get the underlying Wasmtime module.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Get the content hash of this module.
    pub fn hash(&self) -> u64 {
        self.hash
    }
}

/// Runtime managing the Wasmtime engine and compiled modules.
pub struct Runtime {
    /// The Wasmtime engine (thread-safe, can be shared).
    engine: Engine,
    /// Configuration for this runtime.
    config: RuntimeConfig,
    /// Cache of compiled modules by content hash.
    module_cache: DashMap<u64, Arc<CompiledModule>>,
}

impl Runtime {
    /// Create a new runtime with the given configuration.
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let engine =
            Engine::new(&config.to_wasmtime_config()).map_err(|e| IplError::ModuleLoad {
                module: "engine".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            engine,
            config,
            module_cache: DashMap::new(),
        })
    }

    /// Create a new runtime with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(RuntimeConfig::default())
    }

    /// Get the Wasmtime engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Get the runtime configuration.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Compile guest module bytes.
    ///
    /// If caching is enabled and the same bytes were compiled before, the
    /// cached module is returned.
    pub fn compile(&self, name: &str, bytes: &[u8]) -> Result<Arc<CompiledModule>> {
        let hash = hash_bytes(bytes);

        if self.config.cache_modules {
            if let Some(cached) = self.module_cache.get(&hash) {
                tracing::debug!(module = name, hash, "module cache hit");
                return Ok(Arc::clone(&cached));
            }
        }

        let module = Module::new(&self.engine, bytes).map_err(|e| IplError::ModuleLoad {
            module: name.to_string(),
            cause: e.to_string(),
        })?;

        let compiled = Arc::new(CompiledModule { module, hash });

        if self.config.cache_modules {
            self.module_cache.insert(hash, Arc::clone(&compiled));
        }

        Ok(compiled)
    }

    /// Compile a guest module from a file.
    pub fn compile_file(&self, path: &std::path::Path) -> Result<Arc<CompiledModule>> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown");

        let bytes = std::fs::read(path).map_err(|e| IplError::Io {
            path: path.to_path_buf(),
            cause: e.to_string(),
        })?;

        self.compile(name, &bytes)
    }

    /// Validate module bytes without instantiating.
    pub fn validate(&self, bytes: &[u8]) -> Result<()> {
        self.engine
            .precompile_module(bytes)
            .map_err(|e| IplError::ModuleLoad {
                module: "validation".to_string(),
                cause: e.to_string(),
            })?;
        Ok(())
    }

    /// Clear the module cache.
    pub fn clear_cache(&self) {
        self.module_cache.clear();
    }

    /// Get the number of cached modules.
    pub fn cache_size(&self) -> usize {
        self.module_cache.len()
    }
}

/// Compute a hash of bytes (for cache keying, not cryptographic).
fn hash_bytes(bytes: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};

    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}
