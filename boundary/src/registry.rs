use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, Mutex, RwLock},
};

use log::{debug, info, warn};
use once_cell::sync::OnceCell;

use crate::{
    abi::RawEntryPoint, LibraryLoader, LoadError, ModuleLoader, NativeModule, RegistryConfig,
    ResolutionError,
};

/// Resolved entry point together with the module that exports it.
#[derive(Clone)]
pub struct EntryPoint {
    name: Arc<str>,
    module: Arc<str>,
    function: RawEntryPoint,
}

impl EntryPoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn function(&self) -> RawEntryPoint {
        self.function
    }
}

impl Debug for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryPoint")
            .field("name", &self.name)
            .field("module", &self.module)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// Never requested, or the first resolution is still in flight.
    Unresolved,
    Resolved,
    Failed,
}

#[derive(Default)]
struct SymbolSlot {
    outcome: OnceCell<Result<EntryPoint, ResolutionError>>,
}

/// Process-wide table of loaded native modules and resolved entry points.
///
/// Entry points are resolved lazily on first use. Concurrent first uses of
/// the same name perform a single lookup, and the outcome (success or
/// failure) is cached. Unless
/// [`RegistryConfig::retry_failed_after_load`] is set, a failed name stays
/// failed even if a later loaded module exports it.
pub struct Registry {
    config: RegistryConfig,
    loaders: Vec<Box<dyn ModuleLoader>>,
    modules: RwLock<Vec<Arc<dyn NativeModule>>>,
    load_lock: Mutex<()>,
    symbols: Mutex<HashMap<String, Arc<SymbolSlot>>>,
}

impl Registry {
    /// Registry that loads shared libraries from the configured search paths.
    pub fn new(config: RegistryConfig) -> Self {
        let loader = LibraryLoader::new(config.search_paths.clone());
        Self::with_loaders(config, vec![Box::new(loader)])
    }

    /// Registry with custom loaders, asked in order.
    pub fn with_loaders(config: RegistryConfig, loaders: Vec<Box<dyn ModuleLoader>>) -> Self {
        Self {
            config,
            loaders,
            modules: RwLock::new(Vec::new()),
            load_lock: Mutex::new(()),
            symbols: Mutex::new(HashMap::new()),
        }
    }

    /// Loads a module. Loading an already loaded identifier is a no-op.
    pub fn load(&self, identifier: &str) -> Result<(), LoadError> {
        let _guard = self.load_lock.lock().unwrap();
        if self.is_loaded(identifier) {
            debug!("Native module '{identifier}' already loaded");
            return Ok(());
        }
        let mut searched = Vec::new();
        for loader in &self.loaders {
            match loader.load(identifier) {
                Ok(module) => {
                    self.modules.write().unwrap().push(module);
                    info!("Loaded native module '{identifier}'");
                    if self.config.retry_failed_after_load {
                        self.forget_failed_resolutions();
                    }
                    return Ok(());
                }
                Err(LoadError::NotFound {
                    searched: tried, ..
                }) => searched.extend(tried),
                Err(err) => {
                    warn!("{err}");
                    return Err(err);
                }
            }
        }
        Err(LoadError::NotFound {
            identifier: identifier.into(),
            searched,
        })
    }

    pub fn is_loaded(&self, identifier: &str) -> bool {
        self.modules
            .read()
            .unwrap()
            .iter()
            .any(|m| m.identifier() == identifier)
    }

    /// Identifiers of loaded modules, in load order.
    pub fn loaded_modules(&self) -> Vec<String> {
        self.modules
            .read()
            .unwrap()
            .iter()
            .map(|m| m.identifier().to_owned())
            .collect()
    }

    /// Resolves an entry point by name, searching modules in load order.
    pub fn resolve(&self, name: &str) -> Result<EntryPoint, ResolutionError> {
        let slot = self
            .symbols
            .lock()
            .unwrap()
            .entry(name.to_owned())
            .or_default()
            .clone();
        slot.outcome.get_or_init(|| self.scan(name)).clone()
    }

    pub fn resolution_state(&self, name: &str) -> ResolutionState {
        let symbols = self.symbols.lock().unwrap();
        match symbols.get(name).and_then(|slot| slot.outcome.get()) {
            None => ResolutionState::Unresolved,
            Some(Ok(_)) => ResolutionState::Resolved,
            Some(Err(_)) => ResolutionState::Failed,
        }
    }

    fn scan(&self, name: &str) -> Result<EntryPoint, ResolutionError> {
        let modules = self.modules.read().unwrap();
        for module in modules.iter() {
            if let Some(function) = module.lookup(name) {
                debug!("Resolved '{name}' in module '{}'", module.identifier());
                return Ok(EntryPoint {
                    name: name.into(),
                    module: module.identifier().into(),
                    function,
                });
            }
        }
        debug!("Entry point '{name}' not found in {} module(s)", modules.len());
        Err(ResolutionError::NotFound { name: name.into() })
    }

    fn forget_failed_resolutions(&self) {
        let mut symbols = self.symbols.lock().unwrap();
        symbols.retain(|_, slot| !matches!(slot.outcome.get(), Some(Err(_))));
    }
}
