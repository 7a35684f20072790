use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use libloading::Library;
use log::debug;

use crate::{
    abi::{RawEntryPoint, RawModuleInit, ABI_VERSION, MODULE_INIT_SYMBOL},
    LoadError,
};

/// Unit of native code exporting named entry points.
pub trait NativeModule: Send + Sync {
    fn identifier(&self) -> &str;

    fn lookup(&self, name: &str) -> Option<RawEntryPoint>;
}

/// Turns a module identifier into a loaded module.
///
/// Loaders return [`LoadError::NotFound`] when they do not know the
/// identifier, so that the registry can ask the next one.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, identifier: &str) -> Result<Arc<dyn NativeModule>, LoadError>;
}

/// Module linked into the host process, with an explicit entry point table.
pub struct StaticModule {
    identifier: String,
    entries: HashMap<String, RawEntryPoint>,
}

impl StaticModule {
    pub fn new(identifier: &str) -> Self {
        Self {
            identifier: identifier.into(),
            entries: HashMap::new(),
        }
    }

    pub fn with_entry(mut self, name: &str, entry: RawEntryPoint) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }
}

impl NativeModule for StaticModule {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn lookup(&self, name: &str) -> Option<RawEntryPoint> {
        self.entries.get(name).copied()
    }
}

#[derive(Default)]
pub struct StaticLoader {
    modules: HashMap<String, Arc<StaticModule>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: StaticModule) -> Self {
        self.modules
            .insert(module.identifier.clone(), Arc::new(module));
        self
    }
}

impl ModuleLoader for StaticLoader {
    fn load(&self, identifier: &str) -> Result<Arc<dyn NativeModule>, LoadError> {
        match self.modules.get(identifier) {
            Some(module) => Ok(module.clone() as Arc<dyn NativeModule>),
            None => Err(LoadError::NotFound {
                identifier: identifier.into(),
                searched: vec![format!("in-process module '{identifier}'")],
            }),
        }
    }
}

/// Shared library opened at runtime.
pub struct DynamicModule {
    identifier: String,
    library: Library,
}

impl NativeModule for DynamicModule {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn lookup(&self, name: &str) -> Option<RawEntryPoint> {
        // Exported symbols are trusted to have the entry point signature.
        let symbol = unsafe { self.library.get::<RawEntryPoint>(name.as_bytes()) }.ok()?;
        Some(*symbol)
    }
}

/// Opens shared libraries. An identifier is either a path to a library file,
/// or a bare name that is mapped to the platform file name (`libNAME.so`,
/// `libNAME.dylib`, `NAME.dll`) and looked up in the search paths.
pub struct LibraryLoader {
    search_paths: Vec<PathBuf>,
}

impl LibraryLoader {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self { search_paths }
    }

    fn is_path(identifier: &str) -> bool {
        let path = Path::new(identifier);
        path.components().count() > 1 || path.extension().is_some()
    }

    fn candidates(&self, identifier: &str) -> Vec<PathBuf> {
        if Self::is_path(identifier) {
            return vec![PathBuf::from(identifier)];
        }
        let file_name = libloading::library_filename(identifier);
        self.search_paths
            .iter()
            .map(|dir| dir.join(&file_name))
            .collect()
    }

    fn open(&self, identifier: &str, path: PathBuf) -> Result<Arc<dyn NativeModule>, LoadError> {
        debug!("Opening native module '{identifier}' from {}", path.display());
        let library = unsafe { Library::new(&path) }.map_err(|e| LoadError::InitFailed {
            identifier: identifier.into(),
            reason: e.to_string(),
        })?;
        Self::initialize(identifier, library)
    }

    fn initialize(identifier: &str, library: Library) -> Result<Arc<dyn NativeModule>, LoadError> {
        let init = unsafe { library.get::<RawModuleInit>(MODULE_INIT_SYMBOL.as_bytes()) }
            .ok()
            .map(|symbol| *symbol);
        if let Some(init) = init {
            let version = unsafe { init(ABI_VERSION) };
            if version != ABI_VERSION {
                return Err(LoadError::InitFailed {
                    identifier: identifier.into(),
                    reason: format!(
                        "module implements ABI version {version}, host requires {ABI_VERSION}"
                    ),
                });
            }
        }
        Ok(Arc::new(DynamicModule {
            identifier: identifier.into(),
            library,
        }))
    }
}

impl ModuleLoader for LibraryLoader {
    fn load(&self, identifier: &str) -> Result<Arc<dyn NativeModule>, LoadError> {
        if self.search_paths.is_empty() && !Self::is_path(identifier) {
            // Leave the lookup to the platform loader.
            let file_name = libloading::library_filename(identifier);
            return match unsafe { Library::new(&file_name) } {
                Ok(library) => Self::initialize(identifier, library),
                Err(e) => Err(LoadError::NotFound {
                    identifier: identifier.into(),
                    searched: vec![format!(
                        "{} on the system library path ({e})",
                        Path::new(&file_name).display()
                    )],
                }),
            };
        }
        let candidates = self.candidates(identifier);
        match candidates.iter().find(|path| path.is_file()) {
            Some(path) => self.open(identifier, path.clone()),
            None => Err(LoadError::NotFound {
                identifier: identifier.into(),
                searched: candidates
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, path::PathBuf};

    use super::{LibraryLoader, ModuleLoader, NativeModule, StaticLoader, StaticModule};
    use crate::{
        abi::{RawHost, RawValue},
        LoadError,
    };

    unsafe extern "C" fn noop(
        _: *const RawHost,
        _: *const RawValue,
        _: usize,
        _: *mut RawValue,
    ) -> i32 {
        0
    }

    #[test]
    fn test_static_loader() {
        let loader = StaticLoader::new().with_module(StaticModule::new("a").with_entry("noop", noop));
        let module = loader.load("a").unwrap();
        assert_eq!(module.identifier(), "a");
        assert!(module.lookup("noop").is_some());
        assert!(module.lookup("other").is_none());
        assert!(matches!(loader.load("b"), Err(LoadError::NotFound { .. })));
    }

    #[test]
    fn test_library_candidates() {
        let loader = LibraryLoader::new(vec![PathBuf::from("/first"), PathBuf::from("/second")]);
        let candidates = loader.candidates("demo");
        assert_eq!(candidates.len(), 2);
        assert!(candidates[0].starts_with("/first"));
        assert!(candidates[0]
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains("demo"));
        assert_eq!(
            loader.candidates("./libdemo.so"),
            vec![PathBuf::from("./libdemo.so")]
        );
    }

    #[test]
    fn test_missing_library_lists_searched_paths() {
        let dir = std::env::temp_dir().join("crosscall-missing-library-test");
        let loader = LibraryLoader::new(vec![dir.clone()]);
        match loader.load("definitely_not_here") {
            Err(LoadError::NotFound { searched, .. }) => {
                assert_eq!(searched.len(), 1);
                assert!(searched[0].starts_with(&dir.display().to_string()));
            }
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn test_unloadable_library_fails_to_initialize() {
        let dir = std::env::temp_dir().join(format!("crosscall-bad-library-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(libloading::library_filename("garbage")), b"not a library").unwrap();
        let loader = LibraryLoader::new(vec![dir.clone()]);
        let result = loader.load("garbage");
        fs::remove_dir_all(&dir).ok();
        match result {
            Err(LoadError::InitFailed { identifier, reason }) => {
                assert_eq!(identifier, "garbage");
                assert!(!reason.is_empty());
            }
            Err(err) => panic!("expected InitFailed, got {err}"),
            Ok(_) => panic!("garbage file loaded as a library"),
        }
    }
}
