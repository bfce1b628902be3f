//! Module and symbol resolution backed by the platform dynamic loader

use std::sync::{Mutex, PoisonError};

use libloading::Library;
use log::debug;

use super::{ModuleHandle, ModuleLoader};
use crate::error::HostError;

/// Loads modules through `dlopen`/`LoadLibrary` via `libloading`.
///
/// Loaded modules are never unloaded: a patched module must stay mapped for the rest of the process,
/// so dropping a `SystemHost` leaves every module it loaded in place.
#[derive(Debug, Default)]
pub struct SystemHost {
    /// Modules loaded so far, indexed by [`ModuleHandle::id`]
    modules: Mutex<Vec<(String, &'static Library)>>,
}
impl SystemHost {
    /// Creates a new [`SystemHost`]
    pub fn new() -> Self {
        Self::default()
    }
    /// Looks up a module previously returned by [`ModuleLoader::load`]
    fn library(&self, module: ModuleHandle) -> Result<&'static Library, HostError> {
        let modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        modules
            .get(module.id())
            .map(|(_, library)| *library)
            .ok_or(HostError::UnknownHandle(module.id()))
    }
}

impl ModuleLoader for SystemHost {
    fn load(&self, name: &str) -> Result<ModuleHandle, HostError> {
        let mut modules = self.modules.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = modules.iter().position(|(loaded, _)| loaded == name) {
            return Ok(ModuleHandle::new(id));
        }

        // Safety: running a library's initializers is inherent to loading it; the caller picks which library
        let library = unsafe { Library::new(name)? };
        let library: &'static Library = Box::leak(Box::new(library));
        modules.push((name.to_owned(), library));

        let handle = ModuleHandle::new(modules.len() - 1);
        debug!("loaded module `{name}` as {handle:?}");
        Ok(handle)
    }

    fn resolve(&self, module: ModuleHandle, symbol: &str) -> Result<*const u8, HostError> {
        let library = self.library(module)?;
        // Safety: the symbol is only read as an address, never called or dereferenced here
        let address = unsafe { *library.get::<*const u8>(symbol.as_bytes())? };
        debug!("resolved `{symbol}` in {module:?} to {address:p}");
        Ok(address)
    }
}
