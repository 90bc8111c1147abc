//! # Dynamic config loading
//!
//! Dynamic topology scripts become, in a compiled and statically-typed
//! world, a shared library: the CLI's optional `config` argument names a
//! `cdylib` exposing a single `extern "C" fn build(&mut Topology)` symbol
//! that wires up resources, channels, and links, loaded at runtime with
//! `libloading`.

use std::path::Path;

use libloading::{Library, Symbol};

use crate::error::{Result, SimError};
use crate::topology::Topology;

type BuildFn = unsafe extern "C" fn(&mut Topology);

/// Load `path` as a shared library, call its `build` symbol against a
/// fresh [`Topology`], and return the populated topology. The library is
/// leaked deliberately: nothing in `Topology` borrows from it, but the
/// `fn` pointer called above must stay mapped for the life of the process,
/// and this is a short-lived CLI, not a long-running host that loads and
/// unloads configs repeatedly.
pub fn load_topology(path: &Path) -> Result<Topology> {
    if !path.exists() {
        return Err(SimError::ConfigLoadFailed(
            path.display().to_string(),
            "file not found".to_string(),
        ));
    }
    let lib = unsafe {
        Library::new(path).map_err(|e| SimError::ConfigLoadFailed(path.display().to_string(), e.to_string()))?
    };
    let build: Symbol<BuildFn> = unsafe {
        lib.get(b"build").map_err(|_| SimError::ConfigSymbolMissing(path.display().to_string()))?
    };

    let mut topology = Topology::new();
    unsafe { build(&mut topology) };
    std::mem::forget(lib);
    Ok(topology)
}
