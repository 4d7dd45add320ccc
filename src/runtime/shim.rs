//! Assembles the import set a guest will be instantiated against.
//!
//! Which namespaces the guest gets is driven entirely by its declared
//! imports: the accounting import is installed when requested, and exactly
//! one system-interface generation is provided — the modern one directly, or
//! the legacy one as a translation layer over it. Import namespaces outside
//! the recognized set are rejected before instantiation is ever attempted.

use thiserror::Error;
use wasmtime::{Engine, Linker, Module, Store};

use crate::runtime::base::StoreState;
use crate::runtime::compat::{self, LEGACY_NS, MODERN_NS};
use crate::runtime::gas::{self, METERING_NS};
use crate::runtime::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasiGeneration {
    Modern,
    Legacy,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported WASI version: {0}")]
pub struct UnsupportedWasiVersion(pub String);

/// Classifies the guest's imports into a requested system-interface
/// generation. Any namespace other than the two known generations and the
/// accounting namespace is fatal.
pub fn detect_wasi_generation(
    module: &Module,
) -> Result<Option<WasiGeneration>, UnsupportedWasiVersion> {
    let mut generation = None;
    for import in module.imports() {
        match import.module() {
            METERING_NS => {}
            MODERN_NS => {
                generation.get_or_insert(WasiGeneration::Modern);
            }
            LEGACY_NS => generation = Some(WasiGeneration::Legacy),
            other => return Err(UnsupportedWasiVersion(other.to_string())),
        }
    }
    Ok(generation)
}

/// Builds the one linker this guest will be instantiated with.
pub fn assemble(
    engine: &Engine,
    store: &mut Store<StoreState>,
    module: &Module,
    traced: bool,
) -> anyhow::Result<(Linker<StoreState>, Option<WasiGeneration>)> {
    let generation = detect_wasi_generation(module)?;
    let mut linker = Linker::new(engine);

    if let Some(usegas_ty) = gas::metering_import(module)? {
        gas::add_to_linker(&mut linker, usegas_ty)?;
    }

    if generation.is_some() {
        wasmtime_wasi::add_to_linker(&mut linker, |state: &mut StoreState| &mut state.wasi)?;
    }
    if generation == Some(WasiGeneration::Legacy) {
        compat::add_to_linker(&mut linker, store)?;
    }

    let linker = if traced {
        trace::wrap_linker(engine, &linker, store)?
    } else {
        linker
    };

    Ok((linker, generation))
}
