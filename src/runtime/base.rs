use crate::runtime::gas::GasMeter;

/// Per-execution host state attached to the wasmtime store.
///
/// Lives exactly as long as one guest execution; nothing in here survives the
/// process.
pub struct StoreState {
    pub wasi: wasmtime_wasi::WasiCtx,
    pub gas: GasMeter,
}

impl StoreState {
    pub fn new(wasi: wasmtime_wasi::WasiCtx, gas: GasMeter) -> Self {
        Self { wasi, gas }
    }
}
