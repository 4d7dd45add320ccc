//! Invoking a guest export with externally supplied textual arguments.
//!
//! The export's signature comes from the compiled module's type section, so
//! coercion is decided before instantiation and independently of it. Each
//! string argument is parsed into the numeric kind its parameter position
//! declares; the call itself is dynamically dispatched through the untyped
//! `Func::call` path since signatures are only known at run time.

use thiserror::Error;
use wasmtime::{ExternType, FuncType, Instance, Module, Store, Val};

use crate::runtime::base::StoreState;
use crate::utils::value::parse_val;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvokeError {
    #[error("function not found: {0}")]
    FunctionNotFound(String),
    #[error("{func} expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        func: String,
        expected: usize,
        actual: usize,
    },
}

/// Function export names, in declaration order.
pub fn exported_funcs(module: &Module) -> Vec<String> {
    module
        .exports()
        .filter(|export| matches!(export.ty(), ExternType::Func(_)))
        .map(|export| export.name().to_string())
        .collect()
}

/// Static signature of a function export, prior to instantiation.
pub fn export_signature(module: &Module, name: &str) -> Option<FuncType> {
    module.exports().find_map(|export| match export.ty() {
        ExternType::Func(ty) if export.name() == name => Some(ty),
        _ => None,
    })
}

/// Picks the implicit invocation target: only meaningful when the guest has
/// no system-interface entry point and exports exactly one function.
pub fn auto_target(exported: &[String]) -> Option<&str> {
    match exported {
        [only] => Some(only.as_str()),
        _ => None,
    }
}

/// Calls `name` with `raw_args` coerced positionally against its declared
/// signature, returning the raw results for display.
pub fn invoke(
    store: &mut Store<StoreState>,
    instance: &Instance,
    module: &Module,
    name: &str,
    raw_args: &[String],
) -> anyhow::Result<Vec<Val>> {
    let ty = export_signature(module, name)
        .ok_or_else(|| InvokeError::FunctionNotFound(name.to_string()))?;

    // A typed engine call can neither leave parameters undefined nor accept
    // extras, so both directions of arity mismatch are hard errors.
    if raw_args.len() != ty.params().len() {
        return Err(InvokeError::ArityMismatch {
            func: name.to_string(),
            expected: ty.params().len(),
            actual: raw_args.len(),
        }
        .into());
    }

    let args = ty
        .params()
        .zip(raw_args)
        .map(|(param, raw)| parse_val(param, raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let func = instance
        .get_func(&mut *store, name)
        .ok_or_else(|| InvokeError::FunctionNotFound(name.to_string()))?;

    let mut results = vec![Val::I32(0); ty.results().len()];
    func.call(&mut *store, &args, &mut results)?;
    Ok(results)
}
