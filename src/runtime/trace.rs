//! Call tracing over an assembled import set.
//!
//! Wraps every host function in the linker so each guest call logs its
//! namespace-qualified name, arguments, and result (or failure). The wrapper
//! is strictly observational: results and errors pass through unchanged, and
//! a failure is re-raised after being logged, never swallowed.

use wasmtime::{Caller, Engine, Extern, Linker, Store, Val};

use crate::runtime::base::StoreState;
use crate::utils::value::fmt_vals;

pub fn wrap_linker(
    engine: &Engine,
    linker: &Linker<StoreState>,
    store: &mut Store<StoreState>,
) -> anyhow::Result<Linker<StoreState>> {
    let mut traced = Linker::new(engine);

    let items: Vec<(String, String, Extern)> = linker
        .iter(&mut *store)
        .map(|(module, name, item)| (module.to_string(), name.to_string(), item))
        .collect();

    for (module, name, item) in items {
        match item {
            Extern::Func(func) => {
                let ty = func.ty(&*store);
                let label = format!("{module}!{name}");
                traced.func_new(
                    &module,
                    &name,
                    ty,
                    move |mut caller: Caller<'_, StoreState>,
                          params: &[Val],
                          results: &mut [Val]|
                          -> anyhow::Result<()> {
                        match func.call(&mut caller, params, results) {
                            Ok(()) => {
                                log::info!("{label} {} => {}", fmt_vals(params), fmt_vals(results));
                                Ok(())
                            }
                            Err(err) => {
                                log::info!("{label} {} => {err}", fmt_vals(params));
                                Err(err)
                            }
                        }
                    },
                )?;
            }
            other => {
                traced.define(&mut *store, &module, &name, other)?;
            }
        }
    }

    Ok(traced)
}
