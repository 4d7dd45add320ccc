//! Gas accounting for metered guests.
//!
//! Metered modules import a single host function, `metering.usegas`, that
//! charges the cost of the code about to run. The budget is tracked in
//! scaled units (gas × 10000) so fractional costs keep four digits of
//! precision; the operator-facing numbers are always divided back down.

use thiserror::Error;
use wasmtime::{ExternType, FuncType, Linker, Module, Val, ValType};

use crate::runtime::base::StoreState;

pub const METERING_NS: &str = "metering";
pub const USEGAS: &str = "usegas";

/// Internal units per gas unit.
pub const GAS_SCALE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("run out of gas (gas used: {used:.4})")]
pub struct GasExhausted {
    /// Gas consumed up to and including the charge that exhausted the budget.
    pub used: f64,
}

/// A consumable execution budget, fixed at startup.
///
/// Only [`GasMeter::charge`] may mutate it, and execution is single-threaded,
/// so sequential call order is the entire consistency story.
#[derive(Debug, Clone, Copy)]
pub struct GasMeter {
    remaining: f64,
    limit: f64,
}

impl GasMeter {
    pub fn new(gas_limit: f64) -> Self {
        let scaled = gas_limit * GAS_SCALE;
        Self {
            remaining: scaled,
            limit: scaled,
        }
    }

    /// Charges `cost` gas units against the budget.
    ///
    /// Exhaustion is signaled on exactly the first charge that drives the
    /// budget negative; that charge is applied once and no further decrement
    /// happens within the same call.
    pub fn charge(&mut self, cost: f64) -> Result<(), GasExhausted> {
        self.remaining -= cost * GAS_SCALE;
        if self.remaining < 0.0 {
            Err(GasExhausted { used: self.used() })
        } else {
            Ok(())
        }
    }

    /// Gas consumed so far, in operator-facing units. Reporting only.
    pub fn used(&self) -> f64 {
        (self.limit - self.remaining) / GAS_SCALE
    }
}

/// Finds the guest's declared `metering.usegas` import, if any, and checks
/// that its shape is one numeric cost parameter and no results.
pub fn metering_import(module: &Module) -> anyhow::Result<Option<FuncType>> {
    for import in module.imports() {
        if import.module() != METERING_NS || import.name() != USEGAS {
            continue;
        }
        let ExternType::Func(ty) = import.ty() else {
            anyhow::bail!("{METERING_NS}.{USEGAS} must be imported as a function");
        };
        let cost_ty = ty.params().next();
        let numeric = matches!(
            cost_ty,
            Some(ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64)
        );
        if ty.params().len() != 1 || ty.results().len() != 0 || !numeric {
            anyhow::bail!("unsupported {METERING_NS}.{USEGAS} signature");
        }
        return Ok(Some(ty));
    }
    Ok(None)
}

/// Defines the accounting import with the exact value type the guest
/// declared; metering rewriters disagree on whether costs are i32, i64, or
/// floats, and the import must match the guest byte-for-byte.
pub fn add_to_linker(linker: &mut Linker<StoreState>, ty: FuncType) -> anyhow::Result<()> {
    linker.func_new(METERING_NS, USEGAS, ty, |mut caller, params, _results| {
        let cost = match params {
            [Val::I32(v)] => *v as f64,
            [Val::I64(v)] => *v as f64,
            [Val::F32(bits)] => f32::from_bits(*bits) as f64,
            [Val::F64(bits)] => f64::from_bits(*bits),
            _ => anyhow::bail!("{METERING_NS}.{USEGAS}: non-numeric cost"),
        };
        caller.data_mut().gas.charge(cost)?;
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhaustion_triggers_on_the_first_overdraw() {
        let mut gas = GasMeter::new(1.0);

        assert_eq!(gas.charge(0.5), Ok(()));
        assert_eq!(gas.charge(0.5), Ok(()));
        assert_eq!(gas.used(), 1.0);

        // The budget is exactly spent; the next charge overdraws.
        let err = gas.charge(0.25).unwrap_err();
        assert_eq!(err.used, 1.25);
    }

    #[test]
    fn overdraw_is_bounded_by_the_final_charge() {
        let mut gas = GasMeter::new(2.0);
        let err = gas.charge(7.0).unwrap_err();
        // A single decrement happened; remaining dropped by exactly the
        // offending cost, nothing more.
        assert_eq!(err.used, 7.0);
        assert_eq!(gas.used(), 7.0);
    }

    #[test]
    fn fractional_costs_keep_sub_unit_precision() {
        let mut gas = GasMeter::new(1.0);
        gas.charge(0.0001).unwrap();
        assert_eq!(gas.used(), 0.0001);
    }

    #[test]
    fn untouched_budget_reports_zero_used() {
        assert_eq!(GasMeter::new(100_000.0).used(), 0.0);
    }
}
