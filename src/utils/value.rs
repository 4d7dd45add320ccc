use anyhow::Context;
use wasmtime::{Val, ValType};

/// Parses one raw textual argument into the value type a guest function
/// declares for that position.
///
/// `i64` arguments go through a real 64-bit integer parse so the full range
/// survives; routing them through `f64` would silently lose precision past
/// 2^53.
pub fn parse_val(ty: ValType, raw: &str) -> anyhow::Result<Val> {
    Ok(match ty {
        ValType::I32 => Val::I32(
            raw.parse()
                .with_context(|| format!("expected an i32, got {raw:?}"))?,
        ),
        ValType::I64 => Val::I64(
            raw.parse()
                .with_context(|| format!("expected an i64, got {raw:?}"))?,
        ),
        ValType::F32 => Val::F32(
            raw.parse::<f32>()
                .with_context(|| format!("expected an f32, got {raw:?}"))?
                .to_bits(),
        ),
        ValType::F64 => Val::F64(
            raw.parse::<f64>()
                .with_context(|| format!("expected an f64, got {raw:?}"))?
                .to_bits(),
        ),
        other => anyhow::bail!("cannot pass an argument of type {other:?} from the command line"),
    })
}

pub fn fmt_val(val: &Val) -> String {
    match val {
        Val::I32(v) => v.to_string(),
        Val::I64(v) => v.to_string(),
        Val::F32(bits) => f32::from_bits(*bits).to_string(),
        Val::F64(bits) => f64::from_bits(*bits).to_string(),
        other => format!("{other:?}"),
    }
}

pub fn fmt_vals(vals: &[Val]) -> String {
    vals.iter().map(fmt_val).collect::<Vec<_>>().join(",")
}
