pub mod runtime;
pub mod utils;
