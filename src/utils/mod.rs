pub mod memory;
pub mod value;
