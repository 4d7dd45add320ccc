pub mod base;
pub mod compat;
pub mod filestat;
pub mod gas;
pub mod invoke;
pub mod shim;
pub mod trace;
