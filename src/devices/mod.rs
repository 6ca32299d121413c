//! Device emulation modules

pub mod chardev;
pub mod interrupt;
pub mod linflex;
