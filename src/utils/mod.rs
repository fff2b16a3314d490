//! Host helpers shared by the library and the CLI front end.

pub mod ports;

pub use ports::*;
