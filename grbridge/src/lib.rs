pub mod bridge;
pub mod completion;
pub mod error;
pub mod gate;
pub mod registry;
pub mod sandbox;
pub mod transport;

#[macro_use]
extern crate log;
