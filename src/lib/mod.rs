#[macro_use]
extern crate lazy_static;

pub mod cli;
pub mod logger;
pub mod settings;
pub mod tracker;
pub mod transport;
