//! Command implementations for the CLI.

mod config;
mod decode;
mod gatt;
mod poll;

pub use config::cmd_config;
pub use decode::cmd_decode;
pub use gatt::cmd_gatt;
pub use poll::cmd_poll;
