#![forbid(unsafe_code)]

//! `netwatch` keeps a single target executable running and stops
//! supervising it when a `STOP` command arrives on a local control channel.

pub mod config;
pub mod errors;
pub mod ipc;
pub mod stop_flag;
pub mod supervisor;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
pub use stop_flag::StopFlag;
