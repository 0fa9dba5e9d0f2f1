//! Local control channel.
//!
//! Provides a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! endpoint that accepts a single plain-text `STOP` command from
//! `netwatch-ctl` or any other local client.

pub mod command;
pub mod server;
