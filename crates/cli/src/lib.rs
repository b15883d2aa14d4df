//! `sppctl`: scan for, serve, and connect to Serial Port Profile services.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
