//! # Virtual Device Simulator Library
//!
//! This crate implements a configurable simulator for laboratory and
//! industrial instruments that speak line-oriented ASCII command protocols.
//! Test harnesses and control software connect over TCP and exchange
//! requests, set-commands, responses and acknowledgements exactly as they
//! would with a real device, while an HTTP surface administers the
//! simulated state at runtime.
//!
//! ## Crate Structure
//!
//! - **`format`**: The printf-style specifier engine shared by pattern
//!   matching and reply rendering.
//! - **`lexer`**: Tokenises command pattern strings into `Item` sequences.
//! - **`parser`**: Matches framed inbound tokens against the compiled
//!   command patterns and extracts typed set values.
//! - **`parameter`**: Typed parameter cells with optional allowed-value
//!   sets, string coercion and concurrent read/write discipline.
//! - **`device`**: The stream device: framing, dispatch, reply delays, the
//!   mismatch payload and the asynchronous trigger channel, plus the
//!   administrative operations.
//! - **`vdfile`**: Loads and validates the TOML configuration a device is
//!   built from.
//! - **`server`**: TCP listener with one task per client connection.
//! - **`api`**: hyper-based HTTP administration endpoint.
//! - **`error`**: The `SimError` taxonomy shared across the crate.

pub mod api;
pub mod device;
pub mod error;
pub mod format;
pub mod lexer;
pub mod parameter;
pub mod parser;
pub mod server;
pub mod vdfile;
