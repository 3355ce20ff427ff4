//! Sable engine: a small embeddable scripting runtime.
//!
//! The engine provides a Lua-like language (lexer, parser, tree-walking
//! interpreter) behind a C-API-shaped surface: an evaluation stack with
//! positive/negative indexing, protected calls, a registry for host-held
//! references, named metatables, and userdata cells for host aggregates.
//! The ergonomic embedding layer lives in the `sable-sdk` crate; this crate
//! is the raw substrate it drives.

#![warn(missing_docs)]

pub mod error;
pub mod parser;
pub mod vm;

pub use error::{Error, Result};
pub use vm::table::Table;
pub use vm::value::{Kind, NativeCallback, NativeFn, Userdata, Value};
pub use vm::{Lib, RegistryKey, Vm};
