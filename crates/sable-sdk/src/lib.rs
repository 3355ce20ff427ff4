//! Ergonomic embedding layer for the Sable scripting engine.
//!
//! The engine exposes a C-API-shaped stack machine; this crate puts a
//! typed, ownership-aware surface on top of it:
//!
//! - [`stack`]: the [`ToSable`] / [`FromSable`] marshaling pair, plus the
//!   multi-value tuple companions used across call boundaries.
//! - [`reference`]: [`Ref`], a registry-pinned handle outliving stack
//!   operations.
//! - [`table`] / [`function`] / [`object`]: typed views over referenced
//!   values.
//! - [`call`]: binding host `Fn`s as script-callable functions.
//! - [`userdata`]: registering host types with constructors, methods, and
//!   metamethods.
//! - [`state`]: the [`State`] facade tying it all together.
//!
//! ```no_run
//! use sable_sdk::State;
//!
//! let state = State::new();
//! state.set("threshold", 40i64).unwrap();
//! state.script("over = threshold + 2").unwrap();
//! assert_eq!(state.get::<i64>("over").unwrap(), 42);
//! ```

#![warn(missing_docs)]

pub mod call;
pub mod error;
pub mod function;
pub mod object;
pub mod reference;
pub mod stack;
pub mod state;
pub mod table;
pub mod types;
pub mod userdata;

pub use call::{call_syntax, CallSyntax, SableFn};
pub use error::{Error, Result};
pub use function::{Callback, Function};
pub use object::Object;
pub use reference::Ref;
pub use stack::{check, check_with, pop, FromSable, FromSableMulti, ToSable, ToSableMulti};
pub use state::State;
pub use table::{Entry, Table};
pub use types::{Bytes, Kind, LightUserdata, Nil};
pub use userdata::{Ud, UserType};

pub use sable_engine::{Lib, Value, Vm};
