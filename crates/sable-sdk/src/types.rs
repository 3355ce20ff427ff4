//! Marker types for the marshaling layer.

pub use sable_engine::Kind;

/// The nil value, as a pushable/readable sentinel.
///
/// Reading `Nil` from a slot succeeds only when the slot actually holds
/// nil, which makes `Option`-free "is it nil?" probes possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Nil;

/// A byte-exact VM string.
///
/// `String` round-trips cleanly for UTF-8 content (embedded NULs
/// included); `Bytes` covers strings that are not valid UTF-8.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bytes(pub Vec<u8>);

/// An opaque host pointer carried through the VM untouched.
///
/// Light userdata has no metatable and no ownership semantics; the host
/// remains responsible for whatever the pointer addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightUserdata(pub *mut ());
