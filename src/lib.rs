//! A safe wrapper around [libmdbx](https://libmdbx.dqdkfa.ru/), plus a typed,
//! multi-indexed record store built on top of it.
//!
//! The base layer ([`Environment`], [`Transaction`], [`Cursor`]) tracks the
//! engine's nesting and thread-affinity rules at the type level so that
//! misuse fails fast with a typed [`Error`] rather than corrupting the
//! store or segfaulting. The [`typed`] module adds a primary-plus-secondary-
//! index container on top, keeping each index consistent with the primary
//! table across `put`/`modify`/`del`.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![allow(clippy::borrow_as_ptr)]

pub extern crate mdbx_sys as ffi;

mod codec;
pub use codec::{Codec, SerdeBincode};

mod error;
pub use error::{Error, Result, StoreError};

mod flags;
pub use flags::{DatabaseFlags, EnvironmentFlagSet, EnvironmentFlags, Mode, SyncMode, WriteFlags};

mod env;
pub use env::{Environment, EnvironmentBuilder, Geometry, Info, InfoGeometry, PageSize, Stat};

mod registry;

mod value;
pub use value::{Encode, Value};

mod tx;
pub use tx::{Cursor, Database, Ro, Rw, Transaction, TransactionKind, WriteMarker};

pub mod typed;
