//! Typed, multi-indexed record store (C6/C7) built on the raw transaction
//! and cursor API.

mod container;
mod index;

pub use container::{IndexIter, PrefixIter, PrimaryIter, TypedContainer};
pub use index::{IndexDescriptor, NullIndex};
