//! # Common: The Cache Data Model
//!
//! Types shared by the checker, the snapshot loader and the CLI:
//! - [`Identity`]: address-based equality for shared objects.
//! - [`ReaderKey`] / [`ReaderNode`]: reader identities and the hierarchy they form.
//! - [`CacheEntry`] / [`CachedValue`]: the read-only input of an analysis.
//! - [`Insanity`] / [`InsanityType`]: the findings it produces.

pub mod entry;
pub mod identity;
pub mod insanity;

pub use entry::{
    CacheEntry, CacheEntrySource, CachedValue, CoreKey, OneLine, ReaderKey, ReaderNode,
    ShallowSizeEstimator, SizeEstimator, ValueIdentity,
};
pub use identity::Identity;
pub use insanity::{Insanity, InsanityError, InsanityType, RenderedInsanity};
