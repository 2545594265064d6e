// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Persistent hash maps for Rust.
//!
//! This crate provides [`HashMap`][hashmap::HashMap], an immutable hash
//! map with structural sharing, built as a rooted [hash array mapped
//! trie][hamt].
//!
//! # Persistence
//!
//! An update never changes an existing map: it builds a new map which
//! shares as much of its structure as possible with the old one. Only the
//! nodes on the path from the root to the updated entry are copied, so an
//! insert or remove allocates a small constant number of nodes and every
//! older version of the map remains valid and unchanged:
//!
//! ```
//! use hamtmap::HashMap;
//!
//! let before = HashMap::unit("tome", 1);
//! let after = before.update("grimoire", 2);
//!
//! assert_eq!(1, before.len());
//! assert_eq!(2, after.len());
//! assert_eq!(None, before.get(&"grimoire"));
//! ```
//!
//! For building a map up in place, the copy-on-write mutators
//! ([`insert`][hashmap::GenericHashMap::insert],
//! [`remove`][hashmap::GenericHashMap::remove],
//! [`pop`][hashmap::GenericHashMap::pop]) skip the handle copy and only
//! clone nodes which are actually shared with other maps, so a map built
//! by repeated `insert` calls never copies anything.
//!
//! # Structure
//!
//! The trie starts at a fixed seven slot root indexed by a reduction of
//! the key's 64-bit hash. Each level below it consumes six more hash
//! bits, giving bitmap compressed nodes with up to 63 children; after ten
//! levels the hash is exhausted and any keys still colliding share a
//! linked list. Lookups, inserts and removes are
//! O(log<sub>63</sub> n), which is as good as constant time for any map
//! that fits in memory.
//!
//! # Thread safety
//!
//! Because nodes are immutable once shared, any number of threads can
//! read from and derive new maps off the same map without coordination.
//! The pointer type is pluggable through
//! [`SharedPointerKind`][shared_ptr::SharedPointerKind]: the default is
//! atomically reference counted (`Send + Sync` when the keys and values
//! are), and single threaded code can opt into plain `Rc` semantics via
//! [`RcK`][shared_ptr::RcK].
//!
//! [hamt]: https://en.wikipedia.org/wiki/Hash_array_mapped_trie

#![deny(unsafe_code)]
#![warn(missing_docs)]

#[macro_use]
mod util;

mod config;
mod nodes;

pub mod shared_ptr;

mod hash;

pub use crate::hash::map as hashmap;

pub use crate::hashmap::{GenericHashMap, HashMap};

#[cfg(any(test, feature = "proptest"))]
pub mod proptest;
