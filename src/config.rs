// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/// The number of fixed slots in the root node.
pub(crate) const ROOT_SIZE: usize = 7;

/// Bits of hash consumed by the root level.
pub(crate) const ROOT_BITS: usize = 4;

/// The hash bits that feed the root slot reduction: one bit from each of
/// nibbles 14 and 13 plus the low nibble, reduced modulo [`ROOT_SIZE`].
pub(crate) const ROOT_HASH_MASK: u64 = 0x0110_0000_0000_000f;

/// Bits of hash consumed per inner level.
pub(crate) const LEVEL_BITS: usize = 6;

/// Fan-out of an inner node. Raw 6-bit pieces are reduced modulo 63, so
/// positions range over `0..63` and bit 63 of a node bitmap is never set.
pub(crate) const LEVEL_FANOUT: usize = 63;

/// The number of inner levels below the root. Ten levels of 6 bits plus the
/// root's 4 exhaust a 64-bit hash; below this, collisions go to a list.
pub(crate) const BOTTOM_DEPTH: usize = 10;
