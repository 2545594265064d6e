// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::borrow::Borrow;
use std::hash::{BuildHasher, Hash};
use std::iter::FusedIterator;
use std::slice::Iter as SliceIter;
use std::{array, mem};

use archery::{SharedPointer, SharedPointerKind};
use bitmaps::{Bitmap, Bits, BitsImpl};
use imbl_sized_chunks::inline_array::InlineArray;

use crate::config::{BOTTOM_DEPTH, LEVEL_BITS, LEVEL_FANOUT, ROOT_BITS, ROOT_HASH_MASK, ROOT_SIZE};
use crate::util::clone_ref;

const HASH_WIDTH: usize = 64;
pub(crate) type HashBits = <BitsImpl<HASH_WIDTH> as Bits>::Store; // a uint of HASH_WIDTH bits

/// Occupancy bitmap of an inner node. Bit 63 is never set because raw
/// 6-bit hash pieces are reduced modulo [`LEVEL_FANOUT`].
type NodeBitmap = Bitmap<LEVEL_FANOUT>;

/// Deepest possible iterator stack: one inner node per level plus a
/// collision list, with a little slack.
const ITER_STACK_CAPACITY: usize = BOTTOM_DEPTH + 2;

#[inline]
pub(crate) fn hash_key<K: Hash + ?Sized, S: BuildHasher>(bh: &S, key: &K) -> HashBits {
    bh.hash_one(key) as HashBits
}

/// Reduce a full hash to one of the [`ROOT_SIZE`] root slots.
#[inline]
pub(crate) fn root_index(hash: HashBits) -> usize {
    ((hash & ROOT_HASH_MASK) % ROOT_SIZE as HashBits) as usize
}

/// The hash piece selecting a position inside the inner node at `depth`.
/// The root consumes [`ROOT_BITS`] bits, each level after it six more.
#[inline]
fn hash_piece(hash: HashBits, depth: usize) -> usize {
    let mask = ((1 << LEVEL_BITS) - 1) as HashBits;
    (((hash >> (ROOT_BITS + LEVEL_BITS * depth)) & mask) as usize) % LEVEL_FANOUT
}

/// Compare two hashes, returning true if the keys may be equal.
/// This function will always return true if it thinks keys may be cheap to compare.
#[inline]
pub(crate) fn hash_may_eq<A: HashValue>(hash: HashBits, other_hash: HashBits) -> bool {
    (!mem::needs_drop::<A::Key>() && mem::size_of::<A::Key>() <= 16) || hash == other_hash
}

pub trait HashValue {
    type Key: Eq;

    fn extract_key(&self) -> &Self::Key;
}

/// One slot of an inner node, or a non-empty root slot.
pub(crate) enum Entry<A, P: SharedPointerKind> {
    /// A direct entry, stored with its full 64-bit hash.
    Value(A, HashBits),
    /// A deeper inner node.
    Node(SharedPointer<Node<A, P>, P>),
    /// A collision list; only reachable once the hash is exhausted.
    Collision(SharedPointer<CollisionList<A, P>, P>),
}

impl<A: Clone, P: SharedPointerKind> Clone for Entry<A, P> {
    fn clone(&self) -> Self {
        match self {
            Entry::Value(value, hash) => Entry::Value(value.clone(), *hash),
            Entry::Node(node) => Entry::Node(node.clone()),
            Entry::Collision(list) => Entry::Collision(list.clone()),
        }
    }
}

/// A bitmap compressed inner node.
///
/// `children` holds exactly one entry per set bit of `bitmap`, in
/// ascending position order; the index of position `p` is the number of
/// set bits strictly below `p`.
pub(crate) struct Node<A, P: SharedPointerKind> {
    bitmap: NodeBitmap,
    children: Vec<Entry<A, P>>,
}

impl<A: Clone, P: SharedPointerKind> Clone for Node<A, P> {
    fn clone(&self) -> Self {
        Node {
            bitmap: self.bitmap,
            children: self.children.clone(),
        }
    }
}

impl<A, P: SharedPointerKind> Node<A, P> {
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The packed array index for position `pos`.
    #[inline]
    fn pack_index(&self, pos: usize) -> usize {
        (self.bitmap.into_value() & ((1 << pos) - 1)).count_ones() as usize
    }

    /// Clear the lowest set bit of the bitmap, after its slot was dropped.
    #[inline]
    fn clear_first_bit(&mut self) {
        if let Some(pos) = self.bitmap.first_index() {
            self.bitmap.set(pos, false);
        }
    }
}

impl<A: HashValue, P: SharedPointerKind> Node<A, P> {
    pub(crate) fn get<BK>(&self, hash: HashBits, depth: usize, key: &BK) -> Option<&A>
    where
        BK: Eq + ?Sized,
        A::Key: Borrow<BK>,
    {
        let mut node = self;
        let mut depth = depth;

        loop {
            let pos = hash_piece(hash, depth);
            if !node.bitmap.get(pos) {
                return None;
            }
            match &node.children[node.pack_index(pos)] {
                Entry::Node(child) => {
                    node = child;
                    depth += 1;
                }
                Entry::Value(value, value_hash) => {
                    return if hash_may_eq::<A>(hash, *value_hash)
                        && key == value.extract_key().borrow()
                    {
                        Some(value)
                    } else {
                        None
                    };
                }
                Entry::Collision(list) => return list.find(key),
            }
        }
    }

    /// Build the slot for two entries whose parent position already
    /// collides. Recurses while the next-level positions keep colliding
    /// and falls back to a collision list once the hash runs out.
    pub(crate) fn merge(
        depth: usize,
        hash0: HashBits,
        value0: A,
        hash1: HashBits,
        value1: A,
    ) -> Entry<A, P> {
        if depth == BOTTOM_DEPTH {
            return Entry::Collision(SharedPointer::new(CollisionList::pair(value0, value1)));
        }
        let pos0 = hash_piece(hash0, depth);
        let pos1 = hash_piece(hash1, depth);
        let mut bitmap = NodeBitmap::new();
        bitmap.set(pos0, true);
        let children = if pos0 == pos1 {
            vec![Self::merge(depth + 1, hash0, value0, hash1, value1)]
        } else {
            bitmap.set(pos1, true);
            if pos1 < pos0 {
                vec![Entry::Value(value1, hash1), Entry::Value(value0, hash0)]
            } else {
                vec![Entry::Value(value0, hash0), Entry::Value(value1, hash1)]
            }
        };
        Entry::Node(SharedPointer::new(Node { bitmap, children }))
    }

    pub(crate) fn insert(&mut self, hash: HashBits, depth: usize, value: A) -> Option<A>
    where
        A: Clone,
    {
        let pos = hash_piece(hash, depth);
        let index = self.pack_index(pos);
        if !self.bitmap.get(pos) {
            self.children.insert(index, Entry::Value(value, hash));
            self.bitmap.set(pos, true);
            return None;
        }
        match &mut self.children[index] {
            Entry::Node(child_ref) => {
                return SharedPointer::make_mut(child_ref).insert(hash, depth + 1, value);
            }
            Entry::Collision(coll_ref) => {
                return CollisionList::insert(coll_ref, value);
            }
            Entry::Value(current, current_hash) => {
                if hash_may_eq::<A>(hash, *current_hash)
                    && current.extract_key() == value.extract_key()
                {
                    return Some(mem::replace(current, value));
                }
            }
        }
        // The position is held by an entry with a different key: push both
        // entries one level down.
        let Entry::Value(old_value, old_hash) = self.children.remove(index) else {
            unreachable!()
        };
        let merged = Self::merge(depth + 1, old_hash, old_value, hash, value);
        self.children.insert(index, merged);
        None
    }

    pub(crate) fn remove<BK>(&mut self, hash: HashBits, depth: usize, key: &BK) -> Option<A>
    where
        A: Clone,
        BK: Eq + ?Sized,
        A::Key: Borrow<BK>,
    {
        let pos = hash_piece(hash, depth);
        if !self.bitmap.get(pos) {
            return None;
        }
        let index = self.pack_index(pos);
        if let Entry::Node(child_ref) = &mut self.children[index] {
            let child = SharedPointer::make_mut(child_ref);
            let removed = child.remove(hash, depth + 1, key);
            if removed.is_some() && child.is_empty() {
                self.children.remove(index);
                self.bitmap.set(pos, false);
            }
            return removed;
        }
        let found = match &self.children[index] {
            Entry::Value(value, value_hash) => {
                hash_may_eq::<A>(hash, *value_hash) && key == value.extract_key().borrow()
            }
            Entry::Collision(list) => list.find(key).is_some(),
            Entry::Node(_) => unreachable!(),
        };
        if !found {
            return None;
        }
        match self.children.remove(index) {
            Entry::Value(value, _) => {
                self.bitmap.set(pos, false);
                Some(value)
            }
            Entry::Collision(head) => {
                let mut link = Some(head);
                let removed = CollisionList::remove(&mut link, key);
                match link {
                    Some(rest) => self.children.insert(index, Entry::Collision(rest)),
                    None => {
                        self.bitmap.set(pos, false);
                    }
                }
                removed
            }
            Entry::Node(_) => unreachable!(),
        }
    }

    /// Remove the entry at the leftmost populated position, recursing
    /// through child nodes and taking collision list heads. The caller
    /// must check [`is_empty`][Node::is_empty] afterwards and drop this
    /// node if it drained completely.
    pub(crate) fn remove_first(&mut self) -> A
    where
        A: Clone,
    {
        if let Entry::Node(child_ref) = &mut self.children[0] {
            let child = SharedPointer::make_mut(child_ref);
            let value = child.remove_first();
            if child.is_empty() {
                self.children.remove(0);
                self.clear_first_bit();
            }
            return value;
        }
        match self.children.remove(0) {
            Entry::Value(value, _) => {
                self.clear_first_bit();
                value
            }
            Entry::Collision(head) => {
                let link = clone_ref(head);
                match link.rest {
                    Some(rest) => self.children.insert(0, Entry::Collision(rest)),
                    None => self.clear_first_bit(),
                }
                link.value
            }
            Entry::Node(_) => unreachable!(),
        }
    }
}

/// A persistent linked list holding entries whose hashes collided all the
/// way down. Updates copy the links before the touched one and share the
/// rest.
pub(crate) struct CollisionList<A, P: SharedPointerKind> {
    value: A,
    rest: Option<SharedPointer<CollisionList<A, P>, P>>,
}

impl<A: Clone, P: SharedPointerKind> Clone for CollisionList<A, P> {
    fn clone(&self) -> Self {
        CollisionList {
            value: self.value.clone(),
            rest: self.rest.clone(),
        }
    }
}

impl<A: HashValue, P: SharedPointerKind> CollisionList<A, P> {
    #[cold]
    fn pair(first: A, second: A) -> Self {
        CollisionList {
            value: first,
            rest: Some(SharedPointer::new(CollisionList {
                value: second,
                rest: None,
            })),
        }
    }

    #[cold]
    fn find<BK>(&self, key: &BK) -> Option<&A>
    where
        BK: Eq + ?Sized,
        A::Key: Borrow<BK>,
    {
        let mut list = self;
        loop {
            if key == list.value.extract_key().borrow() {
                return Some(&list.value);
            }
            match &list.rest {
                Some(rest) => list = rest,
                None => return None,
            }
        }
    }

    /// Replace the value of a matching entry, or append a fresh link.
    /// Returns the replaced value if the key was already present.
    #[cold]
    fn insert(this: &mut SharedPointer<Self, P>, value: A) -> Option<A>
    where
        A: Clone,
    {
        let link = SharedPointer::make_mut(this);
        if link.value.extract_key() == value.extract_key() {
            return Some(mem::replace(&mut link.value, value));
        }
        match &mut link.rest {
            Some(rest) => Self::insert(rest, value),
            None => {
                link.rest = Some(SharedPointer::new(CollisionList { value, rest: None }));
                None
            }
        }
    }

    /// Excise the entry matching `key`, leaving `link` pointing at what
    /// remains (`None` once the list drains). The caller pre-checks
    /// presence with [`find`][CollisionList::find], so a miss here copies
    /// nothing.
    #[cold]
    fn remove<BK>(link: &mut Option<SharedPointer<Self, P>>, key: &BK) -> Option<A>
    where
        A: Clone,
        BK: Eq + ?Sized,
        A::Key: Borrow<BK>,
    {
        let Some(head) = link.take() else {
            return None;
        };
        if key == head.value.extract_key().borrow() {
            let node = clone_ref(head);
            *link = node.rest;
            Some(node.value)
        } else {
            let mut head = head;
            let removed = Self::remove(&mut SharedPointer::make_mut(&mut head).rest, key);
            *link = Some(head);
            removed
        }
    }
}

/// An allocation-free stack for iterators.
type InlineStack<T> = InlineArray<T, (usize, [T; ITER_STACK_CAPACITY])>;

enum IterItem<'a, A, P: SharedPointerKind> {
    Node(SliceIter<'a, Entry<A, P>>),
    List(&'a CollisionList<A, P>),
}

// We manually impl Clone for IterItem to allow cloning even when A isn't
// Clone. This works because the items hold references, not owned values.
impl<'a, A, P: SharedPointerKind> Clone for IterItem<'a, A, P> {
    fn clone(&self) -> Self {
        match self {
            IterItem::Node(iter) => IterItem::Node(iter.clone()),
            IterItem::List(list) => IterItem::List(list),
        }
    }
}

// Ref iterator

pub(crate) struct Iter<'a, A, P: SharedPointerKind> {
    count: usize,
    roots: SliceIter<'a, Option<Entry<A, P>>>,
    stack: InlineStack<IterItem<'a, A, P>>,
}

// We impl Clone instead of deriving it, because we want Clone even if K and V aren't.
impl<'a, A, P: SharedPointerKind> Clone for Iter<'a, A, P> {
    fn clone(&self) -> Self {
        Self {
            count: self.count,
            roots: self.roots.clone(),
            stack: self.stack.clone(),
        }
    }
}

impl<'a, A, P> Iter<'a, A, P>
where
    A: 'a,
    P: SharedPointerKind,
{
    pub(crate) fn new(roots: &'a [Option<Entry<A, P>>], size: usize) -> Self {
        Iter {
            count: size,
            roots: roots.iter(),
            stack: InlineStack::new(),
        }
    }
}

impl<'a, A, P> Iterator for Iter<'a, A, P>
where
    A: 'a,
    P: SharedPointerKind,
{
    type Item = &'a A;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = loop {
                match self.stack.last_mut() {
                    Some(IterItem::Node(iter)) => {
                        if let Some(entry) = iter.next() {
                            break entry;
                        }
                        self.stack.pop();
                    }
                    Some(IterItem::List(slot)) => {
                        let list: &'a CollisionList<A, P> = *slot;
                        match &list.rest {
                            Some(rest) => *slot = &**rest,
                            None => {
                                self.stack.pop();
                            }
                        }
                        self.count -= 1;
                        return Some(&list.value);
                    }
                    None => match self.roots.next() {
                        Some(Some(entry)) => break entry,
                        Some(None) => continue,
                        None => return None,
                    },
                }
            };
            match entry {
                Entry::Value(value, _) => {
                    self.count -= 1;
                    return Some(value);
                }
                Entry::Node(child) => self.stack.push(IterItem::Node(child.children.iter())),
                Entry::Collision(list) => self.stack.push(IterItem::List(&**list)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.count, Some(self.count))
    }
}

impl<'a, A, P: SharedPointerKind> ExactSizeIterator for Iter<'a, A, P> where A: 'a {}

impl<'a, A, P: SharedPointerKind> FusedIterator for Iter<'a, A, P> where A: 'a {}

// Consuming iterator

enum DrainItem<A, P: SharedPointerKind> {
    Node(SharedPointer<Node<A, P>, P>),
    List(SharedPointer<CollisionList<A, P>, P>),
}

pub(crate) struct Drain<A, P: SharedPointerKind> {
    count: usize,
    roots: array::IntoIter<Option<Entry<A, P>>, ROOT_SIZE>,
    stack: InlineStack<DrainItem<A, P>>,
}

impl<A, P: SharedPointerKind> Drain<A, P> {
    pub(crate) fn new(roots: [Option<Entry<A, P>>; ROOT_SIZE], size: usize) -> Self {
        Drain {
            count: size,
            roots: roots.into_iter(),
            stack: InlineStack::new(),
        }
    }
}

impl<A, P: SharedPointerKind> Iterator for Drain<A, P>
where
    A: Clone,
{
    type Item = A;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = loop {
                match self.stack.last_mut() {
                    Some(DrainItem::Node(node_ref)) => {
                        // Popping leaves the bitmap stale; the node is
                        // being consumed.
                        if let Some(entry) = SharedPointer::make_mut(node_ref).children.pop() {
                            break entry;
                        }
                        self.stack.pop();
                    }
                    Some(DrainItem::List(_)) => {
                        let Some(DrainItem::List(head)) = self.stack.pop() else {
                            unreachable!()
                        };
                        let link = clone_ref(head);
                        if let Some(rest) = link.rest {
                            self.stack.push(DrainItem::List(rest));
                        }
                        self.count -= 1;
                        return Some(link.value);
                    }
                    None => match self.roots.next() {
                        Some(Some(entry)) => break entry,
                        Some(None) => continue,
                        None => return None,
                    },
                }
            };
            match entry {
                Entry::Value(value, _) => {
                    self.count -= 1;
                    return Some(value);
                }
                Entry::Node(child) => self.stack.push(DrainItem::Node(child)),
                Entry::Collision(list) => self.stack.push(DrainItem::List(list)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.count, Some(self.count))
    }
}

impl<A, P: SharedPointerKind> ExactSizeIterator for Drain<A, P> where A: Clone {}

impl<A, P: SharedPointerKind> FusedIterator for Drain<A, P> where A: Clone {}
