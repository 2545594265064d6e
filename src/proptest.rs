// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Proptest strategies.
//!
//! These are only available when using the `proptest` feature flag.

use std::hash::Hash;
use std::ops::Range;

use ::proptest::collection::vec;
use ::proptest::strategy::{BoxedStrategy, Strategy};

use crate::HashMap;

/// A strategy for a hash map of a given size.
pub fn hash_map<K: Strategy + 'static, V: Strategy + 'static>(
    key: K,
    value: V,
    size: Range<usize>,
) -> BoxedStrategy<HashMap<K::Value, V::Value>>
where
    K::Value: Hash + Eq + Clone + 'static,
    V::Value: Clone + 'static,
{
    vec((key, value), size.clone())
        .prop_map(HashMap::from)
        .prop_filter("HashMap minimum size".to_owned(), move |m| {
            m.len() >= size.start
        })
        .boxed()
}
