//! First-writer-wins map merge.
//!
//! Specification sources are merged from highest to lowest priority. A key
//! that is already present is never overwritten; a lower-priority source can
//! only fill keys that are still missing. Precedence therefore depends only
//! on merge order, never on timing.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Insert every entry of `lower` whose key is absent from `target`.
///
/// Returns how many keys were filled.
pub fn merge_fill_gaps<K: Ord, V>(target: &mut BTreeMap<K, V>, lower: BTreeMap<K, V>) -> usize {
    let mut filled = 0;
    for (key, value) in lower {
        if let Entry::Vacant(slot) = target.entry(key) {
            slot.insert(value);
            filled += 1;
        }
    }
    filled
}
