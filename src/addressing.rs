// src/addressing.rs

use std::borrow::Borrow;
use std::fmt;

/// Marks a child index that did not fit into a single unit; the next unit
/// carries `index - ESCAPE_UNIT`.
pub const ESCAPE_UNIT: u16 = u16::MAX;

/// Largest child index an address can encode.
pub const MAX_CHILD_INDEX: usize = 2 * ESCAPE_UNIT as usize - 1;

/// Path of a node from the root: unit `i` is the 1-based index of the child
/// taken at depth `i`. The root has the empty address, and the address of an
/// ancestor is always a prefix of the address of its descendants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(Vec<u16>);

impl Address {
    pub fn root() -> Self {
        Address(Vec::new())
    }

    /// Builds an address from raw units, dropping a dangling escape unit so
    /// the result always names a node.
    pub fn from_units(mut units: Vec<u16>) -> Self {
        trim_dangling_escape(&mut units);
        Address(units)
    }

    /// Builds an address from the 1-based child indices along the path.
    pub fn from_child_indices(indices: &[usize]) -> Self {
        let mut address = Address::root();
        for &index in indices {
            address = address.child(index);
        }
        address
    }

    /// Address of this node's `index`-th child (1-based).
    pub fn child(&self, index: usize) -> Address {
        debug_assert!(index >= 1 && index <= MAX_CHILD_INDEX);
        let mut units = Vec::with_capacity(self.0.len() + 2);
        units.extend_from_slice(&self.0);
        if index < ESCAPE_UNIT as usize {
            units.push(index as u16);
        } else {
            units.push(ESCAPE_UNIT);
            units.push((index - ESCAPE_UNIT as usize) as u16);
        }
        Address(units)
    }

    #[inline]
    pub fn units(&self) -> &[u16] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if `self` is an ancestor of, or equal to, the node at `other`.
    pub fn is_prefix_of(&self, other: &Address) -> bool {
        other.0.starts_with(&self.0)
    }

    pub fn is_strict_ancestor_of(&self, other: &Address) -> bool {
        self.0.len() < other.0.len() && self.is_prefix_of(other)
    }

    /// Decodes the 1-based child indices along the path.
    pub fn child_indices(&self) -> Vec<usize> {
        let mut indices = Vec::with_capacity(self.0.len());
        let mut iter = self.0.iter();
        while let Some(&unit) = iter.next() {
            if unit == ESCAPE_UNIT {
                let payload = iter.next().copied().unwrap_or(0);
                indices.push(ESCAPE_UNIT as usize + payload as usize);
            } else {
                indices.push(unit as usize);
            }
        }
        indices
    }
}

impl Borrow<[u16]> for Address {
    fn borrow(&self) -> &[u16] {
        &self.0
    }
}

impl AsRef<[u16]> for Address {
    fn as_ref(&self) -> &[u16] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indices = self.child_indices();
        if indices.is_empty() {
            return write!(f, "<root>");
        }
        for (i, index) in indices.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", index)?;
        }
        Ok(())
    }
}

/// Removes a trailing escape unit that lost its payload, e.g. after two
/// escaped child indices were cut apart by a prefix computation.
fn trim_dangling_escape(units: &mut Vec<u16>) {
    let mut i = 0;
    while i < units.len() {
        if units[i] == ESCAPE_UNIT {
            if i + 1 == units.len() {
                units.pop();
                return;
            }
            i += 2;
        } else {
            i += 1;
        }
    }
}

/// Longest common prefix of a set of addresses.
///
/// With `ignore_ancestors` the longest address is the reference, so an input
/// that is an ancestor of the others does not cut the result short;
/// otherwise the shortest address is the reference and the result is the
/// true lowest common ancestor. An address that is too short to have a
/// position agrees with the reference at that position.
pub fn common_prefix<A: AsRef<[u16]>>(addresses: &[A], ignore_ancestors: bool) -> Address {
    match addresses.len() {
        0 => return Address::root(),
        1 => return Address::from_units(addresses[0].as_ref().to_vec()),
        _ => {}
    }

    let mut reference = addresses[0].as_ref();
    for address in &addresses[1..] {
        let address = address.as_ref();
        let better = if ignore_ancestors {
            address.len() > reference.len()
        } else {
            address.len() < reference.len()
        };
        if better {
            reference = address;
        }
    }

    for (pos, &unit) in reference.iter().enumerate() {
        for address in addresses {
            let address = address.as_ref();
            if pos < address.len() && address[pos] != unit {
                return Address::from_units(reference[..pos].to_vec());
            }
        }
    }
    Address::from_units(reference.to_vec())
}

/// An address with an integer weight, the working item of the weighted LCA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedAddress {
    pub address: Address,
    pub weight: u64,
}

/// Reusable list of weighted addresses. Identical addresses are merged
/// keeping the larger weight, not the sum.
#[derive(Debug, Default, Clone)]
pub struct WeightedAddressList {
    entries: Vec<WeightedAddress>,
}

impl WeightedAddressList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds an address; weights below 1 count as 1.
    pub fn add(&mut self, address: &Address, weight: u64) {
        self.entries.push(WeightedAddress {
            address: address.clone(),
            weight: weight.max(1),
        });
    }

    fn merge_duplicates(&mut self) {
        self.entries.sort_by(|a, b| a.address.cmp(&b.address));
        self.entries.dedup_by(|next, kept| {
            if next.address == kept.address {
                kept.weight = kept.weight.max(next.weight);
                true
            } else {
                false
            }
        });
    }

    pub fn total_weight(&self) -> u64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    /// Deepest prefix whose majority branch holds at least `percent_to_cover`
    /// percent of the total weight at every depth. A tie between the two
    /// heaviest branches stops the descent. With `ignore_ancestors`, addresses
    /// that end on the consensus path are dropped from the total as the
    /// descent passes them. Consumes the list.
    pub fn weighted_common_prefix(&mut self, percent_to_cover: f64, ignore_ancestors: bool) -> Address {
        self.merge_duplicates();
        let mut total = self.total_weight();
        let mut prefix: Vec<u16> = Vec::new();
        let mut best_step: Vec<u16> = Vec::with_capacity(2);

        loop {
            // all remaining entries share `prefix`, so steps line up at `depth`
            let depth = prefix.len();
            if !self.entries.iter().any(|e| e.address.len() > depth) {
                break;
            }
            if ignore_ancestors {
                let mut removed = 0u64;
                self.entries.retain(|e| {
                    if e.address.len() <= depth {
                        removed += e.weight;
                        false
                    } else {
                        true
                    }
                });
                total -= removed;
            }
            let needed = weight_to_cover(percent_to_cover, total);

            // entries are sorted, so each branch is a contiguous run
            best_step.clear();
            let mut best_weight = 0u64;
            let mut tied = false;
            let mut i = 0;
            while i < self.entries.len() {
                let Some(step) = step_at(self.entries[i].address.units(), depth) else {
                    i += 1;
                    continue;
                };
                let mut weight = 0u64;
                while i < self.entries.len() && step_at(self.entries[i].address.units(), depth) == Some(step) {
                    weight += self.entries[i].weight;
                    i += 1;
                }
                if weight > best_weight {
                    best_weight = weight;
                    best_step.clear();
                    best_step.extend_from_slice(step);
                    tied = false;
                } else if weight == best_weight {
                    tied = true;
                }
            }

            if tied || best_step.is_empty() || best_weight < needed {
                break;
            }
            prefix.extend_from_slice(&best_step);
            self.entries
                .retain(|e| step_at(e.address.units(), depth) == Some(best_step.as_slice()));
        }

        self.entries.clear();
        Address::from_units(prefix)
    }
}

/// Units of the child step starting at `pos`: one unit, or two when the
/// first is the escape unit.
fn step_at(units: &[u16], pos: usize) -> Option<&[u16]> {
    let width = if *units.get(pos)? == ESCAPE_UNIT { 2 } else { 1 };
    units.get(pos..pos + width)
}

/// `ceil(percent / 100 * total)`, tolerant of float noise.
pub fn weight_to_cover(percent: f64, total: u64) -> u64 {
    let exact = percent * total as f64 / 100.0;
    (exact - 1e-9).ceil().max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(indices: &[usize]) -> Address {
        Address::from_child_indices(indices)
    }

    #[test]
    fn test_common_prefix_empty_and_single() {
        let none: Vec<Address> = Vec::new();
        assert!(common_prefix(&none, true).is_empty());
        assert_eq!(common_prefix(&[addr(&[1, 2])], false), addr(&[1, 2]));
    }

    #[test]
    fn test_common_prefix_nested_ancestors() {
        let addresses = vec![addr(&[1]), addr(&[1, 2]), addr(&[1, 2, 3])];
        // the longest address is the reference; shorter ones agree where they end
        assert_eq!(common_prefix(&addresses, true), addr(&[1, 2, 3]));
        // the shortest address is the reference: the true LCA
        assert_eq!(common_prefix(&addresses, false), addr(&[1]));
    }

    #[test]
    fn test_common_prefix_disagreement() {
        let addresses = vec![addr(&[1, 2]), addr(&[1, 3]), addr(&[1])];
        assert_eq!(common_prefix(&addresses, true), addr(&[1]));
        let addresses = vec![addr(&[2, 1]), addr(&[1, 1])];
        assert!(common_prefix(&addresses, true).is_empty());
    }

    #[test]
    fn test_escaped_child_indices() {
        let a = addr(&[3, 70_000]);
        let b = addr(&[3, 70_001]);
        assert_eq!(a.len(), 3);
        assert_eq!(a.child_indices(), vec![3, 70_000]);
        // the shared escape unit must not survive on its own
        assert_eq!(common_prefix(&[a, b], false), addr(&[3]));
    }

    #[test]
    fn test_prefix_relations() {
        assert!(addr(&[1]).is_prefix_of(&addr(&[1, 4])));
        assert!(addr(&[1]).is_strict_ancestor_of(&addr(&[1, 4])));
        assert!(!addr(&[1, 4]).is_strict_ancestor_of(&addr(&[1, 4])));
        assert_eq!(addr(&[1, 4]).to_string(), "1.4");
    }

    #[test]
    fn test_weighted_majority() {
        let mut list = WeightedAddressList::new();
        list.add(&addr(&[1, 1]), 8);
        list.add(&addr(&[1, 2]), 2);
        // 80% of 10 = 8: the heavy branch qualifies
        assert_eq!(list.weighted_common_prefix(80.0, false), addr(&[1, 1]));

        let mut list = WeightedAddressList::new();
        list.add(&addr(&[1, 1]), 7);
        list.add(&addr(&[1, 2]), 3);
        assert_eq!(list.weighted_common_prefix(80.0, false), addr(&[1]));
    }

    #[test]
    fn test_weighted_duplicates_keep_max() {
        let mut list = WeightedAddressList::new();
        list.add(&addr(&[1, 1]), 3);
        list.add(&addr(&[1, 1]), 5);
        list.add(&addr(&[1, 2]), 5);
        // merged to 5 + 5 = 10; the branches tie
        assert_eq!(list.weighted_common_prefix(50.0, false), addr(&[1]));
    }

    #[test]
    fn test_weighted_ignore_ancestors() {
        let mut list = WeightedAddressList::new();
        list.add(&addr(&[1]), 5);
        list.add(&addr(&[1, 2]), 5);
        assert_eq!(list.weighted_common_prefix(100.0, false), addr(&[1]));

        let mut list = WeightedAddressList::new();
        list.add(&addr(&[1]), 5);
        list.add(&addr(&[1, 2]), 5);
        assert_eq!(list.weighted_common_prefix(100.0, true), addr(&[1, 2]));
    }

    #[test]
    fn test_weighted_escaped_siblings_are_separate_branches() {
        let mut list = WeightedAddressList::new();
        list.add(&addr(&[1]), 5);
        list.add(&addr(&[65_536]), 3);
        list.add(&addr(&[65_537]), 2);
        assert_eq!(list.weighted_common_prefix(40.0, true), addr(&[1]));

        // same weights on plain indices give the same answer
        let mut list = WeightedAddressList::new();
        list.add(&addr(&[1]), 5);
        list.add(&addr(&[2]), 3);
        list.add(&addr(&[3]), 2);
        assert_eq!(list.weighted_common_prefix(40.0, true), addr(&[1]));

        // an escaped heaviest child is taken whole, then the descent continues
        let mut list = WeightedAddressList::new();
        list.add(&addr(&[65_536, 2]), 6);
        list.add(&addr(&[65_537]), 3);
        list.add(&addr(&[1]), 4);
        assert_eq!(list.weighted_common_prefix(40.0, true), addr(&[65_536, 2]));
    }

    #[test]
    fn test_weight_to_cover_rounding() {
        assert_eq!(weight_to_cover(80.0, 5), 4);
        assert_eq!(weight_to_cover(50.0, 3), 2);
        assert_eq!(weight_to_cover(100.0, 7), 7);
    }
}
