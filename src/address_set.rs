//! Sorted, duplicate-free IPv4 address sets.

use std::net::Ipv4Addr;

use crate::validation::parse_ipv4;

/// Ordered set of IPv4 addresses backed by a sorted vector.
///
/// Membership, insertion and removal use binary search, so the backing
/// vector is always sorted and free of duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSet {
    addrs: Vec<Ipv4Addr>,
}

impl AddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from device-provided strings, skipping anything that is
    /// not a plain IPv4 address. Returns the set and the skipped entries.
    pub fn parse_lossy<I, S>(values: I) -> (Self, Vec<String>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut skipped = Vec::new();
        let set = values
            .into_iter()
            .filter_map(|v| {
                let v = v.as_ref();
                let parsed = parse_ipv4(v);
                if parsed.is_none() {
                    skipped.push(v.to_string());
                }
                parsed
            })
            .collect();
        (set, skipped)
    }

    /// Insert an address. Returns `true` if it was not already present.
    pub fn add(&mut self, ip: Ipv4Addr) -> bool {
        match self.addrs.binary_search(&ip) {
            Ok(_) => false,
            Err(pos) => {
                self.addrs.insert(pos, ip);
                true
            }
        }
    }

    /// Remove an address. Returns `true` if it was present.
    pub fn remove(&mut self, ip: Ipv4Addr) -> bool {
        match self.addrs.binary_search(&ip) {
            Ok(pos) => {
                self.addrs.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.addrs.binary_search(&ip).is_ok()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.addrs.iter().copied()
    }

    pub fn as_slice(&self) -> &[Ipv4Addr] {
        &self.addrs
    }
}

impl FromIterator<Ipv4Addr> for AddressSet {
    fn from_iter<T: IntoIterator<Item = Ipv4Addr>>(iter: T) -> Self {
        let mut addrs: Vec<Ipv4Addr> = iter.into_iter().collect();
        addrs.sort_unstable();
        addrs.dedup();
        Self { addrs }
    }
}

impl<'a> IntoIterator for &'a AddressSet {
    type Item = &'a Ipv4Addr;
    type IntoIter = std::slice::Iter<'a, Ipv4Addr>;

    fn into_iter(self) -> Self::IntoIter {
        self.addrs.iter()
    }
}

/// Named set of addresses mapped 1:1 to a device address group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressGroup {
    pub name: String,
    pub members: AddressSet,
}

impl AddressGroup {
    pub fn new(name: impl Into<String>, members: AddressSet) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }
}

/// Addresses in `desired` that are missing from `current`, in sorted order.
pub fn diff_additions(current: &AddressSet, desired: &AddressSet) -> Vec<Ipv4Addr> {
    desired.iter().filter(|ip| !current.contains(*ip)).collect()
}

/// Addresses in `current` that are no longer in `desired`, in sorted order.
pub fn diff_removals(current: &AddressSet, desired: &AddressSet) -> Vec<Ipv4Addr> {
    current.iter().filter(|ip| !desired.contains(*ip)).collect()
}
