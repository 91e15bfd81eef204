//! Batch planning: turns a confirmed and a desired address set into the
//! ordered list of device updates that moves one to the other.
//!
//! Planning is pure. Nothing here talks to the device; the reconciler feeds
//! the resulting [`Plan`] to a [`DeviceGateway`](crate::gateway::DeviceGateway).

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::net::Ipv4Addr;

use crate::address_set::{diff_additions, diff_removals, AddressSet};

/// Default number of addresses per update call
pub const DEFAULT_MAX_BATCH_SIZE: usize = 50;

/// How a difference is turned into payloads.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStrategy {
    /// Delete removed addresses and set added ones (everyday mode)
    #[default]
    Patch,
    /// Delete the whole address field, then set the full desired state
    ReplaceAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Set,
    Delete,
}

impl Operation {
    /// Endpoint name on the device API
    pub fn endpoint(self) -> &'static str {
        match self {
            Operation::Set => "set",
            Operation::Delete => "delete",
        }
    }
}

/// One device update call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePayload {
    pub group: String,
    pub operation: Operation,
    /// `None` targets the whole address field.
    pub addresses: Option<Vec<Ipv4Addr>>,
}

impl UpdatePayload {
    /// Number of addresses carried (0 for a whole-field delete)
    pub fn len(&self) -> usize {
        self.addresses.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nested configuration document understood by the device.
    pub fn to_document(&self) -> Value {
        let address = match &self.addresses {
            Some(list) => Value::Array(
                list.iter()
                    .map(|ip| Value::String(ip.to_string()))
                    .collect(),
            ),
            None => Value::Null,
        };
        let mut groups = Map::new();
        groups.insert(self.group.clone(), json!({ "address": address }));
        json!({ "firewall": { "group": { "address-group": groups } } })
    }
}

/// Ordered updates for one reconciliation cycle.
///
/// All `deletes` are applied before any `sets`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub deletes: Vec<UpdatePayload>,
    pub sets: Vec<UpdatePayload>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.sets.is_empty()
    }

    /// Total number of update calls
    pub fn len(&self) -> usize {
        self.deletes.len() + self.sets.len()
    }

    /// Payloads in application order
    pub fn payloads(&self) -> impl Iterator<Item = &UpdatePayload> {
        self.deletes.iter().chain(self.sets.iter())
    }
}

/// Split an ordered list into contiguous chunks of at most `max_size`.
///
/// An empty list yields no batches. A `max_size` of zero is treated as one.
pub fn batch<T: Clone>(list: &[T], max_size: usize) -> Vec<Vec<T>> {
    list.chunks(max_size.max(1)).map(<[T]>::to_vec).collect()
}

/// Build the update plan moving the device from `current` to `desired`.
pub fn plan(
    group: &str,
    current: &AddressSet,
    desired: &AddressSet,
    strategy: UpdateStrategy,
    max_batch_size: usize,
) -> Plan {
    let payloads = |op: Operation, list: &[Ipv4Addr]| -> Vec<UpdatePayload> {
        batch(list, max_batch_size)
            .into_iter()
            .map(|chunk| UpdatePayload {
                group: group.to_string(),
                operation: op,
                addresses: Some(chunk),
            })
            .collect()
    };

    match strategy {
        UpdateStrategy::Patch => Plan {
            deletes: payloads(Operation::Delete, &diff_removals(current, desired)),
            sets: payloads(Operation::Set, &diff_additions(current, desired)),
        },
        UpdateStrategy::ReplaceAll => Plan {
            deletes: vec![UpdatePayload {
                group: group.to_string(),
                operation: Operation::Delete,
                addresses: None,
            }],
            sets: payloads(Operation::Set, desired.as_slice()),
        },
    }
}
