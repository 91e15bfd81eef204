//! Folding feed decisions into the desired address set.
//!
//! Bad upstream data is never an error here: decisions that are not IPv4
//! bans are counted and dropped.

use serde::{Deserialize, Deserializer, Serialize};
use std::net::Ipv4Addr;
use tracing::debug;

use crate::address_set::AddressSet;
use crate::validation::parse_ipv4;

/// Only decisions of this kind affect the address group
pub const BAN_KIND: &str = "ban";

/// A single decision as delivered by the feed.
///
/// Every field is optional on the wire and validated before use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub scenario: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
}

impl Decision {
    /// Shorthand for a ban decision on `value`
    pub fn ban(value: impl Into<String>) -> Self {
        Self {
            kind: Some(BAN_KIND.to_string()),
            value: Some(value.into()),
            ..Default::default()
        }
    }

    /// The banned IPv4 address, if this decision is one the engine acts on.
    pub fn banned_ipv4(&self) -> Option<Ipv4Addr> {
        if self.kind.as_deref() != Some(BAN_KIND) {
            return None;
        }
        self.value.as_deref().and_then(parse_ipv4)
    }
}

/// One delivery from the decision stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionBatch {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub new: Vec<Decision>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub deleted: Vec<Decision>,
}

impl DecisionBatch {
    pub fn is_empty(&self) -> bool {
        self.new.is_empty() && self.deleted.is_empty()
    }
}

/// The feed sends `null` instead of `[]` when a side has nothing
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Decision>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Decision>>::deserialize(deserializer)?.unwrap_or_default())
}

/// What one batch did to the desired set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub added: usize,
    pub removed: usize,
    pub ignored: usize,
}

impl IngestReport {
    /// True iff membership actually changed
    pub fn changed(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

/// Apply a decision batch to `desired`.
///
/// All `new` entries are applied before `deleted` ones, so an address that
/// appears in both lists of one batch ends up removed.
pub fn ingest(desired: &mut AddressSet, batch: &DecisionBatch) -> IngestReport {
    let mut report = IngestReport::default();

    for decision in &batch.new {
        match decision.banned_ipv4() {
            Some(ip) => {
                if desired.add(ip) {
                    report.added += 1;
                }
            }
            None => {
                debug!(
                    "Ignoring new decision kind={:?} value={:?}",
                    decision.kind, decision.value
                );
                report.ignored += 1;
            }
        }
    }

    for decision in &batch.deleted {
        match decision.banned_ipv4() {
            Some(ip) => {
                if desired.remove(ip) {
                    report.removed += 1;
                }
            }
            None => {
                debug!(
                    "Ignoring deleted decision kind={:?} value={:?}",
                    decision.kind, decision.value
                );
                report.ignored += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn decision(kind: Option<&str>, value: Option<&str>) -> Decision {
        Decision {
            kind: kind.map(String::from),
            value: value.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_ban_is_added() {
        let mut desired: AddressSet = [ip("10.0.0.1"), ip("10.0.0.2")].into_iter().collect();
        let batch = DecisionBatch {
            new: vec![Decision::ban("10.0.0.3")],
            deleted: vec![],
        };
        let report = ingest(&mut desired, &batch);
        assert!(report.changed());
        assert_eq!(report.added, 1);
        assert!(desired.contains(ip("10.0.0.3")));
    }

    #[test]
    fn test_non_ban_kind_ignored() {
        let mut desired = AddressSet::new();
        let batch = DecisionBatch {
            new: vec![decision(Some("captcha"), Some("10.0.0.3"))],
            deleted: vec![],
        };
        let report = ingest(&mut desired, &batch);
        assert!(!report.changed());
        assert_eq!(report.ignored, 1);
        assert!(desired.is_empty());
    }

    #[test]
    fn test_invalid_value_dropped() {
        let mut desired = AddressSet::new();
        let batch = DecisionBatch {
            new: vec![
                Decision::ban("not-an-ip"),
                Decision::ban("2001:db8::1"),
                Decision::ban("192.168.0.0/24"),
                decision(Some("ban"), None),
                decision(None, Some("10.0.0.1")),
            ],
            deleted: vec![Decision::ban("garbage")],
        };
        let report = ingest(&mut desired, &batch);
        assert!(!report.changed());
        assert_eq!(report.ignored, 6);
        assert!(desired.is_empty());
    }

    #[test]
    fn test_same_batch_add_and_delete_nets_removal() {
        let mut desired = AddressSet::new();
        let batch = DecisionBatch {
            new: vec![Decision::ban("10.0.0.7")],
            deleted: vec![Decision::ban("10.0.0.7")],
        };
        let report = ingest(&mut desired, &batch);
        assert!(!desired.contains(ip("10.0.0.7")));
        assert_eq!(report.added, 1);
        assert_eq!(report.removed, 1);
    }

    #[test]
    fn test_redelivery_is_idempotent() {
        let mut desired = AddressSet::new();
        let batch = DecisionBatch {
            new: vec![Decision::ban("10.0.0.1"), Decision::ban("10.0.0.1")],
            deleted: vec![],
        };
        assert_eq!(ingest(&mut desired, &batch).added, 1);
        let again = ingest(&mut desired, &batch);
        assert!(!again.changed());
        assert_eq!(desired.len(), 1);
    }

    #[test]
    fn test_delete_of_unknown_address_is_noop() {
        let mut desired: AddressSet = [ip("10.0.0.1")].into_iter().collect();
        let batch = DecisionBatch {
            new: vec![],
            deleted: vec![Decision::ban("10.0.0.2")],
        };
        assert!(!ingest(&mut desired, &batch).changed());
        assert_eq!(desired.len(), 1);
    }

    #[test]
    fn test_deserialize_feed_payload() {
        let body = r#"{
            "new": [
                {"id": 1, "origin": "crowdsec", "type": "ban", "scope": "Ip",
                 "value": "1.2.3.4", "duration": "3h59m", "scenario": "ssh-bf"},
                {"type": "captcha", "value": "5.6.7.8"}
            ],
            "deleted": null
        }"#;
        let batch: DecisionBatch = serde_json::from_str(body).unwrap();
        assert_eq!(batch.new.len(), 2);
        assert!(batch.deleted.is_empty());
        assert_eq!(batch.new[0].banned_ipv4(), Some(ip("1.2.3.4")));
        assert_eq!(batch.new[1].banned_ipv4(), None);
    }

    #[test]
    fn test_deserialize_missing_fields() {
        let batch: DecisionBatch = serde_json::from_str(r#"{"new": [{}]}"#).unwrap();
        assert_eq!(batch.new.len(), 1);
        assert!(batch.deleted.is_empty());
        assert_eq!(batch.new[0], Decision::default());
        assert!(DecisionBatch::default().is_empty());
    }
}
