//! Conflict reports and resolution strategies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use ledger_state::{Actor, Area, DraftOverlay, Record, RecordId, Snapshot};

/// A drafted record whose live version moved past the draft's anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub record_id: RecordId,
    pub area: Area,
    /// What this session wants the record to become.
    pub your_version: Snapshot,
    /// The record as currently committed.
    pub current_version: Snapshot,
    pub base_version: u64,
    pub current_version_number: u64,
    pub modified_by: Actor,
    pub modified_at: DateTime<Utc>,
}

impl Conflict {
    pub(crate) fn between(overlay: &DraftOverlay, live: &Record) -> Self {
        Conflict {
            record_id: live.id.clone(),
            area: live.area(),
            your_version: overlay.draft_snapshot.clone(),
            current_version: live.snapshot(),
            base_version: overlay.base_version,
            current_version_number: live.version,
            modified_by: live.updated_by.clone().unwrap_or_else(Actor::unknown),
            modified_at: live.updated_at,
        }
    }

    /// Fields whose drafted value differs from the committed one.
    pub fn differing_fields(&self) -> Vec<String> {
        self.current_version
            .diff(&self.your_version)
            .into_keys()
            .collect()
    }
}

/// How to settle one conflicting record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "values", rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Force this session's draft over the committed value.
    KeepMine,
    /// Drop this session's draft in favour of the committed value.
    KeepTheirs,
    /// Merge the given field values into the draft.
    Manual(Snapshot),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub record_id: RecordId,
    pub strategy: ResolutionStrategy,
}

impl ConflictResolution {
    pub fn keep_mine(record_id: RecordId) -> Self {
        Self {
            record_id,
            strategy: ResolutionStrategy::KeepMine,
        }
    }

    pub fn keep_theirs(record_id: RecordId) -> Self {
        Self {
            record_id,
            strategy: ResolutionStrategy::KeepTheirs,
        }
    }

    pub fn manual(record_id: RecordId, values: Snapshot) -> Self {
        Self {
            record_id,
            strategy: ResolutionStrategy::Manual(values),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strategy_serializes_with_tag() {
        let manual = ResolutionStrategy::Manual(Snapshot::new().with("amount", 5));
        let value = serde_json::to_value(&manual).unwrap();
        assert_eq!(value, json!({"strategy": "manual", "values": {"amount": 5}}));

        let keep = serde_json::to_value(ResolutionStrategy::KeepMine).unwrap();
        assert_eq!(keep, json!({"strategy": "keep_mine"}));
    }

    #[test]
    fn differing_fields_lists_changed_keys() {
        let conflict = Conflict {
            record_id: RecordId::from("r"),
            area: Area::Budget,
            your_version: Snapshot::new().with("amount", 1).with("stage", "0"),
            current_version: Snapshot::new().with("amount", 2).with("stage", "0"),
            base_version: 1,
            current_version_number: 2,
            modified_by: Actor::unknown(),
            modified_at: Utc::now(),
        };
        assert_eq!(conflict.differing_fields(), vec!["amount".to_string()]);
    }
}
