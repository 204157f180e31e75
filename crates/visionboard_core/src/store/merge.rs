//! Field-level conflict resolution between a context and the store.
//!
//! # Invariants
//! - Resolution is per field: a field touched on one side only always takes
//!   that side's value, whatever the policy.
//! - The policy decides only fields changed on both sides to different values.

use crate::model::dream::{Dream, DreamField};
use serde::{Deserialize, Serialize};

/// Conflict policy applied when a context's pending edits meet newer store values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// In-memory field values win.
    #[default]
    PropertyObjectTrump,
    /// Store field values win.
    PropertyStoreTrump,
    /// Fields changed on both sides fail the merge.
    Error,
}

impl MergePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PropertyObjectTrump => "property_object_trump",
            Self::PropertyStoreTrump => "property_store_trump",
            Self::Error => "error",
        }
    }
}

/// Merges `local` edits and `store` values that both diverged from `snapshot`.
///
/// `snapshot` is the store value the context last loaded. Returns the merged
/// record, or the conflicting fields under `MergePolicy::Error`.
pub fn resolve(
    policy: MergePolicy,
    snapshot: &Dream,
    local: &Dream,
    store: &Dream,
) -> Result<Dream, Vec<DreamField>> {
    let mut merged = store.clone();
    let mut conflicts = Vec::new();

    for field in DreamField::ALL {
        let local_changed = !local.field_eq(snapshot, field);
        if !local_changed {
            continue;
        }
        let store_changed = !store.field_eq(snapshot, field);
        if !store_changed || local.field_eq(store, field) {
            merged.copy_field_from(local, field);
            continue;
        }

        match policy {
            MergePolicy::PropertyObjectTrump => merged.copy_field_from(local, field),
            MergePolicy::PropertyStoreTrump => {}
            MergePolicy::Error => conflicts.push(field),
        }
    }

    if conflicts.is_empty() {
        Ok(merged)
    } else {
        Err(conflicts)
    }
}

#[cfg(test)]
mod tests {
    use super::{resolve, MergePolicy};
    use crate::model::dream::{Dream, DreamField};

    fn base() -> Dream {
        let mut dream = Dream::new();
        dream.title = "Learn piano".to_string();
        dream.description = "Ten minutes a day".to_string();
        dream
    }

    #[test]
    fn disjoint_edits_combine_under_every_policy() {
        let snapshot = base();
        let mut local = snapshot.clone();
        local.title = "Learn jazz piano".to_string();
        let mut store = snapshot.clone();
        store.description = "Twenty minutes a day".to_string();

        for policy in [
            MergePolicy::PropertyObjectTrump,
            MergePolicy::PropertyStoreTrump,
            MergePolicy::Error,
        ] {
            let merged = resolve(policy, &snapshot, &local, &store).unwrap();
            assert_eq!(merged.title, "Learn jazz piano");
            assert_eq!(merged.description, "Twenty minutes a day");
        }
    }

    #[test]
    fn object_trump_keeps_local_value_on_same_field() {
        let snapshot = base();
        let mut local = snapshot.clone();
        local.title = "Local".to_string();
        let mut store = snapshot.clone();
        store.title = "Remote".to_string();

        let merged = resolve(MergePolicy::PropertyObjectTrump, &snapshot, &local, &store).unwrap();
        assert_eq!(merged.title, "Local");
    }

    #[test]
    fn store_trump_keeps_store_value_on_same_field() {
        let snapshot = base();
        let mut local = snapshot.clone();
        local.title = "Local".to_string();
        local.image_data = Some(vec![9]);
        let mut store = snapshot.clone();
        store.title = "Remote".to_string();

        let merged = resolve(MergePolicy::PropertyStoreTrump, &snapshot, &local, &store).unwrap();
        assert_eq!(merged.title, "Remote");
        assert_eq!(merged.image_data, Some(vec![9]));
    }

    #[test]
    fn error_policy_reports_conflicting_fields() {
        let snapshot = base();
        let mut local = snapshot.clone();
        local.title = "Local".to_string();
        local.description = "same".to_string();
        let mut store = snapshot.clone();
        store.title = "Remote".to_string();
        store.description = "same".to_string();

        let conflicts = resolve(MergePolicy::Error, &snapshot, &local, &store).unwrap_err();
        assert_eq!(conflicts, vec![DreamField::Title]);
    }
}
