//! Class taxonomy and incident policy.
//!
//! Both tables are built once at process start and never mutated. The
//! aggregation algorithm in `verdict` reads policy values instead of inline
//! constants so the heuristic can evolve without touching the fold itself.

use std::collections::{BTreeMap, BTreeSet};

/// Mapping from detector class ids to human-readable labels.
///
/// Only a fixed subset of the detector's taxonomy is named. Detections with
/// an unlisted class id stay in the box list but never contribute to
/// `objects_involved`.
#[derive(Clone, Debug)]
pub struct ClassNameTable {
    names: BTreeMap<u32, String>,
}

impl ClassNameTable {
    /// COCO-style subset used by the reference policy.
    pub fn coco_vehicle_subset() -> Self {
        Self::from_pairs([
            (0, "Person"),
            (1, "Bicycle"),
            (2, "Car"),
            (3, "Motorcycle"),
            (5, "Bus"),
            (7, "Truck"),
        ])
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, S)>,
        S: Into<String>,
    {
        Self {
            names: pairs
                .into_iter()
                .map(|(id, name)| (id, name.into()))
                .collect(),
        }
    }

    /// Label for a class id, or `None` when the class is unlabeled.
    pub fn label(&self, class_id: u32) -> Option<&str> {
        self.names.get(&class_id).map(String::as_str)
    }
}

impl Default for ClassNameTable {
    fn default() -> Self {
        Self::coco_vehicle_subset()
    }
}

/// Incident scoring policy: which classes count, what the incident is
/// called, and where the severity tiers begin.
///
/// The reference policy supports exactly one incident type.
#[derive(Clone, Debug)]
pub struct IncidentPolicy {
    /// Class ids that contribute to incident scoring.
    pub relevant_classes: BTreeSet<u32>,
    /// Label reported when an incident is found.
    pub incident_label: String,
    /// Peak confidence at or above this is High severity.
    pub high_threshold: f32,
    /// Peak confidence at or above this (and below high) is Medium.
    pub medium_threshold: f32,
}

impl IncidentPolicy {
    pub fn is_relevant(&self, class_id: u32) -> bool {
        self.relevant_classes.contains(&class_id)
    }
}

impl Default for IncidentPolicy {
    fn default() -> Self {
        Self {
            relevant_classes: BTreeSet::from([0, 1, 2, 3]),
            incident_label: "Vehicle Collision".to_string(),
            high_threshold: 0.85,
            medium_threshold: 0.60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_cover_reference_subset() {
        let table = ClassNameTable::default();
        assert_eq!(table.label(2), Some("Car"));
        assert_eq!(table.label(7), Some("Truck"));
        assert_eq!(table.label(4), None);
    }

    #[test]
    fn reference_policy_relevance() {
        let policy = IncidentPolicy::default();
        assert!(policy.is_relevant(0));
        assert!(policy.is_relevant(3));
        // Bus and Truck are labeled but not incident-relevant.
        assert!(!policy.is_relevant(5));
        assert!(!policy.is_relevant(7));
    }
}
