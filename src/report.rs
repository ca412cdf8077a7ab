//! Final per-category report.
//!
//! Serialized shape, consumed as-is by the dashboard:
//!
//! ```json
//! { "plastic": { "count": 1, "objects": [ { "id": 7, "duration": 4 } ] } }
//! ```
//!
//! Categories with no accepted track are absent rather than reported with a zero
//! count. Consumers must treat a missing key as zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::track::TrackId;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report {
    categories: BTreeMap<Category, CategoryStats>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    /// Distinct track identities, not detections.
    pub count: usize,
    /// One entry per track, in first-observation order.
    pub objects: Vec<ObjectTimeline>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectTimeline {
    pub id: TrackId,
    /// `last_seen - first_seen`, in frames.
    pub duration: u64,
}

impl Report {
    pub(crate) fn insert(&mut self, category: Category, objects: Vec<ObjectTimeline>) {
        self.categories.insert(
            category,
            CategoryStats {
                count: objects.len(),
                objects,
            },
        );
    }

    pub fn get(&self, category: Category) -> Option<&CategoryStats> {
        self.categories.get(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Number of categories present.
    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &CategoryStats)> {
        self.categories.iter().map(|(category, stats)| (*category, stats))
    }

    /// Distinct tracks across all categories.
    pub fn total_objects(&self) -> usize {
        self.categories.values().map(|stats| stats.count).sum()
    }

    /// Category a track was reported under, if any.
    pub fn category_of(&self, track_id: TrackId) -> Option<Category> {
        self.iter()
            .find(|(_, stats)| stats.objects.iter().any(|obj| obj.id == track_id))
            .map(|(category, _)| category)
    }
}
