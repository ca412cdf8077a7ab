//! Raw detector label -> waste category mapping.
//!
//! The mapping is a fixed table checked once when it is built. Classification
//! walks the table in priority order and falls back to the default category, so
//! every raw label resolves to exactly one category.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Raw class label from the detector's label space (COCO class index).
pub type ClassId = u32;

/// Closed set of waste categories.
///
/// Declaration order is the priority order used by the default table and the
/// key order of a serialized report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Plastic,
    Paper,
    Metal,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Plastic,
        Category::Paper,
        Category::Metal,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Plastic => "plastic",
            Category::Paper => "paper",
            Category::Metal => "metal",
            Category::Other => "other",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category used for any label no table entry claims.
pub const DEFAULT_CATEGORY: Category = Category::Other;

/// Default waste mapping: bottle/cup, book/paper, can/container; 0 is kept in
/// `other` explicitly.
pub const WASTE_CATEGORIES: [(Category, &[ClassId]); 4] = [
    (Category::Plastic, &[39, 41]),
    (Category::Paper, &[73, 74]),
    (Category::Metal, &[76, 77]),
    (Category::Other, &[0]),
];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CategoryTableError {
    #[error("category '{0}' is listed more than once")]
    Duplicate(Category),
    #[error("category '{0}' has an empty label set")]
    EmptyLabelSet(Category),
    #[error("default category '{0}' is not listed in the table")]
    MissingDefault(Category),
}

/// Validated priority-ordered mapping from raw labels to categories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryTable {
    entries: Vec<(Category, HashSet<ClassId>)>,
    default: Category,
}

impl CategoryTable {
    /// Build a table from `(category, labels)` entries in priority order.
    pub fn new<I, L>(entries: I, default: Category) -> Result<Self, CategoryTableError>
    where
        I: IntoIterator<Item = (Category, L)>,
        L: IntoIterator<Item = ClassId>,
    {
        let mut seen = HashSet::new();
        let mut table = Vec::new();
        for (category, labels) in entries {
            if !seen.insert(category) {
                return Err(CategoryTableError::Duplicate(category));
            }
            let labels: HashSet<ClassId> = labels.into_iter().collect();
            if labels.is_empty() {
                return Err(CategoryTableError::EmptyLabelSet(category));
            }
            table.push((category, labels));
        }
        if !seen.contains(&default) {
            return Err(CategoryTableError::MissingDefault(default));
        }
        Ok(Self {
            entries: table,
            default,
        })
    }

    /// Resolve a raw label. Total: unmapped labels resolve to the default category.
    pub fn classify(&self, class_id: ClassId) -> Category {
        self.entries
            .iter()
            .find(|(_, labels)| labels.contains(&class_id))
            .map(|(category, _)| *category)
            .unwrap_or(self.default)
    }

    pub fn default_category(&self) -> Category {
        self.default
    }

    /// Categories in priority order.
    pub fn categories(&self) -> impl Iterator<Item = Category> + '_ {
        self.entries.iter().map(|(category, _)| *category)
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self {
            entries: WASTE_CATEGORIES
                .iter()
                .map(|(category, labels)| (*category, labels.iter().copied().collect()))
                .collect(),
            default: DEFAULT_CATEGORY,
        }
    }
}
