//! Frontier generation: the set of work items a run will attempt.
//!
//! Bulk mode sweeps a contiguous numeric identifier range; sequential mode
//! derives one `Combination` per (category, locality) pair and discovers
//! items through the pagination driver. Both feed the same scheduler.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::record::WorkItem;

/// One (category, locality) filter pair for a sequential crawl.
///
/// `None` in a dimension means "no filter"; the default combination has
/// neither.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combination {
    pub category: Option<String>,
    pub locality: Option<String>,
}

impl Combination {
    #[must_use]
    pub fn is_unfiltered(&self) -> bool {
        self.category.is_none() && self.locality.is_none()
    }

    /// Human-readable label for logs.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "category={}, locality={}",
            self.category.as_deref().unwrap_or("<default>"),
            self.locality.as_deref().unwrap_or("<default>")
        )
    }
}

/// Lazily yield one `WorkItem` per integer in `[start_id, end_id]`.
///
/// Pure and restartable: regenerating the same range yields an identical
/// sequence. Identifiers are the stringified IDs; seeds come from the
/// detail-URL template.
pub fn bulk_items(
    start_id: u64,
    end_id: u64,
    detail_url_template: &str,
) -> impl Iterator<Item = WorkItem> + '_ {
    (start_id..=end_id).map(move |id| {
        let identifier = id.to_string();
        let seed = format!("{detail_url_template}{identifier}");
        WorkItem::new(identifier, seed)
    })
}

/// Build the Cartesian product of category and locality filters.
///
/// An empty dimension contributes the single unfiltered value; when both
/// are empty exactly one default combination is produced. Order follows
/// the input lists so logs are reproducible.
#[must_use]
pub fn combinations(categories: &[String], localities: &[String]) -> Vec<Combination> {
    let cats: Vec<Option<String>> = if categories.is_empty() {
        vec![None]
    } else {
        categories.iter().cloned().map(Some).collect()
    };
    let locs: Vec<Option<String>> = if localities.is_empty() {
        vec![None]
    } else {
        localities.iter().cloned().map(Some).collect()
    };

    let mut combos = Vec::with_capacity(cats.len() * locs.len());
    for cat in &cats {
        for loc in &locs {
            combos.push(Combination {
                category: cat.clone(),
                locality: loc.clone(),
            });
        }
    }
    combos
}

/// Accumulates discovered work items across combinations, deduplicating by
/// identifier. The same business often appears under several categories or
/// localities; the first-seen seed URL is retained.
#[derive(Debug, Default)]
pub struct Frontier {
    items: Vec<WorkItem>,
    seen: HashSet<String>,
}

impl Frontier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one combination's discoveries, keeping first-seen seeds.
    pub fn merge(&mut self, discovered: Vec<WorkItem>) -> usize {
        let mut added = 0;
        for item in discovered {
            if self.seen.insert(item.identifier.clone()) {
                self.items.push(item);
                added += 1;
            }
        }
        added
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn into_items(self) -> Vec<WorkItem> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Origin;

    const TEMPLATE: &str = "https://example.com/index.php?r=search/detail&id=";

    #[test]
    fn bulk_range_yields_one_item_per_id() {
        let items: Vec<WorkItem> = bulk_items(1, 5, TEMPLATE).collect();
        assert_eq!(items.len(), 5);
        let ids: Vec<&str> = items.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3", "4", "5"]);
        assert_eq!(items[0].seed, format!("{TEMPLATE}1"));
    }

    #[test]
    fn bulk_generation_is_idempotent() {
        let first: Vec<WorkItem> = bulk_items(100, 250, TEMPLATE).collect();
        let second: Vec<WorkItem> = bulk_items(100, 250, TEMPLATE).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn bulk_single_id_range() {
        let items: Vec<WorkItem> = bulk_items(7, 7, TEMPLATE).collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].identifier, "7");
    }

    #[test]
    fn categories_without_localities() {
        let combos = combinations(&["A".to_string(), "B".to_string()], &[]);
        assert_eq!(
            combos,
            vec![
                Combination {
                    category: Some("A".to_string()),
                    locality: None
                },
                Combination {
                    category: Some("B".to_string()),
                    locality: None
                },
            ]
        );
    }

    #[test]
    fn empty_inputs_give_single_default_combination() {
        let combos = combinations(&[], &[]);
        assert_eq!(combos, vec![Combination::default()]);
        assert!(combos[0].is_unfiltered());
    }

    #[test]
    fn cartesian_product_size_and_order() {
        let cats = vec!["Pharmacies".to_string(), "Supermarkets".to_string()];
        let locs = vec!["North".to_string(), "South".to_string(), "East".to_string()];
        let combos = combinations(&cats, &locs);
        assert_eq!(combos.len(), 6);
        // Outer loop over categories, inner over localities
        assert_eq!(combos[0].category.as_deref(), Some("Pharmacies"));
        assert_eq!(combos[0].locality.as_deref(), Some("North"));
        assert_eq!(combos[5].category.as_deref(), Some("Supermarkets"));
        assert_eq!(combos[5].locality.as_deref(), Some("East"));
    }

    #[test]
    fn frontier_keeps_first_seen_seed() {
        let mut frontier = Frontier::new();
        let first = WorkItem::new("10", "https://example.com/a").with_origin(Origin {
            category: Some("A".to_string()),
            locality: None,
        });
        let duplicate = WorkItem::new("10", "https://example.com/b");

        assert_eq!(frontier.merge(vec![first.clone()]), 1);
        assert_eq!(frontier.merge(vec![duplicate, WorkItem::new("11", "u")]), 1);

        let items = frontier.into_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].seed, "https://example.com/a");
        assert_eq!(items[0].origin, first.origin);
    }
}
