//! The calibrated item bank.
//!
//! A bank is built once and shared read-only (behind an `Arc`) by every
//! session. The only interior mutability is the per-item exposure counter,
//! a relaxed atomic used for selection tie-breaks.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::BankError;
use crate::irt::Metric;
use crate::model::{Item, ItemId};
use crate::statistics::median;

#[derive(Debug)]
pub struct ItemBank {
    id: String,
    name: String,
    metric: Metric,
    items: Vec<Arc<Item>>,
    index: HashMap<ItemId, usize>,
    domains: BTreeMap<String, usize>,
    median_difficulty: f64,
    exposure: Vec<AtomicU64>,
}

impl ItemBank {
    /// Build a bank from validated items, rejecting empty banks and duplicate ids.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        metric: Metric,
        items: Vec<Item>,
    ) -> Result<Self, BankError> {
        if items.is_empty() {
            return Err(BankError::Empty);
        }

        let mut index = HashMap::with_capacity(items.len());
        let mut domains: BTreeMap<String, usize> = BTreeMap::new();
        for (pos, item) in items.iter().enumerate() {
            if index.insert(item.id().clone(), pos).is_some() {
                return Err(BankError::DuplicateId(item.id().clone()));
            }
            *domains.entry(item.domain().to_string()).or_default() += 1;
        }

        let difficulties: Vec<f64> = items.iter().map(|i| i.params().difficulty).collect();
        let median_difficulty = median(&difficulties).unwrap_or(0.0);
        let exposure = items.iter().map(|_| AtomicU64::new(0)).collect();

        Ok(Self {
            id: id.into(),
            name: name.into(),
            metric,
            items: items.into_iter().map(Arc::new).collect(),
            index,
            domains,
            median_difficulty,
            exposure,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// The `D` constant declared by this bank's calibration metric.
    pub fn scaling(&self) -> f64 {
        self.metric.scaling()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[Arc<Item>] {
        &self.items
    }

    pub fn get(&self, id: &ItemId) -> Option<&Arc<Item>> {
        self.index.get(id).map(|&pos| &self.items[pos])
    }

    pub fn position(&self, id: &ItemId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Domains in the bank with their item counts, in name order.
    pub fn domains(&self) -> &BTreeMap<String, usize> {
        &self.domains
    }

    pub fn domain_size(&self, domain: &str) -> usize {
        self.domains.get(domain).copied().unwrap_or(0)
    }

    pub fn median_difficulty(&self) -> f64 {
        self.median_difficulty
    }

    /// How many times the item at `pos` has been issued across all sessions.
    pub fn exposure(&self, pos: usize) -> u64 {
        self.exposure
            .get(pos)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub(crate) fn record_exposure(&self, pos: usize) {
        if let Some(counter) = self.exposure.get(pos) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemContent, ItemParams};

    fn item(id: &str, domain: &str, difficulty: f64) -> Item {
        Item::new(
            id,
            domain,
            ItemParams::new(1.0, difficulty, 0.2),
            ItemContent::default(),
            "a",
        )
        .unwrap()
    }

    #[test]
    fn builds_index_and_domain_counts() {
        let bank = ItemBank::new(
            "b",
            "Bank",
            Metric::Logistic,
            vec![
                item("i1", "verbal", -1.0),
                item("i2", "spatial", 0.0),
                item("i3", "verbal", 2.0),
            ],
        )
        .unwrap();
        assert_eq!(bank.len(), 3);
        assert_eq!(bank.domain_size("verbal"), 2);
        assert_eq!(bank.domain_size("numeric"), 0);
        assert_eq!(bank.position(&ItemId::from("i3")), Some(2));
        assert_eq!(bank.median_difficulty(), 0.0);
        assert_eq!(bank.scaling(), 1.0);
    }

    #[test]
    fn rejects_duplicates_and_empty() {
        let err = ItemBank::new(
            "b",
            "Bank",
            Metric::Logistic,
            vec![item("i1", "verbal", 0.0), item("i1", "verbal", 1.0)],
        )
        .unwrap_err();
        assert_eq!(err, BankError::DuplicateId(ItemId::from("i1")));

        let err = ItemBank::new("b", "Bank", Metric::Logistic, vec![]).unwrap_err();
        assert_eq!(err, BankError::Empty);
    }

    #[test]
    fn exposure_counts_accumulate() {
        let bank =
            ItemBank::new("b", "Bank", Metric::Logistic, vec![item("i1", "v", 0.0)]).unwrap();
        bank.record_exposure(0);
        bank.record_exposure(0);
        bank.record_exposure(7);
        assert_eq!(bank.exposure(0), 2);
        assert_eq!(bank.exposure(7), 0);
    }
}
