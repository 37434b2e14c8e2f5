use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tillsync_core::{Money, MerchantId};

/// One observed cost for a catalog item at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostObservation {
    pub merchant_id: MerchantId,
    /// Upstream catalog item id.
    pub item_external_id: String,
    pub cost: Money,
    pub observed_at: DateTime<Utc>,
}

/// Append-only cost observations for one catalog item.
///
/// Observations are kept sorted by `observed_at`; appending never rewrites
/// an existing entry. `cost_at` answers "what did this item cost when it was
/// sold" by picking the latest observation at or before the sale time.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemCostHistory {
    observations: Vec<CostObservation>,
}

impl ItemCostHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_observations(mut observations: Vec<CostObservation>) -> Self {
        observations.sort_by_key(|o| o.observed_at);
        Self { observations }
    }

    pub fn append(&mut self, observation: CostObservation) {
        // Most appends arrive in time order; only re-sort on the exception.
        let in_order = self
            .observations
            .last()
            .is_none_or(|last| last.observed_at <= observation.observed_at);
        self.observations.push(observation);
        if !in_order {
            self.observations.sort_by_key(|o| o.observed_at);
        }
    }

    /// The cost in effect at `at`: latest observation with
    /// `observed_at <= at`, or `None` when the history starts later.
    pub fn cost_at(&self, at: DateTime<Utc>) -> Option<Money> {
        self.observations
            .iter()
            .rev()
            .find(|o| o.observed_at <= at)
            .map(|o| o.cost)
    }

    pub fn latest(&self) -> Option<&CostObservation> {
        self.observations.last()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn obs(merchant_id: MerchantId, cents: i64, at: DateTime<Utc>) -> CostObservation {
        CostObservation {
            merchant_id,
            item_external_id: "ITEM1".to_string(),
            cost: Money::from_minor_units(cents),
            observed_at: at,
        }
    }

    #[test]
    fn cost_at_picks_latest_observation_before_sale() {
        let merchant_id = MerchantId::new();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut history = ItemCostHistory::new();
        history.append(obs(merchant_id, 400, t0));
        history.append(obs(merchant_id, 450, t0 + chrono::Duration::days(10)));

        assert_eq!(
            history.cost_at(t0 + chrono::Duration::days(5)),
            Some(Money::from_minor_units(400))
        );
        assert_eq!(
            history.cost_at(t0 + chrono::Duration::days(10)),
            Some(Money::from_minor_units(450))
        );
        assert_eq!(history.cost_at(t0 - chrono::Duration::seconds(1)), None);
    }

    #[test]
    fn out_of_order_appends_are_resorted() {
        let merchant_id = MerchantId::new();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut history = ItemCostHistory::new();
        history.append(obs(merchant_id, 450, t0 + chrono::Duration::days(10)));
        history.append(obs(merchant_id, 400, t0));

        assert_eq!(
            history.cost_at(t0 + chrono::Duration::days(1)),
            Some(Money::from_minor_units(400))
        );
        assert_eq!(history.latest().unwrap().cost, Money::from_minor_units(450));
    }

    proptest! {
        #[test]
        fn cost_at_never_sees_the_future(
            offsets in proptest::collection::vec(0i64..1000, 1..20),
            query in 0i64..1000,
        ) {
            let merchant_id = MerchantId::new();
            let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
            let mut history = ItemCostHistory::new();
            for (i, off) in offsets.iter().enumerate() {
                history.append(obs(merchant_id, i as i64 + 1, t0 + chrono::Duration::hours(*off)));
            }

            let at = t0 + chrono::Duration::hours(query);
            if let Some(cost) = history.cost_at(at) {
                // The resolved cost must belong to some observation not after `at`.
                prop_assert!(history
                    .observations
                    .iter()
                    .any(|o| o.cost == cost && o.observed_at <= at));
            } else {
                prop_assert!(history.observations.iter().all(|o| o.observed_at > at));
            }
        }
    }
}
