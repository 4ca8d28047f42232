//! Moves the budget of missing metrics onto available siblings.

use crate::domain::score::{ForfeitedBudget, MetricId, RedistributionEntry, Transfer};
use std::collections::{BTreeMap, BTreeSet};

/// Designated recipients of a metric's budget and their relative shares.
pub fn recipients(metric: MetricId) -> &'static [(MetricId, f64)] {
    use MetricId::*;
    match metric {
        A1 => &[(A3, 1.0)],
        A2 => &[(A1, 1.0)],
        A3 => &[(A1, 1.0)],
        B1 => &[(B3, 1.0)],
        B2 => &[(B3, 1.0)],
        B3 => &[(B1, 1.0)],
        C1 => &[(B1, 0.5), (D1, 0.5)],
        C2 => &[(B3, 1.0)],
        D1 => &[(D2, 1.0)],
        D2 => &[(D1, 1.0)],
        D3 => &[(D1, 1.0)],
        D4 => &[(D1, 1.0)],
        E1 => &[(E3, 1.0)],
        E2 => &[(E3, 1.0)],
        E3 => &[],
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// Points each available metric receives on top of its base budget.
    pub received: BTreeMap<MetricId, f64>,
    pub log: Vec<RedistributionEntry>,
    pub forfeited: Vec<ForfeitedBudget>,
}

impl Plan {
    pub fn received(&self, metric: MetricId) -> f64 {
        self.received.get(&metric).copied().unwrap_or(0.0)
    }

    pub fn effective_max(&self, metric: MetricId) -> f64 {
        metric.base_points() + self.received(metric)
    }
}

/// Builds the transfer plan for the given missing metrics (with reasons).
///
/// Only the missing metric's own base budget moves; a designated recipient
/// that is itself missing has its share re-split over the remaining ones.
pub fn plan(missing: &BTreeMap<MetricId, String>) -> Plan {
    let missing_ids: BTreeSet<MetricId> = missing.keys().copied().collect();
    let mut out = Plan::default();

    for (&metric, reason) in missing {
        let budget = metric.base_points();
        let available: Vec<(MetricId, f64)> = recipients(metric)
            .iter()
            .copied()
            .filter(|(to, _)| !missing_ids.contains(to))
            .collect();

        if available.is_empty() {
            out.forfeited.push(ForfeitedBudget {
                metric_id: metric,
                points: budget,
                reason: reason.clone(),
            });
            continue;
        }

        let share_total: f64 = available.iter().map(|(_, s)| s).sum();
        let mut transfers = Vec::with_capacity(available.len());
        let mut assigned = 0.0;
        for (i, (to, share)) in available.iter().enumerate() {
            // The last recipient takes the remainder so transfers sum to the budget exactly.
            let points = if i + 1 == available.len() {
                budget - assigned
            } else {
                budget * share / share_total
            };
            assigned += points;
            *out.received.entry(*to).or_insert(0.0) += points;
            transfers.push(Transfer { to: *to, points });
        }

        out.log.push(RedistributionEntry {
            metric_id: metric,
            reason: reason.clone(),
            points_redistributed: budget,
            transfers,
        });
    }
    out
}

/// Rescales an award earned against the base budget onto the effective budget.
pub fn rescale(award: f64, base: f64, effective_max: f64) -> f64 {
    if base <= 0.0 {
        return 0.0;
    }
    (award * effective_max / base).clamp(0.0, effective_max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::score::MetricId::*;

    fn missing(ids: &[MetricId]) -> BTreeMap<MetricId, String> {
        ids.iter().map(|m| (*m, "no data".to_string())).collect()
    }

    #[test]
    fn splits_trend_budget_between_margin_and_liquidity() {
        let p = plan(&missing(&[C1]));
        assert_eq!(p.received(B1), 5.0);
        assert_eq!(p.received(D1), 5.0);
        assert_eq!(p.log.len(), 1);
        assert_eq!(p.log[0].points_redistributed, 10.0);
    }

    #[test]
    fn missing_recipient_share_goes_to_the_rest() {
        let p = plan(&missing(&[C1, D1]));
        let c1 = p.log.iter().find(|e| e.metric_id == C1).unwrap();
        assert_eq!(c1.transfers, vec![Transfer { to: B1, points: 10.0 }]);
        // D1 itself folds into D2.
        assert_eq!(p.received(D2), 8.0);
        assert_eq!(p.effective_max(B1), 20.0);
    }

    #[test]
    fn budget_is_forfeited_without_available_recipients() {
        let p = plan(&missing(&[A2, A1]));
        // A2's only recipient is missing; A1 still reaches A3.
        assert_eq!(p.forfeited.len(), 1);
        assert_eq!(p.forfeited[0].metric_id, A2);
        assert_eq!(p.received(A3), 15.0);
    }

    #[test]
    fn transfers_always_sum_to_budget() {
        let all: Vec<MetricId> = MetricId::ALL.to_vec();
        for skip in 0..all.len() {
            let subset: Vec<MetricId> = all
                .iter()
                .copied()
                .enumerate()
                .filter(|(i, _)| i % (skip + 2) == 0)
                .map(|(_, m)| m)
                .collect();
            for entry in plan(&missing(&subset)).log {
                let sum: f64 = entry.transfers.iter().map(|t| t.points).sum();
                assert_eq!(sum, entry.metric_id.base_points());
            }
        }
    }

    #[test]
    fn rescale_never_exceeds_effective_max() {
        assert_eq!(rescale(12.0, 15.0, 25.0), 20.0);
        assert_eq!(rescale(15.0, 15.0, 25.0), 25.0);
        assert_eq!(rescale(0.0, 7.0, 20.0), 0.0);
    }
}
