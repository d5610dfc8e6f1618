//! Accumulator state for points with an `accumulate` rule
//!
//! Values are keyed by point code and aggregation window key (`total`,
//! `2025-01-31T14`, `2025-01-31`, `2025-01`). Entering a new window starts
//! from no value and drops the point's older windows.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use acq_model::{AccumulateRule, ActionParam, AggregationWindow, PointCode};

use crate::actions::{accumulated_difference, apply_action};
use crate::condition::evaluate_condition;

/// Key of the window containing `at`
pub fn window_key(window: AggregationWindow, at: DateTime<Utc>) -> String {
    match window {
        AggregationWindow::Total => "total".to_string(),
        AggregationWindow::Hour => at.format("%Y-%m-%dT%H").to_string(),
        AggregationWindow::Day => at.format("%Y-%m-%d").to_string(),
        AggregationWindow::Month => at.format("%Y-%m").to_string(),
    }
}

/// In-memory accumulator store shared by all poll loops
#[derive(Debug, Default)]
pub struct Accumulator {
    values: DashMap<(PointCode, String), f64>,
    last_readings: DashMap<PointCode, f64>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current accumulated value of a point in the window containing `at`
    pub fn current(
        &self,
        point: PointCode,
        window: AggregationWindow,
        at: DateTime<Utc>,
    ) -> Option<f64> {
        let key = (point, window_key(window, at));
        self.values.get(&key).map(|v| *v)
    }

    /// Feed one reading through `rule`, returning the accumulated value
    ///
    /// When the rule's condition does not hold the accumulator is left as is.
    pub fn apply(
        &self,
        point: PointCode,
        rule: &AccumulateRule,
        value: f64,
        at: DateTime<Utc>,
    ) -> Option<f64> {
        let previous = self.last_readings.insert(point, value);
        let window = window_key(rule.window, at);

        if !self.values.contains_key(&(point, window.clone())) {
            self.values
                .retain(|(code, key), _| *code != point || *key == window);
        }
        let key = (point, window);
        let current = self.values.get(&key).map(|v| *v);

        if let Some(condition) = &rule.condition {
            let outcome = evaluate_condition(value, &condition.operator, condition.value);
            if !outcome.passed() {
                debug!(point, "Accumulation skipped: {}", outcome.message);
                return current;
            }
        }

        let param = match rule.param {
            ActionParam::Reading => Some(value),
            ActionParam::Difference => accumulated_difference(Some(value), previous, false),
            ActionParam::Fixed { value } => Some(value),
        };

        match apply_action(&rule.action, current, param) {
            Some(next) => {
                self.values.insert(key, next);
                Some(next)
            },
            None => {
                self.values.remove(&key);
                None
            },
        }
    }

    /// Drop all state of a point
    pub fn clear_point(&self, point: PointCode) {
        self.values.retain(|(code, _), _| *code != point);
        self.last_readings.remove(&point);
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use acq_model::ConditionRule;
    use chrono::TimeZone;

    fn rule(window: AggregationWindow, action: &str, param: ActionParam) -> AccumulateRule {
        AccumulateRule {
            window,
            action: action.to_string(),
            param,
            condition: None,
        }
    }

    #[test]
    fn test_window_keys() {
        let at = Utc.with_ymd_and_hms(2025, 1, 31, 14, 5, 0).unwrap();
        assert_eq!(window_key(AggregationWindow::Total, at), "total");
        assert_eq!(window_key(AggregationWindow::Hour, at), "2025-01-31T14");
        assert_eq!(window_key(AggregationWindow::Day, at), "2025-01-31");
        assert_eq!(window_key(AggregationWindow::Month, at), "2025-01");
    }

    #[test]
    fn test_increment_by_reading() {
        let acc = Accumulator::new();
        let r = rule(AggregationWindow::Total, "increment", ActionParam::Reading);
        let now = Utc::now();

        assert_eq!(acc.apply(1, &r, 2.0, now), Some(2.0));
        assert_eq!(acc.apply(1, &r, 3.0, now), Some(5.0));
        assert_eq!(acc.current(1, AggregationWindow::Total, now), Some(5.0));
        assert_eq!(acc.current(2, AggregationWindow::Total, now), None);
    }

    #[test]
    fn test_difference_param() {
        let acc = Accumulator::new();
        let r = rule(AggregationWindow::Total, "increment", ActionParam::Difference);
        let now = Utc::now();

        // first reading has no predecessor: counts as zero
        assert_eq!(acc.apply(1, &r, 100.0, now), Some(0.0));
        assert_eq!(acc.apply(1, &r, 104.0, now), Some(4.0));
        assert_eq!(acc.apply(1, &r, 110.0, now), Some(10.0));
    }

    #[test]
    fn test_new_window_starts_empty() {
        let acc = Accumulator::new();
        let r = rule(AggregationWindow::Hour, "increment", ActionParam::Fixed { value: 1.0 });
        let first = Utc.with_ymd_and_hms(2025, 1, 1, 10, 59, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 1, 1, 11, 0, 0).unwrap();

        acc.apply(1, &r, 0.0, first);
        assert_eq!(acc.apply(1, &r, 0.0, first), Some(2.0));
        assert_eq!(acc.apply(1, &r, 0.0, second), Some(1.0));
        assert_eq!(acc.current(1, AggregationWindow::Hour, first), None);
    }

    #[test]
    fn test_condition_gates_action() {
        let acc = Accumulator::new();
        let mut r = rule(AggregationWindow::Total, "increment", ActionParam::Fixed { value: 1.0 });
        r.condition = Some(ConditionRule {
            operator: ">".to_string(),
            value: 10.0,
        });
        let now = Utc::now();

        assert_eq!(acc.apply(1, &r, 5.0, now), None);
        assert_eq!(acc.apply(1, &r, 11.0, now), Some(1.0));
        assert_eq!(acc.apply(1, &r, 9.0, now), Some(1.0));
    }

    #[test]
    fn test_unknown_action_clears_value() {
        let acc = Accumulator::new();
        let now = Utc::now();
        acc.apply(1, &rule(AggregationWindow::Total, "overwrite", ActionParam::Reading), 3.0, now);

        let bogus = rule(AggregationWindow::Total, "explode", ActionParam::Reading);
        assert_eq!(acc.apply(1, &bogus, 3.0, now), None);
        assert_eq!(acc.current(1, AggregationWindow::Total, now), None);

        acc.clear_point(1);
        assert_eq!(acc.apply(1, &rule(AggregationWindow::Total, "keep", ActionParam::Reading), 3.0, now), None);
    }
}
