//! Accumulator implementations for the numeric aggregate kinds.
//!
//! Every accumulator folds a sequence of `f64` inputs and reports a single
//! result. Empty input reports the neutral element: 0.

use super::AggregateType;

/// A stateful fold over the numeric values of one (group, field) pair
/// within a single window slot.
pub trait AggregateFunction: Send {
    fn add(&mut self, value: f64);
    fn result(&self) -> f64;
}

/// Instantiate a fresh accumulator for a numeric aggregate kind.
///
/// Synthetic kinds carry no accumulator; they are materialized from the
/// slot boundaries by the grouping stage.
pub fn create_aggregator(kind: AggregateType) -> Option<Box<dyn AggregateFunction>> {
    match kind {
        AggregateType::Avg => Some(Box::new(AvgAggregator::default())),
        AggregateType::Sum => Some(Box::new(SumAggregator::default())),
        AggregateType::Min => Some(Box::new(MinAggregator::default())),
        AggregateType::Max => Some(Box::new(MaxAggregator::default())),
        AggregateType::Count => Some(Box::new(CountAggregator::default())),
        AggregateType::WindowStart | AggregateType::WindowEnd => None,
    }
}

#[derive(Default)]
struct AvgAggregator {
    sum: f64,
    count: u64,
}

impl AggregateFunction for AvgAggregator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn result(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

#[derive(Default)]
struct SumAggregator {
    sum: f64,
}

impl AggregateFunction for SumAggregator {
    fn add(&mut self, value: f64) {
        self.sum += value;
    }

    fn result(&self) -> f64 {
        self.sum
    }
}

#[derive(Default)]
struct MinAggregator {
    min: Option<f64>,
}

impl AggregateFunction for MinAggregator {
    fn add(&mut self, value: f64) {
        self.min = Some(match self.min {
            Some(current) => current.min(value),
            None => value,
        });
    }

    fn result(&self) -> f64 {
        self.min.unwrap_or(0.0)
    }
}

#[derive(Default)]
struct MaxAggregator {
    max: Option<f64>,
}

impl AggregateFunction for MaxAggregator {
    fn add(&mut self, value: f64) {
        self.max = Some(match self.max {
            Some(current) => current.max(value),
            None => value,
        });
    }

    fn result(&self) -> f64 {
        self.max.unwrap_or(0.0)
    }
}

#[derive(Default)]
struct CountAggregator {
    count: u64,
}

impl AggregateFunction for CountAggregator {
    fn add(&mut self, _value: f64) {
        self.count += 1;
    }

    fn result(&self) -> f64 {
        self.count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(kind: AggregateType, values: &[f64]) -> f64 {
        let mut agg = create_aggregator(kind).unwrap();
        for v in values {
            agg.add(*v);
        }
        agg.result()
    }

    #[test]
    fn test_numeric_aggregators() {
        assert_eq!(run(AggregateType::Avg, &[15.0, 20.0]), 17.5);
        assert_eq!(run(AggregateType::Sum, &[100.0, 200.0]), 300.0);
        assert_eq!(run(AggregateType::Min, &[5.0, 3.0, 8.0]), 3.0);
        assert_eq!(run(AggregateType::Max, &[5.0, 3.0, 8.0]), 8.0);
        assert_eq!(run(AggregateType::Count, &[1.0, 1.0, 1.0]), 3.0);
    }

    #[test]
    fn test_empty_input_is_neutral() {
        assert_eq!(run(AggregateType::Avg, &[]), 0.0);
        assert_eq!(run(AggregateType::Sum, &[]), 0.0);
        assert_eq!(run(AggregateType::Min, &[]), 0.0);
        assert_eq!(run(AggregateType::Max, &[]), 0.0);
        assert_eq!(run(AggregateType::Count, &[]), 0.0);
    }

    #[test]
    fn test_synthetic_kinds_have_no_accumulator() {
        assert!(create_aggregator(AggregateType::WindowStart).is_none());
        assert!(create_aggregator(AggregateType::WindowEnd).is_none());
    }
}
