//! Scoring Model
//!
//! Reduces the indicator map to one weighted composite score. Only indicators
//! present both in the map and in the weight table count, so a cycle that
//! lost an indicator is scored on the remaining ones.

use crate::error::{Result, SignalError};
use crate::signals;
use crate::types::{Composite, IndicatorId, IndicatorMap};
use std::collections::BTreeMap;

const DEFAULT_WEIGHTS: [(IndicatorId, u32); 14] = [
    (IndicatorId::MvrvApprox, 15),
    (IndicatorId::PuellMultiple, 8),
    (IndicatorId::StockToFlow, 10),
    (IndicatorId::DifficultyRibbon, 5),
    (IndicatorId::HashRate, 3),
    (IndicatorId::FearGreed, 12),
    (IndicatorId::Rsi, 10),
    (IndicatorId::Ma200Position, 10),
    (IndicatorId::Dxy, 7),
    (IndicatorId::Sp500, 3),
    (IndicatorId::HalvingCycle, 7),
    (IndicatorId::BtcDominance, 3),
    (IndicatorId::FundingRate, 4),
    (IndicatorId::LongShortRatio, 3),
];

/// Indicator id → weight. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightTable {
    weights: BTreeMap<IndicatorId, u32>,
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS.into_iter().collect(),
        }
    }
}

impl WeightTable {
    /// Parse `id=weight` pairs separated by commas, e.g. `rsi=10,fear_greed=12`.
    /// The result replaces the default table entirely.
    ///
    /// # Errors
    /// * `Config` - malformed pair, unknown indicator id or non-numeric weight
    pub fn parse(spec: &str) -> Result<Self> {
        let mut weights = BTreeMap::new();

        for pair in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (id, weight) = pair
                .split_once('=')
                .ok_or_else(|| SignalError::Config(format!("Expected id=weight, got '{}'", pair)))?;

            let id: IndicatorId = id.trim().parse()?;
            let weight: u32 = weight
                .trim()
                .parse()
                .map_err(|_| SignalError::Config(format!("Invalid weight for {}: '{}'", id, weight)))?;

            weights.insert(id, weight);
        }

        Ok(Self { weights })
    }

    /// Reject empty tables and zero weights
    pub fn validate(&self) -> Result<()> {
        if self.weights.is_empty() {
            return Err(SignalError::Config("Weight table is empty".into()));
        }

        if let Some((id, _)) = self.weights.iter().find(|(_, w)| **w == 0) {
            return Err(SignalError::Config(format!("Weight for {} must be positive", id)));
        }

        Ok(())
    }

    pub fn weight(&self, id: IndicatorId) -> Option<u32> {
        self.weights.get(&id).copied()
    }

    /// Weighted composite of the signals in `indicators`.
    ///
    /// Each present, weighted indicator contributes `weight × band score`
    /// (strong buy 100 … strong sell 0). The score is the rounded weighted
    /// mean, or 50 when nothing counted.
    pub fn score(&self, indicators: &IndicatorMap) -> Composite {
        let (sum, total) = self
            .weights
            .iter()
            .filter_map(|(id, weight)| indicators.get(id).map(|ind| (ind.signal, *weight)))
            .fold((0u64, 0u64), |(sum, total), (signal, weight)| {
                (
                    sum + u64::from(weight) * u64::from(signal.band_score()),
                    total + u64::from(weight),
                )
            });

        let score = if total == 0 {
            50
        } else {
            (sum as f64 / total as f64).round() as u32
        };

        Composite {
            score,
            signal: signals::composite(score),
        }
    }
}
