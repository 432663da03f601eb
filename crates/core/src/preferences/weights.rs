//! Bounded weight adjustment and renormalization

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ADJUSTMENT_STEP, DEFAULT_WEIGHTS, MAX_WEIGHT, MIN_WEIGHT, WEIGHT_TOLERANCE};
use crate::errors::DomainError;

const PARAMETER_COUNT: usize = 4;

/// One of the four scoring parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Quality,
    Affordability,
    Shipping,
    Reliability,
}

impl Parameter {
    pub const ALL: [Parameter; PARAMETER_COUNT] =
        [Parameter::Quality, Parameter::Affordability, Parameter::Shipping, Parameter::Reliability];

    fn index(self) -> usize {
        match self {
            Self::Quality => 0,
            Self::Affordability => 1,
            Self::Shipping => 2,
            Self::Reliability => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Affordability => "affordability",
            Self::Shipping => "shipping",
            Self::Reliability => "reliability",
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Parameter {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "affordability" | "price" => Ok(Self::Affordability),
            "shipping" | "distance" => Ok(Self::Shipping),
            "reliability" => Ok(Self::Reliability),
            other => Err(DomainError::InvalidWeights(format!(
                "unknown parameter `{other}` (expected quality|affordability|shipping|reliability)"
            ))),
        }
    }
}

/// Direction of operator feedback
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn delta(self) -> f64 {
        match self {
            Self::Up => ADJUSTMENT_STEP,
            Self::Down => -ADJUSTMENT_STEP,
        }
    }
}

impl FromStr for Direction {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "up" | "+" => Ok(Self::Up),
            "down" | "-" => Ok(Self::Down),
            other => Err(DomainError::InvalidWeights(format!(
                "unknown direction `{other}` (expected up|down)"
            ))),
        }
    }
}

/// Operator preference weights. Each lies in `[MIN_WEIGHT, MAX_WEIGHT]` and
/// the four always sum to one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PreferenceWeights {
    pub quality: f64,
    pub affordability: f64,
    pub shipping: f64,
    pub reliability: f64,
}

impl Default for PreferenceWeights {
    fn default() -> Self {
        DEFAULT_WEIGHTS
    }
}

impl PreferenceWeights {
    /// Validated constructor for externally supplied weights.
    pub fn new(
        quality: f64,
        affordability: f64,
        shipping: f64,
        reliability: f64,
    ) -> Result<Self, DomainError> {
        let weights = Self { quality, affordability, shipping, reliability };

        for parameter in Parameter::ALL {
            let value = weights.get(parameter);
            if !value.is_finite()
                || value < MIN_WEIGHT - WEIGHT_TOLERANCE
                || value > MAX_WEIGHT + WEIGHT_TOLERANCE
            {
                return Err(DomainError::InvalidWeights(format!(
                    "{parameter} weight {value} must be in range {MIN_WEIGHT}..={MAX_WEIGHT}"
                )));
            }
        }

        // user-entered weights are usually rounded to two decimals
        if (weights.total() - 1.0).abs() > 1e-6 {
            return Err(DomainError::InvalidWeights(format!(
                "weights must sum to 1.0 (got {:.6})",
                weights.total()
            )));
        }

        Ok(weights)
    }

    pub fn get(&self, parameter: Parameter) -> f64 {
        self.as_array()[parameter.index()]
    }

    pub fn total(&self) -> f64 {
        self.as_array().iter().sum()
    }

    pub fn as_array(&self) -> [f64; PARAMETER_COUNT] {
        [self.quality, self.affordability, self.shipping, self.reliability]
    }

    fn from_array(values: [f64; PARAMETER_COUNT]) -> Self {
        Self {
            quality: values[0],
            affordability: values[1],
            shipping: values[2],
            reliability: values[3],
        }
    }

    /// Move `parameter` one step in `direction`, clamp it to its bounds and
    /// renormalize so the four weights sum to one. Never fails.
    pub fn adjust(&self, parameter: Parameter, direction: Direction) -> Self {
        let mut raw = self.as_array();
        let index = parameter.index();
        raw[index] = (raw[index] + direction.delta()).clamp(MIN_WEIGHT, MAX_WEIGHT);
        Self::from_array(renormalize(raw))
    }

    pub fn is_normalized(&self) -> bool {
        (self.total() - 1.0).abs() <= WEIGHT_TOLERANCE
            && self.as_array().iter().all(|value| {
                *value >= MIN_WEIGHT - WEIGHT_TOLERANCE && *value <= MAX_WEIGHT + WEIGHT_TOLERANCE
            })
    }
}

/// Divide every weight by the total. A weight that would leave its bounds is
/// pinned to the bound and the remainder is shared proportionally among the
/// rest. Without a bound violation this is plain division by the total.
fn renormalize(raw: [f64; PARAMETER_COUNT]) -> [f64; PARAMETER_COUNT] {
    let mut pinned: [Option<f64>; PARAMETER_COUNT] = [None; PARAMETER_COUNT];
    let mut scaled = raw;

    for _ in 0..PARAMETER_COUNT {
        let pinned_total: f64 = pinned.iter().flatten().sum();
        let free_total: f64 =
            raw.iter().zip(pinned.iter()).filter(|(_, pin)| pin.is_none()).map(|(v, _)| v).sum();
        if free_total <= 0.0 {
            break;
        }

        let factor = (1.0 - pinned_total) / free_total;
        let mut violated = false;
        for index in 0..PARAMETER_COUNT {
            if let Some(bound) = pinned[index] {
                scaled[index] = bound;
                continue;
            }
            let value = raw[index] * factor;
            scaled[index] = value;
            if value < MIN_WEIGHT - WEIGHT_TOLERANCE {
                pinned[index] = Some(MIN_WEIGHT);
                violated = true;
            } else if value > MAX_WEIGHT + WEIGHT_TOLERANCE {
                pinned[index] = Some(MAX_WEIGHT);
                violated = true;
            }
        }

        if !violated {
            break;
        }
    }

    scaled
}

/// Audit trail entry for a single adjustment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub parameter: Parameter,
    pub direction: Direction,
    pub vendor_id: Option<String>,
    pub weights_before: PreferenceWeights,
    pub weights_after: PreferenceWeights,
    pub recorded_at: DateTime<Utc>,
}

/// Session-scoped holder of the operator's current weights
#[derive(Clone, Debug, Default)]
pub struct PreferenceEngine {
    weights: PreferenceWeights,
    feedback_count: u32,
}

impl PreferenceEngine {
    pub fn new(weights: PreferenceWeights) -> Self {
        Self { weights, feedback_count: 0 }
    }

    pub fn weights(&self) -> PreferenceWeights {
        self.weights
    }

    pub fn feedback_count(&self) -> u32 {
        self.feedback_count
    }

    /// Apply one operator nudge and return what changed.
    pub fn apply_feedback(
        &mut self,
        parameter: Parameter,
        direction: Direction,
        vendor_id: Option<String>,
    ) -> FeedbackRecord {
        let weights_before = self.weights;
        self.weights = weights_before.adjust(parameter, direction);
        self.feedback_count += 1;

        FeedbackRecord {
            parameter,
            direction,
            vendor_id,
            weights_before,
            weights_after: self.weights,
            recorded_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Direction, Parameter, PreferenceEngine, PreferenceWeights};
    use crate::preferences::{MAX_WEIGHT, MIN_WEIGHT};

    fn assert_invariants(weights: &PreferenceWeights) {
        assert!((weights.total() - 1.0).abs() <= 1e-9, "sum drifted: {weights:?}");
        for value in weights.as_array() {
            assert!(value >= MIN_WEIGHT - 1e-9, "below floor: {weights:?}");
            assert!(value <= MAX_WEIGHT + 1e-9, "above ceiling: {weights:?}");
        }
    }

    #[test]
    fn step_up_renormalizes_by_total() {
        let adjusted = PreferenceWeights::default().adjust(Parameter::Quality, Direction::Up);

        assert!((adjusted.quality - 0.35 / 1.05).abs() < 1e-12);
        assert!((adjusted.affordability - 0.35 / 1.05).abs() < 1e-12);
        assert!((adjusted.shipping - 0.15 / 1.05).abs() < 1e-12);
        assert!((adjusted.reliability - 0.20 / 1.05).abs() < 1e-12);
        assert_invariants(&adjusted);
    }

    #[test]
    fn adjust_does_not_mutate_input() {
        let original = PreferenceWeights::default();
        let _ = original.adjust(Parameter::Shipping, Direction::Down);
        assert_eq!(original, PreferenceWeights::default());
    }

    #[test]
    fn parameter_at_floor_stays_at_floor_when_pushed_down() {
        let mut weights = PreferenceWeights::default();
        for _ in 0..10 {
            weights = weights.adjust(Parameter::Shipping, Direction::Down);
        }
        assert!((weights.shipping - MIN_WEIGHT).abs() < 1e-9);
        assert_invariants(&weights);
    }

    #[test]
    fn repeated_up_converges_to_ceiling() {
        let mut weights = PreferenceWeights::default();
        for _ in 0..40 {
            weights = weights.adjust(Parameter::Affordability, Direction::Up);
            assert_invariants(&weights);
        }
        assert!((weights.affordability - MAX_WEIGHT).abs() < 1e-6);
    }

    #[test]
    fn invariants_hold_over_long_pseudo_random_sequences() {
        let mut state: u64 = 0x5eed_1234_abcd_0001;
        let mut weights = PreferenceWeights::default();

        for _ in 0..5_000 {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let parameter = Parameter::ALL[(state >> 33) as usize % 4];
            let direction = if (state >> 17) & 1 == 0 { Direction::Up } else { Direction::Down };
            weights = weights.adjust(parameter, direction);
            assert_invariants(&weights);
        }
    }

    #[test]
    fn validated_constructor_rejects_out_of_range_and_unnormalized() {
        assert!(PreferenceWeights::new(0.30, 0.35, 0.15, 0.20).is_ok());
        assert!(PreferenceWeights::new(0.70, 0.10, 0.10, 0.10).is_err());
        assert!(PreferenceWeights::new(0.30, 0.30, 0.30, 0.30).is_err());
        assert!(PreferenceWeights::new(f64::NAN, 0.35, 0.15, 0.20).is_err());
    }

    #[test]
    fn parses_parameters_and_directions() {
        assert_eq!("Quality".parse::<Parameter>().ok(), Some(Parameter::Quality));
        assert_eq!("price".parse::<Parameter>().ok(), Some(Parameter::Affordability));
        assert!("speed".parse::<Parameter>().is_err());
        assert_eq!("down".parse::<Direction>().ok(), Some(Direction::Down));
    }

    #[test]
    fn engine_records_before_and_after() {
        let mut engine = PreferenceEngine::default();
        let record =
            engine.apply_feedback(Parameter::Reliability, Direction::Up, Some("v-7".to_string()));

        assert_eq!(record.weights_before, PreferenceWeights::default());
        assert_eq!(record.weights_after, engine.weights());
        assert!(record.weights_after.reliability > record.weights_before.reliability);
        assert_eq!(engine.feedback_count(), 1);
    }
}
