use super::{SensorClassifier, SensorReading};

#[derive(Clone, Copy, Debug)]
enum Direction {
    Above,
    Below,
}

#[derive(Clone, Copy, Debug)]
struct Rule {
    direction: Direction,
    limit: f64,
}

impl Rule {
    /// 1.0 when tripped; otherwise a linear ramp that starts halfway to the
    /// limit (or at twice the limit for `Below` rules).
    fn score(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        match self.direction {
            Direction::Above => {
                if value > self.limit {
                    1.0
                } else {
                    let start = self.limit / 2.0;
                    ((value - start) / (self.limit - start)).clamp(0.0, 1.0)
                }
            }
            Direction::Below => {
                if value < self.limit {
                    1.0
                } else {
                    let start = self.limit * 2.0;
                    ((start - value) / (start - self.limit)).clamp(0.0, 1.0)
                }
            }
        }
    }
}

/// Rule-based classifier over the five sensor channels.
///
/// Any tripped rule (co > 0.02, humidity < 30, lpg > 0.01, smoke > 0.03,
/// temperature > 100) yields probability 1.0; otherwise the closest approach to
/// a limit is reported.
#[derive(Clone, Debug)]
pub struct ThresholdClassifier {
    co: Rule,
    humidity: Rule,
    lpg: Rule,
    smoke: Rule,
    temperature: Rule,
}

impl Default for ThresholdClassifier {
    fn default() -> Self {
        Self {
            co: Rule {
                direction: Direction::Above,
                limit: 0.02,
            },
            humidity: Rule {
                direction: Direction::Below,
                limit: 30.0,
            },
            lpg: Rule {
                direction: Direction::Above,
                limit: 0.01,
            },
            smoke: Rule {
                direction: Direction::Above,
                limit: 0.03,
            },
            temperature: Rule {
                direction: Direction::Above,
                limit: 100.0,
            },
        }
    }
}

impl SensorClassifier for ThresholdClassifier {
    fn predict(&self, reading: &SensorReading) -> f64 {
        [
            self.co.score(reading.co),
            self.humidity.score(reading.humidity),
            self.lpg.score(reading.lpg),
            self.smoke.score(reading.smoke),
            self.temperature.score(reading.temperature),
        ]
        .into_iter()
        .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm() -> SensorReading {
        SensorReading {
            co: 0.004,
            humidity: 75.0,
            lpg: 0.002,
            smoke: 0.01,
            temperature: 22.0,
        }
    }

    #[test]
    fn calm_air_scores_zero() {
        assert_eq!(ThresholdClassifier::default().predict(&calm()), 0.0);
    }

    #[test]
    fn any_tripped_rule_is_certain() {
        let classifier = ThresholdClassifier::default();
        let hot = SensorReading {
            temperature: 120.0,
            ..calm()
        };
        let dry = SensorReading {
            humidity: 20.0,
            ..calm()
        };
        assert_eq!(classifier.predict(&hot), 1.0);
        assert_eq!(classifier.predict(&dry), 1.0);
    }

    #[test]
    fn approaching_limit_ramps() {
        let classifier = ThresholdClassifier::default();
        let smoky = SensorReading {
            smoke: 0.0225,
            ..calm()
        };
        let p = classifier.predict(&smoky);
        assert!((p - 0.5).abs() < 1e-9, "got {}", p);
    }
}
