//! Environmental sensor side of the pipeline.
//!
//! - `SensorSource`: where reading snapshots come from (static, file, HTTP).
//! - `SensorClassifier`: maps a snapshot to a fire probability in [0, 1].
//!
//! Both are consulted by the status path; the capture loop only sees the
//! cached result through `SensorCache`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::config::{SensorKind, SensorSettings};

mod classifier;
mod sources;

pub use classifier::ThresholdClassifier;
pub use sources::{FileSensor, HttpSensor, NoSensor, StaticSensor};

/// One snapshot of environmental readings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Carbon monoxide, ppm fraction.
    pub co: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    pub lpg: f64,
    pub smoke: f64,
    /// Degrees as reported by the sensor board.
    #[serde(alias = "temp")]
    pub temperature: f64,
}

/// Supplies the most recent reading snapshot.
pub trait SensorSource: Send + Sync {
    fn describe(&self) -> String;

    /// `Ok(None)` means the source is configured but has nothing yet.
    fn latest(&self) -> Result<Option<SensorReading>>;
}

/// Maps a reading snapshot to a fire probability.
pub trait SensorClassifier: Send + Sync {
    fn predict(&self, reading: &SensorReading) -> f64;
}

/// Most recent sensor confidence (percent) computed by the status path.
/// The capture loop reads it for the on-frame overlay.
#[derive(Debug, Default)]
pub struct SensorCache {
    confidence: Mutex<Option<f64>>,
}

impl SensorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, confidence: Option<f64>) {
        *self
            .confidence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = confidence;
    }

    pub fn get(&self) -> Option<f64> {
        *self
            .confidence
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Build the configured sensor source.
pub fn open_sensor(settings: &SensorSettings) -> Result<Box<dyn SensorSource>> {
    let source: Box<dyn SensorSource> = match settings.kind {
        SensorKind::None => Box::new(NoSensor),
        SensorKind::Static => Box::new(StaticSensor::new(settings.reading)),
        SensorKind::File => {
            let path = settings
                .path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("sensor kind 'file' requires a path"))?;
            Box::new(FileSensor::new(path))
        }
        SensorKind::Http => {
            let url = settings
                .url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("sensor kind 'http' requires a url"))?;
            Box::new(HttpSensor::new(&url, settings.timeout)?)
        }
    };
    log::info!("sensor source: {}", source.describe());
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_accepts_short_temperature_key() -> Result<()> {
        let reading: SensorReading = serde_json::from_str(
            r#"{"co": 0.01, "humidity": 45.0, "lpg": 0.002, "smoke": 0.01, "temp": 22.5}"#,
        )?;
        assert_eq!(reading.temperature, 22.5);
        Ok(())
    }
}
