use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use super::{SensorReading, SensorSource};

/// No sensor hardware; fusion runs vision-only.
pub struct NoSensor;

impl SensorSource for NoSensor {
    fn describe(&self) -> String {
        "none".to_string()
    }

    fn latest(&self) -> Result<Option<SensorReading>> {
        Ok(None)
    }
}

/// Fixed reading from configuration.
pub struct StaticSensor {
    reading: Option<SensorReading>,
}

impl StaticSensor {
    pub fn new(reading: Option<SensorReading>) -> Self {
        Self { reading }
    }
}

impl SensorSource for StaticSensor {
    fn describe(&self) -> String {
        "static".to_string()
    }

    fn latest(&self) -> Result<Option<SensorReading>> {
        Ok(self.reading)
    }
}

/// JSON snapshot on disk, re-read on every poll. A missing file means no data yet.
pub struct FileSensor {
    path: PathBuf,
}

impl FileSensor {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl SensorSource for FileSensor {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn latest(&self) -> Result<Option<SensorReading>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", self.path.display()))
            }
        };
        let reading = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid sensor snapshot {}: {}", self.path.display(), e))?;
        Ok(Some(reading))
    }
}

/// JSON snapshot fetched over HTTP.
pub struct HttpSensor {
    url: String,
    agent: ureq::Agent,
}

impl HttpSensor {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(url).with_context(|| format!("invalid sensor url {}", url))?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(Self {
            url: url.to_string(),
            agent,
        })
    }
}

impl SensorSource for HttpSensor {
    fn describe(&self) -> String {
        format!("http:{}", self.url)
    }

    fn latest(&self) -> Result<Option<SensorReading>> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("fetch {}", self.url))?;
        let reading: SensorReading = response
            .into_json()
            .with_context(|| format!("decode sensor snapshot from {}", self.url))?;
        Ok(Some(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_sensor_rereads_each_poll() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("reading.json");
        let sensor = FileSensor::new(path.clone());
        assert!(sensor.latest()?.is_none());

        let mut file = std::fs::File::create(&path)?;
        file.write_all(br#"{"co":0.01,"humidity":40,"lpg":0.0,"smoke":0.0,"temperature":30}"#)?;
        drop(file);
        assert_eq!(sensor.latest()?.map(|r| r.temperature), Some(30.0));

        std::fs::write(&path, "not json")?;
        assert!(sensor.latest().is_err());
        Ok(())
    }

    #[test]
    fn http_sensor_rejects_bad_url() {
        assert!(HttpSensor::new("not a url", Duration::from_secs(1)).is_err());
    }
}
