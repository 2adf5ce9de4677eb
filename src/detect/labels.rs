use anyhow::{anyhow, Result};
use std::collections::{BTreeMap, HashMap};

use super::result::{Detection, Label, RawDetection};

/// Raw class id -> label mapping declared by each model.
///
/// Models disagree on which id means fire: some export `0 = fire, 1 = smoke`,
/// others the reverse. The mapping travels with the model definition so the
/// pipeline never has to guess.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassMap {
    labels: BTreeMap<u32, Label>,
}

impl ClassMap {
    pub fn new(entries: impl IntoIterator<Item = (u32, Label)>) -> Self {
        Self {
            labels: entries.into_iter().collect(),
        }
    }

    /// `0 = fire, 1 = smoke`.
    pub fn fire_first() -> Self {
        Self::new([(0, Label::Fire), (1, Label::Smoke)])
    }

    /// `0 = smoke, 1 = fire`.
    pub fn smoke_first() -> Self {
        Self::new([(0, Label::Smoke), (1, Label::Fire)])
    }

    /// Build from the config representation (`{"0": "fire", "1": "smoke"}`).
    pub fn from_config(raw: &HashMap<String, String>) -> Result<Self> {
        if raw.is_empty() {
            return Err(anyhow!("class map must declare at least one class"));
        }
        let mut labels = BTreeMap::new();
        for (id, label) in raw {
            let id: u32 = id
                .trim()
                .parse()
                .map_err(|_| anyhow!("class id '{}' is not an integer", id))?;
            labels.insert(id, label.parse()?);
        }
        Ok(Self { labels })
    }

    pub fn label_for(&self, class_id: u32) -> Option<Label> {
        self.labels.get(&class_id).copied()
    }

    /// Apply the mapping. Classes the model does not declare are dropped.
    pub fn apply(&self, raw: &[RawDetection]) -> Vec<Detection> {
        raw.iter()
            .filter_map(|det| {
                let label = self.label_for(det.class_id);
                if label.is_none() {
                    log::debug!("dropping detection with undeclared class id {}", det.class_id);
                }
                label.map(|label| Detection {
                    bbox: det.bbox,
                    label,
                    confidence: unit_confidence(det.confidence),
                })
            })
            .collect()
    }
}

/// Clamp to [0, 1]; NaN and infinities count as no confidence.
fn unit_confidence(raw: f32) -> f32 {
    if raw.is_finite() {
        raw.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn raw(class_id: u32, confidence: f32) -> RawDetection {
        RawDetection {
            bbox: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            class_id,
            confidence,
        }
    }

    #[test]
    fn same_raw_class_maps_differently_per_model() {
        let detections = [raw(0, 0.9)];
        let a = ClassMap::fire_first().apply(&detections);
        let b = ClassMap::smoke_first().apply(&detections);
        assert_eq!(a[0].label, Label::Fire);
        assert_eq!(b[0].label, Label::Smoke);
    }

    #[test]
    fn undeclared_classes_are_dropped() {
        let map = ClassMap::new([(3, Label::Fire)]);
        let out = map.apply(&[raw(0, 0.5), raw(3, 0.7)]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, Label::Fire);
    }

    #[test]
    fn from_config_parses_ids_and_labels() -> Result<()> {
        let raw: HashMap<String, String> = [("0".into(), "smoke".into()), ("1".into(), "FIRE".into())]
            .into_iter()
            .collect();
        assert_eq!(ClassMap::from_config(&raw)?, ClassMap::smoke_first());
        Ok(())
    }

    #[test]
    fn from_config_rejects_bad_entries() {
        let empty = HashMap::new();
        assert!(ClassMap::from_config(&empty).is_err());
        let bad_id: HashMap<String, String> = [("x".into(), "fire".into())].into_iter().collect();
        assert!(ClassMap::from_config(&bad_id).is_err());
        let bad_label: HashMap<String, String> =
            [("0".into(), "person".into())].into_iter().collect();
        assert!(ClassMap::from_config(&bad_label).is_err());
    }

    #[test]
    fn confidence_is_clamped() {
        let out = ClassMap::fire_first().apply(&[raw(0, 1.4)]);
        assert_eq!(out[0].confidence, 1.0);
    }

    #[test]
    fn non_finite_confidence_counts_as_zero() {
        let out = ClassMap::fire_first().apply(&[
            raw(0, f32::NAN),
            raw(0, f32::INFINITY),
            raw(0, f32::NEG_INFINITY),
        ]);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|d| d.confidence == 0.0));
    }
}
