//! Precomputed simulation datasets keyed by proportional gain
//!
//! The archive is a single JSON object mapping `"kp<gain>"` to either a
//! `{p, i, d, frames}` bundle or a bare frame array. Entries that fail to
//! parse are skipped and reported; the rest of the archive still loads.

use serde::Deserialize;
use serde_json::{Map, Value};

use super::frame::{Frame, Gains};
use crate::error::PlaybackError;

/// Key prefix used by the archive
pub const GAIN_KEY_PREFIX: &str = "kp";

/// One prerecorded frame sequence
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationDataset {
    /// Proportional gain parsed from the archive key
    pub gain_key: f64,
    /// Gains recorded alongside the frames, when the archive carries them
    pub gains: Option<Gains>,
    pub frames: Vec<Frame>,
}

impl SimulationDataset {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ArchiveEntry {
    Bundle {
        #[serde(default)]
        p: Option<f64>,
        #[serde(default)]
        i: Option<f64>,
        #[serde(default)]
        d: Option<f64>,
        frames: Vec<Frame>,
    },
    Frames(Vec<Frame>),
}

/// Outcome of loading an archive
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    /// Entries that were skipped, each as a `MalformedDatasetEntry`
    pub skipped: Vec<PlaybackError>,
}

/// In-memory gain -> dataset map, read-only once loaded
#[derive(Debug, Clone, Default)]
pub struct SimulationCatalog {
    /// Kept in archive iteration order; nearest-match ties go to the earlier entry
    datasets: Vec<SimulationDataset>,
}

impl SimulationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an archive from JSON text
    pub fn from_json(json: &str) -> Result<(Self, LoadReport), PlaybackError> {
        let raw: Map<String, Value> = serde_json::from_str(json)?;
        Ok(Self::load(raw))
    }

    /// Build a catalog from raw archive entries, skipping malformed ones
    pub fn load<I>(raw: I) -> (Self, LoadReport)
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut catalog = Self::new();
        let mut report = LoadReport::default();

        for (key, value) in raw {
            match parse_entry(&key, value) {
                Ok(dataset) => {
                    catalog.datasets.push(dataset);
                    report.loaded += 1;
                }
                Err(err) => {
                    log::warn!("Skipping simulation entry: {}", err);
                    report.skipped.push(err);
                }
            }
        }

        log::info!(
            "Simulation catalog loaded: {} datasets, {} skipped",
            report.loaded,
            report.skipped.len()
        );
        (catalog, report)
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Stored gains in iteration order
    pub fn gains(&self) -> impl Iterator<Item = f64> + '_ {
        self.datasets.iter().map(|d| d.gain_key)
    }

    pub fn get(&self, index: usize) -> Option<&SimulationDataset> {
        self.datasets.get(index)
    }

    /// Index of the dataset whose gain is closest to `target`
    pub fn nearest_index(&self, target: f64) -> Result<usize, PlaybackError> {
        if self.datasets.is_empty() {
            return Err(PlaybackError::CatalogEmpty);
        }
        if target.is_nan() {
            return Err(PlaybackError::CatalogMiss { gain: target });
        }

        let mut best: Option<(usize, f64)> = None;
        for (index, dataset) in self.datasets.iter().enumerate() {
            let diff = (dataset.gain_key - target).abs();
            match best {
                Some((_, best_diff)) if diff >= best_diff => {}
                _ => best = Some((index, diff)),
            }
        }

        best.map(|(index, _)| index)
            .ok_or(PlaybackError::CatalogMiss { gain: target })
    }

    /// Dataset whose gain is closest to `target`
    pub fn find_nearest(&self, target: f64) -> Result<&SimulationDataset, PlaybackError> {
        let index = self.nearest_index(target)?;
        Ok(&self.datasets[index])
    }
}

fn parse_entry(key: &str, value: Value) -> Result<SimulationDataset, PlaybackError> {
    let malformed = |reason: String| PlaybackError::MalformedDatasetEntry {
        key: key.to_string(),
        reason,
    };

    let gain_key = key
        .strip_prefix(GAIN_KEY_PREFIX)
        .ok_or_else(|| malformed(format!("key does not start with {GAIN_KEY_PREFIX:?}")))?
        .parse::<f64>()
        .map_err(|e| malformed(e.to_string()))?;
    if !gain_key.is_finite() {
        return Err(malformed("gain is not finite".to_string()));
    }

    let entry: ArchiveEntry =
        serde_json::from_value(value).map_err(|e| malformed(e.to_string()))?;

    let (gains, frames) = match entry {
        ArchiveEntry::Bundle { p, i, d, frames } => {
            let gains = match (p, i, d) {
                (Some(p), Some(i), Some(d)) => Some(Gains::new(p, i, d)),
                _ => None,
            };
            (gains, frames)
        }
        ArchiveEntry::Frames(frames) => (None, frames),
    };

    Ok(SimulationDataset {
        gain_key,
        gains,
        frames,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(keys: &[&str]) -> Vec<(String, Value)> {
        keys.iter()
            .enumerate()
            .map(|(n, key)| {
                (
                    key.to_string(),
                    json!({ "frames": [{ "m": n as f32, "s": 700.0 }] }),
                )
            })
            .collect()
    }

    #[test]
    fn test_find_nearest_picks_smallest_difference() {
        let (catalog, report) = SimulationCatalog::load(entries(&["kp0.00", "kp0.03", "kp0.10"]));
        assert_eq!(report.loaded, 3);

        let dataset = catalog.find_nearest(0.07).unwrap();
        assert_eq!(dataset.gain_key, 0.10);
        assert_eq!(catalog.find_nearest(0.01).unwrap().gain_key, 0.00);
        assert_eq!(catalog.find_nearest(5.0).unwrap().gain_key, 0.10);
    }

    #[test]
    fn test_find_nearest_tie_goes_to_first() {
        let (catalog, _) = SimulationCatalog::load(entries(&["kp0.5", "kp1.5"]));
        assert_eq!(catalog.find_nearest(1.0).unwrap().gain_key, 0.5);

        let (catalog, _) = SimulationCatalog::load(entries(&["kp1.5", "kp0.5"]));
        assert_eq!(catalog.find_nearest(1.0).unwrap().gain_key, 1.5);
    }

    #[test]
    fn test_empty_catalog_reports_no_data() {
        let catalog = SimulationCatalog::new();
        assert!(matches!(
            catalog.find_nearest(0.05),
            Err(PlaybackError::CatalogEmpty)
        ));
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let raw = vec![
            ("kp0.02".to_string(), json!({ "p": 0.02, "i": 0.0, "d": 1.0, "frames": [] })),
            ("kpabc".to_string(), json!([])),
            ("speed1".to_string(), json!([])),
            ("kp0.04".to_string(), json!({ "frames": "nope" })),
            ("kp0.06".to_string(), json!([{ "m": 1, "s": null }])),
        ];
        let (catalog, report) = SimulationCatalog::load(raw);

        assert_eq!(catalog.len(), 2);
        assert_eq!(report.loaded, 2);
        assert_eq!(report.skipped.len(), 3);
        assert!(report
            .skipped
            .iter()
            .all(|e| matches!(e, PlaybackError::MalformedDatasetEntry { .. })));

        let bundle = catalog.find_nearest(0.02).unwrap();
        assert_eq!(bundle.gains, Some(Gains::new(0.02, 0.0, 1.0)));
        let bare = catalog.find_nearest(0.06).unwrap();
        assert_eq!(bare.gains, None);
        assert_eq!(bare.frames, vec![Frame::lost(1.0)]);
    }

    #[test]
    fn test_from_json() {
        let json = r#"{
            "kp0.03": { "p": 0.03, "i": 0.000001, "d": 10, "frames": [{ "m": 0, "s": 850 }] },
            "kp0.10": { "frames": [] }
        }"#;
        let (catalog, report) = SimulationCatalog::from_json(json).unwrap();
        assert_eq!(report.loaded, 2);
        assert!(report.skipped.is_empty());
        assert_eq!(catalog.gains().collect::<Vec<_>>(), vec![0.03, 0.10]);
        assert_eq!(catalog.get(0).unwrap().frames[0], Frame::detected(0.0, 850.0));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(matches!(
            SimulationCatalog::from_json("[1, 2]"),
            Err(PlaybackError::Json(_))
        ));
    }
}
