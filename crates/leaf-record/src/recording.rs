use chrono::NaiveDateTime;
use leaf_imu::Snapshot;
use serde::{Deserialize, Serialize};

/// GPS fix supplied by the host, independent of the engine's position estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: Option<f64>,
}

/// One immutable observation: engine snapshot plus collaborator metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub timestamp: NaiveDateTime,
    pub tag: String,
    #[serde(flatten)]
    pub snapshot: Snapshot,
    pub gps: Option<GpsFix>,
}

/// Ordered recordings of a measurement session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingLog {
    recordings: Vec<Recording>,
}

impl RecordingLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a recording and return its 1-based observation number.
    pub fn record(
        &mut self,
        timestamp: NaiveDateTime,
        tag: impl Into<String>,
        snapshot: Snapshot,
        gps: Option<GpsFix>,
    ) -> usize {
        let recording = Recording {
            timestamp,
            tag: tag.into(),
            snapshot,
            gps,
        };
        tracing::info!(
            obs = self.recordings.len() + 1,
            tag = %recording.tag,
            zenith = recording.snapshot.orientation.zenith,
            azimuth = recording.snapshot.orientation.azimuth,
            "Recorded observation"
        );
        self.recordings.push(recording);
        self.recordings.len()
    }

    pub fn len(&self) -> usize {
        self.recordings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recordings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recording> {
        self.recordings.iter()
    }

    pub fn last(&self) -> Option<&Recording> {
        self.recordings.last()
    }

    pub fn clear(&mut self) {
        self.recordings.clear();
    }
}

impl<'a> IntoIterator for &'a RecordingLog {
    type Item = &'a Recording;
    type IntoIter = std::slice::Iter<'a, Recording>;

    fn into_iter(self) -> Self::IntoIter {
        self.recordings.iter()
    }
}
