use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use leaf_config::{AppConfig, SavedCalibration};
use leaf_imu::{OrientationEngine, PermissionState, ReplayRecord, SimulatedSource};
use leaf_record::{GpsFix, RecordingLog};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Read and parse a session script from disk.
pub fn load_script(path: &Path) -> Result<Vec<ReplayRecord>> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    let records =
        leaf_imu::parse_script(&text).with_context(|| format!("parsing {}", path.display()))?;
    info!(?path, records = records.len(), "Loaded script");
    Ok(records)
}

/// One measurement session: an engine fed by a replayed sensor script.
pub struct Session {
    source: SimulatedSource,
    engine: OrientationEngine<SimulatedSource>,
    log: RecordingLog,
    gps: Option<GpsFix>,
    started_at: NaiveDateTime,
    first_timestamp_ms: Option<f64>,
    default_tag: String,
    calibrated: bool,
}

impl Session {
    pub fn new(config: &AppConfig, started_at: NaiveDateTime) -> Self {
        Self::with_source(config, started_at, SimulatedSource::prompt())
    }

    pub fn with_source(
        config: &AppConfig,
        started_at: NaiveDateTime,
        source: SimulatedSource,
    ) -> Self {
        let engine = OrientationEngine::new(source.clone(), (&config.motion).into());
        if let Some(saved) = config.calibration {
            engine.set_offsets(saved.into());
        }
        Self {
            source,
            engine,
            log: RecordingLog::new(),
            gps: None,
            started_at,
            first_timestamp_ms: None,
            default_tag: config.export.default_tag.clone(),
            calibrated: false,
        }
    }

    /// Ask for sensor permission and attach the engine.
    pub fn start(&self) -> Result<()> {
        if self.engine.permission() == PermissionState::Prompt {
            self.engine.request_permission()?;
        }
        self.engine.start()?;
        Ok(())
    }

    pub fn apply(&mut self, record: &ReplayRecord) {
        self.first_timestamp_ms.get_or_insert(record.timestamp_ms());
        match record {
            ReplayRecord::Orientation(event) => self.source.emit_orientation(*event),
            ReplayRecord::Motion(event) => self.source.emit_motion(*event),
            ReplayRecord::Calibrate { .. } => {
                self.engine.calibrate();
                self.calibrated = true;
            }
            ReplayRecord::Gps {
                latitude,
                longitude,
                altitude_m,
                ..
            } => {
                self.gps = Some(GpsFix {
                    latitude: *latitude,
                    longitude: *longitude,
                    altitude_m: *altitude_m,
                });
            }
            ReplayRecord::Record { timestamp_ms, tag } => {
                let tag = if tag.is_empty() {
                    self.default_tag.as_str()
                } else {
                    tag.as_str()
                };
                let timestamp = self.wall_clock(*timestamp_ms);
                let snapshot = self.engine.snapshot();
                self.log.record(timestamp, tag, snapshot, self.gps);
            }
        }
    }

    /// Session start plus the replay offset of `timestamp_ms`.
    fn wall_clock(&self, timestamp_ms: f64) -> NaiveDateTime {
        let offset_ms = timestamp_ms - self.first_timestamp_ms.unwrap_or(timestamp_ms);
        if !offset_ms.is_finite() || offset_ms <= 0.0 {
            return self.started_at;
        }
        chrono::Duration::try_milliseconds(offset_ms.round() as i64)
            .and_then(|offset| self.started_at.checked_add_signed(offset))
            .unwrap_or(self.started_at)
    }

    pub fn engine(&self) -> &OrientationEngine<SimulatedSource> {
        &self.engine
    }

    pub fn log(&self) -> &RecordingLog {
        &self.log
    }

    /// Detach the engine. Returns the offsets to persist if this session
    /// calibrated.
    pub fn finish(self) -> (RecordingLog, Option<SavedCalibration>) {
        self.engine.stop();
        let calibration = self
            .calibrated
            .then(|| SavedCalibration::from(self.engine.offsets()));
        info!(recordings = self.log.len(), "Session finished");
        (self.log, calibration)
    }
}

/// Feed `records` into the session. With `realtime`, waits out the gaps
/// between record timestamps and stops early on Ctrl-C. Returns the number
/// of records applied.
pub async fn replay(session: &mut Session, records: &[ReplayRecord], realtime: bool) -> usize {
    replay_until(session, records, realtime, tokio::signal::ctrl_c()).await
}

/// Like [`replay`], but a paced replay ends when `interrupt` completes.
pub async fn replay_until<F: Future>(
    session: &mut Session,
    records: &[ReplayRecord],
    realtime: bool,
    interrupt: F,
) -> usize {
    tokio::pin!(interrupt);

    let mut previous_ms: Option<f64> = None;
    for (applied, record) in records.iter().enumerate() {
        if realtime {
            if let Some(previous) = previous_ms {
                let wait = (record.timestamp_ms() - previous).max(0.0) / 1000.0;
                let wait = Duration::try_from_secs_f64(wait).unwrap_or_default();
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = &mut interrupt => {
                        warn!(applied, "Interrupted, ending replay");
                        return applied;
                    }
                }
            }
            previous_ms = Some(record.timestamp_ms());
        }
        session.apply(record);
    }
    records.len()
}
