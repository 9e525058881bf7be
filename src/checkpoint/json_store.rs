use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::checkpoint::{CheckpointRecord, PersistenceBackend, CHECKPOINT_VERSION};
use crate::error::{TrainError, TrainResult};

pub const BEST_FILENAME: &str = "model_best.json";

/// Writes checkpoints as pretty-printed JSON.
///
/// A save goes to `<path>.tmp` first and is renamed into place, so a crash
/// mid-write leaves the previous checkpoint intact. When marked best the
/// file is also copied to `model_best.json` in the same directory.
#[derive(Debug, Default, Clone)]
pub struct JsonCheckpointStore;

impl JsonCheckpointStore {
    pub fn new() -> JsonCheckpointStore {
        JsonCheckpointStore
    }

    /// Where the best copy of `latest` lands.
    pub fn best_path_for(latest: &Path) -> PathBuf {
        latest.with_file_name(BEST_FILENAME)
    }
}

impl PersistenceBackend for JsonCheckpointStore {
    fn save(&mut self, record: &CheckpointRecord, path: &Path, mark_as_best: bool) -> TrainResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, record)?;
            writer.flush()?;
        }
        fs::rename(&tmp, path)?;
        info!("Saving checkpoint: {}", path.display());

        if mark_as_best {
            let best = Self::best_path_for(path);
            fs::copy(path, &best)?;
            info!("Saving current best: {}", best.display());
        }
        Ok(())
    }

    fn load(&self, path: &Path) -> TrainResult<CheckpointRecord> {
        let reader = BufReader::new(File::open(path).map_err(|e| {
            TrainError::Checkpoint(format!("cannot open {}: {e}", path.display()))
        })?);
        let record: CheckpointRecord = serde_json::from_reader(reader)?;
        if record.version != CHECKPOINT_VERSION {
            return Err(TrainError::Checkpoint(format!(
                "{} has version {}, expected {CHECKPOINT_VERSION}",
                path.display(),
                record.version
            )));
        }
        Ok(record)
    }
}
