//! On-disk persistence of model bundles, one JSON file per algorithm.

use super::{Algorithm, ModelBundle};
use crate::error::StoreError;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

static SAVE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `{dir}/{algorithm}_model.json`
    pub fn path_for(&self, algorithm: Algorithm) -> PathBuf {
        self.dir.join(format!("{}_model.json", algorithm.as_str()))
    }

    /// Unique per process and per call, so concurrent saves never share a file.
    fn temp_path(&self, algorithm: Algorithm) -> PathBuf {
        let n = SAVE_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!(
            ".{}_model.json.{}.{n}.tmp",
            algorithm.as_str(),
            std::process::id()
        ))
    }

    pub fn exists(&self, algorithm: Algorithm) -> bool {
        self.path_for(algorithm).is_file()
    }

    pub fn load(&self, algorithm: Algorithm) -> Result<ModelBundle, StoreError> {
        let path = self.path_for(algorithm);
        debug!(path = %path.display(), "Reading model bundle");
        let reader = BufReader::new(File::open(&path)?);
        let bundle = serde_json::from_reader(reader)?;
        info!(%algorithm, path = %path.display(), "Model loaded");
        Ok(bundle)
    }

    /// Write through a temporary sibling and rename it into place, so readers
    /// only ever see a complete file.
    pub fn save(&self, bundle: &ModelBundle) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(bundle.algorithm());
        let tmp = self.temp_path(bundle.algorithm());

        let write = || -> Result<(), StoreError> {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, bundle)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, &path)?;
        info!(algorithm = %bundle.algorithm(), path = %path.display(), "Model saved");
        Ok(path)
    }
}
