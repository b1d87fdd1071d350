//! Invocation logging sinks.
//!
//! Two sinks, combinable: an append-only NDJSON file (one JSON object per
//! line, flushed after every write) and a per-invocation directory
//! (`{replay_id}.json`). The NDJSON file is serialized by a mutex so
//! concurrent invocations produce whole lines.

use crate::record::InvocationRecord;
use crossbar_core::settings::ToolsLogMode;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub struct InvocationLog {
    ndjson: Option<Mutex<File>>,
    ndjson_path: Option<PathBuf>,
    per_file_dir: Option<PathBuf>,
}

impl InvocationLog {
    /// Open the configured sinks, creating parent directories as needed.
    pub fn open(
        mode: ToolsLogMode,
        ndjson_path: &Path,
        per_file_dir: &Path,
    ) -> std::io::Result<Self> {
        let ndjson = if matches!(mode, ToolsLogMode::Ndjson | ToolsLogMode::Both) {
            if let Some(parent) = ndjson_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(ndjson_path)?;
            Some(Mutex::new(file))
        } else {
            None
        };

        let dir = if matches!(mode, ToolsLogMode::PerFile | ToolsLogMode::Both) {
            std::fs::create_dir_all(per_file_dir)?;
            Some(per_file_dir.to_path_buf())
        } else {
            None
        };

        Ok(Self {
            ndjson_path: ndjson.as_ref().map(|_| ndjson_path.to_path_buf()),
            ndjson,
            per_file_dir: dir,
        })
    }

    /// A log that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            ndjson: None,
            ndjson_path: None,
            per_file_dir: None,
        }
    }

    /// Retrieve a past invocation by replay ID.
    ///
    /// The per-invocation directory is checked first (a direct filename
    /// hit); the NDJSON file is scanned as a fallback. `None` means no
    /// sink has a record under that ID.
    pub fn lookup(&self, replay_id: &str) -> std::io::Result<Option<InvocationRecord>> {
        if let Some(dir) = &self.per_file_dir {
            let path = dir.join(format!("{replay_id}.json"));
            match std::fs::read_to_string(&path) {
                Ok(raw) => return Ok(serde_json::from_str(&raw).ok()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(path) = &self.ndjson_path {
            // Flush pending appends so a just-logged record is visible.
            if let Some(file) = &self.ndjson {
                let mut guard = file.lock().unwrap_or_else(|e| e.into_inner());
                guard.flush()?;
            }
            let content = std::fs::read_to_string(path)?;
            for line in content.lines() {
                if let Ok(record) = serde_json::from_str::<InvocationRecord>(line) {
                    if record.replay_id == replay_id {
                        return Ok(Some(record));
                    }
                }
            }
        }

        Ok(None)
    }

    /// Append one record to every configured sink.
    pub fn append(&self, record: &InvocationRecord) -> std::io::Result<()> {
        let json = serde_json::to_string(record)?;

        if let Some(file) = &self.ndjson {
            let mut guard = file.lock().unwrap_or_else(|e| e.into_inner());
            guard.write_all(json.as_bytes())?;
            guard.write_all(b"\n")?;
            guard.flush()?;
        }

        if let Some(dir) = &self.per_file_dir {
            let path = dir.join(format!("{}.json", record.replay_id));
            std::fs::write(path, &json)?;
        }

        debug!(replay_id = %record.replay_id, tool = %record.tool_name, "invocation logged");
        Ok(())
    }
}
