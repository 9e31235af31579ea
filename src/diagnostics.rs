// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Injectable sink for dumping payloads the connector failed to decode,
//! so a malformed packet can be inspected after the fact instead of only
//! being logged and discarded.

use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::cfg::logger::perform_save_to_file;

/// Receives raw bytes the connector could not make sense of. Called from
/// hot transport read loops, so implementations must not block; the
/// bundled [`FileDumpSink`] spawns the actual write.
pub trait PayloadDumpSink: Send + Sync {
    fn dump(&self, payload: &[u8]);
}

/// Writes each dumped payload to its own file under a configured
/// directory, named by a monotonic counter.
pub struct FileDumpSink {
    dir: PathBuf,
    counter: AtomicU64,
}

impl FileDumpSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            counter: AtomicU64::new(0),
        }
    }
}

impl PayloadDumpSink for FileDumpSink {
    fn dump(&self, payload: &[u8]) {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("malformed-payload-{seq}.bin"));
        let content = payload.to_vec();
        tokio::spawn(async move {
            if let Err(e) = perform_save_to_file(&path, &content).await {
                tracing::warn!("failed to dump malformed payload to {path:?}: {e}");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_distinct_files_per_call() {
        let dir = std::env::temp_dir().join(format!(
            "roomdb-dump-test-{}",
            std::process::id()
        ));
        let sink = FileDumpSink::new(&dir);
        sink.dump(b"one");
        sink.dump(b"two");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let first = tokio::fs::read(dir.join("malformed-payload-0.bin"))
            .await
            .expect("first dump written");
        let second = tokio::fs::read(dir.join("malformed-payload-1.bin"))
            .await
            .expect("second dump written");
        assert_eq!(first, b"one");
        assert_eq!(second, b"two");

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
