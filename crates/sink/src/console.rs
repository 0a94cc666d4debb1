//! Console sink: one record per line.
//!
//! Writes run on the blocking pool so a stalled stdout pipe holds a blocking
//! thread, never a runtime worker shared with other watch loops.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kubewatch_core::DeliveryError;

use crate::Sink;

const NAME: &str = "console";

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

pub struct ConsoleSink {
    out: SharedWriter,
    written: AtomicU64,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        Self::with_writer(io::stdout())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self { out: Arc::new(Mutex::new(Box::new(writer))), written: AtomicU64::new(0) }
    }

    /// Lines written successfully so far.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

fn write_line(out: &SharedWriter, line: &str) -> io::Result<()> {
    // a poisoned lock only means another writer panicked mid-line
    let mut out = out.lock().unwrap_or_else(|p| p.into_inner());
    writeln!(out, "{line}")?;
    out.flush()
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn write(&self, line: &str) -> Result<(), DeliveryError> {
        let out = Arc::clone(&self.out);
        let line = line.to_owned();
        let res = tokio::task::spawn_blocking(move || write_line(&out, &line))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)));
        res.map_err(|source| DeliveryError::Io { sink: NAME, source })?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
