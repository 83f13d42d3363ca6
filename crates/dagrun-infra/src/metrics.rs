//! JSON-lines metrics sink.
//!
//! Appends one `MetricsRecord` per logged batch to a file, so metrics from
//! every run can be inspected or loaded by external tooling. Appends happen
//! on a background writer task; `record` only serializes and enqueues.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use dagrun_core::metrics::{MetricsRecord, MetricsSink};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

enum WriterMsg {
    Line(Vec<u8>),
    Flush(oneshot::Sender<std::io::Result<()>>),
}

/// Appends metrics batches to a `.jsonl` file.
#[derive(Debug)]
pub struct JsonlMetricsSink {
    path: PathBuf,
    tx: mpsc::UnboundedSender<WriterMsg>,
}

impl JsonlMetricsSink {
    /// Open (or create) the file for appending and start its writer task.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_lines(path.clone(), file, rx));
        Ok(Self { path, tx })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until every batch recorded so far has reached the file.
    pub async fn flush(&self) -> std::io::Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(WriterMsg::Flush(done_tx))
            .map_err(|_| writer_stopped())?;
        done_rx.await.map_err(|_| writer_stopped())?
    }
}

fn writer_stopped() -> std::io::Error {
    std::io::Error::other("metrics writer stopped")
}

async fn write_lines(
    path: PathBuf,
    mut file: tokio::fs::File,
    mut rx: mpsc::UnboundedReceiver<WriterMsg>,
) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WriterMsg::Line(line) => {
                if let Err(err) = file.write_all(&line).await {
                    tracing::warn!(path = %path.display(), error = %err, "failed to append metrics batch");
                }
            }
            WriterMsg::Flush(done) => {
                let _ = done.send(file.flush().await);
            }
        }
    }
    // Sink dropped.
    if let Err(err) = file.flush().await {
        tracing::warn!(path = %path.display(), error = %err, "failed to flush metrics file");
    }
}

impl MetricsSink for JsonlMetricsSink {
    fn record(
        &self,
        run_id: Uuid,
        action: &str,
        metrics: &BTreeMap<String, f64>,
    ) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(&MetricsRecord::new(run_id, action, metrics))?;
        line.push(b'\n');
        self.tx
            .send(WriterMsg::Line(line))
            .map_err(|_| writer_stopped())
    }
}

/// Read every record from a JSON-lines metrics file, skipping malformed lines.
pub fn read_metrics(path: &Path) -> std::io::Result<Vec<MetricsRecord>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut records = Vec::new();
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MetricsRecord>(&line) {
            Ok(record) => records.push(record),
            Err(err) => {
                tracing::warn!(path = %path.display(), line = line_no + 1, error = %err, "skipping malformed metrics line");
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_one_line_per_batch() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics").join("metrics.jsonl");
        let sink = JsonlMetricsSink::open(&path).await.unwrap();
        let run_id = Uuid::now_v7();

        let batch: BTreeMap<String, f64> = [("mse".to_string(), 1.5), ("r2".to_string(), 0.9)].into();
        sink.record(run_id, "eval", &batch).unwrap();
        sink.record(run_id, "train", &BTreeMap::from([("loss".to_string(), 0.1)]))
            .unwrap();
        sink.flush().await.unwrap();

        let records = read_metrics(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, "eval");
        assert_eq!(records[0].metrics, batch);
        assert_eq!(records[1].run_id, run_id);
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.jsonl");
        let metrics = BTreeMap::from([("mae".to_string(), 2.0)]);
        for _ in 0..2 {
            let sink = JsonlMetricsSink::open(&path).await.unwrap();
            sink.record(Uuid::now_v7(), "eval", &metrics).unwrap();
            sink.flush().await.unwrap();
        }
        assert_eq!(read_metrics(&path).unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_records_all_reach_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.jsonl");
        let sink = Arc::new(JsonlMetricsSink::open(&path).await.unwrap());
        let run_id = Uuid::now_v7();

        let mut tasks = tokio::task::JoinSet::new();
        for task in 0..8 {
            let sink = sink.clone();
            tasks.spawn(async move {
                for step in 0..25 {
                    let batch = BTreeMap::from([("step".to_string(), f64::from(step))]);
                    sink.record(run_id, &format!("action-{task}"), &batch).unwrap();
                    tokio::task::yield_now().await;
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }
        sink.flush().await.unwrap();

        let records = read_metrics(&path).unwrap();
        assert_eq!(records.len(), 200);
        for task in 0..8 {
            let steps: Vec<f64> = records
                .iter()
                .filter(|r| r.action == format!("action-{task}"))
                .map(|r| r.metrics["step"])
                .collect();
            assert_eq!(steps, (0..25).map(f64::from).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metrics.jsonl");
        std::fs::write(&path, "not json\n\n").unwrap();
        assert!(read_metrics(&path).unwrap().is_empty());
        assert!(read_metrics(&tmp.path().join("missing.jsonl")).unwrap().is_empty());
    }
}
