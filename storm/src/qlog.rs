use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{info, warn};

const RECORD_SEPARATOR: u8 = 0x1e;
const QLOG_VERSION: &str = "0.3";
const QLOG_FORMAT: &str = "JSON-SEQ";

/// Creates one trace file per connection, named after the original destination connection ID.
#[derive(Debug)]
pub struct TraceSinkFactory {
    dir: PathBuf,
    trial_id: u32,
    created: AtomicUsize,
}

impl TraceSinkFactory {
    pub fn new(dir: &Path, trial_id: u32) -> Self {
        Self {
            dir: dir.to_path_buf(),
            trial_id,
            created: AtomicUsize::new(0),
        }
    }

    pub fn file_name(connection_id: &[u8]) -> String {
        format!("client_{}.qlog", hex::encode(connection_id))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    pub fn create(&self, connection_id: &[u8]) -> io::Result<TraceSink> {
        let path = self.dir.join(Self::file_name(connection_id));
        let file = File::create(&path)?;
        info!("Creating qlog file {}.", path.display());
        let mut sink = TraceSink {
            path,
            writer: Some(BufWriter::new(file)),
            started: Instant::now(),
        };
        sink.write_record(&Header {
            qlog_version: QLOG_VERSION,
            qlog_format: QLOG_FORMAT,
            title: format!("h3-storm trial {}", self.trial_id),
            trace: Trace {
                vantage_point: VantagePoint { r#type: "client" },
                common_fields: CommonFields {
                    odcid: hex::encode(connection_id),
                    reference_time: 0.0,
                },
            },
        });
        self.created.fetch_add(1, Ordering::AcqRel);
        Ok(sink)
    }
}

#[derive(Debug, Serialize)]
struct Header {
    qlog_version: &'static str,
    qlog_format: &'static str,
    title: String,
    trace: Trace,
}

#[derive(Debug, Serialize)]
struct Trace {
    vantage_point: VantagePoint,
    common_fields: CommonFields,
}

#[derive(Debug, Serialize)]
struct VantagePoint {
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct CommonFields {
    #[serde(rename = "ODCID")]
    odcid: String,
    reference_time: f64,
}

#[derive(Debug, Serialize)]
struct Event<'a> {
    time: f64,
    name: &'a str,
    data: Value,
}

/// Per-connection event log. The first write failure disables the sink.
#[derive(Debug)]
pub struct TraceSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    started: Instant,
}

impl TraceSink {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, name: &str, data: Value) {
        let time = self.started.elapsed().as_secs_f64() * 1000.0;
        self.write_record(&Event { time, name, data });
    }

    pub fn finish(mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(error) = writer.flush() {
                warn!("Failed to flush qlog file {}: {error}", self.path.display());
            }
        }
    }

    fn write_record<T: Serialize>(&mut self, record: &T) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        if let Err(error) = encode(writer, record) {
            warn!(
                "Failed to write qlog file {}, disabling it: {error}",
                self.path.display()
            );
            self.writer = None;
        }
    }
}

fn encode<T: Serialize>(writer: &mut BufWriter<File>, record: &T) -> io::Result<()> {
    writer.write_all(&[RECORD_SEPARATOR])?;
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")
}
