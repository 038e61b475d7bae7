//! Trajectory recording as JSON lines.
//!
//! The first record is a [`RunHeader`]; every following line is one
//! [`StepReport`]. Files ending in `.gz` (or created with `gzip = true`)
//! are gzip-compressed; readers detect compression from the content.

use crate::error::{IoError, Result};
use ephswarm_core::observation::StepReport;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunHeader {
    pub scenario: String,
    /// [`ephswarm_core::config::SimConfig::fingerprint`] of the run.
    pub fingerprint: String,
    pub agents: usize,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Record {
    Header(RunHeader),
    Step(StepReport),
}

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
    Writer(Box<dyn Write + Send>),
}

impl Sink {
    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Sink::Plain(w) => w,
            Sink::Gzip(w) => w,
            Sink::Writer(w) => w,
        }
    }
}

pub struct TrajectoryRecorder {
    sink: Sink,
    records: u64,
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

fn is_gzip_path(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

impl TrajectoryRecorder {
    /// Creates (truncating) `path`.
    pub fn create<P: AsRef<Path>>(path: P, gzip: bool) -> Result<Self> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = BufWriter::new(File::create(path)?);
        let sink = if gzip || is_gzip_path(path) {
            Sink::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            Sink::Plain(file)
        };
        Ok(Self { sink, records: 0 })
    }

    /// Records into an arbitrary writer, uncompressed.
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Sink::Writer(Box::new(writer)),
            records: 0,
        }
    }

    fn write_record(&mut self, record: &Record) -> Result<()> {
        let w = self.sink.writer();
        serde_json::to_writer(&mut *w, record)?;
        w.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    pub fn write_header(&mut self, header: RunHeader) -> Result<()> {
        self.write_record(&Record::Header(header))
    }

    pub fn record(&mut self, report: &StepReport) -> Result<()> {
        self.write_record(&Record::Step(report.clone()))
    }

    #[must_use]
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flushes and closes the stream; returns the number of records written.
    pub fn finish(self) -> Result<u64> {
        match self.sink {
            Sink::Plain(mut w) => w.flush()?,
            Sink::Gzip(encoder) => {
                let mut inner = encoder
                    .finish()
                    .map_err(|e| IoError::compression(e.to_string()))?;
                inner.flush()?;
            }
            Sink::Writer(mut w) => w.flush()?,
        }
        Ok(self.records)
    }
}

/// Reads back every record of a recording, plain or gzip.
pub fn read_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let mut file = BufReader::new(File::open(path)?);
    let reader: Box<dyn Read> = if file.fill_buf()?.starts_with(&GZIP_MAGIC) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    let mut records = Vec::new();
    for (n, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line)
            .map_err(|e| IoError::from(e).with_context(format!("{} line {}", path.display(), n + 1)))?;
        records.push(record);
    }
    Ok(records)
}
