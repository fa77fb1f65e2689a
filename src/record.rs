//! Sample log persistence

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::stats::SampleRecord;

/// Destination for the per-packet sample log
pub trait RecordSink {
    /// Append records in the order given
    fn append_records(&mut self, records: &[SampleRecord]) -> Result<()>;
}

/// Writes sample records as CSV
pub struct CsvRecordWriter {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvRecordWriter {
    pub const HEADER: &'static str = "packet-index,latency,jitter,received-time,packet-size";

    /// Create (or truncate) the file and write the header row
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{}", Self::HEADER)?;
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for CsvRecordWriter {
    fn append_records(&mut self, records: &[SampleRecord]) -> Result<()> {
        for record in records {
            writeln!(
                self.writer,
                "{},{},{},{},{}",
                record.sequence_index,
                record.latency_secs,
                record.jitter_secs,
                record.received_at_nanos,
                record.packet_size_bytes
            )?;
        }
        self.writer.flush()?;
        tracing::debug!("Wrote {} records to {}", records.len(), self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_rows_in_arrival_order() {
        let path = std::env::temp_dir().join(format!("lan-audio-records-{}.csv", std::process::id()));
        let records = [
            SampleRecord {
                sequence_index: 2,
                latency_secs: 0.5,
                jitter_secs: 0.5,
                received_at_nanos: 100,
                packet_size_bytes: 1024,
            },
            SampleRecord {
                sequence_index: 1,
                latency_secs: 0.25,
                jitter_secs: 0.25,
                received_at_nanos: 200,
                packet_size_bytes: 1024,
            },
        ];

        let mut writer = CsvRecordWriter::create(&path).unwrap();
        writer.append_records(&records).unwrap();
        drop(writer);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], CsvRecordWriter::HEADER);
        assert_eq!(lines[1], "2,0.5,0.5,100,1024");
        assert_eq!(lines[2], "1,0.25,0.25,200,1024");
        assert_eq!(lines.len(), 3);

        let _ = std::fs::remove_file(&path);
    }
}
