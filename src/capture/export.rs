//! Trace export.
//!
//! Serializes a completed capture for offline viewers. Output depends only on
//! the layout and samples, never on wall-clock time, so re-exporting the same
//! capture yields identical bytes. An empty capture still produces the full
//! header.

use super::engine::CaptureEngine;
use super::layout::{SampleVector, SignalField, SignalLayout};
use super::ExportError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceFormat {
    /// Value change dump, for waveform viewers.
    #[default]
    Vcd,
    /// Names row, widths row, then one row of decimal values per sample.
    Csv,
    /// `{"signals": [...], "samples": [[...], ...]}`
    Json,
}

impl TraceFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TraceFormat::Vcd => "vcd",
            TraceFormat::Csv => "csv",
            TraceFormat::Json => "json",
        }
    }

    /// Guess the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl fmt::Display for TraceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for TraceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vcd" => Ok(TraceFormat::Vcd),
            "csv" => Ok(TraceFormat::Csv),
            "json" => Ok(TraceFormat::Json),
            other => Err(format!("unknown trace format '{other}'")),
        }
    }
}

/// What an export wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub format: TraceFormat,
    pub signals: usize,
    pub samples: usize,
    pub bytes: u64,
}

/// Writer adapter counting bytes written.
struct Counting<W> {
    inner: W,
    bytes: u64,
}

impl<W: Write> Write for Counting<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[derive(Serialize)]
struct JsonTrace<'a> {
    signals: &'a [SignalField],
    sample_period: u64,
    timescale_ns: u64,
    samples: Vec<Vec<u128>>,
}

/// Capture serializer.
#[derive(Debug, Clone)]
pub struct Exporter {
    format: TraceFormat,
    timescale_ns: u64,
    sample_period: u64,
    scope: String,
}

impl Exporter {
    pub fn new(format: TraceFormat) -> Self {
        Self {
            format,
            timescale_ns: 1,
            sample_period: 1,
            scope: "socscope".to_string(),
        }
    }

    /// Duration of one sample instant.
    pub fn with_timescale_ns(mut self, ns: u64) -> Self {
        self.timescale_ns = ns.max(1);
        self
    }

    /// Instants between consecutive stored samples (the subsample divider).
    pub fn with_sample_period(mut self, instants: u64) -> Self {
        self.sample_period = instants.max(1);
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    pub fn format(&self) -> TraceFormat {
        self.format
    }

    /// Write `samples` to `writer`.
    pub fn export<W: Write>(
        &self,
        layout: &SignalLayout,
        samples: &[SampleVector],
        writer: W,
    ) -> Result<ExportSummary, ExportError> {
        let mut out = Counting {
            inner: writer,
            bytes: 0,
        };
        match self.format {
            TraceFormat::Csv => self.write_csv(layout, samples, &mut out)?,
            TraceFormat::Vcd => self.write_vcd(layout, samples, &mut out)?,
            TraceFormat::Json => self.write_json(layout, samples, &mut out)?,
        }
        out.flush()?;

        Ok(ExportSummary {
            format: self.format,
            signals: layout.len(),
            samples: samples.len(),
            bytes: out.bytes,
        })
    }

    /// Write `samples` to a file at `path`, replacing it.
    pub fn export_to_path(
        &self,
        layout: &SignalLayout,
        samples: &[SampleVector],
        path: impl AsRef<Path>,
    ) -> Result<ExportSummary, ExportError> {
        let path = path.as_ref();
        let destination = |source| ExportError::Destination {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(destination)?;
        let summary = match self.export(layout, samples, BufWriter::new(file)) {
            Ok(summary) => summary,
            Err(ExportError::Io(source)) => return Err(destination(source)),
            Err(e) => return Err(e),
        };

        tracing::info!(
            path = %path.display(),
            format = %self.format,
            samples = summary.samples,
            "trace exported"
        );
        Ok(summary)
    }

    /// Export a finished capture. Fails with `NotDone` before the engine is Done.
    pub fn export_capture(
        &self,
        engine: &CaptureEngine,
        path: impl AsRef<Path>,
    ) -> Result<ExportSummary, ExportError> {
        let samples = engine.samples()?;
        self.clone()
            .with_sample_period(engine.divider() as u64)
            .export_to_path(engine.layout(), samples, path)
    }

    fn write_csv<W: Write>(
        &self,
        layout: &SignalLayout,
        samples: &[SampleVector],
        out: &mut W,
    ) -> io::Result<()> {
        let names: Vec<&str> = layout.fields().iter().map(|f| f.name.as_str()).collect();
        writeln!(out, "{}", names.join(","))?;
        let widths: Vec<String> = layout.fields().iter().map(|f| f.width.to_string()).collect();
        writeln!(out, "{}", widths.join(","))?;

        for &sample in samples {
            let mut row = String::new();
            for idx in 0..layout.len() {
                if idx > 0 {
                    row.push(',');
                }
                row.push_str(&layout.value(sample, idx).to_string());
            }
            writeln!(out, "{row}")?;
        }
        Ok(())
    }

    fn write_vcd<W: Write>(
        &self,
        layout: &SignalLayout,
        samples: &[SampleVector],
        out: &mut W,
    ) -> io::Result<()> {
        let ids: Vec<String> = (0..layout.len()).map(vcd_identifier).collect();

        writeln!(out, "$version socscope {} $end", env!("CARGO_PKG_VERSION"))?;
        writeln!(out, "$timescale {}ns $end", self.timescale_ns)?;
        writeln!(out, "$scope module {} $end", self.scope)?;
        for (field, id) in layout.fields().iter().zip(&ids) {
            writeln!(out, "$var wire {} {} {} $end", field.width, id, field.name)?;
        }
        writeln!(out, "$upscope $end")?;
        writeln!(out, "$enddefinitions $end")?;

        let Some((&first, rest)) = samples.split_first() else {
            return Ok(());
        };

        writeln!(out, "#0")?;
        writeln!(out, "$dumpvars")?;
        for (idx, id) in ids.iter().enumerate() {
            write_vcd_value(out, layout.fields()[idx].width, layout.value(first, idx), id)?;
        }
        writeln!(out, "$end")?;

        let mut previous = first;
        for (n, &sample) in rest.iter().enumerate() {
            if sample == previous {
                continue;
            }
            writeln!(out, "#{}", (n as u64 + 1) * self.sample_period)?;
            for (idx, id) in ids.iter().enumerate() {
                let value = layout.value(sample, idx);
                if value != layout.value(previous, idx) {
                    write_vcd_value(out, layout.fields()[idx].width, value, id)?;
                }
            }
            previous = sample;
        }
        writeln!(out, "#{}", samples.len() as u64 * self.sample_period)?;
        Ok(())
    }

    fn write_json<W: Write>(
        &self,
        layout: &SignalLayout,
        samples: &[SampleVector],
        out: &mut W,
    ) -> Result<(), ExportError> {
        let trace = JsonTrace {
            signals: layout.fields(),
            sample_period: self.sample_period,
            timescale_ns: self.timescale_ns,
            samples: samples.iter().map(|&s| layout.unpack(s)).collect(),
        };
        serde_json::to_writer(&mut *out, &trace)?;
        writeln!(out)?;
        Ok(())
    }
}

/// Short printable identifier for the `index`-th VCD variable.
fn vcd_identifier(mut index: usize) -> String {
    const FIRST: u8 = b'!';
    const RANGE: usize = (b'~' - b'!' + 1) as usize;
    let mut id = String::new();
    loop {
        id.push((FIRST + (index % RANGE) as u8) as char);
        index /= RANGE;
        if index == 0 {
            break;
        }
        index -= 1;
    }
    id
}

fn write_vcd_value<W: Write>(out: &mut W, width: u32, value: u128, id: &str) -> io::Result<()> {
    if width == 1 {
        writeln!(out, "{}{}", value & 1, id)
    } else {
        writeln!(out, "b{:b} {}", value, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> SignalLayout {
        SignalLayout::new(vec![
            SignalField::new("valid", 1),
            SignalField::new("data", 8),
        ])
        .unwrap()
    }

    fn export_string(format: TraceFormat, samples: &[SampleVector]) -> String {
        let mut buf = Vec::new();
        Exporter::new(format)
            .with_timescale_ns(10)
            .export(&layout(), samples, &mut buf)
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn samples() -> Vec<SampleVector> {
        let layout = layout();
        vec![
            layout.pack(&[1, 0x41]).unwrap(),
            layout.pack(&[1, 0x41]).unwrap(),
            layout.pack(&[0, 0x42]).unwrap(),
        ]
    }

    #[test]
    fn test_csv_layout() {
        let csv = export_string(TraceFormat::Csv, &samples());
        assert_eq!(csv, "valid,data\n1,8\n1,65\n1,65\n0,66\n");
    }

    #[test]
    fn test_csv_empty_is_header_only() {
        let csv = export_string(TraceFormat::Csv, &[]);
        assert_eq!(csv, "valid,data\n1,8\n");
    }

    #[test]
    fn test_vcd_value_changes_only() {
        let vcd = export_string(TraceFormat::Vcd, &samples());
        assert!(vcd.contains("$timescale 10ns $end"));
        assert!(vcd.contains("$var wire 1 ! valid $end"));
        assert!(vcd.contains("$var wire 8 \" data $end"));
        assert!(vcd.contains("#0\n$dumpvars\n1!\nb1000001 \"\n$end\n"));
        // Sample 1 repeats sample 0 and produces no timestamp
        assert!(!vcd.contains("#1\n"));
        assert!(vcd.contains("#2\n0!\nb1000010 \"\n"));
        assert!(vcd.ends_with("#3\n"));
        assert!(!vcd.contains("$date"));
    }

    #[test]
    fn test_vcd_empty_has_definitions() {
        let vcd = export_string(TraceFormat::Vcd, &[]);
        assert!(vcd.ends_with("$enddefinitions $end\n"));
    }

    #[test]
    fn test_json_trace() {
        let json = export_string(TraceFormat::Json, &samples());
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["signals"][1]["name"], "data");
        assert_eq!(parsed["samples"][2][1], 66);
        assert_eq!(parsed["samples"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_deterministic() {
        for format in [TraceFormat::Csv, TraceFormat::Vcd, TraceFormat::Json] {
            assert_eq!(
                export_string(format, &samples()),
                export_string(format, &samples())
            );
        }
    }

    #[test]
    fn test_summary_counts_bytes() {
        let mut buf = Vec::new();
        let summary = Exporter::new(TraceFormat::Csv)
            .export(&layout(), &samples(), &mut buf)
            .unwrap();
        assert_eq!(summary.bytes, buf.len() as u64);
        assert_eq!(summary.samples, 3);
        assert_eq!(summary.signals, 2);
    }

    #[test]
    fn test_vcd_identifiers_unique() {
        let ids: std::collections::HashSet<_> = (0..500).map(vcd_identifier).collect();
        assert_eq!(ids.len(), 500);
        assert_eq!(vcd_identifier(0), "!");
        assert_eq!(vcd_identifier(93), "~");
        assert_eq!(vcd_identifier(94).len(), 2);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("CSV".parse::<TraceFormat>(), Ok(TraceFormat::Csv));
        assert!("bin".parse::<TraceFormat>().is_err());
        assert_eq!(
            TraceFormat::from_path(Path::new("trace.vcd")),
            Some(TraceFormat::Vcd)
        );
    }
}
