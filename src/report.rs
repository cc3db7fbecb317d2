use crate::event::CongestionReport;
use log::warn;
use std::io::Write;

/// Where congestion reports end up. Only ever driven from one task.
pub trait Reporter: Send + 'static {
    fn report(&mut self, report: CongestionReport);

    fn flush(&mut self) {}
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn report(&mut self, report: CongestionReport) {
        (**self).report(report)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

/// One warning line per report.
#[derive(Debug, Default)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, report: CongestionReport) {
        warn!(target: "congestion", "{}", report);
    }
}

/// One JSON object per line.
pub struct JsonLinesReporter<W> {
    out: W,
}

impl<W: Write + Send + 'static> JsonLinesReporter<W> {
    pub fn new(out: W) -> Self {
        JsonLinesReporter { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_line(&mut self, report: &CongestionReport) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.out, report)?;
        self.out.write_all(b"\n")
    }
}

impl<W: Write + Send + 'static> Reporter for JsonLinesReporter<W> {
    fn report(&mut self, report: CongestionReport) {
        if let Err(e) = self.write_line(&report) {
            warn!("failed to write report of {}: {}", report.switch, e);
        }
    }

    fn flush(&mut self) {
        if let Err(e) = self.out.flush() {
            warn!("failed to flush reports: {}", e);
        }
    }
}
