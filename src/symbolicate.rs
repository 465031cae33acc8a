//! Writes a crash report back out with resolved frames annotated.

use ansi_term::Style;
use log::{info, warn};
use std::env;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::BundleIndex;
use crate::report::{CrashReport, Line};
use crate::resolver::{resolve_address, Resolution, SymbolResolver};

/// Placed between a frame line and its symbol.
pub const ANNOTATION_SEPARATOR: &str = " -> ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub bundles_indexed: usize,
    pub bundles_skipped: usize,
    pub bundles_matched: usize,
    pub frames: usize,
    pub resolved: usize,
    pub no_symbol: usize,
    pub not_indexed: usize,
    pub tool_failed: usize,
    pub timed_out: usize,
    pub architecture_known: bool,
    /// Index of the thread marked as crashed, if the report names one.
    pub crashed_thread: Option<u32>,
}

impl Summary {
    pub fn unresolved(&self) -> usize {
        self.frames - self.resolved
    }

    fn record(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Symbol(_) => self.resolved += 1,
            Resolution::NoSymbol => self.no_symbol += 1,
            Resolution::NotIndexed => self.not_indexed += 1,
            Resolution::ToolFailed(_) => self.tool_failed += 1,
            Resolution::TimedOut => self.timed_out += 1,
        }
    }

    pub fn log(&self) {
        info!(
            "{} dSYM bundles indexed, {} matched a binary image, {} skipped",
            self.bundles_indexed, self.bundles_matched, self.bundles_skipped
        );
        info!("{} of {} frames symbolicated", self.resolved, self.frames);
        if let Some(thread) = self.crashed_thread {
            info!("thread {} crashed", thread);
        }

        if !self.architecture_known {
            warn!("crash report declares no code type, no frames were symbolicated");
        }
        if self.bundles_skipped > 0 || self.no_symbol + self.tool_failed + self.timed_out > 0 {
            warn!(
                "{} bundles skipped; unresolved frames: {} without symbol, {} tool failures, {} timeouts",
                self.bundles_skipped, self.no_symbol, self.tool_failed, self.timed_out
            );
        }
    }
}

pub struct Symbolicator<'a> {
    index: &'a BundleIndex,
    resolver: &'a dyn SymbolResolver,
    highlight: bool,
}

impl<'a> Symbolicator<'a> {
    pub fn new(index: &'a BundleIndex, resolver: &'a dyn SymbolResolver) -> Symbolicator<'a> {
        Symbolicator {
            index,
            resolver,
            highlight: false,
        }
    }

    /// Makes annotated lines bold. Only meant for terminals.
    pub fn highlight(mut self, highlight: bool) -> Symbolicator<'a> {
        self.highlight = highlight;
        self
    }

    /// Writes every line of `report` to `out`, appending the symbol to each
    /// frame line that could be resolved. All other lines are copied as is.
    pub fn write<W: Write>(&self, report: &CrashReport, out: &mut W) -> Result<Summary> {
        let mut summary = Summary {
            bundles_indexed: self.index.len(),
            bundles_skipped: self.index.skipped().len(),
            bundles_matched: self.index.matched(),
            architecture_known: report.architecture.is_some(),
            crashed_thread: report.crashed_thread().and_then(|thread| thread.index),
            ..Summary::default()
        };
        let mut frames = report.frames().peekable();

        for (number, line) in report.lines().iter().enumerate() {
            let frame = frames.next_if(|frame| frame.line == number);
            let resolution = match (frame, report.architecture) {
                (Some(frame), Some(arch)) => {
                    resolve_address(self.index, self.resolver, arch, &frame.binary, frame.address)
                }
                _ => {
                    out.write_all(line.raw()).map_err(Error::Write)?;
                    continue;
                }
            };
            summary.frames += 1;
            summary.record(&resolution);

            let written = match resolution.symbol() {
                Some(symbol) => self.write_annotated(out, line, symbol),
                None => out.write_all(line.raw()),
            };
            written.map_err(Error::Write)?;
        }

        Ok(summary)
    }

    fn write_annotated<W: Write>(&self, out: &mut W, line: &Line, symbol: &str) -> io::Result<()> {
        let content = trim_ascii_end(line.content());
        if self.highlight {
            let annotated = format!("{}{}{}", String::from_utf8_lossy(content), ANNOTATION_SEPARATOR, symbol);
            write!(out, "{}", Style::new().bold().paint(annotated))?;
        } else {
            out.write_all(content)?;
            write!(out, "{}{}", ANNOTATION_SEPARATOR, symbol)?;
        }
        out.write_all(line.terminator())
    }
}

fn trim_ascii_end(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |last| last + 1);
    &bytes[..end]
}

/// Symbolicates the crash report named by `config` end to end.
pub fn run(config: &Config) -> Result<Summary> {
    let cwd = env::current_dir()?;
    let crash_report = config.crash_report_path(&cwd)?;
    info!("Process crash file {}", crash_report.display());

    let program_dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let paths = config.search_paths(&crash_report, program_dir.as_deref(), &cwd);
    let properties = config.property_reader();
    let mut index = BundleIndex::build(&paths, properties.as_ref());

    let report = CrashReport::from_path(&crash_report)?;
    index.assign_load_addresses(&report.binary_images);

    let resolver = config.resolver();
    let symbolicator = Symbolicator::new(&index, &resolver);

    let summary = match &config.output {
        Some(path) => {
            info!("Store symbolicated crash report in {}", path.display());
            let file = File::create(path).map_err(Error::Write)?;
            let mut out = BufWriter::new(file);
            let summary = symbolicator.write(&report, &mut out)?;
            out.flush().map_err(Error::Write)?;
            summary
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let summary = symbolicator.highlight(config.highlight).write(&report, &mut out)?;
            out.flush().map_err(Error::Write)?;
            summary
        }
    };

    summary.log();
    Ok(summary)
}
