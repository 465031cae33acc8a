//! Parsing of textual (`.crash`) crash reports.
//!
//! The report is read line by line, forward only. Three things are picked
//! out of it:
//!
//! * the `Code Type:` line, which names the CPU architecture,
//! * the stack frames of every thread, between the code type line and
//!   `Binary Images:`,
//! * the binary image table following `Binary Images:`.
//!
//! Every line is kept verbatim, bytes and line terminator included, so the
//! report can be written back out with annotations added. Patterns are
//! matched against a lossy UTF-8 rendering of each line.

use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use crate::arch::Arch;
use crate::error::{Error, Result};

pub const BINARY_IMAGES_HEADER: &str = "Binary Images:";

// Code Type:             ARM-64 (Native)
fn code_type_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*Code Type:\s*([A-Za-z0-9_-]*)").expect("Code type regular expression was invalid")
    })
}

// Thread 0 Crashed:: Dispatch queue: com.apple.main-thread
fn thread_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*Thread (\d+)(.*)$").expect("Thread regular expression was invalid"))
}

// 3   com.example.app   0x100000abc 0x100000000 + 2748
fn frame_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d*)\s*(.*)\s+(0x[A-Fa-f0-9]+) (.*\s\+\s\d*)")
            .expect("Frame regular expression was invalid")
    })
}

// 0x100000000 - 0x100100000 +com.example.app (1.0 - 1) <uuid> /path/to/App
fn image_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(0x[A-Fa-f0-9]+)\s*-\s*(0x[A-Fa-f0-9]+)\s+\+?([\w.\-]+)\s+(\(.*\))")
            .expect("Binary image regular expression was invalid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryImage {
    pub load_address: u64,
    pub end_address: u64,
    pub identifier: String,
    /// The parenthesized version column, parentheses included.
    pub version: String,
    /// Zero-based line number in the report.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub index: Option<u32>,
    pub binary: String,
    pub address: u64,
    /// Whatever follows the address, e.g. `0x100000000 + 2748` or `main + 12`.
    pub symbol_hint: String,
    /// Zero-based line number in the report.
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thread {
    /// `None` for frames listed before any `Thread N` header, such as a
    /// last exception backtrace.
    pub index: Option<u32>,
    pub crashed: bool,
    pub frames: Vec<StackFrame>,
}

/// One line of the report as read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    raw: Vec<u8>,
    content_len: usize,
    text: String,
}

impl Line {
    pub fn new(raw: Vec<u8>) -> Line {
        let mut content_len = raw.len();
        if raw[..content_len].ends_with(b"\n") {
            content_len -= 1;
            if raw[..content_len].ends_with(b"\r") {
                content_len -= 1;
            }
        }
        let text = String::from_utf8_lossy(&raw[..content_len]).into_owned();
        Line {
            raw,
            content_len,
            text,
        }
    }

    /// The line exactly as read, terminator included.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The line without its terminator.
    pub fn content(&self) -> &[u8] {
        &self.raw[..self.content_len]
    }

    /// `\n`, `\r\n`, or empty for a last line without one.
    pub fn terminator(&self) -> &[u8] {
        &self.raw[self.content_len..]
    }

    /// The content with invalid UTF-8 replaced.
    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, Default)]
pub struct CrashReport {
    lines: Vec<Line>,
    pub architecture: Option<Arch>,
    pub binary_images: Vec<BinaryImage>,
    pub threads: Vec<Thread>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Threads,
    BinaryImages,
}

impl CrashReport {
    pub fn from_path(path: &Path) -> Result<CrashReport> {
        let file = File::open(path).map_err(|source| Error::Read {
            path: path.to_path_buf(),
            source,
        })?;
        CrashReport::parse(BufReader::new(file)).map_err(|err| match err {
            Error::Io(source) => Error::Read {
                path: path.to_path_buf(),
                source,
            },
            err => err,
        })
    }

    /// Parses a crash report.
    ///
    /// Fails if the `Code Type:` line names an architecture that cannot be
    /// symbolicated.
    pub fn parse<R: BufRead>(mut reader: R) -> Result<CrashReport> {
        let mut report = CrashReport::default();
        let mut section = Section::Header;

        for number in 0.. {
            let mut raw = Vec::new();
            if reader.read_until(b'\n', &mut raw)? == 0 {
                break;
            }
            let line = Line::new(raw);
            let text = line.text();

            if text.trim_start().starts_with(BINARY_IMAGES_HEADER) {
                section = Section::BinaryImages;
            } else {
                match section {
                    Section::Header => {
                        if let Some(arch) = parse_code_type(text, number)? {
                            report.architecture = Some(arch);
                            section = Section::Threads;
                        }
                    }
                    Section::Threads => report.parse_thread_line(text, number),
                    Section::BinaryImages => {
                        if let Some(image) = parse_binary_image(text, number) {
                            report.binary_images.push(image);
                        }
                    }
                }
            }
            report.lines.push(line);
        }

        Ok(report)
    }

    fn parse_thread_line(&mut self, line: &str, number: usize) {
        if let Some(captures) = thread_regex().captures(line) {
            let rest = &captures[2];
            if rest.contains("Thread State") {
                return;
            }
            let index = captures[1].parse().ok();
            let crashed = rest.contains("Crashed");
            // `Thread 1 name: ...` is followed by `Thread 1:`
            let continues = matches!(
                self.threads.last(),
                Some(thread) if thread.index.is_some() && thread.index == index
            );
            match self.threads.last_mut() {
                Some(thread) if continues => thread.crashed |= crashed,
                _ => self.threads.push(Thread {
                    index,
                    crashed,
                    frames: Vec::new(),
                }),
            }
            return;
        }

        if let Some(frame) = parse_frame(line, number) {
            if self.threads.is_empty() {
                self.threads.push(Thread {
                    index: None,
                    crashed: false,
                    frames: Vec::new(),
                });
            }
            if let Some(thread) = self.threads.last_mut() {
                thread.frames.push(frame);
            }
        }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Every stack frame, in the order they appear in the report.
    pub fn frames(&self) -> impl Iterator<Item = &StackFrame> {
        self.threads.iter().flat_map(|thread| thread.frames.iter())
    }

    pub fn crashed_thread(&self) -> Option<&Thread> {
        self.threads.iter().find(|thread| thread.crashed)
    }
}

fn parse_code_type(line: &str, number: usize) -> Result<Option<Arch>> {
    let captures = match code_type_regex().captures(line) {
        Some(captures) => captures,
        None => return Ok(None),
    };
    let code_type = &captures[1];
    Arch::from_code_type(code_type)
        .map(Some)
        .ok_or_else(|| Error::UnsupportedArchitecture {
            code_type: code_type.to_string(),
            line: number + 1,
        })
}

fn parse_frame(line: &str, number: usize) -> Option<StackFrame> {
    let captures = frame_regex().captures(line)?;
    Some(StackFrame {
        index: captures[1].parse().ok(),
        binary: captures[2].trim().to_string(),
        address: parse_hex(&captures[3])?,
        symbol_hint: captures[4].to_string(),
        line: number,
    })
}

fn parse_binary_image(line: &str, number: usize) -> Option<BinaryImage> {
    let captures = image_regex().captures(line)?;
    Some(BinaryImage {
        load_address: parse_hex(&captures[1])?,
        end_address: parse_hex(&captures[2])?,
        identifier: captures[3].to_string(),
        version: captures[4].to_string(),
        line: number,
    })
}

fn parse_hex(text: &str) -> Option<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}
