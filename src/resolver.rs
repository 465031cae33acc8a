//! Address to symbol resolution.
//!
//! Symbols are never read from the DWARF data here; an external tool
//! (`atos` on macOS) is asked instead. The [`SymbolResolver`] trait is the
//! seam that lets tests substitute a stub.

use log::{debug, warn};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use crate::arch::Arch;
use crate::bundle::DebugBundle;
use crate::index::BundleIndex;
use crate::process::{flatten_output, run_bounded};

#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub bundle: &'a DebugBundle,
    pub arch: Arch,
    pub load_address: u64,
    pub addresses: &'a [u64],
}

/// Outcome of resolving one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Symbol(String),
    /// The tool ran but knew nothing about the address.
    NoSymbol,
    /// No indexed bundle with a known load address for the binary.
    NotIndexed,
    /// The tool could not be run or exited unsuccessfully.
    ToolFailed(String),
    TimedOut,
}

impl Resolution {
    pub fn symbol(&self) -> Option<&str> {
        match self {
            Resolution::Symbol(symbol) => Some(symbol.as_str()),
            _ => None,
        }
    }
}

pub trait SymbolResolver {
    fn resolve(&self, request: &ResolveRequest) -> Resolution;
}

/// Resolves `address` in `binary` against the bundles in `index`.
pub fn resolve_address(
    index: &BundleIndex,
    resolver: &dyn SymbolResolver,
    arch: Arch,
    binary: &str,
    address: u64,
) -> Resolution {
    let bundle = match index.resolvable(binary) {
        Some(bundle) => bundle,
        None => return Resolution::NotIndexed,
    };
    let load_address = match bundle.load_address {
        Some(load_address) => load_address,
        None => return Resolution::NotIndexed,
    };
    let addresses = [address];
    resolver.resolve(&ResolveRequest {
        bundle,
        arch,
        load_address,
        addresses: &addresses,
    })
}

/// Runs `atos -arch <arch> -o <binary> -l <load address> <address>...`.
#[derive(Debug, Clone)]
pub struct Atos {
    program: PathBuf,
    timeout: Option<Duration>,
    keep_blank_lines: bool,
}

impl Atos {
    pub fn new(program: impl Into<PathBuf>) -> Atos {
        Atos {
            program: program.into(),
            timeout: None,
            keep_blank_lines: false,
        }
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Atos {
        self.timeout = timeout;
        self
    }

    pub fn keep_blank_lines(mut self, keep: bool) -> Atos {
        self.keep_blank_lines = keep;
        self
    }

    fn command(&self, request: &ResolveRequest) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg("-arch")
            .arg(request.arch.as_str())
            .arg("-o")
            .arg(&request.bundle.binary_path)
            .arg("-l")
            .arg(format!("{:#x}", request.load_address));
        for address in request.addresses {
            command.arg(format!("{:#x}", address));
        }
        command
    }
}

impl SymbolResolver for Atos {
    fn resolve(&self, request: &ResolveRequest) -> Resolution {
        let output = match run_bounded(&mut self.command(request), self.timeout) {
            Ok(Some(output)) => output,
            Ok(None) => {
                warn!(
                    "{} timed out resolving {} in {}",
                    self.program.display(),
                    format_addresses(request.addresses),
                    request.bundle.binary_name
                );
                return Resolution::TimedOut;
            }
            Err(err) => {
                warn!("could not run {}: {}", self.program.display(), err);
                return Resolution::ToolFailed(err.to_string());
            }
        };

        let stderr = flatten_output(&output.stderr, false);
        if !output.status.success() {
            warn!("{} failed ({}): {}", self.program.display(), output.status, stderr);
            return Resolution::ToolFailed(stderr);
        }
        if !stderr.is_empty() {
            debug!("{}: {}", self.program.display(), stderr);
        }

        let symbol = flatten_output(&output.stdout, self.keep_blank_lines);
        if symbol.trim().is_empty() || echoes_addresses(&symbol, request.addresses) {
            debug!(
                "no symbol for {} in {}",
                format_addresses(request.addresses),
                request.bundle.binary_name
            );
            Resolution::NoSymbol
        } else {
            Resolution::Symbol(symbol)
        }
    }
}

/// `atos` prints an address back unchanged when it has no symbol for it.
fn echoes_addresses(output: &str, addresses: &[u64]) -> bool {
    let echoed = output
        .split_whitespace()
        .map(|word| {
            let digits = word.trim_start_matches("0x").trim_start_matches("0X");
            u64::from_str_radix(digits, 16).ok()
        })
        .collect::<Option<Vec<_>>>();
    echoed.map_or(false, |echoed| echoed == addresses)
}

fn format_addresses(addresses: &[u64]) -> String {
    addresses
        .iter()
        .map(|address| format!("{:#x}", address))
        .collect::<Vec<_>>()
        .join(" ")
}
