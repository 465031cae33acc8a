//! Symbolication of macOS and iOS crash reports.
//!
//! dSYM bundles are discovered in a list of search directories and matched
//! against the binary images of a crash report. Every stack frame that
//! belongs to a matched binary is resolved with `atos` and the symbol is
//! appended to the frame line.
//!
//! See <https://developer.apple.com/library/archive/technotes/tn2151/_index.html#//apple_ref/doc/uid/DTS40008184-CH1-SYMBOLICATE_WITH_ATOS>

pub mod arch;
pub mod bundle;
pub mod config;
pub mod error;
pub mod index;
pub mod process;
pub mod properties;
pub mod report;
pub mod resolver;
pub mod search_paths;
pub mod symbolicate;

pub use crate::arch::Arch;
pub use crate::bundle::{DebugBundle, Rejection};
pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::index::BundleIndex;
pub use crate::report::{BinaryImage, CrashReport, StackFrame, Thread};
pub use crate::resolver::{Atos, ResolveRequest, Resolution, SymbolResolver};
pub use crate::search_paths::SearchPaths;
pub use crate::symbolicate::{run, Summary, Symbolicator};
