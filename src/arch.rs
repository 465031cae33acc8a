use std::fmt;

/// CPU architecture as understood by `atos -arch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Arm64,
    X86_64,
}

impl Arch {
    /// Maps the `Code Type:` value of a crash report to an architecture.
    ///
    /// Only the first token is considered, so `ARM-64 (Native)` maps the
    /// same as `ARM-64`.
    pub fn from_code_type(code_type: &str) -> Option<Arch> {
        match code_type.split_whitespace().next()? {
            "ARM-64" => Some(Arch::Arm64),
            "X86-64" => Some(Arch::X86_64),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Arch::Arm64 => "arm64",
            Arch::X86_64 => "x86_64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
