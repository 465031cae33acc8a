//! Reading string properties out of a bundle's `Info.plist`.

use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::process::{flatten_output, run_bounded};

pub const PLIST_BUDDY: &str = "/usr/libexec/PlistBuddy";

pub trait PropertyReader {
    /// Returns the value stored under `key`, or `None` if the property is
    /// missing, not a single value, or the file cannot be read.
    fn read_string(&self, plist: &Path, key: &str) -> Option<String>;
}

/// Asks `PlistBuddy -c "Print :<key>" <plist>` for each property.
#[derive(Debug, Clone)]
pub struct PlistBuddy {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl PlistBuddy {
    pub fn new(program: impl Into<PathBuf>, timeout: Option<Duration>) -> PlistBuddy {
        PlistBuddy {
            program: program.into(),
            timeout,
        }
    }
}

impl PropertyReader for PlistBuddy {
    fn read_string(&self, plist: &Path, key: &str) -> Option<String> {
        let mut command = Command::new(&self.program);
        command.arg("-c").arg(format!("Print :{}", key)).arg(plist);

        let output = match run_bounded(&mut command, self.timeout) {
            Ok(Some(output)) => output,
            Ok(None) => {
                debug!("{} timed out reading {} from {}", self.program.display(), key, plist.display());
                return None;
            }
            Err(err) => {
                debug!("could not run {}: {}", self.program.display(), err);
                return None;
            }
        };
        if !output.status.success() {
            debug!(
                "{} failed reading {} from {}: {}",
                self.program.display(),
                key,
                plist.display(),
                flatten_output(&output.stderr, false)
            );
            return None;
        }

        let mut lines = output.stdout.lines().map(str::trim).filter(|l| !l.is_empty());
        match (lines.next(), lines.next()) {
            (Some(value), None) => Some(value.to_string()),
            _ => None,
        }
    }
}

/// Parses the property list in-process. Handles XML and binary plists.
#[derive(Debug, Clone, Copy, Default)]
pub struct InProcess;

impl PropertyReader for InProcess {
    fn read_string(&self, plist: &Path, key: &str) -> Option<String> {
        let value = match plist::Value::from_file(plist) {
            Ok(value) => value,
            Err(err) => {
                debug!("could not parse {}: {}", plist.display(), err);
                return None;
            }
        };
        value
            .as_dictionary()?
            .get(key)?
            .as_string()
            .map(str::to_string)
    }
}

/// `PlistBuddy` when the system provides it, the in-process parser otherwise.
pub fn system_default(timeout: Option<Duration>) -> Box<dyn PropertyReader> {
    if Path::new(PLIST_BUDDY).is_file() {
        Box::new(PlistBuddy::new(PLIST_BUDDY, timeout))
    } else {
        Box::new(InProcess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const INFO_PLIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
	<key>CFBundleIdentifier</key>
	<string>com.apple.xcode.dsym.com.example.app</string>
	<key>CFBundleVersion</key>
	<integer>7</integer>
</dict>
</plist>
"#;

    #[test]
    fn in_process_reads_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Info.plist");
        fs::write(&path, INFO_PLIST).unwrap();

        assert_eq!(
            InProcess.read_string(&path, "CFBundleIdentifier").as_deref(),
            Some("com.apple.xcode.dsym.com.example.app")
        );
        assert_eq!(InProcess.read_string(&path, "CFBundleShortVersionString"), None);
        // not a string
        assert_eq!(InProcess.read_string(&path, "CFBundleVersion"), None);
    }

    #[test]
    fn in_process_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(InProcess.read_string(&dir.path().join("Info.plist"), "CFBundleIdentifier"), None);
    }

    #[cfg(unix)]
    #[test]
    fn plist_buddy_requires_exactly_one_line() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("readprop");
        fs::write(
            &tool,
            "#!/bin/sh\ncase \"$2\" in\n  'Print :One') echo '  value  ' ;;\n  'Print :Two') printf 'a\\nb\\n' ;;\n  *) echo 'Does Not Exist' ; exit 1 ;;\nesac\n",
        )
        .unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let reader = PlistBuddy::new(&tool, Some(Duration::from_secs(10)));
        let plist = dir.path().join("Info.plist");
        assert_eq!(reader.read_string(&plist, "One").as_deref(), Some("value"));
        assert_eq!(reader.read_string(&plist, "Two"), None);
        assert_eq!(reader.read_string(&plist, "Three"), None);
    }
}
