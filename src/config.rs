use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::properties::{self, PlistBuddy, PropertyReader};
use crate::resolver::Atos;
use crate::search_paths::SearchPaths;

pub const DEFAULT_RESOLVER: &str = "atos";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Config {
    pub crash_report: PathBuf,
    /// Extra directories to search for dSYM bundles, in order.
    pub dsym_paths: Vec<PathBuf>,
    /// Standard output when `None`.
    pub output: Option<PathBuf>,
    pub resolver_program: PathBuf,
    /// Metadata is parsed in-process when `None` and PlistBuddy is not installed.
    pub plist_buddy: Option<PathBuf>,
    /// Bound on every external tool invocation.
    pub timeout: Option<Duration>,
    pub keep_blank_lines: bool,
    pub case_insensitive_paths: bool,
    pub highlight: bool,
}

impl Config {
    pub fn new(crash_report: impl Into<PathBuf>) -> Config {
        Config {
            crash_report: crash_report.into(),
            dsym_paths: Vec::new(),
            output: None,
            resolver_program: PathBuf::from(DEFAULT_RESOLVER),
            plist_buddy: None,
            timeout: Some(DEFAULT_TIMEOUT),
            keep_blank_lines: false,
            case_insensitive_paths: true,
            highlight: false,
        }
    }

    /// The absolute crash report path, checked to be an existing file.
    pub fn crash_report_path(&self, cwd: &Path) -> Result<PathBuf> {
        let path = absolute(&self.crash_report, cwd);
        if !path.exists() {
            return Err(Error::CrashReportMissing(path));
        }
        if !path.is_file() {
            return Err(Error::CrashReportNotAFile(path));
        }
        Ok(path)
    }

    /// Directories to scan, lowest precedence first: the program's own
    /// directory, the `-d` paths, the crash report's directory and the
    /// working directory.
    pub fn search_paths(&self, crash_report: &Path, program_dir: Option<&Path>, cwd: &Path) -> SearchPaths {
        let mut paths = SearchPaths::new(self.case_insensitive_paths);
        if let Some(program_dir) = program_dir {
            paths.push(program_dir);
        }
        for path in &self.dsym_paths {
            paths.push(absolute(path, cwd));
        }
        if let Some(report_dir) = crash_report.parent() {
            paths.push(report_dir);
        }
        paths.push(cwd);
        paths
    }

    pub fn property_reader(&self) -> Box<dyn PropertyReader> {
        match &self.plist_buddy {
            Some(program) => Box::new(PlistBuddy::new(program, self.timeout)),
            None => properties::system_default(self.timeout),
        }
    }

    pub fn resolver(&self) -> Atos {
        Atos::new(&self.resolver_program)
            .timeout(self.timeout)
            .keep_blank_lines(self.keep_blank_lines)
    }
}

/// Makes `path` absolute and folds `.` and `..` without touching the file system.
fn absolute(path: &Path, cwd: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            // popping the root is a no-op, `/..` stays `/`
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn crash_report_must_be_a_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.crash"), "").unwrap();

        let found = Config::new("app.crash").crash_report_path(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("app.crash"));

        match Config::new("missing.crash").crash_report_path(dir.path()) {
            Err(Error::CrashReportMissing(path)) => assert_eq!(path, dir.path().join("missing.crash")),
            other => panic!("unexpected {:?}", other),
        }
        match Config::new(dir.path()).crash_report_path(dir.path()) {
            Err(Error::CrashReportNotAFile(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn search_path_order() {
        let mut config = Config::new("/reports/app.crash");
        config.dsym_paths = vec![PathBuf::from("dsyms"), PathBuf::from("/opt/dsyms")];
        let paths = config.search_paths(Path::new("/reports/app.crash"), Some(Path::new("/usr/local/bin")), Path::new("/work"));
        assert_eq!(
            paths.iter().collect::<Vec<_>>(),
            vec![
                Path::new("/usr/local/bin"),
                Path::new("/work/dsyms"),
                Path::new("/opt/dsyms"),
                Path::new("/reports"),
                Path::new("/work"),
            ]
        );
    }

    #[test]
    fn dot_segments_do_not_defeat_deduplication() {
        let mut config = Config::new("/reports/app.crash");
        config.dsym_paths = vec![
            PathBuf::from("dsyms/../dsyms"),
            PathBuf::from("./dsyms"),
            PathBuf::from("/opt/x/../dsyms/."),
        ];
        let paths = config.search_paths(Path::new("/reports/app.crash"), None, Path::new("/work"));
        assert_eq!(
            paths.iter().collect::<Vec<_>>(),
            vec![Path::new("/work/dsyms"), Path::new("/opt/dsyms"), Path::new("/reports"), Path::new("/work")]
        );
    }

    #[test]
    fn absolute_folds_dot_segments() {
        assert_eq!(absolute(Path::new("../a/./b"), Path::new("/x/y")), PathBuf::from("/x/a/b"));
        assert_eq!(absolute(Path::new("/../a"), Path::new("/x")), PathBuf::from("/a"));
    }

    #[test]
    fn duplicate_search_paths_keep_last_position() {
        let mut config = Config::new("/work/app.crash");
        config.dsym_paths = vec![PathBuf::from("/WORK")];
        let paths = config.search_paths(Path::new("/work/app.crash"), None, Path::new("/Work"));
        assert_eq!(paths.iter().collect::<Vec<_>>(), vec![Path::new("/Work")]);

        config.case_insensitive_paths = false;
        let paths = config.search_paths(Path::new("/work/app.crash"), None, Path::new("/Work"));
        assert_eq!(paths.len(), 3);
    }
}
