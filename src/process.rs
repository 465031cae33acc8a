//! Running external tools with a bounded wait.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Runs `command` to completion, capturing both output streams.
///
/// Returns `Ok(None)` if the process did not exit, or its output did not
/// reach end of file, within `timeout`. The process is killed in the first
/// case. A `timeout` of `None` waits forever.
pub fn run_bounded(command: &mut Command, timeout: Option<Duration>) -> io::Result<Option<CommandOutput>> {
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let (sender, receiver) = mpsc::channel();
    drain(child.stdout.take(), Stream::Stdout, sender.clone());
    drain(child.stderr.take(), Stream::Stderr, sender);

    let status = match wait(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            abandon(&mut child)?;
            return Ok(None);
        }
        Err(err) => {
            let _ = abandon(&mut child);
            return Err(err);
        }
    };

    // Processes started by the child can keep the pipes open after it exits.
    let mut output = CommandOutput {
        status,
        stdout: String::new(),
        stderr: String::new(),
    };
    loop {
        let received = match deadline {
            Some(deadline) => receiver.recv_timeout(deadline.saturating_duration_since(Instant::now())),
            None => receiver.recv().map_err(RecvTimeoutError::from),
        };
        match received {
            Ok((Stream::Stdout, text)) => output.stdout = text,
            Ok((Stream::Stderr, text)) => output.stderr = text,
            Err(RecvTimeoutError::Disconnected) => return Ok(Some(output)),
            Err(RecvTimeoutError::Timeout) => return Ok(None),
        }
    }
}

fn wait(child: &mut Child, deadline: Option<Instant>) -> io::Result<Option<ExitStatus>> {
    let deadline = match deadline {
        Some(deadline) => deadline,
        None => return child.wait().map(Some),
    };
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kills and reaps `child`.
fn abandon(child: &mut Child) -> io::Result<()> {
    // the child may have exited since the last poll
    let _ = child.kill();
    child.wait().map(|_| ())
}

/// Reads `pipe` to the end on its own thread and sends the text once done.
fn drain<R: Read + Send + 'static>(pipe: Option<R>, stream: Stream, sender: Sender<(Stream, String)>) {
    if let Some(mut pipe) = pipe {
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            let _ = sender.send((stream, String::from_utf8_lossy(&bytes).into_owned()));
        });
    }
}

/// Trims every line of `text` and joins them with single spaces.
///
/// Blank lines are dropped unless `keep_blank_lines` is set.
pub fn flatten_output(text: &str, keep_blank_lines: bool) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| keep_blank_lines || !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_drops_blank_lines() {
        assert_eq!(
            flatten_output("  main (in App) (main.m:10)\n\n  \ttail\n", false),
            "main (in App) (main.m:10) tail"
        );
    }

    #[test]
    fn flatten_can_keep_blank_lines() {
        assert_eq!(flatten_output("a\n\nb\n", true), "a  b");
    }

    #[test]
    fn flatten_empty() {
        assert_eq!(flatten_output("", false), "");
        assert_eq!(flatten_output("\n \n", false), "");
    }

    #[cfg(unix)]
    #[test]
    fn captures_both_streams() {
        let output = run_bounded(
            Command::new("/bin/sh").args(&["-c", "echo out; echo err 1>&2; exit 3"]),
            Some(Duration::from_secs(10)),
        )
        .unwrap()
        .expect("should not time out");
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert_eq!(output.status.code(), Some(3));
    }

    #[cfg(unix)]
    #[test]
    fn kills_on_timeout() {
        let started = Instant::now();
        let output = run_bounded(
            Command::new("/bin/sh").args(&["-c", "sleep 5"]),
            Some(Duration::from_millis(100)),
        )
        .unwrap();
        assert!(output.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn background_process_holding_output_times_out() {
        let started = Instant::now();
        let output = run_bounded(
            Command::new("/bin/sh").args(&["-c", "sleep 3 & echo sym"]),
            Some(Duration::from_millis(200)),
        )
        .unwrap();
        assert!(output.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[cfg(unix)]
    #[test]
    fn unbounded_run_collects_output() {
        let output = run_bounded(Command::new("/bin/sh").args(&["-c", "echo sym"]), None)
            .unwrap()
            .expect("no timeout given");
        assert_eq!(output.stdout, "sym\n");
        assert!(output.status.success());
    }

    #[cfg(unix)]
    #[test]
    fn abandoned_child_is_killed_and_reaped() {
        let mut child = Command::new("/bin/sh").args(&["-c", "sleep 5"]).spawn().unwrap();
        abandon(&mut child).unwrap();
        let status = child.try_wait().unwrap().expect("already reaped status is kept");
        assert!(!status.success());
    }

    #[test]
    fn missing_program_is_an_error() {
        assert!(run_bounded(&mut Command::new("/nonexistent/tool-xyz"), None).is_err());
    }
}
