use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// First line of `path` without its line ending.
pub fn read_secret_file(path: &Path) -> Result<String> {
    let data = fs::read_to_string(path).map_err(|e| {
        Error::precondition(format!(
            "failed to read password file {}: {e}",
            path.display()
        ))
    })?;
    let line = data.lines().next().unwrap_or("");
    if line.is_empty() {
        return Err(Error::usage(format!(
            "password file {} is empty",
            path.display()
        )));
    }
    Ok(line.to_string())
}

/// Either the contents of `file` or an interactive prompt.
pub fn obtain_secret(file: Option<&Path>, prompt: &str) -> Result<String> {
    match file {
        Some(p) => read_secret_file(p),
        None => prompt_secret(prompt),
    }
}

/// Asks for a secret on stderr and reads it from stdin without echo when stdin is a terminal.
pub fn prompt_secret(prompt: &str) -> Result<String> {
    let mut stderr = io::stderr();
    write!(stderr, "{prompt}: ")
        .and_then(|_| stderr.flush())
        .map_err(|e| Error::msg(format!("failed to write prompt: {e}")))?;

    let line = {
        let _echo = EchoGuard::disable();
        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| Error::msg(format!("failed to read from stdin: {e}")))?;
        line
    };
    let _ = writeln!(stderr);

    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        return Err(Error::usage("no password given"));
    }
    Ok(secret)
}

/// Restores the terminal's echo flag on drop.
struct EchoGuard {
    #[cfg(unix)]
    saved: Option<libc::termios>,
}

#[cfg(unix)]
impl EchoGuard {
    fn disable() -> Self {
        let fd = libc::STDIN_FILENO;
        if unsafe { libc::isatty(fd) } != 1 {
            return Self { saved: None };
        }
        let mut term: libc::termios = unsafe { std::mem::zeroed() };
        if unsafe { libc::tcgetattr(fd, &mut term) } != 0 {
            return Self { saved: None };
        }
        let saved = term;
        term.c_lflag &= !libc::ECHO;
        if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &term) } != 0 {
            return Self { saved: None };
        }
        Self { saved: Some(saved) }
    }
}

#[cfg(unix)]
impl Drop for EchoGuard {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            let _ = unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &saved) };
        }
    }
}

#[cfg(not(unix))]
impl EchoGuard {
    fn disable() -> Self {
        Self {}
    }
}
