use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Local;

use crate::config;

pub const LOG_FILE: &str = "logs.txt";

static LOG_HOME: OnceLock<PathBuf> = OnceLock::new();

/// Pin the log directory for the process. Later calls are ignored.
pub fn init(home: &Path) {
    let _ = LOG_HOME.set(home.to_path_buf());
}

fn log_home() -> PathBuf {
    LOG_HOME.get().cloned().unwrap_or_else(config::default_home)
}

fn is_quiet() -> bool {
    if env::var("TWIG_QUIET").map(|v| v == "1" || v == "true").unwrap_or(false) {
        return true;
    }
    env::var("TWIG_LOG")
        .map(|v| v.to_lowercase() == "quiet" || v.to_lowercase() == "error")
        .unwrap_or(false)
}

fn stamp(message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] {}", timestamp, message)
}

fn append(line: &str) {
    let home = log_home();
    if std::fs::create_dir_all(&home).is_err() {
        return;
    }
    // Append-only; never read back from worker threads.
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(home.join(LOG_FILE)) {
        let _ = writeln!(file, "{}", line);
    }
}

pub fn log(message: &str) {
    let line = stamp(message);
    if !is_quiet() {
        println!("{}", line);
    }
    append(&line);
}

/// Divergence and other non-fatal conditions.
pub fn warn(message: &str) {
    let line = stamp(&format!("warning: {}", message));
    eprintln!("{}", line);
    append(&line);
}

pub fn log_error(message: &str) {
    let line = stamp(&format!("error: {}", message));
    eprintln!("{}", line);
    append(&line);
}
