// SPDX-License-Identifier: GPL-3.0-only

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::PlannerConfig;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_ENV: &str = "STORAGE_PLANNER_LOG_FILE";
const LOG_DIR_ENV: &str = "STORAGE_PLANNER_LOG_DIR";
const DEFAULT_LOG_PREFIX: &str = "storage-planner.log";
const KEEP_DAYS: u64 = 7;

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level. When the log file cannot be
/// opened the planner keeps logging to stderr.
pub fn init(config: &PlannerConfig) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => default_filter(config.log_level.as_directive())?,
    };

    let file_writer = if config.log_to_disk {
        let target = LogTarget::resolve(|key| std::env::var_os(key));
        match target.open() {
            Ok((writer, guard)) => Some((writer, guard, target)),
            Err(e) => {
                eprintln!("storage-planner: file logging disabled: {e:#}");
                None
            }
        }
    } else {
        None
    };

    let (file_layer, guard, target) = match file_writer {
        Some((writer, guard, target)) => (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_target(true),
            ),
            Some(guard),
            Some(target),
        ),
        None => (None, None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .with(file_layer)
        .try_init()?;

    if let Some(guard) = guard {
        let _ = LOG_GUARD.set(guard);
    }
    if let Some(target) = target {
        tracing::debug!(dir = %target.dir.display(), "planner log file opened");
    }

    Ok(())
}

fn default_filter(directive: &str) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::new(directive);
    for crate_name in ["storage_planner", "storage_contracts"] {
        filter = filter.add_directive(format!("{crate_name}={directive}").parse()?);
    }
    Ok(filter.add_directive("zbus=warn".parse()?))
}

/// Directory and file prefix of the rolling planner log
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogTarget {
    dir: PathBuf,
    prefix: OsString,
}

impl LogTarget {
    /// `STORAGE_PLANNER_LOG_FILE`, then `STORAGE_PLANNER_LOG_DIR`, then the
    /// XDG state directory
    fn resolve(var: impl Fn(&str) -> Option<OsString>) -> Self {
        if let Some(file) = var(LOG_FILE_ENV).map(PathBuf::from) {
            let dir = file
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| state_dir(&var));
            let prefix = file
                .file_name()
                .map(OsString::from)
                .unwrap_or_else(|| DEFAULT_LOG_PREFIX.into());
            return Self { dir, prefix };
        }

        let dir = var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| state_dir(&var));
        Self {
            dir,
            prefix: DEFAULT_LOG_PREFIX.into(),
        }
    }

    fn open(&self) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create log directory {}", self.dir.display()))?;

        let cutoff = SystemTime::now()
            .checked_sub(Duration::from_secs(KEEP_DAYS * 24 * 60 * 60))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.remove_older_than(cutoff);

        let appender = tracing_appender::rolling::daily(&self.dir, &self.prefix);
        Ok(tracing_appender::non_blocking(appender))
    }

    /// Delete rotated files of this target last modified before `cutoff`
    fn remove_older_than(&self, cutoff: SystemTime) -> usize {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return 0;
        };
        let prefix = self.prefix.to_string_lossy();

        entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix.as_ref()))
            .filter(|entry| {
                entry
                    .metadata()
                    .and_then(|meta| meta.modified())
                    .is_ok_and(|modified| modified < cutoff)
            })
            .filter(|entry| fs::remove_file(entry.path()).is_ok())
            .count()
    }
}

fn state_dir(var: &impl Fn(&str) -> Option<OsString>) -> PathBuf {
    let base = var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| var("HOME").map(|home| PathBuf::from(home).join(".local/state")))
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    base.join("storage-planner").join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<OsString> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| OsString::from(v))
        }
    }

    #[test]
    fn log_file_overrides_directory() {
        let target = LogTarget::resolve(env(&[
            (LOG_FILE_ENV, "/var/log/planner/run.log"),
            (LOG_DIR_ENV, "/ignored"),
        ]));
        assert_eq!(target.dir, PathBuf::from("/var/log/planner"));
        assert_eq!(target.prefix, OsString::from("run.log"));
    }

    #[test]
    fn state_dir_falls_back_to_home() {
        let target = LogTarget::resolve(env(&[("HOME", "/home/ada")]));
        assert_eq!(target.dir, PathBuf::from("/home/ada/.local/state/storage-planner/logs"));
        assert_eq!(target.prefix, OsString::from(DEFAULT_LOG_PREFIX));

        let target = LogTarget::resolve(env(&[("XDG_STATE_HOME", "/state"), ("HOME", "/home/ada")]));
        assert_eq!(target.dir, PathBuf::from("/state/storage-planner/logs"));
    }

    #[test]
    fn cleanup_only_removes_old_prefixed_files() {
        let dir = std::env::temp_dir().join(format!("storage-planner-logs-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create dir");
        let ours = dir.join("storage-planner.log.2020-01-01");
        let foreign = dir.join("other.log");
        fs::write(&ours, "old").expect("write");
        fs::write(&foreign, "old").expect("write");

        let old = SystemTime::now() - Duration::from_secs((KEEP_DAYS + 1) * 24 * 60 * 60);
        for path in [&ours, &foreign] {
            fs::File::options()
                .write(true)
                .open(path)
                .and_then(|file| file.set_modified(old))
                .expect("set mtime");
        }

        let target = LogTarget {
            dir: dir.clone(),
            prefix: DEFAULT_LOG_PREFIX.into(),
        };
        let cutoff = SystemTime::now() - Duration::from_secs(KEEP_DAYS * 24 * 60 * 60);

        assert_eq!(target.remove_older_than(cutoff), 1);
        assert!(!ours.exists());
        assert!(foreign.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn stderr_only_logging_installs_once() {
        let config = PlannerConfig {
            log_to_disk: false,
            ..PlannerConfig::default()
        };
        assert!(init(&config).is_ok());
        assert!(init(&config).is_err());
    }
}
