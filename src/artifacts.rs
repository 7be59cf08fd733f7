//! Intermediate artifact registry.
//!
//! Every scratch file the pipeline creates is registered here, and the
//! registry alone is responsible for deleting them. The registry is an
//! explicit owner object: the orchestrator constructs it once, threads it
//! through the stages, and its `Drop` runs the cleanup on every exit path,
//! early returns and propagated failures included. Under
//! save-intermediates mode artifacts get deterministic prefix-derived
//! names and deletion is suppressed, but the paths are still tracked.
//!
//! Termination by signal bypasses `Drop`, so temp-mode paths are mirrored
//! into a process-wide list consumed by a minimal handler that unlinks
//! them and re-raises with the default disposition.

use std::ffi::CString;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

static SIGNAL_MIRROR: OnceLock<Mutex<Vec<CString>>> = OnceLock::new();

fn signal_mirror() -> &'static Mutex<Vec<CString>> {
    SIGNAL_MIRROR.get_or_init(|| Mutex::new(Vec::new()))
}

/// Registry of intermediate files owned by the current run.
#[derive(Debug)]
pub struct ArtifactRegistry {
    paths: Vec<PathBuf>,
    keep: bool,
    dump_base: String,
}

impl ArtifactRegistry {
    /// `keep` corresponds to save-intermediates mode; `dump_base` is the
    /// prefix deterministic artifact names derive from.
    pub fn new(keep: bool, dump_base: &str) -> Self {
        Self {
            paths: Vec::new(),
            keep,
            dump_base: dump_base.to_string(),
        }
    }

    /// Produce a path for a stage artifact without creating the file.
    ///
    /// Temp mode mints a unique name through `tempfile` (the placeholder
    /// is removed again; the stage that asked creates the real file).
    /// Save mode returns the deterministic `<dump_base><suffix>` name.
    /// The path is not registered; callers register it once the artifact
    /// actually exists, or immediately via [`ArtifactRegistry::scratch`].
    pub fn reserve(&self, suffix: &str) -> io::Result<PathBuf> {
        if self.keep {
            return Ok(PathBuf::from(format!("{}{}", self.dump_base, suffix)));
        }
        let placeholder = tempfile::Builder::new()
            .prefix("mkoffload-")
            .suffix(suffix)
            .tempfile()?;
        let path = placeholder.path().to_path_buf();
        placeholder.close()?;
        Ok(path)
    }

    /// Reserve a path and register it right away, for artifacts the
    /// requesting stage is guaranteed to create.
    pub fn scratch(&mut self, suffix: &str) -> io::Result<PathBuf> {
        let path = self.reserve(suffix)?;
        self.register(path.clone());
        Ok(path)
    }

    /// Record a path for exit-time cleanup.
    pub fn register(&mut self, path: PathBuf) {
        use std::os::unix::ffi::OsStrExt;
        if !self.keep {
            if let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) {
                if let Ok(mut mirror) = signal_mirror().lock() {
                    mirror.push(cpath);
                }
            }
        }
        self.paths.push(path);
    }

    pub fn registered(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Delete every registered path that still exists. Idempotent: the
    /// list is drained, so a second call is a no-op, and already-missing
    /// files are not errors. Save mode drains without deleting.
    pub fn cleanup_all(&mut self) {
        let paths = std::mem::take(&mut self.paths);
        if let Ok(mut mirror) = signal_mirror().lock() {
            mirror.clear();
        }
        if self.keep {
            for path in &paths {
                log::debug!("keeping intermediate '{}'", path.display());
            }
            return;
        }
        for path in paths {
            match fs::remove_file(&path) {
                Ok(()) => log::trace!("removed intermediate '{}'", path.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    log::warn!("could not remove intermediate '{}': {err}", path.display());
                }
            }
        }
    }
}

impl Drop for ArtifactRegistry {
    fn drop(&mut self) {
        self.cleanup_all();
    }
}

extern "C" fn remove_artifacts_on_signal(signum: libc::c_int) {
    if let Some(mirror) = SIGNAL_MIRROR.get() {
        if let Ok(paths) = mirror.try_lock() {
            for path in paths.iter() {
                unsafe {
                    libc::unlink(path.as_ptr());
                }
            }
        }
    }
    unsafe {
        libc::signal(signum, libc::SIG_DFL);
        libc::raise(signum);
    }
}

/// Arrange for registered temp-mode artifacts to be unlinked when the
/// process is killed by a termination signal.
pub fn install_signal_cleanup() {
    let handler = remove_artifacts_on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        for signal in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP] {
            libc::signal(signal, handler);
        }
    }
}
