//! Device compiler discovery.
//!
//! The host compiler's own path seeds the search: the device code
//! generator is expected to live next to it. When the host compiler was
//! itself resolved through the search path (no directory component), the
//! device binary is assumed to be resolvable the same way. Otherwise the
//! sibling location is probed first, then each entry of the
//! colon-separated search list in order.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DriverError, DriverResult};

/// Executable name of the device code generator.
pub const DEVICE_COMPILER: &str = "riscv64-offload-cc";

/// Resolve the device compiler relative to the host compiler path.
///
/// `search_path` is a colon-separated directory list consulted only when
/// the sibling probe misses. The first executable hit wins.
pub fn locate(reference: &str, search_path: Option<&str>, name: &str) -> DriverResult<PathBuf> {
    let reference = Path::new(reference);
    let dir = match reference.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        // Bare name: the host compiler came from the search path, so the
        // device compiler must be resolvable the same way.
        _ => return Ok(PathBuf::from(name)),
    };

    let sibling = dir.join(name);
    if is_executable(&sibling) {
        return Ok(sibling);
    }

    if let Some(list) = search_path {
        for entry in list.split(':') {
            let candidate = Path::new(entry).join(name);
            if is_executable(&candidate) {
                return Ok(candidate);
            }
        }
    }

    Err(DriverError::ToolchainNotFound {
        name: name.to_string(),
    })
}

/// A candidate counts only if it exists, is not a directory, and carries
/// an execute bit.
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match fs::metadata(path) {
        Ok(meta) => !meta.is_dir() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::unix::fs::PermissionsExt;

    fn make_executable(path: &Path) {
        File::create(path).unwrap();
        let mut perms = fs::metadata(path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).unwrap();
    }

    #[test]
    fn bare_reference_defers_to_search_path_resolution() {
        let found = locate("host-cc", None, "device-cc").unwrap();
        assert_eq!(found, PathBuf::from("device-cc"));
    }

    #[test]
    fn sibling_of_host_compiler_wins() {
        let dir = tempfile::tempdir().unwrap();
        make_executable(&dir.path().join("device-cc"));
        let host = dir.path().join("host-cc");
        let found = locate(host.to_str().unwrap(), None, "device-cc").unwrap();
        assert_eq!(found, dir.path().join("device-cc"));
    }

    #[test]
    fn first_search_path_hit_wins_in_order() {
        let host_dir = tempfile::tempdir().unwrap();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        make_executable(&first.path().join("device-cc"));
        make_executable(&second.path().join("device-cc"));

        let search = format!(
            "{}:{}",
            first.path().display(),
            second.path().display()
        );
        let host = host_dir.path().join("host-cc");
        let found = locate(host.to_str().unwrap(), Some(&search), "device-cc").unwrap();
        assert_eq!(found, first.path().join("device-cc"));
    }

    #[test]
    fn non_executable_candidates_are_skipped() {
        let host_dir = tempfile::tempdir().unwrap();
        let plain = tempfile::tempdir().unwrap();
        let exec = tempfile::tempdir().unwrap();

        let non_exec = plain.path().join("device-cc");
        File::create(&non_exec).unwrap();
        let mut perms = fs::metadata(&non_exec).unwrap().permissions();
        perms.set_mode(0o644);
        fs::set_permissions(&non_exec, perms).unwrap();

        make_executable(&exec.path().join("device-cc"));

        let search = format!("{}:{}", plain.path().display(), exec.path().display());
        let host = host_dir.path().join("host-cc");
        let found = locate(host.to_str().unwrap(), Some(&search), "device-cc").unwrap();
        assert_eq!(found, exec.path().join("device-cc"));
    }

    #[test]
    fn directories_are_not_executables() {
        let host_dir = tempfile::tempdir().unwrap();
        let trap = tempfile::tempdir().unwrap();
        fs::create_dir(trap.path().join("device-cc")).unwrap();

        let search = trap.path().display().to_string();
        let host = host_dir.path().join("host-cc");
        let err = locate(host.to_str().unwrap(), Some(&search), "device-cc").unwrap_err();
        assert!(matches!(err, DriverError::ToolchainNotFound { name } if name == "device-cc"));
    }
}
