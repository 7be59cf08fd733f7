//! Capability requirements reported back by the compile stage.
//!
//! The device compiler cannot return structured data across the process
//! boundary, so it writes a small mask file at the path named by the
//! side-channel environment variable. The orchestrator reads that file
//! back as an ordinary typed value once the stage has finished.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Runtime capabilities the compiled offload regions require.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceRequirements {
    mask: u64,
}

impl DeviceRequirements {
    pub const UNIFIED_ADDRESS: u64 = 1 << 0;
    pub const UNIFIED_SHARED_MEMORY: u64 = 1 << 1;
    pub const REVERSE_OFFLOAD: u64 = 1 << 2;

    pub fn from_mask(mask: u64) -> Self {
        Self { mask }
    }

    pub fn mask(self) -> u64 {
        self.mask
    }

    pub fn is_empty(self) -> bool {
        self.mask == 0
    }

    pub fn requires(self, capability: u64) -> bool {
        self.mask & capability != 0
    }
}

impl fmt::Display for DeviceRequirements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut names = Vec::new();
        if self.requires(Self::UNIFIED_ADDRESS) {
            names.push("unified-address");
        }
        if self.requires(Self::UNIFIED_SHARED_MEMORY) {
            names.push("unified-shared-memory");
        }
        if self.requires(Self::REVERSE_OFFLOAD) {
            names.push("reverse-offload");
        }
        let known = Self::UNIFIED_ADDRESS | Self::UNIFIED_SHARED_MEMORY | Self::REVERSE_OFFLOAD;
        if self.mask & !known != 0 {
            names.push("unknown");
        }
        write!(f, "{}", names.join("+"))
    }
}

/// Parse the side-channel file the compile stage may have written.
///
/// A missing or empty file means the stage had nothing to report. The
/// mask is the first eight bytes, little-endian; a short non-empty file
/// is treated as empty with a warning rather than failing the build over
/// a diagnostic channel.
pub fn read(path: &Path) -> io::Result<DeviceRequirements> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(DeviceRequirements::default())
        }
        Err(err) => return Err(err),
    };
    if bytes.is_empty() {
        return Ok(DeviceRequirements::default());
    }
    if bytes.len() < 8 {
        log::warn!(
            "capability file '{}' is truncated ({} bytes); ignoring it",
            path.display(),
            bytes.len()
        );
        return Ok(DeviceRequirements::default());
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    Ok(DeviceRequirements::from_mask(u64::from_le_bytes(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let reqs = read(&dir.path().join("absent")).unwrap();
        assert!(reqs.is_empty());
    }

    #[test]
    fn mask_round_trips_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requires");
        let mask = DeviceRequirements::UNIFIED_ADDRESS | DeviceRequirements::REVERSE_OFFLOAD;
        fs::write(&path, mask.to_le_bytes()).unwrap();

        let reqs = read(&path).unwrap();
        assert!(reqs.requires(DeviceRequirements::UNIFIED_ADDRESS));
        assert!(reqs.requires(DeviceRequirements::REVERSE_OFFLOAD));
        assert!(!reqs.requires(DeviceRequirements::UNIFIED_SHARED_MEMORY));
        assert_eq!(reqs.to_string(), "unified-address+reverse-offload");
    }

    #[test]
    fn truncated_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("requires");
        fs::write(&path, [0x01, 0x02]).unwrap();
        assert!(read(&path).unwrap().is_empty());
    }
}
