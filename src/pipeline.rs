//! Stage sequencing for the offload driver.
//!
//! One invocation is processed per process lifetime, strictly forward:
//! toolchain resolution, argument translation, the device compile
//! subprocess, per-object debug extraction, the device link subprocess.
//! Any stage error propagates out as [`DriverError`] and the artifact
//! registry's `Drop` still performs cleanup.
//!
//! Environment hygiene is scoped: the capability side-channel variable is
//! set only around the compile stage and cleared regardless of outcome,
//! and the toolchain redirection variables are unset around the link
//! stage and restored afterwards, failure included.

use std::env;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use crate::artifacts::ArtifactRegistry;
use crate::debuginfo;
use crate::error::{DriverError, DriverResult};
use crate::invocation::{ArgumentSet, Invocation};
use crate::requires::{self, DeviceRequirements};
use crate::toolchain;

/// Reference host-compiler path; required.
pub const HOST_COMPILER_ENV: &str = "HOST_COMPILER";
/// Colon-separated fallback search list for the device compiler.
pub const SEARCH_PATH_ENV: &str = "COMPILER_PATH";
/// Side-channel file the compile stage reports capabilities through.
pub const REQUIRES_FILE_ENV: &str = "OFFLOAD_REQUIRES_FILE";

/// Variables that could redirect the device toolchain's own lookups back
/// at the host installation; scrubbed around the link stage.
const LINK_SCRUBBED_ENV: [&str; 3] = ["TOOLCHAIN_EXEC_PREFIX", "COMPILER_PATH", "LIBRARY_PATH"];

/// Subprocess stages, named for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compile,
    Link,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Compile => write!(f, "device compile"),
            Stage::Link => write!(f, "device link"),
        }
    }
}

/// Saves a set of variables, removes them, and restores the previous
/// state on drop, so a failing stage cannot poison the ones after it.
struct EnvGuard {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl EnvGuard {
    fn unset(names: &[&'static str]) -> Self {
        let saved = names
            .iter()
            .map(|&name| {
                let value = env::var_os(name);
                env::remove_var(name);
                (name, value)
            })
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (name, value) in self.saved.drain(..) {
            match value {
                Some(value) => env::set_var(name, value),
                None => env::remove_var(name),
            }
        }
    }
}

/// Sets one variable for the lifetime of a stage and clears it on drop.
struct ScopedEnv {
    name: &'static str,
}

impl ScopedEnv {
    fn set(name: &'static str, value: &OsStr) -> Self {
        env::set_var(name, value);
        Self { name }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        env::remove_var(self.name);
    }
}

/// Typed result of the compile stage.
struct CompileOutcome {
    assembly: PathBuf,
    requirements: DeviceRequirements,
}

/// Run the whole pipeline. `argv` is the raw vector minus the program
/// name. `Ok(())` means the link stage succeeded and the image is at the
/// resolved output path.
pub fn run(argv: &[String]) -> DriverResult<()> {
    let host_compiler = env::var(HOST_COMPILER_ENV).map_err(|_| DriverError::MissingEnv {
        name: HOST_COMPILER_ENV,
    })?;
    let search_path = env::var(SEARCH_PATH_ENV).ok();
    let device_cc = toolchain::locate(
        &host_compiler,
        search_path.as_deref(),
        toolchain::DEVICE_COMPILER,
    )?;
    log::debug!("device compiler: {}", device_cc.display());

    let invocation = Invocation::parse(argv)?;
    let mut registry =
        ArtifactRegistry::new(invocation.save_intermediates, &invocation.dump_base);

    let outcome = compile_stage(&device_cc, &invocation, &mut registry)?;
    if outcome.requirements.is_empty() {
        log::debug!("compile stage reported no capability requirements");
    } else {
        log::info!("offload regions require: {}", outcome.requirements);
    }

    let bundles = extract_bundles(&invocation, &mut registry)?;
    link_stage(&device_cc, &invocation, &outcome, &bundles)?;
    Ok(())
}

fn compile_stage(
    device_cc: &Path,
    invocation: &Invocation,
    registry: &mut ArtifactRegistry,
) -> DriverResult<CompileOutcome> {
    let assembly = registry
        .scratch(".mkoffload.s")
        .map_err(DriverError::Scratch)?;
    let requires_file = registry
        .scratch(".mkoffload.requires")
        .map_err(DriverError::Scratch)?;

    let mut args = invocation.compile_args();
    args.push("-dumpdir");
    args.push("");
    args.push("-dumpbase");
    args.push(format!("{}.mkoffload", invocation.dump_base));
    args.push("-dumpbase-ext");
    args.push("");
    args.push("-o");
    args.push_path(&assembly);
    let args = args.finish();

    let status = {
        let _side_channel = ScopedEnv::set(REQUIRES_FILE_ENV, requires_file.as_os_str());
        run_stage(Stage::Compile, device_cc, &args, invocation.verbose)
    }?;
    if !status.success() {
        return Err(DriverError::StageFailed {
            stage: Stage::Compile,
            status,
        });
    }

    let requirements = requires::read(&requires_file).map_err(DriverError::Requires)?;
    Ok(CompileOutcome {
        assembly,
        requirements,
    })
}

fn extract_bundles(
    invocation: &Invocation,
    registry: &mut ArtifactRegistry,
) -> DriverResult<Vec<PathBuf>> {
    let mut bundles = Vec::new();
    for (index, object) in invocation.objects.iter().enumerate() {
        let bundle = registry
            .reserve(&format!(".mkoffload.dbg{index}.o"))
            .map_err(DriverError::Scratch)?;
        match debuginfo::extract_debug_bundle(object, &bundle) {
            Ok(summary) => {
                log::debug!(
                    "extracted {} debug bytes, {} relocations from '{}'",
                    summary.debug_bytes,
                    summary.relocations,
                    object.display()
                );
                registry.register(bundle.clone());
                bundles.push(bundle);
            }
            Err(err) if err.is_benign() => {
                log::debug!("no debug bundle from '{}': {err}", object.display());
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(bundles)
}

fn link_stage(
    device_cc: &Path,
    invocation: &Invocation,
    outcome: &CompileOutcome,
    bundles: &[PathBuf],
) -> DriverResult<()> {
    let mut args = invocation.link_args();
    args.push_path(&outcome.assembly);
    for bundle in bundles {
        args.push_path(bundle);
    }
    args.push("-o");
    args.push_path(&invocation.output);
    let args = args.finish();

    let status = {
        let _scrubbed = EnvGuard::unset(&LINK_SCRUBBED_ENV);
        run_stage(Stage::Link, device_cc, &args, invocation.verbose)
    }?;
    if !status.success() {
        return Err(DriverError::StageFailed {
            stage: Stage::Link,
            status,
        });
    }
    Ok(())
}

/// Launch one stage subprocess and wait for it.
fn run_stage(
    stage: Stage,
    program: &Path,
    args: &ArgumentSet,
    verbose: bool,
) -> DriverResult<ExitStatus> {
    if verbose {
        eprintln!("[mkoffload] {} {}", program.display(), args.display());
    }
    log::debug!("{stage}: {} {}", program.display(), args.display());
    Command::new(program)
        .args(args.iter())
        .status()
        .map_err(|source| DriverError::Spawn {
            stage,
            program: program.to_path_buf(),
            source,
        })
}
