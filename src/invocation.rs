//! Argument translation for the offload driver.
//!
//! The host compiler hands us its raw argument vector. One left-to-right
//! scan derives the configuration flags, peels off consumed options, and
//! partitions every remaining token into exactly one of: the object-file
//! list (routed to debug extraction), the link-stage pass-through set, or
//! the compile-stage pass-through set. The compile and link argument sets
//! never share a token.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{DriverError, DriverResult};

/// Pointer-width variant of the device data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetAbi {
    /// 64-bit pointers.
    Wide,
    /// 32-bit pointers.
    Narrow,
}

impl TargetAbi {
    /// The ABI selection flag understood by the device compiler.
    pub fn device_flag(self) -> &'static str {
        match self {
            TargetAbi::Wide => "-mabi=lp64d",
            TargetAbi::Narrow => "-mabi=ilp32d",
        }
    }
}

/// The two mutually exclusive offload execution models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelModel {
    ModelA,
    ModelB,
}

/// Append-only builder for one subprocess argument vector.
///
/// Finalize with [`ArgumentSetBuilder::finish`]; the resulting
/// [`ArgumentSet`] is read-only. Compile and link sets are built from
/// independent builders so their storage can never alias.
#[derive(Debug, Default)]
pub struct ArgumentSetBuilder {
    args: Vec<OsString>,
}

impl ArgumentSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, arg: impl Into<OsString>) {
        self.args.push(arg.into());
    }

    pub fn push_path(&mut self, path: &Path) {
        self.args.push(path.as_os_str().to_os_string());
    }

    /// Freeze the set. Nothing can be appended afterwards.
    pub fn finish(self) -> ArgumentSet {
        ArgumentSet {
            args: self.args.into_boxed_slice(),
        }
    }
}

/// A finalized, immutable argument vector for one subprocess.
#[derive(Debug)]
pub struct ArgumentSet {
    args: Box<[OsString]>,
}

impl ArgumentSet {
    pub fn iter(&self) -> impl Iterator<Item = &OsString> {
        self.args.iter()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Space-joined rendering for command echo and logs.
    pub fn display(&self) -> String {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Prefixes whose arguments are link-stage pass-through: library search
/// paths, libraries, linker forwarding, architecture selection.
const LINK_PASSTHROUGH_PREFIXES: [&str; 4] = ["-l", "-L", "-Wl", "-march"];

fn is_link_passthrough(arg: &str) -> bool {
    LINK_PASSTHROUGH_PREFIXES.iter().any(|p| arg.starts_with(p))
}

/// The parsed driver invocation: derived flags plus partitioned
/// pass-through tokens. Immutable once parsed.
#[derive(Debug)]
pub struct Invocation {
    pub abi: TargetAbi,
    pub model: ParallelModel,
    pub pic_small: bool,
    pub pic_full: bool,
    pub verbose: bool,
    pub save_intermediates: bool,
    /// Prefix for intermediate artifact names. Defaults to the output path.
    pub dump_base: String,
    /// Final device image path.
    pub output: PathBuf,
    /// Host object files routed to debug extraction.
    pub objects: Vec<PathBuf>,
    compile_extra: Vec<String>,
    link_extra: Vec<String>,
}

impl Invocation {
    /// Scan the raw argument vector (without the program name).
    pub fn parse(argv: &[String]) -> DriverResult<Invocation> {
        let mut abi = None;
        let mut model_a = false;
        let mut model_b = false;
        let mut pic_small = false;
        let mut pic_full = false;
        let mut verbose = false;
        let mut save_intermediates = false;
        let mut dump_base = None;
        let mut output: Option<PathBuf> = None;
        let mut objects = Vec::new();
        let mut compile_extra = Vec::new();
        let mut link_extra = Vec::new();

        let mut iter = argv.iter();
        while let Some(arg) = iter.next() {
            if let Some(value) = arg.strip_prefix("--target-abi=") {
                abi = Some(match value {
                    "wide" => TargetAbi::Wide,
                    "narrow" => TargetAbi::Narrow,
                    other => {
                        return Err(DriverError::UnknownAbi {
                            value: other.to_string(),
                        })
                    }
                });
            } else if arg == "--parallel-model-a" {
                model_a = true;
            } else if arg == "--parallel-model-b" {
                model_b = true;
            } else if arg == "--pic" {
                pic_small = true;
            } else if arg == "--PIC" {
                pic_full = true;
            } else if arg == "--verbose" {
                verbose = true;
            } else if arg == "--save-intermediates" {
                save_intermediates = true;
            } else if arg == "--dump-base" {
                let value = iter.next().ok_or_else(|| DriverError::MissingValue {
                    option: arg.clone(),
                })?;
                dump_base = Some(value.clone());
            } else if arg == "-o" {
                let value = iter.next().ok_or_else(|| DriverError::MissingValue {
                    option: arg.clone(),
                })?;
                output = Some(PathBuf::from(value));
            } else if arg.ends_with(".o") {
                objects.push(PathBuf::from(arg));
            } else if is_link_passthrough(arg) {
                link_extra.push(arg.clone());
            } else {
                compile_extra.push(arg.clone());
            }
        }

        // The models are mutually exclusive execution strategies; exactly
        // one must govern the invocation.
        if model_a == model_b {
            return Err(DriverError::ModelSelection);
        }
        let model = if model_a {
            ParallelModel::ModelA
        } else {
            ParallelModel::ModelB
        };

        let abi = abi.ok_or(DriverError::MissingAbi)?;

        let (output, dump_base) = match (output, dump_base) {
            (Some(out), Some(base)) => (out, base),
            (Some(out), None) => {
                let base = out.to_string_lossy().into_owned();
                (out, base)
            }
            (None, Some(base)) => (PathBuf::from(format!("{base}.img")), base),
            (None, None) => return Err(DriverError::NoOutputPath),
        };

        Ok(Invocation {
            abi,
            model,
            pic_small,
            pic_full,
            verbose,
            save_intermediates,
            dump_base,
            output,
            objects,
            compile_extra,
            link_extra,
        })
    }

    /// Compile-stage argument set: translated flags followed by the
    /// compile-only pass-through tokens. The orchestrator appends the dump
    /// group and the output location before finalizing.
    pub fn compile_args(&self) -> ArgumentSetBuilder {
        let mut builder = ArgumentSetBuilder::new();
        builder.push("-S");
        if self.save_intermediates {
            builder.push("-save-temps");
        }
        if self.verbose {
            builder.push("-v");
        }
        builder.push(self.abi.device_flag());
        builder.push("-xlto");
        if self.model == ParallelModel::ModelA {
            builder.push("-mgomp");
        }
        if self.pic_small {
            builder.push("-fpic");
        }
        if self.pic_full {
            builder.push("-fPIC");
        }
        for arg in &self.compile_extra {
            builder.push(arg);
        }
        builder
    }

    /// Link-stage argument set: forwarded mode flags plus the link
    /// pass-through tokens. The orchestrator appends the compiled
    /// assembly, the debug bundles, and the image path before finalizing.
    pub fn link_args(&self) -> ArgumentSetBuilder {
        let mut builder = ArgumentSetBuilder::new();
        if self.verbose {
            builder.push("-v");
        }
        if self.save_intermediates {
            builder.push("-save-temps");
        }
        for arg in &self.link_extra {
            builder.push(arg);
        }
        builder
    }

    pub fn compile_passthrough(&self) -> &[String] {
        &self.compile_extra
    }

    pub fn link_passthrough(&self) -> &[String] {
        &self.link_extra
    }
}
