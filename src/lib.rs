//! mkoffload - device image build driver for RISC-V offload targets.
//!
//! Given the argument vector of a host compiler invocation, this crate
//! retargets it into device-compiler and device-linker invocations, lifts
//! the embedded early-debug payload out of each host object file into a
//! standalone debug bundle with its relocations rewritten for the device
//! architecture, and links the final device image.
//!
//! # Architecture
//!
//! - [`invocation`] - argument scanning and compile/link argument sets
//! - [`toolchain`] - device compiler discovery
//! - [`artifacts`] - intermediate file registry with exit-time cleanup
//! - [`debuginfo`] - debug payload extraction and relocation retargeting
//! - [`requires`] - capability metadata handed back by the compile stage
//! - [`pipeline`] - stage sequencing and subprocess execution

pub mod artifacts;
pub mod debuginfo;
pub mod error;
pub mod invocation;
pub mod pipeline;
pub mod requires;
pub mod toolchain;

pub use artifacts::ArtifactRegistry;
pub use debuginfo::{extract_debug_bundle, ExtractError, ExtractSummary};
pub use error::{DriverError, DriverResult};
pub use invocation::{ArgumentSet, ArgumentSetBuilder, Invocation, ParallelModel, TargetAbi};
pub use pipeline::Stage;
pub use requires::DeviceRequirements;
