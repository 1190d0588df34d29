//! Core domain model types.
//!
//! This module contains the types every stage speaks:
//! - Stage status and kind enums
//! - Stage output type with factory methods
//! - Stage artifacts

mod artifact;
mod output;
mod status;

pub use artifact::StageArtifact;
pub use output::StageOutput;
pub use status::{StageKind, StageStatus};
