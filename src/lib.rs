//! Modgen Core - HumHub module scaffold generator
//!
//! # Guarantees
//! 1. Names are sanitized to `[a-z0-9_]` and never empty
//! 2. Rendering is deterministic: same request, same bytes
//! 3. Nothing touches the disk until the request is valid
//! 4. A failed run leaves no working tree and no archive behind
//! 5. The archive holds exactly the generated files
//! 6. One live run per working tree and archive, process-wide

pub mod archive;
pub mod config;
pub mod error;
pub mod hashing;
pub mod identifier;
pub mod layout;
pub mod locks;
pub mod pipeline;
pub mod request;
pub mod templates;
pub mod validation;

pub use archive::{ArchiveError, Compression, EntrySummary};
pub use config::{ConfigError, GeneratorConfig};
pub use error::{ErrorKind, GenerationFailure, GeneratorError};
pub use identifier::{sanitize, ModuleIdentifier};
pub use layout::{FileWriter, FsFileWriter};
pub use pipeline::{
    Delivery, GeneratedModule, GenerationPlan, GenerationReport, ModuleGenerator, RunState,
};
pub use request::{GenerationRequest, MetadataFields};
pub use templates::{render, FileKind, RenderInput};
pub use validation::{ValidationResult, ValidationViolation, ViolationSeverity, WarningPolicy};

pub const GENERATOR_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const MIN_HUMHUB_VERSION: &str = "1.16.0";
pub const MODULE_VERSION: &str = "1.0.0";
pub const MODULE_KEYWORDS: [&str; 2] = ["humhub", "module"];
