//! Generation Pipeline - single entry point
//!
//! sanitize -> validate -> render -> build skeleton -> write -> archive.
//! Any failure removes whatever the run put on disk before the error is
//! returned. A successful run hands back a [`GeneratedModule`] that owns the
//! working tree and archive until it is cleaned up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive;
use crate::config::GeneratorConfig;
use crate::error::{GenerationFailure, GeneratorError};
use crate::hashing::{request_fingerprint, sha256_file, sha256_hex};
use crate::identifier::ModuleIdentifier;
use crate::layout::{build_skeleton, remove_path, FileWriter, FsFileWriter};
use crate::locks::{PathClaim, PathLocks};
use crate::request::GenerationRequest;
use crate::templates::{render, FileKind, RenderInput};
use crate::validation::{RequestValidator, ValidationViolation};
use crate::GENERATOR_VERSION;

/// Lifecycle of one generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Generating,
    Packaged,
    Delivered,
    Failed,
}

impl RunState {
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Generating)
                | (Generating, Packaged)
                | (Generating, Failed)
                | (Packaged, Failed)
                | (Packaged, Delivered)
                | (Delivered, Idle)
                | (Failed, Idle)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Generating => "generating",
            RunState::Packaged => "packaged",
            RunState::Delivered => "delivered",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One rendered file, ready to be written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlannedFile {
    pub kind: FileKind,
    pub relative_path: String,
    pub contents: String,
}

/// Everything a run will write, computed without touching the filesystem.
#[derive(Debug, Clone)]
pub struct GenerationPlan {
    pub identifier: ModuleIdentifier,
    pub files: Vec<PlannedFile>,
    pub warnings: Vec<ValidationViolation>,
}

impl GenerationPlan {
    pub fn relative_paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.relative_path.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileReport {
    pub kind: FileKind,
    pub path: String,
    pub bytes: u64,
    pub sha256: String,
}

/// Serializable summary of a packaged run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationReport {
    pub run_id: Uuid,
    pub token: String,
    pub message: String,
    pub archive_path: PathBuf,
    pub archive_sha256: String,
    pub request_fingerprint: String,
    pub generator_version: String,
    pub generated_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
    pub warnings: Vec<ValidationViolation>,
}

/// Best-effort removal of a run's working tree and archive.
///
/// Missing paths count as already clean. Returns `true` only if every
/// removal that was needed succeeded.
pub fn cleanup_paths(base_path: &Path, archive_path: &Path) -> bool {
    let mut success = true;
    for path in [base_path, archive_path] {
        match remove_path(path) {
            Ok(true) => debug!("Removed {}", path.display()),
            Ok(false) => {}
            Err(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                success = false;
            }
        }
    }
    success
}

/// The generator - orchestrates every step and owns run serialization.
pub struct ModuleGenerator {
    config: GeneratorConfig,
    validator: RequestValidator,
    writer: Arc<dyn FileWriter>,
    locks: Arc<PathLocks>,
}

impl ModuleGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        let validator = RequestValidator::new(config.warnings);
        Self {
            config,
            validator,
            writer: Arc::new(FsFileWriter),
            locks: PathLocks::global(),
        }
    }

    /// Replace the file writer used for rendered files.
    pub fn with_writer(mut self, writer: impl FileWriter + 'static) -> Self {
        self.writer = Arc::new(writer);
        self
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Whether a live run, from any generator in this process, holds the
    /// working tree for `token` under this generator's staging root.
    pub fn is_busy(&self, token: &str) -> bool {
        self.locks.is_held(&self.config.staging_root.join(token))
    }

    /// Validate and render without any filesystem access.
    pub fn plan(&self, request: &GenerationRequest) -> Result<GenerationPlan, GeneratorError> {
        self.config
            .validate()
            .map_err(|e| GeneratorError::InvalidInput(e.to_string()))?;

        let validation = self.validator.validate(request);
        if !validation.valid {
            return Err(GeneratorError::InvalidInput(validation.summary()));
        }
        for warning in validation.warnings() {
            warn!("{} ({}): {}", warning.rule, warning.field, warning.message);
        }

        let identifier = ModuleIdentifier::parse(&request.raw_name)?;
        let input = RenderInput {
            identifier: &identifier,
            fields: &request.fields,
            min_platform_version: &self.config.min_platform_version,
        };

        let files = FileKind::ALL
            .into_iter()
            .map(|kind| {
                Ok(PlannedFile {
                    kind,
                    relative_path: kind.relative_path().to_string(),
                    contents: render(kind, &input)?,
                })
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;

        let warnings = validation.warnings().cloned().collect();
        Ok(GenerationPlan {
            identifier,
            files,
            warnings,
        })
    }

    /// Run the whole pipeline.
    ///
    /// Waits up to `lock_timeout_ms` while another live run holds the same
    /// working tree or archive, then fails with `Busy` without touching
    /// either. On any later failure both are removed before the error is
    /// returned.
    pub fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GeneratedModule, GenerationFailure> {
        let plan = self.plan(request).map_err(GenerationFailure::before_io)?;
        let fingerprint = request_fingerprint(request, GENERATOR_VERSION)
            .map_err(|e| GenerationFailure::before_io(e.into()))?;

        let token = plan.identifier.as_str().to_string();
        let base_path = self.config.base_path(&plan.identifier);
        let archive_path = self.config.archive_path(&plan.identifier);
        let claim = self
            .locks
            .acquire(&[&base_path, &archive_path], self.config.lock_timeout())
            .ok_or_else(|| GenerationFailure::before_io(GeneratorError::Busy(token.clone())))?;

        let run_id = Uuid::new_v4();
        let mut state = RunState::Idle;
        transition(&mut state, RunState::Generating);
        info!(%run_id, "Generating module {}", token);

        // No live run in this process owns these paths, so anything here is
        // residue from a run that never cleaned up.
        for stale in [&base_path, &archive_path] {
            match remove_path(stale) {
                Ok(true) => warn!("Removed stale output at {}", stale.display()),
                Ok(false) => {}
                Err(e) => {
                    transition(&mut state, RunState::Failed);
                    let cleanup_succeeded = cleanup_paths(&base_path, &archive_path);
                    transition(&mut state, RunState::Idle);
                    return Err(GenerationFailure {
                        error: GeneratorError::io(stale.as_path(), e),
                        cleanup_succeeded,
                    });
                }
            }
        }

        match self.write_and_package(&plan, &base_path, &archive_path) {
            Ok((files, archive_sha256)) => {
                transition(&mut state, RunState::Packaged);
                let message = format!("Module '{token}' has been generated successfully!");
                info!(%run_id, "Packaged {} into {}", token, archive_path.display());

                Ok(GeneratedModule {
                    report: GenerationReport {
                        run_id,
                        token,
                        message,
                        archive_path: archive_path.clone(),
                        archive_sha256,
                        request_fingerprint: fingerprint,
                        generator_version: GENERATOR_VERSION.to_string(),
                        generated_at: Utc::now(),
                        files,
                        warnings: plan.warnings,
                    },
                    identifier: plan.identifier,
                    base_path,
                    archive_path,
                    state,
                    claim: Some(claim),
                })
            }
            Err(error) => {
                transition(&mut state, RunState::Failed);
                warn!(%run_id, "Generation of {} failed: {}", token, error);
                let cleanup_succeeded = cleanup_paths(&base_path, &archive_path);
                transition(&mut state, RunState::Idle);
                drop(claim);
                Err(GenerationFailure {
                    error,
                    cleanup_succeeded,
                })
            }
        }
    }

    fn write_and_package(
        &self,
        plan: &GenerationPlan,
        base_path: &Path,
        archive_path: &Path,
    ) -> Result<(Vec<FileReport>, String), GeneratorError> {
        build_skeleton(base_path)?;

        let mut reports = Vec::with_capacity(plan.files.len());
        for file in &plan.files {
            let path = base_path.join(&file.relative_path);
            self.writer
                .write(&path, &file.contents)
                .map_err(|e| GeneratorError::io(&path, e))?;
            debug!("Wrote {}", path.display());

            reports.push(FileReport {
                kind: file.kind,
                path: file.relative_path.clone(),
                bytes: file.contents.len() as u64,
                sha256: sha256_hex(file.contents.as_bytes()),
            });
        }

        archive::create_archive(base_path, archive_path, self.config.compression)?;
        archive::verify_entries(archive_path, &plan.relative_paths())?;

        let digest =
            sha256_file(archive_path).map_err(|e| GeneratorError::io(archive_path, e))?;
        Ok((reports, digest))
    }
}

impl Default for ModuleGenerator {
    fn default() -> Self {
        Self::new(GeneratorConfig::default())
    }
}

fn transition(state: &mut RunState, next: RunState) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid run transition {state} -> {next}"
    );
    debug!("Run state {} -> {}", state, next);
    *state = next;
}

/// Outcome of [`GeneratedModule::deliver_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    pub bytes: u64,
    pub cleanup_succeeded: bool,
}

/// Handle to a packaged run.
///
/// Owns the working tree and archive until cleanup. Dropping a handle that
/// was never cleaned up removes both.
#[derive(Debug)]
pub struct GeneratedModule {
    identifier: ModuleIdentifier,
    base_path: PathBuf,
    archive_path: PathBuf,
    report: GenerationReport,
    state: RunState,
    claim: Option<PathClaim>,
}

impl GeneratedModule {
    pub fn message(&self) -> &str {
        &self.report.message
    }

    pub fn archive_path(&self) -> &Path {
        &self.archive_path
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn token(&self) -> &str {
        self.identifier.as_str()
    }

    pub fn identifier(&self) -> &ModuleIdentifier {
        &self.identifier
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn report(&self) -> &GenerationReport {
        &self.report
    }

    /// Stream the archive into `sink`, then clean up as delivered.
    ///
    /// A failed transfer aborts the run and cleans up as failed.
    pub fn deliver_to<W: Write + ?Sized>(
        &mut self,
        sink: &mut W,
    ) -> Result<Delivery, GeneratorError> {
        if self.state != RunState::Packaged {
            return Err(GeneratorError::InvalidState(self.state));
        }

        match copy_archive(&self.archive_path, sink) {
            Ok(bytes) => {
                info!("Delivered {} ({} bytes)", self.archive_path.display(), bytes);
                let cleanup_succeeded = self.confirm_delivered();
                Ok(Delivery {
                    bytes,
                    cleanup_succeeded,
                })
            }
            Err(e) => {
                self.cleanup();
                Err(GeneratorError::io(&self.archive_path, e))
            }
        }
    }

    /// Record that the archive reached its consumer, then clean up.
    pub fn confirm_delivered(&mut self) -> bool {
        if self.state == RunState::Packaged {
            transition(&mut self.state, RunState::Delivered);
        }
        self.cleanup()
    }

    /// Remove the working tree and archive. Safe to call repeatedly.
    ///
    /// Called on a packaged run that was never delivered, this aborts it.
    pub fn cleanup(&mut self) -> bool {
        if self.state == RunState::Packaged {
            transition(&mut self.state, RunState::Failed);
        }

        let success = cleanup_paths(&self.base_path, &self.archive_path);
        if matches!(self.state, RunState::Delivered | RunState::Failed) {
            transition(&mut self.state, RunState::Idle);
        }
        if self.claim.take().is_some() {
            debug!("Released token {}", self.identifier);
        }
        success
    }
}

fn copy_archive<W: Write + ?Sized>(archive_path: &Path, sink: &mut W) -> io::Result<u64> {
    let mut archive = File::open(archive_path)?;
    let bytes = io::copy(&mut archive, sink)?;
    sink.flush()?;
    Ok(bytes)
}

impl Drop for GeneratedModule {
    fn drop(&mut self) {
        if self.claim.is_some() {
            self.cleanup();
        }
    }
}
