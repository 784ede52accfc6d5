//! Contract Invariant Tests
//!
//! These tests verify the guarantees the generator makes to its callers.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use modgen_core::{
    archive::read_entries,
    pipeline::cleanup_paths,
    sanitize,
    templates::ModuleManifest,
    ErrorKind, FileKind, FileWriter, FsFileWriter, GenerationRequest, GeneratorConfig,
    ModuleGenerator, RunState,
};
use tempfile::tempdir;

fn kudos_request() -> GenerationRequest {
    GenerationRequest::new(
        "Kudos Board",
        "Tracks team kudos",
        "Jane Doe",
        "jane@example.com",
        "https://example.com",
        "Developer",
    )
}

fn config_in(root: &Path) -> GeneratorConfig {
    GeneratorConfig {
        staging_root: root.join("protected/modules"),
        archive_dir: root.join("archives"),
        ..GeneratorConfig::default()
    }
}

fn generator_in(root: &Path) -> ModuleGenerator {
    fs::create_dir_all(root.join("archives")).unwrap();
    ModuleGenerator::new(config_in(root))
}

/// Writes normally except for the controller, which is refused.
struct RefuseController;

impl FileWriter for RefuseController {
    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        if path.ends_with("controllers/DefaultController.php") {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        FsFileWriter.write(path, contents)
    }
}

#[test]
fn invariant_sanitize_strips_disallowed_characters() {
    assert_eq!(sanitize("My-Module! 2024"), "mymodule2024");
    assert_eq!(sanitize("snake_Case_9"), "snake_case_9");
    assert_eq!(sanitize(""), "");
    assert_eq!(sanitize("!!!"), "");
}

#[test]
fn invariant_empty_token_rejected_before_filesystem() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());

    for raw in ["", "!!!", "   "] {
        let mut request = kudos_request();
        request.raw_name = raw.to_string();

        let failure = generator.generate(&request).unwrap_err();
        assert_eq!(failure.kind(), ErrorKind::InvalidInput);
        assert!(failure.cleanup_succeeded);
    }

    assert!(!tmp.path().join("protected").exists());
    assert_eq!(fs::read_dir(tmp.path().join("archives")).unwrap().count(), 0);
}

#[test]
fn invariant_missing_field_rejected_before_filesystem() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());
    let mut request = kudos_request();
    request.fields.email = String::new();

    let failure = generator.generate(&request).unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::InvalidInput);
    assert!(failure.to_string().contains("email is required"));
    assert!(!tmp.path().join("protected").exists());
}

#[test]
fn invariant_rendering_deterministic() {
    let generator = ModuleGenerator::default();
    let first = generator.plan(&kudos_request()).unwrap();
    let second = generator.plan(&kudos_request()).unwrap();
    assert_eq!(first.files, second.files);
}

#[test]
fn invariant_archive_holds_exactly_written_files() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());
    let plan = generator.plan(&kudos_request()).unwrap();

    let mut module = generator.generate(&kudos_request()).unwrap();
    assert_eq!(module.state(), RunState::Packaged);

    let entries = read_entries(module.archive_path()).unwrap();
    assert_eq!(entries.len(), FileKind::ALL.len());
    for file in &plan.files {
        let on_disk = fs::read(module.base_path().join(&file.relative_path)).unwrap();
        assert_eq!(on_disk, file.contents.as_bytes());
        assert_eq!(entries[&file.relative_path], file.contents.as_bytes());
    }

    // Empty resource folders exist on disk only.
    assert!(module.base_path().join("resources/js").is_dir());
    assert!(module.base_path().join("models").is_dir());
    assert!(!entries.keys().any(|name| name.starts_with("resources")));

    assert!(module.cleanup());
}

#[test]
fn invariant_cleanup_idempotent() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());
    let mut module = generator.generate(&kudos_request()).unwrap();
    let base = module.base_path().to_path_buf();
    let archive = module.archive_path().to_path_buf();

    assert!(module.cleanup());
    assert!(module.cleanup());
    assert_eq!(module.state(), RunState::Idle);
    assert!(!base.exists());
    assert!(!archive.exists());

    assert!(cleanup_paths(&tmp.path().join("never"), &tmp.path().join("never.zip")));
}

#[test]
fn invariant_sequential_runs_are_independent() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());

    let mut first = generator.generate(&kudos_request()).unwrap();
    let first_entries = read_entries(first.archive_path()).unwrap();
    assert!(first.confirm_delivered());

    let mut request = kudos_request();
    request.fields.description = "Second edition".to_string();
    let mut second = generator.generate(&request).unwrap();
    let second_entries = read_entries(second.archive_path()).unwrap();

    assert_eq!(first.token(), second.token());
    assert_eq!(second_entries.len(), FileKind::ALL.len());
    let manifest: ModuleManifest =
        serde_json::from_slice(&second_entries["module.json"]).unwrap();
    assert_eq!(manifest.description, "Second edition");
    assert_ne!(first_entries["module.json"], second_entries["module.json"]);
    assert_eq!(first_entries["config.php"], second_entries["config.php"]);

    assert!(second.confirm_delivered());
}

#[test]
fn invariant_write_failure_leaves_no_partial_tree() {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("archives")).unwrap();
    let generator = ModuleGenerator::new(config_in(tmp.path())).with_writer(RefuseController);

    let failure = generator.generate(&kudos_request()).unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::Io);
    assert!(failure.cleanup_succeeded);
    assert!(failure.to_string().contains("DefaultController.php"));

    assert!(!tmp.path().join("protected/modules/kudosboard").exists());
    assert!(!tmp.path().join("archives/kudosboard.zip").exists());
    assert!(!generator.is_busy("kudosboard"));
}

#[test]
fn invariant_archive_failure_leaves_nothing_behind() {
    let tmp = tempdir().unwrap();
    // archive_dir is never created, so the zip cannot be opened
    let generator = ModuleGenerator::new(config_in(tmp.path()));

    let failure = generator.generate(&kudos_request()).unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::Archive);
    assert!(!tmp.path().join("protected/modules/kudosboard").exists());
}

#[test]
fn invariant_end_to_end_kudos_board() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());

    let mut module = generator.generate(&kudos_request()).unwrap();
    assert_eq!(module.token(), "kudosboard");
    assert_eq!(module.archive_path(), tmp.path().join("archives/kudosboard.zip"));
    assert_eq!(module.message(), "Module 'kudosboard' has been generated successfully!");

    let entries = read_entries(module.archive_path()).unwrap();
    let manifest: ModuleManifest = serde_json::from_slice(&entries["module.json"]).unwrap();
    assert_eq!(manifest.id, "kudosboard");
    assert_eq!(manifest.name, "Kudosboard");
    assert_eq!(manifest.authors[0].name, "Jane Doe");
    assert_eq!(manifest.authors[0].role, "Developer");

    let report = module.report();
    assert_eq!(report.files.len(), 6);
    assert_eq!(report.archive_sha256.len(), 64);
    assert!(report.warnings.is_empty());

    assert!(module.confirm_delivered());
}

#[test]
fn invariant_delivery_streams_archive_then_cleans_up() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());
    let mut module = generator.generate(&kudos_request()).unwrap();
    let expected = fs::read(module.archive_path()).unwrap();

    let mut sink = Vec::new();
    let delivery = module.deliver_to(&mut sink).unwrap();
    assert_eq!(sink, expected);
    assert_eq!(delivery.bytes, expected.len() as u64);
    assert!(delivery.cleanup_succeeded);
    assert!(!module.archive_path().exists());
    assert!(!module.base_path().exists());

    let err = module.deliver_to(&mut Vec::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn invariant_dropped_handle_cleans_up() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());
    let module = generator.generate(&kudos_request()).unwrap();
    let base = module.base_path().to_path_buf();
    let archive = module.archive_path().to_path_buf();

    drop(module);
    assert!(!base.exists());
    assert!(!archive.exists());
    assert!(!generator.is_busy("kudosboard"));
}

#[test]
fn invariant_stale_residue_replaced() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());
    let stale_dir = tmp.path().join("protected/modules/kudosboard/views");
    fs::create_dir_all(&stale_dir).unwrap();
    fs::write(stale_dir.join("leftover.php"), "<?php // old run").unwrap();
    fs::write(tmp.path().join("archives/kudosboard.zip"), "not a zip").unwrap();

    let mut module = generator.generate(&kudos_request()).unwrap();
    let entries = read_entries(module.archive_path()).unwrap();
    assert_eq!(entries.len(), FileKind::ALL.len());
    assert!(!entries.contains_key("views/leftover.php"));
    assert!(module.cleanup());
}

#[test]
fn invariant_same_token_runs_are_serialized() {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("archives")).unwrap();
    let config = GeneratorConfig {
        lock_timeout_ms: 60_000,
        ..config_in(tmp.path())
    };
    let generator = Arc::new(ModuleGenerator::new(config));

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let generator = Arc::clone(&generator);
            thread::spawn(move || {
                let mut request = kudos_request();
                request.fields.description = format!("run {i}");

                let mut module = generator.generate(&request).unwrap();
                let entries = read_entries(module.archive_path()).unwrap();
                let manifest: ModuleManifest =
                    serde_json::from_slice(&entries["module.json"]).unwrap();
                let mut sink = Vec::new();
                module.deliver_to(&mut sink).unwrap();
                (i, manifest.description, entries.len())
            })
        })
        .collect();

    for worker in workers {
        let (i, description, count) = worker.join().unwrap();
        assert_eq!(description, format!("run {i}"));
        assert_eq!(count, FileKind::ALL.len());
    }

    assert!(!tmp.path().join("protected/modules/kudosboard").exists());
    assert!(!tmp.path().join("archives/kudosboard.zip").exists());
}

#[test]
fn invariant_regenerate_while_handle_alive_fails_fast() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());
    let mut first = generator.generate(&kudos_request()).unwrap();

    let started = Instant::now();
    let failure = generator.generate(&kudos_request()).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(failure.kind(), ErrorKind::Busy);
    assert!(failure.cleanup_succeeded);

    // The live run is untouched.
    assert_eq!(first.state(), RunState::Packaged);
    assert!(first.archive_path().is_file());
    assert_eq!(read_entries(first.archive_path()).unwrap().len(), FileKind::ALL.len());

    assert!(first.cleanup());
    let mut second = generator.generate(&kudos_request()).unwrap();
    assert!(second.cleanup());
}

#[test]
fn invariant_regenerate_waits_up_to_lock_timeout() {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("archives")).unwrap();
    let config = GeneratorConfig {
        lock_timeout_ms: 200,
        ..config_in(tmp.path())
    };
    let generator = ModuleGenerator::new(config);
    let mut first = generator.generate(&kudos_request()).unwrap();

    let started = Instant::now();
    let failure = generator.generate(&kudos_request()).unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::Busy);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert!(started.elapsed() < Duration::from_secs(5));

    assert!(first.cleanup());
}

#[test]
fn invariant_separate_generators_share_claims() {
    let tmp = tempdir().unwrap();
    let first_generator = generator_in(tmp.path());
    let second_generator = ModuleGenerator::new(config_in(tmp.path()));

    let mut first = first_generator.generate(&kudos_request()).unwrap();
    assert!(second_generator.is_busy("kudosboard"));

    let failure = second_generator.generate(&kudos_request()).unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::Busy);
    assert!(first.base_path().join("module.json").is_file());
    assert!(first.archive_path().is_file());

    assert!(first.cleanup());
    assert!(!second_generator.is_busy("kudosboard"));
    let mut second = second_generator.generate(&kudos_request()).unwrap();
    assert!(second.cleanup());
}

#[test]
fn invariant_shared_archive_dir_is_claimed_too() {
    let tmp = tempdir().unwrap();
    let first_generator = generator_in(tmp.path());
    let second_generator = ModuleGenerator::new(GeneratorConfig {
        staging_root: tmp.path().join("elsewhere/modules"),
        ..config_in(tmp.path())
    });

    let mut first = first_generator.generate(&kudos_request()).unwrap();
    let failure = second_generator.generate(&kudos_request()).unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::Busy);
    assert!(first.archive_path().is_file());
    assert!(!tmp.path().join("elsewhere").exists());

    assert!(first.cleanup());
}

#[test]
fn invariant_invalid_platform_version_rejected_before_filesystem() {
    let tmp = tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("archives")).unwrap();
    let generator = ModuleGenerator::new(GeneratorConfig {
        min_platform_version: "one".to_string(),
        ..config_in(tmp.path())
    });

    let failure = generator.generate(&kudos_request()).unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::InvalidInput);
    assert!(failure.to_string().contains("min_platform_version"));
    assert!(!tmp.path().join("protected").exists());
}

#[test]
fn invariant_archives_reproducible_across_runs() {
    let tmp = tempdir().unwrap();
    let generator = generator_in(tmp.path());

    let mut first = generator.generate(&kudos_request()).unwrap();
    let first_digest = first.report().archive_sha256.clone();
    let first_fingerprint = first.report().request_fingerprint.clone();
    first.confirm_delivered();

    let mut second = generator.generate(&kudos_request()).unwrap();
    assert_eq!(second.report().archive_sha256, first_digest);
    assert_eq!(second.report().request_fingerprint, first_fingerprint);
    second.confirm_delivered();
}
