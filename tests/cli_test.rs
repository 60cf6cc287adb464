//! CLI end-to-end tests
//!
//! Tests for the framecatcher command-line interface. Nothing here needs
//! ffmpeg; commands that do are only checked for their failure paths.

use assert_cmd::prelude::*;
use fc_core::{FixedSeconds, FrameId, JobId, NewFrame, NewJob};
use fc_db::pool::{get_conn, init_pool};
use fc_db::queries::{frames, jobs};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the framecatcher binary, with the database and storage
/// pointed into `dir`.
#[allow(deprecated)]
fn framecatcher_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("framecatcher").unwrap();
    cmd.env("FC_DB_PATH", dir.join("fc.db"))
        .env("FC_STORAGE_DIR", dir.join("storage"))
        .env_remove("RUST_LOG");
    cmd
}

/// Store two jobs in `dir`'s database; the first gets four frames sampled
/// at 2 Hz with quality scores 0.2, 0.9, 0.5 and 0.7. Each frame file
/// holds its own frame number as bytes.
fn seed(dir: &Path) -> (JobId, Vec<FrameId>) {
    let pool = init_pool(&dir.join("fc.db").to_string_lossy()).unwrap();
    let conn = get_conn(&pool).unwrap();
    let new_job = |name: &str| NewJob {
        name: name.to_string(),
        original_filename: format!("{name}.mp4"),
        video_path: format!("/videos/{name}.mp4"),
        file_size: 1024,
    };
    let job = jobs::create_job(&conn, &new_job("Beach Trip")).unwrap();
    jobs::create_job(&conn, &new_job("Mountain Hike")).unwrap();

    let originals = dir
        .join("storage/albums")
        .join(job.id.to_string())
        .join("frames/original");
    fs::create_dir_all(&originals).unwrap();

    let batch: Vec<NewFrame> = [0.2, 0.9, 0.5, 0.7]
        .into_iter()
        .enumerate()
        .map(|(n, score)| {
            let path = originals.join(format!("frame_{n:06}.heic"));
            fs::write(&path, format!("frame {n}")).unwrap();
            (n, score, path.to_string_lossy().to_string())
        })
        .map(|(n, score, file_path)| NewFrame {
            job_id: job.id,
            filename: format!("Beach_Trip_00_00_00_frame_{n:06}.heic"),
            file_path,
            timestamp: FixedSeconds::from_frame(n as u64, 2.0),
            frame_number: n as u64,
            width: 1280,
            height: 720,
            file_size: 500,
            format: "heic".into(),
            quality_score: score,
            thumbnail_path: None,
        })
        .collect();
    let saved = frames::insert_frames(&conn, &batch).unwrap();
    (job.id, saved.into_iter().map(|f| f.id).collect())
}

#[test]
fn test_cli_no_args_shows_help() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_lists_commands() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("retry"))
        .stdout(predicate::str::contains("check-tools"));
}

#[test]
fn test_cli_version_command() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("framecatcher "));
}

#[test]
fn test_cli_check_tools_command() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("ffprobe"));
}

#[test]
fn test_cli_jobs_on_empty_database() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .arg("jobs")
        .assert()
        .success()
        .stdout(predicate::str::contains("No jobs."));
    assert!(dir.path().join("fc.db").exists());
}

#[test]
fn test_cli_jobs_rejects_unknown_status() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .args(["jobs", "--status", "paused"])
        .assert()
        .failure();
}

#[test]
fn test_cli_frames_for_missing_job() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .args(["frames", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Job 42 not found"));
}

#[test]
fn test_cli_favorite_missing_frame() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .args(["favorite", "7"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Frame 7 not found"));
}

#[test]
fn test_cli_delete_missing_job() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .args(["delete", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_cli_metadata_of_nonexistent_file() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .args(["probe", "/nonexistent/video.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_extract_nonexistent_file_fails() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .args(["extract", "/nonexistent/video.mp4"])
        .assert()
        .failure();
}

#[test]
fn test_cli_validate_config_file() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    fs::write(
        &config,
        r#"{"extraction": {"frames_per_second": 2.0}, "thumbnail": {"width": 320}}"#,
    )
    .unwrap();

    framecatcher_cmd(dir.path())
        .args(["validate", config.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("Frames per second: 2"))
        .stdout(predicate::str::contains("Thumbnails: 320x200"));
}

#[test]
fn test_cli_validate_rejects_bad_json() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, "{ not json").unwrap();

    framecatcher_cmd(dir.path())
        .args(["validate", config.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("config parse error"));
}

#[test]
fn test_cli_validate_defaults() {
    let dir = tempdir().unwrap();
    framecatcher_cmd(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("Encode: heic at quality 80"));
}

#[test]
fn test_cli_jobs_search_by_name() {
    let dir = tempdir().unwrap();
    seed(dir.path());
    framecatcher_cmd(dir.path())
        .args(["jobs", "--name", "beach"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Beach Trip"))
        .stdout(predicate::str::contains("Mountain Hike").not());
}

#[test]
fn test_cli_frames_top_quality_first() {
    let dir = tempdir().unwrap();
    let (job, _) = seed(dir.path());
    framecatcher_cmd(dir.path())
        .args(["frames", &job.to_string(), "--top", "2"])
        .assert()
        .success()
        .stdout(predicate::function(|out: &str| {
            match (out.find("#1 "), out.find("#3 ")) {
                (Some(best), Some(second)) => best < second,
                _ => false,
            }
        }))
        .stdout(predicate::str::contains("#0 ").not())
        .stdout(predicate::str::contains("#2 ").not());
}

#[test]
fn test_cli_frames_in_time_range() {
    let dir = tempdir().unwrap();
    let (job, _) = seed(dir.path());
    framecatcher_cmd(dir.path())
        .args(["frames", &job.to_string(), "--from", "0.5", "--to", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#1 "))
        .stdout(predicate::str::contains("#2 "))
        .stdout(predicate::str::contains("#0 ").not())
        .stdout(predicate::str::contains("#3 ").not());
}

#[test]
fn test_cli_frames_rejects_inverted_range() {
    let dir = tempdir().unwrap();
    let (job, _) = seed(dir.path());
    framecatcher_cmd(dir.path())
        .args(["frames", &job.to_string(), "--from", "2", "--to", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("after its end"));
}

#[test]
fn test_cli_favorite_several_frames() {
    let dir = tempdir().unwrap();
    let (job, ids) = seed(dir.path());
    framecatcher_cmd(dir.path())
        .args(["favorite", &ids[0].to_string(), &ids[2].to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 frame(s) marked as favorite"));

    framecatcher_cmd(dir.path())
        .args(["frames", &job.to_string(), "--favorites"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#0 "))
        .stdout(predicate::str::contains("#2 "))
        .stdout(predicate::str::contains("#1 ").not());
}

#[test]
fn test_cli_favorite_with_unknown_frame_changes_nothing() {
    let dir = tempdir().unwrap();
    let (job, ids) = seed(dir.path());
    framecatcher_cmd(dir.path())
        .args(["favorite", &ids[1].to_string(), "999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Frame 999 not found"));

    framecatcher_cmd(dir.path())
        .args(["frames", &job.to_string(), "--favorites"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 favorites"));
}

#[test]
fn test_cli_export_frame() {
    let dir = tempdir().unwrap();
    let (_, ids) = seed(dir.path());
    let out = dir.path().join("best.heic");
    framecatcher_cmd(dir.path())
        .args(["export", &ids[1].to_string()])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported frame"));
    assert_eq!(fs::read_to_string(&out).unwrap(), "frame 1");
}

#[test]
fn test_cli_export_missing_thumbnail() {
    let dir = tempdir().unwrap();
    let (_, ids) = seed(dir.path());
    framecatcher_cmd(dir.path())
        .args(["export", &ids[0].to_string(), "--thumbnail"])
        .arg(dir.path().join("thumb.jpg"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("has no thumbnail"));
}
