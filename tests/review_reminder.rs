mod common;

use common::{commit_all, parse_output, run_hook, set_age, stop_input, temp_git_repo, write_file};

const ARGS: &[&str] = &["review-reminder"];

#[test]
fn clean_repo_is_silent() {
    let repo = temp_git_repo();
    let state = tempfile::tempdir().unwrap();
    let (code, stdout, stderr) = run_hook(ARGS, &stop_input(repo.path(), false), state.path());
    assert_eq!(code, 0);
    assert!(stdout.is_empty());
    assert!(stderr.is_empty(), "expected no stderr, got: {stderr}");
}

#[test]
fn non_git_directory_is_silent() {
    let project = tempfile::tempdir().unwrap();
    let state = tempfile::tempdir().unwrap();
    write_file(&project.path().join("R/clean.R"), "x <- 1\n");
    let (code, stdout, _) = run_hook(ARGS, &stop_input(project.path(), false), state.path());
    assert_eq!(code, 0);
    assert!(stdout.is_empty());
}

#[test]
fn lowercase_r_suffix_needs_no_review() {
    let repo = temp_git_repo();
    let state = tempfile::tempdir().unwrap();
    write_file(&repo.path().join("R/x.r"), "x <- 1\n");

    let (code, stdout, _) = run_hook(ARGS, &stop_input(repo.path(), false), state.path());
    assert_eq!(code, 0);
    assert!(stdout.is_empty(), "only .R scripts need review, got: {stdout}");
}

#[test]
fn review_suffixes_from_preferences() {
    let repo = temp_git_repo();
    let state = tempfile::tempdir().unwrap();
    write_file(&repo.path().join(".claude/research-hooks.toml"), "review_suffixes = [\".R\", \".r\"]\n");
    write_file(&repo.path().join("R/x.r"), "x <- 1\n");

    let (_, stdout, _) = run_hook(ARGS, &stop_input(repo.path(), false), state.path());
    let output = parse_output(&stdout);
    assert_eq!(output["decision"], "block");
    assert!(output["reason"].as_str().unwrap().contains("R/x.r"), "got: {stdout}");
}

#[test]
fn unreviewed_script_blocks() {
    let repo = temp_git_repo();
    let state = tempfile::tempdir().unwrap();
    write_file(&repo.path().join("R/01_clean.R"), "x <- 1\n");
    write_file(&repo.path().join("README.md"), "not a script\n");

    let (code, stdout, _) = run_hook(ARGS, &stop_input(repo.path(), false), state.path());
    assert_eq!(code, 0);
    let output = parse_output(&stdout);
    assert_eq!(output["decision"], "block");
    let reason = output["reason"].as_str().unwrap();
    assert!(reason.contains("1 R file(s)"), "got: {reason}");
    assert!(reason.contains("R/01_clean.R"), "got: {reason}");
    assert!(reason.contains("/review-r"), "got: {reason}");
    assert!(!reason.contains("README"), "got: {reason}");
}

#[test]
fn fresh_report_counts_as_reviewed() {
    let repo = temp_git_repo();
    let state = tempfile::tempdir().unwrap();
    let script = repo.path().join("R/01_clean.R");
    write_file(&script, "x <- 1\n");
    set_age(&script, 600);
    write_file(&repo.path().join("quality_reports/01_clean_r_review.md"), "# Review\n");

    let (code, stdout, _) = run_hook(ARGS, &stop_input(repo.path(), false), state.path());
    assert_eq!(code, 0);
    assert!(stdout.is_empty(), "reviewed script should not block, got: {stdout}");
}

#[test]
fn stale_report_counts_as_unreviewed() {
    let repo = temp_git_repo();
    let state = tempfile::tempdir().unwrap();
    let report = repo.path().join("quality_reports/01_clean_r_review.md");
    write_file(&report, "# Review\n");
    set_age(&report, 600);
    write_file(&repo.path().join("R/01_clean.R"), "x <- 2\n");

    let (_, stdout, _) = run_hook(ARGS, &stop_input(repo.path(), false), state.path());
    assert_eq!(parse_output(&stdout)["decision"], "block");
}

#[test]
fn modified_tracked_script_is_detected() {
    let repo = temp_git_repo();
    let state = tempfile::tempdir().unwrap();
    let script = repo.path().join("R/model.R");
    write_file(&script, "fit <- lm(y ~ x)\n");
    commit_all(repo.path(), "add model");

    let input = stop_input(repo.path(), false);
    let (_, stdout, _) = run_hook(ARGS, &input, state.path());
    assert!(stdout.is_empty(), "committed script should not block, got: {stdout}");

    write_file(&script, "fit <- glm(y ~ x)\n");
    let (_, stdout, _) = run_hook(ARGS, &input, state.path());
    let reason = parse_output(&stdout)["reason"].as_str().unwrap().to_string();
    assert!(reason.contains("R/model.R"), "got: {reason}");
}

#[test]
fn same_set_reminds_once_and_changed_set_reminds_again() {
    let repo = temp_git_repo();
    let state = tempfile::tempdir().unwrap();
    let input = stop_input(repo.path(), false);
    write_file(&repo.path().join("R/a.R"), "a <- 1\n");

    let (_, stdout, _) = run_hook(ARGS, &input, state.path());
    assert_eq!(parse_output(&stdout)["decision"], "block");

    let (_, stdout, _) = run_hook(ARGS, &input, state.path());
    assert!(stdout.is_empty(), "unchanged set should not block again, got: {stdout}");

    write_file(&repo.path().join("R/b.R"), "b <- 2\n");
    let (_, stdout, _) = run_hook(ARGS, &input, state.path());
    let reason = parse_output(&stdout)["reason"].as_str().unwrap().to_string();
    assert!(reason.contains("2 R file(s)"), "got: {reason}");
    assert!(reason.contains("R/a.R, R/b.R"), "got: {reason}");
}

#[test]
fn stop_hook_active_short_circuits() {
    let repo = temp_git_repo();
    let state = tempfile::tempdir().unwrap();
    write_file(&repo.path().join("R/a.R"), "a <- 1\n");
    let (code, stdout, _) = run_hook(ARGS, &stop_input(repo.path(), true), state.path());
    assert_eq!(code, 0);
    assert!(stdout.is_empty());
}
