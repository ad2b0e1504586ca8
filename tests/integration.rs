//! Drives the compiled `lens` binary against a temporary archive, using the
//! offline `hash` embedding provider.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn lens_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lens");
    path
}

fn eml(id: &str, subject: &str, date: &str, in_reply_to: Option<&str>, body: &str) -> String {
    let mut out = format!(
        "Message-ID: <{id}@example.com>\nFrom: \"Sender\" <sender@example.com>\nSubject: {subject}\nDate: {date}\n"
    );
    if let Some(parent) = in_reply_to {
        out.push_str(&format!(
            "In-Reply-To: <{parent}@example.com>\nReferences: <{parent}@example.com>\n"
        ));
    }
    out.push_str("Content-Type: text/plain; charset=utf-8\n\n");
    out.push_str(body);
    out.push('\n');
    out
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let mail_dir = root.join("mail");
    fs::create_dir_all(mail_dir.join("billing")).unwrap();

    for i in 0..3 {
        fs::write(
            mail_dir.join("billing").join(format!("invoice{i}.eml")),
            eml(
                &format!("inv{i}"),
                &format!("Invoice 100{i} overdue"),
                &format!("{} Jan 2024 10:00:00 +0000", i + 1),
                None,
                "payment invoice overdue reminder",
            ),
        )
        .unwrap();
    }

    let mbox = format!(
        "From sender@example.com Mon Feb  5 09:00:00 2024\n{}\nFrom sender@example.com Tue Feb  6 09:00:00 2024\n{}",
        eml(
            "hike",
            "Weekend hiking trip",
            "Mon, 5 Feb 2024 09:00:00 +0000",
            None,
            "trail photos from the mountain"
        ),
        eml(
            "hike-reply",
            "Re: Weekend hiking trip",
            "Tue, 6 Feb 2024 09:00:00 +0000",
            Some("hike"),
            "great photos, same trail next month"
        ),
    );
    fs::write(mail_dir.join("personal.mbox"), mbox).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/lens.sqlite"

[embedding]
provider = "hash"
model = "hash-256"
dims = 256
batch_size = 2

[clustering]
eps = 0.6
min_pts = 2
min_cluster_size = 2

[search]
final_limit = 5
"#,
        root.display()
    );

    let config_path = config_dir.join("lens.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_lens(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lens_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("--progress")
        .arg("off")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lens binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn mail_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("mail")
}

/// init + import + embed, the common prefix of most tests.
fn prepared() -> (TempDir, PathBuf) {
    let (tmp, config) = setup_test_env();
    let (_, stderr, success) = run_lens(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let mail = mail_dir(&config);
    let (_, stderr, success) = run_lens(&config, &["import", mail.to_str().unwrap()]);
    assert!(success, "import failed: {}", stderr);
    let (_, stderr, success) = run_lens(&config, &["embed", "pending"]);
    assert!(success, "embed failed: {}", stderr);
    (tmp, config)
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_lens(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully"));

    let (_, stderr, success) = run_lens(&config, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_import_and_threads() {
    let (_tmp, config) = setup_test_env();
    run_lens(&config, &["init"]);
    let mail = mail_dir(&config);

    let (stdout, stderr, success) = run_lens(&config, &["import", mail.to_str().unwrap()]);
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("files: 4"), "stdout: {}", stdout);
    assert!(stdout.contains("messages: 5"), "stdout: {}", stdout);

    // Re-import updates in place.
    let (stdout, _, _) = run_lens(&config, &["import", mail.to_str().unwrap()]);
    assert!(stdout.contains("total emails: 5"), "stdout: {}", stdout);

    let (stdout, stderr, success) = run_lens(&config, &["threads"]);
    assert!(success, "threads failed: {}", stderr);
    // Four threads: three invoices plus the hiking conversation.
    assert_eq!(stdout.matches("    id: ").count(), 4, "stdout: {}", stdout);
    let first = stdout.lines().next().unwrap();
    assert!(first.contains("2024-02-06"), "newest thread first: {}", first);
    assert!(first.contains("Re: Weekend hiking trip"));
}

#[test]
fn test_embed_pending_then_up_to_date() {
    let (_tmp, config) = setup_test_env();
    run_lens(&config, &["init"]);
    let mail = mail_dir(&config);
    run_lens(&config, &["import", mail.to_str().unwrap()]);

    let (stdout, _, success) = run_lens(&config, &["embed", "pending", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("emails needing embeddings: 5"), "stdout: {}", stdout);

    let (stdout, stderr, success) = run_lens(&config, &["embed", "pending"]);
    assert!(success, "embed failed: {}", stderr);
    assert!(stdout.contains("embedded: 5"), "stdout: {}", stdout);

    let (stdout, _, success) = run_lens(&config, &["embed", "pending"]);
    assert!(success);
    assert!(stdout.contains("all emails up to date"), "stdout: {}", stdout);

    let (stdout, stderr, success) = run_lens(&config, &["embed", "rebuild"]);
    assert!(success, "rebuild failed: {}", stderr);
    assert!(stdout.contains("embedded: 5"), "stdout: {}", stdout);
}

#[test]
fn test_cluster_run_and_show() {
    let (_tmp, config) = prepared();

    let (stdout, _, _) = run_lens(&config, &["cluster", "show"]);
    assert!(stdout.contains("No clusters yet"));

    let (stdout, stderr, success) = run_lens(&config, &["cluster", "run"]);
    assert!(success, "cluster run failed: {}", stderr);
    assert!(stdout.contains("cluster-0"), "stdout: {}", stdout);

    let (stdout, _, success) = run_lens(&config, &["cluster", "show"]);
    assert!(success);
    assert!(stdout.contains("cluster-0"), "stdout: {}", stdout);
}

#[test]
fn test_prompt_cluster_commands() {
    let (_tmp, config) = prepared();

    let (stdout, stderr, success) = run_lens(
        &config,
        &[
            "prompt",
            "create",
            "Outdoors",
            "hiking trail photos",
            "--threshold",
            "0.2",
        ],
    );
    assert!(success, "prompt create failed: {}", stderr);
    assert!(stdout.contains("outdoors"), "stdout: {}", stdout);

    let (stdout, _, success) = run_lens(&config, &["prompt", "list"]);
    assert!(success);
    assert!(stdout.contains("\"Outdoors\""));

    let (stdout, _, success) = run_lens(&config, &["prompt", "show", "outdoors"]);
    assert!(success);
    assert!(stdout.contains("Weekend hiking trip"), "stdout: {}", stdout);
    assert!(!stdout.contains("Invoice"), "stdout: {}", stdout);

    let (_, _, success) = run_lens(&config, &["prompt", "threshold", "outdoors", "0.9"]);
    assert!(success);
    let (_, stderr, success) = run_lens(&config, &["prompt", "threshold", "outdoors", "1.5"]);
    assert!(!success);
    assert!(stderr.contains("Invalid threshold"), "stderr: {}", stderr);

    let (_, stderr, success) =
        run_lens(&config, &["prompt", "override", "outdoors", "some-id", "include"]);
    assert!(success, "override failed: {}", stderr);
    let (_, stderr, success) =
        run_lens(&config, &["prompt", "override", "outdoors", "some-id", "maybe"]);
    assert!(!success);
    assert!(stderr.contains("invalid value"), "stderr: {}", stderr);

    let (_, _, success) = run_lens(&config, &["prompt", "delete", "outdoors"]);
    assert!(success);
    let (_, _, success) = run_lens(&config, &["prompt", "show", "outdoors"]);
    assert!(!success);
}

#[test]
fn test_search_json() {
    let (_tmp, config) = prepared();

    let (stdout, stderr, success) = run_lens(&config, &["search", "hiking", "--json"]);
    assert!(success, "search failed: {}", stderr);
    let hits: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert!(!hits.is_empty());
    assert!(hits.len() <= 5);
    assert!(hits[0]["subject"]
        .as_str()
        .unwrap()
        .contains("Weekend hiking trip"));
    assert_eq!(hits[0]["rank"], 1);

    let (stdout, _, success) = run_lens(&config, &["search", "zzzzqqqq", "--limit", "1"]);
    assert!(success);
    assert!(stdout.lines().filter(|l| l.contains("    id: ")).count() <= 1);
}

#[test]
fn test_project_fit_then_update() {
    let (_tmp, config) = prepared();

    let (_, stderr, success) = run_lens(&config, &["project", "update"]);
    assert!(!success, "update before fit should fail");
    assert!(stderr.contains("project fit"), "stderr: {}", stderr);

    let (stdout, stderr, success) = run_lens(&config, &["project", "fit"]);
    assert!(success, "project fit failed: {}", stderr);
    assert!(stdout.contains("points: 5"), "stdout: {}", stdout);

    let (stdout, _, success) = run_lens(&config, &["project", "update"]);
    assert!(success);
    assert!(stdout.contains("projected: 0"));
    assert!(stdout.contains("total points: 5"));
}

#[test]
fn test_completions() {
    let output = Command::new(lens_binary())
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("lens"));
}
