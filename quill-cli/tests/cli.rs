use std::fs;
use std::path::Path;

use assert_cmd::Command;
use tempfile::{tempdir, TempDir};

fn quill(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("quill").unwrap();
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_DATA_HOME", home.join("data"))
        .env("RUST_LOG", "warn");
    cmd
}

fn write_post(dir: &Path, slug: &str, created_at: &str, body: &str) {
    let source = format!(
        "+++\ntitle = \"Post {slug}\"\ncreated_at = {created_at}\ndescription = \"About {slug}\"\ntags = [\"rust\"]\n+++\n{body}"
    );
    fs::write(dir.join(format!("{slug}.md")), source).unwrap();
}

fn blog(posts: usize) -> TempDir {
    let dir = tempdir().unwrap();
    for day in 1..=posts {
        write_post(
            dir.path(),
            &format!("post-{day:02}"),
            &format!("2024-01-{day:02}"),
            "## Hello\n",
        );
    }
    dir
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

#[test]
fn index_lists_newest_posts_first() {
    let home = tempdir().unwrap();
    let posts = blog(8);
    let stdout = stdout_of(quill(home.path()).arg("index").arg(posts.path()));

    let first = stdout.find("Post post-08").unwrap();
    let last = stdout.find("Post post-03").unwrap();
    assert!(first < last);
    assert!(!stdout.contains("Post post-02"));
    assert!(stdout.contains("/post-08  About post-08"));
    assert!(stdout.contains("[1]"));
    assert!(stdout.contains("next: /blog/2"));
    assert!(!stdout.contains("prev:"));
}

#[test]
fn index_json_carries_slot_plan() {
    let home = tempdir().unwrap();
    let posts = blog(8);
    let stdout = stdout_of(
        quill(home.path())
            .args(["index", "--page", "2", "--json"])
            .arg(posts.path()),
    );
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();

    let slugs: Vec<_> = report["posts"]
        .as_array()
        .unwrap()
        .iter()
        .map(|post| post["slug"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(slugs, vec!["post-02", "post-01"]);
    assert_eq!(report["posts"][0]["href"], "/post-02");
    assert_eq!(report["pagination"]["state"]["active_page"], 2);
    assert_eq!(report["pagination"]["slots"].as_array().unwrap().len(), 7);
    assert_eq!(report["pagination"]["slots"][2]["kind"], "placeholder");
    assert_eq!(report["previous_href"], "/blog/1");
    assert!(report["next_href"].is_null());
}

#[test]
fn index_rejects_out_of_range_page() {
    let home = tempdir().unwrap();
    let posts = blog(2);
    let output = quill(home.path())
        .args(["index", "--page", "2"])
        .arg(posts.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 page(s)"));
}

#[test]
fn index_honours_configured_page_size() {
    let home = tempdir().unwrap();
    let posts = blog(3);
    let config = home.path().join("quill.toml");
    fs::write(&config, "posts_per_page = 1\n").unwrap();

    let stdout = stdout_of(
        quill(home.path())
            .arg("--config")
            .arg(&config)
            .args(["index", "--page", "3"])
            .arg(posts.path()),
    );
    assert!(stdout.contains("Post post-01"));
    assert!(stdout.contains("prev: /blog/2"));
}

#[test]
fn outline_prints_section_tree() {
    let home = tempdir().unwrap();
    let dir = tempdir().unwrap();
    write_post(
        dir.path(),
        "guide",
        "2024-02-01",
        "# Guide\n\n### Orphan\n\n## Install\n\n### Linux\n\n## Usage {#use}\n",
    );
    let stdout = stdout_of(quill(home.path()).arg("outline").arg(dir.path().join("guide.md")));
    assert_eq!(
        stdout,
        "Post guide\n\n▾ § Install\n    § Linux\n  § Usage\n"
    );
}

#[test]
fn outline_json_nests_subheadings() {
    let home = tempdir().unwrap();
    let dir = tempdir().unwrap();
    write_post(
        dir.path(),
        "guide",
        "2024-02-01",
        "## Install\n\n### Linux\n\n### macOS\n\n## Usage\n",
    );
    let stdout = stdout_of(
        quill(home.path())
            .args(["outline", "--json"])
            .arg(dir.path().join("guide.md")),
    );
    let sections: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(sections[0]["heading"]["id"], "install");
    assert_eq!(sections[0]["subheadings"][1]["id"], "macos");
    assert_eq!(sections[1]["subheadings"].as_array().unwrap().len(), 0);
}

#[test]
fn typewriter_stops_after_requested_cycles() {
    let home = tempdir().unwrap();
    let config = home.path().join("quill.toml");
    fs::write(
        &config,
        "[typewriter]\ntype_letter_delay = 1\ndelete_letter_delay = 1\npause_duration = 5\n",
    )
    .unwrap();

    let stdout = stdout_of(
        quill(home.path())
            .arg("--config")
            .arg(&config)
            .args(["typewriter", "hi", "--cycles", "1"]),
    );
    assert!(stdout.contains("hi"));
    assert!(stdout.ends_with('\n'));
}

#[test]
fn typewriter_counts_skipped_empty_texts() {
    let home = tempdir().unwrap();
    let config = home.path().join("quill.toml");
    fs::write(
        &config,
        "[typewriter]\ntype_letter_delay = 1\ndelete_letter_delay = 1\npause_duration = 5\n",
    )
    .unwrap();

    let output = quill(home.path())
        .arg("--config")
        .arg(&config)
        .args(["typewriter", "", "x", "--cycles", "1"])
        .timeout(std::time::Duration::from_secs(10))
        .output()
        .unwrap();
    assert!(output.status.success());
}

#[test]
fn typewriter_rejects_only_empty_texts() {
    let home = tempdir().unwrap();
    let output = quill(home.path())
        .args(["typewriter", "", "--cycles", "1"])
        .timeout(std::time::Duration::from_secs(10))
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("no non-empty texts"));
}

#[test]
fn search_lists_matching_posts() {
    let home = tempdir().unwrap();
    let dir = tempdir().unwrap();
    write_post(dir.path(), "timers", "2024-01-01", "Tokio sleeps.\n");
    write_post(dir.path(), "parsers", "2024-02-01", "Pulldown events.\n");

    let stdout = stdout_of(
        quill(home.path())
            .arg("search")
            .arg(dir.path())
            .args(["rust", "tokio"]),
    );
    assert!(stdout.contains("Post timers"));
    assert!(stdout.contains("/timers  matched in tags, body"));
    assert!(!stdout.contains("Post parsers"));

    let stdout = stdout_of(quill(home.path()).arg("search").arg(dir.path()).arg("kotlin"));
    assert_eq!(stdout, "No posts match \"kotlin\".\n");
}

#[test]
fn search_json_reports_matched_fields() {
    let home = tempdir().unwrap();
    let dir = tempdir().unwrap();
    write_post(dir.path(), "timers", "2024-01-01", "Tokio sleeps.\n");
    write_post(dir.path(), "parsers", "2024-02-01", "Pulldown events.\n");

    let stdout = stdout_of(
        quill(home.path())
            .args(["search", "--json"])
            .arg(dir.path())
            .arg("POST"),
    );
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["query"], "POST");
    assert_eq!(report["posts"][0]["slug"], "parsers");
    assert_eq!(report["posts"][0]["href"], "/parsers");
    assert_eq!(report["posts"][1]["matched"], serde_json::json!(["title"]));
}
