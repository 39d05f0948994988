use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn philo_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("philo");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    setup_test_env_with("hashing")
}

fn setup_test_env_with(embedding_provider: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let stoicism = root.join("raw/stoicism");
    fs::create_dir_all(&stoicism).unwrap();
    fs::write(
        stoicism.join("enchiridion.txt"),
        "Làm thế nào để kiểm soát cảm xúc khi gặp khó khăn? \
         Người khắc kỷ dạy rằng cảm xúc đến từ phán đoán của ta về sự việc, \
         không phải từ chính sự việc. Hãy phân biệt điều nằm trong tầm kiểm soát \
         và điều nằm ngoài tầm kiểm soát.",
    )
    .unwrap();

    let nihilism = root.join("raw/nihilism");
    fs::create_dir_all(&nihilism).unwrap();
    fs::write(
        nihilism.join("nietzsche.md"),
        "# Hư vô\n\nHư vô chủ nghĩa là gì? Hư vô chủ nghĩa cho rằng cuộc sống \
         không có ý nghĩa khách quan. Nietzsche xem hư vô là bước chuyển để \
         con người tự tạo ra giá trị mới.",
    )
    .unwrap();
    // Hidden files are never read.
    fs::write(nihilism.join(".draft.txt"), "bản nháp").unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/philo.sqlite"

[chunking]
chunk_size = 400
overlap = 50

[retrieval]
top_k = 3
threshold = 0.3

[embedding]
provider = "{embedding_provider}"
dims = 512

[generation]
provider = "extractive"

[evaluation]
concurrency = 2

[[schools]]
id = "stoicism"
name = "Stoicism (Khắc kỷ)"
description = "Triết học về sự kiểm soát cảm xúc và chấp nhận số phận"
data_dir = "{root}/raw/stoicism"
reflection_questions = ["Điều gì trong tình huống này nằm trong tầm kiểm soát của bạn?"]
evaluation_questions = ["Làm thế nào để kiểm soát cảm xúc khi gặp khó khăn?"]

[[schools]]
id = "nihilism"
name = "Nihilism (Hư vô)"
description = "Triết học về sự vô nghĩa và sự phủ nhận các giá trị"
data_dir = "{root}/raw/nihilism"
evaluation_questions = ["Hư vô chủ nghĩa là gì?"]
"#,
        root = root.display(),
        embedding_provider = embedding_provider,
    );

    let config_path = config_dir.join("philo.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_philo(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(philo_binary())
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("Failed to execute philo binary");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn init_and_build(config: &Path) {
    let (_, stderr, success) = run_philo(config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    let (_, stderr, success) = run_philo(config, &["build", "--progress", "off"]);
    assert!(success, "build failed: {}", stderr);
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_philo(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/philo.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config) = setup_test_env();
    let (_, _, s1) = run_philo(&config, &["init"]);
    let (_, _, s2) = run_philo(&config, &["init"]);
    assert!(s1 && s2, "init should succeed twice");
}

#[test]
fn test_build_all_schools() {
    let (_tmp, config) = setup_test_env();
    run_philo(&config, &["init"]);

    let (stdout, stderr, success) = run_philo(&config, &["build", "--progress", "off"]);
    assert!(success, "build failed: {}", stderr);
    assert!(stdout.contains("build stoicism"));
    assert!(stdout.contains("build nihilism"));
    assert!(stdout.contains("documents: 1"), "hidden files must be skipped: {}", stdout);
    assert!(stdout.contains("model: hashing-512"));
    assert!(stdout.trim_end().ends_with("ok"));
}

#[test]
fn test_build_reuses_unchanged_index() {
    let (_tmp, config) = setup_test_env();
    init_and_build(&config);

    let (stdout, _, success) = run_philo(&config, &["build", "--school", "stoicism", "--progress", "off"]);
    assert!(success);
    assert!(stdout.contains("reused"));
    assert!(!stdout.contains("build nihilism"));

    let (stdout, _, success) =
        run_philo(&config, &["build", "--school", "stoicism", "--full", "--progress", "off"]);
    assert!(success);
    assert!(!stdout.contains("reused"));
}

#[test]
fn test_build_with_disabled_embeddings_fails() {
    let (_tmp, config) = setup_test_env_with("disabled");
    run_philo(&config, &["init"]);
    let (_, stderr, success) = run_philo(&config, &["build"]);
    assert!(!success);
    assert!(stderr.contains("Embeddings are disabled"));
}

#[test]
fn test_build_json_progress() {
    let (_tmp, config) = setup_test_env();
    run_philo(&config, &["init"]);
    let (_, stderr, success) = run_philo(&config, &["build", "--school", "nihilism", "--progress", "json"]);
    assert!(success);

    let events: Vec<serde_json::Value> = stderr
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    assert!(events.iter().any(|e| e["phase"] == "done" && e["school"] == "nihilism"));
}

#[test]
fn test_status_lists_schools() {
    let (_tmp, config) = setup_test_env();
    run_philo(&config, &["init"]);

    let (stdout, _, success) = run_philo(&config, &["status"]);
    assert!(success);
    assert!(stdout.contains("stoicism"));
    assert!(stdout.contains("not built"));

    run_philo(&config, &["build", "--progress", "off"]);
    let (stdout, _, success) = run_philo(&config, &["status"]);
    assert!(success);
    assert!(!stdout.contains("not built"));
    assert!(stdout.contains("hashing-512"));
}

#[test]
fn test_ask_in_scope_json() {
    let (_tmp, config) = setup_test_env();
    init_and_build(&config);

    let (stdout, stderr, success) = run_philo(
        &config,
        &[
            "ask",
            "Làm thế nào để kiểm soát cảm xúc khi gặp khó khăn?",
            "--school",
            "stoicism",
            "--json",
        ],
    );
    assert!(success, "ask failed: {}", stderr);

    let response: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(response["refused"], false);
    assert_eq!(response["school_id"], "stoicism");
    let citations = response["citations"].as_array().unwrap();
    assert!(!citations.is_empty());
    assert_eq!(citations[0]["source"], "enchiridion.txt");
}

#[test]
fn test_ask_off_topic_is_refused() {
    let (_tmp, config) = setup_test_env();
    init_and_build(&config);

    let (stdout, _, success) = run_philo(
        &config,
        &["ask", "Làm sao để học lập trình?", "--school", "stoicism", "--json"],
    );
    assert!(success);
    let response: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(response["refused"], true);
    assert!(response["citations"].as_array().unwrap().is_empty());
    assert!(response["text"].as_str().unwrap().contains("Stoicism (Khắc kỷ)"));
}

#[test]
fn test_ask_unknown_school_fails() {
    let (_tmp, config) = setup_test_env();
    init_and_build(&config);

    let (stdout, stderr, success) = run_philo(&config, &["ask", "Ý thức là gì?", "--school", "sophism"]);
    assert!(!success);
    assert!(stdout.is_empty());
    assert!(stderr.contains("sophism"));
}

#[test]
fn test_ask_before_build_fails() {
    let (_tmp, config) = setup_test_env();
    run_philo(&config, &["init"]);

    let (_, stderr, success) = run_philo(&config, &["ask", "Hư vô chủ nghĩa là gì?", "--school", "nihilism"]);
    assert!(!success);
    assert!(stderr.contains("Xin lỗi"));
}

#[test]
fn test_eval_builtin_writes_report() {
    let (tmp, config) = setup_test_env();
    init_and_build(&config);

    let out = tmp.path().join("reports");
    let (stdout, stderr, success) = run_philo(
        &config,
        &["eval", "--builtin", "--out", out.to_str().unwrap()],
    );
    assert!(success, "eval failed: {}", stderr);
    assert!(stdout.contains("Report written to"));

    let reports: Vec<PathBuf> = fs::read_dir(&out)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(reports.len(), 1);
    let name = reports[0].file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("evaluation_") && name.ends_with(".json"));

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&reports[0]).unwrap()).unwrap();
    assert!(report["metrics"]["total"].as_u64().unwrap() >= 2);
    assert_eq!(report["metrics"]["errors"], 0);
    assert_eq!(report["metrics"]["refusal_accuracy"], 1.0);
    assert!(report["by_school"]["stoicism"].is_object());
}

#[test]
fn test_eval_requires_scenarios() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_philo(&config, &["eval"]);
    assert!(!success);
    assert!(stderr.contains("--builtin"));
}

#[test]
fn test_eval_scenario_file() {
    let (tmp, config) = setup_test_env();
    init_and_build(&config);

    let scenarios = tmp.path().join("scenarios.toml");
    fs::write(
        &scenarios,
        r#"[emotions]
question = "Làm thế nào để kiểm soát cảm xúc khi gặp khó khăn?"
school = "stoicism"
expected_in_scope = true

[chemistry]
question = "Công thức hóa học của nước là gì?"
school = "nihilism"
expected_in_scope = false
"#,
    )
    .unwrap();

    let out = tmp.path().join("reports");
    let (_, stderr, success) = run_philo(
        &config,
        &[
            "eval",
            "--scenarios",
            scenarios.to_str().unwrap(),
            "--out",
            out.to_str().unwrap(),
            "--mode",
            "direct",
        ],
    );
    assert!(success, "eval failed: {}", stderr);

    let path = fs::read_dir(&out).unwrap().next().unwrap().unwrap().path();
    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(report["mode"], "direct");
    assert_eq!(report["metrics"]["total"], 2);
    assert_eq!(report["metrics"]["passed"], 2);
    assert_eq!(report["results"][0]["id"], "chemistry");
}

#[test]
fn test_completions() {
    let output = Command::new(philo_binary())
        .args(["completions", "bash"])
        .output()
        .expect("Failed to execute philo binary");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("philo"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_philo(&tmp.path().join("nope.toml"), &["status"]);
    assert!(!success);
    assert!(!stderr.is_empty());
}
