use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn crm_import_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("crm-import");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let data_dir = root.join("data");
    fs::create_dir_all(&data_dir).unwrap();

    fs::write(
        data_dir.join("companies.csv"),
        "name,domain,industry\nAcme Corp,acme.io,Manufacturing\nGlobex,globex.com,Energy\n,nameless.io,\n",
    )
    .unwrap();
    fs::write(
        data_dir.join("contacts.csv"),
        "firstname,lastname,email,company,phone\n\
         Jane,Doe,jane@acme.io,Acme Corp,(650) 253-0000\n\
         Hank,Scorpio,hank@globex.com,globex,12345\n\
         Bad,Email,not-an-email,Nowhere Inc,\n",
    )
    .unwrap();
    fs::write(
        data_dir.join("tickets.csv"),
        "subject,content,hs_ticket_priority\n\
         Login failure,\"Reported by JANE@acme.io, call +14155550100\",HIGH\n\
         Invoice question,Please call back,LOW\n\
         Outage,hank@globex.com says the plant is down,HIGH\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[import]
batch_size = 2
inter_chunk_delay_ms = 0

[input]
dir = "{}/data"
"#,
        root.display()
    );

    let config_path = config_dir.join("crm-import.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_crm_import(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = crm_import_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["--progress", "off"])
        .args(args)
        .env_remove("CRM_API_KEY")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run crm-import binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_validate_reports_quality() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_crm_import(&config_path, &["validate"]);
    assert!(success, "validate failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("companies"));
    assert!(stdout.contains("invalid email 'not-an-email'"));
    assert!(stdout.contains("contacts row 2: invalid phone '12345'"));
    assert!(stdout.contains("Result: OK"));
}

#[test]
fn test_validate_missing_column_fails_unless_forced() {
    let (tmp, config_path) = setup_test_env();
    fs::write(
        tmp.path().join("data/tickets.csv"),
        "content\nno subject column here\n",
    )
    .unwrap();

    let (stdout, stderr, success) = run_crm_import(&config_path, &["validate"]);
    assert!(!success, "validate should fail: stdout={}", stdout);
    assert!(stdout.contains("missing required columns: subject"));
    assert!(stderr.contains("validation failed"));

    let (_, _, forced) = run_crm_import(&config_path, &["validate", "--force"]);
    assert!(forced, "validate --force should succeed");
}

#[test]
fn test_enrich_lists_extracted_details() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_crm_import(&config_path, &["enrich"]);
    assert!(success, "enrich failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("jane@acme.io"));
    assert!(stdout.contains("+14155550100"));
    assert!(stdout.contains("3 tickets, 2 with an email, 1 with a phone number"));
}

#[test]
fn test_enrich_json() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_crm_import(&config_path, &["enrich", "--json"]);
    assert!(success);
    let results: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results.as_array().unwrap().len(), 3);
    assert_eq!(results[2]["extracted_emails"][0], "hank@globex.com");
}

#[test]
fn test_run_dry_run_table() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_crm_import(&config_path, &["run", "--dry-run"]);
    assert!(success, "run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("CRM Import Summary (dry run)"));
    assert!(stdout.contains("contact_to_company"));
    assert!(stdout.contains("Success rate:  100.00%"));
    assert!(!stdout.contains("Failed batches"));
}

#[test]
fn test_run_dry_run_json_summary() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_crm_import(&config_path, &["run", "--dry-run", "--json"]);
    assert!(success, "run failed: stderr={}", stderr);

    let summary: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(summary["dry_run"], true);
    assert_eq!(summary["objects"]["company"]["success_count"], 2);
    assert_eq!(summary["excluded"]["company"], 1);
    assert_eq!(summary["objects"]["contact"]["success_count"], 3);
    assert_eq!(summary["objects"]["ticket"]["success_count"], 3);
    assert_eq!(
        summary["associations"]["contact_to_company"]["success_count"],
        2
    );
    assert_eq!(summary["skipped"]["contact_to_company"], 1);
    assert_eq!(
        summary["associations"]["ticket_to_contact"]["success_count"],
        2
    );
    assert_eq!(
        summary["associations"]["ticket_to_company"]["success_count"],
        2
    );
    assert_eq!(summary["skipped"]["ticket_to_contact"], 1);
    assert_eq!(summary["totals"]["failed"], 0);
}

#[test]
fn test_run_without_api_key_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_crm_import(&config_path, &["run"]);
    assert!(!success, "run without key should fail: stdout={}", stdout);
    assert!(stderr.contains("CRM_API_KEY"));
}

#[test]
fn test_run_rejects_oversized_batch() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_crm_import(&config_path, &["run", "--dry-run", "--batch-size", "500"]);
    assert!(!success);
    assert!(stderr.contains("--batch-size"));
}

#[test]
fn test_missing_input_file_fails() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_file(tmp.path().join("data/contacts.csv")).unwrap();

    let (_, stderr, success) = run_crm_import(&config_path, &["run", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("CSV file not found"));
}
