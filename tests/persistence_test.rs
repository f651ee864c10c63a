#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// Runs the binary and returns `(stdout, stderr)`.
fn run_split(db_path: &Path, args: &[&str]) -> (String, String) {
    let output = Command::new(cargo_bin!("fee-reminder"))
        .arg("--db-path")
        .arg(db_path)
        .args(args)
        .output()
        .expect("Failed to execute command");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    (
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
    )
}

fn run(db_path: &Path, args: &[&str]) -> String {
    run_split(db_path, args).0
}

fn outbox_actions(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| {
            let entry: serde_json::Value = serde_json::from_str(line).unwrap();
            entry["action"].as_str().unwrap().to_string()
        })
        .collect()
}

#[test]
fn test_rocksdb_generation_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: import the directory and bill March
    let stdout1 = run(
        &db_path,
        &[
            "--grades",
            "tests/fixtures/grades.csv",
            "--parents",
            "tests/fixtures/parents.csv",
            "generate",
            "--month",
            "2024-03",
        ],
    );
    assert!(stdout1.contains("Created 3 payments for 2024-03"));

    // 2. Second run: same month again, nothing new, and re-importing adds no parents
    let stdout2 = run(
        &db_path,
        &[
            "--parents",
            "tests/fixtures/parents.csv",
            "generate",
            "--month",
            "2024-03",
        ],
    );
    assert!(stdout2.contains("Created 0 payments for 2024-03"));

    let stats = run(&db_path, &["stats", "--month", "2024-03"]);
    assert!(stats.contains("Active parents: 3"));
    assert!(stats.contains("2024-03: 0 paid, 3 unpaid"));
}

#[test]
fn test_rocksdb_reminder_cycle() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");
    let outbox = dir.path().join("outbox.jsonl");
    let outbox_arg = outbox.to_str().unwrap();

    run(
        &db_path,
        &[
            "--grades",
            "tests/fixtures/grades.csv",
            "--parents",
            "tests/fixtures/parents.csv",
            "generate",
            "--month",
            "2024-03",
        ],
    );

    // Before the window nothing goes out
    let (_, early) = run_split(&db_path, &["--outbox", outbox_arg, "remind", "--today", "2024-02-20"]);
    assert!(early.contains("Reminders: 0 delivered"));

    let (stdout, stderr) =
        run_split(&db_path, &["--outbox", outbox_arg, "remind", "--today", "2024-03-06"]);
    assert!(stdout.is_empty());
    assert!(stderr.contains("Reminders: 3 delivered, 0 failed"));
    let actions = outbox_actions(&outbox);
    assert_eq!(actions.len(), 3);
    assert!(actions.iter().all(|a| a.starts_with("payment_")));

    // The parent replies through the reminder's action
    let confirmed = run(&db_path, &["confirm", &actions[0]]);
    assert!(confirmed.contains("is now Paid"));

    // Without an outbox the reminders are the only thing on stdout
    let (stdout, stderr) = run_split(&db_path, &["remind", "--today", "2024-03-07"]);
    assert!(stderr.contains("Reminders: 2 delivered, 0 failed"));
    let reminders: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(reminders.len(), 2);
    assert_eq!(outbox_actions(&outbox).len(), 3);

    let paid = run(&db_path, &["paid"]);
    assert!(paid.starts_with(
        "payment_id,month,parent,child,school,grade,phone,amount,due_date,status,payment_date"
    ));
    assert_eq!(paid.lines().count(), 2);
    assert!(paid.contains(",Школа №5,5 класс,"));
    assert!(paid.contains(",3400,10.03.2024,paid,"));

    let unpaid = run(&db_path, &["unpaid", "--month", "2024-03"]);
    assert_eq!(unpaid.lines().count(), 3);
}
