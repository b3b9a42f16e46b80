mod common;

use assert_cmd::Command;
use common::{READINGS_SEMICOLON, TestWorkspace};
use predicates::prelude::*;
use predicates::str::contains;

fn monitor(workspace: &TestWorkspace) -> Command {
    let mut cmd = Command::cargo_bin("equipment-monitor").expect("binary exists");
    cmd.env_remove("EQUIPMENT_MONITOR_DB")
        .args(["--database", workspace.db_path().to_str().unwrap()]);
    cmd
}

#[test]
fn upload_reports_rows_added() {
    let workspace = TestWorkspace::new();
    let input = workspace.write("readings.csv", READINGS_SEMICOLON);

    monitor(&workspace)
        .args(["upload", "-i", input.to_str().unwrap(), "-t", "data"])
        .assert()
        .success()
        .stdout(contains("3 rows added."));
    assert_eq!(workspace.count("data"), 3);
}

#[test]
fn rejected_upload_explains_the_mismatch() {
    let workspace = TestWorkspace::new();
    let input = workspace.write(
        "equipment.csv",
        "equipment_tag_id,equipment_name,area\nTAG-1,Pump,North\n",
    );

    monitor(&workspace)
        .args(["upload", "-i", input.to_str().unwrap(), "-t", "equipment"])
        .assert()
        .failure()
        .stderr(contains("missing [description]"));
    assert_eq!(workspace.count("equipment"), 0);
}

#[test]
fn lenient_policy_from_config_file() {
    let workspace = TestWorkspace::new();
    let config = workspace.write("monitor.yaml", "upload:\n  policy: lenient\n");
    let input = workspace.write(
        "equipment.csv",
        "equipment_tag_id,equipment_name,area,description,colour\nTAG-1,Pump,North,Feed,red\n",
    );

    monitor(&workspace)
        .args([
            "--config",
            config.to_str().unwrap(),
            "upload",
            "-i",
            input.to_str().unwrap(),
            "-t",
            "equipment",
        ])
        .assert()
        .success()
        .stdout(contains("1 rows added."));
}

#[test]
fn readings_render_as_csv_and_json() {
    let workspace = TestWorkspace::new();
    workspace.insert_standard("ISO-10816");
    workspace.insert_reading("R-1", "Pump 101", "Motor", "DE", "2024-05-01 08:00:00", 1.5);

    monitor(&workspace)
        .args(["readings", "--format", "csv"])
        .assert()
        .success()
        .stdout(contains("equipment_tag_id,equipment_name,component"))
        .stdout(contains("TAG-Pump 101,Pump 101,Motor,DE,2024-05-01 08:00:00,1.5,mm/s"));

    monitor(&workspace)
        .args(["readings", "--equipment", "Pump 101", "--format", "json"])
        .assert()
        .success()
        .stdout(contains("\"alarm_standard\": \"ISO-10816\""))
        .stdout(contains("\"excellent\": \"< 2.8\""));
}

#[test]
fn component_filter_requires_equipment() {
    let workspace = TestWorkspace::new();
    monitor(&workspace)
        .args(["readings", "--component", "Motor"])
        .assert()
        .failure()
        .stderr(contains("Invalid filter selection"));
}

#[test]
fn options_list_each_level() {
    let workspace = TestWorkspace::new();
    workspace.insert_reading("R-1", "Pump 101", "Motor", "DE", "2024-05-01 08:00:00", 1.5);
    workspace.insert_reading("R-2", "Fan 7", "Blade", "Tip", "2024-05-02 08:00:00", 2.5);

    monitor(&workspace)
        .args(["options", "equipment"])
        .assert()
        .success()
        .stdout("Fan 7\nPump 101\n");

    monitor(&workspace)
        .args(["options", "points", "--equipment", "Fan 7", "--component", "Blade"])
        .assert()
        .success()
        .stdout("Tip\n");

    monitor(&workspace)
        .args(["options", "components"])
        .assert()
        .failure()
        .stderr(contains("requires --equipment"));
}

#[test]
fn columns_marks_the_unique_key() {
    let workspace = TestWorkspace::new();
    monitor(&workspace)
        .args(["columns", "-t", "alarm_standards"])
        .assert()
        .success()
        .stdout(contains("standard").and(contains("unique")))
        .stdout(contains("requires_evaluation"));
}

#[test]
fn status_reports_connection_and_feed() {
    let workspace = TestWorkspace::new();
    workspace.insert_reading("R-1", "Pump 101", "Motor", "DE", "2024-05-01 08:00:00", 1.5);
    monitor(&workspace)
        .arg("status")
        .assert()
        .success()
        .stdout(contains("(connected)"))
        .stdout(contains("Readings: 1 loaded (limit 1000)"))
        .stdout(contains("Asset: not configured"));
}

#[test]
fn missing_database_fails_fast() {
    let workspace = TestWorkspace::new();
    let absent = workspace.path().join("absent.db");
    Command::cargo_bin("equipment-monitor")
        .expect("binary exists")
        .args(["--database", absent.to_str().unwrap(), "status"])
        .assert()
        .failure()
        .stderr(contains("Cannot connect to database"));
}

#[test]
fn database_path_can_come_from_the_environment() {
    let workspace = TestWorkspace::new();
    Command::cargo_bin("equipment-monitor")
        .expect("binary exists")
        .env("EQUIPMENT_MONITOR_DB", workspace.db_path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("Readings: 0 loaded"));
}
