//! End-to-end runs of the wsinfra-enforcer binary.

mod common;

use std::path::Path;
use std::process::Command;

use common::{instance, APP, HEALTH_CHECK_URI};
use wsinfra_enforcer::gateway::CloudSnapshot;
use wsinfra_enforcer::model::{DatabaseDescription, Endpoint, InstanceDescription, InstanceState};
use wsinfra_enforcer::{diff, CorrectiveAction, ResourceSpec};

fn write_json<T: serde::Serialize>(dir: &Path, name: &str, value: &T) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn enforcer() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_wsinfra-enforcer"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

fn read_snapshot(path: &Path) -> CloudSnapshot {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn database(status: &str) -> CloudSnapshot {
    let db = DatabaseDescription {
        id: "petclinic-db".into(),
        db_name: "petclinic".into(),
        status: status.into(),
        endpoint: (status == DatabaseDescription::STATUS_AVAILABLE).then(|| Endpoint {
            address: "petclinic-db.eu-west-1.rds.amazonaws.com".into(),
            port: 3306,
        }),
    };
    CloudSnapshot {
        databases: [(db.id.clone(), db)].into(),
        ..CloudSnapshot::default()
    }
}

fn petclinic() -> (ResourceSpec, CloudSnapshot) {
    let instances = vec![
        instance("i-1", "eu-west-1b", APP),
        instance("i-2", "eu-west-1c", APP),
    ];
    let spec = ResourceSpec::for_application(APP, HEALTH_CHECK_URI, &instances);
    let snapshot = CloudSnapshot {
        instances: instances.into_iter().map(|i| (i.id.clone(), i)).collect(),
        ..CloudSnapshot::default()
    };
    (spec, snapshot)
}

#[test]
fn test_plan_without_observed_state_creates() {
    let dir = tempfile::tempdir().unwrap();
    let (spec, _) = petclinic();
    let desired = write_json(dir.path(), "desired.json", &spec);

    let output = enforcer()
        .arg("plan")
        .arg("--desired")
        .arg(&desired)
        .output()
        .unwrap();

    assert!(output.status.success());
    let actions: Vec<CorrectiveAction> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(actions, vec![CorrectiveAction::CreateResource]);
}

#[test]
fn test_apply_converges_and_saves_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let (spec, snapshot) = petclinic();
    let desired = write_json(dir.path(), "desired.json", &spec);
    let snapshot_path = write_json(dir.path(), "cloud.json", &snapshot);

    let output = enforcer()
        .arg("apply")
        .arg("--desired")
        .arg(&desired)
        .arg("--snapshot")
        .arg(&snapshot_path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let saved: CloudSnapshot =
        serde_json::from_str(&std::fs::read_to_string(&snapshot_path).unwrap()).unwrap();
    let state = &saved.load_balancers[APP];
    assert!(diff(&spec, Some(state)).is_empty());

    // Planning against the saved state yields nothing to do.
    let observed = write_json(dir.path(), "observed.json", state);
    let output = enforcer()
        .arg("plan")
        .arg("--desired")
        .arg(&desired)
        .arg("--observed")
        .arg(&observed)
        .output()
        .unwrap();
    let actions: Vec<CorrectiveAction> = serde_json::from_slice(&output.stdout).unwrap();
    assert!(actions.is_empty());
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (spec, _) = petclinic();
    let desired = write_json(dir.path(), "desired.json", &spec);
    let config = dir.path().join("enforcer.json");
    std::fs::write(&config, r#"{"max_concurrency": 0}"#).unwrap();

    let output = enforcer()
        .arg("--config")
        .arg(&config)
        .arg("plan")
        .arg("--desired")
        .arg(&desired)
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn test_apply_by_application_builds_spec_from_role_tags() {
    let dir = tempfile::tempdir().unwrap();
    let (spec, mut snapshot) = petclinic();
    let other = instance("i-9", "eu-west-1a", "nagios");
    snapshot.instances.insert(other.id.clone(), other);
    let snapshot_path = write_json(dir.path(), "cloud.json", &snapshot);

    let output = enforcer()
        .arg("apply")
        .arg("--application")
        .arg(APP)
        .arg("--health-check-uri")
        .arg(HEALTH_CHECK_URI)
        .arg("--snapshot")
        .arg(&snapshot_path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let saved = read_snapshot(&snapshot_path);
    assert_eq!(saved.load_balancers.len(), 1);
    assert!(diff(&spec, Some(&saved.load_balancers[APP])).is_empty());
}

#[test]
fn test_apply_without_specs_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, snapshot) = petclinic();
    let snapshot_path = write_json(dir.path(), "cloud.json", &snapshot);

    let output = enforcer()
        .arg("apply")
        .arg("--snapshot")
        .arg(&snapshot_path)
        .output()
        .unwrap();

    assert!(!output.status.success());
}

#[test]
fn test_await_instances_terminates_dying() {
    let dir = tempfile::tempdir().unwrap();
    let (_, mut snapshot) = petclinic();
    let mut dying = instance("i-3", "eu-west-1b", APP);
    dying.state = InstanceState::ShuttingDown;
    snapshot.instances.insert(dying.id.clone(), dying);
    let snapshot_path = write_json(dir.path(), "cloud.json", &snapshot);

    let output = enforcer()
        .arg("await-instances")
        .arg("i-1")
        .arg("i-3")
        .arg("--snapshot")
        .arg(&snapshot_path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let started: Vec<InstanceDescription> = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<_> = started.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["i-1"]);
    let saved = read_snapshot(&snapshot_path);
    assert_eq!(saved.instances["i-3"].state, InstanceState::Terminated);
    assert_eq!(saved.instances["i-1"].state, InstanceState::Running);
}

#[test]
fn test_await_database_prints_jdbc_url() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = write_json(dir.path(), "cloud.json", &database("available"));

    let output = enforcer()
        .arg("await-database")
        .arg("petclinic-db")
        .arg("--snapshot")
        .arg(&snapshot_path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "jdbc:mysql://petclinic-db.eu-west-1.rds.amazonaws.com:3306/petclinic"
    );
}

#[test]
fn test_await_database_honours_configured_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = write_json(dir.path(), "cloud.json", &database("creating"));
    let config = dir.path().join("enforcer.json");
    std::fs::write(
        &config,
        r#"{"database_available": {"interval_secs": 1, "max_attempts": 2}}"#,
    )
    .unwrap();

    // The default database wait is unbounded; only the config ends this run.
    let output = enforcer()
        .arg("--config")
        .arg(&config)
        .arg("await-database")
        .arg("petclinic-db")
        .arg("--snapshot")
        .arg(&snapshot_path)
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("timed out after 2 attempts"));
}
