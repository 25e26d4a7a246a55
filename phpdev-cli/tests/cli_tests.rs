use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn phpdev_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_phpdev"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("NO_COLOR", "1");
    cmd
}

fn laravel_tree(root: &Path) -> PathBuf {
    let dir = root.join("blog");
    fs::create_dir_all(dir.join("public")).expect("mkdir");
    fs::write(
        dir.join("composer.json"),
        r#"{"require":{"php":"^8.2","laravel/framework":"^11.0"}}"#,
    )
    .expect("composer.json");
    fs::write(dir.join("artisan"), "#!/usr/bin/env php\n").expect("artisan");
    fs::write(dir.join("public/index.php"), "<?php\n").expect("index.php");
    dir
}

// ---------------------------------------------------------------------------
// Offline commands
// ---------------------------------------------------------------------------

#[test]
fn detect_reports_framework_and_entry_point() {
    let home = TempDir::new().expect("home");
    let project = laravel_tree(home.path());

    phpdev_cmd(home.path())
        .arg("detect")
        .arg(&project)
        .assert()
        .success()
        .stdout(contains("Laravel"))
        .stdout(contains("public/index.php"))
        .stdout(contains("8.2.0"));

    let output = phpdev_cmd(home.path())
        .args(["detect", "--json"])
        .arg(&project)
        .output()
        .expect("run detect");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["framework"], "Laravel");
    assert_eq!(json["entry_point"], "public/index.php");
    assert_eq!(json["php_version"], "8.2.0");
}

#[test]
fn detect_rejects_missing_directory() {
    let home = TempDir::new().expect("home");
    phpdev_cmd(home.path())
        .args(["detect", "/definitely/not/here"])
        .assert()
        .failure()
        .stderr(contains("not a readable directory"));
}

#[test]
fn frameworks_lists_the_table() {
    let home = TempDir::new().expect("home");
    let output = phpdev_cmd(home.path())
        .args(["frameworks", "--json"])
        .output()
        .expect("run frameworks");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let names: Vec<&str> = json
        .as_array()
        .expect("array")
        .iter()
        .filter_map(|f| f["name"].as_str())
        .collect();
    assert_eq!(names.len(), 12);
    assert!(names.contains(&"Laravel"));
    assert!(names.contains(&"CodeIgniter"));
}

// ---------------------------------------------------------------------------
// Daemon not running
// ---------------------------------------------------------------------------

#[test]
fn daemon_commands_without_daemon() {
    let home = TempDir::new().expect("home");

    phpdev_cmd(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(contains("\"running\": false"));

    phpdev_cmd(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(contains("daemon is not running"));

    phpdev_cmd(home.path())
        .args(["server", "list"])
        .assert()
        .failure()
        .stderr(contains("phpdev daemon start"));
}

// ---------------------------------------------------------------------------
// Against a live daemon
// ---------------------------------------------------------------------------

struct DaemonProcess {
    child: Child,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(home: &Path) -> Self {
        let child = phpdev_cmd(home)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        let daemon = Self {
            child,
            home: home.to_path_buf(),
        };
        daemon.wait_ready();
        daemon
    }

    fn wait_ready(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            let ok = phpdev_cmd(&self.home)
                .args(["daemon", "status"])
                .output()
                .map(|o| String::from_utf8_lossy(&o.stdout).contains("uptime_secs"))
                .unwrap_or(false);
            if ok {
                return;
            }
            sleep(Duration::from_millis(100));
        }
        panic!("daemon did not become ready");
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        let _ = phpdev_cmd(&self.home).args(["daemon", "stop"]).output();
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(unix)]
#[test]
fn project_and_config_round_trip_through_daemon() {
    let home = TempDir::new().expect("home");
    let project = laravel_tree(home.path());
    let _daemon = DaemonProcess::start(home.path());

    phpdev_cmd(home.path())
        .args(["project", "add"])
        .arg(&project)
        .assert()
        .success()
        .stdout(contains("Added 'blog'"));

    phpdev_cmd(home.path())
        .args(["project", "add"])
        .arg(&project)
        .assert()
        .failure();

    let output = phpdev_cmd(home.path())
        .args(["project", "list", "--json"])
        .output()
        .expect("list");
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json[0]["name"], "blog");
    assert_eq!(json[0]["framework"], "Laravel");

    phpdev_cmd(home.path())
        .args(["config", "set", "server.default_port", "9001"])
        .assert()
        .success();
    let output = phpdev_cmd(home.path())
        .args(["config", "show", "--json"])
        .output()
        .expect("show");
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(json["server"]["default_port"], 9001);

    phpdev_cmd(home.path())
        .args(["config", "set", "no.such.key", "1"])
        .assert()
        .failure()
        .stderr(contains("unknown key"));

    phpdev_cmd(home.path())
        .args(["server", "stop", "missing-id"])
        .assert()
        .failure()
        .stderr(contains("no running server"));

    phpdev_cmd(home.path())
        .args(["project", "remove", "blog"])
        .assert()
        .success();
    phpdev_cmd(home.path())
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(contains("No projects registered."));
}
