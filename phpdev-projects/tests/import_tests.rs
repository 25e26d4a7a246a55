//! Project registry and Git import against in-process collaborators.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use phpdev_core::{CloneProjectRequest, ConfigStore, ErrorKind, Framework, ProjectName};
use phpdev_projects::{GitCloner, ImportError, Importer, ProjectStore, SetupRunner};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Materializes a Laravel-shaped tree instead of talking to a remote.
#[derive(Default)]
struct FakeGit {
    fail: bool,
    calls: Mutex<Vec<(String, PathBuf, Option<String>)>>,
}

impl GitCloner for FakeGit {
    fn clone_repo(&self, url: &str, dest: &Path, branch: Option<&str>) -> Result<(), ImportError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), dest.to_path_buf(), branch.map(str::to_string)));
        fs::create_dir_all(dest.join("public")).unwrap();
        if self.fail {
            fs::write(dest.join("partial"), "x").unwrap();
            return Err(ImportError::Clone {
                url: url.to_string(),
                message: "repository not found".into(),
            });
        }
        fs::write(dest.join("artisan"), "#!/usr/bin/env php\n").unwrap();
        fs::write(
            dest.join("composer.json"),
            r#"{"require": {"php": "^8.2", "laravel/framework": "^11.0"}}"#,
        )
        .unwrap();
        fs::write(dest.join("public/index.php"), "<?php\n").unwrap();
        fs::write(dest.join(".env.example"), "APP_KEY=\n").unwrap();
        Ok(())
    }
}

/// Records commands; fails the ones listed in `failing`.
#[derive(Default)]
struct FakeSetup {
    failing: Vec<&'static str>,
    ran: Mutex<Vec<String>>,
}

impl SetupRunner for FakeSetup {
    fn run(&self, command: &str, _cwd: &Path) -> Result<(), String> {
        self.ran.lock().unwrap().push(command.to_string());
        if self.failing.iter().any(|f| *f == command) {
            return Err("exit status: 1".into());
        }
        Ok(())
    }
}

/// Registers `repo` from another directory the first time setup runs.
struct NameSquatter {
    store: Arc<ProjectStore>,
    other: PathBuf,
    done: AtomicBool,
}

impl SetupRunner for NameSquatter {
    fn run(&self, _command: &str, _cwd: &Path) -> Result<(), String> {
        if !self.done.swap(true, Ordering::SeqCst) {
            self.store
                .add(&self.other, Some("repo"))
                .map_err(|e| e.to_string())?;
        }
        Ok(())
    }
}

struct Env {
    home: TempDir,
    store: Arc<ProjectStore>,
    importer: Importer,
}

fn env(git: Arc<FakeGit>, setup: Arc<FakeSetup>) -> Env {
    let home = TempDir::new().expect("tempdir");
    let config = Arc::new(ConfigStore::open_at(home.path()).expect("config"));
    let store = Arc::new(ProjectStore::open_at(home.path()).expect("store"));
    let importer = Importer::new(
        home.path().to_path_buf(),
        config,
        Arc::clone(&store),
        git,
        setup,
    );
    Env {
        home,
        store,
        importer,
    }
}

fn clone_request(url: &str, auto_setup: bool) -> CloneProjectRequest {
    CloneProjectRequest {
        git_url: url.into(),
        auto_setup,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// clone
// ---------------------------------------------------------------------------

#[tokio::test]
async fn laravel_clone_with_auto_setup() {
    let setup = Arc::new(FakeSetup {
        failing: vec!["php artisan key:generate"],
        ..Default::default()
    });
    let env = env(Arc::new(FakeGit::default()), Arc::clone(&setup));

    let outcome = env
        .importer
        .clone_project(clone_request("https://example.com/user/repo.git", true))
        .await
        .expect("clone");

    let project = &outcome.project;
    assert_eq!(project.name, ProjectName::from("repo"));
    assert_eq!(project.framework, Some(Framework::Laravel));
    assert_eq!(project.entry_point.as_deref(), Some("public/index.php"));
    assert_eq!(project.php_version.as_deref(), Some("8.2.0"));
    assert_eq!(project.path, env.home.path().join("phpdev-projects/repo"));
    assert_eq!(project.git_url.as_deref(), Some("https://example.com/user/repo.git"));

    assert_eq!(
        *setup.ran.lock().unwrap(),
        ["composer install", "cp .env.example .env", "php artisan key:generate"]
    );
    assert_eq!(outcome.setup_failures.len(), 1);
    assert_eq!(outcome.setup_failures[0].command, "php artisan key:generate");

    assert!(project.path.join("artisan").exists(), "setup failure must not roll back");
    assert_eq!(env.store.get(&project.name).as_ref(), Some(project));
}

#[tokio::test]
async fn clone_without_auto_setup_runs_nothing() {
    let setup = Arc::new(FakeSetup::default());
    let env = env(Arc::new(FakeGit::default()), Arc::clone(&setup));
    env.importer
        .clone_project(clone_request("https://example.com/user/shop.git", false))
        .await
        .expect("clone");
    assert!(setup.ran.lock().unwrap().is_empty());
}

#[tokio::test]
async fn branch_and_destination_are_forwarded() {
    let git = Arc::new(FakeGit::default());
    let env = env(Arc::clone(&git), Arc::new(FakeSetup::default()));
    let dest = env.home.path().join("elsewhere/app");

    let outcome = env
        .importer
        .clone_project(CloneProjectRequest {
            git_url: "git@github.com:acme/app.git".into(),
            destination: Some(dest.clone()),
            branch: Some("develop".into()),
            auto_setup: false,
        })
        .await
        .expect("clone");

    assert_eq!(outcome.project.path, dest);
    let calls = git.calls.lock().unwrap();
    assert_eq!(calls[0].1, dest);
    assert_eq!(calls[0].2.as_deref(), Some("develop"));
}

#[tokio::test]
async fn non_empty_destination_is_conflict() {
    let git = Arc::new(FakeGit::default());
    let env = env(Arc::clone(&git), Arc::new(FakeSetup::default()));
    let dest = env.home.path().join("phpdev-projects/repo");
    fs::create_dir_all(&dest).unwrap();
    fs::write(dest.join("keep.txt"), "mine").unwrap();

    let err = env
        .importer
        .clone_project(clone_request("https://example.com/user/repo.git", false))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(git.calls.lock().unwrap().is_empty());
    assert_eq!(fs::read_to_string(dest.join("keep.txt")).unwrap(), "mine");
}

#[tokio::test]
async fn failed_clone_cleans_up() {
    let git = Arc::new(FakeGit {
        fail: true,
        ..Default::default()
    });
    let env = env(git, Arc::new(FakeSetup::default()));

    let err = env
        .importer
        .clone_project(clone_request("https://example.com/user/gone.git", false))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CloneFailed);
    assert!(!env.home.path().join("phpdev-projects/gone").exists());
    assert!(env.store.list().is_empty());
}

#[tokio::test]
async fn failed_registration_discards_clone() {
    let home = TempDir::new().unwrap();
    let other = home.path().join("other");
    fs::create_dir_all(&other).unwrap();
    let config = Arc::new(ConfigStore::open_at(home.path()).unwrap());
    let store = Arc::new(ProjectStore::open_at(home.path()).unwrap());
    let squatter = Arc::new(NameSquatter {
        store: Arc::clone(&store),
        other,
        done: AtomicBool::new(false),
    });
    let importer = Importer::new(
        home.path().to_path_buf(),
        config,
        Arc::clone(&store),
        Arc::new(FakeGit::default()),
        squatter,
    );
    let dest = home.path().join("phpdev-projects/repo");

    let err = importer
        .clone_project(clone_request("https://example.com/user/repo.git", true))
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::DuplicateName { .. }), "got {err}");
    assert!(!dest.exists(), "unregistered clone left on disk");

    store.remove(&ProjectName::from("repo")).unwrap();
    let outcome = importer
        .clone_project(clone_request("https://example.com/user/repo.git", true))
        .await
        .expect("second clone");
    assert_eq!(outcome.project.path, dest);
    assert!(dest.join("artisan").exists());
    assert_eq!(store.get(&ProjectName::from("repo")).as_ref(), Some(&outcome.project));
}

#[tokio::test]
async fn registered_name_is_conflict() {
    let env = env(Arc::new(FakeGit::default()), Arc::new(FakeSetup::default()));
    env.importer
        .clone_project(clone_request("https://example.com/a/repo.git", false))
        .await
        .expect("first");
    let err = env
        .importer
        .clone_project(clone_request("https://example.com/b/repo.git", false))
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::DuplicateName { .. }), "got {err}");
}

// ---------------------------------------------------------------------------
// registry
// ---------------------------------------------------------------------------

#[test]
fn add_list_remove_and_persist() {
    let home = TempDir::new().unwrap();
    let site = home.path().join("sites/blog");
    fs::create_dir_all(&site).unwrap();
    fs::write(site.join("index.php"), "<?php echo 1;").unwrap();

    let store = ProjectStore::open_at(home.path()).unwrap();
    let project = store.add(&site, None).unwrap();
    assert_eq!(project.name, ProjectName::from("blog"));
    assert_eq!(project.framework, Some(Framework::Plain));
    assert_eq!(project.entry_point.as_deref(), Some("index.php"));

    let reopened = ProjectStore::open_at(home.path()).unwrap();
    assert_eq!(reopened.list(), vec![project.clone()]);
    assert_eq!(reopened.get_info(&site).unwrap(), project);

    let removed = reopened.remove(&project.name).unwrap();
    assert_eq!(removed.name, project.name);
    assert!(reopened.list().is_empty());
    assert!(site.join("index.php").exists(), "remove must not touch files");
    assert!(ProjectStore::open_at(home.path()).unwrap().list().is_empty());
}

#[test]
fn add_errors() {
    let home = TempDir::new().unwrap();
    let store = ProjectStore::open_at(home.path()).unwrap();

    let err = store.add(&home.path().join("missing"), None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let a = home.path().join("a");
    let b = home.path().join("b");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    store.add(&a, Some("site")).unwrap();
    let err = store.add(&b, Some("site")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = store.remove(&ProjectName::from("nope")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn get_info_inspects_unregistered_paths() {
    let home = TempDir::new().unwrap();
    let app = home.path().join("cake-app");
    fs::create_dir_all(app.join("bin")).unwrap();
    fs::write(app.join("bin/cake"), "").unwrap();

    let store = ProjectStore::open_at(home.path()).unwrap();
    let info = store.get_info(&app).unwrap();
    assert_eq!(info.framework, Some(Framework::CakePHP));
    assert_eq!(info.entry_point.as_deref(), Some("webroot/index.php"));
    assert!(store.list().is_empty(), "inspection must not register");
}
