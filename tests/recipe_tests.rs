//! Recipe loading, preflight checks, and staleness tracking against a real
//! build context on disk.

mod helpers;

use helpers::TestEnv;

use kiln::cache;
use kiln::preflight::run_preflight;
use kiln::recipe::Recipe;
use kiln::report::Status;

#[test]
fn recipe_loads_from_a_file() {
    let env = TestEnv::with_service();
    let path = env.write_recipe(r#"{ "name": "till-service" }"#);

    let recipe = Recipe::load(&path).unwrap();
    assert_eq!(recipe.name, "till-service");
    // Unspecified sections keep the reference defaults.
    assert_eq!(recipe.base.reference(), "python:3.11-slim-bullseye");
    assert_eq!(recipe.app.launch.port, 9000);
}

#[test]
fn missing_recipe_file_falls_back_to_the_default() {
    let env = TestEnv::with_service();
    let recipe = Recipe::load_or_default(&env.config().recipe_path).unwrap();
    assert_eq!(recipe.name, "pos-service");
}

#[test]
fn malformed_recipe_file_is_a_parse_error() {
    let env = TestEnv::new();
    let path = env.write_recipe("{ not json");
    let err = Recipe::load(&path).unwrap_err().to_string();
    assert!(err.contains("parse recipe"), "got: {}", err);
}

#[test]
fn invalid_recipe_file_fails_validation_on_load() {
    let env = TestEnv::new();
    let path = env.write_recipe(r#"{ "base": { "version": "latest" } }"#);
    let err = format!("{:#}", Recipe::load(&path).unwrap_err());
    assert!(err.contains("pin an exact version"), "got: {}", err);
}

#[test]
fn preflight_accepts_a_complete_context() {
    let env = TestEnv::with_service();
    let report = run_preflight(&env.config());

    for name in ["recipe", "build context", "dependency manifest", "application source"] {
        let check = report
            .checks
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("missing check '{}'", name));
        assert_eq!(check.status, Status::Pass, "check '{}': {:?}", name, check);
    }
}

#[test]
fn preflight_fails_on_a_missing_manifest() {
    let env = TestEnv::new();
    env.write("main.py", "app = object()\n");
    let report = run_preflight(&env.config());

    let manifest = report
        .checks
        .iter()
        .find(|c| c.name == "dependency manifest")
        .expect("manifest check missing");
    assert_eq!(manifest.status, Status::Fail);
    assert!(!report.all_passed());
}

#[test]
fn preflight_warns_on_an_empty_manifest() {
    let env = TestEnv::new();
    env.write("requirements.txt", "# nothing pinned yet\n");
    env.write("main.py", "app = object()\n");
    let report = run_preflight(&env.config());

    let manifest = report
        .checks
        .iter()
        .find(|c| c.name == "dependency manifest")
        .expect("manifest check missing");
    assert_eq!(manifest.status, Status::Warn);
}

#[test]
fn preflight_fails_on_a_broken_recipe() {
    let env = TestEnv::with_service();
    env.write_recipe(r#"{ "system": { "vendor": { "accept_eula": false } } }"#);
    let report = run_preflight(&env.config());

    let recipe = report
        .checks
        .iter()
        .find(|c| c.name == "recipe")
        .expect("recipe check missing");
    assert_eq!(recipe.status, Status::Fail);
}

#[test]
fn source_edits_do_not_touch_the_manifest_digest() {
    let env = TestEnv::with_service();
    let manifest = env.context.join("requirements.txt");

    let manifest_before = cache::digest_file(&manifest).unwrap();
    let tree_before = cache::digest_tree(&env.context, &[env.output.as_path()]).unwrap();

    env.write("main.py", "app = dict()\n");

    let manifest_after = cache::digest_file(&manifest).unwrap();
    let tree_after = cache::digest_tree(&env.context, &[env.output.as_path()]).unwrap();

    assert_eq!(manifest_before, manifest_after);
    assert_ne!(tree_before, tree_after);
}

#[test]
fn manifest_edits_invalidate_the_dependency_layer() {
    let env = TestEnv::with_service();
    let manifest = env.context.join("requirements.txt");
    let record = cache::record_path(&env.output, cache::MANIFEST_RECORD);

    let digest = cache::digest_file(&manifest).unwrap();
    cache::record(&record, &digest).unwrap();
    assert!(!cache::is_stale(Some(&digest), &record));

    env.write("requirements.txt", "fastapi==0.999.0\n");
    let changed = cache::digest_file(&manifest).unwrap();
    assert!(cache::is_stale(Some(&changed), &record));
}
