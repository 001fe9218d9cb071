//! Rendered-output properties.
//!
//! These tests pin the observable contract of the rendered Containerfile:
//! determinism, the installer's ordering invariants, the driver
//! registration consistency rules, and the port/launch coupling.

mod helpers;

use helpers::{assert_file_exists, assert_ordered, TestEnv};
use regex::Regex;

use kiln::commands::{cmd_render, render::write_containerfile};
use kiln::pipeline::render::containerfile;
use kiln::recipe::Recipe;

#[test]
fn rendering_the_same_recipe_twice_is_byte_identical() {
    let recipe = Recipe::default();
    assert_eq!(
        containerfile(&recipe).unwrap(),
        containerfile(&recipe).unwrap()
    );
}

#[test]
fn first_instruction_selects_the_pinned_base() {
    let rendered = containerfile(&Recipe::default()).unwrap();
    let first = rendered
        .lines()
        .find(|l| !l.starts_with('#') && !l.trim().is_empty())
        .unwrap();
    assert_eq!(first, "FROM python:3.11-slim-bullseye");
}

#[test]
fn installer_steps_keep_the_required_order() {
    let rendered = containerfile(&Recipe::default()).unwrap();

    // Index refresh before baseline install.
    assert_ordered(&rendered, "RUN apt-get update", "apt-get install -y");
    // Key is trusted before the repository is registered.
    assert_ordered(&rendered, "gpg --dearmor", "sources.list.d");
    // Repository registered before the second index refresh.
    let refreshes: Vec<usize> = rendered
        .match_indices("RUN apt-get update")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(refreshes.len(), 2, "expected exactly two index refreshes");
    let repo = rendered.find("sources.list.d").unwrap();
    assert!(refreshes[0] < repo && repo < refreshes[1]);
    // Vendor index visible before the driver install.
    assert_ordered(&rendered, "sources.list.d", "ACCEPT_EULA=Y");
    // Driver installed before cleanup.
    assert_ordered(&rendered, "ACCEPT_EULA=Y", "apt-get clean");
}

#[test]
fn driver_library_is_probed_before_registration() {
    let rendered = containerfile(&Recipe::default()).unwrap();
    let line = rendered
        .lines()
        .find(|l| l.contains("/etc/odbcinst.ini"))
        .expect("registration step missing");
    assert_ordered(line, "test -f", ">> /etc/odbcinst.ini");
}

#[test]
fn loader_path_equals_the_registered_library_directory() {
    let recipe = Recipe::default();
    let rendered = containerfile(&recipe).unwrap();

    let pattern = Regex::new(r"(?m)^ENV LD_LIBRARY_PATH=(.+)$").unwrap();
    let dir = pattern
        .captures(&rendered)
        .expect("loader path env missing")[1]
        .to_string();

    assert_eq!(dir, recipe.driver.library_dir().unwrap().display().to_string());
    assert!(recipe.driver.library.starts_with(&dir));
}

#[test]
fn manifest_is_copied_and_installed_before_the_source_tree() {
    let rendered = containerfile(&Recipe::default()).unwrap();
    assert_ordered(&rendered, "COPY requirements.txt ./", "pip install");
    assert_ordered(&rendered, "pip install", "COPY . .");
}

#[test]
fn declared_port_equals_the_bind_port() {
    let rendered = containerfile(&Recipe::default()).unwrap();

    let expose = Regex::new(r"(?m)^EXPOSE (\d+)$").unwrap();
    let exposed = &expose.captures(&rendered).expect("EXPOSE missing")[1];

    let bind = Regex::new(r#""[0-9.]+:(\d+)""#).unwrap();
    let bound = &bind.captures(&rendered).expect("bind argument missing")[1];

    assert_eq!(exposed, bound);
}

#[test]
fn only_the_cleanup_step_tolerates_failure() {
    let rendered = containerfile(&Recipe::default()).unwrap();
    let guarded: Vec<&str> = rendered
        .lines()
        .filter(|l| l.ends_with("|| true"))
        .collect();
    assert_eq!(guarded.len(), 1, "got: {:?}", guarded);
    assert!(guarded[0].contains("apt-get clean"));
}

#[test]
fn unpinned_key_renders_a_trust_note_and_no_digest_check() {
    let rendered = containerfile(&Recipe::default()).unwrap();
    assert!(rendered.contains("# no key digest pinned"));
    assert!(!rendered.contains("sha256sum -c"));
}

#[test]
fn custom_recipe_changes_flow_through_every_layer() {
    let env = TestEnv::with_service();
    env.write_recipe(
        r#"{
            "name": "inventory-api",
            "base": { "runtime": "python", "version": "3.12", "variant": "slim-bookworm" },
            "system": {
                "vendor": {
                    "package": "msodbcsql18",
                    "key_sha256": "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef"
                }
            },
            "driver": {
                "name": "ODBC Driver 18 for SQL Server",
                "description": "Microsoft ODBC Driver 18 for SQL Server",
                "library": "/opt/microsoft/msodbcsql18/lib64/libmsodbcsql-18.3.so.2.1"
            },
            "app": {
                "launch": { "module": "service", "object": "api", "port": 8080, "workers": 4 }
            }
        }"#,
    );

    let recipe = Recipe::load(&env.config().recipe_path).unwrap();
    let rendered = containerfile(&recipe).unwrap();

    assert!(rendered.contains("FROM python:3.12-slim-bookworm"));
    assert!(rendered.contains("/debian/12/prod bookworm main"));
    assert!(rendered.contains("ACCEPT_EULA=Y apt-get install -y --no-install-recommends msodbcsql18"));
    assert_ordered(&rendered, "sha256sum -c", "gpg --dearmor");
    assert!(rendered.contains("ENV LD_LIBRARY_PATH=/opt/microsoft/msodbcsql18/lib64"));
    assert!(rendered.contains("EXPOSE 8080"));
    assert!(rendered.contains("\"service:api\""));
    assert!(rendered.contains("\"0.0.0.0:8080\""));
    assert!(!rendered.contains("msodbcsql17"));
}

#[test]
fn render_command_writes_the_containerfile() {
    let env = TestEnv::with_service();
    let config = env.config();

    cmd_render(&config, false).unwrap();

    let path = config.containerfile();
    assert_file_exists(&path);
    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, containerfile(&Recipe::default()).unwrap());
}

#[test]
fn write_containerfile_creates_the_output_directory() {
    let env = TestEnv::new();
    let config = env.config();
    assert!(!config.output.exists());

    let rendered = containerfile(&Recipe::default()).unwrap();
    let path = write_containerfile(&config, &rendered).unwrap();
    assert_file_exists(&path);
}
