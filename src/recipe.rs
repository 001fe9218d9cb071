//! The image recipe - a declarative description of the image kiln builds.
//!
//! A recipe pins the base runtime image, lists the baseline system packages,
//! describes the vendor repository that ships the native ODBC driver, names
//! the driver registration entry, and records how the application layer is
//! assembled and launched.
//!
//! Recipes are loaded from JSON (`recipe.json` by default). Every field has
//! a default matching the point-of-sale service this tool was written for,
//! so a missing recipe file builds the reference image.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where driver registration stanzas are written inside the image.
pub const REGISTRY_PATH: &str = "/etc/odbcinst.ini";

/// Environment variable consulted by the dynamic linker at load time.
pub const LOADER_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// Debian variant codename to release number.
///
/// The vendor repository is keyed by release number while base image tags
/// carry the codename, so both directions are needed.
const DEBIAN_RELEASES: &[(&str, &str)] = &[
    ("buster", "10"),
    ("bullseye", "11"),
    ("bookworm", "12"),
    ("trixie", "13"),
];

/// Complete description of one image build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Recipe {
    /// Image name, used for the default tag.
    pub name: String,
    /// Pinned base runtime image.
    pub base: BaseImage,
    /// System-level packages and the vendor driver repository.
    pub system: SystemPackages,
    /// Driver registration entry written into the image.
    pub driver: DriverEntry,
    /// Application layer: manifest, source, launch command.
    pub app: AppLayer,
}

/// Pinned base image reference: `runtime:version-variant`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BaseImage {
    /// Runtime image name (e.g. `python`).
    pub runtime: String,
    /// Runtime major/minor version (e.g. `3.11`). Never `latest`.
    pub version: String,
    /// Distribution variant (e.g. `slim-bullseye`).
    pub variant: String,
}

/// Baseline OS packages plus the vendor repository for the native driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SystemPackages {
    /// Baseline packages the driver package depends on: compilers, TLS/auth
    /// libraries, the generic ODBC runtime and headers.
    pub packages: Vec<String>,
    pub vendor: VendorRepo,
}

/// Third-party package repository carrying the native driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VendorRepo {
    /// Signing key endpoint. Must be https.
    pub key_url: String,
    /// Optional pinned SHA-256 of the signing key. When set, the fetched key
    /// is digest-checked before it enters the trust store; when unset the
    /// key is trusted on first use.
    pub key_sha256: Option<String>,
    /// Repository root. Must be https.
    pub base_url: String,
    /// Repository channel (`prod`).
    pub channel: String,
    /// Native driver package name.
    pub package: String,
    /// Programmatic license acceptance. The vendor installer blocks on an
    /// interactive prompt without it, so a recipe that leaves this false
    /// fails validation instead of rendering a build that hangs.
    pub accept_eula: bool,
    /// Optional explicit OS release override. Must match the release derived
    /// from the base image variant; normally left unset so the value is
    /// derived and cannot drift.
    pub os_release: Option<String>,
}

/// Driver registration entry: logical name to installed shared library.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DriverEntry {
    /// Display name database clients reference in connection strings.
    pub name: String,
    pub description: String,
    /// Absolute path of the shared library the vendor package installs.
    pub library: PathBuf,
}

/// Application layer assembly and launch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppLayer {
    /// Working directory inside the image.
    pub workdir: String,
    /// Dependency manifest, relative to the build context. Copied and
    /// installed before the source tree so source edits keep the
    /// dependency layer cached.
    pub manifest: String,
    /// Source tree to copy, relative to the build context.
    pub source: String,
    pub launch: Launch,
}

/// Default launch command recorded as image metadata. Never executed at
/// build time; operators may override it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Launch {
    /// Worker-managing production server (`gunicorn`).
    pub server: String,
    /// Async worker class handed to the server.
    pub worker_class: String,
    pub workers: u32,
    /// Module containing the application object.
    pub module: String,
    /// Application object name within the module.
    pub object: String,
    /// Bind interface.
    pub host: String,
    /// Listening port. Also declared as image metadata.
    pub port: u16,
}

impl Default for Recipe {
    fn default() -> Self {
        Self {
            name: "pos-service".to_string(),
            base: BaseImage::default(),
            system: SystemPackages::default(),
            driver: DriverEntry::default(),
            app: AppLayer::default(),
        }
    }
}

impl Default for BaseImage {
    fn default() -> Self {
        Self {
            runtime: "python".to_string(),
            version: "3.11".to_string(),
            variant: "slim-bullseye".to_string(),
        }
    }
}

impl Default for SystemPackages {
    fn default() -> Self {
        Self {
            packages: [
                "gcc",
                "g++",
                "curl",
                "gnupg2",
                "libssl-dev",
                "libgssapi-krb5-2",
                "unixodbc",
                "unixodbc-dev",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            vendor: VendorRepo::default(),
        }
    }
}

impl Default for VendorRepo {
    fn default() -> Self {
        Self {
            key_url: "https://packages.microsoft.com/keys/microsoft.asc".to_string(),
            key_sha256: None,
            base_url: "https://packages.microsoft.com".to_string(),
            channel: "prod".to_string(),
            package: "msodbcsql17".to_string(),
            accept_eula: true,
            os_release: None,
        }
    }
}

impl Default for DriverEntry {
    fn default() -> Self {
        Self {
            name: "ODBC Driver 17 for SQL Server".to_string(),
            description: "Microsoft ODBC Driver 17 for SQL Server".to_string(),
            library: PathBuf::from("/opt/microsoft/msodbcsql17/lib64/libmsodbcsql-17.10.so.2.1"),
        }
    }
}

impl Default for AppLayer {
    fn default() -> Self {
        Self {
            workdir: "/app".to_string(),
            manifest: "requirements.txt".to_string(),
            source: ".".to_string(),
            launch: Launch::default(),
        }
    }
}

impl Default for Launch {
    fn default() -> Self {
        Self {
            server: "gunicorn".to_string(),
            worker_class: "uvicorn.workers.UvicornWorker".to_string(),
            workers: 2,
            module: "main".to_string(),
            object: "app".to_string(),
            host: "0.0.0.0".to_string(),
            port: 9000,
        }
    }
}

impl BaseImage {
    /// Full image reference, e.g. `python:3.11-slim-bullseye`.
    pub fn reference(&self) -> String {
        format!("{}:{}-{}", self.runtime, self.version, self.variant)
    }

    /// Distribution codename embedded in the variant
    /// (`slim-bullseye` -> `bullseye`).
    pub fn codename(&self) -> &str {
        self.variant.rsplit('-').next().unwrap_or(&self.variant)
    }

    /// Distribution release number for the variant, if the codename is known.
    pub fn release(&self) -> Option<&'static str> {
        let codename = self.codename();
        DEBIAN_RELEASES
            .iter()
            .find(|(name, _)| *name == codename)
            .map(|(_, release)| *release)
    }
}

impl VendorRepo {
    /// Keyring file the dearmored signing key is written to.
    pub fn keyring_path(&self) -> String {
        format!("/usr/share/keyrings/{}-archive-keyring.gpg", self.package)
    }

    /// Sources list file registering the repository.
    pub fn sources_path(&self) -> String {
        format!("/etc/apt/sources.list.d/{}.list", self.package)
    }

    /// apt source line for the given distribution codename and release.
    pub fn source_line(&self, codename: &str, release: &str) -> String {
        format!(
            "deb [signed-by={}] {}/debian/{}/{} {} main",
            self.keyring_path(),
            self.base_url,
            release,
            self.channel,
            codename,
        )
    }
}

impl DriverEntry {
    /// Directory holding the shared library. This is the value bound to the
    /// loader path variable, so it can never diverge from the registration.
    pub fn library_dir(&self) -> Result<&Path> {
        self.library
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .with_context(|| {
                format!(
                    "driver library path has no directory component: {}",
                    self.library.display()
                )
            })
    }

    /// Registration stanza appended to the driver registry file.
    pub fn stanza(&self) -> String {
        format!(
            "[{}]\nDescription={}\nDriver={}\n",
            self.name,
            self.description,
            self.library.display()
        )
    }
}

impl Launch {
    /// Import target in `module:object` form.
    pub fn import_target(&self) -> String {
        format!("{}:{}", self.module, self.object)
    }

    /// Bind address in `host:port` form.
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Full launch argv recorded as the image's default command.
    pub fn argv(&self) -> Vec<String> {
        vec![
            self.server.clone(),
            "-k".to_string(),
            self.worker_class.clone(),
            "-w".to_string(),
            self.workers.to_string(),
            "-b".to_string(),
            self.bind(),
            self.import_target(),
        ]
    }
}

impl Recipe {
    /// Load a recipe from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe: {}", path.display()))?;
        let recipe: Recipe = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse recipe: {}", path.display()))?;
        recipe.validate()?;
        Ok(recipe)
    }

    /// Load the recipe at `path`, or the built-in default when the file
    /// does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let recipe = Recipe::default();
            recipe.validate()?;
            Ok(recipe)
        }
    }

    /// Validate every structural invariant the pipeline relies on.
    ///
    /// All problems are collected and reported at once, so a broken recipe
    /// is fixed in one pass instead of error-by-error.
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();

        if self.name.trim().is_empty() {
            problems.push("recipe name is empty".to_string());
        }

        // Base image: must be pinned, must map to a known distribution.
        if self.base.runtime.trim().is_empty() {
            problems.push("base.runtime is empty".to_string());
        }
        if self.base.version.trim().is_empty() || self.base.version == "latest" {
            problems.push(format!(
                "base.version must pin an exact version, got '{}'",
                self.base.version
            ));
        }
        if self.base.release().is_none() {
            let known: Vec<&str> = DEBIAN_RELEASES.iter().map(|(name, _)| *name).collect();
            problems.push(format!(
                "base.variant '{}' has no known distribution codename (known: {})",
                self.base.variant,
                known.join(", ")
            ));
        }

        // Baseline packages: the driver package depends on them.
        if self.system.packages.is_empty() {
            problems.push(
                "system.packages is empty; the native driver needs the baseline toolchain \
                 and ODBC runtime"
                    .to_string(),
            );
        }
        for pkg in &self.system.packages {
            if pkg.trim().is_empty() || pkg.contains(char::is_whitespace) {
                problems.push(format!(
                    "system.packages entry '{}' is not a package name",
                    pkg
                ));
            }
        }

        // Vendor repository: secure transport, valid pin, explicit license
        // acceptance, release coupled to the base image.
        let vendor = &self.system.vendor;
        for (field, url) in [("key_url", &vendor.key_url), ("base_url", &vendor.base_url)] {
            if !url.starts_with("https://") {
                problems.push(format!(
                    "system.vendor.{} must use https, got '{}'",
                    field, url
                ));
            }
        }
        if let Some(pin) = &vendor.key_sha256 {
            if pin.len() != 64 || !pin.chars().all(|c| c.is_ascii_hexdigit()) {
                problems.push(format!(
                    "system.vendor.key_sha256 must be 64 hex characters, got '{}'",
                    pin
                ));
            }
        }
        if vendor.package.trim().is_empty() {
            problems.push("system.vendor.package is empty".to_string());
        }
        if !vendor.accept_eula {
            problems.push(format!(
                "system.vendor.accept_eula is false; installing '{}' without programmatic \
                 license acceptance blocks on an interactive prompt",
                vendor.package
            ));
        }
        if let (Some(explicit), Some(derived)) = (&vendor.os_release, self.base.release()) {
            if explicit != derived {
                problems.push(format!(
                    "system.vendor.os_release '{}' does not match release '{}' of base \
                     variant '{}'; the repository must be registered for the exact OS of \
                     the base image",
                    explicit, derived, self.base.variant
                ));
            }
        }

        // Driver registration: absolute shared-object path under a directory.
        if self.driver.name.trim().is_empty() {
            problems.push("driver.name is empty".to_string());
        }
        if !self.driver.library.is_absolute() {
            problems.push(format!(
                "driver.library must be an absolute path, got '{}'",
                self.driver.library.display()
            ));
        }
        let file_name = self
            .driver
            .library
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !file_name.contains(".so") {
            problems.push(format!(
                "driver.library '{}' does not name a shared object",
                self.driver.library.display()
            ));
        }
        if self.driver.library_dir().is_err() {
            problems.push(format!(
                "driver.library '{}' has no directory for the loader path",
                self.driver.library.display()
            ));
        }

        // Application layer.
        if !self.app.workdir.starts_with('/') {
            problems.push(format!(
                "app.workdir must be absolute, got '{}'",
                self.app.workdir
            ));
        }
        if self.app.manifest.trim().is_empty() || self.app.manifest.starts_with('/') {
            problems.push(format!(
                "app.manifest must be a context-relative path, got '{}'",
                self.app.manifest
            ));
        }
        if self.app.source.trim().is_empty() {
            problems.push("app.source is empty".to_string());
        }
        let launch = &self.app.launch;
        for (field, value) in [
            ("server", &launch.server),
            ("worker_class", &launch.worker_class),
            ("module", &launch.module),
            ("object", &launch.object),
            ("host", &launch.host),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("app.launch.{} is empty", field));
            }
        }
        if launch.workers == 0 {
            problems.push("app.launch.workers must be at least 1".to_string());
        }
        if launch.port == 0 {
            problems.push("app.launch.port must be a real TCP port".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            bail!(
                "Recipe is invalid ({} problem{}):\n{}",
                problems.len(),
                if problems.len() == 1 { "" } else { "s" },
                problems
                    .iter()
                    .map(|p| format!("  - {}", p))
                    .collect::<Vec<_>>()
                    .join("\n")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_recipe_is_valid() {
        Recipe::default()
            .validate()
            .expect("default recipe must validate");
    }

    #[test]
    fn base_reference_is_pinned() {
        let base = BaseImage::default();
        assert_eq!(base.reference(), "python:3.11-slim-bullseye");
        assert_eq!(base.codename(), "bullseye");
        assert_eq!(base.release(), Some("11"));
    }

    #[test]
    fn bare_codename_variant_resolves() {
        let base = BaseImage {
            variant: "bookworm".to_string(),
            ..BaseImage::default()
        };
        assert_eq!(base.codename(), "bookworm");
        assert_eq!(base.release(), Some("12"));
    }

    #[test]
    fn floating_tag_is_rejected() {
        let mut recipe = Recipe::default();
        recipe.base.version = "latest".to_string();
        let err = recipe.validate().unwrap_err().to_string();
        assert!(err.contains("pin an exact version"), "got: {}", err);
    }

    #[test]
    fn unknown_variant_is_rejected() {
        let mut recipe = Recipe::default();
        recipe.base.variant = "slim-warty".to_string();
        let err = recipe.validate().unwrap_err().to_string();
        assert!(err.contains("no known distribution codename"), "got: {}", err);
    }

    #[test]
    fn os_release_override_must_match_base() {
        let mut recipe = Recipe::default();
        recipe.system.vendor.os_release = Some("12".to_string());
        let err = recipe.validate().unwrap_err().to_string();
        assert!(err.contains("does not match release '11'"), "got: {}", err);

        recipe.system.vendor.os_release = Some("11".to_string());
        recipe.validate().expect("matching override must validate");
    }

    #[test]
    fn eula_must_be_accepted() {
        let mut recipe = Recipe::default();
        recipe.system.vendor.accept_eula = false;
        let err = recipe.validate().unwrap_err().to_string();
        assert!(err.contains("interactive prompt"), "got: {}", err);
    }

    #[test]
    fn insecure_key_url_is_rejected() {
        let mut recipe = Recipe::default();
        recipe.system.vendor.key_url = "http://packages.microsoft.com/keys/microsoft.asc".into();
        let err = recipe.validate().unwrap_err().to_string();
        assert!(err.contains("must use https"), "got: {}", err);
    }

    #[test]
    fn malformed_key_pin_is_rejected() {
        let mut recipe = Recipe::default();
        recipe.system.vendor.key_sha256 = Some("deadbeef".to_string());
        let err = recipe.validate().unwrap_err().to_string();
        assert!(err.contains("64 hex characters"), "got: {}", err);

        recipe.system.vendor.key_sha256 = Some("ab".repeat(32));
        recipe.validate().expect("well-formed pin must validate");
    }

    #[test]
    fn relative_driver_library_is_rejected() {
        let mut recipe = Recipe::default();
        recipe.driver.library = PathBuf::from("lib64/libmsodbcsql-17.10.so.2.1");
        let err = recipe.validate().unwrap_err().to_string();
        assert!(err.contains("absolute path"), "got: {}", err);
    }

    #[test]
    fn non_library_driver_path_is_rejected() {
        let mut recipe = Recipe::default();
        recipe.driver.library = PathBuf::from("/opt/microsoft/msodbcsql17/lib64/driver.txt");
        let err = recipe.validate().unwrap_err().to_string();
        assert!(err.contains("shared object"), "got: {}", err);
    }

    #[test]
    fn stanza_matches_registry_format() {
        let driver = DriverEntry::default();
        let stanza = driver.stanza();
        assert!(stanza.starts_with("[ODBC Driver 17 for SQL Server]\n"));
        assert!(stanza.contains("\nDescription=Microsoft ODBC Driver 17 for SQL Server\n"));
        assert!(stanza
            .contains("\nDriver=/opt/microsoft/msodbcsql17/lib64/libmsodbcsql-17.10.so.2.1\n"));
    }

    #[test]
    fn library_dir_is_the_loader_path_value() {
        let driver = DriverEntry::default();
        assert_eq!(
            driver.library_dir().unwrap(),
            Path::new("/opt/microsoft/msodbcsql17/lib64")
        );
    }

    #[test]
    fn launch_argv_binds_declared_port() {
        let launch = Launch::default();
        let argv = launch.argv();
        assert_eq!(argv[0], "gunicorn");
        assert!(argv.contains(&"uvicorn.workers.UvicornWorker".to_string()));
        assert!(argv.contains(&"0.0.0.0:9000".to_string()));
        assert_eq!(argv.last().unwrap(), "main:app");
    }

    #[test]
    fn source_line_couples_release_and_codename() {
        let vendor = VendorRepo::default();
        let line = vendor.source_line("bullseye", "11");
        assert_eq!(
            line,
            "deb [signed-by=/usr/share/keyrings/msodbcsql17-archive-keyring.gpg] \
             https://packages.microsoft.com/debian/11/prod bullseye main"
        );
    }

    #[test]
    fn recipe_round_trips_through_json() {
        let recipe = Recipe::default();
        let json = serde_json::to_string_pretty(&recipe).unwrap();
        let back: Recipe = serde_json::from_str(&json).unwrap();
        assert_eq!(back.base.reference(), recipe.base.reference());
        assert_eq!(back.driver.library, recipe.driver.library);
        assert_eq!(back.app.launch.port, recipe.app.launch.port);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<Recipe>(r#"{"bas": {}}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }
}
