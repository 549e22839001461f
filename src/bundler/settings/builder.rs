//! Builder for constructing BuildSettings.

use super::{BuildSettings, globals::default_globals};
use crate::bundler::error::{Context, Error};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Builder for constructing [`BuildSettings`].
///
/// Provides a fluent API for building settings with validation. Only the
/// project root, package name and version are required; everything else has
/// a conventional default.
///
/// # Examples
///
/// ```no_run
/// use kodegen_bundler_package::bundler::BuildSettingsBuilder;
///
/// # fn example() -> kodegen_bundler_package::bundler::Result<()> {
/// let settings = BuildSettingsBuilder::new()
///     .project_root("/work/components")
///     .package_name("cdk")
///     .version("2.0.0")
///     .max_concurrent_builds(4)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct BuildSettingsBuilder {
    project_root: Option<PathBuf>,
    source_root: Option<PathBuf>,
    package_name: Option<String>,
    package_source: Option<PathBuf>,
    dist_root: Option<PathBuf>,
    scope: Option<String>,
    namespace: Option<String>,
    version: Option<String>,
    license_banner: Option<String>,
    globals: Option<BTreeMap<String, String>>,
    extra_globals: BTreeMap<String, String>,
    entry_file: Option<String>,
    dependency_file: Option<String>,
    compiler_template: Option<String>,
    max_concurrent_builds: Option<usize>,
}

impl BuildSettingsBuilder {
    /// Creates a new settings builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Sets the project root.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn project_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.project_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the directory holding the README.
    ///
    /// Default: `<project_root>/src`
    pub fn source_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.source_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the primary package name.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn package_name(mut self, name: impl Into<String>) -> Self {
        self.package_name = Some(name.into());
        self
    }

    /// Sets the primary package source directory. Relative paths resolve
    /// against the project root.
    ///
    /// Default: `<source_root>/<package_name>`
    pub fn package_source<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.package_source = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the dist root. Relative paths resolve against the project root.
    ///
    /// Default: `<project_root>/dist`
    pub fn dist_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.dist_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the import scope.
    ///
    /// Default: `@angular`
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Sets the UMD namespace prefix.
    ///
    /// Default: `ng`
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the release version.
    ///
    /// # Required
    ///
    /// This field is required for building and must be valid semver.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the license banner.
    ///
    /// Default: a generic banner naming the version and the MIT license.
    pub fn license_banner(mut self, banner: impl Into<String>) -> Self {
        self.license_banner = Some(banner.into());
        self
    }

    /// Replaces the external→global table.
    ///
    /// Default: the framework and reactive-stream table
    pub fn globals(mut self, globals: BTreeMap<String, String>) -> Self {
        self.globals = Some(globals);
        self
    }

    /// Adds one external→global entry on top of the table.
    pub fn global(mut self, module_id: impl Into<String>, global: impl Into<String>) -> Self {
        self.extra_globals.insert(module_id.into(), global.into());
        self
    }

    /// Sets the entry file name.
    ///
    /// Default: `index.ts`
    pub fn entry_file(mut self, name: impl Into<String>) -> Self {
        self.entry_file = Some(name.into());
        self
    }

    /// Sets the dependency declaration file name.
    ///
    /// Default: `package-config.json`
    pub fn dependency_file(mut self, name: impl Into<String>) -> Self {
        self.dependency_file = Some(name.into());
        self
    }

    /// Sets the compiler configuration template file name.
    ///
    /// Default: `tsconfig-build.json`
    pub fn compiler_template(mut self, name: impl Into<String>) -> Self {
        self.compiler_template = Some(name.into());
        self
    }

    /// Limits how many package pipelines may run at once.
    ///
    /// Default: None (bounded by the dependency graph only)
    pub fn max_concurrent_builds(mut self, limit: usize) -> Self {
        self.max_concurrent_builds = Some(limit);
        self
    }

    /// Builds the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing:
    /// - `project_root`
    /// - `package_name`
    /// - `version` (or it is not valid semver)
    ///
    /// or if `max_concurrent_builds` is zero.
    pub fn build(self) -> crate::bundler::Result<BuildSettings> {
        let project_root = self.project_root.context("project_root is required")?;
        let package_name = self.package_name.context("package_name is required")?;
        let version = self.version.context("version is required")?;

        semver::Version::parse(&version)
            .map_err(|e| Error::GenericError(format!("invalid release version `{version}`: {e}")))?;

        if self.max_concurrent_builds == Some(0) {
            return Err(Error::GenericError(
                "max_concurrent_builds must be at least 1".into(),
            ));
        }

        let source_root = resolve(&project_root, self.source_root, "src");
        let package_source = match self.package_source {
            Some(path) if path.is_absolute() => path,
            Some(path) => project_root.join(path),
            None => source_root.join(&package_name),
        };
        let dist_root = resolve(&project_root, self.dist_root, "dist");

        let license_banner = self.license_banner.unwrap_or_else(|| {
            format!(
                "/**\n  * @license {package_name} v{version}\n  * License: MIT\n  */"
            )
        });

        let mut globals = self.globals.unwrap_or_else(default_globals);
        globals.extend(self.extra_globals);

        Ok(BuildSettings::new(
            project_root,
            source_root,
            package_name,
            package_source,
            dist_root,
            self.scope.unwrap_or_else(|| "@angular".into()),
            self.namespace.unwrap_or_else(|| "ng".into()),
            version,
            license_banner,
            globals,
            self.entry_file.unwrap_or_else(|| "index.ts".into()),
            self.dependency_file
                .unwrap_or_else(|| "package-config.json".into()),
            self.compiler_template
                .unwrap_or_else(|| "tsconfig-build.json".into()),
            self.max_concurrent_builds,
        ))
    }
}

fn resolve(root: &Path, path: Option<PathBuf>, default: &str) -> PathBuf {
    match path {
        Some(path) if path.is_absolute() => path,
        Some(path) => root.join(path),
        None => root.join(default),
    }
}
