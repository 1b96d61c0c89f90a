//! Static, immutable configuration of one extension workspace.
//!
//! Everything here is read once at process start and then shared read-only
//! with every task through the [`Workspace`](crate::Workspace).

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::language::{LanguageTarget, default_languages};

/// File looked up at the workspace root when no explicit config is given.
pub const CONFIG_FILE: &str = "extforge.json";

/// Environment variable holding the translation service token.
pub const TOKEN_ENV: &str = "TRANSIFEX_API_TOKEN";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Bundle identifier written into the metadata header,
    /// `<publisher>.<name>`.
    pub bundle_id: String,
    /// Project/compiler configuration file.
    pub project: Utf8PathBuf,
    /// Root of the per-language resource folders generated by a localized
    /// build.
    pub i18n_dir: Utf8PathBuf,
    /// Root of the imported translations read by a localized build. Only
    /// `i18n-import` writes here.
    pub translations_dir: Utf8PathBuf,
    /// Default-language strings contributed by the extension manifest.
    pub package_nls: Utf8PathBuf,
    /// Extension manifest.
    pub manifest: Utf8PathBuf,
    /// Directory checked for linked modules before packaging.
    pub dependency_root: Utf8PathBuf,
    pub languages: Vec<LanguageTarget>,
    /// Globs re-triggering `dev-build` in watch mode.
    pub watch: Vec<String>,
    /// Files copied verbatim into the output root.
    pub scripts: Vec<Utf8PathBuf>,
    /// External compiler. When absent, sources are copied unchanged.
    pub compiler: Option<CommandConfig>,
    pub lint: LintConfig,
    pub packager: PackagerConfig,
    pub transifex: RemoteConfig,
    pub partial_pull: PartialPull,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bundle_id: "ms-vscode.vscode-edge-debug2".into(),
            project: "tsconfig.json".into(),
            i18n_dir: "i18n".into(),
            translations_dir: "translations".into(),
            package_nls: "package.nls.json".into(),
            manifest: "package.json".into(),
            dependency_root: "node_modules".into(),
            languages: default_languages(),
            watch: vec!["src/**/*".into(), "test/**/*".into()],
            scripts: vec!["src/terminateProcess.sh".into()],
            compiler: None,
            lint: LintConfig::default(),
            packager: PackagerConfig::default(),
            transifex: RemoteConfig::default(),
            partial_pull: PartialPull::default(),
        }
    }
}

impl Config {
    /// Loads the config for the workspace at `root`.
    ///
    /// An explicit `path` must exist. Without one, `extforge.json` is used if
    /// present and the defaults otherwise.
    pub fn load(root: &Utf8Path, path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let (path, required) = match path {
            Some(path) => (root.join(path), true),
            None => (root.join(CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            tracing::debug!("no {CONFIG_FILE} found, using defaults");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;

        serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.transifex.token = token.filter(|token| !token.is_empty());
        self
    }

    /// Where pulled exchange files live, `../<extension>-localization`.
    pub fn localization_dir(&self, root: &Utf8Path) -> Utf8PathBuf {
        root.join("..")
            .join(format!("{}-localization", self.transifex.extension))
    }

    /// Where `transifex-push-test` writes, `../<extension>-push-test`.
    pub fn push_test_dir(&self, root: &Utf8Path) -> Utf8PathBuf {
        root.join("..")
            .join(format!("{}-push-test", self.transifex.extension))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LintConfig {
    pub program: String,
    pub args: Vec<String>,
    pub sources: Vec<String>,
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            program: "tslint".into(),
            args: vec!["--format".into(), "verbose".into()],
            sources: vec!["src/**/*.ts".into()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackagerConfig {
    pub program: String,
    pub package_args: Vec<String>,
    pub publish_args: Vec<String>,
    /// Flag preceding the override path of the packaged artifact.
    pub out_flag: String,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            program: "vsce".into(),
            package_args: vec!["package".into()],
            publish_args: vec!["publish".into()],
            out_flag: "--out".into(),
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteConfig {
    pub hostname: String,
    pub api_name: String,
    pub project: String,
    /// Extension name, doubles as the remote resource identifier.
    pub extension: String,
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            hostname: "www.transifex.com".into(),
            api_name: "api".into(),
            project: "vscode-extensions".into(),
            extension: "vscode-edge-debug2".into(),
            token: None,
        }
    }
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("hostname", &self.hostname)
            .field("api_name", &self.api_name)
            .field("project", &self.project)
            .field("extension", &self.extension)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// What `transifex-sync` does when some languages failed to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartialPull {
    /// Import nothing.
    #[default]
    Abort,
    /// Import the languages that did download, then report the failures.
    ImportSucceeded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let config = Config::load(root, None).unwrap();
        assert_eq!(config.languages.len(), 13);
        assert_eq!(config.transifex.project, "vscode-extensions");
        assert_eq!(config.partial_pull, PartialPull::Abort);
        assert_ne!(config.translations_dir, config.i18n_dir);
    }

    #[test]
    fn partial_override() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(
            root.join(CONFIG_FILE),
            r#"{
                "bundleId": "acme.tool",
                "languages": [{ "id": "fr", "folderName": "fra" }],
                "transifex": { "extension": "tool" },
                "partialPull": "importSucceeded"
            }"#,
        )
        .unwrap();

        let config = Config::load(root, None).unwrap();
        assert_eq!(config.bundle_id, "acme.tool");
        assert_eq!(config.languages, vec![LanguageTarget::new("fr", "fra")]);
        assert_eq!(config.transifex.extension, "tool");
        assert_eq!(config.transifex.hostname, "www.transifex.com");
        assert_eq!(config.partial_pull, PartialPull::ImportSucceeded);
        assert_eq!(
            config.localization_dir(root),
            root.join("../tool-localization")
        );
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();

        let result = Config::load(root, Some(Utf8Path::new("missing.json")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn token_is_not_printed() {
        let config = Config::default().with_token(Some("secret".into()));
        let debug = format!("{:?}", config.transifex);
        assert!(!debug.contains("secret"));
        assert!(config.transifex.token.is_some());
    }
}
