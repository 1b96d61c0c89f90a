//! Per-invocation context shared by every task.

use std::sync::{Arc, OnceLock};

use camino::{Utf8Path, Utf8PathBuf};

use crate::compiler::{Compiler, CopySources, ExternalCompiler, ProjectConfig, Transpile};
use crate::config::Config;
use crate::error::{BundlingError, ExtforgeError};
use crate::nls::{LocalizeOptions, Translations};
use crate::sync::{TransifexClient, TranslationService};

/// Immutable view of one extension workspace.
pub struct Workspace {
    pub root: Utf8PathBuf,
    pub config: Config,
    pub project: ProjectConfig,
    /// Override path of the packaged artifact.
    pub package_path: Option<Utf8PathBuf>,
    transpiler: Arc<dyn Transpile>,
    compiler: OnceLock<Compiler>,
    service: Arc<dyn TranslationService>,
}

impl Workspace {
    /// Reads the config and project files of the workspace at `root`.
    pub fn load(
        root: &Utf8Path,
        config: Option<&Utf8Path>,
        token: Option<String>,
    ) -> Result<Self, ExtforgeError> {
        let config = Config::load(root, config)?.with_token(token);
        let project = ProjectConfig::load(root, &config.project)?;

        let transpiler: Arc<dyn Transpile> = match &config.compiler {
            Some(command) => Arc::new(ExternalCompiler {
                program: command.program.clone(),
                args: command.args.clone(),
            }),
            None => Arc::new(CopySources),
        };
        let service = Arc::new(TransifexClient::new(&config.transifex)?);

        Ok(Self::new(root, config, project, transpiler, service))
    }

    pub fn new(
        root: impl Into<Utf8PathBuf>,
        config: Config,
        project: ProjectConfig,
        transpiler: Arc<dyn Transpile>,
        service: Arc<dyn TranslationService>,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            project,
            package_path: None,
            transpiler,
            compiler: OnceLock::new(),
            service,
        }
    }

    pub fn with_package_path(mut self, path: Option<Utf8PathBuf>) -> Self {
        self.package_path = path;
        self
    }

    /// The compiler, built on first use and reused by every later build.
    pub fn compiler(&self) -> &Compiler {
        self.compiler.get_or_init(|| {
            Compiler::new(&self.root, self.project.clone(), self.transpiler.clone())
        })
    }

    pub fn service(&self) -> Arc<dyn TranslationService> {
        self.service.clone()
    }

    /// Output root, relative to the workspace.
    pub fn out_dir(&self) -> &Utf8Path {
        &self.project.compiler_options.out_dir
    }

    pub fn localization_dir(&self) -> Utf8PathBuf {
        self.config.localization_dir(&self.root)
    }

    /// Options of a localized build, with the imported translations
    /// currently on disk.
    pub async fn localize_options(&self) -> Result<LocalizeOptions, BundlingError> {
        let translations = Translations::load(
            &self.root,
            &self.config.translations_dir,
            &self.config.languages,
        )
        .await?;

        Ok(LocalizeOptions {
            bundle_id: self.config.bundle_id.clone(),
            languages: self.config.languages.clone(),
            i18n_dir: self.config.i18n_dir.clone(),
            out_dir: self.out_dir().to_path_buf(),
            translations,
        })
    }
}

impl std::fmt::Debug for Workspace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.root)
            .field("config", &self.config)
            .field("project", &self.project)
            .field("package_path", &self.package_path)
            .finish_non_exhaustive()
    }
}
