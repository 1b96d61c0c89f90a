//! Translation sync.
//!
//! Strings leave the workspace as one XLF exchange unit built from the
//! manifest strings and the metadata files of the last `build`, and come back
//! as one exchange unit per language. Pulled units are stored under
//! `<localization>/<folder>/<project>/<extension>.xlf` and imported into the
//! translation folders a localized build reads from.

pub mod transifex;
pub mod xlf;

use std::collections::HashMap;
use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tokio::task::JoinSet;

use crate::config::{PartialPull, RemoteConfig};
use crate::error::{BundlingError, LanguageFailure, SyncError, XlfError};
use crate::language::LanguageTarget;
use crate::nls::MetadataBundle;
use crate::nls::languages::read_package_nls;
use crate::nls::metadata::{HEADER_FILE, METADATA_FILE, MetadataHeader};

pub use transifex::{TransifexClient, TranslationService};
pub use xlf::{ExchangeUnit, TransUnit, XlfFile};

/// Builds the exchange unit of the workspace from `package.nls.json` and the
/// metadata files in the output root.
pub async fn exchange_unit(
    root: &Utf8Path,
    package_nls: &Utf8Path,
    out_dir: &Utf8Path,
) -> Result<ExchangeUnit, SyncError> {
    let package_path = root.join(package_nls);
    let exists = tokio::fs::try_exists(&package_path).await.unwrap_or(false);
    let package = if exists {
        read_package_nls(&package_path).await?
    } else {
        tracing::debug!("no {package_nls}, pushing compiled strings only");
        Default::default()
    };

    let out = root.join(out_dir);
    let header: MetadataHeader = read_json(&out.join(HEADER_FILE)).await?;
    let bundle: MetadataBundle = read_json(&out.join(METADATA_FILE)).await?;

    Ok(ExchangeUnit::from_metadata(&package, &header, &bundle))
}

/// Uploads the exchange unit under the configured project and extension.
pub async fn push(
    service: &dyn TranslationService,
    remote: &RemoteConfig,
    unit: &ExchangeUnit,
) -> Result<(), SyncError> {
    let xml = unit.to_xml()?;
    service.push(&remote.project, &remote.extension, xml).await?;

    tracing::info!(
        "pushed {} string(s) to {}/{}",
        unit.unit_count(),
        remote.project,
        remote.extension
    );
    Ok(())
}

/// Writes the exchange unit to `<dir>/<project>/<extension>.xlf` instead of
/// uploading it.
pub async fn push_test(
    dir: &Utf8Path,
    remote: &RemoteConfig,
    unit: &ExchangeUnit,
) -> Result<Utf8PathBuf, SyncError> {
    let path = exchange_path(dir, remote);
    write(&path, unit.to_xml()?.as_bytes()).await?;

    tracing::info!("wrote {} string(s) to {path}", unit.unit_count());
    Ok(path)
}

/// Result of pulling every language.
#[derive(Debug, Default)]
pub struct PullOutcome {
    /// Languages that downloaded, with the file written for each.
    pub pulled: Vec<(LanguageTarget, Utf8PathBuf)>,
    pub failures: Vec<LanguageFailure>,
}

impl PullOutcome {
    pub fn succeeded(&self) -> Vec<LanguageTarget> {
        self.pulled
            .iter()
            .map(|(language, _)| language.clone())
            .collect()
    }

    /// The aggregate result: one error listing every failed language.
    pub fn into_result(self) -> Result<Vec<Utf8PathBuf>, SyncError> {
        let total = self.pulled.len() + self.failures.len();
        if self.failures.is_empty() {
            Ok(self.pulled.into_iter().map(|(_, path)| path).collect())
        } else {
            Err(SyncError::Partial {
                total,
                failures: self.failures,
            })
        }
    }
}

/// Downloads every language concurrently into
/// `<dir>/<folder>/<project>/<extension>.xlf`.
///
/// A failing language never cancels the others. The outcome is only
/// returned once every download finished.
pub async fn pull(
    service: Arc<dyn TranslationService>,
    remote: &RemoteConfig,
    languages: &[LanguageTarget],
    dir: &Utf8Path,
) -> PullOutcome {
    let mut pulls = JoinSet::new();
    let mut spawned = HashMap::new();

    for language in languages {
        let service = service.clone();
        let language = language.clone();
        let project = remote.project.clone();
        let resource = remote.extension.clone();
        let path = exchange_path(&dir.join(&language.folder_name), remote);

        let handle = pulls.spawn({
            let language = language.clone();
            async move {
                let xml = service.pull(&project, &resource, &language).await?;
                ExchangeUnit::parse(&xml)?;
                write(&path, xml.as_bytes()).await?;
                Ok::<_, SyncError>(path)
            }
        });
        spawned.insert(handle.id(), language);
    }

    let mut outcome = PullOutcome::default();
    while let Some(result) = pulls.join_next_with_id().await {
        let (id, result) = match result {
            Ok((id, result)) => (id, result),
            Err(e) => (e.id(), Err(SyncError::Join(e))),
        };
        let Some(language) = spawned.remove(&id) else {
            continue;
        };

        match result {
            Ok(path) => {
                tracing::info!("pulled {} into {path}", language.id);
                outcome.pulled.push((language, path));
            }
            Err(error) => {
                tracing::error!("couldn't pull {}: {error}", language.id);
                outcome.failures.push(LanguageFailure {
                    language: language.id,
                    error,
                });
            }
        }
    }

    // completion order is arbitrary
    let position = |id: &str| languages.iter().position(|language| language.id == id);
    outcome
        .pulled
        .sort_by_key(|(language, _)| position(&language.id));
    outcome
        .failures
        .sort_by_key(|failure| position(&failure.language));
    outcome
}

/// Converts pulled exchange units into resource files, one
/// `<translations>/<folder>/<original>.i18n.json` per XLF `<file>`.
/// Languages are imported concurrently; a language without pulled files is
/// skipped.
pub async fn import(
    root: &Utf8Path,
    translations_dir: &Utf8Path,
    localization_dir: &Utf8Path,
    languages: &[LanguageTarget],
) -> Result<Vec<Utf8PathBuf>, SyncError> {
    let mut imports = JoinSet::new();

    for language in languages {
        let source = localization_dir.join(&language.folder_name);
        let target = root.join(translations_dir).join(&language.folder_name);
        imports.spawn(import_language(source, target));
    }

    let mut written = Vec::new();
    while let Some(result) = imports.join_next().await {
        written.extend(result??);
    }

    written.sort();
    tracing::info!("imported {} resource file(s)", written.len());
    Ok(written)
}

async fn import_language(
    source: Utf8PathBuf,
    target: Utf8PathBuf,
) -> Result<Vec<Utf8PathBuf>, SyncError> {
    if !source.is_dir() {
        tracing::debug!("nothing pulled into {source}");
        return Ok(Vec::new());
    }

    let pattern = source.join("**").join("*.xlf").into_string();
    let files = tokio::task::spawn_blocking(move || -> Result<Vec<Utf8PathBuf>, SyncError> {
        let mut files = Vec::new();
        for entry in glob::glob(&pattern)? {
            files.push(Utf8PathBuf::try_from(entry?)?);
        }
        files.sort();
        Ok(files)
    })
    .await??;

    let mut written = Vec::new();
    for file in files {
        let text = tokio::fs::read_to_string(&file)
            .await
            .map_err(|source| SyncError::Io {
                path: file.clone(),
                source,
            })?;

        let unit = ExchangeUnit::parse(&text)?;
        let paths = unit
            .files
            .iter()
            .map(|xlf| resource_path(&target, &xlf.original))
            .collect::<Result<Vec<_>, _>>()?;

        for (xlf, path) in unit.files.iter().zip(paths) {
            let map: serde_json::Map<String, serde_json::Value> = xlf
                .units
                .iter()
                .map(|unit| (unit.id.clone(), unit.value().into()))
                .collect();

            let contents = crate::nls::to_json(&path, &map)?;
            write(&path, contents.as_bytes()).await?;
            written.push(path);
        }
    }

    Ok(written)
}

/// `<dir>/<original>.i18n.json`, as long as `original` stays inside `dir`.
fn resource_path(dir: &Utf8Path, original: &str) -> Result<Utf8PathBuf, XlfError> {
    let relative = Utf8Path::new(original);
    let inside = relative
        .components()
        .all(|component| matches!(component, Utf8Component::Normal(_)));

    if original.is_empty() || !inside {
        return Err(XlfError::UnsafeOriginal {
            original: original.to_string(),
        });
    }
    Ok(dir.join(format!("{original}.i18n.json")))
}

/// Everything `sync` needs to know about the workspace.
pub struct SyncTarget<'a> {
    pub root: &'a Utf8Path,
    pub translations_dir: &'a Utf8Path,
    pub localization_dir: &'a Utf8Path,
    pub languages: &'a [LanguageTarget],
    pub policy: PartialPull,
}

/// Pull followed by import.
///
/// When some languages failed, `PartialPull::Abort` imports nothing, while
/// `PartialPull::ImportSucceeded` imports the rest. Either way the failures
/// are reported.
pub async fn sync(
    service: Arc<dyn TranslationService>,
    remote: &RemoteConfig,
    target: SyncTarget<'_>,
) -> Result<Vec<Utf8PathBuf>, SyncError> {
    let outcome = pull(service, remote, target.languages, target.localization_dir)
        .await;

    if outcome.failures.is_empty() {
        return import(
            target.root,
            target.translations_dir,
            target.localization_dir,
            target.languages,
        )
        .await;
    }

    if target.policy == PartialPull::ImportSucceeded {
        let succeeded = outcome.succeeded();
        import(
            target.root,
            target.translations_dir,
            target.localization_dir,
            &succeeded,
        )
        .await?;
    } else {
        tracing::warn!("import skipped, some languages failed to pull");
    }

    outcome.into_result()
}

fn exchange_path(dir: &Utf8Path, remote: &RemoteConfig) -> Utf8PathBuf {
    dir.join(&remote.project)
        .join(format!("{}.xlf", remote.extension))
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Utf8Path) -> Result<T, SyncError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SyncError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    serde_json::from_str(&text).map_err(|source| {
        SyncError::Bundling(BundlingError::Resource {
            path: path.to_path_buf(),
            source,
        })
    })
}

async fn write(path: &Utf8Path, contents: &[u8]) -> Result<(), SyncError> {
    let io = |source| SyncError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io)?;
    }
    tokio::fs::write(path, contents).await.map_err(io)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashSet;
    use std::fs;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::core::BoxFuture;
    use crate::nls::{FileMetadata, LocalizeKey};

    /// Keeps pushed resources in memory and serves them back untranslated.
    #[derive(Default)]
    pub(crate) struct MemoryService {
        pub pushed: Mutex<HashMap<String, String>>,
        /// Translated exchange files by remote language id.
        pub translated: HashMap<String, String>,
        /// Remote language ids whose pull fails.
        pub failing: HashSet<String>,
    }

    impl TranslationService for MemoryService {
        fn push<'a>(
            &'a self,
            project: &'a str,
            resource: &'a str,
            xlf: String,
        ) -> BoxFuture<'a, Result<(), SyncError>> {
            Box::pin(async move {
                let mut pushed = self.pushed.lock().unwrap();
                pushed.insert(format!("{project}/{resource}"), xlf);
                Ok(())
            })
        }

        fn pull<'a>(
            &'a self,
            project: &'a str,
            resource: &'a str,
            language: &'a LanguageTarget,
        ) -> BoxFuture<'a, Result<String, SyncError>> {
            Box::pin(async move {
                // let the other pulls run first
                tokio::task::yield_now().await;

                if self.failing.contains(language.remote_id()) {
                    return Err(SyncError::Status {
                        url: format!("memory://{project}/{resource}/{}", language.remote_id()),
                        status: 502,
                    });
                }
                if let Some(xml) = self.translated.get(language.remote_id()) {
                    return Ok(xml.clone());
                }
                let pushed = self.pushed.lock().unwrap();
                pushed
                    .get(&format!("{project}/{resource}"))
                    .cloned()
                    .ok_or(SyncError::Status {
                        url: format!("memory://{project}/{resource}"),
                        status: 404,
                    })
            })
        }
    }

    fn remote() -> RemoteConfig {
        RemoteConfig {
            extension: "tool".into(),
            ..RemoteConfig::default()
        }
    }

    fn workspace() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().join("tool")).unwrap();
        fs::create_dir_all(root.join("out")).unwrap();

        fs::write(
            root.join("package.nls.json"),
            r#"{ "launch": { "message": "Launch", "comment": ["Command title"] } }"#,
        )
        .unwrap();

        let mut bundle = MetadataBundle::new();
        bundle.insert(
            "extension".into(),
            FileMetadata {
                messages: vec!["Hello".into()],
                keys: vec![LocalizeKey::Plain("greeting".into())],
            },
        );
        let (header, metadata) =
            crate::nls::metadata::metadata_files("acme.tool", Utf8Path::new("out"), &bundle)
                .unwrap();
        fs::write(root.join(header.path), header.contents).unwrap();
        fs::write(root.join(metadata.path), metadata.contents).unwrap();

        (dir, root)
    }

    fn languages() -> Vec<LanguageTarget> {
        vec![
            LanguageTarget::new("fr", "fra"),
            LanguageTarget::new("de", "deu"),
            LanguageTarget::new("zh-tw", "cht").with_remote("zh-hant"),
        ]
    }

    #[tokio::test]
    async fn push_test_writes_next_to_the_workspace() {
        let (_dir, root) = workspace();
        let unit = exchange_unit(
            &root,
            Utf8Path::new("package.nls.json"),
            Utf8Path::new("out"),
        )
        .await
        .unwrap();

        let path = push_test(&root.join("../tool-push-test"), &remote(), &unit)
            .await
            .unwrap();
        assert_eq!(
            path,
            root.join("../tool-push-test/vscode-extensions/tool.xlf")
        );

        let written = ExchangeUnit::parse(&fs::read_to_string(&path).unwrap()).unwrap();
        let originals: Vec<&str> = written.files.iter().map(|f| f.original.as_str()).collect();
        assert_eq!(originals, vec!["package", "out/extension"]);
    }

    #[tokio::test]
    async fn untranslated_round_trip_reproduces_defaults() {
        let (_dir, root) = workspace();
        let service = Arc::new(MemoryService::default());
        let localization = root.join("../tool-localization");
        let languages = vec![LanguageTarget::new("fr", "fra")];

        let unit = exchange_unit(
            &root,
            Utf8Path::new("package.nls.json"),
            Utf8Path::new("out"),
        )
        .await
        .unwrap();
        push(service.as_ref(), &remote(), &unit).await.unwrap();

        let pulled = pull(service, &remote(), &languages, &localization)
            .await
            .into_result()
            .unwrap();
        assert_eq!(
            pulled,
            vec![localization.join("fra/vscode-extensions/tool.xlf")]
        );

        let written = import(
            &root,
            Utf8Path::new("translations"),
            &localization,
            &languages,
        )
        .await
        .unwrap();
        assert_eq!(
            written,
            vec![
                root.join("translations/fra/out/extension.i18n.json"),
                root.join("translations/fra/package.i18n.json"),
            ]
        );

        let extension =
            fs::read_to_string(root.join("translations/fra/out/extension.i18n.json")).unwrap();
        assert_eq!(extension, "{\n  \"greeting\": \"Hello\"\n}");
        let package = fs::read_to_string(root.join("translations/fra/package.i18n.json")).unwrap();
        assert_eq!(package, "{\n  \"launch\": \"Launch\"\n}");
    }

    #[tokio::test]
    async fn one_failing_language_does_not_stop_the_others() {
        let (_dir, root) = workspace();
        let mut service = MemoryService {
            failing: HashSet::from(["de".to_string()]),
            ..MemoryService::default()
        };
        service.pushed.get_mut().unwrap().insert(
            "vscode-extensions/tool".into(),
            ExchangeUnit::default().to_xml().unwrap(),
        );
        let localization = root.join("../tool-localization");

        let outcome = pull(Arc::new(service), &remote(), &languages(), &localization)
            .await;

        assert_eq!(
            outcome.succeeded(),
            vec![languages()[0].clone(), languages()[2].clone()]
        );
        for folder in ["fra", "cht"] {
            let exchange = localization.join(folder).join("vscode-extensions/tool.xlf");
            assert!(exchange.is_file());
        }
        assert!(!localization.join("deu").exists());

        let error = outcome.into_result().unwrap_err();
        let SyncError::Partial { total, failures } = &error else {
            panic!("unexpected {error:?}");
        };
        assert_eq!(*total, 3);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].language, "de");
    }

    fn translated(target: &str) -> String {
        translated_file(target, "out/extension")
    }

    fn translated_file(target: &str, original: &str) -> String {
        let mut unit = ExchangeUnit {
            files: vec![XlfFile::new(original)],
        };
        unit.files[0].target_language = Some(target.into());
        unit.files[0].units.push(TransUnit {
            id: "greeting".into(),
            source: "Hello".into(),
            target: Some("Bonjour".into()),
            notes: vec![],
        });
        unit.to_xml().unwrap()
    }

    #[tokio::test]
    async fn sync_policy_decides_partial_imports() {
        let policies = [
            (PartialPull::Abort, false),
            (PartialPull::ImportSucceeded, true),
        ];
        for (policy, imported) in policies {
            let (_dir, root) = workspace();
            let service = MemoryService {
                translated: HashMap::from([("fr".to_string(), translated("fr"))]),
                failing: HashSet::from(["de".to_string()]),
                ..MemoryService::default()
            };
            let localization = root.join("../tool-localization");
            let languages = vec![
                LanguageTarget::new("fr", "fra"),
                LanguageTarget::new("de", "deu"),
            ];

            let target = SyncTarget {
                root: &root,
                translations_dir: Utf8Path::new("translations"),
                localization_dir: &localization,
                languages: &languages,
                policy,
            };
            let result = sync(Arc::new(service), &remote(), target).await;

            assert!(matches!(result, Err(SyncError::Partial { total: 2, .. })));
            let path = root.join("translations/fra/out/extension.i18n.json");
            assert_eq!(path.is_file(), imported, "{policy:?}");
            if imported {
                assert_eq!(
                    fs::read_to_string(path).unwrap(),
                    "{\n  \"greeting\": \"Bonjour\"\n}"
                );
            }
        }
    }

    #[test]
    fn resource_paths_stay_inside_the_folder() {
        let dir = Utf8Path::new("/work/translations/fra");
        assert_eq!(
            resource_path(dir, "out/extension").unwrap(),
            dir.join("out/extension.i18n.json")
        );

        for original in [
            "/tmp/escaped",
            "../escaped",
            "out/../../escaped",
            "./package",
            "",
        ] {
            let result = resource_path(dir, original);
            assert!(
                matches!(result, Err(XlfError::UnsafeOriginal { .. })),
                "{original:?}"
            );
        }
    }

    #[tokio::test]
    async fn import_rejects_files_outside_the_folder() {
        let (dir, root) = workspace();
        let localization = root.join("../tool-localization");
        let escaped = Utf8PathBuf::try_from(dir.path().join("escaped")).unwrap();
        let pulled = localization.join("fra/vscode-extensions/tool.xlf");
        fs::create_dir_all(pulled.parent().unwrap()).unwrap();

        for original in [escaped.as_str(), "../../escaped"] {
            fs::write(&pulled, translated_file("fr", original)).unwrap();

            let languages = vec![LanguageTarget::new("fr", "fra")];
            let result = import(
                &root,
                Utf8Path::new("translations"),
                &localization,
                &languages,
            )
            .await;

            assert!(
                matches!(result, Err(SyncError::Xlf(XlfError::UnsafeOriginal { .. }))),
                "{original}"
            );
            assert!(!dir.path().join("escaped.i18n.json").exists());
            assert!(!root.join("translations").exists());
        }
    }
}
