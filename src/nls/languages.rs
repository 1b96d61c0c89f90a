//! Stage 2 and `add-i18n`: per-language resource files.
//!
//! Imported translations live at `<translations>/<folder>/<module>.i18n.json`,
//! where the module is `out/<unit module>` for compiled units and `package`
//! for the extension manifest strings. Stage 2 writes the same layout below
//! `<i18n>`, which is output only. Generated files carry every key of the
//! default-language metadata; untranslated keys get the default string.
//! Translated keys that no longer exist are dropped with a warning.

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use super::{
    Artifact, FileMetadata, LocalizeKey, LocalizeOptions, LocalizedResourceBundle, ResourceFile,
    Stage,
};
use crate::error::BundlingError;
use crate::language::LanguageTarget;

const SUFFIX: &str = ".i18n.json";

/// Translated strings on disk, by language folder and module.
#[derive(Debug, Clone, Default)]
pub struct Translations {
    folders: HashMap<String, HashMap<String, HashMap<String, String>>>,
}

impl Translations {
    /// Reads every `*.i18n.json` below `<root>/<dir>/<folder>` for the given
    /// languages. Missing folders are fine.
    ///
    /// `dir` is the imported translation tree, never the tree stage 2 writes
    /// its generated files into.
    pub async fn load(
        root: &Utf8Path,
        dir: &Utf8Path,
        languages: &[LanguageTarget],
    ) -> Result<Self, BundlingError> {
        let folders: Vec<(String, Utf8PathBuf)> = languages
            .iter()
            .map(|language| {
                let folder = language.folder_name.clone();
                let path = root.join(dir).join(&folder);
                (folder, path)
            })
            .collect();

        let found = tokio::task::spawn_blocking(move || find_resources(folders))
            .await??;

        let mut translations = Self::default();
        for (folder, module, path) in found {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| BundlingError::Read {
                    path: path.clone(),
                    source,
                })?;

            let strings = parse_resource(&path, &text)?;
            translations.insert(&folder, module, strings);
        }

        Ok(translations)
    }

    pub fn insert(
        &mut self,
        folder: &str,
        module: impl Into<String>,
        strings: HashMap<String, String>,
    ) {
        self.folders
            .entry(folder.to_string())
            .or_default()
            .insert(module.into(), strings);
    }

    pub fn get(&self, folder: &str, module: &str) -> Option<&HashMap<String, String>> {
        self.folders.get(folder)?.get(module)
    }
}

/// `(folder, module, path)` of every resource file below each folder.
fn find_resources(
    folders: Vec<(String, Utf8PathBuf)>,
) -> Result<Vec<(String, String, Utf8PathBuf)>, BundlingError> {
    let mut found = Vec::new();
    for (folder, dir) in folders {
        if !dir.is_dir() {
            continue;
        }

        let pattern = dir.join("**").join(format!("*{SUFFIX}"));
        for entry in glob::glob(pattern.as_str())? {
            let path = Utf8PathBuf::try_from(entry?)?;
            let Ok(relative) = path.strip_prefix(&dir) else {
                continue;
            };
            let module = relative.as_str().trim_end_matches(SUFFIX).to_string();
            found.push((folder.clone(), module, path));
        }
    }
    Ok(found)
}

fn parse_resource(path: &Utf8Path, text: &str) -> Result<HashMap<String, String>, BundlingError> {
    let value: Value = serde_json::from_str(text).map_err(|source| BundlingError::Resource {
        path: path.to_path_buf(),
        source,
    })?;

    let Value::Object(map) = value else {
        return Err(BundlingError::ResourceShape {
            path: path.to_path_buf(),
            reason: "expected an object".into(),
        });
    };

    let mut strings = HashMap::with_capacity(map.len());
    for (key, value) in map {
        match value {
            Value::String(value) => {
                strings.insert(key, value);
            }
            // header comment of exported resource files
            _ if key.is_empty() => {}
            _ => {
                return Err(BundlingError::ResourceShape {
                    path: path.to_path_buf(),
                    reason: format!("value of '{key}' is not a string"),
                });
            }
        }
    }

    Ok(strings)
}

/// Pairs every default entry with its translation, or the default itself.
pub(crate) fn localize_entries<'a>(
    entries: impl Iterator<Item = (&'a str, &'a str)>,
    translated: Option<&HashMap<String, String>>,
    context: &str,
) -> Vec<(String, String)> {
    let entries: Vec<(String, String)> = entries
        .map(|(key, default)| {
            let value = translated
                .and_then(|strings| strings.get(key))
                .map_or(default, String::as_str);
            (key.to_string(), value.to_string())
        })
        .collect();

    if let Some(strings) = translated {
        let mut stale: Vec<&str> = strings
            .keys()
            .filter(|key| !entries.iter().any(|(k, _)| k == *key))
            .map(String::as_str)
            .collect();
        stale.sort_unstable();

        for key in stale {
            tracing::warn!("dropping stale translation '{key}' in {context}");
        }
    }

    entries
}

pub struct CreateLanguageFiles {
    languages: Vec<LanguageTarget>,
    i18n_dir: Utf8PathBuf,
    out_dir: Utf8PathBuf,
    translations: Translations,
}

impl CreateLanguageFiles {
    pub fn new(options: &LocalizeOptions) -> Self {
        Self {
            languages: options.languages.clone(),
            i18n_dir: options.i18n_dir.clone(),
            out_dir: options.out_dir.clone(),
            translations: options.translations.clone(),
        }
    }
}

impl Stage for CreateLanguageFiles {
    fn transform(&mut self, artifact: Artifact) -> Result<Vec<Artifact>, BundlingError> {
        let Artifact::Unit(unit) = &artifact else {
            return Ok(vec![artifact]);
        };
        let Some(nls) = &unit.nls else {
            return Ok(vec![artifact]);
        };

        let module = unit.module();
        let resource = self.out_dir.join(&module).into_string();

        let mut output = Vec::with_capacity(self.languages.len() + 1);
        for language in &self.languages {
            let path = self
                .i18n_dir
                .join(&language.folder_name)
                .join(format!("{resource}{SUFFIX}"));

            let translated = self.translations.get(&language.folder_name, &resource);
            let entries = localize_entries(nls.entries(), translated, path.as_str());

            output.push(Artifact::Localized(LocalizedResourceBundle {
                language: language.clone(),
                module: module.clone(),
                path,
                entries,
            }));
        }

        output.insert(0, artifact);
        Ok(output)
    }
}

/// Reads the manifest strings, `{ "key": "message" }` or `{ "key": {
/// "message": "...", "comment": [...] } }`, in file order.
pub async fn read_package_nls(path: &Utf8Path) -> Result<FileMetadata, BundlingError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|source| BundlingError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value = serde_json::from_str(&text).map_err(|source| BundlingError::Resource {
        path: path.to_path_buf(),
        source,
    })?;

    let shape = |reason: String| BundlingError::ResourceShape {
        path: path.to_path_buf(),
        reason,
    };

    let Value::Object(map) = value else {
        return Err(shape("expected an object".into()));
    };

    let mut metadata = FileMetadata::default();
    for (key, value) in map {
        match value {
            Value::String(message) => {
                metadata.keys.push(LocalizeKey::Plain(key));
                metadata.messages.push(message);
            }
            Value::Object(mut entry) => {
                let Some(Value::String(message)) = entry.remove("message") else {
                    return Err(shape(format!("'{key}' has no message")));
                };
                let comment: Vec<String> = match entry.remove("comment") {
                    Some(Value::Array(lines)) => lines
                        .into_iter()
                        .filter_map(|line| line.as_str().map(str::to_string))
                        .collect(),
                    Some(Value::String(line)) => vec![line],
                    _ => Vec::new(),
                };
                metadata.keys.push(LocalizeKey::Commented { key, comment });
                metadata.messages.push(message);
            }
            _ => return Err(shape(format!("value of '{key}' is not a string"))),
        }
    }

    Ok(metadata)
}

/// `add-i18n`: one `package.nls.<locale>.json` per language, next to the
/// default manifest strings. Paths are relative to the workspace root.
pub async fn package_language_files(
    root: &Utf8Path,
    package_nls: &Utf8Path,
    languages: &[LanguageTarget],
    translations: &Translations,
) -> Result<Vec<ResourceFile>, BundlingError> {
    let metadata = read_package_nls(&root.join(package_nls)).await?;
    let parent = package_nls.parent().unwrap_or(Utf8Path::new(""));
    let stem = package_nls
        .file_name()
        .unwrap_or("package.nls.json")
        .trim_end_matches(".json");

    languages
        .iter()
        .map(|language| {
            let path = parent.join(format!("{stem}.{}.json", language.id));
            let translated = translations.get(&language.folder_name, "package");
            let entries = localize_entries(metadata.entries(), translated, path.as_str());

            let map: serde_json::Map<String, Value> = entries
                .into_iter()
                .map(|(key, value)| (key, Value::String(value)))
                .collect();

            let contents = super::to_json(&path, &map)?;
            Ok(ResourceFile { path, contents })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::compiler::CompiledUnit;

    fn strings(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn unit() -> CompiledUnit {
        let mut unit = CompiledUnit::new("extension.js", "localize(0, null); localize(1, null);");
        unit.nls = Some(FileMetadata {
            messages: vec!["Hello".into(), "Bye".into()],
            keys: vec![
                LocalizeKey::Plain("hello".into()),
                LocalizeKey::Plain("bye".into()),
            ],
        });
        unit
    }

    #[test]
    fn every_key_falls_back_to_the_default() {
        let mut translations = Translations::default();
        translations.insert(
            "fra",
            "out/extension",
            strings(&[("hello", "Bonjour"), ("removed", "Supprimé")]),
        );

        let mut options = crate::nls::tests::options(vec![
            LanguageTarget::new("fr", "fra"),
            LanguageTarget::new("de", "deu"),
        ]);
        options.translations = translations;

        let mut stage = CreateLanguageFiles::new(&options);
        let output = stage.transform(Artifact::Unit(unit())).unwrap();

        assert_eq!(output.len(), 3);
        assert_eq!(output[0], Artifact::Unit(unit()));

        let Artifact::Localized(fra) = &output[1] else { panic!() };
        assert_eq!(fra.path, "i18n/fra/out/extension.i18n.json");
        assert_eq!(
            fra.entries,
            vec![
                ("hello".to_string(), "Bonjour".to_string()),
                ("bye".to_string(), "Bye".to_string())
            ]
        );

        let Artifact::Localized(deu) = &output[2] else { panic!() };
        assert_eq!(deu.path, "i18n/deu/out/extension.i18n.json");
        assert_eq!(
            deu.entries,
            vec![
                ("hello".to_string(), "Hello".to_string()),
                ("bye".to_string(), "Bye".to_string())
            ]
        );
        assert_eq!(
            deu.to_json().unwrap(),
            "{\n  \"hello\": \"Hello\",\n  \"bye\": \"Bye\"\n}"
        );
    }

    #[tokio::test]
    async fn loads_translations_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs::create_dir_all(root.join("translations/fra/out/sub")).unwrap();
        fs::write(
            root.join("translations/fra/out/sub/a.i18n.json"),
            r#"{ "": ["header"], "k": "v" }"#,
        )
        .unwrap();
        fs::write(
            root.join("translations/fra/package.i18n.json"),
            r#"{ "title": "Titre" }"#,
        )
        .unwrap();

        let languages = [
            LanguageTarget::new("fr", "fra"),
            LanguageTarget::new("de", "deu"),
        ];
        let translations = Translations::load(root, Utf8Path::new("translations"), &languages)
            .await
            .unwrap();

        assert_eq!(
            translations.get("fra", "out/sub/a"),
            Some(&strings(&[("k", "v")]))
        );
        assert_eq!(
            translations.get("fra", "package"),
            Some(&strings(&[("title", "Titre")]))
        );
        assert_eq!(translations.get("deu", "package"), None);
    }

    #[tokio::test]
    async fn malformed_resource() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs::create_dir_all(root.join("translations/fra")).unwrap();
        fs::write(
            root.join("translations/fra/package.i18n.json"),
            r#"{ "k": 1 }"#,
        )
        .unwrap();

        let languages = [LanguageTarget::new("fr", "fra")];
        let result = Translations::load(root, Utf8Path::new("translations"), &languages)
            .await;
        assert!(matches!(result, Err(BundlingError::ResourceShape { .. })));
    }

    #[tokio::test]
    async fn add_i18n_writes_manifest_strings() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(
            root.join("package.nls.json"),
            r#"{
                "title": "Debugger",
                "launch": { "message": "Launch", "comment": ["verb"] }
            }"#,
        )
        .unwrap();

        let mut translations = Translations::default();
        translations.insert("deu", "package", strings(&[("title", "Debugger (de)")]));

        let files = package_language_files(
            root,
            Utf8Path::new("package.nls.json"),
            &[
                LanguageTarget::new("de", "deu"),
                LanguageTarget::new("pt-br", "ptb"),
            ],
            &translations,
        )
        .await
        .unwrap();

        assert_eq!(files[0].path, "package.nls.de.json");
        assert_eq!(
            files[0].contents,
            "{\n  \"title\": \"Debugger (de)\",\n  \"launch\": \"Launch\"\n}"
        );
        assert_eq!(files[1].path, "package.nls.pt-br.json");
        assert!(files[1].contents.contains("\"title\": \"Debugger\""));
    }

    #[tokio::test]
    async fn package_metadata_keeps_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("package.nls.json")).unwrap();
        fs::write(
            &path,
            r#"{ "a": "A", "b": { "message": "B", "comment": "note" } }"#,
        )
        .unwrap();

        let metadata = read_package_nls(&path).await.unwrap();
        assert_eq!(metadata.messages, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(metadata.keys[1].comment(), ["note".to_string()]);
    }
}
