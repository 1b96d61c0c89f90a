//! Localization bundler.
//!
//! The bundler post-processes compiled units. It is selected once per build
//! as a [`Localization`] strategy: `PassThrough` leaves the stream untouched,
//! `FullLocalize` runs four stages in order over every artifact:
//!
//! 1. [`rewrite`] replaces `localize('key', 'message')` calls with index
//!    lookups and records the extracted strings on the unit,
//! 2. [`languages`] emits one resource file per unit and language,
//!    translated where a translation exists and the default otherwise,
//! 3. [`metadata`] aggregates the extracted strings into the metadata index
//!    and header,
//! 4. [`bundle`] merges the per-unit resources into one bundle per language.
//!
//! Stages are plain synchronous transforms over [`Artifact`]s, so every stage
//! can be tested with in-memory units. Artifacts a stage doesn't care about
//! pass through it unchanged and in order.

pub mod bundle;
pub mod languages;
pub mod metadata;
pub mod rewrite;
mod scanner;

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::compiler::CompiledUnit;
use crate::error::BundlingError;
use crate::language::LanguageTarget;

pub use languages::Translations;

/// Extraction key of a single `localize` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizeKey {
    Plain(String),
    Commented { key: String, comment: Vec<String> },
}

impl LocalizeKey {
    pub fn key(&self) -> &str {
        match self {
            LocalizeKey::Plain(key) => key,
            LocalizeKey::Commented { key, .. } => key,
        }
    }

    pub fn comment(&self) -> &[String] {
        match self {
            LocalizeKey::Plain(_) => &[],
            LocalizeKey::Commented { comment, .. } => comment,
        }
    }
}

/// Strings extracted from one unit, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub messages: Vec<String>,
    pub keys: Vec<LocalizeKey>,
}

impl FileMetadata {
    /// `(key, default message)` pairs in source order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.keys
            .iter()
            .map(LocalizeKey::key)
            .zip(self.messages.iter().map(String::as_str))
    }
}

/// Extracted strings of a whole build, keyed by unit module path (relative
/// to the output root, without extension).
pub type MetadataBundle = BTreeMap<String, FileMetadata>;

/// Resource strings of one unit in one language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedResourceBundle {
    pub language: LanguageTarget,
    /// Module path of the unit, relative to the output root.
    pub module: String,
    /// Destination, relative to the workspace root.
    pub path: Utf8PathBuf,
    /// `(key, value)` in source order.
    pub entries: Vec<(String, String)>,
}

impl LocalizedResourceBundle {
    pub fn to_json(&self) -> Result<String, BundlingError> {
        let map: serde_json::Map<String, serde_json::Value> = self
            .entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone().into()))
            .collect();

        to_json(&self.path, &map)
    }
}

/// An auxiliary file produced by the bundler, relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFile {
    pub path: Utf8PathBuf,
    pub contents: String,
}

/// Everything flowing through the bundler.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    Unit(CompiledUnit),
    Localized(LocalizedResourceBundle),
    Resource(ResourceFile),
}

/// One transform of the bundler.
pub trait Stage: Send {
    /// Handles a single artifact, returning what continues downstream.
    fn transform(&mut self, artifact: Artifact) -> Result<Vec<Artifact>, BundlingError>;

    /// Called once after the last artifact.
    fn flush(&mut self) -> Result<Vec<Artifact>, BundlingError> {
        Ok(Vec::new())
    }
}

/// An ordered chain of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn push(&mut self, artifact: Artifact) -> Result<Vec<Artifact>, BundlingError> {
        Self::feed(&mut self.stages, vec![artifact])
    }

    /// Flushes every stage in order. Whatever a stage flushes still passes
    /// through the stages after it.
    pub fn finish(&mut self) -> Result<Vec<Artifact>, BundlingError> {
        let mut output = Vec::new();
        for i in 0..self.stages.len() {
            let flushed = self.stages[i].flush()?;
            output.extend(Self::feed(&mut self.stages[i + 1..], flushed)?);
        }
        Ok(output)
    }

    fn feed(
        stages: &mut [Box<dyn Stage>],
        input: Vec<Artifact>,
    ) -> Result<Vec<Artifact>, BundlingError> {
        let mut artifacts = input;
        for stage in stages {
            let mut next = Vec::with_capacity(artifacts.len());
            for artifact in artifacts {
                next.extend(stage.transform(artifact)?);
            }
            artifacts = next;
        }
        Ok(artifacts)
    }
}

/// Options of the full localization strategy.
#[derive(Debug, Clone)]
pub struct LocalizeOptions {
    pub bundle_id: String,
    pub languages: Vec<LanguageTarget>,
    /// Root of the per-language resource folders, relative to the workspace.
    pub i18n_dir: Utf8PathBuf,
    /// Output root, relative to the workspace.
    pub out_dir: Utf8PathBuf,
    pub translations: Translations,
}

/// Bundler strategy, chosen once per invocation.
#[derive(Debug, Clone)]
pub enum Localization {
    /// Units pass through untouched.
    PassThrough,
    FullLocalize(LocalizeOptions),
}

impl Localization {
    pub fn pipeline(&self) -> Pipeline {
        match self {
            Localization::PassThrough => Pipeline::default(),
            Localization::FullLocalize(options) => Pipeline::new(vec![
                Box::new(rewrite::RewriteLocalizeCalls::new(&options.out_dir)),
                Box::new(languages::CreateLanguageFiles::new(options)),
                Box::new(metadata::BundleMetadataFiles::new(&options.bundle_id, &options.out_dir)),
                Box::new(bundle::BundleLanguageFiles::new(&options.languages, &options.out_dir)),
            ]),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Localization::FullLocalize(_))
    }
}

pub(crate) fn to_json<T: Serialize + ?Sized>(
    path: &Utf8Path,
    value: &T,
) -> Result<String, BundlingError> {
    serde_json::to_string_pretty(value).map_err(|source| BundlingError::Serialize {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    pub(crate) fn options(languages: Vec<LanguageTarget>) -> LocalizeOptions {
        LocalizeOptions {
            bundle_id: "acme.tool".into(),
            languages,
            i18n_dir: "i18n".into(),
            out_dir: "out".into(),
            translations: Translations::default(),
        }
    }

    fn run(localization: &Localization, units: Vec<CompiledUnit>) -> Vec<Artifact> {
        let mut pipeline = localization.pipeline();
        let mut output = Vec::new();
        for unit in units {
            output.extend(pipeline.push(Artifact::Unit(unit)).unwrap());
        }
        output.extend(pipeline.finish().unwrap());
        output
    }

    fn units(artifacts: &[Artifact]) -> Vec<&CompiledUnit> {
        artifacts
            .iter()
            .filter_map(|artifact| match artifact {
                Artifact::Unit(unit) => Some(unit),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn units_without_strings_are_untouched() {
        let plain = vec![
            CompiledUnit::new(
                "a.js",
                "const nls = require('vscode-nls');\nexport const a = 1;\n",
            ),
            CompiledUnit::new(
                "b.js",
                "// localize('x', 'y')\nconst s = \"localize('q', 'r')\";\n",
            ),
        ];

        let full = Localization::FullLocalize(options(vec![LanguageTarget::new("fr", "fra")]));

        for localization in [Localization::PassThrough, full] {
            let output = run(&localization, plain.clone());
            let output = units(&output);
            assert_eq!(output, plain.iter().collect::<Vec<_>>());
        }
    }

    #[test]
    fn stages_run_in_order() {
        let source = "const localize = nls.loadMessageBundle();\nlocalize('hello', 'Hello');\n";
        let full = Localization::FullLocalize(options(vec![
            LanguageTarget::new("fr", "fra"),
            LanguageTarget::new("de", "deu"),
        ]));

        let output = run(&full, vec![CompiledUnit::new("extension.js", source)]);
        let paths: Vec<String> = output
            .iter()
            .map(|artifact| match artifact {
                Artifact::Unit(unit) => format!("unit {}", unit.path),
                Artifact::Localized(bundle) => format!("localized {}", bundle.path),
                Artifact::Resource(file) => format!("resource {}", file.path),
            })
            .collect();

        assert_eq!(
            paths,
            vec![
                "unit extension.js",
                "localized i18n/fra/out/extension.i18n.json",
                "localized i18n/deu/out/extension.i18n.json",
                "resource out/extension.nls.json",
                "resource out/nls.metadata.header.json",
                "resource out/nls.metadata.json",
                "resource out/nls.bundle.json",
                "resource out/nls.bundle.fr.json",
                "resource out/nls.bundle.de.json",
            ]
        );

        let unit = units(&output)[0];
        assert_eq!(
            unit.contents,
            "const localize = nls.loadMessageBundle(__filename);\nlocalize(0, null);\n"
        );
    }

    #[test]
    fn pass_through_has_no_stages() {
        let source = "localize('hello', 'Hello');";
        let output = run(
            &Localization::PassThrough,
            vec![CompiledUnit::new("a.js", source)],
        );
        assert_eq!(
            output,
            vec![Artifact::Unit(CompiledUnit::new("a.js", source))]
        );
        assert!(!Localization::PassThrough.is_enabled());
    }
}
