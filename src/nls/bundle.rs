//! Stage 4: merges per-unit resources into one bundle per language,
//! `nls.bundle.json` for the defaults and `nls.bundle.<locale>.json` for
//! every configured language. Each bundle maps unit modules to their message
//! arrays, in key order.

use std::collections::{BTreeMap, HashMap};

use camino::Utf8PathBuf;

use super::{Artifact, ResourceFile, Stage};
use crate::error::BundlingError;
use crate::language::LanguageTarget;

type Bundle = BTreeMap<String, Vec<String>>;

pub struct BundleLanguageFiles {
    languages: Vec<LanguageTarget>,
    out_dir: Utf8PathBuf,
    defaults: Bundle,
    localized: HashMap<String, Bundle>,
}

impl BundleLanguageFiles {
    pub fn new(languages: &[LanguageTarget], out_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            languages: languages.to_vec(),
            out_dir: out_dir.into(),
            defaults: Bundle::new(),
            localized: HashMap::new(),
        }
    }

    fn render(&self, name: &str, bundle: &Bundle) -> Result<Artifact, BundlingError> {
        let path = self.out_dir.join(name);
        let contents = super::to_json(&path, bundle)?;
        Ok(Artifact::Resource(ResourceFile { path, contents }))
    }
}

impl Stage for BundleLanguageFiles {
    fn transform(&mut self, artifact: Artifact) -> Result<Vec<Artifact>, BundlingError> {
        match &artifact {
            Artifact::Unit(unit) => {
                if let Some(nls) = &unit.nls {
                    self.defaults.insert(unit.module(), nls.messages.clone());
                }
            }
            Artifact::Localized(resource) => {
                let values = resource
                    .entries
                    .iter()
                    .map(|(_, value)| value.clone())
                    .collect();
                self.localized
                    .entry(resource.language.id.clone())
                    .or_default()
                    .insert(resource.module.clone(), values);
            }
            Artifact::Resource(_) => {}
        }
        Ok(vec![artifact])
    }

    fn flush(&mut self) -> Result<Vec<Artifact>, BundlingError> {
        let mut output = Vec::with_capacity(self.languages.len() + 1);
        output.push(self.render("nls.bundle.json", &self.defaults)?);

        let empty = Bundle::new();
        for language in &self.languages {
            let bundle = self.localized.get(&language.id).unwrap_or(&empty);
            output.push(self.render(&format!("nls.bundle.{}.json", language.id), bundle)?);
        }

        Ok(output)
    }
}
