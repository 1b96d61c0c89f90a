//! Statically configured translation targets.

use serde::{Deserialize, Serialize};

/// One language the extension ships resources for.
///
/// The same tuple drives both bundling (which folder under the metadata root
/// receives generated resources) and remote synchronization (which remote
/// locale maps onto which local folder).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageTarget {
    /// Locale identifier, e.g. `zh-tw`.
    pub id: String,
    /// Resource folder name, e.g. `cht`.
    pub folder_name: String,
    /// Locale identifier used by the translation service, when it differs
    /// from `id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transifex_id: Option<String>,
}

impl LanguageTarget {
    pub fn new(id: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            folder_name: folder_name.into(),
            transifex_id: None,
        }
    }

    pub fn with_remote(mut self, transifex_id: impl Into<String>) -> Self {
        self.transifex_id = Some(transifex_id.into());
        self
    }

    /// Locale identifier to use when talking to the translation service.
    pub fn remote_id(&self) -> &str {
        self.transifex_id.as_deref().unwrap_or(&self.id)
    }
}

/// The languages every extension build targets unless configured otherwise.
pub fn default_languages() -> Vec<LanguageTarget> {
    vec![
        LanguageTarget::new("zh-tw", "cht").with_remote("zh-hant"),
        LanguageTarget::new("zh-cn", "chs").with_remote("zh-hans"),
        LanguageTarget::new("ja", "jpn"),
        LanguageTarget::new("ko", "kor"),
        LanguageTarget::new("de", "deu"),
        LanguageTarget::new("fr", "fra"),
        LanguageTarget::new("es", "esn"),
        LanguageTarget::new("ru", "rus"),
        LanguageTarget::new("it", "ita"),
        LanguageTarget::new("cs", "csy"),
        LanguageTarget::new("tr", "trk"),
        LanguageTarget::new("pt-br", "ptb").with_remote("pt_BR"),
        LanguageTarget::new("pl", "plk"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_id_falls_back_to_locale() {
        let languages = default_languages();
        let cht = languages.iter().find(|l| l.folder_name == "cht").unwrap();
        let deu = languages.iter().find(|l| l.folder_name == "deu").unwrap();

        assert_eq!(cht.remote_id(), "zh-hant");
        assert_eq!(deu.remote_id(), "de");
    }

    #[test]
    fn deserializes_camel_case() {
        let json = r#"{ "id": "pt-br", "folderName": "ptb", "transifexId": "pt_BR" }"#;
        let target: LanguageTarget = serde_json::from_str(json).unwrap();
        assert_eq!(
            target,
            LanguageTarget::new("pt-br", "ptb").with_remote("pt_BR")
        );
    }
}
