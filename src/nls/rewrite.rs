//! Stage 1: replaces `localize('key', 'message')` with `localize(<index>,
//! null)` and `loadMessageBundle()` with `loadMessageBundle(__filename)`.

use std::collections::HashSet;

use camino::Utf8PathBuf;

use super::scanner::{self, Call};
use super::{Artifact, FileMetadata, ResourceFile, Stage};
use crate::compiler::CompiledUnit;
use crate::error::BundlingError;

pub struct RewriteLocalizeCalls {
    out_dir: Utf8PathBuf,
}

impl RewriteLocalizeCalls {
    pub fn new(out_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl Stage for RewriteLocalizeCalls {
    fn transform(&mut self, artifact: Artifact) -> Result<Vec<Artifact>, BundlingError> {
        let Artifact::Unit(unit) = artifact else {
            return Ok(vec![artifact]);
        };

        let unit = rewrite(unit)?;
        let Some(nls) = &unit.nls else {
            return Ok(vec![Artifact::Unit(unit)]);
        };

        let path = self.out_dir.join(format!("{}.nls.json", unit.module()));
        let contents = super::to_json(&path, &nls.messages)?;

        Ok(vec![
            Artifact::Unit(unit),
            Artifact::Resource(ResourceFile { path, contents }),
        ])
    }
}

/// Rewrites one unit. A unit without `localize` calls comes back unchanged,
/// with `nls` left empty.
pub fn rewrite(mut unit: CompiledUnit) -> Result<CompiledUnit, BundlingError> {
    let source = unit.contents.as_str();
    let calls = scanner::find_calls(source, "localize");
    if calls.is_empty() {
        return Ok(unit);
    }

    let mut metadata = FileMetadata::default();
    let mut seen = HashSet::new();
    let mut edits = Vec::new();

    for call in calls {
        let parsed = scanner::parse_localize(source, call)
            .map_err(|reason| malformed(&unit, source, call, reason))?;

        if !seen.insert(parsed.key.key().to_string()) {
            return Err(BundlingError::DuplicateKey {
                file: unit.path.clone(),
                key: parsed.key.key().to_string(),
            });
        }

        // Keep the line count so source maps stay valid.
        let newlines = source[parsed.args.clone()].matches('\n').count();
        let replacement = format!("{}, null{}", metadata.keys.len(), "\n".repeat(newlines));

        edits.push((parsed.args, replacement));
        metadata.keys.push(parsed.key);
        metadata.messages.push(parsed.message);
    }

    for call in scanner::find_calls(source, "loadMessageBundle") {
        if let Some(at) = scanner::empty_arguments(source, call) {
            edits.push((at..at, "__filename".to_string()));
        }
    }

    edits.sort_by_key(|(range, _)| range.start);

    let mut contents = String::with_capacity(source.len());
    let mut last = 0;
    for (range, replacement) in edits {
        contents.push_str(&source[last..range.start]);
        contents.push_str(&replacement);
        last = range.end;
    }
    contents.push_str(&source[last..]);

    unit.contents = contents;
    unit.nls = Some(metadata);
    Ok(unit)
}

fn malformed(unit: &CompiledUnit, source: &str, call: Call, reason: String) -> BundlingError {
    BundlingError::Malformed {
        file: unit.path.clone(),
        line: call.line(source),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::nls::LocalizeKey;

    #[test]
    fn rewrites_in_source_order() {
        let source = "\
const localize = nls.loadMessageBundle();
function f() {
    return localize('first', 'First');
}
const b = localize({ key: 'second', comment: ['note'] }, 'Sec' +
    'ond {0}', 42);
";
        let unit = rewrite(CompiledUnit::new("sub/a.js", source)).unwrap();

        assert_eq!(
            unit.contents,
            "\
const localize = nls.loadMessageBundle(__filename);
function f() {
    return localize(0, null);
}
const b = localize(1, null
, 42);
"
        );

        let nls = unit.nls.unwrap();
        assert_eq!(
            nls.messages,
            vec!["First".to_string(), "Second {0}".to_string()]
        );
        assert_eq!(
            nls.keys,
            vec![
                LocalizeKey::Plain("first".into()),
                LocalizeKey::Commented {
                    key: "second".into(),
                    comment: vec!["note".into()]
                }
            ]
        );
    }

    #[test]
    fn no_calls_no_change() {
        let source = "const localize = nls.loadMessageBundle();\n";
        let unit = rewrite(CompiledUnit::new("a.js", source)).unwrap();
        assert_eq!(unit.contents, source);
        assert!(unit.nls.is_none());
    }

    #[test]
    fn duplicate_key_is_fatal() {
        let source = "localize('k', 'a'); localize('k', 'b');";
        let error = rewrite(CompiledUnit::new("a.js", source)).unwrap_err();
        assert!(matches!(error, BundlingError::DuplicateKey { ref key, .. } if key == "k"));
    }

    #[test]
    fn malformed_call_names_the_line() {
        let source = "\n\nlocalize(someKey, 'a');";
        let error = rewrite(CompiledUnit::new("a.js", source)).unwrap_err();
        assert!(matches!(error, BundlingError::Malformed { line: 3, .. }));
        assert!(error.to_string().starts_with("a.js:3:"));
    }

    #[test]
    fn stage_emits_default_messages() {
        let mut stage = RewriteLocalizeCalls::new("out");
        let output = stage
            .transform(Artifact::Unit(CompiledUnit::new("sub/a.js", "localize('k', 'v');")))
            .unwrap();

        let Artifact::Resource(resource) = &output[1] else {
            panic!("expected a resource, got {output:?}");
        };
        assert_eq!(resource.path, "out/sub/a.nls.json");
        assert_eq!(resource.contents, "[\n  \"v\"\n]");
    }
}
