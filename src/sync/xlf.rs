//! XLIFF 1.2 exchange files.
//!
//! One exchange unit holds a `<file>` per resource module. The `original`
//! attribute names the module the way the resource folders do, `package` for
//! manifest strings and `<outDir>/<module>` for compiled units, so importing
//! a unit lands every file at `<translations>/<folder>/<original>.i18n.json`.

use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::XlfError;
use crate::nls::metadata::MetadataHeader;
use crate::nls::{FileMetadata, MetadataBundle};

const XLIFF_NS: &str = "urn:oasis:names:tc:xliff:document:1.2";
const SOURCE_LANGUAGE: &str = "en";

/// Module name of the extension manifest strings.
pub const PACKAGE_MODULE: &str = "package";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransUnit {
    pub id: String,
    pub source: String,
    pub target: Option<String>,
    pub notes: Vec<String>,
}

impl TransUnit {
    /// The translated text, or the source when nothing was translated yet.
    pub fn value(&self) -> &str {
        match &self.target {
            Some(target) if !target.is_empty() => target,
            _ => &self.source,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XlfFile {
    pub original: String,
    pub source_language: String,
    pub target_language: Option<String>,
    pub units: Vec<TransUnit>,
}

impl XlfFile {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            source_language: SOURCE_LANGUAGE.into(),
            target_language: None,
            units: Vec::new(),
        }
    }

    fn from_metadata(original: impl Into<String>, metadata: &FileMetadata) -> Self {
        let mut file = Self::new(original);
        file.units = metadata
            .keys
            .iter()
            .zip(&metadata.messages)
            .map(|(key, message)| TransUnit {
                id: key.key().to_string(),
                source: message.clone(),
                target: None,
                notes: key.comment().to_vec(),
            })
            .collect();
        file
    }
}

/// A bilingual exchange document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeUnit {
    pub files: Vec<XlfFile>,
}

impl ExchangeUnit {
    /// Converts the manifest strings and the metadata index of a build.
    /// Modules are listed in index order, after the manifest.
    pub fn from_metadata(
        package: &FileMetadata,
        header: &MetadataHeader,
        bundle: &MetadataBundle,
    ) -> Self {
        let out_dir = header.out_dir.trim_end_matches('/');

        let mut files = Vec::with_capacity(bundle.len() + 1);
        if !package.keys.is_empty() {
            files.push(XlfFile::from_metadata(PACKAGE_MODULE, package));
        }

        for (module, metadata) in bundle {
            if metadata.keys.is_empty() {
                continue;
            }
            let original = match out_dir {
                "" | "." => module.clone(),
                out_dir => format!("{out_dir}/{module}"),
            };
            files.push(XlfFile::from_metadata(original, metadata));
        }

        Self { files }
    }

    pub fn unit_count(&self) -> usize {
        self.files.iter().map(|file| file.units.len()).sum()
    }

    pub fn to_xml(&self) -> Result<String, XlfError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        let w = &mut writer;

        write(w, Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        let xliff =
            BytesStart::new("xliff").with_attributes([("version", "1.2"), ("xmlns", XLIFF_NS)]);
        write(w, Event::Start(xliff))?;

        for file in &self.files {
            let mut start = BytesStart::new("file");
            start.push_attribute(("original", file.original.as_str()));
            start.push_attribute(("source-language", file.source_language.as_str()));
            if let Some(target) = &file.target_language {
                start.push_attribute(("target-language", target.as_str()));
            }
            start.push_attribute(("datatype", "plaintext"));

            write(w, Event::Start(start))?;
            write(w, Event::Start(BytesStart::new("body")))?;

            for unit in &file.units {
                let open =
                    BytesStart::new("trans-unit").with_attributes([("id", unit.id.as_str())]);
                write(w, Event::Start(open))?;
                element(w, "source", &unit.source)?;
                if let Some(target) = &unit.target {
                    element(w, "target", target)?;
                }
                for note in &unit.notes {
                    element(w, "note", note)?;
                }
                write(w, Event::End(BytesEnd::new("trans-unit")))?;
            }

            write(w, Event::End(BytesEnd::new("body")))?;
            write(w, Event::End(BytesEnd::new("file")))?;
        }

        write(w, Event::End(BytesEnd::new("xliff")))?;

        String::from_utf8(writer.into_inner()).map_err(|e| XlfError::Write(e.to_string()))
    }

    pub fn parse(text: &str) -> Result<Self, XlfError> {
        let mut reader = Reader::from_str(text);
        let mut document = Self::default();

        let mut unit: Option<TransUnit> = None;
        let mut field: Option<Field> = None;
        let mut buffer = String::new();

        loop {
            let event = reader.read_event().map_err(parse_error)?;
            match event {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"file" => document.files.push(file_start(&e)?),
                    b"trans-unit" => unit = Some(unit_start(&e)?),
                    name => {
                        if let Some(next) = Field::from_name(name)
                            && unit.is_some()
                        {
                            field = Some(next);
                            buffer.clear();
                        }
                    }
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"file" => document.files.push(file_start(&e)?),
                    b"trans-unit" => push_unit(&mut document, unit_start(&e)?)?,
                    name => {
                        if let (Some(field), Some(unit)) = (Field::from_name(name), unit.as_mut()) {
                            field.assign(unit, String::new());
                        }
                    }
                },
                Event::Text(e) if field.is_some() => {
                    let text = e.unescape().map_err(parse_error)?;
                    buffer.push_str(&text);
                }
                Event::CData(e) if field.is_some() => {
                    buffer.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
                Event::End(e) => match e.local_name().as_ref() {
                    b"trans-unit" => {
                        if let Some(unit) = unit.take() {
                            push_unit(&mut document, unit)?;
                        }
                    }
                    name if Field::from_name(name).is_some() => {
                        if let (Some(field), Some(unit)) = (field.take(), unit.as_mut()) {
                            field.assign(unit, std::mem::take(&mut buffer));
                        }
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(document)
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Source,
    Target,
    Note,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"source" => Some(Field::Source),
            b"target" => Some(Field::Target),
            b"note" => Some(Field::Note),
            _ => None,
        }
    }

    fn assign(self, unit: &mut TransUnit, text: String) {
        match self {
            Field::Source => unit.source = text,
            Field::Target => unit.target = Some(text),
            Field::Note => unit.notes.push(text),
        }
    }
}

fn push_unit(document: &mut ExchangeUnit, unit: TransUnit) -> Result<(), XlfError> {
    let Some(file) = document.files.last_mut() else {
        return Err(XlfError::Parse(format!("trans-unit '{}' outside of a file", unit.id)));
    };
    file.units.push(unit);
    Ok(())
}

fn file_start(e: &BytesStart) -> Result<XlfFile, XlfError> {
    let original = attribute(e, "original")?.ok_or(XlfError::MissingAttribute {
        element: "file",
        attribute: "original",
    })?;

    let mut file = XlfFile::new(original);
    if let Some(source) = attribute(e, "source-language")? {
        file.source_language = source;
    }
    file.target_language = attribute(e, "target-language")?;
    Ok(file)
}

fn unit_start(e: &BytesStart) -> Result<TransUnit, XlfError> {
    let id = attribute(e, "id")?.ok_or(XlfError::MissingAttribute {
        element: "trans-unit",
        attribute: "id",
    })?;

    Ok(TransUnit {
        id,
        source: String::new(),
        target: None,
        notes: Vec::new(),
    })
}

fn attribute(e: &BytesStart, name: &str) -> Result<Option<String>, XlfError> {
    let Some(attr) = e.try_get_attribute(name).map_err(parse_error)? else {
        return Ok(None);
    };

    let value: Cow<str> = attr.unescape_value().map_err(parse_error)?;
    Ok(Some(value.into_owned()))
}

fn parse_error(e: impl std::fmt::Display) -> XlfError {
    XlfError::Parse(e.to_string())
}

fn element(w: &mut Writer<Vec<u8>>, name: &str, text: &str) -> Result<(), XlfError> {
    write(w, Event::Start(BytesStart::new(name)))?;
    write(w, Event::Text(BytesText::new(text)))?;
    write(w, Event::End(BytesEnd::new(name)))
}

fn write(w: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<(), XlfError> {
    w.write_event(event)
        .map_err(|e| XlfError::Write(e.to_string()))
}
