//! PLY header parsing.
//!
//! The header is a textual schema describing the binary or ASCII payload
//! that follows: storage mode, ordered elements, and per-element property
//! lists. It is parsed once per session and immutable afterwards; the
//! element order is load-bearing, since the payload stores instances in
//! exactly that order.

use std::io::{Read, Seek};

use crate::reader::ByteReader;
use crate::LoadError;

/// On-disk encoding of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    Ascii,
    LittleEndian,
    BigEndian,
}

/// PLY scalar data types. The eight canonical names each have a legacy
/// alias (`char`/`int8`, ...) that decodes identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl ScalarType {
    pub fn parse(s: &str) -> Result<Self, LoadError> {
        match s {
            "char" | "int8" => Ok(ScalarType::Char),
            "uchar" | "uint8" => Ok(ScalarType::UChar),
            "short" | "int16" => Ok(ScalarType::Short),
            "ushort" | "uint16" => Ok(ScalarType::UShort),
            "int" | "int32" => Ok(ScalarType::Int),
            "uint" | "uint32" => Ok(ScalarType::UInt),
            "float" | "float32" => Ok(ScalarType::Float),
            "double" | "float64" => Ok(ScalarType::Double),
            _ => Err(LoadError::corrupt(format!("unknown data type: {s}"))),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        match self {
            ScalarType::Char | ScalarType::UChar => 1,
            ScalarType::Short | ScalarType::UShort => 2,
            ScalarType::Int | ScalarType::UInt | ScalarType::Float => 4,
            ScalarType::Double => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar(ScalarType),
    List {
        count: ScalarType,
        value: ScalarType,
    },
}

#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone)]
pub struct ElementDef {
    pub name: String,
    pub count: u64,
    pub properties: Vec<PropertyDef>,
}

impl ElementDef {
    /// Byte size of one instance when every property is scalar; `None` as
    /// soon as a list property makes the row size variable.
    pub fn fixed_row_size(&self) -> Option<u64> {
        self.properties
            .iter()
            .map(|p| match p.kind {
                PropertyKind::Scalar(ty) => Some(ty.size_bytes()),
                PropertyKind::List { .. } => None,
            })
            .sum()
    }
}

/// Parsed PLY schema plus the read-only file metadata.
#[derive(Debug, Clone)]
pub struct PlyHeader {
    pub mode: StorageMode,
    pub elements: Vec<ElementDef>,
    pub comments: Vec<String>,
    pub obj_info: Vec<String>,
    /// Stream position of the first payload byte.
    pub data_start: u64,
}

impl PlyHeader {
    /// Parse the header from a reader positioned at offset 0. On success
    /// the reader is left at the first payload byte.
    pub fn parse<R: Read + Seek>(reader: &mut ByteReader<R>) -> Result<Self, LoadError> {
        if next_header_line(reader)? != "ply" {
            return Err(LoadError::corrupt("file does not start with 'ply'"));
        }

        let mode = parse_format_line(reader)?;

        let mut elements: Vec<ElementDef> = Vec::new();
        let mut comments = Vec::new();
        let mut obj_info = Vec::new();

        loop {
            let line = next_header_line(reader)?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let mut words = trimmed.split_whitespace();
            let keyword = words.next().unwrap();

            if keyword == "end_header" {
                break;
            } else if keyword == "comment" {
                comments.push(rest_of_line(trimmed, keyword));
            } else if keyword == "obj_info" {
                obj_info.push(rest_of_line(trimmed, keyword));
            } else if keyword.ends_with("element") {
                let name = words
                    .next()
                    .ok_or_else(|| LoadError::corrupt("element record without a name"))?;
                let count = words
                    .next()
                    .and_then(|w| w.parse::<u64>().ok())
                    .ok_or_else(|| LoadError::corrupt("element record without a count"))?;
                elements.push(ElementDef {
                    name: name.to_string(),
                    count,
                    properties: Vec::new(),
                });
            } else if keyword == "property" {
                let element = elements
                    .last_mut()
                    .ok_or_else(|| LoadError::corrupt("property before any element"))?;
                element.properties.push(parse_property(words)?);
            } else {
                return Err(LoadError::corrupt(format!(
                    "unknown header keyword: {keyword}"
                )));
            }
        }

        log::debug!(
            "parsed ply header: {:?}, {} element(s)",
            mode,
            elements.len()
        );

        Ok(PlyHeader {
            mode,
            elements,
            comments,
            obj_info,
            data_start: reader.position(),
        })
    }

    pub fn element(&self, name: &str) -> Option<&ElementDef> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn has_element(&self, name: &str) -> bool {
        self.element(name).is_some()
    }
}

/// One header line, with a hard stop at EOF so a header missing its
/// `end_header` cannot spin forever.
fn next_header_line<R: Read + Seek>(
    reader: &mut ByteReader<R>,
) -> Result<String, LoadError> {
    if reader.is_eof()? {
        return Err(LoadError::corrupt("unexpected end of header"));
    }
    Ok(reader.read_line()?)
}

fn parse_format_line<R: Read + Seek>(
    reader: &mut ByteReader<R>,
) -> Result<StorageMode, LoadError> {
    let line = loop {
        let line = next_header_line(reader)?;
        if !line.trim().is_empty() {
            break line;
        }
    };
    let mut words = line.split_whitespace();
    if words.next() != Some("format") {
        return Err(LoadError::corrupt("expected 'format' after 'ply'"));
    }
    let mode = match words.next() {
        Some("ascii") => StorageMode::Ascii,
        Some("binary_little_endian") => StorageMode::LittleEndian,
        Some("binary_big_endian") => StorageMode::BigEndian,
        other => {
            return Err(LoadError::corrupt(format!(
                "unknown storage mode: {}",
                other.unwrap_or("<missing>")
            )))
        }
    };
    if words.next() != Some("1.0") {
        return Err(LoadError::corrupt("unsupported ply version"));
    }
    Ok(mode)
}

fn parse_property<'a>(
    mut words: impl Iterator<Item = &'a str>,
) -> Result<PropertyDef, LoadError> {
    let first = words
        .next()
        .ok_or_else(|| LoadError::corrupt("property record without a type"))?;
    if first == "list" {
        let count = ScalarType::parse(
            words
                .next()
                .ok_or_else(|| LoadError::corrupt("list property without a length type"))?,
        )?;
        let value = ScalarType::parse(
            words
                .next()
                .ok_or_else(|| LoadError::corrupt("list property without a value type"))?,
        )?;
        let name = words
            .next()
            .ok_or_else(|| LoadError::corrupt("list property without a name"))?;
        Ok(PropertyDef {
            name: name.to_string(),
            kind: PropertyKind::List { count, value },
        })
    } else {
        let data_type = ScalarType::parse(first)?;
        let name = words
            .next()
            .ok_or_else(|| LoadError::corrupt("property record without a name"))?;
        Ok(PropertyDef {
            name: name.to_string(),
            kind: PropertyKind::Scalar(data_type),
        })
    }
}

fn rest_of_line(line: &str, keyword: &str) -> String {
    line[keyword.len()..].trim_start().to_string()
}
