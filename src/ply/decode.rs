//! Scalar decoding and slot routing.
//!
//! Two flat dispatch surfaces, mirroring the two decisions made per
//! property: how to pull a value off the stream (data type × storage
//! mode), and which iterator field it lands in (property name × data
//! type). Both are plain `match`es over small `Copy` enums so the hot
//! loop never allocates.

use std::io::{Read, Seek};

use byteorder::{BigEndian, LittleEndian};

use crate::chunk::PendingVertex;
use crate::ply::header::{ScalarType, StorageMode};
use crate::reader::ByteReader;
use crate::LoadError;

/// A decoded scalar, widened to the signed type that can hold it:
/// uchar to i16, ushort to i32, uint to i64, signed and float types at
/// their natural width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Slot {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Slot {
    pub fn to_f32(self) -> f32 {
        match self {
            Slot::I8(v) => v as f32,
            Slot::I16(v) => v as f32,
            Slot::I32(v) => v as f32,
            Slot::I64(v) => v as f32,
            Slot::F32(v) => v,
            Slot::F64(v) => v as f32,
        }
    }

    /// Color narrowing truncates wider integers instead of clamping;
    /// floats go through an integer cast first so fractions drop.
    pub fn to_i16(self) -> i16 {
        match self {
            Slot::I8(v) => v as i16,
            Slot::I16(v) => v,
            Slot::I32(v) => v as i16,
            Slot::I64(v) => v as i16,
            Slot::F32(v) => (v as i32) as i16,
            Slot::F64(v) => (v as i32) as i16,
        }
    }

    pub fn to_i32(self) -> i32 {
        match self {
            Slot::I8(v) => v as i32,
            Slot::I16(v) => v as i32,
            Slot::I32(v) => v,
            Slot::I64(v) => v as i32,
            Slot::F32(v) => v as i32,
            Slot::F64(v) => v as i32,
        }
    }

    pub fn to_i64(self) -> i64 {
        match self {
            Slot::I8(v) => v as i64,
            Slot::I16(v) => v as i64,
            Slot::I32(v) => v as i64,
            Slot::I64(v) => v,
            Slot::F32(v) => v as i64,
            Slot::F64(v) => v as i64,
        }
    }
}

/// Read one scalar of `ty` from the stream in the given storage mode.
pub(crate) fn read_scalar<R: Read + Seek>(
    reader: &mut ByteReader<R>,
    ty: ScalarType,
    mode: StorageMode,
) -> Result<Slot, LoadError> {
    match mode {
        StorageMode::Ascii => {
            let word = reader.next_word()?;
            parse_ascii(&word, ty)
        }
        StorageMode::LittleEndian => read_binary::<LittleEndian, R>(reader, ty),
        StorageMode::BigEndian => read_binary::<BigEndian, R>(reader, ty),
    }
}

fn read_binary<E: byteorder::ByteOrder, R: Read + Seek>(
    reader: &mut ByteReader<R>,
    ty: ScalarType,
) -> Result<Slot, LoadError> {
    Ok(match ty {
        ScalarType::Char => Slot::I8(reader.read_i8()?),
        ScalarType::UChar => Slot::I16(reader.read_u8()? as i16),
        ScalarType::Short => Slot::I16(reader.read_i16::<E>()?),
        ScalarType::UShort => Slot::I32(reader.read_u16::<E>()? as i32),
        ScalarType::Int => Slot::I32(reader.read_i32::<E>()?),
        ScalarType::UInt => Slot::I64(reader.read_u32::<E>()? as i64),
        ScalarType::Float => Slot::F32(reader.read_f32::<E>()?),
        ScalarType::Double => Slot::F64(reader.read_f64::<E>()?),
    })
}

fn parse_ascii(word: &str, ty: ScalarType) -> Result<Slot, LoadError> {
    let fail = || LoadError::corrupt(format!("cannot parse '{word}' as {ty:?}"));
    Ok(match ty {
        ScalarType::Char => Slot::I8(word.parse::<i8>().map_err(|_| fail())?),
        ScalarType::UChar => Slot::I16(word.parse::<u8>().map_err(|_| fail())? as i16),
        ScalarType::Short => Slot::I16(word.parse::<i16>().map_err(|_| fail())?),
        ScalarType::UShort => Slot::I32(word.parse::<u16>().map_err(|_| fail())? as i32),
        ScalarType::Int => Slot::I32(word.parse::<i32>().map_err(|_| fail())?),
        ScalarType::UInt => Slot::I64(word.parse::<u32>().map_err(|_| fail())? as i64),
        ScalarType::Float => Slot::F32(word.parse::<f32>().map_err(|_| fail())?),
        ScalarType::Double => Slot::F64(word.parse::<f64>().map_err(|_| fail())?),
    })
}

/// Destination of a decoded vertex property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SemanticRole {
    X,
    Y,
    Z,
    NormalX,
    NormalY,
    NormalZ,
    Red,
    Green,
    Blue,
    Alpha,
    VertexIndex,
    ListLength,
    /// Unrecognized property names are decoded for stream position and
    /// dropped.
    Ignored,
}

impl SemanticRole {
    pub fn for_vertex_property(name: &str) -> Self {
        match name {
            "x" => SemanticRole::X,
            "y" => SemanticRole::Y,
            "z" => SemanticRole::Z,
            "nx" => SemanticRole::NormalX,
            "ny" => SemanticRole::NormalY,
            "nz" => SemanticRole::NormalZ,
            "red" => SemanticRole::Red,
            "green" => SemanticRole::Green,
            "blue" => SemanticRole::Blue,
            "alpha" => SemanticRole::Alpha,
            _ => SemanticRole::Ignored,
        }
    }

    /// Route a decoded value into the pending vertex with the conversion
    /// the destination field requires.
    pub fn apply(self, slot: Slot, vertex: &mut PendingVertex) {
        match self {
            SemanticRole::X => vertex.x = slot.to_f32(),
            SemanticRole::Y => vertex.y = slot.to_f32(),
            SemanticRole::Z => vertex.z = slot.to_f32(),
            SemanticRole::NormalX => vertex.nx = slot.to_f32(),
            SemanticRole::NormalY => vertex.ny = slot.to_f32(),
            SemanticRole::NormalZ => vertex.nz = slot.to_f32(),
            SemanticRole::Red => vertex.red = slot.to_i16(),
            SemanticRole::Green => vertex.green = slot.to_i16(),
            SemanticRole::Blue => vertex.blue = slot.to_i16(),
            SemanticRole::Alpha => vertex.alpha = slot.to_i16(),
            SemanticRole::VertexIndex => vertex.index = slot.to_i64(),
            SemanticRole::ListLength => vertex.list_len = slot.to_i32(),
            SemanticRole::Ignored => {}
        }
    }
}
