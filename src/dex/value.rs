//! Encoded values: the tagged constants used by static field initializers, annotations and
//! encoded arrays.
//!
//! Each value starts with a header byte `(arg << 5) | type`. Numeric kinds store `arg + 1`
//! bytes of payload in the minimal width for the value; [`EncodedValue::write`] always picks
//! that minimal width.

use std::cmp::Ordering;

use crate::{
    dex::{
        context::ReadContext,
        item::{Item, SortContext},
        items::{FieldIdItem, MethodIdItem, StringIdItem, TypeIdItem},
        section::Id,
        DexFile,
    },
    file::{parser::Parser, writer::Writer},
    utils::math::{to_u32, uleb128_size},
    Result,
};

const VALUE_BYTE: u8 = 0x00;
const VALUE_SHORT: u8 = 0x02;
const VALUE_CHAR: u8 = 0x03;
const VALUE_INT: u8 = 0x04;
const VALUE_LONG: u8 = 0x06;
const VALUE_FLOAT: u8 = 0x10;
const VALUE_DOUBLE: u8 = 0x11;
const VALUE_STRING: u8 = 0x17;
const VALUE_TYPE: u8 = 0x18;
const VALUE_FIELD: u8 = 0x19;
const VALUE_METHOD: u8 = 0x1a;
const VALUE_ENUM: u8 = 0x1b;
const VALUE_ARRAY: u8 = 0x1c;
const VALUE_ANNOTATION: u8 = 0x1d;
const VALUE_NULL: u8 = 0x1e;
const VALUE_BOOLEAN: u8 = 0x1f;

/// A constant value.
///
/// Floating point values are kept as raw bits so equality and hashing are exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EncodedValue {
    /// Signed 8-bit integer
    Byte(i8),
    /// Signed 16-bit integer
    Short(i16),
    /// UTF-16 code unit
    Char(u16),
    /// Signed 32-bit integer
    Int(i32),
    /// Signed 64-bit integer
    Long(i64),
    /// IEEE 754 single, as bits
    Float(u32),
    /// IEEE 754 double, as bits
    Double(u64),
    /// String constant
    String(Id<StringIdItem>),
    /// Class literal
    Type(Id<TypeIdItem>),
    /// Field reference
    Field(Id<FieldIdItem>),
    /// Method reference
    Method(Id<MethodIdItem>),
    /// Enum constant, named by its field
    Enum(Id<FieldIdItem>),
    /// Nested array
    Array(Vec<EncodedValue>),
    /// Nested annotation
    Annotation(EncodedAnnotation),
    /// `null`
    Null,
    /// Boolean constant
    Boolean(bool),
}

/// An annotation body: its type and named elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedAnnotation {
    /// Annotation type
    pub ty: Id<TypeIdItem>,
    /// Elements in encoded order
    pub elements: Vec<AnnotationElement>,
}

/// One `name = value` pair of an annotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnnotationElement {
    /// Element name
    pub name: Id<StringIdItem>,
    /// Element value
    pub value: EncodedValue,
}

/// Number of bytes needed to store `value` sign-extended.
fn signed_width(value: i64) -> u32 {
    (1..8)
        .find(|&width| {
            let shift = 64 - 8 * width;
            (value << shift) >> shift == value
        })
        .unwrap_or(8)
}

/// Number of bytes needed to store `value` zero-extended.
fn unsigned_width(value: u64) -> u32 {
    let bits = 64 - value.leading_zeros();
    bits.div_ceil(8).max(1)
}

/// Number of high-order bytes needed to store `bits` right zero-extended to `total` bytes.
fn right_width(bits: u64, total: u32) -> u32 {
    let zero_bytes = (bits.trailing_zeros() / 8).min(total);
    total.saturating_sub(zero_bytes).max(1)
}

fn read_sized(parser: &mut Parser<'_>, size: u32) -> Result<u64> {
    let bytes = parser.read_bytes(size as usize)?;
    Ok(bytes
        .iter()
        .rev()
        .fold(0_u64, |value, &byte| (value << 8) | u64::from(byte)))
}

fn read_signed(parser: &mut Parser<'_>, size: u32) -> Result<i64> {
    let raw = read_sized(parser, size)?;
    let shift = 64 - 8 * size;
    Ok(((raw << shift) as i64) >> shift)
}

fn write_sized(out: &mut Writer, value: u64, width: u32) {
    for byte in 0..width {
        out.write_le((value >> (8 * byte)) as u8);
    }
}

fn check_size(value_type: u8, size: u32, max: u32) -> Result<()> {
    if size > max {
        return Err(malformed_error!(
            "encoded value type 0x{:02x} with {} bytes, at most {} allowed",
            value_type,
            size,
            max
        ));
    }
    Ok(())
}

impl EncodedValue {
    /// The value's type code.
    #[must_use]
    pub fn value_type(&self) -> u8 {
        match self {
            EncodedValue::Byte(_) => VALUE_BYTE,
            EncodedValue::Short(_) => VALUE_SHORT,
            EncodedValue::Char(_) => VALUE_CHAR,
            EncodedValue::Int(_) => VALUE_INT,
            EncodedValue::Long(_) => VALUE_LONG,
            EncodedValue::Float(_) => VALUE_FLOAT,
            EncodedValue::Double(_) => VALUE_DOUBLE,
            EncodedValue::String(_) => VALUE_STRING,
            EncodedValue::Type(_) => VALUE_TYPE,
            EncodedValue::Field(_) => VALUE_FIELD,
            EncodedValue::Method(_) => VALUE_METHOD,
            EncodedValue::Enum(_) => VALUE_ENUM,
            EncodedValue::Array(_) => VALUE_ARRAY,
            EncodedValue::Annotation(_) => VALUE_ANNOTATION,
            EncodedValue::Null => VALUE_NULL,
            EncodedValue::Boolean(_) => VALUE_BOOLEAN,
        }
    }

    /// Decodes one value.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an unknown type code or an oversized payload,
    /// and [`crate::Error::Resolution`] for an index out of range.
    pub fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<EncodedValue> {
        let header = parser.read_le::<u8>()?;
        let value_type = header & 0x1F;
        let arg = u32::from(header >> 5);
        let size = arg + 1;

        let value = match value_type {
            VALUE_BYTE => {
                check_size(value_type, size, 1)?;
                EncodedValue::Byte(read_signed(parser, size)? as i8)
            }
            VALUE_SHORT => {
                check_size(value_type, size, 2)?;
                EncodedValue::Short(read_signed(parser, size)? as i16)
            }
            VALUE_CHAR => {
                check_size(value_type, size, 2)?;
                EncodedValue::Char(read_sized(parser, size)? as u16)
            }
            VALUE_INT => {
                check_size(value_type, size, 4)?;
                EncodedValue::Int(read_signed(parser, size)? as i32)
            }
            VALUE_LONG => EncodedValue::Long(read_signed(parser, size)?),
            VALUE_FLOAT => {
                check_size(value_type, size, 4)?;
                let raw = read_sized(parser, size)?;
                EncodedValue::Float((raw << (8 * (4 - size))) as u32)
            }
            VALUE_DOUBLE => {
                let raw = read_sized(parser, size)?;
                EncodedValue::Double(raw << (8 * (8 - size)))
            }
            VALUE_STRING | VALUE_TYPE | VALUE_FIELD | VALUE_METHOD | VALUE_ENUM => {
                check_size(value_type, size, 4)?;
                let index = read_sized(parser, size)? as u32;
                match value_type {
                    VALUE_STRING => EncodedValue::String(ctx.index(index)?),
                    VALUE_TYPE => EncodedValue::Type(ctx.index(index)?),
                    VALUE_FIELD => EncodedValue::Field(ctx.index(index)?),
                    VALUE_METHOD => EncodedValue::Method(ctx.index(index)?),
                    _ => EncodedValue::Enum(ctx.index(index)?),
                }
            }
            VALUE_ARRAY => {
                check_size(value_type, size, 1)?;
                EncodedValue::Array(Self::read_array(parser, ctx)?)
            }
            VALUE_ANNOTATION => {
                check_size(value_type, size, 1)?;
                EncodedValue::Annotation(EncodedAnnotation::read(parser, ctx)?)
            }
            VALUE_NULL => {
                check_size(value_type, size, 1)?;
                EncodedValue::Null
            }
            VALUE_BOOLEAN => match arg {
                0 => EncodedValue::Boolean(false),
                1 => EncodedValue::Boolean(true),
                _ => return Err(malformed_error!("boolean encoded value with argument {}", arg)),
            },
            other => {
                return Err(malformed_error!(
                    "unknown encoded value type 0x{:02x}",
                    other
                ))
            }
        };
        Ok(value)
    }

    /// Decodes the body of an encoded array: a count followed by that many values.
    ///
    /// # Errors
    /// See [`EncodedValue::read`].
    pub fn read_array(
        parser: &mut Parser<'_>,
        ctx: &mut ReadContext<'_>,
    ) -> Result<Vec<EncodedValue>> {
        let count = parser.read_uleb128()?;
        let mut values = Vec::with_capacity(count.min(0x1000) as usize);
        for _ in 0..count {
            values.push(EncodedValue::read(parser, ctx)?);
        }
        Ok(values)
    }

    /// The header argument and payload of a scalar value, `None` for nested values.
    fn scalar(&self, dex: &DexFile) -> Result<Option<(u32, u64, u32)>> {
        let scalar = match self {
            EncodedValue::Byte(value) => (0, u64::from(*value as u8), 1),
            EncodedValue::Short(value) => {
                let width = signed_width(i64::from(*value));
                (width - 1, *value as u64, width)
            }
            EncodedValue::Char(value) => {
                let width = unsigned_width(u64::from(*value));
                (width - 1, u64::from(*value), width)
            }
            EncodedValue::Int(value) => {
                let width = signed_width(i64::from(*value));
                (width - 1, *value as u64, width)
            }
            EncodedValue::Long(value) => {
                let width = signed_width(*value);
                (width - 1, *value as u64, width)
            }
            EncodedValue::Float(bits) => {
                let bits = u64::from(*bits);
                let width = right_width(bits, 4);
                (width - 1, bits >> (8 * (4 - width)), width)
            }
            EncodedValue::Double(bits) => {
                let width = right_width(*bits, 8);
                (width - 1, bits >> (8 * (8 - width)), width)
            }
            EncodedValue::String(id) => Self::index_scalar(dex.string_ids.index_of(*id)?),
            EncodedValue::Type(id) => Self::index_scalar(dex.type_ids.index_of(*id)?),
            EncodedValue::Field(id) | EncodedValue::Enum(id) => {
                Self::index_scalar(dex.field_ids.index_of(*id)?)
            }
            EncodedValue::Method(id) => Self::index_scalar(dex.method_ids.index_of(*id)?),
            EncodedValue::Boolean(value) => (u32::from(*value), 0, 0),
            EncodedValue::Null => (0, 0, 0),
            EncodedValue::Array(_) | EncodedValue::Annotation(_) => return Ok(None),
        };
        Ok(Some(scalar))
    }

    fn index_scalar(index: u32) -> (u32, u64, u32) {
        let width = unsigned_width(u64::from(index));
        (width - 1, u64::from(index), width)
    }

    /// Encoded size in bytes, header byte included.
    ///
    /// # Errors
    /// Returns [`crate::Error::State`] if a referenced item is unplaced.
    pub fn size(&self, dex: &DexFile) -> Result<u32> {
        match self {
            EncodedValue::Array(values) => Ok(1 + Self::array_size(values, dex)?),
            EncodedValue::Annotation(annotation) => Ok(1 + annotation.size(dex)?),
            scalar => {
                let (_, _, width) = scalar.scalar(dex)?.unwrap_or_default();
                Ok(1 + width)
            }
        }
    }

    /// Encoded size of an array body.
    ///
    /// # Errors
    /// See [`EncodedValue::size`].
    pub fn array_size(values: &[EncodedValue], dex: &DexFile) -> Result<u32> {
        let mut size = uleb128_size(to_u32(values.len())?);
        for value in values {
            size += value.size(dex)?;
        }
        Ok(size)
    }

    /// Encodes the value in its minimal form.
    ///
    /// # Errors
    /// Returns [`crate::Error::State`] if a referenced item is unplaced.
    pub fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        let value_type = self.value_type();
        match self {
            EncodedValue::Array(values) => {
                out.write_le(value_type);
                Self::write_array(values, dex, out)
            }
            EncodedValue::Annotation(annotation) => {
                out.write_le(value_type);
                annotation.write(dex, out)
            }
            scalar => {
                let (arg, payload, width) = scalar.scalar(dex)?.unwrap_or_default();
                out.write_le(((arg as u8) << 5) | value_type);
                write_sized(out, payload, width);
                Ok(())
            }
        }
    }

    /// Encodes an array body.
    ///
    /// # Errors
    /// See [`EncodedValue::write`].
    pub fn write_array(values: &[EncodedValue], dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_uleb128(to_u32(values.len())?);
        for value in values {
            value.write(dex, out)?;
        }
        Ok(())
    }

    /// Orders by type code, then by value.
    #[must_use]
    pub fn compare(&self, other: &EncodedValue, cx: &SortContext<'_>) -> Ordering {
        use EncodedValue as V;

        self.value_type()
            .cmp(&other.value_type())
            .then_with(|| match (self, other) {
                (V::Byte(a), V::Byte(b)) => a.cmp(b),
                (V::Short(a), V::Short(b)) => a.cmp(b),
                (V::Char(a), V::Char(b)) => a.cmp(b),
                (V::Int(a), V::Int(b)) => a.cmp(b),
                (V::Long(a), V::Long(b)) => a.cmp(b),
                (V::Float(a), V::Float(b)) => f32::from_bits(*a).total_cmp(&f32::from_bits(*b)),
                (V::Double(a), V::Double(b)) => {
                    f64::from_bits(*a).total_cmp(&f64::from_bits(*b))
                }
                (V::String(a), V::String(b)) => cx.cmp(*a, *b),
                (V::Type(a), V::Type(b)) => cx.cmp(*a, *b),
                (V::Field(a), V::Field(b)) | (V::Enum(a), V::Enum(b)) => cx.cmp(*a, *b),
                (V::Method(a), V::Method(b)) => cx.cmp(*a, *b),
                (V::Array(a), V::Array(b)) => Self::compare_arrays(a, b, cx),
                (V::Annotation(a), V::Annotation(b)) => a.compare(b, cx),
                (V::Boolean(a), V::Boolean(b)) => a.cmp(b),
                _ => Ordering::Equal,
            })
    }

    /// Orders arrays by length, then elementwise.
    #[must_use]
    pub fn compare_arrays(a: &[EncodedValue], b: &[EncodedValue], cx: &SortContext<'_>) -> Ordering {
        a.len().cmp(&b.len()).then_with(|| {
            a.iter()
                .zip(b)
                .map(|(a, b)| a.compare(b, cx))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        })
    }

    /// Human readable rendering for diagnostics.
    #[must_use]
    pub fn display(&self, dex: &DexFile) -> String {
        match self {
            EncodedValue::Byte(value) => format!("{value}"),
            EncodedValue::Short(value) => format!("{value}"),
            EncodedValue::Char(value) => format!("'\\u{value:04x}'"),
            EncodedValue::Int(value) => format!("{value}"),
            EncodedValue::Long(value) => format!("{value}L"),
            EncodedValue::Float(bits) => format!("{}f", f32::from_bits(*bits)),
            EncodedValue::Double(bits) => format!("{}", f64::from_bits(*bits)),
            EncodedValue::String(id) => format!("\"{}\"", dex.string(*id)),
            EncodedValue::Type(id) => dex.type_descriptor(*id).to_string(),
            EncodedValue::Field(id) | EncodedValue::Enum(id) => dex.field_ids[*id].summary(dex),
            EncodedValue::Method(id) => dex.method_ids[*id].summary(dex),
            EncodedValue::Array(values) => {
                let values: Vec<String> = values.iter().map(|value| value.display(dex)).collect();
                format!("{{{}}}", values.join(", "))
            }
            EncodedValue::Annotation(annotation) => annotation.display(dex),
            EncodedValue::Null => "null".to_string(),
            EncodedValue::Boolean(value) => format!("{value}"),
        }
    }
}

impl EncodedAnnotation {
    /// Decodes an annotation body.
    ///
    /// # Errors
    /// See [`EncodedValue::read`].
    pub fn read(parser: &mut Parser<'_>, ctx: &mut ReadContext<'_>) -> Result<EncodedAnnotation> {
        let ty = ctx.index(parser.read_uleb128()?)?;
        let count = parser.read_uleb128()?;
        let mut elements = Vec::with_capacity(count.min(0x1000) as usize);
        for _ in 0..count {
            let name = ctx.index(parser.read_uleb128()?)?;
            let value = EncodedValue::read(parser, ctx)?;
            elements.push(AnnotationElement { name, value });
        }
        Ok(EncodedAnnotation { ty, elements })
    }

    /// Encoded size in bytes.
    ///
    /// # Errors
    /// See [`EncodedValue::size`].
    pub fn size(&self, dex: &DexFile) -> Result<u32> {
        let mut size = uleb128_size(dex.type_ids.index_of(self.ty)?);
        size += uleb128_size(to_u32(self.elements.len())?);
        for element in &self.elements {
            size += uleb128_size(dex.string_ids.index_of(element.name)?);
            size += element.value.size(dex)?;
        }
        Ok(size)
    }

    /// Encodes the annotation body.
    ///
    /// # Errors
    /// See [`EncodedValue::write`].
    pub fn write(&self, dex: &DexFile, out: &mut Writer) -> Result<()> {
        out.write_uleb128(dex.type_ids.index_of(self.ty)?);
        out.write_uleb128(to_u32(self.elements.len())?);
        for element in &self.elements {
            out.write_uleb128(dex.string_ids.index_of(element.name)?);
            element.value.write(dex, out)?;
        }
        Ok(())
    }

    /// Orders by type, element count, element names, then element values.
    #[must_use]
    pub fn compare(&self, other: &EncodedAnnotation, cx: &SortContext<'_>) -> Ordering {
        cx.cmp(self.ty, other.ty)
            .then_with(|| self.elements.len().cmp(&other.elements.len()))
            .then_with(|| {
                self.elements
                    .iter()
                    .zip(&other.elements)
                    .map(|(a, b)| cx.cmp(a.name, b.name))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| {
                self.elements
                    .iter()
                    .zip(&other.elements)
                    .map(|(a, b)| a.value.compare(&b.value, cx))
                    .find(|ordering| ordering.is_ne())
                    .unwrap_or(Ordering::Equal)
            })
    }

    /// Human readable rendering for diagnostics.
    #[must_use]
    pub fn display(&self, dex: &DexFile) -> String {
        let elements: Vec<String> = self
            .elements
            .iter()
            .map(|element| {
                format!(
                    "{}={}",
                    dex.string(element.name),
                    element.value.display(dex)
                )
            })
            .collect();
        format!(
            "@{}({})",
            dex.type_descriptor(self.ty),
            elements.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &EncodedValue) -> Vec<u8> {
        let dex = DexFile::new();
        let mut out = Writer::new(false);
        value.write(&dex, &mut out).unwrap();
        assert_eq!(value.size(&dex).unwrap() as usize, out.data().len());
        out.into_parts().0
    }

    #[test]
    fn widths() {
        assert_eq!(signed_width(0), 1);
        assert_eq!(signed_width(127), 1);
        assert_eq!(signed_width(128), 2);
        assert_eq!(signed_width(-128), 1);
        assert_eq!(signed_width(-129), 2);
        assert_eq!(signed_width(i64::MIN), 8);
        assert_eq!(unsigned_width(0), 1);
        assert_eq!(unsigned_width(0xFF), 1);
        assert_eq!(unsigned_width(0x100), 2);
        assert_eq!(right_width(0, 4), 1);
        assert_eq!(right_width(0x3F80_0000, 4), 2);
    }

    #[test]
    fn minimal_scalar_encodings() {
        assert_eq!(encode(&EncodedValue::Int(1)), vec![0x04, 0x01]);
        assert_eq!(encode(&EncodedValue::Int(-1)), vec![0x04, 0xFF]);
        assert_eq!(encode(&EncodedValue::Int(0x1234)), vec![0x24, 0x34, 0x12]);
        assert_eq!(encode(&EncodedValue::Short(-300)), vec![0x22, 0xD4, 0xFE]);
        assert_eq!(encode(&EncodedValue::Char(0x41)), vec![0x03, 0x41]);
        assert_eq!(encode(&EncodedValue::Long(0x1_0000_0000)), vec![0x86, 0, 0, 0, 0, 1]);
        assert_eq!(encode(&EncodedValue::Byte(-2)), vec![0x00, 0xFE]);
        assert_eq!(encode(&EncodedValue::Boolean(true)), vec![0x3F]);
        assert_eq!(encode(&EncodedValue::Null), vec![0x1E]);
        // 1.0f = 0x3F800000, high two bytes kept
        assert_eq!(
            encode(&EncodedValue::Float(1.0_f32.to_bits())),
            vec![0x30, 0x80, 0x3F]
        );
        // 2.0 = 0x4000000000000000, one byte kept
        assert_eq!(
            encode(&EncodedValue::Double(2.0_f64.to_bits())),
            vec![0x11, 0x40]
        );
        assert_eq!(
            encode(&EncodedValue::Array(vec![EncodedValue::Int(0), EncodedValue::Null])),
            vec![0x1C, 0x02, 0x04, 0x00, 0x1E]
        );
    }

    #[test]
    fn decodes_extended_forms() -> Result<()> {
        let dex = DexFile::new();
        let mut ctx = ReadContext::new(&[], dex);
        #[rustfmt::skip]
        let data = [
            0x24, 0xFF, 0xFF,       // int, 2 bytes, sign extended: -1
            0x30, 0x80, 0x3F,       // float, 2 high bytes: 1.0
            0x11, 0x40,             // double, 1 high byte: 2.0
            0x03, 0xFF,             // char 0xFF, zero extended
            0x66, 0, 0, 0, 0x80,    // long, 4 bytes: sign extended
            0x5F,                   // boolean with argument 2
        ];
        let mut parser = Parser::new(&data);
        assert_eq!(EncodedValue::read(&mut parser, &mut ctx)?, EncodedValue::Int(-1));
        assert_eq!(
            EncodedValue::read(&mut parser, &mut ctx)?,
            EncodedValue::Float(1.0_f32.to_bits())
        );
        assert_eq!(
            EncodedValue::read(&mut parser, &mut ctx)?,
            EncodedValue::Double(2.0_f64.to_bits())
        );
        assert_eq!(EncodedValue::read(&mut parser, &mut ctx)?, EncodedValue::Char(0xFF));
        assert_eq!(
            EncodedValue::read(&mut parser, &mut ctx)?,
            EncodedValue::Long(-0x8000_0000)
        );
        assert!(EncodedValue::read(&mut parser, &mut ctx).is_err());
        Ok(())
    }

    #[test]
    fn unknown_type_is_malformed() {
        let mut ctx = ReadContext::new(&[], DexFile::new());
        let mut parser = Parser::new(&[0x05, 0x00]);
        assert!(matches!(
            EncodedValue::read(&mut parser, &mut ctx),
            Err(crate::Error::Malformed { .. })
        ));
    }

    #[test]
    fn ordering_by_type_then_value() {
        let dex = DexFile::new();
        let cx = SortContext::new(&dex);
        assert_eq!(
            EncodedValue::Int(5).compare(&EncodedValue::Byte(10), &cx),
            Ordering::Greater
        );
        assert_eq!(
            EncodedValue::Int(-5).compare(&EncodedValue::Int(3), &cx),
            Ordering::Less
        );
        assert_eq!(
            EncodedValue::Array(vec![EncodedValue::Null])
                .compare(&EncodedValue::Array(vec![]), &cx),
            Ordering::Greater
        );
    }
}
