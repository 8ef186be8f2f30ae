//! This module contains the pure, stateless kernel that picks the on-wire width
//! of a sample value and reads/writes the value's payload in that width.
//!
//! Narrowing is always exact: a width is only eligible for a value if the
//! value survives the round trip through it bit-for-bit. Integers narrow
//! through `i8`/`i16`/`i32`; doubles narrow through integral `i8`/`i16` and
//! through `f32`. All payloads are little-endian.

use num_traits::{NumCast, ToPrimitive};

use crate::error::{Result, TimelineError};
use crate::format::Opcode;
use crate::kernels::cursor::ByteCursor;
use crate::types::SampleValue;

//==================================================================================
// 1. The Width Modes
//==================================================================================

/// How the value following a time unit is encoded. Selected by width-marker
/// opcodes and sticky until the next marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueWidth {
    IntZero,
    Byte,
    Short,
    Int,
    Long,
    DoubleZero,
    ByteForDouble,
    ShortForDouble,
    FloatForDouble,
    Double,
}

/// Candidate widths for integers, narrowest first.
const INTEGER_WIDTHS: [ValueWidth; 5] = [
    ValueWidth::IntZero,
    ValueWidth::Byte,
    ValueWidth::Short,
    ValueWidth::Int,
    ValueWidth::Long,
];

/// Candidate widths for doubles, narrowest first.
const DOUBLE_WIDTHS: [ValueWidth; 5] = [
    ValueWidth::DoubleZero,
    ValueWidth::ByteForDouble,
    ValueWidth::ShortForDouble,
    ValueWidth::FloatForDouble,
    ValueWidth::Double,
];

//==================================================================================
// 2. Private Narrowing Helpers
//==================================================================================

fn narrow_int<N: NumCast>(v: i64) -> Option<N> {
    NumCast::from(v)
}

/// Narrows `v` into `N` only if widening back reproduces the exact bit pattern.
fn narrow_double<N: NumCast + ToPrimitive>(v: f64) -> Option<N> {
    let narrow: N = NumCast::from(v)?;
    let back = narrow.to_f64()?;
    (back.to_bits() == v.to_bits()).then_some(narrow)
}

//==================================================================================
// 3. Public API
//==================================================================================

impl ValueWidth {
    /// The narrowest width that holds `value` exactly.
    pub fn narrowest(value: &SampleValue) -> ValueWidth {
        let (candidates, widest) = match value {
            SampleValue::Integer(_) => (&INTEGER_WIDTHS, ValueWidth::Long),
            SampleValue::Double(_) => (&DOUBLE_WIDTHS, ValueWidth::Double),
        };
        candidates
            .iter()
            .copied()
            .find(|width| width.holds(value))
            .unwrap_or(widest)
    }

    /// Whether `value` survives a round trip through this width unchanged.
    pub fn holds(self, value: &SampleValue) -> bool {
        match (self, *value) {
            (ValueWidth::IntZero, SampleValue::Integer(v)) => v == 0,
            (ValueWidth::Byte, SampleValue::Integer(v)) => narrow_int::<i8>(v).is_some(),
            (ValueWidth::Short, SampleValue::Integer(v)) => narrow_int::<i16>(v).is_some(),
            (ValueWidth::Int, SampleValue::Integer(v)) => narrow_int::<i32>(v).is_some(),
            (ValueWidth::Long, SampleValue::Integer(_)) => true,
            (ValueWidth::DoubleZero, SampleValue::Double(v)) => v.to_bits() == 0,
            (ValueWidth::ByteForDouble, SampleValue::Double(v)) => {
                narrow_double::<i8>(v).is_some()
            }
            (ValueWidth::ShortForDouble, SampleValue::Double(v)) => {
                narrow_double::<i16>(v).is_some()
            }
            (ValueWidth::FloatForDouble, SampleValue::Double(v)) => {
                narrow_double::<f32>(v).is_some()
            }
            (ValueWidth::Double, SampleValue::Double(_)) => true,
            _ => false,
        }
    }

    /// The width-marker opcode that selects this width.
    pub fn opcode(self) -> Opcode {
        match self {
            ValueWidth::IntZero => Opcode::IntZero,
            ValueWidth::Byte => Opcode::Byte,
            ValueWidth::Short => Opcode::Short,
            ValueWidth::Int => Opcode::Int,
            ValueWidth::Long => Opcode::Long,
            ValueWidth::DoubleZero => Opcode::DoubleZero,
            ValueWidth::ByteForDouble => Opcode::ByteForDouble,
            ValueWidth::ShortForDouble => Opcode::ShortForDouble,
            ValueWidth::FloatForDouble => Opcode::FloatForDouble,
            ValueWidth::Double => Opcode::Double,
        }
    }

    /// Number of payload bytes a value occupies in this width.
    pub fn payload_len(self) -> usize {
        match self {
            ValueWidth::IntZero | ValueWidth::DoubleZero => 0,
            ValueWidth::Byte | ValueWidth::ByteForDouble => 1,
            ValueWidth::Short | ValueWidth::ShortForDouble => 2,
            ValueWidth::Int | ValueWidth::FloatForDouble => 4,
            ValueWidth::Long | ValueWidth::Double => 8,
        }
    }

    /// Appends `value`'s payload in this width. Fails with `PrecisionLoss` rather
    /// than writing an approximation.
    pub fn write(self, value: &SampleValue, out: &mut Vec<u8>) -> Result<()> {
        let loss = || {
            TimelineError::PrecisionLoss(format!(
                "{} cannot be written exactly as {}",
                value,
                self.opcode().name()
            ))
        };
        if !self.holds(value) {
            return Err(loss());
        }

        match (self, *value) {
            (ValueWidth::IntZero, _) | (ValueWidth::DoubleZero, _) => {}
            (ValueWidth::Byte, SampleValue::Integer(v)) => {
                let n = narrow_int::<i8>(v).ok_or_else(loss)?;
                out.extend_from_slice(&n.to_le_bytes());
            }
            (ValueWidth::Short, SampleValue::Integer(v)) => {
                let n = narrow_int::<i16>(v).ok_or_else(loss)?;
                out.extend_from_slice(&n.to_le_bytes());
            }
            (ValueWidth::Int, SampleValue::Integer(v)) => {
                let n = narrow_int::<i32>(v).ok_or_else(loss)?;
                out.extend_from_slice(&n.to_le_bytes());
            }
            (ValueWidth::Long, SampleValue::Integer(v)) => {
                out.extend_from_slice(&v.to_le_bytes());
            }
            (ValueWidth::ByteForDouble, SampleValue::Double(v)) => {
                let n = narrow_double::<i8>(v).ok_or_else(loss)?;
                out.extend_from_slice(&n.to_le_bytes());
            }
            (ValueWidth::ShortForDouble, SampleValue::Double(v)) => {
                let n = narrow_double::<i16>(v).ok_or_else(loss)?;
                out.extend_from_slice(&n.to_le_bytes());
            }
            (ValueWidth::FloatForDouble, SampleValue::Double(v)) => {
                let n = narrow_double::<f32>(v).ok_or_else(loss)?;
                out.extend_from_slice(&n.to_le_bytes());
            }
            (ValueWidth::Double, SampleValue::Double(v)) => {
                out.extend_from_slice(&v.to_le_bytes());
            }
            _ => return Err(loss()),
        }
        Ok(())
    }

    /// Reads one payload in this width.
    pub fn read(self, cursor: &mut ByteCursor<'_>) -> Result<SampleValue> {
        let value = match self {
            ValueWidth::IntZero => SampleValue::Integer(0),
            ValueWidth::Byte => SampleValue::Integer(i8::from_le_bytes(cursor.read_array()?).into()),
            ValueWidth::Short => {
                SampleValue::Integer(i16::from_le_bytes(cursor.read_array()?).into())
            }
            ValueWidth::Int => SampleValue::Integer(i32::from_le_bytes(cursor.read_array()?).into()),
            ValueWidth::Long => SampleValue::Integer(i64::from_le_bytes(cursor.read_array()?)),
            ValueWidth::DoubleZero => SampleValue::Double(0.0),
            ValueWidth::ByteForDouble => {
                SampleValue::Double(i8::from_le_bytes(cursor.read_array()?).into())
            }
            ValueWidth::ShortForDouble => {
                SampleValue::Double(i16::from_le_bytes(cursor.read_array()?).into())
            }
            ValueWidth::FloatForDouble => {
                SampleValue::Double(f32::from_le_bytes(cursor.read_array()?).into())
            }
            ValueWidth::Double => SampleValue::Double(f64::from_le_bytes(cursor.read_array()?)),
        };
        Ok(value)
    }
}

//==================================================================================
// 4. Unit Tests
//==================================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn write_then_read(width: ValueWidth, value: SampleValue) -> SampleValue {
        let mut buf = Vec::new();
        width.write(&value, &mut buf).unwrap();
        assert_eq!(buf.len(), width.payload_len());
        let mut cursor = ByteCursor::new(&buf);
        let decoded = width.read(&mut cursor).unwrap();
        assert!(cursor.is_exhausted());
        decoded
    }

    #[test]
    fn test_integer_narrowing_boundaries() {
        use crate::types::SampleValue::Integer;
        assert_eq!(ValueWidth::narrowest(&Integer(0)), ValueWidth::IntZero);
        assert_eq!(ValueWidth::narrowest(&Integer(127)), ValueWidth::Byte);
        assert_eq!(ValueWidth::narrowest(&Integer(-128)), ValueWidth::Byte);
        assert_eq!(ValueWidth::narrowest(&Integer(128)), ValueWidth::Short);
        assert_eq!(ValueWidth::narrowest(&Integer(-32_769)), ValueWidth::Int);
        assert_eq!(
            ValueWidth::narrowest(&Integer(2_147_483_648)),
            ValueWidth::Long
        );
    }

    #[test]
    fn test_double_narrowing_is_exact() {
        use crate::types::SampleValue::Double;
        assert_eq!(ValueWidth::narrowest(&Double(0.0)), ValueWidth::DoubleZero);
        // Negative zero must keep its sign bit, so it cannot use DoubleZero or an integer width.
        assert_eq!(ValueWidth::narrowest(&Double(-0.0)), ValueWidth::FloatForDouble);
        assert_eq!(ValueWidth::narrowest(&Double(12.0)), ValueWidth::ByteForDouble);
        assert_eq!(ValueWidth::narrowest(&Double(-300.0)), ValueWidth::ShortForDouble);
        assert_eq!(ValueWidth::narrowest(&Double(2.5)), ValueWidth::FloatForDouble);
        assert_eq!(ValueWidth::narrowest(&Double(0.1)), ValueWidth::Double);
        assert_eq!(ValueWidth::narrowest(&Double(1e300)), ValueWidth::Double);
    }

    #[test]
    fn test_payload_roundtrip_every_width() {
        let cases = [
            (ValueWidth::IntZero, SampleValue::Integer(0)),
            (ValueWidth::Byte, SampleValue::Integer(-7)),
            (ValueWidth::Short, SampleValue::Integer(30_000)),
            (ValueWidth::Int, SampleValue::Integer(-2_000_000_000)),
            (ValueWidth::Long, SampleValue::Integer(i64::MIN)),
            (ValueWidth::DoubleZero, SampleValue::Double(0.0)),
            (ValueWidth::ByteForDouble, SampleValue::Double(-100.0)),
            (ValueWidth::ShortForDouble, SampleValue::Double(1024.0)),
            (ValueWidth::FloatForDouble, SampleValue::Double(0.375)),
            (ValueWidth::Double, SampleValue::Double(std::f64::consts::PI)),
        ];
        for (width, value) in cases {
            assert_eq!(write_then_read(width, value), value, "width {:?}", width);
        }
    }

    #[test]
    fn test_forced_narrow_width_is_precision_loss() {
        let mut buf = Vec::new();
        let result = ValueWidth::Byte.write(&SampleValue::Integer(1_000), &mut buf);
        assert!(matches!(result, Err(TimelineError::PrecisionLoss(_))));

        let result = ValueWidth::FloatForDouble.write(&SampleValue::Double(0.1), &mut buf);
        assert!(matches!(result, Err(TimelineError::PrecisionLoss(_))));

        let result = ValueWidth::Long.write(&SampleValue::Double(1.0), &mut buf);
        assert!(matches!(result, Err(TimelineError::PrecisionLoss(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_nan_keeps_its_bits() {
        let nan = SampleValue::Double(f64::NAN);
        let width = ValueWidth::narrowest(&nan);
        assert_eq!(write_then_read(width, nan), nan);
    }

    #[test]
    fn test_truncated_payload_is_corrupt() {
        let mut cursor = ByteCursor::new(&[0x01, 0x02]);
        let result = ValueWidth::Int.read(&mut cursor);
        assert!(matches!(result, Err(TimelineError::CorruptStream { .. })));
    }
}
