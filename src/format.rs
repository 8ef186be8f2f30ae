// In: src/format.rs

//! Defines the byte-level grammar of an encoded sample stream.
//! This is the single source of truth for the opcode catalogue, the literal
//! delta threshold, and the format version stored beside every blob.
//!
//! A stream is a sequence of one-byte units. Every unit is classified by value
//! alone: below `MAX_DELTA_TIME` it is a literal time delta in seconds, at or
//! above it is a named control opcode (possibly followed by a fixed-size
//! payload). The partition is enforced while the static index table is built,
//! which happens at compile time.

use crate::kernels::width::ValueWidth;

//==================================================================================
// I. Format Constants
//==================================================================================

/// Units strictly below this value are literal deltas; named opcodes start here.
pub const MAX_DELTA_TIME: u8 = 0xF0;

/// The version of the stream format, stored beside each blob by the persistence layer.
pub const FORMAT_VERSION: u8 = 1;

/// Size of the absolute unix-seconds payload following `FullTime`.
pub const FULL_TIME_PAYLOAD_LEN: usize = 8;

/// The largest repeat count a single opcode can carry (`RepeatShort`, `RepeatDelta`).
pub const MAX_REPEAT_RUN: usize = u16::MAX as usize;

/// Size of the `RepeatDelta` unit: opcode, `u16` count, delta byte.
pub const REPEAT_DELTA_UNIT_LEN: usize = 4;

//==================================================================================
// II. The Opcode Table
//==================================================================================

/// A named control code. The discriminant is the on-wire opcode index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // --- Integer width markers ---
    /// The value is integer zero; no payload.
    IntZero = 0xF0,
    Byte = 0xF1,
    Short = 0xF2,
    Int = 0xF3,
    Long = 0xF4,

    // --- Double width markers ---
    /// The value is positive zero; no payload.
    DoubleZero = 0xF5,
    ByteForDouble = 0xF6,
    ShortForDouble = 0xF7,
    FloatForDouble = 0xF8,
    Double = 0xF9,

    // --- Repeat markers ---
    /// The next sample repeats the previous value.
    RepeatOne = 0xFA,
    /// The next `u8` samples repeat the previous value.
    RepeatByte = 0xFB,
    /// The next `u16` samples repeat the previous value.
    RepeatShort = 0xFC,

    // --- Timing & framing ---
    /// A `u16` count and a literal delta follow. The current sample and the
    /// next `count - 1` samples are each that delta after their predecessor;
    /// the following samples carry no time unit of their own.
    RepeatDelta = 0xFD,
    /// An absolute `i64` unix-seconds timestamp follows.
    FullTime = 0xFE,
    EndOfStream = 0xFF,
}

impl Opcode {
    /// Every named opcode, in index order.
    pub const ALL: [Opcode; 16] = [
        Opcode::IntZero,
        Opcode::Byte,
        Opcode::Short,
        Opcode::Int,
        Opcode::Long,
        Opcode::DoubleZero,
        Opcode::ByteForDouble,
        Opcode::ShortForDouble,
        Opcode::FloatForDouble,
        Opcode::Double,
        Opcode::RepeatOne,
        Opcode::RepeatByte,
        Opcode::RepeatShort,
        Opcode::RepeatDelta,
        Opcode::FullTime,
        Opcode::EndOfStream,
    ];

    /// The opcode's on-wire index.
    pub const fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Opcode> {
        OPCODE_BY_INDEX[index as usize]
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// The symbolic name of the opcode.
    pub const fn name(self) -> &'static str {
        match self {
            Opcode::IntZero => "INT_ZERO",
            Opcode::Byte => "BYTE",
            Opcode::Short => "SHORT",
            Opcode::Int => "INT",
            Opcode::Long => "LONG",
            Opcode::DoubleZero => "DOUBLE_ZERO",
            Opcode::ByteForDouble => "BYTE_FOR_DOUBLE",
            Opcode::ShortForDouble => "SHORT_FOR_DOUBLE",
            Opcode::FloatForDouble => "FLOAT_FOR_DOUBLE",
            Opcode::Double => "DOUBLE",
            Opcode::RepeatOne => "REPEAT_ONE",
            Opcode::RepeatByte => "REPEAT_BYTE",
            Opcode::RepeatShort => "REPEAT_SHORT",
            Opcode::RepeatDelta => "REPEAT_DELTA",
            Opcode::FullTime => "FULL_TIME",
            Opcode::EndOfStream => "END_OF_STREAM",
        }
    }

    /// The width mode a width-marker opcode switches to, or `None` for other opcodes.
    pub fn value_width(self) -> Option<ValueWidth> {
        match self {
            Opcode::IntZero => Some(ValueWidth::IntZero),
            Opcode::Byte => Some(ValueWidth::Byte),
            Opcode::Short => Some(ValueWidth::Short),
            Opcode::Int => Some(ValueWidth::Int),
            Opcode::Long => Some(ValueWidth::Long),
            Opcode::DoubleZero => Some(ValueWidth::DoubleZero),
            Opcode::ByteForDouble => Some(ValueWidth::ByteForDouble),
            Opcode::ShortForDouble => Some(ValueWidth::ShortForDouble),
            Opcode::FloatForDouble => Some(ValueWidth::FloatForDouble),
            Opcode::Double => Some(ValueWidth::Double),
            Opcode::RepeatOne
            | Opcode::RepeatByte
            | Opcode::RepeatShort
            | Opcode::RepeatDelta
            | Opcode::FullTime
            | Opcode::EndOfStream => None,
        }
    }

    pub fn is_width_marker(self) -> bool {
        self.value_width().is_some()
    }

    /// Whether this opcode repeats the previous *value*.
    pub fn is_repeat(self) -> bool {
        matches!(
            self,
            Opcode::RepeatOne | Opcode::RepeatByte | Opcode::RepeatShort
        )
    }

    /// Number of payload bytes that immediately follow the opcode itself.
    /// Width markers carry none: their payload follows the *next* time unit.
    pub fn inline_payload_len(self) -> usize {
        match self {
            Opcode::RepeatByte => 1,
            Opcode::RepeatShort => 2,
            Opcode::RepeatDelta => REPEAT_DELTA_UNIT_LEN - 1,
            Opcode::FullTime => FULL_TIME_PAYLOAD_LEN,
            _ => 0,
        }
    }
}

/// Index -> opcode lookup. Built in a const context, so a named opcode that
/// collides with the literal-delta range (or with another opcode) fails the build.
static OPCODE_BY_INDEX: [Option<Opcode>; 256] = build_index_table();

const fn build_index_table() -> [Option<Opcode>; 256] {
    let mut table: [Option<Opcode>; 256] = [None; 256];
    let mut i = 0;
    while i < Opcode::ALL.len() {
        let op = Opcode::ALL[i];
        let index = op.index();
        assert!(
            index >= MAX_DELTA_TIME,
            "opcode index falls inside the literal delta range"
        );
        assert!(table[index as usize].is_none(), "duplicate opcode index");
        table[index as usize] = Some(op);
        i += 1;
    }
    table
}

//==================================================================================
// III. Unit Classification
//==================================================================================

/// The interpretation of a single byte read at a unit boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    /// A literal time delta, in seconds.
    Delta(u8),
    Op(Opcode),
    /// An index at or above `MAX_DELTA_TIME` that no opcode claims.
    Unknown(u8),
}

impl Unit {
    pub fn classify(byte: u8) -> Unit {
        if byte < MAX_DELTA_TIME {
            return Unit::Delta(byte);
        }
        match Opcode::from_index(byte) {
            Some(op) => Unit::Op(op),
            None => Unit::Unknown(byte),
        }
    }
}
