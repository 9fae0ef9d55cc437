//! Schema model.
//!
//! A schema node describes one value: what kind it is, where its bytes live,
//! and how it is spelled in YAML. Mappings are ordered lists of [`Field`]s;
//! sequences carry the schema of their entries. Schemas are built once and
//! only ever read by the engine.

use serde::{Deserialize, Serialize};

use crate::{POINTER_SIZE, UNLIMITED};

/// Behavior flags attached to a schema value.
///
/// When both `case_sensitive` and `case_insensitive` are set, insensitive
/// wins. When both `block` and `flow` are set, block wins.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Flags {
    /// Mapping field may be absent.
    pub optional: bool,
    /// Value lives in its own allocation; the parent stores the handle.
    pub pointer: bool,
    /// Enum and flags values must match a table entry.
    pub strict: bool,
    /// Emit collections in block style.
    pub block: bool,
    /// Emit collections in flow style.
    pub flow: bool,
    pub case_sensitive: bool,
    pub case_insensitive: bool,
    /// Pointer value may be the YAML null token.
    pub allow_null: bool,
}

/// A named value in an enum or flags table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrVal {
    pub name: String,
    pub value: i64,
}

impl StrVal {
    pub fn new(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// A named bit range inside a bitfield value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitDef {
    pub name: String,
    pub offset: u8,
    pub bits: u8,
}

impl BitDef {
    pub fn new(name: impl Into<String>, offset: u8, bits: u8) -> Self {
        Self {
            name: name.into(),
            offset,
            bits,
        }
    }

    /// Mask of the range after shifting down to bit 0.
    pub fn mask(&self) -> u64 {
        if self.bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.bits) - 1
        }
    }
}

/// Kind of value with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Kind {
    Int,
    Uint,
    Bool,
    Float,
    Enum {
        values: Vec<StrVal>,
    },
    Flags {
        values: Vec<StrVal>,
    },
    /// Lengths exclude the terminating NUL.
    String {
        #[serde(default)]
        min: u32,
        #[serde(default = "unlimited")]
        max: u32,
    },
    Mapping {
        fields: Vec<Field>,
    },
    Bitfield {
        bits: Vec<BitDef>,
    },
    Sequence {
        entry: Box<Schema>,
        #[serde(default)]
        min: u32,
        #[serde(default = "unlimited")]
        max: u32,
    },
    /// `min` must equal `max`; a mismatch is rejected at load.
    SequenceFixed {
        entry: Box<Schema>,
        min: u32,
        max: u32,
    },
    Ignore,
}

fn unlimited() -> u32 {
    UNLIMITED
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Int => "int",
            Kind::Uint => "uint",
            Kind::Bool => "bool",
            Kind::Float => "float",
            Kind::Enum { .. } => "enum",
            Kind::Flags { .. } => "flags",
            Kind::String { .. } => "string",
            Kind::Mapping { .. } => "mapping",
            Kind::Bitfield { .. } => "bitfield",
            Kind::Sequence { .. } => "sequence",
            Kind::SequenceFixed { .. } => "sequence_fixed",
            Kind::Ignore => "ignore",
        }
    }
}

/// One schema node.
///
/// `data_size` is the width of a scalar, the size of a mapping's structure or
/// the capacity of an inline string. Sequences take their entry stride from
/// the entry schema; builders also record it in `data_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(flatten)]
    pub kind: Kind,
    #[serde(default)]
    pub flags: Flags,
    #[serde(default)]
    pub data_size: u32,
}

impl Schema {
    pub fn new(kind: Kind, data_size: u32) -> Self {
        Self {
            kind,
            flags: Flags::default(),
            data_size,
        }
    }

    pub fn int(size: u32) -> Self {
        Self::new(Kind::Int, size)
    }

    pub fn uint(size: u32) -> Self {
        Self::new(Kind::Uint, size)
    }

    pub fn boolean(size: u32) -> Self {
        Self::new(Kind::Bool, size)
    }

    pub fn float(size: u32) -> Self {
        Self::new(Kind::Float, size)
    }

    /// String stored in its own allocation.
    pub fn string(min: u32, max: u32) -> Self {
        Self::new(Kind::String { min, max }, 1).pointer()
    }

    /// String stored inline in a `capacity` byte array, terminator included.
    pub fn string_inline(min: u32, capacity: u32) -> Self {
        Self::new(
            Kind::String {
                min,
                max: capacity.saturating_sub(1),
            },
            capacity,
        )
    }

    pub fn enumeration<S: Into<String>>(
        size: u32,
        values: impl IntoIterator<Item = (S, i64)>,
    ) -> Self {
        let values = values
            .into_iter()
            .map(|(name, value)| StrVal::new(name, value))
            .collect();
        Self::new(Kind::Enum { values }, size)
    }

    pub fn flags<S: Into<String>>(size: u32, values: impl IntoIterator<Item = (S, i64)>) -> Self {
        let values = values
            .into_iter()
            .map(|(name, value)| StrVal::new(name, value))
            .collect();
        Self::new(Kind::Flags { values }, size)
    }

    /// Bit ranges given as `(name, offset, bits)`.
    pub fn bitfield<S: Into<String>>(
        size: u32,
        bits: impl IntoIterator<Item = (S, u8, u8)>,
    ) -> Self {
        let bits = bits
            .into_iter()
            .map(|(name, offset, bits)| BitDef::new(name, offset, bits))
            .collect();
        Self::new(Kind::Bitfield { bits }, size)
    }

    pub fn mapping(size: u32, fields: Vec<Field>) -> Self {
        Self::new(Kind::Mapping { fields }, size)
    }

    /// Variable-length sequence. The entry stride is derived from `entry`.
    pub fn sequence(entry: Schema, min: u32, max: u32) -> Self {
        let stride = entry.footprint();
        Self::new(
            Kind::Sequence {
                entry: Box::new(entry),
                min,
                max,
            },
            stride,
        )
    }

    pub fn sequence_fixed(entry: Schema, count: u32) -> Self {
        let stride = entry.footprint();
        Self::new(
            Kind::SequenceFixed {
                entry: Box::new(entry),
                min: count,
                max: count,
            },
            stride,
        )
    }

    pub fn ignore() -> Self {
        Self::new(Kind::Ignore, 0)
    }

    pub fn pointer(mut self) -> Self {
        self.flags.pointer = true;
        self
    }

    /// Store the value inline in the parent.
    pub fn inline(mut self) -> Self {
        self.flags.pointer = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.flags.optional = true;
        self
    }

    pub fn strict(mut self) -> Self {
        self.flags.strict = true;
        self
    }

    pub fn block(mut self) -> Self {
        self.flags.block = true;
        self
    }

    pub fn flow(mut self) -> Self {
        self.flags.flow = true;
        self
    }

    pub fn case_sensitive(mut self) -> Self {
        self.flags.case_sensitive = true;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.flags.case_insensitive = true;
        self
    }

    pub fn allow_null(mut self) -> Self {
        self.flags.allow_null = true;
        self
    }

    pub fn is_pointer(&self) -> bool {
        self.flags.pointer
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self.kind, Kind::Sequence { .. } | Kind::SequenceFixed { .. })
    }

    /// Distance between sequence entries; `data_size` for other kinds.
    pub fn stride(&self) -> u32 {
        match &self.kind {
            Kind::Sequence { entry, .. } | Kind::SequenceFixed { entry, .. } => entry.footprint(),
            _ => self.data_size,
        }
    }

    /// Bytes the value occupies inside its parent.
    pub fn footprint(&self) -> u32 {
        if self.flags.pointer {
            return POINTER_SIZE;
        }
        match &self.kind {
            Kind::Sequence { max, .. } | Kind::SequenceFixed { max, .. } => {
                self.stride().saturating_mul(*max)
            }
            _ => self.data_size,
        }
    }
}

/// Location of a variable sequence's entry count in the parent structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountField {
    pub offset: u32,
    pub size: u8,
}

/// One mapping entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    /// Byte offset of the value inside the mapping's structure.
    #[serde(default)]
    pub offset: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<CountField>,
    pub value: Schema,
}

impl Field {
    pub fn new(key: impl Into<String>, offset: u32, value: Schema) -> Self {
        Self {
            key: key.into(),
            offset,
            count: None,
            value,
        }
    }

    /// Variable sequence field with its companion count.
    pub fn sequence(
        key: impl Into<String>,
        offset: u32,
        count_offset: u32,
        count_size: u8,
        value: Schema,
    ) -> Self {
        Self {
            key: key.into(),
            offset,
            count: Some(CountField {
                offset: count_offset,
                size: count_size,
            }),
            value,
        }
    }

    /// Key that is accepted and discarded on load, never written on save.
    pub fn ignore(key: impl Into<String>) -> Self {
        Self::new(key, 0, Schema::ignore().optional())
    }

    pub fn is_optional(&self) -> bool {
        self.value.flags.optional
    }
}
