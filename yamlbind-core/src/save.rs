//! Save engine.
//!
//! Mirrors the loader: a stack of open stream, document, mapping and sequence
//! frames, advanced one step at a time. Each step either emits a scalar,
//! opens a child frame or closes the top frame, and every frame emits its own
//! start event on push and its end event on pop.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::Level;
use yamlbind_types::{BitDef, Error, Field, Kind, Result, Schema, StrVal};

use crate::config::Config;
use crate::event::{CollectionStyle, Emitter, Event, ScalarStyle};
use crate::load::check_bitdefs;
use crate::memory::{Addr, Allocator, Memory, Ptr};
use crate::util;

/// Serialize `data` to a YAML string.
///
/// `seq_count` must be given exactly when the root schema is a variable
/// sequence.
pub fn save_data<A: Allocator + ?Sized>(
    config: &Config,
    alloc: &A,
    schema: &Schema,
    data: Ptr,
    seq_count: Option<u32>,
) -> Result<String> {
    let out = save(config, alloc, schema, data, seq_count, Vec::new())?;
    String::from_utf8(out).map_err(|_| Error::Internal)
}

/// Serialize `data` into the file at `path`, replacing its contents.
pub fn save_file<A: Allocator + ?Sized>(
    path: impl AsRef<Path>,
    config: &Config,
    alloc: &A,
    schema: &Schema,
    data: Ptr,
    seq_count: Option<u32>,
) -> Result<()> {
    check_params(config, schema, data, seq_count)?;
    let path = path.as_ref();
    let file = File::create(path).map_err(|err| {
        log_at!(
            config.log_level,
            Level::Error,
            "Failed to create {}: {}",
            path.display(),
            err
        );
        Error::FileOpen
    })?;
    let mut writer = save(config, alloc, schema, data, seq_count, BufWriter::new(file))?;
    writer.flush().map_err(|err| {
        log_at!(config.log_level, Level::Error, "Failed to write {}: {}", path.display(), err);
        Error::Emitter
    })
}

fn save<A: Allocator + ?Sized, W: Write>(
    config: &Config,
    alloc: &A,
    schema: &Schema,
    data: Ptr,
    seq_count: Option<u32>,
    out: W,
) -> Result<W> {
    check_params(config, schema, data, seq_count)?;

    let mut saver = Saver {
        config,
        alloc,
        schema,
        root: data,
        seq_count: seq_count.unwrap_or(0),
        emitter: Emitter::new(out).with_log_level(config.log_level),
        stack: Vec::new(),
    };
    saver.stack.push(Frame::Start);

    match saver.run() {
        Ok(()) => Ok(saver.emitter.into_inner()),
        Err(err) => {
            log_at!(config.log_level, Level::Error, "Save failed: {}", err);
            saver.backtrace();
            Err(err)
        }
    }
}

fn check_params(config: &Config, schema: &Schema, data: Ptr, seq_count: Option<u32>) -> Result<()> {
    let level = config.log_level;
    let variable = matches!(schema.kind, Kind::Sequence { .. });
    if variable != seq_count.is_some() {
        log_at!(
            level,
            Level::Error,
            "Sequence count {} for top level {} value",
            if variable { "missing" } else { "given" },
            schema.kind.name()
        );
        return Err(Error::BadParamSeqCount);
    }
    if !schema.is_pointer() {
        log_at!(
            level,
            Level::Error,
            "Top level {} schema is not a pointer",
            schema.kind.name()
        );
        return Err(Error::TopLevelNonPtr);
    }
    if data.is_null() {
        log_at!(level, Level::Error, "No data to save");
        return Err(Error::BadParamNullData);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    InStream,
    InDoc,
    InMapKey,
    InSequence,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Start => "START",
            State::InStream => "IN_STREAM",
            State::InDoc => "IN_DOC",
            State::InMapKey => "IN_MAP_KEY",
            State::InSequence => "IN_SEQUENCE",
        };
        f.write_str(name)
    }
}

/// Where a value's bytes, or the pointer to them, are read from.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Root,
    At(Addr),
}

enum Frame<'s> {
    Start,
    Stream {
        done: bool,
    },
    Document {
        done: bool,
    },
    Mapping {
        fields: &'s [Field],
        base: Addr,
        /// Next field to consider.
        next: usize,
        /// Field being written, for backtraces.
        current: Option<usize>,
    },
    Sequence {
        entry: &'s Schema,
        /// Start of the entries; `None` for an empty null sequence.
        data: Option<Addr>,
        next: u32,
        count: u32,
    },
}

impl Frame<'_> {
    fn state(&self) -> State {
        match self {
            Frame::Start => State::Start,
            Frame::Stream { .. } => State::InStream,
            Frame::Document { .. } => State::InDoc,
            Frame::Mapping { .. } => State::InMapKey,
            Frame::Sequence { .. } => State::InSequence,
        }
    }
}

struct Saver<'m, A: ?Sized, W: Write> {
    config: &'m Config,
    alloc: &'m A,
    schema: &'m Schema,
    root: Ptr,
    seq_count: u32,
    emitter: Emitter<W>,
    stack: Vec<Frame<'m>>,
}

impl<'m, A: Allocator + ?Sized, W: Write> Saver<'m, A, W> {
    fn run(&mut self) -> Result<()> {
        self.push(Frame::Stream { done: false }, Event::StreamStart)?;
        while self.stack.len() > 1 {
            self.step()?;
        }
        Ok(())
    }

    fn push(&mut self, frame: Frame<'m>, start: Event) -> Result<()> {
        log_at!(
            self.config.log_level,
            Level::Debug,
            "PUSH[{}]: {}",
            self.stack.len(),
            frame.state()
        );
        self.emit(start)?;
        self.stack.push(frame);
        Ok(())
    }

    fn pop(&mut self) -> Result<()> {
        let Some(frame) = self.stack.pop() else {
            return Err(Error::Internal);
        };
        log_at!(
            self.config.log_level,
            Level::Debug,
            "POP[{}]: {}",
            self.stack.len(),
            frame.state()
        );
        let end = match frame {
            Frame::Start => return Ok(()),
            Frame::Stream { .. } => Event::StreamEnd,
            Frame::Document { .. } => Event::DocumentEnd {
                explicit: self.config.flags.document_delimiters,
            },
            Frame::Mapping { .. } => Event::MappingEnd,
            Frame::Sequence { .. } => Event::SequenceEnd,
        };
        self.emit(end)
    }

    fn emit(&mut self, event: Event) -> Result<()> {
        self.emitter.emit(event)
    }

    fn backtrace(&self) {
        if self.stack.len() <= 1 {
            return;
        }
        let level = self.config.log_level;
        log_at!(level, Level::Error, "Backtrace:");
        for frame in self.stack.iter().skip(1).rev() {
            match frame {
                Frame::Mapping {
                    fields,
                    current: Some(index),
                    ..
                } => log_at!(level, Level::Error, "  in mapping field: {}", fields[*index].key),
                Frame::Mapping { .. } => log_at!(level, Level::Error, "  in mapping:"),
                Frame::Sequence { next, .. } => log_at!(
                    level,
                    Level::Error,
                    "  in sequence entry: {}",
                    next.saturating_sub(1)
                ),
                _ => {}
            }
        }
    }

    fn step(&mut self) -> Result<()> {
        let level = self.config.log_level;
        let Some(top) = self.stack.last_mut() else {
            return Err(Error::Internal);
        };
        log_at!(level, Level::Trace, "Save state {}", top.state());
        match top {
            Frame::Start => Err(Error::Internal),
            Frame::Stream { done: true } | Frame::Document { done: true } => self.pop(),
            Frame::Stream { done } => {
                *done = true;
                let start = Event::DocumentStart {
                    explicit: self.config.flags.document_delimiters,
                };
                self.push(Frame::Document { done: false }, start)
            }
            Frame::Document { done } => {
                *done = true;
                let schema = self.schema;
                let count = match &schema.kind {
                    Kind::SequenceFixed { max, .. } => *max,
                    _ => self.seq_count,
                };
                self.write_value(schema, Slot::Root, count)
            }
            Frame::Mapping {
                fields,
                base,
                next,
                current,
            } => {
                let fields: &'m [Field] = *fields;
                let base = *base;
                let Some(field) = fields.get(*next) else {
                    return self.pop();
                };
                *current = Some(*next);
                *next += 1;
                self.write_field(field, base)
            }
            Frame::Sequence {
                entry,
                data,
                next,
                count,
            } => {
                if *next >= *count {
                    return self.pop();
                }
                let entry: &'m Schema = *entry;
                let Some(data) = *data else {
                    return Err(Error::Internal);
                };
                let at = data.add(entry.footprint() as usize * *next as usize);
                *next += 1;
                let entry_count = match &entry.kind {
                    Kind::SequenceFixed { max, .. } => *max,
                    Kind::Sequence { .. } => {
                        log_at!(level, Level::Error, "Variable sequence inside a sequence");
                        return Err(Error::SequenceInSequence);
                    }
                    _ => 0,
                };
                self.write_value(entry, Slot::At(at), entry_count)
            }
        }
    }

    fn write_field(&mut self, field: &'m Field, base: Addr) -> Result<()> {
        let level = self.config.log_level;
        let schema = &field.value;
        let at = base.add(field.offset as usize);
        if matches!(schema.kind, Kind::Ignore) {
            return Ok(());
        }
        if field.is_optional() && schema.is_pointer() && self.alloc.read_ptr(at)?.is_null() {
            log_at!(level, Level::Debug, "Skipping absent optional field: {}", field.key);
            return Ok(());
        }

        let count = match &schema.kind {
            Kind::Sequence { .. } => {
                let Some(count) = field.count else {
                    log_at!(
                        level,
                        Level::Error,
                        "Sequence field '{}' has no count field",
                        field.key
                    );
                    return Err(Error::BadTypeInSchema);
                };
                let raw = self
                    .alloc
                    .read_uint(base.add(count.offset as usize), u32::from(count.size))?;
                u32::try_from(raw).map_err(|_| {
                    log_at!(level, Level::Error, "Sequence count {} is out of range", raw);
                    Error::SequenceEntriesMax
                })?
            }
            Kind::SequenceFixed { max, .. } => *max,
            _ => 0,
        };

        log_at!(level, Level::Info, "[{}]", field.key);
        self.emit(Event::scalar(field.key.as_str(), ScalarStyle::Plain))?;
        self.write_value(schema, Slot::At(at), count)
    }

    /// Emit one value, opening a frame for sequences and mappings.
    fn write_value(&mut self, schema: &'m Schema, slot: Slot, count: u32) -> Result<()> {
        let level = self.config.log_level;
        log_at!(
            level,
            Level::Debug,
            "Writing value of type '{}'{}",
            schema.kind.name(),
            if schema.is_pointer() { " (pointer)" } else { "" }
        );

        let Some(data) = self.resolve(schema, slot)? else {
            return self.write_null(schema, count);
        };

        match &schema.kind {
            Kind::Mapping { fields } => self.push(
                Frame::Mapping {
                    fields,
                    base: data,
                    next: 0,
                    current: None,
                },
                Event::MappingStart {
                    anchor: None,
                    style: self.style(schema),
                },
            ),
            Kind::Sequence { entry, min, max } | Kind::SequenceFixed { entry, min, max } => {
                let fixed = matches!(schema.kind, Kind::SequenceFixed { .. });
                self.check_count(fixed, *min, *max, count)?;
                self.push_sequence(schema, entry, Some(data), count)
            }
            Kind::Flags { values } => self.write_flags(schema, values, data),
            Kind::Bitfield { bits } => self.write_bitfield(schema, bits, data),
            Kind::Ignore => Ok(()),
            _ => self.write_scalar(schema, data),
        }
    }

    /// Address of the value, or `None` when its pointer is null.
    fn resolve(&self, schema: &Schema, slot: Slot) -> Result<Option<Addr>> {
        if !schema.is_pointer() {
            return match slot {
                Slot::At(addr) => Ok(Some(addr)),
                Slot::Root => Err(Error::TopLevelNonPtr),
            };
        }
        let ptr = match slot {
            Slot::Root => self.root,
            Slot::At(addr) => self.alloc.read_ptr(addr)?,
        };
        Ok((!ptr.is_null()).then(|| Addr::new(ptr)))
    }

    fn write_null(&mut self, schema: &'m Schema, count: u32) -> Result<()> {
        let level = self.config.log_level;
        if schema.flags.allow_null {
            log_at!(level, Level::Info, "  <null>");
            return self.emitter.emit_null();
        }
        if let Kind::Sequence { entry, min, .. } = &schema.kind {
            if count == 0 && *min == 0 {
                return self.push_sequence(schema, entry, None, 0);
            }
        }
        log_at!(
            level,
            Level::Error,
            "Null pointer for non-nullable {} value",
            schema.kind.name()
        );
        Err(Error::InvalidValue)
    }

    fn check_count(&self, fixed: bool, min: u32, max: u32, count: u32) -> Result<()> {
        let level = self.config.log_level;
        if fixed && min != max {
            log_at!(
                level,
                Level::Error,
                "Fixed sequence count mismatch ({} min, {} max)",
                min,
                max
            );
            return Err(Error::SequenceFixedCount);
        }
        if min > max {
            log_at!(level, Level::Error, "Sequence min {} exceeds max {}", min, max);
            return Err(Error::BadMinMaxSchema);
        }
        if count < min {
            log_at!(
                level,
                Level::Error,
                "Insufficient entries ({} of {} min) in sequence.",
                count,
                min
            );
            return Err(Error::SequenceEntriesMin);
        }
        if count > max {
            log_at!(level, Level::Error, "Excessive entries ({} max) in sequence.", max);
            return Err(Error::SequenceEntriesMax);
        }
        Ok(())
    }

    fn push_sequence(
        &mut self,
        schema: &'m Schema,
        entry: &'m Schema,
        data: Option<Addr>,
        count: u32,
    ) -> Result<()> {
        log_at!(self.config.log_level, Level::Debug, "Sequence count: {}", count);
        self.push(
            Frame::Sequence {
                entry,
                data,
                next: 0,
                count,
            },
            Event::SequenceStart {
                anchor: None,
                style: self.style(schema),
            },
        )
    }

    /// Value flags win over config flags, and block wins over flow.
    fn style(&self, schema: &Schema) -> CollectionStyle {
        let flags = &self.config.flags;
        if schema.flags.block {
            CollectionStyle::Block
        } else if schema.flags.flow {
            CollectionStyle::Flow
        } else if flags.style_block {
            CollectionStyle::Block
        } else if flags.style_flow {
            CollectionStyle::Flow
        } else {
            CollectionStyle::Any
        }
    }

    fn write_scalar(&mut self, schema: &Schema, data: Addr) -> Result<()> {
        let level = self.config.log_level;
        let size = schema.data_size;
        let text = match &schema.kind {
            Kind::Int => self.alloc.read_int(data, size)?.to_string(),
            Kind::Uint => self.alloc.read_uint(data, size)?.to_string(),
            Kind::Bool => {
                let text = if self.alloc.read_uint(data, size)? != 0 {
                    "true"
                } else {
                    "false"
                };
                text.to_string()
            }
            Kind::Enum { values } => {
                // stored values are truncated to the field width on load
                let raw = self.alloc.read_uint(data, size)?;
                let mask = util::unsigned_max(size);
                match values.iter().find(|entry| (entry.value as u64) & mask == raw) {
                    Some(entry) => entry.name.clone(),
                    None if schema.flags.strict => {
                        log_at!(level, Level::Error, "Invalid enumeration value: {}", raw);
                        return Err(Error::InvalidValue);
                    }
                    None => {
                        let value = self.alloc.read_int(data, size)?;
                        log_at!(level, Level::Debug, "Enumeration value {} has no name", value);
                        value.to_string()
                    }
                }
            }
            Kind::Float => match size {
                4 => util::format_f32(self.alloc.read_f32(data)?),
                8 => util::format_f64(self.alloc.read_f64(data)?),
                _ => return Err(Error::InvalidDataSize),
            },
            Kind::String { .. } => self.read_string(schema, data)?.to_string(),
            _ => return Err(Error::BadTypeInSchema),
        };
        log_at!(level, Level::Info, "  <{}>", text);
        self.emit(Event::scalar(text, ScalarStyle::Plain))
    }

    /// Inline strings must terminate within their capacity.
    fn read_string(&self, schema: &Schema, data: Addr) -> Result<&str> {
        if schema.is_pointer() {
            return self.alloc.read_str(data);
        }
        let bytes = self.alloc.bytes(data, schema.data_size as usize)?;
        let Some(len) = bytes.iter().position(|&b| b == 0) else {
            log_at!(
                self.config.log_level,
                Level::Error,
                "Unterminated string in {} byte buffer",
                schema.data_size
            );
            return Err(Error::InvalidValue);
        };
        std::str::from_utf8(&bytes[..len]).map_err(|_| Error::InvalidValue)
    }

    fn write_flags(&mut self, schema: &Schema, values: &[StrVal], data: Addr) -> Result<()> {
        let level = self.config.log_level;
        let mut bits = self.alloc.read_uint(data, schema.data_size)?;
        log_at!(level, Level::Info, "  <Flags: 0x{:x}>", bits);

        self.emit(Event::SequenceStart {
            anchor: None,
            style: self.style(schema),
        })?;
        for entry in values {
            let flag = entry.value as u64;
            if flag != 0 && bits & flag == flag {
                bits &= !flag;
                self.emit(Event::scalar(entry.name.as_str(), ScalarStyle::Plain))?;
            }
        }
        if bits != 0 {
            if schema.flags.strict {
                log_at!(level, Level::Error, "Unknown flag bits: 0x{:x}", bits);
                return Err(Error::InvalidValue);
            }
            self.emit(Event::scalar(bits.to_string(), ScalarStyle::Plain))?;
        }
        self.emit(Event::SequenceEnd)
    }

    fn write_bitfield(&mut self, schema: &Schema, defs: &[BitDef], data: Addr) -> Result<()> {
        let size = schema.data_size;
        check_bitdefs(self.config, defs, size)?;
        let bits = self.alloc.read_uint(data, size)?;
        log_at!(self.config.log_level, Level::Info, "  <Bits: 0x{:x}>", bits);

        self.emit(Event::MappingStart {
            anchor: None,
            style: self.style(schema),
        })?;
        for def in defs {
            let value = bits.checked_shr(u32::from(def.offset)).unwrap_or(0) & def.mask();
            if value == 0 {
                continue;
            }
            self.emit(Event::scalar(def.name.as_str(), ScalarStyle::Plain))?;
            self.emit(Event::scalar(format!("0x{:x}", value), ScalarStyle::Plain))?;
        }
        self.emit(Event::MappingEnd)
    }
}
