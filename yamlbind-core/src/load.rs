//! Load engine.
//!
//! An explicit stack machine driven by one event at a time. Each frame is a
//! stream, document, mapping or sequence currently open; the top frame's
//! state and the event kind select the handler. Values land in blocks taken
//! from the caller's allocator, and pointer values are linked into their
//! parent as soon as they are allocated so that a failed load can be released
//! with [`free`](crate::free()) like a complete one.

use std::fmt;
use std::path::Path;

use log::Level;
use yamlbind_types::{BitDef, Error, Field, Kind, Result, Schema, StrVal};

use crate::anchor::EventStream;
use crate::config::Config;
use crate::event::{Event, EventKind, Reader};
use crate::free::free;
use crate::memory::{Addr, Allocator, Memory, Ptr};
use crate::util;

/// A successfully loaded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Loaded {
    /// Root block, owned by the caller until passed to [`free`](crate::free()).
    pub data: Ptr,
    /// Entry count when the root schema is a variable sequence.
    pub seq_count: Option<u32>,
}

/// Load a YAML document from memory.
pub fn load_data<A: Allocator + ?Sized>(
    input: &[u8],
    config: &Config,
    alloc: &mut A,
    schema: &Schema,
) -> Result<Loaded> {
    check_root(config, schema)?;
    let text = std::str::from_utf8(input).map_err(|err| {
        log_at!(config.log_level, Level::Error, "Input is not UTF-8: {}", err);
        Error::Parser
    })?;

    let mut loader = Loader {
        config,
        alloc,
        schema,
        events: EventStream::new(Reader::new(text), config),
        stack: Vec::new(),
        root: Ptr::NULL,
        seq_count: 0,
    };
    loader.push(Frame::Start);

    match loader.run() {
        Ok(()) => Ok(loader.finish()),
        Err(err) => {
            log_at!(config.log_level, Level::Error, "Load failed: {}", err);
            loader.backtrace();
            let seq_count = loader.root_seq_count();
            free(config, &mut *loader.alloc, schema, loader.root, seq_count);
            Err(err)
        }
    }
}

/// Load a YAML document from a file.
pub fn load_file<A: Allocator + ?Sized>(
    path: impl AsRef<Path>,
    config: &Config,
    alloc: &mut A,
    schema: &Schema,
) -> Result<Loaded> {
    let path = path.as_ref();
    let input = std::fs::read(path).map_err(|err| {
        log_at!(
            config.log_level,
            Level::Error,
            "Failed to read {}: {}",
            path.display(),
            err
        );
        Error::FileOpen
    })?;
    load_data(&input, config, alloc, schema)
}

fn check_root(config: &Config, schema: &Schema) -> Result<()> {
    if !schema.is_pointer() {
        log_at!(
            config.log_level,
            Level::Error,
            "Top level {} schema is not a pointer",
            schema.kind.name()
        );
        return Err(Error::TopLevelNonPtr);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    InStream,
    InDoc,
    InMapKey,
    InMapValue,
    InSequence,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Start => "START",
            State::InStream => "IN_STREAM",
            State::InDoc => "IN_DOC",
            State::InMapKey => "IN_MAP_KEY",
            State::InMapValue => "IN_MAP_VALUE",
            State::InSequence => "IN_SEQUENCE",
        };
        f.write_str(name)
    }
}

/// Where a value's bytes, or the pointer to them, are written.
#[derive(Debug, Clone, Copy)]
enum Place {
    /// The document root, returned to the caller.
    Root,
    At(Addr),
}

/// Where a variable sequence keeps its live entry count.
#[derive(Debug, Clone, Copy)]
enum CountTarget {
    Root,
    /// Count field address and width.
    At(Addr, u32),
}

struct MappingFrame<'s> {
    schema: &'s Schema,
    fields: &'s [Field],
    base: Addr,
    /// One bit per field, set once its key has been read.
    seen: Vec<u64>,
    field: Option<usize>,
    expect_value: bool,
}

impl MappingFrame<'_> {
    fn is_seen(&self, index: usize) -> bool {
        self.seen[index / 64] & (1 << (index % 64)) != 0
    }

    fn mark_seen(&mut self, index: usize) {
        self.seen[index / 64] |= 1 << (index % 64);
    }
}

struct SequenceFrame<'s> {
    schema: &'s Schema,
    entry: &'s Schema,
    min: u32,
    max: u32,
    fixed: bool,
    /// Holder of the backing block's pointer, for pointer sequences.
    place: Place,
    /// Start of the entries, once known.
    data: Option<Addr>,
    count: u32,
    count_to: Option<CountTarget>,
}

enum Frame<'s> {
    Start,
    Stream { doc_count: u32 },
    Document,
    Mapping(MappingFrame<'s>),
    Sequence(SequenceFrame<'s>),
}

impl Frame<'_> {
    fn state(&self) -> State {
        match self {
            Frame::Start => State::Start,
            Frame::Stream { .. } => State::InStream,
            Frame::Document => State::InDoc,
            Frame::Mapping(map) if map.expect_value => State::InMapValue,
            Frame::Mapping(_) => State::InMapKey,
            Frame::Sequence(_) => State::InSequence,
        }
    }
}

struct Loader<'m, 't, A: ?Sized> {
    config: &'m Config,
    alloc: &'m mut A,
    schema: &'m Schema,
    events: EventStream<'t>,
    stack: Vec<Frame<'m>>,
    root: Ptr,
    seq_count: u32,
}

impl<'m, A: Allocator + ?Sized> Loader<'m, '_, A> {
    fn run(&mut self) -> Result<()> {
        loop {
            let event = self.events.next_event()?;
            self.handle(event)?;
            if self.state() == State::Start {
                return Ok(());
            }
        }
    }

    fn finish(mut self) -> Loaded {
        self.pop();
        Loaded {
            data: self.root,
            seq_count: self.root_seq_count(),
        }
    }

    fn root_seq_count(&self) -> Option<u32> {
        matches!(self.schema.kind, Kind::Sequence { .. }).then_some(self.seq_count)
    }

    fn state(&self) -> State {
        self.stack.last().map_or(State::Start, Frame::state)
    }

    fn push(&mut self, frame: Frame<'m>) {
        log_at!(
            self.config.log_level,
            Level::Debug,
            "PUSH[{}]: {}",
            self.stack.len(),
            frame.state()
        );
        self.stack.push(frame);
    }

    fn pop(&mut self) {
        if let Some(frame) = self.stack.pop() {
            log_at!(
                self.config.log_level,
                Level::Debug,
                "POP[{}]: {}",
                self.stack.len(),
                frame.state()
            );
        }
    }

    fn backtrace(&self) {
        if self.stack.len() <= 1 {
            return;
        }
        let level = self.config.log_level;
        log_at!(level, Level::Error, "Backtrace:");
        for frame in self.stack.iter().skip(1).rev() {
            match frame {
                Frame::Mapping(map) => match map.field {
                    Some(index) => {
                        log_at!(level, Level::Error, "  in mapping field: {}", map.fields[index].key)
                    }
                    None => log_at!(level, Level::Error, "  in mapping:"),
                },
                Frame::Sequence(seq) => {
                    log_at!(level, Level::Error, "  in sequence entry: {}", seq.count)
                }
                _ => {}
            }
        }
    }

    fn handle(&mut self, event: Event) -> Result<()> {
        use EventKind as E;

        let state = self.state();
        let kind = event.kind();
        log_at!(
            self.config.log_level,
            Level::Debug,
            "Handle state {} event {}",
            state,
            kind
        );
        match (state, kind) {
            (State::Start, E::StreamStart) => {
                self.push(Frame::Stream { doc_count: 0 });
                Ok(())
            }
            (State::InStream, E::DocumentStart) => self.doc_start(),
            (State::InStream, E::StreamEnd) | (State::InDoc, E::DocumentEnd) => {
                self.pop();
                Ok(())
            }
            (State::InDoc, E::Scalar | E::SequenceStart | E::MappingStart) => {
                let schema = self.schema;
                self.read_value(schema, Place::Root, event)
            }
            (State::InMapKey, E::Scalar) => self.map_key(event),
            (State::InMapKey, E::MappingEnd) => self.map_end(),
            (State::InMapValue, E::Scalar | E::SequenceStart | E::MappingStart) => {
                self.map_value(event)
            }
            (State::InSequence, E::Scalar | E::SequenceStart | E::MappingStart) => {
                self.seq_entry(event)
            }
            (State::InSequence, E::SequenceEnd) => self.seq_end(),
            (state, kind) => {
                log_at!(
                    self.config.log_level,
                    Level::Error,
                    "Unexpected event {} in state {}",
                    kind,
                    state
                );
                Err(Error::UnexpectedEvent)
            }
        }
    }

    fn doc_start(&mut self) -> Result<()> {
        let Some(Frame::Stream { doc_count }) = self.stack.last_mut() else {
            return Err(Error::Internal);
        };
        if *doc_count > 0 {
            log_at!(
                self.config.log_level,
                Level::Warn,
                "Ignoring documents after first in stream"
            );
            self.pop();
            return Ok(());
        }
        *doc_count += 1;
        self.push(Frame::Document);
        Ok(())
    }

    fn map_key(&mut self, event: Event) -> Result<()> {
        let Event::Scalar { value: key, .. } = event else {
            return Err(Error::Internal);
        };
        let config = self.config;
        log_at!(config.log_level, Level::Info, "[{}]", key);

        let Some(Frame::Mapping(map)) = self.stack.last_mut() else {
            return Err(Error::Internal);
        };
        let found = map
            .fields
            .iter()
            .position(|field| util::names_match(config, &map.schema.flags, &key, &field.key));

        let Some(index) = found else {
            map.field = None;
            if !config.flags.ignore_unknown_keys {
                log_at!(config.log_level, Level::Error, "Unexpected key: {}", key);
                return Err(Error::InvalidKey);
            }
            log_at!(config.log_level, Level::Debug, "Ignoring key: {}", key);
            let value = self.events.next_event()?;
            return self.consume_ignored(value);
        };

        if map.is_seen(index) {
            log_at!(config.log_level, Level::Error, "Duplicate key: {}", key);
            return Err(Error::InvalidKey);
        }
        map.mark_seen(index);
        map.field = Some(index);
        map.expect_value = true;
        Ok(())
    }

    fn map_value(&mut self, event: Event) -> Result<()> {
        let Some(Frame::Mapping(map)) = self.stack.last_mut() else {
            return Err(Error::Internal);
        };
        map.expect_value = false;
        let fields = map.fields;
        let field = map.field.map(|index| &fields[index]).ok_or(Error::Internal)?;
        let at = map.base.add(field.offset as usize);
        self.read_value(&field.value, Place::At(at), event)
    }

    fn map_end(&mut self) -> Result<()> {
        let Some(Frame::Mapping(map)) = self.stack.last() else {
            return Err(Error::Internal);
        };
        let missing = map
            .fields
            .iter()
            .enumerate()
            .find(|(index, field)| !field.is_optional() && !map.is_seen(*index));
        if let Some((_, field)) = missing {
            log_at!(
                self.config.log_level,
                Level::Error,
                "Missing required mapping field: {}",
                field.key
            );
            return Err(Error::MappingFieldMissing);
        }
        self.pop();
        Ok(())
    }

    fn seq_entry(&mut self, event: Event) -> Result<()> {
        let level = self.config.log_level;
        let Some(Frame::Sequence(seq)) = self.stack.last_mut() else {
            return Err(Error::Internal);
        };
        if seq.count >= seq.max {
            log_at!(
                level,
                Level::Error,
                "Excessive entries ({} max) in sequence.",
                seq.max
            );
            return Err(Error::SequenceEntriesMax);
        }

        let stride = seq.schema.stride() as usize;
        let data = match seq.data {
            Some(data) if !seq.schema.is_pointer() || seq.fixed => data,
            _ if !seq.schema.is_pointer() => return Err(Error::Internal),
            current => {
                let old = current.map_or(Ptr::NULL, |addr| addr.block);
                let entries = if seq.fixed {
                    seq.max as usize
                } else {
                    seq.count as usize + 1
                };
                let size = stride.checked_mul(entries).ok_or(Error::Oom)?;
                let block = self.alloc.resize(old, size)?;
                log_at!(level, Level::Debug, "Allocation: {} ({} bytes)", block, size);
                if let Err(err) = store_ptr(&mut *self.alloc, &mut self.root, seq.place, block) {
                    if old.is_null() {
                        self.alloc.release(block);
                    }
                    return Err(err);
                }
                let data = Addr::new(block);
                seq.data = Some(data);
                data
            }
        };

        log_at!(
            level,
            Level::Debug,
            "Sequence entry: {} ({} bytes)",
            seq.count,
            stride
        );
        let at = data.add(stride * seq.count as usize);
        seq.count += 1;
        let count = seq.count;
        let count_to = seq.count_to;
        let entry = seq.entry;

        if let Some(target) = count_to {
            self.write_count(target, count)?;
        }
        self.read_value(entry, Place::At(at), event)
    }

    fn seq_end(&mut self) -> Result<()> {
        let Some(Frame::Sequence(seq)) = self.stack.last() else {
            return Err(Error::Internal);
        };
        if seq.count < seq.min {
            log_at!(
                self.config.log_level,
                Level::Error,
                "Insufficient entries ({} of {} min) in sequence.",
                seq.count,
                seq.min
            );
            return Err(Error::SequenceEntriesMin);
        }
        log_at!(
            self.config.log_level,
            Level::Debug,
            "Sequence count: {}",
            seq.count
        );
        self.pop();
        Ok(())
    }

    fn write_count(&mut self, target: CountTarget, count: u32) -> Result<()> {
        match target {
            CountTarget::Root => {
                self.seq_count = count;
                Ok(())
            }
            CountTarget::At(addr, size) => {
                if size == 0 || size > 8 || u64::from(count) > util::unsigned_max(size) {
                    log_at!(
                        self.config.log_level,
                        Level::Error,
                        "Failed writing sequence count {} into {} bytes",
                        count,
                        size
                    );
                    return Err(if size == 0 || size > 8 {
                        Error::InvalidDataSize
                    } else {
                        Error::SequenceEntriesMax
                    });
                }
                self.alloc.write_uint(addr, size, u64::from(count))
            }
        }
    }

    fn read_value(&mut self, schema: &'m Schema, place: Place, event: Event) -> Result<()> {
        let level = self.config.log_level;
        log_at!(
            level,
            Level::Debug,
            "Reading value of type '{}'{}",
            schema.kind.name(),
            if schema.is_pointer() { " (pointer)" } else { "" }
        );

        if schema.is_pointer() && schema.flags.allow_null && event.is_null_scalar() {
            log_at!(level, Level::Info, "  <null>");
            return store_ptr(&mut *self.alloc, &mut self.root, place, Ptr::NULL);
        }

        let expected = match &schema.kind {
            Kind::Int | Kind::Uint | Kind::Bool | Kind::Float => EventKind::Scalar,
            Kind::Enum { .. } | Kind::String { .. } => EventKind::Scalar,
            Kind::Flags { .. } | Kind::Sequence { .. } | Kind::SequenceFixed { .. } => {
                EventKind::SequenceStart
            }
            Kind::Mapping { .. } | Kind::Bitfield { .. } => EventKind::MappingStart,
            Kind::Ignore => return self.consume_ignored(event),
        };
        if event.kind() != expected {
            log_at!(
                level,
                Level::Error,
                "Expecting {} for {} value, got {}",
                expected,
                schema.kind.name(),
                event.kind()
            );
            return Err(Error::InvalidValue);
        }

        if schema.is_sequence() {
            return self.push_sequence(schema, place);
        }

        let data = self.value_addr(schema, place, &event)?;
        match &schema.kind {
            Kind::Mapping { fields } => {
                self.push(Frame::Mapping(MappingFrame {
                    schema,
                    fields,
                    base: data,
                    seen: vec![0; fields.len().div_ceil(64)],
                    field: None,
                    expect_value: false,
                }));
                Ok(())
            }
            Kind::Flags { values } => self.read_flags(schema, values, data),
            Kind::Bitfield { bits } => self.read_bitfield(schema, bits, data),
            _ => match event {
                Event::Scalar { value, .. } => self.read_scalar(schema, &value, data),
                _ => Err(Error::Internal),
            },
        }
    }

    /// Address the value is decoded into, allocating pointer values.
    fn value_addr(&mut self, schema: &Schema, place: Place, event: &Event) -> Result<Addr> {
        if !schema.is_pointer() {
            return match place {
                Place::At(addr) => Ok(addr),
                Place::Root => Err(Error::TopLevelNonPtr),
            };
        }
        let size = match (&schema.kind, event) {
            (Kind::String { .. }, Event::Scalar { value, .. }) => value.len() + 1,
            _ => schema.data_size as usize,
        };
        let block = self.alloc.allocate(size)?;
        log_at!(
            self.config.log_level,
            Level::Debug,
            "Allocation: {} ({} bytes)",
            block,
            size
        );
        if let Err(err) = store_ptr(&mut *self.alloc, &mut self.root, place, block) {
            self.alloc.release(block);
            return Err(err);
        }
        Ok(Addr::new(block))
    }

    fn push_sequence(&mut self, schema: &'m Schema, place: Place) -> Result<()> {
        let level = self.config.log_level;
        let (entry, min, max, fixed) = match &schema.kind {
            Kind::Sequence { entry, min, max } => (&**entry, *min, *max, false),
            Kind::SequenceFixed { entry, min, max } => (&**entry, *min, *max, true),
            _ => return Err(Error::Internal),
        };
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

        let count_to = if fixed {
            None
        } else {
            match self.stack.last() {
                Some(Frame::Sequence(_)) => {
                    log_at!(level, Level::Error, "Variable sequence inside a sequence");
                    return Err(Error::SequenceInSequence);
                }
                Some(Frame::Mapping(map)) => {
                    let field = map
                        .field
                        .map(|index| &map.fields[index])
                        .ok_or(Error::Internal)?;
                    let Some(count) = field.count else {
                        log_at!(
                            level,
                            Level::Error,
                            "Sequence field '{}' has no count field",
                            field.key
                        );
                        return Err(Error::BadTypeInSchema);
                    };
                    Some(CountTarget::At(
                        map.base.add(count.offset as usize),
                        u32::from(count.size),
                    ))
                }
                _ => Some(CountTarget::Root),
            }
        };

        let data = match (schema.is_pointer(), place) {
            (true, _) => None,
            (false, Place::At(addr)) => Some(addr),
            (false, Place::Root) => return Err(Error::TopLevelNonPtr),
        };
        self.push(Frame::Sequence(SequenceFrame {
            schema,
            entry,
            min,
            max,
            fixed,
            place,
            data,
            count: 0,
            count_to,
        }));
        Ok(())
    }

    fn read_scalar(&mut self, schema: &Schema, text: &str, data: Addr) -> Result<()> {
        let level = self.config.log_level;
        log_at!(level, Level::Info, "  <{}>", text);
        let size = schema.data_size;
        match &schema.kind {
            Kind::Int => self.read_int(size, text, data),
            Kind::Uint => {
                check_width(size)?;
                let value = util::parse_unsigned(text)
                    .filter(|value| *value <= util::unsigned_max(size))
                    .ok_or_else(|| {
                        log_at!(level, Level::Error, "Invalid unsigned value: {}", text);
                        Error::InvalidValue
                    })?;
                self.alloc.write_uint(data, size, value)
            }
            Kind::Bool => self
                .alloc
                .write_uint(data, size, u64::from(util::parse_bool(text))),
            Kind::Enum { values } => {
                if let Some(entry) = self.lookup(schema, values, text) {
                    return self.alloc.write_uint(data, size, entry.value as u64);
                }
                if schema.flags.strict {
                    log_at!(level, Level::Error, "Invalid enumeration value: {}", text);
                    return Err(Error::InvalidValue);
                }
                self.read_int(size, text, data)
            }
            Kind::Float => {
                let stored = match size {
                    4 => util::parse_f32(text).map(|value| self.alloc.write_f32(data, value)),
                    8 => util::parse_f64(text).map(|value| self.alloc.write_f64(data, value)),
                    _ => return Err(Error::InvalidDataSize),
                };
                stored.unwrap_or_else(|| {
                    log_at!(level, Level::Error, "Invalid float value: {}", text);
                    Err(Error::InvalidValue)
                })
            }
            Kind::String { min, max } => {
                let len = text.len();
                if min > max {
                    return Err(Error::BadMinMaxSchema);
                } else if (len as u64) < u64::from(*min) {
                    log_at!(level, Level::Error, "String too short ({} < {})", len, min);
                    return Err(Error::StringLengthMin);
                } else if (len as u64) > u64::from(*max) {
                    log_at!(level, Level::Error, "String too long ({} > {})", len, max);
                    return Err(Error::StringLengthMax);
                }
                self.alloc.write_bytes(data, text.as_bytes())?;
                self.alloc.write_bytes(data.add(len), &[0])
            }
            _ => Err(Error::BadTypeInSchema),
        }
    }

    fn read_int(&mut self, size: u32, text: &str, data: Addr) -> Result<()> {
        check_width(size)?;
        let (min, max) = util::signed_range(size);
        let value = util::parse_integer(text)
            .filter(|value| (min..=max).contains(value))
            .ok_or_else(|| {
                log_at!(
                    self.config.log_level,
                    Level::Error,
                    "Invalid integer value: {}",
                    text
                );
                Error::InvalidValue
            })?;
        self.alloc.write_uint(data, size, value as i64 as u64)
    }

    fn lookup<'v>(&self, schema: &Schema, values: &'v [StrVal], text: &str) -> Option<&'v StrVal> {
        values
            .iter()
            .find(|entry| util::names_match(self.config, &schema.flags, text, &entry.name))
    }

    fn read_flags(&mut self, schema: &Schema, values: &[StrVal], data: Addr) -> Result<()> {
        let level = self.config.log_level;
        let size = schema.data_size;
        check_width(size)?;
        let limit = util::unsigned_max(size);

        let mut bits = 0u64;
        loop {
            match self.events.next_event()? {
                Event::Scalar { value, .. } => {
                    if let Some(entry) = self.lookup(schema, values, &value) {
                        bits |= entry.value as u64;
                        continue;
                    }
                    let raw = if schema.flags.strict {
                        None
                    } else {
                        util::parse_unsigned(&value).filter(|raw| *raw <= limit)
                    };
                    match raw {
                        Some(raw) => bits |= raw,
                        None => {
                            log_at!(level, Level::Error, "Unknown flag: {}", value);
                            return Err(Error::InvalidValue);
                        }
                    }
                }
                Event::SequenceEnd => break,
                other => {
                    log_at!(level, Level::Error, "Unexpected {} in flags", other.kind());
                    return Err(Error::UnexpectedEvent);
                }
            }
        }

        self.alloc.write_uint(data, size, bits)?;
        log_at!(level, Level::Info, "  <Flags: 0x{:x}>", bits);
        Ok(())
    }

    fn read_bitfield(&mut self, schema: &Schema, defs: &[BitDef], data: Addr) -> Result<()> {
        let level = self.config.log_level;
        let size = schema.data_size;
        check_width(size)?;
        check_bitdefs(self.config, defs, size)?;

        let mut bits = 0u64;
        loop {
            let name = match self.events.next_event()? {
                Event::Scalar { value, .. } => value,
                Event::MappingEnd => break,
                other => {
                    log_at!(level, Level::Error, "Unexpected {} in bitfield", other.kind());
                    return Err(Error::UnexpectedEvent);
                }
            };
            let Some(def) = defs
                .iter()
                .find(|def| util::names_match(self.config, &schema.flags, &name, &def.name))
            else {
                log_at!(level, Level::Error, "Unknown bit value: {}", name);
                return Err(Error::InvalidValue);
            };
            let value = match self.events.next_event()? {
                Event::Scalar { value, .. } => util::parse_unsigned(&value).ok_or_else(|| {
                    log_at!(level, Level::Error, "Invalid value for bits {}: {}", name, value);
                    Error::InvalidValue
                })?,
                other => {
                    log_at!(level, Level::Error, "Unexpected {} for bits {}", other.kind(), name);
                    return Err(Error::UnexpectedEvent);
                }
            };
            if value > def.mask() {
                log_at!(level, Level::Error, "Value too big for bits: {}", name);
                return Err(Error::InvalidValue);
            }
            bits |= value.checked_shl(u32::from(def.offset)).unwrap_or(0);
        }

        self.alloc.write_uint(data, size, bits)?;
        log_at!(level, Level::Info, "  <Bits: 0x{:x}>", bits);
        Ok(())
    }

    /// Skip a scalar or a whole collection.
    fn consume_ignored(&mut self, event: Event) -> Result<()> {
        match event.kind() {
            EventKind::Scalar => Ok(()),
            EventKind::SequenceStart | EventKind::MappingStart => {
                let mut depth = 1usize;
                while depth > 0 {
                    let next = self.events.next_event()?;
                    if next.is_collection_start() {
                        depth += 1;
                    } else if next.is_collection_end() {
                        depth -= 1;
                    }
                }
                Ok(())
            }
            kind => {
                log_at!(
                    self.config.log_level,
                    Level::Error,
                    "Cannot ignore {} event",
                    kind
                );
                Err(Error::UnexpectedEvent)
            }
        }
    }
}

fn store_ptr<A: Allocator + ?Sized>(alloc: &mut A, root: &mut Ptr, place: Place, ptr: Ptr) -> Result<()> {
    match place {
        Place::Root => {
            *root = ptr;
            Ok(())
        }
        Place::At(addr) => alloc.write_ptr(addr, ptr),
    }
}

fn check_width(size: u32) -> Result<()> {
    if size == 0 || size > 8 {
        return Err(Error::InvalidDataSize);
    }
    Ok(())
}

/// Every bit range must fit inside the value.
pub(crate) fn check_bitdefs(config: &Config, defs: &[BitDef], size: u32) -> Result<()> {
    for def in defs {
        if u32::from(def.offset) + u32::from(def.bits) > size * 8 {
            log_at!(
                config.log_level,
                Level::Error,
                "Bit value '{}' ({} bits at {}) does not fit {} bytes",
                def.name,
                def.bits,
                def.offset,
                size
            );
            return Err(Error::BadBitvalInSchema);
        }
    }
    Ok(())
}
