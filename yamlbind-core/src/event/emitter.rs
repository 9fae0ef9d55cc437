//! Push-style YAML writer.
//!
//! Collections are opened lazily: a start event is held until the next event
//! shows whether the collection has entries, so an empty one can be written
//! as `[]` or `{}`. Block sequences that are mapping values are written
//! without extra indentation, and collections that are sequence entries start
//! on the `- ` line.

use std::io::{self, Write};
use std::sync::OnceLock;

use log::{Level, LevelFilter};
use regex::Regex;
use yamlbind_types::{Error, Result};

use super::{CollectionStyle, Event, EventKind, ScalarStyle};

const INDENT: usize = 2;

#[derive(Debug, Clone, Copy)]
enum Frame {
    Block {
        mapping: bool,
        indent: usize,
        /// Next entry continues the current line.
        compact: bool,
        expect_key: bool,
    },
    Flow {
        mapping: bool,
        first: bool,
        expect_key: bool,
    },
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    mapping: bool,
    style: CollectionStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Stream,
    Document,
    DocumentDone,
    Done,
}

pub struct Emitter<W: Write> {
    out: W,
    phase: Phase,
    stack: Vec<Frame>,
    pending: Option<Pending>,
    log_level: LevelFilter,
}

impl<W: Write> Emitter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            phase: Phase::Start,
            stack: Vec::new(),
            pending: None,
            log_level: LevelFilter::Trace,
        }
    }

    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn emit(&mut self, event: Event) -> Result<()> {
        let kind = event.kind();
        let log_level = self.log_level;
        self.dispatch(event).map_err(|err| {
            log_at!(log_level, Level::Error, "Failed to emit {} event: {}", kind, err);
            Error::Emitter
        })
    }

    /// Write the plain `null` token, which [`emit`](Self::emit) would quote.
    pub fn emit_null(&mut self) -> Result<()> {
        let log_level = self.log_level;
        self.write_null().map_err(|err| {
            log_at!(log_level, Level::Error, "Failed to emit null: {}", err);
            Error::Emitter
        })
    }

    fn write_null(&mut self) -> io::Result<()> {
        if self.phase != Phase::Document {
            return Err(invalid(format!("null not allowed here ({:?})", self.phase)));
        }
        self.open_pending()?;
        self.begin_node(true)?;
        self.out.write_all(b"null")?;
        self.end_node(true)
    }

    fn dispatch(&mut self, event: Event) -> io::Result<()> {
        match (self.phase, event) {
            (Phase::Start, Event::StreamStart) => {
                self.phase = Phase::Stream;
                Ok(())
            }
            (Phase::Stream, Event::DocumentStart { explicit }) => {
                if explicit {
                    self.out.write_all(b"---\n")?;
                }
                self.phase = Phase::Document;
                Ok(())
            }
            (Phase::DocumentDone, Event::DocumentEnd { explicit }) => {
                if explicit {
                    self.out.write_all(b"...\n")?;
                }
                self.phase = Phase::Stream;
                Ok(())
            }
            (Phase::Stream, Event::StreamEnd) => {
                self.phase = Phase::Done;
                self.out.flush()
            }
            (Phase::Document, event) => self.node_event(event),
            (phase, event) => Err(invalid(format!(
                "{} not allowed here ({:?})",
                event.kind(),
                phase
            ))),
        }
    }

    fn node_event(&mut self, event: Event) -> io::Result<()> {
        let kind = event.kind();
        match event {
            Event::Scalar { value, style, .. } => {
                self.open_pending()?;
                self.begin_node(true)?;
                self.write_scalar(&value, style)?;
                self.end_node(true)
            }
            Event::SequenceStart { style, .. } | Event::MappingStart { style, .. } => {
                self.open_pending()?;
                self.pending = Some(Pending {
                    mapping: kind == EventKind::MappingStart,
                    style,
                });
                Ok(())
            }
            Event::SequenceEnd | Event::MappingEnd => {
                let mapping = kind == EventKind::MappingEnd;
                if let Some(pending) = self.pending.take() {
                    if pending.mapping != mapping {
                        return Err(invalid(format!("{} closes the wrong collection", kind)));
                    }
                    self.begin_node(true)?;
                    self.out.write_all(if mapping { b"{}" } else { b"[]" })?;
                    return self.end_node(true);
                }
                match self.stack.pop() {
                    Some(Frame::Block { mapping: m, .. }) if m == mapping => self.end_node(false),
                    Some(Frame::Flow { mapping: m, .. }) if m == mapping => {
                        self.out.write_all(if mapping { b"}" } else { b"]" })?;
                        self.end_node(true)
                    }
                    _ => Err(invalid(format!("{} without matching start", kind))),
                }
            }
            Event::Alias { .. } => Err(invalid("aliases are not emitted".to_string())),
            other => Err(invalid(format!("{} inside document", other.kind()))),
        }
    }

    fn in_flow(&self) -> bool {
        matches!(self.stack.last(), Some(Frame::Flow { .. }))
    }

    /// Open a held collection now that it is known to have entries.
    fn open_pending(&mut self) -> io::Result<()> {
        let Some(Pending { mapping, style }) = self.pending.take() else {
            return Ok(());
        };
        if style == CollectionStyle::Flow || self.in_flow() {
            self.begin_node(true)?;
            self.out.write_all(if mapping { b"{" } else { b"[" })?;
            self.stack.push(Frame::Flow {
                mapping,
                first: true,
                expect_key: true,
            });
            return Ok(());
        }

        self.begin_node(false)?;
        let (indent, compact) = match self.stack.last() {
            None => (0, false),
            Some(Frame::Block {
                mapping: true,
                indent,
                ..
            }) => {
                if mapping {
                    (indent + INDENT, false)
                } else {
                    (*indent, false)
                }
            }
            Some(Frame::Block { indent, .. }) => (indent + INDENT, true),
            Some(Frame::Flow { .. }) => unreachable!("flow parents force flow children"),
        };
        self.stack.push(Frame::Block {
            mapping,
            indent,
            compact,
            expect_key: true,
        });
        Ok(())
    }

    /// Write what precedes a node in its parent.
    fn begin_node(&mut self, inline: bool) -> io::Result<()> {
        let Some(frame) = self.stack.last_mut() else {
            return Ok(());
        };
        match frame {
            Frame::Block {
                mapping: true,
                indent,
                compact,
                expect_key: true,
            } => {
                if !inline {
                    return Err(invalid("mapping keys must be scalars".to_string()));
                }
                let pad = if *compact { 0 } else { *indent };
                *compact = false;
                write!(self.out, "{:pad$}", "", pad = pad)
            }
            Frame::Block {
                mapping: true,
                expect_key: false,
                ..
            } => {
                if inline {
                    self.out.write_all(b" ")
                } else {
                    self.out.write_all(b"\n")
                }
            }
            Frame::Block {
                mapping: false,
                indent,
                compact,
                ..
            } => {
                let pad = if *compact { 0 } else { *indent };
                *compact = false;
                write!(self.out, "{:pad$}- ", "", pad = pad)
            }
            Frame::Flow {
                mapping,
                first,
                expect_key,
            } => {
                if *mapping && *expect_key && !inline {
                    return Err(invalid("mapping keys must be scalars".to_string()));
                }
                if !*first && (!*mapping || *expect_key) {
                    self.out.write_all(b", ")?;
                }
                *first = false;
                Ok(())
            }
        }
    }

    /// Write what follows a node in its parent.
    fn end_node(&mut self, inline: bool) -> io::Result<()> {
        let Some(frame) = self.stack.last_mut() else {
            if inline {
                self.out.write_all(b"\n")?;
            }
            self.phase = Phase::DocumentDone;
            return Ok(());
        };
        match frame {
            Frame::Block {
                mapping: true,
                expect_key,
                ..
            } => {
                if *expect_key {
                    *expect_key = false;
                    self.out.write_all(b":")
                } else {
                    *expect_key = true;
                    if inline {
                        self.out.write_all(b"\n")
                    } else {
                        Ok(())
                    }
                }
            }
            Frame::Block { mapping: false, .. } => {
                if inline {
                    self.out.write_all(b"\n")
                } else {
                    Ok(())
                }
            }
            Frame::Flow {
                mapping: true,
                expect_key,
                ..
            } => {
                if *expect_key {
                    *expect_key = false;
                    self.out.write_all(b": ")
                } else {
                    *expect_key = true;
                    Ok(())
                }
            }
            Frame::Flow { mapping: false, .. } => Ok(()),
        }
    }

    fn write_scalar(&mut self, value: &str, style: ScalarStyle) -> io::Result<()> {
        match style {
            ScalarStyle::Plain if plain_allowed(value) => self.out.write_all(value.as_bytes()),
            ScalarStyle::SingleQuoted if !value.contains(['\n', '\r']) => {
                write!(self.out, "'{}'", value.replace('\'', "''"))
            }
            _ => self.write_double_quoted(value),
        }
    }

    fn write_double_quoted(&mut self, value: &str) -> io::Result<()> {
        let mut text = String::with_capacity(value.len() + 2);
        text.push('"');
        for c in value.chars() {
            match c {
                '"' => text.push_str("\\\""),
                '\\' => text.push_str("\\\\"),
                '\n' => text.push_str("\\n"),
                '\r' => text.push_str("\\r"),
                '\t' => text.push_str("\\t"),
                '\0' => text.push_str("\\0"),
                c if (c as u32) < 0x20 || c == '\u{7f}' => {
                    text.push_str(&format!("\\x{:02x}", c as u32))
                }
                c => text.push(c),
            }
        }
        text.push('"');
        self.out.write_all(text.as_bytes())
    }
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}

fn plain_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            // No indicator first, no flow indicators or comment/value markers anywhere,
            // no leading or trailing space, printable characters only.
            Regex::new(r#"^[^\s\-?:,\[\]{}#&*!|>'"%@`]([^\x00-\x1f\x7f,\[\]{}#]*[^\s,\[\]{}#:])?$"#)
                .ok()
        })
        .as_ref()
}

/// Whether `text` reads back unchanged as a plain scalar in any context.
pub fn plain_allowed(text: &str) -> bool {
    if super::is_null_token(text) || text.contains(": ") || text.contains(" #") {
        return false;
    }
    if let Some(rest) = text.strip_prefix('-') {
        // Negative numbers and words like `-x` are plain; `- x` and `---` are not.
        return !rest.starts_with([' ', '-']) && plain_pattern().is_some_and(|re| re.is_match(rest));
    }
    plain_pattern().is_some_and(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(events: Vec<Event>) -> String {
        let mut emitter = Emitter::new(Vec::new());
        emitter.emit(Event::StreamStart).unwrap();
        emitter
            .emit(Event::DocumentStart { explicit: false })
            .unwrap();
        for event in events {
            emitter.emit(event).unwrap();
        }
        emitter.emit(Event::DocumentEnd { explicit: false }).unwrap();
        emitter.emit(Event::StreamEnd).unwrap();
        String::from_utf8(emitter.into_inner()).unwrap()
    }

    fn plain(s: &str) -> Event {
        Event::scalar(s, ScalarStyle::Plain)
    }

    fn map(style: CollectionStyle) -> Event {
        Event::MappingStart { anchor: None, style }
    }

    fn seq(style: CollectionStyle) -> Event {
        Event::SequenceStart { anchor: None, style }
    }

    #[test]
    fn block_mapping_with_nested_collections() {
        let text = render(vec![
            map(CollectionStyle::Any),
            plain("a"),
            map(CollectionStyle::Any),
            plain("x"),
            plain("1"),
            Event::MappingEnd,
            plain("b"),
            seq(CollectionStyle::Any),
            plain("1"),
            plain("2"),
            Event::SequenceEnd,
            plain("c"),
            plain("end"),
            Event::MappingEnd,
        ]);
        assert_eq!(text, "a:\n  x: 1\nb:\n- 1\n- 2\nc: end\n");
    }

    #[test]
    fn compact_entries() {
        let text = render(vec![
            seq(CollectionStyle::Block),
            map(CollectionStyle::Any),
            plain("x"),
            plain("1"),
            plain("y"),
            plain("2"),
            Event::MappingEnd,
            seq(CollectionStyle::Any),
            plain("3"),
            plain("4"),
            Event::SequenceEnd,
            Event::SequenceEnd,
        ]);
        assert_eq!(text, "- x: 1\n  y: 2\n- - 3\n  - 4\n");
    }

    #[test]
    fn flow_collections_and_forced_flow() {
        let text = render(vec![
            map(CollectionStyle::Block),
            plain("f"),
            seq(CollectionStyle::Flow),
            plain("1"),
            map(CollectionStyle::Block),
            plain("k"),
            plain("v"),
            Event::MappingEnd,
            Event::SequenceEnd,
            Event::MappingEnd,
        ]);
        assert_eq!(text, "f: [1, {k: v}]\n");
    }

    #[test]
    fn empty_collections() {
        let text = render(vec![
            map(CollectionStyle::Any),
            plain("s"),
            seq(CollectionStyle::Any),
            Event::SequenceEnd,
            plain("m"),
            map(CollectionStyle::Flow),
            Event::MappingEnd,
            Event::MappingEnd,
        ]);
        assert_eq!(text, "s: []\nm: {}\n");
    }

    #[test]
    fn document_delimiters() {
        let mut emitter = Emitter::new(Vec::new());
        for event in [
            Event::StreamStart,
            Event::DocumentStart { explicit: true },
            plain("7"),
            Event::DocumentEnd { explicit: true },
            Event::StreamEnd,
        ] {
            emitter.emit(event).unwrap();
        }
        assert_eq!(String::from_utf8(emitter.into_inner()).unwrap(), "---\n7\n...\n");
    }

    #[test]
    fn quoting() {
        let text = render(vec![
            seq(CollectionStyle::Flow),
            plain(""),
            plain("null"),
            plain("a, b"),
            Event::scalar("it's", ScalarStyle::SingleQuoted),
            Event::scalar("tab\there", ScalarStyle::DoubleQuoted),
            Event::SequenceEnd,
        ]);
        assert_eq!(text, "[\"\", \"null\", \"a, b\", 'it''s', \"tab\\there\"]\n");
    }

    #[test]
    fn null_token_is_written_plain() {
        let mut emitter = Emitter::new(Vec::new());
        emitter.emit(Event::StreamStart).unwrap();
        emitter.emit(Event::DocumentStart { explicit: false }).unwrap();
        emitter.emit(map(CollectionStyle::Flow)).unwrap();
        emitter.emit(plain("a")).unwrap();
        emitter.emit_null().unwrap();
        emitter.emit(plain("b")).unwrap();
        emitter.emit(plain("null")).unwrap();
        emitter.emit(Event::MappingEnd).unwrap();
        emitter.emit(Event::DocumentEnd { explicit: false }).unwrap();
        emitter.emit(Event::StreamEnd).unwrap();
        assert_eq!(
            String::from_utf8(emitter.into_inner()).unwrap(),
            "{a: null, b: \"null\"}\n"
        );
        assert_eq!(Emitter::new(Vec::new()).emit_null(), Err(Error::Emitter));
    }

    #[test]
    fn plain_scalar_detection() {
        assert!(plain_allowed("hello world"));
        assert!(plain_allowed("-5"));
        assert!(plain_allowed("0x1f"));
        assert!(plain_allowed("a:b"));
        assert!(plain_allowed("-x"));
        assert!(!plain_allowed(""));
        assert!(!plain_allowed("~"));
        assert!(!plain_allowed(" lead"));
        assert!(!plain_allowed("trail "));
        assert!(!plain_allowed("key: value"));
        assert!(!plain_allowed("- item"));
        assert!(!plain_allowed("---"));
        assert!(!plain_allowed("*ref"));
        assert!(!plain_allowed("two\nlines"));
        assert!(!plain_allowed("note #1"));
    }

    #[test]
    fn non_scalar_key_is_rejected() {
        let mut emitter = Emitter::new(Vec::new());
        emitter.emit(Event::StreamStart).unwrap();
        emitter.emit(Event::DocumentStart { explicit: false }).unwrap();
        emitter.emit(map(CollectionStyle::Any)).unwrap();
        emitter.emit(seq(CollectionStyle::Any)).unwrap();
        assert_eq!(emitter.emit(plain("x")), Err(Error::Emitter));
    }
}
