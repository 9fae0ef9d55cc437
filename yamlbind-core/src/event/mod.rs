//! Normalized YAML events shared by the load and save paths.

mod emitter;
mod reader;

use std::fmt;

pub use emitter::{plain_allowed, Emitter};
pub use reader::Reader;

/// Anchor identity assigned by the parser. Equal ids name the same anchor.
pub type AnchorId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    Plain,
    SingleQuoted,
    DoubleQuoted,
    Literal,
    Folded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollectionStyle {
    /// Block unless nested in a flow collection.
    #[default]
    Any,
    Block,
    Flow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StreamStart,
    StreamEnd,
    DocumentStart {
        explicit: bool,
    },
    DocumentEnd {
        explicit: bool,
    },
    Alias {
        anchor: AnchorId,
    },
    Scalar {
        value: String,
        style: ScalarStyle,
        anchor: Option<AnchorId>,
    },
    SequenceStart {
        anchor: Option<AnchorId>,
        style: CollectionStyle,
    },
    SequenceEnd,
    MappingStart {
        anchor: Option<AnchorId>,
        style: CollectionStyle,
    },
    MappingEnd,
}

/// Event discriminant, used for dispatch and log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    StreamStart,
    StreamEnd,
    DocumentStart,
    DocumentEnd,
    Alias,
    Scalar,
    SequenceStart,
    SequenceEnd,
    MappingStart,
    MappingEnd,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::StreamStart => "STREAM_START",
            EventKind::StreamEnd => "STREAM_END",
            EventKind::DocumentStart => "DOC_START",
            EventKind::DocumentEnd => "DOC_END",
            EventKind::Alias => "ALIAS",
            EventKind::Scalar => "SCALAR",
            EventKind::SequenceStart => "SEQ_START",
            EventKind::SequenceEnd => "SEQ_END",
            EventKind::MappingStart => "MAP_START",
            EventKind::MappingEnd => "MAP_END",
        };
        f.write_str(name)
    }
}

impl Event {
    pub fn scalar(value: impl Into<String>, style: ScalarStyle) -> Self {
        Event::Scalar {
            value: value.into(),
            style,
            anchor: None,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::StreamStart => EventKind::StreamStart,
            Event::StreamEnd => EventKind::StreamEnd,
            Event::DocumentStart { .. } => EventKind::DocumentStart,
            Event::DocumentEnd { .. } => EventKind::DocumentEnd,
            Event::Alias { .. } => EventKind::Alias,
            Event::Scalar { .. } => EventKind::Scalar,
            Event::SequenceStart { .. } => EventKind::SequenceStart,
            Event::SequenceEnd => EventKind::SequenceEnd,
            Event::MappingStart { .. } => EventKind::MappingStart,
            Event::MappingEnd => EventKind::MappingEnd,
        }
    }

    /// Anchor defined by this event, if any.
    pub fn anchor(&self) -> Option<AnchorId> {
        match self {
            Event::Scalar { anchor, .. }
            | Event::SequenceStart { anchor, .. }
            | Event::MappingStart { anchor, .. } => *anchor,
            _ => None,
        }
    }

    pub fn is_collection_start(&self) -> bool {
        matches!(self, Event::SequenceStart { .. } | Event::MappingStart { .. })
    }

    pub fn is_collection_end(&self) -> bool {
        matches!(self, Event::SequenceEnd | Event::MappingEnd)
    }

    /// Plain scalar spelling YAML null.
    pub fn is_null_scalar(&self) -> bool {
        match self {
            Event::Scalar {
                value,
                style: ScalarStyle::Plain,
                ..
            } => is_null_token(value),
            _ => false,
        }
    }
}

pub fn is_null_token(text: &str) -> bool {
    matches!(text, "null" | "Null" | "NULL" | "~")
}
