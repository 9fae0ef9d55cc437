use log::{Level, LevelFilter};
use saphyr_parser::{Event as YamlEvent, Parser, ScalarStyle as YamlScalarStyle, StrInput};
use yamlbind_types::{Error, Result};

use super::{AnchorId, CollectionStyle, Event, ScalarStyle};

/// Pull-style event source over a YAML text.
pub struct Reader<'a> {
    parser: Parser<'a, StrInput<'a>>,
    finished: bool,
    log_level: LevelFilter,
}

impl<'a> Reader<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            parser: Parser::new_from_str(text),
            finished: false,
            log_level: LevelFilter::Trace,
        }
    }

    pub fn with_log_level(mut self, level: LevelFilter) -> Self {
        self.log_level = level;
        self
    }

    pub fn next_event(&mut self) -> Result<Event> {
        loop {
            if self.finished {
                log_at!(self.log_level, Level::Error, "Read past end of YAML stream");
                return Err(Error::Parser);
            }
            let (event, _span) = match self.parser.next() {
                Some(Ok(next)) => next,
                Some(Err(err)) => {
                    let message = err.to_string();
                    log_at!(self.log_level, Level::Error, "YAML parse error: {}", message);
                    if message.contains("unknown anchor") {
                        return Err(Error::InvalidAlias);
                    }
                    return Err(Error::Parser);
                }
                None => {
                    self.finished = true;
                    continue;
                }
            };
            if let Some(event) = convert(event) {
                if event == Event::StreamEnd {
                    self.finished = true;
                }
                return Ok(event);
            }
        }
    }
}

fn anchor(id: usize) -> Option<AnchorId> {
    if id == 0 {
        None
    } else {
        Some(id)
    }
}

fn scalar_style(style: YamlScalarStyle) -> ScalarStyle {
    match style {
        YamlScalarStyle::Plain => ScalarStyle::Plain,
        YamlScalarStyle::SingleQuoted => ScalarStyle::SingleQuoted,
        YamlScalarStyle::DoubleQuoted => ScalarStyle::DoubleQuoted,
        YamlScalarStyle::Literal => ScalarStyle::Literal,
        YamlScalarStyle::Folded => ScalarStyle::Folded,
        #[allow(unreachable_patterns)]
        _ => ScalarStyle::Plain,
    }
}

fn convert(event: YamlEvent<'_>) -> Option<Event> {
    let event = match event {
        YamlEvent::Nothing => return None,
        YamlEvent::StreamStart => Event::StreamStart,
        YamlEvent::StreamEnd => Event::StreamEnd,
        YamlEvent::DocumentStart { .. } => Event::DocumentStart { explicit: false },
        YamlEvent::DocumentEnd { .. } => Event::DocumentEnd { explicit: false },
        YamlEvent::Alias(id) => Event::Alias { anchor: id },
        YamlEvent::Scalar(value, style, id, ..) => Event::Scalar {
            value: value.to_string(),
            style: scalar_style(style),
            anchor: anchor(id),
        },
        YamlEvent::SequenceStart(id, ..) => Event::SequenceStart {
            anchor: anchor(id),
            style: CollectionStyle::Any,
        },
        YamlEvent::SequenceEnd => Event::SequenceEnd,
        YamlEvent::MappingStart(id, ..) => Event::MappingStart {
            anchor: anchor(id),
            style: CollectionStyle::Any,
        },
        YamlEvent::MappingEnd => Event::MappingEnd,
    };
    Some(event)
}
