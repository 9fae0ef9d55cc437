//! Anchor recording and alias replay.
//!
//! Events are kept in an append-only store while at least one anchor is
//! being defined. A separate index maps logical positions to store entries,
//! so an event replayed for an alias inside another anchor's definition is
//! recorded by reference instead of being copied. An alias is expanded by
//! walking the index range of its anchor's record.

use log::{Level, LevelFilter};
use yamlbind_types::{Error, Result};

use crate::config::Config;
use crate::event::{AnchorId, Event, Reader};

#[derive(Debug, Clone, Copy)]
struct AnchorRecord {
    id: AnchorId,
    /// First logical position of the anchored node.
    start: usize,
    /// One past its last logical position.
    end: usize,
    recording: bool,
}

#[derive(Debug, Clone, Copy)]
struct Replay {
    pos: usize,
    end: usize,
}

#[derive(Debug)]
pub struct Recorder {
    store: Vec<Event>,
    index: Vec<usize>,
    anchors: Vec<AnchorRecord>,
    /// Records still open, with the nesting depth at which they started.
    open: Vec<(usize, usize)>,
    depth: usize,
    replay: Option<Replay>,
    log_level: LevelFilter,
}

impl Recorder {
    pub fn new(log_level: LevelFilter) -> Self {
        Self {
            store: Vec::new(),
            index: Vec::new(),
            anchors: Vec::new(),
            open: Vec::new(),
            depth: 0,
            replay: None,
            log_level,
        }
    }

    /// Next replayed event and its store slot.
    pub fn replay_next(&mut self) -> Option<(Event, usize)> {
        let replay = self.replay.as_mut()?;
        let slot = self.index[replay.pos];
        replay.pos += 1;
        if replay.pos >= replay.end {
            self.replay = None;
        }
        Some((self.store[slot].clone(), slot))
    }

    /// Begin replaying the most recent completed definition of `id`.
    pub fn start_replay(&mut self, id: AnchorId) -> Result<()> {
        let record = self
            .anchors
            .iter()
            .rev()
            .find(|record| record.id == id && !record.recording)
            .copied();
        match record {
            Some(record) if record.start < record.end => {
                log_at!(
                    self.log_level,
                    Level::Debug,
                    "Replaying anchor {} (events {}..{})",
                    id,
                    record.start,
                    record.end
                );
                self.replay = Some(Replay {
                    pos: record.start,
                    end: record.end,
                });
                Ok(())
            }
            _ => {
                log_at!(self.log_level, Level::Error, "No anchor found for alias {}", id);
                Err(Error::InvalidAlias)
            }
        }
    }

    /// Account for an event handed to the loader. `slot` is set for replayed
    /// events, which are indexed by reference and never define anchors.
    pub fn observe(&mut self, event: &Event, slot: Option<usize>) {
        let defines = match slot {
            None => event.anchor(),
            Some(_) => None,
        };

        let position = self.index.len();
        if !self.open.is_empty() || defines.is_some() {
            let slot = match slot {
                Some(slot) => slot,
                None => {
                    self.store.push(event.clone());
                    self.store.len() - 1
                }
            };
            self.index.push(slot);
        }

        if let Some(id) = defines {
            if event.is_collection_start() {
                self.anchors.push(AnchorRecord {
                    id,
                    start: position,
                    end: position,
                    recording: true,
                });
                self.open.push((self.anchors.len() - 1, self.depth));
            } else {
                self.anchors.push(AnchorRecord {
                    id,
                    start: position,
                    end: position + 1,
                    recording: false,
                });
            }
        }

        if event.is_collection_start() {
            self.depth += 1;
        } else if event.is_collection_end() {
            self.depth = self.depth.saturating_sub(1);
            while let Some(&(record, depth)) = self.open.last() {
                if depth != self.depth {
                    break;
                }
                self.anchors[record].end = self.index.len();
                self.anchors[record].recording = false;
                self.open.pop();
            }
        }
    }
}

/// Alias-expanding event source used by the loader.
pub struct EventStream<'a> {
    reader: Reader<'a>,
    recorder: Recorder,
    no_alias: bool,
    log_level: LevelFilter,
}

impl<'a> EventStream<'a> {
    pub fn new(reader: Reader<'a>, config: &Config) -> Self {
        Self {
            reader: reader.with_log_level(config.log_level),
            recorder: Recorder::new(config.log_level),
            no_alias: config.flags.no_alias,
            log_level: config.log_level,
        }
    }

    pub fn next_event(&mut self) -> Result<Event> {
        loop {
            if let Some((event, slot)) = self.recorder.replay_next() {
                self.recorder.observe(&event, Some(slot));
                return Ok(event);
            }
            let event = self.reader.next_event()?;
            if let Event::Alias { anchor } = event {
                if self.no_alias {
                    log_at!(self.log_level, Level::Error, "Alias found but aliases are disabled");
                    return Err(Error::Alias);
                }
                self.recorder.start_replay(anchor)?;
                continue;
            }
            self.recorder.observe(&event, None);
            return Ok(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFlags;
    use crate::event::{CollectionStyle, ScalarStyle};

    fn scalar(value: &str, anchor: Option<AnchorId>) -> Event {
        Event::Scalar {
            value: value.to_string(),
            style: ScalarStyle::Plain,
            anchor,
        }
    }

    fn map_start(anchor: Option<AnchorId>) -> Event {
        Event::MappingStart {
            anchor,
            style: CollectionStyle::Any,
        }
    }

    fn drain_replay(recorder: &mut Recorder) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some((event, slot)) = recorder.replay_next() {
            recorder.observe(&event, Some(slot));
            out.push(event);
        }
        out
    }

    #[test]
    fn scalar_anchor_replays_one_event() {
        let mut recorder = Recorder::new(LevelFilter::Trace);
        recorder.observe(&map_start(None), None);
        recorder.observe(&scalar("a", None), None);
        recorder.observe(&scalar("1", Some(1)), None);
        // nothing else is stored once the scalar is recorded
        recorder.observe(&scalar("b", None), None);
        assert_eq!(recorder.store.len(), 1);

        recorder.start_replay(1).unwrap();
        assert_eq!(drain_replay(&mut recorder), vec![scalar("1", Some(1))]);
        assert!(recorder.replay_next().is_none());
    }

    #[test]
    fn mapping_anchor_records_until_balanced() {
        let mut recorder = Recorder::new(LevelFilter::Trace);
        let defined = vec![
            map_start(Some(7)),
            scalar("x", None),
            map_start(None),
            scalar("y", None),
            scalar("2", None),
            Event::MappingEnd,
            Event::MappingEnd,
        ];
        for event in &defined {
            recorder.observe(event, None);
        }
        recorder.observe(&scalar("after", None), None);

        recorder.start_replay(7).unwrap();
        assert_eq!(drain_replay(&mut recorder), defined);
    }

    #[test]
    fn self_reference_is_rejected() {
        let mut recorder = Recorder::new(LevelFilter::Trace);
        recorder.observe(&map_start(Some(2)), None);
        assert_eq!(recorder.start_replay(2), Err(Error::InvalidAlias));
        assert_eq!(recorder.start_replay(99), Err(Error::InvalidAlias));
    }

    #[test]
    fn replay_inside_definition_is_indexed_not_copied() {
        let mut recorder = Recorder::new(LevelFilter::Trace);
        recorder.observe(&scalar("1", Some(1)), None);
        recorder.observe(&map_start(Some(2)), None);
        recorder.observe(&scalar("k", None), None);
        recorder.start_replay(1).unwrap();
        drain_replay(&mut recorder);
        recorder.observe(&Event::MappingEnd, None);
        assert_eq!(recorder.store.len(), 4);

        recorder.start_replay(2).unwrap();
        assert_eq!(
            drain_replay(&mut recorder),
            vec![
                map_start(Some(2)),
                scalar("k", None),
                scalar("1", Some(1)),
                Event::MappingEnd,
            ]
        );
    }

    #[test]
    fn redefined_anchor_uses_latest() {
        let mut recorder = Recorder::new(LevelFilter::Trace);
        recorder.observe(&scalar("old", Some(4)), None);
        recorder.observe(&scalar("new", Some(4)), None);
        recorder.start_replay(4).unwrap();
        assert_eq!(drain_replay(&mut recorder), vec![scalar("new", Some(4))]);
    }

    #[test]
    fn stream_rejects_alias_when_disabled() {
        let mut stream = EventStream::new(
            Reader::new("a: &x 1\nb: *x\n"),
            &Config::new(ConfigFlags {
                no_alias: true,
                ..ConfigFlags::default()
            }),
        );
        let err = loop {
            match stream.next_event() {
                Ok(Event::StreamEnd) => panic!("expected an error"),
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert_eq!(err, Error::Alias);
    }

    #[test]
    fn stream_expands_alias() {
        let mut stream = EventStream::new(Reader::new("[&x {k: v}, *x]"), &Config::default());
        let mut values = Vec::new();
        loop {
            match stream.next_event().unwrap() {
                Event::Scalar { value, .. } => values.push(value),
                Event::StreamEnd => break,
                _ => {}
            }
        }
        assert_eq!(values, vec!["k", "v", "k", "v"]);
    }
}
