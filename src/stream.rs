//! The shared in-between representation for the "game loop" region: the
//! contiguous span of events between `GAME_START` and `GAME_END`.
//!
//! The parser produces a [`EventStream`] while also building the higher-level
//! [`crate::replay::Replay`]; the codec and shuffler instead operate directly
//! on an `EventStream`'s raw payload bytes, since their transforms are defined
//! byte-for-byte against the wire format rather than the parsed model.

#[derive(Debug, Clone)]
pub struct RawEvent {
    pub code: u8,
    /// Full on-wire bytes for this event, *including* the leading code byte
    /// at index 0 -- this matches the schema's offset convention, where e.g.
    /// `O_FRAME = 0x01` is one byte past the command byte.
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct EventStream {
    pub events: Vec<RawEvent>,
}

impl EventStream {
    pub fn new() -> Self {
        EventStream::default()
    }

    pub fn push(&mut self, code: u8, payload: Vec<u8>) {
        debug_assert_eq!(payload.first().copied(), Some(code));
        self.events.push(RawEvent { code, payload });
    }

    /// Total on-wire byte count.
    pub fn byte_len(&self) -> usize {
        self.events.iter().map(|e| e.payload.len()).sum()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for e in &self.events {
            out.extend_from_slice(&e.payload);
        }
        out
    }
}
