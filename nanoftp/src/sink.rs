//! # Sink
//!
//! Destinations for bytes read from a channel

/// A destination bytes are pushed into one at a time
pub trait Sink {
    /// Store a byte. Returns `false` if the sink is full and the byte was not stored
    fn push(&mut self, byte: u8) -> bool;

    /// Whether another byte can be stored
    fn is_full(&self) -> bool;
}

impl Sink for Vec<u8> {
    fn push(&mut self, byte: u8) -> bool {
        Vec::push(self, byte);
        true
    }

    fn is_full(&self) -> bool {
        false
    }
}

/// Sink over a pre-allocated buffer
#[derive(Debug)]
pub struct SliceSink<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> SliceSink<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Amount of bytes written so far
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The written part of the buffer
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Sink for SliceSink<'_> {
    fn push(&mut self, byte: u8) -> bool {
        match self.buf.get_mut(self.len) {
            Some(slot) => {
                *slot = byte;
                self.len += 1;
                true
            }
            None => false,
        }
    }

    fn is_full(&self) -> bool {
        self.len >= self.buf.len()
    }
}

/// Growable buffer with an upper bound.
///
/// Bytes pushed past the capacity are counted and dropped, so a reader can keep
/// consuming a line without storing it.
#[derive(Debug, Clone)]
pub struct Capped {
    buf: Vec<u8>,
    capacity: usize,
    discarded: usize,
}

impl Capped {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(256)),
            capacity,
            discarded: 0,
        }
    }

    /// Amount of bytes dropped because the buffer was full
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl Sink for Capped {
    fn push(&mut self, byte: u8) -> bool {
        if self.buf.len() < self.capacity {
            self.buf.push(byte);
            true
        } else {
            self.discarded += 1;
            false
        }
    }

    fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }
}
