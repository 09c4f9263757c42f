use std::fmt::{Debug, Formatter};

/// How many characters the display mirror holds.
pub const CAPACITY: usize = 16;

/// What has been sent to the display since the last clear.
///
/// Holds up to [CAPACITY] characters and is always NUL-terminated right after the last one.
/// Appending to a full buffer does nothing.
#[derive(Clone, Eq, PartialEq)]
pub struct DisplayBuffer {
    data: [u8; CAPACITY + 1],
    index: usize,
}

impl DisplayBuffer {
    pub fn new() -> Self {
        DisplayBuffer {
            data: [0; CAPACITY + 1],
            index: 0,
        }
    }

    /// Appends a character, or does nothing if the buffer is full.
    ///
    /// Returns whether the character was stored.
    pub fn append(&mut self, letter: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.data[self.index] = letter;
        self.index += 1;
        self.data[self.index] = 0;
        true
    }

    pub fn clear(&mut self) {
        self.index = 0;
        self.data[0] = 0;
    }

    pub fn len(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.index == 0
    }

    pub fn is_full(&self) -> bool {
        self.index >= CAPACITY
    }

    /// The stored characters, without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.index]
    }

    /// The stored characters including the terminator, like a C string.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.data[..=self.index]
    }
}

impl Default for DisplayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for DisplayBuffer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisplayBuffer({:?})", String::from_utf8_lossy(self.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_and_terminated() {
        let buffer = DisplayBuffer::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.as_bytes_with_nul(), b"\0");
    }

    #[test]
    fn append_keeps_terminator_after_last_character() {
        let mut buffer = DisplayBuffer::new();
        assert!(buffer.append(b'H'));
        assert!(buffer.append(b'i'));
        assert_eq!(buffer.as_bytes(), b"Hi");
        assert_eq!(buffer.as_bytes_with_nul(), b"Hi\0");
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn seventeenth_append_is_a_no_op() {
        let mut buffer = DisplayBuffer::new();
        for letter in b'a'..b'a' + 16 {
            assert!(buffer.append(letter));
        }
        assert!(buffer.is_full());
        assert_eq!(buffer.as_bytes_with_nul(), b"abcdefghijklmnop\0");

        let before = buffer.clone();
        assert!(!buffer.append(b'q'));
        assert_eq!(buffer, before);
        assert_eq!(buffer.len(), CAPACITY);
    }

    #[test]
    fn clear_resets_index() {
        let mut buffer = DisplayBuffer::new();
        buffer.append(b'x');
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.as_bytes_with_nul(), b"\0");
        assert!(buffer.append(b'y'));
        assert_eq!(buffer.as_bytes(), b"y");
    }
}
