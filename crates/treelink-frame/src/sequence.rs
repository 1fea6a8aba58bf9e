/// One-byte frame sequence number, wrapping modulo 256.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceCounter(u8);

impl SequenceCounter {
    pub fn new(start: u8) -> Self {
        Self(start)
    }

    /// Value the next frame will carry.
    pub fn peek(self) -> u8 {
        self.0
    }

    /// Return the current value and advance.
    pub fn advance(&mut self) -> u8 {
        let current = self.0;
        self.0 = self.0.wrapping_add(1);
        current
    }
}
