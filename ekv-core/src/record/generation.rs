//! Cyclic generation ordering between the two slots.
//!
//! Tags only take the values 0, 1 and 2, and "newer" is cyclic:
//! 0 < 1, 1 < 2, 2 < 0. Equal tags or tags outside that range cannot be
//! ordered.

/// Generation tag of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u8);

impl Generation {
    /// Tag written when no readable slot exists yet.
    pub const INITIAL: Self = Self(1);

    /// Returns the tag if it is in range.
    #[must_use]
    pub const fn new(value: u8) -> Option<Self> {
        if value < 3 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Raw tag value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// The tag that is newer than `self`.
    #[must_use]
    pub const fn next(self) -> Self {
        Self((self.0 + 1) % 3)
    }
}

/// Outcome of comparing two raw tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Newer {
    /// The first tag is newer.
    First,
    /// The second tag is newer.
    Second,
    /// The tags cannot be ordered.
    Invalid,
}

/// Compares the tags of slot `.1` and slot `.2`.
#[must_use]
pub const fn compare_generations(first: u8, second: u8) -> Newer {
    match (first, second) {
        (1, 0) | (2, 1) | (0, 2) => Newer::First,
        (0, 1) | (1, 2) | (2, 0) => Newer::Second,
        _ => Newer::Invalid,
    }
}
