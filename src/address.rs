//! Address Generation
//!
//! Deterministic, collision-avoiding sequence of hierarchical addresses.
//!
//! An address is `depth` segments of two hex digits joined by `/`, e.g.
//! `"04/1b/22"`. Index `i` in `[0, width^depth)` is written as `depth` bytes
//! and the byte order is reversed, so consecutive indices fan out across the
//! top-level segment before descending. `width` only bounds how many indices
//! are drawn:
//!
//! ```text
//! index 0   -> 00/00/00
//! index 1   -> 01/00/00
//! index 255 -> ff/00/00
//! index 256 -> 00/01/00
//! ```
//!
//! The generator is restartable only on construction: a fresh generator
//! replays the same sequence from index 0. Allocation against a populated
//! container therefore re-checks occupancy (see [`AddressGenerator::next_free`]).

use crate::error::{Result, StashError};

/// Default number of address segments
pub const DEFAULT_DEPTH: u32 = 3;

/// Default children per tree node
pub const DEFAULT_WIDTH: u32 = 256;

/// Render an index as a plain big-endian address, two hex digits per segment.
///
/// `index_to_address(843, 2)` is `"03/4b"`. Returns `None` when the index
/// does not fit in `depth` segments.
pub fn index_to_address(index: u64, depth: u32) -> Option<String> {
    let digits = 2 * depth as usize;
    let hex = format!("{:0width$x}", index, width = digits);
    if hex.len() > digits {
        return None;
    }

    let segments: Vec<&str> = (0..depth as usize).map(|i| &hex[2 * i..2 * i + 2]).collect();
    Some(segments.join("/"))
}

/// Render an index as a spread address: the big-endian bytes of
/// [`index_to_address`] in reverse order.
///
/// `uniform_address(843, 2)` is `"4b/03"`.
pub fn uniform_address(index: u64, depth: u32) -> String {
    let mut rest = index;
    let mut segments = Vec::with_capacity(depth as usize);
    for _ in 0..depth {
        segments.push(format!("{:02x}", rest & 0xff));
        rest >>= 8;
    }
    segments.join("/")
}

/// Lazy sequence of distinct addresses over a depth x width tree
#[derive(Debug, Clone)]
pub struct AddressGenerator {
    depth: u32,
    width: u32,
    /// Next index to hand out
    next_index: u64,
    /// width^depth
    capacity: u64,
}

impl AddressGenerator {
    /// Create a generator, validating the tree shape
    pub fn new(depth: u32, width: u32) -> Result<Self> {
        if depth == 0 {
            return Err(StashError::Config("address depth must be at least 1".to_string()));
        }
        if width < 2 || width > 256 {
            return Err(StashError::Config(format!(
                "address width must be in 2..=256, got {}",
                width
            )));
        }
        let capacity = (width as u64).checked_pow(depth).ok_or_else(|| {
            StashError::Config(format!(
                "address space {}^{} does not fit in 64 bits",
                width, depth
            ))
        })?;

        Ok(Self {
            depth,
            width,
            next_index: 0,
            capacity,
        })
    }

    /// Draw the next address in the sequence
    ///
    /// Fails with `Exhaustion` once all `width^depth` addresses were produced.
    pub fn next_address(&mut self) -> Result<String> {
        if self.next_index >= self.capacity {
            return Err(StashError::Exhaustion {
                capacity: self.capacity,
            });
        }
        let address = uniform_address(self.next_index, self.depth);
        self.next_index += 1;
        Ok(address)
    }

    /// Draw addresses until one is not occupied
    ///
    /// The generator's counter says nothing about what the container already
    /// holds, so occupancy is checked for every candidate.
    pub fn next_free<F>(&mut self, occupied: F) -> Result<String>
    where
        F: Fn(&str) -> bool,
    {
        loop {
            let candidate = self.next_address()?;
            if !occupied(&candidate) {
                return Ok(candidate);
            }
        }
    }

    /// Total number of addresses this generator can produce
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Number of addresses drawn so far
    pub fn issued(&self) -> u64 {
        self.next_index
    }

    /// Number of addresses left before exhaustion
    pub fn remaining(&self) -> u64 {
        self.capacity - self.next_index
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn width(&self) -> u32 {
        self.width
    }
}

impl Iterator for AddressGenerator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.next_address().ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining()) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}
