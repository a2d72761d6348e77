/// Highest sequence number already delivered, or unset.
///
/// Only moves forward. Callers must never pass a smaller value than the
/// current one; this is not checked here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorTracker {
    last: Option<i64>,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Baseline taken at startup; `None` for an empty log.
    pub fn seeded(latest: Option<i64>) -> Self {
        Self { last: latest }
    }

    pub fn current(&self) -> Option<i64> {
        self.last
    }

    /// Set the cursor if `sequence` is defined; `None` leaves it as is.
    pub fn advance_to(&mut self, sequence: Option<i64>) {
        if let Some(seq) = sequence {
            self.last = Some(seq);
        }
    }
}
