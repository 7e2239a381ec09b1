/// Turns a running count into decile notifications (0 through 9), each fired once,
/// as the count crosses `total * k / 10`.
#[derive(Debug, Clone)]
pub struct DecileTracker {
    total: u64,
    next: u8,
}

impl DecileTracker {
    pub fn new(total: u64) -> Self {
        Self { total, next: 0 }
    }

    pub fn advance(&mut self, processed: u64, mut emit: impl FnMut(u8)) {
        while self.next < 10
            && processed.saturating_mul(10) >= u64::from(self.next).saturating_mul(self.total)
        {
            emit(self.next);
            self.next += 1;
        }
    }
}
