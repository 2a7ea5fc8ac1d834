use crate::core::{ProgressSink, ProgressUpdate};

/// Smallest batch reported for a non-final tick.
pub const MIN_INCREMENT: u64 = 4 * 1024;

/// Batches raw read sizes into ticks of roughly 1% of the total.
///
/// Every non-final tick is exactly `step()` bytes, the final tick carries
/// whatever is left, and the reported position never goes past the total.
/// Nothing is emitted after the final tick.
#[derive(Debug)]
pub struct ProgressAccountant {
    total: u64,
    step: u64,
    reported: u64,
    pending: u64,
    finished: bool,
}

impl ProgressAccountant {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            step: (total / 100).max(MIN_INCREMENT),
            reported: 0,
            pending: 0,
            finished: false,
        }
    }

    pub fn reported(&self) -> u64 {
        self.reported
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed a read of `bytes`. A zero-length read is end of stream.
    pub fn record<P: ProgressSink + ?Sized>(&mut self, bytes: u64, sink: &P) {
        if self.finished {
            return;
        }
        if bytes == 0 {
            self.finish(sink);
            return;
        }

        let room = self.total - self.reported - self.pending;
        self.pending += bytes.min(room);

        if self.reported + self.pending == self.total {
            self.finish(sink);
            return;
        }

        while self.pending >= self.step {
            self.emit(self.step, sink);
        }
    }

    /// Flush whatever is pending as the final tick.
    pub fn finish<P: ProgressSink + ?Sized>(&mut self, sink: &P) {
        if self.finished {
            return;
        }
        // a zero-byte upload still gets exactly one tick
        if self.pending > 0 || self.reported == 0 {
            self.emit(self.pending, sink);
        }
        self.finished = true;
    }

    fn emit<P: ProgressSink + ?Sized>(&mut self, increment: u64, sink: &P) {
        self.pending -= increment;
        self.reported += increment;
        sink.on_progress(ProgressUpdate {
            increment,
            position: self.reported,
            total: self.total,
        });
    }
}
