//! Progress computation and sampling.

/// Highest percentage reported while bytes are still arriving. 100 is only
/// recorded once the transfer has been verified complete.
pub const IN_FLIGHT_MAX: u8 = 99;

/// `floor(done * 100 / total)`, capped at [`IN_FLIGHT_MAX`]. Unknown or zero totals give 0.
pub fn in_flight_percent(done: u64, total: Option<u64>) -> u8 {
    match total {
        Some(total) if total > 0 => {
            let pct = (u128::from(done) * 100 / u128::from(total)).min(u128::from(IN_FLIGHT_MAX));
            pct as u8
        }
        _ => 0,
    }
}

/// Decides which progress observations are worth reporting.
///
/// The first observation is always reported; afterwards only when progress
/// advances by more than `step` percentage points or reaches 100. Reported
/// values never decrease.
#[derive(Debug, Clone)]
pub struct ProgressSampler {
    step: u8,
    last: Option<u8>,
}

impl ProgressSampler {
    pub fn new(step: u8) -> Self {
        Self { step, last: None }
    }

    pub fn observe(&mut self, progress: u8) -> Option<u8> {
        let progress = progress.min(100);
        let report = match self.last {
            None => true,
            Some(last) if progress <= last => false,
            Some(last) => progress == 100 || progress - last > self.step,
        };
        if report {
            self.last = Some(progress);
            Some(progress)
        } else {
            None
        }
    }

    /// Last reported value.
    pub fn last(&self) -> Option<u8> {
        self.last
    }
}
