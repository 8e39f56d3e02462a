//! Rolling balance-window counter

use crate::in_balance_band;

/// Counts consecutive in-band sensor readings
///
/// Any reading outside the band (including a lost ball) resets the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BalanceWindow {
    run: u32,
}

impl BalanceWindow {
    pub const fn new() -> Self {
        Self { run: 0 }
    }

    /// Feed one raw reading, returning the current run length
    pub fn observe(&mut self, raw: Option<f32>) -> u32 {
        if in_balance_band(raw) {
            self.run = self.run.saturating_add(1);
        } else {
            self.run = 0;
        }
        self.run
    }

    pub fn run(&self) -> u32 {
        self.run
    }

    pub fn reset(&mut self) {
        self.run = 0;
    }
}

/// Length of the longest contiguous in-band run over a reading sequence
pub fn longest_run<I>(readings: I) -> u32
where
    I: IntoIterator<Item = Option<f32>>,
{
    let mut window = BalanceWindow::new();
    readings
        .into_iter()
        .map(|raw| window.observe(raw))
        .max()
        .unwrap_or(0)
}
