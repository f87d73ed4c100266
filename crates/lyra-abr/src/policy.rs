//! Bitrate selection over the variant table.

use tracing::debug;

use crate::{AbrError, AbrOptions, AbrResult};

/// Decision state and rules for choosing the next bitrate.
///
/// Holds the sorted variant table, the allowed `[min, max]` window (always
/// table entries), the last suggested and last measured bitrates, and the
/// hysteresis settings. Lookups never fail: when nothing matches they fall
/// back to a playable bitrate.
#[derive(Clone, Debug)]
pub struct BitratePolicy {
    bandwidths: Vec<u32>,
    min_bound: u32,
    max_bound: u32,
    last_suggested: u32,
    last_measured: u32,
    ignore_downshift_tolerance: bool,
    upshift_padding: f64,
    downshift_tolerance: f64,
    upshift_in_steps: bool,
}

impl BitratePolicy {
    #[must_use]
    pub fn new(options: &AbrOptions) -> Self {
        Self {
            bandwidths: Vec::new(),
            min_bound: 0,
            max_bound: 0,
            last_suggested: 0,
            last_measured: 0,
            ignore_downshift_tolerance: false,
            upshift_padding: options.upshift_padding,
            downshift_tolerance: options.downshift_tolerance,
            upshift_in_steps: options.upshift_in_steps,
        }
    }

    /// Install the variant table. Resets the window to the table extremes and
    /// the last suggestion to the lowest entry.
    ///
    /// # Errors
    ///
    /// [`AbrError::EmptyBitrateTable`] when `bitrates` is empty.
    pub fn set_bandwidth_range(&mut self, bitrates: &[u32]) -> AbrResult<()> {
        let mut table = bitrates.to_vec();
        table.sort_unstable();
        table.dedup();
        let (Some(&lowest), Some(&highest)) = (table.first(), table.last()) else {
            return Err(AbrError::EmptyBitrateTable);
        };
        self.bandwidths = table;
        self.min_bound = lowest;
        self.max_bound = highest;
        self.last_suggested = lowest;
        debug!(
            variants = self.bandwidths.len(),
            lowest, highest, "bitrate table installed"
        );
        Ok(())
    }

    /// Restrict decisions to table entries within `[min, max]`.
    ///
    /// Equal values collapse the window to the entry closest to them. Otherwise
    /// the lower bound rounds up and the upper bound rounds down to table
    /// entries, so playback never leaves the caller's range. The last
    /// suggestion is re-snapped into the new window.
    ///
    /// # Errors
    ///
    /// [`AbrError::EmptyBitrateTable`] before a table is installed,
    /// [`AbrError::InvalidBounds`] when `min > max`, and
    /// [`AbrError::EmptyBoundsWindow`] when no entry lies in the range.
    pub fn set_bandwidth_bounds(&mut self, min: u32, max: u32) -> AbrResult<()> {
        let (Some(&lowest), Some(&highest)) = (self.bandwidths.first(), self.bandwidths.last())
        else {
            return Err(AbrError::EmptyBitrateTable);
        };

        if min == max {
            let only = closest_in(&self.bandwidths, max);
            self.min_bound = only;
            self.max_bound = only;
            self.last_suggested = only;
            debug!(bound = only, "bandwidth bounds collapsed");
            return Ok(());
        }
        if min > max {
            return Err(AbrError::InvalidBounds { min, max });
        }

        let min_bound = if min > lowest {
            self.bandwidths
                .iter()
                .copied()
                .find(|&b| b >= min)
                .ok_or(AbrError::EmptyBoundsWindow { min, max })?
        } else {
            lowest
        };
        let max_bound = if max < highest {
            self.bandwidths
                .iter()
                .rev()
                .copied()
                .find(|&b| b <= max)
                .ok_or(AbrError::EmptyBoundsWindow { min, max })?
        } else {
            highest
        };
        if min_bound > max_bound {
            return Err(AbrError::EmptyBoundsWindow { min, max });
        }

        self.min_bound = min_bound;
        self.max_bound = max_bound;
        self.last_suggested = self.find_closest_bitrate(self.last_suggested, false);
        debug!(
            min_bound,
            max_bound,
            last_suggested = self.last_suggested,
            "bandwidth bounds set"
        );
        Ok(())
    }

    /// Table entry numerically closest to `value`. Equidistant values resolve
    /// to the lower entry.
    ///
    /// With `ignore_bounds` the whole table is searched; otherwise values are
    /// clamped into the `[min, max]` window first.
    #[must_use]
    pub fn find_closest_bitrate(&self, value: u32, ignore_bounds: bool) -> u32 {
        if ignore_bounds {
            return closest_in(&self.bandwidths, value);
        }
        if self.min_bound == self.max_bound {
            return self.max_bound;
        }
        match self.window() {
            Some(window) => closest_in(window, value),
            None => self.min_bound,
        }
    }

    /// Largest entry strictly below `value`, clamped to the window.
    #[must_use]
    pub fn find_next_lower_bitrate(&self, value: u32) -> u32 {
        if self.min_bound == self.max_bound || value <= self.min_bound {
            return self.min_bound;
        }
        self.bandwidths
            .iter()
            .rev()
            .copied()
            .find(|&b| b < value)
            .map_or(self.min_bound, |b| b.clamp(self.min_bound, self.max_bound))
    }

    /// Smallest entry strictly above `value`, clamped to the window.
    #[must_use]
    pub fn find_next_higher_bitrate(&self, value: u32) -> u32 {
        if self.min_bound == self.max_bound {
            return self.min_bound;
        }
        if value >= self.max_bound {
            return self.max_bound;
        }
        self.bandwidths
            .iter()
            .copied()
            .find(|&b| b > value)
            .map_or(self.min_bound, |b| b.clamp(self.min_bound, self.max_bound))
    }

    /// Bitrate to play given a measured throughput in bits per second.
    ///
    /// Upshifts require the candidate inflated by the upshift padding to stay
    /// below the measurement. Downshifts happen once the measurement drops
    /// under the downshift tolerance and land one entry below the largest
    /// padded match, leaving headroom so the next segment is not immediately
    /// fetched twice. When no rule resolves a target the last suggestion is
    /// kept if the last measurement still exceeds it, otherwise the lower
    /// bound is returned.
    #[must_use]
    pub fn find_bitrate_to_switch_to(&self, measured: f64) -> u32 {
        if self.min_bound == self.max_bound {
            return self.max_bound;
        }
        if measured <= f64::from(self.min_bound) {
            return self.min_bound;
        }
        if !self.upshift_in_steps && measured >= self.padded(self.max_bound) {
            return self.max_bound;
        }

        let resolved = if measured > f64::from(self.last_suggested) {
            self.upshift_target(measured)
        } else if measured < self.downshift_threshold() {
            self.downshift_target(measured)
        } else {
            None
        };
        resolved.unwrap_or_else(|| self.fallback())
    }

    fn upshift_target(&self, measured: f64) -> Option<u32> {
        let window = self.window()?;
        if self.upshift_in_steps {
            let next = window
                .iter()
                .copied()
                .find(|&b| b > self.last_suggested)?;
            return (self.padded(next) < measured).then_some(next);
        }
        // The lower bound itself is never an upshift target.
        window
            .iter()
            .skip(1)
            .rev()
            .copied()
            .find(|&b| self.padded(b) < measured)
    }

    fn downshift_target(&self, measured: f64) -> Option<u32> {
        let window = self.window()?;
        let matched = (1..window.len())
            .rev()
            .find(|&i| window.get(i).is_some_and(|&b| self.padded(b) <= measured))?;
        window.get(matched - 1).copied()
    }

    fn downshift_threshold(&self) -> f64 {
        let factor = if self.ignore_downshift_tolerance {
            1.0
        } else {
            1.0 - self.downshift_tolerance
        };
        f64::from(self.last_suggested) * factor
    }

    fn fallback(&self) -> u32 {
        if self.last_suggested != 0 && self.last_measured > self.last_suggested {
            self.last_suggested
        } else {
            self.min_bound
        }
    }

    fn padded(&self, bitrate: u32) -> f64 {
        f64::from(bitrate) * (1.0 + self.upshift_padding)
    }

    fn window(&self) -> Option<&[u32]> {
        let lo = self.bandwidths.binary_search(&self.min_bound).ok()?;
        let hi = self.bandwidths.binary_search(&self.max_bound).ok()?;
        self.bandwidths.get(lo..=hi)
    }

    #[must_use]
    pub fn bandwidths(&self) -> &[u32] {
        &self.bandwidths
    }

    #[must_use]
    pub fn bounds(&self) -> (u32, u32) {
        (self.min_bound, self.max_bound)
    }

    #[must_use]
    pub fn last_suggested(&self) -> u32 {
        self.last_suggested
    }

    pub fn set_last_suggested(&mut self, bitrate: u32) {
        self.last_suggested = bitrate;
    }

    #[must_use]
    pub fn last_measured(&self) -> u32 {
        self.last_measured
    }

    pub fn set_last_measured(&mut self, bitrate: u32) {
        self.last_measured = bitrate;
    }

    #[must_use]
    pub fn ignore_downshift_tolerance(&self) -> bool {
        self.ignore_downshift_tolerance
    }

    pub fn set_ignore_downshift_tolerance(&mut self, ignore: bool) {
        self.ignore_downshift_tolerance = ignore;
    }
}

fn closest_in(window: &[u32], value: u32) -> u32 {
    let (Some(&first), Some(&last)) = (window.first(), window.last()) else {
        return 0;
    };
    if value <= first {
        return first;
    }
    if value >= last {
        return last;
    }
    let idx = window.partition_point(|&b| b < value);
    let (lo, hi) = (window[idx - 1], window[idx]);
    if value - lo <= hi - value { lo } else { hi }
}
