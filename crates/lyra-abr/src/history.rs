/// Summary of one averaging tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HistorySummary {
    pub average: f64,
    /// Most recent sample of the tick.
    pub last: f64,
    /// Population standard deviation, or zero below three samples.
    pub std_dev: f64,
    pub samples: usize,
}

/// Rates of downloads completed since the last averaging tick.
#[derive(Clone, Debug, Default)]
pub struct BitrateHistory {
    rates: Vec<f64>,
}

impl BitrateHistory {
    const MIN_SAMPLES_FOR_STD_DEV: usize = 3;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rate: f64) {
        self.rates.push(rate);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Summarize the collected rates and start a new window.
    #[expect(
        clippy::cast_precision_loss,
        reason = "sample counts per tick are small"
    )]
    pub fn summarize_and_clear(&mut self) -> Option<HistorySummary> {
        let last = *self.rates.last()?;
        let samples = self.rates.len();
        let n = samples as f64;
        let average = self.rates.iter().sum::<f64>() / n;
        let std_dev = if samples >= Self::MIN_SAMPLES_FOR_STD_DEV {
            let variance = self
                .rates
                .iter()
                .map(|r| (r - average).powi(2))
                .sum::<f64>()
                / n;
            variance.sqrt()
        } else {
            0.0
        };
        self.rates.clear();
        Some(HistorySummary {
            average,
            last,
            std_dev,
            samples,
        })
    }
}
