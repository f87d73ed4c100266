/// A bitrate change proposed by the estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BitrateSuggestion {
    /// Anchor before this suggestion was accepted.
    pub from_bps: u32,
    pub to_bps: u32,
    pub last_measured_bps: u32,
}

/// Receiver of bitrate suggestions.
///
/// Setting `cancel` asks the estimator to restore its previous anchor. With
/// asynchronous dispatch the request is advisory: the decision path has
/// usually moved on by the time the handler runs.
pub trait SuggestionHandler: Send + Sync {
    fn on_suggestion(&self, suggestion: &BitrateSuggestion, cancel: &mut bool);
}

impl<F> SuggestionHandler for F
where
    F: Fn(&BitrateSuggestion, &mut bool) + Send + Sync,
{
    fn on_suggestion(&self, suggestion: &BitrateSuggestion, cancel: &mut bool) {
        self(suggestion, cancel);
    }
}
