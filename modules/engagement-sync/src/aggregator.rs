//! Merge partial per-recipient views of one campaign into one record per
//! recipient.
//!
//! Every operation applied during a merge is a sum, a logical OR or a
//! severity max, so the result does not depend on the order in which sources
//! are merged.

use std::collections::{BTreeMap, HashSet};

use crate::types::{normalize_email, Metric, PartialSource, RecipientActivity, SourceShape};

#[derive(Debug, Default)]
pub struct EngagementAggregator {
    records: BTreeMap<String, RecipientActivity>,
}

impl EngagementAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one source into the running set of records.
    pub fn merge(&mut self, source: &PartialSource) {
        // Presence sources count an (email, metric) pair once.
        let mut seen: HashSet<(String, Option<Metric>)> = HashSet::new();
        let mut skipped = 0usize;

        for observation in &source.observations {
            let Some(email) = normalize_email(&observation.email) else {
                skipped += 1;
                continue;
            };

            let contribution = match source.shape {
                SourceShape::EventLog => observation.count,
                SourceShape::Presence => {
                    if seen.insert((email.clone(), observation.metric)) {
                        1
                    } else {
                        0
                    }
                }
            };

            let record = self
                .records
                .entry(email.clone())
                .or_insert_with(|| RecipientActivity::new(&email));

            match observation.metric {
                Some(Metric::Opens) => record.opens = record.opens.saturating_add(contribution),
                Some(Metric::Clicks) => record.clicks = record.clicks.saturating_add(contribution),
                Some(Metric::Bounces) => {
                    record.bounces = record.bounces.saturating_add(contribution)
                }
                None => {}
            }

            if let Some(bounce_type) = &observation.bounce_type {
                record.bounce_type = Some(match record.bounce_type.take() {
                    Some(current) => more_severe(current, bounce_type),
                    None => bounce_type.clone(),
                });
            }
            record.spam |= observation.spam;
        }

        if skipped > 0 {
            tracing::debug!(source = %source.label, skipped, "Skipped observations without email");
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by normalized email.
    pub fn finish(self) -> Vec<RecipientActivity> {
        self.records.into_values().collect()
    }
}

/// Merge any number of sources for a single campaign.
pub fn aggregate<'a, I>(sources: I) -> Vec<RecipientActivity>
where
    I: IntoIterator<Item = &'a PartialSource>,
{
    let mut aggregator = EngagementAggregator::new();
    for source in sources {
        aggregator.merge(source);
    }
    aggregator.finish()
}

fn severity(bounce_type: &str) -> u8 {
    match bounce_type {
        "hard" => 2,
        "soft" => 1,
        _ => 0,
    }
}

/// Keep the more severe bounce type; ties fall back to lexical order.
fn more_severe(current: String, other: &str) -> String {
    let a = (severity(&current), current.as_str());
    let b = (severity(other), other);
    if b > a {
        other.to_string()
    } else {
        current
    }
}
