//! Every tip received, indexed by security (working set, pruned as tips
//! expire) and by source (permanent track record).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{Prediction, SecurityId, SourceEntry, SourceId};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PredictionRegistry {
    by_security: BTreeMap<SecurityId, Vec<Prediction>>,
    by_source: BTreeMap<SourceId, Vec<SourceEntry>>,
    next_seq: u64,
}

impl PredictionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens an (empty) prediction list for a security.
    pub fn track(&mut self, security: SecurityId) {
        self.by_security.entry(security).or_default();
    }

    /// Records a tip in both indexes. Repeats are kept as-is.
    pub fn record(
        &mut self,
        security: SecurityId,
        price: f64,
        target_time: f64,
        source: SourceId,
        arrival_time: f64,
    ) -> &Prediction {
        let seq = self.next_seq;
        self.next_seq += 1;

        self.by_source
            .entry(source.clone())
            .or_default()
            .push(SourceEntry {
                security: security.clone(),
                price,
                target_time,
            });

        let list = self.by_security.entry(security.clone()).or_default();
        list.push(Prediction {
            security,
            price,
            target_time,
            source,
            arrival_time,
            seq,
        });
        &list[list.len() - 1]
    }

    pub fn predictions(&self, security: &SecurityId) -> &[Prediction] {
        self.by_security
            .get(security)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn all_predictions(&self) -> impl Iterator<Item = &Prediction> {
        self.by_security.values().flatten()
    }

    pub fn sources(&self) -> &BTreeMap<SourceId, Vec<SourceEntry>> {
        &self.by_source
    }

    pub fn source_record(&self, source: &SourceId) -> &[SourceEntry] {
        self.by_source
            .get(source)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_security.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops working-set predictions whose target time is strictly before
    /// `now`. Source records are untouched.
    pub fn prune_expired(&mut self, now: f64) -> Vec<Prediction> {
        let mut removed = Vec::new();
        for list in self.by_security.values_mut() {
            let expired: Vec<usize> = list
                .iter()
                .enumerate()
                .filter(|(_, p)| p.target_time < now)
                .map(|(i, _)| i)
                .collect();
            if expired.is_empty() {
                continue;
            }
            let old = std::mem::take(list);
            let mut next = expired.iter().peekable();
            for (i, p) in old.into_iter().enumerate() {
                if next.peek() == Some(&&i) {
                    next.next();
                    removed.push(p);
                } else {
                    list.push(p);
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sec(s: &str) -> SecurityId {
        SecurityId(s.into())
    }

    fn src(s: &str) -> SourceId {
        SourceId(s.into())
    }

    #[test]
    fn indexes_by_security_and_source_without_dedup() {
        let mut reg = PredictionRegistry::new();
        reg.record(sec("X"), 105.0, 120.0, src("a"), 100.0);
        reg.record(sec("X"), 105.0, 120.0, src("a"), 101.0);
        reg.record(sec("Y"), 50.0, 130.0, src("a"), 102.0);

        assert_eq!(reg.predictions(&sec("X")).len(), 2);
        assert_eq!(reg.source_record(&src("a")).len(), 3);
        let seqs: Vec<u64> = reg.predictions(&sec("X")).iter().map(|p| p.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    fn prune_removes_every_expired_entry_and_keeps_records() {
        let mut reg = PredictionRegistry::new();
        // Adjacent expired entries are the case an in-place removal loop skips.
        reg.record(sec("X"), 1.0, 10.0, src("a"), 0.0);
        reg.record(sec("X"), 2.0, 11.0, src("a"), 0.0);
        reg.record(sec("X"), 3.0, 50.0, src("b"), 0.0);
        reg.record(sec("X"), 4.0, 12.0, src("b"), 0.0);

        let removed = reg.prune_expired(20.0);
        assert_eq!(removed.len(), 3);
        let left: Vec<f64> = reg.predictions(&sec("X")).iter().map(|p| p.price).collect();
        assert_eq!(left, vec![3.0]);
        assert_eq!(reg.source_record(&src("a")).len(), 2);
        assert_eq!(reg.source_record(&src("b")).len(), 2);
    }

    #[test]
    fn target_equal_to_now_is_not_expired() {
        let mut reg = PredictionRegistry::new();
        reg.record(sec("X"), 1.0, 20.0, src("a"), 0.0);
        assert!(reg.prune_expired(20.0).is_empty());
        assert_eq!(reg.len(), 1);
    }
}
