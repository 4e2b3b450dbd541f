use std::collections::HashMap;

use super::hypothesis::{HypId, Hypothesis, HypothesisArena};
use super::recombination::{RecombinationFilter, RecombinationKey};

/// Hypotheses of one coverage cardinality, capped at `capacity`.
///
/// Recombination happens in `offer`, before a candidate is stored, so a
/// merged loser never takes a slot. Complete hypotheses that lose a merge or
/// fall off the end are kept aside in `spill` for n-best extraction.
#[derive(Debug)]
pub struct Beam {
    capacity: usize,
    entries: Vec<HypId>,
    index: HashMap<RecombinationKey, usize>,
    spill: Vec<HypId>,
    recombined: usize,
}

impl Beam {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Vec::new(),
            index: HashMap::new(),
            spill: Vec::new(),
            recombined: 0,
        }
    }

    /// Insert `hyp` unless an equivalent, at-least-as-good hypothesis is
    /// already here. Returns the id of the stored hypothesis, if any.
    pub fn offer(
        &mut self,
        hyp: Hypothesis,
        arena: &mut HypothesisArena,
        filter: &RecombinationFilter,
    ) -> Option<HypId> {
        let Some(key) = filter.key(&hyp) else {
            let id = arena.push(hyp);
            self.entries.push(id);
            if self.shrink(arena) && !self.entries.contains(&id) {
                return None;
            }
            return Some(id);
        };

        if let Some(&pos) = self.index.get(&key) {
            self.recombined += 1;
            let incumbent = self.entries[pos];
            if hyp.score > arena.get(incumbent).score {
                let complete = hyp.is_complete();
                let id = arena.push(hyp);
                self.entries[pos] = id;
                if complete {
                    self.spill.push(incumbent);
                }
                return Some(id);
            }
            if hyp.is_complete() {
                let id = arena.push(hyp);
                self.spill.push(id);
            }
            return None;
        }

        let id = arena.push(hyp);
        self.index.insert(key, self.entries.len());
        self.entries.push(id);
        if self.shrink(arena) {
            self.reindex(arena, filter);
            // The newcomer may itself have been cut.
            if !self.entries.contains(&id) {
                return None;
            }
        }
        Some(id)
    }

    /// Sort best first and keep at most `capacity` entries.
    pub fn finalize(&mut self, arena: &HypothesisArena) -> &[HypId] {
        self.truncate(arena, self.capacity);
        self.index.clear();
        &self.entries
    }

    pub fn hyps(&self) -> &[HypId] {
        &self.entries
    }

    pub fn spill(&self) -> &[HypId] {
        &self.spill
    }

    pub fn recombined(&self) -> usize {
        self.recombined
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Keep memory bounded between finalizations: once twice the capacity
    /// is stored, cut back to capacity.
    fn shrink(&mut self, arena: &HypothesisArena) -> bool {
        if self.entries.len() <= self.capacity * 2 {
            return false;
        }
        self.truncate(arena, self.capacity);
        true
    }

    fn truncate(&mut self, arena: &HypothesisArena, keep: usize) {
        self.entries.sort_by(|&a, &b| {
            let (ha, hb) = (arena.get(a), arena.get(b));
            hb.rank_key().total_cmp(&ha.rank_key()).then(a.cmp(&b))
        });
        if self.entries.len() > keep {
            for &id in &self.entries[keep..] {
                if arena.get(id).is_complete() {
                    self.spill.push(id);
                }
            }
            self.entries.truncate(keep);
        }
    }

    fn reindex(&mut self, arena: &HypothesisArena, filter: &RecombinationFilter) {
        self.index.clear();
        for (pos, &id) in self.entries.iter().enumerate() {
            if let Some(key) = filter.key(arena.get(id)) {
                self.index.insert(key, pos);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::coverage::{Coverage, ItgStack, Span};
    use crate::model::LmState;
    use crate::settings::RecombinationMode;
    use crate::vocab::Symbol;

    fn hyp(end: usize, lm: u32, score: f64, len: usize) -> Hypothesis {
        Hypothesis {
            parent: None,
            option: None,
            coverage: Coverage::new(len).with_span(Span::new(0, end)),
            boundary: end,
            lm_state: LmState::new(&[Symbol(lm)]),
            itg: ItgStack::default(),
            score,
            future: 0.0,
            target_len: end,
            lm_logprob: 0.0,
            distortion: 0,
            refs: u64::MAX,
        }
    }

    fn exact() -> RecombinationFilter {
        RecombinationFilter::new(RecombinationMode::Exact, false, false, false)
    }

    #[test]
    fn better_duplicate_replaces_incumbent() {
        let mut arena = HypothesisArena::new();
        let mut beam = Beam::new(5);
        let f = exact();
        let first = beam.offer(hyp(2, 7, -3.0, 4), &mut arena, &f).unwrap();
        assert!(beam.offer(hyp(2, 7, -4.0, 4), &mut arena, &f).is_none());
        let better = beam.offer(hyp(2, 7, -1.0, 4), &mut arena, &f).unwrap();
        assert_ne!(first, better);
        assert_eq!(beam.hyps(), &[better]);
        assert_eq!(beam.recombined(), 2);
        // Partial losers are not kept.
        assert!(beam.spill().is_empty());
    }

    #[test]
    fn ties_keep_the_earlier_hypothesis() {
        let mut arena = HypothesisArena::new();
        let mut beam = Beam::new(5);
        let f = exact();
        let first = beam.offer(hyp(2, 7, -1.0, 4), &mut arena, &f).unwrap();
        assert!(beam.offer(hyp(2, 7, -1.0, 4), &mut arena, &f).is_none());
        assert_eq!(beam.hyps(), &[first]);
    }

    #[test]
    fn complete_losers_are_spilled() {
        let mut arena = HypothesisArena::new();
        let mut beam = Beam::new(5);
        let f = exact();
        beam.offer(hyp(3, 7, -1.0, 3), &mut arena, &f).unwrap();
        assert!(beam.offer(hyp(3, 7, -2.0, 3), &mut arena, &f).is_none());
        assert_eq!(beam.spill().len(), 1);
    }

    #[test]
    fn finalize_sorts_and_truncates() {
        let mut arena = HypothesisArena::new();
        let mut beam = Beam::new(2);
        let f = exact();
        for (lm, score) in [(1, -3.0), (2, -1.0), (3, -2.0), (4, -1.0)] {
            beam.offer(hyp(4, lm, score, 4), &mut arena, &f);
        }
        let kept: Vec<f64> = beam
            .finalize(&arena)
            .iter()
            .map(|&id| arena.get(id).score)
            .collect();
        assert_eq!(kept, vec![-1.0, -1.0]);
        // Equal scores come out in insertion order.
        assert!(beam.hyps()[0] < beam.hyps()[1]);
        assert_eq!(beam.spill().len(), 2);
    }

    #[test]
    fn no_recombination_keeps_duplicates() {
        let mut arena = HypothesisArena::new();
        let mut beam = Beam::new(5);
        let f = RecombinationFilter::new(RecombinationMode::None, false, false, false);
        beam.offer(hyp(2, 7, -1.0, 4), &mut arena, &f).unwrap();
        beam.offer(hyp(2, 7, -2.0, 4), &mut arena, &f).unwrap();
        assert_eq!(beam.len(), 2);
    }
}
