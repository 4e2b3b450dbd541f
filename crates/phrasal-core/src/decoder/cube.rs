//! Cube pruning.
//!
//! For each target stack, candidates are grouped into cubes: one per
//! (source coverage, span) pair, with hypotheses sorted by score on one axis
//! and the span's options sorted by static score on the other. A single
//! priority queue over all cubes yields the best unexplored corner; popping
//! a corner pushes its two successors. At most `pop_limit` corners are
//! popped per stack.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::ops::Range;

use tracing::{debug, debug_span};

use super::beam::Beam;
use super::coverage::{Coverage, Span};
use super::hypothesis::{HypId, Hypothesis, HypothesisArena};
use super::options::OptionId;
use super::search::{SearchContext, SearchOutcome};

struct Cube {
    hyps: Vec<HypId>,
    options: Range<OptionId>,
}

struct Corner {
    key: f64,
    seq: u64,
    cube: usize,
    i: usize,
    j: usize,
    hyp: Hypothesis,
}

impl PartialEq for Corner {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Corner {}

impl PartialOrd for Corner {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Corner {
    // Max-heap: higher key first, then earlier push.
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .total_cmp(&other.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Frontier<'c> {
    cubes: &'c [Cube],
    heap: BinaryHeap<Corner>,
    visited: HashSet<(usize, usize, usize)>,
    seq: u64,
    expansions: usize,
}

impl<'c> Frontier<'c> {
    fn new(cubes: &'c [Cube]) -> Self {
        Self {
            cubes,
            heap: BinaryHeap::new(),
            visited: HashSet::new(),
            seq: 0,
            expansions: 0,
        }
    }

    /// Score corner `(i, j)` of `cube` and queue it. Corners whose extension
    /// is rejected are skipped over: their successors are tried instead.
    fn push(&mut self, ctx: &SearchContext<'_>, arena: &HypothesisArena, cube: usize, i: usize, j: usize) {
        let cubes = self.cubes;
        let mut pending = vec![(i, j)];
        while let Some((i, j)) = pending.pop() {
            let c = &cubes[cube];
            if i >= c.hyps.len() || j >= c.options.len() || !self.visited.insert((cube, i, j)) {
                continue;
            }
            let opt = c.options.start + j as OptionId;
            self.expansions += 1;
            match ctx.extend(arena, c.hyps[i], opt) {
                Some(hyp) => {
                    self.heap.push(Corner {
                        key: hyp.rank_key(),
                        seq: self.seq,
                        cube,
                        i,
                        j,
                        hyp,
                    });
                    self.seq += 1;
                }
                None => {
                    pending.push((i, j + 1));
                    pending.push((i + 1, j));
                }
            }
        }
    }
}

pub fn search(ctx: &SearchContext<'_>, arena: &mut HypothesisArena) -> SearchOutcome {
    let n = ctx.source_len();
    let _span = debug_span!("cube", len = n, beam = ctx.beam_size, pops = ctx.pop_limit).entered();

    let mut stacks: Vec<Beam> = (0..=n).map(|_| Beam::new(ctx.beam_size)).collect();
    stacks[0].offer(ctx.root(), arena, ctx.recombination);
    stacks[0].finalize(arena);

    let max_len = ctx.options.max_phrase_length();
    let spans: Vec<Span> = ctx.options.spans().collect();
    let mut expansions = 0;

    for c in 1..=n {
        let cubes = build_cubes(ctx, arena, &stacks, &spans, c, max_len);
        let mut frontier = Frontier::new(&cubes);
        for cube in 0..cubes.len() {
            frontier.push(ctx, arena, cube, 0, 0);
        }

        let beam = &mut stacks[c];
        let mut pops = 0;
        while pops < ctx.pop_limit {
            let Some(corner) = frontier.heap.pop() else {
                break;
            };
            pops += 1;
            beam.offer(corner.hyp, arena, ctx.recombination);
            frontier.push(ctx, arena, corner.cube, corner.i + 1, corner.j);
            frontier.push(ctx, arena, corner.cube, corner.i, corner.j + 1);
        }
        expansions += frontier.expansions;
        beam.finalize(arena);
        debug!(stack = c, cubes = cubes.len(), pops, size = beam.len(), "stack filled");
    }

    let recombined = stacks.iter().map(Beam::recombined).sum();
    let outcome = SearchOutcome::from_final_beam(&stacks[n], arena, expansions, recombined);
    debug!(
        complete = outcome.complete.len(),
        expansions,
        recombined,
        "cube pruning done"
    );
    outcome
}

/// Cubes feeding stack `c`: for every phrase length, group the source
/// stack by coverage and pair each group with the free spans it may take.
fn build_cubes(
    ctx: &SearchContext<'_>,
    arena: &HypothesisArena,
    stacks: &[Beam],
    spans: &[Span],
    c: usize,
    max_len: usize,
) -> Vec<Cube> {
    let mut cubes = Vec::new();
    for len in 1..=max_len.min(c) {
        let mut order: Vec<Coverage> = Vec::new();
        let mut groups: HashMap<Coverage, Vec<HypId>> = HashMap::new();
        for &id in stacks[c - len].hyps() {
            let cov = &arena.get(id).coverage;
            if !groups.contains_key(cov) {
                order.push(cov.clone());
            }
            groups.entry(cov.clone()).or_default().push(id);
        }

        for cov in &order {
            let group = &groups[cov];
            for &span in spans.iter().filter(|s| s.len() == len && cov.is_free(**s)) {
                let mut hyps: Vec<HypId> = group
                    .iter()
                    .copied()
                    .filter(|&id| ctx.is_eligible(arena.get(id), span))
                    .collect();
                if hyps.is_empty() {
                    continue;
                }
                hyps.sort_by(|&a, &b| {
                    arena
                        .get(b)
                        .score
                        .total_cmp(&arena.get(a).score)
                        .then(a.cmp(&b))
                });
                cubes.push(Cube {
                    hyps,
                    options: ctx.options.ids_for(span),
                });
            }
        }
    }
    cubes
}
