use tracing::{debug, debug_span};

use super::beam::Beam;
use super::hypothesis::HypothesisArena;
use super::search::{SearchContext, SearchOutcome};

/// Stack decoding with one beam per number of covered source words.
///
/// Stack `c` is finalized (sorted and cut to the beam size) before any of
/// its hypotheses is expanded, and expansions only ever feed stacks with a
/// larger cardinality, so one left-to-right sweep suffices.
pub fn search(ctx: &SearchContext<'_>, arena: &mut HypothesisArena) -> SearchOutcome {
    let n = ctx.source_len();
    let _span = debug_span!("multibeam", len = n, beam = ctx.beam_size).entered();

    let mut stacks: Vec<Beam> = (0..=n).map(|_| Beam::new(ctx.beam_size)).collect();
    let root = ctx.root();
    stacks[0].offer(root, arena, ctx.recombination);

    let spans: Vec<_> = ctx.options.spans().collect();
    let mut expansions = 0;

    for c in 0..n {
        let (head, tail) = stacks.split_at_mut(c + 1);
        let current = head[c].finalize(arena).to_vec();
        for id in current {
            for &span in &spans {
                if !ctx.is_eligible(arena.get(id), span) {
                    continue;
                }
                let target = &mut tail[span.len() - 1];
                expansions += ctx.expand_span(arena, id, span, target);
            }
        }
        debug!(stack = c, size = head[c].len(), "stack expanded");
    }

    stacks[n].finalize(arena);
    let recombined = stacks.iter().map(Beam::recombined).sum();
    let outcome = SearchOutcome::from_final_beam(&stacks[n], arena, expansions, recombined);
    debug!(
        complete = outcome.complete.len(),
        expansions,
        recombined,
        "multibeam search done"
    );
    outcome
}
