use crate::sequence::Sequence;
use crate::settings::MAX_FORCE_DECODE_REFERENCES;
use crate::vocab::Symbol;

use super::DecodeError;

/// Reference translations a force-decoded sentence must reproduce.
///
/// Each hypothesis carries a bitmask of the references its output is still
/// consistent with; an extension survives while at least one bit remains.
/// In prefix mode a reference only constrains the output positions it
/// covers, and output beyond its end is unconstrained.
#[derive(Debug, Clone)]
pub struct ReferenceConstraint {
    references: Vec<Sequence>,
    prefix: bool,
}

impl ReferenceConstraint {
    pub fn new(references: Vec<Sequence>, prefix: bool) -> Result<Self, DecodeError> {
        if references.is_empty() {
            return Err(DecodeError::Configuration(
                "force decoding needs at least one reference".to_string(),
            ));
        }
        if references.len() > MAX_FORCE_DECODE_REFERENCES {
            return Err(DecodeError::CapacityExceeded {
                what: "force-decode references",
                value: references.len(),
                limit: MAX_FORCE_DECODE_REFERENCES,
            });
        }
        Ok(Self { references, prefix })
    }

    /// Mask with one bit set per reference.
    pub fn initial_mask(&self) -> u64 {
        if self.references.len() == 64 {
            u64::MAX
        } else {
            (1u64 << self.references.len()) - 1
        }
    }

    /// References still matched after appending `phrase` at output position
    /// `pos`. `complete` marks the final phrase of a derivation. `None`
    /// means the extension diverges from every reference.
    pub fn advance(&self, mask: u64, pos: usize, phrase: &[Symbol], complete: bool) -> Option<u64> {
        let mut next = 0u64;
        for (i, reference) in self.references.iter().enumerate() {
            if mask & (1 << i) == 0 {
                continue;
            }
            if self.matches(reference, pos, phrase, complete) {
                next |= 1 << i;
            }
        }
        (next != 0).then_some(next)
    }

    fn matches(&self, reference: &[Symbol], pos: usize, phrase: &[Symbol], complete: bool) -> bool {
        let end = pos + phrase.len();
        if self.prefix {
            if pos >= reference.len() {
                return true;
            }
            let overlap = end.min(reference.len());
            if reference[pos..overlap] != phrase[..overlap - pos] {
                return false;
            }
            // A finished output must at least reach the end of the prefix.
            !complete || end >= reference.len()
        } else {
            end <= reference.len()
                && reference[pos..end] == *phrase
                && (!complete || end == reference.len())
        }
    }
}
