//! Owned pane trees, used to describe a tab's layout on the way in and out
//! of the arena.

use super::SplitDirection;
use serde::{Deserialize, Serialize};

/// Smallest and largest share either side of a split may take.
const MIN_RATIO: f32 = 0.1;
const MAX_RATIO: f32 = 0.9;

/// A binary tree of panes. `P` is whatever a leaf carries: a spawn request,
/// an arena pane, or a serialized pane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PaneTree<P> {
    Leaf(P),
    Split {
        direction: SplitDirection,
        /// Share of the first child (0.1 - 0.9).
        ratio: f32,
        /// Top or left child
        first: Box<PaneTree<P>>,
        /// Bottom or right child
        second: Box<PaneTree<P>>,
    },
}

impl<P> PaneTree<P> {
    pub fn leaf(pane: P) -> Self {
        PaneTree::Leaf(pane)
    }

    pub fn split(direction: SplitDirection, ratio: f32, first: Self, second: Self) -> Self {
        PaneTree::Split {
            direction,
            ratio: clamp_ratio(ratio),
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    /// Leaves in first-to-second order.
    pub fn leaves(&self) -> Vec<&P> {
        match self {
            PaneTree::Leaf(pane) => vec![pane],
            PaneTree::Split { first, second, .. } => {
                let mut leaves = first.leaves();
                leaves.extend(second.leaves());
                leaves
            }
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            PaneTree::Leaf(_) => 1,
            PaneTree::Split { first, second, .. } => first.leaf_count() + second.leaf_count(),
        }
    }

    /// Replace every leaf, visiting them in first-to-second order.
    pub fn map<Q>(self, f: &mut impl FnMut(P) -> Q) -> PaneTree<Q> {
        match self {
            PaneTree::Leaf(pane) => PaneTree::Leaf(f(pane)),
            PaneTree::Split {
                direction,
                ratio,
                first,
                second,
            } => {
                let first = first.map(f);
                let second = second.map(f);
                PaneTree::Split {
                    direction,
                    ratio,
                    first: Box::new(first),
                    second: Box::new(second),
                }
            }
        }
    }

    /// Like [`map`](Self::map), stopping at the first error.
    pub fn try_map<Q, E>(self, f: &mut impl FnMut(P) -> Result<Q, E>) -> Result<PaneTree<Q>, E> {
        match self {
            PaneTree::Leaf(pane) => Ok(PaneTree::Leaf(f(pane)?)),
            PaneTree::Split {
                direction,
                ratio,
                first,
                second,
            } => {
                let first = first.try_map(f)?;
                let second = second.try_map(f)?;
                Ok(PaneTree::Split {
                    direction,
                    ratio,
                    first: Box::new(first),
                    second: Box::new(second),
                })
            }
        }
    }
}

pub(crate) fn clamp_ratio(ratio: f32) -> f32 {
    if ratio.is_nan() {
        0.5
    } else {
        ratio.clamp(MIN_RATIO, MAX_RATIO)
    }
}
