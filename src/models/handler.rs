//! Handler trees: nested shift-state dispatch over actions.
//!
//! A handler tree either carries exactly one action (the leaf case, used
//! when no further shift levels apply) or a contiguous run of shift
//! handlers whose state ranges tile the owning shift level without gaps or
//! overlaps. Trees are built incrementally — children arrive in document
//! order and out-of-order ranges are rejected rather than reordered — and
//! checked for completeness when their enclosing element closes.

use crate::models::action::Action;
use crate::models::control::Control;
use anyhow::Result;

/// A child of a handler tree: either the leaf action or a nested shift
/// handler for a range of the next shift level's states.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerChild {
    /// Leaf: the action selected when no further shift levels apply.
    Action(Action),
    /// Branch: dispatch for a contiguous range of shift states.
    Shift(ShiftHandler),
}

/// Decision tree node selecting an action from nested shift-level ranges.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandlerTree {
    children: Vec<HandlerChild>,
}

/// A handler tree branch covering the inclusive shift-state range
/// `from_state..=to_state` of one shift level.
#[derive(Debug, Clone, PartialEq)]
pub struct ShiftHandler {
    from_state: i32,
    to_state: i32,
    tree: HandlerTree,
}

impl ShiftHandler {
    /// Creates a shift handler for an inclusive, non-inverted state range.
    pub fn new(from_state: i32, to_state: i32) -> Result<Self> {
        if from_state < 0 {
            anyhow::bail!("Shift range cannot start below state 0 (got {})", from_state);
        }
        if to_state < from_state {
            anyhow::bail!(
                "Shift range is inverted ({}..{})",
                from_state,
                to_state
            );
        }
        Ok(Self {
            from_state,
            to_state,
            tree: HandlerTree::new(),
        })
    }

    /// Inclusive lower bound of the covered state range.
    #[must_use]
    pub const fn from_state(&self) -> i32 {
        self.from_state
    }

    /// Inclusive upper bound of the covered state range.
    #[must_use]
    pub const fn to_state(&self) -> i32 {
        self.to_state
    }

    /// The subtree dispatched to for states in this range.
    #[must_use]
    pub const fn tree(&self) -> &HandlerTree {
        &self.tree
    }

    /// Mutable access to the subtree, for incremental construction.
    pub fn tree_mut(&mut self) -> &mut HandlerTree {
        &mut self.tree
    }
}

impl HandlerTree {
    /// Creates an empty (incomplete) tree.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            children: Vec::new(),
        }
    }

    /// Children in document order.
    #[must_use]
    pub fn children(&self) -> &[HandlerChild] {
        &self.children
    }

    /// The highest state covered so far, if any shift children exist.
    #[must_use]
    pub fn last_to_state(&self) -> Option<i32> {
        self.children.iter().rev().find_map(|child| match child {
            HandlerChild::Shift(handler) => Some(handler.to_state()),
            HandlerChild::Action(_) => None,
        })
    }

    /// Adds the leaf action. Legal only on a tree with no children yet.
    pub fn add_action(&mut self, action: Action) -> Result<()> {
        if !self.children.is_empty() {
            anyhow::bail!("A handler tree holds either a single action or shift handlers");
        }
        self.children.push(HandlerChild::Action(action));
        Ok(())
    }

    /// Adds a shift handler. Its range must start exactly one past the
    /// last covered state (state 0 for the first handler).
    pub fn add_shift(&mut self, handler: ShiftHandler) -> Result<()> {
        if matches!(self.children.first(), Some(HandlerChild::Action(_))) {
            anyhow::bail!("A handler tree with an action cannot also hold shift handlers");
        }
        let expected_from = self.last_to_state().map_or(0, |last| last + 1);
        if handler.from_state() != expected_from {
            anyhow::bail!(
                "Shift ranges must be contiguous and ascending: expected range to start at state {}, got {}",
                expected_from,
                handler.from_state()
            );
        }
        self.children.push(HandlerChild::Shift(handler));
        Ok(())
    }

    /// Completeness against the state count of the shift level this tree
    /// dispatches over.
    ///
    /// With `expected_states == 0` (no further shift levels) the tree is
    /// complete iff it holds exactly one action child. Otherwise it is
    /// complete iff its shift children tile `0..expected_states` exactly.
    #[must_use]
    pub fn is_complete(&self, expected_states: usize) -> bool {
        if expected_states == 0 {
            return self.children.len() == 1
                && matches!(self.children[0], HandlerChild::Action(_));
        }
        // Children are contiguous from 0 by construction, so the last
        // covered state decides.
        self.last_to_state() == Some(expected_states as i32 - 1)
    }

    /// Deep completeness: this node against `state_counts[0]`, every shift
    /// child's subtree against the remaining counts.
    #[must_use]
    pub fn is_complete_deep(&self, state_counts: &[usize]) -> bool {
        let expected = state_counts.first().copied().unwrap_or(0);
        if !self.is_complete(expected) {
            return false;
        }
        self.children.iter().all(|child| match child {
            HandlerChild::Action(_) => true,
            HandlerChild::Shift(handler) => handler.tree().is_complete_deep(&state_counts[1..]),
        })
    }

    /// Depth-first traversal across exactly `remaining_levels` more levels
    /// of shift nesting, assigning each leaf action the next 1-based
    /// distinct-state index.
    ///
    /// At depth 0 every action child is visited in order through
    /// [`StateVisitor::leaf`]. At greater depths every shift child is
    /// recursed into, bracketed by [`StateVisitor::enter_branch`] and
    /// [`StateVisitor::leave_branch`] — which is how nested dispatch
    /// emission and action numbering happen in a single pass. Indices
    /// continue from `*next_index`, so one counter can be threaded across
    /// several trees; traversal order is the document order of the nested
    /// ranges, making the numbering deterministic.
    pub fn fold_states(
        &self,
        control: Control,
        remaining_levels: usize,
        next_index: &mut usize,
        visitor: &mut dyn StateVisitor,
    ) {
        if remaining_levels == 0 {
            for child in &self.children {
                if let HandlerChild::Action(action) = child {
                    *next_index += 1;
                    visitor.leaf(control, *next_index, action);
                }
            }
            return;
        }
        for child in &self.children {
            if let HandlerChild::Shift(handler) = child {
                visitor.enter_branch(control, handler);
                handler
                    .tree()
                    .fold_states(control, remaining_levels - 1, next_index, visitor);
                visitor.leave_branch(control, handler);
            }
        }
    }
}

/// Visitor for [`HandlerTree::fold_states`].
pub trait StateVisitor {
    /// Called for each leaf action with its 1-based distinct-state index.
    fn leaf(&mut self, control: Control, index: usize, action: &Action);

    /// Called immediately before recursing into a shift handler.
    fn enter_branch(&mut self, _control: Control, _handler: &ShiftHandler) {}

    /// Called immediately after recursing into a shift handler.
    fn leave_branch(&mut self, _control: Control, _handler: &ShiftHandler) {}
}
