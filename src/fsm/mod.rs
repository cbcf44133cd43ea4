//! Function-pointer finite state machine engine.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                    │
//! │  ┌────────────────┬───────────┬──────────┬───────────────────┐ │
//! │  │ StateId        │ on_enter  │ on_exit  │ on_update         │ │
//! │  ├────────────────┼───────────┼──────────┼───────────────────┤ │
//! │  │ AwaitingStart  │ fn(ctx)   │    -     │ fn(ctx)->Option<> │ │
//! │  │ TrialSetup     │    -      │    -     │ fn(ctx)->Option<> │ │
//! │  │ WaitingForRest │    -      │    -     │ fn(ctx)->Option<> │ │
//! │  │ CountingDown   │    -      │    -     │ fn(ctx)->Option<> │ │
//! │  │ Trial          │ fn(ctx)   │    -     │ fn(ctx)->Option<> │ │
//! │  │ PostTrial      │ fn(ctx)   │    -     │ fn(ctx)->Option<> │ │
//! │  │ SessionEnd     │ fn(ctx)   │    -     │ fn(ctx)->Option<> │ │
//! │  └────────────────┴───────────┴──────────┴───────────────────┘ │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  Handlers receive `&mut C`; for the session this is
//! a [`SessionContext`](context::SessionContext).
//!
//! `WaitingForRest → CountingDown → (WaitingForRest | Trial)` is the ITI
//! sub-machine.

pub mod context;
pub mod states;

use log::debug;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Every state of a training session.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    AwaitingStart = 0,
    /// Session-end check, target draw, ITI monitoring armed.
    TrialSetup = 1,
    WaitingForRest = 2,
    CountingDown = 3,
    Trial = 4,
    /// Hold sized to the reward duration.
    PostTrial = 5,
    SessionEnd = 6,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 7;

    /// Convert an index back to `StateId`.  Out-of-range indices map to
    /// `SessionEnd`.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::AwaitingStart,
            1 => Self::TrialSetup,
            2 => Self::WaitingForRest,
            3 => Self::CountingDown,
            4 => Self::Trial,
            5 => Self::PostTrial,
            6 => Self::SessionEnd,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::SessionEnd
            }
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::SessionEnd
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn<C> = fn(&mut C);

/// Per-tick handler.  Returns `Some(next)` to trigger a transition.
pub type StateUpdateFn<C> = fn(&mut C) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
pub struct StateDescriptor<C> {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn<C>>,
    pub on_exit: Option<StateActionFn<C>>,
    pub on_update: StateUpdateFn<C>,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm<C> {
    /// Indexed by `StateId as usize`.
    table: [StateDescriptor<C>; StateId::COUNT],
    current: usize,
}

impl<C> Fsm<C> {
    pub fn new(table: [StateDescriptor<C>; StateId::COUNT], initial: StateId) -> Self {
        debug_assert!(
            table.iter().enumerate().all(|(i, d)| d.id as usize == i),
            "state table out of order"
        );
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter`.  Call once before the first `tick()`.
    pub fn start(&mut self, ctx: &mut C) {
        debug!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one tick.  Returns the state after the tick.
    pub fn tick(&mut self, ctx: &mut C) -> StateId {
        if let Some(next_id) = (self.table[self.current].on_update)(ctx) {
            self.transition(next_id, ctx);
        }
        self.current_state()
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    fn transition(&mut self, next_id: StateId, ctx: &mut C) {
        let next_idx = next_id as usize;

        debug!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
