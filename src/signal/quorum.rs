//! Quorum signals: k-of-N composition.
//!
//! A quorum is a signal that fires once at least `k` of its member
//! signals have fired. The two everyday shapes are [`any`] (k = 1) and
//! [`all`] (k = N); the machinery is shared.
//!
//! A quorum keeps strong handles to its unfired members and registers a
//! weak listener token on each of them. When a member fires it calls back
//! here; the quorum drops that member, bumps its count and, on reaching
//! the threshold, fires itself — first deregistering from every remaining
//! member so late member triggers cannot re-enter a terminal quorum.
//!
//! Interest tokens ride the same structure: [`interest_token`] builds a
//! 1-quorum with no members and one pending interest. Enclosing quorums
//! inherit a wants-interest mark, and when a task finally suspends on a
//! marked signal the awaiter walks the marked chain once, binding the
//! task's own interest signal as a member of each marked quorum. The walk
//! recurses over a local copy of the marked members because a binding can
//! satisfy a quorum and tear the current one down mid-walk.

use std::rc::Rc;

use smallvec::SmallVec;

use super::{Listener, Signal, SignalInner};

/// Member bookkeeping for a quorum signal.
pub(crate) struct QuorumState {
    /// Unfired members, held strongly. Dropped on any terminal
    /// transition, after deregistering our listener token from each.
    members: SmallVec<[Signal; 3]>,
    /// How many members have fired (or arrived already fired).
    triggered_count: u32,
    /// The threshold k.
    quorum: u32,
    /// Interest tokens not yet bound to a waiting task.
    pending_interest: u32,
}

impl QuorumState {
    fn new(quorum: u32) -> Self {
        Self {
            members: SmallVec::new(),
            triggered_count: 0,
            quorum,
            pending_interest: 0,
        }
    }

    fn met(&self) -> bool {
        self.triggered_count >= self.quorum
    }
}

/// Returns a signal that triggers when any of `signals` triggers.
///
/// With no arguments the result is already triggered; a single signal is
/// passed through unchanged.
pub fn any(signals: impl IntoIterator<Item = Signal>) -> Signal {
    compose_threshold(signals, |_| 1)
}

/// Returns a signal that triggers once every one of `signals` has
/// triggered.
///
/// With no arguments the result is already triggered; a single signal is
/// passed through unchanged.
pub fn all(signals: impl IntoIterator<Item = Signal>) -> Signal {
    compose_threshold(signals, |n| n)
}

fn compose_threshold(
    signals: impl IntoIterator<Item = Signal>,
    threshold: impl FnOnce(u32) -> u32,
) -> Signal {
    let mut members: SmallVec<[Signal; 4]> = signals.into_iter().collect();
    match members.len() {
        0 => Signal::ready(),
        1 => members.pop().expect("length checked"),
        n => {
            let n = u32::try_from(n).expect("member count fits in u32");
            compose(threshold(n), members)
        }
    }
}

/// Builds a quorum signal over `members` with threshold `quorum`.
///
/// Members that are already triggered count immediately without being
/// registered; if the initial population meets the threshold the quorum
/// triggers before it is returned.
fn compose(quorum: u32, members: SmallVec<[Signal; 4]>) -> Signal {
    let inner = Rc::new(SignalInner::with_quorum(QuorumState::new(quorum)));
    let met = {
        let mut slot = inner.quorum_state().borrow_mut();
        let state = slot.as_mut().expect("quorum state just installed");
        for member in members {
            add_member(&inner, state, member);
        }
        state.met()
    };
    if met {
        inner.trigger();
    }
    Signal::from_inner(inner)
}

/// Returns the bare interest token (see [`Signal::interest`]): a
/// 1-quorum with no members and one unbound interest.
pub(crate) fn interest_token() -> Signal {
    let inner = Rc::new(SignalInner::with_quorum(QuorumState {
        members: SmallVec::new(),
        triggered_count: 0,
        quorum: 1,
        pending_interest: 1,
    }));
    inner.set_wants_interest(true);
    Signal::from_inner(inner)
}

/// Adds one member to `state`, registering `q` as its listener.
///
/// Wants-interest marks propagate upward here, at composition time.
fn add_member(q: &Rc<SignalInner>, state: &mut QuorumState, member: Signal) {
    {
        let Some(m_inner) = member.inner() else {
            state.triggered_count += 1;
            return;
        };
        if m_inner.triggered() {
            state.triggered_count += 1;
            return;
        }
        if m_inner.wants_interest() {
            q.set_wants_interest(true);
        }
        m_inner.add_listener(Listener::Quorum(Rc::downgrade(q)));
    }
    state.members.push(member);
}

/// Member callback: `child` (identified by address) has fired.
///
/// Every occurrence of the child counts; a duplicated member therefore
/// contributes its multiplicity. A quorum that has already reached its
/// terminal state ignores the call.
pub(crate) fn trigger_member(q: &SignalInner, child: *const SignalInner) {
    let met = {
        let mut slot = q.quorum_state().borrow_mut();
        let Some(state) = slot.as_mut() else {
            return;
        };
        let before = state.members.len();
        state.members.retain(|m| m.inner_ptr() != Some(child));
        let hits = before - state.members.len();
        if hits == 0 {
            return;
        }
        state.triggered_count += u32::try_from(hits).expect("member count fits in u32");
        state.met()
    };
    if met {
        q.trigger();
    }
}

/// Dismantles quorum membership on a terminal transition: removes the
/// listener token from every remaining member, then drops the member
/// handles. Idempotent — the state is taken out first, so re-entrant
/// calls see nothing left to do.
pub(crate) fn teardown(q: &SignalInner) {
    let state = q.quorum_state().borrow_mut().take();
    if let Some(state) = state {
        let token: *const SignalInner = q;
        for member in &state.members {
            if let Some(m_inner) = member.inner() {
                m_inner.remove_quorum_listener(token);
            }
        }
    }
}

/// Binds `interest` into every marked quorum reachable from `q`,
/// clearing the wants-interest marks along the way.
///
/// A quorum holding unbound interest tokens receives `interest` as a
/// member once per token; a merely-marked quorum recurses into the marked
/// members. Binding an already-triggered interest signal counts
/// immediately, which can satisfy the quorum and trigger it in place —
/// callers re-check `triggered` before suspending.
pub(crate) fn apply_interest(q: &Rc<SignalInner>, interest: &Signal) {
    q.set_wants_interest(false);
    if q.triggered() {
        return;
    }

    enum Step {
        Bind(u32),
        Recurse(SmallVec<[Signal; 3]>),
        Nothing,
    }

    let step = {
        let mut slot = q.quorum_state().borrow_mut();
        match slot.as_mut() {
            None => Step::Nothing,
            Some(state) if state.pending_interest > 0 => {
                let n = core::mem::take(&mut state.pending_interest);
                Step::Bind(n)
            }
            Some(state) => {
                // Local copy before recursing: a binding below can come
                // back and tear this quorum down.
                let marked = state
                    .members
                    .iter()
                    .filter(|m| m.wants_interest())
                    .cloned()
                    .collect();
                Step::Recurse(marked)
            }
        }
    };

    match step {
        Step::Bind(n) => {
            let met = {
                let mut slot = q.quorum_state().borrow_mut();
                let Some(state) = slot.as_mut() else {
                    return;
                };
                for _ in 0..n {
                    add_member(q, state, interest.clone());
                }
                state.met()
            };
            if met {
                q.trigger();
            }
        }
        Step::Recurse(marked) => {
            for member in marked {
                if let Some(m_inner) = member.inner() {
                    apply_interest(m_inner, interest);
                }
            }
        }
        Step::Nothing => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nullary_forms_are_already_triggered() {
        assert!(any([]).triggered());
        assert!(all([]).triggered());
    }

    #[test]
    fn unary_forms_pass_through() {
        let s = Signal::new();
        let a = any([s.clone()]);
        assert!(!a.triggered());
        s.trigger();
        assert!(a.triggered());
    }

    #[test]
    fn any_triggers_on_first_member() {
        let a = Signal::new();
        let b = Signal::new();
        let q = any([a.clone(), b.clone()]);
        assert!(!q.triggered());

        a.trigger();
        assert!(q.triggered());
        // the loser's listener registration is cleaned up, so a timer
        // heap holding it can cull the entry
        assert!(b.empty());
    }

    #[test]
    fn all_waits_for_every_member() {
        let a = Signal::new();
        let b = Signal::new();
        let q = all([a.clone(), b.clone()]);

        a.trigger();
        assert!(!q.triggered());
        b.trigger();
        assert!(q.triggered());
    }

    #[test]
    fn pre_triggered_members_count_at_construction() {
        let a = Signal::new();
        a.trigger();
        let q = any([a, Signal::new()]);
        assert!(q.triggered());

        let b = Signal::new();
        b.trigger();
        let r = all([b, Signal::ready()]);
        assert!(r.triggered());
    }

    #[test]
    fn member_triggers_after_quorum_are_ignored() {
        let a = Signal::new();
        let b = Signal::new();
        let q = any([a.clone(), b.clone()]);
        a.trigger();
        assert!(q.triggered());
        // no back-call into the terminal quorum
        b.trigger();
        assert!(q.triggered());
    }

    #[test]
    fn duplicated_member_counts_multiplicity() {
        let a = Signal::new();
        let q = all([a.clone(), a.clone()]);
        a.trigger();
        assert!(q.triggered());
    }

    #[test]
    fn dropping_untriggered_quorum_deregisters_members() {
        let a = Signal::new();
        let b = Signal::new();
        let q = any([a.clone(), b.clone()]);
        assert!(!a.empty());
        drop(q);
        assert!(a.empty());
        assert!(b.empty());
    }

    #[test]
    fn nested_quorums_propagate() {
        let a = Signal::new();
        let b = Signal::new();
        let c = Signal::new();
        let q = all([any([a.clone(), b.clone()]), c.clone()]);

        b.trigger();
        assert!(!q.triggered());
        c.trigger();
        assert!(q.triggered());
    }

    #[test]
    fn interest_token_marks_enclosing_quorum() {
        let outer = any([Signal::new(), Signal::interest()]);
        assert!(outer.wants_interest());
    }

    #[test]
    fn binding_pending_interest_registers_it() {
        let token = Signal::interest();
        let waiter_interest = Signal::new();
        token.bind_interest(&waiter_interest);
        assert!(!token.triggered());
        waiter_interest.trigger();
        assert!(token.triggered());
    }

    #[test]
    fn binding_triggered_interest_fires_in_place() {
        let token = Signal::interest();
        let waiter_interest = Signal::new();
        waiter_interest.trigger();
        token.bind_interest(&waiter_interest);
        assert!(token.triggered());
    }

    #[test]
    fn binding_walks_nested_marked_quorums() {
        let token = Signal::interest();
        let outer = any([Signal::new(), token]);
        assert!(outer.wants_interest());

        let waiter_interest = Signal::new();
        outer.bind_interest(&waiter_interest);
        assert!(!outer.wants_interest());
        assert!(!outer.triggered());

        waiter_interest.trigger();
        assert!(outer.triggered());
    }
}
