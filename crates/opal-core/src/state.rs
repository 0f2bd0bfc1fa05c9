//! The sealed CRDT family: one state variant per registered type, with
//! `downstream`/`apply`/`value` dispatch on the variant.
//!
//! `downstream` runs at the origin only and may reject the operation;
//! an effect it does produce never fails to apply (a mismatched variant
//! is a routing bug, reported as [`TypeMismatch`], not a data error).

use crate::awset::AwSet;
use crate::clock::ReplicaId;
use crate::counter::OpCounter;
use crate::error::{DownstreamError, TypeMismatch};
use crate::ewflag::EwFlag;
use crate::key::TypeTag;
use crate::mvreg::{MvRegister, RegisterWrite};
use crate::pncounter::{CounterDir, PnCounter};
use crate::token::Token;
use crate::tpset::TpSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Element and value payloads are opaque byte strings.
pub type Elem = Vec<u8>;

/// A client operation against a single object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrdtOp {
    Increment { amount: u64 },
    Decrement { amount: u64 },
    Add { elem: Elem },
    AddAll { elems: Vec<Elem> },
    Remove { elem: Elem },
    RemoveAll { elems: Vec<Elem> },
    Reset,
    Assign { value: Elem },
    Enable,
    Disable,
}

impl CrdtOp {
    /// The wire name of this operation.
    pub fn name(&self) -> &'static str {
        match self {
            CrdtOp::Increment { .. } => "increment",
            CrdtOp::Decrement { .. } => "decrement",
            CrdtOp::Add { .. } => "add",
            CrdtOp::AddAll { .. } => "add_all",
            CrdtOp::Remove { .. } => "remove",
            CrdtOp::RemoveAll { .. } => "remove_all",
            CrdtOp::Reset => "reset",
            CrdtOp::Assign { .. } => "assign",
            CrdtOp::Enable => "enable",
            CrdtOp::Disable => "disable",
        }
    }
}

/// A downstream effect, ready to apply on any replica.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    /// Op-based counter: a signed delta.
    CounterDelta(i64),
    /// State-based counter: a shift into the origin's bucket.
    CounterShift {
        dir: CounterDir,
        origin: ReplicaId,
        amount: u64,
    },
    /// Add-wins set: freshly minted tokens per element.
    AddTokens(Vec<(Elem, Token)>),
    /// Add-wins set: observed tokens to cancel per element.
    RemoveTokens(Vec<(Elem, BTreeSet<Token>)>),
    /// Two-phase set: elements joining the added half.
    AddElems(Vec<Elem>),
    /// Two-phase set: elements joining the removed half.
    RemoveElems(Vec<Elem>),
    /// Multi-value register write.
    Write(RegisterWrite),
    /// Enable-wins flag: a fresh enable token.
    Enable(Token),
    /// Enable-wins flag: observed enable tokens to cancel.
    Disable(BTreeSet<Token>),
}

impl Effect {
    pub fn name(&self) -> &'static str {
        match self {
            Effect::CounterDelta(_) => "counter-delta",
            Effect::CounterShift { .. } => "counter-shift",
            Effect::AddTokens(_) => "add-tokens",
            Effect::RemoveTokens(_) => "remove-tokens",
            Effect::AddElems(_) => "add-elems",
            Effect::RemoveElems(_) => "remove-elems",
            Effect::Write(_) => "write",
            Effect::Enable(_) => "enable",
            Effect::Disable(_) => "disable",
        }
    }
}

/// A read result, self-describing per CRDT family.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    Count(i64),
    Set(Vec<Elem>),
    Register(Vec<Elem>),
    Flag(bool),
}

/// Whether `downstream` for this (type, op) pair reads the origin state.
///
/// Operations that only mint fresh identity (adds, enables, counter
/// shifts) are state-independent; observed-remove style operations and
/// two-phase validation are not.
pub fn requires_state_for_downstream(tag: TypeTag, op: &CrdtOp) -> bool {
    match (tag, op) {
        (TypeTag::CounterOb | TypeTag::CounterSb, _) => false,
        (TypeTag::AwSet, CrdtOp::Add { .. } | CrdtOp::AddAll { .. }) => false,
        (TypeTag::AwSet, _) => true,
        (TypeTag::TpSet, _) => true,
        (TypeTag::MvReg, _) => true,
        (TypeTag::EwFlag, CrdtOp::Enable) => false,
        (TypeTag::EwFlag, _) => true,
    }
}

/// One replicated object's state, tagged by CRDT type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrdtState {
    CounterOb(OpCounter),
    CounterSb(PnCounter),
    AwSet(AwSet),
    TpSet(TpSet),
    MvReg(MvRegister),
    EwFlag(EwFlag),
}

impl CrdtState {
    /// The freshly born state for a type tag (first touch of a key).
    pub fn new_for(tag: TypeTag) -> Self {
        match tag {
            TypeTag::CounterOb => CrdtState::CounterOb(OpCounter::new()),
            TypeTag::CounterSb => CrdtState::CounterSb(PnCounter::new()),
            TypeTag::AwSet => CrdtState::AwSet(AwSet::new()),
            TypeTag::TpSet => CrdtState::TpSet(TpSet::new()),
            TypeTag::MvReg => CrdtState::MvReg(MvRegister::new()),
            TypeTag::EwFlag => CrdtState::EwFlag(EwFlag::new()),
        }
    }

    /// The type tag of this state.
    pub fn tag(&self) -> TypeTag {
        match self {
            CrdtState::CounterOb(_) => TypeTag::CounterOb,
            CrdtState::CounterSb(_) => TypeTag::CounterSb,
            CrdtState::AwSet(_) => TypeTag::AwSet,
            CrdtState::TpSet(_) => TypeTag::TpSet,
            CrdtState::MvReg(_) => TypeTag::MvReg,
            CrdtState::EwFlag(_) => TypeTag::EwFlag,
        }
    }

    /// The observable value, a pure function of state.
    pub fn value(&self) -> Value {
        match self {
            CrdtState::CounterOb(c) => Value::Count(c.value()),
            CrdtState::CounterSb(c) => Value::Count(c.value()),
            CrdtState::AwSet(s) => Value::Set(s.elements()),
            CrdtState::TpSet(s) => Value::Set(s.elements()),
            CrdtState::MvReg(r) => Value::Register(r.values()),
            CrdtState::EwFlag(f) => Value::Flag(f.value()),
        }
    }

    /// Produce the downstream effect of `op` at the origin `origin`, or
    /// reject the operation.
    pub fn downstream(&self, origin: &ReplicaId, op: &CrdtOp) -> Result<Effect, DownstreamError> {
        let invalid = || DownstreamError::InvalidOp {
            op: op.name(),
            tag: self.tag(),
        };

        match self {
            CrdtState::CounterOb(_) => match op {
                CrdtOp::Increment { amount } => {
                    check_amount(*amount)?;
                    Ok(Effect::CounterDelta(OpCounter::delta(*amount, false)))
                }
                CrdtOp::Decrement { amount } => {
                    check_amount(*amount)?;
                    Ok(Effect::CounterDelta(OpCounter::delta(*amount, true)))
                }
                _ => Err(invalid()),
            },
            CrdtState::CounterSb(_) => match op {
                CrdtOp::Increment { amount } => {
                    check_amount(*amount)?;
                    Ok(Effect::CounterShift {
                        dir: CounterDir::Increment,
                        origin: origin.clone(),
                        amount: *amount,
                    })
                }
                CrdtOp::Decrement { amount } => {
                    check_amount(*amount)?;
                    Ok(Effect::CounterShift {
                        dir: CounterDir::Decrement,
                        origin: origin.clone(),
                        amount: *amount,
                    })
                }
                _ => Err(invalid()),
            },
            CrdtState::AwSet(set) => match op {
                CrdtOp::Add { elem } => Ok(Effect::AddTokens(AwSet::add_effect(
                    origin,
                    std::slice::from_ref(elem),
                ))),
                CrdtOp::AddAll { elems } => Ok(Effect::AddTokens(AwSet::add_effect(origin, elems))),
                CrdtOp::Remove { elem } => Ok(Effect::RemoveTokens(
                    set.remove_effect(std::slice::from_ref(elem)),
                )),
                CrdtOp::RemoveAll { elems } => Ok(Effect::RemoveTokens(set.remove_effect(elems))),
                CrdtOp::Reset => Ok(Effect::RemoveTokens(set.reset_effect())),
                _ => Err(invalid()),
            },
            CrdtState::TpSet(set) => match op {
                CrdtOp::Add { elem } => Ok(Effect::AddElems(set.add_effect(elem)?)),
                CrdtOp::AddAll { elems } => Ok(Effect::AddElems(set.add_all_effect(elems))),
                CrdtOp::Remove { elem } => Ok(Effect::RemoveElems(set.remove_effect(elem)?)),
                CrdtOp::RemoveAll { elems } => Ok(Effect::RemoveElems(set.remove_all_effect(elems))),
                _ => Err(invalid()),
            },
            CrdtState::MvReg(reg) => match op {
                CrdtOp::Assign { value } => {
                    Ok(Effect::Write(reg.assign_effect(origin, value.clone())))
                }
                _ => Err(invalid()),
            },
            CrdtState::EwFlag(flag) => match op {
                CrdtOp::Enable => Ok(Effect::Enable(EwFlag::enable_effect(origin))),
                CrdtOp::Disable => Ok(Effect::Disable(flag.disable_effect())),
                _ => Err(invalid()),
            },
        }
    }

    /// Apply an effect to this state. Fails only when the effect was
    /// produced by a different CRDT type than this state.
    pub fn apply(&mut self, effect: &Effect) -> Result<(), TypeMismatch> {
        match (self, effect) {
            (CrdtState::CounterOb(c), Effect::CounterDelta(delta)) => {
                c.apply(*delta);
                Ok(())
            }
            (CrdtState::CounterSb(c), Effect::CounterShift { dir, origin, amount }) => {
                c.apply(*dir, origin, *amount);
                Ok(())
            }
            (CrdtState::AwSet(s), Effect::AddTokens(pairs)) => {
                s.apply_add(pairs);
                Ok(())
            }
            (CrdtState::AwSet(s), Effect::RemoveTokens(pairs)) => {
                s.apply_remove(pairs);
                Ok(())
            }
            (CrdtState::TpSet(s), Effect::AddElems(elems)) => {
                s.apply_add(elems);
                Ok(())
            }
            (CrdtState::TpSet(s), Effect::RemoveElems(elems)) => {
                s.apply_remove(elems);
                Ok(())
            }
            (CrdtState::MvReg(r), Effect::Write(write)) => {
                r.apply(write);
                Ok(())
            }
            (CrdtState::EwFlag(f), Effect::Enable(token)) => {
                f.apply_enable(token);
                Ok(())
            }
            (CrdtState::EwFlag(f), Effect::Disable(observed)) => {
                f.apply_disable(observed);
                Ok(())
            }
            (state, effect) => Err(TypeMismatch {
                tag: state.tag(),
                effect: effect.name(),
            }),
        }
    }

    /// Full-state merge. Only the state-based counter supports it; the
    /// op-based types converge through effects alone.
    pub fn merge(&mut self, other: &CrdtState) -> Result<(), TypeMismatch> {
        match (self, other) {
            (CrdtState::CounterSb(a), CrdtState::CounterSb(b)) => {
                a.merge(b);
                Ok(())
            }
            (state, other) => Err(TypeMismatch {
                tag: state.tag(),
                effect: other.tag().as_str(),
            }),
        }
    }
}

/// The per-key pair a replica stores: CRDT state plus a monotonically
/// increasing version. The version is bookkeeping for diagnostics only;
/// convergence never consults it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub state: CrdtState,
    pub version: u64,
}

impl StoredObject {
    /// A freshly born object at version zero.
    pub fn new(tag: TypeTag) -> Self {
        StoredObject {
            state: CrdtState::new_for(tag),
            version: 0,
        }
    }
}

fn check_amount(amount: u64) -> Result<(), DownstreamError> {
    if amount == 0 {
        Err(DownstreamError::ZeroAmount)
    } else {
        Ok(())
    }
}
