//!
//! Linkage Tables
//!
//! The positional companion of a descriptor: slot 0 is a reserved guard
//! that is never invoked, slots 1..=F hold the native callables for the F
//! function entries in declaration order, and the final slot carries the
//! version guard the loader checks before binding anything.
//!
//!   [Reserved, Native(f1), ..., Native(fF), VersionGuard(vN_plus_required)]
//!
//! Object entries never take a slot.
//!

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::descriptor::ModuleDescriptor;
use crate::error::LinkError;
use crate::value::{NativeFn, Value};

pub const RESERVED_SLOT: usize = 0;

/// Minimum host runtime version a module was built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionGuard {
    min_version: u32,
}

impl VersionGuard {
    pub const fn requires(min_version: u32) -> Self {
        Self { min_version }
    }

    pub fn min_version(&self) -> u32 {
        self.min_version
    }

    pub fn admits(&self, running: u32) -> bool {
        running >= self.min_version
    }
}

impl fmt::Display for VersionGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}_plus_required", self.min_version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version guard token '{0}'")]
pub struct GuardTokenError(pub String);

impl FromStr for VersionGuard {
    type Err = GuardTokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('v')
            .and_then(|rest| rest.strip_suffix("_plus_required"))
            .and_then(|n| n.parse().ok())
            .map(VersionGuard::requires)
            .ok_or_else(|| GuardTokenError(s.to_string()))
    }
}

#[derive(Clone, Copy)]
pub enum LinkageSlot {
    Reserved,
    Native(NativeFn),
    VersionGuard(VersionGuard),
}

impl LinkageSlot {
    pub fn kind_name(&self) -> &'static str {
        match self {
            LinkageSlot::Reserved => "reserved guard",
            LinkageSlot::Native(_) => "native function",
            LinkageSlot::VersionGuard(_) => "version guard",
        }
    }
}

impl fmt::Debug for LinkageSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkageSlot::Reserved => f.write_str("Reserved"),
            LinkageSlot::Native(func) => write!(f, "Native({:#x})", *func as usize),
            LinkageSlot::VersionGuard(guard) => write!(f, "VersionGuard({})", guard),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkageTable {
    slots: Vec<LinkageSlot>,
}

impl LinkageTable {
    /// Pairs the descriptor's function entries, in order, with `callables`
    /// and wraps them in the two guard slots.
    pub fn build(
        descriptor: &ModuleDescriptor,
        callables: &[NativeFn],
        guard: VersionGuard,
    ) -> Result<Self, LinkError> {
        let expected = descriptor.function_count();
        if callables.len() != expected {
            return Err(LinkError::ArityMismatch {
                expected,
                found: callables.len(),
            });
        }

        let mut slots = Vec::with_capacity(expected + 2);
        slots.push(LinkageSlot::Reserved);
        for (function, callable) in descriptor.functions().zip(callables) {
            debug_assert_eq!(function.slot, slots.len());
            slots.push(LinkageSlot::Native(*callable));
        }
        slots.push(LinkageSlot::VersionGuard(guard));

        Ok(Self { slots })
    }

    /// Wraps a raw slot list as emitted by a generator. Shape is checked by
    /// the linker, not here.
    pub fn from_slots(slots: Vec<LinkageSlot>) -> Self {
        Self { slots }
    }

    pub fn slots(&self) -> &[LinkageSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&LinkageSlot> {
        self.slots.get(slot)
    }

    pub fn native(&self, slot: usize) -> Option<NativeFn> {
        match self.slots.get(slot) {
            Some(LinkageSlot::Native(func)) => Some(*func),
            _ => None,
        }
    }

    /// The trailing version guard, if the last slot holds one.
    pub fn guard(&self) -> Option<VersionGuard> {
        match self.slots.last() {
            Some(LinkageSlot::VersionGuard(guard)) => Some(*guard),
            _ => None,
        }
    }

    pub fn invoke(&self, slot: usize, args: &[Value]) -> Result<Value, LinkError> {
        match self.slots.get(slot) {
            Some(LinkageSlot::Native(func)) => Ok(func(args)?),
            Some(other) => Err(LinkError::InvalidInvocation {
                slot,
                kind: other.kind_name(),
            }),
            None => Err(LinkError::InvalidInvocation {
                slot,
                kind: "missing slot",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::decode;
    use crate::value::CallError;

    fn sqrt_impl(args: &[Value]) -> Result<Value, CallError> {
        match args {
            [Value::Double(x)] => Ok(Value::Double(x.sqrt())),
            _ => Err(CallError::Native("sqrt expects a Double".to_string())),
        }
    }

    fn descriptor() -> ModuleDescriptor {
        decode(&["F\0sqrt\0(Double): Double", "O\0pi\0Double", "Z"]).unwrap()
    }

    #[test]
    fn test_build_places_guards() {
        let table = LinkageTable::build(&descriptor(), &[sqrt_impl], VersionGuard::requires(21)).unwrap();

        assert_eq!(table.len(), 3);
        assert!(matches!(table.get(RESERVED_SLOT), Some(LinkageSlot::Reserved)));
        assert!(table.native(1).is_some());
        assert_eq!(table.guard(), Some(VersionGuard::requires(21)));
    }

    #[test]
    fn test_build_rejects_arity_mismatch() {
        let err = LinkageTable::build(&descriptor(), &[], VersionGuard::requires(21)).unwrap_err();
        assert_eq!(err, LinkError::ArityMismatch { expected: 1, found: 0 });

        let err = LinkageTable::build(&descriptor(), &[sqrt_impl, sqrt_impl], VersionGuard::requires(21))
            .unwrap_err();
        assert_eq!(err, LinkError::ArityMismatch { expected: 1, found: 2 });
    }

    #[test]
    fn test_invoke_slots() {
        let table = LinkageTable::build(&descriptor(), &[sqrt_impl], VersionGuard::requires(21)).unwrap();

        assert_eq!(table.invoke(1, &[Value::Double(9.0)]).unwrap(), Value::Double(3.0));
        assert_eq!(
            table.invoke(2, &[]).unwrap_err(),
            LinkError::InvalidInvocation { slot: 2, kind: "version guard" }
        );
        assert_eq!(
            table.invoke(0, &[]).unwrap_err(),
            LinkError::InvalidInvocation { slot: 0, kind: "reserved guard" }
        );
        assert!(matches!(table.invoke(1, &[]), Err(LinkError::Call(CallError::Native(_)))));
    }

    #[test]
    fn test_guard_token_round_trip() {
        let guard: VersionGuard = "v21_plus_required".parse().unwrap();
        assert_eq!(guard.min_version(), 21);
        assert_eq!(guard.to_string(), "v21_plus_required");
        assert!(guard.admits(21));
        assert!(guard.admits(30));
        assert!(!guard.admits(20));

        assert!("21_plus_required".parse::<VersionGuard>().is_err());
        assert!("vX_plus_required".parse::<VersionGuard>().is_err());
        assert!("v21".parse::<VersionGuard>().is_err());
    }
}
