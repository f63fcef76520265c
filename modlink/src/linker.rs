//!
//! Module Linker
//!
//! Ties a decoded descriptor to its linkage table and produces the
//! symbol mapping the host publishes into the importing namespace:
//!
//! 1. decode the descriptor rows
//! 2. check the table shape (F + 2 slots, guards at both ends)
//! 3. check the version guard against the running host
//! 4. walk the entries in order, binding functions to their slots and
//!    objects to the host's constants
//!
//! Nothing is handed to a publisher unless every step succeeded.
//!

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::descriptor::{decode, ModuleDescriptor, SymbolEntry, FIRST_FUNCTION_SLOT, GUARD_SLOT_COUNT};
use crate::error::LinkError;
use crate::linkage::{LinkageSlot, LinkageTable, VersionGuard, RESERVED_SLOT};
use crate::types::{FunctionSig, TypeTag};
use crate::value::{CallError, NativeFn, Value};

/// The host's numeric constant space, keyed by symbol name.
pub trait ConstantSpace {
    fn lookup(&self, name: &str) -> Option<Value>;
}

impl ConstantSpace for HashMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

impl ConstantSpace for IndexMap<String, Value> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name).cloned()
    }
}

/// Receives each binding of a successfully linked module.
pub trait SymbolPublisher {
    fn publish(&mut self, name: &str, binding: &Binding);
}

impl SymbolPublisher for IndexMap<String, Binding> {
    fn publish(&mut self, name: &str, binding: &Binding) {
        self.insert(name.to_string(), binding.clone());
    }
}

#[derive(Clone)]
pub enum Binding {
    Function {
        signature: FunctionSig,
        slot: usize,
        func: NativeFn,
    },
    Object {
        ty: TypeTag,
        value: Value,
    },
}

impl Binding {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Binding::Function { .. } => "function",
            Binding::Object { .. } => "object",
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Binding::Function { .. })
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, CallError> {
        let (signature, func) = match self {
            Binding::Function { signature, func, .. } => (signature, func),
            Binding::Object { .. } => {
                return Err(CallError::NotCallable {
                    name: name.to_string(),
                });
            }
        };

        if args.len() != signature.arity() {
            return Err(CallError::ArgumentCount {
                name: name.to_string(),
                expected: signature.arity(),
                found: args.len(),
            });
        }

        for (index, (arg, ty)) in args.iter().zip(&signature.params).enumerate() {
            if !arg.conforms_to(ty) {
                return Err(CallError::ArgumentType {
                    name: name.to_string(),
                    index,
                    expected: ty.to_string(),
                    found: arg.kind_name(),
                });
            }
        }

        func(args)
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Function { signature, slot, func } => f
                .debug_struct("Function")
                .field("signature", &signature.to_string())
                .field("slot", slot)
                .field("func", &format_args!("{:#x}", *func as usize))
                .finish(),
            Binding::Object { ty, value } => f
                .debug_struct("Object")
                .field("ty", &ty.to_string())
                .field("value", value)
                .finish(),
        }
    }
}

/// Exported symbols of one linked module, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct SymbolMapping {
    symbols: IndexMap<String, Binding>,
}

impl SymbolMapping {
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.symbols.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.symbols.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Option<Result<Value, CallError>> {
        self.symbols.get(name).map(|binding| binding.call(name, args))
    }

    pub fn publish(&self, publisher: &mut dyn SymbolPublisher) {
        for (name, binding) in &self.symbols {
            publisher.publish(name, binding);
        }
    }

    fn insert(&mut self, name: &str, binding: Binding) -> Result<(), LinkError> {
        if self.symbols.contains_key(name) {
            return Err(LinkError::DuplicateSymbol {
                name: name.to_string(),
            });
        }
        self.symbols.insert(name.to_string(), binding);
        Ok(())
    }
}

pub struct Linker<'h> {
    runtime_version: u32,
    constants: &'h dyn ConstantSpace,
}

impl<'h> Linker<'h> {
    pub fn new(runtime_version: u32, constants: &'h dyn ConstantSpace) -> Self {
        Self {
            runtime_version,
            constants,
        }
    }

    pub fn runtime_version(&self) -> u32 {
        self.runtime_version
    }

    /// Decodes `rows`, builds the linkage table from `callables`, and links.
    pub fn link_module<S: AsRef<str>>(
        &self,
        rows: &[S],
        callables: &[NativeFn],
        guard: VersionGuard,
    ) -> Result<SymbolMapping, LinkError> {
        let descriptor = decode(rows)?;
        let table = LinkageTable::build(&descriptor, callables, guard)?;
        self.link(&descriptor, &table)
    }

    /// Links a descriptor against an already assembled table, then hands
    /// every binding to `publisher`.
    pub fn link_into(
        &self,
        descriptor: &ModuleDescriptor,
        table: &LinkageTable,
        publisher: &mut dyn SymbolPublisher,
    ) -> Result<SymbolMapping, LinkError> {
        let mapping = self.link(descriptor, table)?;
        mapping.publish(publisher);
        Ok(mapping)
    }

    pub fn link(&self, descriptor: &ModuleDescriptor, table: &LinkageTable) -> Result<SymbolMapping, LinkError> {
        self.validate(descriptor, table)?;
        self.bind(descriptor, table)
    }

    /// Shape and version checks. Runs before any symbol is bound.
    pub fn validate(&self, descriptor: &ModuleDescriptor, table: &LinkageTable) -> Result<(), LinkError> {
        let expected = descriptor.expected_slots();
        if table.len() != expected {
            return Err(LinkError::LinkageLengthMismatch {
                expected,
                found: table.len(),
            });
        }

        let last = table.len() - 1;
        for (slot, entry) in table.slots().iter().enumerate() {
            let in_place = match entry {
                LinkageSlot::Reserved => slot == RESERVED_SLOT,
                LinkageSlot::VersionGuard(_) => slot == last,
                LinkageSlot::Native(_) => slot >= FIRST_FUNCTION_SLOT && slot < last,
            };
            if !in_place {
                return Err(LinkError::MisplacedGuard { slot });
            }
        }

        let guard = table.guard().ok_or(LinkError::MisplacedGuard { slot: last })?;
        if !guard.admits(self.runtime_version) {
            return Err(LinkError::IncompatibleModuleVersion {
                required: guard.min_version(),
                running: self.runtime_version,
            });
        }

        trace!(
            functions = expected - GUARD_SLOT_COUNT,
            guard = %guard,
            "linkage table validated"
        );
        Ok(())
    }

    /// Binds every symbol. Assumes `validate` passed for this pair.
    pub fn bind(&self, descriptor: &ModuleDescriptor, table: &LinkageTable) -> Result<SymbolMapping, LinkError> {
        let mut mapping = SymbolMapping::default();
        let mut slot = FIRST_FUNCTION_SLOT;

        for entry in descriptor.symbols() {
            match entry {
                SymbolEntry::Function(function) => {
                    let func = table.native(slot).ok_or(LinkError::MisplacedGuard { slot })?;
                    mapping.insert(
                        &function.name,
                        Binding::Function {
                            signature: function.signature.clone(),
                            slot,
                            func,
                        },
                    )?;
                    debug!(symbol = %function.name, slot, signature = %function.signature, "bound function");
                    slot += 1;
                }
                SymbolEntry::Object(object) => {
                    if mapping.contains(&object.name) {
                        return Err(LinkError::DuplicateSymbol {
                            name: object.name.clone(),
                        });
                    }
                    let value = self
                        .constants
                        .lookup(&object.name)
                        .ok_or_else(|| LinkError::MissingConstant {
                            name: object.name.clone(),
                        })?;
                    if !value.conforms_to(&object.ty) {
                        return Err(LinkError::ConstantTypeMismatch {
                            name: object.name.clone(),
                            expected: object.ty.to_string(),
                            found: value.kind_name(),
                        });
                    }
                    debug!(symbol = %object.name, ty = %object.ty, "bound constant");
                    mapping.insert(
                        &object.name,
                        Binding::Object {
                            ty: object.ty.clone(),
                            value,
                        },
                    )?;
                }
                SymbolEntry::Sentinel => break,
            }
        }

        Ok(mapping)
    }
}
