//!
//! Module Registry
//!
//! Owns every module the host has registered. A registration walks the
//! stages below and either ends `Registered` with its full symbol mapping
//! stored, or `Rejected` with nothing stored:
//!
//!   Unregistered -> Decoding -> Validating -> Binding -> Registered
//!
//! Any stage short of `Registered` may fall through to `Rejected`.
//!
//! Linking happens outside the registry lock. Only the final insert takes
//! it, so independent modules link in parallel and each one appears in
//! the registry all at once.
//!

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::HostConfig;
use crate::descriptor::decode;
use crate::error::LinkError;
use crate::linkage::{LinkageTable, VersionGuard};
use crate::linker::{ConstantSpace, Linker, SymbolMapping, SymbolPublisher};
use crate::value::NativeFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationState {
    Unregistered,
    Decoding,
    Validating,
    Binding,
    Registered,
    Rejected,
}

impl RegistrationState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RegistrationState::Registered | RegistrationState::Rejected)
    }

    pub fn can_transition_to(&self, next: RegistrationState) -> bool {
        use RegistrationState::*;
        match (self, next) {
            (Unregistered, Decoding)
            | (Decoding, Validating)
            | (Validating, Binding)
            | (Binding, Registered) => true,
            (from, Rejected) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Moves to `next`, or returns the current state unchanged when the
    /// move is not allowed.
    pub fn transition(self, next: RegistrationState) -> Result<RegistrationState, RegistrationState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for RegistrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistrationState::Unregistered => "unregistered",
            RegistrationState::Decoding => "decoding",
            RegistrationState::Validating => "validating",
            RegistrationState::Binding => "binding",
            RegistrationState::Registered => "registered",
            RegistrationState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("failed to register module '{module}' while {stage}: {source}")]
pub struct RegistrationError {
    pub module: String,
    /// Stage the registration was in when it failed.
    pub stage: RegistrationState,
    #[source]
    pub source: LinkError,
}

/// A native module as its generator emits it: descriptor rows, the
/// callables for its function entries, and the version guard.
#[derive(Debug, Clone, Copy)]
pub struct NativeModule<'a> {
    pub name: &'a str,
    pub descriptor: &'a [&'a str],
    pub callables: &'a [NativeFn],
    pub guard: VersionGuard,
}

struct Registration<'a> {
    module: &'a str,
    state: RegistrationState,
}

impl<'a> Registration<'a> {
    fn new(module: &'a str) -> Self {
        Self {
            module,
            state: RegistrationState::Unregistered,
        }
    }

    fn advance(&mut self, next: RegistrationState) {
        match self.state.transition(next) {
            Ok(state) => self.state = state,
            Err(state) => debug_assert!(false, "illegal registration transition {} -> {}", state, next),
        }
    }

    fn reject(&mut self, source: LinkError) -> RegistrationError {
        let stage = self.state;
        warn!(module = self.module, stage = %stage, error = %source, "module rejected");
        self.state = RegistrationState::Rejected;
        RegistrationError {
            module: self.module.to_string(),
            stage,
            source,
        }
    }
}

pub struct ModuleRegistry {
    runtime_version: u32,
    constants: Box<dyn ConstantSpace + Send + Sync>,
    modules: Mutex<IndexMap<String, Arc<SymbolMapping>>>,
}

impl ModuleRegistry {
    pub fn new(runtime_version: u32, constants: impl ConstantSpace + Send + Sync + 'static) -> Self {
        Self {
            runtime_version,
            constants: Box::new(constants),
            modules: Mutex::new(IndexMap::new()),
        }
    }

    pub fn from_config(config: HostConfig) -> Self {
        Self::new(config.runtime_version, config)
    }

    pub fn runtime_version(&self) -> u32 {
        self.runtime_version
    }

    /// Decodes, validates and binds `module`, then stores its mapping.
    /// Nothing is stored when any stage fails.
    pub fn register(&self, module: NativeModule<'_>) -> Result<Arc<SymbolMapping>, RegistrationError> {
        let mut registration = Registration::new(module.name);
        let linker = Linker::new(self.runtime_version, self.constants.as_ref());

        if self.modules().contains_key(module.name) {
            return Err(registration.reject(LinkError::ModuleAlreadyRegistered {
                module: module.name.to_string(),
            }));
        }

        registration.advance(RegistrationState::Decoding);
        let descriptor = decode(module.descriptor).map_err(|e| registration.reject(e))?;

        registration.advance(RegistrationState::Validating);
        let table = LinkageTable::build(&descriptor, module.callables, module.guard)
            .map_err(|e| registration.reject(e))?;
        linker
            .validate(&descriptor, &table)
            .map_err(|e| registration.reject(e))?;

        registration.advance(RegistrationState::Binding);
        let mapping = Arc::new(linker.bind(&descriptor, &table).map_err(|e| registration.reject(e))?);

        {
            let mut modules = self.modules();
            if modules.contains_key(module.name) {
                drop(modules);
                return Err(registration.reject(LinkError::ModuleAlreadyRegistered {
                    module: module.name.to_string(),
                }));
            }
            modules.insert(module.name.to_string(), Arc::clone(&mapping));
        }

        registration.advance(RegistrationState::Registered);
        info!(
            module = module.name,
            symbols = mapping.len(),
            guard = %module.guard,
            "module registered"
        );
        Ok(mapping)
    }

    pub fn get(&self, module: &str) -> Option<Arc<SymbolMapping>> {
        self.modules().get(module).cloned()
    }

    pub fn len(&self) -> usize {
        self.modules().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules().is_empty()
    }

    /// Registered module names, in registration order.
    pub fn module_names(&self) -> Vec<String> {
        self.modules().keys().cloned().collect()
    }

    /// Publishes a registered module's symbols into an importing namespace.
    /// Returns false when no module of that name is registered.
    pub fn import_into(&self, module: &str, publisher: &mut dyn SymbolPublisher) -> bool {
        match self.get(module) {
            Some(mapping) => {
                mapping.publish(publisher);
                true
            }
            None => false,
        }
    }

    fn modules(&self) -> MutexGuard<'_, IndexMap<String, Arc<SymbolMapping>>> {
        // A panic while holding the lock cannot leave a half-inserted module.
        self.modules.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("runtime_version", &self.runtime_version)
            .field("modules", &self.module_names())
            .finish()
    }
}
