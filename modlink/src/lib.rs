///
/// modlink - Native Module Linkage
///
/// A native module exports its symbols through two generated tables: a
/// descriptor (one row per symbol, with names and type signatures) and a
/// positional linkage table of native callables framed by guard slots.
/// This crate decodes the first, checks the second against it, and binds
/// both into a symbol mapping the host can publish. It includes:
///
/// - types: type tags and function signatures
/// - value: runtime values and the native calling convention
/// - descriptor: descriptor row codec and descriptor files
/// - linkage: linkage tables and version guards
/// - linker: validation and binding of a module's symbols
/// - registry: thread-safe, all-or-nothing module registration
/// - config: host runtime version and constant space
/// - diagnostic: miette rendering of link failures
///
/// Entry points:
/// - `decode`: Decode descriptor rows
/// - `Linker::link_module`: Link a module against a host
/// - `ModuleRegistry::register`: Register a module with the host
///

pub mod config;
pub mod descriptor;
pub mod diagnostic;
pub mod error;
pub mod linkage;
pub mod linker;
pub mod registry;
pub mod types;
pub mod value;

pub use config::{ConfigError, HostConfig};
pub use descriptor::{decode, encode, DescriptorSource, ModuleDescriptor, SymbolEntry};
pub use diagnostic::{DiagnosticReporter, LinkDiagnostic};
pub use error::LinkError;
pub use linkage::{LinkageSlot, LinkageTable, VersionGuard};
pub use linker::{Binding, ConstantSpace, Linker, SymbolMapping, SymbolPublisher};
pub use registry::{ModuleRegistry, NativeModule, RegistrationError, RegistrationState};
pub use types::{FunctionSig, TypeTag};
pub use value::{CallError, NativeFn, Value};

/// Version of the host runtime this build links modules against.
pub const RUNTIME_VERSION: u32 = 21;

#[test]
fn test_link_math_module() {
    use std::collections::HashMap;

    fn sqrt_impl(args: &[Value]) -> Result<Value, CallError> {
        match args {
            [Value::Double(x)] => Ok(Value::Double(x.sqrt())),
            _ => Err(CallError::Native("sqrt expects a Double".to_string())),
        }
    }

    let constants = HashMap::from([("pi".to_string(), Value::Double(std::f64::consts::PI))]);
    let linker = Linker::new(RUNTIME_VERSION, &constants);
    let mapping = linker
        .link_module(
            &["F\0sqrt\0(Double): Double", "O\0pi\0Double", "Z"],
            &[sqrt_impl],
            VersionGuard::requires(RUNTIME_VERSION),
        )
        .unwrap();

    assert_eq!(mapping.call("sqrt", &[Value::Double(2.25)]), Some(Ok(Value::Double(1.5))));
}
