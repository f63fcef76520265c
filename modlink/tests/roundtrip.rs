//! Property-based tests for the descriptor codec.
//!
//! Random symbol lists are encoded into rows (and into the escaped file
//! form) and decoded again; the result must be the same descriptor. The
//! linkage length rule is checked against the same generated descriptors.

use modlink::descriptor::{decode_blob, render_rows};
use modlink::{decode, encode, FunctionSig, ModuleDescriptor, SymbolEntry, TypeTag};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn type_tag() -> impl Strategy<Value = TypeTag> {
    let leaf = prop_oneof![
        Just(TypeTag::Integer),
        Just(TypeTag::Double),
        Just(TypeTag::Boolean),
        Just(TypeTag::String),
        Just(TypeTag::Bytes),
        Just(TypeTag::Unit),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            inner.clone().prop_map(TypeTag::list),
            prop::collection::vec(inner, 1..4).prop_map(TypeTag::Tuple),
        ]
    })
}

fn symbol_name() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,11}"
}

fn symbol() -> impl Strategy<Value = SymbolEntry> {
    prop_oneof![
        (symbol_name(), prop::collection::vec(type_tag(), 0..5), type_tag())
            .prop_map(|(name, params, returns)| SymbolEntry::function(name, FunctionSig::new(params, returns))),
        (symbol_name(), type_tag()).prop_map(|(name, ty)| SymbolEntry::object(name, ty)),
    ]
}

fn symbols() -> impl Strategy<Value = Vec<SymbolEntry>> {
    prop::collection::vec(symbol(), 0..24)
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_decode_inverts_encode(entries in symbols()) {
        let rows = encode(&entries);
        let descriptor = decode(&rows).unwrap();
        prop_assert_eq!(descriptor.symbols(), entries.as_slice());
        prop_assert_eq!(descriptor, ModuleDescriptor::new(entries));
    }

    #[test]
    fn prop_file_form_round_trips(entries in symbols()) {
        let rows = encode(&entries);
        let descriptor = decode_blob(render_rows(&rows).as_bytes()).unwrap();
        prop_assert_eq!(descriptor.encode(), rows);
    }

    #[test]
    fn prop_header_row_is_transparent(entries in symbols()) {
        let mut rows = vec!["\0\0".to_string()];
        rows.extend(encode(&entries));
        prop_assert_eq!(decode(&rows).unwrap(), ModuleDescriptor::new(entries));
    }

    #[test]
    fn prop_expected_slots_count_functions(entries in symbols()) {
        let functions = entries.iter().filter(|e| matches!(e, SymbolEntry::Function(_))).count();
        let descriptor = ModuleDescriptor::new(entries);
        prop_assert_eq!(descriptor.expected_slots(), functions + 2);

        let slots: Vec<usize> = descriptor.functions().map(|f| f.slot).collect();
        prop_assert_eq!(slots, (1..=functions).collect::<Vec<_>>());
    }

    #[test]
    fn prop_dropping_sentinel_is_rejected(entries in symbols()) {
        let mut rows = encode(&entries);
        rows.pop();
        prop_assert_eq!(decode(&rows).unwrap_err(), modlink::LinkError::MissingSentinel);
    }
}
