//!
//! Descriptor Table Codec
//!
//! A native module describes its exports with an ordered list of rows:
//!
//!   F\0<name>\0(<arg>,<arg>,...): <return>     function
//!   O\0<name>\0<type>                          object (constant)
//!   Z                                          sentinel, always last
//!
//! Rows are decoded once into `SymbolEntry` values held by a
//! `ModuleDescriptor`; the loader never looks at the raw text again.
//! Generated tables may open with the reserved header row `"\0\0"`,
//! which pairs with the reserved slot 0 of the linkage table and is
//! skipped when it is the first row.
//!

mod source;

pub use source::{decode_blob, render_rows, DescriptorSource};

use crate::error::LinkError;
use crate::types::{parse_function_sig, parse_type, FunctionSig, TypeTag};

pub const FIELD_SEPARATOR: char = '\0';
pub const SENTINEL_ROW: &str = "Z";
pub const HEADER_ROW: &str = "\0\0";

/// Linkage slot of the first function; slot 0 is the reserved guard.
pub const FIRST_FUNCTION_SLOT: usize = 1;

/// Leading reserved guard plus trailing version guard.
pub const GUARD_SLOT_COUNT: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolEntry {
    Function(FunctionEntry),
    Object(ObjectEntry),
    Sentinel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionEntry {
    pub name: String,
    pub signature: FunctionSig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub name: String,
    pub ty: TypeTag,
}

impl SymbolEntry {
    pub fn function(name: impl Into<String>, signature: FunctionSig) -> Self {
        SymbolEntry::Function(FunctionEntry {
            name: name.into(),
            signature,
        })
    }

    pub fn object(name: impl Into<String>, ty: TypeTag) -> Self {
        SymbolEntry::Object(ObjectEntry {
            name: name.into(),
            ty,
        })
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            SymbolEntry::Function(f) => Some(&f.name),
            SymbolEntry::Object(o) => Some(&o.name),
            SymbolEntry::Sentinel => None,
        }
    }

    pub fn kind_tag(&self) -> char {
        match self {
            SymbolEntry::Function(_) => 'F',
            SymbolEntry::Object(_) => 'O',
            SymbolEntry::Sentinel => 'Z',
        }
    }

    pub fn encode(&self) -> String {
        match self {
            SymbolEntry::Function(f) => format!("F\0{}\0{}", f.name, f.signature),
            SymbolEntry::Object(o) => format!("O\0{}\0{}", o.name, o.ty),
            SymbolEntry::Sentinel => SENTINEL_ROW.to_string(),
        }
    }
}

/// A function entry together with the linkage slot it binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSlot<'a> {
    pub slot: usize,
    pub entry: &'a FunctionEntry,
}

/// Decoded exports of one native module. Always ends in exactly one
/// `SymbolEntry::Sentinel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    entries: Vec<SymbolEntry>,
}

impl ModuleDescriptor {
    /// Builds a descriptor from its symbols; the sentinel is appended here
    /// and any sentinel among `symbols` is dropped.
    pub fn new(symbols: impl IntoIterator<Item = SymbolEntry>) -> Self {
        let mut entries: Vec<SymbolEntry> = symbols
            .into_iter()
            .filter(|e| !matches!(e, SymbolEntry::Sentinel))
            .collect();
        entries.push(SymbolEntry::Sentinel);
        Self { entries }
    }

    /// All rows including the trailing sentinel.
    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    /// Exported symbols, without the sentinel.
    pub fn symbols(&self) -> &[SymbolEntry] {
        &self.entries[..self.entries.len() - 1]
    }

    pub fn functions(&self) -> impl Iterator<Item = FunctionSlot<'_>> {
        self.symbols()
            .iter()
            .filter_map(|e| match e {
                SymbolEntry::Function(f) => Some(f),
                _ => None,
            })
            .enumerate()
            .map(|(i, entry)| FunctionSlot {
                slot: FIRST_FUNCTION_SLOT + i,
                entry,
            })
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectEntry> {
        self.symbols().iter().filter_map(|e| match e {
            SymbolEntry::Object(o) => Some(o),
            _ => None,
        })
    }

    pub fn function_count(&self) -> usize {
        self.functions().count()
    }

    /// Linkage table length this descriptor requires: leading guard, one
    /// slot per function, trailing version guard.
    pub fn expected_slots(&self) -> usize {
        self.function_count() + GUARD_SLOT_COUNT
    }

    pub fn get(&self, name: &str) -> Option<&SymbolEntry> {
        self.symbols().iter().find(|e| e.name() == Some(name))
    }

    pub fn encode(&self) -> Vec<String> {
        encode(&self.entries)
    }
}

/// Encodes entries into canonical rows, terminating with a single `Z` row.
pub fn encode(entries: &[SymbolEntry]) -> Vec<String> {
    let mut rows: Vec<String> = entries
        .iter()
        .filter(|e| !matches!(e, SymbolEntry::Sentinel))
        .map(SymbolEntry::encode)
        .collect();
    rows.push(SENTINEL_ROW.to_string());
    rows
}

pub fn decode<S: AsRef<str>>(rows: &[S]) -> Result<ModuleDescriptor, LinkError> {
    let offset = match rows.first() {
        Some(first) if first.as_ref() == HEADER_ROW => 1,
        _ => 0,
    };
    let body = &rows[offset..];

    match body.last() {
        Some(last) if last.as_ref() == SENTINEL_ROW => {}
        _ => return Err(LinkError::MissingSentinel),
    }

    let mut entries = Vec::with_capacity(body.len());
    for (i, row) in body.iter().enumerate() {
        let index = i + offset;
        let entry = decode_row(index, row.as_ref())?;
        if matches!(entry, SymbolEntry::Sentinel) && i + 1 != body.len() {
            return Err(LinkError::malformed(index, "sentinel row before end of table"));
        }
        entries.push(entry);
    }

    Ok(ModuleDescriptor { entries })
}

fn decode_row(index: usize, row: &str) -> Result<SymbolEntry, LinkError> {
    let mut fields = row.split(FIELD_SEPARATOR);
    let kind = fields.next().unwrap_or_default();

    match kind {
        "Z" => {
            if fields.next().is_some() {
                return Err(LinkError::malformed(index, "sentinel row carries extra fields"));
            }
            Ok(SymbolEntry::Sentinel)
        }
        "F" | "O" => {
            let name = fields
                .next()
                .ok_or_else(|| LinkError::malformed(index, "missing name field"))?;
            let signature = fields
                .next()
                .ok_or_else(|| LinkError::malformed(index, "missing signature field"))?;
            if fields.next().is_some() {
                return Err(LinkError::malformed(index, "unexpected extra field"));
            }
            validate_name(index, name)?;
            if signature.is_empty() {
                return Err(LinkError::malformed(index, "missing signature field"));
            }

            if kind == "F" {
                let signature = parse_function_sig(signature)
                    .map_err(|e| LinkError::malformed(index, e.to_string()))?;
                Ok(SymbolEntry::function(name, signature))
            } else {
                let ty = parse_type(signature)
                    .map_err(|e| LinkError::malformed(index, e.to_string()))?;
                Ok(SymbolEntry::object(name, ty))
            }
        }
        other => Err(LinkError::malformed(
            index,
            format!("unknown kind tag '{}'", other.escape_debug()),
        )),
    }
}

fn validate_name(index: usize, name: &str) -> Result<(), LinkError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if name.is_empty() {
        Err(LinkError::malformed(index, "missing name field"))
    } else if !valid {
        Err(LinkError::malformed(
            index,
            format!("invalid symbol name '{}'", name.escape_debug()),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATH_ROWS: &[&str] = &[
        "F\0sqrt\0(Double): Double",
        "F\0modf\0(Double): Tuple[Double,Double]",
        "O\0pi\0Double",
        "Z",
    ];

    #[test]
    fn test_decode_math_rows() {
        let desc = decode(MATH_ROWS).unwrap();
        assert_eq!(desc.entries().len(), 4);
        assert_eq!(desc.symbols().len(), 3);
        assert_eq!(desc.entries().last(), Some(&SymbolEntry::Sentinel));
        assert_eq!(desc.function_count(), 2);
        assert_eq!(desc.expected_slots(), 4);

        match desc.get("pi") {
            Some(SymbolEntry::Object(o)) => assert_eq!(o.ty, TypeTag::Double),
            other => panic!("expected object entry, got {:?}", other),
        }
    }

    #[test]
    fn test_function_slots_skip_objects() {
        let desc = decode(&["O\0pi\0Double", "F\0sin\0(Double): Double", "F\0cos\0(Double): Double", "Z"]).unwrap();
        let slots: Vec<(usize, &str)> = desc
            .functions()
            .map(|f| (f.slot, f.entry.name.as_str()))
            .collect();
        assert_eq!(slots, vec![(1, "sin"), (2, "cos")]);
    }

    #[test]
    fn test_header_row_is_skipped() {
        let desc = decode(&["\0\0", "F\0abs\0(Integer): Integer", "Z"]).unwrap();
        assert_eq!(desc.symbols().len(), 1);

        let err = decode(&["F\0abs\0(Integer): Integer", "\0\0", "Z"]).unwrap_err();
        assert!(matches!(err, LinkError::MalformedEntry { row: 1, .. }));
    }

    #[test]
    fn test_missing_sentinel() {
        assert_eq!(
            decode(&["F\0sqrt\0(Double): Double", "O\0pi\0Double"]).unwrap_err(),
            LinkError::MissingSentinel
        );
        assert_eq!(decode::<&str>(&[]).unwrap_err(), LinkError::MissingSentinel);
        assert_eq!(decode(&["\0\0"]).unwrap_err(), LinkError::MissingSentinel);
    }

    #[test]
    fn test_malformed_rows() {
        let cases: &[(&[&str], usize)] = &[
            (&["Q\0x\0Double", "Z"], 0),
            (&["F\0sqrt", "Z"], 0),
            (&["O\0pi", "Z"], 0),
            (&["O\0\0Double", "Z"], 0),
            (&["O\0pi\0", "Z"], 0),
            (&["O\0pi\0Double\0extra", "Z"], 0),
            (&["O\0pi\0Double", "F\0bad name\0(Double): Double", "Z"], 1),
            (&["O\0pi\0Float", "Z"], 0),
            (&["F\0sqrt\0Double", "Z"], 0),
            (&["Z", "O\0pi\0Double", "Z"], 0),
            (&["O\0pi\0Double", "Z\0", "Z"], 1),
        ];

        for (rows, row) in cases {
            match decode(rows) {
                Err(LinkError::MalformedEntry { row: r, .. }) => assert_eq!(r, *row, "rows: {:?}", rows),
                other => panic!("expected MalformedEntry for {:?}, got {:?}", rows, other),
            }
        }
    }

    #[test]
    fn test_decode_is_idempotent() {
        assert_eq!(decode(MATH_ROWS).unwrap(), decode(MATH_ROWS).unwrap());
    }

    #[test]
    fn test_encode_canonical_rows() {
        let desc = ModuleDescriptor::new([
            SymbolEntry::function("fmod", FunctionSig::new([TypeTag::Double, TypeTag::Double], TypeTag::Double)),
            SymbolEntry::object("nan", TypeTag::Double),
            SymbolEntry::Sentinel,
        ]);
        assert_eq!(
            desc.encode(),
            vec!["F\0fmod\0(Double,Double): Double", "O\0nan\0Double", "Z"]
        );
        assert_eq!(decode(&desc.encode()).unwrap(), desc);
    }

    #[test]
    fn test_deeply_nested_type_is_malformed() {
        let row = format!("O\0x\0{}Double{}", "List[".repeat(200_000), "]".repeat(200_000));
        match decode(&[row.as_str(), "Z"]) {
            Err(LinkError::MalformedEntry { row: 0, reason }) => assert!(reason.contains("too deep")),
            other => panic!("expected MalformedEntry, got {:?}", other.map(|d| d.symbols().len())),
        }
    }
}
