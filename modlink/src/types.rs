//!
//! Type Tags and Function Signatures
//!
//! The closed set of type tags that descriptor rows may name, plus the
//! signature text grammar shared by the encoder and the loader:
//!
//!   function:  (<type>,<type>,...): <type>
//!   object:    <type>
//!   type:      Integer | Double | Boolean | String | Bytes | Unit
//!            | List[<type>] | Tuple[<type>,...]
//!
//! Parsing uses nom combinators over the raw signature text. Display
//! produces the canonical encoding, so `parse(display(x)) == x`.
//!

use std::fmt;
use std::str::FromStr;

use nom::character::complete::{alpha1, char, space0};
use nom::combinator::{all_consuming, opt};
use nom::error::{Error as NomError, ErrorKind};
use nom::multi::{separated_list0, separated_list1};
use nom::sequence::{delimited, preceded, terminated};
use nom::IResult;
use smallvec::SmallVec;
use thiserror::Error;

/// Deepest `List[..]`/`Tuple[..]` nesting a type tag may have.
pub const MAX_TYPE_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Integer,
    Double,
    Boolean,
    String,
    Bytes,
    Unit,
    List(Box<TypeTag>),
    Tuple(Vec<TypeTag>),
}

impl TypeTag {
    pub fn list(elem: TypeTag) -> Self {
        TypeTag::List(Box::new(elem))
    }

    pub fn tuple(items: impl IntoIterator<Item = TypeTag>) -> Self {
        TypeTag::Tuple(items.into_iter().collect())
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Integer => f.write_str("Integer"),
            TypeTag::Double => f.write_str("Double"),
            TypeTag::Boolean => f.write_str("Boolean"),
            TypeTag::String => f.write_str("String"),
            TypeTag::Bytes => f.write_str("Bytes"),
            TypeTag::Unit => f.write_str("Unit"),
            TypeTag::List(elem) => write!(f, "List[{}]", elem),
            TypeTag::Tuple(items) => {
                f.write_str("Tuple[")?;
                write_joined(f, items)?;
                f.write_str("]")
            }
        }
    }
}

impl FromStr for TypeTag {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_type(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionSig {
    pub params: SmallVec<[TypeTag; 4]>,
    pub returns: TypeTag,
}

impl FunctionSig {
    pub fn new(params: impl IntoIterator<Item = TypeTag>, returns: TypeTag) -> Self {
        Self {
            params: params.into_iter().collect(),
            returns,
        }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for FunctionSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        write_joined(f, &self.params)?;
        write!(f, "): {}", self.returns)
    }
}

impl FromStr for FunctionSig {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_function_sig(s)
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[TypeTag]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(",")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid signature '{text}': {reason}")]
pub struct SignatureError {
    pub text: String,
    pub reason: String,
}

impl SignatureError {
    fn from_nom(text: &str, err: nom::Err<NomError<&str>>) -> Self {
        let reason = match err {
            nom::Err::Error(e) | nom::Err::Failure(e) if e.code == ErrorKind::TooLarge => {
                format!("type nesting too deep (limit {})", MAX_TYPE_DEPTH)
            }
            nom::Err::Error(e) | nom::Err::Failure(e) if e.code == ErrorKind::Verify => {
                format!("unknown type at '{}'", e.input)
            }
            nom::Err::Error(e) | nom::Err::Failure(e) if e.input.is_empty() => {
                "unexpected end of signature".to_string()
            }
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                format!("unexpected input at '{}'", e.input)
            }
            nom::Err::Incomplete(_) => "incomplete signature".to_string(),
        };
        Self {
            text: text.to_string(),
            reason,
        }
    }
}

pub fn parse_type(text: &str) -> Result<TypeTag, SignatureError> {
    all_consuming(type_tag)(text)
        .map(|(_, ty)| ty)
        .map_err(|e| SignatureError::from_nom(text, e))
}

pub fn parse_function_sig(text: &str) -> Result<FunctionSig, SignatureError> {
    all_consuming(function_sig)(text)
        .map(|(_, sig)| sig)
        .map_err(|e| SignatureError::from_nom(text, e))
}

fn padded<'a, O>(
    inner: impl FnMut(&'a str) -> IResult<&'a str, O>,
) -> impl FnMut(&'a str) -> IResult<&'a str, O> {
    delimited(space0, inner, space0)
}

fn type_tag(input: &str) -> IResult<&str, TypeTag> {
    nested_type(input, 0)
}

fn nested_type(input: &str, depth: usize) -> IResult<&str, TypeTag> {
    if depth > MAX_TYPE_DEPTH {
        return Err(nom::Err::Failure(NomError::new(input, ErrorKind::TooLarge)));
    }

    let (rest, name) = alpha1(input)?;
    let (rest, args) = opt(delimited(
        char('['),
        separated_list1(char(','), padded(|i| nested_type(i, depth + 1))),
        char(']'),
    ))(rest)?;

    let ty = match (name, args) {
        ("Integer", None) => TypeTag::Integer,
        ("Double", None) => TypeTag::Double,
        ("Boolean", None) => TypeTag::Boolean,
        ("String", None) => TypeTag::String,
        ("Bytes", None) => TypeTag::Bytes,
        ("Unit", None) => TypeTag::Unit,
        ("List", Some(mut args)) if args.len() == 1 => TypeTag::List(Box::new(args.remove(0))),
        ("Tuple", Some(args)) => TypeTag::Tuple(args),
        _ => return Err(nom::Err::Failure(NomError::new(input, ErrorKind::Verify))),
    };

    Ok((rest, ty))
}

fn function_sig(input: &str) -> IResult<&str, FunctionSig> {
    let (rest, params) = delimited(
        char('('),
        separated_list0(char(','), padded(type_tag)),
        char(')'),
    )(input)?;
    let (rest, returns) = preceded(terminated(char(':'), space0), type_tag)(rest)?;

    Ok((rest, FunctionSig::new(params, returns)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalar_types() {
        assert_eq!(parse_type("Integer").unwrap(), TypeTag::Integer);
        assert_eq!(parse_type("Double").unwrap(), TypeTag::Double);
        assert_eq!(parse_type("Boolean").unwrap(), TypeTag::Boolean);
        assert_eq!(parse_type("Unit").unwrap(), TypeTag::Unit);
    }

    #[test]
    fn test_parse_compound_types() {
        assert_eq!(
            parse_type("Tuple[Double,Double]").unwrap(),
            TypeTag::tuple([TypeTag::Double, TypeTag::Double])
        );
        assert_eq!(
            parse_type("List[Tuple[Integer, String]]").unwrap(),
            TypeTag::list(TypeTag::tuple([TypeTag::Integer, TypeTag::String]))
        );
    }

    #[test]
    fn test_parse_function_signatures() {
        let sig = parse_function_sig("(Double,Integer): Double").unwrap();
        assert_eq!(sig.params.as_slice(), &[TypeTag::Double, TypeTag::Integer]);
        assert_eq!(sig.returns, TypeTag::Double);

        let sig = parse_function_sig("(Double): Tuple[Double,Double]").unwrap();
        assert_eq!(sig.arity(), 1);
        assert_eq!(sig.returns, TypeTag::tuple([TypeTag::Double, TypeTag::Double]));

        let sig = parse_function_sig("():Unit").unwrap();
        assert_eq!(sig.arity(), 0);
    }

    #[test]
    fn test_display_is_canonical() {
        let sig = parse_function_sig("( Double , Integer ):   List[Boolean]").unwrap();
        assert_eq!(sig.to_string(), "(Double,Integer): List[Boolean]");
        assert_eq!(
            TypeTag::tuple([TypeTag::Double, TypeTag::list(TypeTag::Bytes)]).to_string(),
            "Tuple[Double,List[Bytes]]"
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let err = parse_type("Float").unwrap_err();
        assert!(err.reason.contains("unknown type"));
        assert!(err.to_string().contains("Float"));

        assert!(parse_type("List[Double,Double]").is_err());
        assert!(parse_type("Tuple[]").is_err());
        assert!(parse_type("Integer[Double]").is_err());
    }

    #[test]
    fn test_malformed_function_signatures() {
        assert!(parse_function_sig("Double").is_err());
        assert!(parse_function_sig("(Double) Double").is_err());
        assert!(parse_function_sig("(Double): ").is_err());
        assert!(parse_function_sig("(Double): Double trailing").is_err());
        assert!("(Double,: Double".parse::<FunctionSig>().is_err());
    }

    fn nested_list(depth: usize) -> String {
        format!("{}Double{}", "List[".repeat(depth), "]".repeat(depth))
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let ty = parse_type(&nested_list(MAX_TYPE_DEPTH)).unwrap();
        assert!(matches!(ty, TypeTag::List(_)));

        let err = parse_type(&nested_list(MAX_TYPE_DEPTH + 1)).unwrap_err();
        assert!(err.reason.contains("too deep"));

        let err = parse_type(&nested_list(200_000)).unwrap_err();
        assert!(err.reason.contains("too deep"));

        let deep_param = format!("({}): Unit", nested_list(200_000));
        assert!(parse_function_sig(&deep_param).is_err());
    }
}
