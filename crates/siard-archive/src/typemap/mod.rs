//! Target-side type mapping.
//!
//! Translates a [`NormalizedType`] into the normalized SQL:2008 spelling
//! used in metadata and the wire-format primitive type used in the
//! generated per-table schemas, and parses spellings back when importing.
//!
//! The mapping is total: unmappable types degrade to a string encoding,
//! they never fail.

use crate::model::types::{NormalizedType, TypeDescriptor};

/// Variable-length strings longer than this classify as character large
/// objects instead of bounded strings.
pub const LARGE_CHAR_THRESHOLD: u64 = 8000;

/// Exact numerics with precision 0 or above this are treated as
/// "unspecified precision" and clamped to (1000, 1000).
pub const NUMERIC_PRECISION_MAX: u32 = 1000;

/// Wire-format primitive types used in generated table schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XsdType {
    String,
    Decimal,
    Integer,
    Float,
    Double,
    Boolean,
    Date,
    Time,
    DateTime,
    Clob,
    Blob,
}

impl XsdType {
    /// The type name as written in the generated schema document.
    pub fn wire_name(&self) -> &'static str {
        match self {
            XsdType::String => "xs:string",
            XsdType::Decimal => "xs:decimal",
            XsdType::Integer => "xs:integer",
            XsdType::Float => "xs:float",
            XsdType::Double => "xs:double",
            XsdType::Boolean => "xs:boolean",
            XsdType::Date => "dateType",
            XsdType::Time => "timeType",
            XsdType::DateTime => "dateTimeType",
            XsdType::Clob => "clobType",
            XsdType::Blob => "blobType",
        }
    }

    /// Large types are encoded inline-or-externalized rather than as plain
    /// element text.
    pub fn is_large(&self) -> bool {
        matches!(self, XsdType::Clob | XsdType::Blob)
    }
}

/// Clamp an exact-numeric precision/scale pair.
///
/// Precision 0 or above [`NUMERIC_PRECISION_MAX`] means the source driver
/// did not report a real precision; the pair becomes (1000, 1000) rather
/// than a smaller guess.
pub fn clamp_numeric(precision: u32, scale: u32) -> (u32, u32) {
    if precision == 0 || precision > NUMERIC_PRECISION_MAX {
        (NUMERIC_PRECISION_MAX, NUMERIC_PRECISION_MAX)
    } else {
        (precision, scale)
    }
}

/// Generate the SQL:2008 spelling for a normalized type.
///
/// Returns `None` for kinds that have no canonical spelling (composed,
/// array, unsupported); the descriptor then falls back to the fixed
/// maximum-length string spelling.
pub fn sql2008_spelling(kind: &NormalizedType) -> Option<String> {
    match kind {
        NormalizedType::String {
            length,
            variable: true,
            ..
        } => {
            if *length > LARGE_CHAR_THRESHOLD {
                Some("CHARACTER LARGE OBJECT".to_string())
            } else {
                Some(format!("CHARACTER VARYING({})", length))
            }
        }
        NormalizedType::String {
            length,
            variable: false,
            ..
        } => Some(format!("CHARACTER({})", length)),
        NormalizedType::NumericExact { precision, scale } => {
            let (p, s) = clamp_numeric(*precision, *scale);
            if s == 0 {
                Some(format!("NUMERIC({})", p))
            } else {
                Some(format!("NUMERIC({},{})", p, s))
            }
        }
        NormalizedType::NumericApproximate { precision } => {
            if *precision <= 24 {
                Some("REAL".to_string())
            } else {
                Some("DOUBLE PRECISION".to_string())
            }
        }
        NormalizedType::Boolean => Some("BOOLEAN".to_string()),
        NormalizedType::DateTime {
            time_defined: false,
            ..
        } => Some("DATE".to_string()),
        NormalizedType::DateTime {
            time_defined: true,
            timezone_defined,
        } => {
            if *timezone_defined {
                Some("TIMESTAMP WITH TIME ZONE".to_string())
            } else {
                Some("TIMESTAMP".to_string())
            }
        }
        NormalizedType::Binary {
            length: Some(l), ..
        } => Some(format!("BINARY VARYING({})", l)),
        NormalizedType::Binary { length: None, .. } => {
            Some("BINARY LARGE OBJECT".to_string())
        }
        NormalizedType::Composed(_)
        | NormalizedType::Array(_)
        | NormalizedType::Unsupported { .. } => None,
    }
}

/// Generate the SQL:1999 spelling for a normalized type.
///
/// SQL:1999 predates the binary string types of SQL:2008: bounded binary
/// data is spelled as a bit string sized in bits. Every other kind shares
/// its spelling with [`sql2008_spelling`].
pub fn sql99_spelling(kind: &NormalizedType) -> Option<String> {
    match kind {
        NormalizedType::Binary {
            length: Some(l), ..
        } => Some(format!("BIT VARYING({})", l * 8)),
        NormalizedType::Binary { length: None, .. } => {
            Some("BINARY LARGE OBJECT".to_string())
        }
        other => sql2008_spelling(other),
    }
}

/// Project a type onto its wire-format primitive.
///
/// Composed types are flattened before schema generation, so a composed
/// descriptor reaching this function projects to a string like any other
/// type the wire format cannot express directly.
pub fn xsd_type(descriptor: &TypeDescriptor) -> XsdType {
    match &descriptor.kind {
        NormalizedType::String {
            length, variable, ..
        } => {
            if *variable && *length > LARGE_CHAR_THRESHOLD {
                XsdType::Clob
            } else {
                XsdType::String
            }
        }
        NormalizedType::NumericExact { precision, scale } => {
            let (_, s) = clamp_numeric(*precision, *scale);
            if s == 0 {
                XsdType::Integer
            } else {
                XsdType::Decimal
            }
        }
        NormalizedType::NumericApproximate { precision } => {
            if *precision <= 24 {
                XsdType::Float
            } else {
                XsdType::Double
            }
        }
        NormalizedType::Boolean => XsdType::Boolean,
        NormalizedType::DateTime {
            time_defined: false,
            ..
        } => XsdType::Date,
        NormalizedType::DateTime {
            time_defined: true, ..
        } => XsdType::DateTime,
        NormalizedType::Binary { .. } => XsdType::Blob,
        NormalizedType::Composed(_)
        | NormalizedType::Array(_)
        | NormalizedType::Unsupported { .. } => XsdType::String,
    }
}

/// Parse a SQL:2008 spelling back into a normalized kind.
///
/// Inverse of [`sql2008_spelling`] for the spellings it produces; anything
/// else degrades to `Unsupported` with the original spelling preserved.
pub fn parse_sql2008(spelling: &str) -> NormalizedType {
    let s = spelling.trim();
    let upper = s.to_ascii_uppercase();

    if upper == "BOOLEAN" {
        return NormalizedType::Boolean;
    }
    if upper == "DATE" {
        return NormalizedType::DateTime {
            time_defined: false,
            timezone_defined: false,
        };
    }
    if upper == "TIMESTAMP" {
        return NormalizedType::DateTime {
            time_defined: true,
            timezone_defined: false,
        };
    }
    if upper == "TIMESTAMP WITH TIME ZONE" {
        return NormalizedType::DateTime {
            time_defined: true,
            timezone_defined: true,
        };
    }
    if upper == "REAL" {
        return NormalizedType::NumericApproximate { precision: 24 };
    }
    if upper == "DOUBLE PRECISION" {
        return NormalizedType::NumericApproximate { precision: 53 };
    }
    if upper == "CHARACTER LARGE OBJECT" || upper == "CLOB" {
        return NormalizedType::String {
            length: u32::MAX as u64,
            variable: true,
            charset: None,
        };
    }
    if upper == "BINARY LARGE OBJECT" || upper == "BLOB" {
        return NormalizedType::Binary {
            length: None,
            format_registry: None,
        };
    }

    if let Some(args) = parenthesized(&upper, "CHARACTER VARYING")
        .or_else(|| parenthesized(&upper, "VARCHAR"))
    {
        if let Some(length) = single_u64(args) {
            return NormalizedType::String {
                length,
                variable: true,
                charset: None,
            };
        }
    }
    if let Some(args) =
        parenthesized(&upper, "CHARACTER").or_else(|| parenthesized(&upper, "CHAR"))
    {
        if let Some(length) = single_u64(args) {
            return NormalizedType::String {
                length,
                variable: false,
                charset: None,
            };
        }
    }
    if let Some(args) =
        parenthesized(&upper, "NUMERIC").or_else(|| parenthesized(&upper, "DECIMAL"))
    {
        let mut parts = args.split(',').map(str::trim);
        let precision = parts.next().and_then(|p| p.parse::<u32>().ok());
        let scale = parts.next().map(|p| p.trim().parse::<u32>().ok());
        match (precision, scale) {
            (Some(p), None) => {
                return NormalizedType::NumericExact {
                    precision: p,
                    scale: 0,
                }
            }
            (Some(p), Some(Some(sc))) => {
                return NormalizedType::NumericExact {
                    precision: p,
                    scale: sc,
                }
            }
            _ => {}
        }
    }
    if let Some(args) = parenthesized(&upper, "BINARY VARYING") {
        if let Some(length) = single_u64(args) {
            return NormalizedType::Binary {
                length: Some(length),
                format_registry: None,
            };
        }
    }
    if upper == "INTEGER" || upper == "INT" {
        return NormalizedType::NumericExact {
            precision: 10,
            scale: 0,
        };
    }

    NormalizedType::Unsupported {
        original: s.to_string(),
    }
}

/// Extract `args` from `NAME(args)`, requiring an exact prefix match.
fn parenthesized<'a>(upper: &'a str, name: &str) -> Option<&'a str> {
    let rest = upper.strip_prefix(name)?;
    let rest = rest.trim_start();
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    Some(inner)
}

fn single_u64(args: &str) -> Option<u64> {
    args.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(kind: NormalizedType) -> TypeDescriptor {
        TypeDescriptor::new(kind)
    }

    #[test]
    fn test_numeric_clamp() {
        assert_eq!(clamp_numeric(0, 0), (1000, 1000));
        assert_eq!(clamp_numeric(1001, 2), (1000, 1000));
        assert_eq!(clamp_numeric(1000, 2), (1000, 2));
        assert_eq!(clamp_numeric(10, 2), (10, 2));
    }

    #[test]
    fn test_large_string_promotes_to_clob() {
        let bounded = desc(NormalizedType::String {
            length: 8000,
            variable: true,
            charset: None,
        });
        let large = desc(NormalizedType::String {
            length: 8001,
            variable: true,
            charset: None,
        });
        assert_eq!(xsd_type(&bounded), XsdType::String);
        assert_eq!(xsd_type(&large), XsdType::Clob);
        assert_eq!(
            sql2008_spelling(&large.kind).unwrap(),
            "CHARACTER LARGE OBJECT"
        );
    }

    #[test]
    fn test_fixed_string_never_promotes() {
        let fixed = desc(NormalizedType::String {
            length: 9000,
            variable: false,
            charset: None,
        });
        assert_eq!(xsd_type(&fixed), XsdType::String);
    }

    #[test]
    fn test_xsd_projection_table() {
        let cases: Vec<(NormalizedType, XsdType)> = vec![
            (
                NormalizedType::NumericExact {
                    precision: 10,
                    scale: 0,
                },
                XsdType::Integer,
            ),
            (
                NormalizedType::NumericExact {
                    precision: 10,
                    scale: 2,
                },
                XsdType::Decimal,
            ),
            (
                NormalizedType::NumericApproximate { precision: 24 },
                XsdType::Float,
            ),
            (
                NormalizedType::NumericApproximate { precision: 53 },
                XsdType::Double,
            ),
            (NormalizedType::Boolean, XsdType::Boolean),
            (
                NormalizedType::DateTime {
                    time_defined: false,
                    timezone_defined: false,
                },
                XsdType::Date,
            ),
            (
                NormalizedType::DateTime {
                    time_defined: true,
                    timezone_defined: true,
                },
                XsdType::DateTime,
            ),
            (
                NormalizedType::Binary {
                    length: Some(16),
                    format_registry: None,
                },
                XsdType::Blob,
            ),
            (
                NormalizedType::Unsupported {
                    original: "geometry".to_string(),
                },
                XsdType::String,
            ),
        ];
        for (kind, expected) in cases {
            assert_eq!(xsd_type(&desc(kind.clone())), expected, "{:?}", kind);
        }
    }

    #[test]
    fn test_unsupported_never_fails() {
        let t = desc(NormalizedType::Unsupported {
            original: "hierarchyid".to_string(),
        });
        assert_eq!(xsd_type(&t), XsdType::String);
        assert_eq!(t.sql2008(), "VARCHAR(2147483647)");
    }

    #[test]
    fn test_parse_round_trips_generated_spellings() {
        let kinds = vec![
            NormalizedType::String {
                length: 80,
                variable: true,
                charset: None,
            },
            NormalizedType::String {
                length: 10,
                variable: false,
                charset: None,
            },
            NormalizedType::NumericExact {
                precision: 12,
                scale: 3,
            },
            NormalizedType::Boolean,
            NormalizedType::DateTime {
                time_defined: true,
                timezone_defined: true,
            },
            NormalizedType::Binary {
                length: Some(32),
                format_registry: None,
            },
            NormalizedType::Binary {
                length: None,
                format_registry: None,
            },
        ];
        for kind in kinds {
            let spelling = sql2008_spelling(&kind).unwrap();
            assert_eq!(parse_sql2008(&spelling), kind, "{}", spelling);
        }
    }

    #[test]
    fn test_sql99_binary_spellings() {
        let bounded = NormalizedType::Binary {
            length: Some(16),
            format_registry: None,
        };
        assert_eq!(sql99_spelling(&bounded).unwrap(), "BIT VARYING(128)");
        assert_eq!(sql2008_spelling(&bounded).unwrap(), "BINARY VARYING(16)");

        let unbounded = NormalizedType::Binary {
            length: None,
            format_registry: None,
        };
        assert_eq!(sql99_spelling(&unbounded).unwrap(), "BINARY LARGE OBJECT");

        // non-binary kinds share one spelling across generations
        let b = NormalizedType::Boolean;
        assert_eq!(sql99_spelling(&b), sql2008_spelling(&b));
    }

    #[test]
    fn test_large_types_classified() {
        assert!(XsdType::Blob.is_large());
        assert!(XsdType::Clob.is_large());
        assert!(!XsdType::String.is_large());
        assert!(!XsdType::Decimal.is_large());
    }

    #[test]
    fn test_parse_unknown_degrades() {
        match parse_sql2008("GEOMETRY") {
            NormalizedType::Unsupported { original } => assert_eq!(original, "GEOMETRY"),
            other => panic!("expected Unsupported, got {:?}", other),
        }
    }
}
