//! ISO 10303-21 physical file parsing.
//!
//! Parses the DATA section of a STEP exchange file into raw entity
//! instances. Complex instances keep every typed segment instead of being
//! flattened, so downstream lookups can match any of the leaf types.

use nom::{
    bytes::complete::{tag, take_until, take_while1},
    character::complete::{char, digit1, multispace0, one_of},
    combinator::{map, opt, recognize},
    multi::{many0, many1, separated_list0},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};

/// One attribute value in an entity's parameter list.
#[derive(Debug, Clone, PartialEq)]
pub enum Attr {
    /// Whole number.
    Integer(i64),
    /// Real number (anything with a decimal point or exponent).
    Real(f64),
    /// Quoted string, escape sequences decoded.
    Str(String),
    /// Reference to another instance (`#123`).
    Ref(u64),
    /// Enumeration literal (`.T.`, `.PLANE_ANGLE.`).
    Enumeration(String),
    /// Parenthesized aggregate.
    List(Vec<Attr>),
    /// Typed parameter (`LENGTH_MEASURE(1.0)`).
    Typed(String, Vec<Attr>),
    /// Unset (`$`).
    Unset,
    /// Derived in a subtype (`*`).
    Derived,
}

impl Attr {
    /// Follow an entity reference.
    pub fn as_ref_id(&self) -> Option<u64> {
        match self {
            Attr::Ref(id) => Some(*id),
            Attr::Typed(_, inner) => inner.first().and_then(Attr::as_ref_id),
            _ => None,
        }
    }

    /// Numeric value, coercing integers.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Attr::Real(v) => Some(*v),
            Attr::Integer(v) => Some(*v as f64),
            Attr::Typed(_, inner) => inner.first().and_then(Attr::as_real),
            _ => None,
        }
    }

    /// String payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Attr::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean from the `.T.` / `.F.` enumeration.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Attr::Enumeration(e) if e == "T" => Some(true),
            Attr::Enumeration(e) if e == "F" => Some(false),
            _ => None,
        }
    }

    /// The aggregate's items.
    pub fn as_list(&self) -> Option<&[Attr]> {
        match self {
            Attr::List(items) => Some(items),
            _ => None,
        }
    }

    /// References inside an aggregate.
    pub fn ref_list(&self) -> Vec<u64> {
        self.as_list()
            .map(|items| items.iter().filter_map(Attr::as_ref_id).collect())
            .unwrap_or_default()
    }

    /// Reals inside an aggregate.
    pub fn real_list(&self) -> Vec<f64> {
        self.as_list()
            .map(|items| items.iter().filter_map(Attr::as_real).collect())
            .unwrap_or_default()
    }
}

/// One typed segment of an instance; simple instances have exactly one.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Entity type name, uppercased.
    pub type_name: String,
    /// Attribute list.
    pub attrs: Vec<Attr>,
}

/// A parsed entity instance (`#id = ...;`).
#[derive(Debug, Clone)]
pub struct Instance {
    /// Instance id.
    pub id: u64,
    /// Typed segments; one for simple instances, several for complex ones.
    pub segments: Vec<Segment>,
}

impl Instance {
    /// Type name of the first segment.
    pub fn primary_type(&self) -> &str {
        self.segments
            .first()
            .map(|s| s.type_name.as_str())
            .unwrap_or("")
    }

    /// True if any segment has the given type.
    pub fn has_type(&self, name: &str) -> bool {
        self.segments.iter().any(|s| s.type_name == name)
    }

    /// Attributes of the segment with the given type.
    pub fn segment(&self, name: &str) -> Option<&[Attr]> {
        self.segments
            .iter()
            .find(|s| s.type_name == name)
            .map(|s| s.attrs.as_slice())
    }

    /// Attributes of the first (and for simple instances, only) segment.
    pub fn attrs(&self) -> &[Attr] {
        self.segments
            .first()
            .map(|s| s.attrs.as_slice())
            .unwrap_or(&[])
    }

    /// Attribute at position `idx` of the first segment.
    pub fn attr(&self, idx: usize) -> Option<&Attr> {
        self.attrs().get(idx)
    }
}

fn instance_id(input: &str) -> IResult<&str, u64> {
    preceded(
        char('#'),
        map(digit1, |s: &str| s.parse().unwrap_or(0)),
    )(input)
}

/// STEP numbers: sign, digits, optional fraction and exponent. The token
/// decides Integer vs Real; a bare `42` stays integral.
fn number(input: &str) -> IResult<&str, Attr> {
    let (rest, text) = recognize(tuple((
        opt(one_of("+-")),
        digit1,
        opt(pair(char('.'), opt(digit1))),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;

    let attr = if text.contains(['.', 'e', 'E']) {
        Attr::Real(text.parse().unwrap_or(0.0))
    } else {
        Attr::Integer(text.parse().unwrap_or(0))
    };
    Ok((rest, attr))
}

/// Quoted string with `''` quote escaping and `\X2\..\X0\` / `\X\HH`
/// decoding.
fn quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('\'')(input)?;
    let mut raw = String::new();
    let mut offset = 0;
    let bytes = input.as_bytes();

    while offset < bytes.len() {
        if bytes[offset] == b'\'' {
            if bytes.get(offset + 1) == Some(&b'\'') {
                raw.push('\'');
                offset += 2;
            } else {
                return Ok((&input[offset + 1..], decode_escapes(&raw)));
            }
        } else {
            let ch = input[offset..].chars().next().unwrap();
            raw.push(ch);
            offset += ch.len_utf8();
        }
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// Decode STEP control-directive escapes inside string payloads.
fn decode_escapes(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if let Some(body) = tail.strip_prefix("\\X2\\") {
            // UTF-16 code units as hex quads until \X0\.
            let end = body.find("\\X0\\").unwrap_or(body.len());
            let hex = &body[..end];
            for chunk in hex.as_bytes().chunks_exact(4) {
                if let Ok(code) = u16::from_str_radix(std::str::from_utf8(chunk).unwrap_or(""), 16)
                {
                    if let Some(ch) = char::from_u32(code as u32) {
                        out.push(ch);
                    }
                }
            }
            rest = &body[(end + 4).min(body.len())..];
        } else if let Some(body) = tail.strip_prefix("\\X\\") {
            if body.len() >= 2 {
                if let Ok(byte) = u8::from_str_radix(&body[..2], 16) {
                    out.push(byte as char);
                }
                rest = &body[2..];
            } else {
                rest = body;
            }
        } else {
            out.push('\\');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

fn enumeration(input: &str) -> IResult<&str, String> {
    delimited(
        char('.'),
        map(
            take_while1(|c: char| c.is_alphanumeric() || c == '_'),
            String::from,
        ),
        char('.'),
    )(input)
}

fn type_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_')(input)
}

fn attr_list(input: &str) -> IResult<&str, Vec<Attr>> {
    delimited(
        pair(char('('), multispace0),
        terminated(
            separated_list0(tuple((multispace0, char(','), multispace0)), attr_value),
            multispace0,
        ),
        char(')'),
    )(input)
}

fn attr_value(input: &str) -> IResult<&str, Attr> {
    let (input, _) = multispace0(input)?;

    match input.chars().next() {
        Some('$') => map(char('$'), |_| Attr::Unset)(input),
        Some('*') => map(char('*'), |_| Attr::Derived)(input),
        Some('#') => map(instance_id, Attr::Ref)(input),
        Some('.') => map(enumeration, Attr::Enumeration)(input),
        Some('\'') => map(quoted_string, Attr::Str)(input),
        Some('(') => map(attr_list, Attr::List)(input),
        Some(c) if c.is_ascii_digit() || c == '+' || c == '-' => number(input),
        _ => {
            // Typed parameter: NAME ( attrs... )
            let (input, name) = type_name(input)?;
            let (input, _) = multispace0(input)?;
            let (input, attrs) = attr_list(input)?;
            Ok((input, Attr::Typed(name.to_uppercase(), attrs)))
        }
    }
}

fn segment(input: &str) -> IResult<&str, Segment> {
    let (input, _) = multispace0(input)?;
    let (input, name) = type_name(input)?;
    let (input, _) = multispace0(input)?;
    let (input, attrs) = attr_list(input)?;
    Ok((
        input,
        Segment {
            type_name: name.to_uppercase(),
            attrs,
        },
    ))
}

/// Parse one instance line: `#id = SEGMENT;` or `#id = ( SEG1 SEG2 ... );`.
pub fn instance(input: &str) -> IResult<&str, Instance> {
    let (input, _) = multispace0(input)?;
    let (input, id) = instance_id(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = multispace0(input)?;

    let (input, segments) = if input.starts_with('(') {
        delimited(
            pair(char('('), multispace0),
            many1(terminated(segment, multispace0)),
            char(')'),
        )(input)?
    } else {
        map(segment, |s| vec![s])(input)?
    };

    let (input, _) = multispace0(input)?;
    let (input, _) = char(';')(input)?;

    Ok((input, Instance { id, segments }))
}

/// Parse every instance in the DATA section.
pub fn parse_data_section(input: &str) -> IResult<&str, Vec<Instance>> {
    let (input, _) = take_until("DATA;")(input)?;
    let (input, _) = tag("DATA;")(input)?;
    let (input, _) = multispace0(input)?;
    let (input, instances) = many0(terminated(instance, multispace0))(input)?;
    let (input, _) = tag("ENDSEC;")(input)?;
    Ok((input, instances))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_keep_their_kind() {
        assert_eq!(number("42").unwrap().1, Attr::Integer(42));
        assert!(matches!(number("0.").unwrap().1, Attr::Real(v) if v == 0.0));
        assert!(matches!(number("-1.5E-3").unwrap().1, Attr::Real(v) if (v + 0.0015).abs() < 1e-12));
    }

    #[test]
    fn test_quoted_escapes() {
        assert_eq!(quoted_string("'it''s'").unwrap().1, "it's");
        assert_eq!(quoted_string("'A\\X2\\00E9\\X0\\B'").unwrap().1, "AéB");
        assert_eq!(quoted_string("'\\X\\41'").unwrap().1, "A");
    }

    #[test]
    fn test_simple_instance() {
        let (_, inst) = instance("#10 = CARTESIAN_POINT ( 'origin', ( 0., 0., 0. ) );").unwrap();
        assert_eq!(inst.id, 10);
        assert_eq!(inst.primary_type(), "CARTESIAN_POINT");
        assert_eq!(inst.attr(1).unwrap().real_list(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_complex_instance_keeps_segments() {
        let text = "#914 = ( GEOMETRIC_REPRESENTATION_CONTEXT ( 3 ) \
                    GLOBAL_UNIT_ASSIGNED_CONTEXT ( ( #1, #2 ) ) );";
        let (_, inst) = instance(text).unwrap();
        assert_eq!(inst.segments.len(), 2);
        assert!(inst.has_type("GLOBAL_UNIT_ASSIGNED_CONTEXT"));
        assert_eq!(
            inst.segment("GLOBAL_UNIT_ASSIGNED_CONTEXT").unwrap()[0].ref_list(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_typed_parameter() {
        let (_, inst) =
            instance("#1 = UNCERTAINTY_MEASURE_WITH_UNIT ( LENGTH_MEASURE ( 1.0E-05 ), #2, 'a', 'b' );")
                .unwrap();
        assert!(matches!(
            inst.attr(0),
            Some(Attr::Typed(name, _)) if name == "LENGTH_MEASURE"
        ));
        assert!((inst.attr(0).unwrap().as_real().unwrap() - 1.0e-5).abs() < 1e-12);
    }

    #[test]
    fn test_data_section_with_crlf() {
        let text = "ISO-10303-21;\r\nHEADER;\r\nENDSEC;\r\nDATA;\r\n\
                    #1 = CARTESIAN_POINT ( '', ( 1., 2., 3. ) );\r\n\
                    #2 = DIRECTION ( '', ( 0., 0., 1. ) );\r\n\
                    ENDSEC;\r\nEND-ISO-10303-21;\r\n";
        let (_, instances) = parse_data_section(text).unwrap();
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[1].primary_type(), "DIRECTION");
    }

    #[test]
    fn test_booleans_and_unset() {
        let (_, inst) = instance("#5 = FACE_OUTER_BOUND ( '', #8, .T. );").unwrap();
        assert_eq!(inst.attr(2).unwrap().as_bool(), Some(true));

        let (_, inst) = instance("#6 = ORIENTED_EDGE ( '', *, *, #9, .F. );").unwrap();
        assert_eq!(inst.attr(1), Some(&Attr::Derived));
        assert_eq!(inst.attr(4).unwrap().as_bool(), Some(false));
    }
}
