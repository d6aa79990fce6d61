//! Rule language parser
//!
//! Rules follow a small YARA-like grammar:
//!
//! ```text
//! rule NAME [: TAG ...] {
//!     meta:      KEY = "text" | 123 | true
//!     strings:   $ID = "text" [nocase] [ascii] [wide]
//!                $ID = { 4D 5A ?? 00 }
//!                $ID = /regex/[is] [nocase]
//!     condition: EXPR
//! }
//! ```
//!
//! where `EXPR` combines `$ID`, `true`, `false`, `any of them`, `all of them` and
//! `N of them` with `not`, `and`, `or` and parentheses. `//` and `/* */` comments are
//! allowed wherever whitespace is.

use crate::error::RuleError;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_until, take_while, take_while_m_n};
use nom::character::complete::{char, digit1, multispace1, not_line_ending, satisfy};
use nom::combinator::{map, map_res, not, opt, recognize, value};
use nom::error::{Error, ErrorKind};
use nom::multi::{many0, many1};
use nom::sequence::{delimited, pair, preceded, terminated, tuple};
use nom::IResult;
use std::fmt;

type Res<'a, O> = IResult<&'a str, O>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetaValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MetaValue::Text(s) => f.write_str(s),
            MetaValue::Integer(n) => write!(f, "{}", n),
            MetaValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Modifiers of a text string
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub nocase: bool,
    pub ascii: bool,
    pub wide: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Text { bytes: Vec<u8>, modifiers: Modifiers },
    /// Hex bytes, `None` standing for a `??` wildcard
    Hex(Vec<Option<u8>>),
    Regex {
        source: String,
        case_insensitive: bool,
        dot_all: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringDef {
    /// Identifier without the leading `$`
    pub ident: String,
    pub pattern: Pattern,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
    AtLeast(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    Bool(bool),
    Ident(String),
    Of(Quantifier),
    Not(Box<Condition>),
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

impl Condition {
    /// Every string identifier referenced by the expression
    pub fn idents(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_idents(&mut out);
        out
    }

    fn collect_idents<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Ident(id) => out.push(id),
            Condition::Not(c) => c.collect_idents(out),
            Condition::And(cs) | Condition::Or(cs) => {
                cs.iter().for_each(|c| c.collect_idents(out))
            }
            Condition::Bool(_) | Condition::Of(_) => (),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleDef {
    pub name: String,
    pub tags: Vec<String>,
    pub meta: Vec<(String, MetaValue)>,
    pub strings: Vec<StringDef>,
    pub condition: Condition,
}

/// Parse every rule of `source`
pub fn parse_rules(source: &str) -> Result<Vec<RuleDef>, RuleError> {
    let mut rules = Vec::new();
    let mut rest = source;
    loop {
        rest = skip(rest).map(|(r, _)| r).unwrap_or(rest);
        if rest.is_empty() {
            return Ok(rules);
        }
        match rule(rest) {
            Ok((r, def)) => {
                rules.push(def);
                rest = r;
            }
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                return Err(syntax_error(source, e.input))
            }
            Err(nom::Err::Incomplete(_)) => return Err(syntax_error(source, "")),
        }
    }
}

fn syntax_error(source: &str, at: &str) -> RuleError {
    let at = skip(at).map(|(r, _)| r).unwrap_or(at);
    let offset = source.len().saturating_sub(at.len());
    let line = source.get(..offset).unwrap_or(source).matches('\n').count() + 1;
    let near: String = at.chars().take_while(|&c| c != '\n').take(24).collect();
    let message = if near.is_empty() {
        "unexpected end of input".to_owned()
    } else {
        format!("unexpected input near `{}`", near)
    };
    RuleError::Syntax { line, message }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whitespace and comments
fn skip(i: &str) -> Res<'_, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(tag("//"), not_line_ending)),
            value((), tuple((tag("/*"), take_until("*/"), tag("*/")))),
        ))),
    )(i)
}

fn lex<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> Res<'a, O>
where
    F: FnMut(&'a str) -> Res<'a, O>,
{
    preceded(skip, inner)
}

fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> Res<'a, &'a str> {
    lex(terminated(tag(kw), not(satisfy(is_ident_char))))
}

fn section<'a>(name: &'static str) -> impl FnMut(&'a str) -> Res<'a, ()> {
    value((), pair(keyword(name), lex(char(':'))))
}

fn identifier(i: &str) -> Res<'_, &str> {
    recognize(pair(
        satisfy(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(is_ident_char),
    ))(i)
}

fn hex_byte(i: &str) -> Res<'_, u8> {
    map_res(
        take_while_m_n(2, 2, |c: char| c.is_ascii_hexdigit()),
        |s: &str| u8::from_str_radix(s, 16),
    )(i)
}

fn escape(i: &str) -> Res<'_, u8> {
    alt((
        value(b'"', char('"')),
        value(b'\\', char('\\')),
        value(b'\n', char('n')),
        value(b'\r', char('r')),
        value(b'\t', char('t')),
        preceded(char('x'), hex_byte),
    ))(i)
}

/// Double-quoted string with C-style escapes, as raw bytes
fn quoted(i: &str) -> Res<'_, Vec<u8>> {
    let (mut rest, _) = char('"')(i)?;
    let mut out = Vec::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), out)),
            Some('\\') => {
                let (r, byte) = escape(chars.as_str())?;
                out.push(byte);
                rest = r;
            }
            Some('\n') | None => return Err(nom::Err::Error(Error::new(rest, ErrorKind::Char))),
            Some(c) => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                rest = chars.as_str();
            }
        }
    }
}

fn modifiers(i: &str) -> Res<'_, Modifiers> {
    let (i, words) = many0(alt((
        keyword("nocase"),
        keyword("ascii"),
        keyword("wide"),
        keyword("private"),
    )))(i)?;
    let mut m = Modifiers::default();
    for w in words {
        match w {
            "nocase" => m.nocase = true,
            "ascii" => m.ascii = true,
            "wide" => m.wide = true,
            _ => (),
        }
    }
    Ok((i, m))
}

fn text_pattern(i: &str) -> Res<'_, Pattern> {
    let (i, bytes) = quoted(i)?;
    let (i, modifiers) = modifiers(i)?;
    Ok((i, Pattern::Text { bytes, modifiers }))
}

fn hex_pattern(i: &str) -> Res<'_, Pattern> {
    map(
        delimited(
            char('{'),
            many1(lex(alt((value(None, tag("??")), map(hex_byte, Some))))),
            lex(char('}')),
        ),
        Pattern::Hex,
    )(i)
}

/// `/.../` body; `\/` is unescaped, other escapes are kept for the regex engine
fn regex_body(i: &str) -> Res<'_, String> {
    let (mut rest, _) = char('/')(i)?;
    let mut out = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            Some('/') if !out.is_empty() => return Ok((chars.as_str(), out)),
            Some('\\') => match chars.next() {
                Some('/') => out.push('/'),
                Some(c) if c != '\n' => {
                    out.push('\\');
                    out.push(c);
                }
                _ => return Err(nom::Err::Error(Error::new(rest, ErrorKind::Escaped))),
            },
            Some('/') | Some('\n') | None => {
                return Err(nom::Err::Error(Error::new(rest, ErrorKind::Char)))
            }
            Some(c) => out.push(c),
        }
        rest = chars.as_str();
    }
}

fn regex_pattern(i: &str) -> Res<'_, Pattern> {
    let (i, source) = regex_body(i)?;
    let (i, flags) = take_while(|c: char| c == 'i' || c == 's')(i)?;
    let (i, modifiers) = modifiers(i)?;
    Ok((
        i,
        Pattern::Regex {
            source,
            case_insensitive: flags.contains('i') || modifiers.nocase,
            dot_all: flags.contains('s'),
        },
    ))
}

fn string_def(i: &str) -> Res<'_, StringDef> {
    let (i, _) = lex(char('$'))(i)?;
    let (i, ident) = identifier(i)?;
    let (i, _) = lex(char('='))(i)?;
    let (i, pattern) = lex(alt((text_pattern, hex_pattern, regex_pattern)))(i)?;
    Ok((
        i,
        StringDef {
            ident: ident.to_owned(),
            pattern,
        },
    ))
}

fn meta_value(i: &str) -> Res<'_, MetaValue> {
    alt((
        map(quoted, |b| MetaValue::Text(String::from_utf8_lossy(&b).into_owned())),
        value(MetaValue::Boolean(true), keyword("true")),
        value(MetaValue::Boolean(false), keyword("false")),
        map_res(recognize(pair(opt(char('-')), digit1)), |s: &str| {
            s.parse().map(MetaValue::Integer)
        }),
    ))(i)
}

fn meta_entry(i: &str) -> Res<'_, (String, MetaValue)> {
    let (i, key) = lex(identifier)(i)?;
    let (i, _) = lex(char('='))(i)?;
    let (i, v) = lex(meta_value)(i)?;
    Ok((i, (key.to_owned(), v)))
}

fn quantifier(i: &str) -> Res<'_, Quantifier> {
    alt((
        value(Quantifier::Any, keyword("any")),
        value(Quantifier::All, keyword("all")),
        map_res(lex(digit1), |s: &str| s.parse().map(Quantifier::AtLeast)),
    ))(i)
}

fn primary(i: &str) -> Res<'_, Condition> {
    alt((
        delimited(lex(char('(')), expression, lex(char(')'))),
        value(Condition::Bool(true), keyword("true")),
        value(Condition::Bool(false), keyword("false")),
        map(
            terminated(quantifier, pair(keyword("of"), keyword("them"))),
            Condition::Of,
        ),
        map(preceded(lex(char('$')), identifier), |s: &str| {
            Condition::Ident(s.to_owned())
        }),
    ))(i)
}

fn not_expr(i: &str) -> Res<'_, Condition> {
    alt((
        map(preceded(keyword("not"), not_expr), |c| Condition::Not(Box::new(c))),
        primary,
    ))(i)
}

fn and_expr(i: &str) -> Res<'_, Condition> {
    let (i, first) = not_expr(i)?;
    let (i, rest) = many0(preceded(keyword("and"), not_expr))(i)?;
    Ok((i, fold(first, rest, Condition::And)))
}

fn expression(i: &str) -> Res<'_, Condition> {
    let (i, first) = and_expr(i)?;
    let (i, rest) = many0(preceded(keyword("or"), and_expr))(i)?;
    Ok((i, fold(first, rest, Condition::Or)))
}

fn fold(first: Condition, rest: Vec<Condition>, join: fn(Vec<Condition>) -> Condition) -> Condition {
    if rest.is_empty() {
        first
    } else {
        let mut all = Vec::with_capacity(rest.len() + 1);
        all.push(first);
        all.extend(rest);
        join(all)
    }
}

fn rule(i: &str) -> Res<'_, RuleDef> {
    let (i, _) = opt(alt((keyword("private"), keyword("global"))))(i)?;
    let (i, _) = keyword("rule")(i)?;
    let (i, name) = lex(identifier)(i)?;
    let (i, tags) = opt(preceded(lex(char(':')), many1(lex(identifier))))(i)?;
    let (i, _) = lex(char('{'))(i)?;
    let (i, meta) = opt(preceded(section("meta"), many0(meta_entry)))(i)?;
    let (i, strings) = opt(preceded(section("strings"), many1(string_def)))(i)?;
    let (i, _) = section("condition")(i)?;
    let (i, condition) = expression(i)?;
    let (i, _) = lex(char('}'))(i)?;
    Ok((
        i,
        RuleDef {
            name: name.to_owned(),
            tags: tags
                .unwrap_or_default()
                .into_iter()
                .map(str::to_owned)
                .collect(),
            meta: meta.unwrap_or_default(),
            strings: strings.unwrap_or_default(),
            condition,
        },
    ))
}
