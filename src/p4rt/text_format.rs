//! Reader for the protobuf text format, enough of it to load the
//! `*.p4info.txt` files the P4 compiler writes next to the device config.

use crate::error::SchemaLoadError;
use nom::branch::alt;
use nom::bytes::complete::{escaped_transform, is_not, take_while, take_while_m_n};
use nom::character::complete::{char, multispace1, none_of, not_line_ending, one_of, satisfy};
use nom::combinator::{all_consuming, cut, map, map_opt, opt, recognize, value};
use nom::error::{context, ErrorKind, VerboseError, VerboseErrorKind};
use nom::multi::{many0, many1, separated_list0};
use nom::sequence::{pair, preceded, terminated};
use nom::{IResult, Parser};

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Ident(String),
    Message(Message),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    pub fields: Vec<(String, Value)>,
}

impl Message {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.fields
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn messages<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Message> + 'a {
        self.all(name).filter_map(|v| match v {
            Value::Message(m) => Some(m),
            _ => None,
        })
    }

    pub fn message(&self, name: &str) -> Option<&Message> {
        match self.get(name)? {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn strs<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.all(name).filter_map(|v| match v {
            Value::Str(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn ints<'a>(&'a self, name: &'a str) -> impl Iterator<Item = i64> + 'a {
        self.all(name).filter_map(|v| match v {
            Value::Int(i) => Some(*i),
            _ => None,
        })
    }

    pub fn ident(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            Value::Ident(s) => Some(s),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.ident(name)? {
            "true" | "True" | "t" => Some(true),
            "false" | "False" | "f" => Some(false),
            _ => None,
        }
    }
}

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

fn syntax(line: usize, message: impl Into<String>) -> SchemaLoadError {
    SchemaLoadError::Syntax {
        line,
        message: message.into(),
    }
}

/// Whitespace and `#` comments.
fn blank(i: &str) -> Res<()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), pair(char('#'), not_line_ending)),
        ))),
    )(i)
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> Res<'a, O>
where
    F: Parser<&'a str, O, VerboseError<&'a str>>,
{
    preceded(blank, inner)
}

fn ident(i: &str) -> Res<&str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '.'),
    ))(i)
}

fn escape(i: &str) -> Res<char> {
    alt((
        value('\n', char('n')),
        value('\t', char('t')),
        value('\r', char('r')),
        map_opt(take_while_m_n(1, 3, |c: char| c.is_digit(8)), |d: &str| {
            u8::from_str_radix(d, 8).ok().map(char::from)
        }),
        preceded(
            char('x'),
            map_opt(take_while_m_n(1, 2, |c: char| c.is_ascii_hexdigit()), |d: &str| {
                u8::from_str_radix(d, 16).ok().map(char::from)
            }),
        ),
        none_of("\n"),
    ))(i)
}

fn quoted<'a>(quote: char, stop: &'static str) -> impl FnMut(&'a str) -> Res<'a, String> {
    preceded(
        char(quote),
        cut(terminated(
            map(opt(escaped_transform(is_not(stop), '\\', escape)), Option::unwrap_or_default),
            char(quote),
        )),
    )
}

fn string(i: &str) -> Res<String> {
    alt((quoted('"', "\"\\\n"), quoted('\'', "'\\\n")))(i)
}

fn number(i: &str) -> Res<&str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_digit() || c == '-' || c == '+'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '+'),
    ))(i)
}

fn parse_number(raw: &str) -> Option<Value> {
    let (negative, digits) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.trim_start_matches('+')),
    };
    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        digits.parse::<i64>().ok()
    };
    match parsed {
        Some(v) => Some(Value::Int(if negative { -v } else { v })),
        None => raw
            .trim_end_matches(|c| c == 'f' || c == 'F')
            .parse::<f64>()
            .ok()
            .map(Value::Float),
    }
}

fn scalar(i: &str) -> Res<Value> {
    alt((
        map(many1(ws(string)), |parts| Value::Str(parts.concat())),
        context("bad number", map_opt(ws(number), parse_number)),
        map(ws(ident), |s| Value::Ident(s.to_owned())),
    ))(i)
}

fn nested(i: &str) -> Res<Value> {
    map(
        alt((
            preceded(ws(char('{')), cut(terminated(message_body, ws(char('}'))))),
            preceded(ws(char('<')), cut(terminated(message_body, ws(char('>'))))),
        )),
        Value::Message,
    )(i)
}

/// Scalars need the `:` separator, nested messages may omit it.
fn field_value<'a>(has_colon: bool) -> impl FnMut(&'a str) -> Res<'a, Value> {
    move |i| {
        if has_colon {
            alt((nested, scalar))(i)
        } else {
            context("expected ':'", nested)(i)
        }
    }
}

fn field(i: &str) -> Res<Vec<(String, Value)>> {
    let (i, name) = ws(ident)(i)?;
    let (i, colon) = opt(ws(char(':')))(i)?;
    let has_colon = colon.is_some();
    let (i, values) = alt((
        preceded(
            ws(char('[')),
            cut(terminated(
                separated_list0(ws(char(',')), field_value(has_colon)),
                pair(opt(ws(char(','))), ws(char(']'))),
            )),
        ),
        map(field_value(has_colon), |v| vec![v]),
    ))(i)?;
    let (i, _) = opt(ws(one_of(",;")))(i)?;
    Ok((i, values.into_iter().map(|v| (name.to_owned(), v)).collect()))
}

fn message_body(i: &str) -> Res<Message> {
    map(many0(field), |fields| Message {
        fields: fields.into_iter().flatten().collect(),
    })(i)
}

fn describe(kind: &VerboseErrorKind) -> String {
    match kind {
        VerboseErrorKind::Context(message) => (*message).to_owned(),
        VerboseErrorKind::Char(c) => format!("expected {:?}", c),
        VerboseErrorKind::Nom(ErrorKind::Eof) => "unexpected input".to_owned(),
        VerboseErrorKind::Nom(kind) => format!("{:?}", kind),
    }
}

pub fn parse(input: &str) -> Result<Message, SchemaLoadError> {
    let line_of = |rest: &str| input[..input.len() - rest.len()].matches('\n').count() + 1;
    match all_consuming(terminated(message_body, blank))(input) {
        Ok((_, message)) => Ok(message),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let (rest, kind) = match e.errors.first() {
                Some((rest, kind)) => (*rest, kind),
                None => return Err(syntax(1, "invalid input")),
            };
            // a context added right at the failing token says more than the token
            let message = e
                .errors
                .iter()
                .find_map(|(at, k)| match k {
                    VerboseErrorKind::Context(c) if at.len() == rest.len() => Some((*c).to_owned()),
                    _ => None,
                })
                .unwrap_or_else(|| describe(kind));
            let rest = blank(rest).map(|(r, _)| r).unwrap_or(rest);
            Err(syntax(line_of(rest), message))
        }
        Err(nom::Err::Incomplete(_)) => Err(syntax(line_of(""), "incomplete input")),
    }
}
