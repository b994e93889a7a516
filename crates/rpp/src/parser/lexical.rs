//! Value-level grammar: tokens, numbers, quoted and bare strings,
//! parameter lists.

use winnow::ascii::{digit0, digit1, space0, space1};
use winnow::combinator::{alt, cut_err, fail, opt, repeat, preceded, terminated};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{one_of, take_till, take_while};

use crate::config::CodecConfig;
use crate::node::Param;

pub type PResult<T> = winnow::ModalResult<T>;

const QUOTES: [char; 3] = ['"', '\'', '`'];

fn is_token_start(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '<' | '>' | '|' | '"' | '\'' | '`')
}

fn is_token_char(c: char) -> bool {
    !c.is_whitespace() && c != '<' && c != '>'
}

/// Succeeds without consuming when the next char ends a word.
fn word_end(input: &mut &str) -> PResult<()> {
    match input.chars().next() {
        None => Ok(()),
        Some(c) if c.is_whitespace() => Ok(()),
        Some(_) => fail(input),
    }
}

/// Leading identifier of a struct or block line.
pub fn token<'i>(input: &mut &'i str) -> PResult<&'i str> {
    (one_of(is_token_start), take_while(0.., is_token_char))
        .take()
        .context(StrContext::Label("token"))
        .parse_next(input)
}

/// `-?(0|[1-9][0-9]*)`
fn int_text<'i>(input: &mut &'i str) -> PResult<&'i str> {
    (opt('-'), alt(("0", (one_of('1'..='9'), digit0).take())))
        .take()
        .parse_next(input)
}

/// `int(\.[0-9]+)?`
fn decimal_text<'i>(input: &mut &'i str) -> PResult<&'i str> {
    (int_text, opt(('.', digit1))).take().parse_next(input)
}

/// An integer that forms a whole word.
pub fn int(input: &mut &str) -> PResult<i64> {
    terminated(int_text, word_end)
        .try_map(str::parse::<i64>)
        .context(StrContext::Expected(StrContextValue::Description("integer")))
        .parse_next(input)
}

/// A number that forms a whole word; `3c` and `00` are not numbers.
pub fn number(input: &mut &str) -> PResult<f64> {
    terminated(decimal_text, word_end)
        .try_map(str::parse::<f64>)
        .context(StrContext::Expected(StrContextValue::Description("number")))
        .parse_next(input)
}

/// Text between matching quote delimiters, taken verbatim.
pub fn quoted(input: &mut &str) -> PResult<String> {
    let delim = one_of(QUOTES).parse_next(input)?;
    let body = cut_err(terminated(take_till(0.., delim), delim))
        .context(StrContext::Label("quoted string"))
        .context(StrContext::Expected(StrContextValue::CharLiteral(delim)))
        .parse_next(input)?;
    cut_err(word_end)
        .context(StrContext::Expected(StrContextValue::Description(
            "whitespace after closing quote",
        )))
        .parse_next(input)?;
    Ok(body.to_string())
}

/// A run of non-whitespace not starting with a quote.
pub fn bare(input: &mut &str) -> PResult<String> {
    (none_quote, take_while(0.., |c: char| !c.is_whitespace()))
        .take()
        .map(str::to_string)
        .parse_next(input)
}

fn none_quote(input: &mut &str) -> PResult<char> {
    one_of(|c: char| !c.is_whitespace() && !QUOTES.contains(&c)).parse_next(input)
}

pub fn string(input: &mut &str) -> PResult<String> {
    alt((quoted, bare)).parse_next(input)
}

pub fn param(input: &mut &str) -> PResult<Param> {
    alt((number.map(Param::Number), string.map(Param::String))).parse_next(input)
}

fn string_param(input: &mut &str) -> PResult<Param> {
    string.map(Param::String).parse_next(input)
}

/// Whitespace-prefixed parameters up to the end of the line.
///
/// With `strings_only`, numeric-looking words stay strings.
pub fn params_tail(strings_only: bool) -> impl FnMut(&mut &str) -> PResult<Vec<Param>> {
    move |input: &mut &str| {
        let params: Vec<Param> = if strings_only {
            repeat(0.., preceded(space1, string_param)).parse_next(input)?
        } else {
            repeat(0.., preceded(space1, param)).parse_next(input)?
        };
        space0.parse_next(input)?;
        Ok(params)
    }
}

/// A parameter list standing alone, e.g. `1 "a b" c`.
pub fn params(input: &mut &str) -> PResult<Vec<Param>> {
    space0.parse_next(input)?;
    let Some(first) = opt(param).parse_next(input)? else {
        return Ok(Vec::new());
    };
    let mut rest = params_tail(false).parse_next(input)?;
    rest.insert(0, first);
    Ok(rest)
}

/// `TOKEN params...` with the token's string policy taken from `config`.
pub fn struct_line<'c, 'i>(
    config: &'c CodecConfig,
) -> impl FnMut(&mut &'i str) -> PResult<(&'i str, Vec<Param>)> + 'c {
    move |input: &mut &'i str| {
        let token = token.parse_next(input)?;
        let params = params_tail(config.is_string_struct(token)).parse_next(input)?;
        Ok((token, params))
    }
}
