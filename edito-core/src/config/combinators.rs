//! Nom parser combinators for configuration scripts.
//!
//! The grammar is the subset of Rust a configuration script is expected to
//! use: items, statements and expressions, without type checking. Types,
//! patterns and macro bodies are recognised structurally and kept as text.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{escaped_transform, tag, take, take_until, take_while, take_while1},
    character::complete::{char, digit1, hex_digit1, multispace1, none_of, one_of, satisfy},
    combinator::{consumed, cut, eof, map, map_opt, not, opt, recognize, value, verify},
    error::{Error, ErrorKind},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
};
use nom_locate::LocatedSpan;

use super::ast::*;

/// Input type with position tracking.
pub type Span<'a> = LocatedSpan<&'a str>;

const RESERVED: &[&str] = &[
    "as", "async", "break", "const", "continue", "dyn", "else", "enum", "extern", "false", "fn",
    "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub", "ref",
    "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
];

// ============================================================================
// Utility combinators
// ============================================================================

/// Parses whitespace and comments.
pub fn ws(input: Span) -> IResult<Span, ()> {
    value(
        (),
        many0(alt((
            value((), multispace1),
            value((), line_comment),
            value((), block_comment),
        ))),
    )
    .parse(input)
}

/// Parses a `//` comment, doc comments included.
fn line_comment(input: Span) -> IResult<Span, Span> {
    recognize(pair(tag("//"), take_while(|c| c != '\n'))).parse(input)
}

fn block_comment(input: Span) -> IResult<Span, Span> {
    recognize((tag("/*"), take_until("*/"), tag("*/"))).parse(input)
}

fn punct<'a>(c: char) -> impl FnMut(Span<'a>) -> IResult<Span<'a>, char> {
    move |input| char(c)(input)
}

/// Matches a keyword not followed by an identifier character.
fn keyword<'a>(kw: &'static str) -> impl FnMut(Span<'a>) -> IResult<Span<'a>, Span<'a>> {
    move |input| terminated(tag(kw), not(satisfy(is_ident_char))).parse(input)
}

fn fail<O>(input: Span, kind: ErrorKind) -> IResult<Span, O> {
    Err(nom::Err::Error(Error::new(input, kind)))
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Collapses runs of whitespace so recognised text is stable.
fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn starts_with(input: &Span, c: char) -> bool {
    input.fragment().starts_with(c)
}

/// Recognizes a balanced `(...)`, `[...]` or `{...}` group.
///
/// String literals, character literals and comments inside the group are
/// skipped so delimiters in them do not count.
fn token_tree(input: Span) -> IResult<Span, Span> {
    let text = *input.fragment();
    let bytes = text.as_bytes();
    if !matches!(bytes.first(), Some(b'(' | b'[' | b'{')) {
        return fail(input, ErrorKind::Char);
    }

    let mut stack = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => stack.push(b')'),
            b'[' => stack.push(b']'),
            b'{' => stack.push(b'}'),
            close @ (b')' | b']' | b'}') => {
                if stack.pop() != Some(close) {
                    return fail(input, ErrorKind::Char);
                }
                if stack.is_empty() {
                    let len = text[..=i].chars().count();
                    return take(len)(input);
                }
            }
            b'"' => {
                let mut j = i + 1;
                loop {
                    match bytes.get(j) {
                        Some(b'\\') => j += 2,
                        Some(b'"') => break,
                        Some(_) => j += 1,
                        None => return fail(input, ErrorKind::Eof),
                    }
                }
                i = j;
            }
            b'\'' => {
                if bytes.get(i + 1) == Some(&b'\\') && bytes.get(i + 3) == Some(&b'\'') {
                    i += 3;
                } else if bytes.get(i + 2) == Some(&b'\'') {
                    i += 2;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => match text[i + 2..].find("*/") {
                Some(end) => i += end + 3,
                None => return fail(input, ErrorKind::Eof),
            },
            _ => {}
        }
        i += 1;
    }
    fail(input, ErrorKind::Eof)
}

/// Recognizes a balanced `<...>` group, as in generic parameter lists.
fn angle_group(input: Span) -> IResult<Span, Span> {
    let text = *input.fragment();
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'<') {
        return fail(input, ErrorKind::Char);
    }

    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'-' if bytes.get(i + 1) == Some(&b'>') => i += 1,
            b'<' => depth += 1,
            b'>' => {
                depth -= 1;
                if depth == 0 {
                    let len = text[..=i].chars().count();
                    return take(len)(input);
                }
            }
            b'{' | b';' => break,
            _ => {}
        }
        i += 1;
    }
    fail(input, ErrorKind::Char)
}

// ============================================================================
// Names, literals, types and patterns
// ============================================================================

/// Parses an identifier: [a-zA-Z_][a-zA-Z0-9_]*
pub fn identifier(input: Span) -> IResult<Span, String> {
    map(
        recognize(pair(take_while1(is_ident_start), take_while(is_ident_char))),
        |s: Span| s.fragment().to_string(),
    )
    .parse(input)
}

/// An identifier that is not a reserved word.
fn name(input: Span) -> IResult<Span, String> {
    verify(identifier, |s: &String| !RESERVED.contains(&s.as_str())).parse(input)
}

fn lifetime(input: Span) -> IResult<Span, Span> {
    recognize(pair(char('\''), identifier)).parse(input)
}

fn escape_char(input: Span) -> IResult<Span, char> {
    alt((
        value('\\', char('\\')),
        value('"', char('"')),
        value('\'', char('\'')),
        value('\n', char('n')),
        value('\r', char('r')),
        value('\t', char('t')),
        value('\0', char('0')),
        map_opt(
            delimited(tag("u{"), hex_digit1, char('}')),
            |digits: Span| u32::from_str_radix(digits.fragment(), 16).ok().and_then(char::from_u32),
        ),
    ))
    .parse(input)
}

/// Parses a string literal: "..." or r#"..."#
pub fn string_literal(input: Span) -> IResult<Span, String> {
    alt((raw_string, cooked_string)).parse(input)
}

fn cooked_string(input: Span) -> IResult<Span, String> {
    delimited(
        char('"'),
        map(
            opt(escaped_transform(none_of("\\\""), '\\', escape_char)),
            |s| s.unwrap_or_default(),
        ),
        char('"'),
    )
    .parse(input)
}

fn raw_string(input: Span) -> IResult<Span, String> {
    let (input, _) = char('r')(input)?;
    let (input, hashes) = take_while(|c| c == '#')(input)?;
    let (input, _) = char('"')(input)?;
    let closing = format!("\"{}", hashes.fragment());
    let (input, body) = take_until(closing.as_str())(input)?;
    let (input, _) = tag(closing.as_str())(input)?;
    Ok((input, body.fragment().to_string()))
}

fn char_literal(input: Span) -> IResult<Span, char> {
    delimited(
        char('\''),
        alt((preceded(char('\\'), escape_char), none_of("\\'"))),
        char('\''),
    )
    .parse(input)
}

/// Parses a number literal. A leading `-` belongs to the literal.
pub fn number_literal(input: Span) -> IResult<Span, Lit> {
    let digits = |c: char| c.is_ascii_digit() || c == '_';
    map_opt(
        recognize((
            opt(char('-')),
            alt((
                recognize((tag("0x"), take_while1(|c: char| c.is_ascii_hexdigit() || c == '_'))),
                recognize((
                    digit1,
                    take_while(digits),
                    opt((char('.'), digit1, take_while(digits))),
                    opt((one_of("eE"), opt(one_of("+-")), digit1)),
                )),
            )),
            opt(recognize(pair(
                one_of("iuf"),
                take_while1(|c: char| c.is_ascii_alphanumeric()),
            ))),
        )),
        |text: Span| parse_number(text.fragment()),
    )
    .parse(input)
}

fn parse_number(text: &str) -> Option<Lit> {
    let (sign, body) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let body: String = body.chars().filter(|c| *c != '_').collect();

    if let Some(hex) = body.strip_prefix("0x") {
        let end = hex.find(['i', 'u']).unwrap_or(hex.len());
        return i64::from_str_radix(&format!("{sign}{}", &hex[..end]), 16)
            .ok()
            .map(Lit::Int);
    }

    let (digits, suffix) = body.split_at(body.find(['i', 'u', 'f']).unwrap_or(body.len()));
    let is_float = suffix.starts_with('f') || digits.contains(['.', 'e', 'E']);
    let literal = format!("{sign}{digits}");
    if is_float {
        literal.parse::<f64>().ok().map(Lit::Float)
    } else {
        literal.parse::<i64>().ok().map(Lit::Int)
    }
}

fn bool_literal(input: Span) -> IResult<Span, bool> {
    alt((value(true, keyword("true")), value(false, keyword("false")))).parse(input)
}

pub fn literal(input: Span) -> IResult<Span, Lit> {
    alt((
        map(string_literal, Lit::Str),
        map(char_literal, Lit::Char),
        number_literal,
        map(bool_literal, Lit::Bool),
    ))
    .parse(input)
}

/// Parses a type and returns its text.
pub fn type_ref(input: Span) -> IResult<Span, String> {
    map(recognize(type_inner), |s: Span| collapse(s.fragment())).parse(input)
}

fn type_inner(input: Span) -> IResult<Span, ()> {
    alt((
        value(
            (),
            (
                char('&'),
                ws,
                opt(terminated(lifetime, ws)),
                opt(terminated(keyword("mut"), ws)),
                type_inner,
            ),
        ),
        value(
            (),
            (
                char('*'),
                ws,
                alt((keyword("const"), keyword("mut"))),
                ws,
                type_inner,
            ),
        ),
        value((), delimited(char('('), type_list, char(')'))),
        value(
            (),
            (
                char('['),
                ws,
                type_inner,
                ws,
                opt((char(';'), ws, expr)),
                ws,
                char(']'),
            ),
        ),
        value((), (alt((keyword("impl"), keyword("dyn"))), ws, type_bounds)),
        value(
            (),
            (
                keyword("fn"),
                ws,
                char('('),
                type_list,
                char(')'),
                opt((ws, tag("->"), ws, type_inner)),
            ),
        ),
        type_path,
    ))
    .parse(input)
}

fn type_bounds<'a>(input: Span<'a>) -> IResult<Span<'a>, ()> {
    let bound = |i: Span<'a>| alt((value((), lifetime), type_inner)).parse(i);
    value((), pair(bound, many0((ws, char('+'), ws, bound)))).parse(input)
}

fn type_list(input: Span) -> IResult<Span, ()> {
    let (input, _) = ws(input)?;
    let (input, _) = opt((
        type_inner,
        many0((ws, char(','), ws, type_inner)),
        ws,
        opt(char(',')),
    ))
    .parse(input)?;
    let (input, _) = ws(input)?;
    Ok((input, ()))
}

fn type_path(input: Span) -> IResult<Span, ()> {
    value(
        (),
        (
            opt(tag("::")),
            type_segment,
            many0((ws, tag("::"), ws, type_segment)),
        ),
    )
    .parse(input)
}

fn type_segment(input: Span) -> IResult<Span, ()> {
    value(
        (),
        (
            identifier,
            opt(alt((
                value((), preceded(ws, generic_args)),
                value(
                    (),
                    (
                        ws,
                        char('('),
                        type_list,
                        char(')'),
                        opt((ws, tag("->"), ws, type_inner)),
                    ),
                ),
            ))),
        ),
    )
    .parse(input)
}

fn generic_args(input: Span) -> IResult<Span, ()> {
    let (input, _) = char('<')(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt((
        generic_arg,
        many0((ws, char(','), ws, generic_arg)),
        ws,
        opt(char(',')),
    ))
    .parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char('>')(input)?;
    Ok((input, ()))
}

fn generic_arg(input: Span) -> IResult<Span, ()> {
    alt((
        value((), lifetime),
        value((), (identifier, ws, char('='), ws, type_inner)),
        value((), literal),
        type_inner,
    ))
    .parse(input)
}

/// Parses a pattern, `|` alternatives included, and returns its text.
pub fn pattern_text(input: Span) -> IResult<Span, String> {
    map(recognize(pattern_alts), |s: Span| collapse(s.fragment())).parse(input)
}

fn pattern_alts(input: Span) -> IResult<Span, ()> {
    value(
        (),
        pair(pattern_single, many0((ws, char('|'), ws, pattern_single))),
    )
    .parse(input)
}

fn pattern_single(input: Span) -> IResult<Span, ()> {
    alt((
        value(
            (),
            (
                char('&'),
                ws,
                opt(terminated(keyword("mut"), ws)),
                pattern_single,
            ),
        ),
        value((), delimited(char('('), pattern_list, char(')'))),
        value((), delimited(char('['), pattern_list, char(']'))),
        value((), tag("..")),
        value(
            (),
            (
                literal,
                opt((ws, alt((tag("..="), tag(".."))), ws, literal)),
            ),
        ),
        value(
            (),
            (
                opt(terminated(keyword("ref"), ws)),
                opt(terminated(keyword("mut"), ws)),
                expr_path,
                opt((ws, char('('), pattern_list, char(')'))),
                opt((ws, char('@'), ws, pattern_single)),
            ),
        ),
    ))
    .parse(input)
}

fn pattern_list(input: Span) -> IResult<Span, ()> {
    let (input, _) = ws(input)?;
    let (input, _) = opt((
        pattern_alts,
        many0((ws, char(','), ws, pattern_alts)),
        ws,
        opt(char(',')),
    ))
    .parse(input)?;
    let (input, _) = ws(input)?;
    Ok((input, ()))
}

// ============================================================================
// Expressions
// ============================================================================

pub fn expr(input: Span) -> IResult<Span, Expr> {
    binary_expr(input)
}

fn binary_op(input: Span) -> IResult<Span, BinOp> {
    alt((
        value(BinOp::RangeInclusive, tag("..=")),
        value(BinOp::Range, tag("..")),
        value(BinOp::Or, tag("||")),
        value(BinOp::And, tag("&&")),
        value(BinOp::Eq, tag("==")),
        value(BinOp::Ne, tag("!=")),
        value(BinOp::Le, tag("<=")),
        value(BinOp::Ge, tag(">=")),
        value(BinOp::Shl, terminated(tag("<<"), not(char('=')))),
        value(BinOp::Shr, terminated(tag(">>"), not(char('=')))),
        value(BinOp::Lt, terminated(tag("<"), not(char('<')))),
        value(BinOp::Gt, terminated(tag(">"), not(char('>')))),
        value(BinOp::Add, terminated(tag("+"), not(char('=')))),
        value(BinOp::Sub, terminated(tag("-"), not(one_of("=>")))),
        value(BinOp::Mul, terminated(tag("*"), not(char('=')))),
        value(BinOp::Div, terminated(tag("/"), not(char('=')))),
        value(BinOp::Rem, terminated(tag("%"), not(char('=')))),
        value(BinOp::BitAnd, terminated(tag("&"), not(char('=')))),
        value(BinOp::BitXor, terminated(tag("^"), not(char('=')))),
        value(BinOp::BitOr, terminated(tag("|"), not(char('=')))),
    ))
    .parse(input)
}

/// Operands joined by binary operators, folded by precedence.
fn binary_expr(input: Span) -> IResult<Span, Expr> {
    let (mut input, first) = cast_expr(input)?;
    let mut operands = vec![first];
    let mut ops = Vec::new();

    loop {
        let (rest, _) = ws(input)?;
        let Ok((rest, op)) = binary_op(rest) else {
            break;
        };
        let (rest, _) = ws(rest)?;
        match cast_expr(rest) {
            Ok((rest, rhs)) => {
                ops.push(op);
                operands.push(rhs);
                input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }

    Ok((input, fold_binary(operands, ops)))
}

fn fold_binary(operands: Vec<Expr>, ops: Vec<BinOp>) -> Expr {
    fn reduce(output: &mut Vec<Expr>, op: BinOp) {
        if let (Some(rhs), Some(lhs)) = (output.pop(), output.pop()) {
            output.push(Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
    }

    let mut operands = operands.into_iter();
    let mut output: Vec<Expr> = operands.next().into_iter().collect();
    let mut pending: Vec<BinOp> = Vec::new();

    for (op, rhs) in ops.into_iter().zip(operands) {
        while let Some(&top) = pending.last() {
            if top.precedence() < op.precedence() {
                break;
            }
            pending.pop();
            reduce(&mut output, top);
        }
        pending.push(op);
        output.push(rhs);
    }
    while let Some(op) = pending.pop() {
        reduce(&mut output, op);
    }

    output.pop().unwrap_or(Expr::Tuple(Vec::new()))
}

fn cast_expr(input: Span) -> IResult<Span, Expr> {
    let (mut input, mut expr) = unary_expr(input)?;
    loop {
        let attempt: IResult<Span, String> =
            preceded((ws, keyword("as"), ws), type_ref).parse(input);
        match attempt {
            Ok((rest, ty)) => {
                expr = Expr::Cast {
                    expr: Box::new(expr),
                    ty,
                };
                input = rest;
            }
            Err(nom::Err::Error(_)) => return Ok((input, expr)),
            Err(e) => return Err(e),
        }
    }
}

fn unary(op: UnaryOp, expr: Expr) -> Expr {
    Expr::Unary {
        op,
        expr: Box::new(expr),
    }
}

fn unary_expr(input: Span) -> IResult<Span, Expr> {
    alt((
        ref_expr,
        map(preceded(pair(char('!'), ws), unary_expr), |e| {
            unary(UnaryOp::Not, e)
        }),
        map(preceded(pair(char('*'), ws), unary_expr), |e| {
            unary(UnaryOp::Deref, e)
        }),
        // `-1` is a literal, so the plain operand comes before negation
        postfix_expr,
        map(preceded(pair(char('-'), ws), unary_expr), |e| {
            unary(UnaryOp::Neg, e)
        }),
    ))
    .parse(input)
}

fn ref_expr(input: Span) -> IResult<Span, Expr> {
    let (input, _) = char('&')(input)?;
    let (input, _) = ws(input)?;
    let (input, mutable) = opt(terminated(keyword("mut"), ws)).parse(input)?;
    let (input, expr) = unary_expr(input)?;
    Ok((
        input,
        Expr::Ref {
            mutable: mutable.is_some(),
            expr: Box::new(expr),
        },
    ))
}

fn tuple_index(input: Span) -> IResult<Span, Span> {
    digit1(input)
}

fn postfix_expr(input: Span) -> IResult<Span, Expr> {
    let (mut input, mut expr) = primary(input)?;
    loop {
        let (rest, _) = ws(input)?;

        if let Ok((rest, _)) = punct('?')(rest) {
            expr = Expr::Try(Box::new(expr));
            input = rest;
            continue;
        }

        if let Ok((rest, _)) = terminated(punct('.'), not(punct('.'))).parse(rest) {
            let (rest, _) = ws(rest)?;
            if let Ok((rest, index)) = tuple_index(rest) {
                expr = Expr::Field {
                    base: Box::new(expr),
                    name: index.fragment().to_string(),
                };
                input = rest;
                continue;
            }

            let (rest, name) = identifier(rest)?;
            let (rest, _) = opt(preceded((ws, tag("::"), ws), generic_args)).parse(rest)?;
            let (after_ws, _) = ws(rest)?;
            if starts_with(&after_ws, '(') {
                let (rest, (args, _)) = expr_list('(', ')')(after_ws)?;
                expr = Expr::MethodCall {
                    receiver: Box::new(expr),
                    method: name,
                    args,
                };
                input = rest;
            } else {
                expr = Expr::Field {
                    base: Box::new(expr),
                    name,
                };
                input = rest;
            }
            continue;
        }

        if starts_with(&rest, '(') {
            let (rest, (args, _)) = expr_list('(', ')')(rest)?;
            expr = Expr::Call {
                func: Box::new(expr),
                args,
            };
            input = rest;
            continue;
        }

        if starts_with(&rest, '[') {
            let (rest, index) = delimited(pair(char('['), ws), self::expr, pair(ws, char(']'))).parse(rest)?;
            expr = Expr::Index {
                base: Box::new(expr),
                index: Box::new(index),
            };
            input = rest;
            continue;
        }

        return Ok((input, expr));
    }
}

/// Parses a delimited, comma separated expression list.
///
/// The flag reports a trailing comma, which tells `(x,)` from `(x)`.
fn expr_list<'a>(
    open: char,
    close: char,
) -> impl FnMut(Span<'a>) -> IResult<Span<'a>, (Vec<Expr>, bool)> {
    move |input| {
        let (mut input, _) = char(open)(input)?;
        let mut items = Vec::new();
        let mut trailing = false;
        loop {
            let (rest, _) = ws(input)?;
            if let Ok((rest, _)) = punct(close)(rest) {
                return Ok((rest, (items, trailing)));
            }
            let (rest, item) = expr(rest)?;
            items.push(item);
            let (rest, _) = ws(rest)?;
            match punct(',')(rest) {
                Ok((rest, _)) => {
                    trailing = true;
                    input = rest;
                }
                Err(_) => {
                    let (rest, _) = char(close)(rest)?;
                    return Ok((rest, (items, false)));
                }
            }
        }
    }
}

fn primary(input: Span) -> IResult<Span, Expr> {
    alt((
        map(literal, Expr::Lit),
        closure,
        if_expr,
        while_expr,
        for_expr,
        map(preceded(pair(keyword("loop"), ws), block), Expr::Loop),
        match_expr,
        jump_expr,
        map(block, Expr::Block),
        map(preceded(pair(keyword("unsafe"), ws), block), Expr::Block),
        paren_or_tuple,
        array,
        macro_or_path,
    ))
    .parse(input)
}

fn closure(input: Span) -> IResult<Span, Expr> {
    let (input, _) = opt(terminated(keyword("move"), ws)).parse(input)?;
    let (input, params) = alt((
        value(Vec::new(), tag("||")),
        delimited(char('|'), closure_params, char('|')),
    ))
    .parse(input)?;
    let (input, _) = ws(input)?;
    let (input, ret) = opt(terminated(preceded(pair(tag("->"), ws), type_ref), ws)).parse(input)?;
    let (input, body) = if ret.is_some() {
        map(block, Expr::Block).parse(input)?
    } else {
        expr(input)?
    };
    Ok((
        input,
        Expr::Closure {
            params,
            body: Box::new(body),
        },
    ))
}

fn closure_params<'a>(input: Span<'a>) -> IResult<Span<'a>, Vec<String>> {
    let param = |i: Span<'a>| {
        map(
            recognize((pattern_single, opt((ws, char(':'), ws, type_inner)))),
            |s: Span| collapse(s.fragment()),
        )
        .parse(i)
    };

    let (input, _) = ws(input)?;
    let (input, params) = opt(pair(param, many0(preceded((ws, char(','), ws), param)))).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(char(',')).parse(input)?;
    let (input, _) = ws(input)?;

    let params = params
        .map(|(first, rest)| std::iter::once(first).chain(rest).collect())
        .unwrap_or_default();
    Ok((input, params))
}

/// `let PATTERN =` as used by `if let` and `while let`
fn let_binding(input: Span) -> IResult<Span, String> {
    let (input, _) = keyword("let")(input)?;
    let (input, _) = ws(input)?;
    let (input, pattern) = pattern_text(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = terminated(char('='), not(char('='))).parse(input)?;
    let (input, _) = ws(input)?;
    Ok((input, pattern))
}

fn if_expr(input: Span) -> IResult<Span, Expr> {
    let (input, _) = keyword("if")(input)?;
    let (input, _) = ws(input)?;
    let (input, pattern) = opt(let_binding).parse(input)?;
    let (input, cond) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, then) = block(input)?;
    let (input, otherwise) = opt(preceded(
        (ws, keyword("else"), ws),
        alt((if_expr, map(block, Expr::Block))),
    ))
    .parse(input)?;
    Ok((
        input,
        Expr::If {
            pattern,
            cond: Box::new(cond),
            then,
            otherwise: otherwise.map(Box::new),
        },
    ))
}

fn while_expr(input: Span) -> IResult<Span, Expr> {
    let (input, _) = keyword("while")(input)?;
    let (input, _) = ws(input)?;
    let (input, pattern) = opt(let_binding).parse(input)?;
    let (input, cond) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, body) = block(input)?;
    Ok((
        input,
        Expr::While {
            pattern,
            cond: Box::new(cond),
            body,
        },
    ))
}

fn for_expr(input: Span) -> IResult<Span, Expr> {
    let (input, _) = keyword("for")(input)?;
    let (input, _) = ws(input)?;
    let (input, pattern) = pattern_text(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = keyword("in")(input)?;
    let (input, _) = ws(input)?;
    let (input, iter) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, body) = block(input)?;
    Ok((
        input,
        Expr::For {
            pattern,
            iter: Box::new(iter),
            body,
        },
    ))
}

fn match_expr(input: Span) -> IResult<Span, Expr> {
    let (input, _) = keyword("match")(input)?;
    let (input, _) = ws(input)?;
    let (input, scrutinee) = expr(input)?;
    let (input, _) = ws(input)?;
    let (mut input, _) = char('{')(input)?;

    let mut arms = Vec::new();
    loop {
        let (rest, _) = ws(input)?;
        if let Ok((rest, _)) = punct('}')(rest) {
            input = rest;
            break;
        }
        let (rest, pattern) = pattern_text(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, guard) = opt(terminated(preceded(pair(keyword("if"), ws), expr), ws)).parse(rest)?;
        let (rest, _) = tag("=>")(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, body) = expr(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, comma) = opt(char(',')).parse(rest)?;
        if comma.is_none() && !body.is_block_like() && !starts_with(&rest, '}') {
            return fail(rest, ErrorKind::Char);
        }
        arms.push(MatchArm {
            pattern,
            guard,
            body,
        });
        input = rest;
    }

    Ok((
        input,
        Expr::Match {
            scrutinee: Box::new(scrutinee),
            arms,
        },
    ))
}

/// `return`, `break` and `continue`
fn jump_expr<'a>(input: Span<'a>) -> IResult<Span<'a>, Expr> {
    let operand = |i: Span<'a>| opt(preceded(ws, expr)).parse(i);
    alt((
        map(preceded(keyword("return"), operand), |e| {
            Expr::Return(e.map(Box::new))
        }),
        map(preceded(keyword("break"), operand), |e| {
            Expr::Break(e.map(Box::new))
        }),
        value(Expr::Continue, keyword("continue")),
    ))
    .parse(input)
}

fn paren_or_tuple(input: Span) -> IResult<Span, Expr> {
    let (input, (mut items, trailing)) = expr_list('(', ')')(input)?;
    if items.len() == 1 && !trailing {
        if let Some(inner) = items.pop() {
            return Ok((input, Expr::Paren(Box::new(inner))));
        }
    }
    Ok((input, Expr::Tuple(items)))
}

fn array(input: Span) -> IResult<Span, Expr> {
    alt((
        repeat_array,
        map(expr_list('[', ']'), |(items, _)| Expr::Array(items)),
    ))
    .parse(input)
}

/// `[value; count]`
fn repeat_array(input: Span) -> IResult<Span, Expr> {
    let (input, _) = char('[')(input)?;
    let (input, _) = ws(input)?;
    let (input, value) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(';')(input)?;
    let (input, _) = ws(input)?;
    let (input, count) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(']')(input)?;
    Ok((
        input,
        Expr::Repeat {
            value: Box::new(value),
            count: Box::new(count),
        },
    ))
}

/// Parses an expression path: `a::b::<T>::c`. Generic arguments are dropped.
fn expr_path(input: Span) -> IResult<Span, Vec<String>> {
    let (input, _) = opt(tag("::")).parse(input)?;
    let (mut input, first) = name(input)?;
    let mut segments = vec![first];
    loop {
        let attempt: IResult<Span, Option<String>> = preceded(
            (ws, tag("::"), ws),
            alt((map(generic_args, |_| None), map(name, Some))),
        )
        .parse(input);
        match attempt {
            Ok((rest, Some(segment))) => {
                segments.push(segment);
                input = rest;
            }
            Ok((rest, None)) => input = rest,
            Err(nom::Err::Error(_)) => return Ok((input, segments)),
            Err(e) => return Err(e),
        }
    }
}

fn macro_or_path(input: Span) -> IResult<Span, Expr> {
    let (input, path) = expr_path(input)?;
    let bang: IResult<Span, Span> = recognize((ws, char('!'), ws)).parse(input);
    if let Ok((rest, _)) = bang {
        if matches!(rest.fragment().chars().next(), Some('(' | '[' | '{')) {
            let (rest, tokens) = token_tree(rest)?;
            return Ok((
                rest,
                Expr::Macro {
                    path,
                    tokens: tokens.fragment().to_string(),
                },
            ));
        }
    }
    Ok((input, Expr::Path(path)))
}

// ============================================================================
// Statements and blocks
// ============================================================================

/// Parses `{ statements }`.
///
/// Once the opening brace is consumed a malformed statement is a hard
/// failure, so errors point at the statement rather than the enclosing item.
pub fn block(input: Span) -> IResult<Span, Block> {
    let (mut input, _) = char('{')(input)?;
    let mut stmts = Vec::new();
    loop {
        let (rest, _) = ws(input)?;
        if let Ok((rest, _)) = punct('}')(rest) {
            return Ok((rest, Block { stmts }));
        }
        if let Ok((rest, _)) = punct(';')(rest) {
            input = rest;
            continue;
        }
        match statement(rest) {
            Ok((rest, stmt)) => {
                stmts.push(stmt);
                input = rest;
            }
            Err(nom::Err::Error(e)) => return Err(nom::Err::Failure(e)),
            Err(e) => return Err(e),
        }
    }
}

fn statement(input: Span) -> IResult<Span, Stmt> {
    alt((let_stmt, map(item, Stmt::Item), expr_stmt)).parse(input)
}

fn let_stmt(input: Span) -> IResult<Span, Stmt> {
    let line = input.location_line();
    let (input, _) = keyword("let")(input)?;
    let (input, _) = ws(input)?;
    let (input, pattern) = pattern_text(input)?;
    let (input, _) = ws(input)?;
    let (input, ty) = opt(terminated(preceded(pair(char(':'), ws), type_ref), ws)).parse(input)?;
    let (input, init) = opt(terminated(
        preceded(pair(terminated(char('='), not(char('='))), ws), expr),
        ws,
    ))
    .parse(input)?;
    let (input, else_block) =
        opt(terminated(preceded(pair(keyword("else"), ws), block), ws)).parse(input)?;
    let (input, _) = char(';')(input)?;
    Ok((
        input,
        Stmt::Let {
            line,
            pattern,
            ty,
            init,
            else_block,
        },
    ))
}

fn assign_op(input: Span) -> IResult<Span, String> {
    map(
        alt((
            tag("<<="),
            tag(">>="),
            tag("+="),
            tag("-="),
            tag("*="),
            tag("/="),
            tag("%="),
            tag("^="),
            tag("&="),
            tag("|="),
            terminated(tag("="), not(one_of("=>"))),
        )),
        |s: Span| s.fragment().to_string(),
    )
    .parse(input)
}

fn expr_stmt(input: Span) -> IResult<Span, Stmt> {
    let line = input.location_line();
    let (input, target) = expr(input)?;
    let (rest, _) = ws(input)?;

    if let Ok((rest, op)) = assign_op(rest) {
        let (rest, _) = ws(rest)?;
        let (rest, value) = expr(rest)?;
        let (rest, _) = ws(rest)?;
        let (rest, _) = char(';')(rest)?;
        return Ok((
            rest,
            Stmt::Assign {
                line,
                target,
                op,
                value,
            },
        ));
    }

    if let Ok((rest, _)) = punct(';')(rest) {
        return Ok((
            rest,
            Stmt::Expr {
                line,
                expr: target,
                semi: true,
            },
        ));
    }

    if target.is_block_like() || starts_with(&rest, '}') {
        return Ok((
            input,
            Stmt::Expr {
                line,
                expr: target,
                semi: false,
            },
        ));
    }

    fail(rest, ErrorKind::Char)
}

// ============================================================================
// Items
// ============================================================================

pub fn item(input: Span) -> IResult<Span, Item> {
    alt((
        attribute,
        preceded(
            opt(terminated(visibility, ws)),
            alt((
                use_item,
                mod_item,
                extern_crate_item,
                const_item,
                fn_item,
                opaque_item,
            )),
        ),
    ))
    .parse(input)
}

fn visibility(input: Span) -> IResult<Span, ()> {
    value(
        (),
        pair(
            keyword("pub"),
            opt(preceded(
                ws,
                verify(token_tree, |t: &Span| t.fragment().starts_with('(')),
            )),
        ),
    )
    .parse(input)
}

fn attribute(input: Span) -> IResult<Span, Item> {
    let (input, _) = char('#')(input)?;
    let (input, inner) = opt(char('!')).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, body) = verify(token_tree, |t: &Span| t.fragment().starts_with('[')).parse(input)?;
    Ok((
        input,
        Item::Attribute {
            inner: inner.is_some(),
            text: collapse(body.fragment()),
        },
    ))
}

fn use_item(input: Span) -> IResult<Span, Item> {
    let (input, _) = keyword("use")(input)?;
    let (input, _) = ws(input)?;
    let (input, tree) = cut(recognize(use_tree)).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(char(';')).parse(input)?;
    Ok((
        input,
        Item::Use {
            tree: collapse(tree.fragment()),
        },
    ))
}

fn use_tree(input: Span) -> IResult<Span, ()> {
    let (input, _) = opt(tag("::")).parse(input)?;
    alt((
        value((), char('*')),
        use_group,
        value(
            (),
            (
                identifier,
                opt(alt((
                    value((), (ws, tag("::"), ws, use_tree)),
                    value((), (ws, keyword("as"), ws, identifier)),
                ))),
            ),
        ),
    ))
    .parse(input)
}

fn use_group(input: Span) -> IResult<Span, ()> {
    let (input, _) = char('{')(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(pair(use_tree, many0((ws, char(','), ws, use_tree)))).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(char(',')).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, ()))
}

fn mod_item(input: Span) -> IResult<Span, Item> {
    let (input, _) = keyword("mod")(input)?;
    let (input, _) = ws(input)?;
    let (input, name) = cut(identifier).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, items) = cut(alt((
        value(None, char(';')),
        map(
            delimited(
                char('{'),
                many0(preceded(ws, item)),
                pair(ws, char('}')),
            ),
            Some,
        ),
    )))
    .parse(input)?;
    Ok((input, Item::Mod { name, items }))
}

fn extern_crate_item(input: Span) -> IResult<Span, Item> {
    let (input, _) = keyword("extern")(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = keyword("crate")(input)?;
    let (input, _) = ws(input)?;
    let (input, name) = cut(identifier).parse(input)?;
    let (input, alias) =
        opt(preceded((ws, keyword("as"), ws), identifier)).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(char(';')).parse(input)?;
    Ok((input, Item::ExternCrate { name, alias }))
}

fn const_item<'a>(input: Span<'a>) -> IResult<Span<'a>, Item> {
    let (input, is_static) =
        alt((value(false, keyword("const")), value(true, keyword("static")))).parse(input)?;
    let (input, _) = ws(input)?;
    // `const fn` is a function item
    let (input, _) = not(keyword("fn")).parse(input)?;
    cut(move |i: Span<'a>| const_rest(i, is_static)).parse(input)
}

fn const_rest(input: Span, is_static: bool) -> IResult<Span, Item> {
    let (input, _) = opt(terminated(keyword("mut"), ws)).parse(input)?;
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(':')(input)?;
    let (input, _) = ws(input)?;
    let (input, ty) = type_ref(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = ws(input)?;
    let (input, value) = expr(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(';')(input)?;
    Ok((
        input,
        Item::Const {
            name,
            ty,
            value,
            is_static,
        },
    ))
}

fn fn_qualifier(input: Span) -> IResult<Span, ()> {
    alt((
        value((), keyword("const")),
        value((), keyword("async")),
        value((), keyword("unsafe")),
        value((), pair(keyword("extern"), opt(preceded(ws, string_literal)))),
    ))
    .parse(input)
}

fn fn_item<'a>(input: Span<'a>) -> IResult<Span<'a>, Item> {
    let line = input.location_line();
    let (input, _) = many0(terminated(fn_qualifier, ws)).parse(input)?;
    let (input, _) = keyword("fn")(input)?;
    let (input, _) = ws(input)?;
    let (input, item) = cut(move |i: Span<'a>| fn_rest(i, line)).parse(input)?;
    Ok((input, Item::Fn(item)))
}

fn fn_rest(input: Span, line: u32) -> IResult<Span, FnItem> {
    let (input, name) = identifier(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(terminated(angle_group, ws)).parse(input)?;
    let (input, _) = char('(')(input)?;
    let (input, _) = ws(input)?;
    let (input, params) = opt(pair(param, many0(preceded((ws, char(','), ws), param)))).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(char(',')).parse(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = char(')')(input)?;
    let (input, _) = ws(input)?;
    let (input, _) = opt(terminated(preceded(pair(tag("->"), ws), type_ref), ws)).parse(input)?;
    let (input, _) = opt(terminated(
        preceded(keyword("where"), take_while(|c| c != '{')),
        ws,
    ))
    .parse(input)?;
    let (input, body) = block(input)?;

    let params = params
        .map(|(first, rest)| std::iter::once(first).chain(rest).collect())
        .unwrap_or_default();
    Ok((
        input,
        FnItem {
            name,
            params,
            body,
            line,
        },
    ))
}

/// Items directive extraction never looks inside: type definitions,
/// `impl` and `trait` blocks, aliases and item-level macro invocations.
/// They are kept as source text.
fn opaque_item(input: Span) -> IResult<Span, Item> {
    let (rest, (text, kind)) = consumed(terminated(opaque_head, cut(opaque_body))).parse(input)?;
    Ok((
        rest,
        Item::Opaque {
            kind,
            text: collapse(text.fragment()),
        },
    ))
}

fn opaque_head(input: Span) -> IResult<Span, String> {
    let (input, _) = many0(terminated(alt((keyword("unsafe"), keyword("auto"))), ws)).parse(input)?;
    alt((
        map(
            alt((
                keyword("struct"),
                keyword("enum"),
                keyword("union"),
                keyword("trait"),
                keyword("impl"),
                keyword("type"),
            )),
            |kw: Span| kw.fragment().to_string(),
        ),
        map(terminated(identifier, pair(ws, char('!'))), |name| format!("{name}!")),
    ))
    .parse(input)
}

/// Skips to the end of an item: a `;`, or a `{...}` group, stepping over
/// nested groups and string literals on the way.
fn opaque_body(mut input: Span) -> IResult<Span, ()> {
    loop {
        let (rest, _) = ws(input)?;
        let next = rest.fragment().chars().next();
        match next {
            Some(';') => return value((), char(';')).parse(rest),
            Some('{') => {
                let (rest, _) = token_tree(rest)?;
                return value((), opt(preceded(ws, char(';')))).parse(rest);
            }
            Some('(' | '[') => (input, _) = token_tree(rest)?,
            Some('"') => (input, _) = string_literal(rest)?,
            Some(')' | ']' | '}') => return fail(rest, ErrorKind::Char),
            Some(_) => (input, _) = take(1usize)(rest)?,
            None => return fail(rest, ErrorKind::Eof),
        }
    }
}

fn param(input: Span) -> IResult<Span, Param> {
    let self_param = recognize((
        opt((char('&'), ws, opt(terminated(lifetime, ws)))),
        opt(terminated(keyword("mut"), ws)),
        keyword("self"),
    ));
    alt((
        map(self_param, |s: Span| Param {
            pattern: collapse(s.fragment()),
            ty: "Self".to_string(),
        }),
        map(
            (pattern_text, ws, char(':'), ws, type_ref),
            |(pattern, _, _, _, ty)| Param { pattern, ty },
        ),
    ))
    .parse(input)
}

/// Parses a whole configuration source file.
pub fn source_file(input: Span) -> IResult<Span, SourceFile> {
    let (input, _) = ws(input)?;
    let (input, items) = many0(terminated(item, ws)).parse(input)?;
    let (input, _) = eof(input)?;
    Ok((input, SourceFile { items }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_expr(text: &str) -> Expr {
        let (rest, e) = expr(Span::new(text)).unwrap();
        assert!(rest.fragment().is_empty(), "unparsed: {:?}", rest.fragment());
        e
    }

    fn string_lit(s: &str) -> Expr {
        Expr::Lit(Lit::Str(s.to_string()))
    }

    #[test]
    fn test_string_literals() {
        let (_, s) = string_literal(Span::new(r#""tab\twidth\n""#)).unwrap();
        assert_eq!(s, "tab\twidth\n");

        let (_, s) = string_literal(Span::new(r#""""#)).unwrap();
        assert_eq!(s, "");

        let (_, s) = string_literal(Span::new(r###"r#"say "hi""#"###)).unwrap();
        assert_eq!(s, r#"say "hi""#);

        let (_, s) = string_literal(Span::new(r#""\u{1F600}""#)).unwrap();
        assert_eq!(s, "\u{1F600}");
    }

    #[test]
    fn test_number_literals() {
        let num = |t: &str| number_literal(Span::new(t)).unwrap().1;
        assert_eq!(num("4"), Lit::Int(4));
        assert_eq!(num("-12"), Lit::Int(-12));
        assert_eq!(num("1_000"), Lit::Int(1000));
        assert_eq!(num("0x1f"), Lit::Int(31));
        assert_eq!(num("2.5"), Lit::Float(2.5));
        assert_eq!(num("-0.25"), Lit::Float(-0.25));
        assert_eq!(num("8u32"), Lit::Int(8));
        assert_eq!(num("3f64"), Lit::Float(3.0));
        assert_eq!(num("1e3"), Lit::Float(1000.0));
    }

    #[test]
    fn test_number_does_not_swallow_method_or_range() {
        let (rest, lit) = number_literal(Span::new("1..5")).unwrap();
        assert_eq!(lit, Lit::Int(1));
        assert_eq!(*rest.fragment(), "..5");

        let (rest, _) = number_literal(Span::new("4.max(3)")).unwrap();
        assert_eq!(*rest.fragment(), ".max(3)");
    }

    #[test]
    fn test_keywords_need_word_boundary() {
        assert_eq!(parse_expr("true"), Expr::Lit(Lit::Bool(true)));
        assert_eq!(
            parse_expr("true_color"),
            Expr::Path(vec!["true_color".to_string()])
        );
    }

    #[test]
    fn test_method_call() {
        let e = parse_expr(r#"editor.bind_key("C-x C-s", "save-buffer")"#);
        assert_eq!(
            e,
            Expr::MethodCall {
                receiver: Box::new(Expr::Path(vec!["editor".to_string()])),
                method: "bind_key".to_string(),
                args: vec![string_lit("C-x C-s"), string_lit("save-buffer")],
            }
        );
    }

    #[test]
    fn test_path_call_with_turbofish() {
        let e = parse_expr("edito::load_plugin::<Tree>(\"file-tree\")");
        assert_eq!(
            e,
            Expr::Call {
                func: Box::new(Expr::Path(vec![
                    "edito".to_string(),
                    "load_plugin".to_string()
                ])),
                args: vec![string_lit("file-tree")],
            }
        );
    }

    #[test]
    fn test_binary_precedence() {
        let e = parse_expr("1 + 2 * 3 == 7 && ok");
        let Expr::Binary { op, lhs, .. } = e else {
            panic!("expected binary");
        };
        assert_eq!(op, BinOp::And);
        let Expr::Binary { op, lhs, .. } = *lhs else {
            panic!("expected comparison");
        };
        assert_eq!(op, BinOp::Eq);
        let Expr::Binary { op, rhs, .. } = *lhs else {
            panic!("expected addition");
        };
        assert_eq!(op, BinOp::Add);
        assert!(matches!(*rhs, Expr::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn test_closures() {
        assert!(matches!(parse_expr("|| {}"), Expr::Closure { ref params, .. } if params.is_empty()));
        assert!(matches!(
            parse_expr("move |a, b: usize| a + b"),
            Expr::Closure { ref params, .. } if params == &["a", "b: usize"]
        ));
    }

    #[test]
    fn test_macro_invocation_keeps_tokens() {
        let e = parse_expr(r#"println!("closing ) in string {}", x)"#);
        assert_eq!(
            e,
            Expr::Macro {
                path: vec!["println".to_string()],
                tokens: r#"("closing ) in string {}", x)"#.to_string(),
            }
        );
        assert!(matches!(parse_expr("x != y"), Expr::Binary { op: BinOp::Ne, .. }));
    }

    #[test]
    fn test_misc_expressions() {
        assert!(matches!(parse_expr("(1, \"a\")"), Expr::Tuple(ref v) if v.len() == 2));
        assert!(matches!(parse_expr("(1)"), Expr::Paren(_)));
        assert!(matches!(parse_expr("[0; 4]"), Expr::Repeat { .. }));
        assert!(matches!(parse_expr("[1, 2, 3]"), Expr::Array(ref v) if v.len() == 3));
        assert!(matches!(parse_expr("&mut buffer"), Expr::Ref { mutable: true, .. }));
        assert!(matches!(parse_expr("read()?"), Expr::Try(_)));
        assert!(matches!(parse_expr("x as u64"), Expr::Cast { .. }));
        assert!(matches!(parse_expr("pair.0"), Expr::Field { .. }));
        assert!(matches!(parse_expr("items[0]"), Expr::Index { .. }));
        assert!(matches!(parse_expr("-width"), Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn test_control_flow() {
        let text = r#"if let Some(x) = value { x } else if other { 1 } else { 2 }"#;
        assert!(matches!(parse_expr(text), Expr::If { pattern: Some(_), .. }));

        let text = "for (i, line) in lines.iter().enumerate() { total += i; }";
        assert!(matches!(parse_expr(text), Expr::For { .. }));

        let text = "match mode { Mode::Insert | Mode::Replace => 1, _ if strict => { 2 } _ => 3 }";
        let Expr::Match { arms, .. } = parse_expr(text) else {
            panic!("expected match");
        };
        assert_eq!(arms.len(), 3);
        assert_eq!(arms[0].pattern, "Mode::Insert | Mode::Replace");
        assert!(arms[1].guard.is_some());
    }

    #[test]
    fn test_block_statements() {
        let text = r#"{
            let mut count: usize = 0;
            count += 1;
            // comment
            editor.set_option("tab-width", 4);
            while count < 3 { count += 1; }
            loop { break; }
            count
        }"#;
        let (_, b) = block(Span::new(text)).unwrap();
        assert_eq!(b.stmts.len(), 6);
        assert!(matches!(b.stmts[0], Stmt::Let { line: 2, .. }));
        assert!(matches!(b.stmts[1], Stmt::Assign { ref op, .. } if op == "+="));
        assert!(matches!(b.stmts[2], Stmt::Expr { line: 5, semi: true, .. }));
        assert!(matches!(b.stmts[5], Stmt::Expr { semi: false, .. }));
    }

    #[test]
    fn test_missing_semicolon_fails_hard() {
        let err = block(Span::new("{\n    a()\n    b();\n}")).unwrap_err();
        assert!(matches!(err, nom::Err::Failure(_)));
    }

    #[test]
    fn test_items() {
        let text = r#"
            //! Editor configuration
            #![allow(unused)]
            use edito_plugin_api::{ConfigEditor, OptionValue as Value};
            use std::collections::*;
            extern crate regex;
            mod helpers;
            const WIDTH: usize = 4;
            static mut COUNT: u32 = 0;

            /// Entry point
            #[inline]
            pub fn init<'a>(editor: &'a mut ConfigEditor) -> () where Self: Sized {
                editor.set_option("tab-width", WIDTH);
            }

            pub(crate) const fn helper(_: (), values: &[u8; 4], f: impl Fn(u8) -> bool + 'static) {}
        "#;
        let (_, file) = source_file(Span::new(text)).unwrap();
        assert_eq!(file.items.len(), 10);
        assert!(matches!(file.items[0], Item::Attribute { inner: true, .. }));
        assert!(matches!(
            file.items[1],
            Item::Use { ref tree } if tree == "edito_plugin_api::{ConfigEditor, OptionValue as Value}"
        ));
        assert!(matches!(file.items[3], Item::ExternCrate { ref name, .. } if name == "regex"));
        assert!(matches!(file.items[5], Item::Const { is_static: false, .. }));
        assert!(matches!(file.items[6], Item::Const { is_static: true, .. }));

        let Item::Fn(init) = &file.items[8] else {
            panic!("expected fn");
        };
        assert_eq!(init.name, "init");
        assert_eq!(init.first_param_name(), Some("editor"));
        assert_eq!(init.params[0].ty, "&'a mut ConfigEditor");

        let Item::Fn(helper) = &file.items[9] else {
            panic!("expected fn");
        };
        assert_eq!(helper.params.len(), 3);
    }

    #[test]
    fn test_other_items_are_kept_as_text() {
        let text = r#"
            #[derive(Debug, Default)]
            pub struct Config { width: u32, name: &'static str }
            struct Marker;
            struct Pair(u8, u8);
            enum Mode { Insert, Normal = 2 }
            type Handler = Box<dyn Fn() -> bool>;
            impl<T: Clone> Config where T: Default {
                fn width(&self) -> u32 { let s = "}"; self.width }
            }
            unsafe impl Send for Marker {}
            pub trait Describe { fn describe(&self) -> String; }
            macro_rules! opt { ($k:expr, $v:expr) => { editor.set_option($k, $v) }; }
            thread_local!(static DEPTH: u8 = 0);
            pub fn init(editor: &mut ConfigEditor) {}
        "#;
        let (_, file) = source_file(Span::new(text)).unwrap();
        let kinds: Vec<_> = file
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Opaque { kind, .. } => Some(kind.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "struct",
                "struct",
                "struct",
                "enum",
                "type",
                "impl",
                "impl",
                "trait",
                "macro_rules!",
                "thread_local!"
            ]
        );
        assert!(matches!(
            file.items[2],
            Item::Opaque { ref text, .. } if text == "struct Marker;"
        ));
        assert!(matches!(file.items.last(), Some(Item::Fn(f)) if f.name == "init"));
    }

    #[test]
    fn test_unterminated_item_is_rejected() {
        assert!(source_file(Span::new("struct Config { width: u32")).is_err());
        assert!(source_file(Span::new("struct Marker")).is_err());
        assert!(source_file(Span::new("enum Mode ) {}")).is_err());
    }

    #[test]
    fn test_index_expression() {
        assert_eq!(
            parse_expr("items[0]"),
            Expr::Index {
                base: Box::new(Expr::Path(vec!["items".to_string()])),
                index: Box::new(Expr::Lit(Lit::Int(0))),
            }
        );
    }
}
