// Parser for NocScript expressions.
//
// Parses a token stream (from the lexer) into an expression AST. Uses chumsky
// combinators.
//
//   expr := atom (('AND' | 'OR') atom)*
//   atom := INT | STRING | '$' IDENT | '%' IDENT
//         | callee '(' (expr (',' expr)*)? ')' | '(' expr ')'
//   callee := IDENT | 'AND' | 'OR'
//
// The infix operators share one precedence level and associate to the left,
// so `a OR b AND c` groups as `AND(OR(a, b), c)`.
//
// Preconditions: input is a valid token stream from `lexer::lex()`.
// Postconditions: returns an AST plus any parse errors (non-fatal).
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::ast::*;
use crate::lexer::Token;

/// Result of parsing: AST plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub expr: Option<Expr>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse one NocScript expression string. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter();
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = expr_parser(source);
    let (expr, parse_errors) = parser.parse(stream).into_output_errors();

    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| Rich::custom(e.span, e.message))
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        expr,
        errors: all_errors,
    }
}

// ── Parser builder ──

fn expr_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Expr, extra::Err<Rich<'tokens, Token, SimpleSpan>>> + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        Ident {
            name: source[span.start()..span.end()].to_string(),
            span,
        }
    });

    let infix = select! {
        Token::And = e => Ident { name: "AND".to_string(), span: e.span() },
        Token::Or = e => Ident { name: "OR".to_string(), span: e.span() },
    };

    recursive(move |expr| {
        let literal = select! {
            Token::Int(n) = e => Expr { kind: ExprKind::Int(n), span: e.span() },
            Token::Hex(n) = e => Expr { kind: ExprKind::Int(n), span: e.span() },
            Token::StringLit(s) = e => Expr { kind: ExprKind::Str(s), span: e.span() },
        };

        let var = just(Token::Dollar)
            .ignore_then(ident.clone())
            .map_with(|name, e| Expr {
                kind: ExprKind::Var(name),
                span: e.span(),
            });

        let self_attr = just(Token::Percent)
            .ignore_then(ident.clone())
            .map_with(|name, e| Expr {
                kind: ExprKind::SelfAttr(name),
                span: e.span(),
            });

        // `AND`/`OR` also name primitives in call form.
        let call = ident
            .clone()
            .or(infix.clone())
            .then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .collect::<Vec<_>>()
                    .delimited_by(just(Token::LParen), just(Token::RParen)),
            )
            .map_with(|(name, args), e| Expr {
                kind: ExprKind::Call { name, args },
                span: e.span(),
            });

        let group = expr
            .clone()
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let atom = choice((literal, var, self_attr, call, group));

        atom.clone()
            .foldl(infix.clone().then(atom).repeated(), |lhs: Expr, (op, rhs): (Ident, Expr)| {
                let span: SimpleSpan = (lhs.span.start..rhs.span.end).into();
                Expr {
                    kind: ExprKind::Call {
                        name: op,
                        args: vec![lhs, rhs],
                    },
                    span,
                }
            })
    })
}

// ── Tests ──
