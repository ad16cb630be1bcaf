use chumsky::prelude::*;

use crate::token::{lookup_keyword, Token, TokenKind};

/// Tokenize a query string. Whitespace is discarded; comments are not part
/// of the IQL-SQL surface.
pub fn lex(source: &str) -> Result<Vec<Token>, Vec<Simple<char>>> {
    lexer().parse(source)
}

fn lexer() -> impl Parser<char, Vec<Token>, Error = Simple<char>> {
    let digits = |at_least: usize| {
        filter(|c: &char| c.is_ascii_digit())
            .repeated()
            .at_least(at_least)
            .collect::<String>()
    };

    let number = just('-')
        .or_not()
        .then(digits(1))
        .then(just('.').ignore_then(digits(1)).or_not())
        .map(|((sign, int_part), frac): ((Option<char>, String), Option<String>)| {
            let mut text = String::new();
            if sign.is_some() {
                text.push('-');
            }
            text.push_str(&int_part);
            match frac {
                Some(frac) => {
                    text.push('.');
                    text.push_str(&frac);
                    TokenKind::Float(text.parse().expect("lexer only admits valid float syntax"))
                }
                None => TokenKind::Int(text.parse().expect("lexer only admits valid int syntax")),
            }
        });

    let single_quoted = just('\'')
        .ignore_then(filter(|c: &char| *c != '\'').repeated())
        .then_ignore(just('\''))
        .collect::<String>();

    let double_quoted = just('"')
        .ignore_then(filter(|c: &char| *c != '"').repeated())
        .then_ignore(just('"'))
        .collect::<String>();

    let string = single_quoted.or(double_quoted).map(TokenKind::String);

    let ident = text::ident().map(|s: String| match lookup_keyword(&s) {
        Some(kw) => TokenKind::Keyword(kw),
        None => TokenKind::Ident(s),
    });

    let op = choice((
        just("!=").to(TokenKind::Ne),
        just("<>").to(TokenKind::Ne),
        just("<=").to(TokenKind::Lte),
        just(">=").to(TokenKind::Gte),
        just('=').to(TokenKind::Eq),
        just('<').to(TokenKind::Lt),
        just('>').to(TokenKind::Gt),
        just('*').to(TokenKind::Star),
        just(',').to(TokenKind::Comma),
        just('.').to(TokenKind::Dot),
        just(':').to(TokenKind::Colon),
        just('(').to(TokenKind::LParen),
        just(')').to(TokenKind::RParen),
    ));

    let token = number.or(string).or(ident).or(op);

    token
        .map_with_span(|kind, span| Token {
            kind,
            span: span.into(),
        })
        .padded()
        .repeated()
        .then_ignore(end())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lexes_a_simple_select() {
        let tokens = lex("select x from data where y is not null").unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.kind.clone()).collect::<Vec<_>>(),
            vec![
                TokenKind::Keyword("SELECT"),
                TokenKind::Ident("x".into()),
                TokenKind::Keyword("FROM"),
                TokenKind::Ident("data".into()),
                TokenKind::Keyword("WHERE"),
                TokenKind::Ident("y".into()),
                TokenKind::Keyword("IS"),
                TokenKind::Keyword("NOT"),
                TokenKind::Keyword("NULL"),
            ]
        );
    }

    #[test]
    fn lexes_negative_and_float_numbers() {
        let tokens = lex("-3.5 42").unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.kind.clone()).collect::<Vec<_>>(),
            vec![TokenKind::Float(-3.5), TokenKind::Int(42)]
        );
    }

    #[test]
    fn lexes_string_literals_both_quote_styles() {
        let tokens = lex("'a' \"b\"").unwrap();
        assert_eq!(
            tokens.iter().map(|t| t.kind.clone()).collect::<Vec<_>>(),
            vec![
                TokenKind::String("a".into()),
                TokenKind::String("b".into())
            ]
        );
    }
}
