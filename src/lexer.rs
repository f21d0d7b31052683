mod error;
mod types;


use std::{iter::Peekable, str::CharIndices};

use copyspan::Span;

pub use types::Token;

use crate::error::{DResult, FullSpan, PartialSpanned};

/// Splits Lisp source into spanned tokens: parentheses, integers, symbols,
/// `#t`/`#f`/`#\c` literals. `;` starts a comment running to end of line.
#[derive(Clone, Debug)]
pub struct Lexer<'src> {
    src: &'src str,
    remaining: Peekable<CharIndices<'src>>,
    file_id: usize,
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str, file_id: usize) -> Self {
        Self {
            src,
            remaining: src.char_indices().peekable(),
            file_id,
        }
    }

    pub fn lex(self) -> DResult<Vec<PartialSpanned<Token<'src>>>> {
        self.collect()
    }

    fn full_span(&self, span: impl Into<Span>) -> FullSpan {
        FullSpan {
            span: span.into(),
            file_id: self.file_id,
        }
    }

    /// Consumes the run of symbol characters whose first character,
    /// already taken, was `first` at `start`, and classifies it as a
    /// number or a symbol.
    fn lex_run(&mut self, start: usize, first: char) -> DResult<PartialSpanned<Token<'src>>> {
        let mut end = start + first.len_utf8();

        while let Some(&(i, c)) = self.remaining.peek() {
            if !is_symbol_char(c) {
                break;
            }

            end = i + c.len_utf8();
            self.remaining.next();
        }

        let span = Span::from(start..end);
        let text = &self.src[start..end];

        if looks_numeric(text) {
            let number = text
                .parse::<i64>()
                .map_err(|_| error::number_out_of_range(text, self.full_span(span)))?;

            return Ok(PartialSpanned::new(Token::Number(number), span));
        }

        Ok(PartialSpanned::new(Token::Symbol(text), span))
    }

    /// Lexes the token following a `#`: `#t`, `#f` or `#\c`.
    fn lex_hash(&mut self, start: usize) -> DResult<PartialSpanned<Token<'src>>> {
        match self.remaining.next() {
            Some((i, 't')) => Ok(PartialSpanned::new(
                Token::Boolean(true),
                Span::from(start..i + 1),
            )),
            Some((i, 'f')) => Ok(PartialSpanned::new(
                Token::Boolean(false),
                Span::from(start..i + 1),
            )),
            Some((_, '\\')) => match self.remaining.next() {
                Some((i, c)) => Ok(PartialSpanned::new(
                    Token::Character(c),
                    Span::from(start..i + c.len_utf8()),
                )),
                None => Err(error::unterminated_character(
                    self.full_span(start..self.src.len()),
                )),
            },
            Some((i, c)) => Err(error::invalid_hash_sequence(
                c,
                self.full_span(start..i + c.len_utf8()),
            )),
            None => Err(error::lone_hash(self.full_span(start..self.src.len()))),
        }
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = DResult<PartialSpanned<Token<'src>>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (i, c) = *self.remaining.peek()?;

            if c.is_whitespace() {
                self.remaining.next();
                continue;
            }

            if c == ';' {
                while self.remaining.next_if(|&(_, c)| c != '\n').is_some() {}
                continue;
            }

            self.remaining.next();

            return Some(match c {
                '(' => Ok(PartialSpanned::new(Token::LParen, Span::from(i..i + 1))),
                ')' => Ok(PartialSpanned::new(Token::RParen, Span::from(i..i + 1))),
                '#' => self.lex_hash(i),
                c if is_symbol_char(c) => self.lex_run(i, c),
                c => Err(error::unexpected_character(
                    c,
                    self.full_span(i..i + c.len_utf8()),
                )),
            });
        }
    }
}

/// Symbol constituents: everything except whitespace, the delimiters and
/// the `#` and `'` sigils.
fn is_symbol_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | ';' | '#' | '\'')
}

/// `-?[0-9]+`; a lone `-` is a symbol.
fn looks_numeric(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);

    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
