//! Seed query lexer.
//!
//! Tokens carry their byte span so the parser can lift the WHERE text out of the
//! source verbatim. The lexer never fails: anything it does not recognise becomes
//! a [`Token::Other`] and is left for the parser to reject.

use std::iter::Peekable;
use std::str::CharIndices;

/// Seed query token types.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    Select,
    Distinct,
    From,
    As,
    Where,

    // Identifiers and literals
    Ident(String),
    QuotedIdent(String),
    Str(String),
    Num(String),

    // Symbols
    Star,
    Comma,
    Dot,
    Other(char),

    // End of input
    Eof,
}

impl Token {
    /// Human readable form for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Select => "SELECT".into(),
            Token::Distinct => "DISTINCT".into(),
            Token::From => "FROM".into(),
            Token::As => "AS".into(),
            Token::Where => "WHERE".into(),
            Token::Ident(s) => format!("identifier '{}'", s),
            Token::QuotedIdent(s) => format!("identifier \"{}\"", s),
            Token::Str(s) => format!("string '{}'", s),
            Token::Num(s) => format!("number {}", s),
            Token::Star => "'*'".into(),
            Token::Comma => "','".into(),
            Token::Dot => "'.'".into(),
            Token::Other(c) => format!("'{}'", c),
            Token::Eof => "end of query".into(),
        }
    }
}

/// A token and the byte range it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

/// Seed query lexer.
pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |(i, _)| *i)
    }

    fn skip_whitespace(&mut self) {
        while let Some((_, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
            } else {
                break;
            }
        }
    }

    fn read_word(&mut self) -> String {
        let mut word = String::new();
        while let Some((_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || *c == '_' || *c == '$' {
                word.push(*c);
                self.chars.next();
            } else {
                break;
            }
        }
        word
    }

    /// Read up to the closing `quote`; a doubled quote is an escaped quote.
    /// An unterminated literal runs to the end of input.
    fn read_quoted(&mut self, quote: char) -> String {
        self.chars.next(); // opening quote
        let mut s = String::new();
        while let Some((_, c)) = self.chars.next() {
            if c == quote {
                if matches!(self.chars.peek(), Some((_, q)) if *q == quote) {
                    s.push(quote);
                    self.chars.next();
                } else {
                    break;
                }
            } else {
                s.push(c);
            }
        }
        s
    }

    fn read_number(&mut self) -> String {
        let mut num = String::new();
        while let Some((_, c)) = self.chars.peek() {
            if c.is_ascii_digit() || *c == '.' {
                num.push(*c);
                self.chars.next();
            } else {
                break;
            }
        }
        num
    }

    fn keyword_or_ident(word: String) -> Token {
        match word.to_uppercase().as_str() {
            "SELECT" => Token::Select,
            "DISTINCT" => Token::Distinct,
            "FROM" => Token::From,
            "AS" => Token::As,
            "WHERE" => Token::Where,
            _ => Token::Ident(word),
        }
    }

    fn next_token(&mut self) -> Spanned {
        self.skip_whitespace();
        let start = self.offset();

        let token = match self.chars.peek().map(|(_, c)| *c) {
            None => Token::Eof,
            Some(c) if c.is_alphabetic() || c == '_' => Self::keyword_or_ident(self.read_word()),
            Some(c) if c.is_ascii_digit() => Token::Num(self.read_number()),
            Some('\'') => Token::Str(self.read_quoted('\'')),
            Some(q @ ('"' | '`')) => Token::QuotedIdent(self.read_quoted(q)),
            Some(c) => {
                self.chars.next();
                match c {
                    '*' => Token::Star,
                    ',' => Token::Comma,
                    '.' => Token::Dot,
                    other => Token::Other(other),
                }
            }
        };

        Spanned {
            token,
            start,
            end: self.offset(),
        }
    }

    /// Tokenize the whole input. The last token is always [`Token::Eof`].
    pub fn tokenize(&mut self) -> Vec<Spanned> {
        let mut tokens = Vec::new();
        loop {
            let spanned = self.next_token();
            let done = spanned.token == Token::Eof;
            tokens.push(spanned);
            if done {
                break;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input)
            .tokenize()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            tokens("select Distinct * from t"),
            vec![
                Token::Select,
                Token::Distinct,
                Token::Star,
                Token::From,
                Token::Ident("t".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_quoted_tokens() {
        assert_eq!(
            tokens("\"My \"\"Table\"\" \" 'it''s' `x`"),
            vec![
                Token::QuotedIdent("My \"Table\" ".into()),
                Token::Str("it's".into()),
                Token::QuotedIdent("x".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_spans_cover_source_text() {
        let input = "SELECT  *\nFROM t";
        let spanned = Lexer::new(input).tokenize();
        assert_eq!(&input[spanned[1].start..spanned[1].end], "*");
        assert_eq!(&input[spanned[2].start..spanned[2].end], "FROM");
        assert_eq!(spanned.last().unwrap().start, input.len());
    }

    #[test]
    fn test_unknown_characters_do_not_fail() {
        assert_eq!(
            tokens("a = 10"),
            vec![
                Token::Ident("a".into()),
                Token::Other('='),
                Token::Num("10".into()),
                Token::Eof
            ]
        );
    }
}
