//! Recursive-descent parser for seed queries.
//!
//! ```text
//! batch     := statement (';' statement)*
//! statement := SELECT [DISTINCT] '*' FROM table [[AS] alias] [WHERE <anything>]
//! table     := name ('.' name)*
//! ```
//!
//! The WHERE expression is not parsed; it is passed to the database verbatim.

use super::lexer::{Lexer, Spanned, Token};
use super::Query;
use crate::error::{CopyError, Result};

/// Parse a batch of `;`-separated seed queries.
pub fn parse_queries(input: &str) -> Result<Vec<Query>> {
    let queries = split_statements(input)
        .into_iter()
        .map(|(offset, text)| StatementParser::new(input, offset, text).parse())
        .collect::<Result<Vec<_>>>()?;

    if queries.is_empty() {
        return Err(CopyError::QueryParse("seed query is empty".into()));
    }
    Ok(queries)
}

/// Parse exactly one seed query.
pub fn parse_query(input: &str) -> Result<Query> {
    let mut queries = parse_queries(input)?;
    if queries.len() > 1 {
        return Err(CopyError::QueryParse(format!(
            "expected a single query, found {}",
            queries.len()
        )));
    }
    Ok(queries.remove(0))
}

/// Split on `;` outside quotes. Returns each non-blank statement with its byte offset.
fn split_statements(input: &str) -> Vec<(usize, &str)> {
    let mut statements = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                ';' => {
                    statements.push((start, &input[start..i]));
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    statements.push((start, &input[start..]));

    statements
        .into_iter()
        .filter(|(_, s)| !s.trim().is_empty())
        .collect()
}

/// 1-based line and column of a byte offset.
fn position(input: &str, offset: usize) -> (usize, usize) {
    let before = &input[..offset.min(input.len())];
    let line = before.matches('\n').count() + 1;
    let column = before
        .rfind('\n')
        .map_or(before.chars().count(), |nl| before[nl + 1..].chars().count())
        + 1;
    (line, column)
}

struct StatementParser<'a> {
    input: &'a str,
    offset: usize,
    text: &'a str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'a> StatementParser<'a> {
    fn new(input: &'a str, offset: usize, text: &'a str) -> Self {
        let tokens = Lexer::new(text).tokenize();
        Self {
            input,
            offset,
            text,
            tokens,
            pos: 0,
        }
    }

    fn current(&self) -> &Spanned {
        // tokenize always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl AsRef<str>) -> CopyError {
        let (line, column) = position(self.input, self.offset + self.current().start);
        CopyError::QueryParse(format!("{}:{}: {}", line, column, message.as_ref()))
    }

    fn expected(&self, what: &str) -> CopyError {
        self.error(format!(
            "expected {}, found {}",
            what,
            self.current().token.describe()
        ))
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<()> {
        if self.current().token == token {
            self.advance();
            Ok(())
        } else {
            Err(self.expected(what))
        }
    }

    fn name(&mut self) -> Option<String> {
        let name = match &self.current().token {
            Token::Ident(s) | Token::QuotedIdent(s) => s.clone(),
            _ => return None,
        };
        self.advance();
        Some(name)
    }

    fn parse(mut self) -> Result<Query> {
        self.expect(Token::Select, "SELECT")?;

        let distinct = self.current().token == Token::Distinct;
        if distinct {
            self.advance();
        }

        if self.current().token != Token::Star {
            return Err(self.error(format!(
                "only '*' projection is supported, found {}",
                self.current().token.describe()
            )));
        }
        self.advance();

        self.expect(Token::From, "FROM")?;

        let table_start = self.current().start;
        let mut table = self.name().ok_or_else(|| self.expected("table name"))?;
        while self.current().token == Token::Dot {
            self.advance();
            let part = self.name().ok_or_else(|| self.expected("table name after '.'"))?;
            table = format!("{}.{}", table, part);
        }
        let table_ref = self.text[table_start..self.tokens[self.pos - 1].end].to_string();

        if self.current().token == Token::Comma {
            return Err(self.error("only one table reference is allowed"));
        }

        let alias = if self.current().token == Token::As {
            self.advance();
            Some(self.name().ok_or_else(|| self.expected("alias after AS"))?)
        } else {
            self.name()
        };

        if self.current().token == Token::Comma {
            return Err(self.error("only one table reference is allowed"));
        }

        let filter = match self.current().token {
            Token::Where => self.text[self.current().end..].trim().to_string(),
            Token::Eof => String::new(),
            _ => return Err(self.expected("WHERE or end of query")),
        };

        Ok(Query {
            text: self.text.trim().to_string(),
            table,
            table_ref,
            alias,
            filter,
            distinct,
        })
    }
}
