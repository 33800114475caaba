// SPDX-License-Identifier: Apache-2.0

//! Array (AFL) query fingerprints.
//!
//! AFL is a nested operator-call language: `filter(scan(a), v > 3)`. Arrays
//! are the identifiers passed as the data argument of an operator, which is
//! the first argument, or the first two for binary operators.

use std::collections::BTreeSet;

use crate::error::{IslandError, IslandResult};

const BINARY_OPERATORS: [&str; 5] = ["cross_join", "join", "merge", "cross", "union"];

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    Str(String),
    Open,
    Close,
    Comma,
    Symbol(char),
}

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Call { name: String, args: Vec<Vec<Term>> },
    Group(Vec<Vec<Term>>),
    Ident(String),
    Leaf,
}

fn tokenize(query: &str) -> IslandResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = query.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' | '[' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' | ']' => {
                chars.next();
                tokens.push(Token::Close);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    if ch == '\\' {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    } else if ch == quote {
                        closed = true;
                        break;
                    } else {
                        value.push(ch);
                    }
                }
                if !closed {
                    return Err(IslandError::malformed("unterminated string in array query"));
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() => {
                let mut value = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' {
                        value.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' || c == '@' || c == '$' => {
                let mut value = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || matches!(d, '_' | '@' | '$' | '.') {
                        value.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(value));
            }
            other => {
                chars.next();
                tokens.push(Token::Symbol(other));
            }
        }
    }
    Ok(tokens)
}

struct TermParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> TermParser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    /// Terms up to (not including) the next comma or closing bracket.
    fn sequence(&mut self) -> IslandResult<Vec<Term>> {
        let mut terms = Vec::new();
        while let Some(token) = self.peek() {
            match token {
                Token::Close | Token::Comma => break,
                Token::Ident(name) => {
                    self.advance();
                    if self.peek() == Some(&Token::Open) {
                        self.advance();
                        let args = self.arguments()?;
                        terms.push(Term::Call {
                            name: name.clone(),
                            args,
                        });
                    } else {
                        terms.push(Term::Ident(name.clone()));
                    }
                }
                Token::Open => {
                    self.advance();
                    terms.push(Term::Group(self.arguments()?));
                }
                Token::Number(_) | Token::Str(_) | Token::Symbol(_) => {
                    self.advance();
                    terms.push(Term::Leaf);
                }
            }
        }
        Ok(terms)
    }

    /// Comma-separated arguments after an opening bracket, consuming the
    /// matching close.
    fn arguments(&mut self) -> IslandResult<Vec<Vec<Term>>> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::Close) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.sequence()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::Close) => return Ok(args),
                _ => return Err(IslandError::malformed("unbalanced parentheses in array query")),
            }
        }
    }
}

fn parse(query: &str) -> IslandResult<Vec<Term>> {
    let tokens = tokenize(query)?;
    let mut parser = TermParser {
        tokens: &tokens,
        pos: 0,
    };
    let mut terms = Vec::new();
    while parser.peek().is_some() {
        terms.extend(parser.sequence()?);
        if parser.peek().is_some() {
            return Err(IslandError::malformed(
                "unexpected separator at top level of array query",
            ));
        }
    }
    Ok(terms)
}

fn collect_arrays(terms: &[Term], out: &mut BTreeSet<String>) {
    for term in terms {
        match term {
            Term::Call { name, args } => {
                let data_args = if BINARY_OPERATORS.contains(&name.to_ascii_lowercase().as_str()) {
                    2
                } else {
                    1
                };
                for arg in args.iter().take(data_args) {
                    if let [Term::Ident(array)] = arg.as_slice() {
                        out.insert(array.clone());
                    }
                }
                for arg in args {
                    collect_arrays(arg, out);
                }
            }
            Term::Group(args) => {
                for arg in args {
                    collect_arrays(arg, out);
                }
            }
            Term::Ident(_) | Term::Leaf => {}
        }
    }
}

pub fn objects(query: &str) -> IslandResult<BTreeSet<String>> {
    let terms = parse(query)?;
    let mut arrays = BTreeSet::new();
    collect_arrays(&terms, &mut arrays);
    Ok(arrays)
}

/// Numeric and quoted constants in the order they appear.
pub fn literals(query: &str) -> IslandResult<Vec<String>> {
    Ok(tokenize(query)?
        .into_iter()
        .filter_map(|token| match token {
            Token::Number(n) => Some(n),
            Token::Str(s) => Some(s),
            _ => None,
        })
        .collect())
}
