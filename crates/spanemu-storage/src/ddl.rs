//! DDL parser.
//!
//! Accepts a deliberately small dialect:
//!
//! ```text
//! CREATE TABLE t (col type [NOT NULL], ...) PRIMARY KEY (col [ASC], ...)
//! CREATE [UNIQUE] INDEX i ON t (col [ASC], ...)
//! DROP TABLE t
//! DROP INDEX i
//! ALTER TABLE t ADD COLUMN col type
//! ```
//!
//! Types: `BOOL`, `INT64`, `FLOAT64`, `STRING(n|MAX)`, `BYTES(n|MAX)`.
//! Keywords are case-insensitive; identifiers may be back-quoted.

use crate::error::{StorageError, StorageResult};
use crate::schema::{ColumnDef, IndexDef, TableDef};
use crate::value::ColumnType;

/// One parsed schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    CreateTable(TableDef),
    CreateIndex(IndexDef),
    DropTable(String),
    DropIndex(String),
    AddColumn { table: String, column: ColumnDef },
}

/// Parse a batch of statements; the first malformed statement fails the batch.
pub fn parse_statements<S: AsRef<str>>(statements: &[S]) -> StorageResult<Vec<DdlStatement>> {
    statements.iter().map(|s| parse_statement(s.as_ref())).collect()
}

pub fn parse_statement(input: &str) -> StorageResult<DdlStatement> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let statement = parser.parse_statement()?;
    parser.eat_symbol(';');
    if parser.current() != &Token::Eof {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(statement)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Quoted(String),
    Number(usize),
    Symbol(char),
    Eof,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn tokenize(mut self) -> StorageResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next_token(&mut self) -> StorageResult<Token> {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };

        if ch.is_ascii_alphabetic() || ch == '_' {
            let start = self.pos;
            while let Some(c) = self.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            return Ok(Token::Word(self.input[start..self.pos].to_string()));
        }

        if ch.is_ascii_digit() {
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            let digits = &self.input[start..self.pos];
            let n = digits
                .parse::<usize>()
                .map_err(|_| StorageError::Ddl(format!("number out of range: {digits}")))?;
            return Ok(Token::Number(n));
        }

        if ch == '`' {
            self.pos += 1;
            let start = self.pos;
            while let Some(c) = self.peek() {
                if c == '`' {
                    let ident = self.input[start..self.pos].to_string();
                    self.pos += 1;
                    if ident.is_empty() {
                        return Err(StorageError::Ddl("empty quoted identifier".to_string()));
                    }
                    return Ok(Token::Quoted(ident));
                }
                self.pos += c.len_utf8();
            }
            return Err(StorageError::Ddl("unterminated quoted identifier".to_string()));
        }

        match ch {
            '(' | ')' | ',' | ';' => {
                self.pos += 1;
                Ok(Token::Symbol(ch))
            }
            _ => Err(StorageError::Ddl(format!("unexpected character '{ch}'"))),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn error(&self, message: &str) -> StorageError {
        StorageError::Ddl(format!("{message} near {:?}", self.current()))
    }

    fn current_is_keyword(&self, keyword: &str) -> bool {
        matches!(self.current(), Token::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.current_is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> StorageResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {keyword}")))
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> bool {
        if self.current() == &Token::Symbol(symbol) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> StorageResult<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{symbol}'")))
        }
    }

    fn parse_ident(&mut self) -> StorageResult<String> {
        let ident = match self.current() {
            Token::Word(w) if !is_reserved(w) => w.clone(),
            Token::Quoted(q) => q.clone(),
            _ => return Err(self.error("expected identifier")),
        };
        self.advance();
        Ok(ident)
    }

    fn parse_statement(&mut self) -> StorageResult<DdlStatement> {
        if self.eat_keyword("CREATE") {
            if self.eat_keyword("TABLE") {
                return self.parse_create_table();
            }
            let unique = self.eat_keyword("UNIQUE");
            if self.eat_keyword("INDEX") {
                return self.parse_create_index(unique);
            }
            return Err(self.error("expected TABLE or INDEX"));
        }
        if self.eat_keyword("DROP") {
            if self.eat_keyword("TABLE") {
                return Ok(DdlStatement::DropTable(self.parse_ident()?));
            }
            if self.eat_keyword("INDEX") {
                return Ok(DdlStatement::DropIndex(self.parse_ident()?));
            }
            return Err(self.error("expected TABLE or INDEX"));
        }
        if self.eat_keyword("ALTER") {
            self.expect_keyword("TABLE")?;
            let table = self.parse_ident()?;
            self.expect_keyword("ADD")?;
            self.expect_keyword("COLUMN")?;
            let column = self.parse_column_def()?;
            return Ok(DdlStatement::AddColumn { table, column });
        }
        Err(self.error("unsupported statement"))
    }

    fn parse_create_table(&mut self) -> StorageResult<DdlStatement> {
        let name = self.parse_ident()?;
        self.expect_symbol('(')?;
        let mut columns = Vec::new();
        while !self.eat_symbol(')') {
            columns.push(self.parse_column_def()?);
            if !self.eat_symbol(',') {
                self.expect_symbol(')')?;
                break;
            }
        }
        if columns.is_empty() {
            return Err(StorageError::Ddl(format!("table {name} has no columns")));
        }
        self.expect_keyword("PRIMARY")?;
        self.expect_keyword("KEY")?;
        let primary_key = self.parse_key_list()?;
        Ok(DdlStatement::CreateTable(TableDef {
            name,
            columns,
            primary_key,
        }))
    }

    fn parse_create_index(&mut self, unique: bool) -> StorageResult<DdlStatement> {
        let name = self.parse_ident()?;
        self.expect_keyword("ON")?;
        let table = self.parse_ident()?;
        let columns = self.parse_key_list()?;
        if columns.is_empty() {
            return Err(StorageError::Ddl(format!("index {name} has no columns")));
        }
        Ok(DdlStatement::CreateIndex(IndexDef {
            name,
            table,
            columns,
            unique,
        }))
    }

    /// `( col [ASC], ... )`; the list may be empty.
    fn parse_key_list(&mut self) -> StorageResult<Vec<String>> {
        self.expect_symbol('(')?;
        let mut columns = Vec::new();
        if self.eat_symbol(')') {
            return Ok(columns);
        }
        loop {
            columns.push(self.parse_ident()?);
            if self.current_is_keyword("DESC") {
                return Err(self.error("descending key columns are not supported"));
            }
            self.eat_keyword("ASC");
            if self.eat_symbol(')') {
                return Ok(columns);
            }
            self.expect_symbol(',')?;
        }
    }

    fn parse_column_def(&mut self) -> StorageResult<ColumnDef> {
        let name = self.parse_ident()?;
        let column_type = self.parse_type()?;
        let not_null = if self.eat_keyword("NOT") {
            self.expect_keyword("NULL")?;
            true
        } else {
            false
        };
        Ok(ColumnDef {
            name,
            column_type,
            not_null,
        })
    }

    fn parse_type(&mut self) -> StorageResult<ColumnType> {
        let Token::Word(word) = self.current().clone() else {
            return Err(self.error("expected column type"));
        };
        self.advance();
        match word.to_ascii_uppercase().as_str() {
            "BOOL" => Ok(ColumnType::Bool),
            "INT64" => Ok(ColumnType::Int64),
            "FLOAT64" => Ok(ColumnType::Float64),
            "STRING" => Ok(ColumnType::String(self.parse_length()?)),
            "BYTES" => Ok(ColumnType::Bytes(self.parse_length()?)),
            other => Err(StorageError::Ddl(format!("unsupported column type {other}"))),
        }
    }

    /// `( n )` or `( MAX )`.
    fn parse_length(&mut self) -> StorageResult<Option<usize>> {
        self.expect_symbol('(')?;
        let length = match self.current().clone() {
            Token::Number(0) => return Err(self.error("length must be positive")),
            Token::Number(n) => Some(n),
            Token::Word(w) if w.eq_ignore_ascii_case("MAX") => None,
            _ => return Err(self.error("expected length or MAX")),
        };
        self.advance();
        self.expect_symbol(')')?;
        Ok(length)
    }
}

fn is_reserved(word: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CREATE", "TABLE", "INDEX", "UNIQUE", "DROP", "ALTER", "ADD", "ON", "PRIMARY", "KEY",
        "NOT", "NULL",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}
