//! Recognizer for the MySQL statement shapes the in-memory backend executes.

use crate::core::{DbError, DbResult, SqlValue};
use regex::Regex;

lazy_static::lazy_static! {
    static ref TOKEN: Regex = Regex::new(concat!(
        r"^\s*(?:",
        r"`((?:[^`]|``)+)`",            // 1: quoted identifier
        r"|(:[A-Za-z0-9_]+)",           // 2: named parameter
        r"|'((?:[^']|'')*)'",           // 3: string literal
        r"|(-?\d+\.\d+)",               // 4: float literal
        r"|(-?\d+)",                    // 5: integer literal
        r"|([A-Za-z_][A-Za-z0-9_]*)",   // 6: bare word
        r"|(<>|!=|<=|>=|[(),.=<>&|^*;])", // 7: symbol
        r")"
    ))
    .expect("valid token pattern");
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Param(String),
    Literal(SqlValue),
    Word(String),
    Symbol(String),
}

fn tokenize(sql: &str) -> DbResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut rest = sql;
    while !rest.trim().is_empty() {
        let caps = TOKEN
            .captures(rest)
            .ok_or_else(|| DbError::ParseError(format!("Unexpected input near '{}'", rest.trim())))?;
        let token = if let Some(m) = caps.get(1) {
            Token::Ident(m.as_str().replace("``", "`"))
        } else if let Some(m) = caps.get(2) {
            Token::Param(m.as_str().to_string())
        } else if let Some(m) = caps.get(3) {
            Token::Literal(SqlValue::Text(m.as_str().replace("''", "'")))
        } else if let Some(m) = caps.get(4) {
            let value = m
                .as_str()
                .parse()
                .map_err(|_| DbError::ParseError(format!("Bad number {}", m.as_str())))?;
            Token::Literal(SqlValue::Float(value))
        } else if let Some(m) = caps.get(5) {
            let value = m
                .as_str()
                .parse()
                .map_err(|_| DbError::ParseError(format!("Bad number {}", m.as_str())))?;
            Token::Literal(SqlValue::Integer(value))
        } else if let Some(m) = caps.get(6) {
            Token::Word(m.as_str().to_string())
        } else if let Some(m) = caps.get(7) {
            Token::Symbol(m.as_str().to_string())
        } else {
            return Err(DbError::ParseError(format!("Unexpected input near '{}'", rest.trim())));
        };
        tokens.push(token);
        rest = &rest[caps.get(0).map_or(rest.len(), |m| m.end())..];
    }
    Ok(tokens)
}

/// A bound parameter or an inline literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Param(String),
    Literal(SqlValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Like,
    BitAnd,
    BitOr,
    BitXor,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        operand: Operand,
    },
    In {
        column: String,
        operands: Vec<Operand>,
    },
}

impl Predicate {
    pub fn column(&self) -> &str {
        match self {
            Self::Compare { column, .. } | Self::In { column, .. } => column,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    ShowTables,
    ShowColumns {
        table: String,
    },
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Operand>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Operand)>,
        filter: Vec<Predicate>,
    },
    Delete {
        table: String,
        filter: Vec<Predicate>,
    },
    Select {
        table: String,
        /// Empty for `*`
        columns: Vec<String>,
        filter: Vec<Predicate>,
        order: Vec<(String, bool)>,
    },
}

impl Command {
    /// Every operand that names a parameter, in statement order.
    pub fn params(&self) -> Vec<&str> {
        fn from_filter(filter: &[Predicate]) -> impl Iterator<Item = &Operand> {
            filter.iter().flat_map(|p| match p {
                Predicate::Compare { operand, .. } => std::slice::from_ref(operand),
                Predicate::In { operands, .. } => operands.as_slice(),
            })
        }

        let operands: Vec<&Operand> = match self {
            Self::ShowTables | Self::ShowColumns { .. } => Vec::new(),
            Self::Insert { values, .. } => values.iter().collect(),
            Self::Update {
                assignments, filter, ..
            } => assignments
                .iter()
                .map(|(_, operand)| operand)
                .chain(from_filter(filter))
                .collect(),
            Self::Delete { filter, .. } | Self::Select { filter, .. } => from_filter(filter).collect(),
        };
        operands
            .into_iter()
            .filter_map(|operand| match operand {
                Operand::Param(name) => Some(name.as_str()),
                Operand::Literal(_) => None,
            })
            .collect()
    }

    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Self::ShowTables | Self::ShowColumns { .. } | Self::Select { .. }
        )
    }
}

pub fn parse(sql: &str) -> DbResult<Command> {
    let mut parser = Parser {
        tokens: tokenize(sql)?,
        pos: 0,
    };
    let command = parser.command()?;
    parser.eat_symbol(";");
    if let Some(token) = parser.peek() {
        return Err(DbError::ParseError(format!("Unexpected trailing {:?}", token)));
    }
    Ok(command)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> DbResult<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| DbError::ParseError("Unexpected end of statement".to_string()))?;
        self.pos += 1;
        Ok(token)
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> DbResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(DbError::ParseError(format!(
                "Expected {}, found {:?}",
                keyword,
                self.peek()
            )))
        }
    }

    fn is_symbol(&self, symbol: &str) -> bool {
        matches!(self.peek(), Some(Token::Symbol(s)) if s == symbol)
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if self.is_symbol(symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, symbol: &str) -> DbResult<()> {
        if self.eat_symbol(symbol) {
            Ok(())
        } else {
            Err(DbError::ParseError(format!(
                "Expected '{}', found {:?}",
                symbol,
                self.peek()
            )))
        }
    }

    fn identifier(&mut self) -> DbResult<String> {
        match self.next()? {
            Token::Ident(name) | Token::Word(name) => Ok(name),
            other => Err(DbError::ParseError(format!("Expected identifier, found {:?}", other))),
        }
    }

    /// `column` or `table`.`column`; the qualifier is dropped.
    fn column_ref(&mut self) -> DbResult<String> {
        let name = self.identifier()?;
        if self.eat_symbol(".") {
            return self.identifier();
        }
        Ok(name)
    }

    fn operand(&mut self) -> DbResult<Operand> {
        match self.next()? {
            Token::Param(name) => Ok(Operand::Param(name)),
            Token::Literal(value) => Ok(Operand::Literal(value)),
            Token::Word(w) if w.eq_ignore_ascii_case("NULL") => Ok(Operand::Literal(SqlValue::Null)),
            other => Err(DbError::ParseError(format!("Expected value, found {:?}", other))),
        }
    }

    fn list<T>(&mut self, mut item: impl FnMut(&mut Self) -> DbResult<T>) -> DbResult<Vec<T>> {
        self.expect_symbol("(")?;
        let mut items = Vec::new();
        if self.eat_symbol(")") {
            return Ok(items);
        }
        loop {
            items.push(item(self)?);
            if self.eat_symbol(")") {
                return Ok(items);
            }
            self.expect_symbol(",")?;
        }
    }

    fn command(&mut self) -> DbResult<Command> {
        if self.eat_keyword("SHOW") {
            if self.eat_keyword("TABLES") {
                return Ok(Command::ShowTables);
            }
            self.eat_keyword("FULL");
            if !self.eat_keyword("COLUMNS") {
                self.expect_keyword("FIELDS")?;
            }
            if !self.eat_keyword("FROM") {
                self.expect_keyword("IN")?;
            }
            let table = self.identifier()?;
            return Ok(Command::ShowColumns { table });
        }
        if self.eat_keyword("INSERT") {
            return self.insert();
        }
        if self.eat_keyword("UPDATE") {
            return self.update();
        }
        if self.eat_keyword("DELETE") {
            self.expect_keyword("FROM")?;
            let table = self.identifier()?;
            let filter = self.where_clause()?;
            return Ok(Command::Delete { table, filter });
        }
        if self.eat_keyword("SELECT") {
            return self.select();
        }
        Err(DbError::UnsupportedOperation(format!(
            "Statement starting with {:?}",
            self.peek()
        )))
    }

    fn insert(&mut self) -> DbResult<Command> {
        self.expect_keyword("INTO")?;
        let table = self.identifier()?;
        let columns = self.list(Self::identifier)?;
        self.expect_keyword("VALUES")?;
        let values = self.list(Self::operand)?;
        if columns.len() != values.len() {
            return Err(DbError::ParseError(format!(
                "INSERT names {} columns but supplies {} values",
                columns.len(),
                values.len()
            )));
        }
        Ok(Command::Insert {
            table,
            columns,
            values,
        })
    }

    fn update(&mut self) -> DbResult<Command> {
        let table = self.identifier()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let column = self.column_ref()?;
            self.expect_symbol("=")?;
            assignments.push((column, self.operand()?));
            if !self.eat_symbol(",") {
                break;
            }
        }
        let filter = self.where_clause()?;
        Ok(Command::Update {
            table,
            assignments,
            filter,
        })
    }

    fn select(&mut self) -> DbResult<Command> {
        let mut columns = Vec::new();
        if !self.eat_symbol("*") {
            loop {
                columns.push(self.column_ref()?);
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }
        self.expect_keyword("FROM")?;
        let table = self.identifier()?;
        let filter = self.where_clause()?;

        let mut order = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let column = self.column_ref()?;
                let descending = if self.eat_keyword("DESC") {
                    true
                } else {
                    self.eat_keyword("ASC");
                    false
                };
                order.push((column, descending));
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }
        Ok(Command::Select {
            table,
            columns,
            filter,
            order,
        })
    }

    fn where_clause(&mut self) -> DbResult<Vec<Predicate>> {
        let mut filter = Vec::new();
        if !self.eat_keyword("WHERE") {
            return Ok(filter);
        }
        loop {
            filter.push(self.predicate()?);
            if !self.eat_keyword("AND") {
                return Ok(filter);
            }
        }
    }

    fn predicate(&mut self) -> DbResult<Predicate> {
        let column = self.column_ref()?;
        if self.eat_keyword("IN") {
            let operands = self.list(Self::operand)?;
            return Ok(Predicate::In { column, operands });
        }
        let op = if self.eat_keyword("LIKE") {
            CompareOp::Like
        } else {
            match self.next()? {
                Token::Symbol(s) => match s.as_str() {
                    "=" => CompareOp::Eq,
                    "<>" | "!=" => CompareOp::NotEq,
                    "<" => CompareOp::Lt,
                    "<=" => CompareOp::LtEq,
                    ">" => CompareOp::Gt,
                    ">=" => CompareOp::GtEq,
                    "&" => CompareOp::BitAnd,
                    "|" => CompareOp::BitOr,
                    "^" => CompareOp::BitXor,
                    other => {
                        return Err(DbError::ParseError(format!("Unknown operator '{}'", other)));
                    }
                },
                other => {
                    return Err(DbError::ParseError(format!("Expected operator, found {:?}", other)));
                }
            }
        };
        let operand = self.operand()?;
        Ok(Predicate::Compare {
            column,
            op,
            operand,
        })
    }
}
