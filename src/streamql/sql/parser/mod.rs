//! Clause parsers for the streaming query language.
//!
//! [`Parser::parse`] drives the clause sub-parsers in statement order:
//! SELECT, FROM, WHERE, GROUP BY, WITH. Each sub-parser consumes its clause
//! plus the token that terminates it; the GROUP BY parser recovers a window
//! keyword that was consumed as the WHERE boundary by scanning the lexer
//! backwards for the previous identifier.

pub mod lexer;

use crate::streamql::sql::ast::{
    ExprMeta, Field, SelectStatement, WindowParam,
};
use crate::streamql::sql::error::{SqlError, SqlResult};
use crate::streamql::utils::string::strip_quotes;
use std::time::Duration;

pub use lexer::{Lexer, Token, TokenType};

pub struct Parser {
    lexer: Lexer,
}

impl Parser {
    pub fn new(input: &str) -> Parser {
        Parser {
            lexer: Lexer::new(input),
        }
    }

    /// Parse the query into a select statement.
    pub fn parse(&mut self) -> SqlResult<SelectStatement> {
        let mut stmt = SelectStatement::default();

        self.parse_select(&mut stmt)?;
        self.parse_from(&mut stmt)?;
        self.parse_where(&mut stmt)?;
        let boundary = self.parse_group_by(&mut stmt)?;
        self.parse_with(&mut stmt, boundary)?;

        Ok(stmt)
    }

    /// Accumulate projection items until FROM. An item ends at a top-level
    /// comma or at AS, which introduces its alias.
    fn parse_select(&mut self, stmt: &mut SelectStatement) -> SqlResult<()> {
        self.lexer.skip_whitespace();
        let select = self.lexer.next_token();
        if select.token_type != TokenType::Select {
            return Err(SqlError::parse_error(
                format!("expected SELECT, found '{}'", select.value),
                Some(select.position),
            ));
        }

        let mut current = self.lexer.next_token();
        loop {
            let mut expr = String::new();
            let mut paren_balance = 0i32;
            loop {
                match current.token_type {
                    TokenType::LParen => paren_balance += 1,
                    TokenType::RParen => paren_balance -= 1,
                    _ => {}
                }
                if current.token_type == TokenType::From
                    || current.token_type == TokenType::Eof
                    || (current.token_type == TokenType::Comma && paren_balance == 0)
                    || current.token_type == TokenType::As
                {
                    break;
                }
                expr.push_str(&current.value);
                current = self.lexer.next_token();
            }

            let mut field = Field {
                expression: expr.trim().to_string(),
                alias: None,
            };

            if current.token_type == TokenType::As {
                let mut next = self.lexer.next_token();
                while next.token_type == TokenType::Space {
                    next = self.lexer.next_token();
                }
                field.alias = Some(next.value);
            }

            if !field.expression.is_empty() {
                let meta = ExprMeta::from_projection(&field.expression, field.alias.clone());
                stmt.context.projection.push(meta);
                stmt.fields.push(field);
            }

            if current.token_type == TokenType::From || current.token_type == TokenType::Eof {
                break;
            }
            current = self.lexer.next_token();
        }
        Ok(())
    }

    /// The stream source identifier.
    fn parse_from(&mut self, stmt: &mut SelectStatement) -> SqlResult<()> {
        self.lexer.skip_whitespace();
        let token = self.lexer.next_token();
        if token.token_type != TokenType::Ident {
            return Err(SqlError::parse_error(
                "missing FROM clause",
                Some(token.position),
            ));
        }
        stmt.source = token.value;
        Ok(())
    }

    /// Optional WHERE clause. Tokens are translated into the expression
    /// engine's syntax (`=`/`==` → `==`, `AND` → `&&`, `OR` → `||`, string
    /// literals requoted) and joined with single spaces. The clause ends at
    /// GROUP, a window keyword, or end of input; the terminating token stays
    /// recoverable through the lexer's previous-identifier scan.
    fn parse_where(&mut self, stmt: &mut SelectStatement) -> SqlResult<()> {
        self.lexer.skip_whitespace();
        let current = self.lexer.next_token();
        if current.token_type != TokenType::Where {
            return Ok(());
        }

        let mut conditions: Vec<String> = Vec::new();
        loop {
            let token = self.lexer.next_token();
            if token.token_type == TokenType::Group
                || token.token_type == TokenType::Eof
                || token.token_type.is_window_keyword()
            {
                break;
            }
            match token.token_type {
                TokenType::Space => {}
                TokenType::String => {
                    conditions.push(format!("'{}'", strip_quotes(&token.value)));
                }
                TokenType::Eq => conditions.push("==".to_string()),
                TokenType::And => conditions.push("&&".to_string()),
                TokenType::Or => conditions.push("||".to_string()),
                _ => conditions.push(token.value),
            }
        }
        stmt.condition = conditions.join(" ");
        Ok(())
    }

    /// GROUP BY body: identifiers and window calls, in any order, until
    /// WITH, ORDER, or end of input. Returns the terminating token type.
    ///
    /// The previous clause's boundary token is re-examined first: a window
    /// keyword that terminated WHERE dispatches straight into window
    /// parsing, and a WITH consumed without any GROUP BY hands over to the
    /// WITH parser.
    fn parse_group_by(&mut self, stmt: &mut SelectStatement) -> SqlResult<TokenType> {
        let previous = self
            .lexer
            .lookup_ident(&self.lexer.read_previous_identifier());
        if previous.token_type.is_window_keyword() {
            self.parse_window_function(stmt, previous.value)?;
        } else if previous.token_type == TokenType::With {
            return Ok(TokenType::With);
        } else if previous.token_type == TokenType::Group {
            self.lexer.skip_whitespace();
            let by = self.lexer.next_token();
            if by.token_type != TokenType::By {
                return Err(SqlError::parse_error(
                    format!("expected BY after GROUP, found '{}'", by.value),
                    Some(by.position),
                ));
            }
        }

        loop {
            self.lexer.skip_whitespace();
            let token = self.lexer.next_token();
            match token.token_type {
                TokenType::With | TokenType::Order | TokenType::Eof => {
                    return Ok(token.token_type);
                }
                TokenType::Comma | TokenType::Space => {}
                _ if token.token_type.is_window_keyword() => {
                    self.parse_window_function(stmt, token.value)?;
                }
                TokenType::Ident => {
                    stmt.group_by.push(token.value.clone());
                    stmt.context
                        .group_by
                        .push(ExprMeta::from_projection(&token.value, None));
                }
                _ => {}
            }
        }
    }

    /// A window call: comma-separated literal parameters between
    /// parentheses.
    fn parse_window_function(
        &mut self,
        stmt: &mut SelectStatement,
        window_keyword: String,
    ) -> SqlResult<()> {
        self.lexer.skip_whitespace();
        let open = self.lexer.next_token();
        if open.token_type != TokenType::LParen {
            return Err(SqlError::parse_error(
                format!("expected '(' after {}", window_keyword),
                Some(open.position),
            ));
        }

        let mut params = Vec::new();
        let mut raw_params: Vec<String> = Vec::new();
        loop {
            let token = self.lexer.next_token();
            match token.token_type {
                TokenType::RParen | TokenType::Eof => break,
                TokenType::Comma | TokenType::Space => {}
                _ => {
                    raw_params.push(token.value.clone());
                    params.push(convert_value(&token.value));
                }
            }
        }

        stmt.window.window_type = Some(window_keyword.clone());
        stmt.window.params = params;
        stmt.context.window = Some(ExprMeta::from_projection(
            &format!("{}({})", window_keyword, raw_params.join(", ")),
            None,
        ));
        Ok(())
    }

    /// WITH clause: `(TIMESTAMP='field', TIMEUNIT='unit')` properties
    /// applied to the window definition, constructing one lazily when no
    /// window call preceded.
    fn parse_with(&mut self, stmt: &mut SelectStatement, boundary: TokenType) -> SqlResult<()> {
        if boundary != TokenType::With {
            return Ok(());
        }

        self.lexer.skip_whitespace();
        let open = self.lexer.next_token();
        if open.token_type != TokenType::LParen {
            if open.token_type == TokenType::Eof {
                return Ok(());
            }
            return Err(SqlError::parse_error(
                format!("expected '(' after WITH, found '{}'", open.value),
                Some(open.position),
            ));
        }

        loop {
            let token = self.lexer.next_token();
            match token.token_type {
                TokenType::RParen | TokenType::Eof => break,
                TokenType::Comma | TokenType::Space => {}
                TokenType::Timestamp => {
                    let value = self.parse_with_property("TIMESTAMP")?;
                    stmt.window.ts_prop = Some(value);
                }
                TokenType::TimeUnit => {
                    let value = self.parse_with_property("TIMEUNIT")?;
                    stmt.window.time_unit = Some(map_time_unit(&value));
                }
                _ => {
                    return Err(SqlError::parse_error(
                        format!("unknown keyword in WITH clause: '{}'", token.value),
                        Some(token.position),
                    ));
                }
            }
        }
        Ok(())
    }

    /// `= <literal>` after a WITH property keyword, quotes stripped.
    fn parse_with_property(&mut self, property: &str) -> SqlResult<String> {
        let mut token = self.lexer.next_token();
        while token.token_type == TokenType::Space {
            token = self.lexer.next_token();
        }
        if token.token_type != TokenType::Eq {
            return Err(SqlError::parse_error(
                format!("expected '=' after {} in WITH clause", property),
                Some(token.position),
            ));
        }

        let mut value = self.lexer.next_token();
        while value.token_type == TokenType::Space {
            value = self.lexer.next_token();
        }
        Ok(strip_quotes(&value.value).to_string())
    }
}

/// Literal coercion for window parameters.
fn convert_value(text: &str) -> WindowParam {
    if text == "true" {
        return WindowParam::Bool(true);
    }
    if text == "false" {
        return WindowParam::Bool(false);
    }
    if let Ok(int) = text.parse::<i64>() {
        return WindowParam::Int(int);
    }
    if let Ok(float) = text.parse::<f64>() {
        return WindowParam::Float(float);
    }
    WindowParam::Str(strip_quotes(text).to_string())
}

/// TIMEUNIT code → alignment duration. Unknown codes keep the default of
/// one minute.
fn map_time_unit(code: &str) -> Duration {
    match code {
        "dd" => Duration::from_secs(24 * 3600),
        "hh" => Duration::from_secs(3600),
        "mi" => Duration::from_secs(60),
        "ss" => Duration::from_secs(1),
        "ms" => Duration::from_millis(1),
        _ => Duration::from_secs(60),
    }
}
