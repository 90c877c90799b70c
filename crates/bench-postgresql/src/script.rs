//! Script preparation: statement splitting and named parameter rewriting.
//!
//! PostgreSQL's extended protocol accepts one statement per prepare and only
//! positional `$n` parameters. Workload scripts are multi-statement and use
//! named `$bid` style parameters, so each script is split and every distinct
//! name is mapped to a position.

use bench_core::{Param, Parameters};

use crate::error::PostgreSQLError;

/// One statement of a script with its parameters in positional order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<Param>,
}

impl CompiledStatement {
    /// Values for this statement's positional parameters.
    pub fn values(&self, parameters: &Parameters) -> Result<Vec<i64>, PostgreSQLError> {
        self.params
            .iter()
            .map(|p| {
                parameters
                    .get(p.name())
                    .ok_or_else(|| PostgreSQLError::MissingParameter(p.name().to_string()))
            })
            .collect()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Lexical {
    Code,
    SingleQuoted,
    DoubleQuoted,
    LineComment,
}

/// Split a script on `;`, ignoring separators inside quotes and `--` comments.
///
/// Empty statements are dropped.
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut state = Lexical::Code;
    let mut chars = script.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Lexical::Code => match c {
                ';' => {
                    push_statement(&mut statements, &current);
                    current.clear();
                    continue;
                }
                '\'' => state = Lexical::SingleQuoted,
                '"' => state = Lexical::DoubleQuoted,
                '-' if chars.peek() == Some(&'-') => state = Lexical::LineComment,
                _ => {}
            },
            Lexical::SingleQuoted if c == '\'' => state = Lexical::Code,
            Lexical::DoubleQuoted if c == '"' => state = Lexical::Code,
            Lexical::LineComment if c == '\n' => state = Lexical::Code,
            _ => {}
        }
        current.push(c);
    }
    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, text: &str) {
    if has_code(text) {
        statements.push(text.trim().to_string());
    }
}

/// True when `text` contains anything besides whitespace and line comments.
fn has_code(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim();
        !line.is_empty() && !line.starts_with("--")
    })
}

/// Rewrite `$name` placeholders outside of quotes into `$n::bigint`.
///
/// Each distinct name gets one position, in order of first appearance.
/// Numeric placeholders such as `$1` are left untouched.
pub fn compile_statement(statement: &str) -> Result<CompiledStatement, PostgreSQLError> {
    let mut sql = String::with_capacity(statement.len());
    let mut params: Vec<Param> = Vec::new();
    let mut state = Lexical::Code;
    let mut chars = statement.chars().peekable();

    while let Some(c) = chars.next() {
        if state == Lexical::Code && c == '$' {
            let starts_name = chars
                .peek()
                .is_some_and(|n| n.is_ascii_alphabetic() || *n == '_');
            if starts_name {
                let mut name = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '_' {
                        name.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let param = Param::from_name(&name)
                    .ok_or_else(|| PostgreSQLError::UnknownParameter(name.clone()))?;
                let position = match params.iter().position(|p| *p == param) {
                    Some(i) => i + 1,
                    None => {
                        params.push(param);
                        params.len()
                    }
                };
                sql.push_str(&format!("${position}::bigint"));
                continue;
            }
        }

        state = match (state, c) {
            (Lexical::Code, '\'') => Lexical::SingleQuoted,
            (Lexical::Code, '"') => Lexical::DoubleQuoted,
            (Lexical::Code, '-') if chars.peek() == Some(&'-') => Lexical::LineComment,
            (Lexical::SingleQuoted, '\'') => Lexical::Code,
            (Lexical::DoubleQuoted, '"') => Lexical::Code,
            (Lexical::LineComment, '\n') => Lexical::Code,
            (state, _) => state,
        };
        sql.push(c);
    }

    Ok(CompiledStatement { sql, params })
}

/// Split and compile a whole script.
pub fn compile_script(script: &str) -> Result<Vec<CompiledStatement>, PostgreSQLError> {
    split_statements(script)
        .iter()
        .map(|s| compile_statement(s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements() {
        let script = r#"
            UPDATE "bench/accounts" SET abalance = abalance + $delta WHERE aid = $aid;
            SELECT 'a;b' AS s;
            -- trailing comment; not a statement
        "#;
        let statements = split_statements(script);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("UPDATE"));
        assert_eq!(statements[1], "SELECT 'a;b' AS s");
    }

    #[test]
    fn test_split_ignores_quoted_identifier_separator() {
        let statements = split_statements(r#"SELECT 1 FROM "odd;name"; SELECT 2"#);
        assert_eq!(
            statements,
            vec![r#"SELECT 1 FROM "odd;name""#.to_string(), "SELECT 2".to_string()]
        );
    }

    #[test]
    fn test_split_empty_script() {
        assert!(split_statements("  ;\n ; -- nothing\n").is_empty());
    }

    #[test]
    fn test_compile_reuses_positions() {
        let compiled = compile_statement(
            "INSERT INTO h (tid, bid, aid, delta) VALUES ($tid, $bid, $aid, $delta); -- $bid",
        )
        .unwrap();
        assert_eq!(
            compiled.sql,
            "INSERT INTO h (tid, bid, aid, delta) VALUES ($1::bigint, $2::bigint, $3::bigint, $4::bigint); -- $bid"
        );
        assert_eq!(
            compiled.params,
            vec![Param::Tid, Param::Bid, Param::Aid, Param::Delta]
        );

        let compiled =
            compile_statement("UPDATE a SET x = x + $delta WHERE aid = $aid AND $aid > 0").unwrap();
        assert_eq!(
            compiled.sql,
            "UPDATE a SET x = x + $1::bigint WHERE aid = $2::bigint AND $2::bigint > 0"
        );
        assert_eq!(compiled.params.len(), 2);
    }

    #[test]
    fn test_compile_leaves_quotes_and_positional_params() {
        let compiled = compile_statement("SELECT '$bid', \"$aid\", $1").unwrap();
        assert_eq!(compiled.sql, "SELECT '$bid', \"$aid\", $1");
        assert!(compiled.params.is_empty());
    }

    #[test]
    fn test_compile_rejects_unknown_parameter() {
        let err = compile_statement("SELECT $filler").unwrap_err();
        assert!(matches!(err, PostgreSQLError::UnknownParameter(name) if name == "filler"));
    }

    #[test]
    fn test_values_follow_positions() {
        let compiled = compile_statement("SELECT $aid, $bid").unwrap();
        let mut params = Parameters::single(Param::Bid, 4);
        assert!(compiled.values(&params).is_err());

        params = Parameters::for_script(
            bench_core::UsedParams::detect("$aid $bid"),
            &bench_core::KeyValues {
                bid: 4,
                tid: 31,
                aid: 300_001,
                delta: 9,
                iteration: 0,
            },
        );
        assert_eq!(compiled.values(&params).unwrap(), vec![300_001, 4]);
    }
}
