use sqlparser::ast::Statement;
use sqlparser::dialect::{
    Dialect as ParserDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect,
};
use sqlparser::parser::Parser;

use crate::api::middleware::AppError;
use crate::models::Dialect;

/// SQL validation for statements the gateway generates itself
pub struct SqlValidator;

impl SqlValidator {
    fn parser_dialect(dialect: Dialect) -> Box<dyn ParserDialect> {
        match dialect {
            Dialect::Mysql | Dialect::Mariadb => Box::new(MySqlDialect {}),
            Dialect::Postgres => Box::new(PostgreSqlDialect {}),
            Dialect::Mssql => Box::new(MsSqlDialect {}),
            Dialect::Sqlite => Box::new(SQLiteDialect {}),
        }
    }

    /// Parse `sql` with the engine's grammar and require exactly one SELECT.
    pub fn validate_single_select(sql: &str, dialect: Dialect) -> Result<(), AppError> {
        let parser_dialect = Self::parser_dialect(dialect);
        let ast = Parser::parse_sql(parser_dialect.as_ref(), sql)
            .map_err(|e| AppError::query(sql, format!("SQL parsing error: {}", e)))?;

        match ast.as_slice() {
            [Statement::Query(_)] => Ok(()),
            [] => Err(AppError::query(sql, "Empty SQL query")),
            [_] => Err(AppError::query(sql, "Only a SELECT statement is permitted here")),
            _ => Err(AppError::query(
                sql,
                format!("Expected a single statement, found {}", ast.len()),
            )),
        }
    }
}
