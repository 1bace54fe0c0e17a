use std::fmt;

use crate::api::middleware::AppError;
use crate::models::Dialect;
use crate::validation::SqlValidator;

/// What a discovery step wants to learn from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiscoveryIntent {
    ListDatabases,
    ListTables,
}

impl fmt::Display for DiscoveryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryIntent::ListDatabases => f.write_str("list databases"),
            DiscoveryIntent::ListTables => f.write_str("list tables"),
        }
    }
}

/// Helper calls implemented by the driver rather than by a SQL string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeCall {
    ShowAllSchemas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySpec {
    Literal(&'static str),
    DriverNative(NativeCall),
}

const RESOLUTIONS: &[(DiscoveryIntent, Dialect, QuerySpec)] = &[
    (DiscoveryIntent::ListDatabases, Dialect::Mysql, QuerySpec::Literal("SHOW DATABASES")),
    (DiscoveryIntent::ListDatabases, Dialect::Mariadb, QuerySpec::Literal("SHOW DATABASES")),
    (
        DiscoveryIntent::ListDatabases,
        Dialect::Postgres,
        QuerySpec::Literal("SELECT datname FROM pg_database WHERE NOT datistemplate"),
    ),
    (DiscoveryIntent::ListDatabases, Dialect::Mssql, QuerySpec::Literal("SELECT * FROM Sys.Databases")),
    (DiscoveryIntent::ListTables, Dialect::Mysql, QuerySpec::DriverNative(NativeCall::ShowAllSchemas)),
    (DiscoveryIntent::ListTables, Dialect::Sqlite, QuerySpec::DriverNative(NativeCall::ShowAllSchemas)),
    (DiscoveryIntent::ListTables, Dialect::Mssql, QuerySpec::DriverNative(NativeCall::ShowAllSchemas)),
    (DiscoveryIntent::ListTables, Dialect::Mariadb, QuerySpec::DriverNative(NativeCall::ShowAllSchemas)),
    (
        DiscoveryIntent::ListTables,
        Dialect::Postgres,
        QuerySpec::Literal("SELECT table_name FROM information_schema.tables WHERE table_schema='public'"),
    ),
];

/// Map a discovery intent onto the query that answers it for `dialect`.
///
/// Pairs missing from the table fail with `UnsupportedDialect` instead of
/// falling back to an empty answer.
pub fn resolve(intent: DiscoveryIntent, dialect: Dialect) -> Result<QuerySpec, AppError> {
    RESOLUTIONS
        .iter()
        .find(|(i, d, _)| *i == intent && *d == dialect)
        .map(|(_, _, spec)| *spec)
        .ok_or_else(|| AppError::UnsupportedDialect {
            dialect: dialect.to_string(),
            operation: intent.to_string(),
        })
}

/// `SELECT` of the first `limit` rows of `table`, with the name quoted for the dialect.
///
/// The generated text is parsed back before use and rejected unless it is a
/// single `SELECT`.
pub fn preview_statement(table: &str, dialect: Dialect, limit: u64) -> Result<String, AppError> {
    let sql = render_preview(table, dialect, limit);
    SqlValidator::validate_single_select(&sql, dialect)?;
    Ok(sql)
}

/// The preview text for `table`, not yet validated.
pub fn render_preview(table: &str, dialect: Dialect, limit: u64) -> String {
    let quoted = quote_identifier(table, dialect);
    match dialect {
        Dialect::Mssql => format!("SELECT TOP {} * FROM {}", limit, quoted),
        _ => format!("SELECT * FROM {} LIMIT {}", quoted, limit),
    }
}

/// Quote an identifier, doubling any embedded closing quote character.
pub fn quote_identifier(name: &str, dialect: Dialect) -> String {
    let (open, close) = match dialect {
        Dialect::Mysql | Dialect::Mariadb => ('`', '`'),
        Dialect::Postgres | Dialect::Sqlite => ('"', '"'),
        Dialect::Mssql => ('[', ']'),
    };
    let escaped = name.replace(close, &format!("{close}{close}"));
    format!("{open}{escaped}{close}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_DIALECTS: [Dialect; 5] = [
        Dialect::Mysql,
        Dialect::Mariadb,
        Dialect::Postgres,
        Dialect::Mssql,
        Dialect::Sqlite,
    ];

    #[test]
    fn test_list_databases_mappings() {
        assert_eq!(
            resolve(DiscoveryIntent::ListDatabases, Dialect::Mysql).unwrap(),
            QuerySpec::Literal("SHOW DATABASES")
        );
        assert_eq!(
            resolve(DiscoveryIntent::ListDatabases, Dialect::Mariadb).unwrap(),
            QuerySpec::Literal("SHOW DATABASES")
        );
        assert_eq!(
            resolve(DiscoveryIntent::ListDatabases, Dialect::Postgres).unwrap(),
            QuerySpec::Literal("SELECT datname FROM pg_database WHERE NOT datistemplate")
        );
        assert_eq!(
            resolve(DiscoveryIntent::ListDatabases, Dialect::Mssql).unwrap(),
            QuerySpec::Literal("SELECT * FROM Sys.Databases")
        );
    }

    #[test]
    fn test_list_tables_mappings() {
        for dialect in [Dialect::Mysql, Dialect::Sqlite, Dialect::Mssql, Dialect::Mariadb] {
            assert_eq!(
                resolve(DiscoveryIntent::ListTables, dialect).unwrap(),
                QuerySpec::DriverNative(NativeCall::ShowAllSchemas)
            );
        }
        assert_eq!(
            resolve(DiscoveryIntent::ListTables, Dialect::Postgres).unwrap(),
            QuerySpec::Literal(
                "SELECT table_name FROM information_schema.tables WHERE table_schema='public'"
            )
        );
    }

    #[test]
    fn test_sqlite_has_no_database_listing() {
        let err = resolve(DiscoveryIntent::ListDatabases, Dialect::Sqlite).unwrap_err();
        match err {
            AppError::UnsupportedDialect { dialect, operation } => {
                assert_eq!(dialect, "sqlite");
                assert_eq!(operation, "list databases");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_resolution_is_deterministic_and_non_empty() {
        for intent in [DiscoveryIntent::ListDatabases, DiscoveryIntent::ListTables] {
            for dialect in ALL_DIALECTS {
                let first = resolve(intent, dialect);
                let second = resolve(intent, dialect);
                match (first, second) {
                    (Ok(a), Ok(b)) => {
                        assert_eq!(a, b);
                        if let QuerySpec::Literal(sql) = a {
                            assert!(!sql.trim().is_empty());
                        }
                    }
                    (Err(_), Err(_)) => {
                        assert_eq!((intent, dialect), (DiscoveryIntent::ListDatabases, Dialect::Sqlite));
                    }
                    _ => panic!("resolution changed between calls"),
                }
            }
        }
    }

    #[test]
    fn test_preview_statement_per_dialect() {
        assert_eq!(
            preview_statement("users", Dialect::Mysql, 5).unwrap(),
            "SELECT * FROM `users` LIMIT 5"
        );
        assert_eq!(
            preview_statement("users", Dialect::Postgres, 5).unwrap(),
            "SELECT * FROM \"users\" LIMIT 5"
        );
        assert_eq!(
            preview_statement("users", Dialect::Sqlite, 10).unwrap(),
            "SELECT * FROM \"users\" LIMIT 10"
        );
        assert_eq!(
            preview_statement("users", Dialect::Mssql, 5).unwrap(),
            "SELECT TOP 5 * FROM [users]"
        );
    }

    #[test]
    fn test_identifiers_cannot_break_out_of_quotes() {
        assert_eq!(quote_identifier("a`b", Dialect::Mariadb), "`a``b`");
        assert_eq!(
            quote_identifier("x\"; DROP TABLE y; --", Dialect::Postgres),
            "\"x\"\"; DROP TABLE y; --\""
        );
        assert_eq!(quote_identifier("a\"\"b", Dialect::Sqlite), "\"a\"\"\"\"b\"");
        assert_eq!(quote_identifier("we]ird", Dialect::Mssql), "[we]]ird]");
    }

    #[test]
    fn test_hostile_table_name_still_previews_one_select() {
        let sql = preview_statement("users`; DROP TABLE users; --", Dialect::Mysql, 5).unwrap();
        assert_eq!(sql, "SELECT * FROM `users``; DROP TABLE users; --` LIMIT 5");
    }
}
