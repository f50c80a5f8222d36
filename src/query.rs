use crate::error::{AppError, AppResult};
use crate::ssh::{CommandOutput, SshSession};
use serde_json::{Map, Value};

/// Parsed result of a remote query
#[derive(Debug, Clone)]
pub struct QueryOutput {
    /// One JSON object per row, as emitted by `sqlite3 -json`
    pub rows: Vec<Map<String, Value>>,
    /// Raw stdout of the remote command
    pub raw: String,
}

/// Quote a string for a POSIX shell using single quotes
pub fn shell_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(ch);
        }
    }
    out.push('\'');
    out
}

/// Quote an SQL identifier (table name) with double quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build the remote `sqlite3 -json` invocation for a query
pub fn build_sqlite_command(db_path: &str, sql: &str) -> String {
    format!("sqlite3 -json {} {}", shell_quote(db_path), shell_quote(sql))
}

/// Run a query against a remote database file over the session
pub fn run_query(session: &SshSession, db_path: &str, sql: &str) -> AppResult<QueryOutput> {
    let cmd = build_sqlite_command(db_path, sql);
    tracing::debug!("Running remote query against {}", db_path);

    let output = session.run_command(&cmd)?;
    parse_query_output(output)
}

/// List user tables, the same way the dashboard populated its sidebar
pub fn list_tables(session: &SshSession, db_path: &str) -> AppResult<Vec<String>> {
    let output = run_query(
        session,
        db_path,
        "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name;",
    )?;

    Ok(output
        .rows
        .iter()
        .filter_map(|row| row.get("name").and_then(Value::as_str))
        .map(str::to_string)
        .collect())
}

/// Preview the first rows of a table
pub fn table_preview(
    session: &SshSession,
    db_path: &str,
    table: &str,
    limit: u32,
) -> AppResult<QueryOutput> {
    let sql = format!("SELECT * FROM {} LIMIT {};", quote_ident(table), limit);
    run_query(session, db_path, &sql)
}

/// Interpret the remote command output as a JSON row set
fn parse_query_output(output: CommandOutput) -> AppResult<QueryOutput> {
    if output.exit_status != 0 {
        let stderr = output.stderr.trim();
        if stderr.contains("command not found") || stderr.contains("sqlite3: not found") {
            return Err(AppError::Query(
                "sqlite3 is not installed on the remote host (or not in PATH)".to_string(),
            ));
        }
        return Err(AppError::Query(format!(
            "remote sqlite3 failed (exit {}): {}",
            output.exit_status,
            if stderr.is_empty() { "<no stderr>" } else { stderr }
        )));
    }

    // sqlite3 reports some errors (and warnings) on stderr while still
    // exiting zero; surface those instead of returning partial rows
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return Err(AppError::Query(format!(
            "remote sqlite3 reported: {stderr}"
        )));
    }

    let raw = output.stdout;
    let trimmed = raw.trim();

    // sqlite3 prints nothing at all for an empty result set
    if trimmed.is_empty() {
        return Ok(QueryOutput {
            rows: Vec::new(),
            raw,
        });
    }

    let rows: Vec<Map<String, Value>> = serde_json::from_str(trimmed).map_err(|_| {
        let sample: String = trimmed.chars().take(200).collect();
        AppError::Query(format!("remote output is not a JSON row set: {}", sample))
    })?;

    Ok(QueryOutput { rows, raw })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str, exit_status: i32) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_status,
        }
    }

    #[test]
    fn test_shell_quote_plain() {
        assert_eq!(shell_quote("/var/data/app.db"), "'/var/data/app.db'");
    }

    #[test]
    fn test_shell_quote_embedded_quote() {
        assert_eq!(
            shell_quote("it's"),
            "'it'\\''s'"
        );
    }

    #[test]
    fn test_shell_quote_neutralizes_expansion() {
        let quoted = shell_quote("SELECT `id`, \"$HOME\" FROM t;");
        assert!(quoted.starts_with('\''));
        assert!(quoted.ends_with('\''));
        // everything between the outer quotes is literal
        assert!(quoted.contains("$HOME"));
        assert!(quoted.contains('`'));
    }

    #[test]
    fn test_build_sqlite_command() {
        let cmd = build_sqlite_command("/var/data/app.db", "SELECT * FROM users;");
        assert_eq!(
            cmd,
            "sqlite3 -json '/var/data/app.db' 'SELECT * FROM users;'"
        );
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("od\"d"), "\"od\"\"d\"");
    }

    #[test]
    fn test_parse_rows() {
        let out = parse_query_output(output(
            r#"[{"id":1,"name":"ada"},{"id":2,"name":"linus"}]"#,
            "",
            0,
        ))
        .unwrap();
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.rows[0]["name"], "ada");
    }

    #[test]
    fn test_parse_empty_stdout_is_zero_rows() {
        let out = parse_query_output(output("", "", 0)).unwrap();
        assert!(out.rows.is_empty());
    }

    #[test]
    fn test_parse_nonzero_exit_is_query_error() {
        let err = parse_query_output(output("", "Error: no such table: users", 1)).unwrap_err();
        match err {
            AppError::Query(msg) => assert!(msg.contains("no such table")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_stderr_with_zero_exit_is_query_error() {
        let err = parse_query_output(output(
            "[]",
            "warning: something went wrong remotely",
            0,
        ))
        .unwrap_err();
        match err {
            AppError::Query(msg) => assert!(msg.contains("went wrong remotely")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_missing_sqlite3_is_distinct_error() {
        let err =
            parse_query_output(output("", "bash: sqlite3: command not found", 127)).unwrap_err();
        match err {
            AppError::Query(msg) => assert!(msg.contains("not installed")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_non_json_stdout_is_query_error() {
        let err = parse_query_output(output("id|name\n1|ada\n", "", 0)).unwrap_err();
        match err {
            AppError::Query(msg) => assert!(msg.contains("not a JSON row set")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
