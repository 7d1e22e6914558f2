//! Query and transaction execution
//!
//! Parameterised statement execution against pooled connections, bounded
//! result materialisation, transaction handling with rollback on failure,
//! structured DDL/DML statement generation, and schema introspection.

use std::time::Instant;

use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Column, Either, Executor, Row, ValueRef};
use tracing::{debug, error, warn};

use crate::error::{DataMcpError, DomainError, ResourceError, Result};
use crate::modules::database::config::DatabaseConfig;
use crate::modules::database::manager::ConnectionManager;
use crate::modules::database::result::QueryResult;

/// Row cap for SELECT statements inside a transaction
const TRANSACTION_ROW_LIMIT: usize = 1000;

/// Query text length kept in log entries
const LOG_QUERY_LIMIT: usize = 100;

/// One statement of a transaction
#[derive(Debug, Clone, Deserialize)]
pub struct QueryWithParams {
    pub query: String,
    #[serde(default)]
    pub params: Vec<Value>,
}

/// Structured column definition for DDL generation
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub not_null: bool,
    pub default_value: Option<Value>,
}

/// Table metadata entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub table_type: String,
    pub schema: Option<String>,
    pub catalog: Option<String>,
    pub remarks: Option<String>,
}

/// Column metadata entry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub size: i64,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub precision: i64,
    pub scale: i64,
    pub auto_increment: bool,
    pub is_primary_key: bool,
}

/// Placeholder syntax of the underlying driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamStyle {
    Question,
    Dollar,
}

impl ParamStyle {
    fn of(config: &DatabaseConfig) -> Self {
        match config {
            DatabaseConfig::Postgresql(_) => Self::Dollar,
            _ => Self::Question,
        }
    }

    fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Question => "?".to_string(),
            Self::Dollar => format!("${index}"),
        }
    }
}

impl ConnectionManager {
    /// Execute one parameterised statement, materialising at most `limit`
    /// rows for SELECT-shaped results.
    pub async fn execute_query(
        &self,
        connection_id: &str,
        query: &str,
        params: &[Value],
        limit: usize,
    ) -> Result<QueryResult> {
        let start = Instant::now();
        self.count_query();
        let (config, pool) = self.entry(connection_id)?;

        self.run_tracked(&config, &pool, connection_id, query, params, limit, start)
            .await
    }

    /// Execute an ordered sequence of statements on one connection. Either
    /// every statement commits or none does; the rollback always precedes
    /// error propagation.
    pub async fn execute_transaction(
        &self,
        connection_id: &str,
        queries: &[QueryWithParams],
    ) -> Result<Vec<QueryResult>> {
        let start = Instant::now();
        self.count_query();
        let (config, pool) = self.entry(connection_id)?;

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| wrap_db_error(&config, connection_id, &e))?;

        let mut results = Vec::with_capacity(queries.len());
        let mut failure: Option<String> = None;

        for item in queries {
            if let Err(err) = validate_query(&item.query) {
                failure = Some(err.to_string());
                break;
            }
            match run_statement(&mut *tx, &item.query, &item.params, TRANSACTION_ROW_LIMIT).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    failure = Some(err.to_string());
                    break;
                }
            }
        }

        match failure {
            None => {
                tx.commit()
                    .await
                    .map_err(|e| wrap_db_error(&config, connection_id, &e))?;
                debug!(
                    connection_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    query_count = queries.len(),
                    "Transaction executed successfully"
                );
                Ok(results)
            }
            Some(cause) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(connection_id, error = %rollback_err, "Transaction rollback failed");
                }
                self.count_error();
                error!(
                    connection_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    query_count = queries.len(),
                    error = %cause,
                    "Transaction execution failed"
                );
                Err(wrap_db_error(&config, connection_id, &cause))
            }
        }
    }

    /// Insert a column → value map into a table.
    pub async fn insert_data(
        &self,
        connection_id: &str,
        table_name: &str,
        data: &Map<String, Value>,
    ) -> Result<u64> {
        let start = Instant::now();
        self.count_query();
        let (config, pool) = self.entry(connection_id)?;

        if data.is_empty() {
            return Err(DataMcpError::Domain(DomainError::EmptyInsertData));
        }

        let (sql, params) = build_insert(table_name, data, ParamStyle::of(&config));
        let result = self
            .run_tracked(&config, &pool, connection_id, &sql, &params, 1, start)
            .await?;
        Ok(result.affected_rows)
    }

    /// Update rows matching an optional WHERE clause.
    pub async fn update_data(
        &self,
        connection_id: &str,
        table_name: &str,
        data: &Map<String, Value>,
        where_clause: &str,
        where_params: &[Value],
    ) -> Result<u64> {
        let start = Instant::now();
        self.count_query();
        let (config, pool) = self.entry(connection_id)?;

        if data.is_empty() {
            return Err(DataMcpError::Domain(DomainError::EmptyUpdateData));
        }

        let (sql, mut params) = build_update(table_name, data, where_clause, ParamStyle::of(&config));
        params.extend_from_slice(where_params);
        let result = self
            .run_tracked(&config, &pool, connection_id, &sql, &params, 1, start)
            .await?;
        Ok(result.affected_rows)
    }

    /// Delete rows matching an optional WHERE clause.
    pub async fn delete_data(
        &self,
        connection_id: &str,
        table_name: &str,
        where_clause: &str,
        where_params: &[Value],
    ) -> Result<u64> {
        let start = Instant::now();
        self.count_query();
        let (config, pool) = self.entry(connection_id)?;

        let sql = build_delete(table_name, where_clause);
        let result = self
            .run_tracked(&config, &pool, connection_id, &sql, where_params, 1, start)
            .await?;
        Ok(result.affected_rows)
    }

    /// Create a table from structured column definitions.
    pub async fn create_table(
        &self,
        connection_id: &str,
        table_name: &str,
        columns: &[ColumnDefinition],
    ) -> Result<()> {
        let start = Instant::now();
        self.count_query();
        let (config, pool) = self.entry(connection_id)?;

        if columns.is_empty() {
            return Err(DataMcpError::Domain(DomainError::EmptyColumns));
        }

        let sql = build_create_table(table_name, columns);
        self.run_tracked(&config, &pool, connection_id, &sql, &[], 1, start)
            .await?;
        Ok(())
    }

    pub async fn drop_table(&self, connection_id: &str, table_name: &str) -> Result<()> {
        let start = Instant::now();
        self.count_query();
        let (config, pool) = self.entry(connection_id)?;

        let sql = format!("DROP TABLE {table_name}");
        self.run_tracked(&config, &pool, connection_id, &sql, &[], 1, start)
            .await?;
        Ok(())
    }

    pub async fn add_column(
        &self,
        connection_id: &str,
        table_name: &str,
        column: &ColumnDefinition,
    ) -> Result<()> {
        let start = Instant::now();
        self.count_query();
        let (config, pool) = self.entry(connection_id)?;

        let sql = format!(
            "ALTER TABLE {table_name} ADD COLUMN {}",
            render_column(column, false)
        );
        self.run_tracked(&config, &pool, connection_id, &sql, &[], 1, start)
            .await?;
        Ok(())
    }

    pub async fn drop_column(
        &self,
        connection_id: &str,
        table_name: &str,
        column_name: &str,
    ) -> Result<()> {
        let start = Instant::now();
        self.count_query();
        let (config, pool) = self.entry(connection_id)?;

        let sql = format!("ALTER TABLE {table_name} DROP COLUMN {column_name}");
        self.run_tracked(&config, &pool, connection_id, &sql, &[], 1, start)
            .await?;
        Ok(())
    }

    /// Enumerate base tables with their metadata.
    pub async fn list_tables(&self, connection_id: &str) -> Result<Vec<TableInfo>> {
        let (config, pool) = self.entry(connection_id)?;

        let result = match &config {
            DatabaseConfig::Sqlite { .. } => {
                let sql = "SELECT name FROM sqlite_master \
                           WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";
                run_statement(&pool, sql, &[], usize::MAX).await?
            }
            DatabaseConfig::Mysql(server) => {
                let sql = "SELECT table_name AS name, table_schema AS table_schema, \
                           table_comment AS remarks \
                           FROM information_schema.tables \
                           WHERE table_schema = ? AND table_type = 'BASE TABLE' \
                           ORDER BY table_name";
                let params = vec![Value::String(server.database.clone())];
                run_statement(&pool, sql, &params, usize::MAX).await?
            }
            DatabaseConfig::Postgresql(_) => {
                let sql = "SELECT table_name AS name, table_schema AS table_schema \
                           FROM information_schema.tables \
                           WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
                           ORDER BY table_name";
                run_statement(&pool, sql, &[], usize::MAX).await?
            }
        };

        let catalog = config.database_name().map(str::to_string);
        Ok(result
            .rows
            .iter()
            .map(|row| TableInfo {
                name: row_string(row, "name").unwrap_or_default(),
                table_type: "TABLE".to_string(),
                schema: row_string(row, "table_schema"),
                catalog: catalog.clone(),
                remarks: row_string(row, "remarks"),
            })
            .collect())
    }

    /// Column metadata for one table, with primary-key flags resolved.
    pub async fn get_table_schema(
        &self,
        connection_id: &str,
        table_name: &str,
    ) -> Result<Vec<ColumnInfo>> {
        let (config, pool) = self.entry(connection_id)?;

        match &config {
            DatabaseConfig::Sqlite { .. } => {
                let sql = format!("PRAGMA table_info({table_name})");
                let result = run_statement(&pool, &sql, &[], usize::MAX).await?;
                Ok(result.rows.iter().map(sqlite_column).collect())
            }
            DatabaseConfig::Mysql(server) => {
                let sql = "SELECT column_name AS name, data_type AS type, \
                           character_maximum_length AS size, is_nullable AS nullable, \
                           column_default AS default_value, numeric_precision AS num_precision, \
                           numeric_scale AS num_scale, extra AS extra, column_key AS column_key \
                           FROM information_schema.columns \
                           WHERE table_schema = ? AND table_name = ? \
                           ORDER BY ordinal_position";
                let params = vec![
                    Value::String(server.database.clone()),
                    Value::String(table_name.to_string()),
                ];
                let result = run_statement(&pool, sql, &params, usize::MAX).await?;
                Ok(result.rows.iter().map(mysql_column).collect())
            }
            DatabaseConfig::Postgresql(_) => {
                let sql = "SELECT column_name AS name, data_type AS type, \
                           character_maximum_length AS size, is_nullable AS nullable, \
                           column_default AS default_value, numeric_precision AS num_precision, \
                           numeric_scale AS num_scale \
                           FROM information_schema.columns \
                           WHERE table_schema = 'public' AND table_name = $1 \
                           ORDER BY ordinal_position";
                let params = vec![Value::String(table_name.to_string())];
                let result = run_statement(&pool, sql, &params, usize::MAX).await?;

                let pk_sql = "SELECT kcu.column_name AS name \
                              FROM information_schema.table_constraints tc \
                              JOIN information_schema.key_column_usage kcu \
                                ON tc.constraint_name = kcu.constraint_name \
                               AND tc.table_schema = kcu.table_schema \
                              WHERE tc.constraint_type = 'PRIMARY KEY' \
                                AND tc.table_schema = 'public' AND tc.table_name = $1";
                let pk_result = run_statement(&pool, pk_sql, &params, usize::MAX).await?;
                let primary_keys: Vec<String> = pk_result
                    .rows
                    .iter()
                    .filter_map(|row| row_string(row, "name"))
                    .collect();

                Ok(result
                    .rows
                    .iter()
                    .map(|row| postgres_column(row, &primary_keys))
                    .collect())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_tracked(
        &self,
        config: &DatabaseConfig,
        pool: &sqlx::AnyPool,
        connection_id: &str,
        sql: &str,
        params: &[Value],
        limit: usize,
        start: Instant,
    ) -> Result<QueryResult> {
        if let Err(err) = validate_query(sql) {
            self.count_error();
            log_query_error(connection_id, sql, start, &err);
            return Err(wrap_db_error(config, connection_id, &err));
        }

        match run_statement(pool, sql, params, limit).await {
            Ok(result) => {
                let count = if result.rows.is_empty() {
                    result.affected_rows as usize
                } else {
                    result.row_count
                };
                log_query_success(connection_id, sql, start, count);
                Ok(result)
            }
            Err(err) => {
                self.count_error();
                log_query_error(connection_id, sql, start, &err);
                Err(wrap_db_error(config, connection_id, &err))
            }
        }
    }
}

/// Execute one statement against any executor (pool or open transaction),
/// collecting at most `limit` rows.
async fn run_statement<'c, E>(
    executor: E,
    sql: &str,
    params: &[Value],
    limit: usize,
) -> std::result::Result<QueryResult, sqlx::Error>
where
    E: Executor<'c, Database = sqlx::Any>,
{
    let mut query = sqlx::query(sql);
    for param in params {
        query = bind_value(query, param);
    }

    let mut stream = query.fetch_many(executor);
    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Map<String, Value>> = Vec::new();
    let mut affected: u64 = 0;
    let mut saw_rows = false;

    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(done) => affected += done.rows_affected(),
            Either::Right(row) => {
                saw_rows = true;
                if columns.is_empty() {
                    columns = row.columns().iter().map(|c| c.name().to_string()).collect();
                }
                if rows.len() < limit {
                    rows.push(row_to_json(&row, &columns)?);
                }
                if rows.len() >= limit {
                    break;
                }
            }
        }
    }

    if saw_rows {
        Ok(QueryResult::for_select(columns, rows))
    } else {
        Ok(QueryResult::for_update(affected))
    }
}

type AnyQuery<'q> = Query<'q, sqlx::Any, AnyArguments<'q>>;

/// Bind one JSON parameter with a type-dispatched setter.
fn bind_value<'q>(query: AnyQuery<'q>, value: &'q Value) -> AnyQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else {
                query.bind(n.as_f64().unwrap_or_default())
            }
        }
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other.to_string()),
    }
}

/// Decode one column position into a JSON value. The Any driver reports
/// exactly one of null/bool/int/float/text/blob per value.
fn column_value(row: &AnyRow, index: usize) -> std::result::Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }
    if let Ok(v) = row.try_get::<i64, _>(index) {
        return Ok(Value::from(v));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(serde_json::Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Ok(Value::Bool(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(Value::String(v));
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(index) {
        use base64::Engine;
        return Ok(Value::String(base64::engine::general_purpose::STANDARD.encode(v)));
    }
    Ok(Value::Null)
}

fn row_to_json(
    row: &AnyRow,
    columns: &[String],
) -> std::result::Result<Map<String, Value>, sqlx::Error> {
    let mut map = Map::new();
    for (index, name) in columns.iter().enumerate() {
        map.insert(name.clone(), column_value(row, index)?);
    }
    Ok(map)
}

/// Reject empty queries; WARN (without rejecting) on statements that look
/// destructive. The dedicated DDL tools pass through this warning.
fn validate_query(query: &str) -> std::result::Result<(), DomainError> {
    if query.trim().is_empty() {
        return Err(DomainError::EmptyQuery);
    }

    let upper = query.to_uppercase();
    if ["DROP ", "TRUNCATE ", "ALTER ", "CREATE "]
        .iter()
        .any(|hazard| upper.contains(hazard))
    {
        warn!(query = %truncate_query(query), "Potentially dangerous SQL operation detected");
    }
    Ok(())
}

pub(crate) fn truncate_query(query: &str) -> String {
    if query.chars().count() > LOG_QUERY_LIMIT {
        let head: String = query.chars().take(LOG_QUERY_LIMIT).collect();
        format!("{head}...")
    } else {
        query.to_string()
    }
}

fn wrap_db_error(
    config: &DatabaseConfig,
    connection_id: &str,
    cause: &dyn std::fmt::Display,
) -> DataMcpError {
    DataMcpError::Resource(ResourceError::DatabaseOperation {
        db_type: config.db_type().to_string(),
        connection_id: connection_id.to_string(),
        cause: cause.to_string(),
    })
}

fn log_query_success(connection_id: &str, query: &str, start: Instant, result_count: usize) {
    debug!(
        connection_id,
        duration_ms = start.elapsed().as_millis() as u64,
        result_count,
        query = %truncate_query(query),
        "Query executed successfully"
    );
}

fn log_query_error(connection_id: &str, query: &str, start: Instant, err: &dyn std::fmt::Display) {
    error!(
        connection_id,
        duration_ms = start.elapsed().as_millis() as u64,
        error = %err,
        query = %truncate_query(query),
        "Query execution failed"
    );
}

// Statement generation

fn build_insert(
    table: &str,
    data: &Map<String, Value>,
    style: ParamStyle,
) -> (String, Vec<Value>) {
    let mut columns = Vec::with_capacity(data.len());
    let mut placeholders = Vec::with_capacity(data.len());
    let mut params = Vec::with_capacity(data.len());

    for (index, (column, value)) in data.iter().enumerate() {
        columns.push(column.clone());
        placeholders.push(style.placeholder(index + 1));
        params.push(value.clone());
    }

    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );
    (sql, params)
}

fn build_update(
    table: &str,
    data: &Map<String, Value>,
    where_clause: &str,
    style: ParamStyle,
) -> (String, Vec<Value>) {
    let mut assignments = Vec::with_capacity(data.len());
    let mut params = Vec::with_capacity(data.len());

    for (index, (column, value)) in data.iter().enumerate() {
        assignments.push(format!("{column} = {}", style.placeholder(index + 1)));
        params.push(value.clone());
    }

    let sql = if where_clause.trim().is_empty() {
        format!("UPDATE {table} SET {}", assignments.join(", "))
    } else {
        format!("UPDATE {table} SET {} WHERE {where_clause}", assignments.join(", "))
    };
    (sql, params)
}

fn build_delete(table: &str, where_clause: &str) -> String {
    if where_clause.trim().is_empty() {
        format!("DELETE FROM {table}")
    } else {
        format!("DELETE FROM {table} WHERE {where_clause}")
    }
}

fn build_create_table(table: &str, columns: &[ColumnDefinition]) -> String {
    let definitions: Vec<String> = columns.iter().map(|c| render_column(c, true)).collect();
    format!("CREATE TABLE {table} ({})", definitions.join(", "))
}

/// Render one column definition, appending PRIMARY KEY, NOT NULL, and
/// DEFAULT in that order when present.
fn render_column(column: &ColumnDefinition, include_primary_key: bool) -> String {
    let mut definition = format!("{} {}", column.name, column.column_type);
    if include_primary_key && column.primary_key {
        definition.push_str(" PRIMARY KEY");
    }
    if column.not_null {
        definition.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default_value {
        definition.push_str(" DEFAULT ");
        definition.push_str(&default_literal(default));
    }
    definition
}

fn default_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Metadata row mapping

fn row_string(row: &Map<String, Value>, key: &str) -> Option<String> {
    match row.get(key) {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn row_i64(row: &Map<String, Value>, key: &str) -> i64 {
    row.get(key).and_then(Value::as_i64).unwrap_or_default()
}

fn sqlite_column(row: &Map<String, Value>) -> ColumnInfo {
    let column_type = row_string(row, "type").unwrap_or_default();
    let is_primary_key = row_i64(row, "pk") > 0;
    ColumnInfo {
        name: row_string(row, "name").unwrap_or_default(),
        auto_increment: is_primary_key && column_type.eq_ignore_ascii_case("INTEGER"),
        column_type,
        size: 0,
        nullable: row_i64(row, "notnull") == 0 && !is_primary_key,
        default_value: row_string(row, "dflt_value"),
        precision: 0,
        scale: 0,
        is_primary_key,
    }
}

fn mysql_column(row: &Map<String, Value>) -> ColumnInfo {
    ColumnInfo {
        name: row_string(row, "name").unwrap_or_default(),
        column_type: row_string(row, "type").unwrap_or_default(),
        size: row_i64(row, "size"),
        nullable: row_string(row, "nullable").as_deref() == Some("YES"),
        default_value: row_string(row, "default_value"),
        precision: row_i64(row, "num_precision"),
        scale: row_i64(row, "num_scale"),
        auto_increment: row_string(row, "extra")
            .map(|extra| extra.contains("auto_increment"))
            .unwrap_or(false),
        is_primary_key: row_string(row, "column_key").as_deref() == Some("PRI"),
    }
}

fn postgres_column(row: &Map<String, Value>, primary_keys: &[String]) -> ColumnInfo {
    let name = row_string(row, "name").unwrap_or_default();
    ColumnInfo {
        is_primary_key: primary_keys.contains(&name),
        column_type: row_string(row, "type").unwrap_or_default(),
        size: row_i64(row, "size"),
        nullable: row_string(row, "nullable").as_deref() == Some("YES"),
        auto_increment: row_string(row, "default_value")
            .map(|default| default.starts_with("nextval("))
            .unwrap_or(false),
        default_value: row_string(row, "default_value"),
        precision: row_i64(row, "num_precision"),
        scale: row_i64(row, "num_scale"),
        name,
    }
}
