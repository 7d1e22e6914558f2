//! Database module
//!
//! Tools for interacting with SQL databases: connection lifecycle,
//! parameterised queries, transactions, DDL/DML helpers, introspection, and
//! pool metrics. Supports SQLite, MySQL, and PostgreSQL.

pub mod config;
pub mod executor;
pub mod manager;
pub mod result;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::config::Config;
use crate::error::{DataMcpError, DomainError, Result};
use crate::mcp::dispatch::{handler, ToolSpec};
use crate::mcp::types::CallToolResult;
use crate::modules::{parse_args, Module, ModuleConfig};

use self::config::DatabaseConfig;
use self::executor::{truncate_query, ColumnDefinition, QueryWithParams};
use self::manager::{ConnectionManager, PoolSettings};

const MODULE_NAME: &str = "database-module";
const MODULE_VERSION: &str = "1.0.0";
const MODULE_DESCRIPTION: &str =
    "A set of database interaction tools supporting SQLite, MySQL, and PostgreSQL.";

const DEFAULT_QUERY_LIMIT: usize = 1000;

pub struct DatabaseModule {
    manager: Arc<ConnectionManager>,
}

impl DatabaseModule {
    pub fn new(config: &Config) -> Self {
        Self {
            manager: Arc::new(ConnectionManager::new(PoolSettings::from_config(config))),
        }
    }

    /// The connection manager, shared with the startup orchestrator for
    /// shutdown.
    pub fn connection_manager(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.manager)
    }
}

impl Module for DatabaseModule {
    fn config(&self) -> ModuleConfig {
        ModuleConfig::new(MODULE_NAME, MODULE_VERSION, MODULE_DESCRIPTION)
    }

    fn tools(&self) -> Vec<ToolSpec> {
        let m = &self.manager;
        vec![
            connect_database_tool(m),
            disconnect_database_tool(m),
            execute_query_tool(m),
            execute_transaction_tool(m),
            list_tables_tool(m),
            get_table_schema_tool(m),
            get_database_metrics_tool(m),
            insert_data_tool(m),
            update_data_tool(m),
            delete_data_tool(m),
            create_table_tool(m),
            drop_table_tool(m),
            alter_table_tool(m),
        ]
    }
}

// Tool definitions

fn connect_database_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "connect_database",
        "Connect to a SQL database (SQLite, MySQL, or PostgreSQL) with connection pooling",
        connect_database_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                    config: Value,
                }

                let args: Args = parse_args(args)?;
                let config = DatabaseConfig::from_args(&args.config)?;
                let db_type = config.db_type();
                manager.connect(&args.connection_id, config).await?;
                Ok(CallToolResult::text(format!(
                    "Successfully connected to {} database: {}",
                    db_type, args.connection_id
                )))
            }
        }),
    )
}

fn disconnect_database_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "disconnect_database",
        "Disconnect from a previously connected database",
        connection_only_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                }

                let args: Args = parse_args(args)?;
                manager.disconnect(&args.connection_id).await;
                Ok(CallToolResult::text(format!(
                    "Successfully disconnected from database: {}",
                    args.connection_id
                )))
            }
        }),
    )
}

fn execute_query_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "execute_query",
        "Execute a SQL query against a connected database",
        execute_query_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                    query: String,
                    #[serde(default)]
                    params: Vec<Value>,
                    #[serde(default = "default_limit")]
                    limit: usize,
                }

                let args: Args = parse_args(args)?;
                let result = manager
                    .execute_query(&args.connection_id, &args.query, &args.params, args.limit)
                    .await?;

                let response = json!({
                    "rowCount": result.row_count,
                    "columns": result.columns,
                    "rows": result.rows,
                    "affectedRows": result.affected_rows,
                    "query": truncate_query(&args.query),
                });
                Ok(CallToolResult::text(pretty(&response)?))
            }
        }),
    )
}

fn execute_transaction_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "execute_transaction",
        "Execute multiple SQL statements as a transaction with automatic rollback on failure",
        execute_transaction_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                    queries: Vec<QueryWithParams>,
                }

                let args: Args = parse_args(args)?;
                let results = manager
                    .execute_transaction(&args.connection_id, &args.queries)
                    .await?;

                let result_list: Vec<Value> = results
                    .iter()
                    .enumerate()
                    .map(|(index, result)| {
                        json!({
                            "queryIndex": index,
                            "rowCount": result.row_count,
                            "affectedRows": result.affected_rows,
                        })
                    })
                    .collect();

                let response = json!({
                    "transactionComplete": true,
                    "queryCount": args.queries.len(),
                    "results": result_list,
                });
                Ok(CallToolResult::text(pretty(&response)?))
            }
        }),
    )
}

fn list_tables_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "list_tables",
        "List all tables in the connected database",
        connection_only_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                }

                let args: Args = parse_args(args)?;
                let tables = manager.list_tables(&args.connection_id).await?;

                let response = json!({
                    "tableCount": tables.len(),
                    "tables": tables,
                });
                Ok(CallToolResult::text(pretty(&response)?))
            }
        }),
    )
}

fn get_table_schema_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "get_table_schema",
        "Get detailed schema information for a specific table including primary keys and constraints",
        get_table_schema_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                    table_name: String,
                }

                let args: Args = parse_args(args)?;
                let columns = manager
                    .get_table_schema(&args.connection_id, &args.table_name)
                    .await?;

                let response = json!({
                    "tableName": args.table_name,
                    "columns": columns,
                });
                Ok(CallToolResult::text(pretty(&response)?))
            }
        }),
    )
}

fn get_database_metrics_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "get_database_metrics",
        "Get performance metrics for database connections including query counts and pool statistics",
        metrics_schema(),
        handler(move |_args| {
            let manager = Arc::clone(&manager);
            async move {
                let metrics = manager.metrics();
                Ok(CallToolResult::text(pretty(&serde_json::to_value(metrics)?)?))
            }
        }),
    )
}

fn insert_data_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "insert_data",
        "Insert new data into a specified table",
        insert_data_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                    table_name: String,
                    data: Map<String, Value>,
                }

                let args: Args = parse_args(args)?;
                let affected_rows = manager
                    .insert_data(&args.connection_id, &args.table_name, &args.data)
                    .await?;

                let response = json!({
                    "tableName": args.table_name,
                    "affectedRows": affected_rows,
                });
                Ok(CallToolResult::text(pretty(&response)?))
            }
        }),
    )
}

fn update_data_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "update_data",
        "Update existing data in a specified table",
        update_data_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                    table_name: String,
                    data: Map<String, Value>,
                    #[serde(rename = "where", default)]
                    where_clause: String,
                    #[serde(default)]
                    params: Vec<Value>,
                }

                let args: Args = parse_args(args)?;
                let affected_rows = manager
                    .update_data(
                        &args.connection_id,
                        &args.table_name,
                        &args.data,
                        &args.where_clause,
                        &args.params,
                    )
                    .await?;

                let response = json!({
                    "tableName": args.table_name,
                    "affectedRows": affected_rows,
                });
                Ok(CallToolResult::text(pretty(&response)?))
            }
        }),
    )
}

fn delete_data_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "delete_data",
        "Delete data from a specified table",
        delete_data_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                    table_name: String,
                    #[serde(rename = "where", default)]
                    where_clause: String,
                    #[serde(default)]
                    params: Vec<Value>,
                }

                let args: Args = parse_args(args)?;
                let affected_rows = manager
                    .delete_data(
                        &args.connection_id,
                        &args.table_name,
                        &args.where_clause,
                        &args.params,
                    )
                    .await?;

                let response = json!({
                    "tableName": args.table_name,
                    "affectedRows": affected_rows,
                });
                Ok(CallToolResult::text(pretty(&response)?))
            }
        }),
    )
}

fn create_table_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "create_table",
        "Create a new table in the database",
        create_table_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                    table_name: String,
                    columns: Vec<ColumnDefinition>,
                }

                let args: Args = parse_args(args)?;
                manager
                    .create_table(&args.connection_id, &args.table_name, &args.columns)
                    .await?;
                Ok(CallToolResult::text(format!(
                    "Table '{}' created successfully.",
                    args.table_name
                )))
            }
        }),
    )
}

fn drop_table_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "drop_table",
        "Drop an existing table from the database",
        drop_table_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                    table_name: String,
                }

                let args: Args = parse_args(args)?;
                manager.drop_table(&args.connection_id, &args.table_name).await?;
                Ok(CallToolResult::text(format!(
                    "Table '{}' dropped successfully.",
                    args.table_name
                )))
            }
        }),
    )
}

fn alter_table_tool(manager: &Arc<ConnectionManager>) -> ToolSpec {
    let manager = Arc::clone(manager);
    ToolSpec::new(
        "alter_table",
        "Alter an existing table (add or drop columns)",
        alter_table_schema(),
        handler(move |args| {
            let manager = Arc::clone(&manager);
            async move {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct Args {
                    connection_id: String,
                    table_name: String,
                    action: String,
                    column_definition: Option<ColumnDefinition>,
                    column_name: Option<String>,
                }

                let args: Args = parse_args(args)?;
                match args.action.to_lowercase().as_str() {
                    "add_column" => {
                        let column = args.column_definition.ok_or_else(|| {
                            DataMcpError::Domain(DomainError::InvalidAlterAction {
                                action: "add_column requires columnDefinition".to_string(),
                            })
                        })?;
                        manager
                            .add_column(&args.connection_id, &args.table_name, &column)
                            .await?;
                        Ok(CallToolResult::text(format!(
                            "Column added to table '{}' successfully.",
                            args.table_name
                        )))
                    }
                    "drop_column" => {
                        let column_name = args.column_name.ok_or_else(|| {
                            DataMcpError::Domain(DomainError::InvalidAlterAction {
                                action: "drop_column requires columnName".to_string(),
                            })
                        })?;
                        manager
                            .drop_column(&args.connection_id, &args.table_name, &column_name)
                            .await?;
                        Ok(CallToolResult::text(format!(
                            "Column dropped from table '{}' successfully.",
                            args.table_name
                        )))
                    }
                    other => Err(DataMcpError::Domain(DomainError::InvalidAlterAction {
                        action: other.to_string(),
                    })),
                }
            }
        }),
    )
}

fn default_limit() -> usize {
    DEFAULT_QUERY_LIMIT
}

fn pretty(value: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

// JSON Schemas (Draft-07)

fn connection_id_property() -> Value {
    json!({
        "type": "string",
        "description": "Database connection identifier"
    })
}

fn connect_database_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": {
                "type": "string",
                "description": "Unique identifier for this database connection",
                "pattern": "^[A-Za-z0-9_-]+$"
            },
            "config": {
                "type": "object",
                "description": "Database configuration",
                "properties": {
                    "type": {
                        "type": "string",
                        "enum": ["sqlite", "mysql", "postgresql"],
                        "description": "Database type"
                    },
                    "file": {
                        "type": "string",
                        "description": "SQLite database file path"
                    },
                    "host": {
                        "type": "string",
                        "description": "Database host",
                        "default": "localhost"
                    },
                    "port": {
                        "type": "integer",
                        "description": "Database port"
                    },
                    "database": {
                        "type": "string",
                        "description": "Database name"
                    },
                    "username": {
                        "type": "string",
                        "description": "Database username"
                    },
                    "password": {
                        "type": "string",
                        "description": "Database password"
                    }
                },
                "required": ["type"]
            }
        },
        "required": ["connectionId", "config"]
    })
}

fn connection_only_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": connection_id_property()
        },
        "required": ["connectionId"]
    })
}

fn execute_query_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": connection_id_property(),
            "query": {
                "type": "string",
                "description": "SQL query to execute",
                "minLength": 1
            },
            "params": {
                "type": "array",
                "description": "Query parameters for prepared statements",
                "items": {"type": "string"}
            },
            "limit": {
                "type": "integer",
                "description": "Maximum rows to return",
                "minimum": 1,
                "maximum": 10000,
                "default": 1000
            }
        },
        "required": ["connectionId", "query"]
    })
}

fn execute_transaction_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": connection_id_property(),
            "queries": {
                "type": "array",
                "description": "Array of queries to execute in transaction",
                "minItems": 1,
                "maxItems": 100,
                "items": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "SQL query"
                        },
                        "params": {
                            "type": "array",
                            "description": "Query parameters",
                            "items": {"type": "string"}
                        }
                    },
                    "required": ["query"]
                }
            }
        },
        "required": ["connectionId", "queries"]
    })
}

fn get_table_schema_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": connection_id_property(),
            "tableName": {
                "type": "string",
                "description": "Name of the table to describe",
                "minLength": 1
            }
        },
        "required": ["connectionId", "tableName"]
    })
}

fn metrics_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "description": "Get database performance metrics"
    })
}

fn insert_data_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": connection_id_property(),
            "tableName": {
                "type": "string",
                "description": "Name of the table to insert into",
                "minLength": 1
            },
            "data": {
                "type": "object",
                "description": "Column name to value map",
                "minProperties": 1
            }
        },
        "required": ["connectionId", "tableName", "data"]
    })
}

fn update_data_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": connection_id_property(),
            "tableName": {
                "type": "string",
                "description": "Name of the table to update",
                "minLength": 1
            },
            "data": {
                "type": "object",
                "description": "Column name to new value map",
                "minProperties": 1
            },
            "where": {
                "type": "string",
                "description": "WHERE clause to filter rows (without the WHERE keyword)"
            },
            "params": {
                "type": "array",
                "description": "Parameters for the WHERE clause",
                "items": {"type": "string"}
            }
        },
        "required": ["connectionId", "tableName", "data"]
    })
}

fn delete_data_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": connection_id_property(),
            "tableName": {
                "type": "string",
                "description": "Name of the table to delete from",
                "minLength": 1
            },
            "where": {
                "type": "string",
                "description": "WHERE clause to filter rows (without the WHERE keyword)"
            },
            "params": {
                "type": "array",
                "description": "Parameters for the WHERE clause",
                "items": {"type": "string"}
            }
        },
        "required": ["connectionId", "tableName"]
    })
}

fn column_definition_property() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string", "description": "Column name"},
            "type": {"type": "string", "description": "Column SQL type"},
            "primaryKey": {"type": "boolean", "description": "Whether this column is the primary key"},
            "notNull": {"type": "boolean", "description": "Whether this column is NOT NULL"},
            "defaultValue": {"description": "Default value literal"}
        },
        "required": ["name", "type"]
    })
}

fn create_table_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": connection_id_property(),
            "tableName": {
                "type": "string",
                "description": "Name of the table to create",
                "minLength": 1
            },
            "columns": {
                "type": "array",
                "description": "Column definitions",
                "minItems": 1,
                "items": column_definition_property()
            }
        },
        "required": ["connectionId", "tableName", "columns"]
    })
}

fn drop_table_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": connection_id_property(),
            "tableName": {
                "type": "string",
                "description": "Name of the table to drop",
                "minLength": 1
            }
        },
        "required": ["connectionId", "tableName"]
    })
}

fn alter_table_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "connectionId": connection_id_property(),
            "tableName": {
                "type": "string",
                "description": "Name of the table to alter",
                "minLength": 1
            },
            "action": {
                "type": "string",
                "enum": ["add_column", "drop_column"],
                "description": "Alteration to perform"
            },
            "columnDefinition": column_definition_property(),
            "columnName": {
                "type": "string",
                "description": "Name of the column to drop"
            }
        },
        "required": ["connectionId", "tableName", "action"],
        "oneOf": [
            {
                "properties": {"action": {"const": "add_column"}},
                "required": ["columnDefinition"]
            },
            {
                "properties": {"action": {"const": "drop_column"}},
                "required": ["columnName"]
            }
        ]
    })
}
