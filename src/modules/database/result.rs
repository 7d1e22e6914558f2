//! Query result materialisation types

use serde::Serialize;
use serde_json::{Map, Value};

/// Materialised result of a single SQL statement.
///
/// SELECT-shaped results carry `columns`/`rows` and an update count of 0;
/// non-SELECT results carry only the update count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub row_count: usize,
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub affected_rows: u64,
}

impl QueryResult {
    pub fn for_select(columns: Vec<String>, rows: Vec<Map<String, Value>>) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            affected_rows: 0,
        }
    }

    pub fn for_update(affected_rows: u64) -> Self {
        Self {
            row_count: 0,
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_shape() {
        let mut row = Map::new();
        row.insert("id".to_string(), json!(1));
        let result = QueryResult::for_select(vec!["id".to_string()], vec![row]);
        assert_eq!(result.row_count, 1);
        assert_eq!(result.affected_rows, 0);

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["rowCount"], json!(1));
        assert_eq!(value["rows"][0]["id"], json!(1));
    }

    #[test]
    fn test_update_shape() {
        let result = QueryResult::for_update(3);
        assert_eq!(result.row_count, 0);
        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());
        assert_eq!(result.affected_rows, 3);
    }
}
