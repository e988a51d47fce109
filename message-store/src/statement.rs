//! Statement helpers over sqlx: insert, update and delete by field map, and a
//! small select builder. Values are always bound; only table/column names and
//! where clauses written by this crate are interpolated.

use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};
use sqlx::{Executor, Row};

use crate::error::Result;
use crate::mapper::{Entity, FieldMap, FieldValue};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &FieldValue) -> SqliteQuery<'q> {
    match value {
        FieldValue::Text(v) => query.bind(v.clone()),
        FieldValue::Integer(v) => query.bind(*v),
    }
}

fn bind_all<'q, 'v>(
    mut query: SqliteQuery<'q>,
    values: impl IntoIterator<Item = &'v FieldValue>,
) -> SqliteQuery<'q> {
    for value in values {
        query = bind_value(query, value);
    }
    query
}

pub(crate) fn insert_sql(table: &str, fields: &FieldMap) -> String {
    let columns: Vec<_> = fields.columns().collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders
    )
}

pub(crate) fn update_sql(table: &str, fields: &FieldMap, where_clause: &str) -> String {
    let assignments: Vec<_> = fields.columns().map(|c| format!("{} = ?", c)).collect();
    format!(
        "UPDATE {} SET {} WHERE {}",
        table,
        assignments.join(", "),
        where_clause
    )
}

/// Inserts one row. Returns the number of rows written.
pub async fn execute_insert<'e, E>(executor: E, table: &str, fields: &FieldMap) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = insert_sql(table, fields);
    let result = bind_all(sqlx::query(&sql), fields.values())
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// Updates the given columns on rows matching `where_clause`. Returns rows affected.
pub async fn execute_update<'e, E>(
    executor: E,
    table: &str,
    fields: &FieldMap,
    where_clause: &str,
    where_args: &[FieldValue],
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = update_sql(table, fields, where_clause);
    let query = bind_all(sqlx::query(&sql), fields.values());
    let result = bind_all(query, where_args).execute(executor).await?;
    Ok(result.rows_affected())
}

/// Deletes rows matching `where_clause`, or every row when it is `None`.
pub async fn execute_delete<'e, E>(
    executor: E,
    table: &str,
    where_clause: Option<&str>,
    where_args: &[FieldValue],
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = match where_clause {
        Some(clause) => format!("DELETE FROM {} WHERE {}", table, clause),
        None => format!("DELETE FROM {}", table),
    };
    let result = bind_all(sqlx::query(&sql), where_args)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// `SELECT` builder: `Select::from(table).filter(..).order_by(..).limit(..)`.
#[derive(Debug, Clone)]
pub struct Select {
    table: &'static str,
    filter: Option<(&'static str, Vec<FieldValue>)>,
    order_by: Option<(&'static str, Direction)>,
    limit: Option<i64>,
}

impl Select {
    pub fn from(table: &'static str) -> Self {
        Self {
            table,
            filter: None,
            order_by: None,
            limit: None,
        }
    }

    pub fn filter(mut self, where_clause: &'static str, args: Vec<FieldValue>) -> Self {
        self.filter = Some((where_clause, args));
        self
    }

    pub fn order_by(mut self, column: &'static str, direction: Direction) -> Self {
        self.order_by = Some((column, direction));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn sql(&self, projection: &str) -> String {
        let mut sql = format!("SELECT {} FROM {}", projection, self.table);
        if let Some((clause, _)) = &self.filter {
            sql.push_str(" WHERE ");
            sql.push_str(clause);
        }
        if let Some((column, direction)) = &self.order_by {
            sql.push_str(&format!(" ORDER BY {} {}", column, direction.as_sql()));
        }
        if self.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }
        sql
    }

    fn bind<'q>(&self, mut query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        if let Some((_, args)) = &self.filter {
            query = bind_all(query, args);
        }
        if let Some(limit) = self.limit {
            query = query.bind(limit);
        }
        query
    }

    pub(crate) fn to_sql(&self) -> String {
        self.sql("*")
    }

    pub async fn fetch_all<'e, T, E>(&self, executor: E) -> Result<Vec<T>>
    where
        T: Entity,
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = self.to_sql();
        let rows: Vec<SqliteRow> = self.bind(sqlx::query(&sql)).fetch_all(executor).await?;
        rows.iter().map(T::from_row).collect()
    }

    pub async fn fetch_optional<'e, T, E>(&self, executor: E) -> Result<Option<T>>
    where
        T: Entity,
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = self.to_sql();
        let row = self
            .bind(sqlx::query(&sql))
            .fetch_optional(executor)
            .await?;
        row.as_ref().map(T::from_row).transpose()
    }

    /// `COUNT(*)` over the filter; ordering and limit are ignored.
    pub async fn count<'e, E>(&self, executor: E) -> Result<usize>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let counting = Select {
            order_by: None,
            limit: None,
            ..self.clone()
        };
        let sql = counting.sql("COUNT(*) AS total");
        let row = counting
            .bind(sqlx::query(&sql))
            .fetch_one(executor)
            .await?;
        let total: i64 = row.try_get("total")?;
        Ok(total.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::columns;

    #[test]
    fn test_update_sql_lists_assignments_then_where() {
        let mut fields = FieldMap::new();
        fields.put(columns::STATUS, "SENT").put(columns::RETRIES, 2);
        let sql = update_sql("messages", &fields, "message_uuid = ?");
        assert_eq!(
            sql,
            "UPDATE messages SET status = ?, retries = ? WHERE message_uuid = ?"
        );
    }

    #[test]
    fn test_insert_sql_placeholders_match_columns() {
        let mut fields = FieldMap::new();
        fields
            .put(columns::UUID, "a")
            .put(columns::BODY, "b")
            .put(columns::RETRIES, 0);
        assert_eq!(
            insert_sql("messages", &fields),
            "INSERT INTO messages (message_uuid, message_body, retries) VALUES (?, ?, ?)"
        );
    }

    #[test]
    fn test_select_sql_shapes() {
        let select = Select::from("messages")
            .filter("status != ?", vec![FieldValue::from("SENT")])
            .order_by(columns::DATE, Direction::Desc)
            .limit(5);
        assert_eq!(
            select.to_sql(),
            "SELECT * FROM messages WHERE status != ? ORDER BY messages_date DESC LIMIT ?"
        );
        assert_eq!(Select::from("messages").to_sql(), "SELECT * FROM messages");
    }
}
