use async_stream::stream;
use sqlx::{Row, SqlitePool};

use super::error::SqlError;
use crate::persistence::{Mutation, Order, Query, Record, RecordStream, ViewStore};

/// A view store backed by sqlite. Several views may share one pool as long
/// as each gets its own `scope`, which prefixes every collection name.
pub struct SqliteViewStore {
    /// Connection pool
    pool: SqlitePool,
    scope: String,
}

impl SqliteViewStore {
    pub fn new(pool: SqlitePool, scope: impl Into<String>) -> Self {
        Self {
            pool,
            scope: scope.into(),
        }
    }

    fn collection(&self, collection: &str) -> String {
        format!("{}:{}", self.scope, collection)
    }
}

fn find_sql(query: &Query) -> String {
    let mut sql = String::from(
        r#"
            SELECT key, seq, value
            FROM view_records
            WHERE collection = ?
        "#,
    );
    let range = &query.range;
    for (bound, op) in [
        (&range.gt, ">"),
        (&range.gte, ">="),
        (&range.lt, "<"),
        (&range.lte, "<="),
    ] {
        if bound.is_some() {
            sql.push_str(&format!(" AND key {op} ?"));
        }
    }
    let dir = if query.reverse { "DESC" } else { "ASC" };
    match query.order {
        Order::Key => sql.push_str(&format!(" ORDER BY key {dir}")),
        Order::Seq => sql.push_str(&format!(" ORDER BY seq {dir}, key {dir}")),
    }
    // a negative limit means no limit in sqlite
    sql.push_str(" LIMIT ?");
    sql
}

#[async_trait::async_trait]
impl ViewStore for SqliteViewStore {
    type Error = SqlError;

    async fn find(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<RecordStream<Self::Error>, Self::Error> {
        let sql = find_sql(query);
        let range = &query.range;
        let mut select = sqlx::query(&sql).bind(self.collection(collection));
        for bound in [&range.gt, &range.gte, &range.lt, &range.lte].into_iter().flatten() {
            select = select.bind(bound.clone());
        }
        let limit = query
            .limit
            .map_or(-1, |limit| i64::try_from(limit).unwrap_or(i64::MAX));
        let rows = select.bind(limit).fetch_all(&self.pool).await?;
        let records = rows
            .into_iter()
            .map(|row| Record {
                key: row.get("key"),
                seq: row.get::<i64, _>("seq") as u64,
                value: row.get("value"),
            })
            .collect::<Vec<_>>();

        Ok(Box::pin(stream! {
            for record in records {
                yield Ok::<_, SqlError>(record);
            }
        }))
    }

    async fn commit(&self, mutations: Vec<Mutation>) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;
        for mutation in mutations {
            match mutation {
                Mutation::Insert { collection, record } => {
                    sqlx::query(
                        r#"
                            INSERT INTO view_records (collection, key, seq, value)
                            VALUES (?1, ?2, ?3, ?4)
                            ON CONFLICT (collection, key)
                            DO UPDATE SET seq = excluded.seq, value = excluded.value
                        "#,
                    )
                    .bind(self.collection(&collection))
                    .bind(record.key)
                    .bind(record.seq as i64)
                    .bind(record.value)
                    .execute(&mut tx)
                    .await?;
                }
                Mutation::Delete { collection, key } => {
                    sqlx::query(
                        r#"
                            DELETE FROM view_records
                            WHERE collection = ?1 AND key = ?2
                        "#,
                    )
                    .bind(self.collection(&collection))
                    .bind(key)
                    .execute(&mut tx)
                    .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}
