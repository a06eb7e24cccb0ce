use std::any::Any;

use async_trait::async_trait;
use pgebus_core::{DispatchError, TransactionHandle};
use serde_json::Value;
use sqlx::{Column, Postgres, Row, Transaction};

/// Wraps a live `sqlx::Transaction` as the dispatcher's full-authority
/// session handle. Never exposed directly to handler code; `HandlerSession`
/// (in `pgebus-core`) is the capability-restricted view they actually see.
pub struct PgTransactionHandle {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTransactionHandle {
    pub(crate) fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx: Some(tx) }
    }
}

#[async_trait]
impl TransactionHandle for PgTransactionHandle {
    async fn execute_raw(&mut self, sql: &str, params: &[Value]) -> Result<u64, DispatchError> {
        let tx = self
            .tx
            .as_mut()
            .expect("execute_raw called after commit/rollback");
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param);
        }
        let result = query
            .execute(&mut **tx)
            .await
            .map_err(|err| DispatchError::StorageTransient(err.into()))?;
        Ok(result.rows_affected())
    }

    async fn query_raw(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Value>, DispatchError> {
        let tx = self
            .tx
            .as_mut()
            .expect("query_raw called after commit/rollback");
        let mut query = sqlx::query(sql);
        for param in params {
            query = query.bind(param);
        }
        let rows = query
            .fetch_all(&mut **tx)
            .await
            .map_err(|err| DispatchError::StorageTransient(err.into()))?;

        Ok(rows
            .iter()
            .map(|row| {
                let columns = row.columns();
                let mut object = serde_json::Map::with_capacity(columns.len());
                for (index, column) in columns.iter().enumerate() {
                    let value: Value = row.try_get(index).unwrap_or(Value::Null);
                    object.insert(column.name().to_string(), value);
                }
                Value::Object(object)
            })
            .collect())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    async fn commit(mut self: Box<Self>) -> Result<(), DispatchError> {
        let tx = self.tx.take().expect("commit called twice");
        tx.commit()
            .await
            .map_err(|err| DispatchError::StorageTransient(err.into()))
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), DispatchError> {
        let tx = self.tx.take().expect("rollback called twice");
        tx.rollback()
            .await
            .map_err(|err| DispatchError::StorageTransient(err.into()))
    }
}
