//! PostgreSQL storage provider.
//!
//! The unit row carries the current state; a conditional `UPDATE ... WHERE current_state = $n`
//! takes the row lock and the history row is inserted in the same transaction. A concurrent
//! change with the same expected state blocks on the row lock and then matches no row.

use super::{StorageError, StorageProvider, StorageResult};
use crate::models::{Direction, MessageUnit, MessageUnitEntity, MessageUnitType};
use crate::state_machine::{
    ProcessingState, ProcessingStateLog, ProcessingStateRecord, TransitionOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../migrations/0001_message_units.sql");

const SELECT_UNITS: &str = "SELECT internal_id, uses_multi_hop, unit FROM ebms_message_units";

#[derive(Debug, Clone)]
pub struct PostgresStorageProvider {
    pool: PgPool,
}

impl PostgresStorageProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StorageError::database("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet
    pub async fn migrate(&self) -> StorageResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::database("migrate", e))?;
        debug!("ebMS message unit schema is in place");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Rebuild entities from unit rows, loading their state histories in one query
    async fn load_entities(&self, rows: Vec<PgRow>) -> StorageResult<Vec<MessageUnitEntity>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut units = Vec::with_capacity(rows.len());
        for row in rows {
            let internal_id: Uuid = row
                .try_get("internal_id")
                .map_err(|e| StorageError::database("read unit", e))?;
            let uses_multi_hop: bool = row
                .try_get("uses_multi_hop")
                .map_err(|e| StorageError::database("read unit", e))?;
            let json: serde_json::Value = row
                .try_get("unit")
                .map_err(|e| StorageError::database("read unit", e))?;
            let unit: MessageUnit =
                serde_json::from_value(json).map_err(StorageError::serialization)?;
            units.push((internal_id, uses_multi_hop, unit));
        }

        let ids: Vec<Uuid> = units.iter().map(|(id, _, _)| *id).collect();
        let state_rows = sqlx::query(
            "SELECT internal_id, sequence, state, start_time, description \
             FROM ebms_processing_states WHERE internal_id = ANY($1) \
             ORDER BY internal_id, sequence",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::database("load processing states", e))?;

        let mut histories: HashMap<Uuid, Vec<ProcessingStateRecord>> = HashMap::new();
        for row in state_rows {
            let internal_id: Uuid = row
                .try_get("internal_id")
                .map_err(|e| StorageError::database("read processing state", e))?;
            let record = record_from_row(internal_id, &row)?;
            histories.entry(internal_id).or_default().push(record);
        }

        units
            .into_iter()
            .map(|(internal_id, uses_multi_hop, unit)| {
                let records = histories.remove(&internal_id).unwrap_or_default();
                let log = ProcessingStateLog::from_records(records)
                    .map_err(|e| StorageError::corrupt_state(internal_id, e))?;
                Ok(MessageUnitEntity::from_parts(
                    internal_id,
                    unit,
                    uses_multi_hop,
                    log,
                ))
            })
            .collect()
    }
}

fn record_from_row(internal_id: Uuid, row: &PgRow) -> StorageResult<ProcessingStateRecord> {
    let sequence: i32 = row
        .try_get("sequence")
        .map_err(|e| StorageError::database("read processing state", e))?;
    let state: String = row
        .try_get("state")
        .map_err(|e| StorageError::database("read processing state", e))?;
    let start_time: DateTime<Utc> = row
        .try_get("start_time")
        .map_err(|e| StorageError::database("read processing state", e))?;
    let description: Option<String> = row
        .try_get("description")
        .map_err(|e| StorageError::database("read processing state", e))?;

    Ok(ProcessingStateRecord {
        sequence: u32::try_from(sequence)
            .map_err(|_| StorageError::corrupt_state(internal_id, "negative sequence"))?,
        state: state
            .parse()
            .map_err(|e: String| StorageError::corrupt_state(internal_id, e))?,
        start_time,
        description,
    })
}

fn sequence_param(internal_id: Uuid, sequence: u32) -> StorageResult<i32> {
    i32::try_from(sequence).map_err(|_| StorageError::corrupt_state(internal_id, "sequence overflow"))
}

#[async_trait]
impl StorageProvider for PostgresStorageProvider {
    async fn store(&self, entity: &MessageUnitEntity) -> StorageResult<()> {
        let internal_id = entity.internal_id();
        let current = entity.current_record();
        let unit_json = serde_json::to_value(entity.unit()).map_err(StorageError::serialization)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::database("begin", e))?;

        let inserted = sqlx::query(
            "INSERT INTO ebms_message_units \
             (internal_id, message_id, ref_to_message_id, direction, unit_type, pmode_id, \
              leg_label, uses_multi_hop, current_state, state_sequence, state_changed_at, unit) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (internal_id) DO NOTHING",
        )
        .bind(internal_id)
        .bind(entity.message_id())
        .bind(entity.ref_to_message_id())
        .bind(entity.direction().as_str())
        .bind(entity.unit_type().as_str())
        .bind(entity.pmode_id())
        .bind(entity.leg_label().as_str())
        .bind(entity.uses_multi_hop())
        .bind(current.state.as_str())
        .bind(sequence_param(internal_id, current.sequence)?)
        .bind(current.start_time)
        .bind(unit_json)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::database("insert message unit", e))?;

        if inserted.rows_affected() == 0 {
            return Err(StorageError::AlreadyExists { internal_id });
        }

        for record in entity.processing_states() {
            sqlx::query(
                "INSERT INTO ebms_processing_states \
                 (internal_id, sequence, state, start_time, description) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(internal_id)
            .bind(sequence_param(internal_id, record.sequence)?)
            .bind(record.state.as_str())
            .bind(record.start_time)
            .bind(record.description.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::database("insert processing state", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::database("commit", e))
    }

    async fn set_state(
        &self,
        internal_id: Uuid,
        expected: Option<ProcessingState>,
        new_state: ProcessingState,
        description: Option<String>,
    ) -> StorageResult<TransitionOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::database("begin", e))?;

        let updated = sqlx::query(
            "UPDATE ebms_message_units \
             SET current_state = $3, \
                 state_sequence = state_sequence + 1, \
                 state_changed_at = GREATEST($4, state_changed_at) \
             WHERE internal_id = $1 AND ($2::TEXT IS NULL OR current_state = $2) \
             RETURNING state_sequence, state_changed_at",
        )
        .bind(internal_id)
        .bind(expected.map(|s| s.as_str()))
        .bind(new_state.as_str())
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::database("update current state", e))?;

        let Some(row) = updated else {
            let current = sqlx::query("SELECT current_state FROM ebms_message_units WHERE internal_id = $1")
                .bind(internal_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| StorageError::database("read current state", e))?;
            tx.rollback()
                .await
                .map_err(|e| StorageError::database("rollback", e))?;

            let row = current.ok_or_else(|| StorageError::not_found(internal_id))?;
            let state: String = row
                .try_get("current_state")
                .map_err(|e| StorageError::database("read current state", e))?;
            let current = state
                .parse()
                .map_err(|e: String| StorageError::corrupt_state(internal_id, e))?;
            return Ok(TransitionOutcome::AlreadyChanged { current });
        };

        let sequence: i32 = row
            .try_get("state_sequence")
            .map_err(|e| StorageError::database("read state sequence", e))?;
        let start_time: DateTime<Utc> = row
            .try_get("state_changed_at")
            .map_err(|e| StorageError::database("read state sequence", e))?;

        sqlx::query(
            "INSERT INTO ebms_processing_states \
             (internal_id, sequence, state, start_time, description) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(internal_id)
        .bind(sequence)
        .bind(new_state.as_str())
        .bind(start_time)
        .bind(description.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::database("insert processing state", e))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::database("commit", e))?;

        Ok(TransitionOutcome::Applied(ProcessingStateRecord {
            sequence: u32::try_from(sequence)
                .map_err(|_| StorageError::corrupt_state(internal_id, "negative sequence"))?,
            state: new_state,
            start_time,
            description,
        }))
    }

    async fn set_multi_hop(&self, internal_id: Uuid, uses_multi_hop: bool) -> StorageResult<()> {
        let result =
            sqlx::query("UPDATE ebms_message_units SET uses_multi_hop = $2 WHERE internal_id = $1")
                .bind(internal_id)
                .bind(uses_multi_hop)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::database("set multi-hop", e))?;
        if result.rows_affected() == 0 {
            return Err(StorageError::not_found(internal_id));
        }
        Ok(())
    }

    async fn get(&self, internal_id: Uuid) -> StorageResult<Option<MessageUnitEntity>> {
        let rows = sqlx::query(&format!("{SELECT_UNITS} WHERE internal_id = $1"))
            .bind(internal_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::database("get message unit", e))?;
        Ok(self.load_entities(rows).await?.into_iter().next())
    }

    async fn find_by_message_id(
        &self,
        message_id: &str,
        direction: Option<Direction>,
    ) -> StorageResult<Vec<MessageUnitEntity>> {
        let rows = sqlx::query(&format!(
            "{SELECT_UNITS} WHERE message_id = $1 AND ($2::TEXT IS NULL OR direction = $2) \
             ORDER BY internal_id"
        ))
        .bind(message_id)
        .bind(direction.map(|d| d.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::database("find by message id", e))?;
        self.load_entities(rows).await
    }

    async fn find_by_pmode(&self, pmode_id: &str) -> StorageResult<Vec<MessageUnitEntity>> {
        let rows = sqlx::query(&format!("{SELECT_UNITS} WHERE pmode_id = $1"))
            .bind(pmode_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::database("find by P-Mode", e))?;
        self.load_entities(rows).await
    }

    async fn find_in_state(
        &self,
        unit_type: MessageUnitType,
        state: ProcessingState,
    ) -> StorageResult<Vec<MessageUnitEntity>> {
        let rows = sqlx::query(&format!(
            "{SELECT_UNITS} WHERE unit_type = $1 AND current_state = $2 ORDER BY state_changed_at"
        ))
        .bind(unit_type.as_str())
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::database("find in state", e))?;
        self.load_entities(rows).await
    }

    async fn find_changed_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StorageResult<Vec<MessageUnitEntity>> {
        let rows = sqlx::query(&format!(
            "{SELECT_UNITS} WHERE state_changed_at < $1 ORDER BY state_changed_at"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::database("find changed before", e))?;
        self.load_entities(rows).await
    }

    async fn remove(&self, internal_id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM ebms_message_units WHERE internal_id = $1")
            .bind(internal_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::database("remove message unit", e))?;
        Ok(result.rows_affected() > 0)
    }
}
