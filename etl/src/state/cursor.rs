use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};
use crate::state::store::StateStore;
use crate::types::{EntityId, EntityKind, IdSet};

/// Key of the watermark instant.
pub const TIME_OF_RUN_KEY: &str = "time_of_run";

/// Key of the flag telling whether the initial full load is still pending.
pub const IS_FIRST_RUN_KEY: &str = "is_first_run";

/// Key of the instant the cycle owning the current excepted ids started at.
pub const CYCLE_STARTED_AT_KEY: &str = "cycle_started_at";

/// Returns the key holding the ids already processed in the current sweep of `kind`.
pub fn excepted_ids_key(kind: EntityKind) -> String {
    format!("{kind}_excepted_ids")
}

/// Typed view over the persisted progress of the pipeline.
///
/// Nothing is cached: each accessor reads the [`StateStore`] and each mutation writes it
/// through, so the store stays the single source of truth across restarts.
#[derive(Debug, Clone)]
pub struct Cursor<S> {
    store: S,
}

impl<S> Cursor<S>
where
    S: StateStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Seeds the watermark with `now` when no watermark was ever persisted.
    ///
    /// Returns the watermark in effect after the call.
    pub async fn initialize(&self, now: DateTime<Utc>) -> EtlResult<DateTime<Utc>> {
        if let Some(time_of_run) = self.time_of_run().await? {
            debug!(%time_of_run, "resuming from persisted watermark");
            return Ok(time_of_run);
        }

        self.set_time_of_run(now).await?;
        info!(time_of_run = %now, "initialized watermark");

        Ok(now)
    }

    /// Returns the persisted watermark, if any.
    pub async fn time_of_run(&self) -> EtlResult<Option<DateTime<Utc>>> {
        self.instant(TIME_OF_RUN_KEY).await
    }

    /// Returns the start of the cycle that recorded the current excepted ids, if any.
    pub async fn cycle_started_at(&self) -> EtlResult<Option<DateTime<Utc>>> {
        self.instant(CYCLE_STARTED_AT_KEY).await
    }

    /// Records the start of the cycle about to record excepted ids.
    pub async fn set_cycle_started_at(&self, started_at: DateTime<Utc>) -> EtlResult<()> {
        self.store
            .set(CYCLE_STARTED_AT_KEY, Value::String(started_at.to_rfc3339()))
            .await
    }

    /// Forgets the cycle start once the cycle committed its watermark.
    pub async fn clear_cycle_started_at(&self) -> EtlResult<()> {
        self.store.set(CYCLE_STARTED_AT_KEY, Value::Null).await
    }

    /// Reads an RFC 3339 instant stored under `key`. `null` reads as absent.
    async fn instant(&self, key: &str) -> EtlResult<Option<DateTime<Utc>>> {
        let raw = match self.store.get(key).await? {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(raw)) => raw,
            Some(other) => bail!(
                ErrorKind::InvalidData,
                "Instant is not a string",
                format!("Key '{key}' holds {other}")
            ),
        };

        let instant = DateTime::parse_from_rfc3339(&raw)?.with_timezone(&Utc);

        Ok(Some(instant))
    }

    /// Moves the watermark forward to `to`.
    ///
    /// The watermark never decreases: when `to` is not after the persisted watermark nothing
    /// is written. Returns the watermark in effect after the call.
    pub async fn advance_time_of_run(&self, to: DateTime<Utc>) -> EtlResult<DateTime<Utc>> {
        if let Some(current) = self.time_of_run().await? {
            if current >= to {
                debug!(%current, requested = %to, "watermark already ahead, not moving it");
                return Ok(current);
            }
        }

        self.set_time_of_run(to).await?;
        info!(time_of_run = %to, "advanced watermark");

        Ok(to)
    }

    async fn set_time_of_run(&self, time_of_run: DateTime<Utc>) -> EtlResult<()> {
        self.store
            .set(TIME_OF_RUN_KEY, Value::String(time_of_run.to_rfc3339()))
            .await
    }

    /// Returns `true` until the initial full load has completed.
    pub async fn is_first_run(&self) -> EtlResult<bool> {
        match self.store.get(IS_FIRST_RUN_KEY).await? {
            None => Ok(true),
            Some(Value::Bool(is_first_run)) => Ok(is_first_run),
            Some(other) => bail!(
                ErrorKind::InvalidData,
                "First run flag is not a boolean",
                format!("Key '{IS_FIRST_RUN_KEY}' holds {other}")
            ),
        }
    }

    /// Records that the initial full load has completed.
    pub async fn complete_first_run(&self) -> EtlResult<()> {
        self.store.set(IS_FIRST_RUN_KEY, Value::Bool(false)).await
    }

    /// Returns the ids already processed in the current sweep of `kind`.
    pub async fn excepted_ids(&self, kind: EntityKind) -> EtlResult<IdSet> {
        let key = excepted_ids_key(kind);
        let Some(value) = self.store.get(&key).await? else {
            return Ok(IdSet::new());
        };

        let ids: IdSet = serde_json::from_value(value)?;

        Ok(ids)
    }

    /// Appends `ids` to the excepted ids of `kind`, skipping ids already present.
    ///
    /// Returns the excepted ids after the append.
    pub async fn append_excepted_ids(&self, kind: EntityKind, ids: &[EntityId]) -> EtlResult<IdSet> {
        let mut excepted = self.excepted_ids(kind).await?;
        excepted.extend(ids.iter().copied());

        self.store
            .set(&excepted_ids_key(kind), serde_json::to_value(&excepted)?)
            .await?;

        Ok(excepted)
    }

    /// Clears the excepted ids of `kind`, starting a fresh sweep.
    pub async fn reset_excepted_ids(&self, kind: EntityKind) -> EtlResult<()> {
        self.store
            .set(&excepted_ids_key(kind), Value::Array(Vec::new()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::state::store::memory::MemoryStateStore;

    fn instant(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 6, 15, 12, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[tokio::test]
    async fn test_initialize_only_seeds_missing_watermark() {
        let cursor = Cursor::new(MemoryStateStore::new());

        assert_eq!(cursor.time_of_run().await.unwrap(), None);
        assert_eq!(cursor.initialize(instant(0)).await.unwrap(), instant(0));
        assert_eq!(cursor.initialize(instant(5)).await.unwrap(), instant(0));
        assert_eq!(cursor.time_of_run().await.unwrap(), Some(instant(0)));
    }

    #[tokio::test]
    async fn test_watermark_never_decreases() {
        let cursor = Cursor::new(MemoryStateStore::new());
        cursor.initialize(instant(10)).await.unwrap();

        assert_eq!(cursor.advance_time_of_run(instant(5)).await.unwrap(), instant(10));
        assert_eq!(cursor.advance_time_of_run(instant(15)).await.unwrap(), instant(15));
        assert_eq!(cursor.time_of_run().await.unwrap(), Some(instant(15)));
    }

    #[tokio::test]
    async fn test_watermark_is_stored_as_rfc3339() {
        let store = MemoryStateStore::new();
        let cursor = Cursor::new(store.clone());
        cursor.initialize(instant(0)).await.unwrap();

        let raw = store.get(TIME_OF_RUN_KEY).await.unwrap().unwrap();
        assert_eq!(raw, json!("2021-06-15T12:00:00+00:00"));
    }

    #[tokio::test]
    async fn test_malformed_values_are_rejected() {
        let store = MemoryStateStore::new();
        let cursor = Cursor::new(store.clone());

        store.set(TIME_OF_RUN_KEY, json!(42)).await.unwrap();
        let err = cursor.time_of_run().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        store.set(TIME_OF_RUN_KEY, json!("yesterday")).await.unwrap();
        let err = cursor.time_of_run().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);

        store.set(IS_FIRST_RUN_KEY, json!("no")).await.unwrap();
        let err = cursor.is_first_run().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_cycle_start_is_set_and_cleared() {
        let store = MemoryStateStore::new();
        let cursor = Cursor::new(store.clone());

        assert_eq!(cursor.cycle_started_at().await.unwrap(), None);
        cursor.set_cycle_started_at(instant(3)).await.unwrap();
        assert_eq!(cursor.cycle_started_at().await.unwrap(), Some(instant(3)));

        cursor.clear_cycle_started_at().await.unwrap();
        assert_eq!(cursor.cycle_started_at().await.unwrap(), None);
        assert_eq!(store.get(CYCLE_STARTED_AT_KEY).await.unwrap(), Some(Value::Null));

        store.set(CYCLE_STARTED_AT_KEY, json!(true)).await.unwrap();
        let err = cursor.cycle_started_at().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_first_run_flag() {
        let cursor = Cursor::new(MemoryStateStore::new());

        assert!(cursor.is_first_run().await.unwrap());
        cursor.complete_first_run().await.unwrap();
        assert!(!cursor.is_first_run().await.unwrap());
    }

    #[tokio::test]
    async fn test_excepted_ids_append_and_reset_per_kind() {
        let store = MemoryStateStore::new();
        let cursor = Cursor::new(store.clone());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        cursor
            .append_excepted_ids(EntityKind::Person, &[a, b])
            .await
            .unwrap();
        let excepted = cursor
            .append_excepted_ids(EntityKind::Person, &[b])
            .await
            .unwrap();
        assert_eq!(excepted.as_slice(), &[a, b]);
        assert!(cursor.excepted_ids(EntityKind::Genre).await.unwrap().is_empty());

        let raw = store.get("person_excepted_ids").await.unwrap().unwrap();
        assert_eq!(raw, json!([a.to_string(), b.to_string()]));

        cursor.reset_excepted_ids(EntityKind::Person).await.unwrap();
        assert!(cursor.excepted_ids(EntityKind::Person).await.unwrap().is_empty());
    }
}
