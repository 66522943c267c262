//! Typed segment/order registry over a [`KvStore`].

use std::sync::Arc;

use fftb_models::{Author, Order, OrderId, Segment, SegmentId};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::store::KvStore;

pub const SEGMENTS_PREFIX: &str = "v1/segments";
pub const ORDERS_PREFIX: &str = "v1/orders";

const OBJECT_TYPE_FIELD: &str = "object_type";
const SEGMENT_OBJECT_TYPE: &str = "segment";
const ORDER_OBJECT_TYPE: &str = "order";
const AUTHOR_OBJECT_TYPE: &str = "author";

pub fn segment_key(id: &SegmentId) -> String {
    format!("{}/{}", SEGMENTS_PREFIX, id)
}

pub fn order_key(id: &OrderId) -> String {
    format!("{}/{}", ORDERS_PREFIX, id)
}

/// Persists segments and orders as type-tagged JSON records.
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn KvStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    // ========================================================================
    // Segments
    // ========================================================================

    pub async fn find_segment_by_id(&self, id: &SegmentId) -> RegistryResult<Segment> {
        let raw = self.store.get(&segment_key(id)).await?;
        decode(&raw, SEGMENT_OBJECT_TYPE)
    }

    /// Validate and store `segment`, replacing any previous version.
    pub async fn persist_segment(&self, segment: &Segment) -> RegistryResult<()> {
        segment.validate()?;
        let raw = encode(segment, SEGMENT_OBJECT_TYPE)?;
        self.store.set(&segment_key(&segment.id), raw).await?;
        debug!(segment_id = %segment.id, state = %segment.state, "Persisted segment");
        Ok(())
    }

    /// First segment matching `predicate`, in key order.
    pub async fn search_segment<F>(&self, predicate: F) -> RegistryResult<Segment>
    where
        F: Fn(&Segment) -> bool,
    {
        self.search_all_segments(predicate)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RegistryError::not_found(format!("{}/*", SEGMENTS_PREFIX)))
    }

    /// Every segment matching `predicate`, in key order.
    pub async fn search_all_segments<F>(&self, predicate: F) -> RegistryResult<Vec<Segment>>
    where
        F: Fn(&Segment) -> bool,
    {
        let pattern = format!("{}/*", SEGMENTS_PREFIX);
        Ok(self
            .decode_all::<Segment>(&pattern, SEGMENT_OBJECT_TYPE)
            .await?
            .into_iter()
            .filter(|s| predicate(s))
            .collect())
    }

    /// Segments of `order_id`, ordered by position.
    pub async fn find_segments_by_order_id(&self, order_id: &OrderId) -> RegistryResult<Vec<Segment>> {
        let mut segments = self.search_all_segments(|s| &s.order_id == order_id).await?;
        segments.sort_by_key(|s| s.position);
        Ok(segments)
    }

    pub async fn destroy_segment(&self, id: &SegmentId) -> RegistryResult<()> {
        self.store.destroy(&segment_key(id)).await?;
        debug!(segment_id = %id, "Destroyed segment");
        Ok(())
    }

    // ========================================================================
    // Orders
    // ========================================================================

    pub async fn find_order_by_id(&self, id: &OrderId) -> RegistryResult<Order> {
        let raw = self.store.get(&order_key(id)).await?;
        decode(&raw, ORDER_OBJECT_TYPE)
    }

    /// Validate and store `order`, replacing any previous version.
    pub async fn persist_order(&self, order: &Order) -> RegistryResult<()> {
        order.validate()?;
        let raw = encode(order, ORDER_OBJECT_TYPE)?;
        self.store.set(&order_key(&order.id), raw).await?;
        debug!(order_id = %order.id, state = %order.state, "Persisted order");
        Ok(())
    }

    pub async fn search_order<F>(&self, predicate: F) -> RegistryResult<Order>
    where
        F: Fn(&Order) -> bool,
    {
        self.search_all_orders(predicate)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RegistryError::not_found(format!("{}/*", ORDERS_PREFIX)))
    }

    pub async fn search_all_orders<F>(&self, predicate: F) -> RegistryResult<Vec<Order>>
    where
        F: Fn(&Order) -> bool,
    {
        let pattern = format!("{}/*", ORDERS_PREFIX);
        Ok(self
            .decode_all::<Order>(&pattern, ORDER_OBJECT_TYPE)
            .await?
            .into_iter()
            .filter(|o| predicate(o))
            .collect())
    }

    pub async fn destroy_order(&self, id: &OrderId) -> RegistryResult<()> {
        self.store.destroy(&order_key(id)).await?;
        debug!(order_id = %id, "Destroyed order");
        Ok(())
    }

    // ========================================================================
    // Authors
    // ========================================================================

    /// Record `author` under its own name. Returns `false` when the name is
    /// already registered; the existing record is left untouched.
    ///
    /// Not atomic across processes: callers serialize registrations.
    pub async fn register_author(&self, author: &Author) -> RegistryResult<bool> {
        match self.store.get(author.name()).await {
            Ok(_) => return Ok(false),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let record = Author::new(author.name());
        let raw = encode(&record, AUTHOR_OBJECT_TYPE)?;
        self.store.set(author.name(), raw).await?;
        debug!(author = %author, "Registered author");
        Ok(true)
    }

    pub async fn find_author(&self, name: &str) -> RegistryResult<Author> {
        let raw = self.store.get(name).await?;
        decode(&raw, AUTHOR_OBJECT_TYPE)
    }

    /// Flush buffered writes of the underlying store.
    pub async fn persist(&self) -> RegistryResult<()> {
        self.store.persist().await
    }

    /// Decode every record under `pattern`. Undecodable records are skipped.
    async fn decode_all<T: DeserializeOwned>(
        &self,
        pattern: &str,
        object_type: &str,
    ) -> RegistryResult<Vec<T>> {
        let raws = self.store.find_all(pattern).await?;
        let mut items = Vec::with_capacity(raws.len());

        for raw in raws {
            match decode::<T>(&raw, object_type) {
                Ok(item) => items.push(item),
                Err(e) => warn!(pattern = %pattern, error = %e, "Skipping unreadable record"),
            }
        }

        Ok(items)
    }
}

fn encode<T: Serialize>(item: &T, object_type: &str) -> RegistryResult<String> {
    let mut value = serde_json::to_value(item)?;
    if let serde_json::Value::Object(map) = &mut value {
        map.insert(
            OBJECT_TYPE_FIELD.to_string(),
            serde_json::Value::String(object_type.to_string()),
        );
    }
    Ok(serde_json::to_string(&value)?)
}

fn decode<T: DeserializeOwned>(raw: &str, object_type: &str) -> RegistryResult<T> {
    let value: serde_json::Value = serde_json::from_str(raw)?;

    let found = value
        .get(OBJECT_TYPE_FIELD)
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    if found != object_type {
        return Err(RegistryError::UnexpectedObjectType {
            expected: object_type.to_string(),
            found: found.to_string(),
        });
    }

    Ok(serde_json::from_value(value)?)
}
