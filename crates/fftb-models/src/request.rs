//! Request and response bodies exchanged with the dealer.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    ConvertOrderPayload, ConvertParams, ConvertSegmentPayload, DealerError, DealerResult,
    OrderId, OrderPayload, SegmentPayload, SegmentState, CONVERT_V1_TYPE,
};

/// Body of `AllocateSegment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AllocateSegmentRequest {
    /// Declared work kind, must be a known type tag
    #[serde(rename = "type")]
    pub kind: String,
    pub order_id: OrderId,
    pub position: u32,
    #[serde(default)]
    pub params: ConvertParams,
    pub muxer: String,
}

impl AllocateSegmentRequest {
    pub fn convert_v1(order_id: OrderId, position: u32, params: ConvertParams, muxer: impl Into<String>) -> Self {
        Self {
            kind: CONVERT_V1_TYPE.to_string(),
            order_id,
            position,
            params,
            muxer: muxer.into(),
        }
    }

    /// Resolve the declared type into a payload, `UnknownType` otherwise.
    pub fn to_payload(&self) -> DealerResult<SegmentPayload> {
        match self.kind.as_str() {
            CONVERT_V1_TYPE => Ok(SegmentPayload::ConvertV1(ConvertSegmentPayload {
                params: self.params.clone(),
                muxer: self.muxer.clone(),
            })),
            other => Err(DealerError::unknown_type(other)),
        }
    }
}

/// Body of `AddOrderToQueue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AddOrderRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub in_file: String,
    pub out_file: String,
    #[serde(default)]
    pub params: ConvertParams,
}

impl AddOrderRequest {
    pub fn to_payload(&self) -> DealerResult<OrderPayload> {
        match self.kind.as_str() {
            CONVERT_V1_TYPE => Ok(OrderPayload::ConvertV1(ConvertOrderPayload {
                params: self.params.clone(),
                in_file: self.in_file.clone(),
                out_file: self.out_file.clone(),
            })),
            other => Err(DealerError::unknown_type(other)),
        }
    }
}

/// Optional narrowing for segment listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SegmentState>,
}

impl SegmentFilter {
    pub fn with_state(state: SegmentState) -> Self {
        Self { state: Some(state) }
    }

    pub fn matches(&self, state: SegmentState) -> bool {
        self.state.map_or(true, |wanted| wanted == state)
    }
}

/// Query of `GET /segments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SegmentsQuery {
    pub order_id: OrderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SegmentState>,
}

impl SegmentsQuery {
    pub fn filter(&self) -> SegmentFilter {
        SegmentFilter { state: self.state }
    }
}

/// A bare count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CountResponse {
    pub count: usize,
}

/// Body of `FailSegment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FailSegmentRequest {
    pub error: String,
}

/// Body of cancel actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Which side of the dealer an authority acts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthorityRole {
    Publisher,
    Performer,
}

/// Body of `POST /authorities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreateAuthorityRequest {
    pub name: String,
    pub role: AuthorityRole,
}

/// An issued long-lived authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuthorityResponse {
    pub name: String,
    pub authority_key: String,
}

/// Body of `POST /sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreateSessionRequest {
    pub authority_key: String,
}

/// A short-lived session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionResponse {
    pub session_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Wire form of a storage claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct StorageClaimResponse {
    pub id: String,
    pub url: String,
    pub size: u64,
}
