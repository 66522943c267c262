//! Work kinds carried by segments and orders.
//!
//! Only `convert/v1` exists today. New kinds become new variants, so every
//! `match` over a payload stays exhaustive.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::ConvertParams;

/// Type tag of the conversion work kind.
pub const CONVERT_V1_TYPE: &str = "convert/v1";

/// Kind-specific part of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum SegmentPayload {
    #[serde(rename = "convert/v1")]
    ConvertV1(ConvertSegmentPayload),
}

/// Segment payload of a `convert/v1` order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConvertSegmentPayload {
    pub params: ConvertParams,
    /// Container of the segment files, e.g. `mp4`
    pub muxer: String,
}

impl SegmentPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            SegmentPayload::ConvertV1(_) => CONVERT_V1_TYPE,
        }
    }

    pub fn muxer(&self) -> &str {
        match self {
            SegmentPayload::ConvertV1(payload) => &payload.muxer,
        }
    }

    pub fn params(&self) -> &ConvertParams {
        match self {
            SegmentPayload::ConvertV1(payload) => &payload.params,
        }
    }
}

/// Kind-specific part of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type")]
pub enum OrderPayload {
    #[serde(rename = "convert/v1")]
    ConvertV1(ConvertOrderPayload),
}

/// Order payload of a `convert/v1` order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConvertOrderPayload {
    pub params: ConvertParams,
    /// Path of the source media file
    pub in_file: String,
    /// Path the concatenated result is written to
    pub out_file: String,
}

impl OrderPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            OrderPayload::ConvertV1(_) => CONVERT_V1_TYPE,
        }
    }

    pub fn in_file(&self) -> &str {
        match self {
            OrderPayload::ConvertV1(payload) => &payload.in_file,
        }
    }

    pub fn out_file(&self) -> &str {
        match self {
            OrderPayload::ConvertV1(payload) => &payload.out_file,
        }
    }

    pub fn params(&self) -> &ConvertParams {
        match self {
            OrderPayload::ConvertV1(payload) => &payload.params,
        }
    }
}
