// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};

/// The dispatcher's public request shape: a match request the caller hands
/// to `consume`, serializable end to end since it may have to cross the
/// RPC wire as the call's `payload`.
///
/// [`rlb_scheduler::MatchRequest`] additionally carries a `criteria`
/// closure for same-process callers; closures cannot cross a pub/sub
/// channel, so the dispatcher's own request type omits it. A peer always
/// matches this request against its own jobs with "any open job with
/// enough free seats", the same default `rlb_scheduler::MatchRequest::new`
/// uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub player_ids: Vec<String>,
    /// Seat count for a newly created job; falls back to the workload's
    /// default when absent.
    #[serde(default)]
    pub seat_count: Option<u32>,
    /// Opaque properties stored on a newly created job.
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl DispatchRequest {
    pub fn new(player_ids: Vec<String>) -> Self {
        Self {
            player_ids,
            seat_count: None,
            properties: serde_json::Value::Null,
        }
    }
}

impl From<DispatchRequest> for rlb_scheduler::MatchRequest {
    fn from(request: DispatchRequest) -> Self {
        let mut match_request = rlb_scheduler::MatchRequest::new(request.player_ids);
        match_request.seat_count = request.seat_count;
        match_request.properties = request.properties;
        match_request
    }
}

/// The dispatcher's public response shape, mirroring
/// [`rlb_scheduler::MatchResponse`] so it can be sent back over the wire
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResponse {
    pub room_name: String,
}

impl From<rlb_scheduler::MatchResponse> for DispatchResponse {
    fn from(response: rlb_scheduler::MatchResponse) -> Self {
        Self {
            room_name: response.room_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_through_json() {
        let mut request = DispatchRequest::new(vec!["p1".into(), "p2".into()]);
        request.seat_count = Some(4);
        request.properties = serde_json::json!({"ranked": true});

        let wire = serde_json::to_value(&request).unwrap();
        let back: DispatchRequest = serde_json::from_value(wire).unwrap();
        assert_eq!(back.player_ids, request.player_ids);
        assert_eq!(back.seat_count, request.seat_count);
        assert_eq!(back.properties, request.properties);
    }

    #[test]
    fn request_without_seat_count_decodes_from_a_minimal_payload() {
        let wire = serde_json::json!({"player_ids": ["p1"]});
        let request: DispatchRequest = serde_json::from_value(wire).unwrap();
        assert_eq!(request.seat_count, None);
        assert_eq!(request.properties, serde_json::Value::Null);
    }
}
