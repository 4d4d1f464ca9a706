//! HTTP client for the media bridge's conference API.
//!
//! The bridge exposes a small JSON API: conferences are created and
//! released as a whole, endpoints are allocated per participant and then
//! configured with the participant's SDP answer.

use async_trait::async_trait;
use intercom_core::{BridgeError, EndpointOffer, MediaBridge};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Media bridge over HTTP.
pub struct HttpMediaBridge {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConferenceResponse {
    conference_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointResponse {
    endpoint_id: String,
    sdp_offer: String,
}

impl HttpMediaBridge {
    /// Build a bridge client for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| BridgeError::Other(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn map_request_error(err: reqwest::Error) -> BridgeError {
    if err.is_timeout() || err.is_connect() {
        BridgeError::Unreachable(err.to_string())
    } else {
        BridgeError::Other(err.to_string())
    }
}

/// Treat non-2xx statuses as rejections carrying the status line.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BridgeError> {
    match response.error_for_status() {
        Ok(response) => Ok(response),
        Err(e) => Err(BridgeError::Rejected(e.to_string())),
    }
}

#[async_trait]
impl MediaBridge for HttpMediaBridge {
    async fn allocate_conference(&self) -> Result<String, BridgeError> {
        let response = self
            .client
            .post(self.url("/conferences"))
            .send()
            .await
            .map_err(map_request_error)?;

        let body: ConferenceResponse = check_status(response)?
            .json()
            .await
            .map_err(|e| BridgeError::Other(e.to_string()))?;

        debug!(conference = %body.conference_id, "Conference allocated");
        Ok(body.conference_id)
    }

    async fn allocate_endpoint(&self, conference_id: &str) -> Result<EndpointOffer, BridgeError> {
        let response = self
            .client
            .post(self.url(&format!("/conferences/{conference_id}/endpoints")))
            .send()
            .await
            .map_err(map_request_error)?;

        let body: EndpointResponse = check_status(response)?
            .json()
            .await
            .map_err(|e| BridgeError::Other(e.to_string()))?;

        debug!(
            conference = %conference_id,
            endpoint = %body.endpoint_id,
            "Endpoint allocated"
        );
        Ok(EndpointOffer {
            endpoint_id: body.endpoint_id,
            sdp_offer: body.sdp_offer,
        })
    }

    async fn set_answer(
        &self,
        conference_id: &str,
        endpoint_id: &str,
        sdp_answer: &str,
    ) -> Result<(), BridgeError> {
        let response = self
            .client
            .put(self.url(&format!(
                "/conferences/{conference_id}/endpoints/{endpoint_id}/answer"
            )))
            .json(&serde_json::json!({ "sdpAnswer": sdp_answer }))
            .send()
            .await
            .map_err(map_request_error)?;

        check_status(response)?;
        Ok(())
    }

    async fn release(&self, conference_id: &str) -> Result<(), BridgeError> {
        let response = self
            .client
            .delete(self.url(&format!("/conferences/{conference_id}")))
            .send()
            .await
            .map_err(map_request_error)?;

        check_status(response)?;
        debug!(conference = %conference_id, "Conference released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let bridge =
            HttpMediaBridge::new("http://bridge:8188/", Duration::from_secs(5)).unwrap();
        assert_eq!(bridge.url("/conferences"), "http://bridge:8188/conferences");
    }

    #[test]
    fn test_response_shapes() {
        let conf: ConferenceResponse =
            serde_json::from_str(r#"{"conferenceId":"conf_1"}"#).unwrap();
        assert_eq!(conf.conference_id, "conf_1");

        let ep: EndpointResponse =
            serde_json::from_str(r#"{"endpointId":"ep_1","sdpOffer":"v=0..."}"#).unwrap();
        assert_eq!(ep.endpoint_id, "ep_1");
        assert_eq!(ep.sdp_offer, "v=0...");
    }
}
