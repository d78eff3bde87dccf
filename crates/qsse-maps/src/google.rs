//! Google Directions API client

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use crate::error::MapsError;
use crate::model::{DirectionsResult, RouteRequest};
use crate::service::RouteService;

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

/// Calls `/maps/api/directions/json` with the configured key.
#[derive(Debug, Clone)]
pub struct GoogleDirectionsClient {
    api_key: String,
    base_url: Url,
    client: reqwest::Client,
}

impl GoogleDirectionsClient {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, MapsError> {
        Ok(Self {
            api_key: api_key.into(),
            base_url: Url::parse(base_url)?,
            client: reqwest::Client::new(),
        })
    }

    /// Build the request URL. The key is appended last.
    pub fn request_url(&self, request: &RouteRequest) -> Result<Url, MapsError> {
        let mut url = self.base_url.join("/maps/api/directions/json")?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("origin", &request.origin)
                .append_pair("destination", &request.destination)
                .append_pair("mode", &request.mode)
                .append_pair(
                    "departure_time",
                    &chrono::Utc::now().timestamp().to_string(),
                );
            if request.alternatives {
                query.append_pair("alternatives", "true");
            }
            if let Some(waypoints) = &request.waypoints {
                let value = if request.optimize_waypoints {
                    format!("optimize:true|{}", waypoints)
                } else {
                    waypoints.clone()
                };
                query.append_pair("waypoints", &value);
            }
            query.append_pair("key", &self.api_key);
        }
        Ok(url)
    }
}

#[async_trait]
impl RouteService for GoogleDirectionsClient {
    async fn directions(&self, request: &RouteRequest) -> Result<DirectionsResult, MapsError> {
        let url = self.request_url(request)?;
        debug!(
            "Requesting directions {} -> {} ({})",
            request.origin, request.destination, request.mode
        );

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let status = response.status().to_string();
            let message = response.text().await.unwrap_or_default();
            return Err(MapsError::Upstream { status, message });
        }

        let result: DirectionsResult = response.json().await?;
        if result.status != "OK" {
            return Err(MapsError::Upstream {
                message: result.error_message.clone().unwrap_or_default(),
                status: result.status,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use std::collections::HashMap;

    fn request() -> RouteRequest {
        RouteRequest {
            origin: "Chicago, IL".to_string(),
            destination: "Milwaukee, WI".to_string(),
            mode: "driving".to_string(),
            alternatives: false,
            waypoints: None,
            optimize_waypoints: false,
        }
    }

    async fn spawn_fake(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_request_url_query() {
        let client = GoogleDirectionsClient::new("secret", DEFAULT_BASE_URL).unwrap();
        let mut req = request();
        req.alternatives = true;
        req.waypoints = Some("Madison, WI|Rockford, IL".to_string());
        req.optimize_waypoints = true;

        let url = client.request_url(&req).unwrap();
        assert_eq!(url.path(), "/maps/api/directions/json");
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["origin"], "Chicago, IL");
        assert_eq!(pairs["mode"], "driving");
        assert_eq!(pairs["alternatives"], "true");
        assert_eq!(pairs["waypoints"], "optimize:true|Madison, WI|Rockford, IL");
        assert_eq!(pairs["key"], "secret");
        assert!(pairs["departure_time"].parse::<i64>().is_ok());
    }

    #[test]
    fn test_request_url_without_alternatives() {
        let client = GoogleDirectionsClient::new("k", DEFAULT_BASE_URL).unwrap();
        let url = client.request_url(&request()).unwrap();
        assert!(url.query_pairs().all(|(k, _)| k != "alternatives" && k != "waypoints"));
    }

    #[tokio::test]
    async fn test_directions_against_fake_server() {
        let router = Router::new().route(
            "/maps/api/directions/json",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("key").map(String::as_str), Some("k"));
                Json(serde_json::json!({
                    "status": "OK",
                    "routes": [{
                        "overview_polyline": {"points": "_p~iF~ps|U"},
                        "legs": []
                    }]
                }))
            }),
        );
        let base = spawn_fake(router).await;
        let client = GoogleDirectionsClient::new("k", &base).unwrap();

        let result = client.directions(&request()).await.unwrap();
        assert_eq!(result.routes.len(), 1);
    }

    #[tokio::test]
    async fn test_non_ok_status_is_upstream_error() {
        let router = Router::new().route(
            "/maps/api/directions/json",
            get(|| async {
                Json(serde_json::json!({
                    "status": "REQUEST_DENIED",
                    "error_message": "bad key"
                }))
            }),
        );
        let base = spawn_fake(router).await;
        let client = GoogleDirectionsClient::new("k", &base).unwrap();

        let err = client.directions(&request()).await.unwrap_err();
        match err {
            MapsError::Upstream { status, message } => {
                assert_eq!(status, "REQUEST_DENIED");
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
