//! Geolocalización aproximada de la IP del cliente (ipapi.co o compatible).
//!
//! Es un enriquecimiento "best effort": cualquier fallo se traduce en
//! [`UNKNOWN_LOCATION`] y nunca llega al cliente.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;
use url::Url;

pub const UNKNOWN_LOCATION: &str = "Unknown";

/// Campos que nos interesan de la respuesta `GET /{ip}/json/`.
#[derive(Debug, Default, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    country_name: Option<String>,
}

impl IpApiResponse {
    fn describe(&self) -> String {
        let parts: Vec<&str> = [&self.city, &self.region, &self.country_name]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            UNKNOWN_LOCATION.to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[derive(Debug, Clone)]
pub struct Geolocator {
    client: reqwest::Client,
    base_url: Url,
}

impl Geolocator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| anyhow!("URL de geolocalización inválida ({base_url}): {e}"))?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, ip: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("La URL de geolocalización no admite rutas: {}", self.base_url))?
            .pop_if_empty()
            .push(ip)
            .push("json")
            .push("");
        Ok(url)
    }

    /// Consulta única, sin reintentos, acotada por el timeout del cliente.
    pub async fn lookup(&self, ip: &str) -> Result<String> {
        let body: IpApiResponse = self
            .client
            .get(self.endpoint(ip)?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body.describe())
    }

    /// Como [`Geolocator::lookup`], pero degradando cualquier error a `"Unknown"`.
    pub async fn locate(&self, ip: &str) -> String {
        match self.lookup(ip).await {
            Ok(location) => location,
            Err(e) => {
                warn!("No se pudo geolocalizar la IP {ip}: {e}");
                UNKNOWN_LOCATION.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use serde_json::{json, Value};

    async fn spawn_fake_ipapi(body: Value, delay: Duration) -> String {
        let app = Router::new().route(
            "/:ip/json/",
            get(move || {
                let body = body.clone();
                async move {
                    tokio::time::sleep(delay).await;
                    Json(body)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn describe_joins_non_empty_parts() {
        let full = IpApiResponse {
            city: Some("Hyderabad".into()),
            region: Some("Telangana".into()),
            country_name: Some("India".into()),
        };
        assert_eq!(full.describe(), "Hyderabad, Telangana, India");

        let partial = IpApiResponse {
            city: Some(String::new()),
            region: None,
            country_name: Some("India".into()),
        };
        assert_eq!(partial.describe(), "India");

        assert_eq!(IpApiResponse::default().describe(), UNKNOWN_LOCATION);
    }

    #[test]
    fn endpoint_appends_ip_and_json_segments() {
        let geo = Geolocator::new("https://ipapi.co", Duration::from_secs(3)).unwrap();
        assert_eq!(
            geo.endpoint("8.8.8.8").unwrap().as_str(),
            "https://ipapi.co/8.8.8.8/json/"
        );

        let nested = Geolocator::new("http://localhost:9000/geo/", Duration::from_secs(3)).unwrap();
        assert_eq!(
            nested.endpoint("fe80::1").unwrap().path(),
            "/geo/fe80::1/json/"
        );
    }

    #[tokio::test]
    async fn lookup_parses_service_response() {
        let base = spawn_fake_ipapi(
            json!({"ip": "8.8.8.8", "city": "Mountain View", "region": "California",
                   "country_name": "United States", "org": "GOOGLE"}),
            Duration::ZERO,
        )
        .await;
        let geo = Geolocator::new(&base, Duration::from_secs(3)).unwrap();
        assert_eq!(
            geo.locate("8.8.8.8").await,
            "Mountain View, California, United States"
        );
    }

    #[tokio::test]
    async fn reserved_address_without_fields_is_unknown() {
        let base = spawn_fake_ipapi(
            json!({"ip": "127.0.0.1", "error": true, "reason": "Reserved IP Address", "city": null}),
            Duration::ZERO,
        )
        .await;
        let geo = Geolocator::new(&base, Duration::from_secs(3)).unwrap();
        assert_eq!(geo.locate("127.0.0.1").await, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn slow_service_times_out_to_unknown() {
        let base = spawn_fake_ipapi(json!({"city": "Too Late"}), Duration::from_secs(5)).await;
        let geo = Geolocator::new(&base, Duration::from_millis(200)).unwrap();
        tokio_test::assert_err!(geo.lookup("1.2.3.4").await);
        assert_eq!(geo.locate("1.2.3.4").await, UNKNOWN_LOCATION);
    }

    #[tokio::test]
    async fn unreachable_service_is_unknown() {
        let geo = Geolocator::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        assert_eq!(geo.locate("1.2.3.4").await, UNKNOWN_LOCATION);
    }
}
