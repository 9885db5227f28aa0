//! HTTP implementation of [`VehicleFeed`].
//!
//! Fetches the whole positional feed with one GET and decodes it with
//! [`decode_batch`]. Nothing is retried here: a failed fetch is reported to the
//! coordinator, which keeps its previous batch until the next tick.

use super::{FetchError, VehicleFeed, VehicleRecord, decode_batch};
use std::fmt;
use std::time::Duration;
use tracing::debug;

pub struct HttpVehicleFeed {
    url: String,
    timeout: Duration,
    http: reqwest::Client,
}

impl HttpVehicleFeed {
    pub fn new(url: String, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self { url, timeout, http })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_error(&self, err: &reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(self.timeout.as_secs())
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl fmt::Debug for HttpVehicleFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpVehicleFeed")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl VehicleFeed for HttpVehicleFeed {
    async fn fetch_vehicle_batch(&self) -> Result<Vec<VehicleRecord>, FetchError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|err| self.map_error(&err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|err| self.map_error(&err))?;
        let records = decode_batch(&body)?;

        debug!(
            url = %self.url,
            bytes = body.len(),
            records = records.len(),
            "Vehicle feed fetched"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(response: String) -> Result<String, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        Ok(format!("http://{addr}/gpsPositions"))
    }

    fn http_response(status_line: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[tokio::test]
    async fn fetches_and_decodes_vehicles() -> Result<(), Box<dyn std::error::Error>> {
        let body = r#"{"vehicles":[{"vehicleId":7,"lat":54.1,"lon":18.2,"routeShortName":"5","generated":"2026-10-16T10:00:00Z"}]}"#;
        let url = serve_once(http_response("200 OK", body)).await?;
        let feed = HttpVehicleFeed::new(url, Duration::from_secs(5))?;

        let records = feed.fetch_vehicle_batch().await?;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vehicle_id.as_deref(), Some("7"));
        Ok(())
    }

    #[tokio::test]
    async fn server_error_maps_to_status() -> Result<(), Box<dyn std::error::Error>> {
        let url = serve_once(http_response("503 Service Unavailable", "{}")).await?;
        let feed = HttpVehicleFeed::new(url, Duration::from_secs(5))?;

        let result = feed.fetch_vehicle_batch().await;

        assert!(matches!(result, Err(FetchError::Status(503))));
        Ok(())
    }

    #[tokio::test]
    async fn unexpected_shape_maps_to_decode() -> Result<(), Box<dyn std::error::Error>> {
        let url = serve_once(http_response("200 OK", r#"{"data":[]}"#)).await?;
        let feed = HttpVehicleFeed::new(url, Duration::from_secs(5))?;

        let result = feed.fetch_vehicle_batch().await;

        assert!(matches!(result, Err(FetchError::Decode(_))));
        Ok(())
    }

    #[tokio::test]
    async fn refused_connection_maps_to_transport() -> Result<(), Box<dyn std::error::Error>> {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            listener.local_addr()?
        };
        let feed = HttpVehicleFeed::new(format!("http://{addr}/"), Duration::from_secs(5))?;

        let result = feed.fetch_vehicle_batch().await;

        assert!(matches!(result, Err(FetchError::Transport(_))));
        Ok(())
    }
}
