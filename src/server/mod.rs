//! # HTTP Surface
//!
//! - `GET /api/sse`: Server-Sent Events stream of every finalizer output
//! - `POST /api/packetpost`: queue an uplink packet onto the serial link
//!
//! CORS is open to any origin, header and method.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};

use crate::codec::{DeviceId, Packet, PacketCodec};
use crate::error::{Result, TelemetryError};
use crate::serial::SerialSender;
use crate::shutdown::ShutdownListener;
use crate::sinks::SseBroadcaster;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Arc<SseBroadcaster>,
    /// `None` when the run mode has no serial link (e.g. replay)
    pub sender: Option<SerialSender>,
    pub codec: Arc<dyn PacketCodec>,
}

/// JSON form of an uplink packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketDto {
    pub device_id: u8,
    pub timestamp: u64,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl From<&PacketDto> for Packet {
    fn from(dto: &PacketDto) -> Self {
        Packet::new(DeviceId::from(dto.device_id), dto.timestamp, dto.payload.clone())
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/sse", get(sse))
        .route("/api/packetpost", post(packet_post))
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` fires
///
/// Open SSE streams must be ended (see [`SseBroadcaster::close_all`]) for the
/// graceful shutdown to complete.
pub async fn serve(listener: TcpListener, state: AppState, mut shutdown: ShutdownListener) -> Result<()> {
    info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;
    info!("HTTP server stopped");
    Ok(())
}

async fn sse(State(state): State<AppState>) -> Response {
    let subscription = state.broadcaster.subscribe();
    debug!(client = subscription.id(), "SSE stream opened");

    let body = Body::from_stream(subscription.map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

async fn packet_post(
    State(state): State<AppState>,
    Json(dto): Json<PacketDto>,
) -> std::result::Result<Json<PacketDto>, (StatusCode, String)> {
    info!(
        "Received packet for device {} at {} with data {}",
        dto.device_id,
        dto.timestamp,
        String::from_utf8_lossy(&dto.payload)
    );

    let Some(sender) = state.sender.as_ref() else {
        error!("Serial sender is not available");
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            TelemetryError::SenderUnavailable.to_string(),
        ));
    };

    match sender.send_packet(state.codec.as_ref(), &Packet::from(&dto)) {
        Ok(frame) => {
            debug!("Encoded packet data: {:02X?}", &frame[..]);
            Ok(Json(dto))
        }
        Err(e @ TelemetryError::Codec(_)) => Err((StatusCode::BAD_REQUEST, e.to_string())),
        Err(e) => {
            error!("Failed to queue packet: {}", e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::FrameCodec;
    use crate::pipeline::{attach, Finalizer, FinalizerSet, Provider};
    use crate::shutdown::Shutdown;
    use crate::telemetry::{DataStamp, Event, GpsCoords};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    struct TestServer {
        addr: SocketAddr,
        root: Arc<Provider<f32>>,
        broadcaster: Arc<SseBroadcaster>,
        shutdown: Shutdown,
        task: tokio::task::JoinHandle<Result<()>>,
    }

    async fn start(sender: Option<SerialSender>) -> TestServer {
        let root = Arc::new(Provider::new("altitude"));
        let mut finalizers = FinalizerSet::new();
        finalizers.insert("primary/altitude", attach(&root, Finalizer::new("primary/altitude")));
        let broadcaster = Arc::new(SseBroadcaster::new(finalizers, 16));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let state = AppState {
            broadcaster: Arc::clone(&broadcaster),
            sender,
            codec: Arc::new(FrameCodec),
        };
        let task = tokio::spawn(serve(listener, state, shutdown.listener()));

        TestServer {
            addr,
            root,
            broadcaster,
            shutdown,
            task,
        }
    }

    async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
        let mut received = Vec::new();
        let mut buf = [0u8; 1024];
        tokio::time::timeout(Duration::from_secs(5), async {
            while !String::from_utf8_lossy(&received).contains(needle) {
                let n = stream.read(&mut buf).await.unwrap();
                assert!(n > 0, "connection closed before {:?}", needle);
                received.extend_from_slice(&buf[..n]);
            }
        })
        .await
        .unwrap();
        String::from_utf8_lossy(&received).into_owned()
    }

    async fn post(addr: SocketAddr, body: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST /api/packetpost HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
             Content-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_sse_headers_and_events() {
        let server = start(None).await;

        let mut stream = TcpStream::connect(server.addr).await.unwrap();
        stream
            .write_all(b"GET /api/sse HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        let head = read_until(&mut stream, "\r\n\r\n").await.to_ascii_lowercase();
        assert!(head.starts_with("http/1.1 200"));
        assert!(head.contains("content-type: text/event-stream"));
        assert!(head.contains("cache-control: no-cache"));

        // The subscription is registered before the response head is sent
        assert_eq!(server.broadcaster.active_subscriptions(), 1);
        server
            .root
            .publish(&Event::new(DataStamp::new(77, GpsCoords::UNKNOWN), 12.5));

        let body = read_until(&mut stream, "@{").await;
        assert!(body.contains("event: primary/altitude\ndata: 12.5@"));

        server.broadcaster.close_all();
        server.shutdown.trigger();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_packetpost_queues_frame() {
        let (sender, mut queue) = SerialSender::channel(4);
        let server = start(Some(sender)).await;

        let response = post(server.addr, r#"{"deviceId":0,"timestamp":42,"payload":[112,105,110,103]}"#).await;
        assert!(response.starts_with("HTTP/1.1 200"), "{}", response);
        assert!(response.contains(r#""deviceId":0"#));

        let frame = queue.recv().await.unwrap();
        let expected = FrameCodec
            .encode(&Packet::new(DeviceId::System, 42, b"ping".to_vec()))
            .unwrap();
        assert_eq!(frame.to_vec(), expected);

        server.shutdown.trigger();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_packetpost_without_sender_is_500() {
        let server = start(None).await;
        let response = post(server.addr, r#"{"deviceId":1,"timestamp":1,"payload":[]}"#).await;
        assert!(response.starts_with("HTTP/1.1 500"), "{}", response);

        server.shutdown.trigger();
        server.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_packetpost_oversized_payload_is_400() {
        let (sender, _queue) = SerialSender::channel(4);
        let server = start(Some(sender)).await;
        let payload = vec!["0"; 65].join(",");
        let response = post(
            server.addr,
            &format!(r#"{{"deviceId":1,"timestamp":1,"payload":[{}]}}"#, payload),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 400"), "{}", response);

        server.shutdown.trigger();
        server.task.await.unwrap().unwrap();
    }

    #[test]
    fn test_dto_to_packet() {
        let dto: PacketDto =
            serde_json::from_str(r#"{"deviceId":4,"timestamp":9,"payload":[1,2]}"#).unwrap();
        let packet = Packet::from(&dto);
        assert_eq!(packet.device_id, DeviceId::Gps);
        assert_eq!(packet.timestamp_ns, 9);
        assert_eq!(&packet.payload[..], &[1, 2]);
    }
}
