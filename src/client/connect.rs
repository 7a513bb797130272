use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue, USER_AGENT};
use tokio_tungstenite::{client_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::version;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Handshake request for `config`: the target URL plus user headers and a
/// default `User-Agent`.
pub fn build_request(config: &Config) -> AppResult<Request> {
    let url = config.websocket_url();
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| AppError::config(format!("invalid server url {}: {}", url, e)))?;

    let headers = request.headers_mut();
    for (name, value) in &config.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| AppError::config(format!("invalid header name {:?}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| AppError::config(format!("invalid value for header {}: {}", name, e)))?;
        headers.append(name, value);
    }
    if !headers.contains_key(USER_AGENT) {
        let agent = HeaderValue::from_str(&version::user_agent())
            .map_err(|e| AppError::internal(&e.to_string()))?;
        headers.insert(USER_AGENT, agent);
    }

    Ok(request)
}

fn connector(config: &Config) -> AppResult<Connector> {
    if !config.use_tls {
        return Ok(Connector::Plain);
    }
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(config.insecure_skip_verify)
        .danger_accept_invalid_hostnames(config.insecure_skip_verify)
        .build()
        .map_err(|e| AppError::Connection(format!("failed to build TLS connector: {}", e)))?;
    Ok(Connector::NativeTls(tls))
}

/// Dial `config.addr` and perform the WebSocket handshake.
pub async fn connect(config: &Config) -> AppResult<WsStream> {
    let request = build_request(config)?;
    let url = request.uri().to_string();
    info!("Connecting to {}", url);

    let tcp = TcpStream::connect(&config.addr)
        .await
        .map_err(|e| AppError::Connection(format!("dial {}: {}", config.addr, e)))?;
    tcp.set_nodelay(true)?;

    let (stream, response) =
        client_async_tls_with_config(request, tcp, None, Some(connector(config)?)).await?;
    debug!(status = %response.status(), "Handshake complete");

    Ok(stream)
}
