use http_body_util::{combinators::BoxBody, BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{body::Incoming, Method, Request, Response, StatusCode, Version};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::adapters::StreamClient;
use crate::domain::{ProtocolVersion, TunnelBridge, TunnelError};

type Body = BoxBody<Bytes, hyper::Error>;

/// Serves CONNECT requests by bridging the upgraded exchange to a TCP
/// destination.
pub struct HyperTunnelAdapter {
    bridge: Arc<TunnelBridge>,
    destination: Option<String>,
    shutdown: CancellationToken,
}

impl HyperTunnelAdapter {
    pub fn new(bridge: Arc<TunnelBridge>, shutdown: CancellationToken) -> Self {
        Self {
            bridge,
            destination: None,
            shutdown,
        }
    }

    /// Send every tunnel to a fixed destination instead of the request
    /// authority.
    pub fn with_destination(mut self, destination: Option<String>) -> Self {
        self.destination = destination;
        self
    }

    pub async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        if req.method() != Method::CONNECT {
            debug!("rejecting {} {}", req.method(), req.uri());
            return empty(StatusCode::METHOD_NOT_ALLOWED);
        }

        let destination = match self.destination_for(&req) {
            Some(destination) => destination,
            None => {
                warn!("CONNECT without host:port authority: {}", req.uri());
                return empty(StatusCode::BAD_REQUEST);
            }
        };

        let version = convert_version(req.version());
        if version == ProtocolVersion::Http10 {
            let err = TunnelError::Capability {
                version,
                reason: "CONNECT tunnels need HTTP/1.1 or later".to_string(),
            };
            warn!("CONNECT {} rejected: {}", destination, err);
            return empty(status_for(&err));
        }

        // hyper drops this future when the client goes away, aborting the dial.
        let cancel = self.shutdown.child_token();
        let connection = match self.bridge.connect(cancel.clone(), &destination).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("CONNECT {} failed: {}", destination, e);
                return empty(status_for(&e));
            }
        };

        let bridge = self.bridge.clone();
        tokio::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    let (body, response) = tokio::io::split(TokioIo::new(upgraded));
                    let mut client = StreamClient::new(body, response)
                        .with_protocol(version)
                        .with_cancellation(cancel);
                    if let Err(e) = bridge.relay(&mut client, connection).await {
                        debug!("tunnel to {} ended with {}: {}", destination, status_for(&e), e);
                    }
                }
                Err(e) => error!("Failed to upgrade to CONNECT {}: {}", destination, e),
            }
        });

        empty(StatusCode::OK)
    }

    fn destination_for(&self, req: &Request<Incoming>) -> Option<String> {
        if let Some(destination) = &self.destination {
            return Some(destination.clone());
        }
        let authority = req.uri().authority()?;
        authority.port_u16()?;
        Some(authority.to_string())
    }
}

/// Status to answer a CONNECT request with when the tunnel could not be
/// established.
pub fn status_for(err: &TunnelError) -> StatusCode {
    match err {
        TunnelError::Capability { .. } => StatusCode::HTTP_VERSION_NOT_SUPPORTED,
        TunnelError::Dial { .. }
        | TunnelError::UpstreamWrite { .. }
        | TunnelError::ClientWrite { .. }
        | TunnelError::HalfClose { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn convert_version(version: Version) -> ProtocolVersion {
    match version {
        Version::HTTP_09 | Version::HTTP_10 => ProtocolVersion::Http10,
        Version::HTTP_2 => ProtocolVersion::Http2,
        Version::HTTP_3 => ProtocolVersion::Http3,
        _ => ProtocolVersion::Http11,
    }
}

fn empty(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Empty::<Bytes>::new().map_err(|never| match never {}).boxed());
    *response.status_mut() = status;
    response
}
