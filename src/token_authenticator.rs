use thiserror::Error;
use tonic::{
    metadata::{errors::InvalidMetadataValue, AsciiMetadataValue},
    service::Interceptor,
    transport::{Channel, ClientTlsConfig, Endpoint},
    Request, Status,
};

#[derive(Debug, Error)]
pub enum GeyserConnectionError {
    #[error("endpoint must be non-empty")]
    EmptyEndpoint,
    #[error("auth token must be non-empty")]
    EmptyToken,
    #[error("auth token is not a valid metadata value: {0}")]
    InvalidToken(#[from] InvalidMetadataValue),
    #[error("transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),
}

/// Opens a TLS channel to a bare `host:port` endpoint (scheme already stripped).
pub async fn create_grpc_channel(endpoint: &str) -> Result<Channel, GeyserConnectionError> {
    let channel = Endpoint::from_shared(format!("https://{endpoint}"))?
        .tls_config(ClientTlsConfig::new().with_enabled_roots())?
        .connect()
        .await?;
    Ok(channel)
}

/// Attaches the access token as `x-token` metadata on every outgoing call.
#[derive(Clone)]
pub struct XTokenInterceptor {
    x_token: AsciiMetadataValue,
}

impl XTokenInterceptor {
    pub fn new(token: &str) -> Result<Self, GeyserConnectionError> {
        if token.is_empty() {
            return Err(GeyserConnectionError::EmptyToken);
        }
        Ok(Self {
            x_token: token.parse()?,
        })
    }
}

impl Interceptor for XTokenInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        request.metadata_mut().insert("x-token", self.x_token.clone());
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interceptor_attaches_x_token_metadata() {
        let mut interceptor = XTokenInterceptor::new("my-secret-token").unwrap();
        let request = interceptor.call(Request::new(())).unwrap();
        assert_eq!(
            request.metadata().get("x-token").unwrap(),
            &"my-secret-token".parse::<AsciiMetadataValue>().unwrap()
        );
    }

    #[test]
    fn empty_token_is_rejected() {
        assert!(matches!(
            XTokenInterceptor::new(""),
            Err(GeyserConnectionError::EmptyToken)
        ));
    }

    #[test]
    fn non_ascii_token_is_rejected() {
        assert!(matches!(
            XTokenInterceptor::new("bad\ntoken"),
            Err(GeyserConnectionError::InvalidToken(_))
        ));
    }
}
