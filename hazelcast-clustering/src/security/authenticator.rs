//! The connection handshake.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hazelcast_wire::protocol::{ClientMessage, ErrorCode};
use hazelcast_wire::{HazelcastError, Result};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::connection::Connection;
use crate::security::Credentials;

/// Client identity presented to every member during the handshake.
#[derive(Debug, Clone)]
pub struct AuthenticationContext {
    /// Name of the cluster to join; members of other clusters reject the client.
    pub cluster_name: String,
    /// Unique id of this client instance.
    pub client_id: Uuid,
    /// Human-readable name of this client instance.
    pub client_name: String,
    /// Labels attached to this client.
    pub labels: Vec<String>,
}

/// What a member tells the client about itself and its cluster after a
/// successful handshake.
#[derive(Debug, Clone)]
pub struct AuthenticationResult {
    /// Id of the cluster.
    pub cluster_id: Uuid,
    /// Id of the member the connection is bound to.
    pub member_id: Uuid,
    /// Public address of the member.
    pub member_address: SocketAddr,
    /// Codebase version of the member.
    pub server_version: String,
    /// Whether the cluster supports client failover.
    pub failover_supported: bool,
    /// Number of partitions in the cluster.
    pub partition_count: usize,
    /// Serialization version used by the member.
    pub serialization_version: u8,
}

/// Decoded handshake response.
#[derive(Debug, Clone)]
pub struct AuthenticationResponse {
    /// Status code reported by the member.
    pub status: u8,
    /// Member and cluster identity; present when authenticated.
    pub result: Option<AuthenticationResult>,
}

impl AuthenticationResponse {
    /// Status code indicating successful authentication.
    pub const STATUS_AUTHENTICATED: u8 = 0;
    /// Status code indicating credentials failed.
    pub const STATUS_CREDENTIALS_FAILED: u8 = 1;
    /// Status code indicating serialization version mismatch.
    pub const STATUS_SERIALIZATION_MISMATCH: u8 = 2;
    /// Status code indicating the client is not allowed in the cluster.
    pub const STATUS_NOT_ALLOWED_IN_CLUSTER: u8 = 3;

    /// Creates a successful authentication response.
    pub fn new_authenticated(result: AuthenticationResult) -> Self {
        Self {
            status: Self::STATUS_AUTHENTICATED,
            result: Some(result),
        }
    }

    /// Creates a failed authentication response.
    pub fn new_failed(status: u8) -> Self {
        Self { status, result: None }
    }

    /// Returns true if the authentication was successful.
    pub fn is_authenticated(&self) -> bool {
        self.status == Self::STATUS_AUTHENTICATED
    }
}

/// Encodes handshake requests and decodes handshake responses.
pub trait AuthenticationCodec: Send + Sync {
    /// Encodes the authentication request for the given identity and credentials.
    fn encode_request(
        &self,
        context: &AuthenticationContext,
        credentials: &Credentials,
    ) -> ClientMessage;

    /// Decodes the authentication response.
    fn decode_response(&self, response: &ClientMessage) -> Result<AuthenticationResponse>;
}

/// Performs the handshake on a freshly opened connection.
///
/// Rejected credentials must be reported as
/// [`HazelcastError::Authentication`] so the caller can tell them apart
/// from transport failures.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Authenticates the connection.
    async fn authenticate(
        &self,
        connection: &Connection,
        context: &AuthenticationContext,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<AuthenticationResult>;
}

impl std::fmt::Debug for dyn Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Authenticator")
    }
}

/// Authenticator that exchanges one request/response pair through an
/// [`AuthenticationCodec`].
#[derive(Clone)]
pub struct CodecAuthenticator {
    codec: Arc<dyn AuthenticationCodec>,
}

impl CodecAuthenticator {
    /// Creates an authenticator backed by the given codec.
    pub fn new(codec: Arc<dyn AuthenticationCodec>) -> Self {
        Self { codec }
    }
}

impl std::fmt::Debug for CodecAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecAuthenticator").finish_non_exhaustive()
    }
}

#[async_trait]
impl Authenticator for CodecAuthenticator {
    async fn authenticate(
        &self,
        connection: &Connection,
        context: &AuthenticationContext,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<AuthenticationResult> {
        let request = self.codec.encode_request(context, credentials);
        let response = connection.send(request, cancel).await.map_err(|e| match e {
            HazelcastError::Remote(remote) if remote.code() == ErrorCode::Authentication => {
                HazelcastError::Authentication(remote.to_string())
            }
            other => other,
        })?;

        let response = self.codec.decode_response(&response)?;
        match response.status {
            AuthenticationResponse::STATUS_AUTHENTICATED => response.result.ok_or_else(|| {
                HazelcastError::Protocol("authenticated response without member identity".into())
            }),
            AuthenticationResponse::STATUS_CREDENTIALS_FAILED => {
                Err(HazelcastError::Authentication(format!(
                    "member at {} rejected the credentials",
                    connection.address()
                )))
            }
            AuthenticationResponse::STATUS_SERIALIZATION_MISMATCH => {
                Err(HazelcastError::Protocol(format!(
                    "serialization version mismatch with member at {}",
                    connection.address()
                )))
            }
            AuthenticationResponse::STATUS_NOT_ALLOWED_IN_CLUSTER => {
                Err(HazelcastError::Connection(format!(
                    "member at {} does not allow this client in cluster '{}'",
                    connection.address(),
                    context.cluster_name
                )))
            }
            status => Err(HazelcastError::Protocol(format!(
                "unknown authentication status {}",
                status
            ))),
        }
    }
}
