//! Credentials and the connection handshake.

pub mod authenticator;
pub mod credentials;

pub use authenticator::{
    AuthenticationCodec, AuthenticationContext, AuthenticationResponse, AuthenticationResult,
    Authenticator, CodecAuthenticator,
};
pub use credentials::{Credentials, CredentialsFactory, StaticCredentialsFactory};
