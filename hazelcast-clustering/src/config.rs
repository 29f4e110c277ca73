//! Client configuration types and builders.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default cluster name.
const DEFAULT_CLUSTER_NAME: &str = "dev";
/// Default member port.
const DEFAULT_PORT: u16 = 5701;
/// Default connection timeout.
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);
/// Default heartbeat period.
const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(5);
/// Default heartbeat timeout.
const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default heartbeat ping timeout.
const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(10);
/// Default initial retry backoff.
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Default maximum retry backoff.
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);
/// Default retry multiplier.
const DEFAULT_RETRY_MULTIPLIER: f64 = 1.05;
/// Default retry jitter.
const DEFAULT_RETRY_JITTER: f64 = 0.0;
/// Default time budget for connecting to the cluster.
const DEFAULT_CLUSTER_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
/// Default invocation timeout.
const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);
/// Default number of retries sent without delay.
const DEFAULT_FAST_RETRY_COUNT: u32 = 5;
/// Default upper bound of the delay between invocation retries.
const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(1);

fn default_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
}

/// Configuration error returned when validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for hazelcast_wire::HazelcastError {
    fn from(error: ConfigError) -> Self {
        Self::Configuration(error.message)
    }
}

/// Network configuration for cluster connections.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    addresses: Vec<SocketAddr>,
    connection_timeout: Duration,
    smart_routing: bool,
    redo_operation: bool,
}

impl NetworkConfig {
    /// Returns the configured cluster member addresses.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    /// Returns the connection timeout duration.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns true if the client keeps a connection to every member and
    /// routes requests to partition owners.
    pub fn smart_routing(&self) -> bool {
        self.smart_routing
    }

    /// Returns true if invocations that lost their connection may be sent
    /// again even though they are not known to be idempotent.
    pub fn redo_operation(&self) -> bool {
        self.redo_operation
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            addresses: vec![default_address()],
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            smart_routing: true,
            redo_operation: false,
        }
    }
}

/// Builder for `NetworkConfig`.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfigBuilder {
    addresses: Vec<SocketAddr>,
    connection_timeout: Option<Duration>,
    smart_routing: Option<bool>,
    redo_operation: Option<bool>,
}

impl NetworkConfigBuilder {
    /// Creates a new network configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a cluster member address.
    pub fn add_address(mut self, address: SocketAddr) -> Self {
        self.addresses.push(address);
        self
    }

    /// Sets the cluster member addresses, replacing any previously configured.
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.addresses = addresses.into_iter().collect();
        self
    }

    /// Sets the connection timeout duration.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = Some(timeout);
        self
    }

    /// Enables or disables smart routing.
    pub fn smart_routing(mut self, enabled: bool) -> Self {
        self.smart_routing = Some(enabled);
        self
    }

    /// Allows non-idempotent invocations to be retried after a connection loss.
    pub fn redo_operation(mut self, enabled: bool) -> Self {
        self.redo_operation = Some(enabled);
        self
    }

    /// Builds the network configuration.
    pub fn build(self) -> Result<NetworkConfig, ConfigError> {
        let addresses = if self.addresses.is_empty() {
            vec![default_address()]
        } else {
            self.addresses
        };

        let connection_timeout = self.connection_timeout.unwrap_or(DEFAULT_CONNECTION_TIMEOUT);
        if connection_timeout.is_zero() {
            return Err(ConfigError::new("connection_timeout must be positive"));
        }

        Ok(NetworkConfig {
            addresses,
            connection_timeout,
            smart_routing: self.smart_routing.unwrap_or(true),
            redo_operation: self.redo_operation.unwrap_or(false),
        })
    }
}

/// Heartbeat configuration.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    period: Duration,
    timeout: Duration,
    ping_timeout: Duration,
}

impl HeartbeatConfig {
    /// Returns the interval between heartbeat runs.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns how long a connection may stay silent before it is closed.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns how long a single ping may wait for its response.
    pub fn ping_timeout(&self) -> Duration {
        self.ping_timeout
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_HEARTBEAT_PERIOD,
            timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }
}

/// Builder for `HeartbeatConfig`.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatConfigBuilder {
    period: Option<Duration>,
    timeout: Option<Duration>,
    ping_timeout: Option<Duration>,
}

impl HeartbeatConfigBuilder {
    /// Creates a new heartbeat configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the interval between heartbeat runs.
    pub fn period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    /// Sets how long a connection may stay silent before it is closed.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets how long a single ping may wait for its response.
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = Some(timeout);
        self
    }

    /// Builds the heartbeat configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `period` is zero
    /// - `timeout` does not exceed `period`
    pub fn build(self) -> Result<HeartbeatConfig, ConfigError> {
        let period = self.period.unwrap_or(DEFAULT_HEARTBEAT_PERIOD);
        let timeout = self.timeout.unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT);
        let ping_timeout = self.ping_timeout.unwrap_or(DEFAULT_PING_TIMEOUT);

        if period.is_zero() {
            return Err(ConfigError::new("heartbeat period must be positive"));
        }

        if timeout <= period {
            return Err(ConfigError::new(
                "heartbeat timeout must exceed the heartbeat period",
            ));
        }

        Ok(HeartbeatConfig {
            period,
            timeout,
            ping_timeout,
        })
    }
}

/// Retry configuration for connecting to the cluster.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    jitter: f64,
    cluster_connect_timeout: Duration,
}

impl RetryConfig {
    /// Returns the initial backoff duration.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Returns the maximum backoff duration.
    pub fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Returns the backoff multiplier.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the jitter factor applied to each delay.
    pub fn jitter(&self) -> f64 {
        self.jitter
    }

    /// Returns the total time budget for connecting to the cluster.
    pub fn cluster_connect_timeout(&self) -> Duration {
        self.cluster_connect_timeout
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_RETRY_MULTIPLIER,
            jitter: DEFAULT_RETRY_JITTER,
            cluster_connect_timeout: DEFAULT_CLUSTER_CONNECT_TIMEOUT,
        }
    }
}

impl From<RetryConfig> for RetryConfigBuilder {
    fn from(config: RetryConfig) -> Self {
        Self {
            initial_backoff: Some(config.initial_backoff),
            max_backoff: Some(config.max_backoff),
            multiplier: Some(config.multiplier),
            jitter: Some(config.jitter),
            cluster_connect_timeout: Some(config.cluster_connect_timeout),
        }
    }
}

/// Builder for `RetryConfig`.
#[derive(Debug, Clone, Default)]
pub struct RetryConfigBuilder {
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
    cluster_connect_timeout: Option<Duration>,
}

impl RetryConfigBuilder {
    /// Creates a new retry configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial backoff duration.
    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = Some(backoff);
        self
    }

    /// Sets the maximum backoff duration.
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    /// Sets the backoff multiplier.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Sets the jitter factor, between 0.0 and 1.0.
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Sets the total time budget for connecting to the cluster.
    pub fn cluster_connect_timeout(mut self, timeout: Duration) -> Self {
        self.cluster_connect_timeout = Some(timeout);
        self
    }

    /// Builds the retry configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `initial_backoff` exceeds `max_backoff`
    /// - `multiplier` is less than 1.0
    /// - `jitter` is outside `[0.0, 1.0]`
    pub fn build(self) -> Result<RetryConfig, ConfigError> {
        let initial_backoff = self.initial_backoff.unwrap_or(DEFAULT_INITIAL_BACKOFF);
        let max_backoff = self.max_backoff.unwrap_or(DEFAULT_MAX_BACKOFF);
        let multiplier = self.multiplier.unwrap_or(DEFAULT_RETRY_MULTIPLIER);
        let jitter = self.jitter.unwrap_or(DEFAULT_RETRY_JITTER);
        let cluster_connect_timeout = self
            .cluster_connect_timeout
            .unwrap_or(DEFAULT_CLUSTER_CONNECT_TIMEOUT);

        if initial_backoff > max_backoff {
            return Err(ConfigError::new(
                "initial_backoff must not exceed max_backoff",
            ));
        }

        if multiplier < 1.0 {
            return Err(ConfigError::new("multiplier must be at least 1.0"));
        }

        if !(0.0..=1.0).contains(&jitter) {
            return Err(ConfigError::new("jitter must be between 0.0 and 1.0"));
        }

        Ok(RetryConfig {
            initial_backoff,
            max_backoff,
            multiplier,
            jitter,
            cluster_connect_timeout,
        })
    }
}

/// Invocation configuration.
#[derive(Debug, Clone)]
pub struct InvocationConfig {
    invocation_timeout: Duration,
    fast_retry_count: u32,
    max_retry_delay: Duration,
}

impl InvocationConfig {
    /// Returns how long an invocation may take, retries included.
    pub fn invocation_timeout(&self) -> Duration {
        self.invocation_timeout
    }

    /// Returns how many attempts are retried without delay.
    pub fn fast_retry_count(&self) -> u32 {
        self.fast_retry_count
    }

    /// Returns the upper bound of the delay between retries.
    pub fn max_retry_delay(&self) -> Duration {
        self.max_retry_delay
    }

    /// Returns the delay before the next retry, given how many attempts
    /// have already been made.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        if attempts < self.fast_retry_count {
            return Duration::ZERO;
        }
        let exponent = (attempts - self.fast_retry_count).min(63);
        let millis = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        Duration::from_millis(millis).min(self.max_retry_delay)
    }
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            fast_retry_count: DEFAULT_FAST_RETRY_COUNT,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
        }
    }
}

/// Builder for `InvocationConfig`.
#[derive(Debug, Clone, Default)]
pub struct InvocationConfigBuilder {
    invocation_timeout: Option<Duration>,
    fast_retry_count: Option<u32>,
    max_retry_delay: Option<Duration>,
}

impl InvocationConfigBuilder {
    /// Creates a new invocation configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long an invocation may take, retries included.
    pub fn invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = Some(timeout);
        self
    }

    /// Sets how many attempts are retried without delay.
    pub fn fast_retry_count(mut self, count: u32) -> Self {
        self.fast_retry_count = Some(count);
        self
    }

    /// Sets the upper bound of the delay between retries.
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = Some(delay);
        self
    }

    /// Builds the invocation configuration.
    pub fn build(self) -> Result<InvocationConfig, ConfigError> {
        let invocation_timeout = self.invocation_timeout.unwrap_or(DEFAULT_INVOCATION_TIMEOUT);
        if invocation_timeout.is_zero() {
            return Err(ConfigError::new("invocation_timeout must be positive"));
        }

        Ok(InvocationConfig {
            invocation_timeout,
            fast_retry_count: self.fast_retry_count.unwrap_or(DEFAULT_FAST_RETRY_COUNT),
            max_retry_delay: self.max_retry_delay.unwrap_or(DEFAULT_MAX_RETRY_DELAY),
        })
    }
}

/// Security configuration for authentication.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
}

impl SecurityConfig {
    /// Returns the configured username.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Returns the configured password.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Returns the configured authentication token.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns true if username/password credentials are configured.
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Returns true if token-based authentication is configured.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

/// Builder for `SecurityConfig`.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfigBuilder {
    username: Option<String>,
    password: Option<String>,
    token: Option<String>,
}

impl SecurityConfigBuilder {
    /// Creates a new security configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the username for authentication.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password for authentication.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets both username and password for authentication.
    pub fn credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username(username).password(password)
    }

    /// Sets the authentication token for token-based authentication.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Builds the security configuration, returning an error if validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Only one of `username` or `password` is set (both must be provided together)
    /// - Both credentials and token are set (mutually exclusive)
    pub fn build(self) -> Result<SecurityConfig, ConfigError> {
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::new(
                "both username and password must be provided together",
            ));
        }

        if self.token.is_some() && self.username.is_some() {
            return Err(ConfigError::new(
                "token and username/password authentication are mutually exclusive",
            ));
        }

        Ok(SecurityConfig {
            username: self.username,
            password: self.password,
            token: self.token,
        })
    }
}

/// Main client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    cluster_name: String,
    client_name: Option<String>,
    labels: Vec<String>,
    network: NetworkConfig,
    heartbeat: HeartbeatConfig,
    retry: RetryConfig,
    invocation: InvocationConfig,
    security: SecurityConfig,
}

impl ClientConfig {
    /// Creates a new client configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Returns the cluster name.
    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Returns the client name, if one was configured.
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Returns the labels sent to members during authentication.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Returns the network configuration.
    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    /// Returns the heartbeat configuration.
    pub fn heartbeat(&self) -> &HeartbeatConfig {
        &self.heartbeat
    }

    /// Returns the cluster connect retry configuration.
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Returns the invocation configuration.
    pub fn invocation(&self) -> &InvocationConfig {
        &self.invocation
    }

    /// Returns the security configuration.
    pub fn security(&self) -> &SecurityConfig {
        &self.security
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cluster_name: DEFAULT_CLUSTER_NAME.to_string(),
            client_name: None,
            labels: Vec::new(),
            network: NetworkConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            retry: RetryConfig::default(),
            invocation: InvocationConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// Builder for `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    cluster_name: Option<String>,
    client_name: Option<String>,
    labels: Vec<String>,
    network: NetworkConfigBuilder,
    heartbeat: HeartbeatConfigBuilder,
    retry: RetryConfigBuilder,
    invocation: InvocationConfigBuilder,
    security: SecurityConfigBuilder,
}

impl ClientConfigBuilder {
    /// Creates a new client configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the cluster name.
    pub fn cluster_name(mut self, name: impl Into<String>) -> Self {
        self.cluster_name = Some(name.into());
        self
    }

    /// Sets the client name.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    /// Adds a client label.
    pub fn add_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    /// Configures network settings using a builder function.
    pub fn network<F>(mut self, f: F) -> Self
    where
        F: FnOnce(NetworkConfigBuilder) -> NetworkConfigBuilder,
    {
        self.network = f(self.network);
        self
    }

    /// Configures heartbeat settings using a builder function.
    pub fn heartbeat<F>(mut self, f: F) -> Self
    where
        F: FnOnce(HeartbeatConfigBuilder) -> HeartbeatConfigBuilder,
    {
        self.heartbeat = f(self.heartbeat);
        self
    }

    /// Configures cluster connect retry settings using a builder function.
    pub fn retry<F>(mut self, f: F) -> Self
    where
        F: FnOnce(RetryConfigBuilder) -> RetryConfigBuilder,
    {
        self.retry = f(self.retry);
        self
    }

    /// Configures invocation settings using a builder function.
    pub fn invocation<F>(mut self, f: F) -> Self
    where
        F: FnOnce(InvocationConfigBuilder) -> InvocationConfigBuilder,
    {
        self.invocation = f(self.invocation);
        self
    }

    /// Configures security settings using a builder function.
    pub fn security<F>(mut self, f: F) -> Self
    where
        F: FnOnce(SecurityConfigBuilder) -> SecurityConfigBuilder,
    {
        self.security = f(self.security);
        self
    }

    /// Adds a cluster member address.
    pub fn add_address(mut self, address: SocketAddr) -> Self {
        self.network = self.network.add_address(address);
        self
    }

    /// Sets the cluster member addresses.
    pub fn addresses(mut self, addresses: impl IntoIterator<Item = SocketAddr>) -> Self {
        self.network = self.network.addresses(addresses);
        self
    }

    /// Sets the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.network = self.network.connection_timeout(timeout);
        self
    }

    /// Enables or disables smart routing.
    pub fn smart_routing(mut self, enabled: bool) -> Self {
        self.network = self.network.smart_routing(enabled);
        self
    }

    /// Sets credentials for authentication.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.security = self.security.credentials(username, password);
        self
    }

    /// Builds the client configuration, returning an error if validation fails.
    pub fn build(self) -> Result<ClientConfig, ConfigError> {
        let cluster_name = self
            .cluster_name
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME.to_string());

        if cluster_name.is_empty() {
            return Err(ConfigError::new("cluster_name must not be empty"));
        }

        Ok(ClientConfig {
            cluster_name,
            client_name: self.client_name,
            labels: self.labels,
            network: self.network.build()?,
            heartbeat: self.heartbeat.build()?,
            retry: self.retry.build()?,
            invocation: self.invocation.build()?,
            security: self.security.build()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.cluster_name(), "dev");
        assert_eq!(config.network().addresses().len(), 1);
        assert_eq!(
            config.network().addresses()[0],
            "127.0.0.1:5701".parse::<SocketAddr>().unwrap()
        );
        assert!(config.network().smart_routing());
        assert!(!config.network().redo_operation());
        assert_eq!(config.heartbeat().period(), Duration::from_secs(5));
        assert_eq!(config.heartbeat().timeout(), Duration::from_secs(60));
        assert_eq!(config.invocation().fast_retry_count(), 5);
    }

    #[test]
    fn test_default_matches_built_default() {
        let built = ClientConfig::builder().build().unwrap();
        let default = ClientConfig::default();
        assert_eq!(built.cluster_name(), default.cluster_name());
        assert_eq!(built.network().addresses(), default.network().addresses());
        assert_eq!(built.retry().multiplier(), default.retry().multiplier());
        assert_eq!(
            built.invocation().invocation_timeout(),
            default.invocation().invocation_timeout()
        );
    }

    #[test]
    fn test_builder_empty_cluster_name_fails() {
        let result = ClientConfig::builder().cluster_name("").build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("cluster_name must not be empty"));
    }

    #[test]
    fn test_builder_addresses_replaces() {
        let addr1: SocketAddr = "192.168.1.1:5701".parse().unwrap();
        let addr2: SocketAddr = "192.168.1.2:5701".parse().unwrap();

        let config = ClientConfig::builder()
            .add_address("10.0.0.1:5701".parse().unwrap())
            .addresses([addr1, addr2])
            .build()
            .unwrap();

        assert_eq!(config.network().addresses(), &[addr1, addr2]);
    }

    #[test]
    fn test_builder_client_identity() {
        let config = ClientConfig::builder()
            .client_name("orders-service")
            .add_label("blue")
            .add_label("eu-west")
            .build()
            .unwrap();

        assert_eq!(config.client_name(), Some("orders-service"));
        assert_eq!(config.labels(), &["blue".to_string(), "eu-west".to_string()]);
    }

    #[test]
    fn test_heartbeat_timeout_must_exceed_period() {
        let result = ClientConfig::builder()
            .heartbeat(|h| h.period(Duration::from_secs(10)).timeout(Duration::from_secs(10)))
            .build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("heartbeat timeout must exceed"));
    }

    #[test]
    fn test_retry_jitter_range() {
        assert!(RetryConfigBuilder::new().jitter(1.5).build().is_err());
        assert!(RetryConfigBuilder::new().jitter(-0.1).build().is_err());
        assert_eq!(RetryConfigBuilder::new().jitter(0.5).build().unwrap().jitter(), 0.5);
    }

    #[test]
    fn test_retry_initial_exceeds_max_fails() {
        let result = RetryConfigBuilder::new()
            .initial_backoff(Duration::from_secs(60))
            .max_backoff(Duration::from_secs(10))
            .build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("initial_backoff must not exceed max_backoff"));
    }

    #[test]
    fn test_retry_multiplier_less_than_one_fails() {
        let result = RetryConfigBuilder::new().multiplier(0.5).build();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("multiplier must be at least 1.0"));
    }

    #[test]
    fn test_retry_config_round_trips_through_builder() {
        let original = RetryConfigBuilder::new()
            .initial_backoff(Duration::from_millis(100))
            .cluster_connect_timeout(Duration::from_secs(3))
            .build()
            .unwrap();
        let rebuilt = RetryConfigBuilder::from(original.clone()).build().unwrap();
        assert_eq!(rebuilt.initial_backoff(), original.initial_backoff());
        assert_eq!(rebuilt.cluster_connect_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_retry_delay_fast_then_exponential() {
        let config = InvocationConfig::default();
        for attempts in 0..5 {
            assert_eq!(config.retry_delay(attempts), Duration::ZERO);
        }
        assert_eq!(config.retry_delay(5), Duration::from_millis(1));
        assert_eq!(config.retry_delay(6), Duration::from_millis(2));
        assert_eq!(config.retry_delay(9), Duration::from_millis(16));
        assert_eq!(config.retry_delay(15), Duration::from_secs(1));
        assert_eq!(config.retry_delay(200), Duration::from_secs(1));
    }

    #[test]
    fn test_security_partial_credentials_fails() {
        let result = SecurityConfigBuilder::new().username("admin").build();
        assert!(result.unwrap_err().to_string().contains("both username and password"));
    }

    #[test]
    fn test_security_token_and_credentials_exclusive() {
        let result = SecurityConfigBuilder::new()
            .credentials("admin", "pw")
            .token("abc")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_fluent_sub_builder_api() {
        let config = ClientConfig::builder()
            .cluster_name("test-cluster")
            .network(|n| {
                n.add_address("192.168.1.1:5701".parse().unwrap())
                    .connection_timeout(Duration::from_secs(20))
                    .redo_operation(true)
            })
            .retry(|r| r.multiplier(1.5).jitter(0.2))
            .invocation(|i| i.fast_retry_count(2).max_retry_delay(Duration::from_millis(500)))
            .security(|s| s.credentials("user", "pass"))
            .smart_routing(false)
            .build()
            .unwrap();

        assert_eq!(config.cluster_name(), "test-cluster");
        assert_eq!(config.network().connection_timeout(), Duration::from_secs(20));
        assert!(config.network().redo_operation());
        assert!(!config.network().smart_routing());
        assert_eq!(config.retry().jitter(), 0.2);
        assert_eq!(config.invocation().fast_retry_count(), 2);
        assert!(config.security().has_credentials());
    }

    #[test]
    fn test_config_error_into_hazelcast_error() {
        let err: hazelcast_wire::HazelcastError = ConfigError::new("bad").into();
        assert!(matches!(err, hazelcast_wire::HazelcastError::Configuration(_)));
    }

    #[test]
    fn test_config_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ConfigError>();
    }
}
