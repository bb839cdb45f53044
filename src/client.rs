use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::{future::Future, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::{
    error::{CrestronError, Result},
    protocol::{
        device_path, shade_path, stop_path, DevicesResponse, LoginResponse, RoomsResponse,
        SetStateRequest, SetStateResult, ShadesResponse, VersionResponse, AUTH_KEY_HEADER,
        AUTH_TOKEN_HEADER, DEVICES_PATH, LOGIN_PATH, NETWORK_AUTHENTICATION_REQUIRED, ROOMS_PATH,
        SET_STATE_PATH, SHADES_PATH,
    },
    types::{Device, HubConfig, Room, Shade, ShadeCommand, TimeoutConfig},
};

/// Hub operations the coordinator depends on
///
/// [`HubClient`] is the production implementation; the trait exists so the
/// polling and command logic can run against any source of shade data.
#[async_trait]
pub trait ShadeApi: Send + Sync {
    /// Host this API talks to
    fn host(&self) -> &str;

    /// Exchange the auth token for a fresh auth key
    async fn login(&self) -> Result<String>;

    /// Replace the auth token and drop the current session
    async fn set_auth_token(&self, auth_token: String);

    /// Full shade listing
    async fn list_shades(&self) -> Result<Vec<Shade>>;

    /// Room listing
    async fn list_rooms(&self) -> Result<Vec<Room>>;

    /// Apply a batch of partial shade updates
    async fn set_shade_state(&self, commands: &[ShadeCommand]) -> Result<SetStateResult>;

    /// Halt a moving shade
    async fn stop_shade(&self, id: u32) -> Result<()>;
}

/// HTTP client for the Crestron Home REST API
///
/// Holds one hub session. Every keyed call logs in first if no auth key is
/// cached, and on an auth failure logs in once more and retries the call a
/// single time before surfacing the error.
///
/// # Examples
///
/// ```no_run
/// use crestron_shades::{HubClient, HubConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HubClient::new(&HubConfig::new("192.168.1.20", "my-api-token"))?;
///     for shade in client.list_shades().await? {
///         println!("{} is {}% open", shade.name, shade.position);
///     }
///     Ok(())
/// }
/// ```
pub struct HubClient {
    http: reqwest::Client,
    host: String,
    base_url: String,
    auth_token: RwLock<String>,
    auth_key: RwLock<Option<String>>,
    login_lock: Mutex<()>,
    timeout_config: TimeoutConfig,
}

impl HubClient {
    /// Create a client for the configured hub
    ///
    /// No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`CrestronError::InvalidConfig`] if the config does not validate
    /// or the HTTP client cannot be built.
    pub fn new(config: &HubConfig) -> Result<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeouts.request_timeout_ms))
            .build()
            .map_err(|e| CrestronError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            host: config.host.clone(),
            base_url: config.base_url(),
            auth_token: RwLock::new(config.auth_token.clone()),
            auth_key: RwLock::new(None),
            login_lock: Mutex::new(()),
            timeout_config: config.timeouts.clone(),
        })
    }

    /// Host this client talks to
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Check if a session key is cached
    pub async fn has_session(&self) -> bool {
        self.auth_key.read().await.is_some()
    }

    /// Check the hub is reachable and accepts the auth token
    ///
    /// Returns the API version when the hub reports one.
    ///
    /// # Errors
    ///
    /// Returns [`CrestronError::Auth`] if the token is rejected, or a
    /// connection or API error otherwise.
    pub async fn ping(&self) -> Result<Option<String>> {
        let token = self.auth_token.read().await.clone();
        let request = self.http.get(&self.base_url).header(AUTH_TOKEN_HEADER, token);
        let response = self.check_status(self.send(request).await?, "ping").await?;
        let body: VersionResponse = self.read_json(response, "ping").await?;

        debug!(host = %self.host, version = ?body.version, "Hub answered ping");
        Ok(body.version)
    }

    /// Log in and cache a fresh auth key
    ///
    /// # Errors
    ///
    /// Returns [`CrestronError::Auth`] if the token is rejected or the hub
    /// answers without a key.
    pub async fn login(&self) -> Result<String> {
        let _guard = self.login_lock.lock().await;
        *self.auth_key.write().await = None;

        let token = self.auth_token.read().await.clone();
        let request = self
            .http
            .get(self.url(LOGIN_PATH))
            .header(AUTH_TOKEN_HEADER, token);
        let response = self.check_status(self.send(request).await?, "login").await?;
        let body: LoginResponse = self.read_json(response, "login").await?;

        let auth_key = body
            .authkey
            .filter(|key| !key.is_empty())
            .ok_or_else(|| CrestronError::Auth("No auth key received from hub".to_string()))?;

        *self.auth_key.write().await = Some(auth_key.clone());
        info!(host = %self.host, "Logged in to Crestron hub");
        Ok(auth_key)
    }

    /// Replace the auth token; the next call logs in with it
    pub async fn set_auth_token(&self, auth_token: String) {
        *self.auth_token.write().await = auth_token;
        *self.auth_key.write().await = None;
    }

    /// List every device known to the hub
    ///
    /// # Errors
    ///
    /// Returns auth, connection or API errors from the request.
    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let body: DevicesResponse = self
            .execute_with_reauth(|key| self.get_json(DEVICES_PATH, key, "list devices"))
            .await?;
        Ok(body.devices.into_iter().map(Device::from).collect())
    }

    /// Fetch one device
    ///
    /// # Errors
    ///
    /// Returns [`CrestronError::DeviceNotFound`] if the hub does not know the id.
    pub async fn get_device(&self, id: u32) -> Result<Device> {
        let path = device_path(id);
        let body: DevicesResponse = self
            .execute_with_reauth(|key| {
                self.get_json_or(&path, key, "get device", CrestronError::DeviceNotFound(id))
            })
            .await?;
        body.devices
            .into_iter()
            .next()
            .map(Device::from)
            .ok_or(CrestronError::DeviceNotFound(id))
    }

    /// List every shade with its position normalized to 0-100
    ///
    /// # Errors
    ///
    /// Returns auth, connection or API errors from the request.
    pub async fn list_shades(&self) -> Result<Vec<Shade>> {
        let body: ShadesResponse = self
            .execute_with_reauth(|key| self.get_json(SHADES_PATH, key, "list shades"))
            .await?;
        debug!(host = %self.host, count = body.shades.len(), "Fetched shades");
        Ok(body.shades.into_iter().map(|s| s.into_shade()).collect())
    }

    /// Fetch one shade
    ///
    /// # Errors
    ///
    /// Returns [`CrestronError::ShadeNotFound`] if the hub does not know the id.
    pub async fn get_shade(&self, id: u32) -> Result<Shade> {
        let path = shade_path(id);
        let body: ShadesResponse = self
            .execute_with_reauth(|key| {
                self.get_json_or(&path, key, "get shade", CrestronError::ShadeNotFound(id))
            })
            .await?;
        body.shades
            .into_iter()
            .next()
            .map(|s| s.into_shade())
            .ok_or(CrestronError::ShadeNotFound(id))
    }

    /// List every room
    ///
    /// # Errors
    ///
    /// Returns auth, connection or API errors from the request.
    pub async fn list_rooms(&self) -> Result<Vec<Room>> {
        let body: RoomsResponse = self
            .execute_with_reauth(|key| self.get_json(ROOMS_PATH, key, "list rooms"))
            .await?;
        Ok(body.rooms)
    }

    /// Apply a batch of partial shade updates
    ///
    /// The batch is sent as-is; the hub merges it with the current state.
    ///
    /// # Errors
    ///
    /// Returns [`CrestronError::InvalidParameters`] for an empty batch and
    /// [`CrestronError::Api`] if the hub does not report success.
    pub async fn set_shade_state(&self, commands: &[ShadeCommand]) -> Result<SetStateResult> {
        if commands.is_empty() {
            return Err(CrestronError::InvalidParameters(
                "setstate requires at least one shade".to_string(),
            ));
        }

        let result: SetStateResult = self
            .execute_with_reauth(|key| async move {
                let request = self
                    .http
                    .post(self.url(SET_STATE_PATH))
                    .header(AUTH_KEY_HEADER, key)
                    .json(&SetStateRequest { shades: commands });
                let response = self.check_status(self.send(request).await?, "set state").await?;
                self.read_json(response, "set state").await
            })
            .await?;

        if !result.is_success() {
            warn!(
                host = %self.host,
                status = %result.status,
                "Hub rejected shade update"
            );
            return Err(CrestronError::Api {
                status: None,
                message: result.error_message.clone().unwrap_or_else(|| {
                    format!("set state returned status '{}'", result.status)
                }),
            });
        }

        debug!(host = %self.host, count = commands.len(), "Shade update accepted");
        Ok(result)
    }

    /// Halt a moving shade
    ///
    /// # Errors
    ///
    /// Returns auth, connection or API errors from the request.
    pub async fn stop_shade(&self, id: u32) -> Result<()> {
        let path = stop_path(id);
        self.execute_with_reauth(|key| {
            let path = &path;
            async move {
                let request = self.http.post(self.url(path)).header(AUTH_KEY_HEADER, key);
                self.check_status(self.send(request).await?, "stop shade")
                    .await
                    .map(|_| ())
            }
        })
        .await
    }

    /// Run a keyed call, logging in again and retrying once on an auth error
    async fn execute_with_reauth<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        // the read guard must be gone before login() takes the write lock
        let cached = self.auth_key.read().await.clone();
        let auth_key = match cached {
            Some(key) => key,
            None => self.login().await?,
        };

        match operation(auth_key).await {
            Err(e) if e.is_auth_error() => {
                debug!(host = %self.host, "Auth key rejected, logging in again and retrying");
                let auth_key = self.login().await?;
                operation(auth_key).await
            }
            other => other,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        auth_key: String,
        context: &'static str,
    ) -> Result<T> {
        let request = self.http.get(self.url(path)).header(AUTH_KEY_HEADER, auth_key);
        let response = self.check_status(self.send(request).await?, context).await?;
        self.read_json(response, context).await
    }

    /// Like [`Self::get_json`] but maps 400/404 to `not_found`
    async fn get_json_or<T: DeserializeOwned>(
        &self,
        path: &str,
        auth_key: String,
        context: &'static str,
        not_found: CrestronError,
    ) -> Result<T> {
        let request = self.http.get(self.url(path)).header(AUTH_KEY_HEADER, auth_key);
        let response = self.send(request).await?;
        if matches!(response.status().as_u16(), 400 | 404) {
            return Err(not_found);
        }
        let response = self.check_status(response, context).await?;
        self.read_json(response, context).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        request.send().await.map_err(|e| self.transport_error(&e))
    }

    /// Map non-2xx responses to typed errors, dropping the session on 401/511
    async fn check_status(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        if code == 401 || code == NETWORK_AUTHENTICATION_REQUIRED {
            *self.auth_key.write().await = None;
            return Err(CrestronError::Auth(format!(
                "{context}: hub returned HTTP {code}"
            )));
        }

        Err(CrestronError::Api {
            status: Some(code),
            message: format!("{context} failed"),
        })
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        context: &str,
    ) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(&e)
            } else {
                CrestronError::api(format!("{context}: invalid response body: {e}"))
            }
        })
    }

    fn transport_error(&self, error: &reqwest::Error) -> CrestronError {
        if error.is_timeout() {
            CrestronError::Timeout {
                timeout_ms: self.timeout_config.request_timeout_ms,
            }
        } else {
            CrestronError::Connection(format!("{}: {error}", self.host))
        }
    }
}

#[async_trait]
impl ShadeApi for HubClient {
    fn host(&self) -> &str {
        Self::host(self)
    }

    async fn login(&self) -> Result<String> {
        Self::login(self).await
    }

    async fn set_auth_token(&self, auth_token: String) {
        Self::set_auth_token(self, auth_token).await;
    }

    async fn list_shades(&self) -> Result<Vec<Shade>> {
        Self::list_shades(self).await
    }

    async fn list_rooms(&self) -> Result<Vec<Room>> {
        Self::list_rooms(self).await
    }

    async fn set_shade_state(&self, commands: &[ShadeCommand]) -> Result<SetStateResult> {
        Self::set_shade_state(self, commands).await
    }

    async fn stop_shade(&self, id: u32) -> Result<()> {
        Self::stop_shade(self, id).await
    }
}

/// Retry an operation on connection-class errors with exponential backoff
///
/// Makes up to `max_retry_attempts + 1` attempts, sleeping `retry_delay_ms`
/// before the first retry and doubling the delay after each one. Auth and API
/// errors are returned immediately.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// non-connection error.
pub async fn with_retry<T, F, Fut>(config: &TimeoutConfig, what: &str, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = Duration::from_millis(config.retry_delay_ms);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_connection_error() && attempt < config.max_retry_attempts => {
                attempt += 1;
                warn!(
                    "{} failed on attempt {}/{}, retrying in {}ms: {}",
                    what,
                    attempt,
                    config.max_retry_attempts + 1,
                    delay.as_millis(),
                    e
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
            Err(e) => return Err(e),
        }
    }
}
