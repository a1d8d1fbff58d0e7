//! Microsoft identity platform client (OAuth2 v2.0 endpoints).

use std::time::Duration;

use async_trait::async_trait;
use jiff::SignedDuration;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{AuthError, Authenticator, DeviceCodeNotifier, DeviceCodePrompt, DeviceCodeRequest};
use crate::config::ResolverConfig;
use crate::error::{Error, Result};
use crate::strategy::ServicePrincipal;
use crate::token::AccessToken;
use crate::{STORAGE_SCOPE, TRACING_TARGET_AUTHENTICATOR};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);

/// Pacing of token endpoint polls during a device-code flow.
#[derive(Debug, Clone, Copy)]
struct PollTiming {
    min_interval: Duration,
    slow_down_step: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            min_interval: MIN_POLL_INTERVAL,
            slow_down_step: SLOW_DOWN_STEP,
        }
    }
}

impl PollTiming {
    /// Interval before the first poll; a server-sent `0` is raised to the floor.
    fn initial(&self, server_secs: Option<u64>) -> Duration {
        server_secs
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_secs)
            .max(self.min_interval)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    verification_uri: String,
    expires_in: u64,
    #[serde(default)]
    interval: Option<u64>,
    #[serde(default)]
    message: Option<String>,
}

/// Result of one poll of the token endpoint during a device-code flow.
#[derive(Debug, PartialEq, Eq)]
enum PollOutcome {
    Pending,
    SlowDown,
    Failed(AuthErrorKind),
}

#[derive(Debug, PartialEq, Eq)]
enum AuthErrorKind {
    Declined,
    Expired,
    Rejected(String),
}

/// [`Authenticator`] backed by the Microsoft identity platform.
#[derive(Debug, Clone)]
pub struct AadAuthenticator {
    http: Client,
    authority: String,
    timing: PollTiming,
}

impl AadAuthenticator {
    /// Creates an authenticator using the configured authority host and timeout.
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        tracing::debug!(
            target: TRACING_TARGET_AUTHENTICATOR,
            authority = %config.authority_host(),
            timeout_ms = config.auth_timeout().as_millis(),
            "Creating identity provider client"
        );

        let http = Client::builder()
            .timeout(config.auth_timeout())
            .user_agent(concat!("paeio/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::invalid_config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            authority: config.authority_host().to_owned(),
            timing: PollTiming::default(),
        })
    }

    #[cfg(test)]
    fn with_poll_timing(mut self, min_interval: Duration, slow_down_step: Duration) -> Self {
        self.timing = PollTiming {
            min_interval,
            slow_down_step,
        };
        self
    }

    fn token_url(&self, tenant: &str) -> String {
        format!("{}/{tenant}/oauth2/v2.0/token", self.authority)
    }

    fn device_code_url(&self, tenant: &str) -> String {
        format!("{}/{tenant}/oauth2/v2.0/devicecode", self.authority)
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<(StatusCode, String), AuthError> {
        let response = self
            .http
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| AuthError::transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::transport(e.to_string()))?;

        Ok((status, body))
    }

    async fn poll_once(
        &self,
        request: &DeviceCodeRequest,
        device_code: &str,
    ) -> Result<std::result::Result<AccessToken, PollOutcome>, AuthError> {
        let (status, body) = self
            .post_form(
                &self.token_url(&request.tenant_id),
                &[
                    ("grant_type", DEVICE_CODE_GRANT),
                    ("client_id", request.client_id.as_str()),
                    ("device_code", device_code),
                ],
            )
            .await?;

        if status.is_success() {
            return parse_token(&body).map(Ok);
        }

        Ok(Err(classify_poll_error(status, &body)?))
    }
}

#[async_trait]
impl Authenticator for AadAuthenticator {
    async fn client_secret(&self, principal: &ServicePrincipal) -> Result<AccessToken, AuthError> {
        tracing::debug!(
            target: TRACING_TARGET_AUTHENTICATOR,
            client_id = %principal.client_id,
            tenant_id = %principal.tenant_id,
            "Requesting client credentials token"
        );

        let (status, body) = self
            .post_form(
                &self.token_url(&principal.tenant_id),
                &[
                    ("grant_type", "client_credentials"),
                    ("client_id", principal.client_id.as_str()),
                    ("client_secret", principal.client_secret.as_str()),
                    ("scope", STORAGE_SCOPE),
                ],
            )
            .await?;

        if status.is_success() {
            return parse_token(&body);
        }

        Err(classify_error(status, &body))
    }

    async fn device_code(
        &self,
        request: &DeviceCodeRequest,
        notifier: &dyn DeviceCodeNotifier,
    ) -> Result<AccessToken, AuthError> {
        let (status, body) = self
            .post_form(
                &self.device_code_url(&request.tenant_id),
                &[
                    ("client_id", request.client_id.as_str()),
                    ("scope", request.scope.as_str()),
                ],
            )
            .await?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        let device: DeviceCodeResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::transport(format!("malformed device code response: {e}")))?;

        let expires_in = Duration::from_secs(device.expires_in);
        let message = device.message.clone().unwrap_or_else(|| {
            format!(
                "To sign in, open {} and enter the code {}.",
                device.verification_uri, device.user_code
            )
        });

        notifier.notify(&DeviceCodePrompt {
            user_code: device.user_code.clone(),
            verification_uri: device.verification_uri.clone(),
            message,
            expires_in,
        });

        let started = tokio::time::Instant::now();
        let mut interval = self.timing.initial(device.interval);

        loop {
            tokio::time::sleep(interval).await;

            if started.elapsed() >= expires_in {
                return Err(AuthError::Expired);
            }

            match self.poll_once(request, &device.device_code).await? {
                Ok(token) => {
                    tracing::info!(
                        target: TRACING_TARGET_AUTHENTICATOR,
                        "Device code login completed"
                    );
                    return Ok(token);
                }
                Err(PollOutcome::Pending) => {}
                Err(PollOutcome::SlowDown) => {
                    interval += self.timing.slow_down_step;
                    tracing::debug!(
                        target: TRACING_TARGET_AUTHENTICATOR,
                        interval_ms = interval.as_millis(),
                        "Identity provider asked to slow down"
                    );
                }
                Err(PollOutcome::Failed(AuthErrorKind::Declined)) => {
                    return Err(AuthError::Declined);
                }
                Err(PollOutcome::Failed(AuthErrorKind::Expired)) => {
                    return Err(AuthError::Expired);
                }
                Err(PollOutcome::Failed(AuthErrorKind::Rejected(reason))) => {
                    return Err(AuthError::Rejected(reason));
                }
            }
        }
    }
}

fn parse_token(body: &str) -> Result<AccessToken, AuthError> {
    let token: TokenResponse = serde_json::from_str(body)
        .map_err(|e| AuthError::transport(format!("malformed token response: {e}")))?;

    let lifetime = SignedDuration::from_secs(i64::try_from(token.expires_in).unwrap_or(i64::MAX));
    Ok(AccessToken::expiring_in(token.access_token, lifetime))
}

fn describe(error: &ErrorResponse) -> String {
    match &error.error_description {
        // Descriptions are multi-line and carry trace ids; the first line is enough.
        Some(description) => format!(
            "{}: {}",
            error.error,
            description.lines().next().unwrap_or_default()
        ),
        None => error.error.clone(),
    }
}

/// Classifies a failed token or device code response.
fn classify_error(status: StatusCode, body: &str) -> AuthError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return AuthError::transport(format!("identity provider returned {status}"));
    }

    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) => AuthError::rejected(describe(&error)),
        Err(_) => AuthError::rejected(format!("identity provider returned {status}")),
    }
}

fn classify_poll_error(status: StatusCode, body: &str) -> Result<PollOutcome, AuthError> {
    if status.is_server_error() {
        return Err(AuthError::transport(format!(
            "identity provider returned {status}"
        )));
    }

    let error: ErrorResponse = serde_json::from_str(body)
        .map_err(|_| AuthError::transport(format!("identity provider returned {status}")))?;

    Ok(match error.error.as_str() {
        "authorization_pending" => PollOutcome::Pending,
        "slow_down" => PollOutcome::SlowDown,
        "authorization_declined" => PollOutcome::Failed(AuthErrorKind::Declined),
        "expired_token" | "code_expired" => PollOutcome::Failed(AuthErrorKind::Expired),
        _ => PollOutcome::Failed(AuthErrorKind::Rejected(describe(&error))),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::mock::RecordingNotifier;
    use crate::strategy::InteractiveSettings;

    fn authenticator() -> AadAuthenticator {
        let config = ResolverConfig::default().with_authority_host("https://login.example.com/");
        AadAuthenticator::new(&config).unwrap()
    }

    #[test]
    fn endpoint_urls() {
        let auth = authenticator();
        assert_eq!(
            auth.token_url("tenant"),
            "https://login.example.com/tenant/oauth2/v2.0/token"
        );
        assert_eq!(
            auth.device_code_url("organizations"),
            "https://login.example.com/organizations/oauth2/v2.0/devicecode"
        );
    }

    #[test]
    fn parses_token_response() {
        let token = parse_token(r#"{"token_type":"Bearer","expires_in":3599,"access_token":"abc"}"#)
            .unwrap();
        assert_eq!(token.secret(), "abc");
        assert!(!token.is_expired());
    }

    #[test]
    fn malformed_token_is_transport_error() {
        assert!(matches!(
            parse_token("<html>"),
            Err(AuthError::Transport(_))
        ));
    }

    #[test]
    fn invalid_client_is_rejection() {
        let body = r#"{"error":"invalid_client","error_description":"AADSTS7000215: Invalid client secret provided.\r\nTrace ID: 1"}"#;
        let err = classify_error(StatusCode::UNAUTHORIZED, body);

        let AuthError::Rejected(reason) = err else {
            panic!("expected rejection");
        };
        assert_eq!(
            reason,
            "invalid_client: AADSTS7000215: Invalid client secret provided."
        );
    }

    #[test]
    fn server_errors_are_transport_errors() {
        assert!(matches!(
            classify_error(StatusCode::BAD_GATEWAY, ""),
            AuthError::Transport(_)
        ));
        assert!(matches!(
            classify_error(StatusCode::TOO_MANY_REQUESTS, ""),
            AuthError::Transport(_)
        ));
    }

    #[test]
    fn poll_error_classification() {
        let poll = |error: &str| {
            classify_poll_error(StatusCode::BAD_REQUEST, &format!(r#"{{"error":"{error}"}}"#))
                .unwrap()
        };

        assert_eq!(poll("authorization_pending"), PollOutcome::Pending);
        assert_eq!(poll("slow_down"), PollOutcome::SlowDown);
        assert_eq!(
            poll("authorization_declined"),
            PollOutcome::Failed(AuthErrorKind::Declined)
        );
        assert_eq!(
            poll("expired_token"),
            PollOutcome::Failed(AuthErrorKind::Expired)
        );
        assert_eq!(
            poll("bad_verification_code"),
            PollOutcome::Failed(AuthErrorKind::Rejected("bad_verification_code".into()))
        );
    }

    #[test]
    fn zero_interval_is_raised_to_floor() {
        let timing = PollTiming::default();
        assert_eq!(timing.initial(Some(0)), MIN_POLL_INTERVAL);
        assert_eq!(timing.initial(None), DEFAULT_POLL_INTERVAL);
        assert_eq!(timing.initial(Some(7)), Duration::from_secs(7));
    }

    fn server_authenticator(server: &MockServer) -> AadAuthenticator {
        let config = ResolverConfig::default().with_authority_host(server.uri());
        AadAuthenticator::new(&config)
            .unwrap()
            .with_poll_timing(Duration::from_millis(20), Duration::from_millis(100))
    }

    fn device_request() -> DeviceCodeRequest {
        InteractiveSettings {
            client_id: "public-client".into(),
            tenant_id: "organizations".into(),
            scope: STORAGE_SCOPE.into(),
        }
    }

    fn device_code_body(expires_in: u64) -> serde_json::Value {
        json!({
            "device_code": "dev-123",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": expires_in,
            "interval": 0,
            "message": "Enter ABCD-EFGH"
        })
    }

    fn token_body(token: &str) -> serde_json::Value {
        json!({"token_type": "Bearer", "expires_in": 3599, "access_token": token})
    }

    #[tokio::test]
    async fn client_secret_posts_client_credentials_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .and(body_string_contains("client_id=app-1"))
            .and(body_string_contains("client_secret=s3cret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("sp-token")))
            .expect(1)
            .mount(&server)
            .await;

        let principal = ServicePrincipal::new("app-1", "s3cret", "tenant-1");
        let token = server_authenticator(&server)
            .client_secret(&principal)
            .await
            .unwrap();

        assert_eq!(token.secret(), "sp-token");
    }

    #[tokio::test]
    async fn client_secret_rejection_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant-1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&server)
            .await;

        let principal = ServicePrincipal::new("app-1", "wrong", "tenant-1");
        let err = server_authenticator(&server)
            .client_secret(&principal)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Rejected(ref reason) if reason.starts_with("invalid_client")));
    }

    #[tokio::test]
    async fn device_code_polls_until_granted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/organizations/oauth2/v2.0/devicecode"))
            .and(body_string_contains("client_id=public-client"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body(60)))
            .expect(1)
            .mount(&server)
            .await;

        let token_path = "/organizations/oauth2/v2.0/token";
        Mock::given(method("POST"))
            .and(path(token_path))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_pending"})),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(token_path))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "slow_down"})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(token_path))
            .and(body_string_contains("device_code=dev-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("user-token")))
            .mount(&server)
            .await;

        let notifier = Arc::new(RecordingNotifier::default());
        let started = tokio::time::Instant::now();
        let token = server_authenticator(&server)
            .device_code(&device_request(), notifier.as_ref())
            .await
            .unwrap();

        assert_eq!(token.secret(), "user-token");
        assert_eq!(notifier.prompts(), 1);
        assert_eq!(notifier.last_prompt().unwrap().user_code, "ABCD-EFGH");

        // 20ms, 20ms, then 120ms after the slow_down.
        assert!(started.elapsed() >= Duration::from_millis(160));

        let polls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|request| request.url.path() == token_path)
            .count();
        assert_eq!(polls, 3);
    }

    #[tokio::test]
    async fn device_code_stops_polling_after_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/organizations/oauth2/v2.0/devicecode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body(0)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/organizations/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("late")))
            .expect(0)
            .mount(&server)
            .await;

        let err = server_authenticator(&server)
            .device_code(&device_request(), &RecordingNotifier::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Expired));
    }

    #[tokio::test]
    async fn declined_device_code_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/organizations/oauth2/v2.0/devicecode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(device_code_body(60)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/organizations/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "authorization_declined"})),
            )
            .mount(&server)
            .await;

        let err = server_authenticator(&server)
            .device_code(&device_request(), &RecordingNotifier::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Declined));
    }
}
