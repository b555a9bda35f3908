//! The HTTP transport: connection pool, cookie jar, user agent, timeout
//! handling and the bounded retry loop.

use std::sync::RwLock;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};
use crate::req::{build_url, HttpMethod, RequestBody, RequestMessage};
use crate::res::{ParseContext, ResponseParser};

const LIB_UA: &str = concat!(
    "mwclient/",
    env!("CARGO_PKG_VERSION"),
    " (https://github.com/mwclient-rs/mwclient)"
);

/// Runtime-mutable transport knobs.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Per-request HTTP budget.
    pub timeout: Duration,
    /// Baseline back-off between retries; also the cap applied to any
    /// server-suggested delay.
    pub retry_delay: Duration,
    /// Upper bound on retries per invocation; zero disables retrying.
    pub max_retries: u32,
    /// Caller user agent; the library token is always appended.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(10),
            max_retries: 3,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    fn full_user_agent(&self) -> String {
        match &self.user_agent {
            Some(ua) if !ua.is_empty() => format!("{ua} {LIB_UA}"),
            _ => LIB_UA.to_owned(),
        }
    }
}

/// A shared HTTP client for MediaWiki endpoints. One client can back any
/// number of [`Site`](crate::site::Site)s; the cookie jar and connection
/// pool are shared and safe for concurrent use.
pub struct WikiClient {
    http: reqwest::Client,
    config: RwLock<ClientConfig>,
}

impl WikiClient {
    pub fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Result<Self> {
        #[allow(unused_mut)]
        let mut builder = reqwest::Client::builder();
        #[cfg(feature = "default")]
        {
            builder = builder.cookie_store(true);
        }
        let http = builder.build().map_err(Error::Network)?;
        Ok(Self {
            http,
            config: RwLock::new(config),
        })
    }

    /// Wraps a caller-constructed `reqwest` client; use this to inject a
    /// persistent cookie jar.
    pub fn from_http(http: reqwest::Client, config: ClientConfig) -> Self {
        Self {
            http,
            config: RwLock::new(config),
        }
    }

    pub fn config(&self) -> ClientConfig {
        self.config.read().expect("config lock poisoned").clone()
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.config.write().expect("config lock poisoned").timeout = timeout;
    }

    pub fn set_retry_delay(&self, delay: Duration) {
        self.config.write().expect("config lock poisoned").retry_delay = delay;
    }

    pub fn set_max_retries(&self, retries: u32) {
        self.config.write().expect("config lock poisoned").max_retries = retries;
    }

    pub fn set_user_agent(&self, ua: impl Into<String>) {
        self.config.write().expect("config lock poisoned").user_agent = Some(ua.into());
    }

    /// Sends a request message and parses the response, retrying within the
    /// configured budget on timeouts, network failures, 5xx statuses and
    /// parser-requested retries. A message that cannot re-emit its body
    /// (one-shot stream) is never retried.
    pub async fn invoke<P: ResponseParser>(
        &self,
        endpoint: &Url,
        message: &RequestMessage,
        parser: &P,
        cancel: &CancellationToken,
    ) -> Result<P::Output> {
        let config = self.config();
        let mut retries_used: u32 = 0;
        loop {
            let attempt = self.attempt(endpoint, message, parser, cancel, &config).await;
            let (error, suggested) = match attempt {
                Ok(value) => return Ok(value),
                Err(Attempt::Fatal(e)) => return Err(e),
                Err(Attempt::Retryable { error, suggested }) => (error, suggested),
            };
            if retries_used >= config.max_retries || !message.retriable() {
                return Err(error);
            }
            let delay = match suggested {
                Some(s) => s.min(config.retry_delay),
                None => config.retry_delay,
            };
            retries_used += 1;
            debug!(
                id = %message.id(),
                retries_used,
                delay_ms = delay.as_millis() as u64,
                %error,
                "retrying request"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt<P: ResponseParser>(
        &self,
        endpoint: &Url,
        message: &RequestMessage,
        parser: &P,
        cancel: &CancellationToken,
        config: &ClientConfig,
    ) -> Result<P::Output, Attempt> {
        let builder = match message.method() {
            HttpMethod::Get => {
                let url = build_url(endpoint, message);
                debug!(id = %message.id(), %url, "GET");
                self.http.get(url)
            }
            HttpMethod::Post => {
                debug!(id = %message.id(), url = %endpoint, "POST");
                let builder = self.http.post(endpoint.clone());
                match message.http_body().map_err(Attempt::Fatal)? {
                    RequestBody::Multipart(form) => builder.multipart(form),
                    RequestBody::Form(body) => builder
                        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                        .body(body),
                    RequestBody::None => builder,
                }
            }
        };
        let builder = builder.header(USER_AGENT, config.full_user_agent());

        let io = async {
            let response = builder.send().await?;
            let status = response.status();
            let retry_after = parse_retry_after(&response);
            let body = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, retry_after, body))
        };
        let (status, retry_after, body) = tokio::select! {
            _ = cancel.cancelled() => return Err(Attempt::Fatal(Error::Cancelled)),
            r = tokio::time::timeout(config.timeout, io) => match r {
                Err(_elapsed) => {
                    return Err(Attempt::Retryable {
                        error: Error::Timeout,
                        suggested: None,
                    })
                }
                Ok(Err(e)) => {
                    return Err(Attempt::Retryable {
                        error: e.into(),
                        suggested: None,
                    })
                }
                Ok(Ok(parts)) => parts,
            },
        };
        trace!(id = %message.id(), status = %status, body_len = body.len(), "response received");

        let mut ctx = ParseContext::new(message.id());
        ctx.retry_after = retry_after;
        match parser.parse_response(&mut ctx, status, &body) {
            Ok(value) => Ok(value),
            Err(error) if ctx.needs_retry => Err(Attempt::Retryable {
                error,
                suggested: ctx.retry_after,
            }),
            Err(error) => Err(Attempt::Fatal(error)),
        }
    }
}

enum Attempt {
    Retryable {
        error: Error,
        suggested: Option<Duration>,
    },
    Fatal(Error),
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}
