// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport for revocation data: fetcher and cache contracts, the
//! default HTTP implementation, and the per-URL circuit breaker it
//! wraps around flaky endpoints.

use {
    crate::TimeStampError,
    log::{debug, warn},
    ring::digest,
    std::{
        collections::HashMap,
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    },
};

pub const HTTP_CONTENT_TYPE_OCSP_REQUEST: &str = "application/ocsp-request";

/// Retrieves revocation data over some transport.
///
/// The default implementation speaks HTTP; tests and embedders inject
/// their own. Implementations are expected to fail fast on endpoints
/// they know to be unhealthy.
pub trait RevocationDataFetcher {
    /// POST a DER OCSP request and return the DER response.
    fn fetch_ocsp(&self, url: &str, request: &[u8]) -> Result<Vec<u8>, TimeStampError>;

    /// GET a DER-encoded CRL.
    fn fetch_crl(&self, url: &str) -> Result<Vec<u8>, TimeStampError>;
}

/// Caches revocation data between fetches.
///
/// OCSP entries are keyed by URL plus a digest prefix of the request so
/// distinct CertIDs don't collide; CRLs are keyed by URL alone.
pub trait RevocationCache {
    fn get_ocsp(&self, url: &str, request: &[u8]) -> Option<Vec<u8>>;
    fn set_ocsp(&self, url: &str, request: &[u8], response: &[u8]);
    fn get_crl(&self, url: &str) -> Option<Vec<u8>>;
    fn set_crl(&self, url: &str, response: &[u8]);
    fn clear(&self);
}

fn ocsp_cache_key(url: &str, request: &[u8]) -> String {
    let digest = digest::digest(&digest::SHA256, request);

    format!("{}#{}", url, hex::encode(&digest.as_ref()[..8]))
}

/// In-memory [RevocationCache].
#[derive(Default)]
pub struct MemoryRevocationCache {
    ocsp: Mutex<HashMap<String, Vec<u8>>>,
    crl: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryRevocationCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RevocationCache for MemoryRevocationCache {
    fn get_ocsp(&self, url: &str, request: &[u8]) -> Option<Vec<u8>> {
        self.ocsp
            .lock()
            .unwrap()
            .get(&ocsp_cache_key(url, request))
            .cloned()
    }

    fn set_ocsp(&self, url: &str, request: &[u8], response: &[u8]) {
        self.ocsp
            .lock()
            .unwrap()
            .insert(ocsp_cache_key(url, request), response.to_vec());
    }

    fn get_crl(&self, url: &str) -> Option<Vec<u8>> {
        self.crl.lock().unwrap().get(url).cloned()
    }

    fn set_crl(&self, url: &str, response: &[u8]) {
        self.crl.lock().unwrap().insert(url.to_string(), response.to_vec());
    }

    fn clear(&self) {
        self.ocsp.lock().unwrap().clear();
        self.crl.lock().unwrap().clear();
    }
}

/// A cache that never hits. Useful when freshness is mandatory.
pub struct NoopRevocationCache;

impl RevocationCache for NoopRevocationCache {
    fn get_ocsp(&self, _url: &str, _request: &[u8]) -> Option<Vec<u8>> {
        None
    }

    fn set_ocsp(&self, _url: &str, _request: &[u8], _response: &[u8]) {}

    fn get_crl(&self, _url: &str) -> Option<Vec<u8>> {
        None
    }

    fn set_crl(&self, _url: &str, _response: &[u8]) {}

    fn clear(&self) {}
}

/// Time source for the circuit breaker, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Circuit breaker tunables.
#[derive(Clone, Copy, Debug)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,

    /// Time the circuit stays open before a probe is allowed.
    pub reset_timeout: Duration,

    /// Probe successes required to close the circuit again.
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum BreakerState {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { successes: u32 },
}

/// A circuit breaker guarding one endpoint.
///
/// CLOSED counts consecutive failures and opens at the threshold. OPEN
/// fails fast until `reset_timeout` elapses, then admits a single
/// HALF_OPEN probe. The probe's outcome decides between CLOSED and a
/// fresh OPEN interval.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
            clock,
        }
    }

    /// Run `op` under this breaker.
    ///
    /// Transient failures (network, timeout, server-side HTTP) feed the
    /// breaker; permanent failures pass through without affecting its
    /// state.
    pub fn execute<T>(
        &self,
        endpoint: &str,
        op: impl FnOnce() -> Result<T, TimeStampError>,
    ) -> Result<T, TimeStampError> {
        {
            let mut state = self.state.lock().unwrap();

            match *state {
                BreakerState::Closed { .. } | BreakerState::HalfOpen { .. } => {}
                BreakerState::Open { since } => {
                    if self.clock.now().duration_since(since) < self.config.reset_timeout {
                        return Err(TimeStampError::CircuitOpen(endpoint.to_string()));
                    }

                    debug!("circuit breaker for {} entering half-open", endpoint);
                    *state = BreakerState::HalfOpen { successes: 0 };
                }
            }
        }

        match op() {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(e) => {
                if is_transient(&e) {
                    self.on_failure(endpoint);
                }
                Err(e)
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock().unwrap();

        match *state {
            BreakerState::Closed { .. } => {
                *state = BreakerState::Closed { failures: 0 };
            }
            BreakerState::HalfOpen { successes } => {
                let successes = successes + 1;

                if successes >= self.config.success_threshold {
                    *state = BreakerState::Closed { failures: 0 };
                } else {
                    *state = BreakerState::HalfOpen { successes };
                }
            }
            BreakerState::Open { .. } => {}
        }
    }

    fn on_failure(&self, endpoint: &str) {
        let mut state = self.state.lock().unwrap();

        match *state {
            BreakerState::Closed { failures } => {
                let failures = failures + 1;

                if failures >= self.config.failure_threshold {
                    warn!("circuit breaker for {} opened", endpoint);
                    *state = BreakerState::Open {
                        since: self.clock.now(),
                    };
                } else {
                    *state = BreakerState::Closed { failures };
                }
            }
            BreakerState::HalfOpen { .. } => {
                *state = BreakerState::Open {
                    since: self.clock.now(),
                };
            }
            BreakerState::Open { .. } => {}
        }
    }
}

fn is_transient(error: &TimeStampError) -> bool {
    matches!(
        error,
        TimeStampError::Network { .. }
            | TimeStampError::Timeout
            | TimeStampError::Http(_)
            | TimeStampError::Reqwest(_)
    )
}

/// The default [RevocationDataFetcher]: plain HTTP with one circuit
/// breaker per URL.
pub struct HttpRevocationFetcher {
    client: reqwest::blocking::Client,
    breaker_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl HttpRevocationFetcher {
    pub fn new(timeout: Duration) -> Result<Self, TimeStampError> {
        Ok(Self {
            client: reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()?,
            breaker_config: CircuitBreakerConfig::default(),
            breakers: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_breaker_config(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker_config = config;
        self
    }

    fn breaker_for(&self, url: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.breaker_config)))
            .clone()
    }

    fn classify_response(
        response: reqwest::blocking::Response,
    ) -> Result<Vec<u8>, TimeStampError> {
        let status = response.status();

        if status.is_success() {
            Ok(response.bytes()?.to_vec())
        } else if status.is_client_error() {
            // Permanent: retrying or probing will not help.
            Err(TimeStampError::InvalidResponse(format!(
                "endpoint returned HTTP {}",
                status
            )))
        } else {
            Err(TimeStampError::Http(format!(
                "endpoint returned HTTP {}",
                status
            )))
        }
    }

    fn map_transport_error(e: reqwest::Error) -> TimeStampError {
        if e.is_timeout() {
            TimeStampError::Timeout
        } else {
            TimeStampError::Reqwest(e)
        }
    }
}

impl RevocationDataFetcher for HttpRevocationFetcher {
    fn fetch_ocsp(&self, url: &str, request: &[u8]) -> Result<Vec<u8>, TimeStampError> {
        self.breaker_for(url).execute(url, || {
            debug!("fetching OCSP response from {}", url);

            let response = self
                .client
                .post(url)
                .header("Content-Type", HTTP_CONTENT_TYPE_OCSP_REQUEST)
                .body(request.to_vec())
                .send()
                .map_err(Self::map_transport_error)?;

            Self::classify_response(response)
        })
    }

    fn fetch_crl(&self, url: &str) -> Result<Vec<u8>, TimeStampError> {
        self.breaker_for(url).execute(url, || {
            debug!("fetching CRL from {}", url);

            let response = self
                .client
                .get(url)
                .send()
                .map_err(Self::map_transport_error)?;

            Self::classify_response(response)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct ManualClock(Mutex<Instant>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    fn transient_failure<T>() -> Result<T, TimeStampError> {
        Err(TimeStampError::Network {
            attempts: 1,
            message: "connection refused".to_string(),
        })
    }

    #[test]
    fn breaker_opens_after_threshold_and_recovers() {
        let clock = Arc::new(ManualClock(Mutex::new(Instant::now())));
        let breaker = CircuitBreaker::with_clock(
            CircuitBreakerConfig {
                failure_threshold: 3,
                reset_timeout: Duration::from_secs(30),
                success_threshold: 1,
            },
            clock.clone(),
        );

        for _ in 0..3 {
            assert!(breaker.execute("tsa", transient_failure::<()>).is_err());
        }

        // Circuit is now open: calls fail fast without running the op.
        let mut ran = false;
        let result = breaker.execute("tsa", || {
            ran = true;
            Ok(())
        });
        assert!(matches!(result, Err(TimeStampError::CircuitOpen(_))));
        assert!(!ran);

        // After the reset timeout a single probe runs, and success
        // closes the circuit.
        clock.advance(Duration::from_secs(31));
        assert!(breaker.execute("tsa", || Ok(())).is_ok());
        assert!(breaker.execute("tsa", || Ok(())).is_ok());
    }

    #[test]
    fn breaker_probe_failure_reopens() {
        let clock = Arc::new(ManualClock(Mutex::new(Instant::now())));
        let breaker = CircuitBreaker::with_clock(
            CircuitBreakerConfig {
                failure_threshold: 1,
                reset_timeout: Duration::from_secs(30),
                success_threshold: 1,
            },
            clock.clone(),
        );

        assert!(breaker.execute("crl", transient_failure::<()>).is_err());

        clock.advance(Duration::from_secs(31));

        // Probe fails: straight back to open, without a full threshold
        // count.
        assert!(breaker.execute("crl", transient_failure::<()>).is_err());
        assert!(matches!(
            breaker.execute("crl", || Ok(())),
            Err(TimeStampError::CircuitOpen(_))
        ));
    }

    #[test]
    fn permanent_failures_bypass_breaker() {
        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            reset_timeout: Duration::from_secs(30),
            success_threshold: 1,
        });

        for _ in 0..5 {
            let result = breaker.execute("ocsp", || {
                Err::<(), _>(TimeStampError::InvalidResponse("HTTP 404".to_string()))
            });
            assert!(matches!(result, Err(TimeStampError::InvalidResponse(_))));
        }

        // The breaker never opened.
        assert!(breaker.execute("ocsp", || Ok(())).is_ok());
    }

    #[test]
    fn memory_cache_round_trip() {
        let cache = MemoryRevocationCache::new();

        assert!(cache.get_ocsp("http://ocsp", b"request").is_none());
        cache.set_ocsp("http://ocsp", b"request", b"response");
        assert_eq!(
            cache.get_ocsp("http://ocsp", b"request").unwrap(),
            b"response"
        );

        // A different request digest misses.
        assert!(cache.get_ocsp("http://ocsp", b"other").is_none());

        cache.set_crl("http://crl", b"crl-bytes");
        assert_eq!(cache.get_crl("http://crl").unwrap(), b"crl-bytes");

        cache.clear();
        assert!(cache.get_ocsp("http://ocsp", b"request").is_none());
        assert!(cache.get_crl("http://crl").is_none());
    }
}
