use reciprocity_core::{CoreError, ErrorExt};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
    /// Circuit breaker failure threshold
    pub failure_threshold: u32,
    /// Circuit breaker recovery timeout (in seconds)
    pub recovery_timeout_s: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            failure_threshold: 5,
            recovery_timeout_s: 60,
        }
    }
}

impl RetryConfig {
    /// Read queries against the Bluesky AppView
    pub fn bluesky() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 2000,
            max_delay_ms: 60000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.2,
            failure_threshold: 3,
            recovery_timeout_s: 120,
        }
    }
}

/// Circuit breaker states
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerState {
    Closed,   // Normal operation
    Open,     // Blocking requests
    HalfOpen, // Testing recovery
}

/// Circuit breaker for preventing cascading failures
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitBreakerState,
    failure_count: u32,
    last_failure_time: Option<Instant>,
    config: RetryConfig,
}

impl CircuitBreaker {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            state: CircuitBreakerState::Closed,
            failure_count: 0,
            last_failure_time: None,
            config,
        }
    }

    /// Check if a request should be allowed
    pub fn allow_request(&mut self) -> bool {
        match self.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => {
                let recovery_duration = Duration::from_secs(self.config.recovery_timeout_s);
                match self.last_failure_time {
                    Some(last_failure) if last_failure.elapsed() >= recovery_duration => {
                        debug!("Circuit breaker transitioning to half-open for recovery test");
                        self.state = CircuitBreakerState::HalfOpen;
                        true
                    }
                    _ => false,
                }
            }
            CircuitBreakerState::HalfOpen => true,
        }
    }

    pub fn record_success(&mut self) {
        if self.state == CircuitBreakerState::HalfOpen {
            info!("Circuit breaker recovery successful, returning to closed state");
            self.state = CircuitBreakerState::Closed;
            self.last_failure_time = None;
        }
        self.failure_count = 0;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_time = Some(Instant::now());

        match self.state {
            CircuitBreakerState::Closed => {
                if self.failure_count >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker opening due to {} consecutive failures",
                        self.failure_count
                    );
                    self.state = CircuitBreakerState::Open;
                }
            }
            CircuitBreakerState::HalfOpen => {
                warn!("Circuit breaker recovery failed, returning to open state");
                self.state = CircuitBreakerState::Open;
            }
            CircuitBreakerState::Open => {}
        }
    }

    pub fn get_state(&self) -> CircuitBreakerState {
        self.state.clone()
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff
    Retry,
    /// Retry after the delay the server asked for
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Server-named waits win over backoff. Everything else follows `ErrorExt::is_retryable`.
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    if !error.is_retryable() {
        return RetryStrategy::NoRetry;
    }
    match error.retry_after() {
        Some(delay) => RetryStrategy::RetryWithDelay(delay),
        None => RetryStrategy::Retry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let multiplier = config.backoff_multiplier.powi(attempt as i32);
    let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
    let exponential_delay = Duration::from_millis(delay_ms.min(config.max_delay_ms));

    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);

    (exponential_delay + Duration::from_millis(jitter)).min(max_delay)
}

/// Retry executor that wraps read operations with retry logic
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    circuit_breaker: Mutex<CircuitBreaker>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            circuit_breaker: Mutex::new(CircuitBreaker::new(config.clone())),
            config,
        }
    }

    /// Runs `operation` until it succeeds, fails permanently, or attempts run out.
    /// The last error is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        if !self.circuit_breaker.lock().await.allow_request() {
            warn!(
                "Circuit breaker is open, blocking request for {}",
                operation_name
            );
            return Err(CoreError::Internal {
                message: format!("Circuit breaker is open for {}", operation_name),
            });
        }

        let mut attempt = 0;
        loop {
            let error = match operation().await {
                Ok(result) => {
                    self.circuit_breaker.lock().await.record_success();
                    if attempt > 0 {
                        info!(
                            "Operation {} succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => error,
            };

            debug!(
                "Attempt {} failed for {}: {}",
                attempt + 1,
                operation_name,
                error
            );

            let strategy = get_retry_strategy(&error);
            let can_retry = attempt + 1 < self.config.max_attempts;
            let delay = match strategy {
                RetryStrategy::Retry if can_retry => calculate_delay(attempt, &self.config),
                RetryStrategy::RetryWithDelay(delay) if can_retry => {
                    delay.min(Duration::from_millis(self.config.max_delay_ms))
                }
                RetryStrategy::NoRetry => {
                    // A permanent answer from a healthy service
                    debug!("Not retrying {}: {}", operation_name, error);
                    return Err(error);
                }
                _ => {
                    self.circuit_breaker.lock().await.record_failure();
                    error!(
                        "Operation {} failed after {} attempts: {}",
                        operation_name,
                        attempt + 1,
                        error
                    );
                    return Err(error);
                }
            };

            info!("Retrying {} in {:?} due to: {}", operation_name, delay, error);
            sleep(delay).await;
            attempt += 1;
        }
    }

    pub async fn get_circuit_breaker_state(&self) -> CircuitBreakerState {
        self.circuit_breaker.lock().await.get_state()
    }
}
