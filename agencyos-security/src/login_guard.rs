//! Failed-login rate limiting and lockout
//!
//! Every login attempt is tracked by two independent counters, one keyed by
//! the email and one keyed by the origin IP. A counter is `Open` until it
//! reaches `max_attempts` failures inside the attempt window, then `Locked`
//! for `lockout_duration`. An expired lockout reads as `Open` without any
//! write. A successful login resets the email counter only: one IP can host
//! many accounts, so a single success must not erase a guessing signal
//! against other emails from the same origin.
//!
//! The attempt window is anchored at the first failure of a run and restarts
//! once it has elapsed, so it approximates a rolling window: a run of failures
//! straddling a window boundary can count up to `2 * max_attempts - 2`
//! failures before locking.

use agencyos_config::LoginGuardConfig;
use agencyos_rbac::{with_timeout, SharedClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{SecurityError, SecurityResult};

/// Identifier a counter is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttemptKey {
    Email(String),
    Ip(String),
}

impl AttemptKey {
    /// Emails compare case-insensitively
    pub fn email(email: &str) -> Self {
        AttemptKey::Email(email.trim().to_lowercase())
    }

    pub fn ip(ip: &str) -> Self {
        AttemptKey::Ip(ip.trim().to_string())
    }
}

/// Reject blank identifiers before they reach a shared counter
fn validate_identifiers(email: &str, ip: Option<&str>) -> SecurityResult<()> {
    if email.trim().is_empty() {
        return Err(SecurityError::validation("Email must not be empty"));
    }
    if ip.is_some_and(|ip| ip.trim().is_empty()) {
        return Err(SecurityError::validation("IP address must not be empty"));
    }
    Ok(())
}

impl fmt::Display for AttemptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptKey::Email(email) => write!(f, "email:{}", email),
            AttemptKey::Ip(ip) => write!(f, "ip:{}", ip),
        }
    }
}

/// Failure count for one identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptCounter {
    pub attempts: u32,
    pub window_started_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
}

/// Counter state as seen at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterState {
    Open { attempts: u32 },
    Locked { attempts: u32, remaining: Duration },
}

impl CounterState {
    pub fn attempts(&self) -> u32 {
        match self {
            CounterState::Open { attempts } | CounterState::Locked { attempts, .. } => *attempts,
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            CounterState::Locked { remaining, .. } => Some(*remaining),
            CounterState::Open { .. } => None,
        }
    }
}

impl AttemptCounter {
    /// Read the counter at `now`; expired lockouts and windows read as empty
    pub fn state(&self, now: DateTime<Utc>, policy: &LoginGuardConfig) -> CounterState {
        if let Some(locked_until) = self.locked_until {
            if locked_until > now {
                let remaining = (locked_until - now).to_std().unwrap_or_default();
                return CounterState::Locked {
                    attempts: self.attempts,
                    remaining,
                };
            }
            return CounterState::Open { attempts: 0 };
        }

        if window_elapsed(self.window_started_at, now, policy.attempt_window) {
            return CounterState::Open { attempts: 0 };
        }

        CounterState::Open {
            attempts: self.attempts,
        }
    }

    /// Next counter value after one more failure at `now`.
    ///
    /// Returns the new counter and whether this failure started a lockout.
    pub fn register_failure(
        current: Option<&AttemptCounter>,
        now: DateTime<Utc>,
        policy: &LoginGuardConfig,
    ) -> (AttemptCounter, bool) {
        let fresh = AttemptCounter {
            attempts: 0,
            window_started_at: now,
            last_attempt_at: now,
            locked_until: None,
        };

        let mut counter = match current {
            // Still locked: keep counting, the lockout is not extended
            Some(existing) if existing.locked_until.is_some_and(|until| until > now) => {
                existing.clone()
            }
            Some(existing) if existing.locked_until.is_some() => fresh,
            Some(existing) if window_elapsed(existing.window_started_at, now, policy.attempt_window) => {
                fresh
            }
            Some(existing) => existing.clone(),
            None => fresh,
        };

        counter.attempts = counter.attempts.saturating_add(1);
        counter.last_attempt_at = now;

        let newly_locked = counter.locked_until.is_none() && counter.attempts >= policy.max_attempts;
        if newly_locked {
            let lockout = chrono::Duration::from_std(policy.lockout_duration)
                .unwrap_or_else(|_| chrono::Duration::minutes(15));
            counter.locked_until = Some(now + lockout);
        }

        (counter, newly_locked)
    }
}

fn window_elapsed(started: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    (now - started).to_std().is_ok_and(|age| age >= window)
}

/// Outcome of recording one failure against a counter
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub counter: AttemptCounter,
    pub newly_locked: bool,
}

/// Durable failed-attempt counters.
///
/// `record_failure` must be atomic per key: two concurrent failures against
/// the same identifier both count.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn get(&self, key: &AttemptKey) -> SecurityResult<Option<AttemptCounter>>;

    async fn record_failure(
        &self,
        key: &AttemptKey,
        now: DateTime<Utc>,
        policy: &LoginGuardConfig,
    ) -> SecurityResult<FailureRecord>;

    async fn reset(&self, key: &AttemptKey) -> SecurityResult<()>;
}

/// Attempt counters held in process memory behind one lock
#[derive(Debug, Clone, Default)]
pub struct InMemoryAttemptStore {
    counters: Arc<parking_lot::Mutex<HashMap<AttemptKey, AttemptCounter>>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn get(&self, key: &AttemptKey) -> SecurityResult<Option<AttemptCounter>> {
        Ok(self.counters.lock().get(key).cloned())
    }

    async fn record_failure(
        &self,
        key: &AttemptKey,
        now: DateTime<Utc>,
        policy: &LoginGuardConfig,
    ) -> SecurityResult<FailureRecord> {
        // Read-modify-write under a single lock
        let mut counters = self.counters.lock();
        let (counter, newly_locked) =
            AttemptCounter::register_failure(counters.get(key), now, policy);
        counters.insert(key.clone(), counter.clone());
        Ok(FailureRecord {
            counter,
            newly_locked,
        })
    }

    async fn reset(&self, key: &AttemptKey) -> SecurityResult<()> {
        self.counters.lock().remove(key);
        Ok(())
    }
}

/// Combined decision over the email and IP counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDecision {
    pub blocked: bool,
    pub email_attempts: u32,
    pub ip_attempts: u32,
    pub max_attempts: u32,
    pub remaining_lockout_seconds: u64,
    pub lockout_minutes: u64,
}

impl RateLimitDecision {
    pub fn remaining_lockout(&self) -> Duration {
        Duration::from_secs(self.remaining_lockout_seconds)
    }
}

/// Result of recording a failed login
#[derive(Debug, Clone, PartialEq)]
pub struct FailedLoginOutcome {
    pub decision: RateLimitDecision,
    /// Counters that became locked with this failure
    pub newly_locked: Vec<AttemptKey>,
}

/// Decides whether a login attempt may proceed
#[derive(Clone)]
pub struct LoginGuard {
    store: Arc<dyn AttemptStore>,
    policy: LoginGuardConfig,
    clock: SharedClock,
    call_timeout: Duration,
}

impl LoginGuard {
    pub fn new(
        store: Arc<dyn AttemptStore>,
        policy: LoginGuardConfig,
        clock: SharedClock,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            policy,
            clock,
            call_timeout,
        }
    }

    pub fn policy(&self) -> &LoginGuardConfig {
        &self.policy
    }

    /// Pure decision over both counters; never writes
    pub async fn check_rate_limit(
        &self,
        email: &str,
        ip: Option<&str>,
    ) -> SecurityResult<RateLimitDecision> {
        validate_identifiers(email, ip)?;
        let now = self.clock.now();
        let email_state = self.state_of(&AttemptKey::email(email), now).await?;
        let ip_state = match ip {
            Some(ip) => Some(self.state_of(&AttemptKey::ip(ip), now).await?),
            None => None,
        };
        Ok(self.decide(email_state, ip_state))
    }

    /// Fail with `RateLimited` when either counter is locked
    pub async fn ensure_allowed(
        &self,
        email: &str,
        ip: Option<&str>,
    ) -> SecurityResult<RateLimitDecision> {
        let decision = self.check_rate_limit(email, ip).await?;
        if decision.blocked {
            tracing::warn!(
                email_attempts = decision.email_attempts,
                ip_attempts = decision.ip_attempts,
                remaining_seconds = decision.remaining_lockout_seconds,
                "Login attempt rejected by lockout"
            );
            return Err(SecurityError::RateLimited {
                remaining: decision.remaining_lockout(),
            });
        }
        Ok(decision)
    }

    /// Count one failure against the email and, when known, the IP
    pub async fn record_failed_login(
        &self,
        email: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> SecurityResult<FailedLoginOutcome> {
        validate_identifiers(email, ip)?;
        let now = self.clock.now();
        let mut newly_locked = Vec::new();

        let email_key = AttemptKey::email(email);
        let email_record = self.record(&email_key, now).await?;
        if email_record.newly_locked {
            newly_locked.push(email_key);
        }

        let ip_record = match ip {
            Some(ip) => {
                let ip_key = AttemptKey::ip(ip);
                let record = self.record(&ip_key, now).await?;
                if record.newly_locked {
                    newly_locked.push(ip_key);
                }
                Some(record)
            }
            None => None,
        };

        let decision = self.decide(
            email_record.counter.state(now, &self.policy),
            ip_record.map(|record| record.counter.state(now, &self.policy)),
        );

        tracing::info!(
            ip = ip.unwrap_or("unknown"),
            user_agent = user_agent.unwrap_or("unknown"),
            email_attempts = decision.email_attempts,
            ip_attempts = decision.ip_attempts,
            "Failed login recorded"
        );
        for key in &newly_locked {
            tracing::warn!(
                key = %key,
                lockout_minutes = decision.lockout_minutes,
                "Login identifier locked"
            );
        }

        Ok(FailedLoginOutcome {
            decision,
            newly_locked,
        })
    }

    /// Reset the email counter; the IP counter is left alone
    pub async fn record_successful_login(&self, email: &str) -> SecurityResult<()> {
        validate_identifiers(email, None)?;
        let key = AttemptKey::email(email);
        with_timeout(self.call_timeout, "reset_attempts", self.store.reset(&key)).await
    }

    async fn state_of(&self, key: &AttemptKey, now: DateTime<Utc>) -> SecurityResult<CounterState> {
        let counter = with_timeout(self.call_timeout, "get_attempts", self.store.get(key)).await?;
        Ok(counter
            .map(|counter| counter.state(now, &self.policy))
            .unwrap_or(CounterState::Open { attempts: 0 }))
    }

    async fn record(&self, key: &AttemptKey, now: DateTime<Utc>) -> SecurityResult<FailureRecord> {
        with_timeout(
            self.call_timeout,
            "record_failure",
            self.store.record_failure(key, now, &self.policy),
        )
        .await
    }

    fn decide(&self, email: CounterState, ip: Option<CounterState>) -> RateLimitDecision {
        let remaining = [email.remaining(), ip.and_then(|state| state.remaining())]
            .into_iter()
            .flatten()
            .max();

        RateLimitDecision {
            blocked: remaining.is_some(),
            email_attempts: email.attempts(),
            ip_attempts: ip.map(|state| state.attempts()).unwrap_or(0),
            max_attempts: self.policy.max_attempts,
            remaining_lockout_seconds: remaining.map(ceil_secs).unwrap_or(0),
            lockout_minutes: self.policy.lockout_duration.as_secs().div_ceil(60),
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}
