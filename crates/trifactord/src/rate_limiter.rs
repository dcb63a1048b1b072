use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use trifactor_core::{StageOutcome, VerificationOutcome};

/// Rate-limit tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Deliberate rejections tolerated inside the window before lockout.
    pub max_rejections: u32,
    /// Sliding window over which rejections are counted.
    pub window: Duration,
    /// How long a locked-out user stays locked.
    pub lockout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_rejections: 5,
            window: Duration::from_secs(60),
            lockout: Duration::from_secs(300),
        }
    }
}

struct History {
    /// Timestamps of recent deliberate rejections, oldest first.
    rejections: VecDeque<Instant>,
    locked_until: Option<Instant>,
}

/// Per-user lockout on repeated pipeline rejections.
///
/// Fed whole [`VerificationOutcome`]s rather than a bare pass/fail bit, so
/// the limiter itself decides what counts: a comparison that completed and
/// mismatched, or a denied device credential. Timeouts, comparator
/// failures and missing features leave the tally untouched — a flaky
/// capture path can never lock a user out.
pub struct RateLimiter {
    limits: Limits,
    users: HashMap<String, History>,
}

impl RateLimiter {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            users: HashMap::new(),
        }
    }

    /// `Ok(())` when the user may run the pipeline, `Err(retry_after)`
    /// while locked out.
    pub fn check(&mut self, user: &str) -> Result<(), Duration> {
        let now = Instant::now();
        match self.users.get(user).and_then(|h| h.locked_until) {
            Some(until) if now < until => Err(until.duration_since(now)),
            Some(_) => {
                // Lockout served; the user starts over with a clean history.
                self.users.remove(user);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Fold one finished pipeline run into the user's history.
    pub fn record_outcome(&mut self, user: &str, outcome: &VerificationOutcome) {
        if outcome.verified {
            self.users.remove(user);
            return;
        }
        if !deliberate_rejection(outcome) {
            return;
        }

        let now = Instant::now();
        let limits = self.limits;
        let history = self.users.entry(user.to_string()).or_insert(History {
            rejections: VecDeque::new(),
            locked_until: None,
        });

        history.rejections.push_back(now);
        while let Some(&oldest) = history.rejections.front() {
            if now.duration_since(oldest) >= limits.window {
                history.rejections.pop_front();
            } else {
                break;
            }
        }

        if history.rejections.len() as u32 >= limits.max_rejections {
            history.locked_until = Some(now + limits.lockout);
            history.rejections.clear();
            tracing::warn!(
                user,
                lockout_secs = limits.lockout.as_secs(),
                "repeated rejections — locking user"
            );
        } else {
            tracing::debug!(
                user,
                rejections = history.rejections.len(),
                max = limits.max_rejections,
                "rejection recorded"
            );
        }
    }
}

/// A rejection the user caused, as opposed to a processing error.
fn deliberate_rejection(outcome: &VerificationOutcome) -> bool {
    if outcome.secondary_factor == Some(false) {
        return true;
    }
    [&outcome.face, &outcome.palm, &outcome.voice]
        .iter()
        .any(|stage| matches!(stage, StageOutcome::Completed { result } if !result.passed))
}
