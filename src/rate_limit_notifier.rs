use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const NOTIFY_INTERVAL: Duration = Duration::from_secs(60);

static RATE_LIMIT_NOTIFIER: Lazy<RateLimitNotifier> =
    Lazy::new(|| RateLimitNotifier::new(NOTIFY_INTERVAL));

/// Warns about a rate limit hit in `context`, at most once per minute per context.
pub fn notify_rate_limit(context: &str, detail: &str) -> bool {
    RATE_LIMIT_NOTIFIER.notify(context, detail, Instant::now())
}

struct RateLimitNotifier {
    interval: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl RateLimitNotifier {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    fn notify(&self, context: &str, detail: &str, now: Instant) -> bool {
        let mut last_sent = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(sent) = last_sent.get(context) {
            if now.saturating_duration_since(*sent) < self.interval {
                log::debug!("[RateLimit] suppressed repeat for '{}'", context);
                return false;
            }
        }
        last_sent.insert(context.to_string(), now);
        log::warn!(
            "[RateLimit] Too many requests while {} (detail: {})",
            context,
            detail
        );
        true
    }
}
