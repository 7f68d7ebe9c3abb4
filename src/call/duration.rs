use crate::error::CallError;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Parse a duration budget of the form `<N>h`, `<N>m` or `<N>s`
///
/// Anything else (empty, signs, whitespace, fractions, other units) is a
/// `CallError::Config`.
pub fn parse_duration(value: &str) -> Result<Duration, CallError> {
    let invalid = || {
        CallError::Config(format!(
            "Invalid duration format {:?}. Use format like \"1h\", \"30m\", or \"1800s\"",
            value
        ))
    };

    let unit = value.chars().last().ok_or_else(invalid)?;
    let digits = &value[..value.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let amount: u64 = digits.parse().map_err(|_| invalid())?;
    let secs_per_unit = match unit {
        'h' => 60 * 60,
        'm' => 60,
        's' => 1,
        _ => return Err(invalid()),
    };

    amount
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(invalid)
}

/// A countdown started by `arm`
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancel the countdown. No-op when already fired or cancelled.
    pub fn disarm(&self) {
        self.task.abort();
    }

    /// Still counting down
    pub fn is_armed(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Run `on_expire` once `after` has elapsed, unless disarmed first
pub fn arm<F>(after: Duration, on_expire: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let task = tokio::spawn(async move {
        tokio::time::sleep(after).await;
        debug!("Duration budget of {:?} expired", after);
        on_expire();
    });

    TimerHandle { task }
}

/// Slot holding at most one armed countdown
#[derive(Debug, Default)]
pub struct DurationTimer {
    current: Option<TimerHandle>,
}

impl DurationTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a new countdown, disarming any previous one first
    pub fn arm<F>(&mut self, after: Duration, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.disarm();
        self.current = Some(arm(after, on_expire));
    }

    /// Cancel the current countdown, if any
    pub fn disarm(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.disarm();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.current.as_ref().is_some_and(TimerHandle::is_armed)
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
