//! Per-entry expiration options and their resolution against a clock.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use crate::Error;

/// Expiration policy requested by the caller of a write.
///
/// When nothing is set, the cache's default sliding expiration applies.
/// A relative absolute expiration wins over an absolute instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryOptions {
    pub sliding_expiration: Option<StdDuration>,
    pub absolute_expiration: Option<DateTime<Utc>>,
    pub absolute_expiration_relative_to_now: Option<StdDuration>,
}

impl EntryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sliding_expiration(mut self, sliding: StdDuration) -> Self {
        self.sliding_expiration = Some(sliding);
        self
    }

    pub fn with_absolute_expiration(mut self, at: DateTime<Utc>) -> Self {
        self.absolute_expiration = Some(at);
        self
    }

    pub fn with_absolute_expiration_relative_to_now(mut self, after: StdDuration) -> Self {
        self.absolute_expiration_relative_to_now = Some(after);
        self
    }

    fn is_empty(&self) -> bool {
        self.sliding_expiration.is_none()
            && self.absolute_expiration.is_none()
            && self.absolute_expiration_relative_to_now.is_none()
    }

    /// Resolve to the values persisted with the entry.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` when a duration is zero, sub-second for sliding,
    ///   or out of range.
    /// - `InvalidOperation` when the absolute instant is not after `now`, or
    ///   when no policy can be resolved.
    pub fn resolve(&self, now: DateTime<Utc>, default_sliding: StdDuration) -> Result<ResolvedExpiration, Error> {
        let sliding = if self.is_empty() { Some(default_sliding) } else { self.sliding_expiration };

        let sliding_seconds = match sliding {
            Some(sliding) => {
                let secs = i64::try_from(sliding.as_secs()).map_err(|_| {
                    Error::InvalidArgument("sliding expiration is out of range".to_string())
                })?;
                if secs == 0 {
                    return Err(Error::InvalidArgument(
                        "The sliding expiration value must be at least one second.".to_string(),
                    ));
                }
                Some(secs)
            }
            None => None,
        };

        let absolute = if let Some(after) = self.absolute_expiration_relative_to_now {
            if after.is_zero() {
                return Err(Error::InvalidArgument(
                    "The relative expiration value must be positive.".to_string(),
                ));
            }
            let after = Duration::from_std(after)
                .map_err(|_| Error::InvalidArgument("relative expiration is out of range".to_string()))?;
            let at = now
                .checked_add_signed(after)
                .ok_or_else(|| Error::InvalidArgument("relative expiration is out of range".to_string()))?;
            Some(at)
        } else if let Some(at) = self.absolute_expiration {
            if at <= now {
                return Err(Error::InvalidOperation(
                    "The absolute expiration value must be in the future.".to_string(),
                ));
            }
            Some(at)
        } else {
            None
        };

        if sliding_seconds.is_none() && absolute.is_none() {
            return Err(Error::InvalidOperation(
                "Either absolute or sliding expiration needs to be provided.".to_string(),
            ));
        }

        let resolved = ResolvedExpiration { now, sliding_seconds, absolute_expiration: absolute };
        resolved.expires_at()?;
        Ok(resolved)
    }
}

/// Expiration values bound to the instant they were resolved at.
///
/// Only [`EntryOptions::resolve`] builds one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedExpiration {
    pub(crate) now: DateTime<Utc>,
    pub(crate) sliding_seconds: Option<i64>,
    pub(crate) absolute_expiration: Option<DateTime<Utc>>,
}

impl ResolvedExpiration {
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn sliding_seconds(&self) -> Option<i64> {
        self.sliding_seconds
    }

    pub fn absolute_expiration(&self) -> Option<DateTime<Utc>> {
        self.absolute_expiration
    }

    /// The `expires_at` written with the entry: `min(now + sliding, absolute)`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` unless the sliding part is at least one second, the
    /// absolute part is after `now`, at least one of them is present and the
    /// sum stays in range.
    pub fn expires_at(&self) -> Result<DateTime<Utc>, Error> {
        let sliding = match self.sliding_seconds {
            Some(secs) if secs < 1 => {
                return Err(Error::InvalidArgument("sliding expiration must be at least one second".to_string()));
            }
            Some(secs) => Some(
                Duration::try_seconds(secs)
                    .and_then(|sliding| self.now.checked_add_signed(sliding))
                    .ok_or_else(|| Error::InvalidArgument("sliding expiration is out of range".to_string()))?,
            ),
            None => None,
        };

        if let Some(abs) = self.absolute_expiration {
            if abs <= self.now {
                return Err(Error::InvalidArgument("absolute expiration must be after now".to_string()));
            }
        }

        match (sliding, self.absolute_expiration) {
            (Some(sliding), Some(abs)) => Ok(sliding.min(abs)),
            (Some(sliding), None) => Ok(sliding),
            (None, Some(abs)) => Ok(abs),
            (None, None) => Err(Error::InvalidArgument("no expiration to apply".to_string())),
        }
    }
}
