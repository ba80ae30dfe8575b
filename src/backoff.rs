// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Reconnect delay policy

use crate::config::BackoffConfig;
use std::time::Duration;

/// Exponential delay, capped, never below the configured initial delay
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(config: &BackoffConfig) -> Self {
        let initial = config.initial();
        Self {
            initial,
            max: config.max().max(initial),
            multiplier: config.multiplier.max(1.0),
            current: initial,
        }
    }

    /// Delay to wait now; the following call returns a longer one up to the cap
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next_ms = (self.current.as_millis() as f64 * self.multiplier).round();
        self.current = Duration::from_millis(next_ms.min(self.max.as_millis() as f64) as u64);
        delay
    }

    /// Back to the initial delay after a link that managed to stream
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial_ms: u64, max_ms: u64, multiplier: f64) -> BackoffConfig {
        BackoffConfig {
            initial_ms,
            max_ms,
            multiplier,
        }
    }

    #[test]
    fn test_exponential_with_cap() {
        let mut backoff = Backoff::new(&config(100, 500, 2.0));
        let delays: Vec<u64> = (0..5).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn test_fixed_delay() {
        let mut backoff = Backoff::new(&config(2000, 2000, 1.0));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::new(&config(100, 1000, 3.0));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }
}
