// Copyright (c) 2023 The TQUIC Authors.
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

//! RTT markers and the RTT to window ceiling mapping.
//!
//! Two markers split the RTT axis. Up to the low marker the ceiling is
//! `cwnd_highbound`, from the high marker on it is `cwnd_lowbound`, and in
//! between it follows the line joining the two points:
//!
//! ```text
//!   ceiling
//!      ^
//!  high|-------.
//!      |        \
//!      |         \  slope = (low - high) / (high_marker - low_marker)
//!      |          \
//!   low|           `--------
//!      +-------+----+-------> srtt
//!           low    high
//!          marker  marker
//! ```

use crate::Config;

/// Connection specific RTT markers and interpolation slope.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct RttBoundary {
    /// RTT in milliseconds up to which the ceiling is `cwnd_highbound`.
    pub low_marker: u32,

    /// RTT in milliseconds from which the ceiling is `cwnd_lowbound`.
    pub high_marker: u32,

    /// Ceiling change in bytes per millisecond between the markers. Never
    /// positive.
    pub slope: i64,
}

impl RttBoundary {
    /// Derive the markers and slope from the minimum RTT observed so far.
    pub fn calculate(conf: &Config, min_rtt_ms: u32) -> Self {
        let low_marker = low_marker(conf, min_rtt_ms);
        let high_marker = high_marker(conf, min_rtt_ms);

        Self {
            low_marker,
            high_marker,
            slope: slope(conf, low_marker, high_marker),
        }
    }

    /// Map a smoothed RTT to a window ceiling in segments.
    pub fn window_bound(&self, conf: &Config, srtt_ms: u32, mss: u32) -> u32 {
        if srtt_ms >= self.high_marker {
            return conf.cwnd_lower_bound(mss);
        }
        if srtt_ms <= self.low_marker {
            return conf.cwnd_upper_bound(mss);
        }

        // low_marker < srtt_ms < high_marker here.
        let delta = (srtt_ms - self.low_marker) as i64;
        let bytes = (conf.cwnd_highbound as i64 + delta * self.slope).max(0);

        (bytes / mss.max(1) as i64) as u32
    }
}

fn low_marker(conf: &Config, rtt_ms: u32) -> u32 {
    if rtt_ms < conf.rtt_low_floor {
        return conf.rtt_low_floor;
    }
    if rtt_ms >= conf.rtt_low_ceiling {
        return conf.rtt_low_ceiling;
    }
    rtt_ms
}

fn high_marker(conf: &Config, rtt_ms: u32) -> u32 {
    let scaled = rtt_ms.saturating_mul(conf.rtt_high_factor);

    if scaled < conf.rtt_high_floor {
        return conf.rtt_high_floor;
    }
    if scaled >= conf.rtt_high_ceiling {
        return conf.rtt_high_ceiling;
    }
    scaled
}

fn slope(conf: &Config, low_marker: u32, high_marker: u32) -> i64 {
    if conf.cwnd_highbound <= conf.cwnd_lowbound || high_marker <= low_marker {
        return 0;
    }

    let ydiff = conf.cwnd_lowbound as i64 - conf.cwnd_highbound as i64;
    let xdiff = (high_marker - low_marker) as i64;

    // Truncates toward zero.
    ydiff / xdiff
}
