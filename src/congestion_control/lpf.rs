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

//! Low pass filter for RTT samples.
//!
//! `srtt = (srtt_prev * (W_max - w) + rtt * w) / W_max`, where the weight
//! `w` depends on where the previous estimate sits relative to the RTT
//! markers, so the estimate moves fast when leaving the good or the bad
//! region and slowly in between. Outlier samples get the lightest weight.

use super::RttBoundary;
use crate::Config;

/// Filter regime selecting the EWMA weight.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LpfRegime {
    /// Non positive sample, the estimate is kept.
    Invalid,

    /// Sample above `lpf_rtt_threshold`.
    Outlier,

    /// Previous estimate below the low marker.
    FastPath,

    /// Previous estimate between the markers.
    Mid,

    /// Previous estimate at or above the high marker.
    Degraded,
}

impl LpfRegime {
    pub fn classify(conf: &Config, rtt_ms: i64, srtt_prev: u32, boundary: &RttBoundary) -> Self {
        if rtt_ms <= 0 {
            LpfRegime::Invalid
        } else if rtt_ms > conf.lpf_rtt_threshold as i64 {
            LpfRegime::Outlier
        } else if srtt_prev < boundary.low_marker {
            LpfRegime::FastPath
        } else if srtt_prev < boundary.high_marker {
            LpfRegime::Mid
        } else {
            LpfRegime::Degraded
        }
    }

    /// EWMA weight in parts of `ewma_max_weight`.
    pub fn weight(&self, conf: &Config) -> u32 {
        match self {
            LpfRegime::Invalid => 0,
            LpfRegime::Outlier => conf.ewma_light_weight,
            LpfRegime::FastPath | LpfRegime::Degraded => conf.ewma_heavy_weight,
            LpfRegime::Mid => conf.ewma_weight,
        }
    }
}

/// Smooth one RTT sample into the previous estimate.
pub fn lpf_srtt(conf: &Config, rtt_ms: i64, srtt_prev: u32, boundary: &RttBoundary) -> u32 {
    let regime = LpfRegime::classify(conf, rtt_ms, srtt_prev, boundary);
    if regime == LpfRegime::Invalid {
        return srtt_prev;
    }

    let max_weight = conf.ewma_max_weight.max(1) as u64;
    let weight = (regime.weight(conf) as u64).min(max_weight);
    let rtt_ms = rtt_ms.min(u32::MAX as i64) as u64;

    let srtt = (srtt_prev as u64 * (max_weight - weight) + rtt_ms * weight) / max_weight;
    srtt as u32
}
