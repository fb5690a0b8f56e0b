// Copyright (c) 2024 The TQUIC Authors.
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

#![allow(unused_variables)]

use std::cmp;
use std::time::Instant;

use super::CongestionController;
use super::CongestionStats;
use super::ReferenceGrowth;
use crate::TransportState;
use crate::INFINITE_SSTHRESH;

/// Standard window growth of the transport stack.
///
/// Slow start grows the window by the acknowledged segments; congestion
/// avoidance grows it by one segment per window of acknowledged segments.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenoGrowth;

impl ReferenceGrowth for RenoGrowth {
    fn slow_start(&self, sock: &mut TransportState, acked: u32) -> u32 {
        let cwnd = cmp::min(sock.cwnd.saturating_add(acked), sock.ssthresh);
        let acked = acked - (cwnd - sock.cwnd.min(cwnd));
        sock.cwnd = cmp::min(cwnd, sock.cwnd_clamp);
        acked
    }

    fn cong_avoid_ai(&self, sock: &mut TransportState, w: u32, acked: u32) {
        let w = w.max(1);

        // If credits accumulated at a higher w, apply them gently now.
        if sock.cwnd_cnt >= w {
            sock.cwnd_cnt = 0;
            sock.cwnd = sock.cwnd.saturating_add(1);
        }

        sock.cwnd_cnt = sock.cwnd_cnt.saturating_add(acked);
        if sock.cwnd_cnt >= w {
            let delta = sock.cwnd_cnt / w;
            sock.cwnd_cnt -= delta * w;
            sock.cwnd = sock.cwnd.saturating_add(delta);
        }

        sock.cwnd = cmp::min(sock.cwnd, sock.cwnd_clamp);
    }
}

/// Reno uses the stack's reference growth and halves the window on
/// congestion. It is intended to be used as a baseline for WRC.
#[derive(Debug)]
pub struct Reno {
    /// Initial congestion window in segments.
    initial_cwnd: u32,

    /// Window growth functions.
    growth: RenoGrowth,

    /// Window saved at the last congestion signal.
    prior_cwnd: u32,

    /// Congestion statistics.
    stats: CongestionStats,
}

impl Reno {
    pub fn new(initial_cwnd: u32) -> Self {
        Self {
            initial_cwnd,
            growth: RenoGrowth,
            prior_cwnd: 0,
            stats: Default::default(),
        }
    }
}

impl CongestionController for Reno {
    fn name(&self) -> &str {
        "RENO"
    }

    fn on_init(&mut self, now: Instant, sock: &mut TransportState) {
        sock.cwnd = self.initial_cwnd.max(1);
        sock.ssthresh = INFINITE_SSTHRESH;
        if sock.cwnd_clamp == 0 {
            sock.cwnd_clamp = u32::MAX;
        }
    }

    fn on_ack_sample(&mut self, now: Instant, rtt_us: i64, sock: &mut TransportState) {
        if rtt_us > 0 {
            self.stats.rtt_samples += 1;
        } else {
            self.stats.invalid_rtt_samples += 1;
        }
    }

    fn on_growth_tick(
        &mut self,
        now: Instant,
        is_window_limited: bool,
        in_flight: u32,
        sock: &mut TransportState,
    ) {
        if !is_window_limited {
            return;
        }

        let mut acked = in_flight;
        if sock.in_slow_start() {
            acked = self.growth.slow_start(sock, acked);
            if acked == 0 {
                return;
            }
        }
        let w = sock.cwnd;
        self.growth.cong_avoid_ai(sock, w, acked);
    }

    fn on_congestion_detected(&mut self, sock: &TransportState) -> u32 {
        self.stats.ssthresh_computations += 1;
        self.prior_cwnd = sock.cwnd;
        cmp::max(sock.cwnd >> 1, 2)
    }

    fn on_loss(&mut self, now: Instant, sock: &mut TransportState) {
        self.stats.loss_events += 1;
        sock.cwnd = 1;
        sock.cwnd_cnt = 0;
    }

    fn on_recovery_complete(&mut self, now: Instant, sock: &mut TransportState) {
        self.stats.recovery_events += 1;
        if sock.ssthresh_is_finite() {
            sock.cwnd = sock.ssthresh;
        }
    }

    fn undo_window(&self, sock: &TransportState) -> u32 {
        cmp::max(sock.cwnd, self.prior_cwnd)
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}
