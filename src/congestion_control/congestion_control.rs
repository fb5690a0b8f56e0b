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

#![allow(unused_variables)]

use core::str::FromStr;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::*;
use serde::Deserialize;
use serde::Serialize;
use strum_macros::EnumIter;

use crate::Config;
use crate::Error;
use crate::Result;
use crate::TransportState;
pub use reno::Reno;
pub use reno::RenoGrowth;
pub use rtt_boundary::RttBoundary;
pub use wrc::Wrc;

/// Available congestion control algorithm
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionControlAlgorithm {
    /// WRC bounds the window by a ceiling derived from the smoothed RTT and
    /// the peer's receive window, and grows toward it with slow start, quick
    /// start and batched additive increase.
    #[default]
    Wrc,

    /// Reno is the reference behaviour of the transport stack: standard slow
    /// start, one segment per round in congestion avoidance and halving on
    /// congestion.
    Reno,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("wrc") {
            Ok(CongestionControlAlgorithm::Wrc)
        } else if algor.eq_ignore_ascii_case("reno") {
            Ok(CongestionControlAlgorithm::Reno)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Generic events the transport stack reports to the controller.
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, EnumIter)]
pub enum CongestionEvent {
    /// First transmission after an idle period.
    TxStart,

    /// The window is restarted after an idle period.
    CwndRestart,

    /// Congestion window reduction finished, recovery is complete.
    CompleteCwr,

    /// A retransmission timeout fired.
    Loss,

    /// ECN capable packet received without CE mark.
    EcnNoCe,

    /// ECN capable packet received with CE mark.
    EcnIsCe,
}

/// Per connection congestion control statistics.
#[repr(C)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CongestionStats {
    /// Valid RTT samples processed.
    pub rtt_samples: u64,

    /// RTT samples dropped as invalid.
    pub invalid_rtt_samples: u64,

    /// Times the RTT markers were recomputed.
    pub min_rtt_updates: u64,

    /// Slow start thresholds computed on congestion.
    pub ssthresh_computations: u64,

    /// Loss events.
    pub loss_events: u64,

    /// Recovery completion events.
    pub recovery_events: u64,

    /// Times congestion avoidance was left for slow start.
    pub ca_exits: u64,

    /// Growth ticks served by quick start.
    pub quick_start_rounds: u64,

    /// Zero window or zero ceiling repairs.
    pub window_repairs: u64,
}

/// Congestion control interfaces shared by different algorithms.
///
/// The transport stack serializes calls per connection and passes its
/// window state on every call.
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback when the connection is set up.
    fn on_init(&mut self, now: Instant, sock: &mut TransportState);

    /// Callback for each RTT sample taken from an ACK.
    fn on_ack_sample(&mut self, now: Instant, rtt_us: i64, sock: &mut TransportState) {}

    /// Callback once per ACK processing cycle to grow the window.
    fn on_growth_tick(
        &mut self,
        now: Instant,
        is_window_limited: bool,
        in_flight: u32,
        sock: &mut TransportState,
    );

    /// Compute the slow start threshold when congestion is detected.
    fn on_congestion_detected(&mut self, sock: &TransportState) -> u32;

    /// Loss event.
    fn on_loss(&mut self, now: Instant, sock: &mut TransportState) {}

    /// Recovery completion event.
    fn on_recovery_complete(&mut self, now: Instant, sock: &mut TransportState) {}

    /// Generic event from the transport stack.
    fn on_event(&mut self, now: Instant, event: CongestionEvent, sock: &mut TransportState) {
        match event {
            CongestionEvent::Loss => self.on_loss(now, sock),
            CongestionEvent::CompleteCwr => self.on_recovery_complete(now, sock),
            _ => debug!(
                "{} ignore event {:?}, cwnd={}",
                self.name(),
                event,
                sock.cwnd
            ),
        }
    }

    /// Window to restore when a congestion signal turns out to be spurious.
    fn undo_window(&self, sock: &TransportState) -> u32 {
        sock.cwnd
    }

    /// Check if in slow start.
    fn in_slow_start(&self, sock: &TransportState) -> bool {
        sock.in_slow_start()
    }

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller.")
    }
}

/// Reference window growth functions of the transport stack.
///
/// WRC falls back to these when legacy mode is off.
pub trait ReferenceGrowth {
    /// Grow the window by `acked` segments, up to the slow start threshold
    /// and the ceiling. Return the credit left once the threshold is hit.
    fn slow_start(&self, sock: &mut TransportState, acked: u32) -> u32;

    /// Grow the window by one segment per `w` credited segments, up to the
    /// ceiling.
    fn cong_avoid_ai(&self, sock: &mut TransportState, w: u32, acked: u32);
}

/// Build a congestion controller.
pub fn build_congestion_controller(conf: &Arc<Config>) -> Box<dyn CongestionController> {
    match conf.congestion_control_algorithm {
        CongestionControlAlgorithm::Wrc => Box::new(Wrc::new(conf.clone())),
        CongestionControlAlgorithm::Reno => Box::new(Reno::new(conf.init_cwnd)),
    }
}


mod lpf;
mod reno;
mod rtt_boundary;
mod rwin;
mod wrc;
