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

use std::fs::OpenOptions;

use log::debug;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Log to the given file, or to `stderr` if no file is specified.
pub fn log_target(log_file: &Option<String>) -> Result<env_logger::Target> {
    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        return Ok(env_logger::Target::Pipe(Box::new(file)));
    }
    Ok(env_logger::Target::Stderr)
}

/// Parameters of a synthetic long-delay link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Propagation round trip time in milliseconds.
    pub base_rtt_ms: u64,

    /// Bottleneck bandwidth in Mbit/s.
    pub bandwidth_mbps: u64,

    /// Bottleneck queue capacity in packets.
    pub queue_packets: u32,

    /// Upper bound of the random extra delay per round in milliseconds.
    pub jitter_ms: u64,

    /// Random loss probability per packet.
    pub loss_rate: f64,

    /// Packet size in bytes.
    pub mss: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_rtt_ms: 600,
            bandwidth_mbps: 20,
            queue_packets: 500,
            jitter_ms: 20,
            loss_rate: 0.0,
            mss: 1024,
        }
    }
}

/// Outcome of one round trip on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Round {
    /// Round trip time seen by the packets of this round.
    pub rtt_ms: u64,

    /// Packets acknowledged.
    pub delivered: u32,

    /// Packets dropped by queue overflow or random loss.
    pub lost: u32,
}

/// A bottleneck with a drop-tail queue, carrying one window per round.
pub struct Link {
    conf: LinkConfig,
    rng: StdRng,
}

impl Link {
    pub fn new(mut conf: LinkConfig, seed: u64) -> Self {
        conf.loss_rate = conf.loss_rate.clamp(0.0, 1.0);
        conf.mss = conf.mss.max(1);
        Self {
            conf,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.conf
    }

    /// Bytes the bottleneck drains per millisecond.
    fn bytes_per_ms(&self) -> u64 {
        (self.conf.bandwidth_mbps * 125).max(1)
    }

    /// Packets in flight the link carries without queuing.
    pub fn bdp_packets(&self) -> u32 {
        let bdp = self.bytes_per_ms() * self.conf.base_rtt_ms / self.conf.mss as u64;
        bdp.min(u32::MAX as u64) as u32
    }

    /// Send a window of packets and return what comes back.
    pub fn transmit(&mut self, in_flight: u32) -> Round {
        let queued = in_flight.saturating_sub(self.bdp_packets());
        let overflow = queued.saturating_sub(self.conf.queue_packets);
        let queued = queued - overflow;
        let sent = in_flight - overflow;

        let mut random_loss = 0;
        if self.conf.loss_rate > 0.0 {
            for _ in 0..sent {
                if self.rng.gen_bool(self.conf.loss_rate) {
                    random_loss += 1;
                }
            }
        }

        let queue_delay_ms = queued as u64 * self.conf.mss as u64 / self.bytes_per_ms();
        let jitter_ms = if self.conf.jitter_ms > 0 {
            self.rng.gen_range(0..=self.conf.jitter_ms)
        } else {
            0
        };

        let round = Round {
            rtt_ms: self.conf.base_rtt_ms + queue_delay_ms + jitter_ms,
            delivered: sent - random_loss,
            lost: overflow + random_loss,
        };
        debug!(
            "link in_flight={} queued={} overflow={} {:?}",
            in_flight, queued, overflow, round
        );
        round
    }
}
