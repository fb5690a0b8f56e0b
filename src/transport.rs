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

use crate::INFINITE_SSTHRESH;

/// Sender side window state owned by the transport stack.
///
/// Controllers read the observables and write the window fields back. All
/// window quantities are in segments unless the field says bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportState {
    /// Congestion window in segments.
    pub cwnd: u32,

    /// Sub-round credit counter used by window growth.
    pub cwnd_cnt: u32,

    /// Upper limit of the congestion window in segments.
    pub cwnd_clamp: u32,

    /// Slow start threshold in segments.
    pub ssthresh: u32,

    /// Maximum segment size in bytes.
    pub mss: u32,

    /// Receive window currently advertised by the peer in bytes.
    pub snd_wnd: u32,

    /// Largest receive window the peer has advertised in bytes.
    pub max_window: u32,

    /// Segments sent but not yet acknowledged.
    pub packets_out: u32,
}

impl TransportState {
    pub fn new(mss: u32) -> Self {
        Self {
            cwnd: 0,
            cwnd_cnt: 0,
            cwnd_clamp: 0,
            ssthresh: INFINITE_SSTHRESH,
            mss,
            snd_wnd: 0,
            max_window: 0,
            packets_out: 0,
        }
    }

    /// Segment size used for byte/segment conversions. Never zero.
    pub fn mss(&self) -> u32 {
        self.mss.max(1)
    }

    /// Whether the window is below the slow start threshold.
    pub fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    /// Whether the slow start threshold has been set by a congestion signal.
    pub fn ssthresh_is_finite(&self) -> bool {
        self.ssthresh < INFINITE_SSTHRESH
    }

    /// Ceiling expressed in bytes.
    pub fn cwnd_clamp_bytes(&self) -> u64 {
        self.cwnd_clamp as u64 * self.mss() as u64
    }
}

impl Default for TransportState {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MSS)
    }
}
