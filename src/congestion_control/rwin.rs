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

//! Window limits derived from the peer's receive window.

use std::cmp;

use crate::Config;
use crate::TransportState;
use crate::DEFAULT_INIT_CWND;

/// Reduce a ceiling (in segments) to what the peer's receive window can
/// absorb.
///
/// The peer window is estimated as the advertised window plus the data
/// already in flight. Only a `safe_factor` percent share of it is used, and
/// a reduced ceiling never drops below `init_cwnd`.
pub fn clamp_to_peer_window(conf: &Config, sock: &TransportState, cwnd_clamp: u32) -> u32 {
    let mss = sock.mss() as u64;
    let clamp_bytes = cwnd_clamp as u64 * mss;

    let estimated_rwin = sock.snd_wnd as u64 + sock.packets_out as u64 * mss;
    let reduced_rwin = estimated_rwin.saturating_mul(conf.safe_factor as u64) / 100;

    if reduced_rwin >= clamp_bytes {
        return cwnd_clamp;
    }

    let clamp_bytes = cmp::max(reduced_rwin, conf.init_cwnd as u64 * mss);
    (clamp_bytes / mss).min(u32::MAX as u64) as u32
}

/// Window chosen by one quick start round.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct QuickStart {
    /// New congestion window in segments.
    pub cwnd: u32,

    /// The peer window is open wide enough to leave quick start.
    pub exit: bool,
}

/// Size the window from the largest window the peer has advertised.
///
/// A `1 / 2^rwin_booster_safe_shift` share of the peer window is held back
/// to avoid silly window syndrome.
pub fn quick_start(conf: &Config, sock: &TransportState) -> QuickStart {
    let mss = sock.mss();
    let clamp_bytes = sock.cwnd_clamp_bytes();

    let mut rwnd = sock.max_window / mss;
    rwnd -= rwnd.checked_shr(conf.rwin_booster_safe_shift).unwrap_or(0);
    let rwnd = cmp::max(rwnd, DEFAULT_INIT_CWND);

    let cwnd_clamp = cmp::max(sock.cwnd_clamp, conf.cwnd_lower_bound(mss));

    QuickStart {
        cwnd: cmp::min(rwnd, cwnd_clamp),
        exit: sock.max_window as u64 >= clamp_bytes.saturating_mul(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Profile;

    fn sock(snd_wnd: u32, packets_out: u32) -> TransportState {
        TransportState {
            snd_wnd,
            packets_out,
            ..TransportState::new(1024)
        }
    }

    #[test]
    fn peer_window_large_enough() {
        let conf = Config::new(Profile::Standard);

        // 90% of 1MB is above 704 segments.
        let s = sock(1 << 20, 0);
        assert_eq!(clamp_to_peer_window(&conf, &s, 704), 704);
    }

    #[test]
    fn peer_window_reduces_clamp() {
        let conf = Config::new(Profile::Standard);

        // (600KB + 100 segments) * 90% = 645120 bytes = 630 segments.
        let s = sock(600 * 1024, 100);
        assert_eq!(clamp_to_peer_window(&conf, &s, 704), 630);
    }

    #[test]
    fn peer_window_floor() {
        let conf = Config::new(Profile::Standard);

        // Tiny peer window, the clamp stops at init_cwnd.
        let s = sock(10 * 1024, 0);
        assert_eq!(clamp_to_peer_window(&conf, &s, 704), 512);

        // The floor applies even when it is above the current clamp.
        assert_eq!(clamp_to_peer_window(&conf, &s, 128), 512);

        // No peer window known at all.
        let s = sock(0, 0);
        assert_eq!(clamp_to_peer_window(&conf, &s, 704), 512);
    }

    #[test]
    fn peer_window_large_factor() {
        // An unvalidated share never overflows.
        let mut conf = Config::new(Profile::Standard);
        conf.set_safe_factor(u32::MAX);
        let s = TransportState {
            snd_wnd: u32::MAX,
            packets_out: 1,
            ..TransportState::new(1460)
        };
        assert_eq!(clamp_to_peer_window(&conf, &s, 704), 704);
    }

    #[test]
    fn quick_start_large_clamp() {
        let conf = Config::new(Profile::Standard);
        let s = TransportState {
            mss: u32::MAX,
            max_window: u32::MAX,
            cwnd_clamp: u32::MAX,
            ..TransportState::new(1460)
        };
        assert_eq!(quick_start(&conf, &s), QuickStart { cwnd: 10, exit: false });
    }

    #[test]
    fn quick_start_scenario() {
        let conf = Config::new(Profile::Standard);
        let s = TransportState {
            max_window: 2_000_000,
            cwnd_clamp: 704,
            ..TransportState::new(1024)
        };

        // 1953 - (1953 >> 3) = 1709 segments, capped by the 704 clamp. The
        // peer window is at least twice the clamp, so quick start ends.
        assert_eq!(quick_start(&conf, &s), QuickStart { cwnd: 704, exit: true });
    }

    #[test]
    fn quick_start_small_peer_window() {
        let conf = Config::new(Profile::Standard);
        let s = TransportState {
            max_window: 300 * 1024,
            cwnd_clamp: 704,
            ..TransportState::new(1024)
        };
        assert_eq!(
            quick_start(&conf, &s),
            QuickStart {
                cwnd: 300 - (300 >> 3),
                exit: false
            }
        );

        // Never below the stack's default initial window.
        let s = TransportState {
            max_window: 1024,
            cwnd_clamp: 704,
            ..TransportState::new(1024)
        };
        assert_eq!(quick_start(&conf, &s).cwnd, DEFAULT_INIT_CWND);
    }

    #[test]
    fn quick_start_clamp_floor() {
        let conf = Config::new(Profile::Standard);

        // The clamp used for sizing is raised to cwnd_lowbound, the exit
        // check keeps using the current clamp.
        let s = TransportState {
            max_window: 200 * 1024,
            cwnd_clamp: 64,
            ..TransportState::new(1024)
        };
        assert_eq!(
            quick_start(&conf, &s),
            QuickStart {
                cwnd: 128,
                exit: true
            }
        );
    }
}
