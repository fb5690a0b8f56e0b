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

//! WRC: Wireless RTT based Control.
//!
//! WRC bounds the congestion window by a ceiling that shrinks linearly as
//! the smoothed RTT grows from a low to a high marker, and by the share of
//! the peer's receive window the path can safely use. The window grows
//! toward that ceiling in three ways:
//!
//! * Quick start: while the peer's receive window has not opened up, the
//!   window jumps to the peer window minus a safety share.
//! * Slow start: one segment per acknowledged segment.
//! * Congestion avoidance: `ca_increase_step` segments per window of
//!   acknowledged segments. It is left again once the path stayed fast for
//!   `conservative_factor` smoothed RTTs.

#![allow(unused_variables)]

use std::cmp;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::*;

use super::lpf;
use super::rwin;
use super::CongestionController;
use super::CongestionStats;
use super::ReferenceGrowth;
use super::RenoGrowth;
use super::RttBoundary;
use crate::Config;
use crate::TransportState;
use crate::DEFAULT_INIT_CWND;
use crate::INFINITE_SSTHRESH;

const NAME: &str = "WRC";

/// WRC congestion control state of a connection.
#[derive(Clone, PartialEq)]
pub struct Wrc<G = RenoGrowth> {
    /// Configuration snapshot.
    config: Arc<Config>,

    /// Reference growth functions used outside legacy mode.
    growth: G,

    /// Ceiling cache in segments for a fast path.
    max_cwnd: u32,

    /// Ceiling cache in segments for a slow path.
    min_cwnd: u32,

    /// Window saved at the last slow start threshold computation.
    prev_cwnd: u32,

    /// Smoothed RTT in milliseconds.
    srtt: u32,

    /// First RTT sample in milliseconds, zero until one is seen.
    init_rtt: u32,

    /// Minimum RTT in milliseconds over the calibration samples.
    min_rtt: u32,

    /// RTT markers and slope.
    boundary: RttBoundary,

    /// Valid RTT samples seen.
    rtt_cnt: u64,

    /// Time the connection was initialized.
    start_time: Option<Instant>,

    /// Time congestion avoidance was entered, if it is being timed.
    enter_ca_time: Option<Instant>,

    /// Whether quick start is in effect.
    rwin_booster: bool,

    /// Congestion statistics.
    stats: CongestionStats,
}

impl Wrc<RenoGrowth> {
    pub fn new(config: Arc<Config>) -> Self {
        Self::with_growth(config, RenoGrowth)
    }
}

impl<G: ReferenceGrowth> Wrc<G> {
    /// Create a controller using the given reference growth functions.
    pub fn with_growth(config: Arc<Config>, growth: G) -> Self {
        let min_rtt = config.rtt_high_ceiling;
        let rwin_booster = config.rwin_booster_enabled;
        Self {
            config,
            growth,
            max_cwnd: 0,
            min_cwnd: 0,
            prev_cwnd: 0,
            srtt: 0,
            init_rtt: 0,
            min_rtt,
            boundary: RttBoundary::default(),
            rtt_cnt: 0,
            start_time: None,
            enter_ca_time: None,
            rwin_booster,
            stats: Default::default(),
        }
    }

    /// Hand the connection a newer configuration snapshot.
    pub fn set_config(&mut self, config: Arc<Config>) {
        self.config = config;
    }

    /// Configuration snapshot in use.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Smoothed RTT in milliseconds.
    pub fn smoothed_rtt(&self) -> u32 {
        self.srtt
    }

    /// Minimum RTT in milliseconds over the calibration samples.
    pub fn min_rtt(&self) -> u32 {
        self.min_rtt
    }

    /// First RTT sample in milliseconds.
    pub fn init_rtt(&self) -> u32 {
        self.init_rtt
    }

    /// RTT markers and slope.
    pub fn boundary(&self) -> RttBoundary {
        self.boundary
    }

    /// Whether quick start is in effect.
    pub fn rwin_booster_active(&self) -> bool {
        self.rwin_booster
    }

    /// Valid RTT samples seen.
    pub fn rtt_sample_count(&self) -> u64 {
        self.rtt_cnt
    }

    /// Time congestion avoidance was entered, if it is being timed.
    pub fn enter_ca_time(&self) -> Option<Instant> {
        self.enter_ca_time
    }

    /// Recompute the markers and slope from a new minimum RTT.
    fn calculate_boundary(&mut self, rtt_ms: u32) {
        self.boundary = RttBoundary::calculate(&self.config, rtt_ms);
        self.stats.min_rtt_updates += 1;

        debug!(
            "{} min_rtt={}ms low_marker={}ms high_marker={}ms slope={}",
            NAME,
            self.min_rtt,
            self.boundary.low_marker,
            self.boundary.high_marker,
            self.boundary.slope
        );
    }
}

/// Repair a zero window or zero ceiling, either of which would stall growth.
fn force_check_cwnd(conf: &Config, stats: &mut CongestionStats, sock: &mut TransportState) {
    if sock.cwnd == 0 {
        if conf.slow_start_check_log {
            error!(
                "{} zero cwnd, cwnd_clamp={} ssthresh={}",
                NAME, sock.cwnd_clamp, sock.ssthresh
            );
        }
        stats.window_repairs += 1;

        // A small positive ssthresh wins over init_cwnd.
        sock.cwnd = if sock.ssthresh > 0 && sock.ssthresh < conf.init_cwnd {
            sock.ssthresh
        } else {
            cmp::max(conf.init_cwnd, DEFAULT_INIT_CWND)
        };
    }

    if sock.cwnd_clamp == 0 {
        if conf.slow_start_check_log {
            error!(
                "{} zero cwnd_clamp, cwnd={} ssthresh={}",
                NAME, sock.cwnd, sock.ssthresh
            );
        }
        stats.window_repairs += 1;
        sock.cwnd_clamp = cmp::max(conf.cwnd_lower_bound(sock.mss()), 1);
    }
}

/// Exponential growth: one segment per acknowledged window worth of credit.
fn slow_start(sock: &mut TransportState) {
    if sock.cwnd == 0 {
        return;
    }

    sock.cwnd_cnt = sock.cwnd_cnt.saturating_add(sock.cwnd);
    while sock.cwnd_cnt >= sock.cwnd {
        if sock.cwnd >= sock.cwnd_clamp {
            sock.cwnd_cnt %= sock.cwnd;
            break;
        }
        sock.cwnd_cnt -= sock.cwnd;
        sock.cwnd += 1;
    }
}

/// Additive increase by `ca_increase_step` once `w` ticks have been
/// credited.
fn cong_avoid_ai(conf: &Config, sock: &mut TransportState, w: u32) {
    if sock.cwnd_cnt >= w {
        if sock.cwnd < sock.cwnd_clamp {
            sock.cwnd = cmp::min(
                sock.cwnd.saturating_add(conf.ca_increase_step),
                sock.cwnd_clamp,
            );
        }
        sock.cwnd_cnt = 0;
    } else {
        sock.cwnd_cnt += 1;
    }
}

impl<G: ReferenceGrowth> CongestionController for Wrc<G> {
    fn name(&self) -> &str {
        NAME
    }

    fn on_init(&mut self, now: Instant, sock: &mut TransportState) {
        let mss = sock.mss();
        self.max_cwnd = self.config.cwnd_upper_bound(mss);
        self.min_cwnd = self.config.cwnd_lower_bound(mss);

        sock.cwnd = self.config.init_cwnd;
        sock.cwnd_clamp = self.max_cwnd;
        sock.ssthresh = INFINITE_SSTHRESH;

        self.start_time = Some(now);
        self.srtt = 0;
        self.init_rtt = 0;
        // The first sample always becomes the minimum.
        self.min_rtt = self.config.rtt_high_ceiling;
        self.boundary = RttBoundary::default();
        self.rtt_cnt = 0;
        self.enter_ca_time = None;
        self.prev_cwnd = sock.cwnd_clamp;
        self.rwin_booster = self.config.rwin_booster_enabled;

        debug!(
            "{} initialized, mss={} cwnd_clamp={} cwnd={} rwin_booster={}",
            NAME, sock.mss, sock.cwnd_clamp, sock.cwnd, self.rwin_booster
        );
    }

    fn on_ack_sample(&mut self, now: Instant, rtt_us: i64, sock: &mut TransportState) {
        if rtt_us <= 0 {
            self.stats.invalid_rtt_samples += 1;
            trace!("{} invalid rtt sample {}us", NAME, rtt_us);
            return;
        }

        let rtt_ms = rtt_us / 1000;
        let rtt_ms_u32 = cmp::min(rtt_ms, u32::MAX as i64) as u32;
        let mut srtt_prev = self.srtt;

        self.rtt_cnt += 1;
        self.stats.rtt_samples += 1;

        if self.rtt_cnt <= self.config.min_rtt_sample_count {
            let mut new_min = false;
            if self.init_rtt == 0 {
                self.init_rtt = rtt_ms_u32;
                self.srtt = rtt_ms_u32;
                self.min_rtt = rtt_ms_u32;
                srtt_prev = rtt_ms_u32;
                new_min = true;
            } else if rtt_ms_u32 < self.min_rtt {
                self.min_rtt = rtt_ms_u32;
                new_min = true;
            }

            if new_min {
                self.calculate_boundary(rtt_ms_u32);
            }
        }

        let srtt = lpf::lpf_srtt(&self.config, rtt_ms, srtt_prev, &self.boundary);
        self.srtt = if srtt > 0 { srtt } else { rtt_ms_u32 };

        let bound = self.boundary.window_bound(&self.config, self.srtt, sock.mss());
        sock.cwnd_clamp = rwin::clamp_to_peer_window(&self.config, sock, bound);

        trace!(
            "{} rtt={}ms srtt={}ms bound={} cwnd_clamp={} snd_wnd={} packets_out={}",
            NAME,
            rtt_ms,
            self.srtt,
            bound,
            sock.cwnd_clamp,
            sock.snd_wnd,
            sock.packets_out
        );
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

        let conf = &*self.config;
        let srtt = self.srtt as u64;
        let dwell_ms = self.enter_ca_time.map_or(0, |t| {
            now.saturating_duration_since(t).as_millis() as u64
        });

        // Exit check from congestion avoidance.
        if sock.cwnd >= sock.ssthresh && sock.ssthresh_is_finite() {
            if srtt < conf.ca_exit_threshold as u64
                && dwell_ms > srtt * conf.conservative_factor as u64
            {
                sock.ssthresh = INFINITE_SSTHRESH;
                self.enter_ca_time = None;
                self.stats.ca_exits += 1;

                debug!(
                    "{} exit congestion avoidance, srtt={}ms dwell={}ms cwnd={}",
                    NAME, srtt, dwell_ms, sock.cwnd
                );
            }
        }

        if sock.cwnd < sock.ssthresh {
            force_check_cwnd(conf, &mut self.stats, sock);

            if self.rwin_booster {
                let qs = rwin::quick_start(conf, sock);
                sock.cwnd = qs.cwnd;
                sock.cwnd_cnt = 0;
                self.stats.quick_start_rounds += 1;

                if qs.exit {
                    // The peer window opened up, quick start is not needed.
                    self.rwin_booster = false;
                    debug!(
                        "{} leave quick start, max_window={} cwnd_clamp={} cwnd={}",
                        NAME, sock.max_window, sock.cwnd_clamp, sock.cwnd
                    );
                }
            } else if conf.legacy_mode {
                slow_start(sock);
            } else {
                self.growth.slow_start(sock, in_flight);
            }
        } else {
            if self.enter_ca_time.is_none() {
                self.enter_ca_time = Some(now);
            }

            let w = sock.cwnd;
            if conf.legacy_mode {
                cong_avoid_ai(conf, sock, w);
            } else {
                self.growth.cong_avoid_ai(sock, w, in_flight);
            }
        }

        trace!(
            "{} cwnd={} cwnd_cnt={} cwnd_clamp={} ssthresh={} in_flight={}",
            NAME,
            sock.cwnd,
            sock.cwnd_cnt,
            sock.cwnd_clamp,
            sock.ssthresh,
            in_flight
        );
    }

    fn on_congestion_detected(&mut self, sock: &TransportState) -> u32 {
        let ssthresh = (sock.cwnd as u64 * 2 / 3) as u32;
        self.prev_cwnd = sock.cwnd;
        self.stats.ssthresh_computations += 1;

        cmp::max(ssthresh, self.config.init_cwnd)
    }

    fn on_loss(&mut self, now: Instant, sock: &mut TransportState) {
        debug!("{} loss event, cwnd={}", NAME, sock.cwnd);
        self.stats.loss_events += 1;

        sock.ssthresh = INFINITE_SSTHRESH;
        sock.cwnd = self.config.init_cwnd;
    }

    fn on_recovery_complete(&mut self, now: Instant, sock: &mut TransportState) {
        self.stats.recovery_events += 1;

        if sock.ssthresh_is_finite() {
            sock.cwnd = sock.ssthresh;

            if self.srtt > self.config.ca_enter_threshold {
                debug!(
                    "{} srtt {}ms is too large, stay in congestion avoidance",
                    NAME, self.srtt
                );
            } else {
                sock.ssthresh = INFINITE_SSTHRESH;
                debug!("{} srtt {}ms, enter slow start", NAME, self.srtt);
            }
        }

        debug!("{} recovery complete, cwnd={}", NAME, sock.cwnd);
    }

    fn undo_window(&self, sock: &TransportState) -> u32 {
        cmp::max(sock.cwnd, self.prev_cwnd)
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}

impl<G> fmt::Debug for Wrc<G> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ", NAME)?;
        if let Some(start_time) = self.start_time {
            write!(
                f,
                "elapsed={}ms ",
                start_time.elapsed().as_millis()
            )?;
        }
        write!(f, "srtt={}ms ", self.srtt)?;
        write!(f, "min_rtt={}ms ", self.min_rtt)?;
        write!(f, "init_rtt={}ms ", self.init_rtt)?;
        write!(f, "rtt_high_marker={}ms ", self.boundary.high_marker)?;
        write!(f, "rtt_low_marker={}ms ", self.boundary.low_marker)?;
        write!(f, "cwnd_slope={} ", self.boundary.slope)?;
        write!(f, "max_cwnd={} ", self.max_cwnd)?;
        write!(f, "min_cwnd={} ", self.min_cwnd)?;
        write!(f, "prev_cwnd={} ", self.prev_cwnd)?;
        write!(f, "rtt_cnt={} ", self.rtt_cnt)?;
        write!(f, "rwin_booster={}", self.rwin_booster)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CongestionEvent;
    use crate::Profile;
    use std::cell::Cell;
    use std::time::Duration;

    /// Standard profile, legacy growth, quick start off.
    fn legacy_config() -> Config {
        let mut conf = Config::new(Profile::Standard);
        conf.enable_rwin_booster(false);
        conf
    }

    /// A connection with mss 1024 and a peer window that never limits the
    /// ceiling.
    fn setup(conf: Config) -> (Wrc, TransportState, Instant) {
        let now = Instant::now();
        let mut wrc = Wrc::new(Arc::new(conf));
        let mut sock = TransportState::new(1024);
        sock.snd_wnd = 16 << 20;
        sock.max_window = 16 << 20;
        wrc.on_init(now, &mut sock);
        (wrc, sock, now)
    }

    #[test]
    fn wrc_init() {
        let (wrc, sock, _) = setup(Config::new(Profile::Standard));

        assert_eq!(wrc.name(), "WRC");
        assert_eq!(sock.cwnd, 512);
        assert_eq!(sock.cwnd_clamp, 704);
        assert_eq!(sock.ssthresh, INFINITE_SSTHRESH);
        assert_eq!(wrc.max_cwnd, 704);
        assert_eq!(wrc.min_cwnd, 128);
        assert_eq!(wrc.prev_cwnd, 704);
        assert_eq!(wrc.init_rtt(), 0);
        assert_eq!(wrc.min_rtt(), 900);
        assert_eq!(wrc.rtt_sample_count(), 0);
        assert_eq!(wrc.enter_ca_time(), None);
        assert!(wrc.rwin_booster_active());
        assert!(wrc.in_slow_start(&sock));

        let (wrc, _, _) = setup(legacy_config());
        assert!(!wrc.rwin_booster_active());
    }

    #[test]
    fn wrc_first_sample() {
        let (mut wrc, mut sock, now) = setup(Config::new(Profile::Standard));

        wrc.on_ack_sample(now, 50_000, &mut sock);
        assert_eq!(wrc.init_rtt(), 50);
        assert_eq!(wrc.min_rtt(), 50);
        assert_eq!(wrc.smoothed_rtt(), 50);
        assert_eq!(
            wrc.boundary(),
            RttBoundary {
                low_marker: 50,
                high_marker: 300,
                slope: -2359,
            }
        );
        assert_eq!(sock.cwnd_clamp, 704);
        assert_eq!(wrc.stats().rtt_samples, 1);
        assert_eq!(wrc.stats().min_rtt_updates, 1);
    }

    #[test]
    fn wrc_smoother_fallback_to_raw_sample() {
        let mut conf = Config::new(Profile::Standard);
        conf.set_min_rtt_sample_count(0);
        let (mut wrc, mut sock, now) = setup(conf);

        // No calibration, the filter output rounds to zero and the raw
        // sample is used instead.
        wrc.on_ack_sample(now, 5_000, &mut sock);
        assert_eq!(wrc.smoothed_rtt(), 5);
        assert_eq!(wrc.init_rtt(), 0);
        assert_eq!(wrc.boundary(), RttBoundary::default());
        assert_eq!(sock.cwnd_clamp, 128);
        assert_eq!(wrc.stats().min_rtt_updates, 0);
    }

    #[test]
    fn wrc_sub_millisecond_first_sample() {
        let (mut wrc, mut sock, now) = setup(Config::new(Profile::Standard));

        // A 500us sample truncates to 0ms and leaves init_rtt unset.
        wrc.on_ack_sample(now, 500, &mut sock);
        assert_eq!(wrc.init_rtt(), 0);
        assert_eq!(wrc.smoothed_rtt(), 0);
        assert_eq!(wrc.min_rtt(), 0);
        assert_eq!(wrc.boundary().low_marker, 30);
        assert_eq!(wrc.boundary().high_marker, 300);
        assert_eq!(sock.cwnd_clamp, 704);

        // The next sample is treated as the first one again.
        wrc.on_ack_sample(now, 80_000, &mut sock);
        assert_eq!(wrc.init_rtt(), 80);
        assert_eq!(wrc.min_rtt(), 80);
        assert_eq!(wrc.smoothed_rtt(), 80);
        assert_eq!(
            wrc.boundary(),
            RttBoundary {
                low_marker: 80,
                high_marker: 320,
                slope: (131072 - 720896) / 240,
            }
        );
        assert_eq!(sock.cwnd_clamp, 704);
        assert_eq!(wrc.rtt_sample_count(), 2);
        assert_eq!(wrc.stats().min_rtt_updates, 2);
    }

    #[test]
    fn wrc_min_rtt_calibration() {
        let mut conf = Config::new(Profile::Standard);
        conf.set_min_rtt_sample_count(3);
        let (mut wrc, mut sock, now) = setup(conf);

        wrc.on_ack_sample(now, 80_000, &mut sock);
        assert_eq!(wrc.boundary().low_marker, 80);

        // A larger sample keeps the markers.
        wrc.on_ack_sample(now, 90_000, &mut sock);
        assert_eq!(wrc.min_rtt(), 80);
        assert_eq!(wrc.boundary().low_marker, 80);

        // A smaller sample inside the calibration window moves them.
        wrc.on_ack_sample(now, 60_000, &mut sock);
        assert_eq!(wrc.min_rtt(), 60);
        assert_eq!(wrc.boundary().low_marker, 60);
        assert_eq!(wrc.boundary().high_marker, 300);
        assert_eq!(wrc.boundary().slope, (131072 - 720896) / 240);
        assert_eq!(wrc.init_rtt(), 80);

        // Calibration is over.
        wrc.on_ack_sample(now, 35_000, &mut sock);
        assert_eq!(wrc.min_rtt(), 60);
        assert_eq!(wrc.boundary().low_marker, 60);
        assert_eq!(wrc.rtt_sample_count(), 4);
        assert_eq!(wrc.stats().min_rtt_updates, 2);
    }

    #[test]
    fn wrc_invalid_sample_ignored() {
        let (mut wrc, mut sock, now) = setup(Config::new(Profile::Standard));
        wrc.on_ack_sample(now, 50_000, &mut sock);

        let (wrc_before, sock_before) = (wrc.clone(), sock);
        wrc.on_ack_sample(now, 0, &mut sock);
        wrc.on_ack_sample(now, -20_000, &mut sock);

        assert_eq!(sock, sock_before);
        assert_eq!(wrc.rtt_sample_count(), wrc_before.rtt_sample_count());
        assert_eq!(wrc.smoothed_rtt(), wrc_before.smoothed_rtt());
        assert_eq!(wrc.stats().invalid_rtt_samples, 2);
    }

    #[test]
    fn wrc_ceiling_follows_srtt() {
        let (mut wrc, mut sock, now) = setup(Config::new(Profile::Standard));
        wrc.on_ack_sample(now, 50_000, &mut sock);
        assert_eq!(sock.cwnd_clamp, 704);

        // The ceiling shrinks while the path slows down.
        let mut last = sock.cwnd_clamp;
        for _ in 0..100 {
            wrc.on_ack_sample(now, 400_000, &mut sock);
            assert!(sock.cwnd_clamp <= last);
            last = sock.cwnd_clamp;
        }
        assert!(wrc.smoothed_rtt() >= 300);
        assert_eq!(sock.cwnd_clamp, 128);

        // And grows back once it recovers.
        for _ in 0..400 {
            wrc.on_ack_sample(now, 40_000, &mut sock);
        }
        assert!(wrc.smoothed_rtt() <= 50);
        assert_eq!(sock.cwnd_clamp, 704);
    }

    #[test]
    fn wrc_ceiling_clamped_by_peer_window() {
        let mut conf = Config::new(Profile::Standard);
        conf.set_init_cwnd(64);
        let (mut wrc, mut sock, now) = setup(conf);
        sock.snd_wnd = 400 * 1024;
        sock.packets_out = 100;

        // (400 + 100) segments * 90% = 450 segments.
        wrc.on_ack_sample(now, 50_000, &mut sock);
        assert_eq!(sock.cwnd_clamp, 450);

        // Never below init_cwnd.
        sock.snd_wnd = 10 * 1024;
        sock.packets_out = 0;
        wrc.on_ack_sample(now, 50_000, &mut sock);
        assert_eq!(sock.cwnd_clamp, 64);
    }

    #[test]
    fn wrc_growth_tick_not_window_limited() {
        let (mut wrc, mut sock, now) = setup(Config::new(Profile::Standard));
        wrc.on_ack_sample(now, 50_000, &mut sock);
        sock.cwnd = 600;
        sock.ssthresh = 500;

        let (wrc_before, sock_before) = (wrc.clone(), sock);
        for i in 0..100 {
            wrc.on_growth_tick(now + Duration::from_secs(i), false, 600, &mut sock);
        }
        assert!(wrc == wrc_before);
        assert_eq!(sock, sock_before);
    }

    #[test]
    fn wrc_quick_start() {
        let (mut wrc, mut sock, now) = setup(Config::new(Profile::Standard));
        sock.max_window = 2_000_000;
        sock.cwnd_cnt = 7;
        assert_eq!(sock.cwnd_clamp, 704);
        assert!(wrc.rwin_booster_active());

        wrc.on_growth_tick(now, true, 512, &mut sock);
        assert_eq!(sock.cwnd, 704);
        assert_eq!(sock.cwnd_cnt, 0);
        assert!(!wrc.rwin_booster_active());
        assert_eq!(wrc.stats().quick_start_rounds, 1);
    }

    #[test]
    fn wrc_quick_start_until_peer_window_opens() {
        let (mut wrc, mut sock, now) = setup(Config::new(Profile::Standard));
        sock.max_window = 256 * 1024;

        // 256 - 32 segments, and the booster stays on.
        wrc.on_growth_tick(now, true, 512, &mut sock);
        assert_eq!(sock.cwnd, 224);
        assert!(wrc.rwin_booster_active());

        sock.max_window = 1024 * 1024;
        wrc.on_growth_tick(now, true, 224, &mut sock);
        assert_eq!(sock.cwnd, 704);
        assert!(wrc.rwin_booster_active());

        sock.max_window = 2 * 704 * 1024;
        wrc.on_growth_tick(now, true, 704, &mut sock);
        assert!(!wrc.rwin_booster_active());

        // Legacy slow start from now on.
        wrc.on_growth_tick(now, true, 704, &mut sock);
        assert_eq!(sock.cwnd, 704);
    }

    #[test]
    fn wrc_legacy_slow_start() {
        let (mut wrc, mut sock, now) = setup(legacy_config());
        sock.cwnd = 10;

        for _ in 0..5 {
            wrc.on_growth_tick(now, true, 10, &mut sock);
        }
        assert_eq!(sock.cwnd, 15);

        // Never beyond the ceiling.
        sock.cwnd_clamp = 17;
        for _ in 0..10 {
            wrc.on_growth_tick(now, true, 10, &mut sock);
        }
        assert_eq!(sock.cwnd, 17);
        assert!(sock.cwnd_cnt < sock.cwnd);
    }

    #[test]
    fn wrc_legacy_congestion_avoidance() {
        let (mut wrc, mut sock, now) = setup(legacy_config());
        sock.cwnd = 600;
        sock.ssthresh = 500;
        assert_eq!(sock.cwnd_clamp, 704);

        let mut ticks = 0;
        while sock.cwnd == 600 {
            wrc.on_growth_tick(now, true, 600, &mut sock);
            ticks += 1;
        }
        assert_eq!(ticks, 601);
        assert_eq!(sock.cwnd, 610);
        assert_eq!(sock.cwnd_cnt, 0);
        assert_eq!(wrc.enter_ca_time(), Some(now));

        // The batch increase stops at the ceiling.
        sock.cwnd = 700;
        sock.cwnd_cnt = 700;
        wrc.on_growth_tick(now, true, 700, &mut sock);
        assert_eq!(sock.cwnd, 704);
    }

    #[test]
    fn wrc_exit_congestion_avoidance() {
        let (mut wrc, mut sock, now) = setup(legacy_config());
        wrc.on_ack_sample(now, 50_000, &mut sock);
        sock.cwnd = 600;
        sock.ssthresh = 500;

        // Entering congestion avoidance starts the dwell timer.
        wrc.on_growth_tick(now, true, 600, &mut sock);
        assert_eq!(wrc.enter_ca_time(), Some(now));

        // Not long enough: 10 * 50ms.
        wrc.on_growth_tick(now + Duration::from_millis(500), true, 600, &mut sock);
        assert_eq!(sock.ssthresh, 500);

        // Long enough, back to slow start within the same tick.
        wrc.on_growth_tick(now + Duration::from_millis(501), true, 600, &mut sock);
        assert_eq!(sock.ssthresh, INFINITE_SSTHRESH);
        assert_eq!(wrc.enter_ca_time(), None);
        assert_eq!(sock.cwnd, 601);
        assert_eq!(wrc.stats().ca_exits, 1);
    }

    #[test]
    fn wrc_exit_clears_entry_timestamp() {
        let (mut wrc, mut sock, now) = setup(legacy_config());
        wrc.on_ack_sample(now, 50_000, &mut sock);
        sock.cwnd = 600;
        sock.ssthresh = 500;

        wrc.on_growth_tick(now, true, 600, &mut sock);
        let exit_at = now + Duration::from_secs(1);
        wrc.on_growth_tick(exit_at, true, 600, &mut sock);
        assert_eq!(wrc.enter_ca_time(), None);

        // The next stay in congestion avoidance is timed from its own entry,
        // not from the first one.
        sock.ssthresh = 550;
        let reenter_at = exit_at + Duration::from_millis(10);
        wrc.on_growth_tick(reenter_at, true, 601, &mut sock);
        assert_eq!(wrc.enter_ca_time(), Some(reenter_at));

        wrc.on_growth_tick(reenter_at + Duration::from_millis(100), true, 601, &mut sock);
        assert_eq!(sock.ssthresh, 550);
    }

    #[test]
    fn wrc_slow_path_stays_in_congestion_avoidance() {
        let mut conf = legacy_config();
        conf.set_ca_thresholds(1500, 40);
        let (mut wrc, mut sock, now) = setup(conf);
        wrc.on_ack_sample(now, 50_000, &mut sock);
        sock.cwnd = 600;
        sock.ssthresh = 500;

        wrc.on_growth_tick(now, true, 600, &mut sock);
        wrc.on_growth_tick(now + Duration::from_secs(60), true, 600, &mut sock);
        assert_eq!(sock.ssthresh, 500);
        assert_eq!(wrc.stats().ca_exits, 0);
    }

    #[test]
    fn wrc_zero_window_repair() {
        let (mut wrc, mut sock, now) = setup(legacy_config());

        // No usable ssthresh, back to init_cwnd and grow from there.
        sock.cwnd = 0;
        wrc.on_growth_tick(now, true, 0, &mut sock);
        assert_eq!(sock.cwnd, 513);

        // A small ssthresh is preferred.
        sock.cwnd = 0;
        sock.cwnd_cnt = 0;
        sock.ssthresh = 100;
        wrc.on_growth_tick(now, true, 0, &mut sock);
        assert_eq!(sock.cwnd, 101);

        // A zero ceiling falls back to cwnd_lowbound.
        sock.cwnd = 50;
        sock.cwnd_clamp = 0;
        wrc.on_growth_tick(now, true, 50, &mut sock);
        assert_eq!(sock.cwnd_clamp, 128);
        assert_eq!(wrc.stats().window_repairs, 3);
    }

    #[test]
    fn wrc_zero_window_repair_in_quick_start() {
        let (mut wrc, mut sock, now) = setup(Config::new(Profile::Standard));
        sock.cwnd = 0;
        sock.cwnd_clamp = 0;
        sock.max_window = 64 * 1024;

        wrc.on_growth_tick(now, true, 0, &mut sock);
        assert!(sock.cwnd > 0);
        assert_eq!(sock.cwnd_clamp, 128);
        assert_eq!(sock.cwnd, 56);
    }

    /// Reference growth that counts its calls.
    #[derive(Default)]
    struct CountingGrowth {
        slow_start: Cell<u32>,
        cong_avoid: Cell<u32>,
    }

    impl ReferenceGrowth for CountingGrowth {
        fn slow_start(&self, sock: &mut TransportState, acked: u32) -> u32 {
            self.slow_start.set(self.slow_start.get() + 1);
            RenoGrowth.slow_start(sock, acked)
        }

        fn cong_avoid_ai(&self, sock: &mut TransportState, w: u32, acked: u32) {
            self.cong_avoid.set(self.cong_avoid.get() + 1);
            RenoGrowth.cong_avoid_ai(sock, w, acked)
        }
    }

    #[test]
    fn wrc_reference_growth() {
        let mut conf = legacy_config();
        conf.enable_legacy_mode(false);
        let now = Instant::now();
        let mut wrc = Wrc::with_growth(Arc::new(conf), CountingGrowth::default());
        let mut sock = TransportState::new(1024);
        sock.snd_wnd = 16 << 20;
        wrc.on_init(now, &mut sock);

        // Slow start grows by the in flight count, up to ssthresh.
        sock.cwnd = 10;
        sock.ssthresh = 40;
        wrc.on_growth_tick(now, true, 20, &mut sock);
        assert_eq!(sock.cwnd, 30);
        wrc.on_growth_tick(now, true, 20, &mut sock);
        assert_eq!(sock.cwnd, 40);
        assert_eq!(wrc.growth.slow_start.get(), 2);

        // Congestion avoidance adds one segment per window of credit.
        wrc.on_growth_tick(now, true, 40, &mut sock);
        assert_eq!(sock.cwnd, 41);
        assert_eq!(wrc.growth.cong_avoid.get(), 1);
        assert_eq!(wrc.enter_ca_time(), Some(now));
    }

    #[test]
    fn wrc_congestion_detected() {
        let (mut wrc, mut sock, _) = setup(legacy_config());

        sock.cwnd = 900;
        assert_eq!(wrc.on_congestion_detected(&sock), 600);
        assert_eq!(wrc.prev_cwnd, 900);

        // Never below init_cwnd.
        sock.cwnd = 600;
        assert_eq!(wrc.on_congestion_detected(&sock), 512);
        assert_eq!(wrc.prev_cwnd, 600);

        sock.cwnd = u32::MAX;
        assert_eq!(wrc.on_congestion_detected(&sock), u32::MAX / 3 * 2);
        assert_eq!(wrc.stats().ssthresh_computations, 3);
    }

    #[test]
    fn wrc_loss_restarts_slow_start() {
        let (mut wrc, mut sock, now) = setup(legacy_config());
        sock.cwnd = 650;
        sock.ssthresh = 500;

        wrc.on_loss(now, &mut sock);
        assert_eq!(sock.ssthresh, INFINITE_SSTHRESH);
        assert_eq!(sock.cwnd, 512);

        wrc.on_growth_tick(now, true, 512, &mut sock);
        assert!(wrc.in_slow_start(&sock));
        assert_eq!(sock.cwnd, 513);
        assert_eq!(wrc.stats().loss_events, 1);
    }

    #[test]
    fn wrc_loss_keeps_entry_timestamp() {
        let (mut wrc, mut sock, now) = setup(legacy_config());
        wrc.on_ack_sample(now, 50_000, &mut sock);
        sock.cwnd = 600;
        sock.ssthresh = 500;

        wrc.on_growth_tick(now, true, 600, &mut sock);
        assert_eq!(wrc.enter_ca_time(), Some(now));

        wrc.on_loss(now + Duration::from_millis(100), &mut sock);
        assert_eq!(sock.ssthresh, INFINITE_SSTHRESH);
        assert_eq!(wrc.enter_ca_time(), Some(now));

        // Back in congestion avoidance, the dwell still counts from the
        // first entry and the exit is immediate.
        sock.cwnd = 600;
        sock.ssthresh = 500;
        wrc.on_growth_tick(now + Duration::from_secs(1), true, 600, &mut sock);
        assert_eq!(sock.ssthresh, INFINITE_SSTHRESH);
        assert_eq!(wrc.enter_ca_time(), None);
        assert_eq!(wrc.stats().ca_exits, 1);
    }

    #[test]
    fn wrc_recovery_complete() {
        // Fast path: back to slow start at the threshold.
        let (mut wrc, mut sock, now) = setup(legacy_config());
        wrc.on_ack_sample(now, 50_000, &mut sock);
        sock.cwnd = 300;
        sock.ssthresh = 600;
        wrc.on_recovery_complete(now, &mut sock);
        assert_eq!(sock.cwnd, 600);
        assert_eq!(sock.ssthresh, INFINITE_SSTHRESH);

        // Slow path: stay in congestion avoidance.
        let mut conf = legacy_config();
        conf.set_ca_thresholds(40, 2000);
        let (mut wrc, mut sock, now) = setup(conf);
        wrc.on_ack_sample(now, 50_000, &mut sock);
        sock.cwnd = 300;
        sock.ssthresh = 600;
        wrc.on_recovery_complete(now, &mut sock);
        assert_eq!(sock.cwnd, 600);
        assert_eq!(sock.ssthresh, 600);

        // No threshold set, nothing to do.
        sock.cwnd = 300;
        sock.ssthresh = INFINITE_SSTHRESH;
        wrc.on_recovery_complete(now, &mut sock);
        assert_eq!(sock.cwnd, 300);
        assert_eq!(wrc.stats().recovery_events, 2);
    }

    #[test]
    fn wrc_events() {
        let (mut wrc, mut sock, now) = setup(legacy_config());
        wrc.on_ack_sample(now, 50_000, &mut sock);

        sock.cwnd = 900;
        sock.ssthresh = wrc.on_congestion_detected(&sock);
        sock.cwnd = 300;
        wrc.on_event(now, CongestionEvent::CompleteCwr, &mut sock);
        assert_eq!(sock.cwnd, 600);
        assert_eq!(sock.ssthresh, INFINITE_SSTHRESH);

        wrc.on_event(now, CongestionEvent::Loss, &mut sock);
        assert_eq!(sock.cwnd, 512);

        let before = sock;
        wrc.on_event(now, CongestionEvent::TxStart, &mut sock);
        wrc.on_event(now, CongestionEvent::EcnIsCe, &mut sock);
        assert_eq!(sock, before);
        assert_eq!(wrc.stats().loss_events, 1);
        assert_eq!(wrc.stats().recovery_events, 1);
    }

    #[test]
    fn wrc_undo_window() {
        let (mut wrc, mut sock, _) = setup(legacy_config());

        sock.cwnd = 900;
        sock.ssthresh = wrc.on_congestion_detected(&sock);
        sock.cwnd = 600;
        assert_eq!(wrc.undo_window(&sock), 900);

        sock.cwnd = 1000;
        assert_eq!(wrc.undo_window(&sock), 1000);
    }

    #[test]
    fn wrc_config_snapshot() {
        let (mut wrc, mut sock, now) = setup(legacy_config());

        let mut conf = legacy_config();
        conf.set_init_cwnd(100);
        wrc.set_config(Arc::new(conf));
        assert_eq!(wrc.config().init_cwnd(), 100);

        wrc.on_loss(now, &mut sock);
        assert_eq!(sock.cwnd, 100);
    }

    #[test]
    fn wrc_debug() {
        let (mut wrc, mut sock, now) = setup(Config::new(Profile::Standard));
        wrc.on_ack_sample(now, 50_000, &mut sock);

        let dump = format!("{:?}", wrc);
        assert!(dump.starts_with("WRC elapsed="));
        assert!(dump.contains("srtt=50ms"));
        assert!(dump.contains("rtt_high_marker=300ms"));
        assert!(dump.contains("cwnd_slope=-2359"));
        assert!(dump.ends_with("rwin_booster=true"));
    }
}
