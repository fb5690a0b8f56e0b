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

//! WRC (Wireless RTT based Control) is a congestion window controller for
//! reliable transports running over long-delay links such as satellite and
//! cellular paths, where round-trip time is a better congestion signal than
//! packet loss.
//!
//! ## How it works
//!
//! * Two RTT markers are calibrated per connection from the smallest of the
//!   first few RTT samples. Below the low marker the window ceiling stays at
//!   `cwnd_highbound`; above the high marker it stays at `cwnd_lowbound`; in
//!   between it is interpolated linearly.
//! * Raw RTT samples are smoothed by an EWMA filter whose weight depends on
//!   where the previous estimate sits relative to the markers.
//! * The ceiling is further reduced to what the peer's receive window can
//!   absorb.
//! * The window grows toward the ceiling through slow start, an optional
//!   quick start that jumps straight to the peer's receive window, and a
//!   batched additive increase in congestion avoidance.
//!
//! ## Get started
//!
//! The transport stack owns a [`TransportState`] per connection and calls
//! into a [`CongestionController`]:
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Instant;
//!
//! let conf = Arc::new(wrc::Config::new(wrc::Profile::Standard));
//! let mut cc = wrc::build_congestion_controller(&conf);
//! let mut sock = wrc::TransportState::new(1024);
//! let now = Instant::now();
//!
//! cc.on_init(now, &mut sock);
//! cc.on_ack_sample(now, 50_000, &mut sock);
//! cc.on_growth_tick(now, true, sock.cwnd, &mut sock);
//! assert!(sock.cwnd <= sock.cwnd_clamp);
//! ```
//!
//! ## Feature flags
//!
//! * `ffi`: Build and expose the FFI API.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;

use serde::Deserialize;
use serde::Serialize;
use strum_macros::EnumIter;

/// Revision of the WRC algorithm implemented by this crate.
pub const VERSION: &str = "2.3.1";

/// Slow start threshold value meaning "no threshold set".
pub const INFINITE_SSTHRESH: u32 = 0x7fff_ffff;

/// Default initial window of the transport stack in segments.
pub const DEFAULT_INIT_CWND: u32 = 10;

/// Segment size assumed when none is known yet.
pub const DEFAULT_MSS: u32 = 1460;

/// Result type for wrc operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Deployment profile selecting a default set of tunables.
#[repr(C)]
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Profile for high bandwidth paths behind an AQM, with RTT markers in
    /// the seconds range.
    #[default]
    HighBandwidth,

    /// Profile for ordinary long-delay paths, with RTT markers in the
    /// hundreds of milliseconds.
    Standard,
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(name: &str) -> Result<Profile> {
        if name.eq_ignore_ascii_case("high_bandwidth")
            || name.eq_ignore_ascii_case("high-bandwidth")
            || name.eq_ignore_ascii_case("aqm")
        {
            Ok(Profile::HighBandwidth)
        } else if name.eq_ignore_ascii_case("standard") {
            Ok(Profile::Standard)
        } else {
            Err(Error::InvalidConfig(format!("unknown profile {}", name)))
        }
    }
}

/// Tunable parameters shared by every connection.
///
/// A configuration is built once, wrapped in an `Arc` and handed to each
/// connection's controller. Controllers never mutate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Profile the defaults were taken from.
    pub(crate) profile: Profile,

    /// The congestion control algorithm used for a connection.
    pub(crate) congestion_control_algorithm: CongestionControlAlgorithm,

    /// Upper bound of the window ceiling in bytes.
    pub(crate) cwnd_highbound: u32,

    /// Ceiling in bytes once the smoothed RTT reaches the high marker.
    pub(crate) cwnd_lowbound: u32,

    /// Range of the low RTT marker in milliseconds.
    pub(crate) rtt_low_floor: u32,
    pub(crate) rtt_low_ceiling: u32,

    /// Range of the high RTT marker in milliseconds.
    pub(crate) rtt_high_floor: u32,
    pub(crate) rtt_high_ceiling: u32,

    /// RTT in milliseconds above which a sample is treated as an outlier.
    pub(crate) lpf_rtt_threshold: u32,

    /// EWMA weights, in parts of `ewma_max_weight`.
    pub(crate) ewma_weight: u32,
    pub(crate) ewma_light_weight: u32,
    pub(crate) ewma_heavy_weight: u32,
    pub(crate) ewma_max_weight: u32,

    /// Initial window in segments, also the floor of the ceiling and of
    /// the slow start threshold.
    pub(crate) init_cwnd: u32,

    /// Share of the estimated peer receive window usable as ceiling, in
    /// percent.
    pub(crate) safe_factor: u32,

    /// The high marker is `min_rtt * rtt_high_factor` before clamping.
    pub(crate) rtt_high_factor: u32,

    /// Number of leading RTT samples used to calibrate the markers.
    pub(crate) min_rtt_sample_count: u64,

    /// Congestion avoidance is left once it lasted longer than
    /// `srtt * conservative_factor`.
    pub(crate) conservative_factor: u32,

    /// Smoothed RTT in milliseconds above which a connection stays in
    /// congestion avoidance after recovery.
    pub(crate) ca_enter_threshold: u32,

    /// Smoothed RTT in milliseconds below which congestion avoidance may be
    /// left.
    pub(crate) ca_exit_threshold: u32,

    /// Window increase per round in congestion avoidance, legacy mode only.
    pub(crate) ca_increase_step: u32,

    /// Use the built-in growth functions instead of the stack's reference
    /// ones.
    pub(crate) legacy_mode: bool,

    /// Start connections in quick start.
    pub(crate) rwin_booster_enabled: bool,

    /// Quick start gives up `1 / 2^shift` of the peer window.
    pub(crate) rwin_booster_safe_shift: u32,

    /// Log repaired zero windows at error level.
    pub(crate) slow_start_check_log: bool,
}

impl Config {
    /// Create the configuration of the given profile.
    ///
    /// The configuration may be customized by calling related set methods.
    ///
    /// ## Examples:
    ///
    /// ```
    /// let mut conf = wrc::Config::new(wrc::Profile::Standard);
    /// conf.set_init_cwnd(256);
    /// conf.enable_rwin_booster(false);
    /// conf.validate()?;
    /// # Ok::<(), wrc::Error>(())
    /// ```
    pub fn new(profile: Profile) -> Self {
        let (highbound, lowbound, low, high, lpf) = match profile {
            Profile::HighBandwidth => (14680064, 1048576, (550, 650), (1500, 2500), 3000),
            Profile::Standard => (720896, 131072, (30, 100), (300, 900), 500),
        };

        Self {
            profile,
            congestion_control_algorithm: CongestionControlAlgorithm::Wrc,
            cwnd_highbound: highbound,
            cwnd_lowbound: lowbound,
            rtt_low_floor: low.0,
            rtt_low_ceiling: low.1,
            rtt_high_floor: high.0,
            rtt_high_ceiling: high.1,
            lpf_rtt_threshold: lpf,
            ewma_weight: 3,
            ewma_light_weight: 1,
            ewma_heavy_weight: 12,
            ewma_max_weight: 100,
            init_cwnd: 512,
            safe_factor: 90,
            rtt_high_factor: 4,
            min_rtt_sample_count: 10,
            conservative_factor: 10,
            ca_enter_threshold: 1500,
            ca_exit_threshold: 2000,
            ca_increase_step: 10,
            legacy_mode: true,
            rwin_booster_enabled: true,
            rwin_booster_safe_shift: 3,
            slow_start_check_log: true,
        }
    }

    /// Load a configuration from a JSON document.
    ///
    /// The document selects a `profile` and overrides any of its tunables.
    /// Absent fields keep the profile defaults.
    ///
    /// ```
    /// let conf = wrc::Config::from_json(r#"{"profile": "standard", "init_cwnd": 64}"#)?;
    /// assert_eq!(conf.profile(), wrc::Profile::Standard);
    /// assert_eq!(conf.init_cwnd(), 64);
    /// # Ok::<(), wrc::Error>(())
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let overrides: ConfigOverrides = serde_json::from_str(json)?;
        let conf = overrides.apply();
        conf.validate()?;
        Ok(conf)
    }

    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check the tunables the controller divides or shifts by.
    pub fn validate(&self) -> Result<()> {
        if self.ewma_max_weight == 0 {
            return Err(Error::InvalidConfig("ewma_max_weight is zero".into()));
        }

        for (name, weight) in [
            ("ewma_weight", self.ewma_weight),
            ("ewma_light_weight", self.ewma_light_weight),
            ("ewma_heavy_weight", self.ewma_heavy_weight),
        ] {
            if weight > self.ewma_max_weight {
                return Err(Error::InvalidConfig(format!(
                    "{} {} exceeds ewma_max_weight {}",
                    name, weight, self.ewma_max_weight
                )));
            }
        }

        if self.init_cwnd == 0 {
            return Err(Error::InvalidConfig("init_cwnd is zero".into()));
        }

        if self.safe_factor > 100 {
            return Err(Error::InvalidConfig(format!(
                "safe_factor {} exceeds 100 percent",
                self.safe_factor
            )));
        }

        if self.rwin_booster_safe_shift >= u32::BITS {
            return Err(Error::InvalidConfig(format!(
                "rwin_booster_safe_shift {} is too large",
                self.rwin_booster_safe_shift
            )));
        }

        Ok(())
    }

    /// Profile the defaults were taken from.
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Initial window in segments.
    pub fn init_cwnd(&self) -> u32 {
        self.init_cwnd
    }

    /// The congestion control algorithm used for a connection.
    pub fn congestion_control_algorithm(&self) -> CongestionControlAlgorithm {
        self.congestion_control_algorithm
    }

    /// Ceiling in segments when the path is fast.
    pub(crate) fn cwnd_upper_bound(&self, mss: u32) -> u32 {
        self.cwnd_highbound / mss.max(1)
    }

    /// Ceiling in segments when the path is slow.
    pub(crate) fn cwnd_lower_bound(&self, mss: u32) -> u32 {
        self.cwnd_lowbound / mss.max(1)
    }

    /// Set the congestion control algorithm.
    /// The default value is `Wrc`.
    pub fn set_congestion_control_algorithm(&mut self, cca: CongestionControlAlgorithm) {
        self.congestion_control_algorithm = cca;
    }

    /// Set the window ceiling bounds in bytes.
    pub fn set_cwnd_bounds(&mut self, lowbound: u32, highbound: u32) {
        self.cwnd_lowbound = lowbound;
        self.cwnd_highbound = highbound;
    }

    /// Set the range of the low RTT marker in milliseconds.
    pub fn set_rtt_low_marker_range(&mut self, floor: u32, ceiling: u32) {
        self.rtt_low_floor = floor;
        self.rtt_low_ceiling = ceiling;
    }

    /// Set the range of the high RTT marker in milliseconds.
    pub fn set_rtt_high_marker_range(&mut self, floor: u32, ceiling: u32) {
        self.rtt_high_floor = floor;
        self.rtt_high_ceiling = ceiling;
    }

    /// Set the RTT in milliseconds above which samples are outliers.
    pub fn set_lpf_rtt_threshold(&mut self, v: u32) {
        self.lpf_rtt_threshold = v;
    }

    /// Set the EWMA weights. `max` is the denominator of the other three.
    pub fn set_ewma_weights(&mut self, weight: u32, light: u32, heavy: u32, max: u32) {
        self.ewma_weight = weight;
        self.ewma_light_weight = light;
        self.ewma_heavy_weight = heavy;
        self.ewma_max_weight = max;
    }

    /// Set the initial window in segments.
    /// The default value is `512`.
    pub fn set_init_cwnd(&mut self, v: u32) {
        self.init_cwnd = v;
    }

    /// Set the usable share of the peer receive window in percent.
    /// The default value is `90`.
    pub fn set_safe_factor(&mut self, v: u32) {
        self.safe_factor = v;
    }

    /// Set the factor applied to the minimum RTT to place the high marker.
    pub fn set_rtt_high_factor(&mut self, v: u32) {
        self.rtt_high_factor = v;
    }

    /// Set how many leading RTT samples calibrate the markers.
    /// The default value is `10`.
    pub fn set_min_rtt_sample_count(&mut self, v: u64) {
        self.min_rtt_sample_count = v;
    }

    /// Set the factor used to leave congestion avoidance.
    pub fn set_conservative_factor(&mut self, v: u32) {
        self.conservative_factor = v;
    }

    /// Set the congestion avoidance enter and exit thresholds in
    /// milliseconds.
    pub fn set_ca_thresholds(&mut self, enter: u32, exit: u32) {
        self.ca_enter_threshold = enter;
        self.ca_exit_threshold = exit;
    }

    /// Set the window increase per round in congestion avoidance.
    pub fn set_ca_increase_step(&mut self, v: u32) {
        self.ca_increase_step = v;
    }

    /// Use the built-in growth functions.
    /// The default value is true.
    pub fn enable_legacy_mode(&mut self, v: bool) {
        self.legacy_mode = v;
    }

    /// Start connections in quick start.
    /// The default value is true.
    pub fn enable_rwin_booster(&mut self, v: bool) {
        self.rwin_booster_enabled = v;
    }

    /// Set the quick start anti silly window shift.
    /// The default value is `3`.
    pub fn set_rwin_booster_safe_shift(&mut self, v: u32) {
        self.rwin_booster_safe_shift = v;
    }

    /// Log repaired zero windows at error level.
    /// The default value is true.
    pub fn enable_slow_start_check_log(&mut self, v: bool) {
        self.slow_start_check_log = v;
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Profile::default())
    }
}

/// Override document accepted by `Config::from_json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigOverrides {
    profile: Option<Profile>,
    congestion_control_algorithm: Option<CongestionControlAlgorithm>,
    cwnd_highbound: Option<u32>,
    cwnd_lowbound: Option<u32>,
    rtt_low_floor: Option<u32>,
    rtt_low_ceiling: Option<u32>,
    rtt_high_floor: Option<u32>,
    rtt_high_ceiling: Option<u32>,
    lpf_rtt_threshold: Option<u32>,
    ewma_weight: Option<u32>,
    ewma_light_weight: Option<u32>,
    ewma_heavy_weight: Option<u32>,
    ewma_max_weight: Option<u32>,
    init_cwnd: Option<u32>,
    safe_factor: Option<u32>,
    rtt_high_factor: Option<u32>,
    min_rtt_sample_count: Option<u64>,
    conservative_factor: Option<u32>,
    ca_enter_threshold: Option<u32>,
    ca_exit_threshold: Option<u32>,
    ca_increase_step: Option<u32>,
    legacy_mode: Option<bool>,
    rwin_booster_enabled: Option<bool>,
    rwin_booster_safe_shift: Option<u32>,
    slow_start_check_log: Option<bool>,
}

impl ConfigOverrides {
    fn apply(self) -> Config {
        let mut conf = Config::new(self.profile.unwrap_or_default());

        macro_rules! merge {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(v) = self.$field {
                        conf.$field = v;
                    }
                )*
            };
        }

        merge!(
            congestion_control_algorithm,
            cwnd_highbound,
            cwnd_lowbound,
            rtt_low_floor,
            rtt_low_ceiling,
            rtt_high_floor,
            rtt_high_ceiling,
            lpf_rtt_threshold,
            ewma_weight,
            ewma_light_weight,
            ewma_heavy_weight,
            ewma_max_weight,
            init_cwnd,
            safe_factor,
            rtt_high_factor,
            min_rtt_sample_count,
            conservative_factor,
            ca_enter_threshold,
            ca_exit_threshold,
            ca_increase_step,
            legacy_mode,
            rwin_booster_enabled,
            rwin_booster_safe_shift,
            slow_start_check_log,
        );

        conf
    }
}

/// Process wide holder of the current configuration, used for live tuning.
///
/// Readers get an immutable snapshot. An update replaces the snapshot as a
/// whole, so a reader sees either the old or the new configuration.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    pub fn new(conf: Config) -> Self {
        Self {
            current: RwLock::new(Arc::new(conf)),
        }
    }

    /// Return the current configuration.
    pub fn snapshot(&self) -> Arc<Config> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current configuration. Connections created earlier keep
    /// the snapshot they hold until they are handed a new one.
    pub fn update(&self, conf: Config) -> Result<Arc<Config>> {
        conf.validate()?;
        let conf = Arc::new(conf);
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = conf.clone();
        Ok(conf)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Config::default())
    }
}


pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::CongestionControlAlgorithm;
pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::CongestionEvent;
pub use crate::congestion_control::CongestionStats;
pub use crate::congestion_control::ReferenceGrowth;
pub use crate::congestion_control::Reno;
pub use crate::congestion_control::RenoGrowth;
pub use crate::congestion_control::RttBoundary;
pub use crate::congestion_control::Wrc;
pub use crate::error::Error;
pub use crate::transport::TransportState;

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

#[cfg(feature = "ffi")]
mod ffi;

pub mod error;
mod transport;
