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

// Note: The API is not stable and may change in future versions.

use std::ffi;
use std::ptr;
use std::sync::atomic;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Instant;

use libc::c_char;
use libc::c_int;
use libc::c_void;
use libc::size_t;
use log::*;

use crate::*;

/// Return the algorithm revision as a NUL terminated string.
#[no_mangle]
pub extern "C" fn wrc_version() -> *const c_char {
    static VERSION_CSTR: OnceLock<ffi::CString> = OnceLock::new();
    VERSION_CSTR
        .get_or_init(|| ffi::CString::new(VERSION).unwrap_or_default())
        .as_ptr()
}

struct LogWriter {
    cb: extern "C" fn(data: *const u8, data_len: size_t, argp: *mut c_void),
    argp: std::sync::atomic::AtomicPtr<c_void>,
}

impl log::Log for LogWriter {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let line = format!("{}: {}\n", record.target(), record.args());
        (self.cb)(
            line.as_ptr(),
            line.len(),
            self.argp.load(atomic::Ordering::Relaxed),
        );
    }

    fn flush(&self) {}
}

/// Create a configuration with the defaults of the given profile.
/// The caller is responsible for the memory of the Config and should properly
/// destroy it by calling `wrc_config_free`.
#[no_mangle]
pub extern "C" fn wrc_config_new(profile: Profile) -> *mut Config {
    Box::into_raw(Box::new(Config::new(profile)))
}

/// Create a configuration from a NUL terminated JSON document.
/// Return NULL if the document is malformed or fails validation.
#[no_mangle]
pub extern "C" fn wrc_config_new_from_json(json: *const c_char) -> *mut Config {
    if json.is_null() {
        return ptr::null_mut();
    }

    let json = unsafe { ffi::CStr::from_ptr(json) };
    let json = match json.to_str() {
        Ok(v) => v,
        Err(_) => return ptr::null_mut(),
    };

    match Config::from_json(json) {
        Ok(conf) => Box::into_raw(Box::new(conf)),
        Err(e) => {
            error!("load config failed: {}", e);
            ptr::null_mut()
        }
    }
}

/// Destroy a Config instance.
#[no_mangle]
pub extern "C" fn wrc_config_free(config: *mut Config) {
    unsafe {
        let _ = Box::from_raw(config);
    };
}

/// Check the configuration. Return 0 on success or a negative error code.
#[no_mangle]
pub extern "C" fn wrc_config_validate(config: &Config) -> c_int {
    match config.validate() {
        Ok(_) => 0,
        Err(e) => e.to_errno() as c_int,
    }
}

/// Set congestion control algorithm that the connection would use.
#[no_mangle]
pub extern "C" fn wrc_config_set_congestion_control_algorithm(
    config: &mut Config,
    v: CongestionControlAlgorithm,
) {
    config.set_congestion_control_algorithm(v);
}

/// Set the window ceilings in bytes for a slow and a fast path.
#[no_mangle]
pub extern "C" fn wrc_config_set_cwnd_bounds(config: &mut Config, lowbound: u32, highbound: u32) {
    config.set_cwnd_bounds(lowbound, highbound);
}

/// Set the range of the low RTT marker in milliseconds.
#[no_mangle]
pub extern "C" fn wrc_config_set_rtt_low_marker_range(config: &mut Config, floor: u32, ceiling: u32) {
    config.set_rtt_low_marker_range(floor, ceiling);
}

/// Set the range of the high RTT marker in milliseconds.
#[no_mangle]
pub extern "C" fn wrc_config_set_rtt_high_marker_range(
    config: &mut Config,
    floor: u32,
    ceiling: u32,
) {
    config.set_rtt_high_marker_range(floor, ceiling);
}

/// Set the initial congestion window in segments.
#[no_mangle]
pub extern "C" fn wrc_config_set_init_cwnd(config: &mut Config, v: u32) {
    config.set_init_cwnd(v);
}

/// Set the usable share of the peer's receive window in percent.
#[no_mangle]
pub extern "C" fn wrc_config_set_safe_factor(config: &mut Config, v: u32) {
    config.set_safe_factor(v);
}

/// Set the smoothed RTT thresholds in milliseconds for staying in and
/// leaving congestion avoidance.
#[no_mangle]
pub extern "C" fn wrc_config_set_ca_thresholds(config: &mut Config, enter: u32, exit: u32) {
    config.set_ca_thresholds(enter, exit);
}

/// Set the congestion avoidance increase in segments.
#[no_mangle]
pub extern "C" fn wrc_config_set_ca_increase_step(config: &mut Config, v: u32) {
    config.set_ca_increase_step(v);
}

/// Enable the built-in window growth instead of the stack's reference one.
#[no_mangle]
pub extern "C" fn wrc_config_enable_legacy_mode(config: &mut Config, v: bool) {
    config.enable_legacy_mode(v);
}

/// Enable quick start from the peer's receive window.
#[no_mangle]
pub extern "C" fn wrc_config_enable_rwin_booster(config: &mut Config, v: bool) {
    config.enable_rwin_booster(v);
}

/// Set the share of the peer window held back by quick start, as a shift.
#[no_mangle]
pub extern "C" fn wrc_config_set_rwin_booster_safe_shift(config: &mut Config, v: u32) {
    config.set_rwin_booster_safe_shift(v);
}

/// Log window repairs at error level.
#[no_mangle]
pub extern "C" fn wrc_config_enable_slow_start_check_log(config: &mut Config, v: bool) {
    config.enable_slow_start_check_log(v);
}

/// Congestion control state of one connection.
pub struct WrcConn {
    cc: Box<dyn CongestionController>,
}

/// Create the congestion control state of a connection.
/// The configuration is copied and may be destroyed afterwards. The caller
/// should destroy the returned handle by calling `wrc_conn_free`.
#[no_mangle]
pub extern "C" fn wrc_conn_new(config: &Config) -> *mut WrcConn {
    let cc = build_congestion_controller(&Arc::new(config.clone()));
    Box::into_raw(Box::new(WrcConn { cc }))
}

/// Destroy a WrcConn instance.
#[no_mangle]
pub extern "C" fn wrc_conn_free(conn: *mut WrcConn) {
    unsafe {
        let _ = Box::from_raw(conn);
    };
}

/// Initialize the window state of a new connection.
#[no_mangle]
pub extern "C" fn wrc_conn_init(conn: &mut WrcConn, sock: &mut TransportState) {
    conn.cc.on_init(Instant::now(), sock);
}

/// Feed an RTT sample in microseconds. Non positive samples are ignored.
#[no_mangle]
pub extern "C" fn wrc_conn_ack_sample(conn: &mut WrcConn, rtt_us: i64, sock: &mut TransportState) {
    conn.cc.on_ack_sample(Instant::now(), rtt_us, sock);
}

/// Grow the window once per ACK processing cycle.
#[no_mangle]
pub extern "C" fn wrc_conn_growth_tick(
    conn: &mut WrcConn,
    is_window_limited: bool,
    in_flight: u32,
    sock: &mut TransportState,
) {
    conn.cc
        .on_growth_tick(Instant::now(), is_window_limited, in_flight, sock);
}

/// Return the slow start threshold to use after a congestion signal.
#[no_mangle]
pub extern "C" fn wrc_conn_ssthresh(conn: &mut WrcConn, sock: &TransportState) -> u32 {
    conn.cc.on_congestion_detected(sock)
}

/// Report a generic event of the transport stack.
#[no_mangle]
pub extern "C" fn wrc_conn_event(
    conn: &mut WrcConn,
    event: CongestionEvent,
    sock: &mut TransportState,
) {
    conn.cc.on_event(Instant::now(), event, sock);
}

/// Return the window to restore after a spurious congestion signal.
#[no_mangle]
pub extern "C" fn wrc_conn_undo_cwnd(conn: &WrcConn, sock: &TransportState) -> u32 {
    conn.cc.undo_window(sock)
}

/// Copy the congestion statistics of the connection.
#[no_mangle]
pub extern "C" fn wrc_conn_stats(conn: &WrcConn, out: &mut CongestionStats) {
    *out = conn.cc.stats().clone();
}

/// Set callback for logging.
#[no_mangle]
pub extern "C" fn wrc_set_logger(
    cb: extern "C" fn(data: *const u8, data_len: size_t, argp: *mut c_void),
    argp: *mut c_void,
    level: log::LevelFilter,
) {
    let argp = atomic::AtomicPtr::new(argp);
    let logger = Box::new(LogWriter { cb, argp });
    let _ = log::set_boxed_logger(logger);
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ffi_version() {
        let v = unsafe { ffi::CStr::from_ptr(wrc_version()) };
        assert_eq!(v.to_str(), Ok(VERSION));
    }

    static LOGGED_BYTES: atomic::AtomicUsize = atomic::AtomicUsize::new(0);

    extern "C" fn count_log_bytes(_data: *const u8, data_len: size_t, _argp: *mut c_void) {
        LOGGED_BYTES.fetch_add(data_len, atomic::Ordering::Relaxed);
    }

    #[test]
    fn ffi_log_writer() {
        let writer = LogWriter {
            cb: count_log_bytes,
            argp: atomic::AtomicPtr::new(ptr::null_mut()),
        };
        assert!(log::Log::enabled(
            &writer,
            &log::Metadata::builder().level(log::Level::Trace).build()
        ));

        log::Log::log(
            &writer,
            &log::Record::builder()
                .args(format_args!("cwnd=512"))
                .target("wrc")
                .build(),
        );
        // "wrc: cwnd=512\n"
        assert_eq!(LOGGED_BYTES.load(atomic::Ordering::Relaxed), 14);
    }

    #[test]
    fn ffi_config_from_json() {
        let json = ffi::CString::new(r#"{"profile": "standard", "init_cwnd": 64}"#).unwrap();
        let conf = wrc_config_new_from_json(json.as_ptr());
        assert!(!conf.is_null());
        assert_eq!(unsafe { (*conf).init_cwnd() }, 64);
        wrc_config_free(conf);

        let json = ffi::CString::new(r#"{"init_cwnd": 0}"#).unwrap();
        assert!(wrc_config_new_from_json(json.as_ptr()).is_null());
        assert!(wrc_config_new_from_json(ptr::null()).is_null());
    }

    #[test]
    fn ffi_conn_lifecycle() {
        let conf = wrc_config_new(Profile::Standard);
        let conf_ref = unsafe { &mut *conf };
        wrc_config_enable_rwin_booster(conf_ref, false);
        assert_eq!(wrc_config_validate(conf_ref), 0);

        let conn = wrc_conn_new(conf_ref);
        wrc_config_free(conf);
        let conn_ref = unsafe { &mut *conn };

        let mut sock = TransportState::new(1024);
        sock.snd_wnd = 16 << 20;
        wrc_conn_init(conn_ref, &mut sock);
        assert_eq!(sock.cwnd, 512);

        wrc_conn_ack_sample(conn_ref, 50_000, &mut sock);
        assert_eq!(sock.cwnd_clamp, 704);

        wrc_conn_growth_tick(conn_ref, true, 512, &mut sock);
        assert_eq!(sock.cwnd, 513);

        sock.cwnd = 900;
        sock.ssthresh = wrc_conn_ssthresh(conn_ref, &sock);
        assert_eq!(sock.ssthresh, 600);
        assert_eq!(wrc_conn_undo_cwnd(conn_ref, &sock), 900);

        wrc_conn_event(conn_ref, CongestionEvent::Loss, &mut sock);
        assert_eq!(sock.cwnd, 512);

        let mut stats = CongestionStats::default();
        wrc_conn_stats(conn_ref, &mut stats);
        assert_eq!(stats.rtt_samples, 1);
        assert_eq!(stats.loss_events, 1);

        wrc_conn_free(conn);
    }
}
