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

#![no_main]

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use lazy_static::lazy_static;
use libfuzzer_sys::fuzz_target;

use wrc::Config;
use wrc::CongestionController;
use wrc::CongestionEvent;
use wrc::Profile;
use wrc::TransportState;
use wrc::Wrc;

lazy_static! {
    static ref CONFIGS: Vec<Arc<Config>> = {
        let mut configs = Vec::new();
        for profile in [Profile::Standard, Profile::HighBandwidth] {
            for (legacy, booster) in [(true, true), (true, false), (false, false)] {
                let mut conf = Config::new(profile);
                conf.enable_legacy_mode(legacy);
                conf.enable_rwin_booster(booster);
                configs.push(Arc::new(conf));
            }
        }
        configs
    };
}

fn read_u32(data: &[u8]) -> u32 {
    let mut buf = [0; 4];
    let n = data.len().min(4);
    buf[..n].copy_from_slice(&data[..n]);
    u32::from_le_bytes(buf)
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, mut data)) = data.split_first() else {
        return;
    };

    let conf = &CONFIGS[selector as usize % CONFIGS.len()];
    let mut wrc = Wrc::new(conf.clone());
    let mut sock = TransportState::new(1024 + (selector as u32 >> 3) * 64);
    let mut now = Instant::now();
    wrc.on_init(now, &mut sock);

    while data.len() >= 5 {
        let op = data[0];
        let arg = read_u32(&data[1..5]);
        data = &data[5..];
        now += Duration::from_millis((op >> 3) as u64 * 10);

        match op & 0x07 {
            0 => wrc.on_ack_sample(now, arg as i32 as i64, &mut sock),
            1 => {
                wrc.on_growth_tick(now, true, arg & 0xffff, &mut sock);
                assert!(sock.cwnd > 0);
            }
            2 => wrc.on_growth_tick(now, false, arg & 0xffff, &mut sock),
            3 => sock.ssthresh = wrc.on_congestion_detected(&sock),
            4 => wrc.on_event(now, CongestionEvent::Loss, &mut sock),
            5 => wrc.on_event(now, CongestionEvent::CompleteCwr, &mut sock),
            6 => {
                sock.snd_wnd = arg;
                sock.max_window = sock.max_window.max(arg);
                sock.packets_out = arg >> 20;
            }
            _ => {
                // A zero window is repaired, a zero ceiling is only repaired
                // in slow start.
                sock.cwnd = arg & 0xffff;
                sock.cwnd_clamp = (arg >> 16).max(1);
            }
        }

        assert!(wrc.boundary().slope <= 0);
    }
});
