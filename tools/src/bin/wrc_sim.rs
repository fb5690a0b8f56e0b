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

use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use clap::error::ErrorKind;
use clap::CommandFactory;
use clap::Parser;
use log::debug;
use log::info;
use statrs::statistics::Data;
use statrs::statistics::Distribution;
use statrs::statistics::Max;
use statrs::statistics::Min;
use statrs::statistics::OrderStatistics;

use wrc::build_congestion_controller;
use wrc::Config;
use wrc::CongestionControlAlgorithm;
use wrc::CongestionController;
use wrc::CongestionEvent;
use wrc::Profile;
use wrc::TransportState;
use wrc_tools::Link;
use wrc_tools::LinkConfig;
use wrc_tools::Result;

#[cfg(unix)]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[derive(Parser, Debug, Clone)]
#[clap(name = "wrc_sim")]
pub struct SimOpt {
    /// Deployment profile, support high_bandwidth/standard.
    #[clap(long, default_value = "standard", value_name = "STR")]
    pub profile: Profile,

    /// JSON configuration file. It selects its own profile and overrides
    /// `--profile`.
    #[clap(long, value_name = "FILE")]
    pub config: Option<String>,

    /// Congestion control algorithm, support WRC/RENO.
    #[clap(long, default_value = "WRC", value_name = "STR")]
    pub congestion_control_algorithm: CongestionControlAlgorithm,

    /// Propagation round trip time in milliseconds.
    #[clap(long, default_value = "600", value_name = "TIME")]
    pub base_rtt: u64,

    /// Bottleneck bandwidth in Mbit/s.
    #[clap(long, default_value = "20", value_name = "NUM")]
    pub bandwidth: u64,

    /// Bottleneck queue capacity in packets.
    #[clap(long, default_value = "500", value_name = "NUM")]
    pub queue: u32,

    /// Upper bound of the random extra delay per round in milliseconds.
    #[clap(long, default_value = "20", value_name = "TIME")]
    pub jitter: u64,

    /// Random loss probability per packet.
    #[clap(long, default_value = "0.0001", value_name = "NUM")]
    pub loss_rate: f64,

    /// Receive window advertised by the peer in bytes.
    #[clap(long, default_value = "4194304", value_name = "NUM")]
    pub rwnd: u32,

    /// Segment size in bytes.
    #[clap(long, default_value = "1024", value_name = "NUM")]
    pub mss: u32,

    /// Simulated duration in seconds.
    #[clap(short, long, default_value = "60", value_name = "TIME")]
    pub duration: u64,

    /// Seed of the random generator.
    #[clap(long, default_value = "1", value_name = "NUM")]
    pub seed: u64,

    /// Write the per round CSV to the given file instead of `stdout`.
    #[clap(short, long, value_name = "FILE")]
    pub output: Option<String>,

    /// Log level, support OFF/ERROR/WARN/INFO/DEBUG/TRACE.
    #[clap(long, default_value = "INFO", value_name = "STR")]
    pub log_level: log::LevelFilter,

    /// Log file path. If no file is specified, logs will be written to `stderr`.
    #[clap(long, value_name = "FILE")]
    pub log_file: Option<String>,
}

/// Drives a congestion controller over a synthetic link, one window per
/// round trip.
struct Simulator {
    option: SimOpt,
    cc: Box<dyn CongestionController>,
    link: Link,
    sock: TransportState,
    out: Box<dyn Write>,

    /// Smoothed RTT seen by the sender, RFC 6298 style.
    srtt_ms: u64,

    /// Window sizes at the end of each round.
    cwnd_samples: Vec<f64>,
}

impl Simulator {
    fn new(option: SimOpt) -> Result<Self> {
        let mut conf = match &option.config {
            Some(path) => Config::from_file(path)?,
            None => Config::new(option.profile),
        };
        conf.set_congestion_control_algorithm(option.congestion_control_algorithm);
        conf.validate()?;
        let cc = build_congestion_controller(&Arc::new(conf));

        let link = Link::new(
            LinkConfig {
                base_rtt_ms: option.base_rtt,
                bandwidth_mbps: option.bandwidth,
                queue_packets: option.queue,
                jitter_ms: option.jitter,
                loss_rate: option.loss_rate,
                mss: option.mss,
            },
            option.seed,
        );

        let mut sock = TransportState::new(option.mss);
        sock.snd_wnd = option.rwnd;
        sock.max_window = option.rwnd;

        let out: Box<dyn Write> = match &option.output {
            Some(path) => Box::new(BufWriter::new(File::create(path)?)),
            None => Box::new(BufWriter::new(std::io::stdout())),
        };

        Ok(Self {
            option,
            cc,
            link,
            sock,
            out,
            srtt_ms: 0,
            cwnd_samples: Vec::new(),
        })
    }

    fn run(&mut self) -> Result<()> {
        let start = Instant::now();
        let duration_ms = self.option.duration * 1000;
        let rwnd_segments = self.option.rwnd / self.sock.mss();

        self.cc.on_init(start, &mut self.sock);
        info!(
            "wrc {} simulating {} over {}ms/{}Mbps, bdp={} packets",
            wrc::VERSION,
            self.cc.name(),
            self.option.base_rtt,
            self.option.bandwidth,
            self.link.bdp_packets()
        );

        writeln!(self.out, "time_ms,cwnd,clamp,ssthresh,srtt_ms")?;

        let mut time_ms = 0;
        let mut in_recovery = false;
        while time_ms < duration_ms {
            let is_window_limited = self.sock.cwnd <= rwnd_segments;
            let in_flight = self.sock.cwnd.min(rwnd_segments);
            self.sock.packets_out = in_flight;

            let round = self.link.transmit(in_flight);
            time_ms += round.rtt_ms.max(1);
            let now = start + Duration::from_millis(time_ms);

            if in_recovery {
                self.cc
                    .on_event(now, CongestionEvent::CompleteCwr, &mut self.sock);
                in_recovery = false;
            }

            let rtt_us = (round.rtt_ms * 1000) as i64;
            for _ in 0..round.delivered {
                self.cc.on_ack_sample(now, rtt_us, &mut self.sock);
                self.cc
                    .on_growth_tick(now, is_window_limited, in_flight, &mut self.sock);
            }

            if round.lost > 0 {
                if round.lost * 2 > in_flight {
                    debug!("{}ms heavy loss {}/{}, timeout", time_ms, round.lost, in_flight);
                    self.cc.on_event(now, CongestionEvent::Loss, &mut self.sock);
                } else {
                    debug!("{}ms loss {}/{}", time_ms, round.lost, in_flight);
                    self.sock.ssthresh = self.cc.on_congestion_detected(&self.sock);
                    self.sock.cwnd = self.sock.ssthresh;
                    in_recovery = true;
                }
            }

            self.srtt_ms = if self.srtt_ms == 0 {
                round.rtt_ms
            } else {
                (self.srtt_ms * 7 + round.rtt_ms) / 8
            };
            self.cwnd_samples.push(self.sock.cwnd as f64);

            writeln!(
                self.out,
                "{},{},{},{},{}",
                time_ms,
                self.sock.cwnd,
                self.sock.cwnd_clamp,
                self.sock.ssthresh,
                self.srtt_ms
            )?;
        }
        self.out.flush()?;

        self.report();
        Ok(())
    }

    fn report(&self) {
        if self.cwnd_samples.is_empty() {
            return;
        }
        let mut cwnd = Data::new(self.cwnd_samples.clone());

        info!(
            "cwnd min={} max={} mean={:.2} p50={} p95={}",
            cwnd.min(),
            cwnd.max(),
            cwnd.mean().unwrap_or(0.0),
            cwnd.percentile(50),
            cwnd.percentile(95)
        );
        info!("{:?}", self.cc.stats());
    }
}

fn parse_option() -> std::result::Result<SimOpt, clap::error::Error> {
    let option = SimOpt::parse();

    if !(0.0..=1.0).contains(&option.loss_rate) {
        return Err(SimOpt::command().error(
            ErrorKind::ValueValidation,
            "Loss rate should be in [0, 1]",
        ));
    }

    if option.mss == 0 {
        return Err(SimOpt::command().error(ErrorKind::ValueValidation, "Mss should be positive"));
    }

    Ok(option)
}

fn process_option(option: &mut SimOpt) -> Result<()> {
    env_logger::builder()
        .target(wrc_tools::log_target(&option.log_file)?)
        .filter_level(option.log_level)
        .format_timestamp_millis()
        .init();

    Ok(())
}

fn main() -> Result<()> {
    // Parse simulator option.
    let mut option = match parse_option() {
        Ok(option) => option,
        Err(e) => e.exit(),
    };

    // Process simulator option.
    process_option(&mut option)?;

    // Create simulator.
    let mut sim = Simulator::new(option)?;

    // Start simulation.
    sim.run()
}
