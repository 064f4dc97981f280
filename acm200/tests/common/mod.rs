//! Fake ACM200 for integration tests
//!
//! Listens on a loopback port and speaks the line protocol: it keeps a route
//! and power table, acknowledges control commands and answers status
//! queries. Switches on [`FakeState`] make it misbehave (stay silent, hang up,
//! reject the bulk query, ignore route changes, answer slowly).

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use acm200::MatrixConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Device tables and misbehaviour switches
#[derive(Debug, Default)]
pub struct FakeState {
    pub zones: u16,
    pub routes: BTreeMap<u16, u16>,
    pub power: BTreeMap<u16, bool>,

    /// Every line received, in order
    pub received: Vec<String>,
    pub connections: usize,

    /// Read commands but never answer
    pub silent: bool,
    /// Close the connection on the next N commands without answering
    pub hang_up_next: usize,
    /// Answer `STATUS` with `ERR`
    pub reject_bulk: bool,
    /// Acknowledge route changes without applying them
    pub ignore_routes: bool,
    /// Wait this long before answering
    pub reply_delay: Duration,
}

impl FakeState {
    fn status_line(&self, zone: u16) -> String {
        let input = match self.routes.get(&zone) {
            Some(input) => format!("IN{:03}", input),
            None => "IN---".to_string(),
        };
        let power = match self.power.get(&zone) {
            Some(true) => "ON",
            Some(false) => "OFF",
            None => "---",
        };
        format!("OUT{:03} {} {}", zone, input, power)
    }

    fn respond(&mut self, line: &str) -> Vec<String> {
        if line == "STATUS" {
            if self.reject_bulk {
                return vec!["ERR STATUS unsupported".to_string()];
            }
            let mut lines: Vec<String> = (1..=self.zones).map(|z| self.status_line(z)).collect();
            lines.push("END".to_string());
            return lines;
        }

        let unknown = || vec![format!("ERR {} unknown command", line)];
        let Some(rest) = line.strip_prefix("OUT") else {
            return unknown();
        };
        if rest.len() < 3 {
            return unknown();
        }
        let (zone, action) = rest.split_at(3);
        let Ok(zone) = zone.parse::<u16>() else {
            return unknown();
        };
        if zone == 0 || zone > self.zones {
            return vec![format!("ERR {} no such output", line)];
        }

        match action {
            "STATUS" => vec![self.status_line(zone)],
            "ON" | "OFF" => {
                self.power.insert(zone, action == "ON");
                vec![format!("OK {}", line)]
            }
            _ => match action.strip_prefix("FR").and_then(|i| i.parse::<u16>().ok()) {
                Some(input) => {
                    if !self.ignore_routes {
                        self.routes.insert(zone, input);
                    }
                    vec![format!("OK {}", line)]
                }
                None => unknown(),
            },
        }
    }
}

pub struct FakeDevice {
    port: u16,
    state: Arc<Mutex<FakeState>>,
    task: JoinHandle<()>,
}

impl FakeDevice {
    /// Start a device with `zones` outputs, every output off and unrouted
    pub async fn start(zones: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(Mutex::new(FakeState {
            zones,
            power: (1..=zones).map(|z| (z, false)).collect(),
            ..Default::default()
        }));

        let shared = state.clone();
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                shared.lock().unwrap().connections += 1;
                tokio::spawn(serve(stream, shared.clone()));
            }
        });

        Self { port, state, task }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Client config pointing at this device, with short timeouts
    pub fn config(&self, inputs: u16) -> MatrixConfig {
        let zones = self.state.lock().unwrap().zones;
        MatrixConfig::new("127.0.0.1")
            .with_port(self.port)
            .with_zones(zones)
            .with_inputs(inputs)
            .with_command_timeout(Duration::from_millis(300))
            .with_connect_timeout(Duration::from_millis(500))
            .with_backoff(Duration::from_millis(10), Duration::from_millis(50))
    }

    pub fn update(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn received(&self) -> Vec<String> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn connections(&self) -> usize {
        self.state.lock().unwrap().connections
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(stream: TcpStream, state: Arc<Mutex<FakeState>>) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_ascii_uppercase();
        if line.is_empty() {
            continue;
        }

        let (replies, delay) = {
            let mut state = state.lock().unwrap();
            state.received.push(line.clone());

            if state.hang_up_next > 0 {
                state.hang_up_next -= 1;
                return;
            }
            if state.silent {
                continue;
            }
            (state.respond(&line), state.reply_delay)
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        for reply in replies {
            if write.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

/// Install a test subscriber once; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
