// Copyright 2025 coScene
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

use anyhow::{bail, Result};
use sensor_collector::mock::{MockMode, MockOptions, MockSensorServer};
use sensor_collector::SourceKind;
use std::net::SocketAddr;

/// Reference sensor server for trying the collector by hand
///
/// Usage: mock_sensor <port> <a|b> [normal|hang_connect|bad_sum|hang_data|reject]
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let port: u16 = match args.first() {
        Some(port) => port.parse()?,
        None => bail!("usage: mock_sensor <port> <a|b> [mode]"),
    };
    let kind = match args.get(1).map(String::as_str) {
        Some("a") | None => SourceKind::TemperaturePressure,
        Some("b") => SourceKind::Triaxial,
        Some(other) => bail!("unknown source kind '{}'", other),
    };
    let mode = match args.get(2).map(String::as_str) {
        Some("normal") | None => MockMode::Normal,
        Some("hang_connect") => MockMode::HangConnect,
        Some("bad_sum") => MockMode::BadChecksum,
        Some("hang_data") => MockMode::HangData,
        Some("reject") => MockMode::RejectHandshake,
        Some(other) => bail!("unknown mode '{}'", other),
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let server = MockSensorServer::bind(addr, MockOptions::new(kind).mode(mode)).await?;
    println!("Mock sensor on {} ({}, {:?})", server.local_addr(), kind, mode);

    tokio::signal::ctrl_c().await?;
    println!("Served {} frames over {} connections", server.frames_sent(), server.connections());
    server.shutdown().await;

    Ok(())
}
