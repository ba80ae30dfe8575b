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

// Kills the collector binary mid-stream and checks the log it leaves behind

#![cfg(unix)]

use regex::Regex;
use sensor_collector::mock::{MockOptions, MockSensorServer};
use sensor_collector::SourceKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::sleep;

fn write_config(dir: &Path, port1: u16, port2: u16) -> (PathBuf, PathBuf) {
    let data = dir.join("data.txt");
    let config = format!(
        r#"
endpoints:
  - name: Server1
    host: 127.0.0.1
    port: {port1}
    kind: temperature_pressure
  - name: Server2
    host: 127.0.0.1
    port: {port2}
    kind: triaxial
storage:
  path: {data}
link:
  handshake_timeout_ms: 1000
backoff:
  initial_ms: 50
  max_ms: 200
logging:
  level: warn
shutdown_timeout_seconds: 2
"#,
        data = data.display()
    );
    let path = dir.join("collector.yaml");
    std::fs::write(&path, config).unwrap();
    (path, data)
}

fn spawn_collector(config: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_sensor-collector"))
        .arg("--config")
        .arg(config)
        .env_remove("COLLECTOR_OUTPUT")
        .env_remove("RUST_LOG")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("collector binary should start")
}

fn assert_well_formed(content: &str) {
    let pattern = Regex::new(
        r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2} (Server1 Temp: 25\.50, Pressure: 100|Server2 X: 10, Y: 20, Z: 30)$",
    )
    .unwrap();

    if !content.is_empty() {
        assert!(content.ends_with('\n'), "Log ends in a partial line");
    }
    for line in content.lines() {
        assert!(pattern.is_match(line), "Malformed line: {:?}", line);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sigkill_leaves_only_whole_lines() {
    let server1 = MockSensorServer::start(
        MockOptions::new(SourceKind::TemperaturePressure).interval(Duration::from_millis(5)),
    )
    .await
    .unwrap();
    let server2 = MockSensorServer::start(
        MockOptions::new(SourceKind::Triaxial).interval(Duration::from_millis(5)),
    )
    .await
    .unwrap();

    let temp_dir = TempDir::new().unwrap();
    let (config, data) = write_config(temp_dir.path(), server1.port(), server2.port());

    let mut previous = String::new();
    for round in 0..3u64 {
        let mut child = spawn_collector(&config);
        sleep(Duration::from_millis(700 + round * 150)).await;

        child.kill().unwrap();
        child.wait().unwrap();

        let content = std::fs::read_to_string(&data).unwrap_or_default();
        assert_well_formed(&content);
        assert!(
            content.starts_with(&previous),
            "Round {} lost or rewrote committed lines",
            round
        );
        assert!(content.len() > previous.len(), "Round {} wrote nothing", round);
        previous = content;
    }

    server1.shutdown().await;
    server2.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sigterm_exits_cleanly() {
    let server = MockSensorServer::start(
        MockOptions::new(SourceKind::Triaxial).interval(Duration::from_millis(20)),
    )
    .await
    .unwrap();

    let temp_dir = TempDir::new().unwrap();
    // Server1 points at a closed port and keeps retrying in the background
    let (config, data) = write_config(temp_dir.path(), 1, server.port());

    let mut child = spawn_collector(&config);
    sleep(Duration::from_millis(800)).await;

    let status = Command::new("kill")
        .arg("-TERM")
        .arg(child.id().to_string())
        .status()
        .unwrap();
    assert!(status.success());

    let mut exit = None;
    for _ in 0..50 {
        if let Some(status) = child.try_wait().unwrap() {
            exit = Some(status);
            break;
        }
        sleep(Duration::from_millis(100)).await;
    }
    let exit = match exit {
        Some(status) => status,
        None => {
            let _ = child.kill();
            panic!("collector did not exit after SIGTERM");
        }
    };
    assert!(exit.success(), "exit status: {:?}", exit);

    let content = std::fs::read_to_string(&data).unwrap();
    assert_well_formed(&content);
    assert!(content.lines().count() > 5);
    assert!(content.lines().all(|line| line.contains(" Server2 ")));

    server.shutdown().await;
}
