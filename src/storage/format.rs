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

// Line rendering for the durable log

use crate::config::LogFormat;
use crate::error::WriteError;
use crate::protocol::{Measurement, Record, SourceKind};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

#[derive(Serialize)]
struct JsonLine<'a> {
    timestamp_us: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    time: Option<String>,
    source: &'a str,
    kind: SourceKind,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl LogFormat {
    /// Render one record as a single line without the trailing newline
    pub fn render(self, source: &str, record: &Record) -> Result<String, WriteError> {
        match self {
            LogFormat::Text => Ok(render_text(source, record)),
            LogFormat::Json => render_json(source, record),
        }
    }
}

fn to_utc(micros: i64) -> Option<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Format a microsecond timestamp as `YYYY-MM-DD HH:MM:SS` in UTC.
///
/// Timestamps outside chrono's range fall back to the raw microsecond count.
pub fn format_time(micros: i64) -> String {
    match to_utc(micros) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => micros.to_string(),
    }
}

fn render_text(source: &str, record: &Record) -> String {
    let body = match record.measurement {
        Measurement::TemperaturePressure {
            temperature,
            pressure,
        } => format!("Temp: {:.2}, Pressure: {}", temperature, pressure),
        Measurement::Triaxial { x, y, z } => format!("X: {}, Y: {}, Z: {}", x, y, z),
    };
    format!("{} {} {}", format_time(record.timestamp_us), source, body)
}

fn render_json(source: &str, record: &Record) -> Result<String, WriteError> {
    let mut fields = serde_json::Map::new();
    for (name, value) in record.measurement.fields() {
        fields.insert(name.to_string(), serde_json::to_value(value)?);
    }

    let line = JsonLine {
        timestamp_us: record.timestamp_us,
        time: to_utc(record.timestamp_us)
            .map(|time| time.to_rfc3339_opts(SecondsFormat::Micros, true)),
        source,
        kind: record.kind(),
        fields,
    };

    Ok(serde_json::to_string(&line)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp_record() -> Record {
        Record::new(
            1_609_459_200_000_000,
            Measurement::TemperaturePressure {
                temperature: 25.5,
                pressure: 100,
            },
        )
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(1_609_459_200_000_000), "2021-01-01 00:00:00");
        assert_eq!(format_time(1_609_459_200_999_999), "2021-01-01 00:00:00");
        assert_eq!(format_time(-1), "1969-12-31 23:59:59");
        assert_eq!(format_time(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn test_render_text() {
        let line = LogFormat::Text.render("server1", &tp_record()).unwrap();
        assert_eq!(line, "2021-01-01 00:00:00 server1 Temp: 25.50, Pressure: 100");

        let record = Record::new(
            1_609_459_200_000_000,
            Measurement::Triaxial {
                x: 10,
                y: -20,
                z: 30,
            },
        );
        let line = LogFormat::Text.render("server2", &record).unwrap();
        assert_eq!(line, "2021-01-01 00:00:00 server2 X: 10, Y: -20, Z: 30");
    }

    #[test]
    fn test_render_json() {
        let line = LogFormat::Json.render("server1", &tp_record()).unwrap();
        assert!(!line.contains('\n'));

        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["timestamp_us"], 1_609_459_200_000_000i64);
        assert_eq!(value["time"], "2021-01-01T00:00:00.000000Z");
        assert_eq!(value["source"], "server1");
        assert_eq!(value["kind"], "temperature_pressure");
        assert_eq!(value["fields"]["temperature"], 25.5);
        assert_eq!(value["fields"]["pressure"], 100);
    }
}
