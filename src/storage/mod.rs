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

// Storage module
//
// Provides the record sink abstraction every link writes into, and the
// durable file log that backs it in production.

pub mod backend;
pub mod durable_log;
pub mod format;
pub mod memory;

pub use backend::RecordSink;
pub use durable_log::DurableLog;
pub use format::format_time;
pub use memory::MemorySink;
