// Copyright (c) 2023 RBB S.r.l
// opensource@mintlayer.org
// SPDX-License-Identifier: MIT
// Licensed under the MIT License;
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://github.com/mintlayer/mintlayer-core/blob/master/LICENSE
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Logging initialization and re-exports, so that the rest of the workspace
//! can write `use logging::log;` without depending on a concrete backend.

pub use log;

use std::sync::Once;

static INITIALIZE_LOGGING_ONCE: Once = Once::new();

/// Initialize the logging backend from the environment (`RUST_LOG`),
/// defaulting to the `info` level. Repeated calls are no-ops.
pub fn init_logging() {
    INITIALIZE_LOGGING_ONCE.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .init()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_initialization_is_harmless() {
        init_logging();
        init_logging();
        log::info!("logging initialized");
    }
}
