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

use logging::log;

/// Tap into a `Result`, logging the error case and passing the value
/// through unchanged.
pub trait LogError: Sized {
    /// Log the error at the `error` level.
    fn log_err(self) -> Self;

    /// Log the error at the `error` level with a prefix.
    fn log_err_pfx(self, prefix: &str) -> Self;
}

impl<T, E: std::fmt::Display> LogError for Result<T, E> {
    fn log_err(self) -> Self {
        if let Err(err) = &self {
            log::error!("{err}");
        }
        self
    }

    fn log_err_pfx(self, prefix: &str) -> Self {
        if let Err(err) = &self {
            log::error!("{prefix}: {err}");
        }
        self
    }
}
