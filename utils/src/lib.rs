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

pub mod tap_error_log;

/// Return an error from the enclosing function if the condition does not hold.
///
/// The error expression is converted with `Into`, so variants of nested
/// error enums can be passed directly.
#[macro_export]
macro_rules! ensure {
    ($condition:expr, $err:expr $(,)?) => {
        if !($condition) {
            return Err($err.into());
        }
    };
}
