// Copyright 2025 eraflo
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

//! Logging bootstrap for binaries and integration tests.

use std::sync::Once;

use env_logger::{Builder, Env};

static INIT: Once = Once::new();

/// Installs `env_logger` as the `log` backend, filtered by `RUST_LOG` and
/// defaulting to `info`.
///
/// Calling it more than once is harmless, which lets every integration test
/// call it from its own setup.
pub fn init() {
    INIT.call_once(|| {
        let result = Builder::from_env(Env::default().default_filter_or("info"))
            .format_timestamp_millis()
            .is_test(cfg!(test))
            .try_init();
        if result.is_err() {
            log::debug!("A logger was already installed; keeping it");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
        log::info!("logging initialized twice");
    }
}
