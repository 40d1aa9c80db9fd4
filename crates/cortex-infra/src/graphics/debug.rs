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

//! The debug layer shared by every device: validation messages the
//! application drains after each frame.

use cortex_core::renderer::api::{DebugMessage, DebugSeverity};
use parking_lot::Mutex;

/// Collects validation messages until the application drains them.
#[derive(Debug)]
pub(crate) struct DebugLayer {
    enabled: bool,
    messages: Mutex<Vec<DebugMessage>>,
}

impl DebugLayer {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Records a validation error. Ignored when validation is off.
    pub fn error(&self, text: impl Into<String>) {
        self.push(DebugSeverity::Error, text.into());
    }

    /// Records a validation warning. Ignored when validation is off.
    pub fn warning(&self, text: impl Into<String>) {
        self.push(DebugSeverity::Warning, text.into());
    }

    fn push(&self, severity: DebugSeverity, text: String) {
        if !self.enabled {
            return;
        }
        match severity {
            DebugSeverity::Error => log::error!("[validation] {text}"),
            DebugSeverity::Warning => log::warn!("[validation] {text}"),
            DebugSeverity::Info => log::debug!("[validation] {text}"),
        }
        self.messages.lock().push(DebugMessage { severity, text });
    }

    pub fn take(&self) -> Vec<DebugMessage> {
        std::mem::take(&mut *self.messages.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_layer_records_nothing() {
        let layer = DebugLayer::new(false);
        layer.error("ignored");
        assert!(layer.take().is_empty());
    }

    #[test]
    fn test_take_drains_messages() {
        let layer = DebugLayer::new(true);
        layer.error("bad barrier");
        layer.warning("odd state");
        let messages = layer.take();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_error());
        assert!(layer.take().is_empty());
    }
}
