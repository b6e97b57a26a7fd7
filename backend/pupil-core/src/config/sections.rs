use crate::{
    DEFAULT_CONTROL_ADDRESS, DEFAULT_CONTROL_PORT, DEFAULT_FEED_PORT, DEFAULT_SUB_ADDRESS,
    PUPIL_HOSTNAME,
};

use std::time::Duration;

use const_format::concatcp;
use serde::{Deserialize, Serialize};

const DEFAULT_FEED_BIND: &str = concatcp!(PUPIL_HOSTNAME, ":", DEFAULT_FEED_PORT);
const DEFAULT_CONTROL_BIND: &str = concatcp!(PUPIL_HOSTNAME, ":", DEFAULT_CONTROL_PORT);

// ============================================
// SCRIPT SIDE
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    #[serde(default = "default_sub_address")]
    pub sub_address: String,

    #[serde(default = "default_control_address")]
    pub control_address: String,

    /// Identity stamped on this node's notifications; matching `source`
    /// fields are treated as echoes.
    #[serde(default = "default_recording_source")]
    pub recording_source: String,

    #[serde(default = "default_interface_session_name")]
    pub default_session_name: String,

    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,

    #[serde(default = "default_reconnect_max_interval_ms")]
    pub reconnect_max_interval_ms: u64,
}

impl InterfaceConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    pub fn reconnect_max_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_interval_ms)
    }
}

impl Default for InterfaceConfig {
    fn default() -> Self {
        Self {
            sub_address: default_sub_address(),
            control_address: default_control_address(),
            recording_source: default_recording_source(),
            default_session_name: default_interface_session_name(),
            close_timeout_ms: default_close_timeout_ms(),
            reconnect_max_interval_ms: default_reconnect_max_interval_ms(),
        }
    }
}

// ============================================
// HOST SIDE
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_feed_bind")]
    pub feed_bind: String,

    #[serde(default = "default_control_bind")]
    pub control_bind: String,

    /// Identity the dispatcher stamps on `should_*` notifications.
    #[serde(default = "default_identity")]
    pub identity: String,

    #[serde(default = "default_host_session_name")]
    pub default_session_name: String,

    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            feed_bind: default_feed_bind(),
            control_bind: default_control_bind(),
            identity: default_identity(),
            default_session_name: default_host_session_name(),
            bus_capacity: default_bus_capacity(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_sub_address() -> String {
    DEFAULT_SUB_ADDRESS.to_string()
}
fn default_control_address() -> String {
    DEFAULT_CONTROL_ADDRESS.to_string()
}
fn default_recording_source() -> String {
    "Pupil Interface".to_string()
}
fn default_interface_session_name() -> String {
    "Unnamed session".to_string()
}
fn default_close_timeout_ms() -> u64 {
    2000
}
fn default_reconnect_max_interval_ms() -> u64 {
    2000
}
fn default_feed_bind() -> String {
    DEFAULT_FEED_BIND.to_string()
}
fn default_control_bind() -> String {
    DEFAULT_CONTROL_BIND.to_string()
}
fn default_identity() -> String {
    "Script_Loader".to_string()
}
fn default_host_session_name() -> String {
    "Script_Loader_Session".to_string()
}
fn default_bus_capacity() -> usize {
    256
}
