//! C-side server configuration record.

use std::os::raw::c_char;
use std::path::PathBuf;

use tether_engine::{Endpoint, ServerConfig};

use crate::opt_str;
use crate::status::TetherStatus;

/// Start-time configuration passed to `tether_start_server`.
///
/// Every string field is a nullable NUL-terminated UTF-8 string; null and
/// empty both mean "unset". The strings only need to live for the duration
/// of the start call.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct TetherServerConfig {
    /// Application storage directory.
    pub storage_path: *const c_char,
    /// Cache directory.
    pub cache_path: *const c_char,
    /// Local socket path for the engine endpoint.
    pub engine_socket_path: *const c_char,
    /// TCP port for the engine endpoint, as decimal text.
    pub engine_tcp_port: *const c_char,
    /// Local socket path for the view endpoint.
    pub view_socket_path: *const c_char,
    /// TCP port for the view endpoint, as decimal text.
    pub view_tcp_port: *const c_char,
    /// Backend authentication token.
    pub token: *const c_char,
    /// 1 to enable the cache façade; anything else disables it.
    pub enable_cache: i32,
    /// Stream idle timeout in milliseconds; `<= 0` disables it.
    pub stream_timeout_ms: i64,
}

impl Default for TetherServerConfig {
    fn default() -> Self {
        Self {
            storage_path: std::ptr::null(),
            cache_path: std::ptr::null(),
            engine_socket_path: std::ptr::null(),
            engine_tcp_port: std::ptr::null(),
            view_socket_path: std::ptr::null(),
            view_tcp_port: std::ptr::null(),
            token: std::ptr::null(),
            enable_cache: 0,
            stream_timeout_ms: 0,
        }
    }
}

fn opt_path(p: *const c_char) -> Result<Option<PathBuf>, TetherStatus> {
    Ok(opt_str(p)?.map(PathBuf::from))
}

fn opt_string(p: *const c_char) -> Result<Option<String>, TetherStatus> {
    Ok(opt_str(p)?.map(str::to_string))
}

impl TetherServerConfig {
    /// Copy into an owned [`ServerConfig`]. Invalid UTF-8 in any string is
    /// `InvalidArgument`. Range checks happen later, in `validate()`.
    pub fn to_server_config(&self) -> Result<ServerConfig, TetherStatus> {
        let config = ServerConfig {
            storage_path: opt_path(self.storage_path)?,
            cache_path: opt_path(self.cache_path)?,
            engine: Endpoint {
                socket_path: opt_path(self.engine_socket_path)?,
                tcp_port: opt_string(self.engine_tcp_port)?,
            },
            view: Endpoint {
                socket_path: opt_path(self.view_socket_path)?,
                tcp_port: opt_string(self.view_tcp_port)?,
            },
            token: opt_string(self.token)?,
            enable_cache: self.enable_cache == 1,
            ..ServerConfig::default()
        };
        Ok(config.with_stream_timeout_ms(self.stream_timeout_ms))
    }
}
