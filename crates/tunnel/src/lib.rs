// SPDX-License-Identifier: MIT

//! Edge tunnel lifecycle (spec.md §4.7, C9): install the edge CLI, drive
//! the interactive login flow, ensure the named tunnel and its
//! credentials exist, and install it as a supervised service.

mod error;
mod login;
mod setup;
mod sink;
mod state;

pub use error::TunnelError;
pub use login::{poll_cert_file, scrape_login_url};
pub use setup::{TunnelSetup, TunnelSetupRequest};
pub use sink::{NoTunnelEvents, TunnelEventSink};
pub use state::{
    credentials_path_for_tunnel, default_cert_path, default_config_path, tunnel_name_for_device, TunnelState,
};
