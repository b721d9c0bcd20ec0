// SPDX-License-Identifier: MIT

//! Command handlers: the C8 layer that turns a decoded [`portacode_wire::CommandFrame`]
//! into a response, by driving the subsystem crates (automation, ingress,
//! tunnel, provisioner) behind a uniform dispatch shape (spec.md §4.2).

mod automation;
mod context;
mod diff;
mod error;
mod fsops;
mod ingress;
mod provisioner;
mod registry;
mod status;
#[cfg(test)]
mod tests_support;
mod traits;
mod tunnel;
mod terminal;

pub use context::{
    AlwaysConnected, ConnectionStatus, HandlerContext, NoOutbound, OutboundSink, ProcessControl, ProvisionerContext, RealProcess,
};
pub use error::{classify, to_json, HandlersError};
pub use registry::{build_registry, command_name};
pub use traits::{AsyncHandler, HandlerResponse, RegisteredHandler, SyncHandler};
pub use terminal::TerminalRegistry;

pub use automation::{AutomationV2CancelHandler, AutomationV2StartHandler, AutomationV2StateHandler};
pub use diff::{apply_unified_diff, ApplyDiffHandler};
pub use fsops::{FsListHandler, FsReadHandler, FsWriteHandler};
pub use ingress::{ConfigureCloudflareForwardingHandler, ConfigureProxmoxContainerExposePortsHandler};
pub use provisioner::{CreateProxmoxContainerHandler, SetupProxmoxInfraHandler};
pub use status::{StatusHandler, UpdatePortacodeCliHandler};
pub use terminal::{TerminalCloseHandler, TerminalInputHandler, TerminalOpenHandler};
pub use tunnel::SetupCloudflareTunnelHandler;
