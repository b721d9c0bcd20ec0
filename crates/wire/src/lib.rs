// SPDX-License-Identifier: MIT

//! Wire protocol: JSON command frames inbound from the gateway, and
//! response/event frames outbound. Depends only on `portacode-core` so
//! every domain crate can convert wire DTOs into its own types without a
//! dependency cycle.

mod command;
mod envelope;
mod event;

pub use command::{
    ApplyDiffPayload, AutomationCancelPayload, AutomationStartPayload, AutomationStatePayload,
    CommandFrame, ConfigureForwardingPayload, CreateContainerPayload, ExposePortsPayload,
    ForwardingRuleDto, FsListPayload, FsReadPayload, FsWritePayload, RawStep, SetupInfraPayload,
    SetupTunnelPayload, StatusPayload, TerminalClosePayload, TerminalInputPayload,
    TerminalOpenPayload, UpdateCliPayload,
};
pub use envelope::{parse_request_id, CommandEnvelope, WireError};
pub use event::{EventFrame, EventPayload};
