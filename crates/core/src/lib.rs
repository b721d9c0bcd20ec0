// SPDX-License-Identifier: MIT

//! portacode-core: shared identifiers, clock, error taxonomy, and macros
//! used by every other crate in the agent workspace.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod clock;
pub mod error;
pub mod id;
pub mod macros;
pub mod session;
pub mod time_fmt;
pub mod truncate;

pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{ErrorKind, RouterError};
pub use id::new_id;
pub use session::ClientSession;
pub use time_fmt::format_utc_now;
pub use truncate::truncate_utf8;
