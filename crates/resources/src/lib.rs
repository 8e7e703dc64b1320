// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Exemplar resources built on `mgmt-core`/`mgmt-engine`: `file`, `svc`,
//! the composite `mount` and `cron`, the content-addressable `archive`,
//! `firewall`, and the `http:server`/`http:file` server-family pair.

pub mod archive;
pub mod cron;
pub mod file;
pub mod firewall;
pub mod http_file;
pub mod http_proto;
pub mod http_server;
pub mod mount;
pub mod reload;
pub mod svc;
pub mod unit_file;

pub use archive::{ArchiveConfig, ArchiveResource};
pub use cron::{CronConfig, CronResource};
pub use file::{FileConfig, FileContent, FileResource};
pub use firewall::{FirewallConfig, FirewallResource};
pub use http_file::{HttpFileConfig, HttpFileResource};
pub use http_proto::{HttpRequest, HttpResponse};
pub use http_server::{HttpServerConfig, HttpServerResource};
pub use mount::{MountConfig, MountResource};
pub use reload::DaemonReload;
pub use svc::{ServiceConfig, ServiceResource};
