//! sudo-manager: structured management of /etc/sudoers.d
//!
//! Backend for a sudo rule administration UI. The UI is a thin form-to-JSON
//! client; everything that can brick privileged access on the host lives
//! here: catalog loading and policy filtering, rule parsing and
//! reconstruction, alias compilation, template rendering, and atomic
//! syntax-checked writes.

pub mod policy;

pub use policy::{dispatch, ManagerConfig, ManagerError, PolicyResult};
