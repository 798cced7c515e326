//! Concrete capability adapters wired in by the binary.

mod hook;
mod process;
mod ssh;
mod webhook;

pub use hook::HookCompute;
pub use process::run_bounded;
pub use ssh::SshExec;
pub use webhook::WebhookNotifier;
