pub mod discovery;
pub mod exec;
pub mod invoker;
pub mod probe;
pub mod reconciler;
pub mod registry;
pub mod translator;

pub use discovery::{Discover, DiscoveryClient};
pub use exec::ActionExecutor;
pub use invoker::ScriptInvoker;
pub use registry::{RegistryEvent, RouterRegistry};
