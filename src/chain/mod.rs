pub mod registry;
pub mod rpc;

pub use registry::{ChainConfig, ChainRegistry, RegistryError};
pub use rpc::{EvmRpcClient, RpcClientError};
