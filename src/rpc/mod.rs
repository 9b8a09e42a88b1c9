pub mod pool;
pub mod provider;

pub use pool::{Endpoint, EndpointId, EndpointPool, EndpointStatus, PoolError};
pub use provider::{EthersRpcProvider, ProviderError, RpcProvider};
