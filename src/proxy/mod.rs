pub mod client;
pub mod interceptor;
pub mod jsonrpc;
pub mod transport;

pub use client::RpcToolClient;
pub use interceptor::ProxyInterceptor;
pub use transport::{
    channel_pair, ChannelTransport, StdioServerTransport, StdioTransport, Transport,
};
