//! Upstream connection resolution and endpoint building for s3proxy.

pub mod config;
pub mod connection;
pub mod facade;

pub use config::{
    RemoteConfig, RemoteConnectionProviderKind, build_connection_provider, build_global_facade,
};
pub use connection::{
    CredentialsRemoteS3ConnectionProvider, DelegatingRemoteS3ConnectionProvider,
    FileRemoteS3ConnectionProvider, RemoteS3Connection, RemoteS3ConnectionProvider,
    StaticRemoteS3ConnectionProvider,
};
pub use facade::{
    PathStyleRemoteS3Facade, RemoteS3Facade, RemoteS3FacadeConfiguration, RemoteS3FacadeStyle,
    VirtualHostStyleRemoteS3Facade, build_remote_s3_facade,
};
