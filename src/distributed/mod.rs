//! Collaborator used when entities live on other workers.
//!
//! Remote versions arrive over [`slk`] segment streams, are cached per
//! transaction in the [`RemoteDataManager`], and are dropped when the
//! transaction advances its command, ends, or falls below the GC watermark.

mod pull;
mod remote_data;
pub mod slk;

pub use pull::{
    RemoteElement, RemotePath, RemotePullClients, RemotePullData, RemotePullRequest,
    RemotePullState, WorkerClient,
};
pub use remote_data::{RemoteCache, RemoteDataManager};
