use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{Edge, PropertyValue, Vertex};
use crate::types::{GraphError, Gid, Result, TxId};

use super::remote_data::RemoteDataManager;
use super::slk::{check_stream_complete, Builder, Reader, SlkError, StreamStatus};

/// Outcome of a remote pull as reported by the producing worker.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemotePullState {
    /// More frames are available.
    CursorInProgress,
    /// The remote cursor produced every frame.
    CursorExhausted,
    /// Write-write conflict on the worker.
    SerializationError,
    /// Lock wait timed out on the worker.
    LockTimeoutError,
    /// Update of a record deleted in the same transaction.
    UpdateDeletedError,
    /// A transferred version could not be resolved.
    ReconstructionError,
    /// Removal of a vertex that still has edges.
    UnableToDeleteVertexError,
    /// Any other query failure.
    QueryError,
}

impl RemotePullState {
    /// Returns `true` for states that end the pull with an error.
    pub fn is_error(self) -> bool {
        !matches!(
            self,
            RemotePullState::CursorInProgress | RemotePullState::CursorExhausted
        )
    }

    /// Converts an error state back into the local error for `tx`.
    pub fn check(self, tx: TxId) -> Result<()> {
        match self {
            RemotePullState::CursorInProgress | RemotePullState::CursorExhausted => Ok(()),
            RemotePullState::SerializationError => Err(GraphError::Serialization { tx }),
            RemotePullState::LockTimeoutError => Err(GraphError::LockTimeout { tx }),
            RemotePullState::UpdateDeletedError => Err(GraphError::RecordDeleted),
            RemotePullState::ReconstructionError => {
                Err(GraphError::Reconstruction("remote worker failed to reconstruct".into()))
            }
            RemotePullState::UnableToDeleteVertexError => {
                Err(GraphError::Invalid("remote worker could not delete a vertex with edges"))
            }
            RemotePullState::QueryError => Err(GraphError::Invalid("remote query failed")),
        }
    }
}

impl From<&GraphError> for RemotePullState {
    fn from(err: &GraphError) -> Self {
        match err {
            GraphError::Serialization { .. } => RemotePullState::SerializationError,
            GraphError::LockTimeout { .. } => RemotePullState::LockTimeoutError,
            GraphError::RecordDeleted => RemotePullState::UpdateDeletedError,
            GraphError::Reconstruction(_) => RemotePullState::ReconstructionError,
            GraphError::VertexHasEdges(_) => RemotePullState::UnableToDeleteVertexError,
            _ => RemotePullState::QueryError,
        }
    }
}

/// Old and new versions of one transferred entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteElement<T> {
    /// Global id on the owning worker.
    pub gid: Gid,
    /// Version visible before the current command.
    pub old: Option<T>,
    /// Version including the current command's writes.
    pub new: Option<T>,
}

/// Alternating vertices and edges; `vertices` has one more element.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemotePath {
    /// Path vertices in order.
    pub vertices: Vec<RemoteElement<Vertex>>,
    /// Path edges in order.
    pub edges: Vec<RemoteElement<Edge>>,
}

/// One batch returned by a remote pull.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemotePullData {
    /// Cursor state after producing this batch.
    pub pull_state: RemotePullState,
    /// Result frames.
    pub frames: Vec<Vec<PropertyValue>>,
    /// Vertices referenced by the frames.
    pub vertices: Vec<RemoteElement<Vertex>>,
    /// Edges referenced by the frames.
    pub edges: Vec<RemoteElement<Edge>>,
    /// Paths referenced by the frames.
    pub paths: Vec<RemotePath>,
}

impl RemotePullData {
    /// Empty batch in `state`.
    pub fn new(pull_state: RemotePullState) -> Self {
        Self {
            pull_state,
            frames: Vec::new(),
            vertices: Vec::new(),
            edges: Vec::new(),
            paths: Vec::new(),
        }
    }

    /// Encodes as a length-prefixed JSON document inside a segment stream.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        let mut out = Vec::with_capacity(json.len() + 16);
        let mut builder = Builder::new(|segment: &[u8], _| out.extend_from_slice(segment));
        builder.save(&(json.len() as u64).to_le_bytes());
        builder.save(&json);
        builder.finalize()?;
        Ok(out)
    }

    /// Decodes a complete stream produced by [`RemotePullData::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let info = check_stream_complete(bytes);
        if info.status != StreamStatus::Complete {
            return Err(SlkError::Incomplete.into());
        }
        let mut reader = Reader::new(&bytes[..info.stream_size]);
        let mut len = [0u8; 8];
        reader.load(&mut len)?;
        let len = usize::try_from(u64::from_le_bytes(len))
            .map_err(|_| GraphError::Corruption("remote pull payload too large"))?;
        if len > info.encoded_data_size {
            return Err(SlkError::NotEnoughData.into());
        }
        let mut json = vec![0u8; len];
        reader.load(&mut json)?;
        reader.finalize()?;
        Ok(serde_json::from_slice(&json)?)
    }

    /// Copies every transferred version into the caches of `tx`.
    pub fn cache_into(&self, remote: &RemoteDataManager, tx: TxId) {
        for v in self.vertices.iter().chain(self.paths.iter().flat_map(|p| &p.vertices)) {
            remote.vertices().emplace(tx, v.gid, v.old.clone(), v.new.clone());
        }
        for e in self.edges.iter().chain(self.paths.iter().flat_map(|p| &p.edges)) {
            remote.edges().emplace(tx, e.gid, e.old.clone(), e.new.clone());
        }
    }
}

/// Parameters of a pull request sent to a worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePullRequest {
    /// Requesting transaction.
    pub tx_id: TxId,
    /// Its snapshot of active transactions.
    pub snapshot: Vec<TxId>,
    /// Plan the worker executes.
    pub plan_id: i64,
    /// Frames per batch.
    pub batch_size: usize,
    /// Whether the worker runs its cursor to completion before replying.
    pub accumulate: bool,
}

/// Blocking transport to one worker.
pub trait WorkerClient: Send + Sync + 'static {
    /// Sends a pull and returns the encoded [`RemotePullData`] stream.
    fn remote_pull(&self, request: &RemotePullRequest) -> Result<Vec<u8>>;

    /// Tells the worker that `tx_id` advanced its command.
    fn command_advanced(&self, tx_id: TxId) -> Result<()>;
}

/// Issues pulls to a set of workers without blocking the caller.
///
/// Transport calls run on tokio's blocking pool; the returned futures resolve
/// once the reply is decoded and its versions are cached.
pub struct RemotePullClients<C: WorkerClient> {
    workers: Vec<Arc<C>>,
    remote: Arc<RemoteDataManager>,
}

impl<C: WorkerClient> RemotePullClients<C> {
    /// Clients indexed by worker id, caching into `remote`.
    pub fn new(workers: Vec<Arc<C>>, remote: Arc<RemoteDataManager>) -> Self {
        Self { workers, remote }
    }

    /// Number of workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Pulls one batch from `worker_id`.
    pub fn remote_pull(
        &self,
        worker_id: usize,
        request: RemotePullRequest,
    ) -> impl Future<Output = Result<RemotePullData>> + Send + 'static {
        let client = self.workers.get(worker_id).cloned();
        let remote = Arc::clone(&self.remote);
        async move {
            let client = client.ok_or(GraphError::NotFound("worker"))?;
            let tx = request.tx_id;
            let data = tokio::task::spawn_blocking(move || {
                let bytes = client.remote_pull(&request)?;
                RemotePullData::decode(&bytes)
            })
            .await
            .map_err(|err| GraphError::Reconstruction(format!("remote pull task failed: {err}")))??;
            data.cache_into(&remote, tx);
            debug!(
                worker_id,
                tx,
                frames = data.frames.len(),
                state = ?data.pull_state,
                "distributed.pull.completed"
            );
            Ok(data)
        }
    }

    /// Clears the local cache of `tx_id` and notifies every worker.
    pub fn notify_command_advanced(
        &self,
        tx_id: TxId,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        self.remote.clear_cache_for_single_transaction(tx_id);
        let workers = self.workers.clone();
        async move {
            let handles: Vec<_> = workers
                .into_iter()
                .map(|client| tokio::task::spawn_blocking(move || client.command_advanced(tx_id)))
                .collect();
            for (worker_id, handle) in handles.into_iter().enumerate() {
                let outcome = handle.await.map_err(|err| {
                    GraphError::Reconstruction(format!("command advance task failed: {err}"))
                })?;
                if let Err(err) = outcome {
                    warn!(worker_id, tx_id, error = %err, "distributed.command_advanced.failed");
                    return Err(err);
                }
            }
            Ok(())
        }
    }
}
