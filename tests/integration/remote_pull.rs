#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use graphcore::distributed::{
    RemoteElement, RemotePath, RemotePullClients, RemotePullData, RemotePullRequest,
    RemotePullState, WorkerClient,
};
use graphcore::storage::{Edge, Vertex};
use graphcore::{
    EdgeTypeId, Gid, GraphDb, GraphDbOptions, GraphError, LabelId, PropertyValue, Result, TxId,
    View,
};

/// Worker that answers every pull with a fixed batch.
struct FixedWorker {
    reply: RemotePullData,
    requests: Mutex<Vec<RemotePullRequest>>,
    advanced: AtomicUsize,
    fail_advance: bool,
}

impl FixedWorker {
    fn new(reply: RemotePullData) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
            advanced: AtomicUsize::new(0),
            fail_advance: false,
        })
    }
}

impl WorkerClient for FixedWorker {
    fn remote_pull(&self, request: &RemotePullRequest) -> Result<Vec<u8>> {
        self.requests.lock().push(request.clone());
        self.reply.encode()
    }

    fn command_advanced(&self, _tx_id: TxId) -> Result<()> {
        self.advanced.fetch_add(1, Ordering::SeqCst);
        if self.fail_advance {
            return Err(GraphError::Invalid("worker unreachable"));
        }
        Ok(())
    }
}

fn labelled(label: u32) -> Vertex {
    let mut vertex = Vertex::default();
    vertex.add_label(LabelId(label));
    vertex
}

fn batch() -> RemotePullData {
    let mut data = RemotePullData::new(RemotePullState::CursorExhausted);
    data.frames.push(vec![PropertyValue::Int(1), PropertyValue::from("a")]);
    data.vertices.push(RemoteElement {
        gid: Gid(10),
        old: Some(labelled(1)),
        new: Some(labelled(2)),
    });
    data.edges.push(RemoteElement {
        gid: Gid(20),
        old: None,
        new: Some(Edge::new(Gid(10), Gid(11), EdgeTypeId(0))),
    });
    data.paths.push(RemotePath {
        vertices: vec![
            RemoteElement {
                gid: Gid(10),
                old: Some(labelled(9)),
                new: None,
            },
            RemoteElement {
                gid: Gid(11),
                old: Some(labelled(3)),
                new: Some(labelled(3)),
            },
        ],
        edges: vec![RemoteElement {
            gid: Gid(20),
            old: None,
            new: None,
        }],
    });
    data
}

fn request(tx_id: TxId, snapshot: Vec<TxId>) -> RemotePullRequest {
    RemotePullRequest {
        tx_id,
        snapshot,
        plan_id: 7,
        batch_size: 16,
        accumulate: false,
    }
}

#[tokio::test]
async fn pulled_versions_are_cached_for_the_transaction() -> Result<()> {
    let db = GraphDb::new(GraphDbOptions::default());
    let worker = FixedWorker::new(batch());
    let clients = RemotePullClients::new(vec![Arc::clone(&worker)], Arc::clone(db.remote_data()));
    assert_eq!(clients.worker_count(), 1);

    let dba = db.access();
    let tx = dba.transaction().id();
    let snapshot: Vec<TxId> = dba.transaction().snapshot().iter().collect();
    let data = clients.remote_pull(0, request(tx, snapshot.clone())).await?;
    assert_eq!(data, batch());
    assert_eq!(worker.requests.lock().as_slice(), &[request(tx, snapshot)]);

    let remote = db.remote_data();
    assert_eq!(remote.vertices().len_for(tx), 2);
    let old = remote.vertices().find(tx, Gid(10), View::Old)?;
    assert!(old.has_label(LabelId(1)));
    let new = remote.vertices().find(tx, Gid(10), View::New)?;
    assert!(new.has_label(LabelId(2)));
    let edge = remote.edges().find(tx, Gid(20), View::New)?;
    assert_eq!(edge.to, Gid(11));
    assert!(matches!(
        remote.edges().find(tx, Gid(20), View::Old),
        Err(GraphError::Reconstruction(_))
    ));
    assert!(!remote.vertices().contains(tx + 1, Gid(10)));

    dba.advance_command()?;
    assert_eq!(remote.vertices().len_for(tx), 0);
    dba.abort()?;
    Ok(())
}

#[tokio::test]
async fn unknown_worker_is_not_found() {
    let db = GraphDb::new(GraphDbOptions::default());
    let clients = RemotePullClients::new(vec![FixedWorker::new(batch())], Arc::clone(db.remote_data()));
    let outcome = clients.remote_pull(3, request(1, Vec::new())).await;
    assert!(matches!(outcome, Err(GraphError::NotFound("worker"))));
}

#[tokio::test]
async fn error_state_surfaces_as_local_error() -> Result<()> {
    let db = GraphDb::new(GraphDbOptions::default());
    let reply = RemotePullData::new(RemotePullState::from(&GraphError::LockTimeout { tx: 5 }));
    let clients = RemotePullClients::new(vec![FixedWorker::new(reply)], Arc::clone(db.remote_data()));

    let data = clients.remote_pull(0, request(5, Vec::new())).await?;
    assert!(data.pull_state.is_error());
    let err = data.pull_state.check(5).err();
    assert!(matches!(err, Some(GraphError::LockTimeout { tx: 5 })));
    assert!(err.is_some_and(|e| e.is_retryable()));
    Ok(())
}

#[tokio::test]
async fn command_advance_reaches_every_worker() -> Result<()> {
    let db = GraphDb::new(GraphDbOptions::default());
    let workers = vec![FixedWorker::new(batch()), FixedWorker::new(batch())];
    let clients = RemotePullClients::new(workers.clone(), Arc::clone(db.remote_data()));

    clients.remote_pull(1, request(4, Vec::new())).await?;
    assert_eq!(db.remote_data().vertices().len_for(4), 2);

    let advanced = clients.notify_command_advanced(4);
    assert_eq!(db.remote_data().vertices().len_for(4), 0);
    advanced.await?;
    for worker in &workers {
        assert_eq!(worker.advanced.load(Ordering::SeqCst), 1);
    }
    Ok(())
}

#[tokio::test]
async fn failed_command_advance_is_reported() {
    let db = GraphDb::new(GraphDbOptions::default());
    let failing = Arc::new(FixedWorker {
        reply: batch(),
        requests: Mutex::new(Vec::new()),
        advanced: AtomicUsize::new(0),
        fail_advance: true,
    });
    let clients = RemotePullClients::new(vec![failing], Arc::clone(db.remote_data()));
    let outcome = clients.notify_command_advanced(2).await;
    assert!(matches!(outcome, Err(GraphError::Invalid("worker unreachable"))));
}

#[tokio::test]
async fn gc_evicts_caches_of_finished_transactions() -> Result<()> {
    let db = GraphDb::new(GraphDbOptions::default());
    let clients = RemotePullClients::new(vec![FixedWorker::new(batch())], Arc::clone(db.remote_data()));

    let dba = db.access();
    let tx = dba.transaction().id();
    clients.remote_pull(0, request(tx, Vec::new())).await?;
    dba.commit()?;
    // Cache entries of a finished transaction linger until a GC cycle.
    clients.remote_pull(0, request(tx, Vec::new())).await?;
    assert_eq!(db.remote_data().vertices().len_for(tx), 2);

    db.collect_garbage();
    assert_eq!(db.remote_data().vertices().len_for(tx), 0);
    Ok(())
}
