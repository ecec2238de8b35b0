#![allow(missing_docs)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use graphcore::durability::{self, SnapshotEntry};
use graphcore::{
    DurabilityCfg, GcCfg, Gid, GraphDb, GraphDbOptions, GraphError, LabelPropertyKey, PropertyValue,
    Result, View,
};
use tempfile::tempdir;

fn options(dir: &Path) -> GraphDbOptions {
    GraphDbOptions::default()
        .gc(GcCfg {
            enabled: false,
            interval: Duration::from_secs(3600),
        })
        .durability(DurabilityCfg {
            directory: dir.to_path_buf(),
            ..DurabilityCfg::default()
        })
}

struct Fixture {
    alice: Gid,
    bob: Gid,
    removed: Gid,
    knows: Gid,
}

fn populate(db: &GraphDb) -> Result<Fixture> {
    let person = db.label("Person");
    let admin = db.label("Admin");
    let name = db.property("name");
    let since = db.property("since");
    let knows_type = db.edge_type("KNOWS");

    let dba = db.access();
    let alice = dba.insert_vertex()?;
    alice.add_label(person)?;
    alice.add_label(admin)?;
    alice.props_set(name, "alice".into())?;
    let bob = dba.insert_vertex()?;
    bob.add_label(person)?;
    bob.props_set(name, "bob".into())?;
    let doomed = dba.insert_vertex()?;
    doomed.add_label(person)?;
    let knows = dba.insert_edge(&alice, &bob, knows_type)?;
    knows.props_set(since, PropertyValue::Int(2019))?;
    let fixture = Fixture {
        alice: alice.gid(),
        bob: bob.gid(),
        removed: doomed.gid(),
        knows: knows.gid(),
    };
    drop((alice, bob, doomed, knows));
    dba.commit()?;

    let dba = db.access();
    let doomed = dba
        .find_vertex(fixture.removed, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    dba.remove_vertex(&doomed)?;
    drop(doomed);
    dba.commit()?;

    db.build_index(person, name)?;
    Ok(fixture)
}

#[test]
fn snapshot_restores_graph_into_fresh_database() -> Result<()> {
    let dir = tempdir()?;
    let source = GraphDb::new(options(dir.path()));
    let fixture = populate(&source)?;
    let path = source.make_snapshot()?;
    let snapshot_tx = source.engine().count();

    let target = GraphDb::new(options(dir.path()));
    // Different id assignment order than the source.
    let unrelated = target.label("Unrelated");
    let recovered = durability::recover(&target, &path)?;
    assert_eq!(recovered.vertices, 2);
    assert_eq!(recovered.edges, 1);
    assert!(target.engine().count() >= snapshot_tx);

    let person = target.label("Person");
    let admin = target.label("Admin");
    let name = target.property("name");
    let since = target.property("since");
    assert_ne!(person, unrelated);
    assert_eq!(recovered.indexes, vec![LabelPropertyKey::new(person, name)]);

    let dba = target.access();
    assert!(dba.transaction().id() > recovered.snapshot_tx_id);
    assert!(dba.find_vertex(fixture.removed, View::Old).is_none());

    let alice = dba
        .find_vertex(fixture.alice, View::Old)
        .ok_or(GraphError::NotFound("alice"))?;
    let mut labels = alice.labels()?;
    labels.sort();
    let mut expected = vec![person, admin];
    expected.sort();
    assert_eq!(labels, expected);
    assert_eq!(alice.props_at(name)?, PropertyValue::from("alice"));
    assert_eq!(alice.out_degree()?, 1);

    let knows = dba
        .find_edge(fixture.knows, View::Old)
        .ok_or(GraphError::NotFound("edge"))?;
    assert_eq!(knows.from()?, fixture.alice);
    assert_eq!(knows.to()?, fixture.bob);
    assert_eq!(knows.edge_type()?, target.edge_type("KNOWS"));
    assert_eq!(knows.props_at(since)?, PropertyValue::Int(2019));

    let key = LabelPropertyKey::new(person, name);
    assert!(target.label_property_index().index_exists(key));
    assert_eq!(target.label_property_index().count(key), 2);
    let bobs = dba.vertices_by_label_property_value(person, name, "bob".into(), View::Old);
    assert_eq!(bobs.len(), 1);
    assert_eq!(bobs[0].gid(), fixture.bob);
    drop((alice, knows, bobs));
    dba.commit()?;

    let dba = target.access();
    let fresh = dba.insert_vertex()?;
    assert!(fresh.gid() > fixture.removed);
    Ok(())
}

#[test]
fn uncommitted_writes_are_left_out() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::new(options(dir.path()));
    let pending = db.access();
    pending.insert_vertex()?;

    let path = db.make_snapshot()?;
    let entries: Vec<SnapshotEntry> = fs::read_to_string(&path)?
        .lines()
        .map(serde_json::from_str::<SnapshotEntry>)
        .collect::<std::result::Result<_, _>>()?;
    assert!(matches!(entries.first(), Some(SnapshotEntry::Header { .. })));
    assert_eq!(
        entries.last(),
        Some(&SnapshotEntry::Footer {
            vertices: 0,
            edges: 0
        })
    );
    pending.abort()?;
    Ok(())
}

#[test]
fn rotation_keeps_newest_snapshots() -> Result<()> {
    let dir = tempdir()?;
    let db = GraphDb::new(options(dir.path()));
    let mut written = Vec::new();
    for _ in 0..4 {
        written.push(durability::make_snapshot(&db, dir.path(), 2)?);
    }
    let kept = durability::list_snapshots(dir.path())?;
    assert_eq!(kept, written[2..].to_vec());
    assert_eq!(durability::latest_snapshot(dir.path())?, written.last().cloned());

    durability::make_snapshot(&db, dir.path(), 0)?;
    assert_eq!(durability::list_snapshots(dir.path())?.len(), 3);
    Ok(())
}

#[test]
fn missing_directory_has_no_snapshot() -> Result<()> {
    let dir = tempdir()?;
    assert_eq!(durability::latest_snapshot(&dir.path().join("absent"))?, None);
    assert_eq!(durability::latest_snapshot(dir.path())?, None);
    Ok(())
}

#[test]
fn truncated_snapshot_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let source = GraphDb::new(options(dir.path()));
    populate(&source)?;
    let path = source.make_snapshot()?;

    let contents = fs::read_to_string(&path)?;
    let mut lines: Vec<&str> = contents.lines().collect();
    lines.pop();
    let truncated = dir.path().join("truncated.jsonl");
    fs::write(&truncated, lines.join("\n"))?;

    let target = GraphDb::new(options(dir.path()));
    let err = durability::recover(&target, &truncated).err();
    assert!(matches!(err, Some(GraphError::Corruption(_))));
    // The failed replay's transaction is aborted.
    assert_eq!(target.access().vertices(View::Old).len(), 0);

    let empty = dir.path().join("empty.jsonl");
    fs::write(&empty, "")?;
    assert!(matches!(
        durability::recover(&target, &empty),
        Err(GraphError::Corruption(_))
    ));
    Ok(())
}

#[test]
fn footer_mismatch_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bad_footer.jsonl");
    let header = SnapshotEntry::Header {
        version: durability::SNAPSHOT_VERSION,
        tx_id: 3,
        labels: Vec::new(),
        properties: Vec::new(),
        edge_types: Vec::new(),
        next_vertex_gid: 0,
        next_edge_gid: 0,
    };
    let footer = SnapshotEntry::Footer {
        vertices: 1,
        edges: 0,
    };
    fs::write(
        &path,
        format!(
            "{}\n{}\n",
            serde_json::to_string(&header)?,
            serde_json::to_string(&footer)?
        ),
    )?;
    let db = GraphDb::new(options(dir.path()));
    assert!(matches!(
        durability::recover(&db, &path),
        Err(GraphError::Corruption(_))
    ));
    Ok(())
}

#[test]
fn open_recovers_snapshot_written_on_exit() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = options(dir.path());
    opts.durability.snapshot_on_exit = true;
    let fixture = {
        let db = GraphDb::open(opts.clone())?;
        populate(&db)?
    };
    assert!(durability::latest_snapshot(dir.path())?.is_some());

    opts.durability.snapshot_on_exit = false;
    opts.durability.recover_on_startup = true;
    let db: Arc<GraphDb> = GraphDb::open(opts)?;
    let dba = db.access();
    assert_eq!(dba.vertices(View::Old).len(), 2);
    assert_eq!(dba.edges(View::Old).len(), 1);
    let name = dba.property("name");
    let bob = dba
        .find_vertex(fixture.bob, View::Old)
        .ok_or(GraphError::NotFound("bob"))?;
    assert_eq!(bob.props_at(name)?, PropertyValue::from("bob"));
    assert_eq!(bob.in_degree()?, 1);
    Ok(())
}

#[test]
fn open_without_snapshot_starts_empty() -> Result<()> {
    let dir = tempdir()?;
    let mut opts = options(dir.path());
    opts.durability.recover_on_startup = true;
    let db = GraphDb::open(opts)?;
    assert_eq!(db.access().vertices(View::Old).len(), 0);
    Ok(())
}

#[test]
fn deleted_gids_are_not_reissued_after_recovery() -> Result<()> {
    let dir = tempdir()?;
    let source = GraphDb::new(options(dir.path()));
    let link = source.edge_type("LINK");
    let (kept, dropped_vertex, dropped_edge) = {
        let dba = source.access();
        let a = dba.insert_vertex()?;
        let b = dba.insert_vertex()?;
        let c = dba.insert_vertex()?;
        dba.insert_edge(&a, &b, link)?;
        let e = dba.insert_edge(&b, &c, link)?;
        let ids = (a.gid(), c.gid(), e.gid());
        drop((a, b, c, e));
        dba.commit()?;
        ids
    };
    {
        let dba = source.access();
        let c = dba
            .find_vertex(dropped_vertex, View::Old)
            .ok_or(GraphError::NotFound("vertex"))?;
        dba.detach_remove_vertex(&c)?;
        drop(c);
        dba.commit()?;
    }
    let path = source.make_snapshot()?;
    assert_eq!(source.gid_generators(), (Gid(3), Gid(2)));

    let target = GraphDb::new(options(dir.path()));
    let recovered = durability::recover(&target, &path)?;
    assert_eq!((recovered.vertices, recovered.edges), (2, 1));
    assert_eq!(target.gid_generators(), (Gid(3), Gid(2)));

    let dba = target.access();
    let a = dba
        .find_vertex(kept, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    let fresh = dba.insert_vertex()?;
    let edge = dba.insert_edge(&a, &fresh, target.edge_type("LINK"))?;
    assert!(fresh.gid() > dropped_vertex);
    assert!(edge.gid() > dropped_edge);
    Ok(())
}
