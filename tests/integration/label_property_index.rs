//! Label/property index lifecycle and revalidation.
//!
//! The first group drives the index directly against version lists so the
//! raw entry counts can be observed before and after each maintenance hook.
//! The second group goes through the database facade.

#![allow(missing_docs)]

use graphcore::index::{IndexState, LabelPropertyIndex, LabelPropertyKey};
use graphcore::mvcc::{VersionList, View};
use graphcore::storage::{PropertyValue, Vertex};
use graphcore::txn::Engine;
use graphcore::types::{Gid, GraphError, LabelId, PropertyId, Result};
use graphcore::{GraphDb, GraphDbOptions};

const LABEL: LabelId = LabelId(1);
const PROPERTY: PropertyId = PropertyId(2);

fn key() -> LabelPropertyKey {
    LabelPropertyKey::new(LABEL, PROPERTY)
}

fn ready_index() -> LabelPropertyIndex<Vertex> {
    let index = LabelPropertyIndex::new();
    assert!(index.create_index(key()));
    index.index_finished_building(key());
    index
}

#[test]
fn create_index_once() {
    let index = LabelPropertyIndex::<Vertex>::new();
    assert!(index.create_index(key()));
    assert!(!index.create_index(key()));
    assert_eq!(index.state(key()), Some(IndexState::Building));
    assert!(!index.index_exists(key()));
    index.index_finished_building(key());
    assert!(index.index_exists(key()));
    assert!(!index.create_index(key()));
}

#[test]
#[should_panic(expected = "index doesn't exist")]
fn count_on_unknown_key_is_fatal() {
    let index = LabelPropertyIndex::<Vertex>::new();
    index.count(key());
}

#[test]
#[should_panic(expected = "index not yet ready")]
fn count_while_building_is_fatal() {
    let index = LabelPropertyIndex::<Vertex>::new();
    index.create_index(key());
    index.count(key());
}

#[test]
#[should_panic(expected = "index doesn't exist")]
fn lookup_on_unknown_key_is_fatal() {
    let engine = Engine::default();
    let index = LabelPropertyIndex::<Vertex>::new();
    let tx = engine.begin();
    index.get_vlists(key(), &tx, View::New);
}

#[test]
#[should_panic(expected = "index not yet ready")]
fn lookup_while_building_is_fatal() {
    let engine = Engine::default();
    let index = LabelPropertyIndex::<Vertex>::new();
    index.create_index(key());
    let tx = engine.begin();
    index.get_vlists(key(), &tx, View::New);
}

#[test]
#[should_panic(expected = "index not yet ready")]
fn value_lookup_while_building_is_fatal() {
    let engine = Engine::default();
    let index = LabelPropertyIndex::<Vertex>::new();
    index.create_index(key());
    let tx = engine.begin();
    index.get_vlists_with_value(key(), PropertyValue::Int(1), &tx, View::New);
}

#[test]
fn dropped_index_reports_unknown() {
    let index = ready_index();
    assert_eq!(index.all_keys(), vec![key()]);
    assert!(index.drop_index(key()));
    assert_eq!(index.state(key()), None);
    assert!(index.all_keys().is_empty());
    assert!(!index.drop_index(key()));
}

#[test]
fn update_hook_adds_entry() -> Result<()> {
    let engine = Engine::default();
    let index = ready_index();
    let t1 = engine.begin();
    let (vlist, record) = VersionList::new(&t1, Gid(0), Vertex::default());
    {
        let mut vertex = record.data_mut();
        vertex.add_label(LABEL);
        vertex.properties.set(PROPERTY, PropertyValue::Int(0));
    }
    assert_eq!(index.count(key()), 0);
    index.update_on_label_property(&vlist, &record);
    assert_eq!(index.count(key()), 1);

    index.update_on_label_property(&vlist, &record);
    index.update_on_label(LABEL, &vlist, &record);
    index.update_on_property(PROPERTY, &vlist, &record);
    assert_eq!(index.count(key()), 1);
    engine.commit(&t1)?;
    Ok(())
}

#[test]
fn cleared_label_is_filtered_but_counted() -> Result<()> {
    let engine = Engine::default();
    let index = ready_index();
    let t1 = engine.begin();
    let (vlist, record) = VersionList::new(&t1, Gid(0), Vertex::default());
    {
        let mut vertex = record.data_mut();
        vertex.add_label(LABEL);
        vertex.properties.set(PROPERTY, PropertyValue::Int(0));
    }
    index.update_on_label_property(&vlist, &record);
    record.data_mut().labels.clear();

    assert_eq!(index.count(key()), 1);
    assert_eq!(index.get_vlists(key(), &t1, View::New).count(), 0);
    assert_eq!(index.get_vlists(key(), &t1, View::New).candidate_count(), 1);

    engine.commit(&t1)?;
    let removed = index.refresh(&engine.gc_watermark(), engine.commit_log());
    assert_eq!(removed, 1);
    assert_eq!(index.count(key()), 0);
    Ok(())
}

#[test]
fn older_snapshot_sees_one_match() -> Result<()> {
    let engine = Engine::default();
    let index = ready_index();
    let t1 = engine.begin();
    let (vlist, record) = VersionList::new(&t1, Gid(0), Vertex::default());
    {
        let mut vertex = record.data_mut();
        vertex.add_label(LABEL);
        vertex.properties.set(PROPERTY, PropertyValue::Int(0));
    }
    index.update_on_label_property(&vlist, &record);
    engine.commit(&t1)?;

    let t2 = engine.begin();
    let newer = vlist.update(&t2)?;
    index.update_on_label_property(&vlist, &newer);
    assert_eq!(index.count(key()), 2);

    let t3 = engine.begin();
    let seen: Vec<_> = index.get_vlists(key(), &t3, View::New).iter().collect();
    assert_eq!(seen.len(), 1);
    assert!(std::sync::Arc::ptr_eq(&seen[0].1, &record));
    assert_eq!(index.get_vlists(key(), &t2, View::New).count(), 1);

    engine.commit(&t2)?;
    engine.commit(&t3)?;
    assert_eq!(index.refresh(&engine.gc_watermark(), engine.commit_log()), 1);
    assert_eq!(index.count(key()), 1);
    Ok(())
}

#[test]
fn value_lookup_revalidates_property() -> Result<()> {
    let engine = Engine::default();
    let index = ready_index();
    let t1 = engine.begin();
    let (vlist, record) = VersionList::new(&t1, Gid(7), Vertex::default());
    {
        let mut vertex = record.data_mut();
        vertex.add_label(LABEL);
        vertex.properties.set(PROPERTY, PropertyValue::Int(5));
    }
    index.update_on_label_property(&vlist, &record);

    let hits = |value: PropertyValue| index.get_vlists_with_value(key(), value, &t1, View::New).count();
    assert_eq!(hits(PropertyValue::Int(5)), 1);
    assert_eq!(hits(PropertyValue::Float(5.0)), 1);
    assert_eq!(hits(PropertyValue::Int(6)), 0);

    record.data_mut().properties.set(PROPERTY, PropertyValue::Int(6));
    assert_eq!(hits(PropertyValue::Int(5)), 0);
    assert_eq!(hits(PropertyValue::Int(6)), 1);
    engine.abort(&t1)?;
    Ok(())
}

#[test]
fn build_index_covers_existing_and_later_vertices() -> Result<()> {
    let db = GraphDb::new(GraphDbOptions::default());
    let person = db.label("Person");
    let age = db.property("age");

    let dba = db.access();
    for i in 0..5i64 {
        let v = dba.insert_vertex()?;
        v.add_label(person)?;
        if i % 2 == 0 {
            v.props_set(age, PropertyValue::Int(i))?;
        }
    }
    dba.commit()?;

    db.build_index(person, age)?;
    assert!(matches!(db.build_index(person, age), Err(GraphError::IndexExists)));
    let key = LabelPropertyKey::new(person, age);
    assert!(db.label_property_index().index_exists(key));
    assert_eq!(db.label_property_index().count(key), 3);

    let dba = db.access();
    let late = dba.insert_vertex()?;
    late.props_set(age, PropertyValue::Int(40))?;
    late.add_label(person)?;
    let late_gid = late.gid();
    drop(late);
    dba.commit()?;

    let dba = db.access();
    assert_eq!(dba.vertices_by_label_property(person, age, View::Old).len(), 4);
    let forty = dba.vertices_by_label_property_value(person, age, PropertyValue::Int(40), View::Old);
    assert_eq!(forty.len(), 1);
    assert_eq!(forty[0].gid(), late_gid);
    Ok(())
}

#[test]
fn facade_filters_erased_property_until_gc_prunes() -> Result<()> {
    let db = GraphDb::new(GraphDbOptions::default());
    let city = db.label("City");
    let name = db.property("name");
    db.build_index(city, name)?;
    let key = LabelPropertyKey::new(city, name);

    let dba = db.access();
    let v = dba.insert_vertex()?;
    v.add_label(city)?;
    v.props_set(name, "Split".into())?;
    let gid = v.gid();
    drop(v);
    dba.commit()?;

    let dba = db.access();
    let v = dba
        .find_vertex(gid, View::Old)
        .ok_or(GraphError::NotFound("vertex"))?;
    v.props_erase(name)?;
    drop(v);
    dba.commit()?;

    let dba = db.access();
    assert!(dba.vertices_by_label_property(city, name, View::Old).is_empty());
    assert_eq!(db.label_property_index().count(key), 1);
    dba.commit()?;

    let stats = db.collect_garbage();
    assert!(stats.index_entries_removed >= 1);
    assert_eq!(db.label_property_index().count(key), 0);
    Ok(())
}

#[test]
fn unindexed_key_falls_back_to_scan() -> Result<()> {
    let db = GraphDb::new(GraphDbOptions::default());
    let dba = db.access();
    let tag = dba.label("Tag");
    let weight = dba.property("weight");
    let v = dba.insert_vertex()?;
    v.add_label(tag)?;
    v.props_set(weight, PropertyValue::Float(1.5))?;
    drop(v);
    dba.advance_command()?;
    assert_eq!(dba.vertices_by_label_property(tag, weight, View::Old).len(), 1);
    assert_eq!(
        dba.vertices_by_label_property_value(tag, weight, PropertyValue::Float(1.5), View::New)
            .len(),
        1
    );
    assert!(!db.label_property_index().index_exists(LabelPropertyKey::new(tag, weight)));
    dba.abort()?;
    Ok(())
}
