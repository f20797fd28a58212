mod common;

use canopy_sync::{
    Entity, EntityHandler, EntitySchema, EventKind, Node, SetOptions, SyncError, SyncOptions,
    SyncState,
};
use common::{Recorder, SchemaOptions, fixture, fixture_with, log};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

// ── Construction ─────────────────────────────────────────────────

#[test]
fn defaults_fill_missing_attributes() {
    let schema = EntitySchema::new("reception")
        .with_default("staff", json!(1))
        .with_default("open", json!(true))
        .build();
    let reception = Entity::new(&schema, json!({"staff": 4})).unwrap();

    assert_eq!(reception.to_json(), json!({"staff": 4, "open": true}));
}

#[test]
fn null_constructs_an_empty_entity() {
    let schema = EntitySchema::new("bed").build();
    let bed = Entity::new(&schema, Value::Null).unwrap();
    assert_eq!(bed.to_json(), json!({}));
    assert!(bed.parent().is_none());
    assert!(bed.source().is_none());
}

#[test]
fn non_object_data_is_rejected() {
    let schema = EntitySchema::new("bed").build();
    let err = Entity::new(&schema, json!([1, 2])).unwrap_err();
    assert!(matches!(
        err,
        SyncError::Types(canopy_types::Error::UnexpectedShape {
            expected: "object",
            found: "array"
        })
    ));
    assert_eq!(err.to_string(), "expected object, found array");

    let bed = Entity::new(&schema, json!({})).unwrap();
    assert!(bed.set_many(json!("king")).is_err());
}

#[test]
fn related_defaults_reach_the_parent_without_events() {
    let f = fixture_with(SchemaOptions {
        reception: Some(EntitySchema::new("reception").with_default("staff", json!(3))),
        ..Default::default()
    });
    let recorder = Recorder::default();
    recorder.watch_collection("hotels", &f.hotels);

    let hotel = f.hotels.add(json!({"rooms": []})).unwrap();

    assert_eq!(hotel.to_json(), json!({"rooms": [], "reception": {"staff": 3}}));
    assert_eq!(f.hotels.to_json()[2], hotel.to_json());
    assert_eq!(recorder.events(), log(&[("hotels", "add")]));

    let reception = hotel.related_entity("reception").unwrap();
    let raw = hotel.get("reception").unwrap();
    assert!(reception.source().unwrap().ptr_eq(raw.as_object().unwrap()));
}

#[test]
fn present_data_wins_over_related_defaults() {
    let f = fixture_with(SchemaOptions {
        reception: Some(EntitySchema::new("reception").with_default("staff", json!(3))),
        ..Default::default()
    });
    let hotel = f.hotels.at(1).unwrap();
    assert_eq!(hotel.get_json("reception").unwrap(), json!({"staff": 2}));
}

// ── Attributes ───────────────────────────────────────────────────

#[test]
fn set_fires_field_events_then_change() {
    let schema = EntitySchema::new("room").build();
    let room = Entity::new(&schema, json!({"floor": 1})).unwrap();
    let recorder = Recorder::default();
    recorder.watch_entity("room", &room);

    room.set_many(json!({"floor": 2, "view": "sea"})).unwrap();

    assert_eq!(
        recorder.events(),
        log(&[("room", "change:floor"), ("room", "change:view"), ("room", "change")])
    );
}

#[test]
fn setting_an_equal_value_is_silent() {
    let schema = EntitySchema::new("room").build();
    let room = Entity::new(&schema, json!({"floor": 1, "tags": ["a"]})).unwrap();
    let recorder = Recorder::default();
    recorder.watch_entity("room", &room);

    room.set("floor", 1i64);
    room.set("tags", json!(["a"]));

    assert!(recorder.events().is_empty());
}

#[test]
fn silent_set_stores_without_events() {
    let schema = EntitySchema::new("room").build();
    let room = Entity::new(&schema, json!({})).unwrap();
    let recorder = Recorder::default();
    recorder.watch_entity("room", &room);

    room.set_with("floor", 3i64, SetOptions::silent());

    assert_eq!(room.get_json("floor"), Some(json!(3)));
    assert!(recorder.events().is_empty());
}

#[test]
fn unset_removes_and_reports_the_key() {
    let schema = EntitySchema::new("room").build();
    let room = Entity::new(&schema, json!({"floor": 1})).unwrap();
    let recorder = Recorder::default();
    recorder.watch_entity("room", &room);

    room.unset("floor");
    room.unset("missing");

    assert!(!room.has("floor"));
    assert_eq!(room.to_json(), json!({}));
    assert_eq!(recorder.events(), log(&[("room", "change:floor"), ("room", "change")]));
}

#[test]
fn has_treats_null_as_absent() {
    let schema = EntitySchema::new("room").build();
    let room = Entity::new(&schema, json!({"floor": null, "view": "sea"})).unwrap();
    assert!(!room.has("floor"));
    assert!(room.has("view"));
    assert!(!room.has("missing"));
}

#[test]
fn pointer_getters_read_nested_values() {
    let f = fixture();
    let hotel = f.hotels.at(1).unwrap();
    hotel
        .related_entity("reception")
        .unwrap()
        .set_many(json!({"manager": "ann", "open": true}))
        .unwrap();

    assert_eq!(hotel.get_str("/reception/manager"), Some("ann".to_string()));
    assert_eq!(hotel.get_bool("/reception/open"), Some(true));
    assert_eq!(hotel.get_number("/reception/staff"), Some(2.0));
    assert_eq!(hotel.get_str("/rooms/0/beds/0/type"), Some("single".to_string()));
    assert_eq!(hotel.get_str("/reception/missing"), None);
}

// ── Events ───────────────────────────────────────────────────────

#[test]
fn filtered_listeners_only_see_their_event() {
    let schema = EntitySchema::new("room").build();
    let room = Entity::new(&schema, json!({})).unwrap();
    let hits = Rc::new(Cell::new(0));

    let counter = Rc::clone(&hits);
    room.on(EventKind::field("floor"), move |_| counter.set(counter.get() + 1));

    room.set("view", "sea");
    room.set("floor", 2i64);

    assert_eq!(hits.get(), 1);
}

#[test]
fn off_removes_a_listener() {
    let schema = EntitySchema::new("room").build();
    let room = Entity::new(&schema, json!({})).unwrap();
    let hits = Rc::new(Cell::new(0));

    let counter = Rc::clone(&hits);
    let id = room.on(EventKind::Change, move |_| counter.set(counter.get() + 1));
    assert_eq!(room.listener_count(), 1);

    room.set("floor", 1i64);
    assert!(room.off(id));
    assert!(!room.off(id));
    room.set("floor", 2i64);

    assert_eq!(hits.get(), 1);
    assert_eq!(room.listener_count(), 0);
}

#[test]
fn event_target_is_the_emitting_entity() {
    let schema = EntitySchema::new("room").build();
    let room = Entity::new(&schema, json!({})).unwrap();
    let targets = Rc::new(RefCell::new(Vec::new()));

    let seen = Rc::clone(&targets);
    room.on_all(move |event| seen.borrow_mut().push(event.target.clone()));
    room.set("floor", 1i64);

    assert_eq!(
        *targets.borrow(),
        vec![Node::from(room.clone()), Node::from(room.clone())]
    );
}

// ── Parent → child ───────────────────────────────────────────────

#[test]
fn sync_down_overwrites_the_related_entity() {
    let f = fixture();
    let hotel = f.hotels.at(1).unwrap();
    let reception = hotel.related_entity("reception").unwrap();
    let recorder = Recorder::default();
    recorder.watch_entity("hotel", &hotel);
    recorder.watch_entity("rec", &reception);

    hotel.set("reception", json!({"staff": 4, "manager": "ann"}));

    assert_eq!(reception.to_json(), json!({"staff": 4, "manager": "ann"}));
    let raw = hotel.get("reception").unwrap();
    assert!(reception.source().unwrap().ptr_eq(raw.as_object().unwrap()));
    assert_eq!(
        recorder.events(),
        log(&[
            ("hotel", "change:reception"),
            ("rec", "change:manager"),
            ("rec", "change:staff"),
            ("rec", "change"),
            ("hotel", "change"),
        ])
    );
}

#[test]
fn sync_down_drops_keys_missing_from_the_new_value() {
    let f = fixture();
    let hotel = f.hotels.at(1).unwrap();
    let reception = hotel.related_entity("reception").unwrap();

    hotel.set("reception", json!({"manager": "bob"}));

    assert!(!reception.has("staff"));
    assert_eq!(reception.to_json(), json!({"manager": "bob"}));
}

#[test]
fn null_clears_the_child_until_it_is_set_again() {
    let f = fixture();
    let hotel = f.hotels.at(1).unwrap();
    let reception = hotel.related_entity("reception").unwrap();

    hotel.set("reception", Value::Null);
    assert_eq!(reception.to_json(), json!({}));
    assert_eq!(hotel.get_json("reception"), Some(Value::Null));

    reception.set("staff", 1i64);
    assert_eq!(hotel.get_json("reception"), Some(json!({"staff": 1})));
    let raw = hotel.get("reception").unwrap();
    assert!(reception.source().unwrap().ptr_eq(raw.as_object().unwrap()));
}

// ── Child → parent ───────────────────────────────────────────────

#[test]
fn unset_on_child_removes_the_key_from_the_parent() {
    let f = fixture();
    let hotel = f.hotels.at(1).unwrap();
    let reception = hotel.related_entity("reception").unwrap();

    reception.set("manager", "ann");
    reception.unset("staff");

    assert_eq!(hotel.get_json("reception"), Some(json!({"manager": "ann"})));
    assert_eq!(f.hotels.to_json()[1]["reception"], json!({"manager": "ann"}));
}

#[test]
fn first_write_materializes_an_absent_related_attribute() {
    let f = fixture();
    let reception = f.hotel.related_entity("reception").unwrap();
    assert!(!f.hotel.has("reception"));

    reception.set("staff", 7i64);

    assert_eq!(f.hotel.get_json("reception"), Some(json!({"staff": 7})));
    let raw = f.hotel.get("reception").unwrap();
    assert!(reception.source().unwrap().ptr_eq(raw.as_object().unwrap()));
}

#[test]
fn silent_set_does_not_propagate_until_synced() {
    let f = fixture();
    let hotel = f.hotels.at(1).unwrap();
    let reception = hotel.related_entity("reception").unwrap();
    let recorder = Recorder::default();
    recorder.watch_entity("hotel", &hotel);

    reception.set_with("staff", 9i64, SetOptions::silent());
    assert_eq!(hotel.get_json("reception"), Some(json!({"staff": 2})));

    reception.sync_up(SyncOptions::silent());
    assert_eq!(hotel.get_json("reception"), Some(json!({"staff": 9})));
    assert!(recorder.events().is_empty());
}

#[test]
fn disabled_bubbling_writes_without_parent_events() {
    let f = fixture_with(SchemaOptions {
        reception: Some(EntitySchema::new("reception").with_bubbling(false)),
        ..Default::default()
    });
    let hotel = f.hotels.at(1).unwrap();
    let reception = hotel.related_entity("reception").unwrap();
    assert!(!reception.bubbling_change_event());

    let recorder = Recorder::default();
    recorder.watch_entity("hotel", &hotel);

    reception.set("staff", 6i64);
    assert_eq!(hotel.get_json("reception"), Some(json!({"staff": 6})));
    assert!(recorder.events().is_empty());

    reception.set_bubbling_change_event(true);
    reception.set("staff", 8i64);
    assert_eq!(
        recorder.events(),
        log(&[("hotel", "change:reception"), ("hotel", "change")])
    );
}

#[test]
fn unlinked_entities_ignore_sync_calls() {
    let schema = EntitySchema::new("room").build();
    let room = Entity::new(&schema, json!({"floor": 1})).unwrap();

    room.sync_up(SyncOptions::default());
    room.sync_down(json!({"floor": 2}).into());

    assert_eq!(room.to_json(), json!({"floor": 1}));
    assert_eq!(room.sync_state(), SyncState::Idle);
}

// ── Relations ────────────────────────────────────────────────────

#[test]
fn resolver_finds_wired_children_only() {
    let f = fixture();
    let reception = f.hotel.related_entity("reception").unwrap();

    assert_eq!(
        f.hotel.get_relation(&Node::from(f.rooms.clone())),
        Some("rooms".to_string())
    );
    assert_eq!(
        f.hotel.get_relation(&Node::from(reception)),
        Some("reception".to_string())
    );
    assert_eq!(f.hotel.get_relation(&Node::from(f.room.clone())), None);

    let names: Vec<String> = f
        .hotel
        .related_children()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["rooms".to_string(), "reception".to_string()]);
}

#[test]
fn relate_wires_an_unlinked_entity() {
    let plain = EntitySchema::new("hotel").build();
    let owner = EntitySchema::new("owner").build();
    let hotel = Entity::new(&plain, json!({"owner": {"name": "old"}})).unwrap();
    let person = Entity::new(&owner, json!({"name": "ann"})).unwrap();

    assert!(hotel.relate("owner", person.clone()));

    assert_eq!(person.parent(), Some(hotel.clone()));
    assert_eq!(hotel.get_json("owner"), Some(json!({"name": "ann"})));
    let raw = hotel.get("owner").unwrap();
    assert!(person.source().unwrap().ptr_eq(raw.as_object().unwrap()));

    let recorder = Recorder::default();
    recorder.watch_entity("hotel", &hotel);
    person.set("name", "bea");
    assert_eq!(hotel.get_json("owner"), Some(json!({"name": "bea"})));
    assert_eq!(
        recorder.events(),
        log(&[("hotel", "change:owner"), ("hotel", "change")])
    );
}

#[test]
fn relate_refuses_a_child_of_another_parent() {
    let plain = EntitySchema::new("hotel").build();
    let owner = EntitySchema::new("owner").build();
    let hotel = Entity::new(&plain, json!({})).unwrap();
    let other = Entity::new(&plain, json!({})).unwrap();
    let person = Entity::with_parent(&owner, json!({"name": "ann"}), &other).unwrap();

    assert!(!hotel.relate("owner", person.clone()));
    assert!(hotel.related("owner").is_none());
    assert_eq!(person.parent(), Some(other.clone()));
}

#[test]
fn parented_but_unrelated_entities_do_not_sync() {
    let plain = EntitySchema::new("hotel").build();
    let owner = EntitySchema::new("owner").build();
    let hotel = Entity::new(&plain, json!({})).unwrap();
    let person = Entity::with_parent(&owner, json!({}), &hotel).unwrap();

    person.set("name", "ann");

    assert_eq!(hotel.to_json(), json!({}));
    assert_eq!(hotel.get_relation(&Node::from(person)), None);
}

// ── Initialization hook ──────────────────────────────────────────

#[derive(Default)]
struct InitWatcher {
    seen: RefCell<Vec<(Option<String>, Vec<String>)>>,
}

impl EntityHandler for InitWatcher {
    fn on_initialize(&self, entity: &Entity) {
        let parent = entity.parent().map(|parent| parent.schema().name().to_string());
        let related = entity
            .related_children()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        self.seen.borrow_mut().push((parent, related));
    }
}

#[test]
fn init_hook_runs_after_linking_and_wiring() {
    let watcher = Rc::new(InitWatcher::default());
    let f = fixture_with(SchemaOptions {
        reception: Some(EntitySchema::new("reception").with_handler(watcher.clone())),
        room_handler: Some(watcher.clone()),
        ..Default::default()
    });
    drop(f);

    let seen = watcher.seen.borrow();
    let receptions: Vec<_> = seen.iter().filter(|(parent, _)| parent.is_some()).collect();
    let rooms: Vec<_> = seen
        .iter()
        .filter(|(_, related)| related == &vec!["beds".to_string()])
        .collect();

    // Two hotels each wire a reception; three rooms each wire their beds.
    assert_eq!(receptions.len(), 2);
    assert!(receptions.iter().all(|(parent, _)| parent.as_deref() == Some("hotel")));
    assert_eq!(rooms.len(), 3);
}
