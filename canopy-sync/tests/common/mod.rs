//! Shared fixtures for hierarchy tests.
//!
//! The fixture tree is hotels → hotel → rooms → room → beds → bed, with
//! hotel → reception as a related entity.

#![allow(dead_code)]

use canopy_sync::{Collection, CollectionSchema, Entity, EntityHandler, EntitySchema, ListenerId};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

/// Installs a test-writer subscriber honouring `RUST_LOG`. Safe to call
/// from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Schemas {
    pub bed: Rc<EntitySchema>,
    pub beds: Rc<CollectionSchema>,
    pub room: Rc<EntitySchema>,
    pub rooms: Rc<CollectionSchema>,
    pub reception: Rc<EntitySchema>,
    pub hotel: Rc<EntitySchema>,
    pub hotels: Rc<CollectionSchema>,
}

#[derive(Default)]
pub struct SchemaOptions {
    pub reception: Option<EntitySchema>,
    pub room_handler: Option<Rc<dyn EntityHandler>>,
    pub hotel_handler: Option<Rc<dyn EntityHandler>>,
}

pub fn schemas() -> Schemas {
    schemas_with(SchemaOptions::default())
}

pub fn schemas_with(options: SchemaOptions) -> Schemas {
    let bed = EntitySchema::new("bed").build();
    let beds = CollectionSchema::new("beds", &bed).build();

    let mut room = EntitySchema::new("room").with_related_collection("beds", &beds);
    if let Some(handler) = options.room_handler {
        room = room.with_handler(handler);
    }
    let room = room.build();
    let rooms = CollectionSchema::new("rooms", &room).build();

    let reception = options
        .reception
        .unwrap_or_else(|| EntitySchema::new("reception"))
        .build();

    let mut hotel = EntitySchema::new("hotel")
        .with_related_collection("rooms", &rooms)
        .with_related_entity("reception", &reception);
    if let Some(handler) = options.hotel_handler {
        hotel = hotel.with_handler(handler);
    }
    let hotel = hotel.build();
    let hotels = CollectionSchema::new("hotels", &hotel).build();

    Schemas {
        bed,
        beds,
        room,
        rooms,
        reception,
        hotel,
        hotels,
    }
}

pub fn hotels_json() -> Value {
    json!([
        {
            "rooms": [
                {"beds": [{"type": "queen"}]},
                {"beds": [{"type": "double"}, {"type": "sofa"}]}
            ]
        },
        {
            "rooms": [
                {"beds": [{"type": "single"}]}
            ],
            "reception": {"staff": 2}
        }
    ])
}

pub struct Fixture {
    pub schemas: Schemas,
    pub hotels: Collection,
    pub hotel: Entity,
    pub rooms: Collection,
    pub room: Entity,
}

pub fn fixture() -> Fixture {
    fixture_with(SchemaOptions::default())
}

pub fn fixture_with(options: SchemaOptions) -> Fixture {
    init_tracing();
    let schemas = schemas_with(options);
    let hotels = Collection::new(&schemas.hotels, hotels_json()).unwrap();
    let hotel = hotels.at(0).unwrap();
    let rooms = hotel.related_collection("rooms").unwrap();
    let room = rooms.at(1).unwrap();
    Fixture {
        schemas,
        hotels,
        hotel,
        rooms,
        room,
    }
}

/// Records `(label, event name)` pairs from any number of nodes.
#[derive(Clone, Default)]
pub struct Recorder(Rc<RefCell<Vec<(String, String)>>>);

impl Recorder {
    pub fn watch_entity(&self, label: &str, entity: &Entity) -> ListenerId {
        let log = Rc::clone(&self.0);
        let label = label.to_string();
        entity.on_all(move |event| log.borrow_mut().push((label.clone(), event.kind.to_string())))
    }

    pub fn watch_collection(&self, label: &str, collection: &Collection) -> ListenerId {
        let log = Rc::clone(&self.0);
        let label = label.to_string();
        collection.on_all(move |event| log.borrow_mut().push((label.clone(), event.kind.to_string())))
    }

    pub fn events(&self) -> Vec<(String, String)> {
        self.0.borrow().clone()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

/// Builds an expected event log from string pairs.
pub fn log(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(label, name)| (label.to_string(), name.to_string()))
        .collect()
}
