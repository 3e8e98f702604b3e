use bson::{Bson, doc};
use docmapper::{memory::InMemoryStore, prelude::*};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

fn store() -> (InMemoryStore, DocumentStore) {
    let backend = InMemoryStore::new();
    let store = DocumentStore::new(backend.clone());
    (backend, store)
}

fn people(store: &DocumentStore, model: DocumentModel) -> Model {
    store.model(model.into_definition().unwrap())
}

fn person() -> DocumentModel {
    DocumentModel::new("people")
        .key("name", FieldType::String)
        .key_with_default("age", FieldType::Int, 0)
}

#[tokio::test]
async fn new_save_destroy() {
    let (backend, store) = store();
    let people = people(&store, person());

    let mut alice = people.new_record(doc! { "name": "Alice" });
    assert_eq!(alice.lifecycle(), Lifecycle::New);
    assert!(alice.id().is_none());
    assert_eq!(alice.get("age"), Some(&Bson::Int32(0)));

    assert!(alice.save().await.unwrap());
    assert_eq!(alice.lifecycle(), Lifecycle::Persisted);
    assert!(alice.id().is_some());
    assert_eq!(backend.documents("people").await.len(), 1);

    assert!(alice.destroy().await.unwrap());
    assert_eq!(alice.lifecycle(), Lifecycle::Destroyed);
    assert!(backend.documents("people").await.is_empty());
    assert_eq!(backend.stats().remove, 1);

    assert!(alice.destroy().await.unwrap());
    alice.delete().await.unwrap();
    assert_eq!(backend.stats().remove, 1);

    assert!(matches!(
        alice.save().await.unwrap_err(),
        DocumentStoreError::InvalidArgument(_)
    ));
}

#[tokio::test]
async fn saving_twice_updates_in_place() {
    let (backend, store) = store();
    let people = people(&store, person());

    let mut bob = people.create(doc! { "name": "Bob" }).await.unwrap();
    let id = bob.id().cloned().unwrap();

    bob.set("age", 41);
    assert!(bob.save().await.unwrap());

    let documents = backend.documents("people").await;
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].get("_id"), Some(&id));
    assert_eq!(documents[0].get_i32("age").unwrap(), 41);
}

#[tokio::test]
async fn deleting_a_new_record_skips_the_store() {
    let (backend, store) = store();
    let people = people(&store, person());

    let mut draft = people.new_record(doc! { "name": "Draft" });
    draft.delete().await.unwrap();

    assert!(draft.is_destroyed());
    assert_eq!(backend.stats().remove, 0);
}

#[tokio::test]
async fn reload_refreshes_attributes() {
    let (_, store) = store();
    let people = people(&store, person());

    let mut carol = people.create(doc! { "name": "Carol" }).await.unwrap();
    let id = carol.id().cloned().unwrap();

    people
        .update(id, doc! { "name": "Caroline" })
        .await
        .unwrap();

    carol.set("age", 5);
    carol.reload().await.unwrap();

    assert_eq!(carol.get_as::<String>("name").unwrap().as_deref(), Some("Caroline"));
    assert_eq!(carol.get_as::<i32>("age").unwrap(), Some(0));
    assert!(!carol.is_changed());
}

#[tokio::test]
async fn reload_rejects_unsaved_and_missing_records() {
    let (_, store) = store();
    let people = people(&store, person());

    let mut draft = people.new_record(doc! { "name": "Draft" });
    assert!(matches!(
        draft.reload().await.unwrap_err(),
        DocumentStoreError::InvalidArgument(_)
    ));

    let mut gone = people.create(doc! { "name": "Gone" }).await.unwrap();
    people
        .delete(vec![gone.id().cloned().unwrap()])
        .await
        .unwrap();

    assert!(gone.reload().await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn validation_gates_saving() {
    let (backend, store) = store();
    let people = people(
        &store,
        person().validations(
            Validations::new()
                .presence_of("name")
                .length_of("name", Some(2), Some(10)),
        ),
    );

    let blank = people.create(doc! { "name": "" }).await.unwrap();
    assert!(blank.is_new());
    assert_eq!(blank.errors().on("name"), vec!["can't be blank", "is too short (minimum is 2)"]);
    assert_eq!(backend.stats().save, 0);

    let err = people
        .create_or_fail(doc! { "age": 3 })
        .await
        .unwrap_err();
    match err {
        DocumentStoreError::DocumentNotValid(errors) => {
            assert_eq!(errors.full_messages(), vec!["name can't be blank"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let mut forced = people.new_record(doc! {});
    assert!(forced.save_with(SaveOptions { validate: false }).await.unwrap());
    assert_eq!(backend.stats().save, 1);
}

#[tokio::test]
async fn declared_types_are_checked() {
    let (_, store) = store();
    let people = people(&store, person());

    let mut record = people.new_record(doc! { "name": "Eve", "age": "old" });

    assert!(!record.is_valid());
    assert_eq!(record.errors().on("age"), vec!["must be of type int"]);
    assert!(!record.save().await.unwrap());
}

#[tokio::test]
async fn before_callbacks_can_halt() {
    let (backend, store) = store();
    let people = people(
        &store,
        person().callbacks(
            Callbacks::new()
                .before(LifecycleEvent::Save, |record| {
                    let slug = record
                        .get_as::<String>("name")
                        .ok()
                        .flatten()
                        .unwrap_or_default()
                        .to_lowercase();
                    record.set("slug", slug);
                    true
                })
                .before(LifecycleEvent::Destroy, |record| record.get("locked") != Some(&Bson::Boolean(true))),
        ),
    );

    let mut frank = people
        .create(doc! { "name": "Frank", "locked": true })
        .await
        .unwrap();
    assert_eq!(frank.get("slug"), Some(&Bson::String("frank".into())));

    assert!(!frank.destroy().await.unwrap());
    assert!(frank.is_persisted());
    assert_eq!(backend.documents("people").await.len(), 1);

    frank.set("locked", false);
    assert!(frank.save().await.unwrap());
    assert!(frank.destroy().await.unwrap());
    assert!(backend.documents("people").await.is_empty());
}

#[tokio::test]
async fn after_callbacks_run_per_event() {
    let (_, store) = store();
    let created = Arc::new(AtomicUsize::new(0));
    let updated = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));

    let people = people(&store, {
        let (created, updated, destroyed) = (created.clone(), updated.clone(), destroyed.clone());

        person().callbacks(
            Callbacks::new()
                .after(LifecycleEvent::Create, move |_| {
                    created.fetch_add(1, Ordering::SeqCst);
                })
                .after(LifecycleEvent::Update, move |_| {
                    updated.fetch_add(1, Ordering::SeqCst);
                })
                .after(LifecycleEvent::Destroy, move |_| {
                    destroyed.fetch_add(1, Ordering::SeqCst);
                }),
        )
    });

    let mut record = people.create(doc! { "name": "Gus" }).await.unwrap();
    record.update_attributes(doc! { "age": 2 }).await.unwrap();
    people.create(doc! { "name": "Hal" }).await.unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 2);
    assert_eq!(updated.load(Ordering::SeqCst), 1);

    assert_eq!(people.delete_all(&FindOptions::builder().condition("name", "Hal").build()).await.unwrap(), 1);
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);

    assert_eq!(people.destroy_all(&FindOptions::new()).await.unwrap(), 1);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn destroy_by_ids_requires_every_id() {
    let (backend, store) = store();
    let people = people(&store, person());

    let ivy = people.create(doc! { "name": "Ivy" }).await.unwrap();
    let id = ivy.id().cloned().unwrap();

    assert!(
        people
            .destroy(vec![id.clone(), Bson::ObjectId(bson::oid::ObjectId::new())])
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert_eq!(backend.documents("people").await.len(), 1);

    let destroyed = people.destroy(vec![id]).await.unwrap();
    assert!(destroyed[0].is_destroyed());
    assert!(backend.documents("people").await.is_empty());
}

#[tokio::test]
async fn dirty_tracking_follows_declared_fields() {
    let (_, store) = store();
    let people = people(&store, person());

    let saved = people.create(doc! { "name": "Jo" }).await.unwrap();
    let mut jo = people.find_or_fail(saved.id().cloned().unwrap()).await.unwrap();
    assert!(!jo.is_changed());

    jo.set("name", "Joanna");
    jo.set("nickname", "J");
    assert_eq!(jo.changed_fields(), vec!["name"]);
    assert!(jo.is_field_changed("name"));
    assert_eq!(jo.original_value("name"), Some(&Bson::String("Jo".into())));

    jo.set("name", "Jo");
    assert!(!jo.is_changed());

    jo.set("age", 7);
    assert!(jo.save().await.unwrap());
    assert!(jo.changed_fields().is_empty());
}

#[tokio::test]
async fn records_convert_to_json_and_types() {
    #[derive(Debug, serde::Deserialize)]
    struct Person {
        name: String,
        age: i32,
    }

    let (_, store) = store();
    let people = people(&store, person());

    let record = people.create(doc! { "name": "Kim", "age": 9 }).await.unwrap();

    let person: Person = record.deserialize().unwrap();
    assert_eq!((person.name.as_str(), person.age), ("Kim", 9));

    let json = record.to_json().unwrap();
    assert_eq!(json["name"], "Kim");
}
