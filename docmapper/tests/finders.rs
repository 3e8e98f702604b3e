use bson::{Bson, doc, oid::ObjectId};
use docmapper::{memory::InMemoryStore, prelude::*};

async fn people() -> (InMemoryStore, Model) {
    let backend = InMemoryStore::new();
    let store = DocumentStore::new(backend.clone());
    let model = store.model(
        DocumentModel::new("people")
            .key("name", FieldType::String)
            .key("age", FieldType::Int)
            .into_definition()
            .unwrap(),
    );

    for (name, age) in [("Alice", 30), ("Bob", 10), ("Carol", 20)] {
        model
            .create(doc! { "name": name, "age": age })
            .await
            .unwrap();
    }

    (backend, model)
}

fn id_of(record: &Record) -> Bson {
    record.id().cloned().unwrap()
}

#[tokio::test]
async fn find_some_or_fail_reports_missing_ids() {
    let (_, people) = people().await;
    let found = people.all(FindOptions::new()).await.unwrap();

    let err = people
        .find_some_or_fail(vec![id_of(&found[0]), id_of(&found[1]), Bson::ObjectId(ObjectId::new())])
        .await
        .unwrap_err();

    match err {
        DocumentStoreError::DocumentNotFound { found, expected, detail, .. } => {
            assert_eq!((found, expected), (2, 3));
            assert!(detail.contains("found 2, expected 3"), "{detail}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn find_some_or_fail_without_ids_fails() {
    let (_, people) = people().await;

    assert!(
        people
            .find_some_or_fail(vec![])
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn find_some_dedupes_and_skips_empty_requests() {
    let (backend, people) = people().await;
    let alice = people
        .first(FindOptions::builder().condition("name", "Alice").build())
        .await
        .unwrap()
        .unwrap();

    let before = backend.stats().total();
    assert!(people.find_some(vec![]).await.unwrap().is_empty());
    assert!(people.find_some(vec![Bson::Null]).await.unwrap().is_empty());
    assert_eq!(backend.stats().total(), before);

    let found = people
        .find_some(vec![id_of(&alice), id_of(&alice)])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn last_inverts_the_given_order() {
    let (_, people) = people().await;

    let oldest = people
        .last(FindOptions::builder().order("age asc").build())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(oldest.get_as::<i32>("age").unwrap(), Some(30));

    let youngest = people
        .last(FindOptions::builder().order("age desc").build())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(youngest.get("name"), Some(&Bson::String("Bob".into())));
}

#[tokio::test]
async fn last_requires_an_order() {
    let (_, people) = people().await;

    let err = people.last(FindOptions::new()).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::InvalidArgument(_)));
}

#[tokio::test]
async fn last_rejects_orders_without_fields() {
    let (backend, people) = people().await;
    let before = backend.stats();

    for order in [" , ", ",", "   "] {
        let err = people
            .last(FindOptions::builder().order(order).build())
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidArgument(_)), "{order:?}: {err}");
    }

    assert_eq!(backend.stats(), before);
}

#[tokio::test]
async fn count_ignores_limit_and_offset() {
    let (_, people) = people().await;

    let options = FindOptions::builder()
        .condition("age", doc! { "$gte": 20 })
        .limit(1)
        .offset(1)
        .build();

    assert_eq!(people.count(&options).await.unwrap(), 2);
    assert!(people.exists(&options).await.unwrap());
    assert!(
        !people
            .exists(&FindOptions::builder().condition("name", "Zed").build())
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn all_honours_order_offset_and_projection() {
    let (_, people) = people().await;

    let records = people
        .all(
            FindOptions::builder()
                .order("age desc")
                .offset(1)
                .fields(["name"])
                .build(),
        )
        .await
        .unwrap();

    let names: Vec<_> = records
        .iter()
        .map(|record| record.get_as::<String>("name").unwrap().unwrap())
        .collect();
    assert_eq!(names, vec!["Carol", "Bob"]);
    assert!(records.iter().all(|record| record.id().is_some() && record.get("age").is_none()));
}

#[tokio::test]
async fn any_of_conditions_from_arrays() {
    let (_, people) = people().await;

    let records = people
        .all(
            FindOptions::builder()
                .condition("name", vec!["Alice", "Carol"])
                .order("name")
                .build(),
        )
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
}

#[tokio::test]
async fn first_or_create_drops_undeclared_keys() {
    let (_, people) = people().await;

    let existing = people
        .first_or_create(doc! { "name": "Alice" })
        .await
        .unwrap();
    assert!(existing.is_persisted());
    assert_eq!(existing.get_as::<i32>("age").unwrap(), Some(30));

    let created = people
        .first_or_create(doc! { "name": "Dave", "nickname": "D" })
        .await
        .unwrap();
    assert!(created.is_persisted());
    assert_eq!(created.get("name"), Some(&Bson::String("Dave".into())));
    assert!(created.get("nickname").is_none());

    assert_eq!(people.count(&FindOptions::new()).await.unwrap(), 4);
}

#[tokio::test]
async fn find_each_visits_every_match() {
    let (_, people) = people().await;
    let mut names = Vec::new();

    let visited = people
        .find_each(&FindOptions::builder().order("name").build(), |record| {
            names.push(record.get_as::<String>("name").unwrap().unwrap_or_default());
            async { Ok(()) }
        })
        .await
        .unwrap();

    assert_eq!(visited, 3);
    assert_eq!(names, vec!["Alice", "Bob", "Carol"]);
}

#[tokio::test]
async fn update_rejects_missing_ids() {
    let (_, people) = people().await;

    assert!(matches!(
        people.update(Bson::Null, doc! { "age": 1 }).await.unwrap_err(),
        DocumentStoreError::InvalidArgument(_)
    ));
    assert!(
        people
            .update(ObjectId::new(), doc! { "age": 1 })
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn update_saves_the_loaded_record() {
    let (_, people) = people().await;
    let bob = people
        .first(FindOptions::builder().condition("name", "Bob").build())
        .await
        .unwrap()
        .unwrap();

    people
        .update(id_of(&bob), doc! { "age": 11 })
        .await
        .unwrap();

    let reloaded = people.find_or_fail(id_of(&bob)).await.unwrap();
    assert_eq!(reloaded.get_as::<i32>("age").unwrap(), Some(11));
}

#[tokio::test]
async fn update_rejects_empty_attributes() {
    let (backend, people) = people().await;
    let alice = people
        .first(FindOptions::builder().condition("name", "Alice").build())
        .await
        .unwrap()
        .unwrap();
    let before = backend.stats();

    assert!(matches!(
        people.update(id_of(&alice), doc! {}).await.unwrap_err(),
        DocumentStoreError::InvalidArgument(_)
    ));
    assert_eq!(backend.stats(), before);
}

#[tokio::test]
async fn update_many_returns_records_in_order() {
    let (_, people) = people().await;
    let records = people
        .all(FindOptions::builder().order("name").build())
        .await
        .unwrap();

    let updated = people
        .update_many(vec![
            (id_of(&records[2]), doc! { "age": 21 }),
            (id_of(&records[0]), doc! { "age": 31 }),
        ])
        .await
        .unwrap();

    let names: Vec<_> = updated
        .iter()
        .map(|record| record.get_as::<String>("name").unwrap().unwrap())
        .collect();
    assert_eq!(names, vec!["Carol", "Alice"]);

    let carol = people.find_or_fail(id_of(&records[2])).await.unwrap();
    let alice = people.find_or_fail(id_of(&records[0])).await.unwrap();
    assert_eq!(carol.get_as::<i32>("age").unwrap(), Some(21));
    assert_eq!(alice.get_as::<i32>("age").unwrap(), Some(31));
}

#[tokio::test]
async fn update_many_checks_every_entry_before_saving() {
    let (backend, people) = people().await;
    let records = people.all(FindOptions::new()).await.unwrap();
    let before = backend.stats();

    let missing_id = people
        .update_many(vec![
            (id_of(&records[0]), doc! { "age": 1 }),
            (Bson::Null, doc! { "age": 2 }),
        ])
        .await
        .unwrap_err();
    assert!(matches!(missing_id, DocumentStoreError::InvalidArgument(_)));

    let missing_attributes = people
        .update_many(vec![
            (id_of(&records[0]), doc! { "age": 1 }),
            (id_of(&records[1]), doc! {}),
        ])
        .await
        .unwrap_err();
    assert!(matches!(missing_attributes, DocumentStoreError::InvalidArgument(_)));

    let after = backend.stats();
    assert_eq!(after.save, before.save);
    assert_eq!(after, before);

    let first = people.find_or_fail(id_of(&records[0])).await.unwrap();
    assert_eq!(first.get("age"), records[0].get("age"));
}

#[tokio::test]
async fn create_many_saves_each_record() {
    let (backend, people) = people().await;
    let before = backend.stats();

    let created = people
        .create_many(vec![doc! { "name": "Dave", "age": 40 }, doc! { "name": "Erin", "age": 50 }])
        .await
        .unwrap();

    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|record| record.is_persisted() && record.id().is_some()));
    assert_eq!(backend.stats().save, before.save + 2);
    assert_eq!(people.count(&FindOptions::new()).await.unwrap(), 5);
    assert!(people.create_many(vec![]).await.unwrap().is_empty());
}

#[tokio::test]
async fn find_with_narrows_the_identity_lookup() {
    let (_, people) = people().await;
    let bob = people
        .first(FindOptions::builder().condition("name", "Bob").build())
        .await
        .unwrap()
        .unwrap();

    let found = people
        .find_with(id_of(&bob), FindOptions::builder().condition("age", doc! { "$lt": 18 }).build())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get("name"), Some(&Bson::String("Bob".into())));

    let excluded = people
        .find_with(id_of(&bob), FindOptions::builder().condition("age", doc! { "$gte": 18 }).build())
        .await
        .unwrap();
    assert!(excluded.is_none());
}

#[tokio::test]
async fn store_native_operators_filter_records() {
    let (_, people) = people().await;

    let names = |records: Vec<Record>| {
        records
            .iter()
            .map(|record| record.get_as::<String>("name").unwrap().unwrap())
            .collect::<Vec<_>>()
    };
    let query = |conditions: bson::Document| FindOptions::builder().conditions(conditions).order("name").build();

    let starts = people.all(query(doc! { "name": { "$regex": "^Al" } })).await.unwrap();
    assert_eq!(names(starts), vec!["Alice"]);

    let contains = people.all(query(doc! { "name": { "$regex": "o" } })).await.unwrap();
    assert_eq!(names(contains), vec!["Bob", "Carol"]);

    let negated = people.all(query(doc! { "name": { "$not": { "$regex": "o" } } })).await.unwrap();
    assert_eq!(names(negated), vec!["Alice"]);

    let younger = people.all(query(doc! { "age": { "$not": { "$gte": 20 } } })).await.unwrap();
    assert_eq!(names(younger), vec!["Bob"]);

    let neither = people
        .all(query(doc! { "$nor": [{ "name": "Alice" }, { "age": 10 }] }))
        .await
        .unwrap();
    assert_eq!(names(neither), vec!["Carol"]);

    assert!(
        people
            .all(query(doc! { "name": { "$regex": "A.*e" } }))
            .await
            .unwrap_err()
            .to_string()
            .contains("regex")
    );
}

#[tokio::test]
async fn all_matches_every_listed_element() {
    let store = DocumentStore::new(InMemoryStore::new());
    let posts = store.model(
        DocumentModel::new("posts")
            .key("title", FieldType::String)
            .key("tags", FieldType::Array)
            .into_definition()
            .unwrap(),
    );

    posts
        .create_many(vec![
            doc! { "title": "one", "tags": ["rust", "db"] },
            doc! { "title": "two", "tags": ["rust"] },
        ])
        .await
        .unwrap();

    let both = posts
        .all(FindOptions::builder().condition("tags", doc! { "$all": ["rust", "db"] }).build())
        .await
        .unwrap();
    assert_eq!(both.len(), 1);
    assert_eq!(both[0].get("title"), Some(&Bson::String("one".into())));

    let lacking = posts
        .all(FindOptions::builder().condition("tags", doc! { "$not": { "$all": ["db"] } }).build())
        .await
        .unwrap();
    assert_eq!(lacking.len(), 1);
    assert_eq!(lacking[0].get("title"), Some(&Bson::String("two".into())));
}

#[tokio::test]
async fn delete_removes_without_loading() {
    let (backend, people) = people().await;
    let records = people.all(FindOptions::new()).await.unwrap();

    assert_eq!(people.delete(vec![]).await.unwrap(), 0);
    assert_eq!(backend.stats().remove, 0);

    let before = backend.stats();
    assert_eq!(people.delete(vec![id_of(&records[0])]).await.unwrap(), 1);
    let after = backend.stats();
    assert_eq!(after.remove, before.remove + 1);
    assert_eq!(after.find, before.find);

    let removed = people
        .delete_all(&FindOptions::builder().condition("age", doc! { "$lt": 100 }).build())
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(backend.documents("people").await.is_empty());
}

#[tokio::test]
async fn ensure_index_reaches_the_store() {
    let (backend, people) = people().await;

    people
        .ensure_index(IndexSpec::ascending("name").unique(true))
        .await
        .unwrap();

    assert_eq!(backend.indexes("people").await, vec![IndexSpec::ascending("name").unique(true)]);
    assert!(people.create(doc! { "name": "Alice" }).await.is_err());
}
