mod common;

use common::*;
use spesa::common::models::{ItemChanges, ListChanges, NewItem, Priority};
use spesa::server::error::ServiceError;
use spesa::server::{membership, shopping};

fn item(name: &str) -> NewItem {
    NewItem { name: name.into(), ..Default::default() }
}

#[tokio::test]
async fn lists_are_visible_only_to_group_members() {
    let (db, config) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;
    let eve = user(&db, "eve").await;
    let group = group_with(&db, &config, &alice, &[&bob]).await;
    let gid = group.group.id.clone();

    let list = shopping::create_list(db.clone(), &alice, &gid, " Spesa ", Some("sabato")).await.unwrap();
    assert_eq!(list.list.name, "Spesa");
    assert_eq!(list.group_name, "Casa");
    assert_eq!(list.item_count, 0);

    assert_eq!(shopping::get_list(db.clone(), &bob, &list.list.id).await.unwrap().list, list.list);
    assert_eq!(shopping::group_lists(db.clone(), &bob, &gid).await.unwrap().len(), 1);

    let err = shopping::get_list(db.clone(), &eve, &list.list.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    let err = shopping::group_lists(db.clone(), &eve, &gid).await.unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
    let err = shopping::create_list(db.clone(), &eve, &gid, "Mia", None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
    let err = shopping::add_item(db.clone(), &eve, &list.list.id, &item("latte")).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    let err = shopping::create_list(db.clone(), &alice, "missing", "Mia", None).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn blank_names_are_rejected() {
    let (db, config) = setup().await;
    let alice = user(&db, "alice").await;
    let group = group_with(&db, &config, &alice, &[]).await;

    let err = shopping::create_list(db.clone(), &alice, &group.group.id, "  ", None).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let list = shopping::create_list(db.clone(), &alice, &group.group.id, "Spesa", None).await.unwrap();
    let err = shopping::add_item(db.clone(), &alice, &list.list.id, &item(" ")).await.unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
}

#[tokio::test]
async fn items_get_defaults_and_are_ordered() {
    let (db, config) = setup().await;
    let alice = user(&db, "alice").await;
    let group = group_with(&db, &config, &alice, &[]).await;
    let list = shopping::create_list(db.clone(), &alice, &group.group.id, "Spesa", None).await.unwrap();
    let lid = list.list.id.clone();

    let low = shopping::add_item(
        db.clone(),
        &alice,
        &lid,
        &NewItem { priority: Some(Priority::Low), quantity: Some(-2), ..item("sale") },
    )
    .await
    .unwrap();
    assert_eq!(low.quantity, 1);
    assert_eq!(low.priority, Priority::Low);

    let medium = shopping::add_item(db.clone(), &alice, &lid, &item("pane")).await.unwrap();
    assert_eq!(medium.priority, Priority::Medium);
    assert!(!medium.is_completed);

    let high = shopping::add_item(
        db.clone(),
        &alice,
        &lid,
        &NewItem { priority: Some(Priority::High), quantity: Some(3), unit: Some("kg".into()), ..item("mele") },
    )
    .await
    .unwrap();

    let done = ItemChanges { is_completed: Some(true), ..Default::default() };
    shopping::update_item(db.clone(), &alice, &high.id, &done).await.unwrap();

    let names: Vec<_> = shopping::list_items(db.clone(), &alice, &lid)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, ["pane", "sale", "mele"]);

    let details = shopping::get_list(db.clone(), &alice, &lid).await.unwrap();
    assert_eq!(details.item_count, 3);
    assert_eq!(details.completed_item_count, 1);
}

#[tokio::test]
async fn updates_only_touch_given_fields() {
    let (db, config) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;
    let group = group_with(&db, &config, &alice, &[&bob]).await;
    let list = shopping::create_list(db.clone(), &alice, &group.group.id, "Spesa", Some("note")).await.unwrap();
    let milk = shopping::add_item(
        db.clone(),
        &alice,
        &list.list.id,
        &NewItem { quantity: Some(2), unit: Some("l".into()), estimated_price: Some(1.5), ..item("latte") },
    )
    .await
    .unwrap();

    let changes = ItemChanges { actual_price: Some(Some(1.3)), quantity: Some(0), ..Default::default() };
    let updated = shopping::update_item(db.clone(), &bob, &milk.id, &changes).await.unwrap();
    assert_eq!(updated.name, "latte");
    assert_eq!(updated.unit.as_deref(), Some("l"));
    assert_eq!(updated.quantity, 1);
    assert_eq!(updated.estimated_price, Some(1.5));
    assert_eq!(updated.actual_price, Some(1.3));

    let stored = shopping::list_items(db.clone(), &alice, &list.list.id).await.unwrap();
    assert_eq!(stored[0].actual_price, Some(1.3));

    let renamed = shopping::update_list(
        db.clone(),
        &bob,
        &list.list.id,
        &ListChanges { is_completed: Some(true), ..Default::default() },
    )
    .await
    .unwrap();
    assert_eq!(renamed.list.name, "Spesa");
    assert_eq!(renamed.list.description.as_deref(), Some("note"));
    assert!(renamed.list.is_completed);
}

#[tokio::test]
async fn null_price_clears_and_missing_price_keeps() {
    let (db, config) = setup().await;
    let alice = user(&db, "alice").await;
    let group = group_with(&db, &config, &alice, &[]).await;
    let list = shopping::create_list(db.clone(), &alice, &group.group.id, "Spesa", None).await.unwrap();
    let cheese = shopping::add_item(
        db.clone(),
        &alice,
        &list.list.id,
        &NewItem { estimated_price: Some(3.5), ..item("formaggio") },
    )
    .await
    .unwrap();
    let set_actual: ItemChanges = serde_json::from_str(r#"{"actual_price":4.0}"#).unwrap();
    shopping::update_item(db.clone(), &alice, &cheese.id, &set_actual).await.unwrap();

    let untouched: ItemChanges = serde_json::from_str(r#"{"notes":"stagionato"}"#).unwrap();
    assert_eq!(untouched.estimated_price, None);
    let kept = shopping::update_item(db.clone(), &alice, &cheese.id, &untouched).await.unwrap();
    assert_eq!(kept.estimated_price, Some(3.5));
    assert_eq!(kept.actual_price, Some(4.0));

    let clear: ItemChanges = serde_json::from_str(r#"{"estimated_price":null}"#).unwrap();
    assert_eq!(clear.estimated_price, Some(None));
    let cleared = shopping::update_item(db.clone(), &alice, &cheese.id, &clear).await.unwrap();
    assert_eq!(cleared.estimated_price, None);
    assert_eq!(cleared.actual_price, Some(4.0));

    let stored = shopping::list_items(db.clone(), &alice, &list.list.id).await.unwrap();
    assert_eq!(stored[0].estimated_price, None);
    assert_eq!(stored[0].actual_price, Some(4.0));
    assert_eq!(stored[0].notes.as_deref(), Some("stagionato"));
}

#[tokio::test]
async fn deleting_a_list_removes_its_items() {
    let (db, config) = setup().await;
    let alice = user(&db, "alice").await;
    let eve = user(&db, "eve").await;
    let group = group_with(&db, &config, &alice, &[]).await;
    let list = shopping::create_list(db.clone(), &alice, &group.group.id, "Spesa", None).await.unwrap();
    let egg = shopping::add_item(db.clone(), &alice, &list.list.id, &item("uova")).await.unwrap();
    shopping::add_item(db.clone(), &alice, &list.list.id, &item("farina")).await.unwrap();

    let err = shopping::delete_item(db.clone(), &eve, &egg.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    shopping::delete_item(db.clone(), &alice, &egg.id).await.unwrap();
    assert_eq!(scalar(&db, "SELECT COUNT(*) FROM shopping_items WHERE list_id = ?", &list.list.id).await, 1);

    let err = shopping::delete_list(db.clone(), &eve, &list.list.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    shopping::delete_list(db.clone(), &alice, &list.list.id).await.unwrap();
    assert_eq!(scalar(&db, "SELECT COUNT(*) FROM shopping_items WHERE list_id = ?", &list.list.id).await, 0);

    let err = shopping::get_list(db.clone(), &alice, &list.list.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn recent_lists_span_groups_and_respect_limit() {
    let (db, config) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;
    let home = group_with(&db, &config, &alice, &[]).await;
    let office = group_with(&db, &config, &alice, &[&bob]).await;
    let other = group_with(&db, &config, &bob, &[]).await;

    let mut ids = Vec::new();
    for i in 0..7 {
        let gid = if i % 2 == 0 { &home.group.id } else { &office.group.id };
        let list = shopping::create_list(db.clone(), &alice, gid, &format!("Lista {}", i), None).await.unwrap();
        sqlx::query("UPDATE shopping_lists SET updated_at = ? WHERE id = ?")
            .bind(1_000 * (i as i64 + 1))
            .bind(&list.list.id)
            .execute(&db.pool)
            .await
            .unwrap();
        ids.push(list.list.id);
    }
    shopping::create_list(db.clone(), &bob, &other.group.id, "Non mia", None).await.unwrap();

    let recent = shopping::recent_lists(db.clone(), &alice, None).await.unwrap();
    let names: Vec<_> = recent.iter().map(|l| l.list.name.as_str()).collect();
    assert_eq!(names, ["Lista 6", "Lista 5", "Lista 4", "Lista 3", "Lista 2"]);

    let two = shopping::recent_lists(db.clone(), &alice, Some(2)).await.unwrap();
    assert_eq!(two.len(), 2);
    assert_eq!(two[0].list.id, ids[6]);

    let bobs = shopping::recent_lists(db.clone(), &bob, Some(20)).await.unwrap();
    assert_eq!(bobs.len(), 4);
}

#[tokio::test]
async fn leaving_a_group_revokes_list_access() {
    let (db, config) = setup().await;
    let alice = user(&db, "alice").await;
    let bob = user(&db, "bob").await;
    let group = group_with(&db, &config, &alice, &[&bob]).await;
    let list = shopping::create_list(db.clone(), &alice, &group.group.id, "Spesa", None).await.unwrap();
    let bread = shopping::add_item(db.clone(), &bob, &list.list.id, &item("pane")).await.unwrap();

    membership::leave_group(db.clone(), &bob, &group.group.id).await.unwrap();

    let err = shopping::get_list(db.clone(), &bob, &list.list.id).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    let changes = ItemChanges { is_completed: Some(true), ..Default::default() };
    let err = shopping::update_item(db.clone(), &bob, &bread.id, &changes).await.unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));
    assert!(shopping::recent_lists(db.clone(), &bob, None).await.unwrap().is_empty());

    // gli articoli restano al gruppo
    assert_eq!(shopping::list_items(db.clone(), &alice, &list.list.id).await.unwrap().len(), 1);
}
