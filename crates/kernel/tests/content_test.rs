#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the content lifecycle.
//!
//! These tests run the real service against the in-memory store and verify
//! save, load, delete, move, labels and queries end to end.

use parcel_kernel::config::MissingEnvelopePolicy;
use parcel_kernel::container::Container;
use parcel_kernel::content::{
    BindingState, ContentBearing, ContentRecord, ContentTypeRegistry, LabelKind, MOVE_DISABLED,
    MOVE_NOT_PERMITTED, MoveOutcome, PolymorphicQuery,
};
use parcel_kernel::error::ContentError;
use parcel_kernel::follow::FollowTarget;
use parcel_kernel::models::{ContentEnvelope, Visibility};
use parcel_kernel::permissions::Capability;
use parcel_kernel::session::UserContext;
use parcel_kernel::store::ContentStore;
use parcel_test_utils::{Announcement, Draft, Note, Post, Task, TestHarness, in_space};

// ============================================================================
// Save and load
// ============================================================================

#[tokio::test]
async fn public_note_denied_then_private_note_saved() {
    let h = TestHarness::new();
    let s1 = h.space("S1");
    let creator = h.member();
    let other = h.member();

    let mut note = in_space(Note::new("Hello"), &s1, Visibility::Public);
    let err = h.service.save(&mut note, &creator).await.unwrap_err();

    assert!(matches!(err, ContentError::SaveAborted(_)));
    assert_eq!(
        err.validation_errors().unwrap().get("visibility"),
        ["You are not allowed to create public content."]
    );
    assert!(note.is_new());
    assert_eq!(h.store.record_count(), 0);
    assert_eq!(h.store.envelope_count(), 0);
    assert!(h.service.find::<Note>(1).await.unwrap().is_none());

    note.set_visibility(Visibility::Private);
    h.service.save(&mut note, &creator).await.unwrap();

    assert_eq!(note.owner(), Some(creator.id));
    assert!(note.is_owner(Some(&creator), &UserContext::anonymous()));
    assert!(!note.is_owner(Some(&other), &UserContext::anonymous()));
    assert!(note.is_owner(None, &creator));
}

#[tokio::test]
async fn saved_entity_loads_with_same_envelope_fields() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();
    h.allow_public(space.id, &creator);

    for visibility in [Visibility::Private, Visibility::Public, Visibility::OwnerOnly] {
        let mut note = in_space(Note::new("Round trip"), &space, visibility);
        h.service.save(&mut note, &creator).await.unwrap();

        let loaded = h.service.load::<Note>(note.id().unwrap()).await.unwrap();
        assert_eq!(loaded.binding_state(), BindingState::Linked);
        assert_eq!(loaded.visibility(), Some(visibility));
        assert_eq!(loaded.container(), Some(space.id));
        assert_eq!(loaded.owner(), Some(creator.id));
        assert_eq!(loaded.record(), note.record());
    }
}

#[tokio::test]
async fn envelope_assigned_before_save_is_the_one_persisted() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    let mut note = ContentBearing::new(Note::new("Draft title"));
    let first = note.envelope() as *const ContentEnvelope;
    let second = note.envelope() as *const ContentEnvelope;
    assert_eq!(first, second);

    note.set_container(space.id);
    note.set_title("Kept");
    let envelope_id = note.envelope().id;

    h.service.save(&mut note, &creator).await.unwrap();

    let stored = h
        .store
        .find_envelope("note", note.id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id, envelope_id);
    assert_eq!(stored.title.as_deref(), Some("Kept"));
    assert_eq!(stored.object_type.as_deref(), Some("note"));
    assert_eq!(stored.stream_channel.as_deref(), Some("default"));
}

#[tokio::test]
async fn record_validation_is_reported_after_envelope() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    let mut note = in_space(Note::new("   "), &space, Visibility::Private);
    let err = h.service.save(&mut note, &creator).await.unwrap_err();

    assert!(matches!(err, ContentError::Validation(_)));
    assert!(err.validation_errors().unwrap().has("message"));
    assert_eq!(h.store.record_count(), 0);
}

#[tokio::test]
async fn unregistered_family_and_missing_container_are_configuration_errors() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    let mut draft = in_space(
        Draft {
            body: "unsaved".into(),
        },
        &space,
        Visibility::Private,
    );
    let err = h.service.save(&mut draft, &creator).await.unwrap_err();
    assert!(matches!(err, ContentError::Configuration(_)));

    let mut note = ContentBearing::new(Note::new("Nowhere"));
    let err = h.service.save(&mut note, &creator).await.unwrap_err();
    assert!(matches!(err, ContentError::Configuration(_)));
    assert_eq!(h.store.record_count(), 0);
}

#[tokio::test]
async fn update_does_not_need_create_permission() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    let mut note = in_space(Note::new("v1"), &space, Visibility::Private);
    h.service.save(&mut note, &creator).await.unwrap();

    h.permissions
        .revoke_members(space.id, &Capability::CreateContent("note".into()));
    note.record_mut().message = "v2".into();
    h.service.save(&mut note, &creator).await.unwrap();

    let loaded = h.service.load::<Note>(note.id().unwrap()).await.unwrap();
    assert_eq!(loaded.record().message, "v2");
    assert_eq!(h.store.envelope_count(), 1);
}

#[tokio::test]
async fn failed_insert_rolls_back_and_leaves_entity_unlinked() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    // An orphan already holds the pointer the first note will get.
    let mut orphan = ContentEnvelope::new();
    orphan.declare_owner_type("note");
    orphan.object_id = Some(1);
    orphan.container = Some(space.id);
    h.store.put_envelope_unchecked(orphan);

    let mut note = in_space(Note::new("Collides"), &space, Visibility::Private);
    let err = h.service.save(&mut note, &creator).await.unwrap_err();

    assert!(matches!(err, ContentError::Internal(_)));
    assert!(note.is_new());
    assert_eq!(note.binding_state(), BindingState::Materialized);
    assert_eq!(h.store.record_count(), 0);
    assert_eq!(h.store.envelope_count(), 1);
}

// ============================================================================
// Follow side effects
// ============================================================================

#[tokio::test]
async fn creator_follows_new_content_unless_disabled() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    let mut note = in_space(Note::new("Watch me"), &space, Visibility::Private);
    h.service.save(&mut note, &creator).await.unwrap();
    assert_eq!(
        h.follows
            .followers(&FollowTarget::new("note", note.id().unwrap())),
        vec![creator.id]
    );

    let mut task = in_space(Task::new("Quiet"), &space, Visibility::Private);
    h.service.save(&mut task, &creator).await.unwrap();
    assert!(
        h.follows
            .followers(&FollowTarget::new("task", task.id().unwrap()))
            .is_empty()
    );
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn delete_removes_entity_and_envelope() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    let mut note = in_space(Note::new("Short lived"), &space, Visibility::Private);
    h.service.save(&mut note, &creator).await.unwrap();
    let id = note.id().unwrap();

    h.service.delete(&mut note, &creator).await.unwrap();

    assert_eq!(note.binding_state(), BindingState::Deleted);
    assert!(h.service.find::<Note>(id).await.unwrap().is_none());
    assert!(h.store.find_envelope("note", id).await.unwrap().is_none());
    assert_eq!(h.store.record_count(), 0);
    assert_eq!(h.store.envelope_count(), 0);

    let err = h.service.delete(&mut note, &creator).await.unwrap_err();
    assert!(matches!(err, ContentError::Configuration(_)));
}

#[tokio::test]
async fn delete_tolerates_missing_envelope() {
    for policy in [MissingEnvelopePolicy::Report, MissingEnvelopePolicy::Tolerate] {
        let types = ContentTypeRegistry::new();
        types.register::<Note>("Note", "").unwrap();
        let h = TestHarness::with_types(types, policy);
        let space = h.space("Team");
        let creator = h.member();

        let mut note = in_space(Note::new("Orphaned"), &space, Visibility::Private);
        h.service.save(&mut note, &creator).await.unwrap();
        let envelope_id = note.envelope().id;
        h.store.remove_envelope_unchecked(envelope_id);

        let mut loaded = h.service.load::<Note>(note.id().unwrap()).await.unwrap();
        assert_eq!(loaded.binding_state(), BindingState::Unbound);

        h.service.delete(&mut loaded, &creator).await.unwrap();
        assert_eq!(h.store.record_count(), 0);
    }
}

// ============================================================================
// Move
// ============================================================================

#[tokio::test]
async fn move_disabled_is_denied_unless_forced() {
    let h = TestHarness::new();
    let from = h.space("From");
    let to = h.space("To");
    let creator = h.member();

    let mut note = in_space(Note::new("Stay"), &from, Visibility::Private);
    h.service.save(&mut note, &creator).await.unwrap();

    let check = h.service.can_move(&note, &to, &creator).await.unwrap();
    assert_eq!(check.reason(), Some(MOVE_DISABLED));

    let outcome = h
        .service
        .move_entity(&mut note, &to, false, &creator)
        .await
        .unwrap();
    assert!(matches!(outcome, MoveOutcome::Denied(ref d) if d.reason == MOVE_DISABLED));
    assert_eq!(note.container(), Some(from.id));

    let outcome = h
        .service
        .move_entity(&mut note, &to, true, &creator)
        .await
        .unwrap();
    assert!(outcome.is_moved());
    assert_eq!(note.container(), Some(to.id));

    let stored = h
        .store
        .find_envelope("note", note.id().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.container, Some(to.id));
}

#[tokio::test]
async fn post_moves_where_actor_may_create_posts() {
    let h = TestHarness::new();
    let from = h.space("From");
    let creator = h.member();

    let locked = Container::space("Locked", None);
    h.containers.insert(locked.clone());
    let open = h.space("Open");

    let mut post = in_space(Post::new("Travelling"), &from, Visibility::Private);
    h.service.save(&mut post, &creator).await.unwrap();

    let check = h.service.can_move(&post, &locked, &creator).await.unwrap();
    assert_eq!(check.reason(), Some(MOVE_NOT_PERMITTED));

    let outcome = h
        .service
        .move_entity(&mut post, &open, false, &creator)
        .await
        .unwrap();
    assert!(outcome.is_moved());
    assert_eq!(post.record().moved_to, Some(open.id.0));
    assert_eq!(post.container(), Some(open.id));
}

#[tokio::test]
async fn task_moves_freely() {
    let h = TestHarness::new();
    let from = h.space("From");
    let to = Container::space("Anywhere", None);
    h.containers.insert(to.clone());
    let creator = h.member();

    let mut task = in_space(Task::new("Portable"), &from, Visibility::Private);
    h.service.save(&mut task, &creator).await.unwrap();

    let check = h.service.can_move(&task, &to, &creator).await.unwrap();
    assert!(check.is_allowed());
}

// ============================================================================
// Labels
// ============================================================================

#[tokio::test]
async fn labels_are_sorted_and_stable() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();
    h.allow_public(space.id, &creator);

    let mut announcement = in_space(
        Announcement {
            message: "Office closed".into(),
            urgent: true,
        },
        &space,
        Visibility::Public,
    );
    announcement.envelope_mut().pin();
    h.service.save(&mut announcement, &creator).await.unwrap();

    let topics = vec!["facilities".to_string()];
    let labels = announcement.labels(&topics);
    let texts: Vec<_> = labels.iter().map(|l| l.text.as_str()).collect();
    assert_eq!(
        texts,
        vec!["Pinned", "Urgent", "Public", "Announcement", "facilities"]
    );
    assert!(labels.windows(2).all(|w| w[0].sort_order <= w[1].sort_order));
    assert_eq!(labels[4].kind, LabelKind::Topic);
    assert_eq!(announcement.labels(&topics), labels);
}

// ============================================================================
// Polymorphic queries
// ============================================================================

#[tokio::test]
async fn family_ids_collide_without_leaking() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    let mut note = in_space(Note::new("Note one"), &space, Visibility::Private);
    let mut post = in_space(Post::new("Post one"), &space, Visibility::Private);
    h.service.save(&mut note, &creator).await.unwrap();
    h.service.save(&mut post, &creator).await.unwrap();
    assert_eq!(note.id(), Some(1));
    assert_eq!(post.id(), Some(1));

    let notes = h
        .service
        .fetch(&h.service.query::<Note>().in_container(space.id))
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes.entities[0].record().message, "Note one");

    h.service.delete(&mut note, &creator).await.unwrap();
    let post = h.service.load::<Post>(1).await.unwrap();
    assert_eq!(post.binding_state(), BindingState::Linked);
    assert_eq!(h.store.envelope_count(), 1);
}

#[tokio::test]
async fn subtypes_share_the_base_family() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    let mut post = in_space(Post::new("Plain"), &space, Visibility::Private);
    let mut announcement = in_space(
        Announcement {
            message: "Loud".into(),
            urgent: false,
        },
        &space,
        Visibility::Private,
    );
    h.service.save(&mut post, &creator).await.unwrap();
    h.service.save(&mut announcement, &creator).await.unwrap();

    assert_eq!(announcement.id(), Some(2));
    assert_eq!(announcement.base_type(), Post::OBJECT_TYPE);
    assert_eq!(
        announcement.peek_envelope().unwrap().object_type.as_deref(),
        Some("post")
    );

    let all_posts = h.service.fetch(&h.service.query::<Post>()).await.unwrap();
    assert_eq!(all_posts.len(), 2);

    let announcements = h
        .service
        .fetch(&h.service.query::<Announcement>())
        .await
        .unwrap();
    assert_eq!(announcements.len(), 1);
    assert_eq!(announcements.entities[0].record().message, "Loud");

    assert!(h.service.find::<Announcement>(1).await.unwrap().is_none());
}

#[tokio::test]
async fn subtype_loaded_as_base_cannot_be_saved() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    let mut announcement = in_space(
        Announcement {
            message: "Loud".into(),
            urgent: true,
        },
        &space,
        Visibility::Private,
    );
    h.service.save(&mut announcement, &creator).await.unwrap();
    let id = announcement.id().unwrap();

    let mut as_post = h.service.load::<Post>(id).await.unwrap();
    assert_eq!(as_post.record().message, "Loud");
    assert_eq!(as_post.stored_type(), Some("announcement"));

    as_post.record_mut().message = "Quiet".into();
    let err = h.service.save(&mut as_post, &creator).await.unwrap_err();
    assert!(matches!(err, ContentError::Configuration(_)));

    let row = h.store.find_record("post", id).await.unwrap().unwrap();
    assert_eq!(row.concrete_type, "announcement");

    let reloaded = h.service.find::<Announcement>(id).await.unwrap().unwrap();
    assert_eq!(reloaded.record().message, "Loud");
    assert!(reloaded.record().urgent);

    let mut own_type = reloaded;
    own_type.record_mut().urgent = false;
    h.service.save(&mut own_type, &creator).await.unwrap();
    let row = h.store.find_record("post", id).await.unwrap().unwrap();
    assert_eq!(row.concrete_type, "announcement");
    assert_eq!(row.fields["urgent"], false);
}

#[tokio::test]
async fn query_filters_and_counts() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let elsewhere = h.space("Elsewhere");
    let creator = h.member();

    for i in 0..3 {
        let mut note = in_space(Note::new(format!("note {i}")), &space, Visibility::Private);
        if i == 0 {
            note.envelope_mut().archive();
        }
        h.service.save(&mut note, &creator).await.unwrap();
    }
    let mut away = in_space(Note::new("away"), &elsewhere, Visibility::Private);
    h.service.save(&mut away, &creator).await.unwrap();

    let mut task = in_space(Task::new("hidden"), &space, Visibility::Private);
    h.service.save(&mut task, &creator).await.unwrap();

    let store = h.service.store();
    let in_team = PolymorphicQuery::<Note>::new().in_container(space.id);
    assert_eq!(in_team.count(store).await.unwrap(), 3);
    assert_eq!(in_team.clone().archived(false).count(store).await.unwrap(), 2);
    assert_eq!(in_team.clone().limit(2).fetch(store).await.unwrap().len(), 2);
    assert_eq!(
        in_team
            .clone()
            .created_by(creator.id)
            .on_stream()
            .count(store)
            .await
            .unwrap(),
        3
    );

    let surfaced_tasks = PolymorphicQuery::<Task>::new().on_stream();
    assert_eq!(surfaced_tasks.count(store).await.unwrap(), 0);
    assert_eq!(PolymorphicQuery::<Task>::new().count(store).await.unwrap(), 1);
}

#[tokio::test]
async fn dangling_envelopes_are_reported() {
    let h = TestHarness::new();
    let space = h.space("Team");
    let creator = h.member();

    let mut note = in_space(Note::new("Real"), &space, Visibility::Private);
    h.service.save(&mut note, &creator).await.unwrap();

    let mut orphan = ContentEnvelope::new();
    orphan.declare_owner_type("note");
    orphan.object_id = Some(99);
    orphan.container = Some(space.id);
    let orphan_id = orphan.id;
    h.store.put_envelope_unchecked(orphan);

    let results = h.service.fetch(&h.service.query::<Note>()).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results.dangling.len(), 1);
    assert_eq!(results.dangling[0].id, orphan_id);

    let dangling = h.store.dangling_envelopes(Some("note")).await.unwrap();
    assert_eq!(dangling.len(), 1);
    assert!(h.store.dangling_envelopes(Some("post")).await.unwrap().is_empty());
}
