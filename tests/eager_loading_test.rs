//! Tests for eager-load resolution and relation hydration

mod common;

use common::{ids, Fixture};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tasker_orm::{
    EagerLoadSpec, Include, Model, ModelType, OrmConfig, OrmError, Related,
};

fn related_ids(model: &Model, relation: &str) -> Vec<i64> {
    ids(model.relation(relation).map(Related::as_many).unwrap_or_default())
}

#[tokio::test]
async fn test_has_many_uses_one_query_for_all_owners() {
    let fixture = Fixture::blog(6);
    let mut query = fixture.ctx.query("User").unwrap();
    query.with("posts");

    let users = query.get().await.unwrap();

    assert_eq!(fixture.store.query_count(), 2);
    assert_eq!(fixture.store.query_count_for("posts"), 1);
    assert_eq!(related_ids(&users[0], "posts"), vec![1, 4]);
    assert_eq!(related_ids(&users[1], "posts"), vec![2, 5]);
    assert_eq!(related_ids(&users[2], "posts"), vec![3, 6]);
}

#[tokio::test]
async fn test_nested_relations_use_one_query_per_level() {
    let fixture = Fixture::blog(30);
    let mut query = fixture.ctx.query("User").unwrap();
    query.with("posts.comments");

    let users = query.get().await.unwrap();

    assert_eq!(fixture.store.query_count_for("posts"), 1);
    assert_eq!(fixture.store.query_count_for("comments"), 1);
    assert_eq!(fixture.store.query_count(), 3);

    let posts = users[0].relation("posts").unwrap().as_many();
    assert_eq!(posts.len(), 10);
    assert!(posts.iter().all(|post| related_ids(post, "comments").len() == 2));
}

#[tokio::test]
async fn test_constrained_parent_with_nested_child_on_fifty_owners() {
    let fixture = Fixture::blog(50);
    let spec = vec![
        Include::constrained("comments", |relation| {
            relation.query_mut().where_eq("approved", true);
        }),
        Include::path("comments.author"),
    ];

    let parsed = EagerLoadSpec::parse(spec.clone());
    assert_eq!(parsed.keys(), vec!["comments", "comments.author"]);
    assert!(!parsed.get("comments").unwrap().is_noop());
    assert!(parsed.get("comments.author").unwrap().is_noop());

    let mut query = fixture.ctx.query("Post").unwrap();
    query.with(spec);
    let posts = query.get().await.unwrap();
    assert_eq!(posts.len(), 50);

    // One statement for posts, then one per eager-loaded level
    assert_eq!(fixture.store.query_count(), 3);
    assert_eq!(fixture.store.query_count_for("comments"), 1);
    assert_eq!(fixture.store.query_count_for("users"), 1);

    for post in &posts {
        let post_id = post.key().and_then(|key| key.as_i64()).unwrap();
        let comments = post.relation("comments").unwrap().as_many();
        assert_eq!(ids(comments), vec![2 * post_id - 1]);

        let author = comments[0].relation("author").and_then(Related::as_one).unwrap();
        assert_eq!(author.key(), Some(&json!(post_id % 3 + 1)));
    }
}

#[tokio::test]
async fn test_constraints_for_one_path_run_in_registration_order() {
    let fixture = Fixture::blog(3);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut query = fixture.ctx.query("Post").unwrap();
    query.with_constraint("comments", {
        let seen = Arc::clone(&seen);
        move |relation| {
            seen.lock().push(("first", relation.query().statement().wheres().len()));
            relation.query_mut().where_eq("approved", true);
        }
    });
    query.with_constraint("comments", {
        let seen = Arc::clone(&seen);
        move |relation| {
            // Sees the predicate the first constraint added to the same query
            seen.lock().push(("second", relation.query().statement().wheres().len()));
            relation.query_mut().where_eq("user_id", 2);
        }
    });

    let posts = query.get().await.unwrap();

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "first");
    assert_eq!(seen[1].0, "second");
    assert_eq!(seen[1].1, seen[0].1 + 1);

    // Post 1's approved comment is by user 2; posts 2 and 3 have none by user 2
    assert_eq!(related_ids(&posts[0], "comments"), vec![1]);
    assert!(related_ids(&posts[1], "comments").is_empty());
    assert!(related_ids(&posts[2], "comments").is_empty());
}

#[tokio::test]
async fn test_nested_include_syntax() {
    let fixture = Fixture::blog(3);
    let mut query = fixture.ctx.query("User").unwrap();
    query.with(Include::nested("posts", vec!["comments", "tags"]));

    assert_eq!(
        query.eager_load().keys(),
        vec!["posts", "posts.comments", "posts.tags"]
    );

    let users = query.get().await.unwrap();
    let post = &users[0].relation("posts").unwrap().as_many()[0];
    assert!(post.relation_loaded("comments"));
    assert!(post.relation_loaded("tags"));
}

#[tokio::test]
async fn test_column_selection_in_path() {
    let fixture = Fixture::blog(3);
    let mut query = fixture.ctx.query("User").unwrap();
    query.with("posts:id,user_id,title");

    let users = query.get().await.unwrap();
    let post = &users[0].relation("posts").unwrap().as_many()[0];
    assert_eq!(post.attributes().len(), 3);
    assert!(post.get("votes").is_none());
    assert_eq!(post.get("title"), Some(&json!("Post 1")));
}

#[tokio::test]
async fn test_last_column_selection_wins_for_a_path() {
    let fixture = Fixture::blog(3);
    let mut query = fixture.ctx.query("User").unwrap();
    query.with(vec!["posts:id,user_id", "posts:id,user_id,title"]);

    let users = query.get().await.unwrap();
    assert_eq!(fixture.store.query_count_for("posts"), 1);

    let post = &users[0].relation("posts").unwrap().as_many()[0];
    assert_eq!(post.attributes().len(), 3);
    assert_eq!(post.get("title"), Some(&json!("Post 1")));
}

#[tokio::test]
async fn test_column_selection_on_pivot_relation_is_table_qualified() {
    let fixture = Fixture::blog(3);
    let mut query = fixture.ctx.query("Post").unwrap();
    query.with("tags:id,name");

    let posts = query.get().await.unwrap();

    let tag_queries: Vec<String> = fixture
        .store
        .queries()
        .into_iter()
        .filter(|entry| entry.table == "tags")
        .map(|entry| entry.sql)
        .collect();
    assert_eq!(tag_queries.len(), 1);
    assert!(
        tag_queries[0].starts_with("SELECT tags.id, tags.name, post_tag.post_id as pivot_post_id"),
        "unexpected sql: {}",
        tag_queries[0]
    );

    let tags = posts[0].relation("tags").unwrap().as_many();
    let names: Vec<_> = tags.iter().filter_map(|tag| tag.get("name")).collect();
    assert_eq!(names, vec![&json!("rust"), &json!("sql")]);
    // `id` resolves to the tag's key, not the pivot row's
    assert_eq!(ids(tags), vec![1, 2]);
    assert!(tags[0].relation("pivot").is_some());
}

#[tokio::test]
async fn test_belongs_to_and_has_one() {
    let fixture = Fixture::blog(6);

    let mut posts = fixture.ctx.query("Post").unwrap();
    posts.with("author");
    let posts = posts.get().await.unwrap();
    let author = posts[4].relation("author").and_then(Related::as_one).unwrap();
    assert_eq!(author.get("name"), Some(&json!("Grace")));

    let mut users = fixture.ctx.query("User").unwrap();
    users.with("latest_post");
    let users = users.get().await.unwrap();
    let latest = users[2].relation("latest_post").and_then(Related::as_one).unwrap();
    assert_eq!(latest.key(), Some(&json!(3)));
}

#[tokio::test]
async fn test_owner_without_matches_gets_empty_default() {
    let fixture = Fixture::blog(2);
    let mut query = fixture.ctx.query("User").unwrap();
    query.with(vec!["posts", "latest_post"]);

    let users = query.get().await.unwrap();
    let linus = &users[2];
    assert_eq!(linus.relation("posts"), Some(&Related::Many(Vec::new())));
    assert_eq!(linus.relation("latest_post"), Some(&Related::One(None)));
}

#[tokio::test]
async fn test_many_to_many_attaches_pivot_attributes() {
    let fixture = Fixture::blog(3);
    let mut query = fixture.ctx.query("Post").unwrap();
    query.with("tags");

    let posts = query.get().await.unwrap();
    assert_eq!(fixture.store.query_count_for("tags"), 1);

    let tags = posts[0].relation("tags").unwrap().as_many();
    let names: Vec<_> = tags.iter().filter_map(|tag| tag.get("name")).collect();
    assert_eq!(names, vec![&json!("rust"), &json!("sql")]);

    let pivot = tags[1].relation("pivot").and_then(Related::as_one).unwrap();
    assert_eq!(pivot.get("position"), Some(&json!(2)));
    assert_eq!(pivot.get("post_id"), Some(&json!(1)));
    assert!(tags[1].get("pivot_position").is_none());

    assert_eq!(related_ids(&posts[1], "tags"), vec![2]);
    assert!(related_ids(&posts[2], "tags").is_empty());
}

#[tokio::test]
async fn test_has_many_through_matches_on_intermediate_key() {
    let fixture = Fixture::blog(6);
    let mut query = fixture.ctx.query("Country").unwrap();
    query.with("posts");

    let countries = query.get().await.unwrap();
    assert_eq!(fixture.store.query_count(), 2);
    assert_eq!(related_ids(&countries[0], "posts"), vec![1, 2, 4, 5]);
    assert_eq!(related_ids(&countries[1], "posts"), vec![3, 6]);

    let post = &countries[0].relation("posts").unwrap().as_many()[0];
    assert!(post.get("through_key").is_none());
    assert_eq!(post.get("title"), Some(&json!("Post 1")));
}

#[tokio::test]
async fn test_polymorphic_relations_filter_on_type() {
    let fixture = Fixture::blog(2);

    let mut posts = fixture.ctx.query("Post").unwrap();
    posts.with("image");
    let posts = posts.get().await.unwrap();
    let image = posts[0].relation("image").and_then(Related::as_one).unwrap();
    assert_eq!(image.get("url"), Some(&json!("post-1.png")));
    assert_eq!(posts[1].relation("image"), Some(&Related::One(None)));

    let mut videos = fixture.ctx.query("Video").unwrap();
    videos.with("images");
    let videos = videos.get().await.unwrap();
    assert_eq!(related_ids(&videos[0], "images"), vec![2, 3]);
}

#[tokio::test]
async fn test_unknown_relation_fails() {
    let fixture = Fixture::blog(2);

    let mut query = fixture.ctx.query("Post").unwrap();
    query.with("reviews");
    match query.get().await {
        Err(OrmError::RelationNotFound { model, relation }) => {
            assert_eq!(model, "Post");
            assert_eq!(relation, "reviews");
        }
        other => panic!("expected RelationNotFound, got {other:?}"),
    }

    let mut nested = fixture.ctx.query("Post").unwrap();
    nested.with("comments.reactions");
    assert!(matches!(
        nested.get().await,
        Err(OrmError::RelationNotFound { model, .. }) if model == "Comment"
    ));
}

#[tokio::test]
async fn test_empty_result_issues_no_relation_queries() {
    let fixture = Fixture::blog(3);
    let mut query = fixture.ctx.query("Post").unwrap();
    query.where_eq("id", 999).with("comments.author");

    assert!(query.get().await.unwrap().is_empty());
    assert_eq!(fixture.store.query_count(), 1);
}

#[tokio::test]
async fn test_relation_query_applies_related_global_scopes() {
    let fixture = Fixture::blog(3);
    fixture.ctx.register(
        ModelType::builder("Comment")
            .global_scope("approved", |query| {
                query.where_eq("approved", true);
            })
            .build(),
    );

    let mut query = fixture.ctx.query("Post").unwrap();
    query.with("comments");
    let posts = query.get().await.unwrap();
    assert!(posts.iter().all(|post| related_ids(post, "comments").len() == 1));
}

#[tokio::test]
async fn test_default_eager_loads_and_without() {
    let fixture = Fixture::blog(3);
    fixture.ctx.register(
        ModelType::builder("Comment")
            .relation("author", |comment| comment.belongs_to("User", "user_id", "id"))
            .with(&["author"])
            .build(),
    );

    let comments = fixture.ctx.query("Comment").unwrap().get().await.unwrap();
    assert!(comments.iter().all(|comment| comment.relation_loaded("author")));
    assert_eq!(fixture.store.query_count(), 2);

    fixture.store.flush_query_log();
    let mut query = fixture.ctx.query("Comment").unwrap();
    query.without(&["author"]);
    let comments = query.get().await.unwrap();
    assert!(comments.iter().all(|comment| !comment.relation_loaded("author")));
    assert_eq!(fixture.store.query_count(), 1);
}

#[tokio::test]
async fn test_load_onto_fetched_models() {
    let fixture = Fixture::blog(6);
    let query = fixture.ctx.query("User").unwrap();
    let mut users = query.get().await.unwrap();

    query.load(&mut users, vec!["posts", "country"]).await.unwrap();

    assert_eq!(fixture.store.query_count(), 3);
    assert_eq!(related_ids(&users[1], "posts"), vec![2, 5]);
    let country = users[2].relation("country").and_then(Related::as_one).unwrap();
    assert_eq!(country.get("name"), Some(&json!("Japan")));
}

#[tokio::test]
async fn test_lazy_loading_is_rejected_for_multi_row_results() {
    let config = OrmConfig {
        prevent_lazy_loading: true,
        ..OrmConfig::default()
    };
    let fixture = Fixture::blog_with_config(6, config);

    let mut users = fixture.ctx.query("User").unwrap().get().await.unwrap();
    assert!(users[0].prevents_lazy_loading());
    assert!(matches!(
        users[0].related(&fixture.ctx, "posts").await,
        Err(OrmError::LazyLoadingViolation { .. })
    ));

    // A single fetched model may lazy load
    let mut user = fixture.ctx.query("User").unwrap().first().await.unwrap().unwrap();
    assert!(!user.prevents_lazy_loading());
    let posts = user.related(&fixture.ctx, "posts").await.unwrap();
    assert_eq!(ids(posts.as_many()), vec![1, 4]);
}

#[tokio::test]
async fn test_eager_loaded_relation_is_readable_when_lazy_loading_is_prevented() {
    let config = OrmConfig {
        prevent_lazy_loading: true,
        ..OrmConfig::default()
    };
    let fixture = Fixture::blog_with_config(6, config);

    let mut query = fixture.ctx.query("User").unwrap();
    query.with("posts");
    let mut users = query.get().await.unwrap();
    let posts = users[0].related(&fixture.ctx, "posts").await.unwrap();
    assert_eq!(posts.len(), 2);
}

#[tokio::test]
async fn test_lazy_loading_issues_one_query_per_model() {
    let fixture = Fixture::blog(6);
    let mut posts = fixture.ctx.query("Post").unwrap().get().await.unwrap();
    fixture.store.flush_query_log();

    for post in posts.iter_mut() {
        post.related(&fixture.ctx, "author").await.unwrap();
    }

    assert_eq!(fixture.store.query_count(), 6);
    let author = posts[3].relation("author").and_then(Related::as_one).unwrap();
    assert_eq!(author.key(), Some(&json!(1)));
}

#[tokio::test]
async fn test_dynamic_relation_registration() {
    let fixture = Fixture::blog(3);
    let user_type = fixture.ctx.model("User").unwrap();
    user_type.resolve_relation_using("authored_comments", |user| {
        user.has_many("Comment", "user_id", "id")
    });

    let mut query = fixture.ctx.query("User").unwrap();
    query.with("authored_comments");
    let users = query.get().await.unwrap();
    assert_eq!(related_ids(&users[0], "authored_comments"), vec![4, 5]);
}
