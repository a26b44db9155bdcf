//! Shared fixtures for the integration suite: a small blog schema
//! (countries, users, posts, comments, tags, images, videos) seeded into a
//! [`MemoryRowStore`].

#![allow(dead_code)]

pub mod strategies;

use serde_json::{json, Value};
use std::sync::Arc;
use tasker_orm::{MemoryRowStore, ModelType, OrmConfig, OrmContext, Row};

pub struct Fixture {
    pub store: Arc<MemoryRowStore>,
    pub ctx: Arc<OrmContext>,
}

impl Fixture {
    /// Blog schema with `post_count` posts spread over three users
    pub fn blog(post_count: usize) -> Self {
        Self::blog_with_config(post_count, OrmConfig::default())
    }

    pub fn blog_with_config(post_count: usize, config: OrmConfig) -> Self {
        let store = Arc::new(MemoryRowStore::new().with_unique("users", &["email"]));
        seed_blog(&store, post_count);

        let ctx = OrmContext::new(store.clone(), config);
        register_blog_models(&ctx);
        store.flush_query_log();
        Self { store, ctx }
    }

    /// A context over an empty store
    pub fn empty(config: OrmConfig) -> Self {
        let store = Arc::new(MemoryRowStore::new());
        let ctx = OrmContext::new(store.clone(), config);
        Self { store, ctx }
    }
}

pub fn register_blog_models(ctx: &Arc<OrmContext>) {
    ctx.register(
        ModelType::builder("Country")
            .table("countries")
            .relation("users", |country| country.has_many("User", "country_id", "id"))
            .relation("posts", |country| {
                country.has_many_through("Post", "User", "country_id", "user_id")
            })
            .build(),
    );

    ctx.register(
        ModelType::builder("User")
            .relation("posts", |user| user.has_many("Post", "user_id", "id"))
            .relation("latest_post", |user| user.has_one("Post", "user_id", "id"))
            .relation("country", |user| user.belongs_to("Country", "country_id", "id"))
            .scope("scopeOnlyActive", |query, _args| {
                query.where_eq("active", true);
                Ok(())
            })
            .build(),
    );

    ctx.register(
        ModelType::builder("Post")
            .relation("author", |post| post.belongs_to("User", "user_id", "id"))
            .relation("comments", |post| post.has_many("Comment", "post_id", "id"))
            .relation("tags", |post| {
                post.belongs_to_many("Tag", "post_tag", "post_id", "tag_id")
                    .with_pivot(&["position"])
            })
            .relation("image", |post| post.morph_one("Image", "imageable"))
            .build(),
    );

    ctx.register(
        ModelType::builder("Comment")
            .relation("author", |comment| comment.belongs_to("User", "user_id", "id"))
            .relation("post", |comment| comment.belongs_to("Post", "post_id", "id"))
            .build(),
    );

    ctx.register(
        ModelType::builder("Tag")
            .relation("posts", |tag| tag.belongs_to_many("Post", "post_tag", "tag_id", "post_id"))
            .build(),
    );

    ctx.register(ModelType::builder("Image").build());

    ctx.register(
        ModelType::builder("Video")
            .relation("images", |video| video.morph_many("Image", "imageable"))
            .build(),
    );
}

/// Seed rows. Post `i` belongs to user `(i - 1) % 3 + 1` and has two
/// comments: `2i - 1` (approved) and `2i` (pending).
pub fn seed_blog(store: &MemoryRowStore, post_count: usize) {
    store.seed(
        "countries",
        vec![json!({"id": 1, "name": "Norway"}), json!({"id": 2, "name": "Japan"})],
    );

    store.seed(
        "users",
        vec![
            json!({"id": 1, "name": "Ada", "email": "ada@example.com", "active": true, "country_id": 1}),
            json!({"id": 2, "name": "Grace", "email": "grace@example.com", "active": false, "country_id": 1}),
            json!({"id": 3, "name": "Linus", "email": "linus@example.com", "active": true, "country_id": 2}),
        ],
    );

    let posts = (1..=post_count).map(|id| {
        json!({
            "id": id,
            "user_id": (id - 1) % 3 + 1,
            "title": format!("Post {id}"),
            "votes": id * 10,
        })
    });
    store.seed("posts", posts);

    let comments = (1..=post_count).flat_map(|post| {
        [
            json!({"id": 2 * post - 1, "post_id": post, "user_id": post % 3 + 1, "approved": true}),
            json!({"id": 2 * post, "post_id": post, "user_id": (post + 1) % 3 + 1, "approved": false}),
        ]
    });
    store.seed("comments", comments);

    store.seed(
        "tags",
        vec![json!({"id": 1, "name": "rust"}), json!({"id": 2, "name": "sql"})],
    );
    store.seed(
        "post_tag",
        vec![
            json!({"post_id": 1, "tag_id": 1, "position": 1}),
            json!({"post_id": 1, "tag_id": 2, "position": 2}),
            json!({"post_id": 2, "tag_id": 2, "position": 1}),
        ],
    );

    store.seed("videos", vec![json!({"id": 1, "title": "Launch"})]);
    store.seed(
        "images",
        vec![
            json!({"id": 1, "imageable_type": "Post", "imageable_id": 1, "url": "post-1.png"}),
            json!({"id": 2, "imageable_type": "Video", "imageable_id": 1, "url": "launch-1.png"}),
            json!({"id": 3, "imageable_type": "Video", "imageable_id": 1, "url": "launch-2.png"}),
        ],
    );
}

/// Build a row from a JSON object literal
pub fn row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Primary keys of `models`, in order
pub fn ids(models: &[tasker_orm::Model]) -> Vec<i64> {
    models
        .iter()
        .filter_map(|model| model.key().and_then(Value::as_i64))
        .collect()
}
