//! Tests for dynamic method dispatch: macros, mixins, named scopes and
//! statement forwarding

mod common;

use common::{ids, Fixture};
use serde_json::{json, Value};
use std::sync::Arc;
use tasker_orm::registry::{Macro, MethodHandler, MethodResolver, Mixin, ResolverChain};
use tasker_orm::{Dispatched, ModelType, OrmConfig, OrmContext, OrmError, Query};

#[tokio::test]
async fn test_local_macro_shadows_global_macro() {
    let fixture = Fixture::blog(3);
    fixture
        .ctx
        .macros()
        .register("describe", |_, _| Ok(Some(json!("global"))));

    let mut query = fixture.ctx.query("Post").unwrap();
    assert_eq!(
        query.call("describe", &[]).await.unwrap(),
        Dispatched::Value(json!("global"))
    );

    query.local_macro("describe", |_, _| Ok(Some(json!("local"))));
    assert_eq!(
        query.call("describe", &[]).await.unwrap(),
        Dispatched::Value(json!("local"))
    );

    // Other queries still see the global macro
    let mut other = fixture.ctx.query("Post").unwrap();
    assert_eq!(
        other.call("describe", &[]).await.unwrap().into_value(),
        Some(json!("global"))
    );
}

#[tokio::test]
async fn test_global_macro_can_build_on_the_query() {
    let fixture = Fixture::blog(6);
    fixture.ctx.macros().register("popular", |query, args| {
        let threshold = args.first().cloned().unwrap_or(json!(30));
        Query::bound_macro_target(query, "popular")?.where_op("votes", ">=", threshold);
        Ok(None)
    });

    let mut query = fixture.ctx.query("Post").unwrap();
    assert_eq!(
        query.call("popular", &[json!(40)]).await.unwrap(),
        Dispatched::Chained
    );
    assert_eq!(ids(&query.get().await.unwrap()), vec![4, 5, 6]);
}

#[tokio::test]
async fn test_macro_requiring_a_query_rejects_static_calls() {
    let fixture = Fixture::blog(0);
    fixture.ctx.macros().register("popular", |query, _| {
        Query::bound_macro_target(query, "popular")?.where_op("votes", ">", 100);
        Ok(None)
    });

    assert!(matches!(
        fixture.ctx.macros().call_static("popular", &[]),
        Err(OrmError::InvalidArgument { .. })
    ));
}

struct Reporting;

impl Mixin for Reporting {
    fn macros(&self) -> Vec<(String, Macro)> {
        let titles: Macro = Arc::new(|query, _| {
            Query::bound_macro_target(query, "titles_only")?.select(&["id", "title"]);
            Ok(None)
        });
        let version: Macro = Arc::new(|_, _| Ok(Some(json!("v2"))));
        vec![
            ("titles_only".to_string(), titles),
            ("report_version".to_string(), version),
        ]
    }
}

#[tokio::test]
async fn test_mixin_registers_every_method() {
    let fixture = Fixture::blog(2);
    fixture
        .ctx
        .macros()
        .register("report_version", |_, _| Ok(Some(json!("v1"))));
    fixture.ctx.macros().mixin(&Reporting, false);

    let mut query = fixture.ctx.query("Post").unwrap();
    query.call("titles_only", &[]).await.unwrap();
    let posts = query.get().await.unwrap();
    assert_eq!(posts[0].attributes().len(), 2);

    // Existing names survive a non-replacing mixin
    assert_eq!(
        fixture.ctx.macros().call_static("report_version", &[]).unwrap(),
        Some(json!("v1"))
    );
    fixture.ctx.macros().mixin(&Reporting, true);
    assert_eq!(
        fixture.ctx.macros().call_static("report_version", &[]).unwrap(),
        Some(json!("v2"))
    );
}

#[tokio::test]
async fn test_named_scope_is_dispatched_and_grouped() {
    let fixture = Fixture::blog(6);
    fixture.ctx.register(
        ModelType::builder("Post")
            .scope("scopeFeatured", |query, _args| {
                query.where_op("votes", ">=", 60).or_where("title", "Post 1");
                Ok(())
            })
            .scope("by_author", |query, args| {
                let author = args
                    .first()
                    .cloned()
                    .ok_or_else(|| OrmError::invalid_argument("by_author", "expected an author id"))?;
                query.where_eq("user_id", author);
                Ok(())
            })
            .build(),
    );

    let mut query = fixture.ctx.query("Post").unwrap();
    query.where_eq("user_id", 3);
    query.call("featured", &[]).await.unwrap();
    assert_eq!(
        query.to_sql(),
        "SELECT * FROM posts WHERE user_id = 3 AND (votes >= 60 OR title = 'Post 1')"
    );
    assert_eq!(ids(&query.get().await.unwrap()), vec![6]);

    let mut by_author = fixture.ctx.query("Post").unwrap();
    by_author.call("scopeByAuthor", &[json!(2)]).await.unwrap();
    assert_eq!(ids(&by_author.get().await.unwrap()), vec![2, 5]);

    let mut missing = fixture.ctx.query("Post").unwrap();
    assert!(matches!(
        missing.call("by_author", &[]).await,
        Err(OrmError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn test_scope_method_invokes_named_scope() {
    let fixture = Fixture::blog(0);
    let mut query = fixture.ctx.query("User").unwrap();
    query.where_eq("name", "Grace").or_where("name", "Linus");
    query.scope("only_active", &[]).unwrap();

    assert_eq!(
        query.to_sql(),
        "SELECT * FROM users WHERE (name = 'Grace' OR name = 'Linus') AND active = true"
    );
    assert_eq!(ids(&query.get().await.unwrap()), vec![3]);
}

#[tokio::test]
async fn test_passthrough_methods_return_values() {
    let fixture = Fixture::blog(4);
    let mut query = fixture.ctx.query("Post").unwrap();
    query.where_op("votes", ">", 10);

    assert_eq!(query.call("count", &[]).await.unwrap(), Dispatched::Value(json!(3)));
    assert_eq!(
        query.call("max", &[json!("votes")]).await.unwrap(),
        Dispatched::Value(json!(40))
    );
    assert_eq!(
        query.call("exists", &[]).await.unwrap(),
        Dispatched::Value(json!(true))
    );
    assert_eq!(
        query.call("to_sql", &[]).await.unwrap(),
        Dispatched::Value(json!("SELECT * FROM posts WHERE votes > 10"))
    );
    assert_eq!(
        query.call("get_bindings", &[]).await.unwrap(),
        Dispatched::Value(json!([10]))
    );
    assert!(matches!(
        query.call("sum", &[]).await,
        Err(OrmError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn test_passthrough_respects_global_scopes() {
    let fixture = Fixture::blog(0);
    fixture.ctx.register(
        ModelType::builder("User")
            .global_scope("active", |query| {
                query.where_eq("active", true);
            })
            .build(),
    );

    let mut query = fixture.ctx.query("User").unwrap();
    assert_eq!(query.call("count", &[]).await.unwrap(), Dispatched::Value(json!(2)));
}

#[tokio::test]
async fn test_statement_methods_are_forwarded() {
    let fixture = Fixture::blog(6);
    let mut query = fixture.ctx.query("Post").unwrap();

    assert_eq!(
        query
            .call("where", &[json!("user_id"), json!(1)])
            .await
            .unwrap(),
        Dispatched::Chained
    );
    query
        .call("order_by", &[json!("votes"), json!("desc")])
        .await
        .unwrap();
    query.call("limit", &[json!(1)]).await.unwrap();

    let posts = query.get().await.unwrap();
    assert_eq!(ids(&posts), vec![4]);

    assert!(matches!(
        query.call("where", &[json!(1)]).await,
        Err(OrmError::InvalidArgument { .. })
    ));
}

#[tokio::test]
async fn test_unknown_method_is_a_bad_method_call() {
    let fixture = Fixture::blog(0);
    let mut query = fixture.ctx.query("Post").unwrap();

    match query.call("frobnicate", &[]).await {
        Err(OrmError::BadMethodCall { query_type, method }) => {
            assert_eq!(query_type, "Query<Post>");
            assert_eq!(method, "frobnicate");
        }
        other => panic!("expected BadMethodCall, got {other:?}"),
    }

    assert!(matches!(
        query.scope("nonexistent", &[]),
        Err(OrmError::BadMethodCall { .. })
    ));
}

#[derive(Debug)]
struct ShoutingResolver;

impl MethodResolver for ShoutingResolver {
    fn resolver_name(&self) -> &str {
        "shouting"
    }

    fn priority(&self) -> u32 {
        5
    }

    fn resolve(&self, _query: &Query, method: &str) -> Option<MethodHandler> {
        if !method.ends_with('!') {
            return None;
        }
        let body: Macro = Arc::new(|_, _: &[Value]| Ok(Some(json!("LOUD"))));
        Some(MethodHandler::GlobalMacro(body))
    }
}

#[tokio::test]
async fn test_custom_resolver_chain() {
    let fixture = Fixture::blog(0);
    let chain = ResolverChain::default_chain().with_resolver(Arc::new(ShoutingResolver));
    let ctx = OrmContext::with_resolver_chain(fixture.store.clone(), OrmConfig::default(), chain);
    ctx.register(ModelType::builder("Post").build());

    assert_eq!(ctx.dispatch_chain().resolver_names()[0], "shouting");

    let mut query = ctx.query("Post").unwrap();
    assert_eq!(
        query.call("hello!", &[]).await.unwrap().into_value(),
        Some(json!("LOUD"))
    );
    // Built-in resolution still applies behind the custom resolver
    assert_eq!(query.call("count", &[]).await.unwrap(), Dispatched::Value(json!(0)));
}
