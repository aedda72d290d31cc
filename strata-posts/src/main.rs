//! STRATA posts entry point.
//!
//! Loads the posts list and the users list through the cache and prints a
//! newest-first summary.

use std::sync::Arc;

use serde_json::Value;
use strata_cache::{select_all_entities, QueryData};
use strata_posts::endpoints::{GET_POSTS, GET_USERS};
use strata_posts::{posts_client, telemetry, ClientConfig, HttpTransport, PostsError};

#[tokio::main]
async fn main() -> Result<(), PostsError> {
    let config = ClientConfig::load()?;
    telemetry::init_tracing(config.log_filter.as_deref())?;

    let transport = Arc::new(HttpTransport::new(&config)?);
    let client = posts_client(transport, &config);
    let _eviction = client.spawn_eviction_task();

    let (posts, users) = futures_util::future::join(
        client.query(GET_POSTS, Value::Null),
        client.query(GET_USERS, Value::Null),
    )
    .await;
    let (posts, users) = (posts?, users?);

    let posts_state = posts.state();
    if let Some(error) = &posts_state.error {
        tracing::warn!(error = %error, "Posts unavailable");
        return Err(error.clone().into());
    }

    let users_state = users.state();
    let author = |user_id: Option<&Value>| -> String {
        user_id
            .and_then(strata_core::EntityId::from_json)
            .and_then(|id| strata_cache::select_by_id(&users_state, &id))
            .and_then(|user| user.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown author")
            .to_string()
    };

    for post in select_all_entities(&posts_state) {
        let title = post.get("title").and_then(Value::as_str).unwrap_or("");
        let reactions = post.reactions().map(|r| r.total()).unwrap_or(0);
        println!(
            "{:>4}  {}  {:<40}  by {}  ({} reactions)",
            post.id,
            post.get("date").and_then(Value::as_str).unwrap_or("-"),
            title,
            author(post.get("userId")),
            reactions
        );
    }

    let stats = client.stats();
    tracing::info!(
        entries = stats.entry_count,
        fetches = stats.fetches,
        posts = posts_state.data.as_deref().and_then(QueryData::as_entities).map_or(0, |s| s.len()),
        "Done"
    );
    Ok(())
}
