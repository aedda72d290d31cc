//! Posts API declaration.
//!
//! Reads provide `Post`/`User` tags, writes invalidate them. `addReaction`
//! patches the cached `getPosts` list optimistically and invalidates nothing.

use chrono::Utc;
use serde_json::{json, Map, Value};
use strata_cache::{
    EndpointRegistry, EntityAdapter, MutationEndpoint, OptimisticUpdate, QueryData,
    QueryEndpoint,
};
use strata_core::record::{DATE_FIELD, REACTIONS_FIELD};
use strata_core::{
    CacheError, CacheResult, EntityId, ReactionKind, Reactions, Record, RequestDescriptor,
    ShapingError, Tag,
};

use crate::backfill::{format_timestamp, shape_post, shape_posts, POSTS_ADAPTER};

pub const GET_POSTS: &str = "getPosts";
pub const GET_POST: &str = "getPost";
pub const GET_POSTS_BY_USER_ID: &str = "getPostsByUserId";
pub const GET_USERS: &str = "getUsers";
pub const ADD_NEW_POST: &str = "addNewPost";
pub const UPDATE_POST: &str = "updatePost";
pub const DELETE_POST: &str = "deletePost";
pub const ADD_REACTION: &str = "addReaction";

pub const POST: &str = "Post";
pub const USER: &str = "User";

/// Every posts endpoint, ready to hand to a `QueryClient`.
pub fn posts_registry() -> EndpointRegistry {
    EndpointRegistry::new()
        .query(
            GET_POSTS,
            QueryEndpoint::new(get_posts_request)
                .shape_with(shape_posts)
                .provides(post_list_and_ids),
        )
        .query(
            GET_POST,
            QueryEndpoint::new(get_post_request)
                .shape_with(shape_post)
                .provides(post_from_arg),
        )
        .query(
            GET_POSTS_BY_USER_ID,
            QueryEndpoint::new(get_posts_by_user_request)
                .shape_with(shape_posts)
                .provides(post_ids),
        )
        .query(
            GET_USERS,
            QueryEndpoint::new(get_users_request)
                .shape_with(shape_users)
                .provides(user_list_and_ids),
        )
        .mutation(
            ADD_NEW_POST,
            MutationEndpoint::new(add_new_post_request).invalidates(invalidate_post_list),
        )
        .mutation(
            UPDATE_POST,
            MutationEndpoint::new(update_post_request).invalidates(invalidate_post_from_arg),
        )
        .mutation(
            DELETE_POST,
            MutationEndpoint::new(delete_post_request).invalidates(invalidate_post_from_arg),
        )
        .mutation(
            ADD_REACTION,
            MutationEndpoint::new(add_reaction_request).optimistic(OptimisticUpdate {
                endpoint: GET_POSTS,
                target_arg: posts_list_arg,
                apply: apply_reaction,
            }),
        )
}

/// Argument of `addReaction` that bumps one counter of `current`.
pub fn reaction_arg(post_id: &EntityId, current: Reactions, kind: ReactionKind) -> Value {
    json!({
        "postId": post_id.to_json(),
        "reactions": current.incremented(kind).to_value(),
    })
}

// ============================================================================
// ARGUMENTS
// ============================================================================

/// An id given either bare (`5`) or as `{"id": 5}`.
fn id_from(endpoint: &str, arg: &Value, field: &str) -> CacheResult<EntityId> {
    let raw = match arg {
        Value::Object(object) => object.get(field),
        other => Some(other),
    };
    raw.and_then(EntityId::from_json)
        .ok_or_else(|| CacheError::invalid_argument(endpoint, format!("missing or invalid {field}")))
}

fn object_arg<'a>(endpoint: &str, arg: &'a Value) -> CacheResult<&'a Map<String, Value>> {
    arg.as_object()
        .ok_or_else(|| CacheError::invalid_argument(endpoint, "expected an object"))
}

/// `userId` may arrive as a form string; the API wants a number.
fn coerce_user_id(value: Option<&Value>) -> CacheResult<i64> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| CacheError::invalid_argument(ADD_NEW_POST, "userId must be numeric"))
}

fn posts_list_arg(_: &Value) -> Value {
    Value::Null
}

// ============================================================================
// REQUEST BUILDERS
// ============================================================================

fn get_posts_request(_: &Value) -> CacheResult<RequestDescriptor> {
    Ok(RequestDescriptor::get("/posts"))
}

fn get_post_request(arg: &Value) -> CacheResult<RequestDescriptor> {
    let id = id_from(GET_POST, arg, "id")?;
    Ok(RequestDescriptor::get(format!("/posts/{id}")))
}

fn get_posts_by_user_request(arg: &Value) -> CacheResult<RequestDescriptor> {
    let user_id = id_from(GET_POSTS_BY_USER_ID, arg, "userId")?;
    Ok(RequestDescriptor::get(format!("/posts?userId={user_id}")))
}

fn get_users_request(_: &Value) -> CacheResult<RequestDescriptor> {
    Ok(RequestDescriptor::get("/users"))
}

fn add_new_post_request(arg: &Value) -> CacheResult<RequestDescriptor> {
    let mut body = object_arg(ADD_NEW_POST, arg)?.clone();
    let user_id = coerce_user_id(body.get("userId"))?;
    body.insert("userId".to_string(), Value::from(user_id));
    body.insert(DATE_FIELD.to_string(), Value::from(format_timestamp(Utc::now())));
    body.insert(REACTIONS_FIELD.to_string(), Reactions::default().to_value());
    Ok(RequestDescriptor::post("/posts", Value::Object(body)))
}

fn update_post_request(arg: &Value) -> CacheResult<RequestDescriptor> {
    let mut body = object_arg(UPDATE_POST, arg)?.clone();
    let id = id_from(UPDATE_POST, arg, "id")?;
    body.insert(DATE_FIELD.to_string(), Value::from(format_timestamp(Utc::now())));
    Ok(RequestDescriptor::patch(format!("/posts/{id}"), Value::Object(body)))
}

fn delete_post_request(arg: &Value) -> CacheResult<RequestDescriptor> {
    let id = id_from(DELETE_POST, arg, "id")?;
    let mut request = RequestDescriptor::delete(format!("/posts/{id}"));
    request.body = Some(json!({"id": id.to_json()}));
    Ok(request)
}

fn add_reaction_request(arg: &Value) -> CacheResult<RequestDescriptor> {
    let object = object_arg(ADD_REACTION, arg)?;
    let post_id = id_from(ADD_REACTION, arg, "postId")?;
    let reactions = object
        .get(REACTIONS_FIELD)
        .filter(|value| value.is_object())
        .ok_or_else(|| CacheError::invalid_argument(ADD_REACTION, "missing reactions"))?;
    Ok(RequestDescriptor::patch(
        format!("/posts/{post_id}"),
        json!({ REACTIONS_FIELD: reactions }),
    ))
}

// ============================================================================
// SHAPERS
// ============================================================================

fn shape_users(raw: Value) -> Result<QueryData, ShapingError> {
    let items = match raw {
        Value::Array(items) => items,
        other => {
            return Err(ShapingError::UnexpectedShape {
                expected: "array of users",
                found: other.to_string(),
            })
        }
    };
    let records = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| Record::from_value(item, index))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(QueryData::Entities(EntityAdapter::new().set_all(records)))
}

// ============================================================================
// TAGS
// ============================================================================

fn ids_of(data: &QueryData) -> impl Iterator<Item = &EntityId> {
    data.as_entities()
        .map(|snapshot| snapshot.ids())
        .unwrap_or_default()
        .iter()
}

/// `{kind, LIST}` plus one tag per returned id.
fn list_and_ids(kind: &str, data: &QueryData) -> Vec<Tag> {
    std::iter::once(Tag::list(kind))
        .chain(ids_of(data).cloned().map(|id| Tag::entity(kind, id)))
        .collect()
}

fn post_list_and_ids(data: &QueryData, _: &Value) -> Vec<Tag> {
    list_and_ids(POST, data)
}

fn user_list_and_ids(data: &QueryData, _: &Value) -> Vec<Tag> {
    list_and_ids(USER, data)
}

/// One `Post` tag per returned id, no list sentinel.
fn post_ids(data: &QueryData, _: &Value) -> Vec<Tag> {
    ids_of(data)
        .cloned()
        .map(|id| Tag::entity(POST, id))
        .collect()
}

fn post_from_arg(_: &QueryData, arg: &Value) -> Vec<Tag> {
    id_from(GET_POST, arg, "id")
        .map(|id| vec![Tag::entity(POST, id)])
        .unwrap_or_default()
}

fn invalidate_post_list(_: &Value, _: &Value) -> Vec<Tag> {
    vec![Tag::list(POST)]
}

fn invalidate_post_from_arg(_: &Value, arg: &Value) -> Vec<Tag> {
    id_from(DELETE_POST, arg, "id")
        .map(|id| vec![Tag::entity(POST, id)])
        .unwrap_or_default()
}

// ============================================================================
// OPTIMISTIC UPDATES
// ============================================================================

/// Replace one cached post's reactions with the requested counters.
fn apply_reaction(data: &QueryData, arg: &Value) -> Option<QueryData> {
    let snapshot = data.as_entities()?;
    let post_id = EntityId::from_json(arg.get("postId")?)?;
    let reactions = arg.get(REACTIONS_FIELD)?.clone();
    POSTS_ADAPTER
        .update_one(snapshot, &post_id, |post| post.set(REACTIONS_FIELD, reactions))
        .map(QueryData::Entities)
}
