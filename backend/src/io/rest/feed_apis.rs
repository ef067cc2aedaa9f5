//! # REST API for Live Record Feeds
//!
//! `GET /api/users/:owner_id/feed` streams the records of one period as
//! server-sent events. Each event is a full [`RecordListResponse`], sent
//! first for the initial snapshot and then again whenever the feed changes.
//! `PUT /api/users/:owner_id/feed/period` moves the open feed of the
//! session to another period.
//!
//! Every session token has at most one open feed. Opening a new one closes
//! the previous feed, and a client disconnect drops the live subscription.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::{future, StreamExt};
use shared::{Notification, RecordListResponse, SortMode};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};

use super::record_apis::{invalid_period, list_response, PeriodQuery};
use super::{notify, store_error_status, CurrentUser};
use crate::domain::errors::error_notification;
use crate::domain::{FeedEvent, RecordFeed};
use crate::storage::CsvConnection;
use crate::AppState;

pub type SharedFeed = Arc<tokio::sync::Mutex<RecordFeed<CsvConnection>>>;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

struct OpenFeed {
    owner_id: String,
    feed: SharedFeed,
}

/// Open feeds keyed by session token
#[derive(Default)]
pub struct FeedRegistry {
    feeds: Mutex<HashMap<String, OpenFeed>>,
}

impl FeedRegistry {
    fn feeds(&self) -> MutexGuard<'_, HashMap<String, OpenFeed>> {
        self.feeds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the feed of a session, closing the one it replaces
    pub async fn open(&self, token: &str, owner_id: &str, feed: SharedFeed) {
        let previous = self.feeds().insert(
            token.to_string(),
            OpenFeed {
                owner_id: owner_id.to_string(),
                feed,
            },
        );
        if let Some(previous) = previous {
            info!("Replacing open feed of {}", previous.owner_id);
            previous.feed.lock().await.close();
        }
    }

    pub fn get(&self, token: &str) -> Option<SharedFeed> {
        self.feeds().get(token).map(|open| Arc::clone(&open.feed))
    }

    /// Forget the feed of `token` if it is still `feed`
    pub fn release(&self, token: &str, feed: &SharedFeed) -> bool {
        let mut feeds = self.feeds();
        if feeds.get(token).is_some_and(|open| Arc::ptr_eq(&open.feed, feed)) {
            feeds.remove(token);
            return true;
        }
        false
    }

    pub async fn close_session(&self, token: &str) {
        let removed = self.feeds().remove(token);
        if let Some(open) = removed {
            open.feed.lock().await.close();
        }
    }

    /// Close every feed of `owner_id`, whatever session opened it
    pub async fn close_owner(&self, owner_id: &str) {
        let removed: Vec<SharedFeed> = {
            let mut feeds = self.feeds();
            let tokens: Vec<String> = feeds
                .iter()
                .filter(|(_, open)| open.owner_id == owner_id)
                .map(|(token, _)| token.clone())
                .collect();
            tokens.iter().filter_map(|token| feeds.remove(token)).map(|open| open.feed).collect()
        };
        for feed in removed {
            feed.lock().await.close();
        }
    }

    /// Push an optimistic event into every open feed of `owner_id`
    pub async fn apply_to_owner(&self, owner_id: &str, event: FeedEvent) {
        let feeds: Vec<SharedFeed> = self
            .feeds()
            .values()
            .filter(|open| open.owner_id == owner_id)
            .map(|open| Arc::clone(&open.feed))
            .collect();
        for feed in feeds {
            feed.lock().await.apply(event.clone());
        }
    }

    pub fn open_count(&self) -> usize {
        self.feeds().len()
    }
}

/// Held by the event stream. Dropping the stream (client gone) removes the
/// registry entry, and the feed with its subscription goes with the last
/// reference.
struct FeedLease {
    registry: Arc<FeedRegistry>,
    token: String,
    feed: SharedFeed,
}

impl Drop for FeedLease {
    fn drop(&mut self) {
        if self.registry.release(&self.token, &self.feed) {
            debug!("Feed stream ended, released its session entry");
        }
    }
}

fn no_feed(state: &AppState) -> Response {
    notify(
        StatusCode::NOT_FOUND,
        state.dismissible(Notification::error("No live feed is open")),
    )
}

pub async fn open_record_feed(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(owner_id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> Response {
    info!("GET /api/users/{}/feed - query: {:?}", owner_id, query);
    if let Err(rejection) = caller.require_owner(&state, &owner_id) {
        return rejection;
    }
    let Some(period) = query.period() else {
        return invalid_period(&state, &query);
    };

    let feed = match RecordFeed::open(state.record_service.clone(), owner_id.as_str(), period).await {
        Ok(feed) => Arc::new(tokio::sync::Mutex::new(feed)),
        Err(e) => {
            warn!("Failed to open feed of {}: {}", owner_id, e);
            return notify(store_error_status(&e), state.dismissible(error_notification(&e)));
        }
    };
    state.feeds.open(&caller.token, &owner_id, Arc::clone(&feed)).await;

    let changes = feed.lock().await.changes();
    let lease = FeedLease {
        registry: Arc::clone(&state.feeds),
        token: caller.token,
        feed: Arc::clone(&feed),
    };
    let sort = query.sort;

    let stream = WatchStream::new(changes)
        .then(move |_| {
            let feed = Arc::clone(&feed);
            async move { render(&feed, sort).await }
        })
        .take_while(|view| future::ready(view.is_some()))
        .filter_map(future::ready)
        .map(move |view| {
            let _lease = &lease;
            let event = Event::default()
                .event("records")
                .json_data(&view)
                .unwrap_or_else(|_| Event::default().event("error").data("serialization failed"));
            Ok::<Event, Infallible>(event)
        });

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("keepalive"))
        .into_response()
}

/// Current view of a feed, or `None` once it is closed
async fn render(feed: &SharedFeed, sort: SortMode) -> Option<RecordListResponse> {
    let feed = feed.lock().await;
    feed.is_live()
        .then(|| list_response(feed.period(), sort, &feed.records()))
}

/// Move the session's open feed to another period. The stream keeps
/// running and sends the new period's records next.
pub async fn select_feed_period(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(owner_id): Path<String>,
    Query(query): Query<PeriodQuery>,
) -> impl IntoResponse {
    info!("PUT /api/users/{}/feed/period - query: {:?}", owner_id, query);
    if let Err(rejection) = caller.require_owner(&state, &owner_id) {
        return rejection;
    }
    let Some(period) = query.period() else {
        return invalid_period(&state, &query);
    };
    let Some(feed) = state.feeds.get(&caller.token) else {
        return no_feed(&state);
    };

    let mut feed = feed.lock().await;
    if !feed.is_live() {
        return no_feed(&state);
    }
    match feed.select_period(period).await {
        Ok(()) => (StatusCode::OK, Json(list_response(period, query.sort, &feed.records()))).into_response(),
        Err(e) => notify(store_error_status(&e), state.dismissible(error_notification(&e))),
    }
}
