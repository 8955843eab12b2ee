//! Offline Action Handlers
//!
//! One handler per action type. Handlers that touch the watchlist or
//! preferences re-read server state first and write back the merged result,
//! so replaying an action that already landed is harmless.

use serde_json::{Map, Value};

use crate::application::ports::{ApiError, DashboardApi, NewsletterRequest, Preferences};
use crate::domain::offline::{OfflineAction, QueuedAction};

/// Deliver one queued action.
pub(super) async fn deliver(api: &dyn DashboardApi, queued: &QueuedAction) -> Result<(), ApiError> {
    match &queued.action {
        OfflineAction::WatchlistAdd { symbol } => watchlist_add(api, symbol).await,
        OfflineAction::WatchlistRemove { symbol } => watchlist_remove(api, symbol).await,
        OfflineAction::PreferencesUpdate { preferences } => {
            preferences_update(api, preferences).await
        }
        OfflineAction::NewsletterSubscribe {
            email,
            preferences,
            source,
        } => {
            let request = NewsletterRequest {
                email: email.clone(),
                preferences: preferences.clone(),
                source: source.clone(),
            };
            api.subscribe_newsletter(&request).await
        }
        OfflineAction::Custom { body } => {
            let body = (!body.is_null()).then(|| body.clone());
            api.send_raw(queued.method, &queued.endpoint, body)
                .await
                .map(drop)
        }
    }
}

async fn watchlist_add(api: &dyn DashboardApi, symbol: &str) -> Result<(), ApiError> {
    let mut preferences = api.fetch_profile().await?.user.preferences;
    if preferences.watches(symbol) {
        tracing::debug!(symbol, "Symbol already on watchlist");
        return Ok(());
    }
    preferences.watchlist.push(symbol.to_string());
    api.update_preferences(&preferences).await
}

async fn watchlist_remove(api: &dyn DashboardApi, symbol: &str) -> Result<(), ApiError> {
    let mut preferences = api.fetch_profile().await?.user.preferences;
    if !preferences.watches(symbol) {
        tracing::debug!(symbol, "Symbol not on watchlist");
        return Ok(());
    }
    preferences.watchlist.retain(|s| s != symbol);
    api.update_preferences(&preferences).await
}

async fn preferences_update(
    api: &dyn DashboardApi,
    changes: &Map<String, Value>,
) -> Result<(), ApiError> {
    let mut preferences = api.fetch_profile().await?.user.preferences;
    merge_preferences(&mut preferences, changes)?;
    api.update_preferences(&preferences).await
}

fn merge_preferences(
    preferences: &mut Preferences,
    changes: &Map<String, Value>,
) -> Result<(), ApiError> {
    for (key, value) in changes {
        if key == "watchlist" {
            preferences.watchlist = serde_json::from_value(value.clone())
                .map_err(|e| ApiError::InvalidAction(format!("watchlist: {e}")))?;
        } else {
            preferences.other.insert(key.clone(), value.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::application::ports::{MockDashboardApi, ProfileResponse, UserProfile};
    use crate::domain::offline::{ActionId, ActionRequest, HttpMethod};

    fn profile(watchlist: &[&str]) -> ProfileResponse {
        ProfileResponse {
            user: UserProfile {
                preferences: Preferences {
                    watchlist: watchlist.iter().map(ToString::to_string).collect(),
                    other: Map::from_iter([("theme".to_string(), json!("dark"))]),
                },
            },
        }
    }

    fn queued(request: impl Into<ActionRequest>) -> QueuedAction {
        QueuedAction::new(ActionId(1), request.into())
    }

    #[tokio::test]
    async fn watchlist_add_skips_write_when_present() {
        let mut api = MockDashboardApi::new();
        api.expect_fetch_profile()
            .times(1)
            .returning(|| Ok(profile(&["AAPL"])));
        api.expect_update_preferences().never();

        let action = queued(OfflineAction::WatchlistAdd {
            symbol: "AAPL".to_string(),
        });
        deliver(&api, &action).await.unwrap();
    }

    #[tokio::test]
    async fn watchlist_add_appends_and_keeps_other_keys() {
        let mut api = MockDashboardApi::new();
        api.expect_fetch_profile()
            .returning(|| Ok(profile(&["MSFT"])));
        api.expect_update_preferences()
            .withf(|p| p.watchlist == ["MSFT", "AAPL"] && p.other["theme"] == "dark")
            .times(1)
            .returning(|_| Ok(()));

        let action = queued(OfflineAction::WatchlistAdd {
            symbol: "AAPL".to_string(),
        });
        deliver(&api, &action).await.unwrap();
    }

    #[tokio::test]
    async fn watchlist_remove_only_writes_when_present() {
        let mut api = MockDashboardApi::new();
        api.expect_fetch_profile()
            .returning(|| Ok(profile(&["AAPL", "TSLA"])));
        api.expect_update_preferences()
            .withf(|p| p.watchlist == ["AAPL"])
            .times(1)
            .returning(|_| Ok(()));

        deliver(
            &api,
            &queued(OfflineAction::WatchlistRemove {
                symbol: "TSLA".to_string(),
            }),
        )
        .await
        .unwrap();
        deliver(
            &api,
            &queued(OfflineAction::WatchlistRemove {
                symbol: "NVDA".to_string(),
            }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn fetch_failure_skips_write() {
        let mut api = MockDashboardApi::new();
        api.expect_fetch_profile()
            .returning(|| Err(ApiError::Network("connection reset".to_string())));
        api.expect_update_preferences().never();

        let err = deliver(
            &api,
            &queued(OfflineAction::WatchlistAdd {
                symbol: "AAPL".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err, ApiError::Network("connection reset".to_string()));
    }

    #[tokio::test]
    async fn preferences_update_merges_into_fetched_state() {
        let mut api = MockDashboardApi::new();
        api.expect_fetch_profile()
            .returning(|| Ok(profile(&["AAPL"])));
        api.expect_update_preferences()
            .withf(|p| {
                p.watchlist == ["NVDA"] && p.other["theme"] == "light" && p.other["density"] == 2
            })
            .times(1)
            .returning(|_| Ok(()));

        let changes = Map::from_iter([
            ("theme".to_string(), json!("light")),
            ("density".to_string(), json!(2)),
            ("watchlist".to_string(), json!(["NVDA"])),
        ]);
        deliver(
            &api,
            &queued(OfflineAction::PreferencesUpdate {
                preferences: changes,
            }),
        )
        .await
        .unwrap();
    }

    #[test]
    fn malformed_watchlist_change_is_invalid() {
        let mut preferences = Preferences::default();
        let changes = Map::from_iter([("watchlist".to_string(), json!("AAPL"))]);
        assert!(matches!(
            merge_preferences(&mut preferences, &changes),
            Err(ApiError::InvalidAction(_))
        ));
    }

    #[tokio::test]
    async fn newsletter_posts_request() {
        let mut api = MockDashboardApi::new();
        api.expect_subscribe_newsletter()
            .withf(|r| r.email == "a@b.co" && r.source == "footer")
            .times(1)
            .returning(|_| Ok(()));

        deliver(
            &api,
            &queued(OfflineAction::NewsletterSubscribe {
                email: "a@b.co".to_string(),
                preferences: json!({ "weekly": true }),
                source: "footer".to_string(),
            }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn custom_action_uses_its_own_route() {
        let mut api = MockDashboardApi::new();
        api.expect_send_raw()
            .withf(|method, endpoint, body| {
                *method == HttpMethod::Delete && endpoint == "/api/alerts/3" && body.is_none()
            })
            .times(1)
            .returning(|_, _, _| Ok(Value::Null));

        let action = queued(ActionRequest::custom(
            HttpMethod::Delete,
            "/api/alerts/3",
            Value::Null,
        ));
        deliver(&api, &action).await.unwrap();
    }
}
