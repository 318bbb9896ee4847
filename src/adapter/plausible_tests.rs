//! Tests for the Plausible adapter.

use super::{Adapter, AdapterError, Confirmation, Plausible, PlausibleConfig};
use crate::event::Event;
use crate::testing::{MockClient, form_field, header, json_body, json_response, query_param};
use crate::time::InstantSleeper;
use serde_json::json;
use std::sync::Arc;

fn adapter(client: Arc<MockClient>) -> Plausible<Arc<MockClient>, InstantSleeper> {
    let mut config = PlausibleConfig::new("example.com", "secret").with_endpoint("https://plausible.test/api");
    config.client_ip = Some("203.0.113.9".to_string());
    config.user_agent = Some("Mozilla/5.0".to_string());
    Plausible::new(client, config).with_sleeper(InstantSleeper)
}

fn pageview() -> Event {
    Event::new("pageview", "https://example.com/docs")
        .with_name("pageview")
        .with_prop("referrer", "https://search.test")
        .with_prop("screenWidth", 1280)
}

fn visitors(value: u64) -> crate::invoker::HttpResponse {
    json_response(200, &json!({"results": {"visitors": {"value": value}}}))
}

mod send {
    use super::*;

    #[tokio::test]
    async fn posts_json_event_with_forwarding_headers() {
        let client = MockClient::ok();
        let plausible = adapter(Arc::clone(&client));

        assert!(plausible.send(&pageview()).await.unwrap());

        assert_eq!(client.calls(), 1);
        let req = client.last_request();
        assert_eq!(req.url.as_str(), "https://plausible.test/api/event");
        assert_eq!(header(&req, "x-forwarded-for"), Some("203.0.113.9"));
        assert_eq!(header(&req, "user-agent"), Some("Mozilla/5.0"));
        assert!(
            req.body_text()
                .unwrap()
                .contains(r#""url":"https://example.com/docs""#)
        );

        let body = json_body(&req);
        assert_eq!(body["name"], "pageview");
        assert_eq!(body["domain"], "example.com");
        assert_eq!(body["referrer"], "https://search.test");
        assert_eq!(body["screen_width"], 1280);
        assert_eq!(body["props"]["referrer"], "https://search.test");
    }

    #[tokio::test]
    async fn omits_forwarding_headers_when_unset() {
        let client = MockClient::ok();
        let plausible = Plausible::new(
            Arc::clone(&client),
            PlausibleConfig::new("example.com", "secret"),
        );

        plausible.send(&pageview()).await.unwrap();

        let req = client.last_request();
        assert_eq!(req.url.as_str(), "https://plausible.io/api/event");
        assert_eq!(header(&req, "x-forwarded-for"), None);
    }

    #[tokio::test]
    async fn missing_type_is_a_precondition_error() {
        let client = MockClient::ok();

        let result = adapter(Arc::clone(&client))
            .send(&Event::new("", "https://example.com"))
            .await;

        assert!(matches!(result, Err(AdapterError::Precondition { .. })));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn setters_update_forwarded_values() {
        let client = MockClient::ok();
        let mut plausible = adapter(Arc::clone(&client));
        plausible.set_client_ip("198.51.100.1").unwrap();
        plausible.set_user_agent("curl/8").unwrap();

        plausible.send(&pageview()).await.unwrap();

        let req = client.last_request();
        assert_eq!(header(&req, "x-forwarded-for"), Some("198.51.100.1"));
        assert_eq!(header(&req, "user-agent"), Some("curl/8"));
    }
}

mod validate {
    use super::*;

    #[tokio::test]
    async fn provisions_goal_sends_then_confirms() {
        let client = MockClient::replying(vec![
            json_response(200, &json!({"id": 1})),
            json_response(202, &json!({})),
            visitors(1),
        ]);
        let plausible = adapter(Arc::clone(&client));

        assert!(plausible.validate(&pageview()).await.unwrap());

        let requests = client.requests();
        assert_eq!(requests.len(), 3);

        let goal = &requests[0];
        assert_eq!(goal.method, http::Method::PUT);
        assert_eq!(goal.url.path(), "/api/v1/sites/goals");
        assert_eq!(header(goal, "authorization"), Some("Bearer secret"));
        assert_eq!(form_field(goal, "event_name").as_deref(), Some("pageview"));
        assert_eq!(form_field(goal, "goal_type").as_deref(), Some("event"));

        assert_eq!(requests[1].url.path(), "/api/event");

        let stats = &requests[2];
        assert_eq!(stats.method, http::Method::GET);
        assert!(stats.body.is_none());
        assert_eq!(query_param(stats, "site_id").as_deref(), Some("example.com"));
        assert_eq!(
            query_param(stats, "filters").as_deref(),
            Some(r#"{"goal":"pageview"}"#)
        );
    }

    #[tokio::test]
    async fn polls_until_visitors_appear() {
        let client = MockClient::replying(vec![
            json_response(200, &json!({})),
            json_response(202, &json!({})),
            visitors(0),
            visitors(0),
            visitors(2),
        ]);
        let plausible = adapter(Arc::clone(&client));

        assert!(plausible.validate(&pageview()).await.unwrap());
        assert_eq!(client.calls(), 5);
    }

    #[tokio::test]
    async fn gives_up_after_bounded_attempts() {
        let client = MockClient::replying(vec![
            json_response(200, &json!({})),
            json_response(202, &json!({})),
            visitors(0),
            visitors(0),
        ]);
        let plausible = adapter(Arc::clone(&client))
            .with_confirmation(Confirmation::new().with_attempts(2));

        let err = plausible.validate(&pageview()).await.unwrap_err();

        assert!(matches!(err, AdapterError::Unconfirmed { .. }));
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn missing_count_is_unconfirmed() {
        let client = MockClient::replying(vec![
            json_response(200, &json!({})),
            json_response(202, &json!({})),
            json_response(200, &json!({"results": {}})),
        ]);

        let err = adapter(client).validate(&pageview()).await.unwrap_err();

        assert!(matches!(err, AdapterError::Unconfirmed { .. }));
    }

    #[tokio::test]
    async fn missing_name_is_precondition() {
        let client = MockClient::ok();
        let event = Event::new("pageview", "https://example.com/docs");

        let err = adapter(Arc::clone(&client)).validate(&event).await.unwrap_err();

        assert!(matches!(err, AdapterError::Precondition { .. }));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn rejected_goal_propagates_http_error() {
        let client = MockClient::replying(vec![json_response(
            401,
            &json!({"message": "invalid api key"}),
        )]);

        let err = adapter(Arc::clone(&client))
            .validate(&pageview())
            .await
            .unwrap_err();

        assert_eq!(err.status(), 401);
        assert_eq!(client.calls(), 1);
    }
}
